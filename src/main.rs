#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use ratelimitd::server;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ratelimitd", about = "Multi-tenant, policy-driven rate limiting service")]
struct Cli {
    /// Path to service config file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Check API listen address (overrides config file)
    #[arg(short, long)]
    listen: Option<String>,

    /// Admin API listen address, for health/ready/metrics/testAlert (overrides config file)
    #[arg(long)]
    admin_listen: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let worker_threads = server::runtime::get_container_cpu_limit();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()?;

    rt.block_on(server::bootstrap::run(server::bootstrap::BootstrapArgs {
        config_path: cli.config,
        listen: cli.listen,
        admin_listen: cli.admin_listen,
    }))
}
