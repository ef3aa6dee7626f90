use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use uuid::Uuid;

use super::AppState;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

fn json(status: u16, body: String) -> Response<BoxBody> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(full_body(body))
        .unwrap()
}

/// Health/readiness/metrics plus the one admin operation the core owns
/// directly (`testAlert`). Policy/tenant/rule CRUD lives in the external
/// admin store this service reads from, not in this process.
pub async fn handle_admin(
    req: Request<Incoming>,
    state: AppState,
) -> Result<Response<BoxBody>, hyper::Error> {
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    if method == Method::GET && (path == "/health" || path == "/healthz") {
        return Ok(json(200, r#"{"status":"ok"}"#.to_string()));
    }

    if method == Method::GET && (path == "/ready" || path == "/readyz") {
        return Ok(json(200, r#"{"status":"ready"}"#.to_string()));
    }

    if method == Method::GET && path == "/metrics" {
        let body = state.metrics.render();
        return Ok(Response::builder()
            .status(200)
            .header("content-type", "text/plain; version=0.0.4; charset=utf-8")
            .body(full_body(body))
            .unwrap());
    }

    if method == Method::POST {
        if let Some(rule_id) = path
            .strip_prefix("/admin/alerts/")
            .and_then(|rest| rest.strip_suffix("/test"))
        {
            return Ok(handle_test_alert(rule_id, &state).await);
        }
    }

    Ok(json(404, r#"{"error":"not found"}"#.to_string()))
}

async fn handle_test_alert(rule_id: &str, state: &AppState) -> Response<BoxBody> {
    let Ok(rule_id) = Uuid::parse_str(rule_id) else {
        return json(400, r#"{"error":"invalid rule id"}"#.to_string());
    };

    match state.alerts.test_alert(rule_id).await {
        Ok(()) => json(200, r#"{"status":"fired"}"#.to_string()),
        Err(err) => {
            tracing::warn!(rule_id = %rule_id, error = %err, "admin: test alert failed");
            json(404, format!(r#"{{"error":"{err}"}}"#))
        }
    }
}
