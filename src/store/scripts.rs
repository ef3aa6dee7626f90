/// Token bucket. The bucket is a hash with fields `tokens` (float), `ts`
/// (last refill time, milliseconds), and `streak` (consecutive denials since
/// the last allowed request, used only to report an increasing
/// `reset_in_seconds` to a caller hammering an exhausted bucket).
///
/// KEYS\[1\] = bucket key
/// ARGV\[1\] = capacity
/// ARGV\[2\] = refill_rate (tokens per second)
/// ARGV\[3\] = now_ms
/// ARGV\[4\] = ttl_ms (2x window, applied to the hash so idle buckets expire)
///
/// Returns `{allowed, remaining, reset_in_seconds}`. `remaining` is floored
/// to an integer; `reset_in_seconds` is the ceil of the time until the next
/// token this caller would be entitled to becomes available.
pub const TOKEN_BUCKET: &str = r"
local capacity = tonumber(ARGV[1])
local refill_rate = tonumber(ARGV[2])
local now_ms = tonumber(ARGV[3])
local ttl_ms = tonumber(ARGV[4])

local tokens = capacity
local last_ts = now_ms
local streak = 0

local existing = redis.call('HMGET', KEYS[1], 'tokens', 'ts', 'streak')
if existing[1] then
    tokens = tonumber(existing[1])
    last_ts = tonumber(existing[2])
    streak = tonumber(existing[3]) or 0
    local elapsed_s = math.max(0, now_ms - last_ts) / 1000.0
    tokens = math.min(capacity, tokens + elapsed_s * refill_rate)
end

local allowed = 0
local reset_in_seconds = 0
if tokens >= 1.0 then
    tokens = tokens - 1.0
    allowed = 1
    streak = 0
else
    streak = streak + 1
    if refill_rate > 0 then
        reset_in_seconds = math.ceil((streak - tokens) / refill_rate)
    end
end

redis.call('HSET', KEYS[1], 'tokens', tostring(tokens), 'ts', tostring(now_ms), 'streak', tostring(streak))
redis.call('PEXPIRE', KEYS[1], ttl_ms)

return {allowed, math.floor(tokens), reset_in_seconds}
";

/// Fixed window counter, keyed by an epoch-aligned window id so independent
/// windows never blend into a rolling TTL. The actual Redis key is
/// `KEYS[1]:windowId`, where `windowId = floor(nowSec / windowSeconds)`; it
/// expires `windowSeconds + 1` seconds after first write, well after its
/// window has closed.
///
/// KEYS\[1\] = counter key prefix
/// ARGV\[1\] = limit
/// ARGV\[2\] = window_seconds
/// ARGV\[3\] = now_sec
///
/// Returns `{allowed, remaining, reset_in_seconds}`, where
/// `reset_in_seconds` is the time remaining until this window closes.
pub const FIXED_WINDOW: &str = r"
local limit = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local now_sec = tonumber(ARGV[3])

local window_id = math.floor(now_sec / window)
local key = KEYS[1] .. ':' .. tostring(window_id)

local count = redis.call('INCR', key)
if count == 1 then
    redis.call('EXPIRE', key, window + 1)
end

local window_end = (window_id + 1) * window
local reset_in_seconds = window_end - now_sec

local allowed = 0
local remaining = 0
if count <= limit then
    allowed = 1
    remaining = limit - count
end

return {allowed, remaining, reset_in_seconds}
";

/// Sliding log: a sorted set of request timestamps. Entries older than
/// `now - window` are trimmed before counting so the set never grows
/// unbounded. Members are `"{now_ms}-{seq}"` to keep them unique even when
/// two requests land in the same millisecond.
///
/// KEYS\[1\] = log key
/// ARGV\[1\] = limit
/// ARGV\[2\] = window_ms
/// ARGV\[3\] = now_ms
/// ARGV\[4\] = member suffix (caller-supplied monotonic counter)
/// ARGV\[5\] = ttl_ms (2x window)
///
/// Returns `{allowed, remaining}`.
pub const SLIDING_LOG: &str = r"
local limit = tonumber(ARGV[1])
local window_ms = tonumber(ARGV[2])
local now_ms = tonumber(ARGV[3])
local suffix = ARGV[4]
local ttl_ms = tonumber(ARGV[5])

redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', now_ms - window_ms)

local count = redis.call('ZCARD', KEYS[1])
local allowed = 0
local remaining = 0
if count < limit then
    redis.call('ZADD', KEYS[1], now_ms, now_ms .. '-' .. suffix)
    allowed = 1
    remaining = limit - count - 1
end

redis.call('PEXPIRE', KEYS[1], ttl_ms)

return {allowed, remaining}
";
