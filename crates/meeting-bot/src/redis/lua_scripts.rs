//! Lua scripts for the shared transcription-server registry.
//! Each script is a `pub const` string literal with its own content
//! assertions, and callers invoke them as a single atomic `EVAL` so
//! concurrent bots can't overcommit a server's capacity.
//!
//! Registry shape: `wl:rank` is a Redis sorted set of `server_url -> score`
//! (score = current load, lower is less loaded).

/// Allocate the least-loaded server under `maxClients`.
///
/// Arguments:
/// - KEYS\[1\]: ranking key (`wl:rank`)
/// - ARGV\[1\]: capacity bound (`maxClients`)
///
/// Returns the server URL with the lowest score under the bound, after
/// atomically incrementing its score by 1, or `false` if none qualify.
pub const ALLOCATE: &str = r#"
local cap = tonumber(ARGV[1])
local entries = redis.call('ZRANGE', KEYS[1], 0, -1, 'WITHSCORES')

for i = 1, #entries, 2 do
    local url = entries[i]
    local score = tonumber(entries[i + 1])
    if score < cap then
        redis.call('ZINCRBY', KEYS[1], 1, url)
        return url
    end
end

return false
"#;

/// Release a slot on a server (decrements its score, clamped at 0).
///
/// Arguments:
/// - KEYS\[1\]: ranking key
/// - ARGV\[1\]: server URL
pub const RELEASE: &str = r#"
local score = redis.call('ZSCORE', KEYS[1], ARGV[1])
if score == false then
    return 0
end

local current = tonumber(score)
if current <= 0 then
    redis.call('ZADD', KEYS[1], 0, ARGV[1])
else
    redis.call('ZINCRBY', KEYS[1], -1, ARGV[1])
end

return 1
"#;

/// Remove a server from the ranking entirely (used before reconnecting to
/// a different server after a failed connection).
///
/// Arguments:
/// - KEYS\[1\]: ranking key
/// - ARGV\[1\]: server URL to remove
pub const FAIL: &str = r#"
redis.call('ZREM', KEYS[1], ARGV[1])
return 1
"#;
