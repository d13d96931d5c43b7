use once_cell::sync::Lazy;
use redis::Script;

// KEYS[1] record; ARGV[1] num, ARGV[2] ttl seconds (0 = none).
// Returns 1 reserved, 0 over quota, -1 record incomplete.
pub(crate) static RESERVE: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
local used = redis.call('HGET', KEYS[1], 'used')
local quota = redis.call('HGET', KEYS[1], 'quota')
if not used or not quota then
    return -1
end
local num = tonumber(ARGV[1])
if tonumber(used) + num > tonumber(quota) then
    return 0
end
redis.call('HINCRBY', KEYS[1], 'used', num)
local ttl = tonumber(ARGV[2])
if ttl > 0 and redis.call('TTL', KEYS[1]) < 0 then
    redis.call('EXPIRE', KEYS[1], ttl)
end
return 1
"#,
    )
});

// KEYS[1] record; ARGV[1] num, ARGV[2] ttl seconds (0 = keep).
// Returns 1 released, 0 would go negative, -1 record incomplete.
pub(crate) static ROLLBACK: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
local used = redis.call('HGET', KEYS[1], 'used')
local quota = redis.call('HGET', KEYS[1], 'quota')
if not used or not quota then
    return -1
end
local num = tonumber(ARGV[1])
if tonumber(used) - num < 0 then
    return 0
end
redis.call('HINCRBY', KEYS[1], 'used', -num)
local ttl = tonumber(ARGV[2])
if ttl > 0 then
    redis.call('EXPIRE', KEYS[1], ttl)
end
return 1
"#,
    )
});

// KEYS[1] record, KEYS[2] refresh stamp; ARGV used, quota, ttl seconds, now ms.
pub(crate) static SYNC: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
redis.call('HSET', KEYS[1], 'used', ARGV[1], 'quota', ARGV[2])
redis.call('SET', KEYS[2], ARGV[4])
local ttl = tonumber(ARGV[3])
if ttl > 0 then
    redis.call('EXPIRE', KEYS[1], ttl)
    redis.call('EXPIRE', KEYS[2], ttl)
else
    redis.call('PERSIST', KEYS[1])
end
return 1
"#,
    )
});

// KEYS[1] lock; ARGV[1] token, ARGV[2] lease ms.
// Returns 0 when acquired, else the holder's remaining lease in ms.
pub(crate) static LOCK_ACQUIRE: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
if redis.call('SET', KEYS[1], ARGV[1], 'NX', 'PX', ARGV[2]) then
    return 0
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl <= 0 then
    return 1
end
return ttl
"#,
    )
});

// KEYS[1] lock; ARGV[1] token, ARGV[2] lease ms.
pub(crate) static LOCK_RENEW: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return 0
"#,
    )
});

// KEYS[1] lock; ARGV[1] token, ARGV[2] release channel.
pub(crate) static LOCK_RELEASE: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('DEL', KEYS[1])
    redis.call('PUBLISH', ARGV[2], ARGV[1])
    return 1
end
return 0
"#,
    )
});
