mod in_memory;
mod redis_counter;

pub use in_memory::InMemoryRateLimiter;
pub use redis_counter::{create_pool, RedisPool, RedisRateLimiter};
