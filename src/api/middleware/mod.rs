pub mod headers;
pub mod logging;
pub mod rate_limit;

pub use headers::{no_cache_assets, security_headers};
pub use logging::request_logger;
pub use rate_limit::{client_fingerprint, rate_limit};
