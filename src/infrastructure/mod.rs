pub mod http;
pub mod observability;
pub mod persistence;
pub mod providers;
pub mod rate_limiter;
pub mod runtime;
pub mod workers;
