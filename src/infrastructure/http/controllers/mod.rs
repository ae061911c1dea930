pub mod dead_letters;
pub mod health;
pub mod queue;
pub mod rate_limits;
pub mod retry_configurations;
