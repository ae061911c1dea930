pub mod dead_letter;
pub mod delivery_channel;
pub mod delivery_queue_repository;
pub mod rate_limiter;
pub mod retry_configuration_repository;
pub mod time_service;

pub use dead_letter::DeadLetterSink;
pub use delivery_channel::DeliveryChannel;
pub use delivery_queue_repository::DeliveryQueueRepository;
pub use rate_limiter::RateLimiter;
pub use retry_configuration_repository::RetryConfigurationRepository;
pub use time_service::TimeService;
