pub mod channel;
pub mod dead_letter;
pub mod queued_notification;
pub mod rate_limit;
pub mod retry_configuration;

pub use channel::*;
pub use dead_letter::*;
pub use queued_notification::*;
pub use rate_limit::*;
pub use retry_configuration::*;

/// Converts a std duration for timestamp arithmetic, saturating at one century.
pub(crate) fn to_chrono(duration: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(36_500))
}
