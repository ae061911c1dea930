pub mod manual;
pub mod tokio;

pub use self::manual::ManualTimeService;
pub use self::tokio::TokioTimeService;
