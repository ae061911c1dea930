pub mod notification_delivery_service;
pub mod retry_service;

pub use notification_delivery_service::{
    BatchReport, NotificationDeliveryService, RetryReport, DEFAULT_SEND_TIMEOUT,
};
pub use retry_service::{
    CreateRetryConfigurationRequest, ProcessRetryRequest, RetryDecision, RetryService,
    UpdateRetryConfigurationRequest,
};
