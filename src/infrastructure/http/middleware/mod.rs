pub mod error;

pub use error::{ApiError, ApiResult};

use std::sync::Arc;

use crate::application::services::NotificationDeliveryService;

#[derive(Clone)]
pub struct AppState {
    pub delivery_service: Arc<NotificationDeliveryService>,
}

impl AppState {
    pub fn new(delivery_service: Arc<NotificationDeliveryService>) -> Self {
        Self { delivery_service }
    }
}
