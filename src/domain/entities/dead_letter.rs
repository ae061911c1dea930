use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::QueuedNotification;

/// A notification the retry policy gave up on, kept for operator inspection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeadLetterEntry {
    pub notification: QueuedNotification,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}
