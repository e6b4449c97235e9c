//! Event system for record lifecycle operations
//!
//! Services emit an event after each committed write. Listeners use them for
//! the audit trail and for cache invalidation in front-end gateways.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::db::models::{FieldStatus, Severity};

/// Record events emitted by services
#[derive(Debug, Clone)]
pub enum RecordEvent {
    // Field events
    FieldCreated {
        id: String,
        owner_id: String,
    },
    FieldUpdated {
        id: String,
    },
    FieldStatusChanged {
        id: String,
        status: FieldStatus,
        reviewer: String,
    },
    FieldVerified {
        id: String,
        reviewer: String,
    },
    FieldDeleted {
        id: String,
        cascaded_crops: usize,
    },

    // Crop record events
    CropCreated {
        id: String,
        field_id: String,
    },
    CropUpdated {
        id: String,
    },
    CropVerified {
        id: String,
        reviewer: String,
    },
    CropDeleted {
        id: String,
    },

    // Detection events
    PredictionRecorded {
        id: String,
        field_id: String,
        label: String,
        severity: Option<Severity>,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    /// Handle an event
    fn on_event(&self, event: &RecordEvent);
}

/// Event bus for broadcasting record events
pub struct EventBus {
    sender: broadcast::Sender<RecordEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a new event bus with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: RecordEvent) {
        trace!(event = ?event, "Emitting record event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Audit trail listener
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &RecordEvent) {
        match event {
            RecordEvent::FieldStatusChanged { id, status, reviewer } => {
                info!(
                    field_id = %id,
                    status = %status,
                    reviewer = %reviewer,
                    "Field status changed"
                );
            }
            RecordEvent::FieldVerified { id, reviewer } => {
                info!(field_id = %id, reviewer = %reviewer, "Field verified");
            }
            RecordEvent::CropVerified { id, reviewer } => {
                info!(crop_id = %id, reviewer = %reviewer, "Crop record verified");
            }
            RecordEvent::FieldDeleted { id, cascaded_crops } => {
                info!(field_id = %id, cascaded_crops, "Field deleted");
            }
            RecordEvent::PredictionRecorded { id, field_id, label, .. } => {
                debug!(
                    prediction_id = %id,
                    field_id = %field_id,
                    label = %label,
                    "Prediction recorded"
                );
            }
            _ => {
                trace!(event = ?event, "Record event");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}
