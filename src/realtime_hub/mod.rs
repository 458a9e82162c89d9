//! RealtimeHub - Event Broadcaster
//!
//! ## Responsibilities
//!
//! - Subscriber registration (WebSocket clients, test probes)
//! - Fan-out of parking events to every registered subscriber
//!
//! Each subscriber owns a bounded queue filled with `try_send`, so delivery
//! to one subscriber is FIFO and never waits on another. Delivery is
//! best-effort and at-most-once: a message for a full or closed queue is
//! logged and dropped, never retried.

use crate::access_engine::ReaderMode;
use crate::plate_capture::CaptureChannel;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Messages buffered per subscriber before new ones are dropped
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 256;

/// Hub message types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum HubMessage {
    ModeChanged(ModeChangedMessage),
    /// Camera on `channel` should capture and upload a frame now
    CaptureTriggered(CaptureTriggeredMessage),
    EntryCaptured(PlateCapturedMessage),
    ExitImageProcessed(PlateCapturedMessage),
    ExitConfirmed(ExitConfirmedMessage),
    ExitMismatch(ExitMismatchMessage),
    ExitNoPlate(ExitNoPlateMessage),
    SensorSlotUpdate(SensorSlotUpdateMessage),
    StateCleared(StateClearedMessage),
    GateOperationResult(GateOperationMessage),
}

impl HubMessage {
    /// Wire name of the message kind
    pub fn kind(&self) -> &'static str {
        match self {
            HubMessage::ModeChanged(_) => "mode_changed",
            HubMessage::CaptureTriggered(_) => "capture_triggered",
            HubMessage::EntryCaptured(_) => "entry_captured",
            HubMessage::ExitImageProcessed(_) => "exit_image_processed",
            HubMessage::ExitConfirmed(_) => "exit_confirmed",
            HubMessage::ExitMismatch(_) => "exit_mismatch",
            HubMessage::ExitNoPlate(_) => "exit_no_plate",
            HubMessage::SensorSlotUpdate(_) => "sensor_slot_update",
            HubMessage::StateCleared(_) => "state_cleared",
            HubMessage::GateOperationResult(_) => "gate_operation_result",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeChangedMessage {
    pub mode: ReaderMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureTriggeredMessage {
    pub channel: CaptureChannel,
    pub triggered_at: String,
}

/// Plate recognized from an uploaded frame (entry or exit camera)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlateCapturedMessage {
    /// `None` when the recognizer found no plate
    pub plate: Option<String>,
    pub image_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitConfirmedMessage {
    pub plate: String,
    pub rfid_tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    /// Formatted "HH:MM:SS"
    pub duration: String,
    pub fee: i64,
    pub exit_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitMismatchMessage {
    pub rfid_tag: String,
    pub expected_plate: String,
    pub recognized_plate: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitNoPlateMessage {
    pub rfid_tag: String,
    pub expected_plate: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorSlotUpdateMessage {
    pub individual_states: Vec<bool>,
    pub total: usize,
    pub occupied: usize,
    pub available: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateClearedMessage {
    pub reason: String,
    pub deleted_count: u64,
    pub message: String,
}

/// Result of a gate command ("success" / "error")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateOperationMessage {
    pub status: String,
    pub action: String,
    pub message: String,
}

/// Subscriber connection
struct SubscriberConnection {
    id: Uuid,
    tx: mpsc::Sender<String>,
}

/// RealtimeHub instance
pub struct RealtimeHub {
    connections: RwLock<HashMap<Uuid, SubscriberConnection>>,
    connection_count: AtomicU64,
    queue_capacity: usize,
}

impl RealtimeHub {
    /// Create new RealtimeHub
    pub fn new() -> Self {
        Self::with_queue_capacity(SUBSCRIBER_QUEUE_CAPACITY)
    }

    pub fn with_queue_capacity(queue_capacity: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            connection_count: AtomicU64::new(0),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Register a new subscriber
    pub async fn register(&self) -> (Uuid, mpsc::Receiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.queue_capacity);

        {
            let mut connections = self.connections.write().await;
            connections.insert(id, SubscriberConnection { id, tx });
        }

        self.connection_count.fetch_add(1, Ordering::Relaxed);

        tracing::info!(subscriber_id = %id, "Subscriber registered");

        (id, rx)
    }

    /// Unregister a subscriber
    pub async fn unregister(&self, id: &Uuid) {
        let mut connections = self.connections.write().await;
        if connections.remove(id).is_some() {
            self.connection_count.fetch_sub(1, Ordering::Relaxed);
            tracing::info!(subscriber_id = %id, "Subscriber unregistered");
        }
    }

    /// Broadcast message to all subscribers
    pub async fn broadcast(&self, message: HubMessage) {
        tracing::debug!(message_type = %message.kind(), "Broadcasting message");

        let json = match serde_json::to_string(&message) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize message");
                return;
            }
        };

        let connections = self.connections.read().await;
        for conn in connections.values() {
            match conn.tx.try_send(json.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(subscriber_id = %conn.id, "Subscriber queue full, message dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::warn!(subscriber_id = %conn.id, "Subscriber gone, message dropped");
                }
            }
        }
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> u64 {
        self.connection_count.load(Ordering::Relaxed)
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}
