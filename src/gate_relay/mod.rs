//! GateCommandRelay - Manual Gate Control
//!
//! ## Responsibilities
//!
//! - Remember the gate controller address announced by the sensor unit
//! - Send open commands to that address
//! - Classify failures (timeout / error response / unreachable)
//! - Report each attempt through the RealtimeHub

use crate::error::{Error, Result};
use crate::realtime_hub::{GateOperationMessage, HubMessage, RealtimeHub};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Why a gate command failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateFailure {
    #[error("gate controller at {address} timed out")]
    Timeout { address: String },

    #[error("gate controller at {address} responded with error: {status} - {body}")]
    ErrorResponse {
        address: String,
        status: u16,
        body: String,
    },

    #[error("no response from gate controller at {address}: {detail}")]
    Unreachable { address: String, detail: String },
}

/// Network seam to the gate controller
#[async_trait]
pub trait GateController: Send + Sync {
    /// Send "open" to the controller at `address`, returning its ack text
    async fn open(&self, address: &str) -> std::result::Result<String, GateFailure>;
}

/// Controller reachable at `http://{address}/control-gate?action=open`
pub struct HttpGateController {
    client: reqwest::Client,
}

impl HttpGateController {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl GateController for HttpGateController {
    async fn open(&self, address: &str) -> std::result::Result<String, GateFailure> {
        let url = format!("http://{}/control-gate?action=open", address);
        tracing::debug!(url = %url, "Sending gate open command");

        let resp = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                GateFailure::Timeout {
                    address: address.to_string(),
                }
            } else {
                GateFailure::Unreachable {
                    address: address.to_string(),
                    detail: e.to_string(),
                }
            }
        })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| {
            if e.is_timeout() {
                GateFailure::Timeout {
                    address: address.to_string(),
                }
            } else {
                GateFailure::Unreachable {
                    address: address.to_string(),
                    detail: e.to_string(),
                }
            }
        })?;

        if !status.is_success() {
            return Err(GateFailure::ErrorResponse {
                address: address.to_string(),
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        Ok(body.trim().to_string())
    }
}

/// Successful gate command
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct GateAck {
    pub address: String,
    pub message: String,
}

/// GateCommandRelay instance
pub struct GateCommandRelay {
    controller: Arc<dyn GateController>,
    address: RwLock<Option<String>>,
    realtime: Arc<RealtimeHub>,
}

impl GateCommandRelay {
    pub fn new(controller: Arc<dyn GateController>, realtime: Arc<RealtimeHub>) -> Self {
        Self {
            controller,
            address: RwLock::new(None),
            realtime,
        }
    }

    /// Remember the controller address (latest announcement wins)
    pub async fn learn_address(&self, address: &str) {
        let address = address.trim();
        if address.is_empty() {
            return;
        }
        let mut current = self.address.write().await;
        if current.as_deref() != Some(address) {
            tracing::info!(address = %address, "Gate controller address learned");
            *current = Some(address.to_string());
        }
    }

    pub async fn known_address(&self) -> Option<String> {
        self.address.read().await.clone()
    }

    /// Open the gate at the last learned address
    pub async fn open_gate(&self) -> Result<GateAck> {
        let Some(address) = self.known_address().await else {
            tracing::warn!("Gate open requested but no controller address is known");
            return Err(Error::UnknownTarget(
                "gate controller address unknown; the sensor unit must report at least once"
                    .to_string(),
            ));
        };

        match self.controller.open(&address).await {
            Ok(message) => {
                tracing::info!(address = %address, ack = %message, "Gate opened");
                self.report("success", &message).await;
                Ok(GateAck { address, message })
            }
            Err(failure) => {
                tracing::error!(address = %address, error = %failure, "Gate open failed");
                self.report("error", &failure.to_string()).await;
                Err(Error::Gate(failure))
            }
        }
    }

    async fn report(&self, status: &str, message: &str) {
        self.realtime
            .broadcast(HubMessage::GateOperationResult(GateOperationMessage {
                status: status.to_string(),
                action: "open".to_string(),
                message: message.to_string(),
            }))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Scripted controller recording the addresses it was asked to open
    struct FakeController {
        outcome: std::result::Result<String, GateFailure>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeController {
        fn new(outcome: std::result::Result<String, GateFailure>) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl GateController for FakeController {
        async fn open(&self, address: &str) -> std::result::Result<String, GateFailure> {
            self.calls.lock().unwrap().push(address.to_string());
            self.outcome.clone()
        }
    }

    #[tokio::test]
    async fn test_open_without_address_is_unknown_target() {
        let controller = FakeController::new(Ok("OK".to_string()));
        let relay = GateCommandRelay::new(controller.clone(), Arc::new(RealtimeHub::new()));

        let result = relay.open_gate().await;
        assert!(matches!(result, Err(Error::UnknownTarget(_))));
        assert!(controller.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_uses_latest_learned_address() {
        let controller = FakeController::new(Ok("Gate opened".to_string()));
        let hub = Arc::new(RealtimeHub::new());
        let (_id, mut rx) = hub.register().await;
        let relay = GateCommandRelay::new(controller.clone(), hub);

        relay.learn_address("192.168.1.50").await;
        relay.learn_address("192.168.1.51").await;
        let ack = relay.open_gate().await.unwrap();

        assert_eq!(ack.address, "192.168.1.51");
        assert_eq!(ack.message, "Gate opened");
        assert_eq!(*controller.calls.lock().unwrap(), vec!["192.168.1.51".to_string()]);

        let msg: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(msg["type"], "gate_operation_result");
        assert_eq!(msg["data"]["status"], "success");
    }

    #[tokio::test]
    async fn test_failure_is_classified_and_reported() {
        let controller = FakeController::new(Err(GateFailure::Timeout {
            address: "10.0.0.9".to_string(),
        }));
        let hub = Arc::new(RealtimeHub::new());
        let (_id, mut rx) = hub.register().await;
        let relay = GateCommandRelay::new(controller, hub);
        relay.learn_address("10.0.0.9").await;

        let result = relay.open_gate().await;
        assert!(matches!(result, Err(Error::Gate(GateFailure::Timeout { .. }))));

        let msg: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(msg["data"]["status"], "error");
    }

    #[tokio::test]
    async fn test_blank_address_is_ignored() {
        let relay = GateCommandRelay::new(
            FakeController::new(Ok(String::new())),
            Arc::new(RealtimeHub::new()),
        );
        relay.learn_address("  ").await;
        assert!(relay.known_address().await.is_none());
    }

    #[tokio::test]
    async fn test_http_controller_unreachable() {
        let controller = HttpGateController::new(Duration::from_secs(2)).unwrap();
        // port 9 on loopback: nothing listens there in test environments
        let result = controller.open("127.0.0.1:9").await;
        assert!(matches!(
            result,
            Err(GateFailure::Unreachable { .. }) | Err(GateFailure::Timeout { .. })
        ));
    }
}
