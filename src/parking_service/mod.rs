//! ParkingService - Facility Facade
//!
//! Owns the process-wide reader mode and wires the components together for
//! the operations the HTTP layer exposes: mode toggle, camera uploads, RFID
//! scans, sensor reports, manual gate control, status and administrative
//! clear.

use crate::access_engine::{AccessDecision, AccessDecisionEngine, ReaderMode};
use crate::error::{Error, Result};
use crate::gate_relay::{GateAck, GateCommandRelay};
use crate::image_store::ImageRef;
use crate::parking_ledger::{Occupancy, ParkingLedger, ParkingRecord};
use crate::plate_capture::{normalize_plate, CaptureChannel, PlateCaptureCorrelator};
use crate::plate_recognizer::{PlateReading, PlateRecognizer};
use crate::realtime_hub::{
    HubMessage, ModeChangedMessage, PlateCapturedMessage, RealtimeHub, StateClearedMessage,
};
use crate::slot_sensor::{parse_states, SensorSlotTracker, SlotSnapshot};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Result of processing one camera frame
#[derive(Debug, Clone, Serialize)]
pub struct CaptureResult {
    pub channel: CaptureChannel,
    /// Normalized plate; `None` when nothing was recognized
    pub plate: Option<String>,
    pub image_ref: ImageRef,
    pub image_path: String,
}

/// Facility status; the two occupancy gauges are reported side by side
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub mode: ReaderMode,
    /// Derived from records with status `in`
    pub ledger: Occupancy,
    /// Latest hardware report
    pub sensor: SlotSnapshot,
    /// Records with status `in`, newest entry first
    pub cars: Vec<ParkingRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gate_address: Option<String>,
    pub subscribers: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearSummary {
    pub deleted_count: u64,
    pub message: String,
}

/// ParkingService instance
pub struct ParkingService {
    mode: RwLock<ReaderMode>,
    engine: Arc<AccessDecisionEngine>,
    ledger: Arc<ParkingLedger>,
    correlator: Arc<PlateCaptureCorrelator>,
    recognizer: Arc<dyn PlateRecognizer>,
    sensor: Arc<SensorSlotTracker>,
    gate: Arc<GateCommandRelay>,
    realtime: Arc<RealtimeHub>,
}

impl ParkingService {
    pub fn new(
        engine: Arc<AccessDecisionEngine>,
        ledger: Arc<ParkingLedger>,
        correlator: Arc<PlateCaptureCorrelator>,
        recognizer: Arc<dyn PlateRecognizer>,
        sensor: Arc<SensorSlotTracker>,
        gate: Arc<GateCommandRelay>,
        realtime: Arc<RealtimeHub>,
    ) -> Self {
        Self {
            mode: RwLock::new(ReaderMode::Entry),
            engine,
            ledger,
            correlator,
            recognizer,
            sensor,
            gate,
            realtime,
        }
    }

    pub async fn mode(&self) -> ReaderMode {
        *self.mode.read().await
    }

    /// Flip the reader toggle; flows already running keep their mode
    pub async fn set_mode(&self, mode: ReaderMode) {
        *self.mode.write().await = mode;
        tracing::info!(mode = %mode, "RFID reader mode changed");
        self.realtime
            .broadcast(HubMessage::ModeChanged(ModeChangedMessage { mode }))
            .await;
    }

    /// Recognize a stored frame and publish it to the channel's slot
    ///
    /// No-plate and recognizer failures both record an empty sample so a
    /// waiting flow resolves without sitting out its full wait.
    pub async fn submit_captured_image(
        &self,
        channel: CaptureChannel,
        image_ref: ImageRef,
    ) -> Result<CaptureResult> {
        let reading = match self.recognizer.recognize(&image_ref).await {
            Ok(reading) => reading,
            Err(failure) => {
                tracing::warn!(
                    channel = %channel,
                    image = %image_ref,
                    error = %failure,
                    "Plate recognition failed"
                );
                self.correlator.record_sample(channel, None, image_ref);
                return Err(Error::UpstreamUnavailable(failure.to_string()));
            }
        };

        let plate = match &reading {
            PlateReading::Plate(raw) => Some(normalize_plate(raw)).filter(|p| !p.is_empty()),
            PlateReading::NoPlate => None,
        };

        if plate.is_none() {
            tracing::info!(channel = %channel, image = %image_ref, "No plate in frame");
        }

        self.correlator
            .record_sample(channel, plate.clone(), image_ref.clone());

        let message = PlateCapturedMessage {
            plate: plate.clone(),
            image_ref: image_ref.public_path(),
        };
        let event = match channel {
            CaptureChannel::Entry => HubMessage::EntryCaptured(message),
            CaptureChannel::Exit => HubMessage::ExitImageProcessed(message),
        };
        self.realtime.broadcast(event).await;

        Ok(CaptureResult {
            channel,
            plate,
            image_path: image_ref.public_path(),
            image_ref,
        })
    }

    /// Run one RFID scan in the mode current at scan time
    pub async fn handle_rfid_scan(&self, raw_uid: &str) -> AccessDecision {
        let mode = self.mode().await;
        self.engine.handle_scan(mode, raw_uid).await
    }

    /// Ingest a sensor-unit report; its address is learned even if the
    /// report itself is rejected
    pub async fn report_sensor_slots(
        &self,
        states: &str,
        total: usize,
        source_address: Option<String>,
    ) -> Result<SlotSnapshot> {
        if let Some(address) = source_address.as_deref() {
            self.gate.learn_address(address).await;
        }
        self.sensor
            .ingest(parse_states(states), total, source_address)
            .await
    }

    pub async fn manual_open_gate(&self) -> Result<GateAck> {
        self.gate.open_gate().await
    }

    pub async fn status_snapshot(&self) -> Result<StatusSnapshot> {
        let capacity = self.engine.policy().capacity;
        Ok(StatusSnapshot {
            mode: self.mode().await,
            ledger: self.ledger.occupancy(capacity).await?,
            sensor: self.sensor.snapshot().await,
            cars: self.ledger.active_records().await?,
            gate_address: self.gate.known_address().await,
            subscribers: self.realtime.subscriber_count(),
        })
    }

    /// Delete all records and reset transient state
    pub async fn clear_all(&self) -> Result<ClearSummary> {
        let deleted_count = self.ledger.clear_records().await?;
        self.correlator.reset();
        let sensor = self.sensor.reset().await;

        let message = format!("Cleared all {} parking records.", deleted_count);
        self.realtime
            .broadcast(HubMessage::StateCleared(StateClearedMessage {
                reason: "parking_cleared".to_string(),
                deleted_count,
                message: message.clone(),
            }))
            .await;
        self.realtime
            .broadcast(HubMessage::SensorSlotUpdate(sensor.to_message()))
            .await;

        Ok(ClearSummary {
            deleted_count,
            message,
        })
    }
}
