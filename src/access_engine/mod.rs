//! AccessDecisionEngine - RFID Scan Decisions
//!
//! ## Responsibilities
//!
//! - Entry flow: capacity, authorization, duplicate checks, plate verification
//! - Exit flow: active record lookup, dwell check, plate verification, fee
//! - Trigger the camera and wait (bounded) for a fresh plate sample
//! - Serialize check-then-commit per tag and per plate
//!
//! ## Flow
//!
//! ```text
//! scan ─► lock tag ─► checks ─► capture_triggered ─► await sample ─► consume
//!                                                         │
//!                               lock plate ◄──────────────┘
//!                                   │
//!                              plate checks ─► commit ─► decision
//! ```
//!
//! Every flow ends in a decision; only store failures produce the `error`
//! outcome, and even then a best-effort slot count is returned.

mod key_lock;
mod types;


pub use key_lock::{plate_key, tag_key, KeyGuard, KeyedLocks};
pub use types::*;

use crate::error::Result;
use crate::parking_ledger::{format_duration, ParkingLedger, ParkingRecord};
use crate::plate_capture::{
    normalize_plate, normalize_uid, CaptureChannel, PlateCaptureCorrelator, PlateCaptureSample,
};
use crate::realtime_hub::{
    CaptureTriggeredMessage, ExitConfirmedMessage, ExitMismatchMessage, ExitNoPlateMessage,
    HubMessage, RealtimeHub,
};
use crate::vehicle_directory::VehicleDirectory;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// AccessDecisionEngine instance
pub struct AccessDecisionEngine {
    ledger: Arc<ParkingLedger>,
    directory: Arc<dyn VehicleDirectory>,
    correlator: Arc<PlateCaptureCorrelator>,
    realtime: Arc<RealtimeHub>,
    policy: AccessPolicy,
    locks: KeyedLocks,
}

impl AccessDecisionEngine {
    pub fn new(
        ledger: Arc<ParkingLedger>,
        directory: Arc<dyn VehicleDirectory>,
        correlator: Arc<PlateCaptureCorrelator>,
        realtime: Arc<RealtimeHub>,
        policy: AccessPolicy,
    ) -> Self {
        Self {
            ledger,
            directory,
            correlator,
            realtime,
            policy,
            locks: KeyedLocks::new(),
        }
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Decide one RFID scan in the given mode
    pub async fn handle_scan(&self, mode: ReaderMode, raw_uid: &str) -> AccessDecision {
        let uid = normalize_uid(raw_uid);
        if uid.is_empty() {
            let slots = self.best_effort_slots().await;
            return AccessDecision::deny(
                mode,
                &uid,
                DenyReason::MissingUid,
                "Missing RFID UID.".to_string(),
                slots,
            );
        }

        tracing::info!(rfid_tag = %uid, mode = %mode, "RFID scan received");

        let result = match mode {
            ReaderMode::Entry => self.entry_flow(&uid).await,
            ReaderMode::Exit => self.exit_flow(&uid).await,
        };

        match result {
            Ok(decision) => {
                tracing::info!(
                    rfid_tag = %uid,
                    mode = %mode,
                    outcome = ?decision.outcome,
                    reason = ?decision.reason,
                    slots = decision.slots,
                    "Access decision"
                );
                decision
            }
            Err(e) => {
                tracing::error!(rfid_tag = %uid, mode = %mode, error = %e, "Access flow failed");
                let slots = self.best_effort_slots().await;
                AccessDecision::error(mode, &uid, &e, slots)
            }
        }
    }

    async fn entry_flow(&self, uid: &str) -> Result<AccessDecision> {
        let mode = ReaderMode::Entry;
        let _tag_guard = self.locks.lock(&tag_key(uid)).await;

        let available = self.available().await?;
        if available <= 0 {
            return Ok(AccessDecision::deny(
                mode,
                uid,
                DenyReason::Full,
                "Parking is full.".to_string(),
                0,
            ));
        }

        let Some(authorization) = self.directory.find_by_uid(uid).await? else {
            return Ok(AccessDecision::deny(
                mode,
                uid,
                DenyReason::NotAuthorized,
                "RFID card is not authorized to enter.".to_string(),
                available,
            ));
        };

        if let Some(inside) = self.ledger.latest_for_tag(uid).await?.filter(|r| r.is_active()) {
            return Ok(AccessDecision::deny(
                mode,
                uid,
                DenyReason::AlreadyIn,
                format!(
                    "Vehicle (RFID: {}) is already inside. Entered at: {}",
                    uid,
                    self.local_time(inside.entry_time)
                ),
                available,
            ));
        }

        let sample = self.capture_plate(CaptureChannel::Entry).await;
        let Some((raw_plate, image_ref)) = sample.as_ref().and_then(|s| {
            s.usable_plate()
                .map(|plate| (plate.to_string(), s.image_ref.clone()))
        }) else {
            tracing::warn!(rfid_tag = %uid, "No entry plate recognized in time");
            return Ok(AccessDecision::deny(
                mode,
                uid,
                DenyReason::NoPlate,
                "No license plate recognized at entry.".to_string(),
                available,
            ));
        };

        let recognized = normalize_plate(&raw_plate);
        let expected = normalize_plate(&authorization.authorized_plate);
        if recognized != expected {
            tracing::warn!(
                rfid_tag = %uid,
                recognized = %recognized,
                expected = %expected,
                "Entry plate mismatch"
            );
            return Ok(AccessDecision::deny(
                mode,
                uid,
                DenyReason::PlateMismatch,
                format!(
                    "Plate mismatch. Recognized: {}, expected: {}.",
                    recognized, authorization.authorized_plate
                ),
                available,
            )
            .with_plate(recognized));
        }

        let _plate_guard = self.locks.lock(&plate_key(&recognized)).await;

        if let Some(inside) = self
            .ledger
            .latest_for_plate(&recognized)
            .await?
            .filter(|r| r.is_active())
        {
            return Ok(AccessDecision::deny(
                mode,
                uid,
                DenyReason::AlreadyInByPlate,
                format!(
                    "Vehicle (plate: {}) is already inside. Entered at: {}",
                    recognized,
                    self.local_time(inside.entry_time)
                ),
                available,
            )
            .with_plate(recognized));
        }

        self.ledger
            .open_entry(uid, &recognized, Utc::now(), Some(image_ref))
            .await?;

        let slots = self.available().await?;
        Ok(AccessDecision::grant(
            mode,
            uid,
            format!("Entry granted. Opening gate. Vehicle: {}", recognized),
            slots,
        )
        .with_plate(recognized))
    }

    async fn exit_flow(&self, uid: &str) -> Result<AccessDecision> {
        let mode = ReaderMode::Exit;
        let _tag_guard = self.locks.lock(&tag_key(uid)).await;

        let Some(record) = self.ledger.active_for_tag(uid).await? else {
            let available = self.available().await?;
            return Ok(AccessDecision::deny(
                mode,
                uid,
                DenyReason::NotFound,
                "No vehicle with this RFID card is currently inside.".to_string(),
                available,
            ));
        };

        let expected = normalize_plate(&record.license_plate);
        let _plate_guard = self.locks.lock(&plate_key(&expected)).await;

        let elapsed_ms = (Utc::now() - record.entry_time).num_milliseconds();
        let min_dwell_ms = self.policy.min_dwell.as_millis() as i64;
        if elapsed_ms < min_dwell_ms {
            let remaining = (min_dwell_ms - elapsed_ms + 999) / 1000;
            let available = self.available().await?;
            let mut decision = AccessDecision::deny(
                mode,
                uid,
                DenyReason::TooSoon,
                format!(
                    "Vehicle just entered. Please wait {} seconds before exiting.",
                    remaining
                ),
                available,
            )
            .with_plate(record.license_plate.clone());
            decision.remaining_seconds = Some(remaining);
            return Ok(decision);
        }

        let sample = self.capture_plate(CaptureChannel::Exit).await;
        let available = self.available().await?;

        let Some((sample, raw_plate)) = sample.and_then(|s| {
            let plate = s.usable_plate()?.to_string();
            Some((s, plate))
        }) else {
            tracing::warn!(
                rfid_tag = %uid,
                expected = %record.license_plate,
                "No exit plate recognized in time"
            );
            self.realtime
                .broadcast(HubMessage::ExitNoPlate(ExitNoPlateMessage {
                    rfid_tag: uid.to_string(),
                    expected_plate: record.license_plate.clone(),
                    message: "No license plate recognized by the exit camera.".to_string(),
                }))
                .await;
            return Ok(AccessDecision::deny(
                mode,
                uid,
                DenyReason::NoPlate,
                "No license plate recognized at exit.".to_string(),
                available,
            )
            .with_plate(record.license_plate));
        };

        let recognized = normalize_plate(&raw_plate);
        if recognized != expected {
            tracing::warn!(
                rfid_tag = %uid,
                recognized = %recognized,
                expected = %expected,
                "Exit plate mismatch"
            );
            self.realtime
                .broadcast(HubMessage::ExitMismatch(ExitMismatchMessage {
                    rfid_tag: uid.to_string(),
                    expected_plate: record.license_plate.clone(),
                    recognized_plate: recognized.clone(),
                    image_ref: Some(sample.image_ref.public_path()),
                }))
                .await;
            return Ok(AccessDecision::deny(
                mode,
                uid,
                DenyReason::PlateMismatch,
                format!(
                    "Exit plate mismatch. Expected: {}, recognized: {}.",
                    record.license_plate, recognized
                ),
                available,
            )
            .with_plate(recognized));
        }

        self.commit_exit(uid, record, sample).await
    }

    async fn commit_exit(
        &self,
        uid: &str,
        record: ParkingRecord,
        sample: PlateCaptureSample,
    ) -> Result<AccessDecision> {
        let image_ref = sample.image_ref;
        let closed = self
            .ledger
            .close_exit(record, Utc::now(), Some(image_ref.clone()))
            .await?;

        let fee = closed.fee.unwrap_or_default();
        let duration = format_duration(closed.duration_minutes);
        let exit_time = closed.exit_time.unwrap_or_else(Utc::now);

        self.realtime
            .broadcast(HubMessage::ExitConfirmed(ExitConfirmedMessage {
                plate: closed.license_plate.clone(),
                rfid_tag: uid.to_string(),
                image_ref: Some(image_ref.public_path()),
                duration: duration.clone(),
                fee,
                exit_time: exit_time.to_rfc3339(),
            }))
            .await;

        let slots = self.available().await?;
        let mut decision = AccessDecision::grant(
            ReaderMode::Exit,
            uid,
            format!(
                "Vehicle {} matched. Exit granted. Fee: {} VND.",
                closed.license_plate, fee
            ),
            slots,
        )
        .with_plate(closed.license_plate);
        decision.fee = Some(fee);
        decision.duration = Some(duration);
        Ok(decision)
    }

    /// Trigger the camera, wait for a fresh sample, then clear the slot
    async fn capture_plate(&self, channel: CaptureChannel) -> Option<PlateCaptureSample> {
        let started_at = Utc::now();

        self.realtime
            .broadcast(HubMessage::CaptureTriggered(CaptureTriggeredMessage {
                channel,
                triggered_at: started_at.to_rfc3339(),
            }))
            .await;

        let sample = self
            .correlator
            .await_fresh_sample(
                channel,
                started_at,
                self.policy.capture_wait,
                self.policy.poll_interval,
            )
            .await;

        self.correlator.consume_sample(channel);
        sample
    }

    async fn available(&self) -> Result<i64> {
        self.ledger.count_available(self.policy.capacity).await
    }

    async fn best_effort_slots(&self) -> i64 {
        match self.available().await {
            Ok(slots) => slots,
            Err(e) => {
                tracing::error!(error = %e, "Could not count available slots");
                -1
            }
        }
    }

    fn local_time(&self, time: DateTime<Utc>) -> String {
        time.with_timezone(&self.policy.facility_tz)
            .format("%H:%M:%S %d/%m/%Y")
            .to_string()
    }
}
