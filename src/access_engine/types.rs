//! Access decision types

use crate::error::{Error, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Global reader toggle: which flow an RFID scan runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReaderMode {
    Entry,
    Exit,
}

impl ReaderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReaderMode::Entry => "entry",
            ReaderMode::Exit => "exit",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entry" => Ok(ReaderMode::Entry),
            "exit" => Ok(ReaderMode::Exit),
            other => Err(Error::Validation(format!(
                "Invalid reader mode '{}': must be \"entry\" or \"exit\"",
                other
            ))),
        }
    }
}

impl fmt::Display for ReaderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunables for the decision flows
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    pub capacity: i64,
    /// Minimum time parked before an exit is honored
    pub min_dwell: Duration,
    /// Ceiling on the wait for a fresh plate sample
    pub capture_wait: Duration,
    pub poll_interval: Duration,
    /// Zone used when showing times to drivers
    pub facility_tz: Tz,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            capacity: 5,
            min_dwell: Duration::from_secs(30),
            capture_wait: Duration::from_millis(8000),
            poll_interval: Duration::from_millis(200),
            facility_tz: chrono_tz::Asia::Ho_Chi_Minh,
        }
    }
}

/// Why a scan was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    MissingUid,
    Full,
    NotAuthorized,
    AlreadyIn,
    AlreadyInByPlate,
    NoPlate,
    PlateMismatch,
    NotFound,
    TooSoon,
}

impl DenyReason {
    /// Error taxonomy class of the denial
    pub fn into_error(self, message: String) -> Error {
        match self {
            DenyReason::MissingUid => Error::Validation(message),
            DenyReason::NotAuthorized | DenyReason::NotFound => Error::NotFound(message),
            DenyReason::Full
            | DenyReason::AlreadyIn
            | DenyReason::AlreadyInByPlate
            | DenyReason::TooSoon => Error::Conflict(message),
            DenyReason::NoPlate => Error::RecognitionTimeout(message),
            DenyReason::PlateMismatch => Error::RecognitionMismatch(message),
        }
    }

    pub fn error_code(&self) -> &'static str {
        self.into_error(String::new()).error_code()
    }
}

/// Terminal state of a decision flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    Granted,
    Denied,
    Error,
}

/// Result handed back to the RFID reader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessDecision {
    pub open_gate: bool,
    pub outcome: DecisionOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub mode: ReaderMode,
    pub rfid_tag: String,
    pub message: String,
    /// Ledger-derived availability; -1 when it could not be counted
    pub slots: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_plate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_seconds: Option<i64>,
}

impl AccessDecision {
    pub fn grant(mode: ReaderMode, rfid_tag: &str, message: String, slots: i64) -> Self {
        Self {
            open_gate: true,
            outcome: DecisionOutcome::Granted,
            reason: None,
            error_code: None,
            mode,
            rfid_tag: rfid_tag.to_string(),
            message,
            slots,
            license_plate: None,
            fee: None,
            duration: None,
            remaining_seconds: None,
        }
    }

    pub fn deny(
        mode: ReaderMode,
        rfid_tag: &str,
        reason: DenyReason,
        message: String,
        slots: i64,
    ) -> Self {
        Self {
            open_gate: false,
            outcome: DecisionOutcome::Denied,
            reason: Some(reason),
            error_code: Some(reason.error_code().to_string()),
            mode,
            rfid_tag: rfid_tag.to_string(),
            message,
            slots,
            license_plate: None,
            fee: None,
            duration: None,
            remaining_seconds: None,
        }
    }

    /// Flow aborted by an unexpected failure
    pub fn error(mode: ReaderMode, rfid_tag: &str, error: &Error, slots: i64) -> Self {
        let internal = Error::Internal(format!("processing RFID scan failed: {}", error));
        Self {
            open_gate: false,
            outcome: DecisionOutcome::Error,
            reason: None,
            error_code: Some(internal.error_code().to_string()),
            mode,
            rfid_tag: rfid_tag.to_string(),
            message: internal.to_string(),
            slots,
            license_plate: None,
            fee: None,
            duration: None,
            remaining_seconds: None,
        }
    }

    pub fn with_plate(mut self, plate: impl Into<String>) -> Self {
        self.license_plate = Some(plate.into());
        self
    }

    pub fn is_granted(&self) -> bool {
        self.outcome == DecisionOutcome::Granted
    }

    pub fn is_denied_for(&self, reason: DenyReason) -> bool {
        self.reason == Some(reason)
    }
}
