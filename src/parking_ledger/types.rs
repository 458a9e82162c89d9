//! ParkingLedger data types

use crate::error::{Error, Result};
use crate::image_store::ImageRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Record status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParkingStatus {
    /// Vehicle inside; `exit_time` is `None`
    In,
    /// Vehicle left; `exit_time` is set
    Out,
}

impl ParkingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParkingStatus::In => "in",
            ParkingStatus::Out => "out",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "in" => Ok(ParkingStatus::In),
            "out" => Ok(ParkingStatus::Out),
            other => Err(Error::Database(format!("Unknown parking status '{}'", other))),
        }
    }
}

/// Captured images attached to a record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordImages {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<ImageRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit: Option<ImageRef>,
}

/// One parking visit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParkingRecord {
    pub id: i64,
    pub rfid_tag: String,
    pub license_plate: String,
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
    pub status: ParkingStatus,
    pub duration_minutes: Option<i64>,
    pub fee: Option<i64>,
    pub images: RecordImages,
}

impl ParkingRecord {
    pub fn is_active(&self) -> bool {
        self.status == ParkingStatus::In
    }
}

/// Insert payload for a new entry
#[derive(Debug, Clone)]
pub struct NewParkingRecord {
    pub rfid_tag: String,
    pub license_plate: String,
    pub entry_time: DateTime<Utc>,
    pub entry_image: Option<ImageRef>,
}

/// Record query filter; unset fields match anything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub rfid_tag: Option<String>,
    pub license_plate: Option<String>,
    pub status: Option<ParkingStatus>,
}

impl RecordFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_tag(rfid_tag: &str) -> Self {
        Self {
            rfid_tag: Some(rfid_tag.to_string()),
            ..Self::default()
        }
    }

    pub fn by_plate(license_plate: &str) -> Self {
        Self {
            license_plate: Some(license_plate.to_string()),
            ..Self::default()
        }
    }

    pub fn by_status(status: ParkingStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: ParkingStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, record: &ParkingRecord) -> bool {
        self.rfid_tag.as_ref().map_or(true, |t| *t == record.rfid_tag)
            && self
                .license_plate
                .as_ref()
                .map_or(true, |p| *p == record.license_plate)
            && self.status.map_or(true, |s| s == record.status)
    }
}

/// Fee schedule: every started hour costs `unit_rate`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeePolicy {
    pub unit_rate: i64,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self { unit_rate: 1000 }
    }
}

/// Ledger-derived occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupancy {
    pub total: i64,
    pub occupied: i64,
    pub available: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tag: &str, plate: &str, status: ParkingStatus) -> ParkingRecord {
        ParkingRecord {
            id: 1,
            rfid_tag: tag.to_string(),
            license_plate: plate.to_string(),
            entry_time: Utc::now(),
            exit_time: None,
            status,
            duration_minutes: None,
            fee: None,
            images: RecordImages::default(),
        }
    }

    #[test]
    fn test_filter_matches() {
        let r = record("TAG1", "51F12345", ParkingStatus::In);
        assert!(RecordFilter::all().matches(&r));
        assert!(RecordFilter::by_tag("TAG1").with_status(ParkingStatus::In).matches(&r));
        assert!(!RecordFilter::by_tag("TAG1").with_status(ParkingStatus::Out).matches(&r));
        assert!(!RecordFilter::by_plate("30A99999").matches(&r));
    }

    #[test]
    fn test_status_round_trip_strings() {
        assert_eq!(ParkingStatus::parse("in").unwrap(), ParkingStatus::In);
        assert_eq!(ParkingStatus::Out.as_str(), "out");
        assert!(ParkingStatus::parse("gone").is_err());
    }
}
