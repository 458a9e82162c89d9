//! ParkingLedger - Occupancy Bookkeeping
//!
//! ## Responsibilities
//!
//! - Derived occupancy count (records with status `in`)
//! - Fee and duration arithmetic
//! - Record lifecycle: open on entry, close on exit, administrative clear
//!
//! The ledger never checks for duplicates itself; the access engine owns
//! the one-active-record-per-tag/plate invariant.

mod repository;
mod types;

pub use repository::{InMemoryRecordStore, MySqlRecordStore, RecordStore};
pub use types::*;

use crate::error::Result;
use crate::image_store::ImageRef;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Available slots for a given capacity; never negative
pub fn available_slots(capacity: i64, occupied: i64) -> i64 {
    (capacity - occupied).max(0)
}

/// Render minutes as `HH:MM:SS`; `--:--:--` when unknown
pub fn format_duration(duration_minutes: Option<i64>) -> String {
    let Some(minutes) = duration_minutes else {
        return "--:--:--".to_string();
    };
    let total_seconds = minutes.max(0) * 60;
    format!(
        "{:02}:{:02}:{:02}",
        total_seconds / 3600,
        (total_seconds % 3600) / 60,
        total_seconds % 60
    )
}

/// Whole minutes between entry and exit, rounded to nearest
pub fn duration_minutes(entry_time: DateTime<Utc>, exit_time: DateTime<Utc>) -> i64 {
    let millis = (exit_time - entry_time).num_milliseconds().max(0);
    (millis as f64 / 60_000.0).round() as i64
}

/// ParkingLedger instance
pub struct ParkingLedger {
    store: Arc<dyn RecordStore>,
    fee_policy: FeePolicy,
}

impl ParkingLedger {
    pub fn new(store: Arc<dyn RecordStore>, fee_policy: FeePolicy) -> Self {
        Self { store, fee_policy }
    }

    /// `ceil(minutes / 60) * unit_rate`
    pub fn compute_fee(&self, duration_minutes: i64) -> i64 {
        let minutes = duration_minutes.max(0);
        let hours = (minutes + 59) / 60;
        hours * self.fee_policy.unit_rate
    }

    /// `max(0, capacity - count(status == in))`
    pub async fn count_available(&self, capacity: i64) -> Result<i64> {
        let occupied = self.count_occupied().await?;
        Ok(available_slots(capacity, occupied))
    }

    pub async fn count_occupied(&self) -> Result<i64> {
        self.store
            .count(&RecordFilter::by_status(ParkingStatus::In))
            .await
    }

    /// Ledger gauge for status reporting
    pub async fn occupancy(&self, capacity: i64) -> Result<Occupancy> {
        let occupied = self.count_occupied().await?;
        Ok(Occupancy {
            total: capacity,
            occupied,
            available: available_slots(capacity, occupied),
        })
    }

    /// Records currently inside, newest entry first
    pub async fn active_records(&self) -> Result<Vec<ParkingRecord>> {
        self.store
            .find(&RecordFilter::by_status(ParkingStatus::In))
            .await
    }

    /// Most recent record for a tag, whatever its status
    pub async fn latest_for_tag(&self, rfid_tag: &str) -> Result<Option<ParkingRecord>> {
        self.store.find_latest(&RecordFilter::by_tag(rfid_tag)).await
    }

    /// Most recent record for a plate, whatever its status
    pub async fn latest_for_plate(&self, license_plate: &str) -> Result<Option<ParkingRecord>> {
        self.store
            .find_latest(&RecordFilter::by_plate(license_plate))
            .await
    }

    /// Most recent `in` record for a tag
    pub async fn active_for_tag(&self, rfid_tag: &str) -> Result<Option<ParkingRecord>> {
        self.store
            .find_latest(&RecordFilter::by_tag(rfid_tag).with_status(ParkingStatus::In))
            .await
    }

    /// Open a new `in` record
    pub async fn open_entry(
        &self,
        rfid_tag: &str,
        license_plate: &str,
        entry_time: DateTime<Utc>,
        entry_image: Option<ImageRef>,
    ) -> Result<ParkingRecord> {
        let record = self
            .store
            .insert(NewParkingRecord {
                rfid_tag: rfid_tag.to_string(),
                license_plate: license_plate.to_string(),
                entry_time,
                entry_image,
            })
            .await?;

        tracing::info!(
            record_id = record.id,
            rfid_tag = %record.rfid_tag,
            license_plate = %record.license_plate,
            entry_time = %record.entry_time.to_rfc3339(),
            "Parking record opened"
        );

        Ok(record)
    }

    /// Close an `in` record: exit time, duration, fee, exit image
    pub async fn close_exit(
        &self,
        mut record: ParkingRecord,
        exit_time: DateTime<Utc>,
        exit_image: Option<ImageRef>,
    ) -> Result<ParkingRecord> {
        let minutes = duration_minutes(record.entry_time, exit_time);

        record.exit_time = Some(exit_time);
        record.status = ParkingStatus::Out;
        record.duration_minutes = Some(minutes);
        record.fee = Some(self.compute_fee(minutes));
        if exit_image.is_some() {
            record.images.exit = exit_image;
        }

        self.store.update(&record).await?;

        tracing::info!(
            record_id = record.id,
            rfid_tag = %record.rfid_tag,
            license_plate = %record.license_plate,
            duration_minutes = minutes,
            fee = ?record.fee,
            "Parking record closed"
        );

        Ok(record)
    }

    /// Delete every record
    pub async fn clear_records(&self) -> Result<u64> {
        let deleted = self.store.delete_all().await?;
        tracing::warn!(deleted = deleted, "All parking records cleared");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ledger() -> ParkingLedger {
        ParkingLedger::new(Arc::new(InMemoryRecordStore::new()), FeePolicy::default())
    }

    #[test]
    fn test_fee_rounds_up_to_started_hour() {
        let ledger = ledger();
        assert_eq!(ledger.compute_fee(95), 2000);
        assert_eq!(ledger.compute_fee(60), 1000);
        assert_eq!(ledger.compute_fee(61), 2000);
        assert_eq!(ledger.compute_fee(1), 1000);
        assert_eq!(ledger.compute_fee(0), 0);
    }

    #[test]
    fn test_fee_uses_unit_rate() {
        let ledger = ParkingLedger::new(
            Arc::new(InMemoryRecordStore::new()),
            FeePolicy { unit_rate: 5000 },
        );
        assert_eq!(ledger.compute_fee(125), 15000);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Some(95)), "01:35:00");
        assert_eq!(format_duration(Some(0)), "00:00:00");
        assert_eq!(format_duration(Some(6000)), "100:00:00");
        assert_eq!(format_duration(None), "--:--:--");
    }

    #[test]
    fn test_available_slots_never_negative() {
        assert_eq!(available_slots(5, 6), 0);
        assert_eq!(available_slots(5, 2), 3);
    }

    #[test]
    fn test_duration_minutes_rounds_to_nearest() {
        let entry = Utc::now();
        assert_eq!(duration_minutes(entry, entry + Duration::seconds(89)), 1);
        assert_eq!(duration_minutes(entry, entry + Duration::seconds(90)), 2);
        assert_eq!(duration_minutes(entry, entry + Duration::minutes(95)), 95);
    }

    #[tokio::test]
    async fn test_count_available_clamps_when_overfull() {
        let ledger = ledger();
        for n in 0..6 {
            ledger
                .open_entry(&format!("T{}", n), &format!("P{}", n), Utc::now(), None)
                .await
                .unwrap();
        }
        assert_eq!(ledger.count_available(5).await.unwrap(), 0);

        let occupancy = ledger.occupancy(5).await.unwrap();
        assert_eq!(occupancy.occupied, 6);
        assert_eq!(occupancy.available, 0);
    }

    #[tokio::test]
    async fn test_close_exit_sets_fee_and_status() {
        let ledger = ledger();
        let entry = Utc::now() - Duration::minutes(95);
        let record = ledger
            .open_entry("T1", "51F12345", entry, Some(ImageRef::new("in.jpg")))
            .await
            .unwrap();

        let closed = ledger
            .close_exit(record, entry + Duration::minutes(95), Some(ImageRef::new("out.jpg")))
            .await
            .unwrap();

        assert_eq!(closed.status, ParkingStatus::Out);
        assert_eq!(closed.duration_minutes, Some(95));
        assert_eq!(closed.fee, Some(2000));
        assert_eq!(closed.images.entry, Some(ImageRef::new("in.jpg")));
        assert_eq!(closed.images.exit, Some(ImageRef::new("out.jpg")));
        assert!(ledger.active_for_tag("T1").await.unwrap().is_none());
        assert_eq!(ledger.latest_for_tag("T1").await.unwrap().unwrap().id, closed.id);
    }
}
