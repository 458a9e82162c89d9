//! PlateCaptureCorrelator - Capture/Decision Rendezvous
//!
//! ## Responsibilities
//!
//! - Hold the single current recognition sample per camera channel
//! - Let a decision flow wait (cooperatively) for a sample captured at or
//!   after the flow started
//! - Clear a channel once a flow has used its sample
//!
//! A new sample always overwrites the previous one (last-write-wins, no
//! queue). Freshness is decided by timestamp only.

mod plate_text;
mod types;

pub use plate_text::{is_no_plate, normalize_plate, normalize_uid, NO_PLATE_SENTINEL};
pub use types::*;

use crate::image_store::ImageRef;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// PlateCaptureCorrelator instance
pub struct PlateCaptureCorrelator {
    entry: watch::Sender<Option<PlateCaptureSample>>,
    exit: watch::Sender<Option<PlateCaptureSample>>,
}

impl PlateCaptureCorrelator {
    /// Create a correlator with both slots empty
    pub fn new() -> Self {
        let (entry, _) = watch::channel(None);
        let (exit, _) = watch::channel(None);
        Self { entry, exit }
    }

    fn slot(&self, channel: CaptureChannel) -> &watch::Sender<Option<PlateCaptureSample>> {
        match channel {
            CaptureChannel::Entry => &self.entry,
            CaptureChannel::Exit => &self.exit,
        }
    }

    /// Store a sample as the sole current one for `channel`, stamped now
    pub fn record_sample(
        &self,
        channel: CaptureChannel,
        plate: Option<String>,
        image_ref: ImageRef,
    ) -> PlateCaptureSample {
        self.record_sample_at(channel, plate, image_ref, Utc::now())
    }

    /// Store a sample with an explicit capture timestamp
    pub fn record_sample_at(
        &self,
        channel: CaptureChannel,
        plate: Option<String>,
        image_ref: ImageRef,
        captured_at: DateTime<Utc>,
    ) -> PlateCaptureSample {
        let sample = PlateCaptureSample {
            channel,
            plate,
            captured_at,
            image_ref,
        };

        let replaced = self.slot(channel).send_replace(Some(sample.clone()));
        if replaced.is_some() {
            tracing::debug!(channel = %channel, "Overwrote unconsumed plate sample");
        }

        tracing::debug!(
            channel = %channel,
            plate = ?sample.plate,
            captured_at = %sample.captured_at,
            "Plate sample recorded"
        );

        sample
    }

    /// Wait until a sample captured at or after `since` is present
    ///
    /// Returns `None` once `max_wait` has elapsed. The wait wakes on every
    /// new sample and at least every `poll_interval`; it only suspends the
    /// calling task.
    pub async fn await_fresh_sample(
        &self,
        channel: CaptureChannel,
        since: DateTime<Utc>,
        max_wait: Duration,
        poll_interval: Duration,
    ) -> Option<PlateCaptureSample> {
        let mut rx = self.slot(channel).subscribe();
        let deadline = Instant::now() + max_wait;

        loop {
            let current: Option<PlateCaptureSample> = rx.borrow_and_update().clone();
            if let Some(sample) = current.filter(|s| s.captured_at >= since) {
                return Some(sample);
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::debug!(channel = %channel, "No fresh plate sample before deadline");
                return None;
            }

            let step = poll_interval.min(deadline - now);
            let _ = tokio::time::timeout(step, rx.changed()).await;
        }
    }

    /// Clear the slot for `channel`
    pub fn consume_sample(&self, channel: CaptureChannel) {
        self.slot(channel).send_replace(None);
    }

    /// Current sample for `channel`, fresh or not
    pub fn current_sample(&self, channel: CaptureChannel) -> Option<PlateCaptureSample> {
        self.slot(channel).borrow().clone()
    }

    /// Clear both slots
    pub fn reset(&self) {
        self.consume_sample(CaptureChannel::Entry);
        self.consume_sample(CaptureChannel::Exit);
    }
}

impl Default for PlateCaptureCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn at_millis(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    const SHORT: Duration = Duration::from_millis(60);
    const POLL: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn test_stale_sample_is_ignored() {
        let correlator = PlateCaptureCorrelator::new();
        correlator.record_sample_at(
            CaptureChannel::Entry,
            Some("51F12345".to_string()),
            ImageRef::new("old.jpg"),
            at_millis(100),
        );

        let got = correlator
            .await_fresh_sample(CaptureChannel::Entry, at_millis(101), SHORT, POLL)
            .await;
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_fresh_sample_is_accepted() {
        let correlator = PlateCaptureCorrelator::new();
        correlator.record_sample_at(
            CaptureChannel::Entry,
            Some("51F12345".to_string()),
            ImageRef::new("new.jpg"),
            at_millis(102),
        );

        let got = correlator
            .await_fresh_sample(CaptureChannel::Entry, at_millis(101), SHORT, POLL)
            .await
            .expect("fresh sample");
        assert_eq!(got.plate.as_deref(), Some("51F12345"));
        assert_eq!(got.image_ref.as_str(), "new.jpg");
    }

    #[tokio::test]
    async fn test_waiter_wakes_on_late_sample() {
        let correlator = Arc::new(PlateCaptureCorrelator::new());
        let since = Utc::now();

        let producer = correlator.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            producer.record_sample(
                CaptureChannel::Exit,
                Some("30A99999".to_string()),
                ImageRef::new("exit.jpg"),
            );
        });

        let got = correlator
            .await_fresh_sample(CaptureChannel::Exit, since, Duration::from_secs(2), POLL)
            .await;
        assert_eq!(got.and_then(|s| s.plate), Some("30A99999".to_string()));
    }

    #[tokio::test]
    async fn test_channels_are_independent() {
        let correlator = PlateCaptureCorrelator::new();
        let since = Utc::now();
        correlator.record_sample(CaptureChannel::Exit, Some("X".to_string()), ImageRef::new("x.jpg"));

        let got = correlator
            .await_fresh_sample(CaptureChannel::Entry, since, SHORT, POLL)
            .await;
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_last_write_wins_and_consume_clears() {
        let correlator = PlateCaptureCorrelator::new();
        correlator.record_sample(CaptureChannel::Entry, Some("A".to_string()), ImageRef::new("a.jpg"));
        correlator.record_sample(CaptureChannel::Entry, Some("B".to_string()), ImageRef::new("b.jpg"));

        let current = correlator.current_sample(CaptureChannel::Entry).unwrap();
        assert_eq!(current.plate.as_deref(), Some("B"));

        correlator.consume_sample(CaptureChannel::Entry);
        assert!(correlator.current_sample(CaptureChannel::Entry).is_none());
    }

    #[tokio::test]
    async fn test_reset_clears_both_slots() {
        let correlator = PlateCaptureCorrelator::new();
        correlator.record_sample(CaptureChannel::Entry, None, ImageRef::new("a.jpg"));
        correlator.record_sample(CaptureChannel::Exit, None, ImageRef::new("b.jpg"));

        correlator.reset();
        assert!(correlator.current_sample(CaptureChannel::Entry).is_none());
        assert!(correlator.current_sample(CaptureChannel::Exit).is_none());
    }
}
