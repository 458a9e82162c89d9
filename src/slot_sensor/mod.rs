//! Slot Sensor Tracker
//!
//! Caches the latest per-slot occupancy report from the gate's sensor unit.
//! Each report replaces the cached state wholesale. This gauge is kept apart
//! from the ledger's derived count; the two may disagree.

use crate::error::{Error, Result};
use crate::realtime_hub::{HubMessage, RealtimeHub, SensorSlotUpdateMessage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Latest hardware report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotState {
    /// `true` = occupied
    pub individual_states: Vec<bool>,
    pub total: usize,
}

impl SlotState {
    /// All slots free
    pub fn empty(total: usize) -> Self {
        Self {
            individual_states: vec![false; total],
            total,
        }
    }

    pub fn occupied(&self) -> usize {
        self.individual_states.iter().filter(|s| **s).count()
    }

    pub fn available(&self) -> usize {
        self.total.saturating_sub(self.occupied())
    }
}

/// Cached state plus derived counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotSnapshot {
    pub individual_states: Vec<bool>,
    pub total: usize,
    pub occupied: usize,
    pub available: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_at: Option<DateTime<Utc>>,
}

impl SlotSnapshot {
    pub fn to_message(&self) -> SensorSlotUpdateMessage {
        SensorSlotUpdateMessage {
            individual_states: self.individual_states.clone(),
            total: self.total,
            occupied: self.occupied,
            available: self.available,
        }
    }
}

#[derive(Debug, Clone)]
struct TrackerEntry {
    state: SlotState,
    source_address: Option<String>,
    reported_at: Option<DateTime<Utc>>,
}

/// Parse the sensor unit's state string: `'1'` occupied, anything else free
pub fn parse_states(states: &str) -> Vec<bool> {
    states.chars().map(|c| c == '1').collect()
}

/// SensorSlotTracker instance
pub struct SensorSlotTracker {
    entry: RwLock<TrackerEntry>,
    default_total: usize,
    realtime: Arc<RealtimeHub>,
}

impl SensorSlotTracker {
    /// Create with an all-free state of `default_total` slots
    pub fn new(default_total: usize, realtime: Arc<RealtimeHub>) -> Self {
        Self {
            entry: RwLock::new(TrackerEntry {
                state: SlotState::empty(default_total),
                source_address: None,
                reported_at: None,
            }),
            default_total,
            realtime,
        }
    }

    /// Ingest one hardware report
    ///
    /// Rejected when the number of states differs from `total`.
    pub async fn ingest(
        &self,
        individual_states: Vec<bool>,
        total: usize,
        source_address: Option<String>,
    ) -> Result<SlotSnapshot> {
        if individual_states.len() != total {
            return Err(Error::Validation(format!(
                "Slot state count {} does not match total {}",
                individual_states.len(),
                total
            )));
        }

        let snapshot = {
            let mut entry = self.entry.write().await;
            *entry = TrackerEntry {
                state: SlotState {
                    individual_states,
                    total,
                },
                source_address,
                reported_at: Some(Utc::now()),
            };
            Self::snapshot_of(&entry)
        };

        tracing::info!(
            total = snapshot.total,
            occupied = snapshot.occupied,
            available = snapshot.available,
            source = ?snapshot.source_address,
            "Sensor slot report ingested"
        );

        self.realtime
            .broadcast(HubMessage::SensorSlotUpdate(snapshot.to_message()))
            .await;

        Ok(snapshot)
    }

    /// Current cached state
    pub async fn snapshot(&self) -> SlotSnapshot {
        Self::snapshot_of(&*self.entry.read().await)
    }

    /// Restore the all-free default state (no broadcast)
    pub async fn reset(&self) -> SlotSnapshot {
        let mut entry = self.entry.write().await;
        *entry = TrackerEntry {
            state: SlotState::empty(self.default_total),
            source_address: None,
            reported_at: None,
        };
        Self::snapshot_of(&entry)
    }

    fn snapshot_of(entry: &TrackerEntry) -> SlotSnapshot {
        SlotSnapshot {
            individual_states: entry.state.individual_states.clone(),
            total: entry.state.total,
            occupied: entry.state.occupied(),
            available: entry.state.available(),
            source_address: entry.source_address.clone(),
            reported_at: entry.reported_at,
        }
    }
}
