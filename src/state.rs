//! Application state
//!
//! Holds all shared components and state

use crate::access_engine::{AccessDecisionEngine, AccessPolicy};
use crate::gate_relay::{GateCommandRelay, GateController};
use crate::image_store::ImageStore;
use crate::parking_ledger::{FeePolicy, ParkingLedger, RecordStore};
use crate::parking_service::ParkingService;
use crate::plate_capture::PlateCaptureCorrelator;
use crate::plate_recognizer::PlateRecognizer;
use crate::realtime_hub::RealtimeHub;
use crate::slot_sensor::SensorSlotTracker;
use crate::vehicle_directory::VehicleDirectory;
use chrono_tz::Tz;
use sqlx::MySqlPool;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// MySQL URL; in-memory stores when unset
    pub database_url: Option<String>,
    /// Plate recognition service base URL
    pub recognizer_url: String,
    pub host: String,
    pub port: u16,
    /// Where uploaded camera frames are stored
    pub upload_dir: PathBuf,
    /// Dashboard build served at `/`
    pub static_dir: Option<PathBuf>,
    pub capacity: i64,
    /// Fee per started hour
    pub unit_rate: i64,
    pub min_dwell_sec: u64,
    pub capture_wait_ms: u64,
    pub capture_poll_ms: u64,
    pub recognizer_timeout_sec: u64,
    pub gate_timeout_sec: u64,
    pub facility_tz: Tz,
}

impl AppConfig {
    /// Read from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            database_url: lookup("DATABASE_URL").filter(|v| !v.is_empty()),
            recognizer_url: lookup("RECOGNIZER_URL")
                .unwrap_or_else(|| "http://localhost:8000".to_string()),
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            upload_dir: lookup("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("uploads")),
            static_dir: lookup("STATIC_DIR").map(PathBuf::from),
            capacity: lookup("PARKING_CAPACITY")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(5),
            unit_rate: lookup("PARKING_UNIT_RATE")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(1000),
            min_dwell_sec: parsed("MIN_DWELL_SEC").unwrap_or(30),
            capture_wait_ms: parsed("CAPTURE_WAIT_MS").unwrap_or(8000),
            capture_poll_ms: parsed("CAPTURE_POLL_MS").unwrap_or(200),
            recognizer_timeout_sec: parsed("RECOGNIZER_TIMEOUT_SEC").unwrap_or(30),
            gate_timeout_sec: parsed("GATE_TIMEOUT_SEC").unwrap_or(10),
            facility_tz: lookup("FACILITY_TZ")
                .and_then(|tz| Tz::from_str(tz.trim()).ok())
                .unwrap_or(chrono_tz::Asia::Ho_Chi_Minh),
        }
    }

    pub fn access_policy(&self) -> AccessPolicy {
        AccessPolicy {
            capacity: self.capacity,
            min_dwell: Duration::from_secs(self.min_dwell_sec),
            capture_wait: Duration::from_millis(self.capture_wait_ms),
            poll_interval: Duration::from_millis(self.capture_poll_ms.max(1)),
            facility_tz: self.facility_tz,
        }
    }

    pub fn fee_policy(&self) -> FeePolicy {
        FeePolicy {
            unit_rate: self.unit_rate,
        }
    }

    pub fn recognizer_timeout(&self) -> Duration {
        Duration::from_secs(self.recognizer_timeout_sec)
    }

    pub fn gate_timeout(&self) -> Duration {
        Duration::from_secs(self.gate_timeout_sec)
    }
}

/// External collaborators the core talks to
pub struct Collaborators {
    pub records: Arc<dyn RecordStore>,
    pub directory: Arc<dyn VehicleDirectory>,
    pub recognizer: Arc<dyn PlateRecognizer>,
    pub gate: Arc<dyn GateController>,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database pool (absent when running on in-memory stores)
    pub pool: Option<MySqlPool>,
    /// Application config
    pub config: AppConfig,
    /// ParkingService (all parking operations)
    pub service: Arc<ParkingService>,
    /// ImageStore (uploaded frames)
    pub images: Arc<ImageStore>,
    /// RealtimeHub (WebSocket)
    pub realtime: Arc<RealtimeHub>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire every component around the given collaborators
    pub fn assemble(
        config: AppConfig,
        pool: Option<MySqlPool>,
        images: Arc<ImageStore>,
        collaborators: Collaborators,
    ) -> Self {
        let realtime = Arc::new(RealtimeHub::new());
        let correlator = Arc::new(PlateCaptureCorrelator::new());
        let ledger = Arc::new(ParkingLedger::new(
            collaborators.records,
            config.fee_policy(),
        ));
        let engine = Arc::new(AccessDecisionEngine::new(
            ledger.clone(),
            collaborators.directory,
            correlator.clone(),
            realtime.clone(),
            config.access_policy(),
        ));
        let sensor = Arc::new(SensorSlotTracker::new(
            config.capacity.max(0) as usize,
            realtime.clone(),
        ));
        let gate = Arc::new(GateCommandRelay::new(
            collaborators.gate,
            realtime.clone(),
        ));
        let service = Arc::new(ParkingService::new(
            engine,
            ledger,
            correlator,
            collaborators.recognizer,
            sensor,
            gate,
            realtime.clone(),
        ));

        Self {
            pool,
            config,
            service,
            images,
            realtime,
            started_at: Instant::now(),
        }
    }
}
