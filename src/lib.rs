//! ParkGate Server Library
//!
//! RFID + license-plate access control for a small parking facility.
//!
//! ## Architecture
//!
//! 1. PlateCapture - Rendezvous between camera uploads and waiting scans
//! 2. RealtimeHub - Event fan-out to dashboards
//! 3. ParkingLedger - Occupancy, fee and duration bookkeeping
//! 4. SlotSensor - Hardware per-slot occupancy cache
//! 5. GateRelay - Manual gate commands to the learned controller
//! 6. AccessEngine - Entry/exit decisions per RFID scan
//! 7. ParkingService - Facade over the above for the HTTP layer
//! 8. WebAPI - REST + WebSocket endpoints
//!
//! ## Collaborators
//!
//! - VehicleDirectory - Badge to authorized plate lookup
//! - PlateRecognizer - Remote plate recognition service
//! - ImageStore - Uploaded frame storage

pub mod access_engine;
pub mod error;
pub mod gate_relay;
pub mod image_store;
pub mod models;
pub mod parking_ledger;
pub mod parking_service;
pub mod plate_capture;
pub mod plate_recognizer;
pub mod realtime_hub;
pub mod slot_sensor;
pub mod state;
pub mod vehicle_directory;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
