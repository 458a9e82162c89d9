//! VehicleDirectory - RFID Authorization Lookup
//!
//! Read-only reference data mapping a badge UID to the plate it may enter
//! with. Backed by the `cars` table in production.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Authorized badge / plate pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct VehicleAuthorization {
    pub uid: String,
    pub authorized_plate: String,
}

/// Directory lookup seam
#[async_trait]
pub trait VehicleDirectory: Send + Sync {
    /// `uid` is already normalized
    async fn find_by_uid(&self, uid: &str) -> Result<Option<VehicleAuthorization>>;
}

/// In-memory directory
#[derive(Default)]
pub struct InMemoryVehicleDirectory {
    entries: RwLock<HashMap<String, VehicleAuthorization>>,
}

impl InMemoryVehicleDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(uid, plate)` pairs
    pub fn with_entries<I, U, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = (U, P)>,
        U: Into<String>,
        P: Into<String>,
    {
        let map = entries
            .into_iter()
            .map(|(uid, plate)| {
                let uid = uid.into();
                let auth = VehicleAuthorization {
                    uid: uid.clone(),
                    authorized_plate: plate.into(),
                };
                (uid, auth)
            })
            .collect();
        Self {
            entries: RwLock::new(map),
        }
    }

    pub async fn insert(&self, uid: &str, authorized_plate: &str) {
        let mut entries = self.entries.write().await;
        entries.insert(
            uid.to_string(),
            VehicleAuthorization {
                uid: uid.to_string(),
                authorized_plate: authorized_plate.to_string(),
            },
        );
    }
}

#[async_trait]
impl VehicleDirectory for InMemoryVehicleDirectory {
    async fn find_by_uid(&self, uid: &str) -> Result<Option<VehicleAuthorization>> {
        Ok(self.entries.read().await.get(uid).cloned())
    }
}

/// MySQL-backed directory (`cars` table)
#[derive(Clone)]
pub struct MySqlVehicleDirectory {
    pool: MySqlPool,
}

impl MySqlVehicleDirectory {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VehicleDirectory for MySqlVehicleDirectory {
    async fn find_by_uid(&self, uid: &str) -> Result<Option<VehicleAuthorization>> {
        let auth = sqlx::query_as::<_, VehicleAuthorization>(
            "SELECT uid, authorized_plate FROM cars WHERE uid = ?",
        )
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(auth)
    }
}
