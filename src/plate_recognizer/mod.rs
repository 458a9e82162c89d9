//! PlateRecognizer - License Plate Recognition Adapter
//!
//! ## Responsibilities
//!
//! - Send captured frames to the recognition service
//! - Parse the response into a plate reading or the no-plate sentinel
//! - Classify failures (unreachable / error response / malformed response)

use crate::error::Result;
use crate::image_store::{ImageRef, ImageStore};
use crate::plate_capture::is_no_plate;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a successful recognition call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlateReading {
    /// Raw plate text as returned by the service
    Plate(String),
    /// Service answered but found no plate
    NoPlate,
}

impl PlateReading {
    /// Interpret raw service text, mapping empty/sentinel to `NoPlate`
    pub fn from_raw(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(text) if !is_no_plate(text) => PlateReading::Plate(text.to_string()),
            _ => PlateReading::NoPlate,
        }
    }
}

/// Why a recognition call failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecognitionFailure {
    #[error("recognition service unreachable: {0}")]
    Unreachable(String),

    #[error("recognition service error: {status} - {body}")]
    ErrorResponse { status: u16, body: String },

    #[error("malformed recognition response: {0}")]
    MalformedResponse(String),

    #[error("image not readable: {0}")]
    ImageMissing(String),
}

/// Recognition seam
#[async_trait]
pub trait PlateRecognizer: Send + Sync {
    async fn recognize(
        &self,
        image_ref: &ImageRef,
    ) -> std::result::Result<PlateReading, RecognitionFailure>;
}

/// Response body of `POST /recognize_plate/`
#[derive(Debug, Clone, Deserialize)]
pub struct RecognizeResponse {
    #[serde(default)]
    pub license_plate: Option<String>,
    #[serde(default)]
    pub processing_time_seconds: Option<f64>,
}

/// HTTP recognition client
pub struct HttpPlateRecognizer {
    client: reqwest::Client,
    base_url: String,
    images: Arc<ImageStore>,
}

impl HttpPlateRecognizer {
    /// Create with default timeout (30s)
    pub fn new(base_url: String, images: Arc<ImageStore>) -> Result<Self> {
        Self::with_timeout(base_url, images, Duration::from_secs(30))
    }

    pub fn with_timeout(
        base_url: String,
        images: Arc<ImageStore>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            images,
        })
    }
}

#[async_trait]
impl PlateRecognizer for HttpPlateRecognizer {
    async fn recognize(
        &self,
        image_ref: &ImageRef,
    ) -> std::result::Result<PlateReading, RecognitionFailure> {
        let data = self
            .images
            .read(image_ref)
            .await
            .map_err(|e| RecognitionFailure::ImageMissing(e.to_string()))?;

        let part = Part::bytes(data)
            .file_name(image_ref.as_str().to_string())
            .mime_str("image/jpeg")
            .map_err(|e| RecognitionFailure::MalformedResponse(e.to_string()))?;
        let form = Form::new().part("image_file", part);

        let url = format!("{}/recognize_plate/", self.base_url);
        tracing::debug!(url = %url, image = %image_ref, "Sending recognition request");

        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| RecognitionFailure::Unreachable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RecognitionFailure::ErrorResponse {
                status: status.as_u16(),
                body,
            });
        }

        let body: RecognizeResponse = resp
            .json()
            .await
            .map_err(|e| RecognitionFailure::MalformedResponse(e.to_string()))?;

        tracing::debug!(
            image = %image_ref,
            plate = ?body.license_plate,
            processing_time_seconds = ?body.processing_time_seconds,
            "Recognition response received"
        );

        Ok(PlateReading::from_raw(body.license_plate.as_deref()))
    }
}
