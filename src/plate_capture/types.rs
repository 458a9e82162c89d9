//! Plate capture data types

use crate::error::{Error, Result};
use crate::image_store::ImageRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Camera channel a capture belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureChannel {
    Entry,
    Exit,
}

impl CaptureChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureChannel::Entry => "entry",
            CaptureChannel::Exit => "exit",
        }
    }

    /// Parse the upload form's `type` field
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim() {
            "entry" => Ok(CaptureChannel::Entry),
            "exit" => Ok(CaptureChannel::Exit),
            other => Err(Error::Validation(format!(
                "Invalid capture channel '{}': must be \"entry\" or \"exit\"",
                other
            ))),
        }
    }
}

impl fmt::Display for CaptureChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current recognition result for one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateCaptureSample {
    pub channel: CaptureChannel,
    /// Normalized plate; `None` when nothing usable was recognized
    pub plate: Option<String>,
    pub captured_at: DateTime<Utc>,
    pub image_ref: ImageRef,
}

impl PlateCaptureSample {
    /// Recognized plate, if non-empty
    pub fn usable_plate(&self) -> Option<&str> {
        self.plate.as_deref().filter(|p| !p.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_parse() {
        assert_eq!(CaptureChannel::parse("entry").unwrap(), CaptureChannel::Entry);
        assert_eq!(CaptureChannel::parse(" exit ").unwrap(), CaptureChannel::Exit);
        assert!(matches!(
            CaptureChannel::parse("side"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_usable_plate_rejects_empty() {
        let sample = PlateCaptureSample {
            channel: CaptureChannel::Entry,
            plate: Some(String::new()),
            captured_at: Utc::now(),
            image_ref: ImageRef::new("a.jpg"),
        };
        assert!(sample.usable_plate().is_none());
    }
}
