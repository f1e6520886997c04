use std::{fmt, str::FromStr};

use anyhow::bail;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingStatus {
    pub is_recording: bool,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub duration: Option<u64>,
}

/// `{success, message, data}` wrapper used by the backend's POST endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingStarted {
    pub filename: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingStopped {
    #[serde(default)]
    pub file_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotTaken {
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendCameraStatus {
    pub available: bool,
    #[serde(default)]
    pub fps: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamQuality {
    Normal,
    Hd,
}

impl StreamQuality {
    pub fn feed_path(self) -> &'static str {
        match self {
            Self::Normal => "video_feed",
            Self::Hd => "video_feed_hd",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Video,
    Image,
}

impl FileKind {
    /// Directory segment used by the download and delete endpoints.
    pub fn path_segment(self) -> &'static str {
        match self {
            Self::Video => "videos",
            Self::Image => "images",
        }
    }
}

impl FromStr for FileKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "video" | "videos" => Ok(Self::Video),
            "image" | "images" => Ok(Self::Image),
            other => bail!("unknown file type: {other}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedFile {
    pub filename: String,
    pub file_type: FileKind,
    pub size: u64,
    pub created_at: String,
}

/// Byte count rendered with 1024-based units, two decimals at most.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HumanSize(pub u64);

impl fmt::Display for HumanSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

        if self.0 == 0 {
            return write!(f, "0 Bytes");
        }

        let mut value = self.0 as f64;
        let mut unit = 0;
        while value >= 1024.0 && unit < UNITS.len() - 1 {
            value /= 1024.0;
            unit += 1;
        }

        let rounded = (value * 100.0).round() / 100.0;
        write!(f, "{rounded} {}", UNITS[unit])
    }
}
