//! Audio anomaly thresholds

use serde::{Deserialize, Serialize};

/// Cascade thresholds; volumes are fractions of full scale (0-1)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioThresholds {
    /// A frequency sample above this counts as a speech peak
    pub speech_peak: f32,
    /// Below this volume (percent) the microphone looks muted
    pub low_volume_percent: f32,
    /// Above this volume (percent) the room is too loud
    pub high_volume_percent: f32,
    pub very_high_volume: f32,
    pub clear_speech_volume: f32,
    pub clear_speech_peaks: usize,
    pub clear_speech_ratio: f32,
    pub speech_pattern_peaks: usize,
    pub speech_pattern_ratio: f32,
    pub short_loud_volume: f32,
    pub short_loud_peaks: usize,
}

impl Default for AudioThresholds {
    fn default() -> Self {
        Self {
            speech_peak: 0.45,
            low_volume_percent: 5.0,
            high_volume_percent: 35.0,
            very_high_volume: 0.55,
            clear_speech_volume: 0.40,
            clear_speech_peaks: 4,
            clear_speech_ratio: 0.10,
            speech_pattern_peaks: 6,
            speech_pattern_ratio: 0.12,
            short_loud_volume: 0.36,
            short_loud_peaks: 3,
        }
    }
}

impl AudioThresholds {
    /// Create lenient config (only loud rooms and obvious speech)
    pub fn lenient() -> Self {
        Self {
            low_volume_percent: 1.0,
            high_volume_percent: 50.0,
            very_high_volume: 0.70,
            speech_pattern_peaks: 10,
            speech_pattern_ratio: 0.15,
            ..Default::default()
        }
    }
}
