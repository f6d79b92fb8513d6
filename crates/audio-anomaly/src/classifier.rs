//! Audio anomaly cascade

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{AudioError, AudioThresholds};

/// Client-side audio summary for one capture window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    /// RMS volume, 0-1
    pub volume_level: f32,
    /// Normalised frequency-bin magnitudes
    #[serde(default, alias = "frequency_data")]
    pub frequency_peaks: Vec<f32>,
    /// Window length in seconds
    #[serde(default)]
    pub duration: f32,
}

/// Why a window was flagged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyReason {
    LowVolume,
    VeryHighVolume,
    HighVolume,
    ClearSpeech,
    SpeechPattern,
    ShortLoud,
}

impl AnomalyReason {
    pub fn tag(&self) -> &'static str {
        match self {
            AnomalyReason::LowVolume => "low_volume",
            AnomalyReason::VeryHighVolume => "very_high_volume",
            AnomalyReason::HighVolume => "high_volume",
            AnomalyReason::ClearSpeech => "clear_speech",
            AnomalyReason::SpeechPattern => "speech_pattern",
            AnomalyReason::ShortLoud => "short_loud",
        }
    }
}

impl std::fmt::Display for AnomalyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Classification result with the derived quantities it was based on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioVerdict {
    pub anomaly: bool,
    /// Empty when clear, exactly one entry otherwise
    pub reasons: Vec<AnomalyReason>,
    pub peak_count: usize,
    pub peak_ratio: f32,
    pub volume_percent: f32,
}

/// Ordered threshold cascade over audio features
#[derive(Debug, Clone, Default)]
pub struct AudioAnomalyClassifier {
    thresholds: AudioThresholds,
}

impl AudioAnomalyClassifier {
    pub fn new(thresholds: AudioThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &AudioThresholds {
        &self.thresholds
    }

    fn validate(features: &AudioFeatures) -> Result<(), AudioError> {
        if !features.volume_level.is_finite() || !(0.0..=1.0).contains(&features.volume_level) {
            return Err(AudioError::OutOfRange(format!(
                "volume_level {} outside [0, 1]",
                features.volume_level
            )));
        }
        if !features.duration.is_finite() || features.duration < 0.0 {
            return Err(AudioError::OutOfRange(format!(
                "duration {} must be a non-negative number",
                features.duration
            )));
        }
        if let Some(bad) = features.frequency_peaks.iter().find(|p| !p.is_finite()) {
            return Err(AudioError::OutOfRange(format!("frequency peak {} is not finite", bad)));
        }
        Ok(())
    }

    /// Classify one window. First matching branch wins.
    pub fn classify(&self, features: &AudioFeatures) -> Result<AudioVerdict, AudioError> {
        Self::validate(features)?;
        let t = &self.thresholds;

        let volume = features.volume_level;
        let volume_percent = volume * 100.0;
        let total = features.frequency_peaks.len();
        let peak_count = features
            .frequency_peaks
            .iter()
            .filter(|&&p| p > t.speech_peak)
            .count();
        let peak_ratio = if total > 0 {
            peak_count as f32 / total as f32
        } else {
            0.0
        };

        let reason = if volume_percent < t.low_volume_percent {
            Some(AnomalyReason::LowVolume)
        } else if volume >= t.very_high_volume {
            Some(AnomalyReason::VeryHighVolume)
        } else if volume_percent > t.high_volume_percent {
            Some(AnomalyReason::HighVolume)
        } else if volume >= t.clear_speech_volume
            && (peak_count >= t.clear_speech_peaks || peak_ratio >= t.clear_speech_ratio)
        {
            Some(AnomalyReason::ClearSpeech)
        } else if peak_count >= t.speech_pattern_peaks && peak_ratio > t.speech_pattern_ratio {
            Some(AnomalyReason::SpeechPattern)
        } else if volume >= t.short_loud_volume && peak_count >= t.short_loud_peaks {
            Some(AnomalyReason::ShortLoud)
        } else {
            None
        };

        match reason {
            Some(r) => info!(
                "Audio anomaly {}: vol={:.3} peaks={}/{} ratio={:.2}",
                r, volume, peak_count, total, peak_ratio
            ),
            None => debug!(
                "Audio clear: vol={:.3} peaks={}/{} ratio={:.2}",
                volume, peak_count, total, peak_ratio
            ),
        }

        Ok(AudioVerdict {
            anomaly: reason.is_some(),
            reasons: reason.into_iter().collect(),
            peak_count,
            peak_ratio,
            volume_percent,
        })
    }
}
