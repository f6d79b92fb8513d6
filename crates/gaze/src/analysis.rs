//! Gaze scoring results

use serde::{Deserialize, Serialize};

use crate::config::GazeConfig;

/// Discrete gaze direction label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GazeDirection {
    #[serde(rename = "Looking Forward")]
    Forward,
    #[serde(rename = "Looking Right")]
    Right,
    #[serde(rename = "Looking Left")]
    Left,
    #[serde(rename = "Looking Down")]
    Down,
    #[serde(rename = "Looking Up")]
    Up,
    #[serde(rename = "Tilting Head")]
    Tilting,
    #[serde(rename = "No face detected")]
    NoFace,
}

impl GazeDirection {
    /// Human readable label
    pub fn label(&self) -> &'static str {
        match self {
            GazeDirection::Forward => "Looking Forward",
            GazeDirection::Right => "Looking Right",
            GazeDirection::Left => "Looking Left",
            GazeDirection::Down => "Looking Down",
            GazeDirection::Up => "Looking Up",
            GazeDirection::Tilting => "Tilting Head",
            GazeDirection::NoFace => "No face detected",
        }
    }

    /// Machine readable tag used in alert reasons
    pub fn tag(&self) -> &'static str {
        match self {
            GazeDirection::Forward => "looking_forward",
            GazeDirection::Right => "looking_right",
            GazeDirection::Left => "looking_left",
            GazeDirection::Down => "looking_down",
            GazeDirection::Up => "looking_up",
            GazeDirection::Tilting => "tilting_head",
            GazeDirection::NoFace => "no_face",
        }
    }

    /// Parse a label as reported by clients, with or without the `ALERT: ` prefix
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        let label = label.strip_prefix("ALERT:").map(str::trim).unwrap_or(label);
        [
            GazeDirection::Forward,
            GazeDirection::Right,
            GazeDirection::Left,
            GazeDirection::Down,
            GazeDirection::Up,
            GazeDirection::Tilting,
            GazeDirection::NoFace,
        ]
        .into_iter()
        .find(|d| d.label().eq_ignore_ascii_case(label) || d.tag() == label)
    }

    /// Whether this direction should raise a gaze alert
    pub fn is_alert(&self) -> bool {
        !matches!(self, GazeDirection::Forward | GazeDirection::NoFace)
    }

    /// Classify a head pose. Priority order: yaw, pitch, roll; first match wins.
    pub fn classify(pose: &HeadPose, config: &GazeConfig) -> Self {
        if pose.yaw > config.yaw_threshold_degrees {
            GazeDirection::Right
        } else if pose.yaw < -config.yaw_threshold_degrees {
            GazeDirection::Left
        } else if pose.pitch > config.pitch_threshold_degrees {
            GazeDirection::Down
        } else if pose.pitch < -config.pitch_threshold_degrees {
            GazeDirection::Up
        } else if pose.roll.abs() > config.roll_threshold_degrees {
            GazeDirection::Tilting
        } else {
            GazeDirection::Forward
        }
    }
}

impl std::fmt::Display for GazeDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_alert() {
            write!(f, "ALERT: {}", self.label())
        } else {
            f.write_str(self.label())
        }
    }
}

/// Head pose (Euler angles)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    /// Yaw (left-right rotation) in degrees, positive towards the student's right
    pub yaw: f32,
    /// Pitch (up-down tilt) in degrees, positive downwards
    pub pitch: f32,
    /// Roll (side tilt) in degrees
    pub roll: f32,
}

/// Complete gaze scoring result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeAnalysis {
    pub direction: GazeDirection,

    #[serde(flatten)]
    pub head_pose: HeadPose,
}

impl GazeAnalysis {
    /// Terminal "no face" result with all angles zero
    pub fn no_face() -> Self {
        Self {
            direction: GazeDirection::NoFace,
            head_pose: HeadPose::default(),
        }
    }

    pub fn face_detected(&self) -> bool {
        self.direction != GazeDirection::NoFace
    }

    pub fn is_alert(&self) -> bool {
        self.direction.is_alert()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pose(yaw: f32, pitch: f32, roll: f32) -> HeadPose {
        HeadPose { yaw, pitch, roll }
    }

    #[test]
    fn test_priority_order() {
        let config = GazeConfig::default();
        // Yaw wins over pitch and roll
        assert_eq!(GazeDirection::classify(&pose(35.0, 50.0, 50.0), &config), GazeDirection::Right);
        assert_eq!(GazeDirection::classify(&pose(-35.0, -50.0, 0.0), &config), GazeDirection::Left);
        // Pitch wins over roll
        assert_eq!(GazeDirection::classify(&pose(0.0, 25.0, 40.0), &config), GazeDirection::Down);
        assert_eq!(GazeDirection::classify(&pose(0.0, -25.0, 40.0), &config), GazeDirection::Up);
        assert_eq!(GazeDirection::classify(&pose(0.0, 0.0, -31.0), &config), GazeDirection::Tilting);
        assert_eq!(GazeDirection::classify(&pose(30.0, 20.0, 30.0), &config), GazeDirection::Forward);
    }

    #[test]
    fn test_labels_roundtrip() {
        for d in [
            GazeDirection::Forward,
            GazeDirection::Right,
            GazeDirection::Left,
            GazeDirection::Down,
            GazeDirection::Up,
            GazeDirection::Tilting,
            GazeDirection::NoFace,
        ] {
            assert_eq!(GazeDirection::from_label(&d.to_string()), Some(d));
        }
        assert_eq!(GazeDirection::from_label("ALERT: Looking Left"), Some(GazeDirection::Left));
        assert_eq!(GazeDirection::from_label("sideways"), None);
    }

    #[test]
    fn test_display_prefixes_alerts() {
        assert_eq!(GazeDirection::Right.to_string(), "ALERT: Looking Right");
        assert_eq!(GazeDirection::Forward.to_string(), "Looking Forward");
        assert!(!GazeDirection::NoFace.is_alert());
    }

    #[test]
    fn test_no_face_is_zeroed() {
        let analysis = GazeAnalysis::no_face();
        assert!(!analysis.face_detected());
        assert!(!analysis.is_alert());
        assert_eq!(analysis.head_pose, HeadPose::default());
    }

    proptest! {
        #[test]
        fn prop_classification_is_total_and_single(
            yaw in -90.0f32..90.0,
            pitch in -90.0f32..90.0,
            roll in -180.0f32..180.0,
        ) {
            let config = GazeConfig::default();
            let d = GazeDirection::classify(&pose(yaw, pitch, roll), &config);
            prop_assert_ne!(d, GazeDirection::NoFace);
            let forward = yaw.abs() <= 30.0 && pitch.abs() <= 20.0 && roll.abs() <= 30.0;
            prop_assert_eq!(d == GazeDirection::Forward, forward);
        }
    }
}
