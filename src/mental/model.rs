//! Longitudinal per-user mental model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::emotion::state::clamp_unit;

/// Running estimate of one user's confusion and frustration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMentalModel {
    pub user_id: String,
    pub confusion_level: f32,
    pub frustration_level: f32,
    pub last_updated: DateTime<Utc>,
    /// Number of updates folded into this model.
    pub observations: u64,
}

impl UserMentalModel {
    /// A zeroed model for a user seen for the first time.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            confusion_level: 0.0,
            frustration_level: 0.0,
            last_updated: Utc::now(),
            observations: 0,
        }
    }

    /// Exponential moving average step: `decay * old + (1 - decay) * signal`.
    pub fn blend(&mut self, decay: f32, confusion_signal: f32, frustration_signal: f32) {
        self.confusion_level = ema(self.confusion_level, confusion_signal, decay);
        self.frustration_level = ema(self.frustration_level, frustration_signal, decay);
        self.last_updated = Utc::now();
        self.observations += 1;
    }
}

fn ema(old: f32, signal: f32, decay: f32) -> f32 {
    clamp_unit(decay * old + (1.0 - decay) * clamp_unit(signal))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_model_is_zeroed() {
        let m = UserMentalModel::new("u1");
        assert_eq!(m.confusion_level, 0.0);
        assert_eq!(m.frustration_level, 0.0);
        assert_eq!(m.observations, 0);
    }

    #[test]
    fn test_blend_is_ema() {
        let mut m = UserMentalModel::new("u1");
        m.blend(0.6, 0.5, 1.0);
        assert!((m.confusion_level - 0.2).abs() < 1e-6);
        assert!((m.frustration_level - 0.4).abs() < 1e-6);
        m.blend(0.6, 0.0, 0.0);
        assert!((m.frustration_level - 0.24).abs() < 1e-6);
        assert_eq!(m.observations, 2);
    }

    #[test]
    fn test_blend_clamps_signal() {
        let mut m = UserMentalModel::new("u1");
        m.blend(0.5, 7.0, -3.0);
        assert!(m.confusion_level <= 1.0);
        assert_eq!(m.frustration_level, 0.0);
    }
}
