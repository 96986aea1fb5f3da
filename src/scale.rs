//! Saaty ratio scale for slider-style judgments.
//!
//! A judgment is a bounded integer in `-k..=k`:
//! - `0` means both items are equally important (ratio 1).
//! - negative values mean the first item dominates by `|j| + 1`.
//! - positive values mean the second item dominates by `j + 1`.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Default number of intensity steps on each side of "equal".
pub const DEFAULT_MAX_STEP: i32 = 4;

/// Unbounded judgment-to-ratio mapping (first item relative to second).
pub fn saaty_weight(judgment: i32) -> f64 {
    match judgment {
        0 => 1.0,
        j if j < 0 => f64::from(j.unsigned_abs()) + 1.0,
        j => 1.0 / (f64::from(j) + 1.0),
    }
}

/// Bounded Saaty scale with `max_step` intensity steps per side.
///
/// Deserialization goes through [`SaatyScale::new`], so config files
/// cannot carry a non-positive step count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ScaleFile")]
pub struct SaatyScale {
    pub max_step: i32,
}

#[derive(Deserialize)]
#[serde(default)]
struct ScaleFile {
    max_step: i32,
}

impl Default for ScaleFile {
    fn default() -> Self {
        Self {
            max_step: DEFAULT_MAX_STEP,
        }
    }
}

impl TryFrom<ScaleFile> for SaatyScale {
    type Error = ValidationError;

    fn try_from(file: ScaleFile) -> Result<Self, Self::Error> {
        SaatyScale::new(file.max_step)
    }
}

impl Default for SaatyScale {
    fn default() -> Self {
        Self {
            max_step: DEFAULT_MAX_STEP,
        }
    }
}

impl SaatyScale {
    pub fn new(max_step: i32) -> Result<Self, ValidationError> {
        if max_step < 1 {
            return Err(ValidationError::InvalidScale { max_step });
        }
        Ok(Self { max_step })
    }

    /// Largest ratio the scale can express (`k + 1`).
    pub fn max_ratio(&self) -> f64 {
        f64::from(self.max_step) + 1.0
    }

    pub fn check(&self, judgment: i32) -> Result<i32, ValidationError> {
        if !(-self.max_step..=self.max_step).contains(&judgment) {
            return Err(ValidationError::JudgmentOutOfRange {
                judgment,
                max_step: self.max_step,
            });
        }
        Ok(judgment)
    }

    pub fn to_weight(&self, judgment: i32) -> Result<f64, ValidationError> {
        self.check(judgment).map(saaty_weight)
    }

    /// Nearest judgment step for a ratio weight, clamped to the scale.
    ///
    /// Non-positive or non-finite weights map to "equal".
    pub fn from_weight(&self, weight: f64) -> i32 {
        if !weight.is_finite() || weight <= 0.0 {
            return 0;
        }
        let (magnitude, sign) = if weight >= 1.0 {
            (weight, -1)
        } else {
            (1.0 / weight, 1)
        };
        let steps = (magnitude.round() - 1.0).max(0.0).min(f64::from(self.max_step)) as i32;
        sign * steps
    }

    /// Snap a rounded wire weight (e.g. `0.333`) back onto the exact scale
    /// ratio (`1/3`) when it lies within `tolerance` relative error.
    pub fn snap(&self, weight: f64, tolerance: f64) -> f64 {
        for m in 1..=self.max_step + 1 {
            let up = f64::from(m);
            for candidate in [up, 1.0 / up] {
                if ((weight - candidate) / candidate).abs() <= tolerance {
                    return candidate;
                }
            }
        }
        weight
    }

    pub fn describe(&self, judgment: i32, first: &str, second: &str) -> String {
        let ratio = judgment.unsigned_abs() + 1;
        match judgment {
            0 => "equal (1:1)".to_string(),
            j if j < 0 => format!("{first} is {ratio}x as important as {second}"),
            _ => format!("{second} is {ratio}x as important as {first}"),
        }
    }
}
