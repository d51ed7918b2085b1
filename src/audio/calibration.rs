//! RMS → decibel mapping.
//!
//! Both policies reduce to `dB = 20·log10(rms) + offset`; they differ only in
//! how the offset is derived:
//!
//! - [`CalibrationPolicy::PressureReferenced`] converts the RMS into a
//!   pseudo pressure (`rms / full_scale · sensitivity · pressure_scale`) and
//!   references it against `reference_pressure`, then adds `offset_db`.
//! - [`CalibrationPolicy::SelfReferenced`] pins one RMS value, given as a
//!   fraction of full scale, to one reading (by default 0.1 reads as 85 dB).
//!
//! Both divide by the window's full scale, so the same tone reads alike
//! whether the window holds amplitudes or byte magnitudes.
//!
//! Neither is a traceable SPL measurement.  Output is always finite and
//! saturates at the ends of the configured [`DecibelRange`].
//!
//! # Example
//!
//! ```rust
//! use decibel_meter::audio::{
//!     CalibrationMapper, CalibrationPolicy, DecibelRange, LoudnessMetric, WindowKind,
//! };
//!
//! let mapper = CalibrationMapper::new(
//!     CalibrationPolicy::default(),
//!     DecibelRange::default(),
//!     WindowKind::TimeDomain,
//! );
//! let reading = mapper.to_decibels(LoudnessMetric::new(0.1));
//! assert!((reading.db() - 85.0).abs() < 1e-9);
//! ```

use serde::{Deserialize, Serialize};

use super::level::LoudnessMetric;
use super::window::WindowKind;

/// RMS at or below this is treated as silence.
pub const SILENCE_FLOOR_RMS: f64 = 1e-10;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// How a loudness metric is turned into a decibel figure.
///
/// Serialised as an internally tagged table:
///
/// ```toml
/// [calibration.policy]
/// kind = "self_referenced"
/// anchor_rms = 0.1
/// anchor_db = 85.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalibrationPolicy {
    PressureReferenced {
        #[serde(default = "default_sensitivity")]
        sensitivity: f64,
        #[serde(default = "default_pressure_scale")]
        pressure_scale: f64,
        #[serde(default = "default_reference_pressure")]
        reference_pressure: f64,
        #[serde(default = "default_pressure_offset_db")]
        offset_db: f64,
    },
    SelfReferenced {
        #[serde(default = "default_anchor_rms")]
        anchor_rms: f64,
        #[serde(default = "default_anchor_db")]
        anchor_db: f64,
    },
}

fn default_sensitivity() -> f64 {
    0.94
}
fn default_pressure_scale() -> f64 {
    100.0
}
fn default_reference_pressure() -> f64 {
    20.0
}
fn default_pressure_offset_db() -> f64 {
    30.0
}
fn default_anchor_rms() -> f64 {
    0.1
}
fn default_anchor_db() -> f64 {
    85.0
}

impl CalibrationPolicy {
    /// Pressure-referenced policy with the stock microphone constants.
    pub fn pressure_referenced() -> Self {
        CalibrationPolicy::PressureReferenced {
            sensitivity: default_sensitivity(),
            pressure_scale: default_pressure_scale(),
            reference_pressure: default_reference_pressure(),
            offset_db: default_pressure_offset_db(),
        }
    }

    /// Self-referenced policy anchored at 0.1 RMS ↔ 85 dB.
    pub fn self_referenced() -> Self {
        CalibrationPolicy::SelfReferenced {
            anchor_rms: default_anchor_rms(),
            anchor_db: default_anchor_db(),
        }
    }
}

impl Default for CalibrationPolicy {
    fn default() -> Self {
        Self::self_referenced()
    }
}

// ---------------------------------------------------------------------------
// Range / reading
// ---------------------------------------------------------------------------

/// Clamp range for readings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecibelRange {
    pub min_db: f64,
    pub max_db: f64,
}

impl DecibelRange {
    /// The same range with `min_db <= max_db`.  A non-finite bound is
    /// replaced by the matching default bound.
    pub fn ordered(self) -> Self {
        let fallback = Self::default();
        let min = if self.min_db.is_finite() { self.min_db } else { fallback.min_db };
        let max = if self.max_db.is_finite() { self.max_db } else { fallback.max_db };
        Self {
            min_db: min.min(max),
            max_db: min.max(max),
        }
    }
}

impl Default for DecibelRange {
    fn default() -> Self {
        Self {
            min_db: 30.0,
            max_db: 120.0,
        }
    }
}

/// A calibrated reading, always finite and inside the mapper's range.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct DecibelReading(f64);

impl DecibelReading {
    pub fn db(self) -> f64 {
        self.0
    }
}

// ---------------------------------------------------------------------------
// CalibrationMapper
// ---------------------------------------------------------------------------

/// Maps [`LoudnessMetric`]s onto [`DecibelReading`]s for one policy.
#[derive(Debug, Clone)]
pub struct CalibrationMapper {
    policy: CalibrationPolicy,
    range: DecibelRange,
    offset_db: f64,
}

impl CalibrationMapper {
    /// `kind` fixes the full-scale value both policies divide by (1.0 for
    /// amplitudes, 255 for byte magnitudes).  `range` is reordered if its
    /// bounds are swapped.
    pub fn new(policy: CalibrationPolicy, range: DecibelRange, kind: WindowKind) -> Self {
        let range = range.ordered();
        let full_scale = kind.full_scale();
        let offset_db = match &policy {
            CalibrationPolicy::PressureReferenced {
                sensitivity,
                pressure_scale,
                reference_pressure,
                offset_db,
            } => {
                let gain = sensitivity * pressure_scale / (full_scale * reference_pressure);
                20.0 * gain.log10() + offset_db
            }
            CalibrationPolicy::SelfReferenced {
                anchor_rms,
                anchor_db,
            } => anchor_db - 20.0 * (anchor_rms * full_scale).log10(),
        };

        log::debug!(
            "calibration: {:?} over {:?}, offset {:.2} dB",
            policy,
            range,
            offset_db
        );

        Self {
            policy,
            range,
            offset_db,
        }
    }

    /// Additive term in `dB = 20·log10(rms) + offset`.
    pub fn offset_db(&self) -> f64 {
        self.offset_db
    }

    pub fn policy(&self) -> &CalibrationPolicy {
        &self.policy
    }

    pub fn range(&self) -> DecibelRange {
        self.range
    }

    pub fn to_decibels(&self, metric: LoudnessMetric) -> DecibelReading {
        let rms = metric.value();
        if !rms.is_finite() || rms <= SILENCE_FLOOR_RMS {
            return DecibelReading(self.range.min_db);
        }

        let db = 20.0 * rms.log10() + self.offset_db;
        if db.is_nan() {
            return DecibelReading(self.range.min_db);
        }
        DecibelReading(db.max(self.range.min_db).min(self.range.max_db))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn self_referenced() -> CalibrationMapper {
        CalibrationMapper::new(
            CalibrationPolicy::self_referenced(),
            DecibelRange::default(),
            WindowKind::TimeDomain,
        )
    }

    fn db(mapper: &CalibrationMapper, rms: f64) -> f64 {
        mapper.to_decibels(LoudnessMetric::new(rms)).db()
    }

    #[test]
    fn anchor_reads_as_anchor_db() {
        let mapper = self_referenced();
        assert!((mapper.offset_db() - 105.0).abs() < 1e-9);
        assert!((db(&mapper, 0.1) - 85.0).abs() < 1e-9);
    }

    #[test]
    fn silence_reads_as_range_minimum() {
        let mapper = self_referenced();
        assert_eq!(db(&mapper, 0.0), 30.0);
        assert_eq!(db(&mapper, SILENCE_FLOOR_RMS), 30.0);
        assert_eq!(db(&mapper, 1e-300), 30.0);
    }

    #[test]
    fn non_finite_input_reads_as_minimum() {
        let mapper = self_referenced();
        let reading = mapper.to_decibels(LoudnessMetric::new(f64::INFINITY));
        assert_eq!(reading.db(), 30.0);
    }

    #[test]
    fn huge_input_saturates_at_maximum() {
        let mapper = self_referenced();
        assert_eq!(db(&mapper, 1e6), 120.0);
        assert_eq!(db(&mapper, f64::MAX), 120.0);
    }

    #[test]
    fn mapping_is_monotone_and_in_range() {
        for mapper in [
            self_referenced(),
            CalibrationMapper::new(
                CalibrationPolicy::pressure_referenced(),
                DecibelRange::default(),
                WindowKind::FrequencyMagnitude,
            ),
        ] {
            let mut previous = f64::NEG_INFINITY;
            let mut rms = 1e-12;
            while rms < 1e4 {
                let value = db(&mapper, rms);
                assert!(value.is_finite());
                assert!((30.0..=120.0).contains(&value), "{value} out of range");
                assert!(value >= previous, "not monotone at rms {rms}");
                previous = value;
                rms *= 1.25;
            }
        }
    }

    #[test]
    fn pressure_policy_matches_its_formula() {
        let mapper = CalibrationMapper::new(
            CalibrationPolicy::pressure_referenced(),
            DecibelRange::default(),
            WindowKind::FrequencyMagnitude,
        );
        let rms = 120.0;
        let pressure = (rms / 255.0) * 0.94 * 100.0;
        let expected = 20.0 * (pressure / 20.0_f64).log10() + 30.0;
        assert!((db(&mapper, rms) - expected).abs() < 1e-9);
    }

    #[test]
    fn pressure_full_scale_follows_window_kind() {
        let bytes = CalibrationMapper::new(
            CalibrationPolicy::pressure_referenced(),
            DecibelRange::default(),
            WindowKind::FrequencyMagnitude,
        );
        let amplitude = CalibrationMapper::new(
            CalibrationPolicy::pressure_referenced(),
            DecibelRange::default(),
            WindowKind::TimeDomain,
        );
        // Same relative level on either scale gives the same reading.
        assert!((db(&bytes, 127.5) - db(&amplitude, 0.5)).abs() < 1e-9);
    }

    #[test]
    fn custom_range_is_respected() {
        let mapper = CalibrationMapper::new(
            CalibrationPolicy::self_referenced(),
            DecibelRange {
                min_db: 40.0,
                max_db: 90.0,
            },
            WindowKind::TimeDomain,
        );
        assert_eq!(db(&mapper, 0.0), 40.0);
        assert_eq!(db(&mapper, 1.0), 90.0);
    }

    #[test]
    fn anchor_is_a_fraction_of_full_scale() {
        let bytes = CalibrationMapper::new(
            CalibrationPolicy::self_referenced(),
            DecibelRange::default(),
            WindowKind::FrequencyMagnitude,
        );
        assert!((db(&bytes, 25.5) - 85.0).abs() < 1e-9);
        assert!((db(&bytes, 127.5) - db(&self_referenced(), 0.5)).abs() < 1e-9);
    }

    #[test]
    fn swapped_range_is_reordered() {
        let mapper = CalibrationMapper::new(
            CalibrationPolicy::self_referenced(),
            DecibelRange {
                min_db: 120.0,
                max_db: 30.0,
            },
            WindowKind::TimeDomain,
        );
        assert_eq!(mapper.range(), DecibelRange::default());
        assert_eq!(db(&mapper, 0.0), 30.0);
        assert!((db(&mapper, 0.1) - 85.0).abs() < 1e-9);
        assert_eq!(db(&mapper, 1e6), 120.0);
    }

    #[test]
    fn non_finite_bounds_fall_back_to_defaults() {
        let range = DecibelRange {
            min_db: f64::NAN,
            max_db: f64::INFINITY,
        }
        .ordered();
        assert_eq!(range, DecibelRange::default());

        let mapper = CalibrationMapper::new(
            CalibrationPolicy::self_referenced(),
            DecibelRange {
                min_db: f64::NAN,
                max_db: 90.0,
            },
            WindowKind::TimeDomain,
        );
        assert_eq!(db(&mapper, 0.0), 30.0);
        assert_eq!(db(&mapper, 1.0), 90.0);
    }

    #[test]
    fn policy_deserialises_from_tagged_table() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: CalibrationPolicy,
        }

        let parsed: Wrapper = toml::from_str(
            r#"
            [policy]
            kind = "pressure_referenced"
            offset_db = 25.0
            "#,
        )
        .unwrap();

        assert_eq!(
            parsed.policy,
            CalibrationPolicy::PressureReferenced {
                sensitivity: 0.94,
                pressure_scale: 100.0,
                reference_pressure: 20.0,
                offset_db: 25.0,
            }
        );
    }

    #[test]
    fn default_policy_is_self_referenced() {
        assert!(matches!(
            CalibrationPolicy::default(),
            CalibrationPolicy::SelfReferenced { .. }
        ));
    }
}
