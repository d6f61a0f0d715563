//! Box bounds and the Minuit-style bounded transform
//!
//! [`BoundsTransform`] maps an unbounded internal value onto `[min, max]`
//! (or a half-line when only one side is finite). It is one of the built-in
//! [`Transformation`]s a node can be constrained with.

use crate::parameters::transform::{Transformation, TransformKind};
use serde::{Deserialize, Serialize};
use std::f64::{INFINITY, NEG_INFINITY};
use thiserror::Error;

/// Errors that can occur when working with parameter bounds
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoundsError {
    #[error("Invalid bounds: min ({min}) must be less than max ({max})")]
    InvalidBounds { min: f64, max: f64 },

    #[error("Parameter value {value} is outside bounds: [{min}, {max}]")]
    ValueOutsideBounds { value: f64, min: f64, max: f64 },

    #[error("Infinite parameter value is not allowed")]
    InfiniteValue,
}

/// Lower and upper limit of a parameter's constrained domain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Minimum allowed value
    pub min: f64,

    /// Maximum allowed value
    pub max: f64,
}

impl Serialize for Bounds {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        // Infinite sides are written as null so the JSON stays valid
        let min = self.min.is_finite().then_some(self.min);
        let max = self.max.is_finite().then_some(self.max);

        let mut state = serializer.serialize_struct("Bounds", 2)?;
        state.serialize_field("min", &min)?;
        state.serialize_field("max", &max)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for Bounds {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct BoundsHelper {
            #[serde(default)]
            min: Option<f64>,

            #[serde(default)]
            max: Option<f64>,
        }

        let helper = BoundsHelper::deserialize(deserializer)?;

        Ok(Bounds {
            min: helper.min.unwrap_or(NEG_INFINITY),
            max: helper.max.unwrap_or(INFINITY),
        })
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            min: NEG_INFINITY,
            max: INFINITY,
        }
    }
}

impl Bounds {
    /// Create new bounds, failing if `min > max`
    ///
    /// # Examples
    ///
    /// ```
    /// use paramz_rs::parameters::bounds::Bounds;
    ///
    /// let bounds = Bounds::new(0.0, 10.0).unwrap();
    /// assert_eq!(bounds.min, 0.0);
    /// assert_eq!(bounds.max, 10.0);
    /// assert!(Bounds::new(10.0, 0.0).is_err());
    /// ```
    pub fn new(min: f64, max: f64) -> Result<Self, BoundsError> {
        if min > max {
            return Err(BoundsError::InvalidBounds { min, max });
        }

        Ok(Self { min, max })
    }

    /// The whole real line
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// `[min, ∞)`
    pub fn min_only(min: f64) -> Self {
        Self { min, max: INFINITY }
    }

    /// `(-∞, max]`
    pub fn max_only(max: f64) -> Self {
        Self {
            min: NEG_INFINITY,
            max,
        }
    }

    pub fn is_within_bounds(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn has_lower_bound(&self) -> bool {
        self.min.is_finite()
    }

    pub fn has_upper_bound(&self) -> bool {
        self.max.is_finite()
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Minuit-style transform between an unbounded internal value and a bounded
/// external value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundsTransform {
    bounds: Bounds,
}

impl BoundsTransform {
    pub fn new(bounds: Bounds) -> Self {
        Self { bounds }
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Transform an internal value to an external value inside the bounds
    pub fn to_external(&self, internal_value: f64) -> f64 {
        match (self.bounds.has_lower_bound(), self.bounds.has_upper_bound()) {
            (false, false) => internal_value,
            (true, false) => self.bounds.min - 1.0 + (internal_value * internal_value + 1.0).sqrt(),
            (false, true) => self.bounds.max + 1.0 - (internal_value * internal_value + 1.0).sqrt(),
            (true, true) => {
                let bound_range = self.bounds.max - self.bounds.min;
                self.bounds.min + (internal_value.sin() + 1.0) * bound_range / 2.0
            }
        }
    }

    /// Transform an external value to an internal value
    ///
    /// Fails for non-finite values and values outside the bounds.
    pub fn to_internal(&self, external_value: f64) -> Result<f64, BoundsError> {
        if !external_value.is_finite() {
            return Err(BoundsError::InfiniteValue);
        }

        if !self.bounds.is_within_bounds(external_value) {
            return Err(BoundsError::ValueOutsideBounds {
                value: external_value,
                min: self.bounds.min,
                max: self.bounds.max,
            });
        }

        let internal = match (self.bounds.has_lower_bound(), self.bounds.has_upper_bound()) {
            (false, false) => external_value,
            (true, false) => ((external_value - self.bounds.min + 1.0).powi(2) - 1.0).sqrt(),
            (false, true) => ((self.bounds.max - external_value + 1.0).powi(2) - 1.0).sqrt(),
            (true, true) => {
                let bound_range = self.bounds.max - self.bounds.min;
                let scaled = 2.0 * (external_value - self.bounds.min) / bound_range - 1.0;
                scaled.clamp(-1.0, 1.0).asin()
            }
        };

        Ok(internal)
    }

    /// Derivative of the external value with respect to the internal value,
    /// evaluated at `external_value`
    pub fn derivative(&self, external_value: f64) -> Result<f64, BoundsError> {
        let internal = self.to_internal(external_value)?;

        let derivative = match (self.bounds.has_lower_bound(), self.bounds.has_upper_bound()) {
            (false, false) => 1.0,
            (true, false) => internal / (internal.powi(2) + 1.0).sqrt(),
            (false, true) => -internal / (internal.powi(2) + 1.0).sqrt(),
            (true, true) => (self.bounds.max - self.bounds.min) * internal.cos() / 2.0,
        };

        Ok(derivative)
    }
}

impl Transformation for BoundsTransform {
    fn f(&self, x: f64) -> f64 {
        self.to_external(x)
    }

    fn finv(&self, f: f64) -> f64 {
        // initialize() keeps values inside the bounds, clamp guards rounding
        self.to_internal(self.bounds.clamp(f)).unwrap_or(f64::NAN)
    }

    fn gradfactor(&self, f: f64) -> f64 {
        self.derivative(self.bounds.clamp(f)).unwrap_or(0.0)
    }

    fn initialize(&self, f: f64) -> f64 {
        self.bounds.clamp(f)
    }

    fn key(&self) -> String {
        format!("bounded[{}, {}]", self.bounds.min, self.bounds.max)
    }

    fn kind(&self) -> Option<TransformKind> {
        Some(TransformKind::Bounded(self.bounds))
    }
}
