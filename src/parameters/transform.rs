//! Constraint transformations
//!
//! A [`Transformation`] is a bijection between an unconstrained optimizer
//! space (`x`) and a constrained parameter space (`f`). Nodes store their
//! constrained values; the optimizer only ever sees `finv(f)`.
//!
//! [`Transform`] is the shared handle stored in index registries. Two handles
//! are equal when their [`Transformation::key`]s are equal, so
//! `Transform::positive() == Transform::positive()` even though they were
//! created separately.

use crate::error::{ParamzError, Result};
use crate::parameters::bounds::{Bounds, BoundsTransform};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

/// Above this the softplus and its inverse are the identity to f64 precision.
const SOFTPLUS_CUTOFF: f64 = 20.0;

/// A bijection between unconstrained and constrained values.
pub trait Transformation: fmt::Debug {
    /// Map an unconstrained value to the constrained domain.
    fn f(&self, x: f64) -> f64;

    /// Map a constrained value back to the unconstrained domain.
    fn finv(&self, f: f64) -> f64;

    /// `df/dx`, expressed in terms of the constrained value `f`.
    fn gradfactor(&self, f: f64) -> f64;

    /// Project an arbitrary value into the constrained domain.
    fn initialize(&self, f: f64) -> f64 {
        f
    }

    /// Identity of the transform inside an index registry.
    fn key(&self) -> String;

    /// Serializable description, if this is one of the built-in transforms.
    fn kind(&self) -> Option<TransformKind> {
        None
    }

    /// The reserved transform marking fixed parameters.
    fn is_fixed(&self) -> bool {
        false
    }
}

/// Serializable description of the built-in transforms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformKind {
    Logexp,
    NegativeLogexp,
    Logistic { lower: f64, upper: f64 },
    Exponent,
    Square,
    Bounded(Bounds),
    Fixed,
}

fn softplus(x: f64) -> f64 {
    if x > SOFTPLUS_CUTOFF {
        x
    } else {
        x.exp().ln_1p()
    }
}

fn softplus_inv(f: f64) -> f64 {
    if f > SOFTPLUS_CUTOFF {
        f
    } else {
        f.exp_m1().ln()
    }
}

/// `f = ln(1 + exp(x))`, the default positive constraint.
#[derive(Debug, Clone, Copy, Default)]
pub struct Logexp;

impl Transformation for Logexp {
    fn f(&self, x: f64) -> f64 {
        softplus(x)
    }

    fn finv(&self, f: f64) -> f64 {
        softplus_inv(f)
    }

    fn gradfactor(&self, f: f64) -> f64 {
        -(-f).exp_m1()
    }

    fn initialize(&self, f: f64) -> f64 {
        f.abs()
    }

    fn key(&self) -> String {
        "+ve".to_string()
    }

    fn kind(&self) -> Option<TransformKind> {
        Some(TransformKind::Logexp)
    }
}

/// `f = -ln(1 + exp(x))`, the default negative constraint.
#[derive(Debug, Clone, Copy, Default)]
pub struct NegativeLogexp;

impl Transformation for NegativeLogexp {
    fn f(&self, x: f64) -> f64 {
        -softplus(x)
    }

    fn finv(&self, f: f64) -> f64 {
        softplus_inv(-f)
    }

    fn gradfactor(&self, f: f64) -> f64 {
        f.exp_m1()
    }

    fn initialize(&self, f: f64) -> f64 {
        -f.abs()
    }

    fn key(&self) -> String {
        "-ve".to_string()
    }

    fn kind(&self) -> Option<TransformKind> {
        Some(TransformKind::NegativeLogexp)
    }
}

/// Sigmoid squashing into the open interval `(lower, upper)`.
#[derive(Debug, Clone, Copy)]
pub struct Logistic {
    lower: f64,
    upper: f64,
}

impl Logistic {
    pub fn new(lower: f64, upper: f64) -> Result<Self> {
        if !(lower.is_finite() && upper.is_finite() && lower < upper) {
            return Err(ParamzError::InvalidTransform(format!(
                "logistic bounds must be finite with lower < upper, got ({}, {})",
                lower, upper
            )));
        }
        Ok(Self { lower, upper })
    }

    fn difference(&self) -> f64 {
        self.upper - self.lower
    }
}

impl Transformation for Logistic {
    fn f(&self, x: f64) -> f64 {
        self.lower + self.difference() / (1.0 + (-x).exp())
    }

    fn finv(&self, f: f64) -> f64 {
        ((f - self.lower) / (self.upper - f)).ln()
    }

    fn gradfactor(&self, f: f64) -> f64 {
        (f - self.lower) * (self.upper - f) / self.difference()
    }

    fn initialize(&self, f: f64) -> f64 {
        if f <= self.lower || f >= self.upper {
            self.f(0.0)
        } else {
            f
        }
    }

    fn key(&self) -> String {
        format!("{{{}, {}}}", self.lower, self.upper)
    }

    fn kind(&self) -> Option<TransformKind> {
        Some(TransformKind::Logistic {
            lower: self.lower,
            upper: self.upper,
        })
    }
}

/// `f = exp(x)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exponent;

impl Transformation for Exponent {
    fn f(&self, x: f64) -> f64 {
        x.exp()
    }

    fn finv(&self, f: f64) -> f64 {
        f.ln()
    }

    fn gradfactor(&self, f: f64) -> f64 {
        f
    }

    fn initialize(&self, f: f64) -> f64 {
        f.abs()
    }

    fn key(&self) -> String {
        "exp".to_string()
    }

    fn kind(&self) -> Option<TransformKind> {
        Some(TransformKind::Exponent)
    }
}

/// `f = x²`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Square;

impl Transformation for Square {
    fn f(&self, x: f64) -> f64 {
        x * x
    }

    fn finv(&self, f: f64) -> f64 {
        f.sqrt()
    }

    fn gradfactor(&self, f: f64) -> f64 {
        2.0 * f.sqrt()
    }

    fn initialize(&self, f: f64) -> f64 {
        f.abs()
    }

    fn key(&self) -> String {
        "sq".to_string()
    }

    fn kind(&self) -> Option<TransformKind> {
        Some(TransformKind::Square)
    }
}

/// Reserved marker for fixed parameters. Acts as the identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fixed;

impl Transformation for Fixed {
    fn f(&self, x: f64) -> f64 {
        x
    }

    fn finv(&self, f: f64) -> f64 {
        f
    }

    fn gradfactor(&self, _f: f64) -> f64 {
        1.0
    }

    fn key(&self) -> String {
        "fixed".to_string()
    }

    fn kind(&self) -> Option<TransformKind> {
        Some(TransformKind::Fixed)
    }

    fn is_fixed(&self) -> bool {
        true
    }
}

/// Shared, comparable handle to a [`Transformation`].
#[derive(Clone)]
pub struct Transform(Rc<dyn Transformation>);

impl Transform {
    /// Wrap a custom transformation.
    pub fn new<T: Transformation + 'static>(transformation: T) -> Self {
        Self(Rc::new(transformation))
    }

    pub fn positive() -> Self {
        Self::new(Logexp)
    }

    pub fn negative() -> Self {
        Self::new(NegativeLogexp)
    }

    pub fn logistic(lower: f64, upper: f64) -> Result<Self> {
        Ok(Self::new(Logistic::new(lower, upper)?))
    }

    pub fn exponent() -> Self {
        Self::new(Exponent)
    }

    pub fn square() -> Self {
        Self::new(Square)
    }

    /// Minuit-style bounds, either side may be infinite.
    pub fn bounded(min: f64, max: f64) -> Result<Self> {
        Ok(Self::new(BoundsTransform::new(Bounds::new(min, max)?)))
    }

    pub fn fixed() -> Self {
        Self::new(Fixed)
    }

    /// Rebuild a built-in transform from its serialized description.
    pub fn from_kind(kind: &TransformKind) -> Result<Self> {
        let transform = match *kind {
            TransformKind::Logexp => Self::positive(),
            TransformKind::NegativeLogexp => Self::negative(),
            TransformKind::Logistic { lower, upper } => Self::logistic(lower, upper)?,
            TransformKind::Exponent => Self::exponent(),
            TransformKind::Square => Self::square(),
            TransformKind::Bounded(bounds) => Self::new(BoundsTransform::new(bounds)),
            TransformKind::Fixed => Self::fixed(),
        };
        Ok(transform)
    }
}

impl Deref for Transform {
    type Target = dyn Transformation;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl PartialEq for Transform {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || self.0.key() == other.0.key()
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Transform({})", self.0.key())
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.key())
    }
}
