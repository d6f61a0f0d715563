//! Prior distributions attached to parameters
//!
//! Priors are registered over flat positions exactly like transforms, in a
//! separate index registry. Their log densities add up to a node's
//! `log_prior()`.

use crate::error::{ParamzError, Result};
use rand::RngCore;
use rand_distr::Distribution;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, Gamma as GammaDensity, LogNormal, Normal};
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

/// A univariate prior density.
pub trait PriorDensity: fmt::Debug {
    /// Log density at `x`.
    fn lnpdf(&self, x: f64) -> f64;

    /// Derivative of the log density at `x`.
    fn lnpdf_grad(&self, x: f64) -> f64;

    /// Draw one sample.
    fn sample(&self, rng: &mut dyn RngCore) -> f64;

    /// Identity of the prior inside an index registry.
    fn key(&self) -> String;

    /// Serializable description, if this is one of the built-in priors.
    fn kind(&self) -> Option<PriorKind> {
        None
    }

    /// Whether the density is only supported on `x > 0`.
    fn positive_support(&self) -> bool {
        false
    }
}

/// Serializable description of the built-in priors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PriorKind {
    Gaussian { mu: f64, sigma: f64 },
    LogGaussian { mu: f64, sigma: f64 },
    Gamma { a: f64, b: f64 },
}

fn check_positive(what: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ParamzError::InvalidPrior(format!(
            "{} must be positive and finite, got {}",
            what, value
        )))
    }
}

fn invalid<E: fmt::Display>(error: E) -> ParamzError {
    ParamzError::InvalidPrior(error.to_string())
}

/// Normal prior `N(mu, sigma²)`.
#[derive(Debug, Clone, Copy)]
pub struct Gaussian {
    mu: f64,
    sigma: f64,
    density: Normal,
}

impl Gaussian {
    pub fn new(mu: f64, sigma: f64) -> Result<Self> {
        check_positive("sigma", sigma)?;
        let density = Normal::new(mu, sigma).map_err(invalid)?;
        Ok(Self { mu, sigma, density })
    }
}

impl PriorDensity for Gaussian {
    fn lnpdf(&self, x: f64) -> f64 {
        self.density.ln_pdf(x)
    }

    fn lnpdf_grad(&self, x: f64) -> f64 {
        -(x - self.mu) / (self.sigma * self.sigma)
    }

    fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        self.density.sample(rng)
    }

    fn key(&self) -> String {
        format!("N({}, {})", self.mu, self.sigma)
    }

    fn kind(&self) -> Option<PriorKind> {
        Some(PriorKind::Gaussian {
            mu: self.mu,
            sigma: self.sigma,
        })
    }
}

/// Log-normal prior: `ln x ~ N(mu, sigma²)`.
#[derive(Debug, Clone, Copy)]
pub struct LogGaussian {
    mu: f64,
    sigma: f64,
    density: LogNormal,
}

impl LogGaussian {
    pub fn new(mu: f64, sigma: f64) -> Result<Self> {
        check_positive("sigma", sigma)?;
        let density = LogNormal::new(mu, sigma).map_err(invalid)?;
        Ok(Self { mu, sigma, density })
    }
}

impl PriorDensity for LogGaussian {
    fn lnpdf(&self, x: f64) -> f64 {
        if x <= 0.0 {
            return f64::NEG_INFINITY;
        }
        self.density.ln_pdf(x)
    }

    fn lnpdf_grad(&self, x: f64) -> f64 {
        if x <= 0.0 {
            return 0.0;
        }
        -((x.ln() - self.mu) / (self.sigma * self.sigma) + 1.0) / x
    }

    fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        self.density.sample(rng)
    }

    fn key(&self) -> String {
        format!("lnN({}, {})", self.mu, self.sigma)
    }

    fn kind(&self) -> Option<PriorKind> {
        Some(PriorKind::LogGaussian {
            mu: self.mu,
            sigma: self.sigma,
        })
    }

    fn positive_support(&self) -> bool {
        true
    }
}

/// Gamma prior with shape `a` and rate `b`.
#[derive(Debug, Clone, Copy)]
pub struct Gamma {
    a: f64,
    b: f64,
    density: GammaDensity,
}

impl Gamma {
    pub fn new(a: f64, b: f64) -> Result<Self> {
        check_positive("shape", a)?;
        check_positive("rate", b)?;
        let density = GammaDensity::new(a, b).map_err(invalid)?;
        Ok(Self { a, b, density })
    }

    /// Gamma prior with the given mean and variance.
    pub fn from_mean_variance(mean: f64, variance: f64) -> Result<Self> {
        check_positive("mean", mean)?;
        check_positive("variance", variance)?;
        Self::new(mean * mean / variance, mean / variance)
    }
}

impl PriorDensity for Gamma {
    fn lnpdf(&self, x: f64) -> f64 {
        if x <= 0.0 {
            return f64::NEG_INFINITY;
        }
        self.density.ln_pdf(x)
    }

    fn lnpdf_grad(&self, x: f64) -> f64 {
        if x <= 0.0 {
            return 0.0;
        }
        (self.a - 1.0) / x - self.b
    }

    fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        self.density.sample(rng)
    }

    fn key(&self) -> String {
        format!("Ga({}, {})", self.a, self.b)
    }

    fn kind(&self) -> Option<PriorKind> {
        Some(PriorKind::Gamma {
            a: self.a,
            b: self.b,
        })
    }

    fn positive_support(&self) -> bool {
        true
    }
}

/// Shared, comparable handle to a [`PriorDensity`].
#[derive(Clone)]
pub struct Prior(Rc<dyn PriorDensity>);

impl Prior {
    pub fn new<P: PriorDensity + 'static>(prior: P) -> Self {
        Self(Rc::new(prior))
    }

    pub fn gaussian(mu: f64, sigma: f64) -> Result<Self> {
        Ok(Self::new(Gaussian::new(mu, sigma)?))
    }

    pub fn log_gaussian(mu: f64, sigma: f64) -> Result<Self> {
        Ok(Self::new(LogGaussian::new(mu, sigma)?))
    }

    pub fn gamma(a: f64, b: f64) -> Result<Self> {
        Ok(Self::new(Gamma::new(a, b)?))
    }

    pub fn from_kind(kind: &PriorKind) -> Result<Self> {
        match *kind {
            PriorKind::Gaussian { mu, sigma } => Self::gaussian(mu, sigma),
            PriorKind::LogGaussian { mu, sigma } => Self::log_gaussian(mu, sigma),
            PriorKind::Gamma { a, b } => Self::gamma(a, b),
        }
    }
}

impl Deref for Prior {
    type Target = dyn PriorDensity;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl PartialEq for Prior {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || self.0.key() == other.0.key()
    }
}

impl fmt::Debug for Prior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Prior({})", self.0.key())
    }
}

impl fmt::Display for Prior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.key())
    }
}
