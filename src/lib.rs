//! # paramz-rs
//!
//! `paramz-rs` is the bookkeeping layer underneath parameterized statistical
//! models: trees of named parameters sharing one flat buffer, constraint
//! transforms for unconstrained optimization, fixing, priors and ordered
//! change propagation.
//!
//! The library provides:
//! - A parameter tree with contiguous, aliased storage ([`parameters::Node`])
//! - Transforms, fixes and priors managed through index registries
//! - The free-vector bridge an unconstrained optimizer drives
//! - Memoization invalidated by parameter changes ([`caching::Cacher`])
//! - Finite-difference gradient checking ([`utils::finite_difference`])
//!
//! ## Basic Usage
//!
//! ```
//! use paramz_rs::parameters::{Constrainable, Node};
//!
//! let model = Node::container("model");
//! let noise = Node::param("noise", vec![0.1]);
//! model.add_parameter(&noise, None).unwrap();
//! noise.constrain_positive();
//!
//! let x = model.free_vector();
//! model.set_free_vector(&x).unwrap();
//! assert!((noise.values()[0] - 0.1).abs() < 1e-12);
//! ```

// Public modules
pub mod config;
pub mod error;

// Parameter system
pub mod parameters;

pub mod caching;
pub mod utils;

// Re-exports for convenience
pub use caching::Cacher;
pub use config::{CacheConfig, GradCheckConfig};
pub use error::{ParamzError, Result};
pub use parameters::{Constrainable, Indexable, Named, Node, Observable, Prior, Transform};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
