//! # Parameter System
//!
//! Hierarchical, named parameters for numerical optimization. A model is a
//! tree of [`Node`]s: leaves hold numeric payloads, containers group them.
//! Every tree keeps its values in one contiguous buffer owned by the root, so
//! the whole model can be read and written as a single flat vector.
//!
//! ## Key Features
//!
//! - **Shared storage**: children alias their window of the root buffer, across
//!   any number of `add_parameter` / `remove_parameter` calls
//! - **Transforms**: constrain entries to a domain and optimize in unconstrained space
//! - **Fixing**: exclude entries from the free vector without removing them
//! - **Priors**: attach log densities to entries
//! - **Change propagation**: every value change reaches observers and runs each
//!   container's `parameters_changed` hook once, children first
//! - **Snapshots**: versioned, serde-serializable copies of a subtree
//!
//! ## Core Components
//!
//! - [`Node`]: the parameter handle, with the [`Named`], [`Indexable`],
//!   [`Observable`] and [`Constrainable`] capabilities
//! - [`Transform`] and [`Transformation`]: constraint bijections
//! - [`Prior`] and [`PriorDensity`]: prior distributions
//! - [`IndexRegistry`] and [`RegistryView`]: which transform or prior governs which entry
//! - [`ObserverBus`]: priority-ordered change listeners
//! - [`Snapshot`]: structured snapshot and restore
//!
//! ## Example Usage
//!
//! ```rust
//! use paramz_rs::parameters::{Constrainable, Indexable, Node};
//!
//! let kern = Node::container("rbf");
//! let variance = Node::param("variance", vec![1.0]);
//! let lengthscale = Node::param("lengthscale", vec![0.5]);
//! kern.add_parameters(&[variance.clone(), lengthscale.clone()]).unwrap();
//!
//! variance.constrain_positive();
//! lengthscale.fix(Some(2.0));
//!
//! // The optimizer only sees log-space variance
//! let x = kern.free_vector();
//! assert_eq!(x.len(), 1);
//!
//! kern.set_free_vector(&(x + 1.0)).unwrap();
//! assert!(variance.values()[0] > 1.0);
//! assert_eq!(lengthscale.values(), vec![2.0]);
//! assert_eq!(kern.size(), 2);
//! ```

pub mod bounds;
pub mod constrainable;
pub mod container;
pub mod index_registry;
pub mod node;
pub mod observer;
pub mod optimization;
pub mod priors;
pub mod snapshot;
pub mod transform;


// Re-export key types
pub use bounds::{Bounds, BoundsError, BoundsTransform};
pub use constrainable::Constrainable;
pub use index_registry::{IndexRegistry, RegistryView};
pub use node::{Indexable, Named, Node};
pub use observer::{
    Callback, Observable, ObserverBus, ObserverId, PRIORITY_DEFAULT, PRIORITY_PARAMETERS_CHANGED,
    PRIORITY_PASS_THROUGH,
};
pub use priors::{Gamma, Gaussian, LogGaussian, Prior, PriorDensity, PriorKind};
pub use snapshot::{NodeSnapshot, RegistryEntry, Snapshot, SNAPSHOT_VERSION};
pub use transform::{
    Exponent, Fixed, Logexp, Logistic, NegativeLogexp, Square, Transform, TransformKind,
    Transformation,
};
