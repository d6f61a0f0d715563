//! Configuration options for gradient checking and caching.
//!
//! Plain structs with sensible defaults, in the same spirit as solver
//! configuration elsewhere in the crate: construct with `Default::default()`
//! and override the fields you care about.

/// Default number of distinct argument tuples a [`Cacher`](crate::caching::Cacher) keeps.
pub const DEFAULT_CACHE_LIMIT: usize = 5;

/// Configuration options for [`checkgrad`](crate::utils::finite_difference::checkgrad).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradCheckConfig {
    /// Step size of the three point estimate. Default: 1e-6
    pub step: f64,

    /// Tolerance for the gradient ratio or difference. Default: 1e-3
    pub tolerance: f64,

    /// Whether to log every checked entry at info level. Default: false
    pub verbose: bool,
}

impl Default for GradCheckConfig {
    fn default() -> Self {
        Self {
            step: 1e-6,
            tolerance: 1e-3,
            verbose: false,
        }
    }
}

/// Configuration options for [`Cacher`](crate::caching::Cacher).
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Maximum number of cached argument tuples. `0` disables caching. Default: 5
    pub limit: usize,

    /// Argument positions left out of the cache key and never observed.
    /// Default: none
    pub ignore_args: Vec<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_CACHE_LIMIT,
            ignore_args: Vec::new(),
        }
    }
}
