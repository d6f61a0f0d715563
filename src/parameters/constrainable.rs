//! Constraints, fixes and priors on parameter nodes
//!
//! Every operation works on the node's own window and writes through to the
//! root registries. Fixing is the reserved [`Fixed`](crate::parameters::transform::Fixed)
//! transform plus the root's fixed mask; the mask disappears again once the
//! last entry of the tree is unfixed.

use crate::error::{ParamzError, Result};
use crate::parameters::node::{Indexable, Named, Node};
use crate::parameters::observer::Observable;
use crate::parameters::priors::Prior;
use crate::parameters::transform::Transform;
use log::{debug, warn};

/// Constraint and prior management.
pub trait Constrainable {
    /// Project the values into the transform's domain and make it the only
    /// transform over this node.
    fn constrain(&self, transform: Transform);

    /// Constrain to `(0, ∞)` through the softplus.
    fn constrain_positive(&self) {
        self.constrain(Transform::positive());
    }

    /// Constrain to `(-∞, 0)`.
    fn constrain_negative(&self) {
        self.constrain(Transform::negative());
    }

    /// Constrain to the open interval `(lower, upper)`.
    fn constrain_bounded(&self, lower: f64, upper: f64) -> Result<()> {
        self.constrain(Transform::logistic(lower, upper)?);
        Ok(())
    }

    /// Remove the given transforms (all of them if empty) and return the
    /// local positions that lost a transform.
    fn unconstrain(&self, transforms: &[Transform]) -> Vec<usize>;

    fn unconstrain_positive(&self) -> Vec<usize> {
        self.unconstrain(&[Transform::positive()])
    }

    fn unconstrain_negative(&self) -> Vec<usize> {
        self.unconstrain(&[Transform::negative()])
    }

    fn unconstrain_bounded(&self, lower: f64, upper: f64) -> Result<Vec<usize>> {
        Ok(self.unconstrain(&[Transform::logistic(lower, upper)?]))
    }

    /// Exclude every entry from optimization, optionally setting it to `value` first.
    fn fix(&self, value: Option<f64>);

    /// Undo [`fix`](Constrainable::fix). Returns the local positions that were fixed.
    fn unfix(&self) -> Vec<usize>;

    /// Whether every entry is fixed. Empty nodes are never fixed.
    fn is_fixed(&self) -> bool;

    /// `true` at fixed local positions, `None` when nothing here is fixed.
    fn fixed_mask(&self) -> Option<Vec<bool>>;

    /// Attach `prior` to every entry, replacing previous priors.
    fn set_prior(&self, prior: Prior) -> Result<()>;

    /// Remove the given priors (all of them if empty).
    fn unset_priors(&self, priors: &[Prior]) -> Vec<usize>;

    /// Sum of the log prior densities. `0.0` without priors.
    fn log_prior(&self) -> f64;

    /// Derivative of [`log_prior`](Constrainable::log_prior) per entry.
    fn log_prior_gradient(&self) -> Vec<f64>;
}

impl Node {
    /// Set or clear the root's fixed bits at global `positions`.
    pub(crate) fn update_fixes(&self, positions: &[usize], fixed: bool) {
        if positions.is_empty() {
            return;
        }
        let root = self.root();
        let mut inner = root.0.borrow_mut();
        let size = inner.size;
        let mask = inner.fixes.get_or_insert_with(|| vec![false; size]);
        for &i in positions.iter().filter(|&&i| i < size) {
            mask[i] = fixed;
        }
        let any_fixed = mask.iter().any(|&b| b);
        if !any_fixed {
            inner.fixes = None;
        }
    }
}

impl Constrainable for Node {
    fn constrain(&self, transform: Transform) {
        let current = self.values();
        let projected: Vec<f64> = current.iter().map(|&v| transform.initialize(v)).collect();
        if projected != current {
            warn!(
                "moving '{}' into the domain of {}",
                self.hierarchy_name(),
                transform
            );
            self.write_values(&projected);
            self.notify_observers(None, None);
        }

        let removed = self.unconstrain(&[]);
        if !removed.is_empty() {
            warn!("reconstraining parameters {}", self.hierarchy_name());
        }

        self.constraints().add(transform.clone(), 0..self.size());
        if transform.is_fixed() {
            self.update_fixes(&self.raveled_index(), true);
        }
    }

    fn unconstrain(&self, transforms: &[Transform]) -> Vec<usize> {
        let view = self.constraints();
        let targets = if transforms.is_empty() {
            view.keys()
        } else {
            transforms.to_vec()
        };

        let offset = self.offset();
        let mut removed = Vec::new();
        for transform in targets {
            let local = view.remove(&transform, 0..self.size());
            if local.is_empty() {
                debug!(
                    "{} is not applied to '{}', nothing to remove",
                    transform,
                    self.hierarchy_name()
                );
                continue;
            }
            if transform.is_fixed() {
                let global: Vec<usize> = local.iter().map(|&i| i + offset).collect();
                self.update_fixes(&global, false);
            }
            removed.extend(local);
        }

        removed.sort_unstable();
        removed.dedup();
        removed
    }

    fn fix(&self, value: Option<f64>) {
        if let Some(value) = value {
            self.write_values(&vec![value; self.size()]);
            self.notify_observers(None, None);
        }
        self.constrain(Transform::fixed());
    }

    fn unfix(&self) -> Vec<usize> {
        self.unconstrain(&[Transform::fixed()])
    }

    fn is_fixed(&self) -> bool {
        self.fixed_mask()
            .map_or(false, |mask| mask.iter().all(|&fixed| fixed))
    }

    fn fixed_mask(&self) -> Option<Vec<bool>> {
        let root = self.root();
        let (offset, size) = (self.offset(), self.size());
        let mask = root
            .0
            .borrow()
            .fixes
            .as_ref()
            .map(|mask| mask[offset..offset + size].to_vec());
        mask.filter(|mask| mask.iter().any(|&fixed| fixed))
    }

    fn set_prior(&self, prior: Prior) -> Result<()> {
        if prior.positive_support() {
            let negative = self.with_values(|values| values.iter().any(|&v| v <= 0.0));
            if negative {
                return Err(ParamzError::InvalidPrior(format!(
                    "{} has positive support but '{}' holds non-positive values",
                    prior,
                    self.hierarchy_name()
                )));
            }
            if self.constraints().keys().is_empty() {
                self.constrain_positive();
            }
        }

        let replaced = self.unset_priors(&[]);
        if !replaced.is_empty() {
            warn!("reprioritizing parameters {}", self.hierarchy_name());
        }
        self.priors().add(prior, 0..self.size());
        Ok(())
    }

    fn unset_priors(&self, priors: &[Prior]) -> Vec<usize> {
        let view = self.priors();
        let targets = if priors.is_empty() {
            view.keys()
        } else {
            priors.to_vec()
        };

        let mut removed: Vec<usize> = targets
            .iter()
            .flat_map(|prior| view.remove(prior, 0..self.size()))
            .collect();
        removed.sort_unstable();
        removed.dedup();
        removed
    }

    fn log_prior(&self) -> f64 {
        let entries = self.priors().entries();
        if entries.is_empty() {
            return 0.0;
        }
        self.with_values(|values| {
            entries
                .iter()
                .map(|(prior, indices)| indices.iter().map(|&i| prior.lnpdf(values[i])).sum::<f64>())
                .sum()
        })
    }

    fn log_prior_gradient(&self) -> Vec<f64> {
        let mut gradient = vec![0.0; self.size()];
        let entries = self.priors().entries();
        self.with_values(|values| {
            for (prior, indices) in &entries {
                for &i in indices {
                    gradient[i] += prior.lnpdf_grad(values[i]);
                }
            }
        });
        gradient
    }
}
