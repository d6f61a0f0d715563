//! Bridge between a parameter tree and an unconstrained optimizer
//!
//! The optimizer works on the free vector: every non-fixed entry mapped
//! through the inverse of its transform. Writing a free vector back applies
//! the forward transforms and runs the notification cascade once.

use crate::error::{ParamzError, Result};
use crate::parameters::constrainable::Constrainable;
use crate::parameters::node::{Indexable, Named, Node};
use crate::parameters::observer::{Observable, PRIORITY_PASS_THROUGH};
use crate::parameters::priors::Prior;
use crate::parameters::transform::Transform;
use ndarray::Array1;
use rand::RngCore;
use rand_distr::{Distribution, StandardNormal};

impl Node {
    /// Non-fixed transform at every local position.
    fn transform_slots(&self) -> Vec<Option<Transform>> {
        let mut slots = vec![None; self.size()];
        for (transform, indices) in self.constraints().entries() {
            if transform.is_fixed() {
                continue;
            }
            for i in indices {
                slots[i] = Some(transform.clone());
            }
        }
        slots
    }

    fn free_mask(&self) -> Vec<bool> {
        match self.fixed_mask() {
            Some(mask) => mask.iter().map(|&fixed| !fixed).collect(),
            None => vec![true; self.size()],
        }
    }

    /// Number of entries an optimizer sees.
    pub fn free_size(&self) -> usize {
        self.free_mask().iter().filter(|&&free| free).count()
    }

    /// Values in unconstrained space, fixed entries dropped.
    pub fn free_vector(&self) -> Array1<f64> {
        let transforms = self.transform_slots();
        let free = self.free_mask();
        let values = self.values();

        values
            .iter()
            .zip(&transforms)
            .zip(&free)
            .filter(|(_, &free)| free)
            .map(|((&value, transform), _)| match transform {
                Some(transform) => transform.finv(value),
                None => value,
            })
            .collect()
    }

    /// Write an unconstrained vector back and run the cascade once.
    pub fn set_free_vector(&self, x: &Array1<f64>) -> Result<()> {
        let free_size = self.free_size();
        if x.len() != free_size {
            return Err(ParamzError::ShapeMismatch {
                name: self.hierarchy_name(),
                expected: free_size,
                actual: x.len(),
            });
        }

        let transforms = self.transform_slots();
        let free = self.free_mask();
        let mut values = self.values();
        let mut incoming = x.iter();

        for ((value, transform), &is_free) in values.iter_mut().zip(&transforms).zip(&free) {
            if !is_free {
                continue;
            }
            if let Some(&v) = incoming.next() {
                *value = match transform {
                    Some(transform) => transform.f(v),
                    None => v,
                };
            }
        }

        self.write_values(&values);
        self.trigger_params_changed(true);
        Ok(())
    }

    /// `name[i]` for every free entry, in free-vector order.
    pub fn free_parameter_names(&self) -> Vec<String> {
        let free = self.free_mask();
        let mut names = Vec::with_capacity(self.size());
        for (leaf, path) in self.flattened_parameters().iter().zip(self.parameter_names()) {
            for i in 0..leaf.size() {
                names.push(format!("{}[{}]", path, i));
            }
        }
        names
            .into_iter()
            .zip(free)
            .filter_map(|(name, free)| free.then_some(name))
            .collect()
    }

    /// Chain a gradient with respect to the constrained values through the
    /// transforms, dropping fixed entries.
    pub fn transform_gradient(&self, gradient: &[f64]) -> Result<Array1<f64>> {
        let size = self.size();
        if gradient.len() != size {
            return Err(ParamzError::ShapeMismatch {
                name: self.hierarchy_name(),
                expected: size,
                actual: gradient.len(),
            });
        }

        let transforms = self.transform_slots();
        let free = self.free_mask();
        let values = self.values();

        Ok(gradient
            .iter()
            .zip(&values)
            .zip(&transforms)
            .zip(&free)
            .filter(|(_, &free)| free)
            .map(|(((&g, &value), transform), _)| match transform {
                Some(transform) => g * transform.gradfactor(value),
                None => g,
            })
            .collect())
    }

    /// The stored gradient mapped to free-vector coordinates.
    pub fn free_gradient(&self) -> Array1<f64> {
        let gradient = self.gradient();
        self.transform_gradient(&gradient)
            .unwrap_or_else(|_| Array1::zeros(self.free_size()))
    }

    /// Depth-first notification cascade.
    ///
    /// Every descendant notifies its own observers but not its parent, so
    /// each container runs its recompute hook once. This node then notifies
    /// all its observers, including its parent when `trigger_parent` is set.
    pub fn trigger_params_changed(&self, trigger_parent: bool) {
        for child in self.children() {
            child.trigger_params_changed(false);
        }
        let min_priority = if trigger_parent {
            None
        } else {
            Some(PRIORITY_PASS_THROUGH)
        };
        self.notify_observers(None, min_priority);
    }

    /// Draw new values for the free entries.
    ///
    /// Entries with a prior are sampled from it. The others get a standard
    /// normal draw in unconstrained space, mapped through their transform.
    pub fn randomize<R: RngCore>(&self, rng: &mut R) {
        let transforms = self.transform_slots();
        let free = self.free_mask();
        let mut priors: Vec<Option<Prior>> = vec![None; self.size()];
        for (prior, indices) in self.priors().entries() {
            for i in indices {
                priors[i] = Some(prior.clone());
            }
        }

        let mut values = self.values();
        for (i, value) in values.iter_mut().enumerate() {
            if !free[i] {
                continue;
            }
            *value = match (&priors[i], &transforms[i]) {
                (Some(prior), _) => prior.sample(rng),
                (None, Some(transform)) => transform.f(StandardNormal.sample(rng)),
                (None, None) => StandardNormal.sample(rng),
            };
        }

        self.write_values(&values);
        self.trigger_params_changed(true);
    }
}
