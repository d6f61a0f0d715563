//! Finite difference gradients and gradient checking.
//!
//! [`checkgrad`] compares the analytic gradient a model reports with a
//! central-difference estimate taken in the optimizer's free space, one free
//! entry at a time.

use crate::config::GradCheckConfig;
use crate::error::{ParamzError, Result};
use crate::parameters::{Constrainable, Indexable, Named, Node};
use log::info;
use ndarray::Array1;

/// A scalar objective over a parameter tree.
pub trait Objective {
    /// Root of the parameters the objective depends on.
    fn parameters(&self) -> &Node;

    /// Objective value at the current parameter values.
    fn objective(&self) -> f64;

    /// Gradient with respect to the constrained flat parameter vector.
    fn objective_gradient(&self) -> Vec<f64>;
}

/// Compute the gradient of a scalar function using central finite differences.
///
/// # Arguments
///
/// * `f` - The function to differentiate
/// * `params` - The point at which to evaluate the gradient
/// * `step` - The perturbation applied to each entry
///
/// # Returns
///
/// * `Result<Array1<f64>>` - The gradient vector
pub fn gradient<F>(mut f: F, params: &Array1<f64>, step: f64) -> Result<Array1<f64>>
where
    F: FnMut(&Array1<f64>) -> Result<f64>,
{
    let mut grad = Array1::zeros(params.len());
    for j in 0..params.len() {
        grad[j] = central_difference(&mut f, params, j, step)?;
    }
    Ok(grad)
}

/// Central difference of `f` along entry `index`.
pub fn central_difference<F>(f: &mut F, params: &Array1<f64>, index: usize, step: f64) -> Result<f64>
where
    F: FnMut(&Array1<f64>) -> Result<f64>,
{
    let mut params_forward = params.clone();
    params_forward[index] += step;

    let mut params_backward = params.clone();
    params_backward[index] -= step;

    let f_forward = f(&params_forward)?;
    let f_backward = f(&params_backward)?;
    Ok((f_forward - f_backward) / (2.0 * step))
}

/// Outcome for one free entry.
#[derive(Debug, Clone, PartialEq)]
pub struct GradCheckEntry {
    pub name: String,
    pub analytic: f64,
    pub numeric: f64,
    /// `numeric / analytic`
    pub ratio: f64,
    /// `|numeric - analytic|`
    pub difference: f64,
    pub passed: bool,
}

/// Outcome of a gradient check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GradCheckReport {
    pub entries: Vec<GradCheckEntry>,
}

impl GradCheckReport {
    /// Whether every checked entry passed. Vacuously true.
    pub fn passed(&self) -> bool {
        self.entries.iter().all(|entry| entry.passed)
    }

    pub fn failures(&self) -> Vec<&GradCheckEntry> {
        self.entries.iter().filter(|entry| !entry.passed).collect()
    }
}

/// Check every free entry of the model's parameters.
pub fn checkgrad<M: Objective + ?Sized>(model: &M, config: &GradCheckConfig) -> Result<GradCheckReport> {
    let free = model.parameters().free_size();
    check_entries(model, (0..free).collect(), config)
}

/// Check only the free entries belonging to `target`, a node inside the
/// model's parameter tree.
pub fn checkgrad_param<M: Objective + ?Sized>(
    model: &M,
    target: &Node,
    config: &GradCheckConfig,
) -> Result<GradCheckReport> {
    let params = model.parameters();
    let start = params.offset_for(target).ok_or_else(|| {
        ParamzError::ParameterNotFound(format!(
            "{} is not part of {}",
            target.hierarchy_name(),
            params.hierarchy_name()
        ))
    })?;
    let end = start + target.size();

    let mask = params.fixed_mask().unwrap_or_else(|| vec![false; params.size()]);
    let selected = mask
        .iter()
        .enumerate()
        .filter(|(_, &fixed)| !fixed)
        .map(|(position, _)| position)
        .enumerate()
        .filter(|&(_, position)| position >= start && position < end)
        .map(|(free_index, _)| free_index)
        .collect();
    check_entries(model, selected, config)
}

fn check_entries<M: Objective + ?Sized>(
    model: &M,
    selected: Vec<usize>,
    config: &GradCheckConfig,
) -> Result<GradCheckReport> {
    let params = model.parameters();
    // Restored verbatim; a trip through f(finv(x)) is not exact
    let saved = params.values();
    let entries = compare_entries(model, selected, config);

    params.write_values(&saved);
    params.trigger_params_changed(true);
    Ok(GradCheckReport { entries: entries? })
}

fn compare_entries<M: Objective + ?Sized>(
    model: &M,
    selected: Vec<usize>,
    config: &GradCheckConfig,
) -> Result<Vec<GradCheckEntry>> {
    let params = model.parameters();
    let x0 = params.free_vector();
    let names = params.free_parameter_names();
    let analytic = params.transform_gradient(&model.objective_gradient())?;

    let mut objective = |x: &Array1<f64>| -> Result<f64> {
        params.set_free_vector(x)?;
        Ok(model.objective())
    };

    let mut entries = Vec::with_capacity(selected.len());
    for j in selected {
        let numeric = central_difference(&mut objective, &x0, j, config.step)?;
        let analytic = analytic[j];
        let ratio = numeric / analytic;
        let difference = (numeric - analytic).abs();
        let passed = (1.0 - ratio).abs() < config.tolerance || difference < config.tolerance;

        if config.verbose {
            info!(
                "{:<30} | ratio {:>12.6} | analytic {:>12.6e} | numeric {:>12.6e} | {}",
                names[j],
                ratio,
                analytic,
                numeric,
                if passed { "ok" } else { "FAILED" }
            );
        }

        entries.push(GradCheckEntry {
            name: names[j].clone(),
            analytic,
            numeric,
            ratio,
            difference,
            passed,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    // f(x, y) = x^2 + 2*y^2 + x*y
    fn test_function(params: &Array1<f64>) -> Result<f64> {
        let x = params[0];
        let y = params[1];
        Ok(x.powi(2) + 2.0 * y.powi(2) + x * y)
    }

    #[test]
    fn test_gradient() {
        // ∂f/∂x = 2x + y = 7, ∂f/∂y = 4y + x = 14 at (2, 3)
        let params = array![2.0, 3.0];
        let grad = gradient(test_function, &params, 1e-6).unwrap();

        assert_eq!(grad.len(), 2);
        assert_relative_eq!(grad[0], 7.0, epsilon = 1e-5);
        assert_relative_eq!(grad[1], 14.0, epsilon = 1e-5);
    }

    /// Sum of squares of a positive parameter `a` and a free parameter `b`.
    struct Quadratic {
        params: Node,
        a: Node,
        b: Node,
        broken: bool,
    }

    impl Quadratic {
        fn new(broken: bool) -> Self {
            let params = Node::container("quadratic");
            let a = Node::param("a", vec![1.5, 0.5]);
            let b = Node::param("b", vec![-2.0]);
            params.add_parameters(&[a.clone(), b.clone()]).unwrap();
            a.constrain_positive();
            Self {
                params,
                a,
                b,
                broken,
            }
        }
    }

    impl Objective for Quadratic {
        fn parameters(&self) -> &Node {
            &self.params
        }

        fn objective(&self) -> f64 {
            self.params.values().iter().map(|v| v * v).sum()
        }

        fn objective_gradient(&self) -> Vec<f64> {
            let mut gradient: Vec<f64> = self.params.values().iter().map(|v| 2.0 * v).collect();
            if self.broken {
                gradient[2] += 1.0;
            }
            gradient
        }
    }

    #[test]
    fn test_checkgrad_passes_for_correct_gradient() {
        let model = Quadratic::new(false);
        let before = model.params.values();

        let report = checkgrad(&model, &GradCheckConfig::default()).unwrap();
        assert_eq!(report.entries.len(), 3);
        assert!(report.passed());
        assert_eq!(report.entries[2].name, "b[0]");
        assert_eq!(model.params.values(), before);
    }

    #[test]
    fn test_checkgrad_detects_wrong_gradient() {
        let model = Quadratic::new(true);
        let report = checkgrad(&model, &GradCheckConfig::default()).unwrap();
        assert!(!report.passed());
        assert_eq!(report.failures().len(), 1);
        assert_eq!(report.failures()[0].name, "b[0]");
    }

    #[test]
    fn test_checkgrad_restores_transformed_values_exactly() {
        let model = Quadratic::new(false);
        model.a.set(&[0.3, 1.7]).unwrap();
        model.a.constrain_bounded(0.1, 5.0).unwrap();
        model.b.set(&[2.2]).unwrap();
        model.b.constrain_positive();
        let before = model.params.values();

        checkgrad(&model, &GradCheckConfig::default()).unwrap();
        assert_eq!(model.params.values(), before);
    }

    #[test]
    fn test_checkgrad_param_restricts_entries() {
        let model = Quadratic::new(true);
        let report = checkgrad_param(&model, &model.a, &GradCheckConfig::default()).unwrap();
        assert_eq!(report.entries.len(), 2);
        assert!(report.passed());

        model.a.fix(None);
        let report = checkgrad_param(&model, &model.b, &GradCheckConfig::default()).unwrap();
        assert_eq!(report.entries.len(), 1);
        assert!(!report.passed());

        let stranger = Node::param("stranger", vec![0.0]);
        assert!(checkgrad_param(&model, &stranger, &GradCheckConfig::default()).is_err());
    }
}
