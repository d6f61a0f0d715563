//! Integration tests for transforms, fixes and priors

use crate::test_helpers::{approx_eq, RegressionModel};
use approx::assert_relative_eq;
use paramz_rs::parameters::{Constrainable, Node, Prior, Transform};
use paramz_rs::ParamzError;

#[test]
fn test_constraint_views_are_relative() {
    let m = RegressionModel::new();
    m.lengthscale.constrain_positive();
    m.noise.constrain_bounded(0.01, 1.0).unwrap();

    // constrain_bounded registers the logistic squashing transform
    let bounded = Transform::logistic(0.01, 1.0).unwrap();
    assert_eq!(m.gp.constraints().indices(&Transform::positive()), vec![1, 2]);
    assert_eq!(m.gp.constraints().indices(&bounded), vec![3]);
    assert_eq!(m.rbf.constraints().indices(&Transform::positive()), vec![1, 2]);
    assert_eq!(m.lengthscale.constraints().indices(&Transform::positive()), vec![0, 1]);
    assert!(m.variance.constraints().keys().is_empty());
    assert_eq!(m.gp.constraints().keys_at(3), vec![bounded]);
}

#[test]
fn test_container_constraint_covers_subtree() {
    let m = RegressionModel::new();
    m.rbf.constrain_positive();

    assert_eq!(m.gp.constraints().indices(&Transform::positive()), vec![0, 1, 2]);
    assert_eq!(m.variance.constraints().keys(), vec![Transform::positive()]);

    // Partially lifting it only touches the leaf
    assert_eq!(m.lengthscale.unconstrain_positive(), vec![0, 1]);
    assert_eq!(m.gp.constraints().indices(&Transform::positive()), vec![0]);
}

#[test]
fn test_constrain_moves_values_into_domain() {
    let leaf = Node::param("offset", vec![-1.0, 2.0]);
    leaf.constrain_positive();

    let values = leaf.values();
    assert!(values[0] > 0.0);
    assert_eq!(values[1], 2.0);

    leaf.constrain_bounded(0.0, 1.0).unwrap();
    assert!(leaf.values().iter().all(|&v| (0.0..=1.0).contains(&v)));
    assert_eq!(leaf.constraints().keys().len(), 1);
}

#[test]
fn test_unconstrain_unknown_transform_is_noop() {
    let m = RegressionModel::positive();
    assert!(m.noise.unconstrain(&[Transform::exponent()]).is_empty());
    assert!(m.noise.unconstrain_bounded(0.0, 1.0).unwrap().is_empty());
    assert_eq!(m.noise.constraints().keys(), vec![Transform::positive()]);
}

#[test]
fn test_fixing_part_of_a_model() {
    let m = RegressionModel::positive();
    m.lengthscale.fix(Some(1.5));

    assert!(m.lengthscale.is_fixed());
    assert!(!m.rbf.is_fixed());
    assert_eq!(m.lengthscale.values(), vec![1.5, 1.5]);
    assert_eq!(m.gp.fixed_mask(), Some(vec![false, true, true, false]));
    assert_eq!(m.rbf.fixed_mask(), Some(vec![false, true, true]));
    assert_eq!(m.noise.fixed_mask(), None);

    // Fixing replaces the positive transform
    assert_eq!(m.lengthscale.constraints().keys(), vec![Transform::fixed()]);

    assert_eq!(m.lengthscale.unfix(), vec![0, 1]);
    assert_eq!(m.gp.fixed_mask(), None);
    assert!(m.lengthscale.constraints().keys().is_empty());
}

#[test]
fn test_fix_whole_tree() {
    let m = RegressionModel::new();
    m.gp.fix(None);

    assert!(m.gp.is_fixed());
    assert!(m.noise.is_fixed());
    assert_eq!(m.gp.free_size(), 0);
    assert_eq!(m.gp.values(), vec![1.0, 0.5, 2.0, 0.1]);
}

#[test]
fn test_priors() {
    let m = RegressionModel::new();
    let gaussian = Prior::gaussian(0.0, 1.0).unwrap();
    m.variance.set_prior(gaussian.clone()).unwrap();

    // A Gaussian prior leaves the entries unconstrained
    assert!(m.variance.constraints().keys().is_empty());
    assert_eq!(m.gp.priors().indices(&gaussian), vec![0]);

    let expected = -0.5 * (2.0 * std::f64::consts::PI).ln() - 0.5;
    assert_relative_eq!(m.gp.log_prior(), expected, epsilon = 1e-12);
    assert_eq!(m.gp.log_prior_gradient(), vec![-1.0, 0.0, 0.0, 0.0]);
    assert_relative_eq!(m.noise.log_prior(), 0.0);

    assert_eq!(m.variance.unset_priors(&[]), vec![0]);
    assert!(m.gp.priors().keys().is_empty());
}

#[test]
fn test_positive_prior_constrains_and_validates() {
    let m = RegressionModel::new();
    let gamma = Prior::gamma(2.0, 1.0).unwrap();

    m.lengthscale.set_prior(gamma.clone()).unwrap();
    assert_eq!(m.lengthscale.constraints().keys(), vec![Transform::positive()]);
    assert!(approx_eq(
        m.lengthscale.log_prior(),
        gamma.lnpdf(0.5) + gamma.lnpdf(2.0),
        1e-12
    ));

    let shift = Node::param("shift", vec![-0.5]);
    assert!(matches!(
        shift.set_prior(Prior::log_gaussian(0.0, 1.0).unwrap()),
        Err(ParamzError::InvalidPrior(_))
    ));
    assert!(shift.priors().keys().is_empty());
}

#[test]
fn test_priors_survive_structural_edits() {
    let m = RegressionModel::new();
    let prior = Prior::gaussian(1.0, 0.5).unwrap();
    m.noise.set_prior(prior.clone()).unwrap();

    let extra = Node::param("mean", vec![0.0, 0.0]);
    m.gp.add_parameter(&extra, Some(0)).unwrap();
    assert_eq!(m.gp.priors().indices(&prior), vec![5]);

    m.gp.remove_parameter(&m.noise).unwrap();
    assert!(m.gp.priors().keys().is_empty());
    assert_eq!(m.noise.priors().indices(&prior), vec![0]);
    assert_relative_eq!(m.noise.log_prior(), prior.lnpdf(0.1));
}
