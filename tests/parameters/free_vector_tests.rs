//! Integration tests for the optimizer-facing free vector

use crate::test_helpers::{array_approx_eq, slice_approx_eq, RegressionModel};
use approx::assert_relative_eq;
use ndarray::{array, Array1};
use paramz_rs::parameters::{Constrainable, Node, Prior};
use paramz_rs::ParamzError;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

#[test]
fn test_unconstrained_model_is_identity() {
    let m = RegressionModel::new();
    let x = m.gp.free_vector();
    assert_eq!(x, array![1.0, 0.5, 2.0, 0.1]);

    m.gp.set_free_vector(&array![2.0, 3.0, 4.0, 5.0]).unwrap();
    assert_eq!(m.lengthscale.values(), vec![3.0, 4.0]);
}

#[test]
fn test_round_trip_through_transforms() {
    let m = RegressionModel::positive();
    m.noise.constrain_bounded(0.01, 1.0).unwrap();
    let before = m.gp.values();

    let x = m.gp.free_vector();
    assert_eq!(x.len(), 4);
    assert!(x[0].abs() > 0.0);

    m.gp.set_free_vector(&x).unwrap();
    assert!(slice_approx_eq(&m.gp.values(), &before, 1e-10));
}

#[test]
fn test_any_free_vector_lands_in_domain() {
    let m = RegressionModel::positive();
    m.gp.set_free_vector(&array![-50.0, -3.0, 0.0, 40.0]).unwrap();

    assert!(m.gp.values().iter().all(|&v| v > 0.0));
    assert_relative_eq!(m.noise.values()[0], 40.0, epsilon = 1e-12);
}

#[test]
fn test_fixed_entries_are_invisible() {
    let m = RegressionModel::positive();
    m.variance.fix(None);

    assert_eq!(m.gp.free_size(), 3);
    assert_eq!(
        m.gp.free_parameter_names(),
        vec!["rbf.lengthscale[0]", "rbf.lengthscale[1]", "noise[0]"]
    );

    let x = m.gp.free_vector();
    m.gp.set_free_vector(&(x.clone() + 1.0)).unwrap();
    assert_eq!(m.variance.values(), vec![1.0]);
    assert!(array_approx_eq(&m.gp.free_vector(), &(x + 1.0), 1e-10));

    match m.gp.set_free_vector(&Array1::zeros(4)) {
        Err(ParamzError::ShapeMismatch {
            expected, actual, ..
        }) => {
            assert_eq!(expected, 3);
            assert_eq!(actual, 4);
        }
        other => panic!("expected ShapeMismatch, got {:?}", other),
    }
}

#[test]
fn test_free_vector_of_subtree() {
    let m = RegressionModel::positive();
    m.noise.fix(None);

    let x = m.rbf.free_vector();
    assert_eq!(x.len(), 3);
    m.rbf.set_free_vector(&Array1::zeros(3)).unwrap();

    let ln2 = std::f64::consts::LN_2;
    assert!(slice_approx_eq(&m.rbf.values(), &[ln2, ln2, ln2], 1e-12));
    assert_eq!(m.noise.values(), vec![0.1]);
}

#[test]
fn test_gradient_chain_rule() {
    let m = RegressionModel::positive();
    m.noise.fix(None);

    // d/dx softplus(x) = 1 - exp(-f)
    let gradient = m.gp.transform_gradient(&[1.0, 2.0, 3.0, 4.0]).unwrap();
    let factor = |f: f64| 1.0 - (-f).exp();
    let expected = array![factor(1.0), 2.0 * factor(0.5), 3.0 * factor(2.0)];
    assert!(array_approx_eq(&gradient, &expected, 1e-12));

    assert!(m.gp.transform_gradient(&[1.0]).is_err());
}

#[test]
fn test_stored_gradient() {
    let m = RegressionModel::new();
    m.lengthscale.set_gradient(&[0.3, -0.2]).unwrap();
    m.noise.fix(None);

    assert_eq!(m.gp.gradient(), vec![0.0, 0.3, -0.2, 0.0]);
    assert_eq!(m.gp.free_gradient(), array![0.0, 0.3, -0.2]);
    assert!(m.lengthscale.set_gradient(&[1.0]).is_err());
}

#[test]
fn test_randomize_is_reproducible() {
    let draw = |seed: u64| {
        let m = RegressionModel::positive();
        m.noise.fix(None);
        m.lengthscale
            .set_prior(Prior::gamma(2.0, 2.0).unwrap())
            .unwrap();
        m.gp.randomize(&mut ChaCha8Rng::seed_from_u64(seed));
        m.gp.values()
    };

    let first = draw(7);
    assert_eq!(first, draw(7));
    assert_ne!(first, draw(8));
    assert!(first.iter().all(|&v| v > 0.0));
    assert_eq!(first[3], 0.1);
}

#[test]
fn test_optimizer_loop() {
    // Minimise (v - 3)^2 over a positive scalar with plain gradient descent
    let model = Node::container("model");
    let v = Node::param("v", vec![1.0]);
    model.add_parameter(&v, None).unwrap();
    v.constrain_positive();

    for _ in 0..500 {
        let value = v.values()[0];
        let gradient = model.transform_gradient(&[2.0 * (value - 3.0)]).unwrap();
        let x = model.free_vector() - 0.1 * gradient;
        model.set_free_vector(&x).unwrap();
    }
    assert_relative_eq!(v.values()[0], 3.0, epsilon = 1e-6);
}
