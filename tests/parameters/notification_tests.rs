//! Integration tests for observers and parameters_changed hooks

use crate::test_helpers::RegressionModel;
use ndarray::array;
use paramz_rs::parameters::{
    Constrainable, Named, Node, Observable, ObserverId, PRIORITY_DEFAULT,
};
use std::cell::RefCell;
use std::rc::Rc;

type Log = Rc<RefCell<Vec<String>>>;

fn record_hooks(nodes: &[&Node]) -> Log {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    for node in nodes {
        let log = Rc::clone(&log);
        node.set_parameters_changed(move |node| log.borrow_mut().push(node.name()));
    }
    log
}

#[test]
fn test_every_mutation_path_notifies() {
    let m = RegressionModel::new();
    let log = record_hooks(&[&m.gp]);

    m.noise.set(&[0.2]).unwrap();
    m.lengthscale.set_value(1, 3.0).unwrap();
    m.gp.set_free_vector(&array![-1.0, 1.0, 1.0, 1.0]).unwrap();
    // Projects the negative variance, which is a write
    m.variance.constrain_positive();
    m.noise.fix(Some(0.5));

    assert_eq!(log.borrow().len(), 5);
}

#[test]
fn test_gradient_writes_are_silent() {
    let m = RegressionModel::new();
    let log = record_hooks(&[&m.gp, &m.rbf]);

    m.lengthscale.set_gradient(&[1.0, 2.0]).unwrap();
    assert!(log.borrow().is_empty());
}

#[test]
fn test_cascade_order() {
    let m = RegressionModel::new();
    let log = record_hooks(&[&m.gp, &m.rbf]);

    m.lengthscale.set(&[1.0, 1.0]).unwrap();
    assert_eq!(*log.borrow(), vec!["rbf", "gp"]);

    // The noise is not under the kernel
    log.borrow_mut().clear();
    m.noise.set(&[0.3]).unwrap();
    assert_eq!(*log.borrow(), vec!["gp"]);

    log.borrow_mut().clear();
    m.gp.trigger_params_changed(true);
    assert_eq!(*log.borrow(), vec!["rbf", "gp"]);
}

#[test]
fn test_observers_run_by_priority() {
    let leaf = Node::param("leaf", vec![0.0]);
    let log: Log = Rc::new(RefCell::new(Vec::new()));

    for (tag, priority) in [("low", -5), ("high", 10), ("default", PRIORITY_DEFAULT), ("high2", 10)] {
        let log = Rc::clone(&log);
        leaf.add_observer(
            ObserverId::next(),
            priority,
            Rc::new(move |_: &Node| log.borrow_mut().push(tag.to_string())),
        );
    }

    leaf.set(&[1.0]).unwrap();
    assert_eq!(*log.borrow(), vec!["high", "high2", "default", "low"]);
}

#[test]
fn test_remove_observer() {
    let m = RegressionModel::new();
    let count = Rc::new(RefCell::new(0));
    let subscriber = ObserverId::next();

    let sink = Rc::clone(&count);
    m.gp.add_observer(subscriber, PRIORITY_DEFAULT, Rc::new(move |_: &Node| *sink.borrow_mut() += 1));
    m.variance.set(&[2.0]).unwrap();
    assert_eq!(*count.borrow(), 1);

    m.gp.remove_observer(subscriber);
    m.variance.set(&[3.0]).unwrap();
    assert_eq!(*count.borrow(), 1);
}

#[test]
fn test_detached_child_stops_notifying() {
    let m = RegressionModel::new();
    let log = record_hooks(&[&m.gp]);

    m.gp.remove_parameter(&m.noise).unwrap();
    log.borrow_mut().clear();

    m.noise.set(&[1.0]).unwrap();
    assert!(log.borrow().is_empty());
}

#[test]
fn test_structural_edits_run_hooks_upward() {
    let m = RegressionModel::new();
    let log = record_hooks(&[&m.gp, &m.rbf]);

    m.rbf.add_parameter(&Node::param("period", vec![1.0]), None)
        .unwrap();
    assert_eq!(*log.borrow(), vec!["rbf", "gp"]);
}

#[test]
fn test_moving_a_child_runs_hooks_once() {
    let m = RegressionModel::new();
    let log = record_hooks(&[&m.gp, &m.rbf]);

    m.rbf.add_parameter(&m.lengthscale, Some(0)).unwrap();
    assert_eq!(m.rbf.names(), vec!["lengthscale", "variance"]);
    assert_eq!(*log.borrow(), vec!["rbf", "gp"]);

    log.borrow_mut().clear();
    m.gp.add_parameter(&m.noise, Some(0)).unwrap();
    assert_eq!(m.gp.values(), vec![0.1, 0.5, 2.0, 1.0]);
    assert_eq!(*log.borrow(), vec!["gp"]);
}

#[test]
fn test_hook_that_derives_state() {
    // A container caching a derived quantity of its children
    let m = RegressionModel::positive();
    let signal = Rc::new(RefCell::new(0.0));
    let sink = Rc::clone(&signal);
    m.rbf.set_parameters_changed(move |rbf| {
        let values = rbf.values();
        *sink.borrow_mut() = values[0] / values[1..].iter().product::<f64>();
    });

    m.lengthscale.set(&[2.0, 5.0]).unwrap();
    assert_eq!(*signal.borrow(), 0.1);

    m.variance.set(&[4.0]).unwrap();
    assert_eq!(*signal.borrow(), 0.4);

    m.rbf.clear_parameters_changed();
    m.variance.set(&[8.0]).unwrap();
    assert_eq!(*signal.borrow(), 0.4);
}
