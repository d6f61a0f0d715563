//! Integration tests for building and editing parameter trees

use crate::test_helpers::RegressionModel;
use paramz_rs::parameters::{Constrainable, Indexable, Named, Node, Transform};
use paramz_rs::ParamzError;

#[test]
fn test_tree_layout() {
    let m = RegressionModel::new();

    assert_eq!(m.gp.size(), 4);
    assert_eq!(m.gp.values(), vec![1.0, 0.5, 2.0, 0.1]);
    assert_eq!(m.gp.num_params(), 2);
    assert_eq!(m.gp.names(), vec!["rbf", "noise"]);
    assert_eq!(
        m.gp.parameter_names(),
        vec!["rbf.variance", "rbf.lengthscale", "noise"]
    );

    assert_eq!(m.lengthscale.offset(), 1);
    assert_eq!(m.lengthscale.raveled_index(), vec![1, 2]);
    assert_eq!(m.noise.raveled_index(), vec![3]);
    assert_eq!(m.rbf.offset_for(&m.lengthscale), Some(1));
    assert_eq!(m.gp.offset_for(&m.noise), Some(3));
    assert_eq!(m.rbf.offset_for(&m.noise), None);

    assert_eq!(m.lengthscale.hierarchy_name(), "gp.rbf.lengthscale");
    assert!(m.lengthscale.root().ptr_eq(&m.gp));
    assert!(m.lengthscale.is_descendant_of(&m.gp));
    assert!(!m.gp.is_descendant_of(&m.lengthscale));
    assert!(m.gp.is_root());
    assert!(!m.rbf.is_root());
}

#[test]
fn test_path_lookup() {
    let m = RegressionModel::new();

    assert!(m.gp.get("rbf.lengthscale").unwrap().ptr_eq(&m.lengthscale));
    assert!(m.gp.child("noise").unwrap().ptr_eq(&m.noise));
    assert!(m.gp.child("variance").is_none());

    match m.gp.get("rbf.period") {
        Err(ParamzError::ParameterNotFound(path)) => assert_eq!(path, "gp.rbf.period"),
        other => panic!("expected ParameterNotFound, got {:?}", other),
    }
}

#[test]
fn test_building_top_down_matches_bottom_up() {
    // Attach the empty kernel first, then fill it
    let gp = Node::container("gp");
    let rbf = Node::container("rbf");
    let noise = Node::param("noise", vec![0.1]);
    gp.add_parameters(&[rbf.clone(), noise.clone()]).unwrap();

    let variance = Node::param("variance", vec![1.0]);
    let lengthscale = Node::param("lengthscale", vec![0.5, 2.0]);
    rbf.add_parameters(&[variance.clone(), lengthscale.clone()])
        .unwrap();

    let reference = RegressionModel::new();
    assert_eq!(gp.values(), reference.gp.values());
    assert_eq!(gp.parameter_names(), reference.gp.parameter_names());
    assert_eq!(noise.offset(), 3);
    assert!(noise.shares_storage_with(&variance));
}

#[test]
fn test_constraints_follow_moved_subtree() {
    let m = RegressionModel::new();
    m.lengthscale.constrain_positive();
    m.noise.fix(None);

    // Move the kernel behind the noise
    m.gp.add_parameter(&m.rbf, Some(1)).unwrap();
    assert_eq!(m.gp.names(), vec!["noise", "rbf"]);
    assert_eq!(m.gp.values(), vec![0.1, 1.0, 0.5, 2.0]);
    assert_eq!(m.gp.constraints().indices(&Transform::positive()), vec![2, 3]);
    assert_eq!(m.gp.fixed_mask(), Some(vec![true, false, false, false]));

    // Detach it entirely
    m.gp.remove_parameter(&m.rbf).unwrap();
    assert_eq!(m.gp.values(), vec![0.1]);
    assert!(m.gp.constraints().indices(&Transform::positive()).is_empty());
    assert_eq!(m.rbf.constraints().indices(&Transform::positive()), vec![1, 2]);
    assert_eq!(m.lengthscale.offset(), 1);
    assert!(m.rbf.is_root());
    assert!(!m.rbf.shares_storage_with(&m.gp));
}

#[test]
fn test_transplant_between_trees() {
    let a = RegressionModel::new();
    let b = RegressionModel::new();
    a.lengthscale.set(&[3.0, 4.0]).unwrap();
    a.lengthscale.constrain_positive();

    b.gp.add_parameter(&a.lengthscale, None).unwrap();

    assert_eq!(a.rbf.names(), vec!["variance"]);
    assert_eq!(a.gp.size(), 2);
    assert!(a.gp.constraints().keys().is_empty());

    assert_eq!(b.gp.names(), vec!["rbf", "noise", "lengthscale"]);
    assert_eq!(b.gp.values(), vec![1.0, 0.5, 2.0, 0.1, 3.0, 4.0]);
    assert_eq!(b.gp.constraints().indices(&Transform::positive()), vec![4, 5]);
    assert_eq!(a.lengthscale.hierarchy_name(), "gp.lengthscale");
}

#[test]
fn test_rename() {
    let m = RegressionModel::new();

    m.noise.rename("likelihood");
    assert!(m.gp.child("likelihood").unwrap().ptr_eq(&m.noise));
    assert!(m.gp.child("noise").is_none());

    m.noise.rename("rbf");
    assert_eq!(m.noise.name(), "rbf_1");
    assert!(m.gp.get("rbf_1").unwrap().ptr_eq(&m.noise));
}

#[test]
fn test_leaf_is_not_a_container() {
    let leaf = Node::param("leaf", vec![1.0]);
    let other = Node::param("other", vec![2.0]);

    assert!(matches!(
        leaf.add_parameter(&other, None),
        Err(ParamzError::NotAContainer { .. })
    ));
    assert!(matches!(
        leaf.remove_parameter(&other),
        Err(ParamzError::NotAContainer { .. })
    ));
}

#[test]
fn test_display_lists_leaves() {
    let m = RegressionModel::new();
    m.noise.constrain_positive();

    let table = m.gp.to_string();
    assert!(table.starts_with("gp\n"));
    assert!(table.contains("rbf.lengthscale"));
    assert!(table.contains("+ve"));
    assert_eq!(table.lines().count(), 4);
}
