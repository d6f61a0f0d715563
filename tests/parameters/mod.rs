//! Integration tests for the parameter system
//!
//! These tests verify that the parameter system behaves correctly in various scenarios.

// Adding, removing and navigating nodes
mod hierarchy_tests;

// Transforms, fixes and priors
mod constraints_tests;

// The optimizer-facing free vector
mod free_vector_tests;

// Observers and parameters_changed hooks
mod notification_tests;
