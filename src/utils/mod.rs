//! Utility functions and helpers for the paramz-rs library.

pub mod finite_difference;

pub use finite_difference::{checkgrad, checkgrad_param, GradCheckEntry, GradCheckReport, Objective};
