//! Solvers for dutytune problems.
//!
//! Every solver drives a [`Model`] through an [`OptimizationProblem`] one
//! evaluation at a time and reports each evaluation to an [`Observer`].
//!
//! [`Model`]: dutytune_core::Model
//! [`OptimizationProblem`]: dutytune_core::OptimizationProblem
//! [`Observer`]: dutytune_core::Observer

pub mod optimization;
