//! Reusable observers for dutytune solvers.
//!
//! This crate provides [`Observer`] implementations and capability traits that
//! work across solvers without naming their concrete event types.
//!
//! # Modules
//!
//! - [`traits`]: Capability traits for cross-solver observers
//!   ([`HasEvaluationCount`], [`CanStopEarly`])
//! - [`budget`]: [`EvaluationBudget`], which stops a run after a fixed
//!   number of model calls
//!
//! [`Observer`]: dutytune_core::Observer
//! [`HasEvaluationCount`]: traits::HasEvaluationCount
//! [`CanStopEarly`]: traits::CanStopEarly
//! [`EvaluationBudget`]: budget::EvaluationBudget

pub mod budget;
pub mod traits;

pub use budget::EvaluationBudget;
