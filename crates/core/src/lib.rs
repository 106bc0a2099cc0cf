//! Core traits and types for dutytune.
//!
//! This crate defines the shared abstractions that solvers, observers, and
//! the simulation adapter build on:
//!
//! - [`Model`]: a stateful callable that maps a typed input to a typed output
//! - [`Snapshot`]: a captured input/output pair from a model call
//! - [`Observer`]: receives solver events and optionally returns control actions
//! - [`OptimizationProblem`]: adapts solver variables to model inputs and
//!   extracts an objective and inequality residuals from outputs
//! - [`Bounds`]: per-variable box bounds in solver units

mod bounds;
mod model;
mod observer;
mod problems;

pub use bounds::{Bounds, BoundsError};
pub use observer::Observer;
pub use problems::OptimizationProblem;
pub use {model::Model, model::Snapshot};
