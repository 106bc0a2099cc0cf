//! Tunes process-simulator operating variables (heater and reboiler duties,
//! a condenser duty, a split fraction) so the simulated stripped water meets
//! its contaminant limits at minimum utility cost.
//!
//! The pieces, leaf-first:
//!
//! - [`scale`]: maps between engineering units and the scaled search space
//! - [`simulation`]: drives an external simulator [`Session`] as a
//!   [`Model`], one run per evaluation
//! - [`formulation`]: turns simulator outputs into a cost plus residuals, or
//!   a single penalized cost
//! - [`driver`]: picks a solver, runs it, and verifies the optimum
//! - [`recorder`]: observes every evaluation and persists the trajectory
//! - [`config`]: TOML run files validated into a [`RunPlan`]
//! - [`runner`]: ties a session, a plan, and the log file together
//!
//! [`Session`]: simulation::Session
//! [`Model`]: dutytune_core::Model
//! [`RunPlan`]: config::RunPlan

pub mod config;
pub mod driver;
pub mod formulation;
pub mod recorder;
pub mod runner;
pub mod scale;
pub mod simulation;
