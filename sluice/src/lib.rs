//! The sluice workload runner
//!
//! A workload is a list of steps, each step a mix of units. Every unit is a
//! named set of parameters whose values are generated together as one
//! [`step::Transaction`]. This crate parses workloads from YAML and runs
//! their steps on top of the sluice queue.

#![deny(clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![allow(clippy::multiple_crate_versions)]

pub mod config;
pub mod step;
