//! Command implementations.

mod oelf;
mod rla;
mod run;

pub use run::{run_triggers, RunContext};
