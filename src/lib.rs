// Public API - the runner and the building blocks it wires together
pub mod compose;
pub mod coordination;
pub mod output;
pub mod runner;
pub mod setup;
pub mod telemetry;

// Internal modules
mod config;

#[cfg(test)]
mod integ_tests;
