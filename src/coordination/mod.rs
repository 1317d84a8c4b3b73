pub mod builder;
pub mod group_runner;
pub mod testset;

pub use builder::{TestSetSpec, TestSpec, build_test_set_groups};
pub use group_runner::{GroupRunner, RunOutcome};
pub use testset::{TestSet, TestSetReport};
