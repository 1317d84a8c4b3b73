//! Configuration loading: layered YAML merging and typed test settings

pub mod loader;
pub mod merge;
pub mod stub;
pub mod test_config;

pub use loader::{load_setup, output_format, prepare_overrides};
pub use merge::deep_merge;
pub use test_config::{CommandSpec, Meta, TestConfig};
