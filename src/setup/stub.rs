//! Structural skeletons merged underneath (and on top of) user configuration
//!
//! The stubs only contain empty mappings. Defaults for individual settings
//! are applied when a merged test configuration is converted into a
//! [`TestConfig`](super::TestConfig), so a stub used as the topmost layer can
//! never clobber values from the configuration file.

use serde_yaml::{Mapping, Value};

pub const META_KEY: &str = "meta";
pub const ENVIRONMENT_KEY: &str = "environment";
pub const GLOBAL_KEY: &str = "global";
pub const TESTSETS_KEY: &str = "testsets";
pub const OUTPUT_FORMAT_KEY: &str = "output_format";

/// Key inside a test set holding the settings shared by all its tests
pub const TESTSET_GLOBAL_KEY: &str = "_global";

/// Meta key holding the path of the configuration file
pub const CONFIG_FILE_META_KEY: &str = "_configfile";

/// Meta key holding the directory test artifacts are written to
pub const TEST_BASEDIR_META_KEY: &str = "test_basedir";

/// Skeleton of a single test configuration
pub fn test_stub() -> Value {
    let mut stub = Mapping::new();
    stub.insert(META_KEY.into(), Value::Mapping(Mapping::new()));
    stub.insert(ENVIRONMENT_KEY.into(), Value::Mapping(Mapping::new()));
    Value::Mapping(stub)
}

/// Skeleton of a complete configuration file
pub fn full_stub() -> Value {
    let mut stub = Mapping::new();
    stub.insert(GLOBAL_KEY.into(), test_stub());
    stub.insert(TESTSETS_KEY.into(), Value::Mapping(Mapping::new()));
    Value::Mapping(stub)
}
