use anyhow::{Context, Result, anyhow, bail};
use serde_yaml::Value;
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

use super::merge::deep_merge;
use super::stub::{
    CONFIG_FILE_META_KEY, ENVIRONMENT_KEY, META_KEY, OUTPUT_FORMAT_KEY, TEST_BASEDIR_META_KEY,
    full_stub, test_stub,
};
use crate::output::OutputFormat;

/// Read the configuration file and merge it on top of the full stub
pub async fn load_setup(config_file: &Path) -> Result<Value> {
    let contents = match fs::read_to_string(config_file).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            bail!(
                "Could not find configuration file: {}",
                config_file.display()
            );
        }
        Err(e) => return Err(anyhow!("Unspecified IO error: {}", e)),
    };

    let file_data: Value = serde_yaml::from_str(&contents).with_context(|| {
        format!(
            "Failed to parse configuration file {}",
            config_file.display()
        )
    })?;

    if !(file_data.is_null() || file_data.is_mapping()) {
        bail!(
            "Configuration file {} must contain a mapping at the top level",
            config_file.display()
        );
    }

    info!("Read configuration file {}", config_file.display());
    Ok(deep_merge([&full_stub(), &file_data]))
}

/// Determine the protocol format selected by the configuration file
pub fn output_format(setup: &Value) -> Result<OutputFormat> {
    match setup.get(OUTPUT_FORMAT_KEY) {
        None => Ok(OutputFormat::default()),
        Some(value) => {
            let name = value
                .as_str()
                .ok_or_else(|| anyhow!("'{}' must be a string", OUTPUT_FORMAT_KEY))?;
            warn!("Text output format: {}", name);
            OutputFormat::parse(name)
        }
    }
}

/// Build the topmost configuration layer from command line settings
///
/// The layer records the configuration file and the output directory in
/// `meta` and adds every `KEY=VALUE` setting to `environment`.
pub fn prepare_overrides(
    config_file: &Path,
    test_basedir: &Path,
    env_settings: &[String],
) -> Result<Value> {
    let mut overrides = test_stub();

    overrides[META_KEY][CONFIG_FILE_META_KEY] = path_value(config_file);
    overrides[META_KEY][TEST_BASEDIR_META_KEY] = path_value(test_basedir);

    for setting in env_settings {
        let (key, value) = parse_env_setting(setting)?;
        overrides[ENVIRONMENT_KEY][key.as_str()] = Value::String(value);
    }

    Ok(overrides)
}

/// Split a `KEY=VALUE` setting at the first `=`
pub fn parse_env_setting(setting: &str) -> Result<(String, String)> {
    setting
        .split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| anyhow!("Invalid environment setting: {}", setting))
}

fn path_value(path: &Path) -> Value {
    Value::String(path.to_string_lossy().into_owned())
}
