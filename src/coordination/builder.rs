use anyhow::{Context, Result, anyhow, bail};
use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::setup::stub::{GLOBAL_KEY, TESTSET_GLOBAL_KEY, TESTSETS_KEY};
use crate::setup::test_config::scalar_to_string;
use crate::setup::{TestConfig, deep_merge};

/// One fully configured test of a test set
#[derive(Debug, Clone, PartialEq)]
pub struct TestSpec {
    pub name: String,
    pub config: TestConfig,
}

/// A named test set with its tests in configuration order
#[derive(Debug, Clone, PartialEq)]
pub struct TestSetSpec {
    pub name: String,
    pub tests: Vec<TestSpec>,
}

/// Build the ordered groups of test sets from the merged setup data
///
/// `testsets` is either a single mapping (one group) or a list of mappings.
/// Test sets of a group are ordered by name; with more than one group their
/// names get the group index as a two digit prefix. Every test is configured
/// as `global`, then the test set's `_global`, then the test itself, then
/// `overrides`.
pub fn build_test_set_groups(setup: &Value, overrides: &Value) -> Result<Vec<Vec<TestSetSpec>>> {
    let global = setup.get(GLOBAL_KEY).unwrap_or(&Value::Null);

    let empty = Mapping::new();
    let groups: Vec<&Mapping> = match setup.get(TESTSETS_KEY) {
        None | Some(Value::Null) => vec![&empty],
        Some(Value::Mapping(group)) => vec![group],
        Some(Value::Sequence(groups)) => groups
            .iter()
            .enumerate()
            .map(|(step, group)| match group {
                Value::Null => Ok(&empty),
                Value::Mapping(group) => Ok(group),
                _ => Err(anyhow!("Test set group {} must be a mapping", step)),
            })
            .collect::<Result<_>>()?,
        Some(_) => bail!("'{}' must be a mapping or a list of mappings", TESTSETS_KEY),
    };

    let prefix_names = groups.len() > 1;
    groups
        .into_iter()
        .enumerate()
        .map(|(step, group)| build_group(step, group, prefix_names, global, overrides))
        .collect()
}

fn build_group(
    step: usize,
    group: &Mapping,
    prefix_names: bool,
    global: &Value,
    overrides: &Value,
) -> Result<Vec<TestSetSpec>> {
    let mut testsets = group
        .iter()
        .map(|(name, tests)| Ok((key_name(name)?, tests)))
        .collect::<Result<Vec<(String, &Value)>>>()?;
    testsets.sort_by(|a, b| a.0.cmp(&b.0));

    testsets
        .into_iter()
        .map(|(name, tests)| {
            let name = if prefix_names {
                format!("{:02}-{}", step, name)
            } else {
                name
            };
            build_test_set(name, tests, global, overrides)
        })
        .collect()
}

fn build_test_set(
    name: String,
    tests: &Value,
    global: &Value,
    overrides: &Value,
) -> Result<TestSetSpec> {
    let empty = Mapping::new();
    let tests = match tests {
        Value::Null => &empty,
        Value::Mapping(tests) => tests,
        _ => bail!("Test set '{}' must be a mapping of tests", name),
    };

    let testset_globals = tests.get(TESTSET_GLOBAL_KEY).unwrap_or(&Value::Null);

    let mut specs = Vec::new();
    for (test_name, test_config) in tests {
        let test_name = key_name(test_name)?;
        if test_name == TESTSET_GLOBAL_KEY {
            continue;
        }
        if !(test_config.is_null() || test_config.is_mapping()) {
            bail!(
                "Test '{}' in test set '{}' must be a mapping",
                test_name,
                name
            );
        }

        let merged = deep_merge([global, testset_globals, test_config, overrides]);
        let config = TestConfig::from_value(merged)
            .with_context(|| format!("Test '{}' in test set '{}'", test_name, name))?;
        debug!("Configured test {}/{}", name, test_name);

        specs.push(TestSpec {
            name: test_name,
            config,
        });
    }

    Ok(TestSetSpec { name, tests: specs })
}

fn key_name(key: &Value) -> Result<String> {
    match key {
        Value::Null => None,
        key => scalar_to_string(key),
    }
    .ok_or_else(|| anyhow!("Test set and test names must be scalars, got {:?}", key))
}
