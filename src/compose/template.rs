use anyhow::{Context, Result};
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::fs;

use crate::config::COMPOSE_FILE_NAME;

/// Replace `${NAME}` placeholders with values from the environment
///
/// Placeholders naming unknown variables are kept verbatim so that compose
/// can still resolve them from its own environment.
pub fn render_template(template: &str, environment: &BTreeMap<String, String>) -> String {
    static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();
    let placeholder_re = PLACEHOLDER_RE
        .get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("placeholder pattern is valid"));

    placeholder_re
        .replace_all(template, |caps: &Captures| match environment.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Render the compose template into the test directory
///
/// Returns the path of the written compose file.
pub async fn write_compose_file(
    template_path: &Path,
    test_dir: &Path,
    environment: &BTreeMap<String, String>,
) -> Result<PathBuf> {
    let template = fs::read_to_string(template_path).await.with_context(|| {
        format!(
            "Failed to read docker-compose template {}",
            template_path.display()
        )
    })?;

    let compose_path = test_dir.join(COMPOSE_FILE_NAME);
    fs::write(&compose_path, render_template(&template, environment))
        .await
        .with_context(|| format!("Failed to write {}", compose_path.display()))?;

    Ok(compose_path)
}
