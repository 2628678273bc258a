use std::path::Path;

use anyhow::{bail, Context, Result};

/// Reads a runbook and refuses to hand back anything that is not YAML.
pub async fn load_runbook(path: &Path) -> Result<String> {
    let txt = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read runbook: {}", path.display()))?;
    check_runbook_yaml(&txt).with_context(|| format!("Invalid runbook {}", path.display()))?;
    Ok(txt)
}

/// Syntax-only check; policy semantics are evaluated by the backend.
pub fn check_runbook_yaml(txt: &str) -> Result<()> {
    if txt.trim().is_empty() {
        bail!("YAML is required.");
    }
    serde_yaml::from_str::<serde_yaml::Value>(txt).context("Invalid YAML")?;
    Ok(())
}
