use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tabula::MathConfig;
use tracing::info;

/// Settings read from `--config`.
///
/// ```toml
/// prompt = "> "
///
/// [math]
/// precision = 34
/// rounding = "half_even"
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub math: MathConfig,
    pub prompt: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self { math: MathConfig::default(), prompt: "tabula> ".into() }
    }
}

impl CliConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config = toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Install the math context for the rest of the process.
    pub fn apply(&self) {
        tabula::set_math_config(self.math);
    }
}
