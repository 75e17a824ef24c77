use crate::comb;
use crate::fuzz::ArtifactLayout;
use crate::lint::LintConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "buildaid.toml";

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct FuzzSettings {
    /// Defaults to `<tmpdir>/fuzzing` when unset.
    pub output_root: Option<PathBuf>,
    #[serde(default)]
    pub layout: ArtifactLayout,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct StampSettings {
    #[serde(default)]
    pub run_number: bool,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct CombSettings {
    #[serde(default = "default_comb_size")]
    pub size: usize,
}

pub fn default_comb_size() -> usize {
    comb::DEFAULT_SIZE
}

impl Default for CombSettings {
    fn default() -> Self {
        Self {
            size: default_comb_size(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct BuildaidConfig {
    #[serde(default)]
    pub fuzz: FuzzSettings,
    #[serde(default)]
    pub stamp: StampSettings,
    #[serde(default)]
    pub comb: CombSettings,
    #[serde(default)]
    pub lint: LintConfig,
}

impl BuildaidConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        Self::from_toml(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Explicit path if given, else `buildaid.toml` in `dir` when present,
    /// else built-in defaults.
    pub fn discover(explicit: Option<&Path>, dir: &Path) -> Result<Self, anyhow::Error> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }
        let default_path = dir.join(DEFAULT_CONFIG_FILE);
        if default_path.is_file() {
            tracing::debug!(path = %default_path.display(), "loading default config");
            return Self::load_from_file(&default_path);
        }
        Ok(Self::default())
    }
}
