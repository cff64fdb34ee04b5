use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::location::DEFAULT_SNAPSHOTS_DIR;

pub const CONFIG_FILE_NAME: &str = "abide.config.toml";
pub const CONFIG_PATH_ENV: &str = "ABIDE_CONFIG_PATH";
pub const UPDATE_ENV: &str = "ABIDE_UPDATE";
pub const SINGLE_RUN_ENV: &str = "ABIDE_SINGLE_RUN";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AbideConfig {
    /// Replacement values keyed by header name or JSON member name.
    pub defaults: BTreeMap<String, Value>,
    pub unified_diff: bool,
    pub allow_json_superset: bool,
    pub snapshots_dir: String,
}

impl Default for AbideConfig {
    fn default() -> Self {
        Self {
            defaults: BTreeMap::new(),
            unified_diff: false,
            allow_json_superset: true,
            snapshots_dir: DEFAULT_SNAPSHOTS_DIR.to_string(),
        }
    }
}

impl AbideConfig {
    /// Loads the discovered config file, or the default config when none
    /// exists.
    pub fn load() -> Result<Self> {
        let cwd = env::current_dir().context("failed to resolve current directory")?;
        let explicit = env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        match discover_config_path(explicit.as_deref(), &cwd) {
            Some(path) => Self::from_file(&path),
            None => {
                debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("failed to parse config TOML from {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Default for a header name; header names compare case-insensitively.
    #[must_use]
    pub fn header_default(&self, name: &str) -> Option<&Value> {
        self.defaults
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }
}

fn discover_config_path(explicit: Option<&Path>, cwd: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
    }

    [cwd.join(CONFIG_FILE_NAME), cwd.join("..").join(CONFIG_FILE_NAME)]
        .into_iter()
        .find(|path| path.is_file())
}

/// The run-mode switches of a test binary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunMode {
    pub update: bool,
    pub single_run: bool,
}

// libtest options that consume the following argument.
const VALUE_FLAGS: &[&str] = &[
    "--test-threads",
    "--skip",
    "--format",
    "--color",
    "--logfile",
    "--shuffle-seed",
    "-Z",
];

impl RunMode {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_parts(
            env::var(UPDATE_ENV).ok().as_deref(),
            env::var(SINGLE_RUN_ENV).ok().as_deref(),
            env::args().skip(1),
        )
    }

    /// `update` comes from the update flag value; `single_run` is set by its
    /// own flag or by a positional test-name filter among `args`.
    #[must_use]
    pub fn from_parts<I, S>(update: Option<&str>, single_run: Option<&str>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            update: is_truthy(update),
            single_run: is_truthy(single_run) || has_test_filter(args),
        }
    }
}

fn is_truthy(value: Option<&str>) -> bool {
    value.is_some_and(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes"
        )
    })
}

fn has_test_filter<I, S>(args: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut skip_next = false;
    for arg in args {
        let arg = arg.as_ref();
        if skip_next {
            skip_next = false;
            continue;
        }
        if VALUE_FLAGS.contains(&arg) {
            skip_next = true;
            continue;
        }
        if !arg.starts_with('-') {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_toml_with_defaults_table() {
        let config = AbideConfig::from_toml_str(
            r#"
unified_diff = true

[defaults]
Date = "<date>"
updated_at = 0
"#,
        )
        .expect("config should parse");

        assert!(config.unified_diff);
        assert!(config.allow_json_superset);
        assert_eq!(config.snapshots_dir, "__snapshots__");
        assert_eq!(config.defaults.get("Date"), Some(&json!("<date>")));
        assert_eq!(config.defaults.get("updated_at"), Some(&json!(0)));
        assert_eq!(config.header_default("date"), Some(&json!("<date>")));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(AbideConfig::from_toml_str("unified_diff = [").is_err());
    }

    #[test]
    fn discovery_prefers_explicit_then_cwd_then_parent() {
        let temp = tempfile::tempdir().expect("tempdir should be creatable");
        let child = temp.path().join("child");
        fs::create_dir_all(&child).expect("mkdir works");
        assert_eq!(discover_config_path(None, &child), None);

        let parent_file = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&parent_file, "").expect("write works");
        assert_eq!(
            discover_config_path(None, &child),
            Some(child.join("..").join(CONFIG_FILE_NAME))
        );

        let own_file = child.join(CONFIG_FILE_NAME);
        fs::write(&own_file, "").expect("write works");
        assert_eq!(discover_config_path(None, &child), Some(own_file));

        let explicit = temp.path().join("custom.toml");
        fs::write(&explicit, "").expect("write works");
        assert_eq!(
            discover_config_path(Some(explicit.as_path()), &child),
            Some(explicit.clone())
        );
    }

    #[test]
    fn run_mode_reads_flags_and_filters() {
        let none: [&str; 0] = [];
        assert_eq!(RunMode::from_parts(None, None, none), RunMode::default());
        assert!(RunMode::from_parts(Some("1"), None, none).update);
        assert!(RunMode::from_parts(Some("TRUE"), None, none).update);
        assert!(!RunMode::from_parts(Some("0"), None, none).update);
        assert!(RunMode::from_parts(None, Some("yes"), none).single_run);

        let threads_only = ["--test-threads", "4", "--nocapture"];
        assert!(!RunMode::from_parts(None, None, threads_only).single_run);

        let filtered = ["--nocapture", "api::users"];
        assert!(RunMode::from_parts(None, None, filtered).single_run);
    }
}
