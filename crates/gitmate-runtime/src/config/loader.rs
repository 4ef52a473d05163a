//! Layered loading of [`GitmateConfig`].
//!
//! Sources are merged in this order, later ones winning:
//!
//! 1. `GitmateConfig::default()`
//! 2. values passed to [`ConfigLoader::merge`]
//! 3. `gitmate.<profile>.toml`, then `gitmate.toml` (or `config.toml`) from
//!    the first search directory that has one; YAML names are tried the same
//!    way when `yaml-config` is enabled
//! 4. `GITMATE_*` environment variables, with `__` between nesting levels
//!
//! An explicit [`ConfigLoader::file`] replaces step 3. Search directories
//! default to the working directory and `~/.config/gitmate`.
//!
//! ```text
//! GITMATE_BOT__SIGNATURE="via GitMate"      bot.signature
//! GITMATE_EXECUTION__TIME_LIMIT_SECS=600    execution.time_limit_secs
//! GITMATE_EXECUTION__WORKERS__ANALYSIS=1    execution.workers.analysis
//! GITMATE_PROFILE=production                selects the profile file
//! ```
//!
//! ```rust,ignore
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .file("deploy/gitmate.toml")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::GitmateConfig;

const ENV_PREFIX: &str = "GITMATE_";

#[cfg(feature = "toml-config")]
const TOML_NAMES: &[&str] = &["gitmate.toml", "config.toml"];
#[cfg(feature = "yaml-config")]
const YAML_NAMES: &[&str] = &["gitmate.yaml", "gitmate.yml", "config.yaml", "config.yml"];

/// Selects which `gitmate.<profile>.*` file is layered under the base file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Case-insensitive; `dev` and `prod` are accepted.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// `GITMATE_PROFILE`, or development when unset.
    pub fn from_env() -> Self {
        std::env::var("GITMATE_PROFILE")
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds a [`GitmateConfig`] from defaults, files and the environment.
pub struct ConfigLoader {
    overrides: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            overrides: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            file: None,
        }
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a directory to look for configuration files in. Once any is
    /// added, the default directories are no longer searched.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    /// Loads exactly this file instead of searching. It must exist.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Layers `config` over the defaults, below files and environment.
    pub fn merge(mut self, config: GitmateConfig) -> Self {
        self.overrides = self.overrides.merge(Serialized::defaults(config));
        self
    }

    pub fn load(self) -> ConfigResult<GitmateConfig> {
        let profile = self.profile.clone();
        let config: GitmateConfig = self
            .figment()?
            .extract()
            .map_err(|e| ConfigError::Extract(e.to_string()))?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            time_limit_secs = config.execution.time_limit_secs,
            scheduler = config.scheduler.enabled,
            "Configuration loaded"
        );
        Ok(config)
    }

    fn figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(GitmateConfig::default()))
            .merge(std::mem::take(&mut self.overrides));

        figment = match self.file.take() {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::FileNotFound(path));
                }
                info!(path = %path.display(), "Loading configuration file");
                merge_file(figment, &path)?
            }
            None => self.search(figment),
        };

        if self.load_env {
            trace!(prefix = ENV_PREFIX, "Reading environment overrides");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["PROFILE"]).split("__"));
        }
        Ok(figment)
    }

    fn directories(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        std::env::current_dir()
            .ok()
            .into_iter()
            .chain(dirs::config_dir().map(|dir| dir.join("gitmate")))
            .collect()
    }

    #[allow(unused_mut)]
    fn search(&self, mut figment: Figment) -> Figment {
        let directories = self.directories();
        let mut found = false;

        #[cfg(feature = "toml-config")]
        {
            let merged = self.search_names(figment, &directories, TOML_NAMES, |f, p| {
                f.merge(Toml::file(p))
            });
            figment = merged.0;
            found |= merged.1;
        }

        #[cfg(feature = "yaml-config")]
        {
            let merged = self.search_names(figment, &directories, YAML_NAMES, |f, p| {
                f.merge(Yaml::file(p))
            });
            figment = merged.0;
            found |= merged.1;
        }

        if !found {
            warn!("No configuration file found, running with defaults");
        }
        figment
    }

    /// Merges the profile variant of each name before the name itself and
    /// stops at the first base file that exists.
    #[cfg(any(feature = "toml-config", feature = "yaml-config"))]
    fn search_names(
        &self,
        mut figment: Figment,
        directories: &[PathBuf],
        names: &[&str],
        merge: impl Fn(Figment, &Path) -> Figment,
    ) -> (Figment, bool) {
        for directory in directories {
            for name in names {
                let Some((stem, ext)) = name.rsplit_once('.') else {
                    continue;
                };

                let profiled = directory.join(format!("{stem}.{}.{ext}", self.profile));
                if profiled.exists() {
                    debug!(
                        path = %profiled.display(),
                        profile = %self.profile,
                        "Loading profile configuration"
                    );
                    figment = merge(figment, &profiled);
                }

                let base = directory.join(name);
                if base.exists() {
                    info!(path = %base.display(), "Loading configuration file");
                    return (merge(figment, &base), true);
                }
            }
        }
        (figment, false)
    }
}

fn merge_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    match ext {
        #[cfg(feature = "toml-config")]
        "toml" => Ok(figment.merge(Toml::file(path))),
        #[cfg(feature = "yaml-config")]
        "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LogLevel;

    #[test]
    fn test_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigLoader::new()
            .search_path(dir.path())
            .without_env()
            .load()
            .unwrap();

        assert_eq!(config.logging.level.as_str(), "info");
        assert_eq!(config.execution.time_limit_secs, 3600);
        assert_eq!(config.execution.workers.short, 4);
        assert!(config.scheduler.enabled);
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_load_specific_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deploy.toml");
        std::fs::write(
            &path,
            r#"
[logging]
level = "debug"

[execution]
time_limit_secs = 120

[execution.workers]
long = 3
"#,
        )
        .unwrap();

        let config = ConfigLoader::new().file(&path).without_env().load().unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.execution.time_limit_secs, 120);
        assert_eq!(config.execution.workers.long, 3);
        // untouched fields keep their defaults
        assert_eq!(config.execution.workers.short, 4);
        assert_eq!(config.execution.queue_capacity, 1024);
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_profile_file_is_overridden_by_base_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("gitmate.production.toml"),
            "[bot]\nsignature = \"prod-bot\"\n\n[scheduler]\nenabled = false\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("gitmate.toml"), "[bot]\nsignature = \"base-bot\"\n").unwrap();

        let config = ConfigLoader::new()
            .profile("prod")
            .search_path(dir.path())
            .without_env()
            .load()
            .unwrap();
        assert_eq!(config.bot.signature, "base-bot");
        assert!(!config.scheduler.enabled);
    }

    #[test]
    fn test_missing_file() {
        let result = ConfigLoader::new()
            .file("/nonexistent/gitmate.toml")
            .without_env()
            .load();
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gitmate.ini");
        std::fs::write(&path, "level=debug").unwrap();

        let result = ConfigLoader::new().file(&path).without_env().load();
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(ext)) if ext == "ini"));
    }

    #[test]
    fn test_profile_parse() {
        assert_eq!(Profile::parse("PROD"), Profile::Production);
        assert_eq!(Profile::parse("dev"), Profile::Development);
        assert_eq!(Profile::parse("staging"), Profile::Custom("staging".into()));
    }
}
