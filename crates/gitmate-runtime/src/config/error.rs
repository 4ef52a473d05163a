//! Errors raised while reading or checking a [`GitmateConfig`](super::GitmateConfig).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// A file passed to [`ConfigLoader::file`](super::ConfigLoader::file) does not exist.
    #[error("configuration file {} does not exist", .0.display())]
    FileNotFound(PathBuf),

    /// No enabled format handles this extension. TOML needs the
    /// `toml-config` feature and YAML needs `yaml-config`.
    #[error("unsupported configuration format '.{0}'")]
    UnsupportedFormat(String),

    /// The merged sources do not fit the schema.
    #[error("cannot read configuration: {0}")]
    Extract(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// A setting that another one depends on is unset or blank.
    #[error("configuration requires '{0}'")]
    Required(&'static str),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
