use std::path::{Path, PathBuf};

use serde_aux::field_attributes::deserialize_number_from_string;

use crate::errors::ConfigError;
use crate::ops::secret::Direction;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "KTOOLHU_CONFIG";

/// Configuration file read when neither `--config` nor `KTOOLHU_CONFIG` is set.
pub const DEFAULT_CONFIG_FILE: &str = "config/ktoolhu.yaml";

#[derive(serde::Deserialize, Debug, Clone)]
pub struct Settings {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Namespace used when `--namespace` is not given.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub perf: PerfSettings,
    #[serde(default)]
    pub kube: KubeSettings,
}

fn default_name() -> String {
    crate::APP_NAME.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_namespace() -> String {
    crate::APP_NAME.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            namespace: default_namespace(),
            perf: PerfSettings::default(),
            kube: KubeSettings::default(),
        }
    }
}

impl Settings {
    /// Validate all settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::missing("name"));
        }

        if self.log_level.is_empty() {
            return Err(ConfigError::missing("log_level"));
        }

        if self.namespace.is_empty() {
            return Err(ConfigError::missing("namespace"));
        }

        self.perf.validate()?;
        self.kube.validate()?;

        Ok(())
    }
}

/// Defaults for the load generator.
#[derive(serde::Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PerfSettings {
    #[serde(deserialize_with = "deserialize_number_from_string", default = "default_create")]
    pub create: usize,
    #[serde(deserialize_with = "deserialize_number_from_string", default = "default_update")]
    pub update: usize,
    #[serde(deserialize_with = "deserialize_number_from_string", default = "default_parallel")]
    pub parallel: usize,
    /// Padding bytes appended to each ConfigMap payload
    #[serde(deserialize_with = "deserialize_number_from_string", default = "default_size")]
    pub size: usize,
}

fn default_create() -> usize {
    10
}

fn default_update() -> usize {
    1000
}

fn default_parallel() -> usize {
    1
}

fn default_size() -> usize {
    1000
}

impl Default for PerfSettings {
    fn default() -> Self {
        Self {
            create: default_create(),
            update: default_update(),
            parallel: default_parallel(),
            size: default_size(),
        }
    }
}

impl PerfSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parallel == 0 {
            return Err(ConfigError::invalid("perf.parallel", "0"));
        }
        Ok(())
    }
}

/// Kubernetes connection settings
#[derive(serde::Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct KubeSettings {
    /// Explicit kubeconfig file; inferred from the environment when unset
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(deserialize_with = "deserialize_number_from_string", default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for KubeSettings {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            context: None,
            timeout_secs: default_timeout_secs(),
            accept_invalid_certs: false,
        }
    }
}

impl KubeSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::invalid("kube.timeout_secs", "0"));
        }

        if let Some(context) = &self.context {
            if context.is_empty() {
                return Err(ConfigError::invalid("kube.context", "\"\""));
            }
        }

        Ok(())
    }
}

/// Load settings from configuration sources.
///
/// Sources, lowest precedence first:
/// - the YAML file given by `path`, else `$KTOOLHU_CONFIG`, else
///   `config/ktoolhu.yaml` when it exists
/// - environment variables prefixed with `KTOOLHU_`, nested keys separated by
///   `__` (e.g. `KTOOLHU_PERF__PARALLEL=4`)
///
/// An explicitly named file must exist.
pub fn get_configuration(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let explicit = path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

    let builder = config::Config::builder();
    let builder = match explicit {
        Some(file) => builder.add_source(config::File::from(file).required(true)),
        None => builder.add_source(config::File::with_name(DEFAULT_CONFIG_FILE).required(false)),
    };

    let settings: Settings = builder
        .add_source(
            config::Environment::with_prefix("KTOOLHU")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?
        .try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

/// Parameters of one `perf-configmaps` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerfConfig {
    pub namespace: String,
    pub create: usize,
    pub update: usize,
    pub parallel: usize,
    pub size: usize,
}

impl PerfConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.is_empty() {
            return Err(ConfigError::missing("namespace"));
        }
        if self.parallel == 0 {
            return Err(ConfigError::invalid("parallel", "0"));
        }
        Ok(())
    }

    /// Filler appended to every payload.
    pub fn padding(&self) -> String {
        "=".repeat(self.size)
    }
}

/// Parameters of one `restart-all` run. `None` means every namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestartConfig {
    pub namespace: Option<String>,
}

/// Parameters of one `terminating-ns` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TerminatingConfig {
    /// Remove blocking finalizers instead of only reporting them
    pub delete: bool,
    /// Skip the per-object confirmation prompt
    pub assume_yes: bool,
}

/// Parameters of one `evicted-pods` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictedConfig {
    pub delete: bool,
}

/// Parameters of one `secret` run. `None` infers the direction from the input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecretConfig {
    pub direction: Option<Direction>,
}
