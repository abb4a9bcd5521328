//! Configuration loader using figment.
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: enables `switchboard.toml`
//! - `yaml-config`: enables `switchboard.yaml` / `switchboard.yml`
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Programmatic merges
//! 3. Profile-specific config file (`switchboard.{profile}.toml`)
//! 4. Main config file (`switchboard.toml`)
//! 5. Environment variables (`SWITCHBOARD_*`)
//!
//! # Environment Variable Mapping
//!
//! Environment variables use the `SWITCHBOARD_` prefix with `__` as separator:
//!
//! - `SWITCHBOARD_SERVER__PORT=4000` → `server.port = 4000`
//! - `SWITCHBOARD_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `SWITCHBOARD_MIDDLEWARE__TIMEOUT_MS=500` → `middleware.timeout_ms = 500`
//!
//! `SWITCHBOARD_PROFILE` selects the profile and is not treated as a key.
//!
//! # Example
//!
//! ```rust,ignore
//! use switchboard_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .file("./deploy/switchboard.toml")
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

use super::error::{LoadError, LoadResult};
use super::schema::SwitchboardConfig;

const ENV_PREFIX: &str = "SWITCHBOARD_";
const PROFILE_VAR: &str = "SWITCHBOARD_PROFILE";

/// Configuration profile for environment-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    /// Development profile (default).
    #[default]
    Development,
    /// Production profile.
    Production,
    /// Custom profile name.
    Custom(String),
}

impl Profile {
    /// Returns the profile name as a string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Parses a profile name, accepting the `dev` and `prod` shorthands.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads the profile from `SWITCHBOARD_PROFILE`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var(PROFILE_VAR)
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    /// Programmatic layers.
    figment: Figment,
    /// Configuration profile.
    profile: Profile,
    /// Search paths for configuration files.
    search_paths: Vec<PathBuf>,
    /// Whether to load environment variables.
    load_env: bool,
    /// Specific config file to load (overrides search).
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a new configuration loader with defaults.
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Adds the current directory to the search paths.
    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    /// Adds the user config directory to the search paths.
    pub fn with_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(config_dir) => self.search_path(config_dir.join("switchboard")),
            None => self,
        }
    }

    /// Sets a specific configuration file to load.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables loading environment variables (default: true).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges configuration programmatically, below files and environment.
    pub fn merge(mut self, config: SwitchboardConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads and returns the configuration.
    pub fn load(self) -> LoadResult<SwitchboardConfig> {
        let profile = self.profile.clone();
        let figment = self.build_figment()?;
        let config: SwitchboardConfig = figment.extract()?;

        debug!(
            profile = %profile,
            port = config.server.port,
            logging_level = %config.logging.level,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Builds the figment instance with all sources.
    fn build_figment(mut self) -> LoadResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(SwitchboardConfig::default()));
        figment = figment.merge(std::mem::take(&mut self.figment));

        if let Some(path) = self.config_file.take() {
            if !path.exists() {
                return Err(LoadError::FileNotFound(path));
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = Self::merge_config_file(figment, &path)?;
        } else {
            figment = self.load_config_files(figment);
        }

        if self.load_env {
            trace!(prefix = ENV_PREFIX, "Loading environment variables");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["profile"]).split("__"));
        }

        Ok(figment)
    }

    /// Merges a single config file, dispatching on its extension.
    fn merge_config_file(figment: Figment, path: &Path) -> LoadResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
            _ => Err(LoadError::UnsupportedFormat(ext.to_string())),
        }
    }

    /// Resolves the effective list of search paths.
    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("switchboard"));
        }
        paths
    }

    /// Searches one file format across the search paths.
    ///
    /// A profile-specific file is merged before the base file beside it; the
    /// search stops at the first directory holding a base file.
    #[cfg(any(feature = "toml-config", feature = "yaml-config"))]
    fn load_format_files<F>(
        &self,
        mut figment: Figment,
        search_paths: &[PathBuf],
        extensions: &[&str],
        merge_fn: F,
    ) -> (Figment, bool)
    where
        F: Fn(Figment, &Path) -> Figment,
    {
        for search_path in search_paths {
            for ext in extensions {
                let profile_path =
                    search_path.join(format!("switchboard.{}.{ext}", self.profile.as_str()));
                if profile_path.exists() {
                    debug!(path = %profile_path.display(), "Loading profile-specific config");
                    figment = merge_fn(figment, &profile_path);
                }

                let base_path = search_path.join(format!("switchboard.{ext}"));
                if base_path.exists() {
                    info!(path = %base_path.display(), "Loading configuration file");
                    return (merge_fn(figment, &base_path), true);
                }
            }
        }
        (figment, false)
    }

    /// Searches for and loads configuration files from the search paths.
    fn load_config_files(&self, figment: Figment) -> Figment {
        #[cfg(any(feature = "toml-config", feature = "yaml-config"))]
        let search_paths = self.resolve_search_paths();
        #[allow(unused_mut)]
        let mut figment = figment;
        #[allow(unused_mut)]
        let mut found = false;

        #[cfg(feature = "toml-config")]
        {
            let (f, ok) = self.load_format_files(figment, &search_paths, &["toml"], |fig, path| {
                fig.merge(Toml::file(path))
            });
            figment = f;
            found |= ok;
        }

        #[cfg(feature = "yaml-config")]
        {
            let (f, ok) =
                self.load_format_files(figment, &search_paths, &["yaml", "yml"], |fig, path| {
                    fig.merge(Yaml::file(path))
                });
            figment = f;
            found |= ok;
        }

        if !found {
            warn!("No configuration file found, using defaults");
        }
        figment
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_config() {
        Jail::expect_with(|jail| {
            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load()
                .unwrap();
            assert_eq!(config, SwitchboardConfig::default());
            assert_eq!(config.server.port, 3000);
            assert!(config.webhooks.use_default_mount_path_prepend);
            Ok(())
        });
    }

    #[test]
    fn test_file_and_env_layers() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "switchboard.toml",
                r#"
                [server]
                port = 4000

                [webhooks]
                use_default_mount_path_prepend = false

                [logging]
                level = "debug"
                "#,
            )?;
            jail.set_env("SWITCHBOARD_SERVER__PORT", "5000");
            jail.set_env("SWITCHBOARD_MIDDLEWARE__TIMEOUT_MS", "250");

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .load()
                .unwrap();
            assert_eq!(config.server.port, 5000);
            assert!(!config.webhooks.use_default_mount_path_prepend);
            assert_eq!(config.logging.level.as_str(), "debug");
            assert_eq!(
                config.middleware.timeout(),
                Some(std::time::Duration::from_millis(250))
            );
            Ok(())
        });
    }

    #[test]
    fn test_profile_file_is_overridden_by_base_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "switchboard.production.toml",
                "[server]\nhost = \"0.0.0.0\"\nport = 8080\n",
            )?;
            jail.create_file("switchboard.toml", "[server]\nport = 9090\n")?;

            let config = ConfigLoader::new()
                .profile("prod")
                .search_path(jail.directory())
                .without_env()
                .load()
                .unwrap();
            assert_eq!(config.server.host, "0.0.0.0");
            assert_eq!(config.server.port, 9090);
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file() {
        Jail::expect_with(|jail| {
            let err = ConfigLoader::new()
                .file(jail.directory().join("nope.toml"))
                .load()
                .unwrap_err();
            assert!(matches!(err, LoadError::FileNotFound(_)));
            Ok(())
        });
    }

    #[test]
    fn test_env_port_zero_is_valid() {
        Jail::expect_with(|jail| {
            jail.set_env("SWITCHBOARD_SERVER__PORT", "0");

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .load()
                .unwrap();
            assert_eq!(config.server.port, 0);
            assert!(crate::config::validate_config(&config).is_ok());
            Ok(())
        });
    }

    #[test]
    fn test_profile_from_env() {
        Jail::expect_with(|jail| {
            jail.set_env("SWITCHBOARD_PROFILE", "production");
            assert_eq!(Profile::from_env(), Profile::Production);
            Ok(())
        });
    }
}
