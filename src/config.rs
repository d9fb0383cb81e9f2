//! Runtime configuration for the `sbig-info` tool.
//!
//! Three environment variables name the driver, the device and a config file.
//! The config file is TOML and currently carries only the default focal
//! length:
//!
//! ```toml
//! [config]
//! focal_length = 2000.0
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Path of the vendor driver library.
pub const ENV_DRIVER: &str = "SBIG_UDRV";
/// Device the camera is attached to.
pub const ENV_DEVICE: &str = "SBIG_DEVICE";
/// Path of the TOML config file.
pub const ENV_CONFIG_FILE: &str = "SBIG_CONFIG_FILE";

/// Errors raised while gathering configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required environment variable is unset or empty.
    #[error("{0} is not set")]
    MissingVar(&'static str),
}

/// Contents of the config file.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    config: Option<ConfigSection>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigSection {
    /// Telescope focal length in millimetres.
    focal_length: Option<f64>,
}

/// Settings resolved from the environment and the config file.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Vendor driver library.
    pub driver_path: PathBuf,
    /// Device string, e.g. `usb` or `lpt1`.
    pub device: String,
    /// Config file the settings below were read from.
    pub config_file: PathBuf,
    /// Default focal length in millimetres, if configured.
    pub focal_length: Option<f64>,
}

impl Config {
    /// Read the process environment, then the config file it names.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingVar`] for the first unset variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`Config::from_env`] with a custom variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingVar`] for the first unset variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &'static str| {
            lookup(name)
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::MissingVar(name))
        };
        let driver_path = PathBuf::from(require(ENV_DRIVER)?);
        let device = require(ENV_DEVICE)?;
        let config_file = PathBuf::from(require(ENV_CONFIG_FILE)?);
        let focal_length = read_focal_length(&config_file);

        Ok(Self {
            driver_path,
            device,
            config_file,
            focal_length,
        })
    }
}

/// Focal length from a config file.
///
/// An unreadable or malformed file is not an error: it is logged and treated
/// as carrying no settings.
pub fn read_focal_length(path: &Path) -> Option<f64> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "config file not read");
            return None;
        }
    };
    let file: FileConfig = match toml::from_str(&content) {
        Ok(file) => file,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "config file not parsed");
            return None;
        }
    };
    let focal_length = file.config.and_then(|section| section.focal_length);
    debug!(path = %path.display(), ?focal_length, "config file loaded");
    focal_length
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn config_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write temp file");
        file
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_from_lookup() {
        let file = config_file("[config]\nfocal_length = 2000.0\n");
        let path = file.path().to_string_lossy().into_owned();
        let config = Config::from_lookup(lookup(&[
            (ENV_DRIVER, "/usr/lib/libsbigudrv.so"),
            (ENV_DEVICE, "usb"),
            (ENV_CONFIG_FILE, &path),
        ]))
        .expect("config failed");

        assert_eq!(config.driver_path, PathBuf::from("/usr/lib/libsbigudrv.so"));
        assert_eq!(config.device, "usb");
        assert_eq!(config.focal_length, Some(2000.0));
    }

    #[test]
    fn test_missing_vars_in_order() {
        assert_eq!(
            Config::from_lookup(lookup(&[])),
            Err(ConfigError::MissingVar(ENV_DRIVER))
        );
        assert_eq!(
            Config::from_lookup(lookup(&[(ENV_DRIVER, "libsbig.so")])),
            Err(ConfigError::MissingVar(ENV_DEVICE))
        );
        assert_eq!(
            Config::from_lookup(lookup(&[(ENV_DRIVER, "libsbig.so"), (ENV_DEVICE, "usb")])),
            Err(ConfigError::MissingVar(ENV_CONFIG_FILE))
        );
    }

    #[test]
    fn test_empty_var_is_missing() {
        assert_eq!(
            Config::from_lookup(lookup(&[(ENV_DRIVER, "")])),
            Err(ConfigError::MissingVar(ENV_DRIVER))
        );
        assert_eq!(
            ConfigError::MissingVar(ENV_DEVICE).to_string(),
            "SBIG_DEVICE is not set"
        );
    }

    #[test]
    fn test_unreadable_file_is_ignored() {
        let config = Config::from_lookup(lookup(&[
            (ENV_DRIVER, "libsbig.so"),
            (ENV_DEVICE, "lpt1"),
            (ENV_CONFIG_FILE, "/nonexistent/sbig.toml"),
        ]))
        .expect("config failed");
        assert_eq!(config.focal_length, None);
    }

    #[test]
    fn test_malformed_file_is_ignored() {
        let file = config_file("[config\nfocal_length = ");
        assert_eq!(read_focal_length(file.path()), None);
    }

    #[test]
    fn test_file_without_focal_length() {
        let file = config_file("[other]\nkey = 1\n");
        assert_eq!(read_focal_length(file.path()), None);

        let file = config_file("[config]\n");
        assert_eq!(read_focal_length(file.path()), None);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        let file = config_file("[config]\nfocal_length = 500.0\n");
        std::env::set_var(ENV_DRIVER, "libsbig.so");
        std::env::set_var(ENV_DEVICE, "usb1");
        std::env::set_var(ENV_CONFIG_FILE, file.path());

        let config = Config::from_env().expect("config failed");
        assert_eq!(config.device, "usb1");
        assert_eq!(config.focal_length, Some(500.0));

        std::env::remove_var(ENV_DEVICE);
        assert_eq!(
            Config::from_env(),
            Err(ConfigError::MissingVar(ENV_DEVICE))
        );

        std::env::remove_var(ENV_DRIVER);
        std::env::remove_var(ENV_CONFIG_FILE);
    }
}
