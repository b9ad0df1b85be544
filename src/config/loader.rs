//! Configuration loader with environment variable expansion

use super::{Config, ConfigError};
use lazy_static::lazy_static;
use regex_lite::Regex;
use std::path::Path;

lazy_static! {
    /// `${VAR}` or `${VAR:-default}`
    static ref ENV_VAR: Regex =
        Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").expect("valid env var pattern");
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content);
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Expand environment variables
    ///
    /// Unset variables without a default keep their placeholder.
    fn expand_env_vars(content: &str) -> String {
        ENV_VAR
            .replace_all(content, |cap: &regex_lite::Captures<'_>| {
                match std::env::var(&cap[1]) {
                    Ok(value) => value,
                    Err(_) => match cap.get(2) {
                        Some(default) => default.as_str().to_string(),
                        None => cap[0].to_string(),
                    },
                }
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_expand_env_vars() {
        std::env::set_var("MIZUCHI_TEST_VAR", "test_value");
        let content = "key: ${MIZUCHI_TEST_VAR}";
        let expanded = ConfigLoader::expand_env_vars(content);
        assert_eq!(expanded, "key: test_value");
        std::env::remove_var("MIZUCHI_TEST_VAR");
    }

    #[test]
    #[serial]
    fn test_expand_env_vars_with_default() {
        std::env::remove_var("MIZUCHI_MISSING_VAR");
        let expanded = ConfigLoader::expand_env_vars("region: ${MIZUCHI_MISSING_VAR:-us-west-2}");
        assert_eq!(expanded, "region: us-west-2");
    }

    #[test]
    #[serial]
    fn test_unset_var_keeps_placeholder() {
        std::env::remove_var("MIZUCHI_MISSING_VAR");
        let expanded = ConfigLoader::expand_env_vars("key: ${MIZUCHI_MISSING_VAR}");
        assert_eq!(expanded, "key: ${MIZUCHI_MISSING_VAR}");
    }

    #[test]
    fn test_from_yaml_str() {
        let config = ConfigLoader::from_yaml_str(
            r#"
destination:
  bucket: my.release.bucket
  path: desktop/1.2.3
  storage_class: STANDARD_IA
upload:
  chunk_size: 1024
"#,
        )
        .unwrap();

        assert_eq!(config.destination.bucket.as_deref(), Some("my.release.bucket"));
        assert_eq!(config.destination.path_prefix.as_deref(), Some("desktop/1.2.3"));
        assert_eq!(config.destination.storage_class.as_deref(), Some("STANDARD_IA"));
        assert_eq!(config.destination.region, None);
        assert_eq!(config.upload.chunk_size, 1024);
        assert!(config.progress.enabled);
        assert_eq!(config.progress.interval_millis, 500);
    }
}
