//! Configuration errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config file at {0}")]
    NotFound(String),

    #[error("invalid config value {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("config references ${{{0}}} but it is not set")]
    EnvVarNotSet(String),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config: {0}")]
    TomlParse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let err = ConfigError::NotFound("/etc/netsweep.toml".to_string());
        assert_eq!(err.to_string(), "no config file at /etc/netsweep.toml");
    }

    #[test]
    fn test_invalid_value_error() {
        let err = ConfigError::InvalidValue {
            field: "runner.timeout_secs".to_string(),
            message: "must be positive".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("runner.timeout_secs"));
        assert!(display.contains("must be positive"));
    }

    #[test]
    fn test_env_var_not_set_error() {
        let err = ConfigError::EnvVarNotSet("NETSWEEP_HOME".to_string());
        assert_eq!(err.to_string(), "config references ${NETSWEEP_HOME} but it is not set");
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = ConfigError::from(io_err);
        assert_eq!(err.to_string(), "failed to read config: denied");
    }
}
