//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::Config;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Convert the first error into a [`ConfigError`].
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(err) => Err(ConfigError::InvalidValue {
                field: err.path,
                message: err.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_runner(config, &mut result);
        Self::validate_scheduler(config, &mut result);
        Self::validate_logging(config, &mut result);

        result
    }

    fn validate_runner(config: &Config, result: &mut ValidationResult) {
        let runner = &config.runner;

        if runner.timeout_secs == 0 {
            result.add_error(ValidationError::new(
                "runner.timeout_secs",
                "timeout_secs must be greater than 0",
            ));
        }

        if runner.retention_secs == 0 {
            result.add_warning(ValidationWarning::new(
                "runner.retention_secs",
                "finished jobs are evicted immediately and cannot be polled",
            ));
        }

        if runner.log_retention_secs < runner.retention_secs {
            result.add_warning(ValidationWarning::new(
                "runner.log_retention_secs",
                "logs are deleted before their job records expire",
            ));
        }

        if runner.log_tail_lines == 0 {
            result.add_error(ValidationError::new(
                "runner.log_tail_lines",
                "log_tail_lines must be greater than 0",
            ));
        }

        for (ext, interpreter) in &runner.interpreters {
            if interpreter.trim().is_empty() {
                result.add_error(ValidationError::new(
                    format!("runner.interpreters.{}", ext),
                    "interpreter cannot be empty",
                ));
            }
        }
    }

    fn validate_scheduler(config: &Config, result: &mut ValidationResult) {
        let scheduler = &config.scheduler;

        if scheduler.poll_interval_ms == 0 {
            result.add_error(ValidationError::new(
                "scheduler.poll_interval_ms",
                "poll_interval_ms must be greater than 0",
            ));
        }

        if scheduler.poll_interval_ms > 60_000 {
            result.add_warning(ValidationWarning::new(
                "scheduler.poll_interval_ms",
                "poll interval above one minute delays minute-granular schedules",
            ));
        }

        if scheduler.lock_timeout_ms == 0 {
            result.add_error(ValidationError::new(
                "scheduler.lock_timeout_ms",
                "lock_timeout_ms must be greater than 0",
            ));
        }
    }

    fn validate_logging(config: &Config, result: &mut ValidationResult) {
        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&config.logging.format.as_str()) {
            result.add_error(ValidationError::new(
                "logging.format",
                format!(
                    "Unknown log format '{}', valid values: {:?}",
                    config.logging.format, valid_formats
                ),
            ));
        }

        if config.logging.level.trim().is_empty() {
            result.add_error(ValidationError::new(
                "logging.level",
                "level cannot be empty",
            ));
        }
    }
}
