//! Configuration validation.
//!
//! Semantic checks on top of serde's syntactic ones. Returns all errors,
//! not just the first, so an operator can fix a config file in one pass.

use crate::config::schema::DatabusConfig;

/// One semantic problem found in a config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field (e.g. "cache.default.max_idle").
    pub field: String,
    /// Human-readable description.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a loaded configuration.
pub fn validate_config(config: &DatabusConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (name, cache) in &config.cache {
        let path = |field: &str| format!("cache.{}.{}", name, field);
        if cache.host.is_empty() {
            errors.push(ValidationError {
                field: path("host"),
                message: "host must not be empty".into(),
            });
        }
        if cache.port == 0 {
            errors.push(ValidationError {
                field: path("port"),
                message: "port must not be 0".into(),
            });
        }
        if cache.max_active == 0 {
            errors.push(ValidationError {
                field: path("max_active"),
                message: "pool must allow at least one connection".into(),
            });
        }
        if cache.max_idle > cache.max_active {
            errors.push(ValidationError {
                field: path("max_idle"),
                message: format!(
                    "max_idle ({}) must not exceed max_active ({})",
                    cache.max_idle, cache.max_active
                ),
            });
        }
        if cache.io_timeout_secs == 0 {
            errors.push(ValidationError {
                field: path("io_timeout_secs"),
                message: "wire timeout must be positive".into(),
            });
        }
    }

    for (name, search) in &config.search {
        let path = |field: &str| format!("search.{}.{}", name, field);
        if search.host.is_empty() {
            errors.push(ValidationError {
                field: path("host"),
                message: "host must not be empty".into(),
            });
        }
        if search.port == 0 {
            errors.push(ValidationError {
                field: path("port"),
                message: "port must not be 0".into(),
            });
        }
    }

    if config.recovery.dir.is_empty() {
        errors.push(ValidationError {
            field: "recovery.dir".into(),
            message: "diagnostic directory must not be empty".into(),
        });
    }
    if config.recovery.suffix_area == 0 {
        errors.push(ValidationError {
            field: "recovery.suffix_area".into(),
            message: "suffix_area must be positive".into(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
