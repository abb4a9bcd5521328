//! Configuration validation utilities.

use super::error::{LoadError, LoadResult};
use super::schema::{LogOutput, LoggingConfig, MiddlewareConfig, ServerConfig, SwitchboardConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &SwitchboardConfig) -> LoadResult<()> {
    validate_server_config(&config.server)?;
    validate_middleware_config(&config.middleware)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

/// Validates the shared listener settings.
fn validate_server_config(server: &ServerConfig) -> LoadResult<()> {
    if server.host.trim().is_empty() {
        return Err(LoadError::validation("Server host cannot be empty"));
    }
    Ok(())
}

fn validate_middleware_config(middleware: &MiddlewareConfig) -> LoadResult<()> {
    if middleware.timeout_ms == Some(0) {
        return Err(LoadError::validation(
            "Middleware timeout must be greater than 0",
        ));
    }
    Ok(())
}

/// Validates logging settings.
fn validate_logging_config(logging: &LoggingConfig) -> LoadResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(LoadError::validation(
            "File log output requires logging.file_path",
        ));
    }
    if logging.filters.keys().any(|module| module.trim().is_empty()) {
        return Err(LoadError::validation("Log filter module cannot be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&SwitchboardConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_port_and_host() {
        let mut config = SwitchboardConfig::default();
        config.server.port = 0;
        assert!(validate_config(&config).is_ok());

        let mut config = SwitchboardConfig::default();
        config.server.host = " ".into();
        assert!(matches!(
            validate_config(&config),
            Err(LoadError::Validation { .. })
        ));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = SwitchboardConfig::default();
        config.middleware.timeout_ms = Some(0);
        assert!(validate_config(&config).is_err());

        config.middleware.timeout_ms = Some(10);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_logging() {
        let mut config = SwitchboardConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());

        config.logging.file_path = Some("logs/switchboard.log".into());
        assert!(validate_config(&config).is_ok());

        config.logging.filters.insert(String::new(), LogLevel::Debug);
        assert!(validate_config(&config).is_err());
    }
}
