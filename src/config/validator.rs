//! Configuration validator
//!
//! This module provides functionality for validating configuration.

use http::HeaderValue;
use std::path::Path;
use url::Url;

use crate::config::error::{ConfigError, Result};
use crate::config::types::{ClientConfig, ServerConfig};

impl ServerConfig {
    /// Check the configuration before the server starts
    pub fn validate(&self) -> Result<()> {
        validate_token(&self.token)?;

        validate_file_exists(&self.ssl_certificate)?;
        validate_file_exists(&self.ssl_certificate_key)?;

        for url in &self.redirect {
            validate_url(url, "redirect", &["http", "https"])?;
        }

        validate_timeout(self.connect_timeout)
    }
}

impl ClientConfig {
    /// Check the configuration before the client starts
    pub fn validate(&self) -> Result<()> {
        validate_token(&self.token)?;
        validate_url(&self.server, "server", &["ws", "wss"])?;
        validate_timeout(self.connect_timeout)
    }
}

/// The token travels in an `Authorization` header
fn validate_token(token: &str) -> Result<()> {
    if token.is_empty() {
        return Err(ConfigError::MissingRequiredValue("token".to_string()));
    }

    if HeaderValue::from_str(&format!("Basic {}", token)).is_err() {
        return Err(ConfigError::InvalidValue(
            "token".to_string(),
            "Token must be printable ASCII".to_string(),
        ));
    }

    Ok(())
}

fn validate_url(url: &Url, name: &str, schemes: &[&str]) -> Result<()> {
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("{} must use one of: {}", url, schemes.join(", ")),
        ));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("{} has no host", url),
        ));
    }

    Ok(())
}

fn validate_timeout(secs: u64) -> Result<()> {
    if secs == 0 {
        return Err(ConfigError::InvalidValue(
            "connect_timeout".to_string(),
            "Connect timeout must be greater than 0".to_string(),
        ));
    }

    Ok(())
}

/// Validate that a file exists
fn validate_file_exists(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{parse_pool, parse_url};
    use tempfile::NamedTempFile;

    fn server_config(cert: &NamedTempFile, key: &NamedTempFile) -> ServerConfig {
        ServerConfig::new("secret", cert.path(), key.path())
    }

    fn client_config(server: &str) -> ClientConfig {
        ClientConfig::new(parse_url(server).unwrap(), parse_pool("tcp://127.0.0.1:3333").unwrap(), "secret")
    }

    #[test]
    fn test_valid_server_config() {
        let cert = NamedTempFile::new().unwrap();
        let key = NamedTempFile::new().unwrap();
        let mut config = server_config(&cert, &key);
        config.redirect.push(parse_url("http://127.0.0.1:8080/").unwrap());
        config.redirect.push(parse_url("https://example.com/app/").unwrap());

        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_server_token_rules() {
        let cert = NamedTempFile::new().unwrap();
        let key = NamedTempFile::new().unwrap();

        let mut config = server_config(&cert, &key);
        config.token.clear();
        assert_eq!(config.validate(), Err(ConfigError::MissingRequiredValue("token".to_string())));

        config.token = "line\nbreak".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(name, _)) if name == "token"));
    }

    #[test]
    fn test_server_missing_files() {
        let cert = NamedTempFile::new().unwrap();
        let mut config = ServerConfig::new("secret", cert.path(), "/nonexistent/key.pem");
        assert_eq!(
            config.validate(),
            Err(ConfigError::FileNotFound("/nonexistent/key.pem".into()))
        );

        // A directory is not a certificate
        config.ssl_certificate_key = std::env::temp_dir();
        assert!(matches!(config.validate(), Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_server_redirect_scheme() {
        let cert = NamedTempFile::new().unwrap();
        let key = NamedTempFile::new().unwrap();
        let mut config = server_config(&cert, &key);
        config.redirect.push(parse_url("ftp://example.com/").unwrap());

        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(name, _)) if name == "redirect"));
    }

    #[test]
    fn test_zero_timeout() {
        let cert = NamedTempFile::new().unwrap();
        let key = NamedTempFile::new().unwrap();
        let mut config = server_config(&cert, &key);
        config.connect_timeout = 0;
        assert!(config.validate().is_err());

        let mut config = client_config("ws://127.0.0.1:8080");
        config.connect_timeout = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_client_server_scheme() {
        assert_eq!(client_config("ws://127.0.0.1:8080").validate(), Ok(()));
        assert_eq!(client_config("wss://relay.example.com").validate(), Ok(()));

        let err = client_config("https://relay.example.com").validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(name, _) if name == "server"));
    }
}
