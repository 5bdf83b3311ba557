//! Configuration validation.
//!
//! Semantic checks that serde cannot express: value ranges and addresses.
//! Returns every violation found, not just the first, so a broken config
//! can be fixed in one pass.

use thiserror::Error;

use crate::config::schema::Config;

/// A single semantic violation in a config.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("server.bind_address must not be empty")]
    EmptyBindAddress,

    #[error("server.bind_address '{0}' is not a valid IP address")]
    InvalidBindAddress(String),

    #[error("server.accept_limit must be at least 1")]
    ZeroAcceptLimit,

    #[error("server.backlog must be at least 1")]
    ZeroBacklog,

    #[error("wrapper.name must not be empty")]
    EmptyWrapperName,
}

/// Validate a parsed config, collecting all violations.
pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.is_empty() {
        errors.push(ValidationError::EmptyBindAddress);
    } else if config.server.bind_address.parse::<std::net::IpAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.server.bind_address.clone(),
        ));
    }

    if config.server.accept_limit == 0 {
        errors.push(ValidationError::ZeroAcceptLimit);
    }

    if config.server.backlog == 0 {
        errors.push(ValidationError::ZeroBacklog);
    }

    if config.wrapper.name.is_empty() {
        errors.push(ValidationError::EmptyWrapperName);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
