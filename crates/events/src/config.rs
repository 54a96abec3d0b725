//! Environment-variable helpers shared by the `from_env` constructors.

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Read `var`, parsing it with `FromStr`. Unset means `default`.
pub(crate) fn parse_env_or<T: std::str::FromStr>(
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(default),
    }
}
