use thiserror::Error;

/// Errors produced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A port value could not be parsed as a u16.
    #[error("invalid port value '{value}': {source}")]
    PortParseError {
        /// The offending raw value.
        value: String,
        /// Underlying parse error.
        source: std::num::ParseIntError,
    },

    /// Port 0 is not a valid listening port.
    #[error("port must be non-zero, got '{value}'")]
    InvalidPort {
        /// The offending raw value.
        value: String,
    },

    /// A bind address could not be parsed.
    #[error("invalid bind address '{value}': {source}")]
    InvalidBindAddr {
        /// The offending raw value.
        value: String,
        /// Underlying parse error.
        source: std::net::AddrParseError,
    },

    /// A URL override was present but empty.
    #[error("{var} is set but empty")]
    EmptyUrl {
        /// Environment variable name.
        var: &'static str,
    },

    /// A numeric override could not be parsed.
    #[error("invalid value for {var}: '{value}'")]
    InvalidNumber {
        /// Environment variable name.
        var: &'static str,
        /// The offending raw value.
        value: String,
    },
}
