// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connection Configuration
//!
//! The connection record handed to a session by whatever loads the
//! application configuration. It can be deserialized from any serde source,
//! built in code, or read from `RABBITMQ_*` environment variables.
//!
//! Validation happens once, when the URL is built:
//! `<protocol>://[<user>:<password>@]<hostname>[:<port>]`.

use crate::errors::AmqpError;
use serde::Deserialize;
use std::{env, fmt};
use tracing::warn;

/// Scheme used when the configuration does not name one
pub const DEFAULT_PROTOCOL: &str = "amqp";

pub const ENV_USER: &str = "RABBITMQ_USER";
pub const ENV_PASSWORD: &str = "RABBITMQ_PASSWORD";
pub const ENV_HOSTNAME: &str = "RABBITMQ_HOSTNAME";
pub const ENV_PORT: &str = "RABBITMQ_PORT";
pub const ENV_PROTOCOL: &str = "RABBITMQ_PROTOCOL";
pub const ENV_CONNECTION_NAME: &str = "RABBITMQ_CONNECTION_NAME";

/// RabbitMQ connection settings.
///
/// Every field is optional at the type level so that a partially filled
/// record can be loaded and then rejected with a precise
/// [`AmqpError::ConfigurationError`]. Empty strings count as absent.
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RabbitConfig {
    pub user: Option<String>,
    pub password: Option<String>,
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub protocol: Option<String>,
    /// Name announced to the broker for this connection
    pub connection_name: Option<String>,
}

impl RabbitConfig {
    /// Creates a configuration for an anonymous connection to `hostname:port`.
    pub fn new(hostname: &str, port: u16) -> RabbitConfig {
        RabbitConfig {
            hostname: Some(hostname.to_owned()),
            port: Some(port),
            ..RabbitConfig::default()
        }
    }

    /// Sets both halves of the credentials.
    pub fn credentials(mut self, user: &str, password: &str) -> Self {
        self.user = Some(user.to_owned());
        self.password = Some(password.to_owned());
        self
    }

    pub fn protocol(mut self, protocol: &str) -> Self {
        self.protocol = Some(protocol.to_owned());
        self
    }

    pub fn connection_name(mut self, name: &str) -> Self {
        self.connection_name = Some(name.to_owned());
        self
    }

    /// Loads the configuration from the `RABBITMQ_*` environment variables.
    ///
    /// Nothing is validated here; an unparsable port is reported and treated
    /// as absent so that [`RabbitConfig::connection_uri`] rejects it.
    pub fn from_env() -> Self {
        RabbitConfig {
            user: env::var(ENV_USER).ok(),
            password: env::var(ENV_PASSWORD).ok(),
            hostname: env::var(ENV_HOSTNAME).ok(),
            port: parse_port(ENV_PORT),
            protocol: env::var(ENV_PROTOCOL).ok(),
            connection_name: env::var(ENV_CONNECTION_NAME).ok(),
        }
    }

    /// Validates the configuration and builds the connection URL.
    ///
    /// # Returns
    /// The exact URL handed to the transport, or a `ConfigurationError` when
    /// the hostname or port is missing, or when only one of user/password is set.
    pub fn connection_uri(&self) -> Result<String, AmqpError> {
        self.build_uri(false)
    }

    /// Same URL as [`RabbitConfig::connection_uri`] with the password masked, for logs.
    pub fn redacted_uri(&self) -> Result<String, AmqpError> {
        self.build_uri(true)
    }

    fn build_uri(&self, redact: bool) -> Result<String, AmqpError> {
        let credentials = match (present(&self.user), present(&self.password)) {
            (Some(user), Some(_)) if redact => format!("{}:***@", user),
            (Some(user), Some(password)) => format!("{}:{}@", user, password),
            (None, None) => String::new(),
            (Some(_), None) => return Err(missing("password")),
            (None, Some(_)) => return Err(missing("user")),
        };

        let hostname = present(&self.hostname).ok_or_else(|| missing("hostname"))?;

        let port = match self.port {
            Some(port) if port > 0 => port,
            _ => return Err(missing("port")),
        };

        let protocol = present(&self.protocol).unwrap_or(DEFAULT_PROTOCOL);

        Ok(format!(
            "{}://{}{}:{}",
            protocol, credentials, hostname, port
        ))
    }
}

impl fmt::Debug for RabbitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RabbitConfig")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("protocol", &self.protocol)
            .field("connection_name", &self.connection_name)
            .finish()
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn missing(field: &str) -> AmqpError {
    AmqpError::ConfigurationError(format!("missing RabbitMQ {}", field))
}

fn parse_port(name: &str) -> Option<u16> {
    let raw = env::var(name).ok()?;

    match raw.trim().parse::<u16>() {
        Ok(port) => Some(port),
        Err(_) => {
            warn!(env_var = name, value = %raw, "invalid port, ignoring");
            None
        }
    }
}
