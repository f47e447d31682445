// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connection Session
//!
//! Owns at most one network connection to the broker. The connection is
//! opened on first use and shared afterwards; establishment is single-flight,
//! so concurrent first callers wait for the same open instead of racing to
//! create several connections.

use crate::{
    amqp::LapinConnector,
    config::RabbitConfig,
    errors::AmqpError,
    transport::{BrokerConnection, Connector},
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error};

/// Lazily established, memoized broker connection.
pub struct ConnectionSession {
    uri: String,
    redacted_uri: String,
    connector: Arc<dyn Connector>,
    connection: Mutex<Option<Arc<dyn BrokerConnection>>>,
}

impl ConnectionSession {
    /// Creates a session that connects through lapin.
    ///
    /// The configuration is validated here, so a bad configuration fails
    /// before any network activity.
    pub fn new(cfg: &RabbitConfig) -> Result<ConnectionSession, AmqpError> {
        Self::with_connector(cfg, Arc::new(LapinConnector::new(cfg)))
    }

    /// Creates a session that opens its connection through `connector`.
    pub fn with_connector(
        cfg: &RabbitConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<ConnectionSession, AmqpError> {
        let uri = cfg.connection_uri()?;
        let redacted_uri = cfg.redacted_uri()?;

        Ok(ConnectionSession {
            uri,
            redacted_uri,
            connector,
            connection: Mutex::new(None),
        })
    }

    /// The connection URL with the password masked.
    pub fn redacted_uri(&self) -> &str {
        &self.redacted_uri
    }

    pub async fn is_established(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    /// Returns the memoized connection, opening it on first use.
    ///
    /// A failed open leaves the session unestablished, so the next call tries again.
    pub async fn connect(&self) -> Result<Arc<dyn BrokerConnection>, AmqpError> {
        let mut guard = self.connection.lock().await;

        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        debug!(uri = self.redacted_uri.as_str(), "creating amqp connection...");
        let conn = match self.connector.connect(&self.uri).await {
            Ok(c) => c,
            Err(err) => {
                error!(error = err.to_string(), "failure to connect");
                return Err(err);
            }
        };
        debug!("amqp connected");

        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Closes the connection if one is established. Safe to call at any time.
    ///
    /// The session is reset even if the broker reports an error while
    /// closing, and a later [`ConnectionSession::connect`] opens a fresh connection.
    pub async fn close(&self) -> Result<(), AmqpError> {
        let Some(conn) = self.connection.lock().await.take() else {
            return Ok(());
        };

        debug!("closing amqp connection...");
        match conn.close().await {
            Err(err) => {
                error!(error = err.to_string(), "failure to close the connection");
                Err(err)
            }
            _ => {
                debug!("amqp connection closed");
                Ok(())
            }
        }
    }
}
