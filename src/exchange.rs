// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Declaration
//!
//! This module provides types for declaring RabbitMQ exchanges. Exchanges are
//! the routing mechanism in RabbitMQ that determine how messages are
//! distributed to queues.
//!
//! Binding patterns depend on the exchange type: the empty pattern
//! ([`DEFAULT_BINDING_PATTERN`]) matches every message on a fanout exchange,
//! but only messages published with an empty routing key on direct and topic
//! exchanges. Callers of non-fanout topologies must pass an explicit pattern.

use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use std::{collections::BTreeMap, convert::Infallible, fmt, str::FromStr};

/// Binding pattern used when the caller has no routing requirement
pub const DEFAULT_BINDING_PATTERN: &str = "";

/// Constant for the argument used to specify an alternate exchange
pub const AMQP_HEADERS_ALTERNATE_EXCHANGE: &str = "alternate-exchange";

/// Represents the types of exchanges available in RabbitMQ.
///
/// Each exchange type has specific routing behavior:
/// - Direct: Routes messages to queues based on an exact match of routing keys
/// - Fanout: Broadcasts messages to all bound queues regardless of routing keys
/// - Topic: Routes messages based on wildcard pattern matching of routing keys
/// - Headers: Routes based on message header values instead of routing keys
/// - XMessageDelayed: Extension for delayed message delivery (plugin required)
/// - Custom: Any other type provided by a broker plugin
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ExchangeKind {
    #[default]
    Direct,
    Fanout,
    Topic,
    Headers,
    XMessageDelayed,
    Custom(String),
}

impl ExchangeKind {
    pub fn as_str(&self) -> &str {
        match self {
            ExchangeKind::Direct => "direct",
            ExchangeKind::Fanout => "fanout",
            ExchangeKind::Topic => "topic",
            ExchangeKind::Headers => "headers",
            ExchangeKind::XMessageDelayed => "x-delayed-message",
            ExchangeKind::Custom(kind) => kind,
        }
    }
}

impl FromStr for ExchangeKind {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ExchangeKind::from(s))
    }
}

impl From<&str> for ExchangeKind {
    fn from(kind: &str) -> Self {
        match kind {
            "direct" => ExchangeKind::Direct,
            "fanout" => ExchangeKind::Fanout,
            "topic" => ExchangeKind::Topic,
            "headers" => ExchangeKind::Headers,
            "x-delayed-message" => ExchangeKind::XMessageDelayed,
            other => ExchangeKind::Custom(other.to_owned()),
        }
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: &ExchangeKind) -> Self {
        match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
            ExchangeKind::Headers => lapin::ExchangeKind::Headers,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
            ExchangeKind::XMessageDelayed => {
                lapin::ExchangeKind::Custom("x-delayed-message".to_owned())
            }
            ExchangeKind::Custom(kind) => lapin::ExchangeKind::Custom(kind.clone()),
        }
    }
}

/// Options for declaring an exchange.
///
/// This struct implements the builder pattern. Exchanges are durable unless
/// [`ExchangeOptions::transient`] is called.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeOptions {
    pub(crate) durable: bool,
    pub(crate) auto_delete: bool,
    pub(crate) internal: bool,
    pub(crate) passive: bool,
    pub(crate) no_wait: bool,
    pub(crate) alternate_exchange: Option<String>,
    pub(crate) arguments: BTreeMap<ShortString, AMQPValue>,
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        ExchangeOptions {
            durable: true,
            auto_delete: false,
            internal: false,
            passive: false,
            no_wait: false,
            alternate_exchange: None,
            arguments: BTreeMap::default(),
        }
    }
}

impl ExchangeOptions {
    pub fn new() -> ExchangeOptions {
        ExchangeOptions::default()
    }

    /// Makes the exchange transient, so it does not survive a broker restart.
    pub fn transient(mut self) -> Self {
        self.durable = false;
        self
    }

    /// Sets the exchange to auto-delete when no longer used.
    pub fn auto_delete(mut self) -> Self {
        self.auto_delete = true;
        self
    }

    /// Makes the exchange internal, preventing direct publishing.
    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    /// Makes the exchange passive, checking for existence without creating it.
    pub fn passive(mut self) -> Self {
        self.passive = true;
        self
    }

    pub fn no_wait(mut self) -> Self {
        self.no_wait = true;
        self
    }

    /// Sends messages that cannot be routed to this exchange to `exchange`.
    pub fn alternate_exchange(mut self, exchange: &str) -> Self {
        self.alternate_exchange = Some(exchange.to_owned());
        self
    }

    /// Adds a raw argument, passed through to the broker as is.
    pub fn argument(mut self, key: &str, value: AMQPValue) -> Self {
        self.arguments.insert(ShortString::from(key), value);
        self
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub fn is_auto_delete(&self) -> bool {
        self.auto_delete
    }

    pub fn is_internal(&self) -> bool {
        self.internal
    }

    pub fn is_passive(&self) -> bool {
        self.passive
    }

    pub fn is_no_wait(&self) -> bool {
        self.no_wait
    }

    pub fn arguments(&self) -> FieldTable {
        let mut args = self.arguments.clone();

        if let Some(exchange) = &self.alternate_exchange {
            args.insert(
                ShortString::from(AMQP_HEADERS_ALTERNATE_EXCHANGE),
                AMQPValue::LongString(LongString::from(exchange.clone())),
            );
        }

        FieldTable::from(args)
    }
}

/// Exchange metadata returned on declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeInfo {
    pub exchange: String,
}
