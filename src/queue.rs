// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Declaration
//!
//! This module provides the options used to declare a RabbitMQ queue and the
//! metadata the broker returns for it. Queue declaration is idempotent on the
//! broker side: declaring an existing queue with the same options is a no-op
//! that still reports its current message and consumer counts.

use lapin::types::{AMQPValue, FieldTable, LongInt, LongString, ShortString};
use std::collections::BTreeMap;

/// Constant for the header field used to specify a dead letter exchange
pub const AMQP_HEADERS_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";
/// Constant for the header field used to specify a dead letter routing key
pub const AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY: &str = "x-dead-letter-routing-key";
/// Constant for the header field used to specify message TTL
pub const AMQP_HEADERS_MESSAGE_TTL: &str = "x-message-ttl";
/// Constant for the header field used to specify the idle time before the queue is deleted
pub const AMQP_HEADERS_EXPIRES: &str = "x-expires";
/// Constant for the header field used to specify maximum queue length
pub const AMQP_HEADERS_MAX_LENGTH: &str = "x-max-length";
/// Constant for the header field used to specify maximum queue size in bytes
pub const AMQP_HEADERS_MAX_LENGTH_BYTES: &str = "x-max-length-bytes";
/// Constant for the header field used to specify the highest supported priority
pub const AMQP_HEADERS_MAX_PRIORITY: &str = "x-max-priority";

/// Options for declaring a queue.
///
/// This struct implements the builder pattern. Queues are durable unless
/// [`QueueOptions::transient`] is called.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueOptions {
    pub(crate) durable: bool,
    pub(crate) exclusive: bool,
    pub(crate) auto_delete: bool,
    pub(crate) passive: bool,
    pub(crate) no_wait: bool,
    pub(crate) message_ttl: Option<i32>,
    pub(crate) expires: Option<i32>,
    pub(crate) dead_letter_exchange: Option<String>,
    pub(crate) dead_letter_routing_key: Option<String>,
    pub(crate) max_length: Option<i32>,
    pub(crate) max_length_bytes: Option<i32>,
    pub(crate) max_priority: Option<i32>,
    pub(crate) arguments: BTreeMap<ShortString, AMQPValue>,
}

impl Default for QueueOptions {
    fn default() -> Self {
        QueueOptions {
            durable: true,
            exclusive: false,
            auto_delete: false,
            passive: false,
            no_wait: false,
            message_ttl: None,
            expires: None,
            dead_letter_exchange: None,
            dead_letter_routing_key: None,
            max_length: None,
            max_length_bytes: None,
            max_priority: None,
            arguments: BTreeMap::default(),
        }
    }
}

impl QueueOptions {
    pub fn new() -> QueueOptions {
        QueueOptions::default()
    }

    /// Makes the queue transient, so it does not survive a broker restart.
    pub fn transient(mut self) -> Self {
        self.durable = false;
        self
    }

    /// Makes the queue exclusive to the connection.
    ///
    /// Exclusive queues are deleted when the connection closes.
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// Sets the queue to auto-delete once its last consumer goes away.
    pub fn auto_delete(mut self) -> Self {
        self.auto_delete = true;
        self
    }

    /// Only checks that the queue exists, without creating it.
    pub fn passive(mut self) -> Self {
        self.passive = true;
        self
    }

    pub fn no_wait(mut self) -> Self {
        self.no_wait = true;
        self
    }

    /// Sets the message Time-To-Live (TTL) for the queue, in milliseconds.
    pub fn message_ttl(mut self, ttl: i32) -> Self {
        self.message_ttl = Some(ttl);
        self
    }

    /// Deletes the queue after it has been unused for `expires` milliseconds.
    pub fn expires(mut self, expires: i32) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Routes rejected and expired messages to the given exchange.
    pub fn dead_letter_exchange(mut self, exchange: &str) -> Self {
        self.dead_letter_exchange = Some(exchange.to_owned());
        self
    }

    /// Overrides the routing key of dead-lettered messages.
    pub fn dead_letter_routing_key(mut self, key: &str) -> Self {
        self.dead_letter_routing_key = Some(key.to_owned());
        self
    }

    /// Sets the maximum number of messages the queue can hold.
    pub fn max_length(mut self, max: i32) -> Self {
        self.max_length = Some(max);
        self
    }

    /// Sets the maximum size in bytes the queue can hold.
    pub fn max_length_bytes(mut self, max_bytes: i32) -> Self {
        self.max_length_bytes = Some(max_bytes);
        self
    }

    pub fn max_priority(mut self, max: i32) -> Self {
        self.max_priority = Some(max);
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

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn is_auto_delete(&self) -> bool {
        self.auto_delete
    }

    pub fn is_passive(&self) -> bool {
        self.passive
    }

    pub fn is_no_wait(&self) -> bool {
        self.no_wait
    }

    /// Builds the `x-*` argument table sent with the declaration.
    ///
    /// Typed settings take precedence over raw arguments with the same key.
    pub fn arguments(&self) -> FieldTable {
        let mut args = self.arguments.clone();

        let ints = [
            (AMQP_HEADERS_MESSAGE_TTL, self.message_ttl),
            (AMQP_HEADERS_EXPIRES, self.expires),
            (AMQP_HEADERS_MAX_LENGTH, self.max_length),
            (AMQP_HEADERS_MAX_LENGTH_BYTES, self.max_length_bytes),
            (AMQP_HEADERS_MAX_PRIORITY, self.max_priority),
        ];
        for (key, value) in ints {
            if let Some(value) = value {
                args.insert(
                    ShortString::from(key),
                    AMQPValue::LongInt(LongInt::from(value)),
                );
            }
        }

        if let Some(exchange) = &self.dead_letter_exchange {
            args.insert(
                ShortString::from(AMQP_HEADERS_DEAD_LETTER_EXCHANGE),
                AMQPValue::LongString(LongString::from(exchange.clone())),
            );
        }

        if let Some(key) = &self.dead_letter_routing_key {
            args.insert(
                ShortString::from(AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY),
                AMQPValue::LongString(LongString::from(key.clone())),
            );
        }

        FieldTable::from(args)
    }
}

/// Queue metadata returned by the broker on declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueInfo {
    pub queue: String,
    pub message_count: u32,
    pub consumer_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_durable_without_arguments() {
        let opts = QueueOptions::default();

        assert!(opts.is_durable());
        assert!(!opts.is_exclusive());
        assert!(opts.arguments().inner().is_empty());
    }

    #[test]
    fn builds_x_arguments() {
        let opts = QueueOptions::new()
            .transient()
            .message_ttl(1000)
            .max_length(10)
            .dead_letter_exchange("dlx")
            .dead_letter_routing_key("orders-dlq");

        let args = opts.arguments();
        let args = args.inner();

        assert!(!opts.is_durable());
        assert_eq!(
            args.get(AMQP_HEADERS_MESSAGE_TTL),
            Some(&AMQPValue::LongInt(1000))
        );
        assert_eq!(args.get(AMQP_HEADERS_MAX_LENGTH), Some(&AMQPValue::LongInt(10)));
        assert_eq!(
            args.get(AMQP_HEADERS_DEAD_LETTER_EXCHANGE),
            Some(&AMQPValue::LongString(LongString::from("dlx")))
        );
        assert_eq!(
            args.get(AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY),
            Some(&AMQPValue::LongString(LongString::from("orders-dlq")))
        );
        assert!(args.get(AMQP_HEADERS_MAX_PRIORITY).is_none());
    }

    #[test]
    fn typed_settings_override_raw_arguments() {
        let opts = QueueOptions::new()
            .argument(AMQP_HEADERS_MESSAGE_TTL, AMQPValue::LongInt(1))
            .argument("x-queue-type", AMQPValue::LongString(LongString::from("quorum")))
            .message_ttl(500);

        let args = opts.arguments();

        assert_eq!(
            args.inner().get(AMQP_HEADERS_MESSAGE_TTL),
            Some(&AMQPValue::LongInt(500))
        );
        assert!(args.inner().contains_key("x-queue-type"));
    }
}
