// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Transport Boundary
//!
//! The sessions never talk to the AMQP client library directly. They go
//! through the three traits below, which the [`crate::amqp`] module implements
//! on top of lapin. Keeping the boundary this narrow lets the sessions be
//! exercised against mocks or an in-memory broker.

use crate::{
    delivery::RawDelivery,
    errors::AmqpError,
    exchange::{ExchangeInfo, ExchangeKind, ExchangeOptions},
    publisher::PublishOptions,
    queue::{QueueInfo, QueueOptions},
};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::sync::Arc;

/// Stream of inbound deliveries for one consumer.
///
/// `Ok(None)` is the absent-delivery sentinel the broker produces when it
/// cancels the consumer.
pub type DeliveryStream = BoxStream<'static, Result<Option<RawDelivery>, AmqpError>>;

/// Opens network connections to a broker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a connection to the broker addressed by `uri`.
    async fn connect(&self, uri: &str) -> Result<Arc<dyn BrokerConnection>, AmqpError>;
}

/// One transport-level session to the broker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    async fn create_channel(&self) -> Result<Arc<dyn BrokerChannel>, AmqpError>;

    async fn close(&self) -> Result<(), AmqpError>;
}

/// A logical channel multiplexed over a [`BrokerConnection`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    async fn queue_declare(
        &self,
        name: &str,
        options: &QueueOptions,
    ) -> Result<QueueInfo, AmqpError>;

    async fn exchange_declare(
        &self,
        name: &str,
        kind: &ExchangeKind,
        options: &ExchangeOptions,
    ) -> Result<ExchangeInfo, AmqpError>;

    async fn queue_bind(&self, queue: &str, exchange: &str, pattern: &str)
        -> Result<(), AmqpError>;

    /// Publishes `payload` and reports whether the broker accepted the write.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        options: &PublishOptions,
    ) -> Result<bool, AmqpError>;

    async fn ack(&self, delivery_tag: u64, multiple: bool) -> Result<(), AmqpError>;

    async fn nack(&self, delivery_tag: u64, multiple: bool, requeue: bool)
        -> Result<(), AmqpError>;

    async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), AmqpError>;

    /// Acknowledges every outstanding delivery on the channel.
    async fn ack_all(&self) -> Result<(), AmqpError> {
        self.ack(0, true).await
    }

    /// Rejects every outstanding delivery on the channel.
    async fn nack_all(&self, requeue: bool) -> Result<(), AmqpError> {
        self.nack(0, true, requeue).await
    }

    async fn qos(&self, prefetch_count: u16) -> Result<(), AmqpError>;

    async fn consume(&self, queue: &str, consumer_tag: &str)
        -> Result<DeliveryStream, AmqpError>;

    async fn cancel(&self, consumer_tag: &str) -> Result<(), AmqpError>;

    async fn close(&self) -> Result<(), AmqpError>;
}
