// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Lapin Transport
//!
//! This module implements the transport traits on top of lapin, the AMQP
//! 0-9-1 client. It only translates arguments and errors; the protocol
//! itself, heartbeats and socket handling stay inside lapin.

use crate::{
    config::RabbitConfig,
    delivery::RawDelivery,
    errors::AmqpError,
    exchange::{ExchangeInfo, ExchangeKind, ExchangeOptions},
    publisher::PublishOptions,
    queue::{QueueInfo, QueueOptions},
    transport::{BrokerChannel, BrokerConnection, Connector, DeliveryStream},
};
use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use lapin::{
    options::{
        BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicNackOptions,
        BasicQosOptions, BasicRejectOptions, ExchangeDeclareOptions, QueueBindOptions,
        QueueDeclareOptions,
    },
    types::{FieldTable, LongString},
    Channel, Connection, ConnectionProperties,
};
use std::sync::Arc;
use tracing::{debug, error};

/// AMQP reply code for a normal shutdown
const REPLY_SUCCESS: u16 = 200;

/// Opens lapin connections.
pub struct LapinConnector {
    properties: ConnectionProperties,
}

impl LapinConnector {
    pub fn new(cfg: &RabbitConfig) -> LapinConnector {
        let mut properties = ConnectionProperties::default();

        if let Some(name) = cfg.connection_name.as_deref().filter(|n| !n.is_empty()) {
            properties = properties.with_connection_name(LongString::from(name));
        }

        LapinConnector { properties }
    }
}

#[async_trait]
impl Connector for LapinConnector {
    async fn connect(&self, uri: &str) -> Result<Arc<dyn BrokerConnection>, AmqpError> {
        match Connection::connect(uri, self.properties.clone()).await {
            Ok(conn) => Ok(Arc::new(LapinConnection { inner: conn })),
            Err(err) => Err(AmqpError::ConnectionError(err.to_string())),
        }
    }
}

pub struct LapinConnection {
    inner: Connection,
}

#[async_trait]
impl BrokerConnection for LapinConnection {
    async fn create_channel(&self) -> Result<Arc<dyn BrokerChannel>, AmqpError> {
        match self.inner.create_channel().await {
            Ok(channel) => Ok(Arc::new(LapinChannel { inner: channel })),
            Err(err) => Err(AmqpError::ChannelError(err.to_string())),
        }
    }

    async fn close(&self) -> Result<(), AmqpError> {
        self.inner
            .close(REPLY_SUCCESS, "closed by client")
            .await
            .map_err(|err| AmqpError::ConnectionError(err.to_string()))
    }
}

pub struct LapinChannel {
    inner: Channel,
}

#[async_trait]
impl BrokerChannel for LapinChannel {
    async fn queue_declare(
        &self,
        name: &str,
        options: &QueueOptions,
    ) -> Result<QueueInfo, AmqpError> {
        let queue = self
            .inner
            .queue_declare(
                name,
                QueueDeclareOptions {
                    passive: options.passive,
                    durable: options.durable,
                    exclusive: options.exclusive,
                    auto_delete: options.auto_delete,
                    nowait: options.no_wait,
                },
                options.arguments(),
            )
            .await
            .map_err(|err| AmqpError::DeclareQueueError(name.to_owned(), err.to_string()))?;

        Ok(QueueInfo {
            queue: queue.name().as_str().to_owned(),
            message_count: queue.message_count(),
            consumer_count: queue.consumer_count(),
        })
    }

    async fn exchange_declare(
        &self,
        name: &str,
        kind: &ExchangeKind,
        options: &ExchangeOptions,
    ) -> Result<ExchangeInfo, AmqpError> {
        self.inner
            .exchange_declare(
                name,
                lapin::ExchangeKind::from(kind),
                ExchangeDeclareOptions {
                    passive: options.passive,
                    durable: options.durable,
                    auto_delete: options.auto_delete,
                    internal: options.internal,
                    nowait: options.no_wait,
                },
                options.arguments(),
            )
            .await
            .map_err(|err| AmqpError::DeclareExchangeError(name.to_owned(), err.to_string()))?;

        Ok(ExchangeInfo {
            exchange: name.to_owned(),
        })
    }

    async fn queue_bind(
        &self,
        queue: &str,
        exchange: &str,
        pattern: &str,
    ) -> Result<(), AmqpError> {
        self.inner
            .queue_bind(
                queue,
                exchange,
                pattern,
                QueueBindOptions { nowait: false },
                FieldTable::default(),
            )
            .await
            .map_err(|err| {
                AmqpError::BindingExchangeToQueueError(
                    exchange.to_owned(),
                    queue.to_owned(),
                    err.to_string(),
                )
            })
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        options: &PublishOptions,
    ) -> Result<bool, AmqpError> {
        let confirm = self
            .inner
            .basic_publish(
                exchange,
                routing_key,
                options.publish_flags(),
                payload,
                options.properties(),
            )
            .await
            .map_err(|err| AmqpError::PublishingError(err.to_string()))?;

        // resolves immediately with NotRequested unless publisher confirms are on
        let confirmation = confirm
            .await
            .map_err(|err| AmqpError::PublishingError(err.to_string()))?;

        Ok(!confirmation.is_nack())
    }

    async fn ack(&self, delivery_tag: u64, multiple: bool) -> Result<(), AmqpError> {
        self.inner
            .basic_ack(delivery_tag, BasicAckOptions { multiple })
            .await
            .map_err(|err| AmqpError::AckMessageError(err.to_string()))
    }

    async fn nack(&self, delivery_tag: u64, multiple: bool, requeue: bool) -> Result<(), AmqpError> {
        self.inner
            .basic_nack(delivery_tag, BasicNackOptions { multiple, requeue })
            .await
            .map_err(|err| AmqpError::NackMessageError(err.to_string()))
    }

    async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), AmqpError> {
        self.inner
            .basic_reject(delivery_tag, BasicRejectOptions { requeue })
            .await
            .map_err(|err| AmqpError::RejectMessageError(err.to_string()))
    }

    async fn qos(&self, prefetch_count: u16) -> Result<(), AmqpError> {
        self.inner
            .basic_qos(prefetch_count, BasicQosOptions { global: false })
            .await
            .map_err(|err| AmqpError::QoSDeclarationError(err.to_string()))
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, AmqpError> {
        let consumer = match self
            .inner
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: false,
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to create the consumer");
                Err(AmqpError::ConsumerDeclarationError(err.to_string()))
            }
            Ok(c) => Ok(c),
        }?;

        let tag = consumer_tag.to_owned();
        let deliveries = consumer
            .map(move |result| match result {
                Ok(delivery) => Ok(Some(RawDelivery::from_lapin(&tag, delivery))),
                Err(err) => Err(AmqpError::ConsumerError(err.to_string())),
            })
            // lapin ends the stream when the consumer is cancelled
            .chain(stream::once(async {
                debug!("consumer stream ended");
                Ok(None)
            }));

        Ok(deliveries.boxed())
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<(), AmqpError> {
        self.inner
            .basic_cancel(consumer_tag, BasicCancelOptions { nowait: false })
            .await
            .map_err(|err| AmqpError::CancelConsumerError(err.to_string()))
    }

    async fn close(&self) -> Result<(), AmqpError> {
        self.inner
            .close(REPLY_SUCCESS, "closed by client")
            .await
            .map_err(|err| AmqpError::ChannelError(err.to_string()))
    }
}
