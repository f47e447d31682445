// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Channel Session
//!
//! This module hosts every protocol operation the crate offers. A
//! [`ChannelSession`] owns one [`ConnectionSession`] and at most one channel
//! over it; both are opened lazily by the first operation and reused after.
//!
//! Operations issued one after the other by the same caller reach the broker
//! in issue order. The session is meant to be built once at process start,
//! passed to whoever needs it, and torn down with [`ChannelSession::shutdown`].
//!
//! ```no_run
//! # async fn run() -> Result<(), rabbitmq_session::errors::AmqpError> {
//! use rabbitmq_session::{
//!     channel::ChannelSession, config::RabbitConfig, delivery::Message,
//!     publisher::PublishOptions, queue::QueueOptions,
//! };
//! use serde_json::json;
//!
//! let session = ChannelSession::new(&RabbitConfig::from_env())?;
//!
//! session.declare_queue("orders", &QueueOptions::default()).await?;
//! session
//!     .publish_to_queue("orders", json!({"id": 1}), &PublishOptions::default())
//!     .await?;
//!
//! let handle = session
//!     .consume("orders", |msg: Message| async move { msg.ack(false).await })
//!     .await?;
//!
//! session.cancel(&handle).await?;
//! session.shutdown().await
//! # }
//! ```

use crate::{
    config::RabbitConfig,
    connection::ConnectionSession,
    consumer::{self, ConsumeHandle, MessageHandler},
    errors::AmqpError,
    exchange::{ExchangeInfo, ExchangeKind, ExchangeOptions},
    otel,
    payload::Payload,
    publisher::{PublishOptions, JSON_CONTENT_TYPE},
    queue::{QueueInfo, QueueOptions},
    transport::{BrokerChannel, BrokerConnection, Connector},
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::Mutex;
use tracing::{debug, error};
use uuid::Uuid;

/// Lazily established, memoized channel plus the protocol operations run on it.
pub struct ChannelSession {
    connection: ConnectionSession,
    channel: Mutex<Option<Arc<dyn BrokerChannel>>>,
    // cancel flags of the consumers running on the current channel
    consumers: Mutex<Vec<Arc<AtomicBool>>>,
}

impl ChannelSession {
    /// Creates a session that talks to the broker through lapin.
    ///
    /// Fails with `ConfigurationError` before any network activity when the
    /// configuration is incomplete.
    pub fn new(cfg: &RabbitConfig) -> Result<ChannelSession, AmqpError> {
        Ok(Self::from_connection(ConnectionSession::new(cfg)?))
    }

    /// Creates a session that opens its connection through `connector`.
    pub fn with_connector(
        cfg: &RabbitConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<ChannelSession, AmqpError> {
        Ok(Self::from_connection(ConnectionSession::with_connector(
            cfg, connector,
        )?))
    }

    pub fn from_connection(connection: ConnectionSession) -> ChannelSession {
        ChannelSession {
            connection,
            channel: Mutex::new(None),
            consumers: Mutex::new(Vec::new()),
        }
    }

    pub async fn has_channel(&self) -> bool {
        self.channel.lock().await.is_some()
    }

    /// Returns the memoized connection, opening it on first use.
    pub async fn connection(&self) -> Result<Arc<dyn BrokerConnection>, AmqpError> {
        self.connection.connect().await
    }

    /// Returns the memoized channel, opening the connection and the channel on first use.
    pub async fn channel(&self) -> Result<Arc<dyn BrokerChannel>, AmqpError> {
        let mut guard = self.channel.lock().await;

        if let Some(channel) = guard.as_ref() {
            return Ok(channel.clone());
        }

        let conn = self.connection.connect().await?;

        debug!("creating amqp channel...");
        let channel = match conn.create_channel().await {
            Ok(c) => c,
            Err(err) => {
                error!(error = err.to_string(), "error to create the channel");
                return Err(err);
            }
        };
        debug!("channel created");

        *guard = Some(channel.clone());
        Ok(channel)
    }

    /// Declares a queue, creating it if it does not exist.
    ///
    /// # Returns
    /// The queue name with its current message and consumer counts
    pub async fn declare_queue(
        &self,
        name: &str,
        options: &QueueOptions,
    ) -> Result<QueueInfo, AmqpError> {
        let channel = self.channel().await?;

        debug!("creating queue: {}", name);
        match channel.queue_declare(name, options).await {
            Err(err) => {
                error!(error = err.to_string(), name, "error to declare the queue");
                Err(err)
            }
            Ok(info) => {
                debug!("queue: {} was created", name);
                Ok(info)
            }
        }
    }

    /// Publishes `payload` straight to the queue `name` through the default exchange.
    ///
    /// # Returns
    /// Whether the broker accepted the write. `false` asks the caller to slow
    /// down; nothing is retried here.
    pub async fn publish_to_queue(
        &self,
        name: &str,
        payload: impl Into<Payload>,
        options: &PublishOptions,
    ) -> Result<bool, AmqpError> {
        self.publish("", name, payload.into(), options).await
    }

    /// Declares an exchange, creating it if it does not exist.
    pub async fn declare_exchange(
        &self,
        name: &str,
        kind: impl Into<ExchangeKind>,
        options: &ExchangeOptions,
    ) -> Result<ExchangeInfo, AmqpError> {
        let channel = self.channel().await?;
        let kind = kind.into();

        debug!("creating exchange: {} ({})", name, kind);
        match channel.exchange_declare(name, &kind, options).await {
            Err(err) => {
                error!(error = err.to_string(), name, "error to declare the exchange");
                Err(err)
            }
            Ok(info) => {
                debug!("exchange: {} was created", name);
                Ok(info)
            }
        }
    }

    /// Binds `queue` to `exchange`.
    ///
    /// Pass [`crate::exchange::DEFAULT_BINDING_PATTERN`] to receive everything
    /// from a fanout exchange. On direct and topic exchanges the empty pattern
    /// only matches messages published with an empty routing key.
    pub async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        pattern: &str,
    ) -> Result<(), AmqpError> {
        let channel = self.channel().await?;

        debug!(
            "binding queue: {} to the exchange: {} with the key: {}",
            queue, exchange, pattern
        );
        if let Err(err) = channel.queue_bind(queue, exchange, pattern).await {
            error!(error = err.to_string(), "error to bind queue to exchange");
            return Err(err);
        }

        Ok(())
    }

    /// Publishes `payload` to `exchange` with `routing_key`.
    ///
    /// The options are honored exactly as in [`ChannelSession::publish_to_queue`].
    pub async fn publish_to_exchange(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: impl Into<Payload>,
        options: &PublishOptions,
    ) -> Result<bool, AmqpError> {
        self.publish(exchange, routing_key, payload.into(), options)
            .await
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Payload,
        options: &PublishOptions,
    ) -> Result<bool, AmqpError> {
        let channel = self.channel().await?;

        let mut options = options.clone();
        if options.content_type.is_none() && payload.is_structured() {
            options.content_type = Some(JSON_CONTENT_TYPE.to_owned());
        }
        if options.message_id.is_none() {
            options.message_id = Some(Uuid::new_v4().to_string());
        }
        otel::inject_current_context(&mut options.headers);

        let body = payload.into_buffer();

        match channel.publish(exchange, routing_key, &body, &options).await {
            Err(err) => {
                error!(error = err.to_string(), "error publishing message");
                Err(err)
            }
            Ok(accepted) => {
                if !accepted {
                    debug!(exchange, routing_key, "broker did not accept the message");
                }
                Ok(accepted)
            }
        }
    }

    /// Acknowledges every unacknowledged delivery received on the channel.
    pub async fn ack_all_pending(&self) -> Result<(), AmqpError> {
        self.channel().await?.ack_all().await
    }

    /// Rejects every unacknowledged delivery received on the channel.
    pub async fn nack_all_pending(&self, requeue: bool) -> Result<(), AmqpError> {
        self.channel().await?.nack_all(requeue).await
    }

    /// Limits the number of unacknowledged deliveries the broker sends to this channel.
    pub async fn prefetch(&self, count: u16) -> Result<(), AmqpError> {
        self.channel().await?.qos(count).await
    }

    /// Starts consuming `queue`.
    ///
    /// `handler` is called once per delivery, in delivery order, with the
    /// delivery wrapped in a [`crate::delivery::Message`].
    ///
    /// # Returns
    /// A handle carrying the consumer tag, usable with [`ChannelSession::cancel`]
    pub async fn consume(
        &self,
        queue: &str,
        handler: impl MessageHandler + 'static,
    ) -> Result<ConsumeHandle, AmqpError> {
        let channel = self.channel().await?;
        let consumer_tag = format!("{}-{}", queue, Uuid::new_v4());

        let deliveries = channel.consume(queue, &consumer_tag).await?;
        debug!(queue, consumer_tag = consumer_tag.as_str(), "consumer created");

        let handle = consumer::spawn(
            queue,
            &consumer_tag,
            channel,
            deliveries,
            Arc::new(handler),
        );
        self.consumers.lock().await.push(handle.cancel_flag());

        Ok(handle)
    }

    /// Cancels the consumer behind `handle`. Its task then ends without error.
    ///
    /// Fails with `ChannelError` when the session has no open channel, which
    /// is the case after [`ChannelSession::close_channel`].
    pub async fn cancel(&self, handle: &ConsumeHandle) -> Result<(), AmqpError> {
        let Some(channel) = self.channel.lock().await.clone() else {
            return Err(AmqpError::ChannelError("channel is closed".to_owned()));
        };

        // the consumer stream may end before the broker's cancel-ok is returned
        handle.mark_cancelled();
        if let Err(err) = channel.cancel(handle.consumer_tag()).await {
            error!(error = err.to_string(), "error to cancel the consumer");
            handle.clear_cancelled();
            return Err(err);
        }

        let flag = handle.cancel_flag();
        self.consumers
            .lock()
            .await
            .retain(|f| !Arc::ptr_eq(f, &flag));
        Ok(())
    }

    /// Closes the channel if one is open. Safe to call at any time.
    ///
    /// Consumers running on the channel stop without error.
    pub async fn close_channel(&self) -> Result<(), AmqpError> {
        let Some(channel) = self.channel.lock().await.take() else {
            return Ok(());
        };

        for flag in self.consumers.lock().await.drain(..) {
            flag.store(true, Ordering::SeqCst);
        }

        debug!("closing amqp channel...");
        match channel.close().await {
            Err(err) => {
                error!(error = err.to_string(), "failure to close the channel");
                Err(err)
            }
            _ => {
                debug!("amqp channel closed");
                Ok(())
            }
        }
    }

    /// Closes the connection if one is established. Safe to call at any time.
    pub async fn close_connection(&self) -> Result<(), AmqpError> {
        self.connection.close().await
    }

    /// Closes the channel, then the connection.
    ///
    /// The connection close is attempted even when closing the channel fails;
    /// the first error is returned.
    pub async fn shutdown(&self) -> Result<(), AmqpError> {
        let channel = self.close_channel().await;
        let connection = self.close_connection().await;

        channel.and(connection)
    }
}
