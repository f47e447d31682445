// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Inbound Deliveries
//!
//! A [`RawDelivery`] is what the transport hands over for each inbound
//! message. Handlers receive it wrapped in a [`Message`], which binds the
//! acknowledgment primitives to the channel the delivery arrived on.
//!
//! The wrapper only holds a weak reference to that channel: it routes
//! acknowledgments but never keeps the channel alive or closes it.

use crate::{errors::AmqpError, transport::BrokerChannel};
use lapin::BasicProperties;
use serde::de::DeserializeOwned;
use std::sync::{Arc, Weak};
use tracing::error;

/// Delivery metadata assigned by the broker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryFields {
    pub consumer_tag: String,
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
}

/// One inbound message as received from the broker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDelivery {
    pub fields: DeliveryFields,
    pub properties: BasicProperties,
    pub content: Vec<u8>,
}

impl RawDelivery {
    pub(crate) fn from_lapin(consumer_tag: &str, delivery: lapin::message::Delivery) -> Self {
        RawDelivery {
            fields: DeliveryFields {
                consumer_tag: consumer_tag.to_owned(),
                delivery_tag: delivery.delivery_tag,
                redelivered: delivery.redelivered,
                exchange: delivery.exchange.as_str().to_owned(),
                routing_key: delivery.routing_key.as_str().to_owned(),
            },
            properties: delivery.properties,
            content: delivery.data,
        }
    }
}

/// A delivery bound to the channel that received it.
///
/// The consume task holds the strong reference to the channel while it runs,
/// so a message settled from its handler always reaches the channel. A message
/// kept past the end of its consumer, after the session closed the channel,
/// fails to settle with `ChannelError`.
pub struct Message {
    channel: Weak<dyn BrokerChannel>,
    delivery: RawDelivery,
}

impl Message {
    /// Wraps a delivery.
    ///
    /// # Returns
    /// `NullDeliveryError` when `delivery` is absent, which is how the broker
    /// signals that it cancelled the consumer.
    pub fn new(
        channel: &Arc<dyn BrokerChannel>,
        delivery: Option<RawDelivery>,
    ) -> Result<Message, AmqpError> {
        let Some(delivery) = delivery else {
            return Err(AmqpError::NullDeliveryError);
        };

        Ok(Message {
            channel: Arc::downgrade(channel),
            delivery,
        })
    }

    fn channel(&self) -> Result<Arc<dyn BrokerChannel>, AmqpError> {
        self.channel.upgrade().ok_or_else(|| {
            error!(
                delivery_tag = self.delivery.fields.delivery_tag,
                "channel closed before the message was settled"
            );
            AmqpError::ChannelError("channel is closed".to_owned())
        })
    }

    /// Acknowledges the message, or every outstanding message up to and including it.
    pub async fn ack(&self, all_up_to: bool) -> Result<(), AmqpError> {
        self.channel()?
            .ack(self.delivery.fields.delivery_tag, all_up_to)
            .await
    }

    /// Negatively acknowledges the message, or every outstanding message up to
    /// and including it. With `requeue` the broker puts them back in the queue.
    pub async fn nack(&self, all_up_to: bool, requeue: bool) -> Result<(), AmqpError> {
        self.channel()?
            .nack(self.delivery.fields.delivery_tag, all_up_to, requeue)
            .await
    }

    /// Rejects the message. Single-message form of [`Message::nack`] that
    /// older brokers without `basic.nack` understand.
    pub async fn reject(&self, requeue: bool) -> Result<(), AmqpError> {
        self.channel()?
            .reject(self.delivery.fields.delivery_tag, requeue)
            .await
    }

    /// The body decoded as UTF-8 text. Invalid sequences are replaced, so this never fails.
    pub fn content(&self) -> String {
        String::from_utf8_lossy(&self.delivery.content).into_owned()
    }

    /// The body parsed as JSON.
    pub fn json_content<T: DeserializeOwned>(&self) -> Result<T, AmqpError> {
        serde_json::from_str(&self.content())
            .map_err(|err| AmqpError::ParsePayloadError(err.to_string()))
    }

    pub fn raw_content(&self) -> &[u8] {
        &self.delivery.content
    }

    pub fn fields(&self) -> &DeliveryFields {
        &self.delivery.fields
    }

    pub fn properties(&self) -> &BasicProperties {
        &self.delivery.properties
    }
}
