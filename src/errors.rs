// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the RabbitMQ Session
//!
//! This module provides the error type shared by every session operation.
//! Broker-reported failures keep the transport's own message so that callers
//! see exactly what the broker or the client library said; this crate never
//! translates them into something else or swallows them.

use thiserror::Error;

/// Represents errors that can occur while talking to RabbitMQ through a session.
///
/// Configuration problems are detected eagerly when a session is built; every
/// other variant is produced by a broker round-trip or by the delivery wrapper.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmqpError {
    /// Internal errors that don't fit into other categories
    #[error("internal error")]
    InternalError,

    /// The connection configuration is missing or inconsistent
    #[error("invalid rabbitmq configuration: {0}")]
    ConfigurationError(String),

    /// Error establishing or closing the connection to the RabbitMQ server
    #[error("failure to connect: {0}")]
    ConnectionError(String),

    /// Error creating or closing a channel, or the channel is gone
    #[error("failure to create a channel: {0}")]
    ChannelError(String),

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`: {1}")]
    DeclareExchangeError(String, String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`: {1}")]
    DeclareQueueError(String, String),

    /// Error binding a queue to an exchange
    #[error("failure to binding exchange `{0}` to queue `{1}`: {2}")]
    BindingExchangeToQueueError(String, String, String),

    /// Error publishing a message
    #[error("failure to publish: {0}")]
    PublishingError(String),

    /// Error configuring Quality of Service parameters
    #[error("failure to configure qos: {0}")]
    QoSDeclarationError(String),

    /// Error parsing a message payload
    #[error("failure to parse payload: {0}")]
    ParsePayloadError(String),

    /// Error acknowledging a message
    #[error("failure to ack message: {0}")]
    AckMessageError(String),

    /// Error negative-acknowledging a message
    #[error("failure to nack message: {0}")]
    NackMessageError(String),

    /// Error rejecting a message
    #[error("failure to reject message: {0}")]
    RejectMessageError(String),

    /// Error declaring a consumer
    #[error("consumer declaration error: {0}")]
    ConsumerDeclarationError(String),

    /// Error cancelling a consumer
    #[error("failure to cancel consumer: {0}")]
    CancelConsumerError(String),

    /// Error consuming a message
    #[error("failure to consume message `{0}`")]
    ConsumerError(String),

    /// The broker signalled an absent delivery, which happens when it cancels the consumer
    #[error("message expected, received null")]
    NullDeliveryError,
}
