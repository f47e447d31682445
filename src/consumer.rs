// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Message Consumer
//!
//! This module runs the per-consumer loop: every inbound delivery is wrapped
//! in a [`Message`] and handed to the caller's [`MessageHandler`], one at a
//! time and in broker delivery order. Settling the message (ack, nack or
//! reject) is up to the handler.
//!
//! The loop ends when the delivery stream ends. A transport error on the
//! stream is returned unchanged from [`ConsumeHandle::join`]. If the broker
//! cancelled the consumer, the absent delivery it signals surfaces as
//! [`AmqpError::NullDeliveryError`]; there is no automatic resubscription.

use crate::{
    delivery::Message,
    errors::AmqpError,
    otel,
    transport::{BrokerChannel, DeliveryStream},
};
use async_trait::async_trait;
use futures_util::StreamExt;
use opentelemetry::{
    global::{self, BoxedSpan},
    trace::{Span, Status},
};
use std::{
    borrow::Cow,
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Processes messages received from a queue.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handles one message. Errors are logged and recorded on the consumer
    /// span; they do not stop the consumer.
    async fn exec(&self, msg: Message) -> Result<(), AmqpError>;
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), AmqpError>> + Send + 'static,
{
    async fn exec(&self, msg: Message) -> Result<(), AmqpError> {
        (self)(msg).await
    }
}

/// Handle to a running consumer.
pub struct ConsumeHandle {
    consumer_tag: String,
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<Result<(), AmqpError>>,
}

impl ConsumeHandle {
    /// The tag identifying the consumer on its channel.
    pub fn consumer_tag(&self) -> &str {
        &self.consumer_tag
    }

    pub(crate) fn mark_cancelled(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub(crate) fn clear_cancelled(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// Flag shared with the consume task; once set, the end of the stream is a clean stop.
    pub(crate) fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the consumer to stop.
    ///
    /// # Returns
    /// `Ok(())` once the consumer was cancelled through the session or its
    /// stream ended, the first transport error if the stream failed,
    /// `NullDeliveryError` when the broker cancelled it.
    pub async fn join(self) -> Result<(), AmqpError> {
        match self.task.await {
            Ok(result) => result,
            Err(err) => {
                error!(error = err.to_string(), "consumer task failed");
                Err(AmqpError::InternalError)
            }
        }
    }
}

/// Spawns the consume loop for one consumer.
pub(crate) fn spawn(
    queue: &str,
    consumer_tag: &str,
    channel: Arc<dyn BrokerChannel>,
    deliveries: DeliveryStream,
    handler: Arc<dyn MessageHandler>,
) -> ConsumeHandle {
    let cancelled = Arc::new(AtomicBool::new(false));

    let task = tokio::spawn(run(
        queue.to_owned(),
        channel,
        deliveries,
        handler,
        cancelled.clone(),
    ));

    ConsumeHandle {
        consumer_tag: consumer_tag.to_owned(),
        cancelled,
        task,
    }
}

async fn run(
    queue: String,
    channel: Arc<dyn BrokerChannel>,
    mut deliveries: DeliveryStream,
    handler: Arc<dyn MessageHandler>,
    cancelled: Arc<AtomicBool>,
) -> Result<(), AmqpError> {
    let tracer = global::tracer("amqp consumer");

    // lapin ends the stream after an error, so the first one is what stopped the consumer
    let mut failure: Option<AmqpError> = None;
    let mut absent = false;

    while let Some(result) = deliveries.next().await {
        match result {
            Ok(Some(delivery)) => {
                debug!(
                    queue = queue.as_str(),
                    delivery_tag = delivery.fields.delivery_tag,
                    "received message"
                );
                let (_, span) = otel::new_span(&delivery.properties, &tracer, &queue);
                let msg = Message::new(&channel, Some(delivery))?;
                dispatch(handler.as_ref(), msg, span).await;
            }
            Ok(None) => {
                absent = true;
                break;
            }
            Err(err) => {
                error!(error = err.to_string(), "errors consume msg");
                failure.get_or_insert(err);
            }
        }
    }

    if let Some(err) = failure {
        return Err(err);
    }

    if absent && !cancelled.load(Ordering::SeqCst) {
        warn!(queue = queue.as_str(), "consumer cancelled by the broker");
        return Message::new(&channel, None).map(|_| ());
    }

    debug!(queue = queue.as_str(), "consumer stopped");
    Ok(())
}

async fn dispatch(handler: &dyn MessageHandler, msg: Message, mut span: BoxedSpan) {
    match handler.exec(msg).await {
        Ok(()) => span.set_status(Status::Ok),
        Err(err) => {
            warn!(error = err.to_string(), "error whiling handling msg");
            span.record_error(&err);
            span.set_status(Status::Error {
                description: Cow::from(err.to_string()),
            });
        }
    }
    span.end();
}
