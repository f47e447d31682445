// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! In-memory broker used by the integration tests. It routes through the
//! default exchange and through fanout, direct and topic exchanges, keeps
//! unacknowledged deliveries, ends consumer streams when their channel
//! closes and records every close call.

#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use rabbitmq_session::{
    delivery::{DeliveryFields, RawDelivery},
    errors::AmqpError,
    exchange::{ExchangeInfo, ExchangeKind, ExchangeOptions},
    publisher::PublishOptions,
    queue::{QueueInfo, QueueOptions},
    transport::{BrokerChannel, BrokerConnection, Connector, DeliveryStream},
};
use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

type Sender = UnboundedSender<Result<Option<RawDelivery>, AmqpError>>;

#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    pub options: PublishOptions,
}

struct Queue {
    durable: bool,
    ready: VecDeque<RawDelivery>,
    consumers: Vec<(String, Sender)>,
}

struct Exchange {
    kind: ExchangeKind,
    bindings: Vec<(String, String)>,
}

#[derive(Default)]
struct State {
    queues: HashMap<String, Queue>,
    exchanges: HashMap<String, Exchange>,
    unacked: BTreeMap<u64, (String, RawDelivery)>,
    next_tag: u64,
    connects: usize,
    channels: usize,
    published: Vec<Published>,
    events: Vec<String>,
    prefetch: Option<u16>,
    fail_channel_close: bool,
}

impl State {
    fn route(&self, exchange: &str, routing_key: &str) -> Result<Vec<String>, AmqpError> {
        if exchange.is_empty() {
            return Ok(vec![routing_key.to_owned()]);
        }

        let Some(ex) = self.exchanges.get(exchange) else {
            return Err(AmqpError::PublishingError(format!(
                "NOT_FOUND - no exchange '{}'",
                exchange
            )));
        };

        Ok(ex
            .bindings
            .iter()
            .filter(|(_, pattern)| match ex.kind {
                ExchangeKind::Fanout => true,
                ExchangeKind::Topic => topic_matches(pattern, routing_key),
                _ => pattern == routing_key,
            })
            .map(|(queue, _)| queue.clone())
            .collect())
    }

    fn enqueue(&mut self, queue: &str, delivery: RawDelivery) {
        let Some(q) = self.queues.get_mut(queue) else {
            return;
        };
        q.ready.push_back(delivery);
        self.drain(queue);
    }

    fn drain(&mut self, queue: &str) {
        loop {
            let Some(q) = self.queues.get_mut(queue) else {
                return;
            };
            if q.consumers.is_empty() {
                return;
            }
            let Some(mut delivery) = q.ready.pop_front() else {
                return;
            };

            q.consumers.rotate_left(1);
            let (tag, tx) = match q.consumers.last() {
                Some((tag, tx)) => (tag.clone(), tx.clone()),
                None => return,
            };

            self.next_tag += 1;
            delivery.fields.delivery_tag = self.next_tag;
            delivery.fields.consumer_tag = tag;
            self.unacked
                .insert(self.next_tag, (queue.to_owned(), delivery.clone()));
            let _ = tx.send(Ok(Some(delivery)));
        }
    }

    fn settle(&mut self, tag: u64, multiple: bool) -> Result<Vec<(String, RawDelivery)>, String> {
        if multiple {
            let tags: Vec<u64> = self
                .unacked
                .keys()
                .copied()
                .filter(|t| tag == 0 || *t <= tag)
                .collect();
            return Ok(tags
                .into_iter()
                .filter_map(|t| self.unacked.remove(&t))
                .collect());
        }

        match self.unacked.remove(&tag) {
            Some(entry) => Ok(vec![entry]),
            None => Err(format!("PRECONDITION_FAILED - unknown delivery tag {}", tag)),
        }
    }

    fn requeue(&mut self, settled: Vec<(String, RawDelivery)>) {
        for (queue, mut delivery) in settled {
            delivery.fields.redelivered = true;
            self.enqueue(&queue, delivery);
        }
    }
}

/// `*` matches one word, `#` matches zero or more.
fn topic_matches(pattern: &str, key: &str) -> bool {
    fn go(pattern: &[&str], key: &[&str]) -> bool {
        match (pattern.first(), key.first()) {
            (None, None) => true,
            (Some(&"#"), _) => go(&pattern[1..], key) || (!key.is_empty() && go(pattern, &key[1..])),
            (Some(&"*"), Some(_)) => go(&pattern[1..], &key[1..]),
            (Some(p), Some(k)) if p == k => go(&pattern[1..], &key[1..]),
            _ => false,
        }
    }

    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = key.split('.').collect();
    go(&pattern, &key)
}

/// Handle on the shared broker state. Clones observe the same broker.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<State>>,
}

impl MemoryBroker {
    pub fn new() -> MemoryBroker {
        MemoryBroker::default()
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn connects(&self) -> usize {
        self.state().connects
    }

    pub fn channels(&self) -> usize {
        self.state().channels
    }

    pub fn published(&self) -> Vec<Published> {
        self.state().published.clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.state().events.clone()
    }

    pub fn prefetch(&self) -> Option<u16> {
        self.state().prefetch
    }

    pub fn ready(&self, queue: &str) -> usize {
        self.state().queues.get(queue).map_or(0, |q| q.ready.len())
    }

    pub fn unacked(&self) -> usize {
        self.state().unacked.len()
    }

    pub fn fail_channel_close(&self) {
        self.state().fail_channel_close = true;
    }

    /// Cancels every consumer of `queue` from the broker side.
    pub fn cancel_consumers(&self, queue: &str) {
        let mut state = self.state();
        if let Some(q) = state.queues.get_mut(queue) {
            for (_, tx) in q.consumers.drain(..) {
                let _ = tx.send(Ok(None));
            }
        }
    }
}

#[async_trait]
impl Connector for MemoryBroker {
    async fn connect(&self, _uri: &str) -> Result<Arc<dyn BrokerConnection>, AmqpError> {
        self.state().connects += 1;
        Ok(Arc::new(MemoryConnection {
            broker: self.clone(),
        }))
    }
}

struct MemoryConnection {
    broker: MemoryBroker,
}

#[async_trait]
impl BrokerConnection for MemoryConnection {
    async fn create_channel(&self) -> Result<Arc<dyn BrokerChannel>, AmqpError> {
        self.broker.state().channels += 1;
        Ok(Arc::new(MemoryChannel {
            broker: self.broker.clone(),
            open: Mutex::new(true),
            consumer_tags: Mutex::new(Vec::new()),
        }))
    }

    async fn close(&self) -> Result<(), AmqpError> {
        self.broker.state().events.push("connection.close".to_owned());
        Ok(())
    }
}

struct MemoryChannel {
    broker: MemoryBroker,
    open: Mutex<bool>,
    consumer_tags: Mutex<Vec<String>>,
}

impl MemoryChannel {
    fn ensure_open(&self) -> Result<(), AmqpError> {
        if *self.open.lock().unwrap_or_else(|p| p.into_inner()) {
            Ok(())
        } else {
            Err(AmqpError::ChannelError("channel closed".to_owned()))
        }
    }
}

#[async_trait]
impl BrokerChannel for MemoryChannel {
    async fn queue_declare(
        &self,
        name: &str,
        options: &QueueOptions,
    ) -> Result<QueueInfo, AmqpError> {
        self.ensure_open()?;
        let mut state = self.broker.state();

        let queue = state.queues.entry(name.to_owned()).or_insert_with(|| Queue {
            durable: options.is_durable(),
            ready: VecDeque::new(),
            consumers: Vec::new(),
        });

        if queue.durable != options.is_durable() {
            return Err(AmqpError::DeclareQueueError(
                name.to_owned(),
                "PRECONDITION_FAILED - inequivalent arg 'durable'".to_owned(),
            ));
        }

        Ok(QueueInfo {
            queue: name.to_owned(),
            message_count: queue.ready.len() as u32,
            consumer_count: queue.consumers.len() as u32,
        })
    }

    async fn exchange_declare(
        &self,
        name: &str,
        kind: &ExchangeKind,
        _options: &ExchangeOptions,
    ) -> Result<ExchangeInfo, AmqpError> {
        self.ensure_open()?;
        let mut state = self.broker.state();

        let exchange = state
            .exchanges
            .entry(name.to_owned())
            .or_insert_with(|| Exchange {
                kind: kind.clone(),
                bindings: Vec::new(),
            });

        if exchange.kind != *kind {
            return Err(AmqpError::DeclareExchangeError(
                name.to_owned(),
                "PRECONDITION_FAILED - inequivalent arg 'type'".to_owned(),
            ));
        }

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
        self.ensure_open()?;
        let mut state = self.broker.state();

        if !state.queues.contains_key(queue) {
            return Err(AmqpError::BindingExchangeToQueueError(
                exchange.to_owned(),
                queue.to_owned(),
                format!("NOT_FOUND - no queue '{}'", queue),
            ));
        }

        match state.exchanges.get_mut(exchange) {
            Some(ex) => {
                ex.bindings.push((queue.to_owned(), pattern.to_owned()));
                Ok(())
            }
            None => Err(AmqpError::BindingExchangeToQueueError(
                exchange.to_owned(),
                queue.to_owned(),
                format!("NOT_FOUND - no exchange '{}'", exchange),
            )),
        }
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        options: &PublishOptions,
    ) -> Result<bool, AmqpError> {
        self.ensure_open()?;
        let mut state = self.broker.state();

        let targets = state.route(exchange, routing_key)?;
        state.published.push(Published {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            body: payload.to_vec(),
            options: options.clone(),
        });

        for queue in targets {
            let delivery = RawDelivery {
                fields: DeliveryFields {
                    exchange: exchange.to_owned(),
                    routing_key: routing_key.to_owned(),
                    ..DeliveryFields::default()
                },
                properties: options.properties(),
                content: payload.to_vec(),
            };
            state.enqueue(&queue, delivery);
        }

        Ok(true)
    }

    async fn ack(&self, delivery_tag: u64, multiple: bool) -> Result<(), AmqpError> {
        self.ensure_open()?;
        self.broker
            .state()
            .settle(delivery_tag, multiple)
            .map(|_| ())
            .map_err(AmqpError::AckMessageError)
    }

    async fn nack(&self, delivery_tag: u64, multiple: bool, requeue: bool) -> Result<(), AmqpError> {
        self.ensure_open()?;
        let mut state = self.broker.state();

        let settled = state
            .settle(delivery_tag, multiple)
            .map_err(AmqpError::NackMessageError)?;
        if requeue {
            state.requeue(settled);
        }
        Ok(())
    }

    async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), AmqpError> {
        self.ensure_open()?;
        let mut state = self.broker.state();

        let settled = state
            .settle(delivery_tag, false)
            .map_err(AmqpError::RejectMessageError)?;
        if requeue {
            state.requeue(settled);
        }
        Ok(())
    }

    async fn qos(&self, prefetch_count: u16) -> Result<(), AmqpError> {
        self.ensure_open()?;
        self.broker.state().prefetch = Some(prefetch_count);
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, AmqpError> {
        self.ensure_open()?;
        let mut state = self.broker.state();

        let (tx, rx) = unbounded_channel();
        match state.queues.get_mut(queue) {
            Some(q) => q.consumers.push((consumer_tag.to_owned(), tx)),
            None => {
                return Err(AmqpError::ConsumerDeclarationError(format!(
                    "NOT_FOUND - no queue '{}'",
                    queue
                )))
            }
        }
        state.drain(queue);
        self.consumer_tags
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(consumer_tag.to_owned());

        Ok(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<(), AmqpError> {
        self.ensure_open()?;
        let mut state = self.broker.state();

        for q in state.queues.values_mut() {
            if let Some(pos) = q.consumers.iter().position(|(tag, _)| tag == consumer_tag) {
                let (_, tx) = q.consumers.remove(pos);
                let _ = tx.send(Ok(None));
                return Ok(());
            }
        }

        Err(AmqpError::CancelConsumerError(format!(
            "unknown consumer tag {}",
            consumer_tag
        )))
    }

    async fn close(&self) -> Result<(), AmqpError> {
        let mut state = self.broker.state();
        state.events.push("channel.close".to_owned());

        // a closed channel ends the streams of all its consumers
        let tags: Vec<String> = self
            .consumer_tags
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .drain(..)
            .collect();
        for q in state.queues.values_mut() {
            q.consumers.retain(|(tag, tx)| {
                if tags.contains(tag) {
                    let _ = tx.send(Ok(None));
                    false
                } else {
                    true
                }
            });
        }

        if state.fail_channel_close {
            return Err(AmqpError::ChannelError("channel close failed".to_owned()));
        }

        *self.open.lock().unwrap_or_else(|p| p.into_inner()) = false;
        Ok(())
    }
}

/// Polls `check` until it holds or a second has passed.
pub async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
