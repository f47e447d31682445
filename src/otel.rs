// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # OpenTelemetry Integration for RabbitMQ
//!
//! This module carries trace context through message headers: the publisher
//! side injects the current context into the outgoing headers, the consumer
//! side extracts it from the delivery and opens a span around the handler.
//! Without a global propagator installed both directions are no-ops.

use crate::publisher::HeaderValue;
use lapin::{
    protocol::basic::AMQPProperties,
    types::{AMQPValue, FieldTable},
};
use opentelemetry::{
    global::{BoxedSpan, BoxedTracer},
    propagation::{Extractor, Injector},
    trace::{SpanKind, Tracer},
    Context,
};
use std::{borrow::Cow, collections::HashMap};
use tracing::error;

/// Writes trace context into the headers of an outgoing message.
pub(crate) struct HeaderInjector<'a> {
    headers: &'a mut HashMap<String, HeaderValue>,
}

impl<'a> HeaderInjector<'a> {
    pub(crate) fn new(headers: &'a mut HashMap<String, HeaderValue>) -> Self {
        Self { headers }
    }
}

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.headers
            .insert(key.to_lowercase(), HeaderValue::LongString(value));
    }
}

/// Reads trace context from the headers of a delivery.
pub(crate) struct HeaderExtractor<'a> {
    headers: &'a FieldTable,
}

impl<'a> HeaderExtractor<'a> {
    pub(crate) fn new(headers: &'a FieldTable) -> Self {
        Self { headers }
    }
}

impl Extractor for HeaderExtractor<'_> {
    /// Gets a trace context value from the headers.
    ///
    /// Only long string headers can carry trace context; anything else is ignored.
    fn get(&self, key: &str) -> Option<&str> {
        self.headers.inner().get(key).and_then(|header_value| {
            if let AMQPValue::LongString(header_value) = header_value {
                std::str::from_utf8(header_value.as_bytes())
                    .map_err(|e| error!("Error decoding header value {:?}", e))
                    .ok()
            } else {
                None
            }
        })
    }

    fn keys(&self) -> Vec<&str> {
        self.headers
            .inner()
            .keys()
            .map(|header| header.as_str())
            .collect()
    }
}

/// Injects the current trace context into `headers`.
pub(crate) fn inject_current_context(headers: &mut HashMap<String, HeaderValue>) {
    let ctx = Context::current();

    opentelemetry::global::get_text_map_propagator(|propagator| {
        propagator.inject_context(&ctx, &mut HeaderInjector::new(headers))
    });
}

/// Creates a consumer span for one delivery.
///
/// # Parameters
/// * `props` - Delivery properties whose headers may hold a parent context
/// * `tracer` - OpenTelemetry tracer
/// * `name` - Name for the new span (the queue being consumed)
///
/// # Returns
/// A tuple containing the extracted context and the new span
pub(crate) fn new_span(
    props: &AMQPProperties,
    tracer: &BoxedTracer,
    name: &str,
) -> (Context, BoxedSpan) {
    let headers = props.headers().clone().unwrap_or_default();

    let ctx = opentelemetry::global::get_text_map_propagator(|propagator| {
        propagator.extract(&HeaderExtractor::new(&headers))
    });

    let span = tracer
        .span_builder(Cow::from(name.to_owned()))
        .with_kind(SpanKind::Consumer)
        .start_with_context(tracer, &ctx);

    (ctx, span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapin::types::{LongString, ShortString};
    use std::collections::BTreeMap;

    #[test]
    fn injector_lowercases_keys() {
        let mut headers = HashMap::new();

        HeaderInjector::new(&mut headers).set("TraceParent", "00-abc-01".to_owned());

        assert_eq!(
            headers.get("traceparent"),
            Some(&HeaderValue::LongString("00-abc-01".to_owned()))
        );
    }

    #[test]
    fn extractor_reads_long_strings_only() {
        let mut btree = BTreeMap::new();
        btree.insert(
            ShortString::from("traceparent"),
            AMQPValue::LongString(LongString::from("00-abc-01")),
        );
        btree.insert(ShortString::from("attempt"), AMQPValue::LongInt(2));
        let table = FieldTable::from(btree);

        let extractor = HeaderExtractor::new(&table);

        assert_eq!(extractor.get("traceparent"), Some("00-abc-01"));
        assert_eq!(extractor.get("attempt"), None);
        assert_eq!(extractor.keys().len(), 2);
    }
}
