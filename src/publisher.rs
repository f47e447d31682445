// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Publish Options
//!
//! Per-message settings for a publish, and their translation into the AMQP
//! basic properties and publish flags understood by the broker.

use lapin::{
    options::BasicPublishOptions,
    types::{
        AMQPValue, FieldTable, LongInt, LongLongInt, LongString, LongUInt, ShortInt, ShortString,
    },
    BasicProperties,
};
use std::collections::{BTreeMap, HashMap};

/// Default content type for JSON messages
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// AMQP delivery mode that makes the broker persist the message
pub const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// A typed message header value.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Bool(bool),
    ShortString(String),
    LongString(String),
    ShortInt(i16),
    LongInt(i32),
    LongLongInt(i64),
    LongUInt(u32),
    Double(f64),
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::LongString(value.to_owned())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::LongString(value)
    }
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self {
        HeaderValue::Bool(value)
    }
}

impl From<i32> for HeaderValue {
    fn from(value: i32) -> Self {
        HeaderValue::LongInt(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        HeaderValue::LongLongInt(value)
    }
}

impl From<&HeaderValue> for AMQPValue {
    fn from(value: &HeaderValue) -> Self {
        match value {
            HeaderValue::Bool(v) => AMQPValue::Boolean(*v),
            HeaderValue::ShortString(v) => AMQPValue::ShortString(ShortString::from(v.clone())),
            HeaderValue::LongString(v) => AMQPValue::LongString(LongString::from(v.clone())),
            HeaderValue::ShortInt(v) => AMQPValue::ShortInt(ShortInt::from(*v)),
            HeaderValue::LongInt(v) => AMQPValue::LongInt(LongInt::from(*v)),
            HeaderValue::LongLongInt(v) => AMQPValue::LongLongInt(LongLongInt::from(*v)),
            HeaderValue::LongUInt(v) => AMQPValue::LongUInt(LongUInt::from(*v)),
            HeaderValue::Double(v) => AMQPValue::Double(*v),
        }
    }
}

/// Options for a single publish.
///
/// Unset fields are left out of the message properties. The session assigns
/// a `message_id` when none is given.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishOptions {
    pub mandatory: bool,
    pub persistent: bool,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub headers: HashMap<String, HeaderValue>,
    pub priority: Option<u8>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    /// Per-message TTL in milliseconds, as the broker expects it: a decimal string
    pub expiration: Option<String>,
    pub message_id: Option<String>,
    pub timestamp: Option<u64>,
    /// The AMQP `type` property
    pub kind: Option<String>,
    pub user_id: Option<String>,
    pub app_id: Option<String>,
}

impl PublishOptions {
    pub fn new() -> PublishOptions {
        PublishOptions::default()
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Asks the broker to write the message to disk.
    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    pub fn content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_owned());
        self
    }

    pub fn content_encoding(mut self, encoding: &str) -> Self {
        self.content_encoding = Some(encoding.to_owned());
        self
    }

    pub fn header(mut self, key: &str, value: impl Into<HeaderValue>) -> Self {
        self.headers.insert(key.to_owned(), value.into());
        self
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn correlation_id(mut self, id: &str) -> Self {
        self.correlation_id = Some(id.to_owned());
        self
    }

    pub fn reply_to(mut self, queue: &str) -> Self {
        self.reply_to = Some(queue.to_owned());
        self
    }

    pub fn expiration(mut self, ttl_ms: u64) -> Self {
        self.expiration = Some(ttl_ms.to_string());
        self
    }

    pub fn message_id(mut self, id: &str) -> Self {
        self.message_id = Some(id.to_owned());
        self
    }

    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn kind(mut self, kind: &str) -> Self {
        self.kind = Some(kind.to_owned());
        self
    }

    pub fn user_id(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_owned());
        self
    }

    pub fn app_id(mut self, app_id: &str) -> Self {
        self.app_id = Some(app_id.to_owned());
        self
    }

    /// The publish flags sent with `basic.publish`.
    pub fn publish_flags(&self) -> BasicPublishOptions {
        BasicPublishOptions {
            mandatory: self.mandatory,
            immediate: false,
        }
    }

    /// Builds the AMQP basic properties carried by the message.
    pub fn properties(&self) -> BasicProperties {
        let mut props = BasicProperties::default();

        if let Some(v) = &self.content_type {
            props = props.with_content_type(ShortString::from(v.clone()));
        }
        if let Some(v) = &self.content_encoding {
            props = props.with_content_encoding(ShortString::from(v.clone()));
        }
        if !self.headers.is_empty() {
            props = props.with_headers(self.header_table());
        }
        if self.persistent {
            props = props.with_delivery_mode(PERSISTENT_DELIVERY_MODE);
        }
        if let Some(v) = self.priority {
            props = props.with_priority(v);
        }
        if let Some(v) = &self.correlation_id {
            props = props.with_correlation_id(ShortString::from(v.clone()));
        }
        if let Some(v) = &self.reply_to {
            props = props.with_reply_to(ShortString::from(v.clone()));
        }
        if let Some(v) = &self.expiration {
            props = props.with_expiration(ShortString::from(v.clone()));
        }
        if let Some(v) = &self.message_id {
            props = props.with_message_id(ShortString::from(v.clone()));
        }
        if let Some(v) = self.timestamp {
            props = props.with_timestamp(v);
        }
        if let Some(v) = &self.kind {
            props = props.with_kind(ShortString::from(v.clone()));
        }
        if let Some(v) = &self.user_id {
            props = props.with_user_id(ShortString::from(v.clone()));
        }
        if let Some(v) = &self.app_id {
            props = props.with_app_id(ShortString::from(v.clone()));
        }

        props
    }

    /// Converts the header values into an AMQP field table.
    fn header_table(&self) -> FieldTable {
        let btree: BTreeMap<ShortString, AMQPValue> = self
            .headers
            .iter()
            .map(|(key, value)| (ShortString::from(key.clone()), AMQPValue::from(value)))
            .collect();

        FieldTable::from(btree)
    }
}
