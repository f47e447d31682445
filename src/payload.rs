// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Payloads
//!
//! Everything published goes through [`Payload::into_buffer`]: raw bytes pass
//! through untouched, structured values become JSON text, anything else
//! becomes its textual form. Text is always encoded as UTF-8.
//!
//! Structured values may be self-referential when built from [`SharedNode`].
//! The encoder tracks the ancestors of the node being written and drops any
//! edge that points back to one of them: a circular object member is left
//! out, a circular array element is written as `null`. No placeholder ever
//! reaches the wire.

use crate::errors::AmqpError;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

/// A value ready to be published.
#[derive(Debug, Clone)]
pub enum Payload {
    Bytes(Vec<u8>),
    Text(String),
    Json(Value),
    Shared(SharedNode),
}

impl Payload {
    /// Serializes any serde value into a JSON payload.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Payload, AmqpError> {
        serde_json::to_value(value)
            .map(Payload::Json)
            .map_err(|err| AmqpError::ParsePayloadError(err.to_string()))
    }

    /// Whether the payload is encoded as a JSON document.
    pub fn is_structured(&self) -> bool {
        match self {
            Payload::Json(value) => value.is_object() || value.is_array() || value.is_null(),
            Payload::Shared(node) => {
                matches!(node, SharedNode::Array(_) | SharedNode::Object(_))
            }
            _ => false,
        }
    }

    /// Converts the payload into the bytes written on the wire.
    pub fn into_buffer(self) -> Vec<u8> {
        match self {
            Payload::Bytes(bytes) => bytes,
            Payload::Text(text) => text.into_bytes(),
            Payload::Json(Value::String(text)) => text.into_bytes(),
            Payload::Json(value) => value.to_string().into_bytes(),
            Payload::Shared(SharedNode::String(text)) => text.into_bytes(),
            Payload::Shared(node) => safe_stringify(&node).into_bytes(),
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::Bytes(bytes.to_vec())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_owned())
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

impl From<SharedNode> for Payload {
    fn from(node: SharedNode) -> Self {
        Payload::Shared(node)
    }
}

type Shared<T> = Arc<RwLock<T>>;

/// A JSON-like value whose arrays and objects are shared handles.
///
/// Cloning a container clones the handle, so a node can be inserted into
/// itself or into one of its descendants. Such cycles keep the nodes alive
/// until an edge is removed.
#[derive(Clone)]
pub enum SharedNode {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Shared<Vec<SharedNode>>),
    Object(Shared<BTreeMap<String, SharedNode>>),
}

impl SharedNode {
    pub fn object() -> SharedNode {
        SharedNode::Object(Arc::new(RwLock::new(BTreeMap::new())))
    }

    pub fn array() -> SharedNode {
        SharedNode::Array(Arc::new(RwLock::new(Vec::new())))
    }

    /// Sets `key` on an object node. Returns `false` if the node is not an object.
    pub fn insert(&self, key: &str, value: impl Into<SharedNode>) -> bool {
        let SharedNode::Object(map) = self else {
            return false;
        };

        map.write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value.into());
        true
    }

    /// Removes `key` from an object node, breaking any cycle through it.
    pub fn remove(&self, key: &str) -> Option<SharedNode> {
        let SharedNode::Object(map) = self else {
            return None;
        };

        map.write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    /// Appends to an array node. Returns `false` if the node is not an array.
    pub fn push(&self, value: impl Into<SharedNode>) -> bool {
        let SharedNode::Array(items) = self else {
            return false;
        };

        items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(value.into());
        true
    }

    /// Identity of a container node, used to detect cycles.
    fn address(&self) -> Option<usize> {
        match self {
            SharedNode::Array(items) => Some(Arc::as_ptr(items) as *const () as usize),
            SharedNode::Object(map) => Some(Arc::as_ptr(map) as *const () as usize),
            _ => None,
        }
    }
}

impl fmt::Debug for SharedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedNode({})", safe_stringify(self))
    }
}

impl From<Value> for SharedNode {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => SharedNode::Null,
            Value::Bool(b) => SharedNode::Bool(b),
            Value::Number(n) => SharedNode::Number(n),
            Value::String(s) => SharedNode::String(s),
            Value::Array(items) => SharedNode::Array(Arc::new(RwLock::new(
                items.into_iter().map(SharedNode::from).collect(),
            ))),
            Value::Object(map) => SharedNode::Object(Arc::new(RwLock::new(
                map.into_iter()
                    .map(|(k, v)| (k, SharedNode::from(v)))
                    .collect(),
            ))),
        }
    }
}

impl From<&str> for SharedNode {
    fn from(text: &str) -> Self {
        SharedNode::String(text.to_owned())
    }
}

impl From<String> for SharedNode {
    fn from(text: String) -> Self {
        SharedNode::String(text)
    }
}

impl From<bool> for SharedNode {
    fn from(b: bool) -> Self {
        SharedNode::Bool(b)
    }
}

impl From<i64> for SharedNode {
    fn from(n: i64) -> Self {
        SharedNode::Number(Number::from(n))
    }
}

/// Encodes a node as JSON text, dropping circular edges.
pub fn safe_stringify(node: &SharedNode) -> String {
    let mut ancestors = Vec::new();

    decycle(node, &mut ancestors)
        .unwrap_or(Value::Null)
        .to_string()
}

/// Returns `None` when `node` is one of its own ancestors.
fn decycle(node: &SharedNode, ancestors: &mut Vec<usize>) -> Option<Value> {
    if let Some(address) = node.address() {
        if ancestors.contains(&address) {
            return None;
        }
    }

    let value = match node {
        SharedNode::Null => Value::Null,
        SharedNode::Bool(b) => Value::Bool(*b),
        SharedNode::Number(n) => Value::Number(n.clone()),
        SharedNode::String(s) => Value::String(s.clone()),
        SharedNode::Array(items) => {
            // snapshot so no lock is held while descending into a possible cycle
            let items = items.read().unwrap_or_else(PoisonError::into_inner).clone();
            ancestors.extend(node.address());

            let values = items
                .iter()
                .map(|item| decycle(item, ancestors).unwrap_or(Value::Null))
                .collect();

            ancestors.pop();
            Value::Array(values)
        }
        SharedNode::Object(map) => {
            let entries = map.read().unwrap_or_else(PoisonError::into_inner).clone();
            ancestors.extend(node.address());

            let mut out = Map::new();
            for (key, child) in &entries {
                if let Some(value) = decycle(child, ancestors) {
                    out.insert(key.clone(), value);
                }
            }

            ancestors.pop();
            Value::Object(out)
        }
    };

    Some(value)
}
