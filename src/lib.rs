// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

mod otel;

pub mod amqp;
pub mod channel;
pub mod config;
pub mod connection;
pub mod consumer;
pub mod delivery;
pub mod errors;
pub mod exchange;
pub mod payload;
pub mod publisher;
pub mod queue;
pub mod transport;
