// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # routemq
//!
//! An in-process exchange-routing engine: the core a message broker runs to
//! decide, for each published message, which bound queues receive a copy.
//! Supports the three classical routing disciplines (direct, fanout, topic),
//! bounded FIFO queues with acknowledgement and redelivery, visibility
//! timeouts for crashed consumers, and dead-letter routing.

mod consumer;

pub mod broker;
pub mod dispatcher;
pub mod errors;
pub mod exchange;
pub mod handler;
pub mod matcher;
pub mod message;
pub mod publisher;
pub mod queue;
pub mod topology;
