// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Model
//!
//! Defines the message value that flows from publishers through exchanges
//! into queues. Messages are value-copied per target queue at publish time:
//! every copy keeps the same id and routing key so a fanout broadcast can be
//! correlated across queues, while each queue owns its copy independently.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// An immutable published message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique id, shared by all per-queue copies of one publish
    pub id: Uuid,
    /// Dot-separated routing key the message was published with
    pub routing_key: String,
    /// Opaque payload bytes
    pub payload: Vec<u8>,
    /// Optional correlation id for request/reply flows
    pub correlation_id: Option<Uuid>,
    /// Creation timestamp, stamped at publish time
    pub timestamp: SystemTime,
}

impl Message {
    /// Creates a new message with a fresh id and the current timestamp.
    pub fn new(routing_key: &str, payload: Vec<u8>) -> Message {
        Message {
            id: Uuid::new_v4(),
            routing_key: routing_key.to_owned(),
            payload,
            correlation_id: None,
            timestamp: SystemTime::now(),
        }
    }

    /// Attaches a correlation id.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn correlated(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

/// Acknowledgement discipline for a consumer registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AckMode {
    /// The dispatcher acks on handler success and nack-requeues on failure
    #[default]
    Auto,
    /// The handler must ack or nack through the delivery handle
    Manual,
}
