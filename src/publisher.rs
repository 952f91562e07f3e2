// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Publisher
//!
//! Producer-side front-end over the broker. The publisher stamps a fresh
//! message id and timestamp, attaches the routing key and hands the message
//! to the broker's routing path. Producers never see queues; they only name
//! an exchange and a routing key.

use crate::{broker::Broker, errors::BrokerError, message::Message};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

/// Publishes messages into a broker.
pub struct Publisher {
    broker: Arc<Broker>,
}

impl Publisher {
    /// Creates a new publisher.
    ///
    /// # Returns
    /// An Arc-wrapped Publisher instance for thread-safe sharing
    pub fn new(broker: Arc<Broker>) -> Arc<Publisher> {
        Arc::new(Publisher { broker })
    }

    /// Publishes raw payload bytes to an exchange.
    ///
    /// Returns the number of queues the message was delivered to. Zero is a
    /// valid outcome for a non-mandatory publish; with `mandatory` set, zero
    /// targets fails with `Unroutable`.
    pub fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        mandatory: bool,
    ) -> Result<usize, BrokerError> {
        let message = Message::new(routing_key, payload.to_vec());
        debug!(
            exchange,
            routing_key,
            message_id = %message.id,
            "publishing message"
        );
        self.broker.publish(exchange, message, mandatory)
    }

    /// Publishes a JSON-serialized event to an exchange.
    pub fn publish_json<T: Serialize>(
        &self,
        exchange: &str,
        routing_key: &str,
        event: &T,
        mandatory: bool,
    ) -> Result<usize, BrokerError> {
        let payload = match serde_json::to_vec(event) {
            Ok(payload) => payload,
            Err(err) => {
                error!(error = err.to_string(), "error serializing event payload");
                return Err(BrokerError::Internal);
            }
        };
        self.publish(exchange, routing_key, &payload, mandatory)
    }

    /// Publishes raw payload bytes carrying a correlation id, for
    /// request/reply flows.
    pub fn publish_correlated(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        correlation_id: Uuid,
        mandatory: bool,
    ) -> Result<usize, BrokerError> {
        let message = Message::new(routing_key, payload.to_vec()).correlated(correlation_id);
        self.broker.publish(exchange, message, mandatory)
    }
}
