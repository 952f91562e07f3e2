// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Management
//!
//! This module provides types for defining and running exchanges. Exchanges
//! are the routing mechanism of the engine: a published message enters an
//! exchange and the exchange decides, from its binding table and the matcher,
//! which queues receive a copy.

use crate::{errors::BrokerError, matcher};
use std::collections::HashSet;
use std::sync::RwLock;
use tracing::debug;

/// Represents the routing disciplines an exchange can be declared with.
///
/// - Direct: routes to queues whose bound pattern equals the routing key
/// - Fanout: broadcasts to all bound queues regardless of routing key
/// - Topic: routes by wildcard pattern matching of routing keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExchangeKind {
    #[default]
    Direct,
    Fanout,
    Topic,
}

/// Definition of an exchange with its configuration parameters.
///
/// This struct implements the builder pattern to create and configure
/// exchange definitions before declaring them on a broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeDefinition {
    pub(crate) name: String,
    pub(crate) kind: ExchangeKind,
    pub(crate) durable: bool,
}

impl ExchangeDefinition {
    /// Creates a new exchange definition with the given name.
    ///
    /// By default, the exchange is a non-durable direct exchange.
    pub fn new(name: &str) -> ExchangeDefinition {
        ExchangeDefinition {
            name: name.to_owned(),
            kind: ExchangeKind::Direct,
            durable: false,
        }
    }

    /// Sets the exchange kind.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn kind(mut self, kind: ExchangeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the exchange kind to Direct.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn direct(mut self) -> Self {
        self.kind = ExchangeKind::Direct;
        self
    }

    /// Sets the exchange kind to Fanout.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn fanout(mut self) -> Self {
        self.kind = ExchangeKind::Fanout;
        self
    }

    /// Sets the exchange kind to Topic.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn topic(mut self) -> Self {
        self.kind = ExchangeKind::Topic;
        self
    }

    /// Marks the exchange durable.
    ///
    /// The flag is representable for declare-conflict checks, but the
    /// in-memory engine does not persist anything across restarts.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }
}

/// A single binding rule: messages matching `pattern` go to `queue`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Binding {
    pub(crate) pattern: String,
    pub(crate) queue: String,
}

/// A declared exchange holding its binding table.
///
/// The kind is immutable once declared. Bindings are mutated under the
/// exchange's own lock so independent exchanges make progress concurrently.
#[derive(Debug)]
pub struct Exchange {
    def: ExchangeDefinition,
    bindings: RwLock<Vec<Binding>>,
}

impl Exchange {
    pub(crate) fn new(def: ExchangeDefinition) -> Exchange {
        Exchange {
            def,
            bindings: RwLock::new(vec![]),
        }
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn kind(&self) -> ExchangeKind {
        self.def.kind
    }

    pub(crate) fn definition(&self) -> &ExchangeDefinition {
        &self.def
    }

    /// Adds a binding to the table. Succeeds idempotently on a duplicate
    /// (exchange, pattern, queue) triple; fails on a malformed topic pattern.
    pub(crate) fn bind(&self, pattern: &str, queue: &str) -> Result<(), BrokerError> {
        matcher::validate_pattern(self.def.kind, pattern)?;

        let binding = Binding {
            pattern: pattern.to_owned(),
            queue: queue.to_owned(),
        };

        let mut bindings = self.bindings.write().unwrap();
        if bindings.contains(&binding) {
            return Ok(());
        }

        debug!(
            exchange = self.def.name.as_str(),
            queue, pattern, "binding queue to exchange"
        );
        bindings.push(binding);

        Ok(())
    }

    /// Removes a binding. No-op if the binding is absent.
    pub(crate) fn unbind(&self, pattern: &str, queue: &str) {
        let mut bindings = self.bindings.write().unwrap();
        bindings.retain(|b| !(b.pattern == pattern && b.queue == queue));
    }

    /// Drops every binding that targets the given queue. Used when
    /// the queue is deleted so no binding references a missing queue.
    pub(crate) fn remove_queue_bindings(&self, queue: &str) {
        let mut bindings = self.bindings.write().unwrap();
        bindings.retain(|b| b.queue != queue);
    }

    /// Computes the deduplicated set of queue names whose bound pattern
    /// matches the routing key, in binding order.
    ///
    /// A direct exchange with no exact-match binding yields an empty set;
    /// a fanout exchange yields every bound queue unconditionally.
    pub fn resolve_targets(&self, routing_key: &str) -> Vec<String> {
        let bindings = self.bindings.read().unwrap();

        let mut seen = HashSet::new();
        let mut targets = vec![];
        for binding in bindings.iter() {
            if matcher::matches(self.def.kind, &binding.pattern, routing_key)
                && seen.insert(binding.queue.clone())
            {
                targets.push(binding.queue.clone());
            }
        }

        targets
    }
}
