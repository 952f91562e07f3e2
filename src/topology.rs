// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Topology Management
//!
//! Declarative wiring of exchanges, queues and the bindings between them.
//! A topology collects definitions with the builder methods and installs
//! them against a broker in one pass: exchanges first, then queues, then
//! bindings, so every binding references resources that already exist.

use crate::{
    broker::Broker,
    errors::BrokerError,
    exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
};
use tracing::debug;

/// Trait defining the interface for topology management.
pub trait Topology {
    /// Adds an exchange definition to the topology.
    fn exchange(self, def: ExchangeDefinition) -> Self;

    /// Adds a queue definition to the topology.
    fn queue(self, def: QueueDefinition) -> Self;

    /// Adds a queue-to-exchange binding to the topology.
    fn queue_binding(self, binding: QueueBinding) -> Self;

    /// Installs the topology on the broker.
    fn install(&self, broker: &Broker) -> Result<(), BrokerError>;
}

/// Collected definitions awaiting installation.
#[derive(Default)]
pub struct BrokerTopology {
    pub(crate) exchanges: Vec<ExchangeDefinition>,
    pub(crate) queues: Vec<QueueDefinition>,
    pub(crate) bindings: Vec<QueueBinding>,
}

impl BrokerTopology {
    /// Creates a new empty topology.
    pub fn new() -> BrokerTopology {
        BrokerTopology::default()
    }
}

impl Topology for BrokerTopology {
    /// Adds an exchange definition to the topology.
    ///
    /// # Returns
    /// Self for method chaining
    fn exchange(mut self, def: ExchangeDefinition) -> Self {
        self.exchanges.push(def);
        self
    }

    /// Adds a queue definition to the topology.
    ///
    /// # Returns
    /// Self for method chaining
    fn queue(mut self, def: QueueDefinition) -> Self {
        self.queues.push(def);
        self
    }

    /// Adds a queue-to-exchange binding to the topology.
    ///
    /// # Returns
    /// Self for method chaining
    fn queue_binding(mut self, binding: QueueBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Installs the topology on the broker.
    ///
    /// Declares all exchanges, then all queues, then sets up the bindings.
    /// Declarations follow the broker's idempotence rules, so installing the
    /// same topology twice succeeds.
    fn install(&self, broker: &Broker) -> Result<(), BrokerError> {
        for def in &self.exchanges {
            debug!(name = def.name.as_str(), "creating exchange");
            broker.declare_exchange(def.clone())?;
        }

        for def in &self.queues {
            debug!(name = def.name.as_str(), "creating queue");
            broker.declare_queue(def.clone())?;
        }

        for binding in &self.bindings {
            debug!(
                queue = binding.queue_name.as_str(),
                exchange = binding.exchange_name.as_str(),
                routing_key = binding.routing_key.as_str(),
                "binding queue to exchange"
            );
            broker.bind(
                &binding.exchange_name,
                &binding.routing_key,
                &binding.queue_name,
            )?;
        }

        Ok(())
    }
}
