// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Core
//!
//! The `Broker` is the single long-lived owner of routing state: the exchange
//! registry (each exchange holding its binding table) and the queue registry.
//! It is created at startup, shared via `Arc`, and torn down explicitly with
//! the last handle; there are no hidden singletons.
//!
//! Routing happens in `publish`: resolve the exchange, compute the matching
//! queues, enqueue one value-copy per target. Each queue's enqueue is
//! independently atomic; there is no cross-queue transaction, so a failure
//! mid-fanout leaves copies in the already-reached queues (accepted
//! at-least-once semantics).

use crate::{
    errors::BrokerError,
    exchange::{Exchange, ExchangeDefinition},
    message::Message,
    queue::{Queue, QueueDefinition},
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// In-process routing engine: exchange and queue registries plus the
/// publish path.
#[derive(Default)]
pub struct Broker {
    exchanges: RwLock<HashMap<String, Arc<Exchange>>>,
    queues: RwLock<HashMap<String, Arc<Queue>>>,
}

impl Broker {
    /// Creates a new empty broker.
    ///
    /// # Returns
    /// An Arc-wrapped Broker instance for thread-safe sharing
    pub fn new() -> Arc<Broker> {
        Arc::new(Broker::default())
    }

    /// Declares an exchange.
    ///
    /// Idempotent when the existing declaration is identical; fails with
    /// `ExchangeConflict` when the name exists with a different kind or
    /// flags. The kind of a declared exchange never changes.
    pub fn declare_exchange(&self, def: ExchangeDefinition) -> Result<(), BrokerError> {
        validate_name(&def.name)?;

        let mut exchanges = self.exchanges.write().unwrap();
        if let Some(existing) = exchanges.get(&def.name) {
            if *existing.definition() == def {
                return Ok(());
            }
            return Err(BrokerError::ExchangeConflict(def.name));
        }

        debug!(name = def.name.as_str(), kind = ?def.kind, "declaring exchange");
        exchanges.insert(def.name.clone(), Arc::new(Exchange::new(def)));
        Ok(())
    }

    /// Declares a queue.
    ///
    /// Idempotent when the existing declaration is identical; fails with
    /// `QueueConflict` otherwise. A definition carrying a dead-letter target
    /// lazily declares that DLQ (plain, unbounded) when it does not exist.
    pub fn declare_queue(&self, def: QueueDefinition) -> Result<(), BrokerError> {
        validate_name(&def.name)?;

        let mut queues = self.queues.write().unwrap();
        if let Some(existing) = queues.get(&def.name) {
            if *existing.definition() == def {
                return Ok(());
            }
            // a failed declare must not touch the registry, so the conflict
            // check runs before any lazy DLQ declaration
            return Err(BrokerError::QueueConflict(def.name));
        }

        let dead_letter = match &def.dead_letter {
            Some(dlq_name) => Some(get_or_declare_dlq(&mut queues, dlq_name)?),
            None => None,
        };

        debug!(name = def.name.as_str(), "declaring queue");
        queues.insert(def.name.clone(), Queue::new(def, dead_letter));
        Ok(())
    }

    /// Binds a queue to an exchange under a pattern.
    ///
    /// Fails with not-found when either side is absent and with a validation
    /// error on a malformed topic pattern; duplicate bindings are deduplicated.
    pub fn bind(&self, exchange: &str, pattern: &str, queue: &str) -> Result<(), BrokerError> {
        let exchange = self.exchange(exchange)?;
        // the binding invariant: the destination queue must exist at bind time
        self.queue(queue)?;
        exchange.bind(pattern, queue)
    }

    /// Removes a binding. No-op when the binding is absent; the exchange
    /// itself must exist.
    pub fn unbind(&self, exchange: &str, pattern: &str, queue: &str) -> Result<(), BrokerError> {
        let exchange = self.exchange(exchange)?;
        exchange.unbind(pattern, queue);
        Ok(())
    }

    /// Deletes an exchange and all its bindings.
    pub fn delete_exchange(&self, name: &str) -> Result<(), BrokerError> {
        let mut exchanges = self.exchanges.write().unwrap();
        exchanges
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| BrokerError::ExchangeNotFound(name.to_owned()))
    }

    /// Deletes a queue and removes every binding that references it.
    pub fn delete_queue(&self, name: &str) -> Result<(), BrokerError> {
        {
            let mut queues = self.queues.write().unwrap();
            queues
                .remove(name)
                .ok_or_else(|| BrokerError::QueueNotFound(name.to_owned()))?;
        }

        let exchanges = self.exchanges.read().unwrap();
        for exchange in exchanges.values() {
            exchange.remove_queue_bindings(name);
        }
        Ok(())
    }

    /// Looks up a declared exchange.
    pub fn exchange(&self, name: &str) -> Result<Arc<Exchange>, BrokerError> {
        let exchanges = self.exchanges.read().unwrap();
        exchanges
            .get(name)
            .cloned()
            .ok_or_else(|| BrokerError::ExchangeNotFound(name.to_owned()))
    }

    /// Looks up a declared queue.
    pub fn queue(&self, name: &str) -> Result<Arc<Queue>, BrokerError> {
        let queues = self.queues.read().unwrap();
        queues
            .get(name)
            .cloned()
            .ok_or_else(|| BrokerError::QueueNotFound(name.to_owned()))
    }

    /// Routes a message through an exchange.
    ///
    /// Enqueues one independent copy per matching queue (same id and routing
    /// key, so consumers can correlate a broadcast) and returns the delivery
    /// count. Zero targets is a silent drop unless `mandatory` is set, in
    /// which case `Unroutable` is returned.
    pub fn publish(
        &self,
        exchange: &str,
        message: Message,
        mandatory: bool,
    ) -> Result<usize, BrokerError> {
        let resolved = self.exchange(exchange)?;
        let targets = resolved.resolve_targets(&message.routing_key);

        if targets.is_empty() {
            if mandatory {
                return Err(BrokerError::Unroutable {
                    exchange: exchange.to_owned(),
                    routing_key: message.routing_key,
                });
            }
            debug!(
                exchange,
                routing_key = message.routing_key.as_str(),
                "unroutable message, dropping"
            );
            return Ok(0);
        }

        let queues = self.queues.read().unwrap();
        let mut delivered = 0;
        for target in &targets {
            // delete_queue removes bindings, so a miss here is a race worth logging
            let Some(queue) = queues.get(target) else {
                warn!(queue = target.as_str(), "binding references a missing queue");
                continue;
            };
            queue.enqueue(message.clone())?;
            delivered += 1;
        }

        debug!(
            exchange,
            routing_key = message.routing_key.as_str(),
            message_id = %message.id,
            delivered,
            "message routed"
        );
        Ok(delivered)
    }

    /// Acknowledges a delivery by queue name and tag.
    pub fn ack(&self, queue: &str, tag: u64) -> Result<(), BrokerError> {
        self.queue(queue)?.ack(tag)
    }

    /// Negatively acknowledges a delivery by queue name and tag.
    pub fn nack(&self, queue: &str, tag: u64, requeue: bool) -> Result<(), BrokerError> {
        self.queue(queue)?.nack(tag, requeue)
    }
}

fn validate_name(name: &str) -> Result<(), BrokerError> {
    if name.is_empty() {
        return Err(BrokerError::InvalidName(name.to_owned()));
    }
    Ok(())
}

fn get_or_declare_dlq(
    queues: &mut HashMap<String, Arc<Queue>>,
    name: &str,
) -> Result<Arc<Queue>, BrokerError> {
    validate_name(name)?;

    if let Some(existing) = queues.get(name) {
        return Ok(Arc::clone(existing));
    }

    debug!(name, "lazily declaring dead-letter queue");
    let dlq = Queue::new(QueueDefinition::new(name), None);
    queues.insert(name.to_owned(), Arc::clone(&dlq));
    Ok(dlq)
}
