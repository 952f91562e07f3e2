// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Management
//!
//! This module provides types for defining and running queues. A queue is an
//! ordered, optionally bounded mailbox of delivered messages. It supports
//! acknowledgement with per-message delivery tags, negative acknowledgement
//! with requeue, a visibility timeout for crashed consumers, and Dead Letter
//! Queue (DLQ) routing once the redelivery limit is exhausted.
//!
//! Ordering contract: first-time deliveries preserve enqueue order (FIFO).
//! Requeued messages return to the *front* of the queue, so a redelivery may
//! overtake messages published after the original delivery.

use crate::{errors::BrokerError, message::Message};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default maximum number of redeliveries before a message is dead-lettered
/// or dropped.
pub const DEFAULT_MAX_REDELIVERIES: u32 = 5;

/// Default time an unacknowledged delivery stays invisible before it is
/// automatically requeued.
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Behavior of a bounded queue when a new message arrives while full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Reject the incoming message with `CapacityExceeded`
    #[default]
    RejectNew,
    /// Evict the oldest ready message to make room
    DropOldest,
}

/// Definition of a queue with its configuration parameters.
///
/// This struct implements the builder pattern to create and configure queue
/// definitions before declaring them on a broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDefinition {
    pub(crate) name: String,
    pub(crate) durable: bool,
    pub(crate) capacity: Option<usize>,
    pub(crate) overflow: OverflowPolicy,
    pub(crate) max_redeliveries: u32,
    pub(crate) visibility_timeout: Duration,
    pub(crate) dead_letter: Option<String>,
}

impl QueueDefinition {
    /// Creates a new queue definition with the given name.
    ///
    /// Defaults: non-durable, unbounded, reject-new overflow, 5 redeliveries,
    /// 30s visibility timeout, no DLQ.
    pub fn new(name: &str) -> QueueDefinition {
        QueueDefinition {
            name: name.to_owned(),
            durable: false,
            capacity: None,
            overflow: OverflowPolicy::default(),
            max_redeliveries: DEFAULT_MAX_REDELIVERIES,
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
            dead_letter: None,
        }
    }

    /// Marks the queue durable.
    ///
    /// Representable for declare-conflict checks only; the in-memory engine
    /// does not persist messages across restarts.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Bounds the queue to at most `max` ready messages.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn capacity(mut self, max: usize) -> Self {
        self.capacity = Some(max);
        self
    }

    /// Switches the overflow policy to drop-oldest.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn drop_oldest(mut self) -> Self {
        self.overflow = OverflowPolicy::DropOldest;
        self
    }

    /// Sets the maximum number of redeliveries before dead-lettering.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn max_redeliveries(mut self, retries: u32) -> Self {
        self.max_redeliveries = retries;
        self
    }

    /// Sets the visibility timeout for unacknowledged deliveries.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Adds a Dead Letter Queue (DLQ) to the queue.
    ///
    /// The DLQ receives messages whose redelivery limit is exhausted. Its
    /// name is the queue name with a "-dlq" suffix; the broker declares it
    /// lazily if it does not exist.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn with_dlq(mut self) -> Self {
        self.dead_letter = Some(format!("{}-dlq", self.name));
        self
    }

    /// Routes dead-lettered messages to an explicitly named queue.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn dead_letter(mut self, queue: &str) -> Self {
        self.dead_letter = Some(queue.to_owned());
        self
    }
}

/// Configuration for binding a queue to an exchange.
pub struct QueueBinding {
    pub(crate) queue_name: String,
    pub(crate) exchange_name: String,
    pub(crate) routing_key: String,
}

impl QueueBinding {
    /// Creates a new binding for the given queue. The exchange name and
    /// routing key start empty and are set with the builder methods.
    pub fn new(queue: &str) -> QueueBinding {
        QueueBinding {
            queue_name: queue.to_owned(),
            exchange_name: String::new(),
            routing_key: String::new(),
        }
    }

    /// Sets the exchange to bind the queue to.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn exchange(mut self, exchange: &str) -> Self {
        self.exchange_name = exchange.to_owned();
        self
    }

    /// Sets the routing key (or pattern) for the binding.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn routing_key(mut self, key: &str) -> Self {
        self.routing_key = key.to_owned();
        self
    }
}

/// Counters exposed by a queue for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Ready messages waiting for delivery
    pub depth: usize,
    /// Delivered but not yet acknowledged messages
    pub in_flight: usize,
    /// Messages dropped by overflow eviction or exhausted redeliveries
    /// without a DLQ
    pub dropped: u64,
    /// Messages forwarded to the DLQ
    pub dead_lettered: u64,
}

struct ReadyMessage {
    message: Message,
    redeliveries: u32,
}

struct InFlight {
    message: Message,
    redeliveries: u32,
    deadline: Instant,
}

struct QueueState {
    ready: VecDeque<ReadyMessage>,
    unacked: HashMap<u64, InFlight>,
    next_tag: u64,
}

/// A declared queue: FIFO mailbox plus in-flight delivery tracking.
///
/// All state mutations happen under the queue's own mutex; independent
/// queues never contend with each other.
pub struct Queue {
    def: QueueDefinition,
    state: Mutex<QueueState>,
    notify: Notify,
    dead_letter: Option<Arc<Queue>>,
    dropped: AtomicU64,
    dead_lettered: AtomicU64,
    // self-handle so deliveries can carry an owning reference back
    this: Weak<Queue>,
}

impl Queue {
    pub(crate) fn new(def: QueueDefinition, dead_letter: Option<Arc<Queue>>) -> Arc<Queue> {
        Arc::new_cyclic(|this| Queue {
            def,
            state: Mutex::new(QueueState {
                ready: VecDeque::new(),
                unacked: HashMap::new(),
                next_tag: 1,
            }),
            notify: Notify::new(),
            dead_letter,
            dropped: AtomicU64::new(0),
            dead_lettered: AtomicU64::new(0),
            this: this.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub(crate) fn definition(&self) -> &QueueDefinition {
        &self.def
    }

    /// Appends a message to the tail of the queue.
    ///
    /// A bounded queue that is full either rejects the new message
    /// (`CapacityExceeded`, default) or evicts its oldest ready message,
    /// depending on the overflow policy. Capacity counts ready messages
    /// only; in-flight deliveries are not held against it.
    pub fn enqueue(&self, message: Message) -> Result<(), BrokerError> {
        {
            let mut state = self.state.lock().unwrap();

            if let Some(capacity) = self.def.capacity {
                if state.ready.len() >= capacity {
                    match self.def.overflow {
                        OverflowPolicy::RejectNew => {
                            return Err(BrokerError::CapacityExceeded(self.def.name.clone()));
                        }
                        OverflowPolicy::DropOldest => {
                            state.ready.pop_front();
                            self.dropped.fetch_add(1, Ordering::Relaxed);
                            warn!(
                                queue = self.def.name.as_str(),
                                "queue full, dropping oldest message"
                            );
                        }
                    }
                }
            }

            state.ready.push_back(ReadyMessage {
                message,
                redeliveries: 0,
            });
        }

        self.notify.notify_one();
        Ok(())
    }

    /// Takes the next deliverable message without blocking.
    ///
    /// Returns `Empty` when nothing is deliverable. Expired in-flight
    /// deliveries are requeued (or dead-lettered) before the head is taken.
    pub fn try_dequeue(&self) -> Result<Delivery, BrokerError> {
        // the caller holds an Arc to this queue, so the upgrade cannot fail
        let this = self.this.upgrade().ok_or(BrokerError::Internal)?;

        let (delivery, dead) = {
            let mut state = self.state.lock().unwrap();
            let dead = reap_expired(&self.def, &mut state);

            let delivery = state.ready.pop_front().map(|ready| {
                let tag = state.next_tag;
                state.next_tag += 1;

                state.unacked.insert(
                    tag,
                    InFlight {
                        message: ready.message.clone(),
                        redeliveries: ready.redeliveries,
                        deadline: Instant::now() + self.def.visibility_timeout,
                    },
                );

                Delivery {
                    message: ready.message,
                    tag,
                    redelivered: ready.redeliveries > 0,
                    queue: this,
                }
            });

            if !state.ready.is_empty() {
                self.notify.notify_one();
            }

            (delivery, dead)
        };

        self.forward_dead_letters(dead);

        delivery.ok_or_else(|| BrokerError::Empty(self.def.name.clone()))
    }

    /// Takes the next deliverable message, suspending the caller until one
    /// arrives or `timeout` elapses.
    pub async fn dequeue(&self, timeout: Duration) -> Result<Delivery, BrokerError> {
        let deadline = Instant::now() + timeout;

        loop {
            let notified = self.notify.notified();

            match self.try_dequeue() {
                Ok(delivery) => return Ok(delivery),
                Err(BrokerError::Empty(_)) => {}
                Err(err) => return Err(err),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(BrokerError::Timeout(self.def.name.clone()));
            }

            // Wake for a new message, the next visibility expiry, or the
            // caller's timeout, whichever comes first.
            let mut wait = deadline - now;
            if let Some(expiry) = self.next_expiry() {
                wait = wait.min(expiry.saturating_duration_since(now));
            }

            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Acknowledges a delivery, removing the message permanently.
    pub fn ack(&self, tag: u64) -> Result<(), BrokerError> {
        let mut state = self.state.lock().unwrap();
        state
            .unacked
            .remove(&tag)
            .map(|_| ())
            .ok_or(BrokerError::DeliveryTagNotFound {
                queue: self.def.name.clone(),
                tag,
            })
    }

    /// Negatively acknowledges a delivery.
    ///
    /// With `requeue`, the message returns to the front of the queue for
    /// redelivery until `max_redeliveries` is exhausted, after which it is
    /// dead-lettered (or dropped with a counter increment when no DLQ is
    /// configured). Without `requeue`, the message is discarded.
    pub fn nack(&self, tag: u64, requeue: bool) -> Result<(), BrokerError> {
        let dead = {
            let mut state = self.state.lock().unwrap();
            let in_flight =
                state
                    .unacked
                    .remove(&tag)
                    .ok_or(BrokerError::DeliveryTagNotFound {
                        queue: self.def.name.clone(),
                        tag,
                    })?;

            if !requeue {
                debug!(
                    queue = self.def.name.as_str(),
                    message_id = %in_flight.message.id,
                    "message rejected without requeue, discarding"
                );
                return Ok(());
            }

            if in_flight.redeliveries < self.def.max_redeliveries {
                // Requeue to the front: a redelivery overtakes newer arrivals.
                // Capacity is not rechecked, the message was already admitted.
                state.ready.push_front(ReadyMessage {
                    message: in_flight.message,
                    redeliveries: in_flight.redeliveries + 1,
                });
                None
            } else {
                Some(in_flight.message)
            }
        };

        match dead {
            Some(message) => self.forward_dead_letters(vec![message]),
            None => self.notify.notify_one(),
        }

        Ok(())
    }

    /// Current queue counters.
    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock().unwrap();
        QueueStats {
            depth: state.ready.len(),
            in_flight: state.unacked.len(),
            dropped: self.dropped.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
        }
    }

    fn next_expiry(&self) -> Option<Instant> {
        let state = self.state.lock().unwrap();
        state.unacked.values().map(|f| f.deadline).min()
    }

    /// Routes exhausted messages to the DLQ, or drops them when none is
    /// configured. Called without holding the state lock: the DLQ is a
    /// distinct queue with its own lock.
    fn forward_dead_letters(&self, dead: Vec<Message>) {
        for message in dead {
            match &self.dead_letter {
                Some(dlq) => {
                    warn!(
                        queue = self.def.name.as_str(),
                        dlq = dlq.name(),
                        message_id = %message.id,
                        "redelivery limit exhausted, dead-lettering message"
                    );
                    match dlq.enqueue(message) {
                        Ok(()) => {
                            self.dead_lettered.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(err) => {
                            self.dropped.fetch_add(1, Ordering::Relaxed);
                            warn!(
                                queue = self.def.name.as_str(),
                                error = err.to_string(),
                                "failed to dead-letter message, dropping"
                            );
                        }
                    }
                }
                None => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        queue = self.def.name.as_str(),
                        message_id = %message.id,
                        "redelivery limit exhausted and no DLQ configured, dropping message"
                    );
                }
            }
        }
    }
}

/// Requeues in-flight deliveries whose visibility deadline has passed.
/// Expiry counts as a redelivery; exhausted messages are returned for
/// dead-lettering outside the lock.
fn reap_expired(def: &QueueDefinition, state: &mut QueueState) -> Vec<Message> {
    let now = Instant::now();
    let expired: Vec<u64> = state
        .unacked
        .iter()
        .filter(|(_, f)| f.deadline <= now)
        .map(|(tag, _)| *tag)
        .collect();

    let mut dead = vec![];
    for tag in expired {
        let Some(in_flight) = state.unacked.remove(&tag) else {
            continue;
        };
        if in_flight.redeliveries < def.max_redeliveries {
            warn!(
                queue = def.name.as_str(),
                message_id = %in_flight.message.id,
                "visibility timeout expired, requeuing message"
            );
            state.ready.push_front(ReadyMessage {
                message: in_flight.message,
                redeliveries: in_flight.redeliveries + 1,
            });
        } else {
            dead.push(in_flight.message);
        }
    }

    dead
}

/// A message handed to a consumer together with its acknowledgement handle.
///
/// The handle keeps the queue alive, so a consumer can ack or nack after the
/// queue was removed from the broker registry; the acknowledgement then only
/// touches state no longer reachable by publishers.
pub struct Delivery {
    pub message: Message,
    pub tag: u64,
    /// True when this delivery is a requeue of an earlier one
    pub redelivered: bool,
    queue: Arc<Queue>,
}

impl Delivery {
    /// Acknowledges this delivery.
    pub fn ack(&self) -> Result<(), BrokerError> {
        self.queue.ack(self.tag)
    }

    /// Negatively acknowledges this delivery.
    pub fn nack(&self, requeue: bool) -> Result<(), BrokerError> {
        self.queue.nack(self.tag, requeue)
    }

    /// Name of the queue this delivery came from.
    pub fn queue_name(&self) -> &str {
        self.queue.name()
    }
}
