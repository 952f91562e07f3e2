// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Dispatcher
//!
//! This module pulls messages from queues and delivers them to registered
//! consumer handlers. Each registration runs on its own tokio task, so
//! independent subscriptions make progress concurrently and a slow handler
//! only delays its own queue.
//!
//! Cancelling a subscription stops new deliveries without corrupting
//! in-flight acknowledgement state: an unacked delivery reverts to the queue
//! through the visibility timeout.

use crate::{
    broker::Broker, consumer::consume, errors::BrokerError, handler::ConsumerHandler,
    message::AckMode,
};
use futures_util::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error};

/// How long one blocking dequeue attempt waits before the loop re-checks
/// cancellation and visibility expiries.
const DEQUEUE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// One consumer registration: a queue, an ack discipline and a handler.
#[derive(Clone)]
struct Subscription {
    queue: String,
    ack_mode: AckMode,
    handler: Arc<dyn ConsumerHandler>,
    cancelled: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

/// Handle for stopping one subscription.
pub struct SubscriptionHandle {
    queue: String,
    cancelled: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl SubscriptionHandle {
    /// Stops new deliveries to the subscription. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Name of the queue the subscription consumes from.
    pub fn queue(&self) -> &str {
        &self.queue
    }
}

/// Delivers queued messages to registered consumer handlers.
pub struct Dispatcher {
    broker: Arc<Broker>,
    subscriptions: Vec<Subscription>,
}

impl Dispatcher {
    /// Creates a new dispatcher over the given broker.
    pub fn new(broker: Arc<Broker>) -> Dispatcher {
        Dispatcher {
            broker,
            subscriptions: vec![],
        }
    }

    /// Registers a handler for a queue.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn register(
        mut self,
        queue: &str,
        ack_mode: AckMode,
        handler: Arc<dyn ConsumerHandler>,
    ) -> Self {
        self.subscriptions.push(Subscription {
            queue: queue.to_owned(),
            ack_mode,
            handler,
            cancelled: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        });
        self
    }

    /// Cancellation handles for every registration, in registration order.
    pub fn handles(&self) -> Vec<SubscriptionHandle> {
        self.subscriptions
            .iter()
            .map(|sub| SubscriptionHandle {
                queue: sub.queue.clone(),
                cancelled: Arc::clone(&sub.cancelled),
                wake: Arc::clone(&sub.wake),
            })
            .collect()
    }

    /// Consumes messages for every registration until each subscription is
    /// cancelled.
    ///
    /// Spawns one task per registration and blocks on all of them. Handler
    /// failures are handled inside the loop (nack, redelivery, DLQ) and never
    /// end consumption.
    pub async fn consume_blocking(&self) -> Result<(), BrokerError> {
        let mut spawns = vec![];

        for sub in &self.subscriptions {
            let broker = Arc::clone(&self.broker);
            let sub = sub.clone();
            spawns.push(tokio::spawn(run_subscription(broker, sub)));
        }

        for joined in join_all(spawns).await {
            match joined {
                Ok(result) => result?,
                Err(err) => {
                    error!(error = err.to_string(), "subscription task failed");
                    return Err(BrokerError::Internal);
                }
            }
        }

        Ok(())
    }
}

async fn run_subscription(broker: Arc<Broker>, sub: Subscription) -> Result<(), BrokerError> {
    let queue = broker.queue(&sub.queue)?;
    debug!(queue = sub.queue.as_str(), "subscription started");

    while !sub.cancelled.load(Ordering::SeqCst) {
        tokio::select! {
            _ = sub.wake.notified() => {}
            result = queue.dequeue(DEQUEUE_POLL_INTERVAL) => match result {
                Ok(delivery) => {
                    if sub.cancelled.load(Ordering::SeqCst) {
                        // dequeued in the same poll the cancel landed;
                        // hand it straight back
                        let _ = delivery.nack(true);
                        break;
                    }
                    if let Err(err) = consume(&sub.queue, sub.ack_mode, &sub.handler, delivery).await {
                        error!(
                            queue = sub.queue.as_str(),
                            error = err.to_string(),
                            "error handling delivery"
                        );
                    }
                }
                Err(BrokerError::Timeout(_)) => {}
                Err(err) => {
                    error!(
                        queue = sub.queue.as_str(),
                        error = err.to_string(),
                        "error consuming from queue"
                    );
                    return Err(err);
                }
            }
        }
    }

    debug!(queue = sub.queue.as_str(), "subscription stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::ExchangeDefinition;
    use crate::handler::{HandlerError, MockConsumerHandler};
    use crate::message::Message;
    use crate::queue::QueueDefinition;
    use std::sync::Mutex;
    use uuid::Uuid;

    fn direct_setup(broker: &Broker, queue: &str, key: &str) {
        broker
            .declare_exchange(ExchangeDefinition::new("orders.direct"))
            .unwrap();
        broker.declare_queue(QueueDefinition::new(queue)).unwrap();
        broker.bind("orders.direct", key, queue).unwrap();
    }

    #[tokio::test]
    async fn auto_ack_subscription_processes_published_messages() {
        let broker = Broker::new();
        direct_setup(&broker, "work", "job.created");

        let seen: Arc<Mutex<Vec<Uuid>>> = Arc::new(Mutex::new(vec![]));
        let mut handler = MockConsumerHandler::new();
        let sink = Arc::clone(&seen);
        handler.expect_exec().returning(move |delivery| {
            sink.lock().unwrap().push(delivery.message.id);
            Ok(())
        });

        let dispatcher = Arc::new(
            Dispatcher::new(Arc::clone(&broker)).register("work", AckMode::Auto, Arc::new(handler)),
        );
        let handles = dispatcher.handles();
        let running = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.consume_blocking().await })
        };

        let message = Message::new("job.created", b"{}".to_vec());
        let id = message.id;
        broker.publish("orders.direct", message, false).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*seen.lock().unwrap(), vec![id]);
        assert_eq!(broker.queue("work").unwrap().stats().in_flight, 0);

        handles[0].cancel();
        running.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn failing_handler_drives_redelivery_into_the_dlq() {
        let broker = Broker::new();
        broker
            .declare_exchange(ExchangeDefinition::new("orders.direct"))
            .unwrap();
        broker
            .declare_queue(QueueDefinition::new("work").max_redeliveries(2).with_dlq())
            .unwrap();
        broker.bind("orders.direct", "job.created", "work").unwrap();

        let mut handler = MockConsumerHandler::new();
        handler
            .expect_exec()
            .times(3)
            .returning(|_| Err(HandlerError::new("cannot process")));

        let dispatcher = Arc::new(
            Dispatcher::new(Arc::clone(&broker)).register("work", AckMode::Auto, Arc::new(handler)),
        );
        let handles = dispatcher.handles();
        let running = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.consume_blocking().await })
        };

        broker
            .publish("orders.direct", Message::new("job.created", vec![]), false)
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        handles[0].cancel();
        running.await.unwrap().unwrap();

        let work = broker.queue("work").unwrap();
        assert_eq!(work.stats().depth, 0);
        assert_eq!(work.stats().dead_lettered, 1);
        assert_eq!(broker.queue("work-dlq").unwrap().stats().depth, 1);
    }

    #[tokio::test]
    async fn cancelled_subscription_stops_receiving() {
        let broker = Broker::new();
        direct_setup(&broker, "work", "job.created");

        let seen: Arc<Mutex<Vec<Uuid>>> = Arc::new(Mutex::new(vec![]));
        let mut handler = MockConsumerHandler::new();
        let sink = Arc::clone(&seen);
        handler.expect_exec().returning(move |delivery| {
            sink.lock().unwrap().push(delivery.message.id);
            Ok(())
        });

        let dispatcher = Arc::new(
            Dispatcher::new(Arc::clone(&broker)).register("work", AckMode::Auto, Arc::new(handler)),
        );
        let handles = dispatcher.handles();
        let running = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.consume_blocking().await })
        };

        handles[0].cancel();
        running.await.unwrap().unwrap();

        broker
            .publish("orders.direct", Message::new("job.created", vec![]), false)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(broker.queue("work").unwrap().stats().depth, 1);
    }

    #[tokio::test]
    async fn subscribing_to_an_unknown_queue_fails() {
        let broker = Broker::new();

        let mut handler = MockConsumerHandler::new();
        handler.expect_exec().never();

        let dispatcher =
            Dispatcher::new(broker).register("ghost", AckMode::Auto, Arc::new(handler));

        let result = dispatcher.consume_blocking().await;
        assert!(matches!(result, Err(BrokerError::QueueNotFound(_))));
    }
}
