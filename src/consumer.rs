// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Per-Delivery Consumption
//!
//! The acknowledgement decision for a single delivery. In auto-ack mode the
//! message is acked on handler success and nack-requeued on failure, which
//! feeds the queue's redelivery accounting and eventual dead-lettering. In
//! manual mode the handler owns the decision through the delivery handle and
//! an unacked delivery reverts via the queue's visibility timeout.

use crate::{
    errors::BrokerError,
    handler::ConsumerHandler,
    message::AckMode,
    queue::Delivery,
};
use std::sync::Arc;
use tracing::{debug, warn};

pub(crate) async fn consume(
    queue: &str,
    ack_mode: AckMode,
    handler: &Arc<dyn ConsumerHandler>,
    delivery: Delivery,
) -> Result<(), BrokerError> {
    debug!(
        queue,
        message_id = %delivery.message.id,
        redelivered = delivery.redelivered,
        "delivering message"
    );

    let result = handler.exec(&delivery).await;

    if ack_mode == AckMode::Manual {
        // the handler acks or nacks itself; a crashed handler is covered by
        // the visibility timeout
        return Ok(());
    }

    match result {
        Ok(()) => {
            debug!(queue, message_id = %delivery.message.id, "message successfully processed");
            delivery.ack()
        }
        Err(err) => {
            warn!(
                queue,
                message_id = %delivery.message.id,
                error = err.to_string(),
                "handler failed, requeuing message"
            );
            delivery.nack(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::Broker;
    use crate::handler::{HandlerError, MockConsumerHandler};
    use crate::message::Message;
    use crate::queue::QueueDefinition;

    fn queue_with_one_message(broker: &Broker) -> crate::queue::Delivery {
        broker
            .declare_queue(QueueDefinition::new("work").max_redeliveries(1))
            .unwrap();
        let queue = broker.queue("work").unwrap();
        queue.enqueue(Message::new("job", b"{}".to_vec())).unwrap();
        queue.try_dequeue().unwrap()
    }

    #[tokio::test]
    async fn auto_ack_acks_on_handler_success() {
        let broker = Broker::new();
        let delivery = queue_with_one_message(&broker);

        let mut handler = MockConsumerHandler::new();
        handler.expect_exec().times(1).returning(|_| Ok(()));
        let handler: Arc<dyn ConsumerHandler> = Arc::new(handler);

        consume("work", AckMode::Auto, &handler, delivery)
            .await
            .unwrap();

        let queue = broker.queue("work").unwrap();
        assert_eq!(queue.stats().in_flight, 0);
        assert_eq!(queue.stats().depth, 0);
    }

    #[tokio::test]
    async fn auto_ack_requeues_on_handler_failure() {
        let broker = Broker::new();
        let delivery = queue_with_one_message(&broker);

        let mut handler = MockConsumerHandler::new();
        handler
            .expect_exec()
            .times(1)
            .returning(|_| Err(HandlerError::new("boom")));
        let handler: Arc<dyn ConsumerHandler> = Arc::new(handler);

        consume("work", AckMode::Auto, &handler, delivery)
            .await
            .unwrap();

        let queue = broker.queue("work").unwrap();
        let redelivery = queue.try_dequeue().unwrap();
        assert!(redelivery.redelivered);
    }

    #[tokio::test]
    async fn manual_mode_leaves_the_delivery_in_flight() {
        let broker = Broker::new();
        let delivery = queue_with_one_message(&broker);

        let mut handler = MockConsumerHandler::new();
        handler.expect_exec().times(1).returning(|_| Ok(()));
        let handler: Arc<dyn ConsumerHandler> = Arc::new(handler);

        consume("work", AckMode::Manual, &handler, delivery)
            .await
            .unwrap();

        let queue = broker.queue("work").unwrap();
        assert_eq!(queue.stats().in_flight, 1);
    }
}
