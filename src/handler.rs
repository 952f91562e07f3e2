// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumer Handler Seam
//!
//! The polymorphic callback abstraction between the dispatcher and consumer
//! code. Registering a subscription means handing the dispatcher an
//! `Arc<dyn ConsumerHandler>`; the dispatcher invokes it once per delivery.

use crate::queue::Delivery;
use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by a consumer handler.
///
/// Handler failures never propagate out of the dispatcher loop; in auto-ack
/// mode they drive nack-with-requeue and, eventually, dead-lettering.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> HandlerError {
        HandlerError {
            message: message.into(),
        }
    }
}

/// Processes deliveries for one subscription.
///
/// Implementations may take arbitrary time; each subscription runs on its
/// own task, so a slow handler only delays its own queue.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConsumerHandler: Send + Sync {
    async fn exec(&self, delivery: &Delivery) -> Result<(), HandlerError>;
}
