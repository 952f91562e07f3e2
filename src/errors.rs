// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Routing Engine
//!
//! This module provides the error taxonomy for broker operations. The
//! `BrokerError` enum covers every failure a declaring, binding, publishing
//! or consuming operation can return. Structural errors (not-found, conflict,
//! validation) are always surfaced synchronously to the caller; delivery-time
//! failures are handled by the dispatcher and never reach this enum.

use thiserror::Error;

/// Represents errors that can occur during routing-engine operations.
///
/// Each variant carries enough context to name the exchange, queue or
/// delivery tag involved, so callers never need to re-derive what failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// Internal errors that don't fit into other categories
    #[error("internal error")]
    Internal,

    /// Referenced exchange does not exist
    #[error("exchange `{0}` not found")]
    ExchangeNotFound(String),

    /// Referenced queue does not exist
    #[error("queue `{0}` not found")]
    QueueNotFound(String),

    /// Acknowledgement referenced a delivery tag that is not in flight
    #[error("delivery tag `{tag}` not found on queue `{queue}`")]
    DeliveryTagNotFound { queue: String, tag: u64 },

    /// Exchange redeclared with a different kind or flags
    #[error("exchange `{0}` already declared with a conflicting definition")]
    ExchangeConflict(String),

    /// Queue redeclared with a different configuration
    #[error("queue `{0}` already declared with a conflicting definition")]
    QueueConflict(String),

    /// Exchange or queue name is malformed
    #[error("invalid name `{0}`")]
    InvalidName(String),

    /// Topic binding pattern is malformed
    #[error("invalid topic pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Bounded queue is full under the reject-new overflow policy
    #[error("queue `{0}` is at capacity")]
    CapacityExceeded(String),

    /// Mandatory publish matched no bound queue
    #[error("no route from exchange `{exchange}` for routing key `{routing_key}`")]
    Unroutable {
        exchange: String,
        routing_key: String,
    },

    /// Non-blocking dequeue found no deliverable message
    #[error("queue `{0}` is empty")]
    Empty(String),

    /// Blocking dequeue exceeded its timeout
    #[error("timed out waiting for a message on queue `{0}`")]
    Timeout(String),
}
