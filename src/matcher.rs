// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Routing Key Matcher
//!
//! Pure matching of routing keys against binding patterns, one discipline per
//! exchange kind:
//!
//! - direct: exact, case-sensitive string equality
//! - fanout: every key matches, the pattern is not inspected
//! - topic: dot-token patterns where `*` matches exactly one token and `#`
//!   matches zero or more tokens
//!
//! Topic matching runs a dynamic program over (pattern token, key token)
//! indices, so the result is independent of how `#` positions could be split.
//! Multiple `#` tokens in one pattern are accepted and behave like a single
//! `#` over the span they cover.

use crate::{errors::BrokerError, exchange::ExchangeKind};

/// One parsed segment of a topic binding pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternToken<'p> {
    /// Literal token, matched by equality
    Word(&'p str),
    /// `*`: exactly one key token
    Star,
    /// `#`: zero or more key tokens
    Hash,
}

/// Evaluates whether `routing_key` matches `pattern` under the given
/// exchange kind. Deterministic and side-effect free.
pub fn matches(kind: ExchangeKind, pattern: &str, routing_key: &str) -> bool {
    match kind {
        ExchangeKind::Direct => pattern == routing_key,
        ExchangeKind::Fanout => true,
        ExchangeKind::Topic => topic_matches(pattern, routing_key),
    }
}

/// Validates a binding pattern for the given exchange kind.
///
/// Direct patterns are exact keys and fanout patterns are ignored, so only
/// topic patterns carry syntax: non-empty, no empty tokens, and `*`/`#`
/// allowed only as whole tokens.
pub fn validate_pattern(kind: ExchangeKind, pattern: &str) -> Result<(), BrokerError> {
    if kind != ExchangeKind::Topic {
        return Ok(());
    }

    if pattern.is_empty() {
        return Err(BrokerError::InvalidPattern {
            pattern: pattern.to_owned(),
            reason: "pattern cannot be empty".to_owned(),
        });
    }

    for token in pattern.split('.') {
        if token.is_empty() {
            return Err(BrokerError::InvalidPattern {
                pattern: pattern.to_owned(),
                reason: "empty token between dots".to_owned(),
            });
        }

        if token.len() > 1 && (token.contains('#') || token.contains('*')) {
            return Err(BrokerError::InvalidPattern {
                pattern: pattern.to_owned(),
                reason: format!("wildcard must be a whole token, got `{token}`"),
            });
        }
    }

    Ok(())
}

fn pattern_tokens(pattern: &str) -> Vec<PatternToken<'_>> {
    pattern
        .split('.')
        .map(|token| match token {
            "*" => PatternToken::Star,
            "#" => PatternToken::Hash,
            word => PatternToken::Word(word),
        })
        .collect()
}

fn key_tokens(routing_key: &str) -> Vec<&str> {
    if routing_key.is_empty() {
        return vec![];
    }
    routing_key.split('.').collect()
}

/// Token-wise wildcard match of a routing key against a topic pattern.
///
/// `reach[j]` holds whether the pattern tokens consumed so far can match the
/// first `j` key tokens; each pattern token folds one row of the dynamic
/// program, O(P×K) overall.
fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern = pattern_tokens(pattern);
    let key = key_tokens(routing_key);

    let mut reach = vec![false; key.len() + 1];
    reach[0] = true;

    for token in &pattern {
        match token {
            PatternToken::Hash => {
                // zero-or-more: a reachable prefix extends to every longer prefix
                for j in 1..=key.len() {
                    reach[j] = reach[j] || reach[j - 1];
                }
            }
            PatternToken::Star => {
                for j in (1..=key.len()).rev() {
                    reach[j] = reach[j - 1];
                }
                reach[0] = false;
            }
            PatternToken::Word(word) => {
                for j in (1..=key.len()).rev() {
                    reach[j] = reach[j - 1] && key[j - 1] == *word;
                }
                reach[0] = false;
            }
        }
    }

    reach[key.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_requires_exact_equality() {
        assert!(matches(ExchangeKind::Direct, "pedido.criado", "pedido.criado"));
        assert!(!matches(ExchangeKind::Direct, "pedido.criado", "pedido.cancelado"));
        assert!(!matches(ExchangeKind::Direct, "pedido", "Pedido"));
        assert!(!matches(ExchangeKind::Direct, "pedido.criado", "pedido"));
    }

    #[test]
    fn fanout_ignores_the_pattern() {
        assert!(matches(ExchangeKind::Fanout, "whatever", "log.error.db"));
        assert!(matches(ExchangeKind::Fanout, "", ""));
    }

    #[test]
    fn topic_literal_tokens() {
        assert!(matches(ExchangeKind::Topic, "log.error", "log.error"));
        assert!(!matches(ExchangeKind::Topic, "log.error", "log.info"));
        assert!(!matches(ExchangeKind::Topic, "log.error", "log.error.db"));
    }

    #[test]
    fn star_matches_exactly_one_token() {
        assert!(matches(ExchangeKind::Topic, "*.error", "db.error"));
        assert!(!matches(ExchangeKind::Topic, "*.error", "error"));
        assert!(!matches(ExchangeKind::Topic, "*.error", "log.db.error"));
        assert!(matches(ExchangeKind::Topic, "log.*.db", "log.error.db"));
        assert!(!matches(ExchangeKind::Topic, "log.*", "log"));
    }

    #[test]
    fn hash_matches_zero_or_more_tokens() {
        assert!(matches(ExchangeKind::Topic, "log.#", "log"));
        assert!(matches(ExchangeKind::Topic, "log.#", "log.error"));
        assert!(matches(ExchangeKind::Topic, "log.#", "log.error.db.retry"));
        assert!(!matches(ExchangeKind::Topic, "log.#", "metrics.cpu"));
        assert!(matches(ExchangeKind::Topic, "log.error.#", "log.error.db"));
        assert!(!matches(ExchangeKind::Topic, "log.error.#", "log.info.db"));
    }

    #[test]
    fn lone_hash_matches_everything_including_empty_key() {
        assert!(matches(ExchangeKind::Topic, "#", ""));
        assert!(matches(ExchangeKind::Topic, "#", "log"));
        assert!(matches(ExchangeKind::Topic, "#", "log.error.db"));
    }

    #[test]
    fn empty_key_matches_only_all_hash_patterns() {
        assert!(matches(ExchangeKind::Topic, "#.#", ""));
        assert!(!matches(ExchangeKind::Topic, "log", ""));
        assert!(!matches(ExchangeKind::Topic, "*", ""));
        assert!(!matches(ExchangeKind::Topic, "log.#", ""));
    }

    #[test]
    fn multiple_hash_tokens_collapse_to_single_hash_semantics() {
        assert!(matches(ExchangeKind::Topic, "#.#", "log.error"));
        assert!(matches(ExchangeKind::Topic, "log.#.#", "log"));
        assert!(matches(ExchangeKind::Topic, "#.error.#", "error"));
        assert!(matches(ExchangeKind::Topic, "#.error.#", "log.error.db"));
        assert!(!matches(ExchangeKind::Topic, "#.error.#", "log.info.db"));
    }

    #[test]
    fn hash_in_the_middle_spans_any_count() {
        assert!(matches(ExchangeKind::Topic, "log.#.db", "log.db"));
        assert!(matches(ExchangeKind::Topic, "log.#.db", "log.error.io.db"));
        assert!(!matches(ExchangeKind::Topic, "log.#.db", "log.error"));
    }

    #[test]
    fn star_and_hash_combined() {
        assert!(matches(ExchangeKind::Topic, "*.#", "log"));
        assert!(matches(ExchangeKind::Topic, "*.#", "log.error.db"));
        assert!(!matches(ExchangeKind::Topic, "*.#", ""));
        assert!(matches(ExchangeKind::Topic, "#.*", "log"));
        assert!(!matches(ExchangeKind::Topic, "#.*", ""));
    }

    #[test]
    fn validation_rejects_malformed_topic_patterns() {
        assert!(validate_pattern(ExchangeKind::Topic, "log.#").is_ok());
        assert!(validate_pattern(ExchangeKind::Topic, "#").is_ok());
        assert!(validate_pattern(ExchangeKind::Topic, "#.#").is_ok());
        assert!(validate_pattern(ExchangeKind::Topic, "").is_err());
        assert!(validate_pattern(ExchangeKind::Topic, "log..db").is_err());
        assert!(validate_pattern(ExchangeKind::Topic, ".log").is_err());
        assert!(validate_pattern(ExchangeKind::Topic, "log.er#or").is_err());
        assert!(validate_pattern(ExchangeKind::Topic, "log.a*").is_err());
    }

    #[test]
    fn validation_is_lax_for_direct_and_fanout() {
        assert!(validate_pattern(ExchangeKind::Direct, "anything..goes").is_ok());
        assert!(validate_pattern(ExchangeKind::Fanout, "").is_ok());
    }
}
