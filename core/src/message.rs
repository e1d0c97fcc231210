//! Messages and delivery results.
//!
//! A [`Message`] is created by the router on every `send`/`broadcast` call and
//! carries coordination metadata alongside the opaque payload: sender identity,
//! recipients, send timestamp, hops consumed so far, and a hop budget that
//! bounds multi-hop forwarding. The terminal state of a delivery is reported
//! back to callers as a [`DeliveryResult`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_MESSAGE_ID: AtomicU64 = AtomicU64::new(1);

fn next_message_id() -> u64 {
    NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Addressing for a message: a single agent or every live agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipients {
    One(String),
    All,
}

/// A routed message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub from: String,
    pub recipients: Recipients,
    pub payload: Vec<u8>,
    /// Milliseconds since epoch at creation time.
    pub sent_at_ms: i64,
    /// Relay steps consumed so far.
    pub hops: u32,
    /// Remaining forwarding allowance; routes longer than this fail.
    pub hop_budget: u32,
    /// Pending until the router records the terminal state; enqueued
    /// copies carry `Delivered`.
    pub outcome: DeliveryOutcome,
}

impl Message {
    pub fn unicast(from: &str, to: &str, payload: Vec<u8>, hop_budget: u32) -> Self {
        Self {
            id: next_message_id(),
            from: from.to_string(),
            recipients: Recipients::One(to.to_string()),
            payload,
            sent_at_ms: chrono::Utc::now().timestamp_millis(),
            hops: 0,
            hop_budget,
            outcome: DeliveryOutcome::Pending,
        }
    }

    pub fn broadcast(from: &str, payload: Vec<u8>, hop_budget: u32) -> Self {
        Self {
            id: next_message_id(),
            from: from.to_string(),
            recipients: Recipients::All,
            payload,
            sent_at_ms: chrono::Utc::now().timestamp_millis(),
            hops: 0,
            hop_budget,
            outcome: DeliveryOutcome::Pending,
        }
    }
}

/// Why a delivery failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Endpoint or intermediate hop not in the live registry.
    UnknownAgent,
    /// Star topology with no reachable hub.
    HubUnreachable,
    /// A ring neighbor link references a missing agent.
    RingBroken,
    /// The route required more hops than the message allows.
    HopBudgetExhausted,
    /// The target's mailbox receiver was dropped.
    MailboxClosed,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::UnknownAgent => "unknown agent",
            FailureReason::HubUnreachable => "hub unreachable",
            FailureReason::RingBroken => "ring broken",
            FailureReason::HopBudgetExhausted => "hop budget exhausted",
            FailureReason::MailboxClosed => "mailbox closed",
        };
        f.write_str(s)
    }
}

/// Terminal state of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Pending,
    Delivered,
    Failed(FailureReason),
}

/// Per-target outcome returned by `send` and `broadcast`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub target: String,
    pub outcome: DeliveryOutcome,
    pub hops: u32,
}

impl DeliveryResult {
    pub fn delivered(target: &str, hops: u32) -> Self {
        Self {
            target: target.to_string(),
            outcome: DeliveryOutcome::Delivered,
            hops,
        }
    }

    pub fn failed(target: &str, reason: FailureReason, hops: u32) -> Self {
        Self {
            target: target.to_string(),
            outcome: DeliveryOutcome::Failed(reason),
            hops,
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.outcome == DeliveryOutcome::Delivered
    }
}
