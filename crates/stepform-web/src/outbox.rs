//! Notification outbox.
//!
//! Side effects run after a step committed, as a separate phase. Each
//! message carries an idempotency key; the outbox delivers a key at most once
//! and keeps failed messages queued for a bounded number of retries.

use crate::error::NotifyError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Idempotency key.
    pub key: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub trait Notifier: Send + Sync {
    fn send(&self, message: &Message) -> Result<(), NotifyError>;
}

/// Writes messages to the log instead of a mail transport.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, message: &Message) -> Result<(), NotifyError> {
        if message.to.trim().is_empty() {
            return Err(NotifyError::NoRecipient(message.key.clone()));
        }
        info!(
            key = %message.key,
            to = %message.to,
            subject = %message.subject,
            "message sent"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Delivery failed and will be retried by [`Outbox::flush`].
    Queued,
    /// A message with the same key was already accepted.
    Duplicate,
    /// Out of retries.
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub sent: usize,
    pub pending: usize,
    pub failed: usize,
}

#[derive(Debug)]
struct Pending {
    message: Message,
    attempts: u32,
}

#[derive(Debug, Default)]
struct OutboxState {
    pending: VecDeque<Pending>,
    in_flight: HashSet<String>,
    delivered: HashSet<String>,
    dead: Vec<Message>,
}

impl OutboxState {
    fn knows(&self, key: &str) -> bool {
        self.delivered.contains(key)
            || self.in_flight.contains(key)
            || self.pending.iter().any(|p| p.message.key == key)
            || self.dead.iter().any(|m| m.key == key)
    }
}

pub struct Outbox {
    notifier: Arc<dyn Notifier>,
    max_attempts: u32,
    state: Mutex<OutboxState>,
}

impl Outbox {
    pub fn new(notifier: Arc<dyn Notifier>, max_attempts: u32) -> Self {
        Self {
            notifier,
            max_attempts: max_attempts.max(1),
            state: Mutex::new(OutboxState::default()),
        }
    }

    /// Accepts `message` and makes the first delivery attempt.
    pub fn enqueue(&self, message: Message) -> Delivery {
        {
            let mut state = self.state.lock();
            if state.knows(&message.key) {
                debug!(key = %message.key, "duplicate message ignored");
                return Delivery::Duplicate;
            }
            state.in_flight.insert(message.key.clone());
        }
        self.attempt(Pending {
            message,
            attempts: 0,
        })
    }

    /// Retries every queued message once.
    pub fn flush(&self) -> FlushReport {
        let queued: Vec<Pending> = {
            let mut state = self.state.lock();
            let queued: Vec<Pending> = state.pending.drain(..).collect();
            for pending in &queued {
                state.in_flight.insert(pending.message.key.clone());
            }
            queued
        };
        let mut report = FlushReport::default();
        for pending in queued {
            match self.attempt(pending) {
                Delivery::Sent => report.sent += 1,
                Delivery::Queued => report.pending += 1,
                Delivery::Failed => report.failed += 1,
                Delivery::Duplicate => {}
            }
        }
        if report != FlushReport::default() {
            info!(
                sent = report.sent,
                pending = report.pending,
                failed = report.failed,
                "outbox flushed"
            );
        }
        report
    }

    fn attempt(&self, mut pending: Pending) -> Delivery {
        pending.attempts += 1;
        let result = self.notifier.send(&pending.message);

        let mut state = self.state.lock();
        state.in_flight.remove(&pending.message.key);
        match result {
            Ok(()) => {
                state.delivered.insert(pending.message.key);
                Delivery::Sent
            }
            Err(err) if pending.attempts >= self.max_attempts => {
                warn!(
                    key = %pending.message.key,
                    attempts = pending.attempts,
                    error = %err,
                    "giving up on message"
                );
                state.dead.push(pending.message);
                Delivery::Failed
            }
            Err(err) => {
                warn!(
                    key = %pending.message.key,
                    attempts = pending.attempts,
                    error = %err,
                    "delivery failed, will retry"
                );
                state.pending.push_back(pending);
                Delivery::Queued
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_delivered(&self, key: &str) -> bool {
        self.state.lock().delivered.contains(key)
    }

    pub fn dead_letters(&self) -> Vec<Message> {
        self.state.lock().dead.clone()
    }
}
