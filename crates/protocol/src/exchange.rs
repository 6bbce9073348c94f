//! Per-call state machine shared by every adapter.
//!
//! ```text
//! Idle -> Opening -> Sending -> Awaiting -> Delivered
//!    \_________\__________\_________\____-> Failed
//! ```
//!
//! `Delivered` and `Failed` are terminal. The outcome is recorded at the
//! moment of the terminal transition and can be taken exactly once, which is
//! what lets adapters promise a single outcome per descriptor.

use serde::{Deserialize, Serialize};

use crate::errors::ProtocolError;
use crate::outcome::{ErrorKind, TransportOutcome};

/// Phase of an [`Exchange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangePhase {
    /// Nothing has happened yet.
    Idle,
    /// The native connection is being opened.
    Opening,
    /// The connection is open and the payload is being written.
    Sending,
    /// The payload is written; waiting for the response.
    Awaiting,
    /// A success outcome was recorded.
    Delivered,
    /// A failure outcome was recorded.
    Failed,
}

impl ExchangePhase {
    /// `true` for `Delivered` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Failed)
    }
}

/// Drives one call from `Idle` to exactly one terminal outcome.
#[derive(Debug)]
pub struct Exchange {
    phase: ExchangePhase,
    outcome: Option<TransportOutcome>,
    taken: bool,
}

impl Default for Exchange {
    fn default() -> Self {
        Self::new()
    }
}

impl Exchange {
    /// A fresh exchange in `Idle`.
    pub fn new() -> Self {
        Self {
            phase: ExchangePhase::Idle,
            outcome: None,
            taken: false,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> ExchangePhase {
        self.phase
    }

    /// `Idle -> Opening`.
    pub fn begin(&mut self) -> Result<(), ProtocolError> {
        self.advance(ExchangePhase::Idle, ExchangePhase::Opening, "begin")
    }

    /// `Opening -> Sending`.
    pub fn opened(&mut self) -> Result<(), ProtocolError> {
        self.advance(ExchangePhase::Opening, ExchangePhase::Sending, "opened")
    }

    /// `Sending -> Awaiting`.
    pub fn sent(&mut self) -> Result<(), ProtocolError> {
        self.advance(ExchangePhase::Sending, ExchangePhase::Awaiting, "sent")
    }

    /// `Awaiting -> Delivered`, recording the response body.
    pub fn deliver(&mut self, body: impl Into<String>) -> Result<(), ProtocolError> {
        self.advance(ExchangePhase::Awaiting, ExchangePhase::Delivered, "deliver")?;
        self.outcome = Some(TransportOutcome::success(body));
        Ok(())
    }

    /// Any non-terminal phase `-> Failed`, recording the failure.
    pub fn fail(&mut self, kind: ErrorKind, detail: impl Into<String>) -> Result<(), ProtocolError> {
        self.fail_outcome(TransportOutcome::failure(kind, detail))
    }

    /// Records an already-built outcome: a success through
    /// [`Exchange::deliver`], a failure through [`Exchange::fail`].
    pub fn record(&mut self, outcome: TransportOutcome) -> Result<(), ProtocolError> {
        match outcome {
            TransportOutcome::Success { body } => self.deliver(body),
            failure => self.fail_outcome(failure),
        }
    }

    fn fail_outcome(&mut self, outcome: TransportOutcome) -> Result<(), ProtocolError> {
        if self.phase.is_terminal() {
            return Err(ProtocolError::InvalidTransition {
                from: self.phase,
                action: "fail",
            });
        }
        tracing::trace!(from = ?self.phase, "exchange failed");
        self.phase = ExchangePhase::Failed;
        self.outcome = Some(outcome);
        Ok(())
    }

    /// Takes the recorded outcome.
    ///
    /// Returns `None` if the exchange has not reached a terminal phase or the
    /// outcome was already taken.
    pub fn take_outcome(&mut self) -> Option<TransportOutcome> {
        if self.taken {
            return None;
        }
        let outcome = self.outcome.take();
        self.taken = outcome.is_some();
        outcome
    }

    /// Consumes the exchange and returns its outcome, failing it first if the
    /// native transport stopped producing events before a terminal phase.
    pub fn finish(mut self) -> TransportOutcome {
        if !self.phase.is_terminal() {
            let detail = format!("transport ended while {:?}", self.phase);
            // Not terminal, so this transition cannot be rejected.
            let _ = self.fail(ErrorKind::TransportError, detail);
        }
        match self.take_outcome() {
            Some(outcome) => outcome,
            None => TransportOutcome::failure(
                ErrorKind::TransportError,
                "exchange outcome already taken",
            ),
        }
    }

    fn advance(
        &mut self,
        expected: ExchangePhase,
        next: ExchangePhase,
        action: &'static str,
    ) -> Result<(), ProtocolError> {
        if self.phase != expected {
            return Err(ProtocolError::InvalidTransition {
                from: self.phase,
                action,
            });
        }
        tracing::trace!(from = ?self.phase, to = ?next, "exchange transition");
        self.phase = next;
        Ok(())
    }
}
