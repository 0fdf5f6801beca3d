// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::collections::VecDeque;

use serde::Deserialize;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::speech::{SpeechError, UtteranceOutcome};

/// The result delivered to whoever is waiting on a ticket.
pub type TicketResult = Result<UtteranceOutcome, SpeechError>;

/// How completion signals are matched to outstanding tickets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketPolicy {
    /// Every signal resolves the oldest outstanding ticket, whichever utterance it names.
    #[default]
    Fifo,
    /// A signal resolves the ticket registered for the utterance it names.
    Correlated,
}

struct PendingTicket {
    utterance_id: u64,
    reply: oneshot::Sender<TicketResult>,
}

/// Outstanding tickets in registration order.
pub struct TicketBook {
    policy: TicketPolicy,
    pending: VecDeque<PendingTicket>,
}

impl TicketBook {
    pub fn new(policy: TicketPolicy) -> TicketBook {
        TicketBook {
            policy,
            pending: VecDeque::new(),
        }
    }

    /// Registers a ticket. Must happen before synthesis of the utterance is requested.
    pub fn register(&mut self, utterance_id: u64, reply: oneshot::Sender<TicketResult>) {
        self.pending.push_back(PendingTicket {
            utterance_id,
            reply,
        });
    }

    /// Resolves one ticket in response to a signal about `utterance_id`. Returns the id of the
    /// ticket that was actually resolved, if any.
    pub fn resolve(&mut self, utterance_id: u64, result: TicketResult) -> Option<u64> {
        let ticket = match self.policy {
            TicketPolicy::Fifo => self.pending.pop_front(),
            TicketPolicy::Correlated => self
                .pending
                .iter()
                .position(|ticket| ticket.utterance_id == utterance_id)
                .and_then(|index| self.pending.remove(index)),
        };

        let Some(ticket) = ticket else {
            warn!(utterance_id, "Completion signal with no outstanding ticket.");
            return None;
        };

        if ticket.utterance_id != utterance_id {
            debug!(
                signalled = utterance_id,
                resolved = ticket.utterance_id,
                "Resolving oldest ticket for a different utterance."
            );
        }

        // The caller may have stopped waiting, which is fine.
        let _ = ticket.reply.send(result);
        Some(ticket.utterance_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(book: &mut TicketBook, id: u64) -> oneshot::Receiver<TicketResult> {
        let (tx, rx) = oneshot::channel();
        book.register(id, tx);
        rx
    }

    #[test]
    fn test_fifo_resolves_oldest() {
        let mut book = TicketBook::new(TicketPolicy::Fifo);
        let mut first = register(&mut book, 1);
        let mut second = register(&mut book, 2);

        // A signal for utterance 2 still resolves ticket 1.
        assert_eq!(book.resolve(2, Ok(UtteranceOutcome::Finished)), Some(1));
        assert!(matches!(first.try_recv(), Ok(Ok(UtteranceOutcome::Finished))));
        assert!(second.try_recv().is_err());
        assert_eq!(book.len(), 1);

        assert_eq!(book.resolve(1, Ok(UtteranceOutcome::Cancelled)), Some(2));
        assert!(matches!(
            second.try_recv(),
            Ok(Ok(UtteranceOutcome::Cancelled))
        ));
        assert!(book.is_empty());
    }

    #[test]
    fn test_correlated_resolves_matching() {
        let mut book = TicketBook::new(TicketPolicy::Correlated);
        let mut first = register(&mut book, 1);
        let mut second = register(&mut book, 2);

        assert_eq!(book.resolve(2, Ok(UtteranceOutcome::Finished)), Some(2));
        assert!(first.try_recv().is_err());
        assert!(matches!(
            second.try_recv(),
            Ok(Ok(UtteranceOutcome::Finished))
        ));

        // Unknown ids resolve nothing.
        assert_eq!(book.resolve(9, Ok(UtteranceOutcome::Finished)), None);
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_resolve_empty() {
        let mut book = TicketBook::new(TicketPolicy::Fifo);
        assert_eq!(book.resolve(1, Ok(UtteranceOutcome::Finished)), None);
    }

    #[test]
    fn test_dropped_receiver() {
        let mut book = TicketBook::new(TicketPolicy::Fifo);
        drop(register(&mut book, 1));
        assert_eq!(
            book.resolve(1, Err(SpeechError::Utterance("boom".into()))),
            Some(1)
        );
    }

    #[test]
    fn test_policy_deserialize() {
        let policy: TicketPolicy = serde_json::from_str(r#""correlated""#).unwrap();
        assert_eq!(policy, TicketPolicy::Correlated);
        assert_eq!(TicketPolicy::default(), TicketPolicy::Fifo);
    }
}
