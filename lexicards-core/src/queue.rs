//! Due-card selection and the one-card-at-a-time review session.
//!
//! Everything here works on a caller-supplied snapshot of cards and never
//! touches storage. Selecting a card does not change it; only a submitted
//! rating does, and even then the caller persists the result.

use crate::{Card, CoreError, Rating, ReviewOutcome, Scheduler};
use chrono::{DateTime, Utc};

/// Result of asking for the next card.
#[derive(Clone, Debug, PartialEq)]
pub enum Selection {
    Due(Card),
    /// Nothing is due. A normal outcome, not a failure.
    EmptyDueQueue,
}

impl Selection {
    pub fn card(&self) -> Option<&Card> {
        match self {
            Selection::Due(card) => Some(card),
            Selection::EmptyDueQueue => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Selection::EmptyDueQueue)
    }
}

/// Cards with `next_review <= now`, most overdue first. Ties keep input order.
pub fn due_cards(cards: &[Card], now: DateTime<Utc>) -> Vec<Card> {
    let mut due: Vec<Card> = cards.iter().filter(|c| c.is_due(now)).cloned().collect();
    // sort_by_key is stable
    due.sort_by_key(|c| c.schedule.next_review);
    due
}

pub fn due_count(cards: &[Card], now: DateTime<Utc>) -> usize {
    cards.iter().filter(|c| c.is_due(now)).count()
}

pub fn next_to_review(cards: &[Card], now: DateTime<Utc>) -> Selection {
    let head = cards
        .iter()
        .filter(|c| c.is_due(now))
        .reduce(|best, c| {
            if c.schedule.next_review < best.schedule.next_review {
                c
            } else {
                best
            }
        });
    match head {
        Some(card) => Selection::Due(card.clone()),
        None => Selection::EmptyDueQueue,
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SessionState {
    Idle,
    Presenting(Card),
}

/// Review session with at most one card in flight.
///
/// `Idle -> Presenting(card) -> Idle`. After a rating the session goes back
/// to `Idle`; the caller asks for the following card explicitly.
#[derive(Debug)]
pub struct ReviewSession {
    scheduler: Scheduler,
    state: SessionState,
}

impl ReviewSession {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn current(&self) -> Option<&Card> {
        match &self.state {
            SessionState::Presenting(card) => Some(card),
            SessionState::Idle => None,
        }
    }

    /// Picks the next due card from `cards` and presents it. With nothing
    /// due the session stays idle and `EmptyDueQueue` comes back.
    pub fn present_next(
        &mut self,
        cards: &[Card],
        now: DateTime<Utc>,
    ) -> Result<Selection, CoreError> {
        if let SessionState::Presenting(_) = self.state {
            return Err(CoreError::Conflict("a card is already being reviewed"));
        }
        let selection = next_to_review(cards, now);
        if let Selection::Due(card) = &selection {
            self.state = SessionState::Presenting(card.clone());
        }
        Ok(selection)
    }

    /// Rates the presented card. On success the session is idle again and
    /// the outcome must be persisted by the caller. On failure the card
    /// stays presented.
    pub fn submit(&mut self, rating: Rating, now: DateTime<Utc>) -> Result<ReviewOutcome, CoreError> {
        let SessionState::Presenting(card) = &self.state else {
            return Err(CoreError::Invalid("no card is being reviewed"));
        };
        let outcome = self.scheduler.apply_rating(card, rating, now)?;
        self.state = SessionState::Idle;
        Ok(outcome)
    }

    /// Drops the presented card without touching its state.
    pub fn abandon(&mut self) -> Option<Card> {
        match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Presenting(card) => Some(card),
            SessionState::Idle => None,
        }
    }
}
