use crate::{
    due_cards, next_to_review, Card, CardId, CoreError, FolderId, Rating, Repository,
    ReviewOutcome, Scheduler, Selection,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Glue between the pure scheduler and a repository.
///
/// A review is read-modify-write on one card. The write is conditional on
/// the version that was read, so two concurrent reviews of the same card
/// cannot both build on the same stale state; the loser re-reads and
/// reapplies its rating on top of the winner's result.
pub struct ReviewService {
    repo: Arc<dyn Repository>,
    scheduler: Scheduler,
    max_attempts: u32,
}

impl ReviewService {
    pub fn new(repo: Arc<dyn Repository>, scheduler: Scheduler) -> Self {
        Self {
            repo,
            scheduler,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn repo(&self) -> &Arc<dyn Repository> {
        &self.repo
    }

    /// Reads the card, rates it and writes the result back, re-reading on
    /// conflicting writes up to `max_attempts` times.
    pub async fn review(
        &self,
        card_id: CardId,
        rating: Rating,
        now: DateTime<Utc>,
    ) -> Result<ReviewOutcome, CoreError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let card = self.repo.get_card(card_id).await?;
            let outcome = self.scheduler.apply_rating(&card, rating, now)?;
            match self.try_commit(card.version, outcome).await {
                Ok(stored) => return Ok(stored),
                Err(CoreError::Conflict(_)) if attempt < self.max_attempts => {
                    warn!(%card_id, attempt, "card changed during review, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Persists an outcome computed elsewhere (e.g. by a `ReviewSession`)
    /// from a card read at `expected_version`. If the card moved on in the
    /// meantime the rating is reapplied to the current state instead.
    pub async fn commit(
        &self,
        expected_version: u64,
        outcome: ReviewOutcome,
    ) -> Result<ReviewOutcome, CoreError> {
        let (card_id, rating, now) = (
            outcome.review.card_id,
            outcome.review.rating,
            outcome.review.reviewed_at,
        );
        match self.try_commit(expected_version, outcome).await {
            Err(CoreError::Conflict(_)) => {
                warn!(%card_id, "presented card is stale, rescheduling from stored state");
                self.review(card_id, rating, now).await
            }
            other => other,
        }
    }

    async fn try_commit(
        &self,
        expected_version: u64,
        outcome: ReviewOutcome,
    ) -> Result<ReviewOutcome, CoreError> {
        let stored = self
            .repo
            .update_schedule(
                outcome.updated_card.id,
                expected_version,
                &outcome.updated_card.schedule,
            )
            .await?;
        // schedule is already committed, so this is not an error for the caller
        if let Err(e) = self.repo.insert_review(&outcome.review).await {
            warn!(card_id = %stored.id, error = %e, "schedule saved but review log entry was not");
        }
        debug!(
            card_id = %stored.id,
            rating = %outcome.review.rating,
            interval_days = stored.schedule.interval_days,
            ease = stored.schedule.ease,
            "review recorded"
        );
        Ok(ReviewOutcome {
            updated_card: stored,
            review: outcome.review,
        })
    }

    pub async fn due(
        &self,
        folder_id: Option<FolderId>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Card>, CoreError> {
        let cards = self.repo.list_cards(folder_id).await?;
        Ok(due_cards(&cards, now))
    }

    pub async fn next(
        &self,
        folder_id: Option<FolderId>,
        now: DateTime<Utc>,
    ) -> Result<Selection, CoreError> {
        let cards = self.repo.list_cards(folder_id).await?;
        Ok(next_to_review(&cards, now))
    }
}
