use crate::{Card, CardId, FolderId, Rating, Review, Stage};
use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, HashMap};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Totals {
    pub total: u32,
    pub again: u32,
    pub hard: u32,
    pub good: u32,
    pub easy: u32,
}

impl Totals {
    pub fn record(&mut self, r: Rating) {
        self.total += 1;
        match r {
            Rating::Again => self.again += 1,
            Rating::Hard => self.hard += 1,
            Rating::Good => self.good += 1,
            Rating::Easy => self.easy += 1,
        }
    }

    /// Share of reviews that were not lapses.
    pub fn accuracy(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            (self.total - self.again) as f32 / self.total as f32
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct StatsSummary {
    pub totals: Totals,
    pub per_day: BTreeMap<NaiveDate, Totals>,
}

pub fn summarize(reviews: &[Review]) -> StatsSummary {
    let mut summary = StatsSummary::default();
    for r in reviews {
        summary.totals.record(r.rating);
        let d = r.reviewed_at.date_naive();
        summary.per_day.entry(d).or_default().record(r.rating);
    }
    summary
}

/// Consecutive days, ending at `today`, with at least one review.
pub fn daily_streak(reviews: &[Review], today: NaiveDate) -> u32 {
    let per_day = summarize(reviews).per_day;
    let mut streak = 0u32;
    let mut day = today;
    while per_day.get(&day).map(|t| t.total > 0).unwrap_or(false) {
        streak += 1;
        day -= Duration::days(1);
    }
    streak
}

pub fn per_folder_totals(
    reviews: &[Review],
    card_to_folder: &HashMap<CardId, FolderId>,
) -> HashMap<FolderId, Totals> {
    let mut map: HashMap<FolderId, Totals> = HashMap::new();
    for r in reviews {
        if let Some(folder_id) = card_to_folder.get(&r.card_id) {
            map.entry(*folder_id).or_default().record(r.rating);
        }
    }
    map
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StageCounts {
    pub new: usize,
    pub learning: usize,
    pub young: usize,
    pub mature: usize,
}

pub fn stage_counts(cards: &[Card]) -> StageCounts {
    let mut counts = StageCounts::default();
    for c in cards {
        match c.stage() {
            Stage::New => counts.new += 1,
            Stage::Learning => counts.learning += 1,
            Stage::Young => counts.young += 1,
            Stage::Mature => counts.mature += 1,
        }
    }
    counts
}
