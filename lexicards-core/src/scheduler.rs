use crate::{Card, CoreError, Rating, Review, SchedulingState, EASE_MIN};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Knobs of the SM-2 style policy. The ease floor is not one of them.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerParams {
    pub lapse_ease_penalty: f64,
    pub hard_ease_penalty: f64,
    pub easy_ease_bonus: f64,
    pub lapse_interval_days: u32,
    pub first_interval_days: u32,
    pub second_interval_days: u32,
    /// Used in place of the ease when a mature card is rated `hard`.
    pub hard_interval_multiplier: f64,
    /// Applied on top of the ease when a mature card is rated `easy`.
    pub easy_interval_bonus: f64,
    pub max_interval_days: u32,
}

impl Default for SchedulerParams {
    fn default() -> Self {
        Self {
            lapse_ease_penalty: 0.2,
            hard_ease_penalty: 0.15,
            easy_ease_bonus: 0.15,
            lapse_interval_days: 1,
            first_interval_days: 1,
            second_interval_days: 6,
            hard_interval_multiplier: 1.2,
            easy_interval_bonus: 1.3,
            max_interval_days: 36_500,
        }
    }
}

impl SchedulerParams {
    pub fn validate(&self) -> Result<(), CoreError> {
        let deltas = [
            self.lapse_ease_penalty,
            self.hard_ease_penalty,
            self.easy_ease_bonus,
        ];
        if deltas.iter().any(|d| !d.is_finite() || *d < 0.0) {
            return Err(CoreError::Invalid("ease adjustments must be finite and >= 0"));
        }
        let multipliers = [self.hard_interval_multiplier, self.easy_interval_bonus];
        if multipliers.iter().any(|m| !m.is_finite() || *m < 1.0) {
            return Err(CoreError::Invalid("interval multipliers must be finite and >= 1"));
        }
        if self.lapse_interval_days == 0
            || self.first_interval_days == 0
            || self.second_interval_days < self.first_interval_days
        {
            return Err(CoreError::Invalid("learning intervals must be positive and increasing"));
        }
        if self.max_interval_days < self.second_interval_days {
            return Err(CoreError::Invalid("max interval shorter than learning steps"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct ReviewOutcome {
    pub updated_card: Card,
    pub review: Review,
}

/// Pure review scheduler. Holds only its parameters, so one instance can be
/// shared freely across threads.
#[derive(Clone, Debug, Default)]
pub struct Scheduler {
    params: SchedulerParams,
}

impl Scheduler {
    pub fn new(params: SchedulerParams) -> Result<Self, CoreError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &SchedulerParams {
        &self.params
    }

    /// Computes the state that follows `current` after a review rated
    /// `rating` at `now`. `now` only stamps the review; intervals are relative.
    pub fn transition(
        &self,
        current: &SchedulingState,
        rating: Rating,
        now: DateTime<Utc>,
    ) -> Result<SchedulingState, CoreError> {
        current.validate()?;
        let p = &self.params;

        let (repetitions, ease, interval_days) = if rating.is_lapse() {
            (
                0,
                floor_ease(current.ease - p.lapse_ease_penalty),
                p.lapse_interval_days,
            )
        } else {
            let reps = current.repetitions.saturating_add(1);
            let ease = match rating {
                Rating::Hard => floor_ease(current.ease - p.hard_ease_penalty),
                Rating::Easy => floor_ease(current.ease + p.easy_ease_bonus),
                _ => current.ease,
            };
            let interval = match reps {
                1 => p.first_interval_days,
                2 => p.second_interval_days,
                _ => self.grow_interval(current.interval_days, ease, rating),
            };
            (reps, ease, interval)
        };

        Ok(SchedulingState {
            repetitions,
            ease,
            interval_days,
            next_review: now + Duration::days(i64::from(interval_days)),
            last_reviewed: Some(now),
        })
    }

    /// Rates a card and produces both the rescheduled card and its log entry.
    /// The card's `version` is left alone; the repository bumps it on write.
    pub fn apply_rating(
        &self,
        card: &Card,
        rating: Rating,
        now: DateTime<Utc>,
    ) -> Result<ReviewOutcome, CoreError> {
        let schedule = self.transition(&card.schedule, rating, now)?;
        let review = Review::new(card.id, rating, now, schedule.interval_days, schedule.ease);
        let mut updated_card = card.clone();
        updated_card.schedule = schedule;
        Ok(ReviewOutcome {
            updated_card,
            review,
        })
    }

    /// Interval each rating would produce, in `Rating::ALL` order.
    pub fn preview(
        &self,
        current: &SchedulingState,
        now: DateTime<Utc>,
    ) -> Result<[u32; 4], CoreError> {
        let mut out = [0u32; 4];
        for (slot, rating) in out.iter_mut().zip(Rating::ALL) {
            *slot = self.transition(current, rating, now)?.interval_days;
        }
        Ok(out)
    }

    fn grow_interval(&self, prev: u32, ease: f64, rating: Rating) -> u32 {
        let p = &self.params;
        let prev = prev.max(1);
        let (factor, at_least) = match rating {
            Rating::Hard => (p.hard_interval_multiplier, prev),
            Rating::Easy => (ease * p.easy_interval_bonus, prev.saturating_add(1)),
            _ => (ease, prev.saturating_add(1)),
        };
        let grown = (f64::from(prev) * factor)
            .round()
            .min(f64::from(p.max_interval_days)) as u32;
        grown.max(at_least).min(p.max_interval_days)
    }
}

/// Transition under the default parameters.
pub fn transition(
    current: &SchedulingState,
    rating: Rating,
    now: DateTime<Utc>,
) -> Result<SchedulingState, CoreError> {
    Scheduler::default().transition(current, rating, now)
}

// Two decimals keeps repeated adjustments free of float drift.
fn floor_ease(x: f64) -> f64 {
    ((x * 100.0).round() / 100.0).max(EASE_MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CardContent;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn state(repetitions: u32, ease: f64, interval_days: u32) -> SchedulingState {
        SchedulingState {
            repetitions,
            ease,
            interval_days,
            next_review: t0(),
            last_reviewed: None,
        }
    }

    #[test]
    fn first_good_review_schedules_one_day() {
        let out = transition(&state(0, 2.5, 0), Rating::Good, t0()).unwrap();
        assert_eq!(out.repetitions, 1);
        assert_eq!(out.ease, 2.5);
        assert_eq!(out.interval_days, 1);
        assert_eq!(out.next_review, t0() + Duration::days(1));
        assert_eq!(out.last_reviewed, Some(t0()));
    }

    #[test]
    fn second_good_review_schedules_six_days() {
        let mut st = state(1, 2.5, 1);
        st.last_reviewed = Some(t0());
        st.next_review = t0() + Duration::days(1);
        let out = transition(&st, Rating::Good, t0() + Duration::days(1)).unwrap();
        assert_eq!(out.repetitions, 2);
        assert_eq!(out.interval_days, 6);
        assert_eq!(out.next_review, t0() + Duration::days(7));
    }

    #[test]
    fn lapse_resets_and_lowers_ease() {
        let now = t0() + Duration::days(7);
        let out = transition(&state(2, 2.5, 6), Rating::Again, now).unwrap();
        assert_eq!(out.repetitions, 0);
        assert_eq!(out.ease, 2.3);
        assert_eq!(out.interval_days, 1);
        assert_eq!(out.next_review, t0() + Duration::days(8));
    }

    #[test]
    fn third_review_scales_by_rating() {
        let st = state(2, 2.5, 6);
        let good = transition(&st, Rating::Good, t0()).unwrap();
        assert_eq!(good.interval_days, 15);
        assert_eq!(good.ease, 2.5);

        let hard = transition(&st, Rating::Hard, t0()).unwrap();
        assert_eq!(hard.ease, 2.35);
        assert_eq!(hard.interval_days, 7);

        let easy = transition(&st, Rating::Easy, t0()).unwrap();
        assert_eq!(easy.ease, 2.65);
        // 6 * 2.65 * 1.3 = 20.67
        assert_eq!(easy.interval_days, 21);
    }

    #[test]
    fn hard_on_new_card_still_adjusts_ease() {
        let out = transition(&state(0, 2.5, 0), Rating::Hard, t0()).unwrap();
        assert_eq!(out.repetitions, 1);
        assert_eq!(out.interval_days, 1);
        assert_eq!(out.ease, 2.35);
    }

    #[test]
    fn ease_never_drops_below_floor() {
        let out = transition(&state(5, 1.35, 30), Rating::Again, t0()).unwrap();
        assert_eq!(out.ease, EASE_MIN);
        let out = transition(&state(5, EASE_MIN, 30), Rating::Hard, t0()).unwrap();
        assert_eq!(out.ease, EASE_MIN);
        assert!(out.interval_days >= 30);
    }

    #[test]
    fn invalid_state_is_refused() {
        let err = transition(&state(3, 1.0, 10), Rating::Good, t0()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
    }

    #[test]
    fn same_inputs_same_output() {
        let st = state(4, 2.2, 17);
        let a = transition(&st, Rating::Easy, t0()).unwrap();
        let b = transition(&st, Rating::Easy, t0()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.ease.to_bits(), b.ease.to_bits());
    }

    #[test]
    fn interval_is_capped() {
        let params = SchedulerParams {
            max_interval_days: 100,
            ..SchedulerParams::default()
        };
        let s = Scheduler::new(params).unwrap();
        let out = s.transition(&state(8, 2.5, 90), Rating::Easy, t0()).unwrap();
        assert_eq!(out.interval_days, 100);
    }

    #[test]
    fn bad_params_are_rejected() {
        let params = SchedulerParams {
            hard_interval_multiplier: 0.5,
            ..SchedulerParams::default()
        };
        assert!(Scheduler::new(params).is_err());
        let params = SchedulerParams {
            first_interval_days: 0,
            ..SchedulerParams::default()
        };
        assert!(Scheduler::new(params).is_err());
    }

    #[test]
    fn preview_lists_interval_per_rating() {
        let s = Scheduler::default();
        assert_eq!(s.preview(&state(2, 2.5, 6), t0()).unwrap(), [1, 7, 15, 21]);
        assert_eq!(s.preview(&state(0, 2.5, 0), t0()).unwrap(), [1, 1, 1, 1]);
    }

    #[test]
    fn apply_rating_logs_review() {
        let card = Card::new(Uuid::new_v4(), CardContent::new("laconic", "terse"));
        let out = Scheduler::default()
            .apply_rating(&card, Rating::Easy, t0())
            .unwrap();
        assert_eq!(out.updated_card.id, card.id);
        assert_eq!(out.updated_card.version, card.version);
        assert_eq!(out.updated_card.content, card.content);
        assert_eq!(out.review.card_id, card.id);
        assert_eq!(out.review.rating, Rating::Easy);
        assert_eq!(out.review.interval_days, 1);
        assert_eq!(out.review.ease_after, 2.65);
    }
}
