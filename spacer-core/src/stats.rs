use crate::limits::{LimitKind, LimitResolver, REPORT_LIMIT};
use crate::scheduler::SchedulerSession;
use crate::{CoreError, Deck, DeckId, Ease, ReviewLogEntry};
use chrono::{DateTime, Duration, NaiveDate};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::warn;

/// What a deck has left to study today.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeckStudyStats {
    pub new: u32,
    pub learning: u32,
    pub review: u32,
}

impl SchedulerSession {
    /// Per-deck counts of new, learning and due review cards. Orphaned cards
    /// and a damaged deck hierarchy are repaired first.
    pub async fn deck_study_stats(&mut self) -> Result<HashMap<DeckId, DeckStudyStats>, CoreError> {
        self.check_day().await?;
        let store = self.store().clone();
        let now = self.now();
        let today = self.today();

        let decks = store.all_decks().await?;
        let valid: HashSet<DeckId> = decks.keys().copied().collect();
        let usn = self.usn().await?;
        let moved = store.reassign_orphans(&valid, now, usn).await?;
        if moved > 0 {
            warn!(moved, "moved orphaned cards to the default deck");
        }
        store.touch(now).await?;
        store.repair_hierarchy(now, usn).await?;

        let decks = store.all_decks().await?;
        let configs = store.all_configs().await?;
        let resolver = LimitResolver::new(&decks, &configs, today);
        let mut ordered: Vec<&Deck> = decks.values().collect();
        ordered.sort_by(|a, b| a.name.cmp(&b.name));

        let learn_due = now + i64::from(self.config().collapse_time);
        let mut limits: HashMap<&str, (u32, u32)> = HashMap::new();
        let mut stats = HashMap::with_capacity(ordered.len());
        for deck in ordered {
            let mut new_limit = resolver.own_limit(deck, LimitKind::New)?;
            let mut rev_limit = resolver.own_limit(deck, LimitKind::Review)?;
            if let Some((parent_new, parent_rev)) = deck.parent_name().and_then(|p| limits.get(p)) {
                new_limit = new_limit.min(*parent_new);
                rev_limit = rev_limit.min(*parent_rev);
            }
            limits.insert(deck.name.as_str(), (new_limit, rev_limit));

            let new = store.count_new(deck.id, new_limit).await?;
            let learning = store.count_learned(deck.id, learn_due, today, REPORT_LIMIT).await?;
            let mut dids = store.child_ids(deck.id).await?;
            dids.push(deck.id);
            let review = store.count_review(&dids, REPORT_LIMIT, rev_limit, today).await?;
            stats.insert(deck.id, DeckStudyStats { new, learning, review });
        }
        Ok(stats)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Totals {
    pub total: u32,
    pub wrong: u32,
    pub hard: u32,
    pub good: u32,
    pub easy: u32,
}

impl Totals {
    pub fn record(&mut self, ease: Ease) {
        self.total += 1;
        match ease {
            Ease::Wrong => self.wrong += 1,
            Ease::Hard => self.hard += 1,
            Ease::Good => self.good += 1,
            Ease::Easy => self.easy += 1,
        }
    }

    /// Share of answers that were not failures.
    pub fn retention(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            (self.total - self.wrong) as f32 / self.total as f32
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct StatsSummary {
    pub totals: Totals,
    pub per_day: BTreeMap<NaiveDate, Totals>,
}

fn review_date(entry: &ReviewLogEntry) -> NaiveDate {
    DateTime::from_timestamp_millis(entry.id)
        .unwrap_or_default()
        .date_naive()
}

pub fn summarize_reviews(reviews: &[ReviewLogEntry]) -> StatsSummary {
    let mut summary = StatsSummary::default();
    for r in reviews {
        summary.totals.record(r.ease);
        summary.per_day.entry(review_date(r)).or_default().record(r.ease);
    }
    summary
}

/// Consecutive days with at least one review, counting back from `today`.
pub fn daily_streak(reviews: &[ReviewLogEntry], today: NaiveDate) -> u32 {
    let per_day = summarize_reviews(reviews).per_day;
    let mut streak = 0u32;
    let mut day = today;
    while per_day.get(&day).is_some_and(|t| t.total > 0) {
        streak += 1;
        day -= Duration::days(1);
    }
    streak
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CardId, Interval, RevlogKind};
    use chrono::TimeZone;

    fn entry(card_id: CardId, ease: Ease, day: u32) -> ReviewLogEntry {
        let at = chrono::Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap();
        ReviewLogEntry {
            id: at.timestamp_millis(),
            card_id,
            usn: 0,
            ease,
            interval: Interval::Days(1),
            last_interval: Interval::Days(0),
            factor: 2500,
            taken_ms: 4000,
            kind: RevlogKind::Review,
        }
    }

    #[test]
    fn totals_and_retention() {
        let reviews = vec![
            entry(1, Ease::Good, 1),
            entry(2, Ease::Wrong, 1),
            entry(1, Ease::Easy, 2),
            entry(3, Ease::Hard, 2),
        ];
        let summary = summarize_reviews(&reviews);
        assert_eq!(summary.totals.total, 4);
        assert_eq!(summary.totals.wrong, 1);
        assert!((summary.totals.retention() - 0.75).abs() < f32::EPSILON);
        assert_eq!(summary.per_day.len(), 2);
    }

    #[test]
    fn streak_stops_at_gap() {
        let reviews = vec![entry(1, Ease::Good, 3), entry(1, Ease::Good, 4), entry(1, Ease::Good, 1)];
        let today = NaiveDate::from_ymd_opt(2024, 5, 4).unwrap();
        assert_eq!(daily_streak(&reviews, today), 2);
    }
}
