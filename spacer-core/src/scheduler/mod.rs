//! The study session: day tracking, queue selection and answering.

use crate::clock::Clock;
use crate::filters::review_due;
use crate::queues::{build_queues, refill_learning, StudyQueues};
use crate::repo::Storage;
use crate::timing::{legacy_timing_today, sched_timing_today};
use crate::{
    Card, CardId, CardQueue, CollectionConfig, CoreError, DeckConfig, DeckId, Ease, FilteredDeckOptions,
    NewSpread, ReviewLogEntry, LEECH_TAG,
};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod answer;
pub mod display;

pub use answer::{apply_answer, AnswerContext, DailyCounter, Transition};

/// Scheduling options that govern one card.
#[derive(Clone, Debug, PartialEq)]
pub struct CardConfig {
    /// Configuration of the card's home deck.
    pub deck_config: DeckConfig,
    /// Set while the card sits in a filtered deck.
    pub filtered: Option<FilteredDeckOptions>,
}

impl CardConfig {
    /// Filtered deck that only previews cards without rescheduling them.
    pub fn is_preview(&self) -> bool {
        self.filtered.as_ref().is_some_and(|f| !f.resched)
    }

    pub fn preview_delay_secs(&self) -> i64 {
        self.filtered
            .as_ref()
            .map(|f| i64::from(f.preview_delay) * 60)
            .unwrap_or(0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub new: u32,
    pub learning: u32,
    pub review: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnswerOutcome {
    pub review: ReviewLogEntry,
    pub leech: bool,
    pub buried_siblings: Vec<CardId>,
}

/// One caller's study session over a collection.
pub struct SchedulerSession {
    store: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    rng: Box<dyn RngCore + Send>,
    server: bool,
    conf: CollectionConfig,
    today: u32,
    day_cutoff: i64,
    lrn_cutoff: i64,
    queues: StudyQueues,
    have_queues: bool,
    reps: u32,
    shown: Option<(CardId, i64)>,
}

impl SchedulerSession {
    pub fn new(store: Arc<dyn Storage>, clock: Arc<dyn Clock>) -> Self {
        Self::with_rng(store, clock, Box::new(StdRng::from_entropy()))
    }

    pub fn with_rng(store: Arc<dyn Storage>, clock: Arc<dyn Clock>, rng: Box<dyn RngCore + Send>) -> Self {
        Self {
            store,
            clock,
            rng,
            server: false,
            conf: CollectionConfig::default(),
            today: 0,
            day_cutoff: 0,
            lrn_cutoff: 0,
            queues: StudyQueues::default(),
            have_queues: false,
            reps: 0,
            shown: None,
        }
    }

    /// Acts as the sync server: uses the client's stored offset and the server usn.
    pub fn server_mode(mut self, server: bool) -> Self {
        self.server = server;
        self
    }

    pub fn store(&self) -> &Arc<dyn Storage> {
        &self.store
    }

    pub fn today(&self) -> u32 {
        self.today
    }

    pub fn day_cutoff(&self) -> i64 {
        self.day_cutoff
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.conf
    }

    pub fn queues(&self) -> &StudyQueues {
        &self.queues
    }

    pub(crate) fn now(&self) -> i64 {
        self.clock.now().timestamp()
    }

    pub(crate) async fn usn(&self) -> Result<i32, CoreError> {
        self.store.usn(self.server).await
    }

    /// Resets the session when the study day has rolled over.
    pub async fn check_day(&mut self) -> Result<(), CoreError> {
        if self.now() >= self.day_cutoff {
            self.reset().await?;
        }
        Ok(())
    }

    /// Reloads configuration, recomputes the day and rebuilds every queue.
    pub async fn reset(&mut self) -> Result<(), CoreError> {
        self.conf = self.store.config().await?;
        self.update_cutoff().await?;
        let now = self.now();
        self.lrn_cutoff = now + i64::from(self.conf.collapse_time);
        self.queues = build_queues(self.store.as_ref(), &self.conf, self.today, self.lrn_cutoff).await?;
        self.have_queues = true;
        info!(today = self.today, day_cutoff = self.day_cutoff, "scheduler reset");
        Ok(())
    }

    async fn update_cutoff(&mut self) -> Result<(), CoreError> {
        let now = self.now();
        let created = self.store.created_time().await?;
        let timing = match self.conf.creation_offset {
            Some(created_mw) => {
                let now_mw = if self.server {
                    self.conf.local_offset.unwrap_or(created_mw)
                } else {
                    self.clock.local_minutes_west()
                };
                sched_timing_today(created, created_mw, now, now_mw, self.conf.rollover)
            }
            None => legacy_timing_today(created, now, self.conf.rollover),
        };
        if timing.days_elapsed != self.today {
            info!(from = self.today, to = timing.days_elapsed, "study day rolled over");
        }
        self.today = timing.days_elapsed;
        self.day_cutoff = timing.next_day_at;

        for (_, mut deck) in self.store.all_decks().await? {
            if deck.roll_counters(self.today) {
                self.store.save_deck(&deck).await?;
            }
        }

        if self.conf.last_unburied < self.today {
            let usn = self.usn().await?;
            let released = self.store.unbury_all(now, usn).await?;
            debug!(released, "unburied cards for new day");
            self.conf.last_unburied = self.today;
            self.store.save_config(&self.conf).await?;
        }
        Ok(())
    }

    async fn ensure_queues(&mut self) -> Result<(), CoreError> {
        self.check_day().await?;
        if !self.have_queues {
            self.reset().await?;
        }
        Ok(())
    }

    /// Reloads intraday learning cards once the cutoff has moved by over a minute.
    async fn maybe_refresh_learning(&mut self) -> Result<(), CoreError> {
        let next = self.now() + i64::from(self.conf.collapse_time);
        if next - self.lrn_cutoff > 60 {
            self.lrn_cutoff = next;
            let shown = self.shown.map(|(id, _)| id);
            refill_learning(self.store.as_ref(), &self.conf, &mut self.queues, self.lrn_cutoff, shown).await?;
        }
        Ok(())
    }

    /// Remaining (new, learning, review) counts.
    pub async fn counts(&mut self) -> Result<QueueCounts, CoreError> {
        self.ensure_queues().await?;
        self.maybe_refresh_learning().await?;
        let active: Vec<DeckId> = self.conf.active_decks.clone();
        let intraday = self.store.count_learning(&active, self.lrn_cutoff).await?;
        Ok(QueueCounts {
            new: self.queues.new.len() as u32,
            learning: intraday + self.queues.day_learning.len() as u32,
            review: self.queues.review.len() as u32,
        })
    }

    fn time_for_new_card(&self) -> bool {
        if self.queues.new.is_empty() {
            return false;
        }
        match self.conf.new_spread {
            NewSpread::Last => false,
            NewSpread::First => true,
            NewSpread::Distribute => {
                let modulus = self.queues.new_card_modulus;
                modulus != 0 && self.reps != 0 && self.reps % modulus == 0
            }
        }
    }

    async fn pop_learning(&mut self, collapse: bool) -> Result<Option<CardId>, CoreError> {
        self.maybe_refresh_learning().await?;
        let mut cutoff = self.now();
        if collapse {
            cutoff += i64::from(self.conf.collapse_time);
        }
        match self.queues.learning.front() {
            Some((due, _)) if due < cutoff => Ok(self.queues.learning.pop_front().map(|(_, id)| id)),
            _ => Ok(None),
        }
    }

    async fn next_card_id(&mut self) -> Result<Option<CardId>, CoreError> {
        if let Some(id) = self.pop_learning(false).await? {
            return Ok(Some(id));
        }
        if self.time_for_new_card() {
            if let Some(id) = self.queues.new.pop_front() {
                return Ok(Some(id));
            }
        }
        if self.conf.day_learn_first {
            if let Some(id) = self.queues.day_learning.pop_front() {
                return Ok(Some(id));
            }
        }
        if let Some(id) = self.queues.review.pop_front() {
            return Ok(Some(id));
        }
        if let Some(id) = self.queues.day_learning.pop_front() {
            return Ok(Some(id));
        }
        if let Some(id) = self.queues.new.pop_front() {
            return Ok(Some(id));
        }
        self.pop_learning(true).await
    }

    /// Next card to study, or `None` when nothing is left for now.
    pub async fn get_card(&mut self) -> Result<Option<Card>, CoreError> {
        self.ensure_queues().await?;
        let Some(id) = self.next_card_id().await? else {
            return Ok(None);
        };
        let card = self.store.card(id).await?;
        self.reps += 1;
        self.shown = Some((card.id, self.clock.now().timestamp_millis()));
        Ok(Some(card))
    }

    /// Options governing `card`: its home deck's configuration plus the
    /// filtered deck's options while it is borrowed.
    pub async fn card_config(&self, card: &Card) -> Result<CardConfig, CoreError> {
        let deck = self.store.deck(card.deck_id).await?;
        let Some(options) = deck.filtered.clone() else {
            let deck_config = self.store.deck_config(deck.config_id).await?;
            return Ok(CardConfig {
                deck_config,
                filtered: None,
            });
        };
        let invalid = CoreError::InvalidDeckConfigVariant {
            deck_id: deck.id,
            card_id: card.id,
        };
        let home_id = card.original_deck_id.ok_or(invalid)?;
        let home = self.store.deck(home_id).await?;
        if home.is_filtered() {
            return Err(CoreError::InvalidDeckConfigVariant {
                deck_id: home.id,
                card_id: card.id,
            });
        }
        Ok(CardConfig {
            deck_config: self.store.deck_config(home.config_id).await?,
            filtered: Some(options),
        })
    }

    fn taken_ms(&self, card_id: CardId, max_taken: u32) -> u32 {
        match self.shown {
            Some((id, started)) if id == card_id => {
                let elapsed = (self.clock.now().timestamp_millis() - started).max(0);
                elapsed.min(i64::from(max_taken) * 1000) as u32
            }
            _ => 0,
        }
    }

    /// Buries same-note siblings per the deck's bury options. Returns the ids buried.
    async fn bury_siblings(&mut self, card: &Card, config: &CardConfig, usn: i32) -> Result<Vec<CardId>, CoreError> {
        let bury_new = config.deck_config.new.bury;
        let bury_rev = config.deck_config.rev.bury;
        if !bury_new && !bury_rev {
            return Ok(Vec::new());
        }
        let mut to_bury = Vec::new();
        for sibling in self.store.siblings(card.note_id, card.id).await? {
            let wanted = match sibling.queue {
                CardQueue::New => bury_new,
                CardQueue::Review => bury_rev && review_due(&sibling, self.today),
                _ => false,
            };
            if wanted {
                self.queues.remove(sibling.id);
                to_bury.push(sibling.id);
            }
        }
        if !to_bury.is_empty() {
            self.store
                .bury(&to_bury, CardQueue::SiblingBuried, self.now(), usn)
                .await?;
            debug!(card_id = card.id, buried = ?to_bury, "buried siblings");
        }
        Ok(to_bury)
    }

    /// Applies `ease` to `card` and persists the result. `card` is only
    /// updated once every write succeeded.
    pub async fn answer_card(&mut self, card: &mut Card, ease: Ease) -> Result<AnswerOutcome, CoreError> {
        self.check_day().await?;
        let config = self.card_config(card).await?;
        let now = self.now();
        let usn = self.usn().await?;

        let mut updated = card.clone();
        let answered_deck = card.deck_id;
        let learning_head = if self.queues.new.is_empty() && self.queues.review.is_empty() {
            self.queues.learning.front().map(|(due, _)| due)
        } else {
            None
        };
        let ctx = AnswerContext {
            now,
            today: self.today,
            day_cutoff: self.day_cutoff,
            collapse_time: self.conf.collapse_time,
            learning_head,
            config: &config,
        };
        let transition = apply_answer(&mut updated, ease, &ctx, self.rng.as_mut())?;

        let buried_siblings = self.bury_siblings(card, &config, usn).await?;

        if transition.leech {
            let mut note = self.store.note(card.note_id).await?;
            warn!(card_id = card.id, note_id = note.id, lapses = updated.lapses, "card is a leech");
            if note.add_tag(LEECH_TAG) {
                note.mtime = now;
                note.usn = usn;
                self.store.update_note(&note).await?;
            }
        }

        updated.mtime = now;
        updated.usn = usn;
        self.store.update_card(&updated).await?;

        let entry = ReviewLogEntry {
            id: self.clock.now().timestamp_millis(),
            card_id: updated.id,
            usn,
            ease,
            interval: transition.interval,
            last_interval: transition.last_interval,
            factor: updated.factor,
            taken_ms: self.taken_ms(card.id, config.deck_config.max_taken),
            kind: transition.kind,
        };
        let id = self.store.append_review(&entry).await?;
        let review = ReviewLogEntry { id, ..entry };

        if let Some(counter) = transition.counter {
            self.bump_counters(answered_deck, counter, now, usn).await?;
        }

        self.queues.remove(updated.id);
        if let Some(due) = transition.requeue {
            self.queues.learning.push(due, updated.id);
        }
        if self.shown.is_some_and(|(id, _)| id == updated.id) {
            self.shown = None;
        }
        debug!(
            card_id = updated.id,
            ease = ease.as_button(),
            queue = ?updated.queue,
            due = updated.due,
            interval = updated.interval,
            "answered card"
        );
        *card = updated;
        Ok(AnswerOutcome {
            review,
            leech: transition.leech,
            buried_siblings,
        })
    }

    /// Charges one card to the deck and each of its ancestors.
    async fn bump_counters(&self, deck_id: DeckId, counter: DailyCounter, now: i64, usn: i32) -> Result<(), CoreError> {
        let mut decks = self.store.ancestors(deck_id).await?;
        decks.push(self.store.deck(deck_id).await?);
        for mut deck in decks {
            let slot = match counter {
                DailyCounter::New => &mut deck.new_today,
                DailyCounter::Learn => &mut deck.learn_today,
                DailyCounter::Review => &mut deck.review_today,
            };
            slot.bump(self.today, 1);
            deck.mtime = now;
            deck.usn = usn;
            self.store.save_deck(&deck).await?;
        }
        Ok(())
    }

    pub async fn suspend_cards(&mut self, ids: &[CardId]) -> Result<(), CoreError> {
        let now = self.now();
        let usn = self.usn().await?;
        for &id in ids {
            let mut card = self.store.card(id).await?;
            self.queues.remove(id);
            if card.queue == CardQueue::Suspended {
                continue;
            }
            card.queue = CardQueue::Suspended;
            card.mtime = now;
            card.usn = usn;
            self.store.update_card(&card).await?;
        }
        Ok(())
    }

    pub async fn unsuspend_cards(&mut self, ids: &[CardId]) -> Result<(), CoreError> {
        self.release(ids, |q| q == CardQueue::Suspended).await
    }

    /// Buries cards by hand until the next day.
    pub async fn bury_cards(&mut self, ids: &[CardId]) -> Result<(), CoreError> {
        let now = self.now();
        let usn = self.usn().await?;
        self.store.bury(ids, CardQueue::ManuallyBuried, now, usn).await?;
        for &id in ids {
            self.queues.remove(id);
        }
        Ok(())
    }

    pub async fn unbury_cards(&mut self, ids: &[CardId]) -> Result<(), CoreError> {
        self.release(ids, |q| q.is_buried()).await
    }

    async fn release(&mut self, ids: &[CardId], held: impl Fn(CardQueue) -> bool) -> Result<(), CoreError> {
        let now = self.now();
        let usn = self.usn().await?;
        for &id in ids {
            let mut card = self.store.card(id).await?;
            if !held(card.queue) {
                continue;
            }
            card.restore_queue();
            card.mtime = now;
            card.usn = usn;
            self.store.update_card(&card).await?;
        }
        // released cards rejoin the queues on the next rebuild
        self.have_queues = false;
        Ok(())
    }
}
