use serde::{Deserialize, Serialize};

pub type CardId = i64;
pub type NoteId = i64;
pub type DeckId = i64;
pub type DeckConfigId = i64;

/// Deck that orphaned cards fall back to.
pub const DEFAULT_DECK_ID: DeckId = 1;
pub const DEFAULT_DECK_CONFIG_ID: DeckConfigId = 1;

pub const FACTOR_MIN: u32 = 1300;
pub const FACTOR_DEFAULT: u32 = 2500;

/// `due` values above this are Unix timestamps rather than day indexes.
pub const TIMESTAMP_DUE_THRESHOLD: i64 = 1_000_000_000;

pub const LEECH_TAG: &str = "leech";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Ease {
    Wrong,
    Hard,
    Good,
    Easy,
}

impl Ease {
    /// Button number as shown to the user (1-4).
    pub fn as_button(&self) -> u8 {
        match self {
            Ease::Wrong => 1,
            Ease::Hard => 2,
            Ease::Good => 3,
            Ease::Easy => 4,
        }
    }

    pub fn from_button(button: u8) -> Option<Self> {
        match button {
            1 => Some(Ease::Wrong),
            2 => Some(Ease::Hard),
            3 => Some(Ease::Good),
            4 => Some(Ease::Easy),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CardType {
    New,
    Learning,
    Review,
    Relearning,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CardQueue {
    Suspended,
    SiblingBuried,
    ManuallyBuried,
    New,
    Learning,
    Review,
    DayLearning,
    Preview,
}

impl CardQueue {
    pub fn is_buried(&self) -> bool {
        matches!(self, CardQueue::SiblingBuried | CardQueue::ManuallyBuried)
    }

    /// Queues a card can be answered from.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            CardQueue::New
                | CardQueue::Learning
                | CardQueue::Review
                | CardQueue::DayLearning
                | CardQueue::Preview
        )
    }
}

/// Interval as stored in the review log: positive values are days, negative
/// values are seconds.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "i64", into = "i64")]
pub enum Interval {
    Seconds(i64),
    Days(i64),
}

impl From<i64> for Interval {
    fn from(raw: i64) -> Self {
        if raw < 0 {
            Interval::Seconds(-raw)
        } else {
            Interval::Days(raw)
        }
    }
}

impl From<Interval> for i64 {
    fn from(ivl: Interval) -> Self {
        match ivl {
            Interval::Seconds(secs) => -secs,
            Interval::Days(days) => days,
        }
    }
}

impl Interval {
    pub fn as_seconds(&self) -> i64 {
        match self {
            Interval::Seconds(secs) => *secs,
            Interval::Days(days) => days * 86_400,
        }
    }
}

/// `[day index, count]` pair tracking how much of a daily quota was used.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DayCounter(pub u32, pub u32);

impl DayCounter {
    pub fn day(&self) -> u32 {
        self.0
    }

    /// Count used on `today`; a counter left over from another day counts as 0.
    pub fn used_on(&self, today: u32) -> u32 {
        if self.0 == today {
            self.1
        } else {
            0
        }
    }

    pub fn bump(&mut self, today: u32, by: u32) {
        if self.0 != today {
            *self = DayCounter(today, 0);
        }
        self.1 += by;
    }

    /// Returns true when the counter was stale and has been reset.
    pub fn roll_to(&mut self, today: u32) -> bool {
        if self.0 != today {
            *self = DayCounter(today, 0);
            true
        } else {
            false
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Card {
    pub id: CardId,
    pub note_id: NoteId,
    pub deck_id: DeckId,
    #[serde(rename = "type")]
    pub ctype: CardType,
    pub queue: CardQueue,
    pub due: i64,
    /// Days.
    pub interval: u32,
    /// Ease factor in permille.
    pub factor: u32,
    pub reps: u32,
    pub lapses: u32,
    /// `steps left today * 1000 + steps left in total`.
    pub left: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_deck_id: Option<DeckId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_due: Option<i64>,
    #[serde(default)]
    pub mtime: i64,
    #[serde(default)]
    pub usn: i32,
}

impl Card {
    /// A new card at `position` in the new queue.
    pub fn new(id: CardId, note_id: NoteId, deck_id: DeckId, position: i64) -> Self {
        Self {
            id,
            note_id,
            deck_id,
            ctype: CardType::New,
            queue: CardQueue::New,
            due: position,
            interval: 0,
            factor: 0,
            reps: 0,
            lapses: 0,
            left: 0,
            original_deck_id: None,
            original_due: None,
            mtime: 0,
            usn: 0,
        }
    }

    pub fn in_filtered_deck(&self) -> bool {
        self.original_deck_id.is_some()
    }

    /// Deck whose configuration governs this card.
    pub fn home_deck_id(&self) -> DeckId {
        self.original_deck_id.unwrap_or(self.deck_id)
    }

    /// Queue implied by the card type when it is released from a side state.
    pub fn queue_for_type(&self) -> CardQueue {
        match self.ctype {
            CardType::New => CardQueue::New,
            CardType::Review => CardQueue::Review,
            CardType::Learning | CardType::Relearning => {
                if self.due > TIMESTAMP_DUE_THRESHOLD {
                    CardQueue::Learning
                } else {
                    CardQueue::DayLearning
                }
            }
        }
    }

    pub fn restore_queue(&mut self) {
        self.queue = self.queue_for_type();
    }

    pub fn has_valid_state(&self) -> bool {
        match (self.ctype, self.queue) {
            (_, CardQueue::Suspended | CardQueue::SiblingBuried | CardQueue::ManuallyBuried) => true,
            (_, CardQueue::Preview) => true,
            (CardType::New, q) => q == CardQueue::New,
            (CardType::Learning | CardType::Relearning, q) => {
                matches!(q, CardQueue::Learning | CardQueue::DayLearning)
            }
            (CardType::Review, q) => q == CardQueue::Review,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Note {
    pub id: NoteId,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub mtime: i64,
    #[serde(default)]
    pub usn: i32,
}

impl Note {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    /// Returns true if the tag was not present yet.
    pub fn add_tag(&mut self, tag: &str) -> bool {
        if self.has_tag(tag) {
            return false;
        }
        self.tags.push(tag.to_string());
        true
    }
}

/// Options of a filtered (dynamic) deck.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilteredDeckOptions {
    /// Answers reschedule the card; when false the deck only previews.
    pub resched: bool,
    /// Minutes before a failed preview card is shown again.
    #[serde(default = "default_preview_delay")]
    pub preview_delay: u32,
}

fn default_preview_delay() -> u32 {
    10
}

impl Default for FilteredDeckOptions {
    fn default() -> Self {
        Self {
            resched: true,
            preview_delay: default_preview_delay(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Deck {
    pub id: DeckId,
    /// Hierarchy path, components separated by `::`.
    pub name: String,
    /// 0 for filtered decks.
    pub config_id: DeckConfigId,
    #[serde(default)]
    pub new_today: DayCounter,
    #[serde(default)]
    pub review_today: DayCounter,
    #[serde(default)]
    pub learn_today: DayCounter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filtered: Option<FilteredDeckOptions>,
    #[serde(default)]
    pub mtime: i64,
    #[serde(default)]
    pub usn: i32,
}

pub const DECK_SEPARATOR: &str = "::";

impl Deck {
    pub fn new(id: DeckId, name: impl Into<String>, config_id: DeckConfigId) -> Self {
        Self {
            id,
            name: name.into(),
            config_id,
            new_today: DayCounter::default(),
            review_today: DayCounter::default(),
            learn_today: DayCounter::default(),
            filtered: None,
            mtime: 0,
            usn: 0,
        }
    }

    pub fn new_filtered(id: DeckId, name: impl Into<String>, options: FilteredDeckOptions) -> Self {
        let mut deck = Self::new(id, name, 0);
        deck.filtered = Some(options);
        deck
    }

    pub fn is_filtered(&self) -> bool {
        self.filtered.is_some()
    }

    /// Name of the immediate parent, if any.
    pub fn parent_name(&self) -> Option<&str> {
        self.name.rsplit_once(DECK_SEPARATOR).map(|(parent, _)| parent)
    }

    /// Names of all ancestors, root first: `A::B::C` yields `A`, `A::B`.
    pub fn ancestor_names(&self) -> Vec<String> {
        let parts: Vec<&str> = self.name.split(DECK_SEPARATOR).collect();
        (1..parts.len())
            .map(|n| parts[..n].join(DECK_SEPARATOR))
            .collect()
    }

    pub fn is_descendant_of(&self, other: &Deck) -> bool {
        self.name.len() > other.name.len()
            && self.name.starts_with(&other.name)
            && self.name[other.name.len()..].starts_with(DECK_SEPARATOR)
    }

    /// Resets the daily counters kept for another day. Returns true if any changed.
    pub fn roll_counters(&mut self, today: u32) -> bool {
        let a = self.new_today.roll_to(today);
        let b = self.review_today.roll_to(today);
        let c = self.learn_today.roll_to(today);
        a || b || c
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NewCardOrder {
    Random,
    #[default]
    Due,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LeechAction {
    #[default]
    Suspend,
    TagOnly,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NewConfig {
    /// Learning steps in minutes.
    pub delays: Vec<f32>,
    /// Graduating interval and easy interval, in days.
    pub intervals: [u32; 2],
    pub initial_factor: u32,
    pub per_day: u32,
    pub order: NewCardOrder,
    pub bury: bool,
}

impl Default for NewConfig {
    fn default() -> Self {
        Self {
            delays: vec![1.0, 10.0],
            intervals: [1, 4],
            initial_factor: FACTOR_DEFAULT,
            per_day: 20,
            order: NewCardOrder::Due,
            bury: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RevConfig {
    pub per_day: u32,
    /// Interval modifier applied to every computed review interval.
    pub ivl_fct: f64,
    pub max_ivl: u32,
    /// Easy bonus.
    pub ease4: f64,
    pub fuzz: f64,
    pub bury: bool,
    pub hard_factor: f64,
}

impl Default for RevConfig {
    fn default() -> Self {
        Self {
            per_day: 200,
            ivl_fct: 1.0,
            max_ivl: 36_500,
            ease4: 1.3,
            fuzz: 0.05,
            bury: false,
            hard_factor: 1.2,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LapseConfig {
    /// Relearning steps in minutes.
    pub delays: Vec<f32>,
    pub leech_fails: u32,
    pub leech_action: LeechAction,
    pub min_int: u32,
    pub mult: f64,
}

impl Default for LapseConfig {
    fn default() -> Self {
        Self {
            delays: vec![10.0],
            leech_fails: 8,
            leech_action: LeechAction::Suspend,
            min_int: 1,
            mult: 0.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DeckConfig {
    pub id: DeckConfigId,
    pub name: String,
    #[serde(default)]
    pub new: NewConfig,
    #[serde(default)]
    pub rev: RevConfig,
    #[serde(default)]
    pub lapse: LapseConfig,
    /// Seconds; answer time is capped at this.
    #[serde(default = "default_max_taken")]
    pub max_taken: u32,
}

fn default_max_taken() -> u32 {
    60
}

impl DeckConfig {
    pub fn new(id: DeckConfigId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            new: NewConfig::default(),
            rev: RevConfig::default(),
            lapse: LapseConfig::default(),
            max_taken: default_max_taken(),
        }
    }
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DECK_CONFIG_ID, "Default")
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NewSpread {
    #[default]
    Distribute,
    Last,
    First,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CollectionConfig {
    pub active_decks: Vec<DeckId>,
    pub current_deck: DeckId,
    /// Seconds a learning card may be shown ahead of its due time.
    pub collapse_time: u32,
    /// Hour of day the study day starts.
    pub rollover: i32,
    /// Minutes west of UTC at collection creation; enables timezone-aware timing.
    pub creation_offset: Option<i32>,
    /// Minutes west of UTC on the syncing client (server mode).
    pub local_offset: Option<i32>,
    pub last_unburied: u32,
    pub new_spread: NewSpread,
    pub day_learn_first: bool,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            active_decks: vec![DEFAULT_DECK_ID],
            current_deck: DEFAULT_DECK_ID,
            collapse_time: 1200,
            rollover: 4,
            creation_offset: None,
            local_offset: None,
            last_unburied: 0,
            new_spread: NewSpread::Distribute,
            day_learn_first: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RevlogKind {
    Learning,
    Review,
    Relearn,
    Cram,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReviewLogEntry {
    /// Milliseconds since the epoch; doubles as the answer timestamp.
    pub id: i64,
    pub card_id: CardId,
    pub usn: i32,
    pub ease: Ease,
    pub interval: Interval,
    pub last_interval: Interval,
    pub factor: u32,
    /// Milliseconds.
    pub taken_ms: u32,
    pub kind: RevlogKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_sign_encodes_unit() {
        assert_eq!(Interval::from(-600), Interval::Seconds(600));
        assert_eq!(Interval::from(4), Interval::Days(4));
        assert_eq!(i64::from(Interval::Seconds(60)), -60);
        let json = serde_json::to_string(&Interval::Seconds(90)).unwrap();
        assert_eq!(json, "-90");
    }

    #[test]
    fn ancestor_names_root_first() {
        let deck = Deck::new(5, "A::B::C", 1);
        assert_eq!(deck.ancestor_names(), vec!["A".to_string(), "A::B".to_string()]);
        assert_eq!(deck.parent_name(), Some("A::B"));
        assert!(Deck::new(6, "Top", 1).ancestor_names().is_empty());
    }

    #[test]
    fn descendant_requires_separator() {
        let parent = Deck::new(1, "Lang", 1);
        assert!(Deck::new(2, "Lang::Spanish", 1).is_descendant_of(&parent));
        assert!(!Deck::new(3, "Language", 1).is_descendant_of(&parent));
        assert!(!parent.is_descendant_of(&parent));
    }

    #[test]
    fn stale_counter_reads_zero() {
        let mut counter = DayCounter(3, 7);
        assert_eq!(counter.used_on(3), 7);
        assert_eq!(counter.used_on(4), 0);
        counter.bump(4, 1);
        assert_eq!(counter, DayCounter(4, 1));
    }

    #[test]
    fn review_queue_never_holds_new_card() {
        let mut card = Card::new(1, 1, 1, 0);
        assert!(card.has_valid_state());
        card.queue = CardQueue::Review;
        assert!(!card.has_valid_state());
    }

    #[test]
    fn learning_queue_restored_from_due_magnitude() {
        let mut card = Card::new(1, 1, 1, 0);
        card.ctype = CardType::Relearning;
        card.due = 1_700_000_000;
        assert_eq!(card.queue_for_type(), CardQueue::Learning);
        card.due = 120;
        assert_eq!(card.queue_for_type(), CardQueue::DayLearning);
    }

    #[test]
    fn leech_tag_added_once() {
        let mut note = Note { id: 1, ..Default::default() };
        assert!(note.add_tag(LEECH_TAG));
        assert!(!note.add_tag("Leech"));
        assert_eq!(note.tags.len(), 1);
    }
}
