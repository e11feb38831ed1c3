//! Spaced-repetition scheduling: study-day timing, per-deck daily limits,
//! study queues, interval arithmetic and answer processing over a pluggable
//! storage backend.

pub mod clock;
pub mod errors;
pub mod filters;
pub mod hierarchy;
pub mod intervals;
pub mod limits;
pub mod models;
pub mod queues;
pub mod repo;
pub mod scheduler;
pub mod stats;
pub mod timing;

pub use clock::{Clock, FixedClock, SystemClock};
pub use errors::*;
pub use hierarchy::HierarchyRepair;
pub use limits::{LimitKind, LimitResolver, DYN_REPORT_LIMIT, REPORT_LIMIT};
pub use models::*;
pub use queues::StudyQueues;
pub use repo::memory::MemoryRepo;
pub use repo::state::CollectionState;
pub use repo::{CardStore, CollectionConfigStore, DeckStore, NoteStore, ReviewLogStore, Storage};
pub use scheduler::display::format_interval;
pub use scheduler::{AnswerOutcome, CardConfig, QueueCounts, SchedulerSession};
pub use stats::*;
pub use timing::{SchedTimingToday, SECS_PER_DAY};
