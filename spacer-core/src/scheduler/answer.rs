//! Card state transitions for a single answer. Storage is untouched here: the
//! session persists whatever these functions leave on the card.

use super::CardConfig;
use crate::intervals::{
    apply_lapse, delay_for_grade, delay_for_repeating_grade, early_review_interval, graduating_interval,
    lapse_interval, left_today, next_review_interval, starting_left, LearningStepSource,
};
use crate::{Card, CardQueue, CardType, CoreError, Ease, Interval, RevlogKind, SECS_PER_DAY};
use rand::{Rng, RngCore};

/// Daily counter charged for an answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DailyCounter {
    New,
    Learn,
    Review,
}

pub struct AnswerContext<'a> {
    pub now: i64,
    pub today: u32,
    pub day_cutoff: i64,
    pub collapse_time: u32,
    /// Due of the learning queue head, set only when no new or review cards remain.
    pub learning_head: Option<i64>,
    pub config: &'a CardConfig,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub kind: RevlogKind,
    pub interval: Interval,
    pub last_interval: Interval,
    pub leech: bool,
    pub counter: Option<DailyCounter>,
    /// Due timestamp when the card goes straight back into the learning queue.
    pub requeue: Option<i64>,
}

fn invalid_state(card: &Card) -> CoreError {
    CoreError::InvalidCardState {
        card_id: card.id,
        ctype: card.ctype,
        queue: card.queue,
    }
}

pub fn apply_answer(
    card: &mut Card,
    ease: Ease,
    ctx: &AnswerContext<'_>,
    rng: &mut (dyn RngCore + '_),
) -> Result<Transition, CoreError> {
    if !card.queue.is_active() || !card.has_valid_state() {
        return Err(invalid_state(card));
    }
    if ctx.config.is_preview() {
        return Ok(answer_preview(card, ease, ctx));
    }

    card.reps += 1;
    let mut counter = None;
    if card.queue == CardQueue::New {
        card.queue = CardQueue::Learning;
        card.ctype = CardType::Learning;
        card.left = starting_left(&ctx.config.deck_config.new.delays, ctx.now, ctx.day_cutoff);
        counter = Some(DailyCounter::New);
    }

    let mut transition = match card.queue {
        CardQueue::Learning | CardQueue::DayLearning => answer_learning(card, ease, ctx, rng),
        CardQueue::Review => answer_review(card, ease, ctx, rng),
        _ => return Err(invalid_state(card)),
    };
    transition.counter = counter.or(transition.counter);

    // the original due only matters for the first answer in a filtered deck
    card.original_due = None;
    Ok(transition)
}

fn answer_preview(card: &mut Card, ease: Ease, ctx: &AnswerContext<'_>) -> Transition {
    let last_interval = Interval::Days(i64::from(card.interval));
    if ease == Ease::Wrong {
        let delay = ctx.config.preview_delay_secs();
        card.queue = CardQueue::Preview;
        card.due = ctx.now + delay;
        let requeue = (card.due < ctx.now + i64::from(ctx.collapse_time)).then_some(card.due);
        return Transition {
            kind: RevlogKind::Cram,
            interval: Interval::Seconds(delay),
            last_interval,
            leech: false,
            counter: None,
            requeue,
        };
    }
    if let Some(due) = card.original_due {
        card.due = due;
    }
    card.restore_queue();
    remove_from_filtered(card);
    Transition {
        kind: RevlogKind::Cram,
        interval: Interval::Days(i64::from(card.interval)),
        last_interval,
        leech: false,
        counter: None,
        requeue: None,
    }
}

fn remove_from_filtered(card: &mut Card) {
    if let Some(home) = card.original_deck_id.take() {
        card.deck_id = home;
        card.original_due = None;
    }
}

fn step_delays<'c>(card: &Card, config: &'c CardConfig) -> &'c [f32] {
    LearningStepSource::for_card(card, &config.deck_config).delays()
}

fn answer_learning(
    card: &mut Card,
    ease: Ease,
    ctx: &AnswerContext<'_>,
    rng: &mut (dyn RngCore + '_),
) -> Transition {
    let kind = match card.ctype {
        CardType::New | CardType::Learning => RevlogKind::Learning,
        CardType::Review | CardType::Relearning => RevlogKind::Relearn,
    };
    let last_interval = Interval::Seconds(delay_for_grade(step_delays(card, ctx.config), card.left));

    let mut requeue = None;
    let delay = match ease {
        Ease::Easy => {
            reschedule_as_review(card, ctx, true, rng);
            None
        }
        Ease::Good if (card.left % 1000) <= 1 => {
            reschedule_as_review(card, ctx, false, rng);
            None
        }
        Ease::Good => Some(move_to_next_step(card, ctx, rng, &mut requeue)),
        Ease::Hard => Some(repeat_step(card, ctx, rng, &mut requeue)),
        Ease::Wrong => Some(move_to_first_step(card, ctx, rng, &mut requeue)),
    };

    let interval = match delay {
        Some(secs) => Interval::Seconds(secs),
        None => Interval::Days(i64::from(card.interval)),
    };
    Transition {
        kind,
        interval,
        last_interval,
        leech: false,
        counter: Some(DailyCounter::Learn),
        requeue,
    }
}

fn answer_review(
    card: &mut Card,
    ease: Ease,
    ctx: &AnswerContext<'_>,
    rng: &mut (dyn RngCore + '_),
) -> Transition {
    let early = card.in_filtered_deck() && card.original_due.is_some_and(|due| due > i64::from(ctx.today));
    let last_interval = Interval::Days(i64::from(card.interval));
    let mut requeue = None;
    let mut leech = false;

    let delay = if ease == Ease::Wrong {
        let (delay, is_leech) = reschedule_lapse(card, ctx, rng, &mut requeue);
        leech = is_leech;
        delay
    } else {
        reschedule_review(card, ease, early, ctx, rng);
        0
    };

    let interval = if delay > 0 {
        Interval::Seconds(delay)
    } else {
        Interval::Days(i64::from(card.interval))
    };
    Transition {
        kind: if early { RevlogKind::Cram } else { RevlogKind::Review },
        interval,
        last_interval,
        leech,
        counter: Some(DailyCounter::Review),
        requeue,
    }
}

/// Returns the relearning delay (0 when the card was rescheduled directly) and
/// whether the card became a leech.
fn reschedule_lapse(
    card: &mut Card,
    ctx: &AnswerContext<'_>,
    rng: &mut (dyn RngCore + '_),
    requeue: &mut Option<i64>,
) -> (i64, bool) {
    let lapse = &ctx.config.deck_config.lapse;
    let outcome = apply_lapse(card, lapse);
    if outcome.relearn {
        card.ctype = CardType::Relearning;
        return (move_to_first_step(card, ctx, rng, requeue), outcome.leech);
    }
    card.interval = lapse_interval(card, lapse);
    card.due = i64::from(ctx.today) + i64::from(card.interval);
    card.ctype = CardType::Review;
    card.queue = CardQueue::Review;
    remove_from_filtered(card);
    if outcome.suspended {
        card.queue = CardQueue::Suspended;
    }
    (0, outcome.leech)
}

fn reschedule_review(
    card: &mut Card,
    ease: Ease,
    early: bool,
    ctx: &AnswerContext<'_>,
    rng: &mut (dyn RngCore + '_),
) {
    let rev = &ctx.config.deck_config.rev;
    card.interval = if early {
        early_review_interval(card, rev, ease, ctx.today)
    } else {
        next_review_interval(card, rev, ease, ctx.today, Some(rng))
    };
    card.factor = crate::intervals::adjusted_factor(card.factor, ease);
    card.due = i64::from(ctx.today) + i64::from(card.interval);
    remove_from_filtered(card);
}

fn reschedule_as_review(card: &mut Card, ctx: &AnswerContext<'_>, early: bool, rng: &mut (dyn RngCore + '_)) {
    let new = &ctx.config.deck_config.new;
    let graduating_new = matches!(card.ctype, CardType::New | CardType::Learning);
    card.interval = graduating_interval(card, new, early, Some(rng));
    if graduating_new {
        card.factor = new.initial_factor;
    }
    card.due = i64::from(ctx.today) + i64::from(card.interval);
    card.ctype = CardType::Review;
    card.queue = CardQueue::Review;
    remove_from_filtered(card);
}

fn move_to_next_step(
    card: &mut Card,
    ctx: &AnswerContext<'_>,
    rng: &mut (dyn RngCore + '_),
    requeue: &mut Option<i64>,
) -> i64 {
    let delays = step_delays(card, ctx.config);
    let left = (card.left % 1000).saturating_sub(1);
    card.left = left_today(delays, left, ctx.now, ctx.day_cutoff) * 1000 + left;
    let delay = delay_for_grade(delays, card.left);
    reschedule_learning(card, delay, ctx, rng, requeue);
    delay
}

fn repeat_step(
    card: &mut Card,
    ctx: &AnswerContext<'_>,
    rng: &mut (dyn RngCore + '_),
    requeue: &mut Option<i64>,
) -> i64 {
    let delay = delay_for_repeating_grade(step_delays(card, ctx.config), card.left);
    reschedule_learning(card, delay, ctx, rng, requeue);
    delay
}

fn move_to_first_step(
    card: &mut Card,
    ctx: &AnswerContext<'_>,
    rng: &mut (dyn RngCore + '_),
    requeue: &mut Option<i64>,
) -> i64 {
    let delays = step_delays(card, ctx.config);
    card.left = starting_left(delays, ctx.now, ctx.day_cutoff);
    if card.ctype == CardType::Relearning {
        card.interval = lapse_interval(card, &ctx.config.deck_config.lapse);
    }
    let delay = delay_for_grade(delays, card.left);
    reschedule_learning(card, delay, ctx, rng, requeue);
    delay
}

/// Schedules the next learning step `delay` seconds out: intraday when it
/// lands before the day cutoff, otherwise in the day-learning queue.
fn reschedule_learning(
    card: &mut Card,
    delay: i64,
    ctx: &AnswerContext<'_>,
    rng: &mut (dyn RngCore + '_),
    requeue: &mut Option<i64>,
) {
    card.due = ctx.now + delay;
    if card.due < ctx.day_cutoff {
        let max_extra = (delay / 4).min(300);
        let extra = rng.gen_range(0..max_extra.max(1));
        card.due = (card.due + extra).min(ctx.day_cutoff - 1);
        card.queue = CardQueue::Learning;
        if card.due < ctx.now + i64::from(ctx.collapse_time) {
            if let Some(head) = ctx.learning_head {
                card.due = card.due.max(head + 1);
            }
            *requeue = Some(card.due);
        }
    } else {
        let ahead = (card.due - ctx.day_cutoff) / SECS_PER_DAY + 1;
        card.due = i64::from(ctx.today) + ahead;
        card.queue = CardQueue::DayLearning;
    }
}
