//! Interval, fuzz, learning-step and leech math. Nothing here touches storage;
//! randomness is always passed in.

use crate::{Card, CardQueue, CardType, DeckConfig, Ease, LapseConfig, LeechAction, NewConfig, RevConfig, FACTOR_MIN};
use rand::{Rng, RngCore};

/// Learning ladder a card walks: the new-card steps or the relearning steps.
#[derive(Clone, Copy, Debug)]
pub enum LearningStepSource<'a> {
    New(&'a NewConfig),
    Lapse(&'a LapseConfig),
}

impl<'a> LearningStepSource<'a> {
    pub fn for_card(card: &Card, conf: &'a DeckConfig) -> Self {
        match card.ctype {
            CardType::New | CardType::Learning => LearningStepSource::New(&conf.new),
            CardType::Review | CardType::Relearning => LearningStepSource::Lapse(&conf.lapse),
        }
    }

    /// Step delays in minutes.
    pub fn delays(&self) -> &'a [f32] {
        match self {
            LearningStepSource::New(new) => &new.delays,
            LearningStepSource::Lapse(lapse) => &lapse.delays,
        }
    }
}

/// Inclusive range a fuzzed `ivl` is drawn from.
pub fn fuzz_range(ivl: u32) -> (u32, u32) {
    if ivl < 2 {
        return (1, 1);
    }
    if ivl == 2 {
        return (2, 3);
    }
    let fuzz = if ivl < 7 {
        (f64::from(ivl) * 0.25) as u32
    } else if ivl < 30 {
        ((f64::from(ivl) * 0.15) as u32).max(2)
    } else {
        ((f64::from(ivl) * 0.05) as u32).max(4)
    };
    let fuzz = fuzz.max(1);
    (ivl - fuzz, ivl + fuzz)
}

pub fn fuzzed_interval(ivl: u32, rng: &mut (dyn RngCore + '_)) -> u32 {
    let (lo, hi) = fuzz_range(ivl);
    rng.gen_range(lo..=hi)
}

/// Applies the interval modifier and optional fuzz, then clamps into
/// `[max(prior_floor + 1, 1), max_ivl]`.
pub fn constrain_interval(
    raw: f64,
    rev: &RevConfig,
    prior_floor: u32,
    fuzz: Option<&mut (dyn RngCore + '_)>,
) -> u32 {
    let mut ivl = (raw * rev.ivl_fct) as u32;
    if let Some(rng) = fuzz {
        ivl = fuzzed_interval(ivl, rng);
    }
    ivl.max(prior_floor.saturating_add(1))
        .max(1)
        .min(rev.max_ivl.max(1))
}

/// Interval given when a card leaves the learning ladder.
pub fn graduating_interval(
    card: &Card,
    new: &NewConfig,
    early: bool,
    fuzz: Option<&mut (dyn RngCore + '_)>,
) -> u32 {
    if matches!(card.ctype, CardType::Review | CardType::Relearning) {
        return card.interval + u32::from(!early);
    }
    let ideal = new.intervals[usize::from(early)];
    match fuzz {
        Some(rng) => fuzzed_interval(ideal, rng),
        None => ideal,
    }
}

/// Days past the scheduled due day; filtered cards use their original due.
pub fn days_late(card: &Card, today: u32) -> u32 {
    let due = if card.in_filtered_deck() {
        card.original_due.unwrap_or(card.due)
    } else {
        card.due
    };
    (i64::from(today) - due).max(0) as u32
}

/// Next interval in days for a review card answered Hard, Good or Easy.
pub fn next_review_interval(
    card: &Card,
    rev: &RevConfig,
    ease: Ease,
    today: u32,
    mut fuzz: Option<&mut (dyn RngCore + '_)>,
) -> u32 {
    let delay = f64::from(days_late(card, today));
    let factor = f64::from(card.factor) / 1000.0;
    let ivl = f64::from(card.interval);
    let hard_min = if rev.hard_factor > 1.0 { card.interval } else { 0 };

    let hard = constrain_interval(ivl * rev.hard_factor, rev, hard_min, fuzz.as_deref_mut());
    if ease == Ease::Hard {
        return hard;
    }
    let good = constrain_interval((ivl + (delay / 2.0).floor()) * factor, rev, hard, fuzz.as_deref_mut());
    if ease == Ease::Good {
        return good;
    }
    constrain_interval((ivl + delay) * factor * rev.ease4, rev, good, fuzz)
}

/// Interval for a review card answered ahead of schedule in a filtered deck.
/// Driven by the days actually elapsed since the last review.
pub fn early_review_interval(card: &Card, rev: &RevConfig, ease: Ease, today: u32) -> u32 {
    let original_due = card.original_due.unwrap_or(card.due);
    let elapsed = f64::from(card.interval) - (original_due - i64::from(today)) as f64;
    let card_factor = f64::from(card.factor) / 1000.0;

    let (factor, min_new_ivl, easy_bonus) = match ease {
        Ease::Wrong => return 1,
        // hard answers may not shrink the interval below half the hard factor
        Ease::Hard => (rev.hard_factor, rev.hard_factor / 2.0, 1.0),
        Ease::Good => (card_factor, 1.0, 1.0),
        Ease::Easy => (card_factor, 1.0, rev.ease4 - (rev.ease4 - 1.0) / 2.0),
    };

    let ivl = (elapsed * factor).max(1.0);
    let ivl = (f64::from(card.interval) * min_new_ivl).max(ivl) * easy_bonus;
    constrain_interval(ivl, rev, 0, None)
}

pub fn lapse_interval(card: &Card, lapse: &LapseConfig) -> u32 {
    let shrunk = (f64::from(card.interval) * lapse.mult) as u32;
    shrunk.max(lapse.min_int).max(1)
}

/// Leech at the threshold and every half-threshold lapses after it.
pub fn is_leech(lapses: u32, leech_fails: u32) -> bool {
    if leech_fails == 0 || lapses < leech_fails {
        return false;
    }
    (lapses - leech_fails) % (leech_fails / 2).max(1) == 0
}

pub fn adjusted_factor(factor: u32, ease: Ease) -> u32 {
    let delta: i64 = match ease {
        Ease::Wrong => -200,
        Ease::Hard => -150,
        Ease::Good => 0,
        Ease::Easy => 150,
    };
    (i64::from(factor) + delta).max(i64::from(FACTOR_MIN)) as u32
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LapseOutcome {
    pub leech: bool,
    pub suspended: bool,
    /// Card re-enters the relearning steps rather than being rescheduled directly.
    pub relearn: bool,
}

/// Lapse bookkeeping for a failed review: counters, ease and leech handling.
pub fn apply_lapse(card: &mut Card, lapse: &LapseConfig) -> LapseOutcome {
    card.lapses += 1;
    card.factor = adjusted_factor(card.factor, Ease::Wrong);
    let leech = is_leech(card.lapses, lapse.leech_fails);
    if leech && lapse.leech_action == LeechAction::Suspend {
        card.queue = CardQueue::Suspended;
    }
    let suspended = card.queue == CardQueue::Suspended;
    LapseOutcome {
        leech,
        suspended,
        relearn: !lapse.delays.is_empty() && !suspended,
    }
}

/// Delay in seconds for the step `left` points at.
pub fn delay_for_grade(delays: &[f32], left: u32) -> i64 {
    let left = (left % 1000) as usize;
    let minutes = if left >= 1 && left <= delays.len() {
        delays[delays.len() - left]
    } else if let Some(first) = delays.first() {
        *first
    } else {
        1.0
    };
    (f64::from(minutes) * 60.0) as i64
}

/// Delay in seconds when the current step is repeated: halfway between this
/// step and the next one (or double this step when it is the last).
pub fn delay_for_repeating_grade(delays: &[f32], left: u32) -> i64 {
    let current = delay_for_grade(delays, left);
    let next = if delays.len() > 1 {
        delay_for_grade(delays, left.saturating_sub(1))
    } else {
        current * 2
    };
    (current + current.max(next)) / 2
}

/// Number of the remaining `left` steps that can be completed before `day_cutoff`.
pub fn left_today(delays: &[f32], left: u32, now: i64, day_cutoff: i64) -> u32 {
    let start = delays.len().saturating_sub(left as usize);
    let mut at = now;
    let mut ok = 0;
    for (i, minutes) in delays[start..].iter().enumerate() {
        at += (f64::from(*minutes) * 60.0) as i64;
        if at > day_cutoff {
            break;
        }
        ok = i;
    }
    ok as u32 + 1
}

/// Initial `left` value for a card entering a learning ladder.
pub fn starting_left(delays: &[f32], now: i64, day_cutoff: i64) -> u32 {
    let total = delays.len() as u32;
    total + left_today(delays, total, now, day_cutoff) * 1000
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn review_card(ivl: u32, factor: u32, due: i64) -> Card {
        let mut card = Card::new(1, 1, 1, 0);
        card.ctype = CardType::Review;
        card.queue = CardQueue::Review;
        card.interval = ivl;
        card.factor = factor;
        card.due = due;
        card
    }

    #[test]
    fn fuzz_range_tiers() {
        assert_eq!(fuzz_range(0), (1, 1));
        assert_eq!(fuzz_range(1), (1, 1));
        assert_eq!(fuzz_range(2), (2, 3));
        assert_eq!(fuzz_range(4), (3, 5));
        assert_eq!(fuzz_range(10), (8, 12));
        assert_eq!(fuzz_range(20), (17, 23));
        assert_eq!(fuzz_range(100), (95, 105));
        assert_eq!(fuzz_range(40), (36, 44));
    }

    #[test]
    fn fuzzed_interval_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(11);
        for ivl in 1..400 {
            let (lo, hi) = fuzz_range(ivl);
            assert!(lo <= hi && lo >= 1, "range for {ivl} is inverted");
            for _ in 0..5 {
                let got = fuzzed_interval(ivl, &mut rng);
                assert!((lo..=hi).contains(&got), "{got} outside {lo}..={hi}");
            }
        }
    }

    #[test]
    fn constrain_respects_floor_and_ceiling() {
        let mut rng = StdRng::seed_from_u64(3);
        let rev = RevConfig { max_ivl: 50, ..RevConfig::default() };
        for raw in [0.0, 0.4, 3.0, 17.9, 49.0, 80.0, 1e6] {
            for floor in [0, 1, 5, 30] {
                let plain = constrain_interval(raw, &rev, floor, None);
                let fuzzed = constrain_interval(raw, &rev, floor, Some(&mut rng));
                for ivl in [plain, fuzzed] {
                    assert!(ivl >= (floor + 1).max(1));
                    assert!(ivl <= 50);
                }
            }
        }
        let modified = RevConfig { ivl_fct: 0.5, ..RevConfig::default() };
        assert_eq!(constrain_interval(40.0, &modified, 0, None), 20);
    }

    #[test]
    fn review_intervals_on_time() {
        let card = review_card(100, 2500, 10);
        let rev = RevConfig::default();
        assert_eq!(next_review_interval(&card, &rev, Ease::Hard, 10, None), 120);
        assert_eq!(next_review_interval(&card, &rev, Ease::Good, 10, None), 250);
        assert_eq!(next_review_interval(&card, &rev, Ease::Easy, 10, None), 325);
    }

    #[test]
    fn late_reviews_credit_delay() {
        let card = review_card(100, 2500, 10);
        let rev = RevConfig::default();
        assert_eq!(next_review_interval(&card, &rev, Ease::Good, 20, None), 262);
        assert_eq!(next_review_interval(&card, &rev, Ease::Easy, 20, None), 357);
    }

    #[test]
    fn hard_interval_grows_at_least_a_day() {
        let card = review_card(1, 1300, 10);
        let rev = RevConfig::default();
        assert_eq!(next_review_interval(&card, &rev, Ease::Hard, 10, None), 2);
        assert_eq!(next_review_interval(&card, &rev, Ease::Good, 10, None), 3);
        assert_eq!(next_review_interval(&card, &rev, Ease::Easy, 10, None), 4);
    }

    #[test]
    fn early_review_uses_elapsed_days() {
        let mut card = review_card(10, 2500, 0);
        card.original_deck_id = Some(1);
        card.original_due = Some(25);
        let rev = RevConfig::default();
        assert_eq!(early_review_interval(&card, &rev, Ease::Hard, 20), 6);
        assert_eq!(early_review_interval(&card, &rev, Ease::Good, 20), 12);
        assert_eq!(early_review_interval(&card, &rev, Ease::Easy, 20), 14);
    }

    #[test]
    fn graduating_intervals() {
        let new = NewConfig::default();
        let card = Card::new(1, 1, 1, 0);
        assert_eq!(graduating_interval(&card, &new, false, None), 1);
        assert_eq!(graduating_interval(&card, &new, true, None), 4);

        let relearning = {
            let mut c = review_card(7, 2500, 0);
            c.ctype = CardType::Relearning;
            c
        };
        assert_eq!(graduating_interval(&relearning, &new, false, None), 8);
        assert_eq!(graduating_interval(&relearning, &new, true, None), 7);
    }

    #[test]
    fn leech_threshold_and_half_steps() {
        let hits: Vec<u32> = (0..=20).filter(|l| is_leech(*l, 8)).collect();
        assert_eq!(hits, vec![8, 12, 16, 20]);
        assert!(!is_leech(5, 0));
        assert!(is_leech(1, 1) && is_leech(2, 1));
    }

    #[test]
    fn lapse_suspends_leech_and_skips_relearning() {
        let lapse = LapseConfig { leech_fails: 2, ..LapseConfig::default() };
        let mut card = review_card(30, 1400, 0);
        card.lapses = 1;
        let outcome = apply_lapse(&mut card, &lapse);
        assert_eq!(outcome, LapseOutcome { leech: true, suspended: true, relearn: false });
        assert_eq!(card.lapses, 2);
        assert_eq!(card.factor, FACTOR_MIN);
        assert_eq!(card.queue, CardQueue::Suspended);
    }

    #[test]
    fn lapse_interval_floor() {
        let card = review_card(100, 2500, 0);
        let mut lapse = LapseConfig::default();
        assert_eq!(lapse_interval(&card, &lapse), 1);
        lapse.mult = 0.5;
        assert_eq!(lapse_interval(&card, &lapse), 50);
        lapse.mult = 0.0;
        lapse.min_int = 3;
        assert_eq!(lapse_interval(&card, &lapse), 3);
    }

    #[test]
    fn step_delays() {
        let delays = [1.0, 10.0];
        assert_eq!(delay_for_grade(&delays, 2), 60);
        assert_eq!(delay_for_grade(&delays, 1001), 600);
        assert_eq!(delay_for_grade(&delays, 5), 60);
        assert_eq!(delay_for_grade(&[], 1), 60);
        assert_eq!(delay_for_repeating_grade(&delays, 2), 330);
        assert_eq!(delay_for_repeating_grade(&[10.0], 1), 900);
    }

    #[test]
    fn steps_left_today_stop_at_cutoff() {
        let delays = [1.0, 10.0, 60.0];
        assert_eq!(left_today(&delays, 3, 0, 10_000), 3);
        assert_eq!(left_today(&delays, 3, 0, 700), 2);
        assert_eq!(left_today(&delays, 3, 0, 30), 1);
        assert_eq!(starting_left(&delays, 0, 700), 2003);
        assert_eq!(starting_left(&[], 0, 700), 1000);
    }
}
