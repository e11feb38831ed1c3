use super::{CardConfig, SchedulerSession};
use crate::intervals::{
    delay_for_grade, delay_for_repeating_grade, early_review_interval, graduating_interval, lapse_interval,
    next_review_interval, starting_left, LearningStepSource,
};
use crate::{Card, CardQueue, CoreError, Ease, SECS_PER_DAY};

const SECS_PER_MONTH: f64 = 30.0 * 86_400.0;
const SECS_PER_YEAR: f64 = 365.0 * 86_400.0;

/// Short span for answer buttons: `45s`, `10m`, `3h`, `4d`, `1.5mo`, `2y`.
pub fn format_interval(secs: i64) -> String {
    let abs = secs.unsigned_abs() as f64;
    let secs = secs as f64;
    if abs < 60.0 {
        format!("{}s", secs.round())
    } else if abs < 3_600.0 {
        format!("{}m", (secs / 60.0).round())
    } else if abs < 86_400.0 {
        format!("{}h", (secs / 3_600.0).round())
    } else if abs < SECS_PER_MONTH {
        format!("{}d", (secs / 86_400.0).round())
    } else if abs < SECS_PER_YEAR {
        format!("{}mo", one_decimal(secs / SECS_PER_MONTH))
    } else {
        format!("{}y", one_decimal(secs / SECS_PER_YEAR))
    }
}

fn one_decimal(value: f64) -> String {
    let text = format!("{value:.1}");
    text.strip_suffix(".0").map(str::to_string).unwrap_or(text)
}

impl SchedulerSession {
    /// Number of answer buttons to offer for `card`.
    pub async fn answer_buttons(&self, card: &Card) -> Result<u8, CoreError> {
        let config = self.card_config(card).await?;
        Ok(if config.is_preview() { 2 } else { 4 })
    }

    /// Seconds until `card` would be due again if answered with `ease`. Fuzz is not applied.
    pub fn next_interval(&self, card: &Card, ease: Ease, config: &CardConfig) -> i64 {
        if config.is_preview() {
            return if ease == Ease::Wrong {
                config.preview_delay_secs()
            } else {
                0
            };
        }
        match card.queue {
            CardQueue::New | CardQueue::Learning | CardQueue::DayLearning => {
                self.next_learning_interval(card, ease, config)
            }
            _ if ease == Ease::Wrong => {
                let lapse = &config.deck_config.lapse;
                match lapse.delays.first() {
                    Some(minutes) => (f64::from(*minutes) * 60.0) as i64,
                    None => i64::from(lapse_interval(card, lapse)) * SECS_PER_DAY,
                }
            }
            _ => {
                let rev = &config.deck_config.rev;
                let early = card.in_filtered_deck()
                    && card.original_due.is_some_and(|due| due > i64::from(self.today()));
                let days = if early {
                    early_review_interval(card, rev, ease, self.today())
                } else {
                    next_review_interval(card, rev, ease, self.today(), None)
                };
                i64::from(days) * SECS_PER_DAY
            }
        }
    }

    fn next_learning_interval(&self, card: &Card, ease: Ease, config: &CardConfig) -> i64 {
        let mut card = card.clone();
        let delays = LearningStepSource::for_card(&card, &config.deck_config).delays();
        if card.queue == CardQueue::New {
            card.left = starting_left(delays, self.now(), self.day_cutoff());
        }
        let new = &config.deck_config.new;
        match ease {
            Ease::Wrong => delay_for_grade(delays, delays.len() as u32),
            Ease::Hard => delay_for_repeating_grade(delays, card.left),
            Ease::Easy => i64::from(graduating_interval(&card, new, true, None)) * SECS_PER_DAY,
            Ease::Good if card.left % 1000 <= 1 => {
                i64::from(graduating_interval(&card, new, false, None)) * SECS_PER_DAY
            }
            Ease::Good => delay_for_grade(delays, card.left % 1000 - 1),
        }
    }

    /// Human readable form of [`next_interval`](Self::next_interval); `(end)` when
    /// the card leaves the session.
    pub fn next_interval_string(&self, card: &Card, ease: Ease, config: &CardConfig) -> String {
        let secs = self.next_interval(card, ease, config);
        if secs == 0 {
            return "(end)".to_string();
        }
        let text = format_interval(secs);
        if secs < i64::from(self.config().collapse_time) {
            format!("<{text}")
        } else {
            text
        }
    }
}
