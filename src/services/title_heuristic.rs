use chrono::{DateTime, Utc};
use strsim::levenshtein;

use crate::{config::ReconcileConfig, dao::models::ShowEntity};

/// What a change of the observed title means for the persisted show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleDecision {
    /// Same title as the persisted show.
    Unchanged,
    /// Small edit of the current show's title, or the real title replacing the placeholder.
    Cosmetic,
    /// The placeholder is up and the current show is old enough to be replaced;
    /// wait for the real title before creating anything.
    AwaitingFinalTitle,
    /// A new show would be created but the current one is too recent.
    Held,
    /// A different show has started.
    NewShow,
}

/// Inputs and outcome of one title evaluation, kept together for logging.
#[derive(Debug, Clone, PartialEq)]
pub struct TitleAssessment {
    pub distance_to_placeholder: usize,
    pub distance_to_existing: usize,
    pub hours_since_created: f64,
    pub decision: TitleDecision,
}

/// Fractional hours elapsed between `then` and `now`.
pub fn hours_since(then: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - then).num_milliseconds() as f64 / 3_600_000.0
}

/// Classify `candidate` against the persisted `existing` show.
pub fn assess_title(
    candidate: &str,
    existing: &ShowEntity,
    config: &ReconcileConfig,
    now: DateTime<Utc>,
) -> TitleAssessment {
    let existing_title = existing.title();
    let threshold = config.title_distance_threshold;
    let distance_to_placeholder = levenshtein(candidate, &config.placeholder_title);
    let distance_to_existing = levenshtein(candidate, existing_title);
    let hours_since_created = hours_since(existing.created_at, now);
    let gate_open = hours_since_created > config.new_show_gap_hours;

    let existing_is_placeholder =
        levenshtein(existing_title, &config.placeholder_title) < threshold;
    let far_from_existing = distance_to_existing > threshold;

    let decision = if candidate == existing_title {
        TitleDecision::Unchanged
    } else if !far_from_existing || existing_is_placeholder {
        TitleDecision::Cosmetic
    } else if distance_to_placeholder < threshold {
        if gate_open {
            TitleDecision::AwaitingFinalTitle
        } else {
            TitleDecision::Held
        }
    } else if gate_open {
        TitleDecision::NewShow
    } else {
        TitleDecision::Held
    };

    TitleAssessment {
        distance_to_placeholder,
        distance_to_existing,
        hours_since_created,
        decision,
    }
}
