//! Answer option selection.
//!
//! Picks the option to click on an answer prompt: success keywords first,
//! then the most-recently-successful historical label, otherwise nothing —
//! the session retries rather than guess.

use super::history::AnswerHistory;
use super::profile::TargetProfile;
use crate::transport::AnswerOption;
use tracing::debug;

/// Select the option to click, if any.
///
/// Labels are matched in presentation order against the target's
/// success-keyword set; the first match wins. When nothing matches and the
/// target has a history window configured, the most recent historically
/// successful label that is present among the options is used instead.
#[must_use]
pub fn select<'a>(
    profile: &TargetProfile,
    options: &'a [AnswerOption],
    history: &AnswerHistory,
) -> Option<&'a AnswerOption> {
    if let Some(hit) = options
        .iter()
        .find(|o| profile.label_matches_success(&o.label))
    {
        return Some(hit);
    }

    if profile.history_window > 0 {
        for label in history.recent_successes() {
            if let Some(hit) = options.iter().find(|o| o.label == label) {
                debug!(
                    bot = %profile.display_name(),
                    label = %hit.label,
                    "no keyword match, falling back to historical answer"
                );
                return Some(hit);
            }
        }
    }

    None
}
