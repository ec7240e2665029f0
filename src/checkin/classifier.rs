//! Inbound message classification.
//!
//! A pure, rule-ordered function from message content to a set of semantic
//! categories. The rules are target-specific data ([`TargetProfile`]); the
//! caller suppresses categories it has already handled for the same message
//! via the `ignore` set, which keeps duplicate delivery idempotent.

use super::profile::TargetProfile;
use crate::transport::MessageContent;
use std::collections::HashSet;

/// Semantic category of one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// An answer prompt carrying selectable options.
    Answer,
    /// A captcha challenge image.
    Captcha,
    /// Plain text (for photos, the caption).
    Text,
}

/// Classify one inbound message against a target's rule set.
///
/// Rule order, first match wins:
/// 1. a photo whose caption carries the menu marker AND that has selectable
///    options is an answer prompt — choices win even when an image is
///    attached;
/// 2. otherwise a photo whose caption carries the captcha marker is a
///    captcha prompt;
/// 3. everything else is text.
///
/// Unmatched content yields the empty set; this function never fails.
#[must_use]
pub fn classify(
    profile: &TargetProfile,
    content: &MessageContent,
    ignore: &HashSet<Category>,
) -> Vec<Category> {
    let mut tags = Vec::new();
    match content {
        MessageContent::Photo {
            caption, options, ..
        } => {
            if profile.matches_menu_marker(caption) && !options.is_empty() {
                if !ignore.contains(&Category::Answer) {
                    tags.push(Category::Answer);
                }
            } else if profile.matches_captcha_marker(caption) {
                if !ignore.contains(&Category::Captcha) {
                    tags.push(Category::Captcha);
                }
            } else if !ignore.contains(&Category::Text) {
                tags.push(Category::Text);
            }
        }
        MessageContent::Text { .. } => {
            if !ignore.contains(&Category::Text) {
                tags.push(Category::Text);
            }
        }
    }
    tags
}
