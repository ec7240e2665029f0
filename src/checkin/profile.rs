//! Static per-target behavior profiles.
//!
//! Each target bot has its own markers, keywords and quirks. They are
//! expressed as a data-driven rule table plus a small set of named hook
//! overrides, so adding a target means adding data, not code.

use serde::Deserialize;

/// Named hook overrides for targets that deviate from the common flow.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TargetHooks {
    /// Re-click the last answer message before re-sending the trigger.
    ///
    /// Some targets only accept a fresh trigger after their menu message has
    /// been touched again; the click is best-effort and stale-interaction
    /// failures are swallowed.
    #[serde(default)]
    pub nudge_before_retry: bool,
}

/// Static configuration of one target bot.
///
/// Immutable once a session is created. Markers never match when empty, so a
/// profile that leaves `menu_marker` blank simply never produces answer
/// prompts.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetProfile {
    /// Short identifier, also the answer-history key.
    pub id: String,
    /// Display name for logs; falls back to `id` when blank.
    #[serde(default)]
    pub name: String,
    /// Chat id of the conversation with this bot.
    #[serde(default)]
    pub chat_id: i64,
    /// Command that starts a check-in conversation.
    #[serde(default = "default_trigger")]
    pub trigger: String,
    /// Expected captcha text length; 0 means no expectation.
    #[serde(default)]
    pub captcha_len: usize,
    /// Answer-history window size; 0 disables the history heuristic.
    #[serde(default)]
    pub history_window: usize,
    /// Substrings marking a text message as ignorable.
    #[serde(default)]
    pub ignore_markers: Vec<String>,
    /// Caption substring marking an answer-prompt photo.
    #[serde(default = "default_menu_marker")]
    pub menu_marker: String,
    /// Caption substring marking a captcha photo.
    #[serde(default = "default_captcha_marker")]
    pub captcha_marker: String,
    /// Keywords marking success, in option labels and result texts.
    #[serde(default = "default_success_keywords")]
    pub success_keywords: Vec<String>,
    /// Keywords marking an explicit rejection in result texts.
    #[serde(default = "default_failure_keywords")]
    pub failure_keywords: Vec<String>,
    /// Match keywords case-insensitively.
    #[serde(default)]
    pub case_insensitive: bool,
    /// Courtesy pause range (seconds) before captcha submission.
    #[serde(default = "default_submit_delay")]
    pub submit_delay_secs: (u64, u64),
    /// Hook overrides.
    #[serde(default)]
    pub hooks: TargetHooks,
}

fn default_trigger() -> String {
    "/checkin".to_string()
}

fn default_menu_marker() -> String {
    "签到".to_string()
}

fn default_captcha_marker() -> String {
    "验证码".to_string()
}

fn default_success_keywords() -> Vec<String> {
    vec!["签到成功".to_string(), "已签到".to_string()]
}

fn default_failure_keywords() -> Vec<String> {
    vec!["签到失败".to_string()]
}

const fn default_submit_delay() -> (u64, u64) {
    (5, 10)
}

impl TargetProfile {
    /// Display name for logs.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    fn contains_any(&self, text: &str, keywords: &[String]) -> bool {
        if self.case_insensitive {
            let text = text.to_lowercase();
            keywords
                .iter()
                .any(|k| !k.is_empty() && text.contains(&k.to_lowercase()))
        } else {
            keywords
                .iter()
                .any(|k| !k.is_empty() && text.contains(k.as_str()))
        }
    }

    /// Does an option label match the success-keyword set?
    #[must_use]
    pub fn label_matches_success(&self, label: &str) -> bool {
        self.contains_any(label, &self.success_keywords)
    }

    /// Does a result text report success?
    #[must_use]
    pub fn is_success_text(&self, text: &str) -> bool {
        self.contains_any(text, &self.success_keywords)
    }

    /// Does a result text report an explicit rejection?
    #[must_use]
    pub fn is_failure_text(&self, text: &str) -> bool {
        self.contains_any(text, &self.failure_keywords)
    }

    /// Should a text message be skipped entirely?
    #[must_use]
    pub fn is_ignorable_text(&self, text: &str) -> bool {
        self.contains_any(text, &self.ignore_markers)
    }

    /// Does a photo caption mark an answer prompt?
    #[must_use]
    pub fn matches_menu_marker(&self, caption: &str) -> bool {
        !self.menu_marker.is_empty() && caption.contains(&self.menu_marker)
    }

    /// Does a photo caption mark a captcha prompt?
    #[must_use]
    pub fn matches_captcha_marker(&self, caption: &str) -> bool {
        !self.captcha_marker.is_empty() && caption.contains(&self.captcha_marker)
    }
}

/// Profiles of the known target bots.
///
/// Chat ids are supplied through configuration (`targets.chat_ids`); the
/// entries here carry only the behavioral data.
#[must_use]
pub fn builtin_targets() -> Vec<TargetProfile> {
    vec![
        TargetProfile {
            id: "ljyy".to_string(),
            name: "垃圾影音".to_string(),
            chat_id: 0,
            trigger: default_trigger(),
            captcha_len: 4,
            history_window: 20,
            ignore_markers: vec!["下列选项".to_string()],
            menu_marker: default_menu_marker(),
            captcha_marker: default_captcha_marker(),
            success_keywords: default_success_keywords(),
            failure_keywords: default_failure_keywords(),
            case_insensitive: false,
            submit_delay_secs: default_submit_delay(),
            hooks: TargetHooks {
                nudge_before_retry: true,
            },
        },
        TargetProfile {
            id: "peach".to_string(),
            name: "桃子".to_string(),
            chat_id: 5_457_506_368,
            trigger: "/start".to_string(),
            captcha_len: 0,
            history_window: 0,
            ignore_markers: Vec::new(),
            menu_marker: "欢迎使用".to_string(),
            captcha_marker: "请输入验证码".to_string(),
            success_keywords: default_success_keywords(),
            failure_keywords: default_failure_keywords(),
            case_insensitive: false,
            submit_delay_secs: default_submit_delay(),
            hooks: TargetHooks::default(),
        },
        TargetProfile {
            id: "terminus".to_string(),
            name: "终点站".to_string(),
            chat_id: 0,
            trigger: default_trigger(),
            captcha_len: 0,
            history_window: 0,
            ignore_markers: Vec::new(),
            menu_marker: default_menu_marker(),
            captcha_marker: default_captcha_marker(),
            success_keywords: default_success_keywords(),
            failure_keywords: default_failure_keywords(),
            case_insensitive: false,
            submit_delay_secs: default_submit_delay(),
            hooks: TargetHooks::default(),
        },
        TargetProfile {
            id: "jms".to_string(),
            name: "卷毛鼠".to_string(),
            chat_id: 0,
            trigger: default_trigger(),
            captcha_len: 0,
            history_window: 0,
            ignore_markers: Vec::new(),
            menu_marker: default_menu_marker(),
            captcha_marker: default_captcha_marker(),
            success_keywords: default_success_keywords(),
            failure_keywords: default_failure_keywords(),
            case_insensitive: false,
            submit_delay_secs: default_submit_delay(),
            hooks: TargetHooks::default(),
        },
        TargetProfile {
            id: "nebula".to_string(),
            name: "Nebula".to_string(),
            chat_id: 0,
            trigger: default_trigger(),
            captcha_len: 0,
            history_window: 0,
            ignore_markers: Vec::new(),
            menu_marker: default_menu_marker(),
            captcha_marker: default_captcha_marker(),
            success_keywords: default_success_keywords(),
            failure_keywords: default_failure_keywords(),
            case_insensitive: true,
            submit_delay_secs: default_submit_delay(),
            hooks: TargetHooks::default(),
        },
    ]
}
