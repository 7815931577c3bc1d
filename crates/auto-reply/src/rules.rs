//! The trigger → replies table.

use std::collections::HashMap;

use {
    walink_common::types::{MediaDescriptor, ReplyPayload},
    walink_config::{ReplyConfig, ReplyRuleConfig},
};

use crate::error::{Error, Result};

/// One trigger and the replies it fires, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyRule {
    pub trigger: String,
    pub replies: Vec<ReplyPayload>,
}

impl ReplyRule {
    pub fn new(trigger: impl Into<String>, replies: Vec<ReplyPayload>) -> Self {
        Self {
            trigger: trigger.into(),
            replies,
        }
    }
}

impl From<&ReplyRuleConfig> for ReplyRule {
    fn from(cfg: &ReplyRuleConfig) -> Self {
        let replies = cfg
            .replies
            .iter()
            .map(|r| match r {
                ReplyConfig::Text(text) => ReplyPayload::text(text.as_str()),
                ReplyConfig::File(path) => ReplyPayload::Media(MediaDescriptor::local(path)),
            })
            .collect();
        Self::new(cfg.trigger.as_str(), replies)
    }
}

/// Immutable lookup table, matched on the exact message text
/// (case-sensitive, no trimming).
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: HashMap<String, Vec<ReplyPayload>>,
}

impl RuleTable {
    pub fn new(rules: impl IntoIterator<Item = ReplyRule>) -> Result<Self> {
        let mut table = HashMap::new();
        for rule in rules {
            if rule.trigger.is_empty() {
                return Err(Error::EmptyTrigger);
            }
            if table.contains_key(&rule.trigger) {
                return Err(Error::DuplicateTrigger(rule.trigger));
            }
            table.insert(rule.trigger, rule.replies);
        }
        Ok(Self { rules: table })
    }

    pub fn from_config(rules: &[ReplyRuleConfig]) -> Result<Self> {
        Self::new(rules.iter().map(ReplyRule::from))
    }

    pub fn lookup(&self, text: &str) -> Option<&[ReplyPayload]> {
        self.rules.get(text).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// The stock menu bot rules. File replies are relative to the media
/// directory.
pub fn default_rules() -> Vec<ReplyRule> {
    let text = |s: &str| ReplyPayload::text(s);
    let file = |name: &str| ReplyPayload::Media(MediaDescriptor::local(name));

    vec![
        ReplyRule::new("P", vec![text("Assalamualaikum. Ga jawab dosa")]),
        ReplyRule::new("Waalaikum salam", vec![text("Cakep")]),
        ReplyRule::new("Gambar", vec![file("image.png")]),
        ReplyRule::new("File", vec![file("whatsapp bot.txt")]),
        ReplyRule::new("Doc", vec![file("desain web.docx")]),
        ReplyRule::new("Start", vec![
            text("Selamat datang di Whatsapp Bot by Development Patur"),
            text("Ketik kata-kata berikut : "),
            text("1. P"),
            text("2. Waalaikum salam"),
            text("3. Gambar"),
            text("4. File"),
            text("5. Doc"),
        ]),
    ]
}
