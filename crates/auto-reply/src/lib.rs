//! Scripted replies to inbound WhatsApp messages.
//!
//! Flow: session `Message` event → exact-match rule lookup → spawned task
//! sends the rule's replies in order, quoting the trigger, stopping at the
//! first failure.

pub mod error;
pub mod reactor;
pub mod rules;

pub use {
    error::{Error, Result},
    reactor::InboundReactor,
    rules::{ReplyRule, RuleTable, default_rules},
};
