use std::sync::Arc;

use {
    async_trait::async_trait,
    tracing::{debug, info, warn},
    walink_common::types::ReplyPayload,
    walink_media::MediaResolver,
    walink_whatsapp::{
        ChatSession, InboundMessage, OutboundPayload, SendOptions, SessionEvent,
        SessionEventHandler,
    },
};

use crate::{error::Result, rules::RuleTable};

/// Applies the rule table to inbound messages.
#[derive(Clone)]
pub struct InboundReactor {
    session: Arc<dyn ChatSession>,
    resolver: Arc<MediaResolver>,
    rules: Arc<RuleTable>,
}

impl InboundReactor {
    pub fn new(
        session: Arc<dyn ChatSession>,
        resolver: Arc<MediaResolver>,
        rules: RuleTable,
    ) -> Self {
        Self {
            session,
            resolver,
            rules: Arc::new(rules),
        }
    }

    /// Send the replies of the matching rule, if any, and return how many
    /// went out. The first failure aborts the remaining replies.
    pub async fn react(&self, msg: &InboundMessage) -> Result<usize> {
        let Some(replies) = self.rules.lookup(&msg.body) else {
            return Ok(0);
        };

        info!(
            chat = %msg.chat,
            trigger = %msg.body,
            replies = replies.len(),
            "auto-reply rule matched"
        );

        for (sent, reply) in replies.iter().enumerate() {
            if let Err(e) = self.send_one(msg, reply).await {
                warn!(
                    chat = %msg.chat,
                    trigger = %msg.body,
                    sent,
                    skipped = replies.len() - sent - 1,
                    error = %e,
                    "auto-reply failed, dropping the remaining replies"
                );
                return Err(e);
            }
        }
        Ok(replies.len())
    }

    async fn send_one(&self, msg: &InboundMessage, reply: &ReplyPayload) -> Result<()> {
        let payload = match reply {
            ReplyPayload::Text(text) => OutboundPayload::Text(text.clone()),
            ReplyPayload::Media(descriptor) => {
                OutboundPayload::Media(self.resolver.resolve(descriptor).await?)
            },
        };
        let options = SendOptions {
            caption: None,
            quoted_message_id: Some(msg.id.clone()),
        };
        self.session.send(&msg.chat, payload, options).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionEventHandler for InboundReactor {
    async fn handle(&self, event: &SessionEvent) {
        let SessionEvent::Message(msg) = event else {
            return;
        };
        if msg.from_me {
            return;
        }
        if self.rules.lookup(&msg.body).is_none() {
            debug!(chat = %msg.chat, "no auto-reply rule for message");
            return;
        }

        // Sends wait for acknowledgements; keep them off the event worker.
        let reactor = self.clone();
        let msg = msg.clone();
        tokio::spawn(async move {
            let _ = reactor.react(&msg).await;
        });
    }
}
