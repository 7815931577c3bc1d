//! Outbound dispatch: one entry point for text and every media source.

use std::sync::Arc;

use {
    tracing::{debug, info, warn},
    walink_common::types::{DeliveryReceipt, MediaDescriptor},
    walink_media::MediaResolver,
};

use crate::{
    address::normalize_address,
    error::{DispatchError, SendError},
    session::ChatSession,
    types::{OutboundPayload, SendOptions},
};

/// What to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundContent {
    Text(String),
    Media(MediaDescriptor),
}

/// A send request as it arrives from the HTTP surface or the reactor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    /// Destination as given by the caller; normalized during dispatch.
    pub to: String,
    pub content: OutboundContent,
    pub caption: Option<String>,
    pub quoted_message_id: Option<String>,
}

impl OutboundRequest {
    pub fn text(to: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            content: OutboundContent::Text(text.into()),
            caption: None,
            quoted_message_id: None,
        }
    }

    pub fn media(to: impl Into<String>, media: MediaDescriptor) -> Self {
        Self {
            to: to.into(),
            content: OutboundContent::Media(media),
            caption: None,
            quoted_message_id: None,
        }
    }

    /// Blank captions are dropped.
    pub fn with_caption(mut self, caption: Option<String>) -> Self {
        self.caption = caption.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn quoting(mut self, message_id: impl Into<String>) -> Self {
        self.quoted_message_id = Some(message_id.into());
        self
    }
}

/// Knobs of the dispatch algorithm.
#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    /// Country calling code used to normalize local numbers.
    pub country_code: String,
    /// Also check registration before media sends (always done for text).
    pub check_registration_for_media: bool,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            country_code: "62".into(),
            check_registration_for_media: true,
        }
    }
}

pub struct OutboundDispatcher {
    session: Arc<dyn ChatSession>,
    resolver: Arc<MediaResolver>,
    policy: DispatchPolicy,
}

impl OutboundDispatcher {
    pub fn new(
        session: Arc<dyn ChatSession>,
        resolver: Arc<MediaResolver>,
        policy: DispatchPolicy,
    ) -> Self {
        Self {
            session,
            resolver,
            policy,
        }
    }

    pub fn policy(&self) -> &DispatchPolicy {
        &self.policy
    }

    /// Normalize, check registration, resolve media, send.
    ///
    /// No retries: a failed send is reported as is.
    pub async fn dispatch(
        &self,
        request: OutboundRequest,
    ) -> Result<DeliveryReceipt, DispatchError> {
        let to = normalize_address(&request.to, &self.policy.country_code)?;

        let check = match request.content {
            OutboundContent::Text(_) => true,
            OutboundContent::Media(_) => self.policy.check_registration_for_media,
        };
        if check && !self.session.is_registered(&to).await? {
            info!(to, "destination is not registered");
            return Err(SendError::UnregisteredDestination { to }.into());
        }

        let payload = match request.content {
            OutboundContent::Text(text) => OutboundPayload::Text(text),
            OutboundContent::Media(descriptor) => {
                let media = self.resolver.resolve(&descriptor).await.map_err(|e| {
                    warn!(to, kind = descriptor.kind(), error = %e, "failed to resolve media");
                    DispatchError::from(e)
                })?;
                OutboundPayload::Media(media)
            },
        };

        let options = SendOptions {
            caption: request.caption,
            quoted_message_id: request.quoted_message_id,
        };
        let receipt = self
            .session
            .send(&to, payload, options)
            .await
            .inspect_err(|e| warn!(to, error = %e, "send failed"))?;
        debug!(to, id = %receipt.id, "message sent");
        Ok(receipt)
    }
}
