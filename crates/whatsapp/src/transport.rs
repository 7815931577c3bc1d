use {async_trait::async_trait, walink_common::types::DeliveryReceipt};

use crate::{
    error::{Result, SendError},
    types::{OutboundPayload, SendOptions, SessionCredentials},
};

/// The wire to WhatsApp Web.
///
/// Implementations push lifecycle events ([`crate::TransportEvent`]) into the
/// channel handed to them at construction; the methods here are the
/// request side.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start a login, restoring `credentials` when given, otherwise
    /// requesting a fresh code.
    async fn connect(&self, credentials: Option<&SessionCredentials>) -> Result<()>;

    async fn logout(&self) -> Result<()>;

    async fn is_registered(&self, address: &str) -> std::result::Result<bool, SendError>;

    /// Send and wait for the remote acknowledgement.
    async fn send(
        &self,
        to: &str,
        payload: &OutboundPayload,
        options: &SendOptions,
    ) -> std::result::Result<DeliveryReceipt, SendError>;
}
