//! Gateway surface for walink: the HTTP send endpoints, the observer
//! WebSocket channel, and the relay that feeds session events to it.
//!
//! All observers connect to `GET /ws` and receive push-only event frames.

pub mod api_error;
pub mod broadcast;
pub mod error;
pub mod extract;
pub mod qr;
pub mod relay;
pub mod send_routes;
pub mod server;
pub mod state;
pub mod ws;

pub use {
    api_error::ApiError,
    error::{Error, Result},
    relay::EventRelay,
    server::{build_gateway_app, start_gateway},
    state::{GatewayOptions, GatewayState, RelaySnapshot},
};
