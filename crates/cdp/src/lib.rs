//! Chrome DevTools Protocol transport client over WebSocket.
//!
//! One persistent duplex connection multiplexes many concurrent commands:
//! each outgoing command gets a monotonically increasing identifier, and
//! the matching inbound response settles exactly that call. Frames with a
//! method but no identifier are notifications and fan out to subscribers.
//! A `sessionId` routing tag, obtained by attaching to a target, lets one
//! connection address multiple remote targets; the client forwards it
//! opaquely and never inspects it.
//!
//! There is no automatic reconnection: recovery is the caller composing
//! `webpilot_task::retry` around a fresh [`CdpClient::connect`].

mod client;
mod target;
mod wire;

pub use client::{CallTimeout, CdpClient, ConnectOptions, SendOptions};
