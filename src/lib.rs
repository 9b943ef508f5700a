//! callrelay is a WebRTC signaling relay.
//!
//! Clients connect over WebSocket, receive a relay-assigned session id and
//! exchange call-setup messages (SDP offers and answers, ICE candidates,
//! hang-ups, peer discovery) addressed by that id. The relay only routes;
//! it never inspects signaling payloads and keeps no call state.
//!
//! It provides one binary:
//! - `relay_server`: runs the relay until `quit` is typed on stdin.

/// Handles configuration loading and management.
pub mod config;
/// Logging utilities for the relay.
pub mod log;
/// Relay server: wire protocol, session table, routing and transport.
pub mod signaling;
