//! Version lifecycle.
//!
//! - [`manifest`]: precache manifest loading
//! - [`messages`]: inbound control messages and outbound notifications
//! - [`controller`]: install/activate state machine

pub mod controller;
pub mod manifest;
pub mod messages;
