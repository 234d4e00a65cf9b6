//! OAuth state tokens and token material shared across platform connectors.
//!
//! The state codec closes the loop between "start OAuth" and the provider's
//! redirect back to us: an HMAC-signed, time-boxed token that binds the
//! callback to the user and platform that initiated the flow.

pub mod error;
pub mod state;
pub mod types;

pub use {
    error::StateError,
    state::{STATE_FRESHNESS_MS, StateClaims, StateCodec},
    types::{TokenGrant, serialize_option_secret, serialize_secret},
};
