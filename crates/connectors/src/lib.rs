//! Platform connector system.
//!
//! Each social platform (Instagram, LinkedIn, TikTok, YouTube, Twitter,
//! Facebook) implements the [`PlatformConnector`] trait: OAuth authorization
//! and code exchange, profile fetch, message fetch, token refresh, and (where
//! the platform has a webhook surface) signature verification and
//! the subscription challenge handshake. Capabilities a platform does not
//! offer report [`error::ConnectorError::NotSupported`] instead of failing
//! in surprising ways.

pub mod config;
pub mod connector;
pub mod error;
pub mod facebook;
mod http;
pub mod instagram;
pub mod linkedin;
pub mod registry;
pub mod tiktok;
pub mod twitter;
pub mod types;
pub mod webhook;
pub mod youtube;

pub use {
    config::{PlatformConfigSet, PlatformOAuthConfig},
    connector::PlatformConnector,
    error::{ConnectorError, Result},
    registry::ConnectorRegistry,
    types::{
        ChallengeParams, InboundMessage, Platform, PlatformMessage, Profile, SyncTarget,
        UnknownPlatform,
    },
};
