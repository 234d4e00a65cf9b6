//! Webhook signature verification and the Meta messaging envelope.
//!
//! Signatures are HMAC-SHA256 over the **raw request bytes**, never over a
//! re-serialized payload, which would break on key ordering or whitespace.

use {
    hmac::{Hmac, Mac},
    serde::Deserialize,
    sha2::Sha256,
    tracing::{debug, warn},
};

use crate::{
    error::{ConnectorError, Result},
    types::{ChallengeParams, InboundMessage, PlatformMessage},
};

type HmacSha256 = Hmac<Sha256>;

/// Verify a `{prefix}<hex>` signature header against the raw body.
///
/// Comparison goes through `Mac::verify_slice`, which is constant-time.
pub(crate) fn verify_hmac_hex(
    body: &[u8],
    signature_header: &str,
    prefix: &str,
    secret: &str,
) -> bool {
    let Some(hex_sig) = signature_header.strip_prefix(prefix) else {
        warn!(prefix, "invalid signature header format");
        return false;
    };
    let Ok(provided) = hex::decode(hex_sig) else {
        warn!("signature header is not hex");
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        warn!("failed to create HMAC");
        return false;
    };
    mac.update(body);
    mac.verify_slice(&provided).is_ok()
}

/// HMAC-SHA256 of `data`, hex-encoded (LinkedIn's challenge response).
pub(crate) fn hmac_hex(secret: &str, data: &[u8]) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

/// Meta webhook subscription handshake: echo `hub.challenge` iff
/// `hub.mode` is "subscribe" and the verify token matches ours.
pub(crate) fn meta_subscription_challenge(
    params: &ChallengeParams,
    expected_token: &str,
) -> Option<String> {
    let mode = params.mode.as_deref()?;
    let token = params.verify_token.as_deref()?;
    let challenge = params.challenge.as_deref()?;

    if mode == "subscribe" && token == expected_token {
        Some(challenge.to_string())
    } else {
        None
    }
}

// ── Meta messaging envelope ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct MetaEnvelope {
    #[serde(default)]
    entry: Vec<MetaEntry>,
}

#[derive(Debug, Deserialize)]
struct MetaEntry {
    /// The recipient account's id on the platform.
    id: String,
    #[serde(default)]
    messaging: Vec<MetaMessaging>,
}

#[derive(Debug, Deserialize)]
struct MetaMessaging {
    sender: MetaParty,
    #[serde(default)]
    timestamp: i64,
    message: Option<MetaMessage>,
}

#[derive(Debug, Deserialize)]
struct MetaParty {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MetaMessage {
    mid: String,
    #[serde(default)]
    text: String,
}

/// Decode a Meta (Instagram/Facebook) messaging webhook into typed events.
/// Non-message changes (reads, reactions, delivery receipts) are skipped.
pub(crate) fn decode_meta_messaging(payload: &[u8]) -> Result<Vec<InboundMessage>> {
    let envelope: MetaEnvelope = serde_json::from_slice(payload)
        .map_err(|e| ConnectorError::malformed_payload(e))?;

    let mut events = Vec::new();
    for entry in envelope.entry {
        for item in entry.messaging {
            let Some(message) = item.message else {
                debug!(recipient = %entry.id, "skipping non-message webhook change");
                continue;
            };
            events.push(InboundMessage {
                recipient_platform_id: entry.id.clone(),
                message: PlatformMessage {
                    platform_message_id: message.mid,
                    sender_id: item.sender.id,
                    sender_name: None,
                    text: message.text,
                    sent_at_ms: item.timestamp,
                },
            });
        }
    }
    Ok(events)
}
