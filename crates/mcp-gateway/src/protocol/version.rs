//! Protocol-version negotiation for the `MCP-Protocol-Version` header.

use crate::config::defaults;

/// Outcome of validating the `MCP-Protocol-Version` request header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Negotiation {
    /// Header absent or naming a supported version; carries the effective version.
    Accepted(&'static str),
    /// Header named an unsupported version.
    Rejected { requested: String },
}

/// Validate the raw header value, if any.
///
/// A missing header falls back to the oldest supported revision rather than
/// being rejected, so pre-header clients keep working.
#[must_use]
pub fn negotiate(header: Option<&str>) -> Negotiation {
    match header {
        None => Negotiation::Accepted(defaults::FALLBACK_PROTOCOL_VERSION),
        Some(requested) => defaults::SUPPORTED_PROTOCOL_VERSIONS
            .iter()
            .find(|v| **v == requested)
            .map_or_else(
                || Negotiation::Rejected { requested: requested.to_string() },
                |v| Negotiation::Accepted(v),
            ),
    }
}

/// Error message for a rejected version, listing the supported set.
#[must_use]
pub fn unsupported_message(requested: &str) -> String {
    format!(
        "Unsupported protocol version: {requested}. Supported versions: {}",
        defaults::SUPPORTED_PROTOCOL_VERSIONS.join(", ")
    )
}
