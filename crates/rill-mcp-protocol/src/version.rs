//! MCP protocol version support.
//!
//! ## Version history
//! - **2024-11-05**: initial specification, HTTP+SSE transport
//! - **2025-03-26**: Streamable HTTP, OAuth 2.1 authorization, tool annotations

use serde::{Deserialize, Serialize};

/// Supported MCP protocol versions, oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProtocolVersion {
    /// Original protocol with the dedicated `/sse` transport
    #[serde(rename = "2024-11-05")]
    V2024_11_05,
    /// Protocol including Streamable HTTP
    #[serde(rename = "2025-03-26")]
    V2025_03_26,
}

impl ProtocolVersion {
    /// All versions this crate implements, in ascending order.
    pub const SUPPORTED: [ProtocolVersion; 2] =
        [ProtocolVersion::V2024_11_05, ProtocolVersion::V2025_03_26];

    /// The version offered when the client proposes nothing we support.
    pub const DEFAULT: ProtocolVersion = ProtocolVersion::V2025_03_26;

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "2024-11-05" => Some(ProtocolVersion::V2024_11_05),
            "2025-03-26" => Some(ProtocolVersion::V2025_03_26),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolVersion::V2024_11_05 => "2024-11-05",
            ProtocolVersion::V2025_03_26 => "2025-03-26",
        }
    }

    /// Negotiate against a client-proposed version string.
    ///
    /// Returns the highest supported version `<=` the proposal. Version
    /// strings are date-shaped, so lexicographic order is date order and
    /// unknown intermediate dates still negotiate correctly. A proposal
    /// older than everything we support falls back to [`Self::DEFAULT`].
    pub fn negotiate(proposed: &str) -> ProtocolVersion {
        Self::SUPPORTED
            .iter()
            .rev()
            .find(|v| v.as_str() <= proposed)
            .copied()
            .unwrap_or(Self::DEFAULT)
    }

    /// Whether this version supports the Streamable HTTP transport.
    pub fn supports_streamable_http(&self) -> bool {
        matches!(self, ProtocolVersion::V2025_03_26)
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(
            ProtocolVersion::parse("2024-11-05"),
            Some(ProtocolVersion::V2024_11_05)
        );
        assert_eq!(
            ProtocolVersion::parse("2025-03-26"),
            Some(ProtocolVersion::V2025_03_26)
        );
        assert_eq!(ProtocolVersion::parse("2019-01-01"), None);
    }

    #[test]
    fn test_negotiate_exact() {
        assert_eq!(
            ProtocolVersion::negotiate("2025-03-26"),
            ProtocolVersion::V2025_03_26
        );
        assert_eq!(
            ProtocolVersion::negotiate("2024-11-05"),
            ProtocolVersion::V2024_11_05
        );
    }

    #[test]
    fn test_negotiate_future_version_caps_to_latest() {
        assert_eq!(
            ProtocolVersion::negotiate("2026-01-01"),
            ProtocolVersion::V2025_03_26
        );
    }

    #[test]
    fn test_negotiate_between_versions_rounds_down() {
        assert_eq!(
            ProtocolVersion::negotiate("2025-01-01"),
            ProtocolVersion::V2024_11_05
        );
    }

    #[test]
    fn test_negotiate_unknown_old_version_uses_default() {
        assert_eq!(ProtocolVersion::negotiate("2023-01-01"), ProtocolVersion::DEFAULT);
    }

    #[test]
    fn test_serde_rename() {
        let v = ProtocolVersion::V2025_03_26;
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"2025-03-26\"");
    }
}
