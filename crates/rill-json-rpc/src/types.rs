use serde::{Deserialize, Serialize};
use std::fmt;

/// The `jsonrpc` version marker. Only `"2.0"` is representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JsonRpcVersion {
    #[default]
    #[serde(rename = "2.0")]
    V2_0,
}

/// A JSON-RPC request id: a string or an integer.
///
/// The pair (peer, id) must stay unique for the lifetime of a
/// correlation, so ids are hashable and usable as map keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl RequestId {
    /// Whether this id sits in the server-initiated namespace.
    ///
    /// Server→client requests always use string ids with the `srv-`
    /// prefix, keeping them disjoint from client-originated ids.
    pub fn is_server_initiated(&self) -> bool {
        matches!(self, RequestId::String(s) if s.starts_with("srv-"))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId::String(s)
    }
}
