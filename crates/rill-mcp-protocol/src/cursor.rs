//! Opaque pagination cursors for the `*/list` operations.
//!
//! A cursor encodes the next start offset as URL-safe base64. Clients
//! must treat it as opaque; an undecodable cursor is an invalid-params
//! error, a past-the-end cursor yields an empty page.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::McpError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(pub String);

impl Cursor {
    pub fn from_offset(offset: usize) -> Self {
        Cursor(URL_SAFE_NO_PAD.encode(offset.to_string()))
    }

    pub fn to_offset(&self) -> Result<usize, McpError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(&self.0)
            .map_err(|_| McpError::invalid_params("malformed cursor"))?;
        let text =
            String::from_utf8(bytes).map_err(|_| McpError::invalid_params("malformed cursor"))?;
        text.parse()
            .map_err(|_| McpError::invalid_params("malformed cursor"))
    }
}

/// One page of a listed collection.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<Cursor>,
}

impl<T: Clone> Page<T> {
    /// Slice a page out of the full item set.
    pub fn paginate(items: &[T], cursor: Option<&Cursor>, page_size: usize) -> Result<Self, McpError> {
        let start = match cursor {
            Some(cursor) => cursor.to_offset()?,
            None => 0,
        };

        if start >= items.len() {
            return Ok(Page {
                items: Vec::new(),
                next_cursor: None,
            });
        }

        let end = (start + page_size).min(items.len());
        let next_cursor = (end < items.len()).then(|| Cursor::from_offset(end));

        Ok(Page {
            items: items[start..end].to_vec(),
            next_cursor,
        })
    }
}
