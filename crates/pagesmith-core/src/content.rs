//! Page builder content and the equality check used for dirty tracking.
//!
//! Content is a JSON tree of typed blocks produced by the visual editor. This
//! crate never interprets it; it only needs to know whether two trees are the
//! same document so redundant saves can be skipped.
//!
//! ## Canonical Shape
//!
//! ```text
//! {
//!   "content": [ { "type": "Heading", "props": { ... } }, ... ],
//!   "root":    { "props": { ... } },
//!   "zones":   { ... }
//! }
//! ```
//!
//! Documents written by older editor versions may omit `content`, `root` or
//! `zones`, or carry `null` in their place. Those are treated as the empty
//! equivalents before comparing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Opaque page builder document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageContent(Value);

impl Default for PageContent {
    fn default() -> Self {
        Self(json!({ "content": [], "root": { "props": {} } }))
    }
}

impl PageContent {
    /// Wrap a raw JSON value.
    #[must_use]
    pub const fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// Content holding the given blocks and an empty root.
    #[must_use]
    pub fn from_blocks(blocks: Vec<Value>) -> Self {
        Self(json!({ "content": blocks, "root": { "props": {} } }))
    }

    /// Borrow the underlying JSON.
    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consume into the underlying JSON.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Number of top-level blocks, zero when the shape is unrecognized.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.0
            .get("content")
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }
}

impl From<Value> for PageContent {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Reasons a document could not be brought into canonical shape.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ShapeError {
    NotADocument,
    ContentNotArray,
    RootNotObject,
    ZonesNotObject,
}

fn normalize(value: &Value) -> Result<Value, ShapeError> {
    let mut map = match value {
        Value::Object(map) => map.clone(),
        // Bare block list from very old drafts.
        Value::Array(blocks) => {
            let mut map = Map::new();
            map.insert("content".to_string(), Value::Array(blocks.clone()));
            map
        },
        _ => return Err(ShapeError::NotADocument),
    };

    match map.get("content") {
        None | Some(Value::Null) => {
            map.insert("content".to_string(), Value::Array(Vec::new()));
        },
        Some(Value::Array(_)) => {},
        Some(_) => return Err(ShapeError::ContentNotArray),
    }

    let mut root = match map.remove("root") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(root)) => root,
        Some(_) => return Err(ShapeError::RootNotObject),
    };
    match root.get("props") {
        None | Some(Value::Null) => {
            root.insert("props".to_string(), Value::Object(Map::new()));
        },
        Some(_) => {},
    }
    map.insert("root".to_string(), Value::Object(root));

    match map.get("zones") {
        None | Some(Value::Null) => {
            map.insert("zones".to_string(), Value::Object(Map::new()));
        },
        Some(Value::Object(_)) => {},
        Some(_) => return Err(ShapeError::ZonesNotObject),
    }

    Ok(Value::Object(map))
}

fn is_nullish(content: Option<&PageContent>) -> bool {
    content.is_none_or(|c| c.0.is_null())
}

/// Structural equality of two content documents.
///
/// Missing or `null` documents are equal only to each other. Block order
/// matters. A document that cannot be normalized compares unequal to
/// everything (including itself by value) so a change is never dropped.
///
/// ```rust
/// use pagesmith_core::content::{contents_equal, PageContent};
/// use serde_json::json;
///
/// let a = PageContent::from_value(json!({ "content": [] }));
/// let b = PageContent::from_value(json!({ "content": [], "root": { "props": {} } }));
/// assert!(contents_equal(Some(&a), Some(&b)));
/// assert!(!contents_equal(Some(&a), None));
/// ```
#[must_use]
pub fn contents_equal(a: Option<&PageContent>, b: Option<&PageContent>) -> bool {
    if let (Some(a), Some(b)) = (a, b) {
        if std::ptr::eq(a, b) {
            return true;
        }
    }

    match (is_nullish(a), is_nullish(b)) {
        (true, true) => return true,
        (true, false) | (false, true) => return false,
        (false, false) => {},
    }

    let (Some(a), Some(b)) = (a, b) else {
        return false;
    };

    match (normalize(&a.0), normalize(&b.0)) {
        (Ok(left), Ok(right)) => left == right,
        (left, right) => {
            tracing::debug!(
                left = ?left.err(),
                right = ?right.err(),
                "content normalization failed; treating as changed"
            );
            false
        },
    }
}
