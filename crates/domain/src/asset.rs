use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata for one stored binary. The bytes live in the asset store;
/// messages and tool outputs reference them by `asset://<id>` URI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: String,
    pub mime_type: String,
    pub byte_len: u64,
    pub created_at: DateTime<Utc>,
}

pub const ASSET_URI_SCHEME: &str = "asset://";

/// Format an asset id as its reference URI.
pub fn asset_uri(id: &str) -> String {
    format!("{ASSET_URI_SCHEME}{id}")
}

/// Extract the asset id from an `asset://<id>` URI, if it is one.
pub fn parse_asset_uri(uri: &str) -> Option<&str> {
    let id = uri.strip_prefix(ASSET_URI_SCHEME)?;
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}
