//! Binary-content normalization.
//!
//! Message parts and tool outputs may carry inline binaries as base64
//! fields or `data:` URLs. When an asset store is configured, each one is
//! saved and replaced by an `asset://` reference; the created-asset list
//! lets the engine emit exactly one `ASSET_CREATED` per new asset.
//! Without a store, binaries stay inline as data URLs.

use std::sync::Arc;

use serde_json::Value;

use cz_domain::asset::{asset_uri, Asset};
use cz_domain::error::Result;
use cz_domain::message::{Attachment, ContentPart, MessageContent};

use crate::{data_url, AssetStore};

/// One asset written during normalization.
#[derive(Debug, Clone)]
pub struct CreatedAsset {
    pub asset: Asset,
    pub ref_uri: String,
    /// Part kind the binary came from: `image`, `audio`, or `file`.
    pub kind: String,
}

/// The outcome of normalizing message content: the flattened text, the
/// attachment entries destined for `metadata.attachments`, and any assets
/// created along the way.
#[derive(Debug, Clone, Default)]
pub struct NormalizedContent {
    pub text: Option<String>,
    pub attachments: Vec<Attachment>,
    pub created: Vec<CreatedAsset>,
}

/// Classify a mime type into an attachment kind.
pub fn kind_for_mime(mime: &str) -> &'static str {
    if mime.starts_with("image/") {
        "image"
    } else if mime.starts_with("audio/") {
        "audio"
    } else {
        "file"
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message content
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Normalize message content. Plain text is the identity; typed parts are
/// flattened into text plus attachments, with binaries moved to the store.
pub async fn normalize_content(
    content: &MessageContent,
    store: Option<&Arc<dyn AssetStore>>,
) -> Result<NormalizedContent> {
    let parts = match content {
        MessageContent::Text(text) => {
            return Ok(NormalizedContent {
                text: Some(text.clone()),
                ..Default::default()
            });
        }
        MessageContent::Parts(parts) => parts,
    };

    let mut text_chunks: Vec<String> = Vec::new();
    let mut attachments = Vec::new();
    let mut created = Vec::new();

    for part in parts {
        match part {
            ContentPart::Text { text } => text_chunks.push(text.clone()),
            // Structured parts have no binary payload; they fold into the
            // message text so agents still see them in history.
            ContentPart::Json { value } => {
                text_chunks.push(serde_json::to_string(value).unwrap_or_default());
            }
            ContentPart::Image {
                data_base64,
                data_url,
                asset_ref,
                mime_type,
            } => {
                let attachment = normalize_binary_part(
                    "image",
                    data_base64.as_deref(),
                    data_url.as_deref(),
                    asset_ref.as_deref(),
                    mime_type.as_deref().unwrap_or("image/png"),
                    None,
                    None,
                    store,
                    &mut created,
                )
                .await?;
                attachments.extend(attachment);
            }
            ContentPart::Audio {
                data_base64,
                data_url,
                asset_ref,
                mime_type,
                format,
            } => {
                let attachment = normalize_binary_part(
                    "audio",
                    data_base64.as_deref(),
                    data_url.as_deref(),
                    asset_ref.as_deref(),
                    mime_type.as_deref().unwrap_or("audio/wav"),
                    format.as_deref(),
                    None,
                    store,
                    &mut created,
                )
                .await?;
                attachments.extend(attachment);
            }
            ContentPart::File {
                data_base64,
                data_url,
                asset_ref,
                mime_type,
                file_name,
            } => {
                let attachment = normalize_binary_part(
                    "file",
                    data_base64.as_deref(),
                    data_url.as_deref(),
                    asset_ref.as_deref(),
                    mime_type.as_deref().unwrap_or("application/octet-stream"),
                    None,
                    file_name.as_deref(),
                    store,
                    &mut created,
                )
                .await?;
                attachments.extend(attachment);
            }
        }
    }

    let text = if text_chunks.is_empty() {
        None
    } else {
        Some(text_chunks.join("\n"))
    };

    Ok(NormalizedContent {
        text,
        attachments,
        created,
    })
}

#[allow(clippy::too_many_arguments)]
async fn normalize_binary_part(
    kind: &str,
    data_base64: Option<&str>,
    data_url_str: Option<&str>,
    asset_ref: Option<&str>,
    default_mime: &str,
    format: Option<&str>,
    file_name: Option<&str>,
    store: Option<&Arc<dyn AssetStore>>,
    created: &mut Vec<CreatedAsset>,
) -> Result<Option<Attachment>> {
    let mut attachment = Attachment {
        kind: kind.to_owned(),
        mime_type: Some(default_mime.to_owned()),
        format: format.map(str::to_owned),
        file_name: file_name.map(str::to_owned),
        asset_ref: None,
        data_url: None,
    };

    // Already a reference: nothing to save.
    if let Some(r) = asset_ref {
        attachment.asset_ref = Some(r.to_owned());
        return Ok(Some(attachment));
    }

    let decoded = if let Some(b64) = data_base64 {
        data_url::from_base64(b64).map(|bytes| (bytes, default_mime.to_owned()))
    } else if let Some(url) = data_url_str {
        data_url::parse(url).map(|d| (d.bytes, d.mime_type))
    } else {
        None
    };

    let Some((bytes, mime)) = decoded else {
        tracing::warn!(kind, "binary part carries no decodable payload; dropped");
        return Ok(None);
    };

    attachment.mime_type = Some(mime.clone());
    match store {
        Some(store) => {
            let asset = store.save(&bytes, &mime).await?;
            let ref_uri = asset_uri(&asset.id);
            attachment.asset_ref = Some(ref_uri.clone());
            created.push(CreatedAsset {
                asset,
                ref_uri,
                kind: kind.to_owned(),
            });
        }
        None => {
            attachment.data_url = Some(data_url::format(&mime, &bytes));
        }
    }

    Ok(Some(attachment))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool outputs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct PendingBinary {
    pointer: String,
    bytes: Vec<u8>,
    mime_type: String,
}

/// Normalize arbitrary tool-output JSON: every `{mimeType, dataBase64}`
/// object, `{dataUrl}` object, or raw data-URL string becomes
/// `{assetRef, mimeType, kind}`. Without a store the value is returned
/// unchanged.
pub async fn normalize_tool_output(
    value: Value,
    store: Option<&Arc<dyn AssetStore>>,
) -> Result<(Value, Vec<CreatedAsset>)> {
    let Some(store) = store else {
        return Ok((value, Vec::new()));
    };

    let mut pending = Vec::new();
    collect_binaries(&value, String::new(), &mut pending);
    if pending.is_empty() {
        return Ok((value, Vec::new()));
    }

    let mut value = value;
    let mut created = Vec::new();
    for binary in pending {
        let asset = store.save(&binary.bytes, &binary.mime_type).await?;
        let ref_uri = asset_uri(&asset.id);
        let kind = kind_for_mime(&binary.mime_type).to_owned();
        if let Some(slot) = value.pointer_mut(&binary.pointer) {
            *slot = serde_json::json!({
                "assetRef": ref_uri,
                "mimeType": binary.mime_type,
                "kind": kind,
            });
        }
        created.push(CreatedAsset {
            asset,
            ref_uri,
            kind,
        });
    }

    Ok((value, created))
}

/// Walk a JSON value collecting binary leaves as (pointer, bytes, mime).
fn collect_binaries(value: &Value, pointer: String, out: &mut Vec<PendingBinary>) {
    match value {
        Value::String(s) if data_url::is_data_url(s) => {
            if let Some(decoded) = data_url::parse(s) {
                out.push(PendingBinary {
                    pointer,
                    bytes: decoded.bytes,
                    mime_type: decoded.mime_type,
                });
            }
        }
        Value::Object(map) => {
            // A binary-shaped object is itself the leaf.
            if let Some(Value::String(b64)) = map.get("dataBase64") {
                if let Some(bytes) = data_url::from_base64(b64) {
                    let mime = map
                        .get("mimeType")
                        .and_then(Value::as_str)
                        .unwrap_or("application/octet-stream")
                        .to_owned();
                    out.push(PendingBinary {
                        pointer,
                        bytes,
                        mime_type: mime,
                    });
                    return;
                }
            }
            if let Some(Value::String(url)) = map.get("dataUrl") {
                if let Some(decoded) = data_url::parse(url) {
                    out.push(PendingBinary {
                        pointer,
                        bytes: decoded.bytes,
                        mime_type: decoded.mime_type,
                    });
                    return;
                }
            }
            for (key, child) in map {
                let escaped = key.replace('~', "~0").replace('/', "~1");
                collect_binaries(child, format!("{pointer}/{escaped}"), out);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                collect_binaries(child, format!("{pointer}/{i}"), out);
            }
        }
        _ => {}
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inline substitution (LLM turns)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fetch an asset as a `data:` URL (images and files in LLM turns).
pub async fn inline_data_url(store: &Arc<dyn AssetStore>, id: &str) -> Result<String> {
    let (asset, bytes) = store.get(id).await?;
    Ok(data_url::format(&asset.mime_type, &bytes))
}

/// Fetch an asset as bare base64 plus its mime type (audio in LLM turns).
pub async fn inline_base64(store: &Arc<dyn AssetStore>, id: &str) -> Result<(String, String)> {
    let (asset, bytes) = store.get(id).await?;
    Ok((data_url::to_base64(&bytes), asset.mime_type))
}
