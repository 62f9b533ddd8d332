//! Minimal `data:` URL codec.
//!
//! Handles the shapes that arrive in message parts and tool outputs:
//! `data:<mime>;base64,<payload>` and the rare non-base64
//! `data:<mime>,<payload>` form.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedDataUrl {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Quick shape check, cheap enough to run on every string in a tool
/// output walk.
pub fn is_data_url(s: &str) -> bool {
    s.starts_with("data:") && s.contains(',')
}

/// Decode a `data:` URL. Returns `None` for anything malformed rather
/// than erroring — callers leave undecodable strings untouched.
pub fn parse(url: &str) -> Option<DecodedDataUrl> {
    let rest = url.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;

    let mut mime_type = "text/plain";
    let mut is_base64 = false;
    for (i, piece) in meta.split(';').enumerate() {
        if i == 0 && !piece.is_empty() {
            mime_type = piece;
        } else if piece.eq_ignore_ascii_case("base64") {
            is_base64 = true;
        }
    }

    let bytes = if is_base64 {
        BASE64.decode(payload.trim()).ok()?
    } else {
        payload.as_bytes().to_vec()
    };

    Some(DecodedDataUrl {
        mime_type: mime_type.to_owned(),
        bytes,
    })
}

/// Encode bytes as a base64 `data:` URL.
pub fn format(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{mime_type};base64,{}", BASE64.encode(bytes))
}

/// Base64-encode without the URL wrapper (audio turns want bare base64).
pub fn to_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decode bare base64 content.
pub fn from_base64(data: &str) -> Option<Vec<u8>> {
    BASE64.decode(data.trim()).ok()
}
