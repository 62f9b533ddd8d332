//! `<tool_calls>` stream filtering and response parsing.
//!
//! The filter is a two-state machine (`outside` / `inside` a block) with
//! a hold-back buffer so a tag split across stream chunks is still
//! caught. Visible output is emitted only while outside; the caller
//! accumulates the raw response separately for parsing.

use cz_domain::message::ToolCallDescriptor;

const OPEN_TAG: &str = "<tool_calls>";
const CLOSE_TAG: &str = "</tool_calls>";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming filter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct ToolCallFilter {
    inside: bool,
    pending: String,
}

impl ToolCallFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns the text that became visible.
    pub fn feed(&mut self, chunk: &str) -> String {
        self.pending.push_str(chunk);
        let mut visible = String::new();

        loop {
            if self.inside {
                match self.pending.find(CLOSE_TAG) {
                    Some(pos) => {
                        self.pending.drain(..pos + CLOSE_TAG.len());
                        self.inside = false;
                    }
                    None => {
                        // Drop consumed block content, holding back any
                        // suffix that could be the start of the close tag.
                        let keep = partial_tag_suffix(&self.pending, CLOSE_TAG);
                        let drop_len = self.pending.len() - keep;
                        self.pending.drain(..drop_len);
                        break;
                    }
                }
            } else {
                match self.pending.find(OPEN_TAG) {
                    Some(pos) => {
                        visible.push_str(&self.pending[..pos]);
                        self.pending.drain(..pos + OPEN_TAG.len());
                        self.inside = true;
                    }
                    None => {
                        let keep = partial_tag_suffix(&self.pending, OPEN_TAG);
                        let emit_len = self.pending.len() - keep;
                        visible.push_str(&self.pending[..emit_len]);
                        self.pending.drain(..emit_len);
                        break;
                    }
                }
            }
        }

        visible
    }

    /// Flush at stream end. A held-back partial tag that never completed
    /// is ordinary text; content inside an unclosed block stays hidden
    /// (the block is malformed and handled by the parser).
    pub fn finish(&mut self) -> String {
        if self.inside {
            self.pending.clear();
            String::new()
        } else {
            std::mem::take(&mut self.pending)
        }
    }
}

/// Length of the longest proper prefix of `tag` that `s` ends with.
fn partial_tag_suffix(s: &str, tag: &str) -> usize {
    let max = s.len().min(tag.len() - 1);
    for k in (1..=max).rev() {
        if s.ends_with(&tag[..k]) {
            return k;
        }
    }
    0
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug)]
pub struct ParsedResponse {
    /// The raw response with `<tool_calls>` blocks elided — byte-for-byte
    /// what the streaming filter emitted as tokens.
    pub visible: String,
    pub tool_calls: Vec<ToolCallDescriptor>,
    /// Set when a block was unclosed or carried malformed JSON; in that
    /// case `tool_calls` is empty.
    pub parse_error: Option<String>,
}

/// Parse an accumulated raw response into visible text plus tool calls.
pub fn parse_response(raw: &str) -> ParsedResponse {
    let mut filter = ToolCallFilter::new();
    let mut visible = filter.feed(raw);
    visible.push_str(&filter.finish());

    let mut tool_calls = Vec::new();
    let mut parse_error = None;
    let mut rest = raw;
    let mut index = 0usize;

    while let Some(start) = rest.find(OPEN_TAG) {
        let after = &rest[start + OPEN_TAG.len()..];
        match after.find(CLOSE_TAG) {
            Some(end) => {
                if let Err(e) = parse_block(&after[..end], &mut index, &mut tool_calls) {
                    parse_error = Some(e);
                }
                rest = &after[end + CLOSE_TAG.len()..];
            }
            None => {
                parse_error = Some("unclosed <tool_calls> block at end of response".into());
                break;
            }
        }
    }

    if parse_error.is_some() {
        tool_calls.clear();
    }

    ParsedResponse {
        visible,
        tool_calls,
        parse_error,
    }
}

/// Parse one block body: concatenated/newline-separated JSON objects of
/// the form `{"function":{"name":..., "arguments":...}}`. Arguments may
/// be a JSON-encoded string (the protocol) or a bare object (models do
/// this); both are accepted. Missing ids get `<name>_<index>`.
fn parse_block(
    block: &str,
    index: &mut usize,
    out: &mut Vec<ToolCallDescriptor>,
) -> Result<(), String> {
    let stream = serde_json::Deserializer::from_str(block).into_iter::<serde_json::Value>();
    for value in stream {
        let value = value.map_err(|e| format!("malformed tool call JSON: {e}"))?;
        let function = value
            .get("function")
            .ok_or_else(|| "tool call object is missing 'function'".to_owned())?;
        let name = function
            .get("name")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| "tool call is missing 'function.name'".to_owned())?
            .to_owned();
        let arguments = match function.get("arguments") {
            None | Some(serde_json::Value::Null) => "{}".to_owned(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };
        let id = value
            .get("id")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| format!("{name}_{index}"));

        out.push(ToolCallDescriptor {
            id: Some(id),
            function: cz_domain::message::FunctionCall { name, arguments },
        });
        *index += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(chunks: &[&str]) -> String {
        let mut filter = ToolCallFilter::new();
        let mut visible = String::new();
        for chunk in chunks {
            visible.push_str(&filter.feed(chunk));
        }
        visible.push_str(&filter.finish());
        visible
    }

    #[test]
    fn passes_plain_text_through() {
        assert_eq!(feed_all(&["hello ", "world"]), "hello world");
    }

    #[test]
    fn elides_a_block_within_one_chunk() {
        let raw = "Sure.<tool_calls>{\"function\":{\"name\":\"wait\",\"arguments\":\"{}\"}}</tool_calls> Done.";
        assert_eq!(feed_all(&[raw]), "Sure. Done.");
    }

    #[test]
    fn catches_tags_split_across_chunks() {
        let visible = feed_all(&[
            "Before <tool",
            "_calls>{\"function\":{\"name\":\"x\",\"arguments\":\"{}\"}}</tool_c",
            "alls> after",
        ]);
        assert_eq!(visible, "Before  after");
    }

    #[test]
    fn partial_tag_that_never_completes_is_visible() {
        assert_eq!(feed_all(&["less-than <tool", "box"]), "less-than <toolbox");
    }

    #[test]
    fn unclosed_block_content_stays_hidden() {
        assert_eq!(feed_all(&["say <tool_calls>{\"oops\""]), "say ");
    }

    #[test]
    fn parse_extracts_calls_and_assigns_ids() {
        let raw = concat!(
            "Checking.\n<tool_calls>\n",
            "{\"function\":{\"name\":\"get_current_time\",\"arguments\":\"{}\"}}\n",
            "{\"function\":{\"name\":\"wait\",\"arguments\":\"{\\\"ms\\\":5}\"}}\n",
            "</tool_calls>",
        );
        let parsed = parse_response(raw);
        assert_eq!(parsed.visible.trim(), "Checking.");
        assert!(parsed.parse_error.is_none());
        assert_eq!(parsed.tool_calls.len(), 2);
        assert_eq!(parsed.tool_calls[0].id.as_deref(), Some("get_current_time_0"));
        assert_eq!(parsed.tool_calls[1].id.as_deref(), Some("wait_1"));
        assert_eq!(parsed.tool_calls[1].function.arguments, "{\"ms\":5}");
    }

    #[test]
    fn parse_accepts_object_arguments() {
        let raw = "<tool_calls>{\"function\":{\"name\":\"wait\",\"arguments\":{\"ms\":5}}}</tool_calls>";
        let parsed = parse_response(raw);
        assert_eq!(parsed.tool_calls[0].function.arguments, "{\"ms\":5}");
    }

    #[test]
    fn malformed_block_clears_calls_and_sets_error() {
        let raw = "hi <tool_calls>{not json}</tool_calls>";
        let parsed = parse_response(raw);
        assert!(parsed.tool_calls.is_empty());
        assert!(parsed.parse_error.is_some());
        assert_eq!(parsed.visible, "hi ");
    }

    #[test]
    fn unclosed_block_is_a_parse_error() {
        let parsed = parse_response("text <tool_calls>{\"function\":");
        assert!(parsed.parse_error.is_some());
        assert_eq!(parsed.visible, "text ");
    }

    #[test]
    fn multiple_blocks_accumulate() {
        let raw = concat!(
            "<tool_calls>{\"function\":{\"name\":\"a\",\"arguments\":\"{}\"}}</tool_calls>",
            " middle ",
            "<tool_calls>{\"function\":{\"name\":\"b\",\"arguments\":\"{}\"}}</tool_calls>",
        );
        let parsed = parse_response(raw);
        assert_eq!(parsed.visible, " middle ");
        assert_eq!(parsed.tool_calls.len(), 2);
        assert_eq!(parsed.tool_calls[1].id.as_deref(), Some("b_1"));
    }
}
