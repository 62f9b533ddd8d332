//! Shared SSE streaming plumbing.
//!
//! OpenAI-compatible endpoints stream `data:` events delimited by blank
//! lines, ending with the `[DONE]` sentinel. This module buffers raw
//! chunks, drains complete event payloads, and feeds each to an
//! adapter-supplied parser that yields zero or more text chunks.

use cz_domain::error::Error;
use cz_domain::stream::TokenStream;

/// Drain complete `data:` payloads from an SSE buffer in place. A
/// trailing partial event stays in the buffer for the next call.
pub(crate) fn drain_data_payloads(buffer: &mut String) -> Vec<String> {
    let mut payloads = Vec::new();

    while let Some(pos) = buffer.find("\n\n") {
        let block: String = buffer.drain(..pos + 2).collect();
        for line in block.lines() {
            if let Some(data) = line.trim().strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() {
                    payloads.push(data.to_owned());
                }
            }
        }
    }

    payloads
}

/// Build a token stream from an SSE `reqwest::Response` and a parser
/// closure mapping each `data:` payload to text chunks. The parser
/// returns `None` once it sees the terminal sentinel.
pub(crate) fn sse_token_stream<F>(response: reqwest::Response, mut parse: F) -> TokenStream
where
    F: FnMut(&str) -> Option<Vec<String>> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer = String::new();

        'outer: loop {
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));
                    for payload in drain_data_payloads(&mut buffer) {
                        match parse(&payload) {
                            Some(chunks) => {
                                for chunk in chunks {
                                    yield Ok(chunk);
                                }
                            }
                            None => break 'outer,
                        }
                    }
                }
                Ok(None) => {
                    // Body closed; flush any trailing partial event.
                    if !buffer.trim().is_empty() {
                        buffer.push_str("\n\n");
                        for payload in drain_data_payloads(&mut buffer) {
                            if let Some(chunks) = parse(&payload) {
                                for chunk in chunks {
                                    yield Ok(chunk);
                                }
                            }
                        }
                    }
                    break;
                }
                Err(e) => {
                    yield Err(Error::Http(e.to_string()));
                    break;
                }
            }
        }
    };

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_complete_events_and_keeps_partials() {
        let mut buf = String::from("event: m\ndata: one\n\ndata: two\n\ndata: part");
        let payloads = drain_data_payloads(&mut buf);
        assert_eq!(payloads, vec!["one", "two"]);
        assert_eq!(buf, "data: part");

        buf.push_str("ial\n\n");
        assert_eq!(drain_data_payloads(&mut buf), vec!["partial"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn skips_empty_and_non_data_lines() {
        let mut buf = String::from("id: 1\nretry: 100\ndata: \n\ndata: [DONE]\n\n");
        assert_eq!(drain_data_payloads(&mut buf), vec!["[DONE]"]);
    }
}
