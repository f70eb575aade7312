//! Shared SSE streaming infrastructure for provider adapters.
//!
//! Receive a `reqwest::Response`, buffer chunks, split on `\n\n`, extract
//! `data:` payloads, and feed each payload to an adapter-specific parser
//! that returns `Vec<Result<StreamEvent>>`.

use crate::util::from_reqwest;
use acre_domain::error::Result;
use acre_domain::stream::{BoxStream, FinishReason, StreamEvent};

/// Extract complete `data:` payloads from an SSE buffer.
///
/// SSE events are delimited by `\n\n`. Each event block may contain
/// `event:`, `data:`, `id:`, or `retry:` lines; only `data:` matters here.
/// The buffer is drained in place, leaving any trailing partial event for
/// the next call.
pub(crate) fn drain_data_lines(buffer: &mut String) -> Vec<String> {
    let mut data_lines = Vec::new();

    while let Some(pos) = buffer.find("\n\n") {
        let block: String = buffer.drain(..pos).collect();
        buffer.drain(..2);

        for line in block.lines() {
            let line = line.trim();
            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() {
                    data_lines.push(data.to_string());
                }
            }
        }
    }

    data_lines
}

/// Build a [`BoxStream`] from an SSE `reqwest::Response` and an
/// adapter-specific parser closure.
///
/// `FnMut` because tool-call assembly needs mutable state across calls.
/// The stream buffers chunks, drains complete SSE events, flushes the
/// remaining buffer when the body closes, and emits a fallback `Done` if
/// the parser never produced one.
pub(crate) fn sse_response_stream<F>(
    response: reqwest::Response,
    mut parse_data: F,
) -> BoxStream<'static, Result<StreamEvent>>
where
    F: FnMut(&str) -> Vec<Result<StreamEvent>> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer = String::new();
        let mut done_emitted = false;

        loop {
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));

                    for data in drain_data_lines(&mut buffer) {
                        for event in parse_data(&data) {
                            if matches!(&event, Ok(StreamEvent::Done { .. })) {
                                done_emitted = true;
                            }
                            yield event;
                        }
                    }
                }
                Ok(None) => {
                    // Body closed — flush whatever remains in the buffer.
                    if !buffer.trim().is_empty() {
                        let leftover = std::mem::take(&mut buffer);
                        for line in leftover.lines() {
                            if let Some(data) = line.trim().strip_prefix("data:") {
                                for event in parse_data(data.trim()) {
                                    if matches!(&event, Ok(StreamEvent::Done { .. })) {
                                        done_emitted = true;
                                    }
                                    yield event;
                                }
                            }
                        }
                    }
                    break;
                }
                Err(e) => {
                    yield Err(from_reqwest(e));
                    break;
                }
            }
        }

        if !done_emitted {
            yield Ok(StreamEvent::Done {
                finish_reason: FinishReason::Other,
                usage: None,
            });
        }
    };

    Box::pin(stream)
}
