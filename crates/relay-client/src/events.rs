use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Stream, StreamExt};
use relay_core::{EventStatus, OutcomeEvent};
use tokio::sync::mpsc;

use crate::error::RelayClientError;
use crate::types::ListenOutcome;
use crate::Result;

// ─── SSE parsing ──────────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
pub(crate) struct SseFrame {
    pub event: String,
    pub data: String,
}

/// Incremental server-sent-events parser. Frames are terminated by a blank
/// line; chunk boundaries can fall anywhere, so the unterminated tail is
/// buffered between pushes. Comment lines (keep-alives) are ignored.
#[derive(Default)]
pub(crate) struct SseParser {
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut frames = Vec::new();
        while let Some(end) = self.buffer.find("\n\n") {
            let raw: String = self.buffer.drain(..end + 2).collect();
            if let Some(frame) = parse_frame(&raw) {
                frames.push(frame);
            }
        }
        frames
    }
}

fn parse_frame(raw: &str) -> Option<SseFrame> {
    let mut event = String::from("message");
    let mut data_lines = Vec::new();

    for line in raw.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            event = rest.trim_start().to_string();
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.trim_start().to_string());
        }
    }

    if data_lines.is_empty() {
        return None;
    }
    Some(SseFrame {
        event,
        data: data_lines.join("\n"),
    })
}

// ─── EventStream ──────────────────────────────────────────────────────────

/// An async stream of [`OutcomeEvent`]s from a subscribe connection.
///
/// Backed by a Tokio mpsc channel. A background task owns the HTTP response
/// and forwards parsed `outcome` frames until the first one arrives (the
/// server emits at most one terminal event per subscription). Dropping
/// `EventStream` closes the receiver and aborts the connection — this is
/// the unconditional unsubscribe the listener contract requires.
pub struct EventStream {
    rx: mpsc::Receiver<Result<OutcomeEvent>>,
}

impl EventStream {
    pub(crate) fn open(response: reqwest::Response) -> Self {
        let (tx, rx) = mpsc::channel(8);

        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut parser = SseParser::new();

            while let Some(chunk) = bytes.next().await {
                // Receiver dropped: unsubscribe by letting the response go.
                if tx.is_closed() {
                    return;
                }
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.send(Err(RelayClientError::Http(e))).await;
                        return;
                    }
                };
                for frame in parser.push(&chunk) {
                    if frame.event != "outcome" {
                        continue;
                    }
                    let parsed = serde_json::from_str::<OutcomeEvent>(&frame.data).map_err(|e| {
                        RelayClientError::Parse {
                            data: frame.data.clone(),
                            source: e,
                        }
                    });
                    let _ = tx.send(parsed).await;
                    // One terminal event per subscription.
                    return;
                }
            }
        });

        EventStream { rx }
    }

    /// Test-only constructor: wrap a raw mpsc receiver as an `EventStream`.
    #[cfg(test)]
    pub(crate) fn from_channel(rx: mpsc::Receiver<Result<OutcomeEvent>>) -> Self {
        Self { rx }
    }

    /// Await exactly one terminal event or the local timeout, whichever
    /// comes first. Consumes the stream: both paths unsubscribe.
    ///
    /// `TimedOut` means "unknown outcome, check back later" — the action
    /// may well still complete in the worker.
    pub async fn await_terminal(mut self, timeout: Duration) -> Result<ListenOutcome> {
        match tokio::time::timeout(timeout, self.next()).await {
            Err(_elapsed) => Ok(ListenOutcome::TimedOut),
            Ok(None) => Err(RelayClientError::ClosedWithoutEvent),
            Ok(Some(event)) => Ok(event?.into()),
        }
    }
}

impl Stream for EventStream {
    type Item = Result<OutcomeEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl From<OutcomeEvent> for ListenOutcome {
    fn from(event: OutcomeEvent) -> Self {
        match event.status {
            EventStatus::Success => ListenOutcome::Success(event.result_payload),
            EventStatus::Error => {
                let reason = event
                    .result_payload
                    .as_ref()
                    .and_then(|v| v.get("message"))
                    .and_then(|m| m.as_str())
                    .unwrap_or("worker reported failure")
                    .to_string();
                ListenOutcome::Failure {
                    reason,
                    result: event.result_payload,
                }
            }
            EventStatus::Timeout => ListenOutcome::TimedOut,
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::Outcome;

    #[test]
    fn parser_extracts_a_complete_frame() {
        let mut parser = SseParser::new();
        let frames = parser.push(b"event: outcome\ndata: {\"status\":\"success\"}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event, "outcome");
        assert_eq!(frames[0].data, "{\"status\":\"success\"}");
    }

    #[test]
    fn parser_buffers_across_chunk_boundaries() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"event: outcome\nda").is_empty());
        let frames = parser.push(b"ta: {\"status\":\"error\"}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "{\"status\":\"error\"}");
    }

    #[test]
    fn parser_ignores_keepalive_comments() {
        let mut parser = SseParser::new();
        assert!(parser.push(b":keep-alive\n\n").is_empty());
        let frames = parser.push(b": ping\n\nevent: outcome\ndata: {}\n\n");
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn parser_joins_multiple_data_lines() {
        let mut parser = SseParser::new();
        let frames = parser.push(b"data: line1\ndata: line2\n\n");
        assert_eq!(frames[0].data, "line1\nline2");
        assert_eq!(frames[0].event, "message");
    }

    #[test]
    fn parser_yields_multiple_frames_from_one_chunk() {
        let mut parser = SseParser::new();
        let frames = parser.push(b"data: a\n\ndata: b\n\n");
        assert_eq!(frames.len(), 2);
    }

    #[tokio::test]
    async fn await_terminal_resolves_success() {
        let (tx, rx) = mpsc::channel(1);
        tx.send(Ok(OutcomeEvent::from_outcome(
            Outcome::Success,
            Some(serde_json::json!({"sent": true})),
        )))
        .await
        .unwrap();

        let outcome = EventStream::from_channel(rx)
            .await_terminal(Duration::from_secs(1))
            .await
            .unwrap();
        match outcome {
            ListenOutcome::Success(Some(result)) => assert_eq!(result["sent"], true),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn await_terminal_maps_error_events_to_failure() {
        let (tx, rx) = mpsc::channel(1);
        tx.send(Ok(OutcomeEvent::from_outcome(
            Outcome::Error,
            Some(serde_json::json!({"message": "SMTP refused"})),
        )))
        .await
        .unwrap();

        let outcome = EventStream::from_channel(rx)
            .await_terminal(Duration::from_secs(1))
            .await
            .unwrap();
        match outcome {
            ListenOutcome::Failure { reason, .. } => assert_eq!(reason, "SMTP refused"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn await_terminal_times_out_locally() {
        let (tx, rx) = mpsc::channel::<Result<OutcomeEvent>>(1);
        // Hold the sender open so the stream stays pending.
        let outcome = EventStream::from_channel(rx)
            .await_terminal(Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(outcome, ListenOutcome::TimedOut);
        drop(tx);
    }

    #[tokio::test]
    async fn await_terminal_surfaces_synthetic_timeout_events() {
        let (tx, rx) = mpsc::channel(1);
        tx.send(Ok(OutcomeEvent::timed_out())).await.unwrap();
        let outcome = EventStream::from_channel(rx)
            .await_terminal(Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(outcome, ListenOutcome::TimedOut);
    }

    #[tokio::test]
    async fn closed_stream_without_event_is_an_error() {
        let (tx, rx) = mpsc::channel::<Result<OutcomeEvent>>(1);
        drop(tx);
        let err = EventStream::from_channel(rx)
            .await_terminal(Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayClientError::ClosedWithoutEvent));
    }
}
