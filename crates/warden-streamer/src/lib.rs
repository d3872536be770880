//! `warden-streamer` — progressive message-edit streaming (§4.J): consume
//! text deltas and edit a chat message at a fixed interval, chunking into
//! a new message on overflow.
//!
//! Where the original drives a spawned editor task off a shared `stale`
//! flag and an `asyncio.Event` stop signal, this merges both concerns
//! into a single `tokio::select!` loop over the delta stream and an
//! interval timer — one task, no shared mutable state to hand off at
//! shutdown.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};

/// Discord allows ~5 edits per 5 seconds per channel; 500ms gives a
/// responsive feel while staying well under that.
pub const EDIT_INTERVAL: Duration = Duration::from_millis(500);
/// Short initial delay so the first message accumulates a meaningful
/// chunk of text instead of showing a single token.
pub const FIRST_FLUSH_DELAY: Duration = Duration::from_millis(200);
/// Character budget per message before overflowing into a new one.
pub const MAX_MSG_LEN: usize = 2000;
/// Sent when the stream produced no text at all.
pub const NO_RESPONSE_MESSAGE: &str = "hmm, I didn't have a response for that.";

/// Opaque handle to a sent message, returned by [`MessageSink::send`] and
/// fed back into [`MessageSink::edit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHandle(pub u64);

/// The chat-surface operations streaming needs; implemented by
/// `warden-discord`'s channel adapter.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, content: &str) -> MessageHandle;
    async fn edit(&self, handle: MessageHandle, content: &str);
    async fn typing(&self);
}

/// Byte index in `s` at or before which exactly `max_chars` chars fit,
/// so slicing never lands mid-codepoint.
fn char_boundary_at(s: &str, max_chars: usize) -> usize {
    s.char_indices().nth(max_chars).map(|(i, _)| i).unwrap_or(s.len())
}

struct StreamState {
    buf: String,
    msg: Option<MessageHandle>,
    msg_start: usize,
    stale: bool,
}

impl StreamState {
    fn new() -> Self {
        Self {
            buf: String::new(),
            msg: None,
            msg_start: 0,
            stale: false,
        }
    }

    async fn flush(&mut self, sink: &dyn MessageSink) {
        let chunk = &self.buf[self.msg_start..];
        if chunk.is_empty() || !self.stale {
            return;
        }
        let limit = char_boundary_at(chunk, MAX_MSG_LEN);
        match self.msg {
            None => self.msg = Some(sink.send(&chunk[..limit]).await),
            Some(handle) => sink.edit(handle, &chunk[..limit]).await,
        }

        loop {
            let remaining_chars = self.buf[self.msg_start..].chars().count();
            if remaining_chars <= MAX_MSG_LEN {
                break;
            }
            let advance = char_boundary_at(&self.buf[self.msg_start..], MAX_MSG_LEN);
            self.msg_start += advance;
            let remaining = &self.buf[self.msg_start..];
            if !remaining.is_empty() {
                let lim = char_boundary_at(remaining, MAX_MSG_LEN);
                self.msg = Some(sink.send(&remaining[..lim]).await);
            }
        }
        self.stale = false;
    }
}

/// Consume `deltas` and stream them into `sink`, editing at
/// [`EDIT_INTERVAL`] so updates appear even during pauses (e.g. tool
/// execution), chunking into new messages past [`MAX_MSG_LEN`].
pub async fn stream_to_channel<S>(sink: &dyn MessageSink, deltas: S)
where
    S: Stream<Item = String>,
{
    tokio::pin!(deltas);
    let mut state = StreamState::new();

    let first_flush = tokio::time::sleep(FIRST_FLUSH_DELAY);
    tokio::pin!(first_flush);
    let mut started = false;

    loop {
        tokio::select! {
            next = deltas.next() => {
                match next {
                    Some(text) => {
                        state.buf.push_str(&text);
                        state.stale = true;
                    }
                    None => break,
                }
            }
            _ = &mut first_flush, if !started => {
                started = true;
                state.flush(sink).await;
            }
            _ = tokio::time::sleep(EDIT_INTERVAL), if started => {
                if state.stale {
                    state.flush(sink).await;
                } else if state.msg.is_some() {
                    sink.typing().await;
                }
            }
        }
    }

    state.stale = true;
    state.flush(sink).await;

    if state.buf.is_empty() {
        sink.send(NO_RESPONSE_MESSAGE).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio_stream::wrappers::ReceiverStream;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<String>>,
        edited: Mutex<Vec<(MessageHandle, String)>>,
        next_id: Mutex<u64>,
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn send(&self, content: &str) -> MessageHandle {
            self.sent.lock().unwrap().push(content.to_string());
            let mut n = self.next_id.lock().unwrap();
            *n += 1;
            MessageHandle(*n)
        }

        async fn edit(&self, handle: MessageHandle, content: &str) {
            self.edited.lock().unwrap().push((handle, content.to_string()));
        }

        async fn typing(&self) {}
    }

    #[tokio::test]
    async fn empty_stream_sends_fallback_message() {
        let sink = RecordingSink::default();
        let (_tx, rx) = tokio::sync::mpsc::channel::<String>(1);
        stream_to_channel(&sink, ReceiverStream::new(rx)).await;
        assert_eq!(sink.sent.lock().unwrap().as_slice(), [NO_RESPONSE_MESSAGE]);
    }

    #[tokio::test]
    async fn short_response_sends_once_and_never_falls_back() {
        let sink = RecordingSink::default();
        let (tx, rx) = tokio::sync::mpsc::channel::<String>(8);
        tx.send("hello".to_string()).await.unwrap();
        drop(tx);
        stream_to_channel(&sink, ReceiverStream::new(rx)).await;
        let sent = sink.sent.lock().unwrap();
        assert!(sent.iter().any(|s| s.contains("hello")));
        assert!(!sent.iter().any(|s| s == NO_RESPONSE_MESSAGE));
    }

    #[tokio::test]
    async fn overflow_past_max_len_starts_a_new_message() {
        let sink = RecordingSink::default();
        let (tx, rx) = tokio::sync::mpsc::channel::<String>(8);
        let long = "a".repeat(MAX_MSG_LEN + 500);
        tx.send(long).await.unwrap();
        drop(tx);
        stream_to_channel(&sink, ReceiverStream::new(rx)).await;
        let sent = sink.sent.lock().unwrap();
        assert!(sent.len() >= 2, "expected overflow to start a second message, got {sent:?}");
        assert!(sent.iter().all(|s| s.chars().count() <= MAX_MSG_LEN));
    }
}
