//! Events pushed to a chat client, and the sink the chat model writes into.
//!
//! A chat response is one [`ChatEvent::Sources`], any number of
//! [`ChatEvent::Token`]s, then exactly one terminal event: [`ChatEvent::Done`]
//! or [`ChatEvent::Error`]. The channel is bounded, so a slow client slows the
//! producer down; dropping the receiver is the cancellation signal.

use serde::Serialize;
use tokio::sync::mpsc;

/// Capacity of the per-request event channel.
pub const EVENT_BUFFER: usize = 64;

/// One retrieved context item, as shown to the client before the answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRef {
    pub id: i64,
    pub date: String,
    pub preview: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    Sources(Vec<SourceRef>),
    Token(String),
    Done,
    Error { message: String },
}

impl ChatEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error { .. })
    }
}

/// Producer half of a chat event stream.
#[derive(Debug, Clone)]
pub struct TokenSink {
    tx: mpsc::Sender<ChatEvent>,
}

impl TokenSink {
    pub fn new(tx: mpsc::Sender<ChatEvent>) -> Self {
        Self { tx }
    }

    /// Push one token. Returns `false` once the consumer has gone away.
    pub async fn send_token(&self, token: impl Into<String>) -> bool {
        self.tx.send(ChatEvent::Token(token.into())).await.is_ok()
    }

    /// Push any event. Returns `false` once the consumer has gone away.
    pub async fn send(&self, event: ChatEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    /// Resolves when the consumer drops its receiver.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Escape CR and LF so a token can travel in a single SSE `data:` line.
pub fn escape_token(token: &str) -> String {
    token.replace('\n', "\\n").replace('\r', "\\r")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newlines_are_escaped() {
        assert_eq!(escape_token("a\nb\r\nc"), "a\\nb\\r\\nc");
        assert_eq!(escape_token("plain"), "plain");
    }

    #[test]
    fn only_done_and_error_are_terminal() {
        assert!(ChatEvent::Done.is_terminal());
        assert!(ChatEvent::Error {
            message: "x".into()
        }
        .is_terminal());
        assert!(!ChatEvent::Token("t".into()).is_terminal());
        assert!(!ChatEvent::Sources(vec![]).is_terminal());
    }

    #[tokio::test]
    async fn sink_reports_closed_consumer() {
        let (tx, rx) = mpsc::channel(1);
        let sink = TokenSink::new(tx);
        drop(rx);
        sink.closed().await;
        assert!(!sink.send_token("late").await);
    }
}
