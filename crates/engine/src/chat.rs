//! Streaming chat orchestrator.
//!
//! Drives one streaming generation and forwards every frame to a
//! [`ChunkSink`]. Frames are first classified into [`Segment`]s, then
//! [`ThinkMarkers`] serializes them onto the single text channel:
//!
//! ```text
//! [reasoning r1, reasoning r2, answer a1, answer a2]
//!   -> ["<think>r1", "r2", "</think>\na1", "a2"]
//! ```

use async_trait::async_trait;
use ragloom_core::error::{Error, Result, Stage};
use ragloom_core::message::Message;
use ragloom_core::provider::{ModelHandle, StreamChunk, Usage};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cancel::cancellable;

pub const THINK_OPEN: &str = "<think>";
pub const THINK_CLOSE: &str = "</think>\n";

/// What a forwarded chunk carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Reasoning,
    Answer,
}

/// One classified frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Reasoning(String),
    Answer(String),
}

impl Segment {
    /// A frame carrying reasoning content is reasoning, whatever else it has.
    pub fn from_frame(frame: StreamChunk) -> Self {
        match frame.reasoning_content {
            Some(text) => Segment::Reasoning(text),
            None => Segment::Answer(frame.content.unwrap_or_default()),
        }
    }

    pub fn kind(&self) -> ChunkKind {
        match self {
            Segment::Reasoning(_) => ChunkKind::Reasoning,
            Segment::Answer(_) => ChunkKind::Answer,
        }
    }
}

/// Marker state for one stream.
///
/// The opening marker goes on the first reasoning segment. The closing
/// marker goes on the first answer segment after any reasoning, once.
#[derive(Debug, Default)]
pub struct ThinkMarkers {
    reasoning_seen: bool,
    closed: bool,
}

impl ThinkMarkers {
    pub fn render(&mut self, segment: Segment) -> (ChunkKind, String) {
        match segment {
            Segment::Reasoning(text) => {
                if self.reasoning_seen {
                    (ChunkKind::Reasoning, text)
                } else {
                    self.reasoning_seen = true;
                    (ChunkKind::Reasoning, format!("{THINK_OPEN}{text}"))
                }
            }
            Segment::Answer(text) => {
                if self.reasoning_seen && !self.closed {
                    self.closed = true;
                    (ChunkKind::Answer, format!("{THINK_CLOSE}{text}"))
                } else {
                    (ChunkKind::Answer, text)
                }
            }
        }
    }
}

/// A chunk as delivered to a channel or collected in a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatChunk {
    pub kind: ChunkKind,
    pub text: String,
}

/// Receives forwarded chunks. An error aborts the stream.
#[async_trait]
pub trait ChunkSink: Send {
    async fn on_chunk(&mut self, kind: ChunkKind, text: String) -> Result<()>;
}

#[async_trait]
impl ChunkSink for mpsc::Sender<ChatChunk> {
    async fn on_chunk(&mut self, kind: ChunkKind, text: String) -> Result<()> {
        self.send(ChatChunk { kind, text })
            .await
            .map_err(|_| Error::Sink("receiver dropped".into()))
    }
}

#[async_trait]
impl ChunkSink for Vec<ChatChunk> {
    async fn on_chunk(&mut self, kind: ChunkKind, text: String) -> Result<()> {
        self.push(ChatChunk { kind, text });
        Ok(())
    }
}

/// What one stream produced besides the forwarded text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatOutcome {
    /// Usage from the last frame that carried a non-empty record
    pub usage: Usage,
    pub frames: usize,
    pub reasoning_frames: usize,
}

/// Stream one generation into `sink`.
///
/// Frames are forwarded one sink call each, in arrival order. A stream,
/// sink or cancellation error aborts the loop; chunks already delivered
/// stay delivered.
pub async fn stream_chat(
    model: &ModelHandle,
    messages: Vec<Message>,
    sink: &mut dyn ChunkSink,
    cancel: &CancellationToken,
) -> Result<ChatOutcome> {
    let request = model.request(messages, true);
    let mut frames = cancellable(cancel, model.provider().stream(request))
        .await?
        .map_err(|e| Error::from(e).at(Stage::OpenStream))?;

    debug!(provider = model.provider().name(), model = model.model(), "stream opened");

    let mut markers = ThinkMarkers::default();
    let mut outcome = ChatOutcome::default();

    while let Some(frame) = cancellable(cancel, frames.recv()).await? {
        let frame = frame.map_err(|e| Error::from(e).at(Stage::ReadStream))?;

        if let Some(usage) = frame.usage.filter(|u| !u.is_empty()) {
            outcome.usage = usage;
        }

        let segment = Segment::from_frame(frame);
        outcome.frames += 1;
        if segment.kind() == ChunkKind::Reasoning {
            outcome.reasoning_frames += 1;
        }

        let (kind, text) = markers.render(segment);
        cancellable(cancel, sink.on_chunk(kind, text))
            .await?
            .map_err(|e| e.at(Stage::DeliverChunk))?;
    }

    info!(
        model = model.model(),
        frames = outcome.frames,
        reasoning_frames = outcome.reasoning_frames,
        total_tokens = outcome.usage.total_tokens,
        "stream finished"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::StreamingMockProvider;
    use ragloom_core::error::ProviderError;
    use std::sync::Arc;

    fn handle(provider: StreamingMockProvider) -> ModelHandle {
        ModelHandle::new(Arc::new(provider), "mock-model")
    }

    fn texts(chunks: &[ChatChunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    fn usage(total: u32) -> Usage {
        Usage {
            prompt_tokens: total - 1,
            completion_tokens: 1,
            total_tokens: total,
        }
    }

    #[test]
    fn markers_wrap_reasoning_then_answer() {
        let mut m = ThinkMarkers::default();
        let out: Vec<String> = [
            Segment::Reasoning("r1".into()),
            Segment::Reasoning("r2".into()),
            Segment::Answer("a1".into()),
            Segment::Answer("a2".into()),
        ]
        .into_iter()
        .map(|s| m.render(s).1)
        .collect();
        assert_eq!(out, vec!["<think>r1", "r2", "</think>\na1", "a2"]);
    }

    #[test]
    fn closing_marker_is_emitted_once() {
        let mut m = ThinkMarkers::default();
        m.render(Segment::Reasoning("r".into()));
        assert_eq!(m.render(Segment::Answer("a".into())).1, "</think>\na");
        m.render(Segment::Reasoning("late".into()));
        assert_eq!(m.render(Segment::Answer("b".into())).1, "b");
    }

    #[test]
    fn answer_only_has_no_markers() {
        let mut m = ThinkMarkers::default();
        assert_eq!(m.render(Segment::Answer("a".into())), (ChunkKind::Answer, "a".into()));
    }

    #[tokio::test]
    async fn forwards_frames_in_order_with_markers() {
        let model = handle(StreamingMockProvider::frames(vec![
            StreamChunk::reasoning("r1"),
            StreamChunk::reasoning("r2"),
            StreamChunk::answer("a1"),
            StreamChunk::answer("a2"),
        ]));
        let mut sink: Vec<ChatChunk> = Vec::new();

        let outcome = stream_chat(&model, vec![Message::user("q")], &mut sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(texts(&sink), vec!["<think>r1", "r2", "</think>\na1", "a2"]);
        assert_eq!(sink[0].kind, ChunkKind::Reasoning);
        assert_eq!(sink[2].kind, ChunkKind::Answer);
        assert_eq!(outcome.frames, 4);
        assert_eq!(outcome.reasoning_frames, 2);
    }

    #[tokio::test]
    async fn no_reasoning_means_no_markers() {
        let model = handle(StreamingMockProvider::frames(vec![
            StreamChunk::answer("Hello"),
            StreamChunk::answer(", world"),
        ]));
        let mut sink: Vec<ChatChunk> = Vec::new();
        stream_chat(&model, vec![], &mut sink, &CancellationToken::new())
            .await
            .unwrap();
        let joined: String = sink.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(joined, "Hello, world");
        assert!(!joined.contains("<think>") && !joined.contains("</think>"));
    }

    #[tokio::test]
    async fn last_usage_bearing_frame_wins() {
        let model = handle(StreamingMockProvider::frames(vec![
            StreamChunk::answer("a").with_usage(usage(10)),
            StreamChunk::answer("b").with_usage(Usage::default()),
            StreamChunk::answer("c").with_usage(usage(42)),
            StreamChunk::answer("d"),
        ]));
        let mut sink: Vec<ChatChunk> = Vec::new();
        let outcome = stream_chat(&model, vec![], &mut sink, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.usage, usage(42));
    }

    #[tokio::test]
    async fn empty_frames_still_reach_the_sink() {
        let model = handle(StreamingMockProvider::frames(vec![
            StreamChunk::answer("x"),
            StreamChunk {
                done: true,
                ..StreamChunk::default()
            },
        ]));
        let mut sink: Vec<ChatChunk> = Vec::new();
        stream_chat(&model, vec![], &mut sink, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(texts(&sink), vec!["x", ""]);
    }

    #[tokio::test]
    async fn open_failure_produces_no_output() {
        let model = handle(StreamingMockProvider::failing_open(ProviderError::Network(
            "refused".into(),
        )));
        let mut sink: Vec<ChatChunk> = Vec::new();
        let err = stream_chat(&model, vec![], &mut sink, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::OpenStream));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn read_error_keeps_partial_output() {
        let model = handle(StreamingMockProvider::new(vec![
            Ok(StreamChunk::answer("partial")),
            Err(ProviderError::StreamInterrupted("eof".into())),
            Ok(StreamChunk::answer("never")),
        ]));
        let mut sink: Vec<ChatChunk> = Vec::new();
        let err = stream_chat(&model, vec![], &mut sink, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::ReadStream));
        assert_eq!(texts(&sink), vec!["partial"]);
    }

    struct RejectAfter(usize, Vec<String>);

    #[async_trait]
    impl ChunkSink for RejectAfter {
        async fn on_chunk(&mut self, _kind: ChunkKind, text: String) -> Result<()> {
            if self.1.len() == self.0 {
                return Err(Error::Sink("client went away".into()));
            }
            self.1.push(text);
            Ok(())
        }
    }

    #[tokio::test]
    async fn sink_error_aborts_the_stream() {
        let model = handle(StreamingMockProvider::frames(vec![
            StreamChunk::answer("1"),
            StreamChunk::answer("2"),
            StreamChunk::answer("3"),
        ]));
        let mut sink = RejectAfter(1, Vec::new());
        let err = stream_chat(&model, vec![], &mut sink, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::DeliverChunk));
        assert_eq!(sink.1, vec!["1"]);
    }

    #[tokio::test]
    async fn channel_sink_receives_chunks() {
        let model = handle(StreamingMockProvider::frames(vec![
            StreamChunk::reasoning("hmm"),
            StreamChunk::answer("ok"),
        ]));
        let (mut tx, mut rx) = mpsc::channel(8);
        stream_chat(&model, vec![], &mut tx, &CancellationToken::new())
            .await
            .unwrap();
        drop(tx);
        let mut got = Vec::new();
        while let Some(chunk) = rx.recv().await {
            got.push(chunk.text);
        }
        assert_eq!(got, vec!["<think>hmm", "</think>\nok"]);
    }

    #[tokio::test]
    async fn cancellation_aborts_a_hanging_stream() {
        let model = handle(StreamingMockProvider::hanging(vec![StreamChunk::answer("first")]));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let mut sink: Vec<ChatChunk> = Vec::new();

        let run = stream_chat(&model, vec![], &mut sink, &cancel);
        let stop = async move {
            tokio::task::yield_now().await;
            trigger.cancel();
        };
        let (result, _) = tokio::join!(run, stop);

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(texts(&sink), vec!["first"]);
    }
}
