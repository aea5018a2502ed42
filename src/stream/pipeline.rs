use bytes::Bytes;
use serde_json::Value;

use super::frame::{classify, Frame, DATA_PREFIX};
use super::lines::{LineReassembler, Lines};
use super::splice::{ReasoningMode, ReasoningSplicer};

const FRAME_SEPARATOR: &[u8] = b"\n\n";

/// Per-stream transform: reassemble lines, classify them, splice reasoning and
/// re-encode the frames that survive.
///
/// Owns both the reassembly tail and the splice state of exactly one stream.
#[derive(Debug)]
pub struct FramePipeline {
    lines: LineReassembler,
    splicer: ReasoningSplicer,
    scratch: Lines,
    terminated: bool,
}

impl FramePipeline {
    #[must_use]
    pub fn new(mode: ReasoningMode) -> Self {
        Self {
            lines: LineReassembler::new(),
            splicer: ReasoningSplicer::new(mode),
            scratch: Lines::new(),
            terminated: false,
        }
    }

    /// Process one upstream chunk, appending encoded downstream frames to `out`
    /// in input order.
    ///
    /// Once the terminal frame has been emitted every later line is ignored, so
    /// the terminal frame is always the last one written.
    pub fn push_chunk<O>(&mut self, chunk: &[u8], out: &mut O)
    where
        O: Extend<Bytes>,
    {
        if self.terminated {
            return;
        }
        self.lines.feed_into(chunk, &mut self.scratch);
        for line in self.scratch.drain(..) {
            if self.terminated {
                break;
            }
            match classify(&line) {
                Frame::Data(mut record) => {
                    if self.splicer.rewrite_record(&mut record) {
                        if let Some(frame) = encode_data_frame(&record) {
                            out.extend(Some(frame));
                        }
                    } else {
                        out.extend(Some(verbatim_frame(&line)));
                    }
                }
                Frame::Terminal => {
                    out.extend(Some(verbatim_frame(&line)));
                    self.terminated = true;
                }
                Frame::Ignorable => {}
            }
        }
        if self.terminated {
            self.lines.discard();
        }
    }

    /// Whether the terminal frame has been emitted.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Length of the unterminated tail currently buffered.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.lines.pending().len()
    }

    /// Drop buffered state without flushing it.
    pub fn discard(&mut self) {
        self.lines.discard();
    }

    #[must_use]
    pub fn splicer(&self) -> &ReasoningSplicer {
        &self.splicer
    }
}

fn encode_data_frame(record: &Value) -> Option<Bytes> {
    let mut out = Vec::with_capacity(128);
    out.extend_from_slice(DATA_PREFIX);
    if let Err(err) = serde_json::to_writer(&mut out, record) {
        tracing::debug!(error = %err, "failed to encode rewritten data frame");
        return None;
    }
    out.extend_from_slice(FRAME_SEPARATOR);
    Some(Bytes::from(out))
}

fn verbatim_frame(line: &[u8]) -> Bytes {
    let mut out = Vec::with_capacity(line.len() + FRAME_SEPARATOR.len());
    out.extend_from_slice(line);
    out.extend_from_slice(FRAME_SEPARATOR);
    Bytes::from(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::splice::{SpliceState, CLOSE_DELIMITER, OPEN_DELIMITER};

    fn run_chunks(chunks: &[&[u8]]) -> Vec<Bytes> {
        let mut pipeline = FramePipeline::new(ReasoningMode::Splice);
        let mut out = Vec::new();
        for chunk in chunks {
            pipeline.push_chunk(chunk, &mut out);
        }
        out
    }

    fn visible_text(frames: &[Bytes]) -> String {
        frames
            .iter()
            .filter_map(|frame| {
                let line = frame.strip_suffix(FRAME_SEPARATOR)?;
                match classify(line) {
                    Frame::Data(record) => record["choices"][0]["delta"]["content"]
                        .as_str()
                        .map(str::to_owned),
                    _ => None,
                }
            })
            .collect()
    }

    #[test]
    fn test_fragmented_reasoning_stream() {
        let frames = run_chunks(&[
            b"dat".as_slice(),
            b"a: {\"choices\":[{\"delta\":{\"reasoning_content\":\"he",
            b"llo\"}}]}\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\"world\"}}]}\n",
            b"data: [DONE]\n",
        ]);
        assert_eq!(frames.len(), 3);
        assert_eq!(
            visible_text(&frames),
            format!("{OPEN_DELIMITER}hello{CLOSE_DELIMITER}world")
        );
        assert_eq!(frames[2], Bytes::from_static(b"data: [DONE]\n\n"));
    }

    #[test]
    fn test_reasoning_field_removed_from_output() {
        let frames = run_chunks(&[
            b"data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"x\",\"content\":null}}]}\n".as_slice(),
        ]);
        let line = frames[0].strip_suffix(FRAME_SEPARATOR).unwrap();
        let Frame::Data(record) = classify(line) else {
            panic!("expected data frame");
        };
        assert!(record["choices"][0]["delta"].get("reasoning_content").is_none());
    }

    #[test]
    fn test_untouched_frames_are_forwarded_verbatim() {
        let line = b"data: {\"id\":\"c1\",\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}],\"usage\":{\"total_tokens\":9}}";
        let mut chunk = line.to_vec();
        chunk.push(b'\n');
        let frames = run_chunks(&[chunk.as_slice()]);
        let mut expected = line.to_vec();
        expected.extend_from_slice(b"\n\n");
        assert_eq!(frames, vec![Bytes::from(expected)]);
    }

    #[test]
    fn test_ignorable_lines_are_dropped() {
        let frames = run_chunks(&[
            b": keep-alive\n\nevent: ping\ndata: {broken\n[DONE]\n".as_slice(),
        ]);
        assert!(frames.is_empty());
    }

    #[test]
    fn test_terminal_is_last_frame() {
        let frames = run_chunks(&[
            b"data: [DONE]\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n".as_slice(),
            b"data: {\"choices\":[{\"delta\":{\"content\":\"later\"}}]}\n",
        ]);
        assert_eq!(frames, vec![Bytes::from_static(b"data: [DONE]\n\n")]);
    }

    #[test]
    fn test_stream_ending_open_passes_terminal_through() {
        let mut pipeline = FramePipeline::new(ReasoningMode::Splice);
        let mut frames = Vec::new();
        pipeline.push_chunk(
            b"data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"unfinished\"}}]}\ndata: [DONE]\n",
            &mut frames,
        );
        assert_eq!(visible_text(&frames), format!("{OPEN_DELIMITER}unfinished"));
        assert_eq!(frames.last().unwrap().as_ref(), b"data: [DONE]\n\n");
        assert_eq!(pipeline.splicer().state(), SpliceState::Open);
        assert!(pipeline.is_terminated());
    }

    #[test]
    fn test_partition_invariance_of_output() {
        let stream: &[u8] = b"data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n\
data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"th\xc3\xa9\"}}]}\n\n\
data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"ory\"}}]}\n\n\
data: {\"choices\":[{\"delta\":{\"content\":\"ans\"}}]}\n\n\
data: {\"choices\":[{\"delta\":{\"content\":\"wer\"}}]}\n\n\
data: [DONE]\n\n";
        let expected = run_chunks(&[stream]);
        assert_eq!(
            visible_text(&expected),
            format!("{OPEN_DELIMITER}théory{CLOSE_DELIMITER}answer")
        );
        for split in 0..=stream.len() {
            let (head, tail) = stream.split_at(split);
            assert_eq!(run_chunks(&[head, tail]), expected, "split at {split}");
        }
    }

    #[test]
    fn test_pending_tail_is_tracked_and_discarded() {
        let mut pipeline = FramePipeline::new(ReasoningMode::Splice);
        let mut frames: Vec<Bytes> = Vec::new();
        pipeline.push_chunk(b"data: {\"choices\":", &mut frames);
        assert!(frames.is_empty());
        assert_eq!(pipeline.pending_len(), 17);
        pipeline.discard();
        assert_eq!(pipeline.pending_len(), 0);
    }
}
