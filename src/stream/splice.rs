//! Reasoning splice: folds the hidden `reasoning_content` delta field into the
//! visible `content` field, bracketing each contiguous reasoning run with
//! [`OPEN_DELIMITER`] and [`CLOSE_DELIMITER`].
//!
//! The bracket state lives in [`ReasoningSplicer`], one instance per stream.
//! A stream that ends while a run is open leaves the opening delimiter
//! unmatched; the terminal frame never forces a close.

use serde_json::{Map, Value};

pub const OPEN_DELIMITER: &str = "<think>\n";
pub const CLOSE_DELIMITER: &str = "\n</think>\n\n";

pub const REASONING_FIELD: &str = "reasoning_content";
pub const CONTENT_FIELD: &str = "content";

const DELTA_POINTER: &str = "/choices/0/delta";

/// Whether a reasoning run is currently bracketed open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpliceState {
    #[default]
    Closed,
    Open,
}

/// What to do with the reasoning field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReasoningMode {
    /// Splice reasoning into the visible content.
    #[default]
    Splice,
    /// Drop reasoning, leave content untouched.
    Strip,
}

impl ReasoningMode {
    #[must_use]
    pub fn from_show_reasoning(show_reasoning: bool) -> Self {
        if show_reasoning {
            Self::Splice
        } else {
            Self::Strip
        }
    }
}

/// The splice-relevant fragments of one delta. `None` means absent (or JSON
/// `null`), which is distinct from an empty string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delta<'a> {
    pub reasoning: Option<&'a str>,
    pub visible: Option<&'a str>,
}

impl<'a> Delta<'a> {
    #[must_use]
    pub fn reasoning(text: &'a str) -> Self {
        Self {
            reasoning: Some(text),
            visible: None,
        }
    }

    #[must_use]
    pub fn visible(text: &'a str) -> Self {
        Self {
            reasoning: None,
            visible: Some(text),
        }
    }

    #[must_use]
    pub fn from_object(object: &'a Map<String, Value>) -> Self {
        Self {
            reasoning: object.get(REASONING_FIELD).and_then(Value::as_str),
            visible: object.get(CONTENT_FIELD).and_then(Value::as_str),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reasoning.is_none() && self.visible.is_none()
    }
}

/// Per-stream splice state machine.
#[derive(Debug, Default)]
pub struct ReasoningSplicer {
    state: SpliceState,
    mode: ReasoningMode,
}

impl ReasoningSplicer {
    #[must_use]
    pub fn new(mode: ReasoningMode) -> Self {
        Self {
            state: SpliceState::Closed,
            mode,
        }
    }

    #[must_use]
    pub fn state(&self) -> SpliceState {
        self.state
    }

    /// Run one transition and return the visible text for this delta, or
    /// `None` when the delta carries neither fragment.
    pub fn splice(&mut self, delta: Delta<'_>) -> Option<String> {
        if delta.is_empty() {
            return None;
        }

        let capacity = delta.reasoning.map_or(0, str::len)
            + delta.visible.map_or(0, str::len)
            + OPEN_DELIMITER.len()
            + CLOSE_DELIMITER.len();
        let mut out = String::with_capacity(capacity);

        if let Some(reasoning) = delta.reasoning {
            if self.state == SpliceState::Closed {
                out.push_str(OPEN_DELIMITER);
                self.state = SpliceState::Open;
            }
            out.push_str(reasoning);
        }
        if let Some(visible) = delta.visible {
            if self.state == SpliceState::Open {
                out.push_str(CLOSE_DELIMITER);
                self.state = SpliceState::Closed;
            }
            out.push_str(visible);
        }
        Some(out)
    }

    /// Rewrite `choices[0].delta` of a decoded stream record in place.
    ///
    /// Returns `false` when the record was left untouched.
    pub fn rewrite_record(&mut self, record: &mut Value) -> bool {
        let Some(delta) = record
            .pointer_mut(DELTA_POINTER)
            .and_then(Value::as_object_mut)
        else {
            return false;
        };
        self.rewrite_delta(delta)
    }

    fn rewrite_delta(&mut self, delta: &mut Map<String, Value>) -> bool {
        if self.mode == ReasoningMode::Strip {
            return delta.remove(REASONING_FIELD).is_some();
        }

        let Some(text) = self.splice(Delta::from_object(delta)) else {
            return false;
        };
        delta.remove(REASONING_FIELD);
        delta.insert(CONTENT_FIELD.to_string(), Value::String(text));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(deltas: &[Delta<'_>]) -> (String, SpliceState) {
        let mut splicer = ReasoningSplicer::default();
        let text = deltas
            .iter()
            .filter_map(|delta| splicer.splice(*delta))
            .collect::<String>();
        (text, splicer.state())
    }

    #[test]
    fn test_reasoning_then_content() {
        let (text, state) = run(&[
            Delta::reasoning("let me "),
            Delta::reasoning("think"),
            Delta::visible("The answer"),
            Delta::visible(" is 4."),
        ]);
        assert_eq!(
            text,
            format!("{OPEN_DELIMITER}let me think{CLOSE_DELIMITER}The answer is 4.")
        );
        assert_eq!(state, SpliceState::Closed);
    }

    #[test]
    fn test_transition_frame_with_both_fragments() {
        let mut splicer = ReasoningSplicer::default();
        let text = splicer.splice(Delta {
            reasoning: Some("why"),
            visible: Some("because"),
        });
        assert_eq!(
            text.as_deref(),
            Some(format!("{OPEN_DELIMITER}why{CLOSE_DELIMITER}because").as_str())
        );
        assert_eq!(splicer.state(), SpliceState::Closed);
    }

    #[test]
    fn test_content_only_is_unchanged() {
        let (text, state) = run(&[Delta::visible("plain"), Delta::visible(" answer")]);
        assert_eq!(text, "plain answer");
        assert_eq!(state, SpliceState::Closed);
    }

    #[test]
    fn test_stream_ending_open_leaves_delimiter_unmatched() {
        let (text, state) = run(&[Delta::reasoning("still thinking")]);
        assert_eq!(text, format!("{OPEN_DELIMITER}still thinking"));
        assert_eq!(state, SpliceState::Open);
    }

    #[test]
    fn test_interleaved_runs_are_bracketed_separately() {
        let (text, _) = run(&[
            Delta::reasoning("a"),
            Delta::visible("1"),
            Delta::reasoning("b"),
            Delta::reasoning("c"),
            Delta::visible("2"),
        ]);
        assert_eq!(
            text,
            format!("{OPEN_DELIMITER}a{CLOSE_DELIMITER}1{OPEN_DELIMITER}bc{CLOSE_DELIMITER}2")
        );
    }

    #[test]
    fn test_empty_delta_is_not_rewritten() {
        let mut splicer = ReasoningSplicer::default();
        assert_eq!(splicer.splice(Delta::default()), None);
        assert_eq!(splicer.state(), SpliceState::Closed);
    }

    #[test]
    fn test_empty_strings_are_present_fragments() {
        let (text, state) = run(&[Delta::reasoning(""), Delta::visible("")]);
        assert_eq!(text, format!("{OPEN_DELIMITER}{CLOSE_DELIMITER}"));
        assert_eq!(state, SpliceState::Closed);
    }

    #[test]
    fn test_bracketing_over_random_sequences() {
        let mut rng = fastrand::Rng::with_seed(0x7b1d);
        for _ in 0..500 {
            let len = rng.usize(0..24);
            let mut deltas = Vec::with_capacity(len);
            for _ in 0..len {
                deltas.push(match rng.u8(0..4) {
                    0 => Delta::reasoning("r"),
                    1 => Delta::visible("c"),
                    2 => Delta {
                        reasoning: Some("r"),
                        visible: Some("c"),
                    },
                    _ => Delta::default(),
                });
            }

            // Count maximal contiguous reasoning runs the way a reader sees them:
            // a run continues until a visible fragment arrives.
            let mut expected_opens = 0;
            let mut expected_closes = 0;
            let mut open = false;
            for delta in &deltas {
                if delta.reasoning.is_some() && !open {
                    expected_opens += 1;
                    open = true;
                }
                if delta.visible.is_some() && open {
                    expected_closes += 1;
                    open = false;
                }
            }

            let (text, state) = run(&deltas);
            assert_eq!(text.matches(OPEN_DELIMITER).count(), expected_opens);
            assert_eq!(text.matches("</think>").count(), expected_closes);
            assert_eq!(state == SpliceState::Open, open);
            // Every close is immediately followed by the first visible fragment.
            for (idx, _) in text.match_indices(CLOSE_DELIMITER) {
                assert_eq!(&text[idx + CLOSE_DELIMITER.len()..=idx + CLOSE_DELIMITER.len()], "c");
            }
        }
    }

    #[test]
    fn test_rewrite_record_moves_reasoning_into_content() {
        let mut splicer = ReasoningSplicer::default();
        let mut record = json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "delta": {"role": "assistant", "reasoning_content": "hmm", "content": null}}]
        });
        assert!(splicer.rewrite_record(&mut record));
        assert_eq!(
            record["choices"][0]["delta"],
            json!({"role": "assistant", "content": format!("{OPEN_DELIMITER}hmm")})
        );
        assert_eq!(record["id"], "chatcmpl-1");
    }

    #[test]
    fn test_rewrite_record_without_fragments_is_untouched() {
        let mut splicer = ReasoningSplicer::default();
        let original = json!({"choices": [{"delta": {}, "finish_reason": "stop"}], "usage": {"total_tokens": 3}});
        let mut record = original.clone();
        assert!(!splicer.rewrite_record(&mut record));
        assert_eq!(record, original);

        let mut no_choices = json!({"object": "chat.completion.chunk", "choices": []});
        assert!(!splicer.rewrite_record(&mut no_choices));
    }

    #[test]
    fn test_strip_mode_drops_reasoning() {
        let mut splicer = ReasoningSplicer::new(ReasoningMode::Strip);
        let mut record = json!({"choices": [{"delta": {"reasoning_content": "secret"}}]});
        assert!(splicer.rewrite_record(&mut record));
        assert_eq!(record["choices"][0]["delta"], json!({}));

        let mut record = json!({"choices": [{"delta": {"content": "visible"}}]});
        assert!(!splicer.rewrite_record(&mut record));
        assert_eq!(record["choices"][0]["delta"]["content"], "visible");
        assert_eq!(splicer.state(), SpliceState::Closed);
    }

    #[test]
    fn test_splicers_are_independent_per_stream() {
        let mut first = ReasoningSplicer::default();
        let mut second = ReasoningSplicer::default();
        let _ = first.splice(Delta::reasoning("a"));
        assert_eq!(first.state(), SpliceState::Open);
        assert_eq!(
            second.splice(Delta::visible("b")).as_deref(),
            Some("b")
        );
    }
}
