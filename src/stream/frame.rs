use memchr::memmem;
use serde_json::Value;

/// Prefix every payload line must start with.
pub const DATA_PREFIX: &[u8] = b"data: ";
/// End-of-stream sentinel carried by the terminal line.
pub const DONE_SENTINEL: &[u8] = b"[DONE]";

/// Classification of one complete line of the streaming protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A payload line whose remainder decoded as JSON.
    Data(Value),
    /// The end-of-stream line; forwarded verbatim, never decoded.
    Terminal,
    /// Blank, comment, foreign-prefix or undecodable lines.
    Ignorable,
}

/// Classify a complete line (terminator already removed).
#[must_use]
pub fn classify(line: &[u8]) -> Frame {
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Frame::Ignorable;
    };
    if memmem::find(payload, DONE_SENTINEL).is_some() {
        return Frame::Terminal;
    }
    match serde_json::from_slice::<Value>(payload) {
        Ok(record) => Frame::Data(record),
        Err(err) => {
            tracing::trace!(error = %err, len = payload.len(), "dropping undecodable data frame");
            Frame::Ignorable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_frame_decodes_record() {
        let frame = classify(br#"data: {"choices":[{"delta":{"content":"hi"}}]}"#);
        assert_eq!(
            frame,
            Frame::Data(json!({"choices":[{"delta":{"content":"hi"}}]}))
        );
    }

    #[test]
    fn test_trailing_carriage_return_still_decodes() {
        let frame = classify(b"data: {\"id\":1}\r");
        assert_eq!(frame, Frame::Data(json!({"id": 1})));
    }

    #[test]
    fn test_terminal_sentinel() {
        assert_eq!(classify(b"data: [DONE]"), Frame::Terminal);
        assert_eq!(classify(b"data: [DONE]\r"), Frame::Terminal);
    }

    #[test]
    fn test_lines_without_prefix_are_ignorable() {
        for line in [
            b"".as_slice(),
            b": keep-alive".as_slice(),
            b"event: message".as_slice(),
            b"[DONE]".as_slice(),
            br#"{"choices":[]}"#.as_slice(),
            b"data:[DONE]".as_slice(),
            b"DATA: [DONE]".as_slice(),
            b" data: [DONE]".as_slice(),
        ] {
            assert_eq!(classify(line), Frame::Ignorable, "{line:?}");
        }
    }

    #[test]
    fn test_malformed_payload_is_ignorable() {
        assert_eq!(classify(br#"data: {"choices":[{"delta""#), Frame::Ignorable);
        assert_eq!(classify(b"data: "), Frame::Ignorable);
        assert_eq!(classify(b"data: not json"), Frame::Ignorable);
    }
}
