//! Streaming response classifier
//!
//! Socket reads arrive in arbitrary chunk sizes. The classifier reassembles
//! top-level `{...}` frames byte by byte and compares each completed frame
//! against the success sentinel. Bytes outside a frame (status line, headers)
//! are discarded.
//!
//! Nesting depth is counted and braces inside string literals are ignored, so
//! a frame only completes at the close brace matching its opening brace.

use log::debug;

/// Exact frame the remote service sends on success
pub const SUCCESS_SENTINEL: &[u8] = br#"{"RESPONSE":"OK"}"#;

/// Frames longer than this are still tracked but always classified as failure
pub const MAX_FRAME_LEN: usize = 512;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseOutcome {
    Success,
    Failure,
}

#[derive(Debug, Default)]
pub struct ResponseClassifier {
    frame: Vec<u8>,
    depth: usize,
    in_string: bool,
    escaped: bool,
    overflowed: bool,
}

impl ResponseClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while inside a candidate frame
    pub fn is_accumulating(&self) -> bool {
        self.depth > 0
    }

    /// Drop any partially reassembled frame
    pub fn reset(&mut self) {
        self.frame.clear();
        self.depth = 0;
        self.in_string = false;
        self.escaped = false;
        self.overflowed = false;
    }

    /// Feed one chunk, returning the outcome of every frame it completed
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ResponseOutcome> {
        chunk.iter().filter_map(|b| self.feed_byte(*b)).collect()
    }

    pub fn feed_byte(&mut self, byte: u8) -> Option<ResponseOutcome> {
        if self.depth == 0 {
            if byte == b'{' {
                self.reset();
                self.push(byte);
                self.depth = 1;
            }
            return None;
        }

        self.push(byte);

        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if byte == b'\\' {
                self.escaped = true;
            } else if byte == b'"' {
                self.in_string = false;
            }
            return None;
        }

        match byte {
            b'"' => self.in_string = true,
            b'{' => self.depth += 1,
            b'}' => {
                self.depth -= 1;
                if self.depth == 0 {
                    return Some(self.classify());
                }
            }
            _ => {}
        }

        None
    }

    fn push(&mut self, byte: u8) {
        if self.frame.len() < MAX_FRAME_LEN {
            self.frame.push(byte);
        } else {
            self.overflowed = true;
        }
    }

    fn classify(&self) -> ResponseOutcome {
        debug!(
            "response frame complete: {}",
            String::from_utf8_lossy(&self.frame)
        );

        if !self.overflowed && self.frame == SUCCESS_SENTINEL {
            ResponseOutcome::Success
        } else {
            ResponseOutcome::Failure
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_in_chunks(input: &[u8], chunk_size: usize) -> Vec<ResponseOutcome> {
        let mut classifier = ResponseClassifier::new();
        input
            .chunks(chunk_size)
            .flat_map(|chunk| classifier.feed(chunk))
            .collect()
    }

    #[test]
    fn sentinel_succeeds_for_every_chunk_size() {
        for size in 1..=SUCCESS_SENTINEL.len() {
            assert_eq!(
                feed_in_chunks(SUCCESS_SENTINEL, size),
                vec![ResponseOutcome::Success],
                "chunk size {size}"
            );
        }
    }

    #[test]
    fn sentinel_succeeds_for_every_split_point() {
        for split in 0..=SUCCESS_SENTINEL.len() {
            let (head, tail) = SUCCESS_SENTINEL.split_at(split);
            let mut classifier = ResponseClassifier::new();
            let mut outcomes = classifier.feed(head);
            outcomes.extend(classifier.feed(tail));
            assert_eq!(outcomes, vec![ResponseOutcome::Success], "split at {split}");
        }
    }

    #[test]
    fn sentinel_after_http_headers_succeeds() {
        let response = b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n{\"RESPONSE\":\"OK\"}\r\n";
        for size in [1, 7, 64] {
            assert_eq!(feed_in_chunks(response, size), vec![ResponseOutcome::Success]);
        }
    }

    #[test]
    fn other_frame_fails() {
        assert_eq!(
            feed_in_chunks(br#"{"RESPONSE":"FAIL"}"#, 3),
            vec![ResponseOutcome::Failure]
        );
    }

    #[test]
    fn match_is_exact() {
        assert_eq!(
            feed_in_chunks(br#"{ "RESPONSE": "OK" }"#, 64),
            vec![ResponseOutcome::Failure]
        );
        assert_eq!(
            feed_in_chunks(br#"{"response":"ok"}"#, 64),
            vec![ResponseOutcome::Failure]
        );
    }

    #[test]
    fn consecutive_frames_are_classified_independently() {
        assert_eq!(
            feed_in_chunks(br#"{"A":1}{"B":2}"#, 5),
            vec![ResponseOutcome::Failure, ResponseOutcome::Failure]
        );
        assert_eq!(
            feed_in_chunks(br#"{"A":1} {"RESPONSE":"OK"}"#, 2),
            vec![ResponseOutcome::Failure, ResponseOutcome::Success]
        );
    }

    #[test]
    fn nested_object_completes_at_matching_brace() {
        let mut classifier = ResponseClassifier::new();
        let outcomes = classifier.feed(br#"{"meta":{"id":1},"RESPONSE":"OK"}"#);
        assert_eq!(outcomes, vec![ResponseOutcome::Failure]);
        assert!(!classifier.is_accumulating());
    }

    #[test]
    fn braces_inside_strings_are_ignored() {
        let outcomes = feed_in_chunks(br#"{"msg":"a } b { \" }"}"#, 4);
        assert_eq!(outcomes, vec![ResponseOutcome::Failure]);
    }

    #[test]
    fn incomplete_frame_yields_nothing() {
        let mut classifier = ResponseClassifier::new();
        assert!(classifier.feed(br#"{"RESPONSE":"O"#).is_empty());
        assert!(classifier.is_accumulating());

        classifier.reset();
        assert!(!classifier.is_accumulating());
        assert_eq!(classifier.feed(SUCCESS_SENTINEL), vec![ResponseOutcome::Success]);
    }

    #[test]
    fn oversized_frame_fails() {
        let mut payload = b"{\"pad\":\"".to_vec();
        payload.extend(std::iter::repeat_n(b'x', MAX_FRAME_LEN));
        payload.extend(b"\"}");
        assert_eq!(feed_in_chunks(&payload, 64), vec![ResponseOutcome::Failure]);
    }

    #[test]
    fn stray_close_brace_is_discarded() {
        assert_eq!(
            feed_in_chunks(b"}}{\"RESPONSE\":\"OK\"}", 1),
            vec![ResponseOutcome::Success]
        );
    }
}
