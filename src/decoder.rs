//! Incremental decoder for concatenated JSON documents.
//!
//! Inbound chunks may hold several back-to-back documents (`{..}{..}`),
//! newline-separated documents, or a fragment of one. [`StreamDecoder`] keeps
//! the unconsumed tail between chunks and yields every complete document as
//! soon as its last byte arrives.
//!
//! Decoding is built on [`serde_json::StreamDeserializer`], run over the
//! buffered bytes one document at a time so the decoder can recover after a
//! syntax error instead of stopping the stream.
//!
//! # Recovery
//!
//! - After a syntax error, decoding resumes after the next newline past the
//!   error; without one, at the next `{` at or past the error; otherwise the
//!   buffer is dropped.
//! - An incomplete document carried over from an earlier chunk is abandoned
//!   when the new chunk decodes cleanly on its own into JSON-RPC shaped
//!   objects. Otherwise a lone `{"id":` would absorb every later reply.
//!
//! Objects and arrays are tracked with a bracket-depth scan that resumes where
//! the previous chunk stopped, and reach serde only once they balance. A reply
//! arriving in many reads is therefore parsed once, not once per read. Syntax
//! errors in the later chunks of a carried document surface when it balances
//! or is abandoned.

use serde_json::{Deserializer, Value};

/// Members that mark an object as a JSON-RPC message.
const MESSAGE_KEYS: [&str; 5] = ["jsonrpc", "id", "result", "error", "method"];

/// One item produced by [`StreamDecoder::feed`].
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Value(Value),
    Error(DecodeError),
}

/// A decode failure for a single document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Bytes that are not valid JSON.
    #[error("malformed JSON: {0}")]
    Syntax(String),
    /// An unterminated document dropped in favour of newer input.
    #[error("incomplete document of {0} bytes abandoned")]
    Abandoned(usize),
}

/// Buffering decoder that survives documents split across chunks.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buf: Vec<u8>,
    scan: Scan,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes held back as the start of an incomplete document.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Drop any buffered partial document.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.scan = Scan::default();
    }

    /// Append `chunk` and return a lazy iterator over the documents now
    /// complete.
    ///
    /// Bytes the iterator has not consumed when it is dropped stay buffered
    /// for the next call.
    pub fn feed(&mut self, chunk: impl AsRef<[u8]>) -> DecodeIter<'_> {
        let carried = self.buf.len();
        self.buf.extend_from_slice(chunk.as_ref());
        DecodeIter {
            decoder: self,
            pos: 0,
            carried,
            done: false,
        }
    }
}

/// Iterator returned by [`StreamDecoder::feed`].
pub struct DecodeIter<'a> {
    decoder: &'a mut StreamDecoder,
    pos: usize,
    carried: usize,
    done: bool,
}

impl Iterator for DecodeIter<'_> {
    type Item = Decoded;

    fn next(&mut self) -> Option<Decoded> {
        if self.done {
            return None;
        }

        self.pos = skip_whitespace(&self.decoder.buf, self.pos);
        let len = self.decoder.buf.len();
        if self.pos >= len {
            self.done = true;
            return None;
        }

        // Containers are only handed to serde once their brackets balance.
        // A carried document was parsed when its first bytes arrived, so an
        // unbalanced one is not parsed again.
        let (end, balanced) = if matches!(self.decoder.buf[self.pos], b'{' | b'[') {
            match self.scan_container() {
                Some(end) => (end, true),
                None if self.pos < self.carried => return self.incomplete(),
                None => (len, false),
            }
        } else {
            (len, false)
        };

        let parsed = {
            let slice = &self.decoder.buf[self.pos..end];
            let mut stream = Deserializer::from_slice(slice).into_iter::<Value>();
            stream
                .next()
                .map(|item| item.map(|value| (value, stream.byte_offset())))
        };

        match parsed {
            Some(Ok((value, consumed))) => {
                self.pos += consumed;
                Some(Decoded::Value(value))
            }
            Some(Err(err)) if err.is_eof() && !balanced => self.incomplete(),
            Some(Err(err)) => {
                let buf = &self.decoder.buf;
                let err_at = self.pos + error_offset(&buf[self.pos..end], &err);
                self.pos = resume_point(buf, self.pos, err_at);
                Some(Decoded::Error(DecodeError::Syntax(err.to_string())))
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

impl DecodeIter<'_> {
    /// Scan the container starting at `pos`, resuming a scan left by an
    /// earlier chunk. Returns its end once the brackets balance.
    fn scan_container(&mut self) -> Option<usize> {
        let decoder = &mut *self.decoder;
        let scan = &mut decoder.scan;
        if scan.start != self.pos || scan.at <= self.pos {
            *scan = Scan::begin(self.pos);
        }
        let end = scan.advance(&decoder.buf);
        if end.is_some() {
            *scan = Scan::default();
        }
        end
    }

    /// The document at `pos` needs more bytes.
    fn incomplete(&mut self) -> Option<Decoded> {
        let buf = &self.decoder.buf;
        if self.pos < self.carried && stands_alone(&buf[self.carried..]) {
            let abandoned = self.carried - self.pos;
            self.pos = self.carried;
            return Some(Decoded::Error(DecodeError::Abandoned(abandoned)));
        }
        self.done = true;
        None
    }
}

impl Drop for DecodeIter<'_> {
    fn drop(&mut self) {
        let decoder = &mut *self.decoder;
        let consumed = self.pos.min(decoder.buf.len());
        decoder.buf.drain(..consumed);
        if decoder.buf.iter().all(u8::is_ascii_whitespace) {
            decoder.buf.clear();
            decoder.scan = Scan::default();
        } else {
            decoder.scan.shift(consumed);
        }
    }
}

/// Bracket-depth scan of one container document, kept across chunks.
#[derive(Debug, Default, Clone, Copy)]
struct Scan {
    start: usize,
    at: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl Scan {
    fn begin(start: usize) -> Self {
        Self {
            start,
            at: start,
            ..Self::default()
        }
    }

    /// Advance over `buf` and return the end offset of the document once
    /// the depth returns to zero.
    fn advance(&mut self, buf: &[u8]) -> Option<usize> {
        while self.at < buf.len() {
            let b = buf[self.at];
            self.at += 1;
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                }
                continue;
            }
            match b {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        return Some(self.at);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Rebase after `consumed` bytes were drained from the buffer front.
    fn shift(&mut self, consumed: usize) {
        if self.start >= consumed {
            self.start -= consumed;
            self.at -= consumed;
        } else {
            *self = Self::default();
        }
    }
}

fn skip_whitespace(buf: &[u8], from: usize) -> usize {
    buf[from.min(buf.len())..]
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map_or(buf.len(), |i| from + i)
}

/// Byte index of a syntax error inside `slice`, from its line/column.
fn error_offset(slice: &[u8], err: &serde_json::Error) -> usize {
    let line_start = if err.line() <= 1 {
        0
    } else {
        slice
            .iter()
            .enumerate()
            .filter(|(_, b)| **b == b'\n')
            .nth(err.line() - 2)
            .map_or(slice.len(), |(i, _)| i + 1)
    };
    (line_start + err.column().saturating_sub(1)).min(slice.len())
}

/// Where to pick up decoding after a syntax error at `err_at`.
fn resume_point(buf: &[u8], start: usize, err_at: usize) -> usize {
    let from = err_at.max(start + 1).min(buf.len());
    let rest = &buf[from..];
    if let Some(i) = rest.iter().position(|b| *b == b'\n') {
        return from + i + 1;
    }
    rest.iter()
        .position(|b| *b == b'{')
        .map_or(buf.len(), |i| from + i)
}

/// Whether `chunk` decodes completely into JSON-RPC shaped objects.
fn stands_alone(chunk: &[u8]) -> bool {
    let mut seen = false;
    for item in Deserializer::from_slice(chunk).into_iter::<Value>() {
        match item {
            Ok(Value::Object(object)) if MESSAGE_KEYS.iter().any(|k| object.contains_key(*k)) => {
                seen = true;
            }
            _ => return false,
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn values(items: Vec<Decoded>) -> Vec<Value> {
        items
            .into_iter()
            .map(|d| match d {
                Decoded::Value(v) => v,
                Decoded::Error(e) => panic!("Unexpected decode error: {}", e),
            })
            .collect()
    }

    #[test]
    fn test_back_to_back_documents() {
        let mut decoder = StreamDecoder::new();
        let decoded: Vec<_> = decoder
            .feed(r#"{"result":1,"id":1}{"result":2,"id":2}"#)
            .collect();
        assert_eq!(
            values(decoded),
            vec![json!({"result": 1, "id": 1}), json!({"result": 2, "id": 2})]
        );
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn test_newline_separated_documents() {
        let mut decoder = StreamDecoder::new();
        let decoded: Vec<_> = decoder.feed("{\"a\":1}\n{\"b\":2}\n").collect();
        assert_eq!(values(decoded), vec![json!({"a": 1}), json!({"b": 2})]);
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn test_document_split_across_chunks() {
        let doc = r#"{"jsonrpc":"2.0","result":{"nested":[1,2,3]},"id":7}"#;
        for split in 1..doc.len() {
            let mut decoder = StreamDecoder::new();
            let first: Vec<_> = decoder.feed(&doc[..split]).collect();
            assert!(first.is_empty(), "split at {} yielded early", split);
            let second: Vec<_> = decoder.feed(&doc[split..]).collect();
            assert_eq!(
                values(second),
                vec![json!({"jsonrpc": "2.0", "result": {"nested": [1, 2, 3]}, "id": 7})],
                "split at {}",
                split
            );
        }
    }

    #[test]
    fn test_complete_and_partial_in_one_chunk() {
        let mut decoder = StreamDecoder::new();
        let decoded: Vec<_> = decoder.feed(r#"{"id":1,"result":true}{"id":2,"res"#).collect();
        assert_eq!(values(decoded), vec![json!({"id": 1, "result": true})]);
        assert_eq!(decoder.buffered_len(), r#"{"id":2,"res"#.len());

        let decoded: Vec<_> = decoder.feed(r#"ult":false}"#).collect();
        assert_eq!(values(decoded), vec![json!({"id": 2, "result": false})]);
    }

    #[test]
    fn test_syntax_error_then_recovery_on_next_line() {
        let mut decoder = StreamDecoder::new();
        let decoded: Vec<_> = decoder
            .feed("{\"id\":x}\n{\"jsonrpc\":\"2.0\",\"result\":1,\"id\":1}\n")
            .collect();
        assert_eq!(decoded.len(), 2);
        assert!(matches!(decoded[0], Decoded::Error(DecodeError::Syntax(_))));
        assert_eq!(
            decoded[1],
            Decoded::Value(json!({"jsonrpc": "2.0", "result": 1, "id": 1}))
        );
    }

    #[test]
    fn test_leading_garbage_skipped_to_next_object() {
        let mut decoder = StreamDecoder::new();
        let decoded: Vec<_> = decoder.feed(r#"garbage{"result":2,"id":1}"#).collect();
        assert_eq!(decoded.len(), 2);
        assert!(matches!(decoded[0], Decoded::Error(DecodeError::Syntax(_))));
        assert_eq!(decoded[1], Decoded::Value(json!({"result": 2, "id": 1})));
    }

    #[test]
    fn test_unterminated_fragment_abandoned_for_fresh_messages() {
        let mut decoder = StreamDecoder::new();
        assert_eq!(decoder.feed(r#"{"id":"#).count(), 0);
        assert_eq!(decoder.buffered_len(), 6);

        let decoded: Vec<_> = decoder
            .feed(r#"{"jsonrpc":"2.0","result":[1,2],"id":1}"#)
            .collect();
        assert_eq!(
            decoded,
            vec![
                Decoded::Error(DecodeError::Abandoned(6)),
                Decoded::Value(json!({"jsonrpc": "2.0", "result": [1, 2], "id": 1})),
            ]
        );
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn test_nested_continuation_is_not_abandoned() {
        // The continuation is not a complete document on its own.
        let mut decoder = StreamDecoder::new();
        assert_eq!(decoder.feed(r#"{"result":"#).count(), 0);
        let decoded: Vec<_> = decoder.feed(r#"{"a":1},"id":3}"#).collect();
        assert_eq!(values(decoded), vec![json!({"result": {"a": 1}, "id": 3})]);
    }

    #[test]
    fn test_dropped_iterator_keeps_unread_documents() {
        let mut decoder = StreamDecoder::new();
        {
            let mut iter = decoder.feed(r#"{"a":1}{"b":2}"#);
            assert_eq!(iter.next(), Some(Decoded::Value(json!({"a": 1}))));
        }
        let rest: Vec<_> = decoder.feed("").collect();
        assert_eq!(values(rest), vec![json!({"b": 2})]);
    }

    #[test]
    fn test_large_reply_in_many_chunks_scans_once() {
        let items: Vec<String> = (0..20_000)
            .map(|i| format!("item \"{}\" {{[\\", i))
            .collect();
        let expected = json!({"jsonrpc": "2.0", "result": items.clone(), "id": 1});
        let doc = serde_json::to_vec(&expected).unwrap();

        let mut decoder = StreamDecoder::new();
        let mut decoded = Vec::new();
        let chunks: Vec<&[u8]> = doc.chunks(8192).collect();
        for (i, chunk) in chunks.iter().enumerate() {
            decoded.extend(decoder.feed(*chunk));
            if i + 1 < chunks.len() {
                assert!(decoded.is_empty(), "chunk {} yielded early", i);
                // The scan picks up where the previous chunk stopped.
                assert_eq!(decoder.scan.start, 0);
                assert_eq!(decoder.scan.at, decoder.buffered_len());
            }
        }
        assert_eq!(values(decoded), vec![expected]);
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn test_syntax_error_in_continuation_reported_when_balanced() {
        let mut decoder = StreamDecoder::new();
        assert_eq!(decoder.feed(r#"{"result":"#).count(), 0);
        let decoded: Vec<_> = decoder.feed("x,\"id\":1}\n{\"result\":2,\"id\":2}").collect();
        assert_eq!(decoded.len(), 2);
        assert!(matches!(decoded[0], Decoded::Error(DecodeError::Syntax(_))));
        assert_eq!(decoded[1], Decoded::Value(json!({"result": 2, "id": 2})));
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn test_whitespace_only_chunk() {
        let mut decoder = StreamDecoder::new();
        assert_eq!(decoder.feed(" \r\n\t").count(), 0);
        assert_eq!(decoder.buffered_len(), 0);
    }
}
