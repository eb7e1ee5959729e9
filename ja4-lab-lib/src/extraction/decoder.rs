use serde_json::Value;
use tracing::debug;

/// Counters describing input the decoder could not turn into values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Values emitted so far
    pub decoded: usize,
    /// Balanced fragments that were not valid JSON, plus a trailing unterminated one
    pub malformed: usize,
    /// Non-whitespace bytes seen outside any value (banners, progress output)
    pub stray_bytes: usize,
}

/// Incremental decoder for a stream of concatenated JSON values
///
/// The fingerprint tool writes one JSON object per session, but does not
/// reliably separate them: an object may span several lines and several may
/// share one. Bytes are scanned for value boundaries (tracking nesting depth and
/// string/escape state) and each balanced `{...}` or `[...]` fragment is decoded
/// as soon as it closes. Chunks may be split anywhere, including inside a
/// multi-byte character, since only ASCII bytes are structural.
#[derive(Debug, Default)]
pub struct JsonStreamDecoder {
    buf: Vec<u8>,
    depth: usize,
    in_string: bool,
    escaped: bool,
    stats: DecodeStats,
}

impl JsonStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk, returning every value completed by it in input order
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Value> {
        let mut out = Vec::new();

        for &b in chunk {
            if self.depth == 0 {
                match b {
                    b'{' | b'[' => {
                        self.buf.clear();
                        self.buf.push(b);
                        self.depth = 1;
                    }
                    b if b.is_ascii_whitespace() => {}
                    _ => self.stats.stray_bytes += 1,
                }
                continue;
            }

            self.buf.push(b);

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
                    self.depth -= 1;
                    if self.depth == 0 {
                        if let Some(value) = self.decode_fragment() {
                            out.push(value);
                        }
                    }
                }
                _ => {}
            }
        }

        out
    }

    /// Signal end of input; an unterminated trailing fragment counts as malformed
    pub fn finish(mut self) -> DecodeStats {
        if self.depth > 0 {
            debug!(bytes = self.buf.len(), "discarding unterminated JSON fragment");
            self.stats.malformed += 1;
        }
        self.stats
    }

    fn decode_fragment(&mut self) -> Option<Value> {
        let result = serde_json::from_slice::<Value>(&self.buf);
        self.buf.clear();
        self.in_string = false;
        self.escaped = false;
        match result {
            Ok(value) => {
                self.stats.decoded += 1;
                Some(value)
            }
            Err(e) => {
                debug!(error = %e, "skipping malformed JSON fragment");
                self.stats.malformed += 1;
                None
            }
        }
    }
}

/// Decode a complete buffer in one go
pub fn decode_all(input: &[u8]) -> (Vec<Value>, DecodeStats) {
    let mut decoder = JsonStreamDecoder::new();
    let values = decoder.feed(input);
    (values, decoder.finish())
}
