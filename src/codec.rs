// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Output codecs keyed by encoding label.
//!
//! Remote output arrives as arbitrary byte chunks. [`LineDecoder`] turns
//! them into complete text lines, carrying partial multi-byte sequences and
//! unterminated lines over to the next chunk.

use encoding_rs::{CoderResult, Decoder, DecoderResult, Encoding};
use std::fmt;

/// Default output encoding.
pub const DEFAULT_ENCODING: &str = "utf-8";

/// A named text encoding.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Codec {
    encoding: &'static Encoding,
}

impl Codec {
    /// Look up a codec by its WHATWG label (`utf-8`, `latin1`, `shift_jis`, ...).
    pub fn for_label(label: &str) -> Option<Self> {
        Encoding::for_label(label.trim().as_bytes()).map(|encoding| Self { encoding })
    }

    pub fn utf8() -> Self {
        Self {
            encoding: encoding_rs::UTF_8,
        }
    }

    pub fn name(&self) -> &'static str {
        self.encoding.name()
    }

    /// Create a fresh streaming decoder.
    pub fn line_decoder(&self) -> LineDecoder {
        LineDecoder {
            decoder: self.encoding.new_decoder_without_bom_handling(),
            pending: String::new(),
        }
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::utf8()
    }
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Codec").field(&self.name()).finish()
    }
}

/// Malformed input for the active encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedInput {
    pub offset: usize,
}

impl fmt::Display for MalformedInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed byte sequence near offset {}", self.offset)
    }
}

/// Incremental bytes-to-lines decoder.
pub struct LineDecoder {
    decoder: Decoder,
    pending: String,
}

impl LineDecoder {
    /// Feed a chunk and return every line completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, MalformedInput> {
        self.decode(chunk, false)?;
        Ok(self.drain_lines())
    }

    /// Flush the decoder at end of stream, returning any remaining lines
    /// including a final unterminated one.
    pub fn finish(&mut self) -> Result<Vec<String>, MalformedInput> {
        self.decode(&[], true)?;
        let mut lines = self.drain_lines();
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            lines.push(strip_cr(rest));
        }
        Ok(lines)
    }

    fn decode(&mut self, mut src: &[u8], last: bool) -> Result<(), MalformedInput> {
        let mut consumed = 0;
        loop {
            let needed = self
                .decoder
                .max_utf8_buffer_length_without_replacement(src.len())
                .unwrap_or(src.len() * 4 + 16);
            self.pending.reserve(needed);
            let (result, read) =
                self.decoder
                    .decode_to_string_without_replacement(src, &mut self.pending, last);
            consumed += read;
            src = &src[read..];
            match result {
                DecoderResult::InputEmpty => return Ok(()),
                DecoderResult::OutputFull => continue,
                DecoderResult::Malformed(_, _) => {
                    return Err(MalformedInput { offset: consumed });
                }
            }
        }
    }

    fn drain_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let rest = self.pending.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.pending, rest);
            line.pop();
            lines.push(strip_cr(line));
        }
        lines
    }
}

fn strip_cr(mut line: String) -> String {
    if line.ends_with('\r') {
        line.pop();
    }
    line
}

/// Encode text written to a remote process's stdin.
pub fn encode(codec: &Codec, text: &str) -> Vec<u8> {
    let mut encoder = codec.encoding.new_encoder();
    let mut out = Vec::with_capacity(text.len());
    let mut src = text;
    loop {
        let needed = encoder
            .max_buffer_length_from_utf8_if_no_unmappables(src.len())
            .unwrap_or(src.len() * 4 + 16);
        let mut buf = vec![0u8; needed.max(16)];
        let (result, read, written, _) = encoder.encode_from_utf8(src, &mut buf, true);
        out.extend_from_slice(&buf[..written]);
        src = &src[read..];
        if result == CoderResult::InputEmpty {
            return out;
        }
    }
}
