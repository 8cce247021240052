// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Flowform-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowform and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Interchange codec: the outer `<mxfile>` envelope and the compressed diagram payload.
//!
//! A compressed payload is `base64(raw_deflate(encodeURIComponent(body)))`. Everything outside
//! the first `<diagram>` element's content is carried as opaque text and written back as-is.

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::DeflateEncoder;
use flate2::Compression;
use memchr::memmem;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::debug;

/// Bytes `encodeURIComponent` leaves untouched besides ASCII alphanumerics.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

const DIAGRAM_OPEN: &[u8] = b"<diagram";
const DIAGRAM_CLOSE: &[u8] = b"</diagram>";

const DEFAULT_ENVELOPE_PREFIX: &str = concat!(
    "<mxfile host=\"flowform\" type=\"device\">\n",
    "  <diagram id=\"flowform-page-1\" name=\"Page-1\">"
);
const DEFAULT_ENVELOPE_SUFFIX: &str = "</diagram>\n</mxfile>\n";

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("diagram payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("diagram payload could not be inflated (raw deflate and zlib both failed): {0}")]
    Decompression(#[source] std::io::Error),
    #[error("inflated diagram payload is not valid UTF-8: {0}")]
    InflatedUtf8(#[from] std::string::FromUtf8Error),
    #[error("percent-decoded diagram payload is not valid UTF-8: {0}")]
    DecodedUtf8(#[from] std::str::Utf8Error),
    #[error("failed to compress diagram body: {0}")]
    Compression(#[source] std::io::Error),
    #[error("<diagram> element at byte {offset} is never closed")]
    UnterminatedDiagram { offset: usize },
}

impl CodecError {
    /// True for every failure to turn a stored payload back into a body.
    pub fn is_decompression_failure(&self) -> bool {
        !matches!(
            self,
            Self::Compression(_) | Self::UnterminatedDiagram { .. }
        )
    }
}

/// How the graph body is stored inside the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadEncoding {
    /// `<mxGraphModel>` inlined as literal XML.
    Literal,
    /// base64 of raw-deflated, percent-encoded XML.
    Compressed,
}

/// A parsed interchange document: opaque envelope around one decoded graph body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    prefix: String,
    raw_payload: String,
    suffix: String,
    /// `<diagram .../>` with no content; the prefix then ends in `/>`.
    self_closing: bool,
    encoding: PayloadEncoding,
    body: String,
    compression_level: u32,
}

impl Document {
    pub fn parse(text: &str) -> Result<Self, CodecError> {
        Self::parse_with_level(text, DEFAULT_COMPRESSION_LEVEL)
    }

    pub fn parse_with_level(text: &str, compression_level: u32) -> Result<Self, CodecError> {
        let Some(open) = find_diagram_open(text) else {
            let encoding = detect_encoding(text, PayloadEncoding::Literal);
            let body = decode_payload(text, encoding)?;
            return Ok(Self {
                prefix: String::new(),
                raw_payload: text.to_owned(),
                suffix: String::new(),
                self_closing: false,
                encoding,
                body,
                compression_level,
            });
        };

        let tag_end = memchr::memchr(b'>', &text.as_bytes()[open..])
            .map(|rel| open + rel)
            .ok_or(CodecError::UnterminatedDiagram { offset: open })?;

        if text.as_bytes()[tag_end - 1] == b'/' {
            return Ok(Self {
                prefix: text[..=tag_end].to_owned(),
                raw_payload: String::new(),
                suffix: text[tag_end + 1..].to_owned(),
                self_closing: true,
                encoding: PayloadEncoding::Compressed,
                body: String::new(),
                compression_level,
            });
        }

        let content_start = tag_end + 1;
        let close = memmem::find(&text.as_bytes()[content_start..], DIAGRAM_CLOSE)
            .map(|rel| content_start + rel)
            .ok_or(CodecError::UnterminatedDiagram { offset: open })?;

        let raw_payload = &text[content_start..close];
        let encoding = detect_encoding(raw_payload, PayloadEncoding::Compressed);
        let body = decode_payload(raw_payload, encoding)?;
        debug!(
            encoding = ?encoding,
            payload_len = raw_payload.len(),
            body_len = body.len(),
            "parsed diagram envelope"
        );

        Ok(Self {
            prefix: text[..content_start].to_owned(),
            raw_payload: raw_payload.to_owned(),
            suffix: text[close..].to_owned(),
            self_closing: false,
            encoding,
            body,
            compression_level,
        })
    }

    /// Wraps a freshly generated body in a default single-page envelope.
    pub fn new_compressed(body: &str, compression_level: u32) -> Result<Self, CodecError> {
        let raw_payload = compress_with_level(body, compression_level)?;
        Ok(Self {
            prefix: DEFAULT_ENVELOPE_PREFIX.to_owned(),
            raw_payload,
            suffix: DEFAULT_ENVELOPE_SUFFIX.to_owned(),
            self_closing: false,
            encoding: PayloadEncoding::Compressed,
            body: body.to_owned(),
            compression_level,
        })
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn encoding(&self) -> PayloadEncoding {
        self.encoding
    }

    pub fn has_envelope(&self) -> bool {
        !self.prefix.is_empty()
    }

    /// Replaces the body, re-encoding it the way the original payload was encoded.
    ///
    /// An unchanged body keeps the original payload text, so an unmodified document serializes
    /// byte-for-byte as it was read.
    pub fn with_body(&self, body: &str) -> Result<Self, CodecError> {
        if body == self.body {
            return Ok(self.clone());
        }

        let encoded = match self.encoding {
            PayloadEncoding::Literal => body.to_owned(),
            PayloadEncoding::Compressed => compress_with_level(body, self.compression_level)?,
        };
        let (lead, trail) = surrounding_whitespace(&self.raw_payload);
        let raw_payload = if self.encoding == PayloadEncoding::Compressed {
            format!("{lead}{encoded}{trail}")
        } else {
            encoded
        };

        let mut next = self.clone();
        if self.self_closing {
            next.prefix = reopen_self_closing(&self.prefix);
            next.suffix = format!("</diagram>{}", self.suffix);
            next.self_closing = false;
        }
        next.raw_payload = raw_payload;
        next.body = body.to_owned();
        Ok(next)
    }

    pub fn to_text(&self) -> String {
        let mut out =
            String::with_capacity(self.prefix.len() + self.raw_payload.len() + self.suffix.len());
        out.push_str(&self.prefix);
        out.push_str(&self.raw_payload);
        out.push_str(&self.suffix);
        out
    }
}

/// Compresses a body with the default level.
pub fn compress(body: &str) -> Result<String, CodecError> {
    compress_with_level(body, DEFAULT_COMPRESSION_LEVEL)
}

pub fn compress_with_level(body: &str, level: u32) -> Result<String, CodecError> {
    let encoded = utf8_percent_encode(body, URI_COMPONENT).to_string();
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(level.min(9)));
    encoder
        .write_all(encoded.as_bytes())
        .map_err(CodecError::Compression)?;
    let deflated = encoder.finish().map_err(CodecError::Compression)?;
    Ok(STANDARD.encode(deflated))
}

/// Inverse of [`compress`]. Raw deflate is tried first, then zlib-framed deflate.
pub fn decompress(payload: &str) -> Result<String, CodecError> {
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD.decode(compact.as_bytes())?;

    let inflated = match inflate(DeflateDecoder::new(&bytes[..])) {
        Ok(inflated) => inflated,
        Err(raw_err) => {
            debug!(error = %raw_err, "raw inflate failed; retrying with zlib framing");
            inflate(ZlibDecoder::new(&bytes[..])).map_err(CodecError::Decompression)?
        }
    };

    let text = String::from_utf8(inflated)?;
    let decoded = percent_decode_str(&text).decode_utf8()?;
    Ok(decoded.into_owned())
}

fn inflate(mut decoder: impl Read) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

fn decode_payload(raw: &str, encoding: PayloadEncoding) -> Result<String, CodecError> {
    match encoding {
        PayloadEncoding::Literal => Ok(raw.to_owned()),
        PayloadEncoding::Compressed if raw.trim().is_empty() => Ok(String::new()),
        PayloadEncoding::Compressed => decompress(raw),
    }
}

fn detect_encoding(raw: &str, when_empty: PayloadEncoding) -> PayloadEncoding {
    let trimmed = raw.trim_start();
    if trimmed.is_empty() {
        when_empty
    } else if trimmed.starts_with('<') {
        PayloadEncoding::Literal
    } else {
        PayloadEncoding::Compressed
    }
}

/// Byte offset of the first `<diagram` start tag (not `<diagrams` or similar).
fn find_diagram_open(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    memmem::find_iter(bytes, DIAGRAM_OPEN).find(|&at| {
        matches!(
            bytes.get(at + DIAGRAM_OPEN.len()),
            Some(b'>' | b'/' | b' ' | b'\t' | b'\r' | b'\n')
        )
    })
}

fn surrounding_whitespace(raw: &str) -> (&str, &str) {
    let lead = &raw[..raw.len() - raw.trim_start().len()];
    let trail = &raw[raw.trim_end().len()..];
    if lead.len() == raw.len() {
        ("", "")
    } else {
        (lead, trail)
    }
}

fn reopen_self_closing(prefix: &str) -> String {
    let without_gt = prefix.strip_suffix("/>").unwrap_or(prefix);
    format!("{}>", without_gt.trim_end())
}
