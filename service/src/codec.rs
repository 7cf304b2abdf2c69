//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Newline framing for the chat wire protocol

use crate::ChatError;
use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Default cap on a single received line (64 KiB)
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// A codec that splits a byte stream into text lines.
///
/// Lines are terminated by `\n`; a single `\r` directly before the
/// terminator is removed. Bytes are decoded as UTF-8 lossily so a
/// misbehaving client cannot wedge its own session on bad encoding.
/// A partial line left in the buffer when the peer closes is dropped.
///
/// # Example
/// ```
/// use bytes::BytesMut;
/// use chatline_service::LineCodec;
/// use tokio_util::codec::Decoder;
///
/// let mut codec = LineCodec::new();
/// let mut buf = BytesMut::from("hello\r\nwor");
/// assert_eq!(codec.decode(&mut buf).unwrap(), Some("hello".to_string()));
/// assert_eq!(codec.decode(&mut buf).unwrap(), None);
/// ```
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_length: usize,
    next_index: usize,
}

impl LineCodec {
    /// Create a codec with the default line cap
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_LENGTH)
    }

    /// Create a codec rejecting lines longer than `max_length` bytes
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
        }
    }

    /// The configured line cap
    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = ChatError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, ChatError> {
        let offset = self.next_index.min(src.len());
        match src[offset..].iter().position(|b| *b == b'\n') {
            Some(pos) => {
                let end = offset + pos;
                self.next_index = 0;
                let frame = src.split_to(end + 1);
                let mut line = &frame[..end];
                if let Some(stripped) = line.strip_suffix(b"\r") {
                    line = stripped;
                }
                if line.len() > self.max_length {
                    return Err(ChatError::LineTooLong(self.max_length));
                }
                Ok(Some(String::from_utf8_lossy(line).into_owned()))
            }
            None => {
                if src.len() > self.max_length {
                    return Err(ChatError::LineTooLong(self.max_length));
                }
                self.next_index = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, ChatError> {
        match self.decode(src)? {
            Some(line) => Ok(Some(line)),
            None => {
                src.clear();
                self.next_index = 0;
                Ok(None)
            }
        }
    }
}

impl Encoder<&str> for LineCodec {
    type Error = ChatError;

    fn encode(&mut self, item: &str, dst: &mut BytesMut) -> Result<(), ChatError> {
        dst.reserve(item.len() + 1);
        dst.put_slice(item.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

impl Encoder<String> for LineCodec {
    type Error = ChatError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), ChatError> {
        Encoder::<&str>::encode(self, item.as_str(), dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_trims_carriage_return() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("Ada\r\nBob\n");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("Ada"));
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("Bob"));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_decode_keeps_inner_carriage_return() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("a\rb\r\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("a\rb\r"));
    }

    #[test]
    fn test_decode_accumulates_partial_lines() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("hel");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"lo wo");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"rld\nnext");
        assert_eq!(
            codec.decode(&mut buf).unwrap().as_deref(),
            Some("hello world")
        );
        assert_eq!(&buf[..], b"next");
    }

    #[test]
    fn test_decode_empty_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some(""));
    }

    #[test]
    fn test_decode_lossy_utf8() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"caf\xff\n"[..]);
        assert_eq!(
            codec.decode(&mut buf).unwrap().as_deref(),
            Some("caf\u{FFFD}")
        );
    }

    #[test]
    fn test_decode_multibyte() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("Şükrü\n");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("Şükrü"));
    }

    #[test]
    fn test_decode_rejects_overlong_unterminated() {
        let mut codec = LineCodec::with_max_length(8);
        let mut buf = BytesMut::from("123456789");
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ChatError::LineTooLong(8))
        ));
    }

    #[test]
    fn test_decode_rejects_overlong_terminated() {
        let mut codec = LineCodec::with_max_length(4);
        let mut buf = BytesMut::from("12345\n");
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ChatError::LineTooLong(4))
        ));
    }

    #[test]
    fn test_decode_eof_discards_partial() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("done\npartial");
        assert_eq!(codec.decode_eof(&mut buf).unwrap().as_deref(), Some("done"));
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encode_appends_newline() {
        let mut codec = LineCodec::new();
        let mut dst = BytesMut::new();
        codec.encode("USERNAME?", &mut dst).unwrap();
        codec.encode("WELCOME Ada".to_string(), &mut dst).unwrap();
        assert_eq!(&dst[..], b"USERNAME?\nWELCOME Ada\n");
    }
}
