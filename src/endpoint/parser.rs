//! Incremental connection parser
//!
//! One state machine per connection, identical on both sides. Bytes are
//! fed in whatever chunks the transport produces; the parser buffers
//! partial input and drains every complete item per feed, so a single
//! read may yield the handshake immediately followed by several frames.

use crate::common::{Error, Result};
use crate::endpoint::wire::{self, MAX_FRAME_LEN, WORD};
use bytes::{Buf, Bytes, BytesMut};

/// Where the machine is in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// Before the one-time peer-identifier exchange.
    AwaitingHandshake,
    /// Expecting a frame length prefix.
    AwaitingLength,
    /// Expecting `body_len` payload bytes.
    AwaitingBody,
}

/// A complete item decoded from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEvent {
    /// The peer identifier (follower pid, or leader-assigned id).
    Handshake(u64),
    /// One message payload.
    Frame(Bytes),
}

#[derive(Debug)]
pub struct FrameParser {
    state: ParseState,
    buf: BytesMut,
    body_len: u64,
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::AwaitingHandshake,
            buf: BytesMut::new(),
            body_len: 0,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Feed freshly received bytes, draining every item that is already
    /// complete. Returns an error if the declared body length exceeds
    /// [`MAX_FRAME_LEN`]; the connection must then be dropped, because a
    /// desynced byte stream cannot be realigned.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<ParseEvent>> {
        self.buf.extend_from_slice(data);
        let mut events = Vec::new();
        loop {
            match self.state {
                ParseState::AwaitingHandshake => {
                    if self.buf.len() < WORD {
                        break;
                    }
                    let value = self.take_word();
                    self.state = ParseState::AwaitingLength;
                    events.push(ParseEvent::Handshake(value));
                }
                ParseState::AwaitingLength => {
                    if self.buf.len() < WORD {
                        break;
                    }
                    let len = self.take_word();
                    if len > MAX_FRAME_LEN {
                        return Err(Error::FrameTooLarge {
                            declared: len,
                            limit: MAX_FRAME_LEN,
                        });
                    }
                    self.body_len = len;
                    self.state = ParseState::AwaitingBody;
                }
                ParseState::AwaitingBody => {
                    if (self.buf.len() as u64) < self.body_len {
                        break;
                    }
                    let body = self.buf.split_to(self.body_len as usize).freeze();
                    self.body_len = 0;
                    self.state = ParseState::AwaitingLength;
                    events.push(ParseEvent::Frame(body));
                }
            }
        }
        Ok(events)
    }

    fn take_word(&mut self) -> u64 {
        let mut word = [0u8; WORD];
        word.copy_from_slice(&self.buf[..WORD]);
        self.buf.advance(WORD);
        wire::decode_word(word)
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::wire::{encode_frame, encode_handshake};

    #[test]
    fn test_handshake_then_frames_in_one_feed() {
        let mut parser = FrameParser::new();
        let mut input = Vec::new();
        input.extend_from_slice(&encode_handshake(1234));
        input.extend_from_slice(&encode_frame(b"first"));
        input.extend_from_slice(&encode_frame(b"second"));

        let events = parser.feed(&input).unwrap();
        assert_eq!(
            events,
            vec![
                ParseEvent::Handshake(1234),
                ParseEvent::Frame(Bytes::from_static(b"first")),
                ParseEvent::Frame(Bytes::from_static(b"second")),
            ]
        );
        assert_eq!(parser.state(), ParseState::AwaitingLength);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut parser = FrameParser::new();
        let mut input = Vec::new();
        input.extend_from_slice(&encode_handshake(7));
        input.extend_from_slice(&encode_frame(b"slow"));

        let mut events = Vec::new();
        for byte in input {
            events.extend(parser.feed(&[byte]).unwrap());
        }
        assert_eq!(
            events,
            vec![
                ParseEvent::Handshake(7),
                ParseEvent::Frame(Bytes::from_static(b"slow")),
            ]
        );
    }

    #[test]
    fn test_empty_body_frame() {
        let mut parser = FrameParser::new();
        parser.feed(&encode_handshake(1)).unwrap();
        let events = parser.feed(&encode_frame(b"")).unwrap();
        assert_eq!(events, vec![ParseEvent::Frame(Bytes::new())]);
        // Immediately usable for the next frame.
        let events = parser.feed(&encode_frame(b"next")).unwrap();
        assert_eq!(events, vec![ParseEvent::Frame(Bytes::from_static(b"next"))]);
    }

    #[test]
    fn test_waits_without_consuming_partial_body() {
        let mut parser = FrameParser::new();
        parser.feed(&encode_handshake(1)).unwrap();

        let frame = encode_frame(b"abcdef");
        let (head, tail) = frame.split_at(WORD + 2);
        assert!(parser.feed(head).unwrap().is_empty());
        assert_eq!(parser.state(), ParseState::AwaitingBody);

        let events = parser.feed(tail).unwrap();
        assert_eq!(events, vec![ParseEvent::Frame(Bytes::from_static(b"abcdef"))]);
    }

    #[test]
    fn test_back_to_back_frames_keep_boundaries() {
        let mut parser = FrameParser::new();
        parser.feed(&encode_handshake(1)).unwrap();

        let mut input = Vec::new();
        let payloads: Vec<Vec<u8>> = (0u8..10).map(|i| vec![i; i as usize * 37]).collect();
        for p in &payloads {
            input.extend_from_slice(&encode_frame(p));
        }

        let events = parser.feed(&input).unwrap();
        assert_eq!(events.len(), payloads.len());
        for (event, expected) in events.iter().zip(&payloads) {
            assert_eq!(event, &ParseEvent::Frame(Bytes::from(expected.clone())));
        }
    }

    #[test]
    fn test_oversized_length_is_fatal() {
        let mut parser = FrameParser::new();
        parser.feed(&encode_handshake(1)).unwrap();

        let result = parser.feed(&(MAX_FRAME_LEN + 1).to_le_bytes());
        assert!(matches!(result, Err(Error::FrameTooLarge { .. })));
    }

    #[test]
    fn test_initial_state() {
        let parser = FrameParser::new();
        assert_eq!(parser.state(), ParseState::AwaitingHandshake);
    }
}
