//! # Incremental frame decoder
//!
//! [`FrameDecoder`] turns an arbitrarily chunked byte stream into MAVLink
//! frames. It owns only the structural layer: hunting for a start byte and
//! sizing the candidate frame from its header. Parsing and checksum
//! validation of a complete candidate are delegated to the framing library.

use mavio::protocol::Versionless;
use mavio::{Frame, Receiver};

use crate::link::BridgeDialect;

/// Start byte of a `MAVLink 1` frame.
const STX_V1: u8 = 0xFE;
/// Start byte of a `MAVLink 2` frame.
const STX_V2: u8 = 0xFD;

/// `MAVLink 1` frame size minus payload: header (6) + checksum (2).
const V1_FRAME_OVERHEAD: usize = 8;
/// `MAVLink 2` frame size minus payload and signature: header (10) +
/// checksum (2).
const V2_FRAME_OVERHEAD: usize = 12;
/// Length of the optional `MAVLink 2` signature trailer.
const SIGNATURE_LEN: usize = 13;
/// Incompatibility flag marking a signed `MAVLink 2` frame.
const INCOMPAT_FLAG_SIGNED: u8 = 0x01;

/// One step of decoding progress.
#[derive(Debug)]
pub enum DecoderEvent {
    /// A complete frame with a valid checksum.
    Frame(Frame<Versionless>),
    /// A structurally complete frame whose checksum did not match (or whose
    /// message type is unknown to the dialect, which makes the checksum
    /// unverifiable).
    BadCrc,
    /// Bytes that look like a frame start but do not parse. One byte is
    /// dropped and scanning resumes.
    Malformed,
}

/// Byte-in, frame-out state machine.
///
/// Feed raw reads with [`push`](FrameDecoder::push), then drain events with
/// [`next_event`](FrameDecoder::next_event) until it returns `None` (more
/// bytes required). Garbage between frames is skipped silently.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends freshly read bytes to the decoder buffer.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Advances the state machine by at most one frame.
    ///
    /// Returns `None` when the buffered bytes do not yet contain a complete
    /// candidate frame.
    pub fn next_event(&mut self) -> Option<DecoderEvent> {
        self.resync();

        let total = self.pending_frame_len()?;
        if self.buf.len() < total {
            return None;
        }

        let event = match Self::parse(&self.buf[..total]) {
            Parsed::Frame(frame) => {
                self.buf.drain(..total);
                DecoderEvent::Frame(frame)
            }
            Parsed::BadCrc => {
                self.buf.drain(..total);
                DecoderEvent::BadCrc
            }
            Parsed::Malformed => {
                // The start byte lied; skip it and rescan from the next one.
                self.buf.drain(..1);
                DecoderEvent::Malformed
            }
        };

        Some(event)
    }

    /// Drops leading bytes that cannot start a frame.
    fn resync(&mut self) {
        match self
            .buf
            .iter()
            .position(|&byte| byte == STX_V1 || byte == STX_V2)
        {
            Some(0) => {}
            Some(start) => {
                self.buf.drain(..start);
            }
            None => self.buf.clear(),
        }
    }

    /// Total on-wire length of the frame at the head of the buffer, or
    /// `None` while the header bytes that determine it are still missing.
    fn pending_frame_len(&self) -> Option<usize> {
        match *self.buf.first()? {
            STX_V1 => {
                let payload_len = *self.buf.get(1)? as usize;
                Some(V1_FRAME_OVERHEAD + payload_len)
            }
            STX_V2 => {
                let payload_len = *self.buf.get(1)? as usize;
                let incompat_flags = *self.buf.get(2)?;
                let signature_len = if incompat_flags & INCOMPAT_FLAG_SIGNED != 0 {
                    SIGNATURE_LEN
                } else {
                    0
                };
                Some(V2_FRAME_OVERHEAD + payload_len + signature_len)
            }
            _ => unreachable!("resync leaves a start byte at the head of the buffer"),
        }
    }

    fn parse(bytes: &[u8]) -> Parsed {
        let mut receiver: Receiver<_, Versionless> = Receiver::new(bytes);
        match receiver.recv() {
            Ok(frame) => {
                if frame.validate_checksum::<BridgeDialect>().is_ok() {
                    Parsed::Frame(frame)
                } else {
                    Parsed::BadCrc
                }
            }
            Err(_) => Parsed::Malformed,
        }
    }
}

enum Parsed {
    Frame(Frame<Versionless>),
    BadCrc,
    Malformed,
}
