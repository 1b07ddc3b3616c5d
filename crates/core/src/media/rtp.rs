//! RTP packet parsing and header serialization (RFC 3550 §5.1).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           Timestamp                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                             SSRC                              |
//! +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
//! |                 CSRC list (CC × 32 bits)                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |      defined by profile       |            length             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |              header extension (length × 32 bits)              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use bytes::{Buf, BufMut};
use rand::RngExt;

use crate::error::{Error, MalformedKind, Result};

/// Size of the fixed RTP header.
pub const FIXED_HEADER_LEN: usize = 12;

/// The only RTP version in use.
pub const RTP_VERSION: u8 = 2;

/// RFC 3550 §5.3.1 header extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderExtension<'a> {
    /// Profile-defined 16-bit identifier.
    pub profile: u16,
    /// Length of the extension body in 32-bit words (excludes the 4-byte header).
    pub length: u16,
    /// Raw extension body.
    pub data: &'a [u8],
}

/// A parsed RTP packet borrowing the input buffer.
///
/// Construction validates every length implied by the header, so
/// [`payload`](Self::payload) never reads out of range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket<'a> {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub csrc_count: u8,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrcs: Vec<u32>,
    pub header_extension: Option<HeaderExtension<'a>>,
    /// Header length in bytes; the payload starts here.
    pub header_len: usize,
    payload: &'a [u8],
}

impl<'a> RtpPacket<'a> {
    /// Parse an RTP packet.
    ///
    /// Returns [`Error::MalformedPacket`] when the buffer is shorter than the
    /// header it declares, when the version is not 2, or when the padding
    /// count does not fit the payload.
    pub fn parse(buf: &'a [u8]) -> Result<Self> {
        if buf.len() < FIXED_HEADER_LEN {
            return Err(Error::malformed(MalformedKind::TooShort { len: buf.len() }));
        }

        let mut fixed = &buf[..FIXED_HEADER_LEN];
        let first = fixed.get_u8();
        let version = first >> 6;
        if version != RTP_VERSION {
            return Err(Error::malformed(MalformedKind::BadVersion(version)));
        }
        let padding = first & 0x20 != 0;
        let extension = first & 0x10 != 0;
        let csrc_count = first & 0x0F;
        let second = fixed.get_u8();
        let marker = second & 0x80 != 0;
        let payload_type = second & 0x7F;
        let sequence_number = fixed.get_u16();
        let timestamp = fixed.get_u32();
        let ssrc = fixed.get_u32();

        let mut header_len = FIXED_HEADER_LEN + 4 * csrc_count as usize;
        if buf.len() < header_len {
            return Err(Error::malformed(MalformedKind::TruncatedCsrcList {
                needed: header_len,
                available: buf.len(),
            }));
        }
        let mut list = &buf[FIXED_HEADER_LEN..header_len];
        let csrcs = (0..csrc_count).map(|_| list.get_u32()).collect();

        let header_extension = if extension {
            let ext_start = header_len;
            if buf.len() < ext_start + 4 {
                return Err(Error::malformed(MalformedKind::TruncatedExtension {
                    needed: ext_start + 4,
                    available: buf.len(),
                }));
            }
            let mut ext = &buf[ext_start..ext_start + 4];
            let profile = ext.get_u16();
            let length = ext.get_u16();
            header_len = ext_start + 4 + 4 * length as usize;
            if buf.len() < header_len {
                return Err(Error::malformed(MalformedKind::TruncatedExtension {
                    needed: header_len,
                    available: buf.len(),
                }));
            }
            Some(HeaderExtension {
                profile,
                length,
                data: &buf[ext_start + 4..header_len],
            })
        } else {
            None
        };

        let mut payload = &buf[header_len..];
        if padding {
            // The count octet counts itself, so 0 is never valid.
            let count = payload.last().copied().unwrap_or(0);
            if count == 0 || count as usize > payload.len() {
                return Err(Error::malformed(MalformedKind::BadPadding {
                    count,
                    available: payload.len(),
                }));
            }
            payload = &payload[..payload.len() - count as usize];
        }

        Ok(Self {
            version,
            padding,
            extension,
            csrc_count,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrcs,
            header_extension,
            header_len,
            payload,
        })
    }

    /// Payload bytes after the header, with RTP padding removed.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
}

/// Per-stream sender state: the next sequence number, the media timestamp
/// and the SSRC, serialized as a 12-byte fixed header in front of each
/// outgoing payload.
///
/// The sequence number and timestamp both wrap. Padding, extension and CSRC
/// count are never set, so [`RtpPacket::parse`] reads these headers back
/// with `header_len == 12`.
#[derive(Debug)]
pub struct RtpHeaderWriter {
    pub pt: u8,
    pub ssrc: u32,
    sequence: u16,
    timestamp: u32,
}

impl RtpHeaderWriter {
    pub fn new(pt: u8, ssrc: u32) -> Self {
        tracing::debug!(
            pt,
            ssrc = format_args!("{:#010X}", ssrc),
            "RTP sender state created"
        );
        Self {
            pt: pt & 0x7F,
            ssrc,
            sequence: 0,
            timestamp: 0,
        }
    }

    /// SSRC drawn at random (RFC 3550 §8.1).
    pub fn with_random_ssrc(pt: u8) -> Self {
        Self::new(pt, rand::rng().random::<u32>())
    }

    /// Number packets from `sequence` instead of 0.
    pub fn with_sequence(mut self, sequence: u16) -> Self {
        self.sequence = sequence;
        self
    }

    /// Sequence number of the next header.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Timestamp stamped on the next header.
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Append a fixed header to `out` and move on to the next sequence number.
    pub fn put<B: BufMut>(&mut self, out: &mut B, marker: bool) {
        out.put_u8(RTP_VERSION << 6);
        out.put_u8(((marker as u8) << 7) | self.pt);
        out.put_u16(self.sequence);
        out.put_u32(self.timestamp);
        out.put_u32(self.ssrc);
        self.sequence = self.sequence.wrapping_add(1);
    }

    /// Move the media clock forward, e.g. by `90000 / fps` per video frame.
    pub fn advance_timestamp(&mut self, increment: u32) {
        self.timestamp = self.timestamp.wrapping_add(increment);
    }
}
