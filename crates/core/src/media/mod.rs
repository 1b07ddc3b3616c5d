//! RTP parsing and H.264 payload handling.
//!
//! ## RTP overview (RFC 3550)
//!
//! Every RTP packet starts with a 12-byte fixed header, optionally followed
//! by a CSRC list and a header extension ([`rtp::RtpPacket`]). It carries:
//!
//! - **Sequence number** (16-bit, wrapping): for reordering and loss detection.
//! - **Timestamp** (32-bit): media clock, 90 kHz for video.
//! - **SSRC** (32-bit): identifies the stream. One depacketizer per SSRC.
//! - **Marker bit**: set on the last packet of an access unit (frame).
//!
//! ## Supported codecs
//!
//! | Codec | Module | RFC | Direction |
//! |-------|--------|-----|-----------|
//! | H.264 | [`h264`] | [RFC 6184](https://tools.ietf.org/html/rfc6184) | depacketize, packetize |

pub mod h264;
pub mod rtp;

/// Codec-specific RTP packetizer.
///
/// Packetizers compose [`rtp::RtpHeaderWriter`] for the fixed header and only
/// produce the payload structure themselves.
pub trait Packetizer: Send {
    /// Packetize one encoded frame (an Annex B access unit) into complete RTP
    /// packets, then advance the RTP timestamp by `timestamp_increment`,
    /// typically `90000 / fps`.
    fn packetize(&mut self, encoded_data: &[u8], timestamp_increment: u32) -> Vec<Vec<u8>>;
}
