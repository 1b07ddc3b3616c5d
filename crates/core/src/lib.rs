//! RTP header parsing and H.264 depacketization (RFC 3550, RFC 6184).
//!
//! ```no_run
//! use rtp_h264::{Extracted, H264Depacketizer};
//!
//! # fn packets() -> Vec<Vec<u8>> { Vec::new() }
//! let mut depacketizer = H264Depacketizer::new();
//! for packet in packets() {
//!     match depacketizer.extract_access_unit(&packet) {
//!         Ok(Extracted::Nothing) => {}
//!         Ok(out) => {
//!             for nal in out.into_nal_units() {
//!                 println!("NAL type {} ({} bytes)", nal.nal_type(), nal.len());
//!             }
//!         }
//!         Err(e) => eprintln!("dropping packet: {e}"),
//!     }
//! }
//! ```

pub mod error;
pub mod media;

pub use error::{Error, FragmentKind, MalformedKind, Result};
pub use media::Packetizer;
pub use media::h264::{
    DecodingOrder, DepacketizerConfig, Extracted, H264Depacketizer, H264Packetizer, NalHeader,
    NalUnit,
};
pub use media::rtp::RtpPacket;
