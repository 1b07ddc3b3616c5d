//! H.264 RTP payload format (RFC 6184).
//!
//! The first payload byte has the layout of a NAL unit header:
//!
//! ```text
//! +---------------+
//! |0|1|2|3|4|5|6|7|
//! +-+-+-+-+-+-+-+-+
//! |F|NRI|  Type   |
//! +---------------+
//! ```
//!
//! and its `Type` field selects the payload structure:
//!
//! | Type | Structure | Module |
//! |------|-----------|--------|
//! | 1–23 | Single NAL unit (§5.6) | [`depacketizer`] |
//! | 24 | STAP-A (§5.7.1) | [`aggregation`] |
//! | 25 | STAP-B (§5.7.1) | [`aggregation`] |
//! | 26 | MTAP16 (§5.7.2) | [`aggregation`] |
//! | 27 | MTAP24 (§5.7.2) | [`aggregation`] |
//! | 28 | FU-A (§5.8) | [`fragment`] |
//! | 29 | FU-B (§5.8) | [`fragment`] |
//! | 0, 30, 31 | reserved | ignored |

pub mod aggregation;
pub mod annexb;
pub mod depacketizer;
pub mod fragment;
pub mod packetizer;

pub use depacketizer::{DepacketizerConfig, H264Depacketizer};
pub use packetizer::H264Packetizer;

pub const STAP_A: u8 = 24;
pub const STAP_B: u8 = 25;
pub const MTAP16: u8 = 26;
pub const MTAP24: u8 = 27;
pub const FU_A: u8 = 28;
pub const FU_B: u8 = 29;

/// One-byte NAL unit header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalHeader(u8);

impl NalHeader {
    pub fn new(byte: u8) -> Self {
        Self(byte)
    }

    pub fn forbidden_zero_bit(self) -> bool {
        self.0 & 0x80 != 0
    }

    /// `nal_ref_idc`, 0–3.
    pub fn nri(self) -> u8 {
        (self.0 >> 5) & 0x03
    }

    pub fn nal_type(self) -> u8 {
        self.0 & 0x1F
    }

    pub fn byte(self) -> u8 {
        self.0
    }
}

/// Payload structure selected by the NAL type of the first payload byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Reserved(u8),
    Single(u8),
    StapA,
    StapB,
    Mtap16,
    Mtap24,
    FuA,
    FuB,
}

impl From<NalHeader> for PayloadKind {
    fn from(header: NalHeader) -> Self {
        match header.nal_type() {
            t @ 1..=23 => Self::Single(t),
            STAP_A => Self::StapA,
            STAP_B => Self::StapB,
            MTAP16 => Self::Mtap16,
            MTAP24 => Self::Mtap24,
            FU_A => Self::FuA,
            FU_B => Self::FuB,
            t => Self::Reserved(t),
        }
    }
}

/// Decoding order number and timestamp offset carried by interleaved-mode
/// payloads (STAP-B, MTAP16, MTAP24, FU-B).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodingOrder {
    pub don: u16,
    /// 16-bit for STAP-B/MTAP16, 24-bit for MTAP24/FU-B.
    pub ts_offset: u32,
}

/// A complete NAL unit, header byte included. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NalUnit {
    data: Vec<u8>,
    decoding_order: Option<DecodingOrder>,
}

impl NalUnit {
    pub(crate) fn new(data: Vec<u8>, decoding_order: Option<DecodingOrder>) -> Self {
        debug_assert!(!data.is_empty());
        Self {
            data,
            decoding_order,
        }
    }

    pub fn header(&self) -> NalHeader {
        NalHeader::new(self.data[0])
    }

    pub fn nal_type(&self) -> u8 {
        self.header().nal_type()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// DON and timestamp offset, for payloads that carry them.
    pub fn decoding_order(&self) -> Option<DecodingOrder> {
        self.decoding_order
    }
}

impl AsRef<[u8]> for NalUnit {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// Outcome of feeding one packet to the depacketizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    /// Fragment absorbed, or reserved NAL type.
    Nothing,
    /// Single NAL unit packet or a completed fragmentation run.
    Single(NalUnit),
    /// Aggregation packet, units in payload order.
    Aggregate(Vec<NalUnit>),
}

impl Extracted {
    pub fn is_nothing(&self) -> bool {
        matches!(self, Self::Nothing)
    }

    pub fn into_nal_units(self) -> Vec<NalUnit> {
        match self {
            Self::Nothing => Vec::new(),
            Self::Single(nal) => vec![nal],
            Self::Aggregate(nals) => nals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_fields() {
        let h = NalHeader::new(0x65);
        assert!(!h.forbidden_zero_bit());
        assert_eq!(h.nri(), 3);
        assert_eq!(h.nal_type(), 5);

        let h = NalHeader::new(0xBC);
        assert!(h.forbidden_zero_bit());
        assert_eq!(h.nri(), 1);
        assert_eq!(h.nal_type(), FU_A);
    }

    #[test]
    fn payload_kind_table() {
        let kind = |t: u8| PayloadKind::from(NalHeader::new(0x60 | t));
        assert_eq!(kind(0), PayloadKind::Reserved(0));
        assert_eq!(kind(1), PayloadKind::Single(1));
        assert_eq!(kind(23), PayloadKind::Single(23));
        assert_eq!(kind(24), PayloadKind::StapA);
        assert_eq!(kind(25), PayloadKind::StapB);
        assert_eq!(kind(26), PayloadKind::Mtap16);
        assert_eq!(kind(27), PayloadKind::Mtap24);
        assert_eq!(kind(28), PayloadKind::FuA);
        assert_eq!(kind(29), PayloadKind::FuB);
        assert_eq!(kind(30), PayloadKind::Reserved(30));
        assert_eq!(kind(31), PayloadKind::Reserved(31));
    }

    #[test]
    fn extracted_flattens() {
        let nal = NalUnit::new(vec![0x41, 1], None);
        assert!(Extracted::Nothing.into_nal_units().is_empty());
        assert_eq!(Extracted::Single(nal.clone()).into_nal_units(), vec![nal.clone()]);
        assert_eq!(
            Extracted::Aggregate(vec![nal.clone(), nal.clone()])
                .into_nal_units()
                .len(),
            2
        );
    }
}
