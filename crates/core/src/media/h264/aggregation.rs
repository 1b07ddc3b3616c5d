//! Aggregation packets: STAP-A, STAP-B, MTAP16, MTAP24 (RFC 6184 §5.7).
//!
//! Every entry ends with a 16-bit NAL unit size followed by the NAL unit:
//!
//! ```text
//! STAP-A:  [hdr] { size(16) nal }+
//! STAP-B:  [hdr] don(16) ts_offset(16) { size(16) nal }+
//! MTAP16:  [hdr] { don(16) ts_offset(16) size(16) nal }+
//! MTAP24:  [hdr] { don(16) ts_offset(24) size(16) nal }+
//! ```
//!
//! The walk must consume the payload exactly; a short length prefix, a size
//! running past the end, or leftover bytes all reject the whole packet.

use bytes::Buf;

use super::{DecodingOrder, NalUnit};
use crate::error::{Error, MalformedKind, Result};

/// Width of the per-entry timestamp offset in an MTAP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TsOffsetWidth {
    Bits16,
    Bits24,
}

impl TsOffsetWidth {
    fn bytes(self) -> usize {
        match self {
            Self::Bits16 => 2,
            Self::Bits24 => 3,
        }
    }
}

/// Entries after the one-byte aggregation header.
fn entries(payload: &[u8]) -> &[u8] {
    payload.get(1..).unwrap_or_default()
}

/// Offset of the read position of `buf` within `payload`.
fn offset_in(payload: &[u8], buf: &[u8]) -> usize {
    payload.len() - buf.remaining()
}

/// Parse a STAP-A payload (NAL header byte included).
pub fn parse_stap_a(payload: &[u8]) -> Result<Vec<NalUnit>> {
    let mut buf = entries(payload);
    let mut nals = Vec::new();
    loop {
        nals.push(NalUnit::new(read_nal(payload, &mut buf)?.to_vec(), None));
        if !buf.has_remaining() {
            return Ok(nals);
        }
    }
}

/// Parse a STAP-B payload.
///
/// The packet-level DON applies to the first unit; each following unit
/// takes the next DON, wrapping at 16 bits.
pub fn parse_stap_b(payload: &[u8]) -> Result<Vec<NalUnit>> {
    let mut buf = entries(payload);
    if buf.remaining() < 4 {
        return Err(Error::malformed(MalformedKind::TruncatedEntryHeader {
            offset: offset_in(payload, buf),
        }));
    }
    let don = buf.get_u16();
    let ts_offset = buf.get_u16() as u32;

    let mut nals = Vec::new();
    loop {
        let order = DecodingOrder {
            don: don.wrapping_add(nals.len() as u16),
            ts_offset,
        };
        nals.push(NalUnit::new(read_nal(payload, &mut buf)?.to_vec(), Some(order)));
        if !buf.has_remaining() {
            return Ok(nals);
        }
    }
}

/// Parse an MTAP16 or MTAP24 payload.
pub fn parse_mtap(payload: &[u8], width: TsOffsetWidth) -> Result<Vec<NalUnit>> {
    // don + ts_offset + size
    let entry_header = 2 + width.bytes() + 2;
    let mut buf = entries(payload);
    let mut nals = Vec::new();
    loop {
        let offset = offset_in(payload, buf);
        let remaining = buf.remaining();
        if remaining < entry_header {
            let kind = if nals.is_empty() {
                MalformedKind::TruncatedEntryHeader { offset }
            } else {
                MalformedKind::TrailingBytes { offset, remaining }
            };
            return Err(Error::malformed(kind));
        }

        let don = buf.get_u16();
        let ts_offset = match width {
            TsOffsetWidth::Bits16 => buf.get_u16() as u32,
            TsOffsetWidth::Bits24 => buf.get_uint(3) as u32,
        };
        let order = DecodingOrder { don, ts_offset };

        nals.push(NalUnit::new(read_nal(payload, &mut buf)?.to_vec(), Some(order)));
        if !buf.has_remaining() {
            return Ok(nals);
        }
    }
}

/// Read one `size(16) nal` entry, advancing `buf` past it.
fn read_nal<'a>(payload: &[u8], buf: &mut &'a [u8]) -> Result<&'a [u8]> {
    let offset = offset_in(payload, *buf);
    if buf.remaining() < 2 {
        return Err(Error::malformed(MalformedKind::TruncatedLengthPrefix { offset }));
    }
    let size = buf.get_u16() as usize;
    if size == 0 {
        return Err(Error::malformed(MalformedKind::EmptyNalUnit { offset }));
    }
    let rest: &'a [u8] = *buf;
    if rest.len() < size {
        return Err(Error::malformed(MalformedKind::LengthExceedsPayload {
            offset,
            declared: size,
            remaining: rest.len(),
        }));
    }
    let (nal, rest) = rest.split_at(size);
    *buf = rest;
    Ok(nal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn malformed(result: Result<Vec<NalUnit>>) -> MalformedKind {
        match result {
            Err(Error::MalformedPacket { kind }) => kind,
            other => panic!("expected malformed packet, got {:?}", other),
        }
    }

    fn bytes(nals: &[NalUnit]) -> Vec<&[u8]> {
        nals.iter().map(|n| n.as_bytes()).collect()
    }

    #[test]
    fn stap_a_units_in_order() {
        let units: [&[u8]; 3] = [&[0x67, 0x42, 0x00, 0x1E], &[0x68, 0xCE], &[0x06, 0x05, 0x01]];
        let mut payload = vec![0x78];
        for u in units {
            payload.extend_from_slice(&(u.len() as u16).to_be_bytes());
            payload.extend_from_slice(u);
        }
        let nals = parse_stap_a(&payload).unwrap();
        assert_eq!(bytes(&nals), units.to_vec());
        assert!(nals.iter().all(|n| n.decoding_order().is_none()));
    }

    #[test]
    fn stap_a_length_exceeds_payload() {
        let payload = [0x78, 0x00, 0x02, 0x67, 0x42, 0x00, 0x09, 0x68];
        assert_eq!(
            malformed(parse_stap_a(&payload)),
            MalformedKind::LengthExceedsPayload {
                offset: 5,
                declared: 9,
                remaining: 1
            }
        );
    }

    #[test]
    fn stap_a_dangling_length_byte() {
        let payload = [0x78, 0x00, 0x01, 0x67, 0x00];
        assert_eq!(
            malformed(parse_stap_a(&payload)),
            MalformedKind::TruncatedLengthPrefix { offset: 4 }
        );
    }

    #[test]
    fn stap_a_without_entries() {
        assert_eq!(
            malformed(parse_stap_a(&[0x78])),
            MalformedKind::TruncatedLengthPrefix { offset: 1 }
        );
    }

    #[test]
    fn stap_a_zero_size() {
        let payload = [0x78, 0x00, 0x00];
        assert_eq!(
            malformed(parse_stap_a(&payload)),
            MalformedKind::EmptyNalUnit { offset: 1 }
        );
    }

    #[test]
    fn stap_b_assigns_consecutive_don() {
        let payload = [
            0x79, 0xFF, 0xFF, 0x00, 0x10, // hdr, DON=65535, ts offset=16
            0x00, 0x02, 0x41, 0xAA, // unit 1
            0x00, 0x01, 0x41, // unit 2
        ];
        let nals = parse_stap_b(&payload).unwrap();
        assert_eq!(bytes(&nals), vec![&[0x41, 0xAA][..], &[0x41][..]]);
        assert_eq!(
            nals[0].decoding_order(),
            Some(DecodingOrder {
                don: 0xFFFF,
                ts_offset: 16
            })
        );
        assert_eq!(nals[1].decoding_order().map(|o| o.don), Some(0));
    }

    #[test]
    fn stap_b_truncated_prefix() {
        assert_eq!(
            malformed(parse_stap_b(&[0x79, 0x00, 0x01, 0x00])),
            MalformedKind::TruncatedEntryHeader { offset: 1 }
        );
    }

    #[test]
    fn mtap16_entries() {
        let payload = [
            0x7A, // hdr
            0x00, 0x05, 0x01, 0x00, 0x00, 0x02, 0x41, 0x01, // don 5, ts 256
            0x00, 0x06, 0x02, 0x00, 0x00, 0x01, 0x01, // don 6, ts 512
        ];
        let nals = parse_mtap(&payload, TsOffsetWidth::Bits16).unwrap();
        assert_eq!(bytes(&nals), vec![&[0x41, 0x01][..], &[0x01][..]]);
        assert_eq!(
            nals[1].decoding_order(),
            Some(DecodingOrder {
                don: 6,
                ts_offset: 0x0200
            })
        );
    }

    #[test]
    fn mtap24_offset_is_24_bit() {
        let payload = [
            0x7B, 0x00, 0x09, 0x01, 0x02, 0x03, 0x00, 0x02, 0x65, 0x88,
        ];
        let nals = parse_mtap(&payload, TsOffsetWidth::Bits24).unwrap();
        assert_eq!(nals.len(), 1);
        assert_eq!(
            nals[0].decoding_order(),
            Some(DecodingOrder {
                don: 9,
                ts_offset: 0x010203
            })
        );
        assert_eq!(nals[0].as_bytes(), &[0x65, 0x88]);
    }

    #[test]
    fn mtap_trailing_bytes() {
        let payload = [
            0x7A, 0x00, 0x05, 0x01, 0x00, 0x00, 0x01, 0x41, // entry
            0x00, 0x06, 0x02, // partial entry
        ];
        assert_eq!(
            malformed(parse_mtap(&payload, TsOffsetWidth::Bits16)),
            MalformedKind::TrailingBytes {
                offset: 8,
                remaining: 3
            }
        );
    }

    #[test]
    fn mtap_length_exceeds_payload() {
        let payload = [0x7B, 0x00, 0x01, 0x00, 0x00, 0x01, 0x00, 0x05, 0x41];
        assert_eq!(
            malformed(parse_mtap(&payload, TsOffsetWidth::Bits24)),
            MalformedKind::LengthExceedsPayload {
                offset: 6,
                declared: 5,
                remaining: 1
            }
        );
    }

    #[test]
    fn mtap_without_entries() {
        assert_eq!(
            malformed(parse_mtap(&[0x7A, 0x00], TsOffsetWidth::Bits16)),
            MalformedKind::TruncatedEntryHeader { offset: 1 }
        );
    }
}
