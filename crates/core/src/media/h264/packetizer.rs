use super::annexb;
use super::{FU_A, STAP_A};
use crate::media::Packetizer;
use crate::media::rtp::{FIXED_HEADER_LEN, RtpHeaderWriter};

/// Default maximum RTP payload size.
pub const DEFAULT_MTU: usize = 1400;

/// Smallest payload budget that still fits an FU-A header and one data byte.
const MIN_MTU: usize = 3;

/// H.264 RTP packetizer (RFC 6184, packetization-mode=1).
///
/// Produces the three non-interleaved payload structures:
///
/// - **Single NAL Unit** (§5.6): a NAL that fits within the MTU on its own.
///
/// - **STAP-A** (§5.7.1): consecutive small NALs of one frame packed into a
///   single packet when aggregation is enabled:
///
///   ```text
///   STAP-A header: [F|NRI|Type=24]          (1 byte)
///   Per unit:      [size(16)] [NAL bytes]
///   ```
///
/// - **FU-A Fragmentation** (§5.8): NALs exceeding the MTU are split
///   across multiple RTP packets:
///
///   ```text
///   FU indicator:  [F|NRI|Type=28]     (1 byte)
///   FU header:     [S|E|R|NAL_Type]    (1 byte)
///   Fragment data: [...]               (up to MTU - 2 bytes)
///   ```
///
/// The `mtu` bounds the RTP payload, not the whole datagram. The RTP marker
/// bit is set on the last packet of each frame (§5.1).
#[derive(Debug)]
pub struct H264Packetizer {
    header: RtpHeaderWriter,
    mtu: usize,
    aggregate: bool,
}

impl H264Packetizer {
    /// Create with explicit payload type and SSRC.
    pub fn new(pt: u8, ssrc: u32) -> Self {
        Self::from_header(RtpHeaderWriter::new(pt, ssrc))
    }

    /// Create with a random SSRC (RFC 3550 §8.1).
    pub fn with_random_ssrc(pt: u8) -> Self {
        Self::from_header(RtpHeaderWriter::with_random_ssrc(pt))
    }

    fn from_header(header: RtpHeaderWriter) -> Self {
        Self {
            header,
            mtu: DEFAULT_MTU,
            aggregate: false,
        }
    }

    /// Set the maximum RTP payload size. Values below 3 are raised to 3.
    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu.max(MIN_MTU);
        self
    }

    /// Pack runs of small NAL units into STAP-A packets.
    pub fn with_aggregation(mut self, aggregate: bool) -> Self {
        self.aggregate = aggregate;
        self
    }

    /// Start the RTP sequence at `sequence`.
    pub fn with_sequence(mut self, sequence: u16) -> Self {
        self.header = self.header.with_sequence(sequence);
        self
    }

    pub fn ssrc(&self) -> u32 {
        self.header.ssrc
    }

    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Move the RTP timestamp on to the next frame.
    pub fn advance_timestamp(&mut self, increment: u32) {
        self.header.advance_timestamp(increment);
    }

    /// Packetize the NAL units of one frame at the current RTP timestamp.
    ///
    /// Empty NAL units are skipped. The timestamp is not advanced.
    pub fn packetize_frame<T: AsRef<[u8]>>(&mut self, nal_units: &[T]) -> Vec<Vec<u8>> {
        let nals: Vec<&[u8]> = nal_units
            .iter()
            .map(AsRef::as_ref)
            .filter(|nal| !nal.is_empty())
            .collect();

        let mut packets = Vec::new();
        let mut i = 0;
        while i < nals.len() {
            let group = if self.aggregate {
                self.aggregation_len(&nals[i..]).max(1)
            } else {
                1
            };
            let is_last = i + group == nals.len();

            if group > 1 {
                packets.push(self.stap_a(&nals[i..i + group], is_last));
            } else {
                packets.append(&mut self.packetize_nal(nals[i], is_last));
            }
            i += group;
        }
        packets
    }

    /// Number of leading NALs that fit together in one STAP-A.
    fn aggregation_len(&self, nals: &[&[u8]]) -> usize {
        let mut size = 1;
        let mut count = 0;
        for nal in nals {
            let entry = 2 + nal.len();
            if nal.len() > u16::MAX as usize || size + entry > self.mtu {
                break;
            }
            size += entry;
            count += 1;
        }
        count
    }

    fn stap_a(&mut self, nals: &[&[u8]], marker: bool) -> Vec<u8> {
        // F is the OR of all F bits, NRI the maximum NRI.
        let f = nals.iter().fold(0u8, |acc, nal| acc | (nal[0] & 0x80));
        let nri = nals.iter().map(|nal| nal[0] & 0x60).max().unwrap_or(0);

        let body: usize = nals.iter().map(|nal| 2 + nal.len()).sum();
        let mut packet = Vec::with_capacity(FIXED_HEADER_LEN + 1 + body);
        self.header.put(&mut packet, marker);
        packet.push(f | nri | STAP_A);
        for nal in nals {
            packet.extend_from_slice(&(nal.len() as u16).to_be_bytes());
            packet.extend_from_slice(nal);
        }

        tracing::trace!(nal_count = nals.len(), bytes = packet.len(), "STAP-A aggregated");
        packet
    }

    /// Packetize a single NAL unit into one or more RTP packets.
    ///
    /// If the NAL fits within the MTU, it is sent as a Single NAL Unit
    /// packet. Otherwise, FU-A fragmentation is used.
    fn packetize_nal(&mut self, nal_unit: &[u8], is_last_nal: bool) -> Vec<Vec<u8>> {
        let mut packets = Vec::new();

        if nal_unit.is_empty() {
            return packets;
        }

        if nal_unit.len() <= self.mtu {
            let mut packet = Vec::with_capacity(FIXED_HEADER_LEN + nal_unit.len());
            self.header.put(&mut packet, is_last_nal);
            packet.extend_from_slice(nal_unit);
            packets.push(packet);
            return packets;
        }

        let nal_header = nal_unit[0];
        let nal_type = nal_header & 0x1F;
        let fu_indicator = (nal_header & 0xE0) | FU_A;
        let payload = &nal_unit[1..];

        // 2 bytes for FU indicator + FU header
        let max_fragment = self.mtu - 2;
        let mut chunks = payload.chunks(max_fragment).peekable();
        let mut first = true;

        while let Some(chunk) = chunks.next() {
            let last_fragment = chunks.peek().is_none();

            // FU header: S=start, E=end, R=0, Type=original NAL type
            let start_bit = if first { 0x80 } else { 0x00 };
            let end_bit = if last_fragment { 0x40 } else { 0x00 };
            let fu_header = start_bit | end_bit | nal_type;

            let mut packet = Vec::with_capacity(FIXED_HEADER_LEN + 2 + chunk.len());
            self.header.put(&mut packet, is_last_nal && last_fragment);
            packet.push(fu_indicator);
            packet.push(fu_header);
            packet.extend_from_slice(chunk);
            packets.push(packet);

            first = false;
        }

        tracing::trace!(
            nal_type,
            nal_size = nal_unit.len(),
            fragments = packets.len(),
            "FU-A fragmented NAL unit"
        );

        packets
    }
}

impl Packetizer for H264Packetizer {
    fn packetize(&mut self, encoded_data: &[u8], timestamp_increment: u32) -> Vec<Vec<u8>> {
        let nal_units = annexb::split_nal_units(encoded_data);
        let packets = self.packetize_frame(&nal_units);
        self.advance_timestamp(timestamp_increment);

        tracing::trace!(
            nal_count = nal_units.len(),
            rtp_packets = packets.len(),
            frame_bytes = encoded_data.len(),
            seq = self.header.sequence(),
            ts = self.header.timestamp(),
            "frame packetized"
        );

        packets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::rtp::RtpPacket;

    fn make_packetizer() -> H264Packetizer {
        H264Packetizer::new(96, 0xAABBCCDD)
    }

    #[test]
    fn small_nal_single_packet() {
        let mut p = make_packetizer();
        let nal = vec![0x65, 0xAA, 0xBB, 0xCC];
        let packets = p.packetize_nal(&nal, true);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].len(), 12 + 4);
        assert_eq!(packets[0][1] & 0x80, 0x80); // marker bit
        assert_eq!(&packets[0][12..], &nal[..]);
    }

    #[test]
    fn large_nal_fragmented() {
        let mut p = make_packetizer();
        let mut nal = vec![0x65];
        nal.extend(vec![0xAA; DEFAULT_MTU + 500]);
        let packets = p.packetize_nal(&nal, true);
        assert_eq!(packets.len(), 2);

        assert_eq!(packets[0][12], 0x60 | 28); // FU indicator keeps NRI
        assert_eq!(packets[0][13], 0x80 | 5); // start bit, original type
        assert_eq!(packets[0][1] & 0x80, 0); // no marker mid-NAL

        let last = packets.last().unwrap();
        assert_eq!(last[13], 0x40 | 5); // end bit
        assert_eq!(last[1] & 0x80, 0x80); // marker bit
    }

    #[test]
    fn exact_multiple_has_no_empty_fragment() {
        let mut p = make_packetizer().with_mtu(6);
        // 1 header byte + 8 data bytes at 4 bytes per fragment
        let nal = [0x41, 1, 2, 3, 4, 5, 6, 7, 8];
        let packets = p.packetize_nal(&nal, false);
        assert_eq!(packets.len(), 2);
        assert!(packets.iter().all(|pkt| pkt.len() == 12 + 2 + 4));
    }

    #[test]
    fn empty_nal_no_packets() {
        let mut p = make_packetizer();
        assert!(p.packetize_nal(&[], true).is_empty());
    }

    #[test]
    fn aggregation_packs_small_units() {
        let mut p = make_packetizer().with_aggregation(true);
        let sps: &[u8] = &[0x67, 0x42, 0x00, 0x1E];
        let pps: &[u8] = &[0x68, 0xCE, 0x38, 0x80];
        let idr: &[u8] = &[0x25, 0x88, 0x84];
        let packets = p.packetize_frame(&[sps, pps, idr]);
        assert_eq!(packets.len(), 1);

        let pkt = &packets[0];
        assert_eq!(pkt[1] & 0x80, 0x80);
        assert_eq!(pkt[12], 0x60 | STAP_A); // max NRI across units
        assert_eq!(&pkt[13..15], &[0x00, 0x04]);
        assert_eq!(&pkt[15..19], sps);
        assert_eq!(pkt.len(), 12 + 1 + 3 * 2 + 4 + 4 + 3);
    }

    #[test]
    fn aggregation_splits_at_mtu() {
        let mut p = make_packetizer().with_aggregation(true).with_mtu(12);
        let a: &[u8] = &[0x67, 1, 2, 3];
        let b: &[u8] = &[0x68, 1, 2];
        let c: &[u8] = &[0x65, 1, 2, 3, 4, 5, 6, 7, 8, 9];
        let packets = p.packetize_frame(&[a, b, c]);
        // STAP-A(a, b) = 1 + 6 + 5 = 12 bytes, then c alone as a single NAL.
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0][12] & 0x1F, STAP_A);
        assert_eq!(packets[0][1] & 0x80, 0);
        assert_eq!(&packets[1][12..], c);
        assert_eq!(packets[1][1] & 0x80, 0x80);
    }

    #[test]
    fn packetize_trait_advances_timestamp() {
        let mut p = make_packetizer();
        let frame = [0, 0, 0, 1, 0x65, 0xAA, 0xBB];
        let first = p.packetize(&frame, 3000);
        let second = p.packetize(&frame, 3000);
        let first = RtpPacket::parse(&first[0]).unwrap();
        let second = RtpPacket::parse(&second[0]).unwrap();
        assert_eq!(first.timestamp, 0);
        assert_eq!(second.timestamp, 3000);
        assert_eq!(second.sequence_number, first.sequence_number + 1);
        assert_eq!(second.ssrc, p.ssrc());
    }
}
