use super::aggregation::{self, TsOffsetWidth};
use super::fragment::{Fragment, ReassemblyLimits, Reassembler};
use super::{Extracted, NalHeader, NalUnit, PayloadKind};
use crate::error::{FragmentKind, Result};
use crate::media::rtp::RtpPacket;

/// Default cap on the bytes buffered by one fragmentation run.
pub const DEFAULT_MAX_FRAGMENT_BYTES: usize = 4 * 1024 * 1024;

/// Depacketizer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepacketizerConfig {
    /// Largest NAL unit a FU-A/FU-B run may reassemble. `None` disables the cap.
    pub max_fragment_bytes: Option<usize>,
    /// Drop a fragmentation run when the RTP sequence number of a fragment
    /// does not follow the previous fragment of that run.
    pub drop_run_on_sequence_gap: bool,
}

impl Default for DepacketizerConfig {
    fn default() -> Self {
        Self {
            max_fragment_bytes: Some(DEFAULT_MAX_FRAGMENT_BYTES),
            drop_run_on_sequence_gap: false,
        }
    }
}

/// H.264 RTP depacketizer (RFC 6184) for a single RTP stream.
///
/// Owns one reassembly buffer per fragmentation type. Create one instance per
/// SSRC; instances must not be shared between streams.
///
/// Every packet produces either nothing, one NAL unit or an ordered list of
/// NAL units (see [`Extracted`]). Errors reject only the offending packet:
/// they are detected before any buffer is touched, except for the size cap
/// and sequence-gap checks which drop the run they apply to.
#[derive(Debug)]
pub struct H264Depacketizer {
    config: DepacketizerConfig,
    fu_a: Reassembler,
    fu_b: Reassembler,
}

impl H264Depacketizer {
    pub fn new() -> Self {
        Self::with_config(DepacketizerConfig::default())
    }

    pub fn with_config(config: DepacketizerConfig) -> Self {
        Self {
            config,
            fu_a: Reassembler::new(FragmentKind::FuA),
            fu_b: Reassembler::new(FragmentKind::FuB),
        }
    }

    pub fn config(&self) -> &DepacketizerConfig {
        &self.config
    }

    /// Parse a raw RTP packet and extract the NAL units it carries.
    pub fn extract_access_unit(&mut self, packet: &[u8]) -> Result<Extracted> {
        let packet = RtpPacket::parse(packet)?;
        self.extract_packet(&packet)
    }

    /// Extract from an already-parsed RTP packet.
    pub fn extract_packet(&mut self, packet: &RtpPacket<'_>) -> Result<Extracted> {
        self.extract(packet.payload(), Some(packet.sequence_number))
    }

    /// Extract from a bare RTP payload.
    ///
    /// Sequence-gap detection is unavailable on this path.
    pub fn extract_payload(&mut self, payload: &[u8]) -> Result<Extracted> {
        self.extract(payload, None)
    }

    /// Whether a fragmentation run is open for either FU type.
    pub fn has_pending_fragments(&self) -> bool {
        !self.fu_a.is_idle() || !self.fu_b.is_idle()
    }

    /// Drop all reassembly state.
    pub fn reset(&mut self) {
        self.fu_a.reset();
        self.fu_b.reset();
    }

    fn extract(&mut self, payload: &[u8], sequence: Option<u16>) -> Result<Extracted> {
        let Some(&first) = payload.first() else {
            tracing::trace!("empty payload ignored");
            return Ok(Extracted::Nothing);
        };

        let extracted = match PayloadKind::from(NalHeader::new(first)) {
            PayloadKind::Reserved(nal_type) => {
                tracing::trace!(nal_type, "reserved NAL type ignored");
                Extracted::Nothing
            }
            PayloadKind::Single(_) => Extracted::Single(NalUnit::new(payload.to_vec(), None)),
            PayloadKind::StapA => Extracted::Aggregate(aggregation::parse_stap_a(payload)?),
            PayloadKind::StapB => Extracted::Aggregate(aggregation::parse_stap_b(payload)?),
            PayloadKind::Mtap16 => Extracted::Aggregate(aggregation::parse_mtap(
                payload,
                TsOffsetWidth::Bits16,
            )?),
            PayloadKind::Mtap24 => Extracted::Aggregate(aggregation::parse_mtap(
                payload,
                TsOffsetWidth::Bits24,
            )?),
            PayloadKind::FuA => self.reassemble(FragmentKind::FuA, payload, sequence)?,
            PayloadKind::FuB => self.reassemble(FragmentKind::FuB, payload, sequence)?,
        };

        if let Extracted::Aggregate(nals) = &extracted {
            tracing::trace!(
                nal_type = first & 0x1F,
                nal_count = nals.len(),
                "aggregation packet unpacked"
            );
        }
        Ok(extracted)
    }

    fn reassemble(
        &mut self,
        kind: FragmentKind,
        payload: &[u8],
        sequence: Option<u16>,
    ) -> Result<Extracted> {
        let fragment = Fragment::parse(kind, payload)?;
        let limits = ReassemblyLimits {
            max_bytes: self.config.max_fragment_bytes,
            drop_on_sequence_gap: self.config.drop_run_on_sequence_gap,
        };
        let reassembler = match kind {
            FragmentKind::FuA => &mut self.fu_a,
            FragmentKind::FuB => &mut self.fu_b,
        };
        Ok(reassembler
            .push(&fragment, sequence, limits)?
            .map_or(Extracted::Nothing, Extracted::Single))
    }
}

impl Default for H264Depacketizer {
    fn default() -> Self {
        Self::new()
    }
}
