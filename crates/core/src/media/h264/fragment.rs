//! Fragmentation units: FU-A and FU-B (RFC 6184 §5.8).
//!
//! ```text
//! FU indicator:  [F|NRI|Type=28/29]   (1 byte)
//! FU header:     [S|E|R|NAL_Type]     (1 byte)
//! FU-B only:     [DON(16)|TS offset(24)]
//! Fragment data: [...]
//! ```
//!
//! The original NAL header is not transmitted. It is rebuilt from the F and
//! NRI bits of the indicator and the type bits of the FU header, then
//! prepended to the concatenated fragment data.

use bytes::Buf;

use super::{DecodingOrder, NalUnit};
use crate::error::{Error, FragmentKind, MalformedKind, Result};

impl FragmentKind {
    /// Offset of the fragment data within the RTP payload.
    pub fn data_offset(self) -> usize {
        match self {
            Self::FuA => 2,
            Self::FuB => 7,
        }
    }
}

/// A parsed FU-A or FU-B payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment<'a> {
    pub kind: FragmentKind,
    pub start: bool,
    pub end: bool,
    /// Reconstructed header of the fragmented NAL unit.
    pub nal_header: u8,
    /// FU-B only.
    pub decoding_order: Option<DecodingOrder>,
    pub data: &'a [u8],
}

impl<'a> Fragment<'a> {
    pub fn parse(kind: FragmentKind, payload: &'a [u8]) -> Result<Self> {
        let data_offset = kind.data_offset();
        if payload.len() < data_offset {
            return Err(Error::malformed(MalformedKind::TruncatedFragmentHeader {
                len: payload.len(),
            }));
        }

        let fu_indicator = payload[0];
        let fu_header = payload[1];
        let start = fu_header & 0x80 != 0;
        let end = fu_header & 0x40 != 0;
        if start && end {
            return Err(Error::malformed(MalformedKind::StartAndEnd));
        }

        let decoding_order = match kind {
            FragmentKind::FuA => None,
            FragmentKind::FuB => {
                let mut fields = &payload[2..data_offset];
                Some(DecodingOrder {
                    don: fields.get_u16(),
                    ts_offset: fields.get_uint(3) as u32,
                })
            }
        };

        Ok(Self {
            kind,
            start,
            end,
            nal_header: (fu_indicator & 0xE0) | (fu_header & 0x1F),
            decoding_order,
            data: &payload[data_offset..],
        })
    }
}

#[derive(Debug)]
struct Run {
    buf: Vec<u8>,
    decoding_order: Option<DecodingOrder>,
    last_sequence: Option<u16>,
}

#[derive(Debug)]
enum RunState {
    Idle,
    Accumulating(Run),
}

/// Limits applied by a [`Reassembler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReassemblyLimits {
    pub max_bytes: Option<usize>,
    pub drop_on_sequence_gap: bool,
}

/// Reassembly state machine for one fragmentation type.
///
/// `Idle -> Accumulating` on a start fragment, back to `Idle` on an end
/// fragment. A start fragment while accumulating drops the open run; that
/// is the only recovery the protocol offers for a lost end fragment.
#[derive(Debug)]
pub struct Reassembler {
    kind: FragmentKind,
    state: RunState,
}

impl Reassembler {
    pub fn new(kind: FragmentKind) -> Self {
        Self {
            kind,
            state: RunState::Idle,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, RunState::Idle)
    }

    /// Bytes held by the open run, reconstructed header included.
    pub fn buffered_len(&self) -> usize {
        match &self.state {
            RunState::Idle => 0,
            RunState::Accumulating(run) => run.buf.len(),
        }
    }

    /// Drop any open run.
    pub fn reset(&mut self) {
        self.state = RunState::Idle;
    }

    /// Feed one fragment. Returns the NAL unit when the fragment closes a run.
    ///
    /// `sequence` is the RTP sequence number of the carrying packet, when known.
    pub fn push(
        &mut self,
        fragment: &Fragment<'_>,
        sequence: Option<u16>,
        limits: ReassemblyLimits,
    ) -> Result<Option<NalUnit>> {
        debug_assert_eq!(fragment.kind, self.kind);
        let fu = self.kind;

        if fragment.start {
            if let RunState::Accumulating(run) = &self.state {
                tracing::warn!(
                    %fu,
                    dropped_bytes = run.buf.len(),
                    "start fragment before end of previous run; dropping incomplete NAL unit"
                );
            }
            self.state = RunState::Idle;

            let len = 1 + fragment.data.len();
            if let Some(limit) = limits.max_bytes.filter(|&limit| len > limit) {
                tracing::warn!(%fu, bytes = len, limit, "fragment run exceeded size limit; dropping");
                return Err(Error::FragmentTooLarge { fu, limit });
            }

            let mut buf = Vec::with_capacity(len);
            buf.push(fragment.nal_header);
            buf.extend_from_slice(fragment.data);
            tracing::trace!(%fu, nal_type = fragment.nal_header & 0x1F, "fragment run started");
            self.state = RunState::Accumulating(Run {
                buf,
                decoding_order: fragment.decoding_order,
                last_sequence: sequence,
            });
            return Ok(None);
        }

        let run = match &mut self.state {
            RunState::Accumulating(run) => run,
            RunState::Idle => return Err(Error::OrphanedFragment { fu }),
        };

        if limits.drop_on_sequence_gap {
            if let (Some(prev), Some(actual)) = (run.last_sequence, sequence) {
                let expected = prev.wrapping_add(1);
                if actual != expected {
                    tracing::warn!(%fu, expected, actual, "sequence gap inside fragment run; dropping");
                    self.state = RunState::Idle;
                    return Err(Error::SequenceGap {
                        fu,
                        expected,
                        actual,
                    });
                }
            }
        }

        let len = run.buf.len() + fragment.data.len();
        if let Some(limit) = limits.max_bytes.filter(|&limit| len > limit) {
            tracing::warn!(%fu, bytes = len, limit, "fragment run exceeded size limit; dropping");
            self.state = RunState::Idle;
            return Err(Error::FragmentTooLarge { fu, limit });
        }

        run.buf.extend_from_slice(fragment.data);
        run.last_sequence = sequence;

        if !fragment.end {
            return Ok(None);
        }

        let data = std::mem::take(&mut run.buf);
        let decoding_order = run.decoding_order;
        self.state = RunState::Idle;
        tracing::trace!(%fu, bytes = data.len(), "fragment run completed");
        Ok(Some(NalUnit::new(data, decoding_order)))
    }
}
