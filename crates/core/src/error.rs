//! Error types for RTP parsing and H.264 depacketization.

use std::fmt;

/// Errors returned by the RTP parser and the H.264 depacketizer.
///
/// Every variant describes one packet; none of them leave the depacketizer in
/// an inconsistent state, so callers may drop the packet and keep going.
///
/// - **Structure**: [`MalformedPacket`](Self::MalformedPacket): the bytes do
///   not match RFC 3550 / RFC 6184 framing.
/// - **Reassembly**: [`OrphanedFragment`](Self::OrphanedFragment),
///   [`FragmentTooLarge`](Self::FragmentTooLarge),
///   [`SequenceGap`](Self::SequenceGap).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Structural violation detected while parsing.
    #[error("malformed packet: {kind}")]
    MalformedPacket { kind: MalformedKind },

    /// A middle or end fragment arrived with no open run for its type.
    #[error("orphaned {fu} fragment: no start fragment seen")]
    OrphanedFragment { fu: FragmentKind },

    /// A fragmentation run grew past the configured byte cap and was dropped.
    #[error("{fu} run exceeded {limit} bytes and was dropped")]
    FragmentTooLarge { fu: FragmentKind, limit: usize },

    /// A fragment did not follow the previous one of its run; the run was dropped.
    #[error("{fu} run dropped: expected sequence {expected}, got {actual}")]
    SequenceGap {
        fu: FragmentKind,
        expected: u16,
        actual: u16,
    },
}

impl Error {
    pub(crate) fn malformed(kind: MalformedKind) -> Self {
        Self::MalformedPacket { kind }
    }
}

/// Specific reason a packet was rejected as malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedKind {
    /// Fewer than the 12 bytes of the fixed RTP header.
    TooShort { len: usize },
    /// RTP version field was not 2.
    BadVersion(u8),
    /// CSRC list runs past the end of the buffer.
    TruncatedCsrcList { needed: usize, available: usize },
    /// Extension header or its declared body runs past the end of the buffer.
    TruncatedExtension { needed: usize, available: usize },
    /// Padding count is zero or larger than the payload.
    BadPadding { count: u8, available: usize },
    /// Not enough bytes left to read a 16-bit NAL unit length.
    TruncatedLengthPrefix { offset: usize },
    /// DON / timestamp-offset fields cut short.
    TruncatedEntryHeader { offset: usize },
    /// Declared NAL unit length exceeds the remaining payload.
    LengthExceedsPayload {
        offset: usize,
        declared: usize,
        remaining: usize,
    },
    /// Bytes left over after the last complete aggregation entry.
    TrailingBytes { offset: usize, remaining: usize },
    /// An aggregation entry declared a zero-length NAL unit.
    EmptyNalUnit { offset: usize },
    /// Fragment shorter than its FU indicator/header (and FU-B DON/offset).
    TruncatedFragmentHeader { len: usize },
    /// Start and end bits set on the same fragment.
    StartAndEnd,
}

impl fmt::Display for MalformedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { len } => write!(f, "{len} bytes is shorter than an RTP header"),
            Self::BadVersion(v) => write!(f, "bad RTP version: {v}"),
            Self::TruncatedCsrcList { needed, available } => write!(
                f,
                "CSRC list needs {needed} bytes, only {available} available"
            ),
            Self::TruncatedExtension { needed, available } => write!(
                f,
                "header extension needs {needed} bytes, only {available} available"
            ),
            Self::BadPadding { count, available } => write!(
                f,
                "padding count {count} invalid for {available} payload bytes"
            ),
            Self::TruncatedLengthPrefix { offset } => {
                write!(f, "truncated NAL unit length at offset {offset}")
            }
            Self::TruncatedEntryHeader { offset } => {
                write!(f, "truncated DON/timestamp offset at offset {offset}")
            }
            Self::LengthExceedsPayload {
                offset,
                declared,
                remaining,
            } => write!(
                f,
                "NAL unit at offset {offset} declares {declared} bytes, {remaining} remain"
            ),
            Self::TrailingBytes { offset, remaining } => {
                write!(f, "{remaining} trailing bytes at offset {offset}")
            }
            Self::EmptyNalUnit { offset } => write!(f, "zero-length NAL unit at offset {offset}"),
            Self::TruncatedFragmentHeader { len } => {
                write!(f, "fragment of {len} bytes is shorter than its header")
            }
            Self::StartAndEnd => write!(f, "fragment has both start and end bits set"),
        }
    }
}

/// Fragmentation unit flavour (RFC 6184 §5.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentKind {
    FuA,
    FuB,
}

impl fmt::Display for FragmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FuA => write!(f, "FU-A"),
            Self::FuB => write!(f, "FU-B"),
        }
    }
}

/// Convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
