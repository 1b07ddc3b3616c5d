//! H.264 Annex B byte stream helpers.
//!
//! Annex B delimits NAL units with start codes:
//! - 4-byte: `0x00 0x00 0x00 0x01`
//! - 3-byte: `0x00 0x00 0x01`

pub const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// Split an Annex B bitstream into NAL units, start codes excluded.
///
/// Both start code lengths are accepted and may be mixed. Bytes before the
/// first start code are skipped.
pub fn split_nal_units(data: &[u8]) -> Vec<&[u8]> {
    // (nal_data_start_index, start_code_length)
    let mut starts: Vec<(usize, usize)> = Vec::new();
    let mut i = 0usize;
    while i < data.len() {
        if data[i..].starts_with(&START_CODE) {
            starts.push((i + 4, 4));
            i += 4;
        } else if data[i..].starts_with(&START_CODE[1..]) {
            starts.push((i + 3, 3));
            i += 3;
        } else {
            i += 1;
        }
    }

    let mut nal_units = Vec::with_capacity(starts.len());
    for (idx, &(start, _)) in starts.iter().enumerate() {
        let end = match starts.get(idx + 1) {
            Some(&(next_start, next_sc_len)) => next_start - next_sc_len,
            None => data.len(),
        };
        if start < end {
            nal_units.push(&data[start..end]);
        }
    }
    nal_units
}

/// Append `nal` to `out` behind a 4-byte start code.
pub fn append_nal_unit(out: &mut Vec<u8>, nal: &[u8]) {
    out.reserve(START_CODE.len() + nal.len());
    out.extend_from_slice(&START_CODE);
    out.extend_from_slice(nal);
}

/// Join NAL units into an Annex B bitstream.
pub fn join_nal_units<I, T>(nals: I) -> Vec<u8>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut out = Vec::new();
    for nal in nals {
        append_nal_unit(&mut out, nal.as_ref());
    }
    out
}
