//! RTP over a byte stream, framed per RFC 4571: each packet is preceded by
//! its length as a big-endian u16.

use std::io::{self, Read, Write};

/// Reads length-prefixed RTP packets until end of stream.
pub struct FrameReader<R> {
    inner: R,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Next packet, or `None` at a clean end of stream.
    ///
    /// End of stream inside a length prefix or packet body is an
    /// [`io::ErrorKind::UnexpectedEof`] error.
    pub fn next_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut len = [0u8; 2];
        let mut filled = 0;
        while filled < len.len() {
            match self.inner.read(&mut len[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "stream ended inside a length prefix",
                    ));
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        let mut packet = vec![0u8; u16::from_be_bytes(len) as usize];
        self.inner.read_exact(&mut packet)?;
        Ok(Some(packet))
    }
}

impl<R: Read> Iterator for FrameReader<R> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}

/// Write one packet with its length prefix.
pub fn write_frame<W: Write>(w: &mut W, packet: &[u8]) -> io::Result<()> {
    let len = u16::try_from(packet.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} byte packet does not fit a 16-bit frame length", packet.len()),
        )
    })?;
    w.write_all(&len.to_be_bytes())?;
    w.write_all(packet)
}
