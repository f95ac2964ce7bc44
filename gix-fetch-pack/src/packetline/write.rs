use std::io::{self, Write};

use gix_packetline::encode;

use crate::error::{Error, Result};

/// Writes packets to the remote side of the transport.
pub struct PacketLineOut<W> {
    inner: W,
}

impl<W: Write> PacketLineOut<W> {
    /// Write packets to `inner`.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write `text` as a single data packet. The caller provides the trailing newline.
    pub fn write_line(&mut self, text: &str) -> Result<()> {
        self.write_raw(text.as_bytes())
    }

    /// Write `data` as a single data packet without flushing.
    ///
    /// Empty and oversized payloads are rejected before anything is written.
    pub fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        encode::data_to_write(data, &mut self.inner)
            .map(|_| ())
            .map_err(|err| from_encode(err, data))
    }

    /// Write a flush packet and flush the underlying stream.
    ///
    /// This must precede every read whose answer depends on packets written so far.
    pub fn end(&mut self) -> Result<()> {
        encode::flush_to_write(&mut self.inner)?;
        self.flush()
    }

    /// Flush the underlying stream without writing a flush packet.
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Access the underlying stream.
    pub fn inner_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Return the underlying stream.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Encoding errors travel as I/O errors, keep them apart from real transport failures.
fn from_encode(err: io::Error, data: &[u8]) -> Error {
    if err.get_ref().map_or(false, |inner| inner.is::<encode::Error>()) {
        Error::framing(err.to_string(), &data[..16.min(data.len())])
    } else {
        Error::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn header_counts_itself() {
        let mut out = PacketLineOut::new(Vec::new());
        out.write_line("want 1234\n").unwrap();
        assert_eq!(out.into_inner(), b"000ewant 1234\n");
    }

    #[test]
    fn end_writes_flush_packet() {
        let mut out = PacketLineOut::new(Vec::new());
        out.write_line("done\n").unwrap();
        out.flush().unwrap();
        assert_eq!(out.inner_mut().as_slice(), b"0009done\n");
        out.end().unwrap();
        assert_eq!(out.into_inner(), b"0009done\n0000");
    }

    #[test]
    fn oversized_payloads_are_rejected() {
        let mut out = PacketLineOut::new(Vec::new());
        out.write_raw(&vec![b'x'; 65516]).unwrap();
        let written = out.inner_mut().len();
        assert_eq!(written, 65520, "the largest payload still fits");

        let err = out.write_raw(&vec![b'x'; 65517]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Framing);
        assert_eq!(out.into_inner().len(), written, "nothing of the oversized packet was written");
    }

    #[test]
    fn empty_payloads_are_rejected() {
        let mut out = PacketLineOut::new(Vec::new());
        assert_eq!(out.write_raw(b"").unwrap_err().kind(), ErrorKind::Framing);
        assert!(out.into_inner().is_empty());
    }
}
