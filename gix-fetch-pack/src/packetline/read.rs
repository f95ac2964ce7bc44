use std::io::{self, Read};

use bstr::{BString, ByteSlice};
use gix_hash::ObjectId;
use gix_packetline::{
    decode::{self, PacketLineOrWantedSize},
    PacketLineRef,
};

use super::{SideBandReader, HEADER_LEN};
use crate::{
    error::{Error, Result},
    progress::ProgressSink,
    types::{protocol, AckNak, PacketLine},
};

/// Reads packets from the remote side of the transport.
pub struct PacketLineIn<R> {
    inner: R,
}

impl<R: Read> PacketLineIn<R> {
    /// Read packets from `inner`.
    ///
    /// No buffering is done here so that the bytes following negotiation can be
    /// handed to the pack indexer untouched.
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read the 4-byte length header of the next packet.
    ///
    /// Returns `0` for a flush packet, otherwise the total packet length including the header.
    /// `0004` is an empty data packet. The protocol v2 delimiter and response-end packets
    /// have no meaning here and are rejected like any other length below the header size.
    pub fn read_length(&mut self) -> Result<u16> {
        let mut header = Vec::with_capacity(HEADER_LEN);
        (&mut self.inner).take(HEADER_LEN as u64).read_to_end(&mut header)?;
        if header.len() < HEADER_LEN {
            return Err(Error::framing("truncated packet line header", header));
        }
        match decode::hex_prefix(&header) {
            Ok(PacketLineOrWantedSize::Line(PacketLineRef::Flush)) => Ok(0),
            Ok(PacketLineOrWantedSize::Line(_)) => Err(Error::framing("invalid packet line header", header.as_slice())),
            Ok(PacketLineOrWantedSize::Wanted(payload_len)) => Ok(payload_len + HEADER_LEN as u16),
            Err(decode::Error::DataIsEmpty) => Ok(HEADER_LEN as u16),
            Err(err) => Err(Error::framing(
                format!("invalid packet line header ({err})"),
                header.as_slice(),
            )),
        }
    }

    /// Read the next packet, distinguishing a flush packet from an empty data packet.
    pub fn read_packet(&mut self) -> Result<PacketLine> {
        let len = self.read_length()?;
        if len == 0 {
            return Ok(PacketLine::Flush);
        }
        let mut payload = vec![0u8; len as usize - HEADER_LEN];
        match self.inner.read_exact(&mut payload) {
            Ok(()) => Ok(PacketLine::Data(payload.into())),
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Err(Error::framing(
                format!("truncated packet line payload, expected {} bytes", payload.len()),
                format!("{len:04x}"),
            )),
            Err(err) => Err(err.into()),
        }
    }

    /// Read the next packet as text with one trailing newline removed.
    ///
    /// A flush packet yields the empty string. Invalid UTF-8 is replaced.
    pub fn read_line(&mut self) -> Result<String> {
        let mut raw = self.read_line_raw()?;
        if raw.last() == Some(&b'\n') {
            raw.pop();
        }
        Ok(raw.to_str_lossy().into_owned())
    }

    /// Read the next packet payload verbatim, for binary-safe payloads.
    ///
    /// A flush packet yields an empty payload.
    pub fn read_line_raw(&mut self) -> Result<BString> {
        Ok(match self.read_packet()? {
            PacketLine::Data(data) => data,
            PacketLine::Flush => BString::default(),
        })
    }

    /// Read one response of the negotiation, i.e. `NAK` or one of the `ACK` forms.
    pub fn read_ack(&mut self) -> Result<(AckNak, Option<ObjectId>)> {
        let line = self.read_line()?;
        parse_ack(&line)
    }

    /// Demultiplex the side-band channels of all following packets.
    ///
    /// Pack data is read through [`SideBandReader::as_read()`], progress messages are passed to `progress`.
    /// Nothing past the terminating flush packet is consumed.
    pub fn sideband<'a>(&'a mut self, progress: &'a mut dyn ProgressSink) -> SideBandReader<'a, R> {
        SideBandReader::new(self, progress)
    }

    /// Access the underlying stream, e.g. to read a pack without side-band.
    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Return the underlying stream.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Parse `line`, stripped of its newline, as `NAK` or `ACK <id>[ continue|common|ready]`.
pub fn parse_ack(line: &str) -> Result<(AckNak, Option<ObjectId>)> {
    if line.is_empty() {
        return Err(Error::protocol("expected ACK/NAK, found EOF", line));
    }
    if line == protocol::NAK {
        return Ok((AckNak::Nak, None));
    }
    let Some(rest) = line.strip_prefix(protocol::ACK_PREFIX) else {
        return Err(Error::protocol("expected ACK/NAK", line));
    };
    let hex_len = gix_hash::Kind::Sha1.len_in_hex();
    let (hex, suffix) = match (rest.get(..hex_len), rest.get(hex_len..)) {
        (Some(hex), Some(suffix)) => (hex, suffix),
        _ => return Err(Error::protocol("expected ACK/NAK", line)),
    };
    let id = ObjectId::from_hex(hex.as_bytes()).map_err(|_| Error::protocol("expected ACK/NAK", line))?;
    let kind = match suffix {
        "" => AckNak::Ack,
        protocol::ACK_CONTINUE_SUFFIX => AckNak::Continue,
        protocol::ACK_COMMON_SUFFIX => AckNak::Common,
        protocol::ACK_READY_SUFFIX => AckNak::Ready,
        _ => return Err(Error::protocol("expected ACK/NAK", line)),
    };
    Ok((kind, Some(id)))
}
