use std::io::{self, Read};

use bstr::{BString, ByteSlice};
use gix_packetline::{decode, read::ProgressAction, read::WithSidebands, PacketLineRef, StreamingPeekableIter};

use super::PacketLineIn;
use crate::{error::Error, progress::ProgressSink};

/// Progress handler of the side-band stream, deciding whether reading may go on.
pub type HandleProgress<'a> = Box<dyn FnMut(bool, &[u8]) -> ProgressAction + 'a>;

/// Demultiplexes side-band packets into a plain stream of pack bytes.
///
/// Data on channel 1 is returned by the reader of [`as_read()`](Self::as_read), text on
/// channel 2 is passed to the progress sink, and channel 3 stops reading with the
/// message of the remote. A flush packet ends the stream.
///
/// After a failed read, [`error()`](Self::error) tells why reading stopped.
pub struct SideBandReader<'a, R> {
    lines: StreamingPeekableIter<&'a mut R>,
    progress: &'a mut dyn ProgressSink,
    stopped: Option<Stop>,
}

enum Stop {
    Cancelled,
    Remote(BString),
}

impl<'a, R: Read> SideBandReader<'a, R> {
    pub(crate) fn new(input: &'a mut PacketLineIn<R>, progress: &'a mut dyn ProgressSink) -> Self {
        Self {
            lines: StreamingPeekableIter::new(input.inner_mut(), &[PacketLineRef::Flush], false),
            progress,
            stopped: None,
        }
    }

    /// The pack bytes of channel 1.
    ///
    /// Progress is checked for cancellation whenever the remote reports some.
    pub fn as_read(&mut self) -> WithSidebands<'_, &'a mut R, HandleProgress<'_>> {
        let Self {
            lines,
            progress,
            stopped,
        } = self;
        let handle_progress: HandleProgress<'_> = Box::new(move |is_error: bool, text: &[u8]| {
            if is_error {
                let message = text.trim().as_bstr().to_owned();
                tracing::debug!(%message, "remote reported a fatal error");
                *stopped = Some(Stop::Remote(message));
                return ProgressAction::Interrupt;
            }
            for message in text.split(|b| *b == b'\r' || *b == b'\n') {
                let message = message.trim();
                if !message.is_empty() {
                    progress.report(&message.to_str_lossy());
                }
            }
            if progress.is_cancelled() {
                *stopped = Some(Stop::Cancelled);
                ProgressAction::Interrupt
            } else {
                ProgressAction::Continue
            }
        });
        lines.as_read_with_sidebands(handle_progress)
    }

    /// Turn `err`, as returned by the reader of [`as_read()`](Self::as_read), into what caused it.
    pub fn error(&mut self, err: io::Error) -> Error {
        match self.stopped.take() {
            Some(Stop::Cancelled) => Error::Cancelled,
            Some(Stop::Remote(message)) => Error::Io(io::Error::other(format!("remote error: {message}"))),
            None => from_io(err),
        }
    }
}

/// Malformed packets surface from the stream as I/O errors wrapping the decoder's error.
pub(crate) fn from_io(err: io::Error) -> Error {
    let Some(inner) = err.get_ref() else {
        return Error::Io(err);
    };
    if let Some(band) = inner.downcast_ref::<decode::band::Error>() {
        let raw = match band {
            decode::band::Error::InvalidSideBand { band_id } => BString::from(vec![*band_id]),
            decode::band::Error::NonDataLine => BString::default(),
        };
        Error::framing(band.to_string(), raw)
    } else if let Some(line) = inner.downcast_ref::<decode::Error>() {
        let raw = match line {
            decode::Error::Line { data, .. } => data.clone(),
            _ => BString::default(),
        };
        Error::framing(line.to_string(), raw)
    } else {
        Error::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ErrorKind, packetline::PacketLineOut};
    use std::io::Cursor;

    #[derive(Default)]
    struct Recorder {
        messages: Vec<String>,
        cancel: bool,
    }

    impl ProgressSink for Recorder {
        fn report(&mut self, message: &str) {
            self.messages.push(message.to_owned());
        }

        fn is_cancelled(&self) -> bool {
            self.cancel
        }
    }

    fn banded(packets: &[(u8, &[u8])]) -> Vec<u8> {
        let mut out = PacketLineOut::new(Vec::new());
        for (band, payload) in packets {
            let mut data = vec![*band];
            data.extend_from_slice(payload);
            out.write_raw(&data).unwrap();
        }
        out.end().unwrap();
        out.into_inner()
    }

    #[test]
    fn data_and_progress_are_separated() {
        let mut wire = banded(&[
            (2, b"Counting objects: 1\rCounting objects: 2, done.\n"),
            (1, b"PACK"),
            (2, b"Compressing\n"),
            (1, b"\x00\x00\x00\x02rest"),
        ]);
        wire.extend_from_slice(b"after");
        let mut input = PacketLineIn::new(Cursor::new(wire));
        let mut progress = Recorder::default();
        let mut pack = Vec::new();
        input.sideband(&mut progress).as_read().read_to_end(&mut pack).unwrap();

        assert_eq!(pack, b"PACK\x00\x00\x00\x02rest");
        assert_eq!(
            progress.messages,
            ["Counting objects: 1", "Counting objects: 2, done.", "Compressing"]
        );
        let mut rest = Vec::new();
        input.inner_mut().read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"after", "nothing past the flush packet is consumed");
    }

    #[test]
    fn error_channel_fails_the_read() {
        let wire = banded(&[(1, b"PA"), (3, b"upload-pack: not our ref\n")]);
        let mut input = PacketLineIn::new(Cursor::new(wire));
        let mut progress = Recorder::default();
        let mut bands = input.sideband(&mut progress);
        let err = bands.as_read().read_to_end(&mut Vec::new()).unwrap_err();
        let err = bands.error(err);
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.to_string(), "I/O error: remote error: upload-pack: not our ref");
    }

    #[test]
    fn cancellation_is_observed_on_progress() {
        let wire = banded(&[(2, b"Counting objects: 1\n"), (1, b"PACK")]);
        let mut input = PacketLineIn::new(Cursor::new(wire));
        let mut progress = Recorder {
            cancel: true,
            ..Default::default()
        };
        let mut bands = input.sideband(&mut progress);
        let err = bands.as_read().read_to_end(&mut Vec::new()).unwrap_err();
        assert!(bands.error(err).is_cancelled());
    }

    #[test]
    fn unknown_channel_is_a_framing_error() {
        let wire = banded(&[(9, b"??")]);
        let mut input = PacketLineIn::new(Cursor::new(wire));
        let mut progress = Recorder::default();
        let mut bands = input.sideband(&mut progress);
        let err = bands.as_read().read_to_end(&mut Vec::new()).unwrap_err();
        match bands.error(err) {
            Error::Framing { raw, .. } => assert_eq!(raw, &b"\x09"[..]),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn small_reads_drain_one_packet_at_a_time() {
        let wire = banded(&[(1, b"abcdef")]);
        let mut input = PacketLineIn::new(Cursor::new(wire));
        let mut progress = Recorder::default();
        let mut bands = input.sideband(&mut progress);
        let mut reader = bands.as_read();
        let mut chunk = [0u8; 4];
        assert_eq!(reader.read(&mut chunk).unwrap(), 4);
        assert_eq!(&chunk, b"abcd");
        assert_eq!(reader.read(&mut chunk).unwrap(), 2);
        assert_eq!(&chunk[..2], b"ef");
        assert_eq!(reader.read(&mut chunk).unwrap(), 0);
    }
}
