use std::io::Cursor;

use gix_fetch_pack::{
    error::ErrorKind,
    packetline::{PacketLineIn, PacketLineOut},
    AckNak, PacketLine,
};
use proptest::prelude::*;

fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = PacketLineOut::new(Vec::new());
    out.write_raw(payload).unwrap();
    out.into_inner()
}

proptest! {
    #[test]
    fn payloads_survive_encoding(payload in proptest::collection::vec(any::<u8>(), 1..=1024)) {
        let wire = encode(&payload);
        let mut input = PacketLineIn::new(Cursor::new(wire));
        let line = input.read_line_raw().unwrap();
        prop_assert_eq!(line.as_slice(), payload.as_slice());
    }

    #[test]
    fn encoding_matches_gix_packetline(payload in proptest::collection::vec(any::<u8>(), 1..=1024)) {
        let wire = encode(&payload);
        match gix_packetline::decode::all_at_once(&wire).unwrap() {
            gix_packetline::PacketLineRef::Data(data) => prop_assert_eq!(data, payload.as_slice()),
            other => prop_assert!(false, "unexpected packet {:?}", other),
        }
    }
}

#[test]
fn flush_reads_as_empty_line_but_is_distinguishable() {
    let mut input = PacketLineIn::new(Cursor::new(b"00000004".to_vec()));
    assert_eq!(input.read_line().unwrap(), "");
    assert_eq!(input.read_packet().unwrap(), PacketLine::Data(Default::default()));
}

#[test]
fn flush_packet_is_understood_by_gix_packetline() {
    let mut out = PacketLineOut::new(Vec::new());
    out.end().unwrap();
    assert_eq!(
        gix_packetline::decode::all_at_once(&out.into_inner()).unwrap(),
        gix_packetline::PacketLineRef::Flush
    );
}

#[test]
fn malformed_headers_are_framing_errors_with_raw_bytes() {
    for (wire, raw) in [(&b"00z4"[..], "00z4"), (&b"0003"[..], "0003"), (&b"00"[..], "00")] {
        let err = PacketLineIn::new(Cursor::new(wire)).read_line().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Framing, "{raw}");
        assert!(err.to_string().contains(raw), "{err} mentions {raw}");
    }
}

#[test]
fn acks_are_read_from_packets() {
    let mut input = PacketLineIn::new(Cursor::new(
        b"0031ACK 0123456789abcdef0123456789abcdef01234567\n0008NAK\n0000".to_vec(),
    ));
    assert_eq!(input.read_ack().unwrap().0, AckNak::Ack);
    assert_eq!(input.read_ack().unwrap(), (AckNak::Nak, None));
    let err = input.read_ack().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol, "flush where an ACK/NAK is expected");
}
