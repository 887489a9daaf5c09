use super::codec::{RtspCodec, RtspCodecError};
use super::{Headers, RtspResponse, StatusCode};
use proptest::prelude::*;

#[test]
fn test_decode_complete_response() {
    let mut codec = RtspCodec::new();
    codec
        .feed(b"RTSP/1.0 200 OK\r\nCSeq: 1\r\nAudio-Jack-Status: connected; type=analog\r\n\r\n")
        .unwrap();

    let response = codec.decode().unwrap().unwrap();
    assert!(response.is_success());
    assert_eq!(response.version, "RTSP/1.0");
    assert_eq!(response.reason, "OK");
    assert_eq!(response.cseq(), Some(1));
    assert_eq!(
        response.header("audio-jack-status"),
        Some("connected; type=analog")
    );
    assert_eq!(codec.buffered_len(), 0);
}

#[test]
fn test_decode_not_found_is_not_success() {
    let mut codec = RtspCodec::new();
    codec
        .feed(b"RTSP/1.0 404 Not Found\r\nCSeq: 3\r\n\r\n")
        .unwrap();

    let response = codec.decode().unwrap().unwrap();
    assert!(!response.is_success());
    assert_eq!(response.status.as_u16(), 404);
    assert_eq!(response.reason, "Not Found");
}

#[test]
fn test_decode_incremental_with_body() {
    let mut codec = RtspCodec::new();
    codec.feed(b"RTSP/1.0 200 OK\r\nContent-Le").unwrap();
    assert!(codec.decode().unwrap().is_none());

    codec.feed(b"ngth: 5\r\nCSeq: 2\r\n\r\nhel").unwrap();
    assert!(codec.decode().unwrap().is_none());

    codec.feed(b"lo").unwrap();
    let response = codec.decode().unwrap().unwrap();
    assert_eq!(response.body, b"hello");
}

#[test]
fn test_decode_two_pipelined_responses() {
    let mut codec = RtspCodec::new();
    codec
        .feed(b"RTSP/1.0 200 OK\r\nCSeq: 1\r\n\r\nRTSP/1.0 200 OK\r\nCSeq: 2\r\n\r\n")
        .unwrap();

    assert_eq!(codec.decode().unwrap().unwrap().cseq(), Some(1));
    assert_eq!(codec.decode().unwrap().unwrap().cseq(), Some(2));
    assert!(codec.decode().unwrap().is_none());
}

#[test]
fn test_decode_rejects_garbage_status_line() {
    let mut codec = RtspCodec::new();
    codec.feed(b"HTTP/1.1 abc\r\n\r\n").unwrap();
    assert!(matches!(
        codec.decode(),
        Err(RtspCodecError::InvalidStatusLine(_))
    ));
}

#[test]
fn test_decode_rejects_header_without_colon() {
    let mut codec = RtspCodec::new();
    codec
        .feed(b"RTSP/1.0 200 OK\r\nbroken header\r\n\r\n")
        .unwrap();
    assert!(matches!(
        codec.decode(),
        Err(RtspCodecError::InvalidHeader(_))
    ));
}

#[test]
fn test_feed_limit() {
    let mut codec = RtspCodec::new().with_max_size(8);
    assert!(matches!(
        codec.feed(b"RTSP/1.0 200 OK"),
        Err(RtspCodecError::ResponseTooLarge { size: 15 })
    ));
}

#[test]
fn test_reset_discards_partial() {
    let mut codec = RtspCodec::new();
    codec.feed(b"RTSP/1.0 200 OK\r\nCSeq").unwrap();
    codec.reset();
    assert_eq!(codec.buffered_len(), 0);
}

#[test]
fn test_encoded_response_replaces_content_length() {
    let mut headers = Headers::new();
    headers.insert("CSeq", "4");
    headers.insert("Content-Length", "99");
    let response = RtspResponse {
        version: "RTSP/1.0".to_string(),
        status: StatusCode::OK,
        reason: "OK".to_string(),
        headers,
        body: b"abc".to_vec(),
    };

    let wire = response.encode();
    let text = String::from_utf8(wire.clone()).unwrap();
    assert!(text.starts_with("RTSP/1.0 200 OK\r\nCSeq: 4\r\n"));
    assert!(text.contains("Content-Length: 3\r\n"));
    assert!(!text.contains("99"));

    let mut codec = RtspCodec::new();
    codec.feed(&wire).unwrap();
    let decoded = codec.decode().unwrap().unwrap();
    assert_eq!(decoded.cseq(), Some(4));
    assert_eq!(decoded.body, b"abc".to_vec());
}

proptest! {
    #[test]
    fn decode_is_split_invariant(split in 0usize..60) {
        let wire = b"RTSP/1.0 200 OK\r\nCSeq: 9\r\nContent-Length: 4\r\n\r\nbody";
        let split = split.min(wire.len());

        let mut codec = RtspCodec::new();
        codec.feed(&wire[..split]).unwrap();
        let early = codec.decode().unwrap();
        codec.feed(&wire[split..]).unwrap();
        let response = match early {
            Some(r) => r,
            None => codec.decode().unwrap().unwrap(),
        };

        prop_assert_eq!(response.cseq(), Some(9));
        prop_assert_eq!(response.body, b"body".to_vec());
    }
}
