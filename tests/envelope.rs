//! Integration tests for sealing and validating large payloads.

use std::io::{BufReader, Cursor, Seek, SeekFrom, Write};

use timeclock_snapshot::envelope::{extract, validate, wrap, wrap_text};
use timeclock_snapshot::{EnvelopeOptions, ErrorKind, SigningKey};

/// Deterministic pseudo-random bytes.
fn payload(len: usize) -> Vec<u8> {
    let mut state = 0x2545_f491_4f6c_dd1du64;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 24) as u8
        })
        .collect()
}

fn seal(bytes: &[u8], key: &SigningKey) -> Vec<u8> {
    let mut sealed = Vec::new();
    wrap(
        bytes,
        true,
        Some("backup.snap"),
        &mut sealed,
        key,
        &EnvelopeOptions::default(),
    )
    .expect("wrap");
    sealed
}

#[test]
fn multi_megabyte_binary_round_trip() {
    let key = SigningKey::embedded();
    let bytes = payload(4 * 1024 * 1024 + 7);
    let sealed = seal(&bytes, &key);

    let info = validate(&sealed[..], &key).expect("validate");
    assert!(info.is_binary);
    assert_eq!(info.payload_len, bytes.len() as u64);
    assert_eq!(info.original_file_name.as_deref(), Some("backup.snap"));

    let mut out = Vec::new();
    extract(Cursor::new(&sealed), &mut out, &key).expect("extract");
    assert!(out == bytes, "extracted payload differs");
}

#[test]
#[ignore = "writes a 50 MiB payload to disk"]
fn fifty_megabyte_file_round_trip() {
    let key = SigningKey::embedded();
    let bytes = payload(50 * 1024 * 1024 + 3);

    let mut sealed = tempfile::tempfile().unwrap();
    wrap(
        &bytes[..],
        true,
        None,
        &mut sealed,
        &key,
        &EnvelopeOptions::default(),
    )
    .expect("wrap");

    sealed.seek(SeekFrom::Start(0)).unwrap();
    validate(BufReader::new(&mut sealed), &key).expect("validate");

    sealed.seek(SeekFrom::Start(0)).unwrap();
    let mut out = tempfile::tempfile().unwrap();
    let info = extract(BufReader::new(&mut sealed), &mut out, &key).expect("extract");
    assert_eq!(info.payload_len, bytes.len() as u64);
    out.flush().unwrap();
    assert_eq!(out.metadata().unwrap().len(), bytes.len() as u64);
}

#[test]
fn text_envelope_round_trip() {
    let key = SigningKey::embedded();
    let text = "{\"data\": {\"timeEntries\": []}}\nlinha com acentuação";
    let mut sealed = Vec::new();
    wrap_text(text, Some("export.json"), &mut sealed, &key).expect("wrap");

    let mut out = Vec::new();
    let info = extract(Cursor::new(&sealed), &mut out, &key).expect("extract");
    assert!(!info.is_binary);
    assert_eq!(String::from_utf8(out).unwrap(), text);
}

#[test]
fn reformatted_envelope_still_validates() {
    let key = SigningKey::embedded();
    let sealed = seal(b"small payload", &key);
    let value: serde_json::Value = serde_json::from_slice(&sealed).unwrap();
    let pretty = serde_json::to_vec_pretty(&value).unwrap();

    validate(&pretty[..], &key).expect("validate pretty-printed envelope");
}

#[test]
fn edited_hash_is_rejected() {
    let key = SigningKey::embedded();
    let sealed = seal(&payload(1000), &key);
    let mut value: serde_json::Value = serde_json::from_slice(&sealed).unwrap();
    value["hash"] = serde_json::Value::from("0".repeat(64));
    let edited = serde_json::to_vec(&value).unwrap();

    let err = validate(&edited[..], &key).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Integrity);
}

#[test]
fn resealed_payload_with_another_key_is_rejected() {
    let ours = SigningKey::embedded();
    let theirs = SigningKey::from_bytes(&[9u8; 32]).unwrap();
    let forged = seal(b"forged payload", &theirs);

    let err = validate(&forged[..], &ours).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Integrity);
}
