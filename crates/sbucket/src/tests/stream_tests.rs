use super::helpers::{blob_reader, blob_writer, open_bucket, pattern, test_key, TEST_CAP};
use crate::{Error, CHUNK_SIZE};
use std::io::Read;
use tempfile::tempdir;

#[test]
fn round_trip_across_chunk_boundaries() {
    let dir = tempdir().unwrap();
    let bucket = open_bucket(dir.path(), TEST_CAP);
    let key = test_key(1);

    for len in [1usize, CHUNK_SIZE - 1, CHUNK_SIZE, CHUNK_SIZE + 1, 300 * 1024] {
        let data = pattern(len);
        let mut w = blob_writer(&bucket, &key, Some(len as u64)).unwrap();
        w.push(&data).unwrap();
        w.finish().unwrap();

        let mut out = Vec::new();
        blob_reader(&bucket, &key).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, data, "length {len} did not round-trip");
    }
}

#[test]
fn arbitrary_push_sizes_match_single_push() {
    let dir = tempdir().unwrap();
    let bucket = open_bucket(dir.path(), TEST_CAP);
    let data = pattern(CHUNK_SIZE * 2 + 12345);

    // one big push
    let key_a = test_key(2);
    let mut w = blob_writer(&bucket, &key_a, Some(data.len() as u64)).unwrap();
    w.push(&data).unwrap();
    w.finish().unwrap();

    // ragged pushes straddling every chunk boundary
    let key_b = test_key(3);
    let mut w = blob_writer(&bucket, &key_b, None).unwrap();
    for piece in data.chunks(7001) {
        w.push(piece).unwrap();
    }
    w.finish().unwrap();

    let chunks_of = |key: &keys::FileKey| {
        let prefix = key.chunk_prefix();
        bucket
            .engine()
            .scan_sizes(&prefix.range_start())
            .unwrap()
            .into_iter()
            .take_while(|(k, _)| prefix.matches(k))
            .map(|(k, len)| (keys::split_chunk_key(&k).unwrap().1, len))
            .collect::<Vec<_>>()
    };
    assert_eq!(chunks_of(&key_a), chunks_of(&key_b));

    let mut out = Vec::new();
    blob_reader(&bucket, &key_b).unwrap().read_to_end(&mut out).unwrap();
    assert_eq!(out, data);
}

#[test]
fn io_write_adapter_round_trips() {
    let dir = tempdir().unwrap();
    let bucket = open_bucket(dir.path(), TEST_CAP);
    let key = test_key(4);
    let data = pattern(CHUNK_SIZE + 999);

    let mut w = blob_writer(&bucket, &key, Some(data.len() as u64)).unwrap();
    std::io::copy(&mut &data[..], &mut w).unwrap();
    w.finish().unwrap();

    let mut out = Vec::new();
    blob_reader(&bucket, &key).unwrap().read_to_end(&mut out).unwrap();
    assert_eq!(out, data);
}

#[test]
fn rewrite_replaces_longer_blob() {
    let dir = tempdir().unwrap();
    let bucket = open_bucket(dir.path(), TEST_CAP);
    let key = test_key(5);

    let long = pattern(CHUNK_SIZE * 3);
    let mut w = blob_writer(&bucket, &key, Some(long.len() as u64)).unwrap();
    w.push(&long).unwrap();
    w.finish().unwrap();

    let short = pattern(10);
    let mut w = blob_writer(&bucket, &key, Some(10)).unwrap();
    w.push(&short).unwrap();
    w.finish().unwrap();

    // no stale tail chunks survive the replacement
    let mut out = Vec::new();
    blob_reader(&bucket, &key).unwrap().read_to_end(&mut out).unwrap();
    assert_eq!(out, short);

    let prefix = key.chunk_prefix();
    let chunk_count = bucket
        .engine()
        .scan_sizes(&prefix.range_start())
        .unwrap()
        .into_iter()
        .take_while(|(k, _)| prefix.matches(k))
        .count();
    assert_eq!(chunk_count, 1);
}

#[test]
fn admission_rejects_oversized_write_up_front() {
    let dir = tempdir().unwrap();
    let cap = 1024 * 1024; // 1 MiB shard
    let bucket = open_bucket(dir.path(), cap);
    let key = test_key(6);

    let err = blob_writer(&bucket, &key, Some(cap * 2)).err().expect("admission should fail");
    assert!(matches!(err, Error::NoSpace { .. }), "got {err:?}");

    // the rejected write left no trace
    assert!(!bucket.exists(&key).unwrap());
    assert!(bucket.list().unwrap().is_empty());
}

#[test]
fn rejected_admission_leaves_existing_blob_intact() {
    let dir = tempdir().unwrap();
    let cap = 1024 * 1024;
    let bucket = open_bucket(dir.path(), cap);
    let key = test_key(7);

    let data = pattern(1000);
    let mut w = blob_writer(&bucket, &key, Some(1000)).unwrap();
    w.push(&data).unwrap();
    w.finish().unwrap();

    let err = blob_writer(&bucket, &key, Some(cap * 4)).err().expect("admission should fail");
    assert!(matches!(err, Error::NoSpace { .. }));

    let mut out = Vec::new();
    blob_reader(&bucket, &key).unwrap().read_to_end(&mut out).unwrap();
    assert_eq!(out, data);
}

#[test]
fn unknown_length_stream_fails_midflight_and_unlinks() {
    let dir = tempdir().unwrap();
    let cap = (CHUNK_SIZE * 2) as u64; // room for two chunks at most
    let bucket = open_bucket(dir.path(), cap);
    let key = test_key(8);

    let mut w = blob_writer(&bucket, &key, None).unwrap();
    let piece = pattern(CHUNK_SIZE);
    let mut failed = None;
    for _ in 0..8 {
        if let Err(e) = w.push(&piece) {
            failed = Some(e);
            break;
        }
    }
    let err = failed.expect("stream should hit the shard cap");
    assert!(matches!(err, Error::NoSpace { .. }), "got {err:?}");

    // the partial blob was unlinked before the error surfaced
    assert!(!bucket.exists(&key).unwrap());

    // the stream is terminal: further pushes report cancellation
    let err = w.push(&piece).unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    let err = w.finish().unwrap_err();
    assert!(matches!(err, Error::Cancelled));
}

#[test]
fn abort_unlinks_partial_blob() {
    let dir = tempdir().unwrap();
    let bucket = open_bucket(dir.path(), TEST_CAP);
    let key = test_key(9);

    let mut w = blob_writer(&bucket, &key, None).unwrap();
    w.push(&pattern(CHUNK_SIZE + 50)).unwrap();
    w.abort().unwrap();

    assert!(!bucket.exists(&key).unwrap());
    assert!(bucket.list().unwrap().is_empty());
}

#[test]
fn second_writer_to_same_key_is_refused() {
    let dir = tempdir().unwrap();
    let bucket = open_bucket(dir.path(), TEST_CAP);
    let key = test_key(10);

    let w1 = blob_writer(&bucket, &key, None).unwrap();
    assert!(blob_writer(&bucket, &key, None).is_err());

    // different key writes concurrently just fine
    let other = blob_writer(&bucket, &test_key(11), None).unwrap();
    drop(other);

    // the permit is released on every exit path, including drop
    drop(w1);
    let w3 = blob_writer(&bucket, &key, None).unwrap();
    w3.finish().unwrap();
}

#[test]
fn dropped_writer_leaves_partial_blob_for_replacement() {
    let dir = tempdir().unwrap();
    let bucket = open_bucket(dir.path(), TEST_CAP);
    let key = test_key(12);

    let mut w = blob_writer(&bucket, &key, None).unwrap();
    w.push(&pattern(CHUNK_SIZE * 2)).unwrap();
    drop(w); // abandoned, no rollback

    assert!(bucket.exists(&key).unwrap());

    // next write replaces the leftovers wholesale
    let data = pattern(500);
    let mut w = blob_writer(&bucket, &key, Some(500)).unwrap();
    w.push(&data).unwrap();
    w.finish().unwrap();

    let mut out = Vec::new();
    blob_reader(&bucket, &key).unwrap().read_to_end(&mut out).unwrap();
    assert_eq!(out, data);
}
