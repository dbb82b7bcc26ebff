//! Remote-fetch walk over an in-memory range reader.
#![cfg(feature = "remote")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use iris_file_extension::io::RangeReader;
use iris_file_extension::slide::remote;
use iris_file_extension::{abstract_file_structure, FetchError, IrisError};

use super::test_utils::build_full_slide;

/// A range reader over an in-memory byte vector that tracks requests.
struct MockReader {
    data: Bytes,
    identifier: String,
    request_count: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<(u64, u64)>>>,
    fail_after: Option<usize>,
}

impl MockReader {
    fn new(data: Vec<u8>) -> Self {
        MockReader {
            data: Bytes::from(data),
            identifier: "mock://slide.iris".to_string(),
            request_count: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            fail_after: None,
        }
    }

    fn failing_after(data: Vec<u8>, successful_requests: usize) -> Self {
        let mut reader = MockReader::new(data);
        reader.fail_after = Some(successful_requests);
        reader
    }

    fn requests(&self) -> Vec<(u64, u64)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RangeReader for MockReader {
    async fn read_exact_at(&self, offset: u64, len: u64) -> Result<Bytes, FetchError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.fail_after {
            if count >= limit {
                return Err(FetchError::Connection("simulated outage".to_string()));
            }
        }
        self.requests.lock().unwrap().push((offset, len));

        let end = offset + len;
        if end > self.data.len() as u64 {
            return Err(FetchError::RangeOutOfBounds {
                offset,
                requested: len,
                size: self.data.len() as u64,
            });
        }
        Ok(self.data.slice(offset as usize..end as usize))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

#[tokio::test]
async fn test_remote_quick_check() {
    let (bytes, _) = build_full_slide();
    let reader = MockReader::new(bytes.clone());
    assert!(remote::is_iris_file(&reader).await.unwrap());

    let mut not_iris = bytes;
    not_iris[..4].copy_from_slice(b"TIFF");
    let reader = MockReader::new(not_iris);
    assert!(!remote::is_iris_file(&reader).await.unwrap());
}

#[tokio::test]
async fn test_remote_validation_matches_local() {
    let (bytes, _) = build_full_slide();
    let reader = MockReader::new(bytes);
    let report = remote::validate_file_structure(&reader).await;
    assert!(report.is_valid(), "errors: {:?}", report.errors);
}

#[tokio::test]
async fn test_remote_abstraction_matches_local() {
    let (bytes, _) = build_full_slide();
    let local = abstract_file_structure(&bytes).unwrap();

    let reader = MockReader::new(bytes);
    let fetched = remote::abstract_file_structure(&reader).await.unwrap();

    assert_eq!(fetched, local);
}

#[tokio::test]
async fn test_remote_walk_skips_payload_fetches() {
    // Tile payloads, image payloads and the ICC payload are never
    // requested; only headers, arrays and title runs are.
    let (bytes, layout) = build_full_slide();
    let file_size = bytes.len() as u64;
    let reader = MockReader::new(bytes);
    remote::abstract_file_structure(&reader).await.unwrap();

    for (offset, len) in reader.requests() {
        for payload in &layout.tile_payloads {
            // No request starts inside a tile payload
            assert!(
                offset + len <= *payload || offset >= payload + 32,
                "request {offset}+{len} overlaps tile payload at {payload}"
            );
        }
        assert!(offset + len <= file_size);
    }
}

#[tokio::test]
async fn test_remote_fetch_failure_aborts_walk() {
    let (bytes, _) = build_full_slide();
    let reader = MockReader::failing_after(bytes, 2);

    let result = remote::abstract_file_structure(&reader).await;
    assert!(matches!(
        result,
        Err(IrisError::Fetch(FetchError::Connection(_)))
    ));

    let report = remote::validate_file_structure(&reader).await;
    assert!(!report.is_valid());
}

#[tokio::test]
async fn test_remote_size_mismatch_detected() {
    // The reader advertises one byte more than the header records
    let (mut bytes, _) = build_full_slide();
    bytes.push(0);
    let reader = MockReader::new(bytes);

    let report = remote::validate_file_structure(&reader).await;
    assert!(!report.is_valid());
    assert!(matches!(
        report.errors[0],
        IrisError::FileSizeMismatch { .. }
    ));
}
