use super::*;
use blobkit_core::store::Preconditions;
use blobkit_core::types::ContentType;
use blobkit_core::utils::ManualClock;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use futures::stream;
use tempfile::{tempdir, TempDir};

const TEST_DATA: &str = "Lorem ipsum dolor sit amet";

fn timestamp() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2019-03-19T15:36:04.295Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn text_plain() -> ContentType {
    ContentType::parse("text/plain;charset=UTF-8").unwrap()
}

fn setup() -> (TempDir, FileSystemBlobStore) {
    let temp_dir = tempdir().unwrap();
    let base = Utf8PathBuf::from_path_buf(temp_dir.path().to_path_buf()).unwrap();
    let options = FileSystemOptions::default()
        .with_buffer_size(8)
        .with_clock(Arc::new(ManualClock::new(timestamp())));
    let store = FileSystemBlobStore::with_options(&base, options).unwrap();
    (temp_dir, store)
}

fn input(data: &'static str) -> BlobInput {
    let stream = stream::iter(vec![Ok(Bytes::from_static(data.as_bytes()))]).boxed();
    BlobInput::from_stream(stream, Some(data.len() as u64), text_plain())
}

fn temp_entries(store: &FileSystemBlobStore) -> usize {
    std::fs::read_dir(store.base_path().join(TEMP_DIR)).unwrap().count()
}

#[tokio::test]
async fn test_store_creates_data_and_sidecar() {
    let (_dir, store) = setup();
    let path = Utf8Path::new("foo/bar");

    store.store(path, input(TEST_DATA), false).await.unwrap();

    let data_path = store.base_path().join("foo/bar");
    assert_eq!(std::fs::read_to_string(&data_path).unwrap(), TEST_DATA);
    let sidecar = std::fs::read_to_string(store.base_path().join("foo/bar.metadata")).unwrap();
    assert!(sidecar.contains("content-type=text/plain;charset\\=UTF-8"));
    assert!(sidecar.contains("last-modified=2019-03-19T15\\:36\\:04.295Z"));
    assert_eq!(temp_entries(&store), 0);
}

#[tokio::test]
async fn test_metadata_of_stored_blob() {
    let (_dir, store) = setup();
    let path = Utf8Path::new("foo/bar");
    store.store(path, input(TEST_DATA), false).await.unwrap();

    let metadata = store.get_metadata(path).await.unwrap();
    assert_eq!(metadata.path(), path);
    assert_eq!(metadata.size, TEST_DATA.len() as u64);
    assert_eq!(metadata.content_type, text_plain());
    assert_eq!(metadata.etag.as_deref(), Some("OPAPhzjiQdrqbzf29VroQU17Ahk="));
    assert_eq!(metadata.last_modified, Some(timestamp()));
    assert!(metadata.belongs_to(store.id()));
}

#[tokio::test]
async fn test_retrieve_contents_in_chunks() {
    let (_dir, store) = setup();
    let path = Utf8Path::new("foo/bar");
    store.store(path, input(TEST_DATA), false).await.unwrap();

    let metadata = store.get_metadata(path).await.unwrap();
    let chunks: Vec<Bytes> = store
        .retrieve(metadata)
        .await
        .unwrap()
        .into_stream()
        .map(|chunk| chunk.unwrap())
        .collect()
        .await;
    assert!(chunks.len() > 1);
    assert_eq!(chunks.concat(), TEST_DATA.as_bytes());
}

#[tokio::test]
async fn test_get_metadata_missing_blob() {
    let (_dir, store) = setup();
    let err = store.get_metadata(Utf8Path::new("nope")).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_data_without_sidecar_is_not_visible() {
    let (_dir, store) = setup();
    std::fs::write(store.base_path().join("orphan"), b"data").unwrap();
    let err = store.get_metadata(Utf8Path::new("orphan")).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_retrieve_after_delete_fails_on_read() {
    let (_dir, store) = setup();
    let path = Utf8Path::new("gone");
    store.store(path, input(TEST_DATA), false).await.unwrap();
    let metadata = store.get_metadata(path).await.unwrap();
    store.delete(path).await.unwrap();

    let blob = store.retrieve(metadata).await.unwrap();
    assert!(blob.bytes().await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_retrieve_rejects_foreign_metadata() {
    let (_dir, store) = setup();
    let (_other_dir, other) = setup();
    let path = Utf8Path::new("foo");
    other.store(path, input(TEST_DATA), false).await.unwrap();
    let metadata = other.get_metadata(path).await.unwrap();

    let err = store.retrieve(metadata).await.unwrap_err();
    assert!(matches!(err, BlobError::InvalidArgument { .. }));
}

#[tokio::test]
async fn test_delete_removes_both_files() {
    let (_dir, store) = setup();
    let path = Utf8Path::new("foo/bar");
    store.store(path, input(TEST_DATA), false).await.unwrap();

    store.delete(path).await.unwrap();
    assert!(!store.base_path().join("foo/bar").exists());
    assert!(!store.base_path().join("foo/bar.metadata").exists());
    assert!(store.delete(path).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_delete_if_exists() {
    let (_dir, store) = setup();
    let path = Utf8Path::new("foo");
    assert!(!store.delete_if_exists(path).await.unwrap());

    store.store(path, input(TEST_DATA), false).await.unwrap();
    assert!(store.delete_if_exists(path).await.unwrap());
    assert!(store.get_metadata(path).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_fail_if_exists_keeps_first_blob() {
    let (_dir, store) = setup();
    let path = Utf8Path::new("once");
    store.store(path, input("first"), true).await.unwrap();

    let err = store.store(path, input("second"), true).await.unwrap_err();
    assert!(err.is_already_exists());

    let metadata = store.get_metadata(path).await.unwrap();
    let data = store.retrieve(metadata).await.unwrap().bytes().await.unwrap();
    assert_eq!(data, Bytes::from_static(b"first"));
    assert_eq!(temp_entries(&store), 0);
}

#[tokio::test]
async fn test_overwrite_replaces_blob() {
    let (_dir, store) = setup();
    let path = Utf8Path::new("twice");
    store.store(path, input("first"), false).await.unwrap();
    store
        .store(path, BlobInput::from_bytes("second", ContentType::new("application", "json")), false)
        .await
        .unwrap();

    let metadata = store.get_metadata(path).await.unwrap();
    assert_eq!(metadata.content_type, ContentType::new("application", "json"));
    assert_eq!(metadata.size, 6);
    let data = store.retrieve(metadata).await.unwrap().bytes().await.unwrap();
    assert_eq!(data, Bytes::from_static(b"second"));
}

#[tokio::test]
async fn test_interrupted_write_leaves_no_blob() {
    let (_dir, store) = setup();
    let path = Utf8Path::new("partial");
    let failing = stream::iter(vec![
        Ok(Bytes::from_static(b"Lorem ipsum")),
        Err(BlobError::message("connection reset")),
    ])
    .boxed();

    let result = store
        .store(path, BlobInput::from_stream(failing, None, text_plain()), false)
        .await;
    assert!(result.is_err());
    assert!(store.get_metadata(path).await.unwrap_err().is_not_found());
    assert!(!store.base_path().join("partial").exists());
    assert_eq!(temp_entries(&store), 0);
}

#[tokio::test]
async fn test_interrupted_overwrite_keeps_previous_blob() {
    let (_dir, store) = setup();
    let path = Utf8Path::new("stable");
    store.store(path, input(TEST_DATA), false).await.unwrap();
    let before = store.get_metadata(path).await.unwrap();

    let failing = stream::iter(vec![
        Ok(Bytes::from_static(b"new")),
        Err(BlobError::message("disk full")),
    ])
    .boxed();
    assert!(store
        .store(path, BlobInput::from_stream(failing, None, text_plain()), false)
        .await
        .is_err());

    let after = store.get_metadata(path).await.unwrap();
    assert_eq!(after, before);
    let data = store.retrieve(after).await.unwrap().bytes().await.unwrap();
    assert_eq!(data, Bytes::from_static(TEST_DATA.as_bytes()));
}

#[tokio::test]
async fn test_size_mismatch_is_rejected() {
    let (_dir, store) = setup();
    let path = Utf8Path::new("short");
    let data = stream::iter(vec![Ok(Bytes::from_static(b"abc"))]).boxed();

    let err = store
        .store(path, BlobInput::from_stream(data, Some(10), text_plain()), false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("declared 10 bytes but produced 3"));
    assert!(store.get_metadata(path).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_wildcard_content_type_is_rejected_before_io() {
    let (_dir, store) = setup();
    let path = Utf8Path::new("dir/wild");
    let wildcard = ContentType::parse("text/*").unwrap();

    let err = store
        .store(path, BlobInput::from_bytes("x", wildcard), false)
        .await
        .unwrap_err();
    assert!(matches!(err, BlobError::InvalidArgument { .. }));
    assert!(!store.base_path().join("dir").exists());
}

#[tokio::test]
async fn test_reserved_paths_are_rejected() {
    let (_dir, store) = setup();
    for path in ["../escape", ".tmp/blob", "foo.metadata", "/abs"] {
        let err = store
            .store(Utf8Path::new(path), input(TEST_DATA), false)
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::InvalidArgument { .. }), "path {}", path);
    }
}

#[tokio::test]
async fn test_retrieve_direct_conditions() {
    let (_dir, store) = setup();
    let path = Utf8Path::new("cond");
    store.store(path, input(TEST_DATA), false).await.unwrap();
    let etag = store.get_metadata(path).await.unwrap().etag.unwrap();

    let matching = Preconditions::new().if_none_match([etag]);
    assert!(store.retrieve_direct(path, &matching).await.unwrap().is_none());

    let since_now = Preconditions::new().if_modified_since(timestamp() + Duration::milliseconds(1));
    assert!(store.retrieve_direct(path, &since_now).await.unwrap().is_none());

    let stale = Preconditions::new()
        .if_none_match(["other"])
        .if_modified_since(timestamp() - Duration::days(1));
    let blob = store.retrieve_direct(path, &stale).await.unwrap().unwrap();
    assert_eq!(blob.bytes().await.unwrap(), Bytes::from_static(TEST_DATA.as_bytes()));
}

#[tokio::test]
async fn test_sha256_etag() {
    let temp_dir = tempdir().unwrap();
    let base = Utf8PathBuf::from_path_buf(temp_dir.path().to_path_buf()).unwrap();
    let options = FileSystemOptions::default().with_digest(DigestAlgorithm::Sha256);
    let store = FileSystemBlobStore::with_options(&base, options).unwrap();

    let path = Utf8Path::new("hashed");
    store.store(path, input(TEST_DATA), false).await.unwrap();
    let metadata = store.get_metadata(path).await.unwrap();
    assert_eq!(
        metadata.etag.as_deref(),
        Some("FqulOTrXLABB9WAK08LFLsQ3ovDH/Aj638PA/pZB16M=")
    );
}

#[test]
fn test_store_id_is_derived_from_base_path() {
    let temp_dir = tempdir().unwrap();
    let base = Utf8PathBuf::from_path_buf(temp_dir.path().to_path_buf()).unwrap();
    let first = FileSystemBlobStore::new(&base).unwrap();
    let second = FileSystemBlobStore::new(base.join(".")).unwrap();
    assert_eq!(first.id(), second.id());
    assert!(first.id().as_str().starts_with("file://"));
    assert!(base.join(TEMP_DIR).is_dir());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_metadata_stays_consistent_during_overwrites() {
    let (_dir, store) = setup();
    let store = Arc::new(store);
    let path = Utf8Path::new("x");
    let variants = [
        (ContentType::new("text", "a"), &b"a"[..]),
        (ContentType::new("text", "b"), &b"bb"[..]),
    ];
    let expected: Vec<_> = variants
        .iter()
        .map(|(content_type, data)| {
            (
                content_type.clone(),
                data.len() as u64,
                crate::digest::compute_etag(DigestAlgorithm::Sha1, data),
            )
        })
        .collect();

    let (content_type, data) = &variants[0];
    store
        .store(path, BlobInput::from_bytes(data.to_vec(), content_type.clone()), false)
        .await
        .unwrap();

    let writer = {
        let store = store.clone();
        let variants = variants.clone();
        tokio::spawn(async move {
            for round in 1..300 {
                let (content_type, data) = &variants[round % 2];
                store
                    .store(path, BlobInput::from_bytes(data.to_vec(), content_type.clone()), false)
                    .await
                    .unwrap();
            }
        })
    };

    let mut reads = 0;
    while !writer.is_finished() {
        let metadata = store.get_metadata(path).await.unwrap();
        let observed = (metadata.content_type, metadata.size, metadata.etag.unwrap_or_default());
        assert!(expected.contains(&observed), "mismatched metadata {:?}", observed);
        reads += 1;
    }
    writer.await.unwrap();
    assert!(reads > 0);
}

#[tokio::test]
async fn test_replaced_data_file_drops_etag() {
    let (_dir, store) = setup();
    let path = Utf8Path::new("foo/bar");
    store.store(path, input(TEST_DATA), false).await.unwrap();

    std::fs::write(store.base_path().join("foo/bar"), "replaced").unwrap();

    let metadata = store.get_metadata(path).await.unwrap();
    assert_eq!(metadata.size, "replaced".len() as u64);
    assert_eq!(metadata.content_type, text_plain());
    assert_eq!(metadata.etag, None);
}

#[test]
fn test_failed_exclusive_commit_rolls_back_data() {
    let temp_dir = tempdir().unwrap();
    let base = Utf8PathBuf::from_path_buf(temp_dir.path().to_path_buf()).unwrap();
    let data_temp = base.join("data.tmp");
    let missing_sidecar = base.join("meta.tmp");
    let data_path = base.join("blob");
    std::fs::write(&data_temp, TEST_DATA).unwrap();

    let result = commit(&data_temp, &missing_sidecar, &data_path, true);

    assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotFound);
    assert!(!data_path.exists());
    assert!(!sidecar_path(&data_path).exists());
    assert!(data_temp.exists());
}

mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use proptest::test_runner::Config as ProptestConfig;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]
        /// Stored bytes come back unchanged with a digest etag
        #[test]
        fn store_round_trip(
            segments in prop::collection::vec("[a-z0-9]{1,8}", 1..4),
            content in prop::collection::vec(any::<u8>(), 0..2048),
        ) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            let (_dir, store) = setup();
            let path = Utf8PathBuf::from(segments.join("/"));
            let expected_etag = crate::digest::compute_etag(DigestAlgorithm::Sha1, &content);

            let (metadata, data) = runtime.block_on(async {
                store
                    .store(&path, BlobInput::from_bytes(content.clone(), ContentType::octet_stream()), false)
                    .await
                    .unwrap();
                let metadata = store.get_metadata(&path).await.unwrap();
                let blob = store.retrieve(metadata.clone()).await.unwrap();
                (metadata, blob.bytes().await.unwrap())
            });

            prop_assert_eq!(metadata.size, content.len() as u64);
            prop_assert_eq!(metadata.etag, Some(expected_etag));
            prop_assert_eq!(data.as_ref(), content.as_slice());
        }
    }
}
