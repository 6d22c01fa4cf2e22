// cloudmux - one API over many clouds
// Copyright (C) 2025 cloudmux Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published
// by the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.

//! Integration tests for the S3 store using LocalStack
//!
//! # Prerequisites
//!
//! LocalStack must be running before executing these tests:
//! ```bash
//! docker run -d -p 4566:4566 localstack/localstack
//! cargo test -p cloudmux-blobstore --test s3_localstack_tests -- --ignored
//! ```
//!
//! Tests use static `test`/`test` credentials in `us-east-1` against
//! `http://127.0.0.1:4566`. Every test works in its own bucket.

#[cfg(test)]
mod s3_localstack_tests {
    use bytes::Bytes;
    use cloudmux_blobstore::pagination::collect_all;
    use cloudmux_blobstore::s3::{S3BlobStore, S3Config};
    use cloudmux_blobstore::{
        Blob, BlobMetadata, BlobStore, ByteRange, GetOptions, ListContainerOptions, PutOptions,
        StorageType,
    };
    use cloudmux_core::CloudError;

    const ENDPOINT: &str = "http://127.0.0.1:4566";

    async fn create_test_store() -> S3BlobStore {
        let config = S3Config::new("us-east-1")
            .with_endpoint(ENDPOINT)
            .with_credentials("test", "test");
        S3BlobStore::with_config(config)
            .await
            .expect("Failed to create S3 store for LocalStack")
    }

    async fn fresh_bucket(store: &S3BlobStore) -> String {
        let bucket = format!("cloudmux-{}", uuid::Uuid::new_v4().simple());
        assert!(store
            .create_container(&bucket)
            .await
            .expect("Failed to create bucket"));
        bucket
    }

    #[tokio::test]
    #[ignore] // Requires LocalStack to be running
    async fn test_localstack_put_and_get() {
        let store = create_test_store().await;
        let bucket = fresh_bucket(&store).await;

        let blob = Blob::builder("test/basic.txt")
            .payload("Hello from LocalStack!")
            .content_type("text/plain")
            .user_metadata("suite", "localstack")
            .build();
        let etag = store
            .put_blob(&bucket, blob, &PutOptions::default())
            .await
            .expect("Failed to put object");
        assert!(!etag.is_empty());

        let fetched = store
            .get_blob(&bucket, "test/basic.txt", &GetOptions::default())
            .await
            .expect("Failed to get object")
            .expect("object should exist");
        assert_eq!(fetched.payload, Bytes::from_static(b"Hello from LocalStack!"));
        assert_eq!(fetched.metadata.etag.as_deref(), Some(etag.as_str()));
        assert_eq!(fetched.metadata.user_metadata["suite"], "localstack");

        let partial = store
            .get_blob(
                &bucket,
                "test/basic.txt",
                &GetOptions::range(ByteRange::new(0, 4)),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(partial.payload, Bytes::from_static(b"Hello"));

        store.delete_container(&bucket).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires LocalStack to be running
    async fn test_localstack_missing_things() {
        let store = create_test_store().await;
        let bucket = fresh_bucket(&store).await;

        assert!(store
            .get_blob(&bucket, "nope", &GetOptions::default())
            .await
            .unwrap()
            .is_none());
        assert!(store.blob_metadata(&bucket, "nope").await.unwrap().is_none());
        store.remove_blob(&bucket, "nope").await.unwrap();

        let err = store
            .list("cloudmux-no-such-bucket", &ListContainerOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::ContainerNotFound(_)));

        store.delete_container(&bucket).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires LocalStack to be running
    async fn test_localstack_listing_pages() {
        let store = create_test_store().await;
        let bucket = fresh_bucket(&store).await;

        for name in ["a.txt", "dir/b.txt", "dir/c.txt", "dir/sub/d.txt", "z.txt"] {
            store
                .put_blob(
                    &bucket,
                    Blob::builder(name).payload(name.to_string()).build(),
                    &PutOptions::default(),
                )
                .await
                .unwrap();
        }

        let top = store.list(&bucket, &ListContainerOptions::new()).await.unwrap();
        let entries: Vec<_> = top.iter().map(|e| (e.name.as_str(), e.kind)).collect();
        assert_eq!(
            entries,
            vec![
                ("a.txt", StorageType::Blob),
                ("dir/", StorageType::RelativePath),
                ("z.txt", StorageType::Blob),
            ]
        );

        let first = store
            .list(&bucket, &ListContainerOptions::new().recursive().max_results(2))
            .await
            .unwrap();
        assert_eq!(first.len(), 2);
        assert!(first.next_marker.is_some());

        let all = collect_all(
            &store,
            &bucket,
            ListContainerOptions::new().recursive().max_results(2),
        )
        .await
        .unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(store.count_blobs(&bucket).await.unwrap(), 5);

        store.delete_container(&bucket).await.unwrap();
        assert!(!store.container_exists(&bucket).await.unwrap());
    }

    #[tokio::test]
    #[ignore] // Requires LocalStack to be running
    async fn test_localstack_multipart_upload() {
        let store = create_test_store().await;
        let bucket = fresh_bucket(&store).await;

        let metadata = BlobMetadata {
            name: "large/file.bin".to_string(),
            ..Default::default()
        };
        let upload = store
            .initiate_multipart_upload(&bucket, metadata, &PutOptions::multipart())
            .await
            .unwrap();

        let first_chunk = Bytes::from(vec![1u8; 5 * 1024 * 1024]);
        let last_chunk = Bytes::from_static(b"tail");
        let first = store
            .upload_multipart_part(&upload, 1, first_chunk)
            .await
            .unwrap();
        let second = store
            .upload_multipart_part(&upload, 2, last_chunk)
            .await
            .unwrap();

        let listed = store.list_multipart_upload(&upload).await.unwrap();
        assert_eq!(listed.len(), 2);
        let pending = store.list_multipart_uploads(&bucket).await.unwrap();
        assert!(pending.iter().any(|u| u.id == upload.id));

        store
            .complete_multipart_upload(&upload, &[first, second])
            .await
            .unwrap();
        let metadata = store
            .blob_metadata(&bucket, "large/file.bin")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(metadata.size, Some(5 * 1024 * 1024 + 4));

        store.delete_container(&bucket).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires LocalStack to be running
    async fn test_localstack_abort_multipart() {
        let store = create_test_store().await;
        let bucket = fresh_bucket(&store).await;

        let metadata = BlobMetadata {
            name: "aborted.bin".to_string(),
            ..Default::default()
        };
        let upload = store
            .initiate_multipart_upload(&bucket, metadata, &PutOptions::multipart())
            .await
            .unwrap();
        store
            .upload_multipart_part(&upload, 1, Bytes::from_static(b"data"))
            .await
            .unwrap();
        store.abort_multipart_upload(&upload).await.unwrap();

        assert!(!store.blob_exists(&bucket, "aborted.bin").await.unwrap());
        store.delete_container(&bucket).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires LocalStack to be running
    async fn test_localstack_copy_and_presign() {
        let store = create_test_store().await;
        let bucket = fresh_bucket(&store).await;
        store
            .put_blob(
                &bucket,
                Blob::builder("src.txt").payload("copy me").build(),
                &PutOptions::default(),
            )
            .await
            .unwrap();

        store
            .copy_blob(&bucket, "src.txt", &bucket, "dst.txt")
            .await
            .unwrap();
        let copy = store
            .get_blob(&bucket, "dst.txt", &GetOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(copy.payload, Bytes::from_static(b"copy me"));

        let signer = store.signer().expect("S3 presigns URLs");
        let signed = signer
            .sign_get_blob(&bucket, "dst.txt", std::time::Duration::from_secs(300))
            .await
            .unwrap();
        assert!(signed.url.as_str().starts_with(ENDPOINT));
        assert!(signed.url.query().unwrap_or_default().contains("X-Amz-Signature="));

        store.delete_container(&bucket).await.unwrap();
    }
}
