// Copyright (C) 2025 cloudmux Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Swift adapter against mock Keystone and object endpoints
//!
//! One mock server plays both services: `/v3/auth/tokens` issues tokens whose
//! catalog points object-store endpoints back at `/v1/AUTH_demo`.

use chrono::{Duration as ChronoDuration, Utc};
use cloudmux_blobstore::multipart::put_multipart_blob;
use cloudmux_blobstore::swift::keystone::KeystoneCredentials;
use cloudmux_blobstore::swift::{region_scoped_context, SwiftConfig};
use cloudmux_blobstore::{
    Blob, BlobStore, ContainerAccess, CreateContainerOptions, ListContainerOptions, PutOptions,
    RegionScopedBlobStoreContext, StorageType,
};
use cloudmux_core::{CloudError, Location, RestClient};
use std::time::Duration;
use wiremock::matchers::{
    body_partial_json, body_string_contains, header, headers, method, path, path_regex, query_param,
};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const TOKEN: &str = "gAAAAABnl-token";

fn credentials() -> KeystoneCredentials {
    KeystoneCredentials {
        username: "demo".into(),
        password: "s3cret".into(),
        user_domain: "Default".into(),
        project: "media".into(),
        project_domain: "Default".into(),
    }
}

fn token_body(server: &MockServer) -> serde_json::Value {
    let endpoint = |interface: &str, region: &str, account: &str| {
        serde_json::json!({
            "interface": interface,
            "region_id": region,
            "region": region,
            "url": format!("{}/v1/{}", server.uri(), account),
        })
    };
    serde_json::json!({
        "token": {
            "expires_at": (Utc::now() + ChronoDuration::hours(1)).to_rfc3339(),
            "catalog": [
                {"type": "identity", "endpoints": []},
                {"type": "object-store", "endpoints": [
                    endpoint("public", "RegionOne", "AUTH_demo"),
                    endpoint("internal", "RegionOne", "AUTH_internal"),
                    endpoint("public", "RegionTwo", "AUTH_two"),
                ]}
            ]
        }
    })
}

/// Mount the token endpoint, expecting `calls` authentications
async fn mount_keystone(server: &MockServer, calls: u64) {
    Mock::given(method("POST"))
        .and(path("/v3/auth/tokens"))
        .and(body_partial_json(serde_json::json!({
            "auth": {"identity": {"methods": ["password"]}, "scope": {"project": {"name": "media"}}}
        })))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("x-subject-token", TOKEN)
                .set_body_json(token_body(server)),
        )
        .expect(calls)
        .mount(server)
        .await;
}

async fn context(config: SwiftConfig) -> RegionScopedBlobStoreContext {
    region_scoped_context(&config, &RestClient::with_defaults().unwrap())
        .await
        .unwrap()
}

fn config(server: &MockServer) -> SwiftConfig {
    SwiftConfig::new(format!("{}/v3", server.uri()), credentials())
}

#[tokio::test]
async fn test_catalog_yields_one_store_per_region() {
    let server = MockServer::start().await;
    mount_keystone(&server, 1).await;

    let ctx = context(config(&server)).await;
    assert_eq!(ctx.provider(), "openstack-swift");
    assert_eq!(ctx.configured_regions(), vec!["RegionOne", "RegionTwo"]);
    assert!(ctx.blob_store("RegionThree").is_err());

    let store = ctx.blob_store("RegionTwo").unwrap();
    let locations = store.list_assignable_locations().await.unwrap();
    assert_eq!(locations[0].region_id(), Some("RegionTwo"));
}

#[tokio::test]
async fn test_region_filter() {
    let server = MockServer::start().await;
    mount_keystone(&server, 1).await;

    let ctx = context(config(&server).with_regions(["RegionTwo"])).await;
    assert_eq!(ctx.configured_regions(), vec!["RegionTwo"]);
    assert_eq!(ctx.default_region(), "RegionTwo");

    let server = MockServer::start().await;
    mount_keystone(&server, 1).await;
    let err = region_scoped_context(
        &config(&server).with_regions(["Mars"]),
        &RestClient::with_defaults().unwrap(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CloudError::IllegalArgument(_)));
}

#[tokio::test]
async fn test_rejected_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/auth/tokens"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = region_scoped_context(&config(&server), &RestClient::with_defaults().unwrap())
        .await
        .unwrap_err();
    assert!(err.is_authorization());
}

#[tokio::test]
async fn test_token_is_reused_and_renewed_after_401() {
    let server = MockServer::start().await;
    mount_keystone(&server, 2).await;
    Mock::given(method("HEAD"))
        .and(path("/v1/AUTH_demo/photos"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/v1/AUTH_demo/photos"))
        .and(header("x-auth-token", TOKEN))
        .respond_with(
            ResponseTemplate::new(204)
                .insert_header("x-container-read", ".r:*,.rlistings")
                .insert_header("x-container-object-count", "3"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let ctx = context(config(&server)).await;
    let store = ctx.blob_store("RegionOne").unwrap();
    assert!(store.container_exists("photos").await.unwrap());
    // served from the container cache
    assert_eq!(
        store.container_access("photos").await.unwrap(),
        ContainerAccess::PublicRead
    );
}

#[tokio::test]
async fn test_listing_with_subdirs() {
    let server = MockServer::start().await;
    mount_keystone(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/v1/AUTH_demo/photos"))
        .and(query_param("format", "json"))
        .and(query_param("delimiter", "/"))
        .and(query_param("limit", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"subdir": "2024/"},
            {"name": "a.jpg", "hash": "0cc175b9c0f1b6a831c399e269772661", "bytes": 1,
             "content_type": "image/jpeg", "last_modified": "2025-01-27T10:00:00.000000"},
            {"name": "albums", "hash": "d41d8cd98f00b204e9800998ecf8427e", "bytes": 0,
             "content_type": "application/directory", "last_modified": "2025-01-27T10:00:00.000000"}
        ])))
        .mount(&server)
        .await;

    let ctx = context(config(&server)).await;
    let store = ctx.blob_store("RegionOne").unwrap();
    let page = store
        .list("photos", &ListContainerOptions::new().max_results(2))
        .await
        .unwrap();

    let entries: Vec<_> = page.iter().map(|e| (e.name.as_str(), e.kind)).collect();
    assert_eq!(
        entries,
        vec![
            ("2024/", StorageType::RelativePath),
            ("a.jpg", StorageType::Blob),
        ]
    );
    assert_eq!(page.next_marker.as_deref(), Some("a.jpg"));
    assert_eq!(
        page.items[1].etag.as_deref(),
        Some("0cc175b9c0f1b6a831c399e269772661")
    );
}

#[tokio::test]
async fn test_empty_listing_is_204() {
    let server = MockServer::start().await;
    mount_keystone(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/v1/AUTH_demo/empty"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let ctx = context(config(&server)).await;
    let page = ctx
        .blob_store("RegionOne")
        .unwrap()
        .list("empty", &ListContainerOptions::new())
        .await
        .unwrap();
    assert!(page.is_empty());
    assert!(page.is_complete());
}

#[tokio::test]
async fn test_create_and_delete_container() {
    let server = MockServer::start().await;
    mount_keystone(&server, 1).await;
    Mock::given(method("PUT"))
        .and(path("/v1/AUTH_demo/www"))
        .and(headers("x-container-read", vec![".r:*", ".rlistings"]))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v1/AUTH_demo/logs"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/AUTH_demo/logs"))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;

    let ctx = context(config(&server)).await;
    let store = ctx.blob_store("RegionOne").unwrap();
    assert!(store
        .create_container_in_location(None, "www", &CreateContainerOptions::public_read())
        .await
        .unwrap());
    assert!(!store.create_container("logs").await.unwrap());
    assert!(!store.delete_container_if_empty("logs").await.unwrap());

    let elsewhere = Location::region("RegionTwo", Location::provider("openstack-swift"));
    let err = store
        .create_container_in_location(Some(&elsewhere), "x", &CreateContainerOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::IllegalArgument(_)));
}

#[tokio::test]
async fn test_missing_object_versus_missing_container() {
    let server = MockServer::start().await;
    mount_keystone(&server, 1).await;
    Mock::given(method("HEAD"))
        .and(path_regex(r"^/v1/AUTH_demo/(photos|ghost)/a\.jpg$"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/v1/AUTH_demo/photos"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/v1/AUTH_demo/ghost"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let ctx = context(config(&server)).await;
    let store = ctx.blob_store("RegionOne").unwrap();
    assert!(store.blob_metadata("photos", "a.jpg").await.unwrap().is_none());
    let err = store.blob_metadata("ghost", "a.jpg").await.unwrap_err();
    assert!(matches!(err, CloudError::ContainerNotFound(ref c) if c == "ghost"));
}

#[tokio::test]
async fn test_put_object_with_metadata() {
    let server = MockServer::start().await;
    mount_keystone(&server, 1).await;
    Mock::given(method("PUT"))
        .and(path("/v1/AUTH_demo/docs/notes/readme.txt"))
        .and(header("content-type", "text/plain"))
        .and(header("x-object-meta-owner", "ops"))
        .and(header("x-auth-token", TOKEN))
        .respond_with(
            ResponseTemplate::new(201).insert_header("etag", "5eb63bbbe01eeed093cb22bb8f5acdc3"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let ctx = context(config(&server)).await;
    let blob = Blob::builder("notes/readme.txt")
        .payload("hello world")
        .content_type("text/plain")
        .user_metadata("owner", "ops")
        .build();
    let etag = ctx
        .blob_store("RegionOne")
        .unwrap()
        .put_blob("docs", blob, &PutOptions::default())
        .await
        .unwrap();
    assert_eq!(etag, "5eb63bbbe01eeed093cb22bb8f5acdc3");
}

#[tokio::test]
async fn test_segmented_upload_writes_manifest() {
    let server = MockServer::start().await;
    mount_keystone(&server, 1).await;
    Mock::given(method("HEAD"))
        .and(path("/v1/AUTH_demo/media"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(
            r"^/v1/AUTH_demo/media/clip\.mp4/\.segments/[0-9a-f-]{36}/00000001$",
        ))
        .respond_with(ResponseTemplate::new(201).insert_header("etag", "seg1etag"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v1/AUTH_demo/media/clip.mp4"))
        .and(query_param("multipart-manifest", "put"))
        .and(header("content-type", "video/mp4"))
        .and(body_string_contains("\"etag\":\"seg1etag\""))
        .and(body_string_contains("\"size_bytes\":2048"))
        .respond_with(ResponseTemplate::new(201).insert_header("etag", "\"slo-etag\""))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = context(config(&server)).await;
    let blob = Blob::builder("clip.mp4")
        .payload(vec![0u8; 2048])
        .content_type("video/mp4")
        .build();
    let etag = ctx
        .blob_store("RegionOne")
        .unwrap()
        .put_blob("media", blob, &PutOptions::multipart())
        .await
        .unwrap();
    assert_eq!(etag, "slo-etag");
}

#[tokio::test]
async fn test_temp_urls_need_a_key() {
    let server = MockServer::start().await;
    mount_keystone(&server, 2).await;

    let ctx = context(config(&server)).await;
    assert!(ctx.blob_store("RegionOne").unwrap().signer().is_none());

    let ctx = context(config(&server).with_temp_url_key("secret")).await;
    let signer = ctx.signer("RegionOne").unwrap();
    let signed = signer
        .sign_get_blob("photos", "cat.jpg", Duration::from_secs(300))
        .await
        .unwrap();
    assert_eq!(signed.url.path(), "/v1/AUTH_demo/photos/cat.jpg");
    let query = signed.url.query().unwrap_or_default();
    assert!(query.starts_with("temp_url_sig="));
    assert!(query.contains("&temp_url_expires="));
}

#[tokio::test]
async fn test_listing_limit_is_capped() {
    let server = MockServer::start().await;
    mount_keystone(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/v1/AUTH_demo/photos"))
        .and(query_param("format", "json"))
        .and(query_param("limit", "10000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"name": "2024/a.jpg", "hash": "0cc175b9c0f1b6a831c399e269772661", "bytes": 1,
             "content_type": "image/jpeg", "last_modified": "2025-01-27T10:00:00.000000"},
            {"name": "2024/b.jpg", "hash": "92eb5ffee6ae2fec3ad71c777531578f", "bytes": 1,
             "content_type": "image/jpeg", "last_modified": "2025-01-27T10:00:00.000000"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = context(config(&server)).await;
    let store = ctx.blob_store("RegionOne").unwrap();
    let page = store
        .list(
            "photos",
            &ListContainerOptions::new().recursive().max_results(10_000),
        )
        .await
        .unwrap();
    assert_eq!(page.items.len(), 2);
    assert!(page.is_complete());
}

/// Listing entry for a segment of `clip.mp4`
fn segment_entry(name: String, bytes: u64) -> serde_json::Value {
    serde_json::json!({
        "name": name,
        "hash": "d41d8cd98f00b204e9800998ecf8427e",
        "bytes": bytes,
        "content_type": "application/octet-stream",
        "last_modified": "2025-01-27T10:00:00.000000"
    })
}

#[tokio::test]
async fn test_abort_deletes_every_segment() {
    let server = MockServer::start().await;
    mount_keystone(&server, 1).await;
    Mock::given(method("HEAD"))
        .and(path("/v1/AUTH_demo/media"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let ctx = context(config(&server)).await;
    let store = ctx.blob_store("RegionOne").unwrap();
    let upload = store
        .initiate_multipart_upload(
            "media",
            Blob::builder("clip.mp4").build().metadata,
            &PutOptions::multipart(),
        )
        .await
        .unwrap();

    let prefix = format!("clip.mp4/.segments/{}/", upload.id);
    Mock::given(method("GET"))
        .and(path("/v1/AUTH_demo/media"))
        .and(query_param("format", "json"))
        .and(query_param("prefix", prefix.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            segment_entry(format!("{}00000001", prefix), 1_048_576),
            segment_entry(format!("{}00000002", prefix), 512),
            segment_entry(format!("{}manifest.tmp", prefix), 3),
        ])))
        .expect(2)
        .mount(&server)
        .await;
    for segment in ["00000001", "00000002"] {
        Mock::given(method("DELETE"))
            .and(path(format!("/v1/AUTH_demo/media/{}{}", prefix, segment)))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
    }

    let parts = store.list_multipart_upload(&upload).await.unwrap();
    let listed: Vec<_> = parts.iter().map(|p| (p.part_number, p.size)).collect();
    assert_eq!(listed, vec![(1, 1_048_576), (2, 512)]);

    store.abort_multipart_upload(&upload).await.unwrap();
}

#[tokio::test]
async fn test_failed_segment_aborts_upload() {
    const MIB: usize = 1024 * 1024;

    let server = MockServer::start().await;
    mount_keystone(&server, 1).await;
    Mock::given(method("HEAD"))
        .and(path("/v1/AUTH_demo/media"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(
            r"^/v1/AUTH_demo/media/clip\.mp4/\.segments/[0-9a-f-]{36}/00000001$",
        ))
        .respond_with(ResponseTemplate::new(201).insert_header("etag", "seg1etag"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(
            r"^/v1/AUTH_demo/media/clip\.mp4/\.segments/[0-9a-f-]{36}/00000002$",
        ))
        .respond_with(ResponseTemplate::new(403).set_body_string("quota exceeded"))
        .expect(1)
        .mount(&server)
        .await;
    // echo the uploaded segment back under whatever upload id was chosen
    Mock::given(method("GET"))
        .and(path("/v1/AUTH_demo/media"))
        .and(query_param("format", "json"))
        .respond_with(|request: &Request| {
            let prefix = request
                .url
                .query_pairs()
                .find(|(key, _)| key == "prefix")
                .map(|(_, value)| value.into_owned())
                .unwrap_or_default();
            ResponseTemplate::new(200).set_body_json(serde_json::json!([segment_entry(
                format!("{}00000001", prefix),
                32 * 1_048_576
            )]))
        })
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path_regex(
            r"^/v1/AUTH_demo/media/clip\.mp4/\.segments/[0-9a-f-]{36}/00000001$",
        ))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v1/AUTH_demo/media/clip.mp4"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let ctx = context(config(&server)).await;
    let store = ctx.blob_store("RegionOne").unwrap();
    let blob = Blob::builder("clip.mp4")
        .payload(vec![0u8; 33 * MIB])
        .content_type("video/mp4")
        .build();
    let err = put_multipart_blob(store.as_ref(), "media", blob, &PutOptions::multipart(), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::Authorization(_)));
}

#[tokio::test]
async fn test_remove_blob_takes_segments_along() {
    let server = MockServer::start().await;
    mount_keystone(&server, 1).await;
    Mock::given(method("DELETE"))
        .and(path("/v1/AUTH_demo/media/clip.mp4"))
        .and(query_param("multipart-manifest", "delete"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Response Status": "200 OK",
            "Response Body": "",
            "Number Deleted": 3,
            "Number Not Found": 0,
            "Errors": []
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/AUTH_demo/media/locked.mp4"))
        .and(query_param("multipart-manifest", "delete"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Response Status": "400 Bad Request",
            "Number Deleted": 0,
            "Number Not Found": 0,
            "Errors": [["/media/locked.mp4/.segments/x/00000001", "403 Forbidden"]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = context(config(&server)).await;
    let store = ctx.blob_store("RegionOne").unwrap();
    store.remove_blob("media", "clip.mp4").await.unwrap();

    let err = store.remove_blob("media", "locked.mp4").await.unwrap_err();
    match err {
        CloudError::IllegalArgument(message) => assert!(message.contains("403 Forbidden")),
        other => panic!("unexpected error: {:?}", other),
    }
}
