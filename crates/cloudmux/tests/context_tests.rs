// Copyright (C) 2025 cloudmux Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Provider contexts built from configuration documents
//!
//! Remote providers run against a mock server; nothing here talks to a real
//! cloud.

use bytes::Bytes;
use cloudmux::config::{ConfigError, ConfigFormat};
use cloudmux::{
    Blob, BlobStore, CloudError, Config, ConfigLoader, ContextBuilder, Error, GetOptions,
    Operation, OperationStatus, ProviderContext, PutOptions,
};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{header_regex, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const AZURE_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

fn config(document: serde_json::Value) -> Config {
    ConfigLoader::new()
        .load_from_string(&document.to_string(), ConfigFormat::Json)
        .unwrap()
}

fn builder(document: serde_json::Value) -> ContextBuilder {
    ContextBuilder::new(config(document)).unwrap()
}

/// Short retry and poll timing so failure paths finish quickly
fn fast_timing() -> serde_json::Value {
    json!({
        "http": {"max_retries": 1, "retry_delay_ms": 1, "max_retry_delay_ms": 5},
        "polling": {"timeout_secs": 5, "initial_period_ms": 10, "max_period_ms": 20, "backoff_factor": 1.0}
    })
}

fn with_providers(providers: serde_json::Value) -> serde_json::Value {
    let mut document = fast_timing();
    document["providers"] = providers;
    document
}

#[tokio::test]
async fn test_transient_round_trip() {
    let builder = builder(with_providers(json!({"scratch": {"provider": "transient"}})));
    let context = assert_ok!(builder.blob_store_context("scratch").await);
    assert_eq!(context.provider(), "transient");
    assert_eq!(context.configured_regions(), vec!["default"]);

    let store = context.default_blob_store();
    assert!(store.create_container("photos").await.unwrap());
    let blob = Blob::builder("cat.jpg")
        .payload(Bytes::from_static(b"meow"))
        .content_type("image/jpeg")
        .build();
    store.put_blob("photos", blob, &PutOptions::default()).await.unwrap();

    let fetched = store
        .get_blob("photos", "cat.jpg", &GetOptions::default())
        .await
        .unwrap()
        .expect("blob stored");
    assert_eq!(fetched.metadata.content.content_type.as_deref(), Some("image/jpeg"));
}

#[tokio::test]
async fn test_filesystem_context_uses_base_dir() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("blobs");
    let builder = builder(with_providers(json!({
        "local": {"provider": "filesystem", "base_dir": base.to_str().unwrap()}
    })));

    let context = match builder.build("local").await.unwrap() {
        ProviderContext::BlobStore(context) => context,
        other => panic!("expected a blob store context, got {:?}", other),
    };
    assert_eq!(context.provider(), "filesystem");
    assert_eq!(context.default_region(), "local");

    let store = context.blob_store("local").unwrap();
    store.create_container("docs").await.unwrap();
    assert!(base.join("docs").is_dir());
}

#[tokio::test]
async fn test_unknown_provider() {
    let builder = builder(with_providers(json!({"scratch": {"provider": "transient"}})));
    let err = assert_err!(builder.blob_store_context("nope").await);
    assert!(matches!(err, Error::Config(ConfigError::UnknownProvider(ref name)) if name == "nope"));
}

#[tokio::test]
async fn test_services_do_not_cross() {
    let builder = builder(with_providers(json!({
        "scratch": {"provider": "transient"},
        "gce": {"provider": "google-compute", "project": "demo", "access_token": "t"}
    })));

    let err = assert_err!(builder.compute_context("scratch"));
    assert!(matches!(
        err,
        Error::WrongService { kind: "transient", wanted: "compute", .. }
    ));
    let err = assert_err!(builder.blob_store_context("gce").await);
    assert!(matches!(
        err,
        Error::WrongService { kind: "google-compute", wanted: "blob store", .. }
    ));
    assert!(err.to_string().contains("'gce'"));
}

#[test]
fn test_invalid_configuration_is_rejected() {
    let mut document = with_providers(json!({"aws": {"provider": "s3", "access_key_id": "AKIA"}}));
    let err = ContextBuilder::new(config_unchecked(&document)).unwrap_err();
    match err {
        Error::Config(e) => assert_eq!(e.field(), Some("providers.aws.access_key_id")),
        other => panic!("unexpected error: {:?}", other),
    }

    document["providers"]["aws"]["secret_access_key"] = json!("secret");
    assert!(ContextBuilder::new(config_unchecked(&document)).is_ok());
}

fn config_unchecked(document: &serde_json::Value) -> Config {
    ConfigLoader::without_validation()
        .load_from_string(&document.to_string(), ConfigFormat::Json)
        .unwrap()
}

#[tokio::test]
async fn test_s3_store_per_region() {
    let builder = builder(with_providers(json!({
        "aws": {
            "provider": "s3",
            "regions": ["us-east-1", "eu-west-1"],
            "default_region": "eu-west-1",
            "endpoint": "http://127.0.0.1:9000",
            "access_key_id": "minioadmin",
            "secret_access_key": "minioadmin"
        }
    })));

    let context = builder.blob_store_context("aws").await.unwrap();
    assert_eq!(context.provider(), "aws-s3");
    assert_eq!(context.configured_regions(), vec!["eu-west-1", "us-east-1"]);
    assert_eq!(context.default_region(), "eu-west-1");

    let store = context.blob_store("us-east-1").unwrap();
    let locations = store.list_assignable_locations().await.unwrap();
    assert_eq!(locations[0].region_id(), Some("us-east-1"));
    assert!(context.blob_store("ap-south-1").is_err());
}

#[tokio::test]
async fn test_azure_from_connection_string() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/devstoreaccount1/photos"))
        .and(query_param("restype", "container"))
        .and(header_regex(
            "authorization",
            "^SharedKey devstoreaccount1:[A-Za-z0-9+/=]+$",
        ))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let connection_string = format!(
        "DefaultEndpointsProtocol=http;AccountName=devstoreaccount1;AccountKey={};BlobEndpoint={}/devstoreaccount1;",
        AZURE_KEY,
        server.uri()
    );
    let builder = builder(with_providers(json!({
        "azure": {"provider": "azureblob", "connection_string": connection_string}
    })));

    let context = builder.blob_store_context("azure").await.unwrap();
    assert_eq!(context.provider(), "azureblob");
    assert_eq!(context.default_region(), "devstoreaccount1");
    assert!(context.default_blob_store().create_container("photos").await.unwrap());
}

#[tokio::test]
async fn test_azure_account_key_must_be_base64() {
    let builder = builder(with_providers(json!({
        "azure": {"provider": "azureblob", "account": "media01", "account_key": "not base64!"}
    })));
    let err = assert_err!(builder.blob_store_context("azure").await);
    assert!(matches!(err, Error::Cloud(CloudError::IllegalArgument(_))));
}

#[tokio::test]
async fn test_swift_regions_from_catalog() {
    let server = MockServer::start().await;
    let endpoint = |region: &str, account: &str| {
        json!({
            "interface": "public",
            "region_id": region,
            "region": region,
            "url": format!("{}/v1/{}", server.uri(), account),
        })
    };
    Mock::given(method("POST"))
        .and(path("/v3/auth/tokens"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("x-subject-token", "gAAAA-token")
                .set_body_json(json!({
                    "token": {
                        "expires_at": "2099-01-01T00:00:00Z",
                        "catalog": [{"type": "object-store", "endpoints": [
                            endpoint("RegionOne", "AUTH_one"),
                            endpoint("RegionTwo", "AUTH_two"),
                        ]}]
                    }
                })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let builder = builder(with_providers(json!({
        "openstack": {
            "provider": "swift",
            "identity_endpoint": format!("{}/v3", server.uri()),
            "username": "demo",
            "password": "s3cret",
            "project": "media",
            "default_region": "RegionTwo",
            "temp_url_key": "tempkey"
        }
    })));

    let context = builder.blob_store_context("openstack").await.unwrap();
    assert_eq!(context.provider(), "openstack-swift");
    assert_eq!(context.configured_regions(), vec!["RegionOne", "RegionTwo"]);
    assert_eq!(context.default_region(), "RegionTwo");
    assert!(context.signer("RegionOne").is_ok());
}

#[tokio::test]
async fn test_compute_waits_for_operation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/compute/v1/projects/demo/zones/us-east1-b/operations/op-7"))
        .and(header_regex("authorization", "^Bearer ya29\\.token$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "op-7",
            "zone": format!("{}/compute/v1/projects/demo/zones/us-east1-b", server.uri()),
            "status": "DONE",
            "progress": 100
        })))
        .expect(1)
        .mount(&server)
        .await;

    let builder = builder(with_providers(json!({
        "gce": {
            "provider": "google-compute",
            "project": "demo",
            "access_token": "ya29.token",
            "endpoint": format!("{}/compute/v1/", server.uri())
        }
    })));
    let context = builder.compute_context("gce").unwrap();
    assert_eq!(context.provider(), "gce");
    assert_eq!(context.waiter().settings().initial_period.as_millis(), 10);

    let pending = Operation {
        status: OperationStatus::Running,
        ..Operation::new("op-7").in_zone("us-east1-b")
    };
    let done = context.wait(pending).await.unwrap();
    assert_eq!(done.status, OperationStatus::Done);
    assert_eq!(done.progress, Some(100));
}

#[tokio::test]
async fn test_from_file_applies_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cloudmux.toml");
    tokio::fs::write(
        &path,
        "[providers.scratch]\nprovider = \"transient\"\n\n[blobstore]\npart_concurrency = 8\n",
    )
    .await
    .unwrap();

    let builder = ContextBuilder::from_file(&path).await.unwrap();
    assert_eq!(builder.config().provider_names(), vec!["scratch"]);
    assert_eq!(builder.config().blobstore.part_concurrency, 8);
    assert!(matches!(
        builder.build("scratch").await.unwrap(),
        ProviderContext::BlobStore(_)
    ));
}
