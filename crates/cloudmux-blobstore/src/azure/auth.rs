// Copyright (C) 2025 cloudmux Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shared Key authentication
//!
//! Every request carries `x-ms-date` and `x-ms-version` and is signed with
//! HMAC-SHA256 over a canonical string built from the verb, the standard
//! headers, the `x-ms-*` headers and the resource path.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use cloudmux_core::{CloudError, CloudResult};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_LENGTH};
use reqwest::{Client, Method, Request};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

use super::AzureRequest;

/// Service version sent on every request
pub const API_VERSION: &str = "2018-11-09";

/// Standard headers that take part in the signature, in signing order
const SIGNED_HEADERS: [&str; 11] = [
    "content-encoding",
    "content-language",
    "content-length",
    "content-md5",
    "content-type",
    "date",
    "if-modified-since",
    "if-match",
    "if-none-match",
    "if-unmodified-since",
    "range",
];

/// Storage account name and decoded key
#[derive(Clone)]
pub struct AzureCredentials {
    account: String,
    key: Vec<u8>,
}

impl fmt::Debug for AzureCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureCredentials")
            .field("account", &self.account)
            .field("key", &"***")
            .finish()
    }
}

impl AzureCredentials {
    /// Credentials from an account name and its base64 key
    pub fn new(account: impl Into<String>, base64_key: &str) -> CloudResult<Self> {
        let account = account.into();
        if account.is_empty() {
            return Err(CloudError::illegal_argument("Azure account name cannot be empty"));
        }
        let key = BASE64
            .decode(base64_key.trim())
            .map_err(|e| CloudError::illegal_argument(format!("Azure account key is not base64: {}", e)))?;
        Ok(AzureCredentials { account, key })
    }

    /// Account name
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Base64 HMAC-SHA256 of `payload` under the account key
    pub fn sign(&self, payload: &str) -> CloudResult<String> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.key)
            .map_err(|e| CloudError::illegal_argument(format!("invalid Azure account key: {}", e)))?;
        mac.update(payload.as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }

    /// Turn a request description into a signed reqwest request
    pub(crate) fn signed_request(
        &self,
        client: &Client,
        request: &AzureRequest,
        now: DateTime<Utc>,
    ) -> CloudResult<Request> {
        let mut headers = request.header_map()?;
        headers.insert("x-ms-date", header_value(&rfc1123(now))?);
        headers.insert("x-ms-version", HeaderValue::from_static(API_VERSION));
        if !request.body.is_empty() {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(request.body.len()));
        }

        let to_sign = string_to_sign(&request.method, &request.url, &headers, &self.account);
        let authorization = format!("SharedKey {}:{}", self.account, self.sign(&to_sign)?);
        headers.insert(AUTHORIZATION, header_value(&authorization)?);

        Ok(client
            .request(request.method.clone(), request.url.clone())
            .headers(headers)
            .body(request.body.clone())
            .build()?)
    }
}

/// Parsed `DefaultEndpointsProtocol=...;AccountName=...` connection string
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    /// Storage account name
    pub account_name: String,
    /// Base64 account key
    pub account_key: String,
    /// Explicit blob endpoint (emulators, sovereign clouds)
    pub blob_endpoint: Option<String>,
    /// `http` or `https`
    pub protocol: String,
    /// DNS suffix used when no endpoint is given
    pub endpoint_suffix: String,
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionString")
            .field("account_name", &self.account_name)
            .field("account_key", &"***")
            .field("blob_endpoint", &self.blob_endpoint)
            .finish()
    }
}

impl ConnectionString {
    /// Parse a connection string; unknown keys are ignored
    pub fn parse(raw: &str) -> CloudResult<Self> {
        let mut pairs = BTreeMap::new();
        for pair in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                CloudError::illegal_argument(format!("malformed connection string segment: {}", pair))
            })?;
            pairs.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }

        let mut take = |key: &str| pairs.remove(key);
        let account_name = take("accountname")
            .ok_or_else(|| CloudError::illegal_argument("connection string lacks AccountName"))?;
        let account_key = take("accountkey")
            .ok_or_else(|| CloudError::illegal_argument("connection string lacks AccountKey"))?;

        Ok(ConnectionString {
            account_name,
            account_key,
            blob_endpoint: take("blobendpoint"),
            protocol: take("defaultendpointsprotocol").unwrap_or_else(|| "https".to_string()),
            endpoint_suffix: take("endpointsuffix").unwrap_or_else(|| "core.windows.net".to_string()),
        })
    }

    /// Blob service endpoint described by this connection string
    pub fn endpoint(&self) -> CloudResult<Url> {
        let raw = match &self.blob_endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!(
                "{}://{}.blob.{}",
                self.protocol, self.account_name, self.endpoint_suffix
            ),
        };
        Url::parse(&raw)
            .map_err(|e| CloudError::illegal_argument(format!("invalid blob endpoint {}: {}", raw, e)))
    }
}

/// Date in the format Azure expects in `x-ms-date`
pub fn rfc1123(when: DateTime<Utc>) -> String {
    when.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Canonical string signed by Shared Key
pub fn string_to_sign(method: &Method, url: &Url, headers: &HeaderMap, account: &str) -> String {
    let mut out = String::with_capacity(256);
    out.push_str(method.as_str());
    out.push('\n');

    for name in SIGNED_HEADERS {
        let value = headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        // a zero length is signed as empty
        if !(name == "content-length" && value == "0") {
            out.push_str(value);
        }
        out.push('\n');
    }

    let ms_headers: BTreeMap<String, String> = headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("x-ms-"))
        .filter_map(|(name, value)| {
            Some((name.as_str().to_string(), value.to_str().ok()?.trim().to_string()))
        })
        .collect();
    for (name, value) in ms_headers {
        out.push_str(&name);
        out.push(':');
        out.push_str(&value);
        out.push('\n');
    }

    out.push_str(&canonicalized_resource(url, account));
    out
}

fn canonicalized_resource(url: &Url, account: &str) -> String {
    let mut resource = format!("/{}{}", account, url.path());

    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in url.query_pairs() {
        params
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into_owned());
    }
    for (name, mut values) in params {
        values.sort();
        resource.push('\n');
        resource.push_str(&name);
        resource.push(':');
        resource.push_str(&values.join(","));
    }
    resource
}

pub(crate) fn header_value(value: &str) -> CloudResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| CloudError::illegal_argument(format!("invalid header value: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // "key" in base64
    const KEY: &str = "a2V5";

    #[test]
    fn test_rfc1123() {
        let when = Utc.with_ymd_and_hms(2025, 1, 27, 10, 0, 5).unwrap();
        assert_eq!(rfc1123(when), "Mon, 27 Jan 2025 10:00:05 GMT");
    }

    #[test]
    fn test_string_to_sign() {
        let url = Url::parse(
            "https://acct.blob.core.windows.net/photos?restype=container&comp=list&prefix=a",
        )
        .unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-ms-version", HeaderValue::from_static(API_VERSION));
        headers.insert(
            "x-ms-date",
            HeaderValue::from_static("Mon, 27 Jan 2025 10:00:05 GMT"),
        );

        let expected = "GET\n\n\n\n\n\n\n\n\n\n\n\n\
                        x-ms-date:Mon, 27 Jan 2025 10:00:05 GMT\n\
                        x-ms-version:2018-11-09\n\
                        /acct/photos\ncomp:list\nprefix:a\nrestype:container";
        assert_eq!(string_to_sign(&Method::GET, &url, &headers, "acct"), expected);
    }

    #[test]
    fn test_zero_content_length_is_blank() {
        let url = Url::parse("https://acct.blob.core.windows.net/c?restype=container").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
        let signed = string_to_sign(&Method::PUT, &url, &headers, "acct");
        assert!(signed.starts_with("PUT\n\n\n\n"));

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("11"));
        let signed = string_to_sign(&Method::PUT, &url, &headers, "acct");
        assert!(signed.starts_with("PUT\n\n\n11\n"));
    }

    #[test]
    fn test_sign_vector() {
        let credentials = AzureCredentials::new("acct", KEY).unwrap();
        assert_eq!(
            credentials.sign("GET\n/acct/c").unwrap(),
            "JRBnDJazm4AEqAiOYSxgtnAsaTqBGSAbI11AV/tecEk="
        );
    }

    #[test]
    fn test_signed_request_headers() {
        let credentials = AzureCredentials::new("acct", KEY).unwrap();
        let request = AzureRequest::new(
            Method::PUT,
            Url::parse("https://acct.blob.core.windows.net/c/b").unwrap(),
        )
        .body(bytes::Bytes::from_static(b"hello"));
        let when = Utc.with_ymd_and_hms(2025, 1, 27, 10, 0, 5).unwrap();

        let built = credentials
            .signed_request(&Client::new(), &request, when)
            .unwrap();
        let headers = built.headers();
        assert_eq!(headers["x-ms-version"], API_VERSION);
        assert_eq!(headers["x-ms-date"], "Mon, 27 Jan 2025 10:00:05 GMT");
        assert_eq!(headers[CONTENT_LENGTH], "5");
        assert!(headers[AUTHORIZATION]
            .to_str()
            .unwrap()
            .starts_with("SharedKey acct:"));
    }

    #[test]
    fn test_bad_key() {
        assert!(AzureCredentials::new("acct", "not base64!").is_err());
        assert!(AzureCredentials::new("", KEY).is_err());
    }

    #[test]
    fn test_connection_string() {
        let parsed = ConnectionString::parse(
            "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=a2V5;EndpointSuffix=core.windows.net",
        )
        .unwrap();
        assert_eq!(parsed.account_name, "acct");
        assert_eq!(parsed.account_key, "a2V5");
        assert_eq!(
            parsed.endpoint().unwrap().as_str(),
            "https://acct.blob.core.windows.net/"
        );

        let emulator = ConnectionString::parse(
            "AccountName=devstoreaccount1;AccountKey=a2V5;BlobEndpoint=http://127.0.0.1:10000/devstoreaccount1;",
        )
        .unwrap();
        assert_eq!(
            emulator.endpoint().unwrap().as_str(),
            "http://127.0.0.1:10000/devstoreaccount1"
        );
        assert!(!format!("{:?}", emulator).contains("a2V5"));
    }

    #[test]
    fn test_connection_string_missing_key() {
        assert!(ConnectionString::parse("AccountName=acct").is_err());
        assert!(ConnectionString::parse("AccountName=acct;garbage").is_err());
    }
}
