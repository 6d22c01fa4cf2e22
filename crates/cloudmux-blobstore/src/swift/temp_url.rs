// Copyright (C) 2025 cloudmux Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Swift TempURL signatures
//!
//! A TempURL carries `temp_url_sig` and `temp_url_expires` query parameters.
//! The signature is the hex HMAC-SHA1, under the account's
//! `X-Account-Meta-Temp-URL-Key`, of `"{METHOD}\n{expires}\n{path}"` where
//! `path` is the unencoded object path starting at `/v1/`.

use cloudmux_core::{CloudError, CloudResult};
use hmac::{Hmac, Mac};
use reqwest::Method;
use sha1::Sha1;
use url::Url;

/// Hex signature for `method` on `path` until `expires` (unix seconds)
pub fn signature(key: &str, method: &Method, expires: i64, path: &str) -> CloudResult<String> {
    let mut mac = Hmac::<Sha1>::new_from_slice(key.as_bytes())
        .map_err(|e| CloudError::illegal_argument(format!("invalid TempURL key: {}", e)))?;
    mac.update(format!("{}\n{}\n{}", method.as_str(), expires, path).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Append the TempURL parameters to an object URL
pub fn sign_url(
    key: &str,
    method: &Method,
    expires: i64,
    path: &str,
    mut url: Url,
) -> CloudResult<Url> {
    let sig = signature(key, method, expires, path)?;
    url.query_pairs_mut()
        .clear()
        .append_pair("temp_url_sig", &sig)
        .append_pair("temp_url_expires", &expires.to_string());
    Ok(url)
}
