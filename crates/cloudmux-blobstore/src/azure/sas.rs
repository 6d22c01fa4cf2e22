// Copyright (C) 2025 cloudmux Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Service shared access signatures for single blobs

use super::auth::{AzureCredentials, API_VERSION};
use chrono::{DateTime, SecondsFormat, Utc};
use cloudmux_core::CloudResult;
use url::form_urlencoded;

/// Rights granted by a blob SAS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SasPermissions {
    /// Download
    Read,
    /// Create or overwrite
    Write,
    /// Delete
    Delete,
}

impl SasPermissions {
    /// `sp` value
    pub fn as_str(&self) -> &'static str {
        match self {
            SasPermissions::Read => "r",
            SasPermissions::Write => "cw",
            SasPermissions::Delete => "d",
        }
    }
}

/// String signed for a blob SAS
///
/// Start time, identifier, IP range, protocol, snapshot and the response
/// header overrides are left empty.
pub fn string_to_sign(
    account: &str,
    container: &str,
    name: &str,
    permissions: SasPermissions,
    expiry: &str,
) -> String {
    let resource = format!("/blob/{}/{}/{}", account, container, name);
    [
        permissions.as_str(),
        "",
        expiry,
        resource.as_str(),
        "",
        "",
        "",
        API_VERSION,
        "b",
        "",
        "",
        "",
        "",
        "",
        "",
    ]
    .join("\n")
}

/// Query string authorizing one blob until `expiry`
pub fn blob_sas_query(
    credentials: &AzureCredentials,
    container: &str,
    name: &str,
    permissions: SasPermissions,
    expiry: DateTime<Utc>,
) -> CloudResult<String> {
    let expiry = expiry.to_rfc3339_opts(SecondsFormat::Secs, true);
    let signature = credentials.sign(&string_to_sign(
        credentials.account(),
        container,
        name,
        permissions,
        &expiry,
    ))?;

    Ok(form_urlencoded::Serializer::new(String::new())
        .append_pair("sv", API_VERSION)
        .append_pair("se", &expiry)
        .append_pair("sr", "b")
        .append_pair("sp", permissions.as_str())
        .append_pair("sig", &signature)
        .finish())
}
