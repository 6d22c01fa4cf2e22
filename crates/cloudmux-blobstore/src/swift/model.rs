// Copyright (C) 2025 cloudmux Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! JSON bodies of Keystone v3 and the Swift object API

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// `POST /v3/auth/tokens` body for password authentication scoped to a project
#[derive(Debug, Serialize)]
pub struct AuthRequest<'a> {
    pub auth: Auth<'a>,
}

#[derive(Debug, Serialize)]
pub struct Auth<'a> {
    pub identity: Identity<'a>,
    pub scope: Scope<'a>,
}

#[derive(Debug, Serialize)]
pub struct Identity<'a> {
    pub methods: [&'a str; 1],
    pub password: PasswordMethod<'a>,
}

#[derive(Debug, Serialize)]
pub struct PasswordMethod<'a> {
    pub user: User<'a>,
}

#[derive(Debug, Serialize)]
pub struct User<'a> {
    pub name: &'a str,
    pub domain: Named<'a>,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct Scope<'a> {
    pub project: Project<'a>,
}

#[derive(Debug, Serialize)]
pub struct Project<'a> {
    pub name: &'a str,
    pub domain: Named<'a>,
}

#[derive(Debug, Serialize)]
pub struct Named<'a> {
    pub name: &'a str,
}

impl<'a> AuthRequest<'a> {
    pub fn password(
        username: &'a str,
        user_domain: &'a str,
        password: &'a str,
        project: &'a str,
        project_domain: &'a str,
    ) -> Self {
        AuthRequest {
            auth: Auth {
                identity: Identity {
                    methods: ["password"],
                    password: PasswordMethod {
                        user: User {
                            name: username,
                            domain: Named { name: user_domain },
                            password,
                        },
                    },
                },
                scope: Scope {
                    project: Project {
                        name: project,
                        domain: Named {
                            name: project_domain,
                        },
                    },
                },
            },
        }
    }
}

/// Token answer; the token id itself travels in `X-Subject-Token`
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub token: TokenBody,
}

#[derive(Debug, Deserialize)]
pub struct TokenBody {
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub catalog: Vec<CatalogEntry>,
}

/// One service of the catalog
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEndpoint {
    pub interface: String,
    #[serde(default)]
    pub region_id: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    pub url: String,
}

impl CatalogEndpoint {
    /// Region id, falling back to the legacy `region` field
    pub fn region_name(&self) -> Option<&str> {
        self.region_id.as_deref().or(self.region.as_deref())
    }
}

/// Entry of an account listing
#[derive(Debug, Deserialize)]
pub struct ContainerEntry {
    pub name: String,
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub last_modified: Option<String>,
}

/// Entry of a container listing; delimiter roll-ups come back as `subdir`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ObjectEntry {
    Subdir {
        subdir: String,
    },
    Object {
        name: String,
        #[serde(default)]
        hash: Option<String>,
        #[serde(default)]
        bytes: u64,
        #[serde(default)]
        content_type: Option<String>,
        #[serde(default)]
        last_modified: Option<String>,
    },
}

impl ObjectEntry {
    pub fn name(&self) -> &str {
        match self {
            ObjectEntry::Subdir { subdir } => subdir,
            ObjectEntry::Object { name, .. } => name,
        }
    }
}

/// Segment reference in a Static Large Object manifest
#[derive(Debug, Serialize)]
pub struct ManifestSegment {
    pub path: String,
    pub etag: String,
    pub size_bytes: u64,
}

/// Summary returned by `DELETE ...?multipart-manifest=delete`
///
/// The request itself answers 200; the outcome is in `Response Status`.
#[derive(Debug, Deserialize)]
pub struct BulkDeleteResult {
    #[serde(rename = "Response Status")]
    pub response_status: String,
    #[serde(rename = "Number Deleted", default)]
    pub number_deleted: u64,
    #[serde(rename = "Number Not Found", default)]
    pub number_not_found: u64,
    #[serde(rename = "Errors", default)]
    pub errors: Vec<Vec<String>>,
}

impl BulkDeleteResult {
    /// Numeric part of `Response Status` ("200 OK" → 200)
    pub fn status_code(&self) -> Option<u16> {
        self.response_status.split_whitespace().next()?.parse().ok()
    }

    /// Error entries joined as `path: reason`
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|entry| entry.join(": "))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Listing timestamps are naive UTC with microseconds
pub fn parse_listing_time(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
