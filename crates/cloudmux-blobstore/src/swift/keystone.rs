// Copyright (C) 2025 cloudmux Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Keystone v3 password authentication
//!
//! Tokens are requested with `POST {identity}/auth/tokens` and cached until
//! shortly before they expire. Callers that get a 401 with a cached token
//! hand it back through [`KeystoneAuth::invalidate`] and ask again.

use super::model::{AuthRequest, CatalogEntry, TokenResponse};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use cloudmux_core::http::{header_str, status_error};
use cloudmux_core::{CloudError, CloudResult, RestClient};
use reqwest::StatusCode;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

/// Catalog type of the object storage service
pub const OBJECT_STORE: &str = "object-store";

/// Tokens are renewed this long before they expire
const EXPIRY_SKEW_SECS: i64 = 60;

/// Password credentials scoped to a project
#[derive(Clone)]
pub struct KeystoneCredentials {
    /// User name
    pub username: String,
    /// Password
    pub password: String,
    /// Domain of the user
    pub user_domain: String,
    /// Project (tenant) name
    pub project: String,
    /// Domain of the project
    pub project_domain: String,
}

impl fmt::Debug for KeystoneCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeystoneCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("user_domain", &self.user_domain)
            .field("project", &self.project)
            .field("project_domain", &self.project_domain)
            .finish()
    }
}

/// An issued token with the service catalog it came with
#[derive(Debug, Clone)]
pub struct KeystoneToken {
    /// Value for `X-Auth-Token`
    pub id: String,
    /// Expiry announced by Keystone
    pub expires_at: DateTime<Utc>,
    /// Service catalog
    pub catalog: Vec<CatalogEntry>,
}

impl KeystoneToken {
    /// Still usable at `now`, keeping a safety margin before expiry
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - ChronoDuration::seconds(EXPIRY_SKEW_SECS) > now
    }

    /// Endpoints of a service type on one interface, keyed by region
    pub fn endpoints(&self, service_type: &str, interface: &str) -> CloudResult<BTreeMap<String, Url>> {
        let mut endpoints = BTreeMap::new();
        for entry in self.catalog.iter().filter(|e| e.service_type == service_type) {
            for endpoint in entry.endpoints.iter().filter(|e| e.interface == interface) {
                let Some(region) = endpoint.region_name() else {
                    continue;
                };
                let url = Url::parse(&endpoint.url).map_err(|e| {
                    CloudError::parse(format!("catalog endpoint {}: {}", endpoint.url, e))
                })?;
                endpoints.insert(region.to_string(), url);
            }
        }
        Ok(endpoints)
    }
}

/// Token source shared by every regional store of an account
pub struct KeystoneAuth {
    http: RestClient,
    tokens_url: Url,
    credentials: KeystoneCredentials,
    cached: Mutex<Option<Arc<KeystoneToken>>>,
}

impl fmt::Debug for KeystoneAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeystoneAuth")
            .field("tokens_url", &self.tokens_url.as_str())
            .field("credentials", &self.credentials)
            .finish()
    }
}

impl KeystoneAuth {
    /// Authenticate against the v3 API rooted at `identity_endpoint`
    /// (e.g. `https://keystone.example.com:5000/v3`)
    pub fn new(
        identity_endpoint: &Url,
        credentials: KeystoneCredentials,
        http: RestClient,
    ) -> CloudResult<Self> {
        let mut tokens_url = identity_endpoint.clone();
        tokens_url
            .path_segments_mut()
            .map_err(|_| {
                CloudError::illegal_argument(format!(
                    "identity endpoint {} cannot hold paths",
                    identity_endpoint
                ))
            })?
            .pop_if_empty()
            .extend(["auth", "tokens"]);

        Ok(KeystoneAuth {
            http,
            tokens_url,
            credentials,
            cached: Mutex::new(None),
        })
    }

    /// A fresh token, authenticating if none is cached
    pub async fn token(&self) -> CloudResult<Arc<KeystoneToken>> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Utc::now()) {
                return Ok(Arc::clone(token));
            }
            debug!(expires_at = %token.expires_at, "Keystone token about to expire");
        }

        let token = Arc::new(self.authenticate().await?);
        *cached = Some(Arc::clone(&token));
        Ok(token)
    }

    /// Drop `rejected` from the cache unless it was already replaced
    pub async fn invalidate(&self, rejected: &KeystoneToken) {
        let mut cached = self.cached.lock().await;
        if cached.as_ref().is_some_and(|t| t.id == rejected.id) {
            debug!("discarding rejected Keystone token");
            *cached = None;
        }
    }

    async fn authenticate(&self) -> CloudResult<KeystoneToken> {
        let c = &self.credentials;
        let body = AuthRequest::password(
            &c.username,
            &c.user_domain,
            &c.password,
            &c.project,
            &c.project_domain,
        );

        let response = self
            .http
            .execute("authenticate", |client| {
                Ok(client.post(self.tokens_url.clone()).json(&body).build()?)
            })
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(CloudError::authorization(format!(
                "Keystone rejected credentials of {}@{}",
                c.username, c.project
            )));
        }
        if !response.status().is_success() {
            return Err(status_error(response, "authenticate").await);
        }

        let id = header_str(response.headers(), "x-subject-token")
            .ok_or_else(|| CloudError::parse("Keystone answer has no X-Subject-Token"))?;
        let parsed: TokenResponse = serde_json::from_str(&response.text().await?)
            .map_err(|e| CloudError::parse(format!("Keystone token: {}", e)))?;

        info!(
            user = %c.username,
            project = %c.project,
            expires_at = %parsed.token.expires_at,
            "authenticated with Keystone"
        );
        Ok(KeystoneToken {
            id,
            expires_at: parsed.token.expires_at,
            catalog: parsed.token.catalog,
        })
    }
}
