// Copyright (C) 2025 cloudmux Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Operation lookup
//!
//! [`OperationApi`] is the seam the predicates poll through. [`GoogleComputeApi`]
//! implements it over the Compute Engine v1 REST API:
//!
//! ```text
//! GET {base}/projects/{project}/global/operations/{name}
//! GET {base}/projects/{project}/regions/{region}/operations/{name}
//! GET {base}/projects/{project}/zones/{zone}/operations/{name}
//! ```

use crate::operation::{Operation, OperationScope};
use async_trait::async_trait;
use cloudmux_core::http::status_error;
use cloudmux_core::{CloudError, CloudResult, RestClient};
use reqwest::StatusCode;
use std::fmt;
use tracing::debug;
use url::Url;

/// Public Compute Engine endpoint
pub const DEFAULT_COMPUTE_ENDPOINT: &str = "https://compute.googleapis.com/compute/v1/";

/// Fetches the current state of an operation
///
/// Every getter answers `Ok(None)` when the operation does not exist (any
/// more); other failures are errors.
#[async_trait]
pub trait OperationApi: Send + Sync + fmt::Debug {
    /// Project-wide operation
    async fn get_global_operation(&self, name: &str) -> CloudResult<Option<Operation>>;

    /// Operation of a region
    async fn get_region_operation(&self, region: &str, name: &str)
        -> CloudResult<Option<Operation>>;

    /// Operation of a zone
    async fn get_zone_operation(&self, zone: &str, name: &str) -> CloudResult<Option<Operation>>;

    /// Dispatch on a scope
    async fn get_operation(
        &self,
        scope: &OperationScope,
        name: &str,
    ) -> CloudResult<Option<Operation>> {
        match scope {
            OperationScope::Global => self.get_global_operation(name).await,
            OperationScope::Region(region) => self.get_region_operation(region, name).await,
            OperationScope::Zone(zone) => self.get_zone_operation(zone, name).await,
        }
    }
}

/// Compute Engine operations over REST with a bearer token
#[derive(Clone)]
pub struct GoogleComputeApi {
    http: RestClient,
    base: Url,
    project: String,
    access_token: String,
}

impl fmt::Debug for GoogleComputeApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleComputeApi")
            .field("base", &self.base.as_str())
            .field("project", &self.project)
            .field("access_token", &"***")
            .finish()
    }
}

impl GoogleComputeApi {
    /// Client for `project` against the public endpoint
    pub fn new(
        http: RestClient,
        project: impl Into<String>,
        access_token: impl Into<String>,
    ) -> CloudResult<Self> {
        let project = project.into();
        if project.is_empty() {
            return Err(CloudError::illegal_argument("compute project must not be empty"));
        }
        Ok(GoogleComputeApi {
            http,
            base: parse_base(DEFAULT_COMPUTE_ENDPOINT)?,
            project,
            access_token: access_token.into(),
        })
    }

    /// Point at another endpoint (emulators, mock servers)
    pub fn with_endpoint(mut self, endpoint: &str) -> CloudResult<Self> {
        self.base = parse_base(endpoint)?;
        Ok(self)
    }

    /// Project the client works on
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Endpoint base URL
    pub fn endpoint(&self) -> &Url {
        &self.base
    }

    /// URL of an operation
    pub fn operation_url(&self, scope: &OperationScope, name: &str) -> CloudResult<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| CloudError::illegal_argument("compute endpoint cannot be a base"))?;
            segments.pop_if_empty().push("projects").push(&self.project);
            match scope {
                OperationScope::Global => {
                    segments.push("global");
                }
                OperationScope::Region(region) => {
                    segments.push("regions").push(region);
                }
                OperationScope::Zone(zone) => {
                    segments.push("zones").push(zone);
                }
            }
            segments.push("operations").push(name);
        }
        Ok(url)
    }

    async fn fetch(&self, scope: &OperationScope, name: &str) -> CloudResult<Option<Operation>> {
        if name.is_empty() {
            return Err(CloudError::illegal_argument("operation name must not be empty"));
        }
        let url = self.operation_url(scope, name)?;
        let context = format!("get operation {}/{}", scope, name);
        let response = self
            .http
            .execute(&context, |client| {
                Ok(client
                    .get(url.clone())
                    .bearer_auth(&self.access_token)
                    .build()?)
            })
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(operation = name, scope = %scope, "operation not found");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error(response, &context).await);
        }

        let body = response.bytes().await?;
        let operation: Operation = serde_json::from_slice(&body)
            .map_err(|e| CloudError::parse(format!("{}: {}", context, e)))?;
        debug!(operation = name, status = %operation.status, "fetched operation");
        Ok(Some(operation))
    }
}

fn parse_base(endpoint: &str) -> CloudResult<Url> {
    Url::parse(endpoint)
        .map_err(|e| CloudError::illegal_argument(format!("invalid compute endpoint '{}': {}", endpoint, e)))
}

#[async_trait]
impl OperationApi for GoogleComputeApi {
    async fn get_global_operation(&self, name: &str) -> CloudResult<Option<Operation>> {
        self.fetch(&OperationScope::Global, name).await
    }

    async fn get_region_operation(
        &self,
        region: &str,
        name: &str,
    ) -> CloudResult<Option<Operation>> {
        self.fetch(&OperationScope::Region(region.to_string()), name)
            .await
    }

    async fn get_zone_operation(&self, zone: &str, name: &str) -> CloudResult<Option<Operation>> {
        self.fetch(&OperationScope::Zone(zone.to_string()), name).await
    }
}
