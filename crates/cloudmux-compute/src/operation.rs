// Copyright (C) 2025 cloudmux Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Compute operation model
//!
//! Mutating compute calls return an [`Operation`] immediately and finish the
//! work in the background. Operations live in one of three scopes (global,
//! region or zone), derived from the `zone` / `region` links they carry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    /// Accepted, not started
    #[default]
    Pending,
    /// In progress
    Running,
    /// Finished, successfully or not
    Done,
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationStatus::Pending => "PENDING",
            OperationStatus::Running => "RUNNING",
            OperationStatus::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Where an operation lives
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperationScope {
    /// Project-wide
    Global,
    /// Regional, by region name
    Region(String),
    /// Zonal, by zone name
    Zone(String),
}

impl fmt::Display for OperationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationScope::Global => f.write_str("global"),
            OperationScope::Region(region) => write!(f, "regions/{}", region),
            OperationScope::Zone(zone) => write!(f, "zones/{}", zone),
        }
    }
}

/// One error reported by a failed operation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OperationErrorEntry {
    /// Error type identifier (e.g. `QUOTA_EXCEEDED`)
    #[serde(default)]
    pub code: String,
    /// Field or resource the error refers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Human readable message
    #[serde(default)]
    pub message: String,
}

/// Errors of a failed operation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OperationError {
    /// Individual errors
    #[serde(default)]
    pub errors: Vec<OperationErrorEntry>,
}

/// Key/value detail of a warning
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WarningData {
    /// Detail key
    #[serde(default)]
    pub key: String,
    /// Detail value
    #[serde(default)]
    pub value: String,
}

/// Non-fatal warning attached to an operation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OperationWarning {
    /// Warning type identifier
    #[serde(default)]
    pub code: String,
    /// Human readable message
    #[serde(default)]
    pub message: String,
    /// Details
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<WarningData>,
}

/// An asynchronous compute operation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Server-assigned numeric id
    #[serde(default)]
    pub id: String,
    /// Name used to fetch the operation
    pub name: String,
    /// URL of this operation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
    /// URL of the resource the operation acts on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_link: Option<String>,
    /// Id of the target resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    /// Lifecycle state
    #[serde(default)]
    pub status: OperationStatus,
    /// Optional detail about the state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    /// Account that requested the operation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Rough completion percentage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u32>,
    /// When the operation was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert_time: Option<DateTime<Utc>>,
    /// When work started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// When the operation finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Errors, set when a finished operation failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
    /// Warnings
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<OperationWarning>,
    /// HTTP status the operation would have answered synchronously
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_error_status_code: Option<u16>,
    /// Reason phrase matching `http_error_status_code`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_error_message: Option<String>,
    /// Kind of work (`insert`, `delete`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_type: Option<String>,
    /// Zone URL of zonal operations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    /// Region URL of regional operations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl Operation {
    /// Pending operation with just a name
    pub fn new(name: impl Into<String>) -> Self {
        Operation {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Place the operation in a zone
    pub fn in_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    /// Place the operation in a region
    pub fn in_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Scope taken from the last path segment of the zone or region link
    ///
    /// A zone wins over a region; neither means global.
    pub fn scope(&self) -> OperationScope {
        if let Some(zone) = self.zone.as_deref().and_then(last_segment) {
            return OperationScope::Zone(zone.to_string());
        }
        if let Some(region) = self.region.as_deref().and_then(last_segment) {
            return OperationScope::Region(region.to_string());
        }
        OperationScope::Global
    }

    /// Whether the operation reached `DONE`
    pub fn is_done(&self) -> bool {
        self.status == OperationStatus::Done
    }

    /// Whether a finished operation reports a failure
    pub fn has_failed(&self) -> bool {
        self.error.as_ref().is_some_and(|e| !e.errors.is_empty())
            || self.http_error_status_code.is_some_and(|code| code >= 400)
    }

    /// Summary of the failure, if any
    pub fn failure_message(&self) -> Option<String> {
        if !self.has_failed() {
            return None;
        }
        let mut parts: Vec<String> = self
            .error
            .iter()
            .flat_map(|e| e.errors.iter())
            .map(|entry| format!("{}: {}", entry.code, entry.message))
            .collect();
        if let Some(code) = self.http_error_status_code.filter(|code| *code >= 400) {
            parts.push(format!(
                "HTTP {} {}",
                code,
                self.http_error_message.as_deref().unwrap_or_default()
            ));
        }
        Some(parts.join("; ").trim_end().to_string())
    }
}

fn last_segment(link: &str) -> Option<&str> {
    link.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ZONAL: &str = r#"{
        "kind": "compute#operation",
        "id": "4392874394520918273",
        "name": "operation-1737972000000-62c1a2b3c4d5e-6f7a8b9c-0d1e2f3a",
        "zone": "https://compute.googleapis.com/compute/v1/projects/demo/zones/europe-west1-b",
        "operationType": "insert",
        "targetLink": "https://compute.googleapis.com/compute/v1/projects/demo/zones/europe-west1-b/instances/web-1",
        "targetId": "8123456789012345678",
        "status": "RUNNING",
        "user": "ops@demo.iam.gserviceaccount.com",
        "progress": 40,
        "insertTime": "2025-01-27T02:00:00.000-08:00",
        "startTime": "2025-01-27T02:00:01.500-08:00",
        "selfLink": "https://compute.googleapis.com/compute/v1/projects/demo/zones/europe-west1-b/operations/operation-1737972000000-62c1a2b3c4d5e-6f7a8b9c-0d1e2f3a"
    }"#;

    #[test]
    fn test_parse_zonal_operation() {
        let op: Operation = serde_json::from_str(ZONAL).unwrap();
        assert_eq!(op.status, OperationStatus::Running);
        assert_eq!(op.progress, Some(40));
        assert_eq!(op.operation_type.as_deref(), Some("insert"));
        assert_eq!(
            op.insert_time,
            Some(Utc.with_ymd_and_hms(2025, 1, 27, 10, 0, 0).unwrap())
        );
        assert_eq!(op.scope(), OperationScope::Zone("europe-west1-b".to_string()));
        assert!(!op.is_done());
        assert!(!op.has_failed());
    }

    #[test]
    fn test_scope_derivation() {
        assert_eq!(Operation::new("op").scope(), OperationScope::Global);
        assert_eq!(
            Operation::new("op").in_region("projects/demo/regions/us-east1/").scope(),
            OperationScope::Region("us-east1".to_string())
        );
        assert_eq!(
            Operation::new("op")
                .in_region("us-east1")
                .in_zone("us-east1-c")
                .scope(),
            OperationScope::Zone("us-east1-c".to_string())
        );
        assert_eq!(Operation::new("op").in_zone("").scope(), OperationScope::Global);
        assert_eq!(OperationScope::Zone("a".into()).to_string(), "zones/a");
    }

    #[test]
    fn test_failed_operation() {
        let body = r#"{
            "name": "operation-2",
            "status": "DONE",
            "error": {"errors": [
                {"code": "QUOTA_EXCEEDED", "message": "Quota 'CPUS' exceeded."}
            ]},
            "httpErrorStatusCode": 403,
            "httpErrorMessage": "FORBIDDEN"
        }"#;
        let op: Operation = serde_json::from_str(body).unwrap();
        assert!(op.is_done());
        assert!(op.has_failed());
        assert_eq!(
            op.failure_message().as_deref(),
            Some("QUOTA_EXCEEDED: Quota 'CPUS' exceeded.; HTTP 403 FORBIDDEN")
        );
    }

    #[test]
    fn test_serializes_camel_case() {
        let mut op = Operation::new("op-1").in_region("us-east1");
        op.status = OperationStatus::Done;
        op.http_error_status_code = Some(200);
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["status"], "DONE");
        assert_eq!(value["httpErrorStatusCode"], 200);
        assert!(value.get("zone").is_none());
        assert!(!op.has_failed());
    }
}
