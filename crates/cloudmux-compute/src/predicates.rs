// Copyright (C) 2025 cloudmux Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Operation-done predicates
//!
//! Each predicate re-reads the operation, overwrites the caller's copy with
//! the fresh state and holds once the status is `DONE`. Wrap one in a
//! [`RetryablePredicate`](cloudmux_core::RetryablePredicate) to block until
//! completion.

use crate::api::OperationApi;
use crate::operation::{Operation, OperationScope};
use async_trait::async_trait;
use cloudmux_core::{CloudError, CloudResult, Predicate};
use std::sync::Arc;
use tracing::trace;

fn refresh(operation: &mut Operation, fresh: Option<Operation>, scope: &OperationScope) -> CloudResult<bool> {
    let fresh = fresh.ok_or_else(|| {
        CloudError::not_found(format!("operation {}/{}", scope, operation.name))
    })?;
    *operation = fresh;
    trace!(
        operation = %operation.name,
        status = %operation.status,
        progress = operation.progress,
        "operation refreshed"
    );
    Ok(operation.is_done())
}

fn required<'a>(link: Option<&'a str>, what: &str, name: &str) -> CloudResult<&'a str> {
    link.and_then(|l| l.trim_end_matches('/').rsplit('/').next())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CloudError::illegal_argument(format!("operation {} has no {}", name, what)))
}

/// Done check for project-wide operations
#[derive(Debug, Clone)]
pub struct GlobalOperationDonePredicate {
    api: Arc<dyn OperationApi>,
}

impl GlobalOperationDonePredicate {
    /// Predicate polling through `api`
    pub fn new(api: Arc<dyn OperationApi>) -> Self {
        GlobalOperationDonePredicate { api }
    }
}

#[async_trait]
impl Predicate<Operation> for GlobalOperationDonePredicate {
    async fn test(&self, operation: &mut Operation) -> CloudResult<bool> {
        let fresh = self.api.get_global_operation(&operation.name).await?;
        refresh(operation, fresh, &OperationScope::Global)
    }
}

/// Done check for regional operations
#[derive(Debug, Clone)]
pub struct RegionOperationDonePredicate {
    api: Arc<dyn OperationApi>,
}

impl RegionOperationDonePredicate {
    /// Predicate polling through `api`
    pub fn new(api: Arc<dyn OperationApi>) -> Self {
        RegionOperationDonePredicate { api }
    }
}

#[async_trait]
impl Predicate<Operation> for RegionOperationDonePredicate {
    async fn test(&self, operation: &mut Operation) -> CloudResult<bool> {
        let region = required(operation.region.as_deref(), "region", &operation.name)?.to_string();
        let fresh = self.api.get_region_operation(&region, &operation.name).await?;
        refresh(operation, fresh, &OperationScope::Region(region))
    }
}

/// Done check for zonal operations
#[derive(Debug, Clone)]
pub struct ZoneOperationDonePredicate {
    api: Arc<dyn OperationApi>,
}

impl ZoneOperationDonePredicate {
    /// Predicate polling through `api`
    pub fn new(api: Arc<dyn OperationApi>) -> Self {
        ZoneOperationDonePredicate { api }
    }
}

#[async_trait]
impl Predicate<Operation> for ZoneOperationDonePredicate {
    async fn test(&self, operation: &mut Operation) -> CloudResult<bool> {
        let zone = required(operation.zone.as_deref(), "zone", &operation.name)?.to_string();
        let fresh = self.api.get_zone_operation(&zone, &operation.name).await?;
        refresh(operation, fresh, &OperationScope::Zone(zone))
    }
}

/// Done check for any operation, picking the scope from the operation itself
#[derive(Debug, Clone)]
pub struct OperationDonePredicate {
    global: GlobalOperationDonePredicate,
    region: RegionOperationDonePredicate,
    zone: ZoneOperationDonePredicate,
}

impl OperationDonePredicate {
    /// Predicate polling through `api`
    pub fn new(api: Arc<dyn OperationApi>) -> Self {
        OperationDonePredicate {
            global: GlobalOperationDonePredicate::new(Arc::clone(&api)),
            region: RegionOperationDonePredicate::new(Arc::clone(&api)),
            zone: ZoneOperationDonePredicate::new(api),
        }
    }
}

#[async_trait]
impl Predicate<Operation> for OperationDonePredicate {
    async fn test(&self, operation: &mut Operation) -> CloudResult<bool> {
        match operation.scope() {
            OperationScope::Global => self.global.test(operation).await,
            OperationScope::Region(_) => self.region.test(operation).await,
            OperationScope::Zone(_) => self.zone.test(operation).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationStatus;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Answers from a fixed table keyed by "scope/name"
    #[derive(Debug, Default)]
    struct TableApi {
        operations: Mutex<HashMap<String, Operation>>,
        calls: Mutex<Vec<String>>,
    }

    impl TableApi {
        fn insert(&self, key: &str, op: Operation) {
            self.operations.lock().unwrap().insert(key.to_string(), op);
        }

        fn lookup(&self, key: String) -> CloudResult<Option<Operation>> {
            self.calls.lock().unwrap().push(key.clone());
            Ok(self.operations.lock().unwrap().get(&key).cloned())
        }
    }

    #[async_trait]
    impl OperationApi for TableApi {
        async fn get_global_operation(&self, name: &str) -> CloudResult<Option<Operation>> {
            self.lookup(format!("global/{}", name))
        }

        async fn get_region_operation(
            &self,
            region: &str,
            name: &str,
        ) -> CloudResult<Option<Operation>> {
            self.lookup(format!("regions/{}/{}", region, name))
        }

        async fn get_zone_operation(&self, zone: &str, name: &str) -> CloudResult<Option<Operation>> {
            self.lookup(format!("zones/{}/{}", zone, name))
        }
    }

    fn done(op: Operation) -> Operation {
        Operation {
            status: OperationStatus::Done,
            ..op
        }
    }

    #[tokio::test]
    async fn test_zone_predicate_refreshes_in_place() {
        let api = Arc::new(TableApi::default());
        let zonal = Operation::new("op-z").in_zone("projects/p/zones/us-east1-b");
        let mut refreshed = done(zonal.clone());
        refreshed.progress = Some(100);
        api.insert("zones/us-east1-b/op-z", refreshed);

        let predicate = ZoneOperationDonePredicate::new(api.clone());
        let mut op = zonal;
        assert!(predicate.test(&mut op).await.unwrap());
        assert_eq!(op.progress, Some(100));
        assert_eq!(api.calls.lock().unwrap().as_slice(), ["zones/us-east1-b/op-z"]);
    }

    #[tokio::test]
    async fn test_running_is_not_done() {
        let api = Arc::new(TableApi::default());
        let mut running = Operation::new("op-g");
        running.status = OperationStatus::Running;
        api.insert("global/op-g", running);

        let predicate = GlobalOperationDonePredicate::new(api);
        let mut op = Operation::new("op-g");
        assert!(!predicate.test(&mut op).await.unwrap());
        assert_eq!(op.status, OperationStatus::Running);
    }

    #[tokio::test]
    async fn test_vanished_operation_is_not_found() {
        let api = Arc::new(TableApi::default());
        let predicate = RegionOperationDonePredicate::new(api);
        let mut op = Operation::new("gone").in_region("europe-west4");
        let err = predicate.test(&mut op).await.unwrap_err();
        assert!(matches!(err, CloudError::ResourceNotFound(_)));
    }

    #[tokio::test]
    async fn test_scoped_predicate_needs_its_link() {
        let api = Arc::new(TableApi::default());
        let predicate = ZoneOperationDonePredicate::new(api.clone());
        let mut op = Operation::new("op");
        let err = predicate.test(&mut op).await.unwrap_err();
        assert!(matches!(err, CloudError::IllegalArgument(_)));
        assert!(api.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_on_scope() {
        let api = Arc::new(TableApi::default());
        api.insert("global/a", done(Operation::new("a")));
        api.insert("regions/r1/b", done(Operation::new("b").in_region("r1")));
        api.insert("zones/z1/c", done(Operation::new("c").in_zone("z1")));

        let predicate = OperationDonePredicate::new(api.clone());
        for mut op in [
            Operation::new("a"),
            Operation::new("b").in_region("r1"),
            Operation::new("c").in_region("r1").in_zone("z1"),
        ] {
            assert!(predicate.test(&mut op).await.unwrap());
        }
        assert_eq!(
            api.calls.lock().unwrap().as_slice(),
            ["global/a", "regions/r1/b", "zones/z1/c"]
        );
    }
}
