// Copyright (C) 2025 cloudmux Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! OperationWaiter timing with a scripted API and paused tokio time

use async_trait::async_trait;
use cloudmux_compute::{Operation, OperationApi, OperationStatus, OperationWaiter};
use cloudmux_core::{CloudError, CloudResult, PollSettings};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Replays a fixed sequence of answers, repeating the last one
#[derive(Debug)]
struct ScriptedApi {
    script: Mutex<VecDeque<CloudResult<Option<Operation>>>>,
    polls: Mutex<Vec<Instant>>,
}

impl ScriptedApi {
    fn new(script: Vec<CloudResult<Option<Operation>>>) -> Arc<Self> {
        Arc::new(ScriptedApi {
            script: Mutex::new(script.into()),
            polls: Mutex::new(Vec::new()),
        })
    }

    fn poll_count(&self) -> usize {
        self.polls.lock().unwrap().len()
    }

    fn next(&self) -> CloudResult<Option<Operation>> {
        self.polls.lock().unwrap().push(Instant::now());
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            return script.pop_front().unwrap();
        }
        match script.front().unwrap() {
            Ok(op) => Ok(op.clone()),
            Err(e) => Err(CloudError::illegal_state(e.to_string())),
        }
    }
}

#[async_trait]
impl OperationApi for ScriptedApi {
    async fn get_global_operation(&self, _name: &str) -> CloudResult<Option<Operation>> {
        self.next()
    }

    async fn get_region_operation(
        &self,
        _region: &str,
        _name: &str,
    ) -> CloudResult<Option<Operation>> {
        self.next()
    }

    async fn get_zone_operation(&self, _zone: &str, _name: &str) -> CloudResult<Option<Operation>> {
        self.next()
    }
}

fn with_status(status: OperationStatus) -> CloudResult<Option<Operation>> {
    let mut op = Operation::new("op").in_zone("us-central1-a");
    op.status = status;
    Ok(Some(op))
}

fn settings(timeout_secs: u64) -> PollSettings {
    PollSettings::with_timeout(Duration::from_secs(timeout_secs))
        .with_periods(Duration::from_secs(1), Duration::from_secs(4))
}

#[tokio::test(start_paused = true)]
async fn test_waits_through_pending_and_running() {
    let api = ScriptedApi::new(vec![
        with_status(OperationStatus::Pending),
        with_status(OperationStatus::Running),
        with_status(OperationStatus::Running),
        with_status(OperationStatus::Done),
    ]);
    let waiter = OperationWaiter::with_settings(api.clone(), settings(60));

    let started = Instant::now();
    let op = waiter
        .wait(Operation::new("op").in_zone("us-central1-a"))
        .await
        .unwrap();
    assert_eq!(op.status, OperationStatus::Done);
    assert_eq!(api.poll_count(), 4);
    // 1s + 1.5s + 2.25s of backoff
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(4750) && elapsed < Duration::from_millis(4800));
}

#[tokio::test(start_paused = true)]
async fn test_backoff_is_capped() {
    let api = ScriptedApi::new(vec![with_status(OperationStatus::Running)]);
    let waiter = OperationWaiter::with_settings(api.clone(), settings(30));

    let err = waiter
        .wait(Operation::new("op").in_zone("us-central1-a"))
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    let polls = api.polls.lock().unwrap();
    let gaps: Vec<Duration> = polls.windows(2).map(|w| w[1] - w[0]).collect();
    assert!(gaps.iter().all(|gap| *gap <= Duration::from_secs(4)));
    assert!(gaps.iter().filter(|gap| **gap == Duration::from_secs(4)).count() >= 3);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_does_not_overshoot_deadline() {
    let api = ScriptedApi::new(vec![with_status(OperationStatus::Pending)]);
    let waiter = OperationWaiter::with_settings(api, settings(10));

    let started = Instant::now();
    let err = waiter
        .wait(Operation::new("op").in_zone("us-central1-a"))
        .await
        .unwrap_err();
    assert!(matches!(err, CloudError::Timeout(_)));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_millis(10_050));
}

#[tokio::test(start_paused = true)]
async fn test_transient_errors_keep_polling() {
    let api = ScriptedApi::new(vec![
        Err(CloudError::from_status(503, "get operation", "backend unavailable")),
        with_status(OperationStatus::Running),
        with_status(OperationStatus::Done),
    ]);
    let waiter = OperationWaiter::with_settings(api.clone(), settings(60));

    let op = waiter
        .wait(Operation::new("op").in_zone("us-central1-a"))
        .await
        .unwrap();
    assert!(op.is_done());
    assert_eq!(api.poll_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_vanished_operation_stops_polling() {
    let api = ScriptedApi::new(vec![with_status(OperationStatus::Running), Ok(None)]);
    let waiter = OperationWaiter::with_settings(api.clone(), settings(60));

    let err = waiter
        .wait(Operation::new("op").in_zone("us-central1-a"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(api.poll_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_already_done_skips_polling() {
    let api = ScriptedApi::new(vec![with_status(OperationStatus::Running)]);
    let waiter = OperationWaiter::with_settings(api.clone(), settings(60));

    let mut op = Operation::new("op");
    op.status = OperationStatus::Done;
    op.http_error_status_code = Some(409);
    op.http_error_message = Some("CONFLICT".to_string());
    let err = waiter.wait(op).await.unwrap_err();
    assert!(matches!(err, CloudError::IllegalState(_)));
    assert_eq!(api.poll_count(), 0);
}
