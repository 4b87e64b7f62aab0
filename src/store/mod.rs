//! Trace state store: the only writer of [`TraceState`].
//!
//! Holds at most one trace. Stage events are merged by stage identity, so
//! arrival order across stages does not matter. Terminal statuses are
//! absorbing: once a stage reports SUCCESS, FAILED or SKIPPED, later events
//! for that stage can only repeat the same status.

use std::collections::HashMap;

use log::{debug, warn};

use crate::config::StageOrder;
use crate::models::{ConnectionStatus, StageEvent, StageId, StageStatus, TraceState};

/// Result of merging one stage event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum MergeOutcome {
    /// Event accepted; `previous` is the status the stage had before
    Applied { stage: StageId, previous: StageStatus },
    /// No trace is being monitored
    NoActiveTrace,
    /// Event belongs to a different trace than the active one
    StaleTrace,
    /// Stage is known to the gateway but not part of the displayed order
    UntrackedStage(StageId),
    /// Event would move a terminal stage to a different status
    Rejected { stage: StageId, current: StageStatus, incoming: StageStatus },
}

impl MergeOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, MergeOutcome::Applied { .. })
    }
}

/// Merge counters, kept for diagnostics only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub applied: u64,
    pub duplicates: u64,
    pub rejected: u64,
    pub stale: u64,
    pub untracked: u64,
}

pub struct TraceStore {
    order: Vec<StageId>,
    index: HashMap<StageId, usize>,
    current: Option<TraceState>,
    stats: MergeStats,
}

impl TraceStore {
    pub fn new(order: &StageOrder) -> Self {
        let order = order.as_slice().to_vec();
        let index = order.iter().enumerate().map(|(i, stage)| (*stage, i)).collect();
        Self {
            order,
            index,
            current: None,
            stats: MergeStats::default(),
        }
    }

    /// Replace any state with a freshly seeded trace: every stage PENDING,
    /// connection CONNECTING, no error
    pub fn reset(&mut self, trace_id: &str) {
        if let Some(previous) = &self.current {
            if previous.trace_id != trace_id {
                debug!("discarding state for trace {}", previous.trace_id);
            }
        }
        self.current = Some(TraceState::seeded(trace_id, &self.order));
    }

    /// Merge a stage event into the active trace
    pub fn merge(&mut self, trace_id: &str, event: &StageEvent) -> MergeOutcome {
        let Some(state) = self.current.as_mut() else {
            debug!("dropping {} {} for trace {}: no active trace", event.stage, event.status, trace_id);
            self.stats.stale += 1;
            return MergeOutcome::NoActiveTrace;
        };

        if state.trace_id != trace_id {
            debug!(
                "dropping {} {} for trace {}: active trace is {}",
                event.stage, event.status, trace_id, state.trace_id
            );
            self.stats.stale += 1;
            return MergeOutcome::StaleTrace;
        }

        let Some(&slot) = self.index.get(&event.stage) else {
            debug!("dropping {} {}: stage not displayed", event.stage, event.status);
            self.stats.untracked += 1;
            return MergeOutcome::UntrackedStage(event.stage);
        };

        let stage = &mut state.stages[slot];
        let previous = stage.status;
        if !previous.admits(event.status) {
            warn!(
                "trace {}: rejected {} transition {} -> {}",
                trace_id, event.stage, previous, event.status
            );
            self.stats.rejected += 1;
            return MergeOutcome::Rejected {
                stage: event.stage,
                current: previous,
                incoming: event.status,
            };
        }

        stage.status = event.status;
        if let Some(duration) = event.duration_us {
            stage.duration_us = Some(duration);
        }
        if let Some(error) = &event.error {
            stage.error = Some(error.clone());
        }
        if let Some(details) = &event.details {
            stage.details = Some(details.clone());
        }
        if let Some(ts) = event.timestamp {
            stage.updated_at = Some(ts);
        }

        if previous == event.status {
            self.stats.duplicates += 1;
        }
        self.stats.applied += 1;
        debug!("trace {}: {} {} -> {}", trace_id, event.stage, previous, event.status);

        MergeOutcome::Applied { stage: event.stage, previous }
    }

    /// Set the trace-level error without touching any stage
    pub fn set_trace_error(&mut self, message: &str) {
        if let Some(state) = self.current.as_mut() {
            state.trace_error = Some(message.to_string());
        }
    }

    pub fn set_connection(&mut self, status: ConnectionStatus) {
        if let Some(state) = self.current.as_mut() {
            state.connection = status;
        }
    }

    /// Remove the current trace entirely
    pub fn clear(&mut self) {
        self.current = None;
    }

    pub fn snapshot(&self) -> Option<&TraceState> {
        self.current.as_ref()
    }

    pub fn stats(&self) -> MergeStats {
        self.stats
    }

    pub fn stage_order(&self) -> &[StageId] {
        &self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> TraceStore {
        TraceStore::new(&StageOrder::default())
    }

    fn status_of(store: &TraceStore, stage: StageId) -> StageStatus {
        store.snapshot().unwrap().stage(stage).unwrap().status
    }

    #[test]
    fn test_reset_seeds_every_stage() {
        let mut store = store();
        assert!(store.snapshot().is_none());

        store.reset("T1");
        let snap = store.snapshot().unwrap();
        assert_eq!(snap.trace_id, "T1");
        assert_eq!(snap.connection, ConnectionStatus::Connecting);
        assert!(snap.trace_error.is_none());
        let stages: Vec<StageId> = snap.stages.iter().map(|s| s.stage).collect();
        assert_eq!(stages, store.stage_order().to_vec());
        assert!(snap.stages.iter().all(|s| s.status == StageStatus::Pending));
    }

    #[test]
    fn test_basic_merge() {
        let mut store = store();
        store.reset("T1");

        let outcome = store.merge("T1", &StageEvent::new("T1", StageId::Auth, StageStatus::Running));
        assert_eq!(
            outcome,
            MergeOutcome::Applied { stage: StageId::Auth, previous: StageStatus::Pending }
        );
        let outcome = store.merge(
            "T1",
            &StageEvent::new("T1", StageId::Auth, StageStatus::Success).with_duration(1500),
        );
        assert!(outcome.is_applied());

        let snap = store.snapshot().unwrap();
        let auth = snap.stage(StageId::Auth).unwrap();
        assert_eq!(auth.status, StageStatus::Success);
        assert_eq!(auth.duration_us, Some(1500));
        for stage in snap.stages.iter().filter(|s| s.stage != StageId::Auth) {
            assert_eq!(stage.status, StageStatus::Pending);
        }
    }

    #[test]
    fn test_out_of_order_across_stages() {
        let mut store = store();
        store.reset("T1");
        assert!(store
            .merge("T1", &StageEvent::new("T1", StageId::Forward, StageStatus::Running))
            .is_applied());
        assert!(store
            .merge("T1", &StageEvent::new("T1", StageId::Auth, StageStatus::Running))
            .is_applied());
        assert_eq!(status_of(&store, StageId::Forward), StageStatus::Running);
        assert_eq!(status_of(&store, StageId::Auth), StageStatus::Running);

        // Order of the stage list is unaffected by arrival order
        let stages: Vec<StageId> = store.snapshot().unwrap().stages.iter().map(|s| s.stage).collect();
        assert_eq!(stages, store.stage_order().to_vec());
    }

    #[test]
    fn test_terminal_regression_rejected() {
        let mut store = store();
        store.reset("T1");
        let _ = store.merge(
            "T1",
            &StageEvent::new("T1", StageId::Auth, StageStatus::Success).with_duration(900),
        );

        let outcome = store.merge("T1", &StageEvent::new("T1", StageId::Auth, StageStatus::Running));
        assert_eq!(
            outcome,
            MergeOutcome::Rejected {
                stage: StageId::Auth,
                current: StageStatus::Success,
                incoming: StageStatus::Running
            }
        );
        let outcome = store.merge(
            "T1",
            &StageEvent::new("T1", StageId::Auth, StageStatus::Failed).with_error("late"),
        );
        assert!(!outcome.is_applied());

        let auth = store.snapshot().unwrap().stage(StageId::Auth).unwrap().clone();
        assert_eq!(auth.status, StageStatus::Success);
        assert_eq!(auth.duration_us, Some(900));
        assert!(auth.error.is_none());
        assert_eq!(store.stats().rejected, 2);
    }

    #[test]
    fn test_direct_resolution_without_running() {
        let mut store = store();
        store.reset("T1");
        assert!(store
            .merge("T1", &StageEvent::new("T1", StageId::Circuit, StageStatus::Skipped))
            .is_applied());
        assert_eq!(status_of(&store, StageId::Circuit), StageStatus::Skipped);
    }

    #[test]
    fn test_absent_fields_are_retained() {
        let mut store = store();
        store.reset("T1");
        let _ = store.merge(
            "T1",
            &StageEvent::new("T1", StageId::Auth, StageStatus::Running)
                .with_detail("client_id", json!("abc")),
        );
        let _ = store.merge(
            "T1",
            &StageEvent::new("T1", StageId::Auth, StageStatus::Failed)
                .with_duration(320)
                .with_error("invalid token"),
        );
        // Duplicate terminal delivery without optional fields
        let outcome = store.merge("T1", &StageEvent::new("T1", StageId::Auth, StageStatus::Failed));
        assert!(outcome.is_applied());

        let auth = store.snapshot().unwrap().stage(StageId::Auth).unwrap().clone();
        assert_eq!(auth.status, StageStatus::Failed);
        assert_eq!(auth.duration_us, Some(320));
        assert_eq!(auth.error.as_deref(), Some("invalid token"));
        assert_eq!(auth.details.unwrap()["client_id"], "abc");
        assert_eq!(store.stats().duplicates, 1);
    }

    #[test]
    fn test_cross_trace_isolation() {
        let mut store = store();
        store.reset("T1");
        let before = store.snapshot().unwrap().clone();

        let outcome = store.merge("T2", &StageEvent::new("T2", StageId::Auth, StageStatus::Running));
        assert_eq!(outcome, MergeOutcome::StaleTrace);
        assert_eq!(store.snapshot().unwrap(), &before);
        assert_eq!(store.stats().stale, 1);
    }

    #[test]
    fn test_merge_without_trace() {
        let mut store = store();
        let outcome = store.merge("T1", &StageEvent::new("T1", StageId::Auth, StageStatus::Running));
        assert_eq!(outcome, MergeOutcome::NoActiveTrace);
        assert!(store.snapshot().is_none());
    }

    #[test]
    fn test_untracked_stage_dropped() {
        let mut store = store();
        store.reset("T1");
        let before = store.snapshot().unwrap().clone();
        let outcome = store.merge("T1", &StageEvent::new("T1", StageId::Response, StageStatus::Success));
        assert_eq!(outcome, MergeOutcome::UntrackedStage(StageId::Response));
        assert_eq!(store.snapshot().unwrap(), &before);
    }

    #[test]
    fn test_configured_order_includes_response() {
        let order = StageOrder::parse("RECEIVED,FORWARD,RESPONSE,COMPLETE").unwrap();
        let mut store = TraceStore::new(&order);
        store.reset("T1");
        assert!(store
            .merge("T1", &StageEvent::new("T1", StageId::Response, StageStatus::Success))
            .is_applied());
        assert_eq!(store.snapshot().unwrap().stages.len(), 4);
        assert_eq!(status_of(&store, StageId::Response), StageStatus::Success);
    }

    #[test]
    fn test_trace_error_preserves_stages() {
        let mut store = store();
        store.reset("T1");
        let _ = store.merge("T1", &StageEvent::new("T1", StageId::Received, StageStatus::Success));
        store.set_trace_error("connection timed out");

        let snap = store.snapshot().unwrap();
        assert_eq!(snap.trace_error.as_deref(), Some("connection timed out"));
        assert_eq!(snap.stage(StageId::Received).unwrap().status, StageStatus::Success);
        assert_eq!(snap.stage(StageId::Auth).unwrap().status, StageStatus::Pending);
    }

    #[test]
    fn test_reset_discards_previous_trace() {
        let mut store = store();
        store.reset("T1");
        let _ = store.merge("T1", &StageEvent::new("T1", StageId::Auth, StageStatus::Success));
        store.set_trace_error("boom");
        store.set_connection(ConnectionStatus::Connected);

        store.reset("T2");
        let snap = store.snapshot().unwrap();
        assert_eq!(snap.trace_id, "T2");
        assert_eq!(snap.connection, ConnectionStatus::Connecting);
        assert!(snap.trace_error.is_none());
        assert!(snap.stages.iter().all(|s| s.status == StageStatus::Pending));
    }

    #[test]
    fn test_clear() {
        let mut store = store();
        store.reset("T1");
        store.clear();
        assert!(store.snapshot().is_none());

        // Writes after clear have nothing to land on
        store.set_connection(ConnectionStatus::Disconnected);
        store.set_trace_error("late");
        assert!(store.snapshot().is_none());
    }
}
