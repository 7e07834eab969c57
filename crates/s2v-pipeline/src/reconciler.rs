//! Completion reconciler.
//!
//! Polls outstanding watcher tasks on a fixed interval and fires the concat
//! stage once every segment of a project has completed. Deleting the watcher
//! is the commit point: when two reconcilers race on the same task, the one
//! whose delete fails with `NotFound` reports its trigger as a duplicate.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use s2v_models::{Project, VideoSegment, WatcherTask};
use s2v_store::EntityKey;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::dispatcher::{ConcatInput, Dispatcher};
use crate::error::{PipelineError, PipelineResult};
use crate::metrics;

/// What happened to one watcher task in a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Concat enqueued and the task deleted.
    Fired,
    /// Some segments are still outstanding.
    Pending { completed: usize, total: usize },
    /// Deadline passed; deleted without firing.
    Expired,
    /// Nothing left to wait for (project gone, terminal or without segments).
    Abandoned,
    /// Another reconciler deleted the task first.
    Duplicate,
    /// Invariant violation; deleted without firing.
    Inconsistent,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Fired => "fired",
            ReconcileOutcome::Pending { .. } => "pending",
            ReconcileOutcome::Expired => "expired",
            ReconcileOutcome::Abandoned => "abandoned",
            ReconcileOutcome::Duplicate => "duplicate",
            ReconcileOutcome::Inconsistent => "inconsistent",
        }
    }
}

/// Tally of one reconciliation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub examined: usize,
    pub fired: usize,
    pub pending: usize,
    pub expired: usize,
    pub abandoned: usize,
    pub duplicate: usize,
    pub inconsistent: usize,
    pub failed: usize,
}

impl CycleReport {
    fn record(&mut self, outcome: ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Fired => self.fired += 1,
            ReconcileOutcome::Pending { .. } => self.pending += 1,
            ReconcileOutcome::Expired => self.expired += 1,
            ReconcileOutcome::Abandoned => self.abandoned += 1,
            ReconcileOutcome::Duplicate => self.duplicate += 1,
            ReconcileOutcome::Inconsistent => self.inconsistent += 1,
        }
    }

    /// True when the cycle changed anything or hit an error.
    pub fn is_eventful(&self) -> bool {
        self.examined > self.pending
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} examined, {} fired, {} pending, {} expired, {} abandoned, {} duplicate, {} inconsistent, {} failed",
            self.examined,
            self.fired,
            self.pending,
            self.expired,
            self.abandoned,
            self.duplicate,
            self.inconsistent,
            self.failed
        )
    }
}

pub struct Reconciler {
    dispatcher: Arc<Dispatcher>,
    config: PipelineConfig,
    shutdown: watch::Sender<bool>,
}

impl Reconciler {
    pub fn new(dispatcher: Arc<Dispatcher>, config: PipelineConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            dispatcher,
            config,
            shutdown,
        }
    }

    /// Poll until shutdown is signalled.
    ///
    /// A cycle in progress when shutdown arrives gets `shutdown_timeout` to
    /// finish.
    pub async fn run(&self) {
        if !self.config.reconciler_enabled {
            info!("Completion reconciler is disabled");
            return;
        }

        info!(
            "Starting completion reconciler (interval: {:?}, concurrency: {})",
            self.config.reconciler_interval, self.config.reconciler_concurrency
        );

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut ticker = interval(self.config.reconciler_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !*shutdown_rx.borrow() {
            tokio::select! {
                _ = shutdown_rx.changed() => {}
                _ = ticker.tick() => {
                    let cycle = self.run_cycle();
                    tokio::pin!(cycle);

                    tokio::select! {
                        result = &mut cycle => log_cycle(result),
                        _ = shutdown_rx.changed() => {
                            info!("Shutdown signal received, waiting for reconciliation cycle");
                            match tokio::time::timeout(self.config.shutdown_timeout, cycle).await {
                                Ok(result) => log_cycle(result),
                                Err(_) => warn!("Reconciliation cycle did not finish before shutdown timeout"),
                            }
                        }
                    }
                }
            }
        }

        info!("Completion reconciler stopped");
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Reconcile up to `reconciler_batch_size` watcher tasks.
    ///
    /// Tasks are taken in key order from the start every cycle. With more than
    /// `reconciler_batch_size` outstanding, later tasks wait until earlier
    /// ones fire, expire or are discarded; expiry bounds that wait.
    pub async fn run_cycle(&self) -> PipelineResult<CycleReport> {
        let tasks = self
            .dispatcher
            .stores()
            .watchers
            .list(None, Some(self.config.reconciler_batch_size))
            .await?;

        let now = Utc::now();
        let results: Vec<_> = stream::iter(tasks)
            .map(|task| async move {
                let id = task.id.clone();
                (id, self.reconcile(task, now).await)
            })
            .buffer_unordered(self.config.reconciler_concurrency)
            .collect()
            .await;

        let mut report = CycleReport {
            examined: results.len(),
            ..Default::default()
        };
        for (id, result) in results {
            match result {
                Ok(outcome) => {
                    metrics::record_reconcile(outcome.as_str());
                    report.record(outcome);
                }
                Err(e) => {
                    metrics::record_reconcile("failed");
                    report.failed += 1;
                    error!(watcher_id = %id, "Failed to reconcile watcher: {}", e);
                }
            }
        }

        metrics::record_cycle();
        Ok(report)
    }

    /// Reconcile one watcher task as of `now`.
    pub async fn reconcile(
        &self,
        task: WatcherTask,
        now: DateTime<Utc>,
    ) -> PipelineResult<ReconcileOutcome> {
        let stores = self.dispatcher.stores();
        let key = EntityKey::root(task.id.as_str());

        if task.is_expired(now) {
            warn!(
                watcher_id = %task.id,
                project_id = %task.project_id,
                expires_at = %task.expires_at,
                "Watcher expired before all segments completed"
            );
            return self.discard(&key, ReconcileOutcome::Expired).await;
        }

        let project = match stores
            .projects
            .get(&EntityKey::root(task.project_id.as_str()))
            .await
        {
            Ok(project) => project,
            Err(e) if e.is_not_found() => {
                warn!(watcher_id = %task.id, project_id = %task.project_id, "Watcher project is gone");
                return self.discard(&key, ReconcileOutcome::Abandoned).await;
            }
            Err(e) => return Err(e.into()),
        };

        if project.is_terminal() || project.segments.is_empty() {
            info!(
                project_id = %project.id,
                status = %project.status(),
                segments = project.segments.len(),
                "Nothing to wait for, discarding watcher"
            );
            return self.discard(&key, ReconcileOutcome::Abandoned).await;
        }

        let segments = self.dispatcher.list_segments(&project.id).await?;
        let total = project.segments.len();
        let completed = segments.iter().filter(|s| s.is_completed()).count();

        if completed < total {
            debug!(project_id = %project.id, completed, total, "Segments outstanding");
            return Ok(ReconcileOutcome::Pending { completed, total });
        }
        if completed > total {
            error!(
                project_id = %project.id,
                completed,
                total,
                "Consistency error: more completed segments than the project owns"
            );
            return self.discard(&key, ReconcileOutcome::Inconsistent).await;
        }

        let inputs = match concat_inputs(&project, &segments) {
            Ok(inputs) => inputs,
            Err(e) => {
                error!(project_id = %project.id, "{}", e);
                return self.discard(&key, ReconcileOutcome::Inconsistent).await;
            }
        };

        if self.dispatcher.trigger_concat(&project.id, inputs).await?.is_none() {
            debug!(project_id = %project.id, "Concat stage already running, committing watcher");
        }

        match stores.watchers.delete(&key).await {
            Ok(()) => {
                info!(project_id = %project.id, segments = total, "Fan-in complete, concat fired");
                Ok(ReconcileOutcome::Fired)
            }
            Err(e) if e.is_not_found() => {
                info!(project_id = %project.id, "Watcher already fired elsewhere, trigger is a duplicate");
                Ok(ReconcileOutcome::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn discard(
        &self,
        key: &EntityKey,
        outcome: ReconcileOutcome,
    ) -> PipelineResult<ReconcileOutcome> {
        match self.dispatcher.stores().watchers.delete(key).await {
            Ok(()) => Ok(outcome),
            Err(e) if e.is_not_found() => Ok(ReconcileOutcome::Duplicate),
            Err(e) => Err(e.into()),
        }
    }
}

/// Ordered concat list. Hidden segments are skipped.
fn concat_inputs(
    project: &Project,
    segments: &[VideoSegment],
) -> PipelineResult<Vec<ConcatInput>> {
    let by_id: HashMap<_, _> = segments.iter().map(|s| (&s.id, s)).collect();

    let mut refs = project.segments.clone();
    refs.sort_by_key(|r| r.order);

    let mut inputs = Vec::with_capacity(refs.len());
    for r in &refs {
        let segment = by_id.get(&r.segment_id).ok_or_else(|| {
            PipelineError::consistency(format!("segment {} is missing", r.segment_id))
        })?;
        if !segment.is_completed() {
            return Err(PipelineError::consistency(format!(
                "segment {} counted but is {}",
                segment.id,
                segment.status()
            )));
        }
        if segment.hidden {
            continue;
        }
        let video_output_id = segment.video_output_id.clone().ok_or_else(|| {
            PipelineError::consistency(format!("segment {} completed without output", segment.id))
        })?;
        inputs.push(ConcatInput {
            segment_id: segment.id.clone(),
            video_output_id,
        });
    }

    if inputs.is_empty() {
        return Err(PipelineError::consistency(format!(
            "every segment of project {} is hidden",
            project.id
        )));
    }
    Ok(inputs)
}

fn log_cycle(result: PipelineResult<CycleReport>) {
    match result {
        Ok(report) if report.is_eventful() => info!("Reconciliation cycle complete: {}", report),
        Ok(_) => {}
        Err(e) => error!("Reconciliation cycle error: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use s2v_models::{ProjectId, SegmentId, SegmentRef, StageStatus, Transition, TransitionPlan};

    fn completed_segment(project: &ProjectId, order: u32, hidden: bool) -> VideoSegment {
        let mut segment = VideoSegment::new(project.clone(), format!("img-{}", order), order);
        let plan = TransitionPlan::new()
            .then(Transition::EnterRunning(segment.stage.running_token.clone().unwrap()))
            .then(Transition::ClearCompleteToken(segment.stage.complete_token.clone().unwrap()))
            .then(Transition::SetStatus(StageStatus::Completed))
            .then(Transition::AttachVideoOutput(format!("v{}", order)))
            .then(Transition::SetHidden(hidden));
        plan.apply(&mut segment).unwrap();
        segment
    }

    fn project_with(segments: &[VideoSegment]) -> Project {
        let mut project = Project::new("doc.pdf");
        project.segments = segments
            .iter()
            .map(|s| SegmentRef {
                segment_id: s.id.clone(),
                order: s.order,
            })
            .collect();
        project
    }

    #[test]
    fn test_concat_inputs_follow_page_order() {
        let pid = ProjectId::from_string("p");
        let segments = vec![
            completed_segment(&pid, 3, false),
            completed_segment(&pid, 1, false),
            completed_segment(&pid, 2, false),
        ];
        let project = project_with(&segments);

        let outputs: Vec<_> = concat_inputs(&project, &segments)
            .unwrap()
            .into_iter()
            .map(|i| i.video_output_id)
            .collect();
        assert_eq!(outputs, vec!["v1", "v2", "v3"]);
    }

    #[test]
    fn test_concat_inputs_skip_hidden() {
        let pid = ProjectId::from_string("p");
        let segments = vec![completed_segment(&pid, 1, true), completed_segment(&pid, 2, false)];
        let project = project_with(&segments);

        let inputs = concat_inputs(&project, &segments).unwrap();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].video_output_id, "v2");
    }

    #[test]
    fn test_concat_inputs_all_hidden_is_inconsistent() {
        let pid = ProjectId::from_string("p");
        let segments = vec![completed_segment(&pid, 1, true)];
        let project = project_with(&segments);

        let err = concat_inputs(&project, &segments).unwrap_err();
        assert!(matches!(err, PipelineError::Consistency(_)));
    }

    #[test]
    fn test_concat_inputs_missing_segment() {
        let pid = ProjectId::from_string("p");
        let segments = vec![completed_segment(&pid, 1, false)];
        let mut project = project_with(&segments);
        project.segments.push(SegmentRef {
            segment_id: SegmentId::from_string("ghost"),
            order: 2,
        });

        assert!(concat_inputs(&project, &segments).is_err());
    }

    #[test]
    fn test_cycle_report_summary_counts_every_outcome() {
        let mut report = CycleReport {
            examined: 3,
            failed: 1,
            ..Default::default()
        };
        report.record(ReconcileOutcome::Abandoned);
        report.record(ReconcileOutcome::Fired);
        assert_eq!(
            report.to_string(),
            "3 examined, 1 fired, 0 pending, 0 expired, 1 abandoned, 0 duplicate, 0 inconsistent, 1 failed"
        );
    }

    #[test]
    fn test_cycle_report_eventful() {
        let mut report = CycleReport {
            examined: 2,
            ..Default::default()
        };
        report.record(ReconcileOutcome::Pending {
            completed: 0,
            total: 1,
        });
        assert!(report.is_eventful());
        report.record(ReconcileOutcome::Pending {
            completed: 0,
            total: 1,
        });
        assert!(!report.is_eventful());
    }
}
