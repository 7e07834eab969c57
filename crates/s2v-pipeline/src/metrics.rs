//! Pipeline metrics.

use metrics::counter;

pub mod names {
    /// Jobs enqueued by stage and result.
    pub const DISPATCH_TOTAL: &str = "pipeline_dispatch_total";

    /// Worker callbacks by stage, reported status and outcome.
    pub const CALLBACKS_TOTAL: &str = "pipeline_callbacks_total";

    /// Watcher tasks reconciled, by outcome.
    pub const RECONCILE_TOTAL: &str = "pipeline_reconcile_total";

    /// Completed reconciliation cycles.
    pub const RECONCILE_CYCLES_TOTAL: &str = "pipeline_reconcile_cycles_total";
}

pub fn record_dispatch(stage: &str, ok: bool) {
    counter!(
        names::DISPATCH_TOTAL,
        "stage" => stage.to_string(),
        "result" => if ok { "ok" } else { "error" }
    )
    .increment(1);
}

pub fn record_callback(stage: &str, status: &str, outcome: &str) {
    counter!(
        names::CALLBACKS_TOTAL,
        "stage" => stage.to_string(),
        "status" => status.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn record_reconcile(outcome: &str) {
    counter!(names::RECONCILE_TOTAL, "outcome" => outcome.to_string()).increment(1);
}

pub fn record_cycle() {
    counter!(names::RECONCILE_CYCLES_TOTAL).increment(1);
}
