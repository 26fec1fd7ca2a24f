//! Pipeline metrics.

use metrics::{counter, histogram};

pub mod names {
    pub const STAGE_DURATION_SECONDS: &str = "vtrack_stage_duration_seconds";
    pub const TASKS_SUBMITTED_TOTAL: &str = "vtrack_tasks_submitted_total";
    pub const TASKS_DEDUPLICATED_TOTAL: &str = "vtrack_tasks_deduplicated_total";
    pub const TASKS_COMPLETED_TOTAL: &str = "vtrack_tasks_completed_total";
    pub const TASKS_FAILED_TOTAL: &str = "vtrack_tasks_failed_total";
    pub const STORE_WRITE_FAILURES_TOTAL: &str = "vtrack_store_write_failures_total";
}

pub fn record_stage_duration(stage: &str, duration_secs: f64, ok: bool) {
    let labels = [
        ("stage", stage.to_string()),
        ("outcome", if ok { "ok" } else { "error" }.to_string()),
    ];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_task_submitted(prompt_type: &str) {
    let labels = [("prompt_type", prompt_type.to_string())];
    counter!(names::TASKS_SUBMITTED_TOTAL, &labels).increment(1);
}

pub fn record_task_deduplicated() {
    counter!(names::TASKS_DEDUPLICATED_TOTAL).increment(1);
}

pub fn record_task_completed() {
    counter!(names::TASKS_COMPLETED_TOTAL).increment(1);
}

pub fn record_task_failed(stage: &str) {
    let labels = [("stage", stage.to_string())];
    counter!(names::TASKS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_store_write_failure() {
    counter!(names::STORE_WRITE_FAILURES_TOTAL).increment(1);
}
