//! proptest strategies for completion message sequences

#![allow(dead_code)]

use proptest::prelude::*;
use serde_json::{json, Value};

/// A job id drawn from a small fixed set so messages collide on the same engines
pub fn job_id_strategy(job_ids: &'static [&'static str]) -> impl Strategy<Value = &'static str> {
    prop::sample::select(job_ids)
}

/// Raw status vocabulary, canonical and not
pub fn non_terminal_status_strategy() -> impl Strategy<Value = Option<&'static str>> {
    prop::option::of(prop::sample::select(vec![
        "running",
        "in_progress",
        "processing",
        "queued",
        "RUNNING",
    ]))
}

/// Percent values including out-of-range input that must clamp
pub fn percent_strategy() -> impl Strategy<Value = i64> {
    prop_oneof![8 => 0i64..=100, 1 => -50i64..0, 1 => 101i64..400]
}

/// Non-terminal progress pings for the given job ids
pub fn progress_messages_strategy(
    job_ids: &'static [&'static str],
    max_len: usize,
) -> impl Strategy<Value = Vec<Value>> {
    prop::collection::vec(
        (job_id_strategy(job_ids), non_terminal_status_strategy(), percent_strategy()),
        1..max_len,
    )
    .prop_map(|messages| {
        messages
            .into_iter()
            .map(|(job_id, status, percent)| match status {
                Some(status) => json!({"job_id": job_id, "status": status, "percent": percent}),
                None => json!({"job_id": job_id, "percent": percent}),
            })
            .collect()
    })
}
