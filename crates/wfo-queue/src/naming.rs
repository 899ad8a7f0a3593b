//! Topic naming rules for the dead-letter queue. The two directions are
//! intentionally asymmetric: the enqueue side always appends `.dlq` to the
//! failing topic (special-cased for the reserved `step.ready` topic), while
//! the rehydrate side strips a trailing `.dlq` and appends `.ready` rather
//! than reversing the enqueue rule. For the reserved topic the two compose
//! back to the original name; for any other topic they do not.

pub const STEP_READY_TOPIC: &str = "step.ready";
pub const STEP_DLQ_TOPIC: &str = "step.dlq";

/// The DLQ topic a failing job on `topic` is diverted to.
pub fn dlq_topic_for(topic: &str) -> String {
    if topic == STEP_READY_TOPIC {
        STEP_DLQ_TOPIC.to_string()
    } else {
        format!("{topic}.dlq")
    }
}

/// The ready topic `rehydrate_dlq` re-enqueues onto, given the DLQ topic name
/// itself (e.g. `"step.dlq"` or `"foo.bar.dlq"`).
pub fn ready_sibling_for_dlq(dlq_topic: &str) -> String {
    match dlq_topic.strip_suffix(".dlq") {
        Some(stripped) => format!("{stripped}.ready"),
        None => dlq_topic.to_string(),
    }
}
