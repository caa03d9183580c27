use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Registry, TextEncoder};
use std::sync::OnceLock;

use crate::ledger_db::SubmissionKind;

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
}
static REQ_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();
static SUBMISSIONS: OnceLock<IntCounterVec> = OnceLock::new();
static FRAGMENTS: OnceLock<IntCounter> = OnceLock::new();

/// Register collectors. Safe to call more than once; counters are no-ops until then.
pub fn init_metrics() {
    let req_counter = REQ_COUNTER.get_or_init(|| {
        IntCounterVec::new(
            prometheus::opts!("requests_total", "Total requests per route"),
            &["route", "status"],
        )
        .expect("static metric definition")
    });

    let submissions = SUBMISSIONS.get_or_init(|| {
        IntCounterVec::new(
            prometheus::opts!("submissions_total", "Ledger records written per submission kind"),
            &["kind"],
        )
        .expect("static metric definition")
    });

    let fragments = FRAGMENTS.get_or_init(|| {
        IntCounter::new(
            "assistance_fragments_total",
            "Streamed answer fragments drained from the chat backend",
        )
        .expect("static metric definition")
    });

    REGISTRY.register(Box::new(req_counter.clone())).ok();
    REGISTRY.register(Box::new(submissions.clone())).ok();
    REGISTRY.register(Box::new(fragments.clone())).ok();
}

pub fn inc_request(route: &str, status: &str) {
    if let Some(counter) = REQ_COUNTER.get() {
        counter.with_label_values(&[route, status]).inc();
    }
}

pub fn inc_submission(kind: SubmissionKind) {
    if let Some(counter) = SUBMISSIONS.get() {
        counter.with_label_values(&[kind.as_str()]).inc();
    }
}

pub fn add_fragments(count: usize) {
    if let Some(counter) = FRAGMENTS.get() {
        counter.inc_by(count as u64);
    }
}

/// Text exposition of everything registered so far.
pub fn gather_text() -> anyhow::Result<Vec<u8>> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_counter_is_exported() {
        init_metrics();
        init_metrics();
        inc_submission(SubmissionKind::Submit);
        inc_request("/submit", "200");
        add_fragments(3);

        let text = String::from_utf8(gather_text().unwrap()).unwrap();
        assert!(text.contains("submissions_total{kind=\"submit\"}"));
        assert!(text.contains("requests_total"));
        assert!(text.contains("assistance_fragments_total"));
    }
}
