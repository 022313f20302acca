use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

// Global registry
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

// Metrics
pub static VERIFICATION_CODES_ISSUED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static VERIFICATION_ATTEMPTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static SESSION_TOKENS_ISSUED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static VERIFICATION_CODES_SWEPT_TOTAL: OnceLock<IntCounter> = OnceLock::new();

/// Registers every collector. Calling it twice keeps the first registry.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    let codes_issued = IntCounterVec::new(
        Opts::new(
            "verification_codes_issued_total",
            "Verification code requests by delivery outcome",
        ),
        &["outcome"],
    )?;
    let attempts = IntCounterVec::new(
        Opts::new(
            "verification_attempts_total",
            "Verification code checks by outcome",
        ),
        &["outcome"],
    )?;
    let tokens_issued = IntCounterVec::new(
        Opts::new("session_tokens_issued_total", "Session tokens issued by kind"),
        &["kind"],
    )?;
    let swept = IntCounter::new(
        "verification_codes_swept_total",
        "Expired verification codes removed by the sweeper",
    )?;

    registry.register(Box::new(codes_issued.clone()))?;
    registry.register(Box::new(attempts.clone()))?;
    registry.register(Box::new(tokens_issued.clone()))?;
    registry.register(Box::new(swept.clone()))?;

    let _ = REGISTRY.set(registry);
    let _ = VERIFICATION_CODES_ISSUED_TOTAL.set(codes_issued);
    let _ = VERIFICATION_ATTEMPTS_TOTAL.set(attempts);
    let _ = SESSION_TOKENS_ISSUED_TOTAL.set(tokens_issued);
    let _ = VERIFICATION_CODES_SWEPT_TOTAL.set(swept);
    Ok(())
}

pub fn record_code_issued(outcome: &str) {
    if let Some(counter) = VERIFICATION_CODES_ISSUED_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

pub fn record_verification(outcome: &str) {
    if let Some(counter) = VERIFICATION_ATTEMPTS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

pub fn record_token_issued(kind: &str) {
    if let Some(counter) = SESSION_TOKENS_ISSUED_TOTAL.get() {
        counter.with_label_values(&[kind]).inc();
    }
}

pub fn record_swept(count: usize) {
    if let Some(counter) = VERIFICATION_CODES_SWEPT_TOTAL.get() {
        counter.inc_by(count as u64);
    }
}

pub fn get_metrics() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();

    let registry = match REGISTRY.get() {
        Some(r) => r,
        None => {
            tracing::error!("Metrics registry not initialized");
            return "# Metrics registry not initialized\n".to_string();
        }
    };

    let metric_families = registry.gather();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return format!("# Failed to encode metrics: {}\n", e);
    }

    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to convert metrics to UTF-8: {}", e);
            format!("# Failed to convert metrics to UTF-8: {}\n", e)
        }
    }
}
