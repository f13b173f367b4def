//! Per-section validators.

use crate::schema::{CodepairConfig, StoreBackend};

use super::helpers::validate_range;

pub(crate) fn validate_server(errors: &mut Vec<String>, config: &CodepairConfig) {
    if config.server.bind.trim().is_empty() {
        errors.push("server.bind must not be empty".into());
    }
    validate_range(
        errors,
        "server.handshake_timeout_secs",
        config.server.handshake_timeout_secs,
        1,
        120,
    );
}

pub(crate) fn validate_pairing(errors: &mut Vec<String>, config: &CodepairConfig) {
    let pairing = &config.pairing;
    validate_range(
        errors,
        "pairing.code_length",
        u64::from(pairing.code_length),
        3,
        12,
    );
    validate_range(errors, "pairing.max_ttl_secs", pairing.max_ttl_secs, 1, 86_400);
    validate_range(
        errors,
        "pairing.ttl_secs",
        pairing.ttl_secs,
        1,
        pairing.max_ttl_secs.max(1),
    );
    validate_range(
        errors,
        "pairing.issue_attempts",
        u64::from(pairing.issue_attempts),
        1,
        50,
    );
    validate_range(
        errors,
        "pairing.max_members",
        u64::from(pairing.max_members),
        2,
        16,
    );
}

pub(crate) fn validate_store(errors: &mut Vec<String>, config: &CodepairConfig) {
    let store = &config.store;
    if store.backend == StoreBackend::Rest && store.url.trim().is_empty() {
        errors.push("store.url is required when store.backend = \"rest\"".into());
    }
    validate_range(
        errors,
        "store.request_timeout_secs",
        store.request_timeout_secs,
        1,
        60,
    );
    validate_range(
        errors,
        "store.retry_attempts",
        u64::from(store.retry_attempts),
        0,
        10,
    );
    validate_range(errors, "store.retry_backoff_ms", store.retry_backoff_ms, 1, 10_000);
    if store.key_prefix.is_empty() {
        errors.push("store.key_prefix must not be empty".into());
    }
}

pub(crate) fn validate_runtime(errors: &mut Vec<String>, config: &CodepairConfig) {
    validate_range(errors, "sweep.interval_secs", config.sweep.interval_secs, 1, 3600);
    validate_range(
        errors,
        "relay.outbound_buffer",
        config.relay.outbound_buffer as u64,
        1,
        65_536,
    );
}
