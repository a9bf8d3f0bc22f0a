use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

lazy_static! {
    // ═══════════════════════════════════════════════════════════════════════════
    // INTENT METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Intents written to the store by a pay call
    pub static ref INTENTS_CREATED: IntCounter = register_int_counter!(
        "dix_intents_created_total",
        "Total number of payment intents created"
    )
    .unwrap();

    /// Pay calls that found an existing intent and submitted nothing
    pub static ref INTENT_DUPLICATES: IntCounter = register_int_counter!(
        "dix_intent_duplicates_total",
        "Total number of pay calls short-circuited on an existing intent"
    )
    .unwrap();

    /// Terminal intent outcomes
    pub static ref INTENT_STATUS_COUNT: IntCounterVec = register_int_counter_vec!(
        "dix_intent_status_total",
        "Total intents by terminal status",
        &["status"]
    )
    .unwrap();

    /// Failed intents by the stage that failed
    pub static ref INTENT_FAILURES: IntCounterVec = register_int_counter_vec!(
        "dix_intent_failures_total",
        "Total failed intents by stage",
        &["stage"]
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // SETTLEMENT METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Submit-to-confirm time (in milliseconds)
    pub static ref SETTLEMENT_DURATION: HistogramVec = register_histogram_vec!(
        "dix_settlement_duration_ms",
        "Ledger submit to confirmation in milliseconds",
        &["flow"],
        vec![100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0]
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // ALIAS METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Username lookups by where the answer came from
    pub static ref ALIAS_LOOKUPS: IntCounterVec = register_int_counter_vec!(
        "dix_alias_lookups_total",
        "Total username lookups by source",
        &["source"]
    )
    .unwrap();

    pub static ref ALIAS_REGISTRATIONS: IntCounter = register_int_counter!(
        "dix_alias_registrations_total",
        "Total usernames registered"
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // POOL METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Pool lifecycle events
    pub static ref POOL_EVENTS: IntCounterVec = register_int_counter_vec!(
        "dix_pool_events_total",
        "Total pool lifecycle events",
        &["event"]
    )
    .unwrap();

    /// Pools started and not yet completed
    pub static ref ACTIVE_POOLS: IntGauge = register_int_gauge!(
        "dix_pools_active",
        "Current number of active pools"
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // SYSTEM METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Operation errors by operation and error kind
    pub static ref OPERATION_ERRORS: IntCounterVec = register_int_counter_vec!(
        "dix_operation_errors_total",
        "Total operation errors by kind",
        &["operation", "kind"]
    )
    .unwrap();

    /// Warning and error log events
    pub static ref LOG_EVENTS: IntCounterVec = register_int_counter_vec!(
        "dix_log_events_total",
        "Total warning and error log events",
        &["level"]
    )
    .unwrap();
}
