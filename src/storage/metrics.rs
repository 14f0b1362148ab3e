// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use prometheus::{exponential_buckets, HistogramVec, IntCounterVec, IntGauge};

lazy_static! {
    pub static ref KV_COMMAND_COUNTER_VEC: IntCounterVec = register_int_counter_vec!(
        "txnkv_storage_command_total",
        "Total number of commands received.",
        &["type"]
    )
    .unwrap();
    pub static ref SCHED_STAGE_COUNTER_VEC: IntCounterVec = register_int_counter_vec!(
        "txnkv_scheduler_stage_total",
        "Total number of commands on each stage.",
        &["type", "stage"]
    )
    .unwrap();
    pub static ref SCHED_TOO_BUSY_COUNTER_VEC: IntCounterVec = register_int_counter_vec!(
        "txnkv_scheduler_too_busy_total",
        "Total number of scheduler too busy rejections.",
        &["type"]
    )
    .unwrap();
    pub static ref SCHED_LATCH_HISTOGRAM_VEC: HistogramVec = register_histogram_vec!(
        "txnkv_scheduler_latch_wait_duration_seconds",
        "Bucketed histogram of latch wait duration.",
        &["type"],
        exponential_buckets(0.00001, 2.0, 20).unwrap()
    )
    .unwrap();
    pub static ref KV_COMMAND_KEYWRITE_HISTOGRAM_VEC: HistogramVec = register_histogram_vec!(
        "txnkv_scheduler_kv_command_key_write",
        "Bucketed histogram of keys written per command.",
        &["type"],
        exponential_buckets(1.0, 2.0, 16).unwrap()
    )
    .unwrap();
    pub static ref KV_COMMAND_SCAN_DETAILS: IntCounterVec = register_int_counter_vec!(
        "txnkv_scheduler_kv_scan_details",
        "Bucketed counter of kv keys scan details for each command.",
        &["req", "cf", "tag"]
    )
    .unwrap();
    pub static ref SCHED_WRITING_BYTES_GAUGE: IntGauge = register_int_gauge!(
        "txnkv_scheduler_writing_bytes",
        "Total number of bytes of commands that are currently writing to the engine."
    )
    .unwrap();
}
