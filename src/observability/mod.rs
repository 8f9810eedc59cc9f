//! Process-wide lookup counters.
//!
//! Counts only. Nothing here may hold hosts, addresses or payloads; the build
//! script rejects network types and print macros in this directory.

#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservabilityLevel {
    OBS_NONE,
    OBS_SAFE,
    OBS_DEV,
}

#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    VALIDATION_REJECTED,
    UPSTREAM_FAILURE,
    RESOURCE_LIMIT,
    INTERNAL,
}

const ERROR_CLASSES: usize = 4;

#[cfg(feature = "obs_none")]
pub const OBS_LEVEL: ObservabilityLevel = ObservabilityLevel::OBS_NONE;

#[cfg(all(feature = "obs_dev", not(feature = "obs_none")))]
pub const OBS_LEVEL: ObservabilityLevel = ObservabilityLevel::OBS_DEV;

#[cfg(all(not(feature = "obs_none"), not(feature = "obs_dev")))]
pub const OBS_LEVEL: ObservabilityLevel = ObservabilityLevel::OBS_SAFE;

pub const OBS_NONE: bool = matches!(OBS_LEVEL, ObservabilityLevel::OBS_NONE);
pub const OBS_DEV: bool = matches!(OBS_LEVEL, ObservabilityLevel::OBS_DEV);

use std::sync::atomic::{AtomicU64, Ordering};

static LOOKUPS_STARTED: AtomicU64 = AtomicU64::new(0);
static LOOKUPS_SUCCEEDED: AtomicU64 = AtomicU64::new(0);
static REJECTIONS: [AtomicU64; ERROR_CLASSES] = [const { AtomicU64::new(0) }; ERROR_CLASSES];

const BYTE_BUCKETS: usize = 21;
static UPSTREAM_BYTES_COARSE: [AtomicU64; BYTE_BUCKETS] = [const { AtomicU64::new(0) }; BYTE_BUCKETS];

#[inline]
pub fn record_lookup_started() {
    if OBS_NONE {
        return;
    }
    LOOKUPS_STARTED.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub fn record_lookup_succeeded() {
    if OBS_NONE {
        return;
    }
    LOOKUPS_SUCCEEDED.fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub fn record_rejection(class: ErrorClass) {
    if OBS_NONE {
        return;
    }
    REJECTIONS[class as usize].fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub fn record_upstream_bytes(byte_len: usize) {
    if OBS_NONE {
        return;
    }
    let idx = coarse_bucket_index(byte_len);
    UPSTREAM_BYTES_COARSE[idx].fetch_add(1, Ordering::Relaxed);
}

/// floor(log2(len)), clamped to the last bucket; 0 and 1 share bucket 0.
#[inline]
const fn coarse_bucket_index(byte_len: usize) -> usize {
    if byte_len == 0 {
        return 0;
    }
    let mut v = byte_len;
    let mut idx: usize = 0;
    while v > 1 && idx + 1 < BYTE_BUCKETS {
        v >>= 1;
        idx += 1;
    }
    idx
}

#[derive(Debug, Clone)]
pub struct ObservabilitySnapshot {
    pub lookups_started: u64,
    pub lookups_succeeded: u64,
    pub rejections: [u64; ERROR_CLASSES],
    pub upstream_bytes_coarse: [u64; BYTE_BUCKETS],
}

impl ObservabilitySnapshot {
    pub fn rejections_of(&self, class: ErrorClass) -> u64 {
        self.rejections[class as usize]
    }
}

pub fn snapshot() -> ObservabilitySnapshot {
    ObservabilitySnapshot {
        lookups_started: LOOKUPS_STARTED.load(Ordering::Relaxed),
        lookups_succeeded: LOOKUPS_SUCCEEDED.load(Ordering::Relaxed),
        rejections: REJECTIONS.each_ref().map(|c| c.load(Ordering::Relaxed)),
        upstream_bytes_coarse: UPSTREAM_BYTES_COARSE.each_ref().map(|c| c.load(Ordering::Relaxed)),
    }
}
