//! Health verdict reducer
//!
//! Strict AND over the applicable checks. There is no weighting or quorum:
//! one failing applicable check makes the verdict false, and an empty
//! applicable set is never reported healthy.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::{HealthStatus, ProbeResult};

/// Boolean verdict plus its degradation class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub ok: bool,
    pub status: HealthStatus,
    /// Applicable keys whose check failed or is missing, in key order
    pub failing: Vec<String>,
}

/// `true` iff `applicable` is non-empty and every key in it maps to an ok result.
///
/// A key in `applicable` with no entry in `checks` counts as failed. Entries in
/// `checks` outside `applicable` are ignored.
pub fn reduce(checks: &BTreeMap<String, ProbeResult>, applicable: &BTreeSet<String>) -> bool {
    !applicable.is_empty()
        && applicable
            .iter()
            .all(|key| checks.get(key).map(|r| r.ok).unwrap_or(false))
}

/// [`reduce`] plus classification into up / degraded / down / unknown
pub fn classify(checks: &BTreeMap<String, ProbeResult>, applicable: &BTreeSet<String>) -> Verdict {
    if applicable.is_empty() {
        return Verdict {
            ok: false,
            status: HealthStatus::Unknown,
            failing: Vec::new(),
        };
    }

    let failing: Vec<String> = applicable
        .iter()
        .filter(|key| !checks.get(*key).map(|r| r.ok).unwrap_or(false))
        .cloned()
        .collect();

    let status = if failing.is_empty() {
        HealthStatus::Up
    } else if failing.len() == applicable.len() {
        HealthStatus::Down
    } else {
        HealthStatus::Degraded
    };

    Verdict {
        ok: failing.is_empty(),
        status,
        failing,
    }
}
