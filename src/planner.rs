//! Install planning.
//!
//! A pure delta between the desired selection and the previously recorded
//! install state. No I/O, deterministic output ordering.

use std::collections::BTreeSet;

/// Delta between desired and managed composite ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    /// Desired but not yet managed.
    pub to_install: Vec<String>,
    /// Managed but no longer desired; empty unless `remove_unselected`.
    pub to_remove: Vec<String>,
    /// Desired and already managed; skipped, never reinstalled.
    pub already_installed: Vec<String>,
}

impl Plan {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.to_install.is_empty() && self.to_remove.is_empty()
    }
}

/// Compute the delta. Plain install is additive; a sync (with
/// `remove_unselected`) enforces the exact desired set.
#[must_use]
pub fn delta(desired: &[String], managed: &[String], remove_unselected: bool) -> Plan {
    let desired: BTreeSet<&str> = desired.iter().map(String::as_str).collect();
    let managed: BTreeSet<&str> = managed.iter().map(String::as_str).collect();

    let to_install = desired
        .difference(&managed)
        .map(ToString::to_string)
        .collect();
    let already_installed = desired
        .intersection(&managed)
        .map(ToString::to_string)
        .collect();
    let to_remove = if remove_unselected {
        managed
            .difference(&desired)
            .map(ToString::to_string)
            .collect()
    } else {
        Vec::new()
    };

    Plan {
        to_install,
        to_remove,
        already_installed,
    }
}
