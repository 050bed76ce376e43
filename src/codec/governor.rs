//! Capture size governance
//!
//! Byte budgets for cache capture: a per-entry ceiling (oversized entries
//! are skipped whole, never truncated) and a per-run ceiling across every
//! cache of every origin captured in one run. Hitting the run ceiling
//! truncates the remainder of the run; that is a deliberate truncation,
//! not an error.

pub const DEFAULT_RUN_CEILING_BYTES: u64 = 50 * 1024 * 1024;
pub const DEFAULT_ENTRY_CEILING_BYTES: u64 = 5 * 1024 * 1024;

/// Byte ceilings for one capture run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeBudget {
    /// Total encoded cache bytes allowed across the whole run.
    pub run_ceiling_bytes: u64,
    /// Largest single entry body admitted.
    pub entry_ceiling_bytes: u64,
}

impl Default for SizeBudget {
    fn default() -> Self {
        Self {
            run_ceiling_bytes: DEFAULT_RUN_CEILING_BYTES,
            entry_ceiling_bytes: DEFAULT_ENTRY_CEILING_BYTES,
        }
    }
}

impl SizeBudget {
    /// Budget with the run ceiling given in MiB, entry ceiling default.
    pub fn with_run_ceiling_mib(mib: u64) -> Self {
        Self {
            run_ceiling_bytes: mib * 1024 * 1024,
            ..Default::default()
        }
    }
}

/// Verdict for one candidate cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admit,
    /// Entry exceeds the per-entry ceiling; skip it, keep going.
    EntryTooLarge,
    /// Admitting the entry would blow the run ceiling; skip the rest of
    /// the current cache and every subsequent cache.
    RunExhausted,
}

/// Tracks the running byte total across one capture run.
///
/// One governor instance spans all origins of a run; committed cache
/// bytes accumulate into the run total.
#[derive(Debug)]
pub struct CaptureSizeGovernor {
    budget: SizeBudget,
    run_total: u64,
}

impl CaptureSizeGovernor {
    pub fn new(budget: SizeBudget) -> Self {
        Self {
            budget,
            run_total: 0,
        }
    }

    /// Check a candidate entry against both ceilings before keeping it.
    /// `kept_in_cache` is the byte total of entries already kept in the
    /// cache currently being walked (not yet committed).
    pub fn admit(&self, kept_in_cache: u64, entry_bytes: u64) -> Admission {
        if entry_bytes > self.budget.entry_ceiling_bytes {
            return Admission::EntryTooLarge;
        }
        if self.run_total + kept_in_cache + entry_bytes > self.budget.run_ceiling_bytes {
            return Admission::RunExhausted;
        }
        Admission::Admit
    }

    /// Pre-filter from a `content-length` header, checked before the body
    /// is materialized. A missing or unparsable hint admits; the decoded
    /// size is re-checked afterwards.
    pub fn admit_hint(&self, kept_in_cache: u64, hint: Option<u64>) -> Admission {
        match hint {
            Some(bytes) => self.admit(kept_in_cache, bytes),
            None => Admission::Admit,
        }
    }

    /// Fold a finished cache's kept bytes into the run total.
    pub fn commit_cache(&mut self, kept_bytes: u64) {
        self.run_total += kept_bytes;
    }

    pub fn run_total(&self) -> u64 {
        self.run_total
    }

    pub fn budget(&self) -> &SizeBudget {
        &self.budget
    }
}
