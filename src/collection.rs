//! Resolution outcomes grouped by status, in processing order

use std::collections::HashMap;

use crate::resolver::{AppResolution, ResolutionStatus};

/// Append-only grouping of [`AppResolution`]s by status
#[derive(Debug, Default, Clone)]
pub struct ResolutionCollection {
    by_status: HashMap<ResolutionStatus, Vec<AppResolution>>,
}

impl ResolutionCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, resolution: AppResolution) {
        self.by_status
            .entry(resolution.status())
            .or_default()
            .push(resolution);
    }

    /// Resolutions with `status`, in the order they were added
    pub fn get(&self, status: ResolutionStatus) -> &[AppResolution] {
        self.by_status.get(&status).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count(&self, status: ResolutionStatus) -> usize {
        self.get(status).len()
    }

    pub fn len(&self) -> usize {
        self.by_status.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn resolved(&self) -> &[AppResolution] {
        self.get(ResolutionStatus::Resolved)
    }

    /// Lines for the transformed list: one per resolved app
    pub fn resolved_lines(&self) -> Vec<String> {
        self.resolved().iter().map(AppResolution::render).collect()
    }

    /// Human-readable summary: counts, then the unresolved inputs
    pub fn report(&self) -> String {
        let mut out = format!(
            "Resolved {} apps, {} ambiguous, {} not found\n",
            self.count(ResolutionStatus::Resolved),
            self.count(ResolutionStatus::Ambiguous),
            self.count(ResolutionStatus::NotFound),
        );
        for status in [ResolutionStatus::Ambiguous, ResolutionStatus::NotFound] {
            let entries = self.get(status);
            if entries.is_empty() {
                continue;
            }
            out.push_str(&format!("{status}:\n"));
            for entry in entries {
                out.push_str(&format!("\t{}\n", entry.render()));
            }
        }
        out
    }
}

impl Extend<AppResolution> for ResolutionCollection {
    fn extend<T: IntoIterator<Item = AppResolution>>(&mut self, iter: T) {
        for resolution in iter {
            self.add(resolution);
        }
    }
}
