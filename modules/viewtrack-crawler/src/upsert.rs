//! Sheet upsert engine.
//!
//! Reads the id column once per batch, routes each reconciled record to an
//! in-place update or an append, and finishes with a duplicate sweep. The
//! whole sequence is idempotent: running the same batch twice leaves the
//! sheet in the same state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::traits::SheetStore;
use crate::types::ReconciledRecord;

pub struct SheetUpserter {
    store: Arc<dyn SheetStore>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub updated: usize,
    pub appended: usize,
    pub duplicates_removed: usize,
}

impl SheetUpserter {
    pub fn new(store: Arc<dyn SheetStore>) -> Self {
        Self { store }
    }

    /// Write a batch of records to the sheet.
    ///
    /// Records whose id already exists overwrite that row; the rest are
    /// appended. Every batch ends with a duplicate sweep, even an empty one,
    /// so rows left behind by interrupted runs get cleaned up eventually.
    pub async fn upsert(&self, records: &[ReconciledRecord]) -> Result<UpsertSummary> {
        let mut row_by_id: HashMap<String, u32> = HashMap::new();
        for (row, id) in self.store.id_column().await? {
            if !id.is_empty() {
                // Keep the first occurrence; later ones are duplicates and
                // fall to the sweep below.
                row_by_id.entry(id).or_insert(row);
            }
        }

        let mut updates: Vec<(u32, Vec<String>)> = Vec::new();
        let mut appends: Vec<Vec<String>> = Vec::new();
        for record in records {
            match row_by_id.get(&record.record_id) {
                Some(&row) => updates.push((row, record.to_row())),
                None => appends.push(record.to_row()),
            }
        }

        if !updates.is_empty() {
            self.store.update_rows(&updates).await?;
        }
        if !appends.is_empty() {
            self.store.append_rows(&appends).await?;
        }

        let duplicates_removed = self.remove_duplicates().await?;

        let summary = UpsertSummary {
            updated: updates.len(),
            appended: appends.len(),
            duplicates_removed,
        };
        info!(
            updated = summary.updated,
            appended = summary.appended,
            duplicates_removed = summary.duplicates_removed,
            "Sheet upsert complete"
        );
        Ok(summary)
    }

    /// Delete every row whose id already appeared higher up the sheet.
    async fn remove_duplicates(&self) -> Result<usize> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut doomed: Vec<u32> = Vec::new();
        for (row, id) in self.store.id_column().await? {
            if id.is_empty() {
                continue;
            }
            if !seen.insert(id) {
                doomed.push(row);
            }
        }

        if doomed.is_empty() {
            return Ok(0);
        }
        warn!(rows = doomed.len(), "Removing duplicate sheet rows");
        self.store.delete_rows(&doomed).await?;
        Ok(doomed.len())
    }
}
