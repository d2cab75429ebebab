//! Appends stored proposals that are missing from the sheet.
//!
//! A pass reads every stored proposal in creation order, drops those whose link already appears in
//! the sheet's link column, and appends the rest in one batch. Running it again without new
//! ingests appends nothing. Passes are not serialised against each other: two concurrent passes can
//! both see the same link as missing and append it twice.

use std::collections::HashSet;

use chrono_tz::Tz;
use log::{debug, info, warn};

use crate::error::SyncError;
use crate::sheets::ProposalSheet;
use crate::store::ProposalStore;
use crate::timestamp::{FormatError, display, localize};
use crate::types::{Proposal, ReconciliationRow};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReconcileMode {
    #[default]
    Apply,
    /// Compute the rows but never write them.
    DryRun,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Plan {
    pub rows: Vec<ReconciliationRow>,
    pub already_present: usize,
    pub skipped: Vec<(String, FormatError)>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub mode: ReconcileMode,
    pub stored: usize,
    pub already_present: usize,
    pub rows: Vec<ReconciliationRow>,
    /// Rows the sheet reported as written. Always zero for `ReconcileMode::DryRun`.
    pub appended: usize,
    pub skipped: Vec<(String, FormatError)>,
}

impl ReconcileReport {
    pub fn summary(&self) -> String {
        let mut summary = if self.rows.is_empty() {
            "No new entries to add to Google Sheets".to_owned()
        } else {
            match self.mode {
                ReconcileMode::Apply => {
                    format!("{} new entries added to Google Sheets successfully", self.appended)
                }
                ReconcileMode::DryRun => {
                    format!("{} new entries would be added to Google Sheets", self.rows.len())
                }
            }
        };
        if !self.skipped.is_empty() {
            let uids: Vec<&str> = self.skipped.iter().map(|(uid, _)| uid.as_str()).collect();
            summary.push_str(&format!(
                "; skipped {} with malformed createdAt: {}",
                uids.len(),
                uids.join(", ")
            ));
        }
        summary
    }
}

/// Builds the rows for proposals whose links are not yet in the sheet, in chronological order.
pub fn plan(proposals: &[Proposal], existing_links: &HashSet<String>, tz: Tz) -> Plan {
    let mut plan = Plan::default();
    let mut missing = Vec::new();

    for proposal in proposals {
        if existing_links.contains(&proposal.proposal_link) {
            plan.already_present += 1;
            continue;
        }
        match localize(&proposal.created_at, tz) {
            Ok(local) => {
                debug!("Proposal {} missing from sheet", proposal.uid);
                missing.push((
                    local,
                    ReconciliationRow {
                        created_at: display(&local),
                        scanner_name: proposal.scanner_name.clone(),
                        proposal_link: proposal.proposal_link.clone(),
                    },
                ));
            }
            Err(e) => {
                warn!("Skipping proposal {}: {e}", proposal.uid);
                plan.skipped.push((proposal.uid.clone(), e));
            }
        }
    }

    // Wall-clock times repeat when clocks fall back, so order by the instant itself.
    missing.sort_by_key(|(local, _)| *local);
    plan.rows = missing.into_iter().map(|(_, row)| row).collect();

    plan
}

pub async fn reconcile<S: ProposalStore, T: ProposalSheet>(
    store: &S,
    sheet: &T,
    tz: Tz,
    mode: ReconcileMode,
) -> Result<ReconcileReport, SyncError> {
    let proposals = store
        .proposals_by_creation()
        .await
        .map_err(SyncError::Storage)?;
    let existing_links = sheet.existing_links().await.map_err(SyncError::Spreadsheet)?;

    let Plan {
        rows,
        already_present,
        skipped,
    } = plan(&proposals, &existing_links, tz);
    info!(
        "{} stored proposals, {already_present} already in sheet, {} to append, {} skipped",
        proposals.len(),
        rows.len(),
        skipped.len()
    );

    let appended = match mode {
        ReconcileMode::Apply if !rows.is_empty() => sheet
            .append_rows(&rows)
            .await
            .map_err(SyncError::Spreadsheet)?,
        _ => 0,
    };

    Ok(ReconcileReport {
        mode,
        stored: proposals.len(),
        already_present,
        rows,
        appended,
        skipped,
    })
}
