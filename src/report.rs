use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::sync::{RepositoryOutcome, SyncOutcome};

/// Flat, serializable summary of one repository's cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncRecord {
    pub timestamp: DateTime<Utc>,
    pub repository_id: String,
    pub repository_name: String,
    pub outcome: String,
    pub digest: Option<String>,
    pub imported: usize,
    pub skipped: usize,
    pub deleted: usize,

    // error tracking
    pub error_stage: Option<String>,
    pub error_message: Option<String>,
}

impl SyncRecord {
    pub fn from_outcome(outcome: &RepositoryOutcome, timestamp: DateTime<Utc>) -> Self {
        let mut record = SyncRecord {
            timestamp,
            repository_id: outcome.repository_id.clone(),
            repository_name: outcome.repository_name.clone(),
            outcome: String::new(),
            digest: None,
            imported: 0,
            skipped: 0,
            deleted: 0,
            error_stage: None,
            error_message: None,
        };

        match &outcome.result {
            Ok(ok) => {
                record.outcome = ok.as_str().to_string();
                record.digest = ok.digest().map(str::to_string);
                if let SyncOutcome::Imported { report, .. } = ok {
                    record.imported = report.imported;
                    record.skipped = report.skipped;
                    record.deleted = report.deleted;
                }
            }
            Err(e) => {
                record.outcome = "failed".to_string();
                record.error_stage = Some(e.stage().to_string());
                record.error_message = Some(e.to_string());
            }
        }

        record
    }
}

/// Counts over a whole sync pass.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub repositories: usize,
    pub fresh: usize,
    pub unchanged: usize,
    pub no_stops_found: usize,
    pub imported: usize,
    pub failed: usize,
    pub stops_imported: usize,
    pub rows_skipped: usize,
}

impl PassSummary {
    pub fn from_outcomes(outcomes: &[RepositoryOutcome]) -> Self {
        let mut s = PassSummary {
            repositories: outcomes.len(),
            ..Default::default()
        };

        for outcome in outcomes {
            match &outcome.result {
                Ok(SyncOutcome::Fresh) => s.fresh += 1,
                Ok(SyncOutcome::Unchanged { .. }) => s.unchanged += 1,
                Ok(SyncOutcome::NoStopsFound { .. }) => s.no_stops_found += 1,
                Ok(SyncOutcome::Imported { report, .. }) => {
                    s.imported += 1;
                    s.stops_imported += report.imported;
                    s.rows_skipped += report.skipped;
                }
                Err(_) => s.failed += 1,
            }
        }

        s
    }
}
