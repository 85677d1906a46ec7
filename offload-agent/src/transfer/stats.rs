//! Worker results table parsing.
//!
//! With `--stat` the copy tool ends its stdout with a results table:
//!
//! ```text
//! Operation	Total	Error	Success
//! cp	10	2	8
//! ```
//!
//! Protocol v1: the header fields are exactly `Operation Total Error Success`;
//! it is followed by rows of `<operation> <total> <errors> <successes>` with
//! unsigned integer counts. The table ends at the first line without four
//! fields (blank, trailing text or end of output). Rows are summed. Output
//! without a header belongs to a worker that has not finished yet. A header
//! of any other shape, or a row whose counts are not integers, is rejected
//! rather than read at guessed positions.

use serde::Serialize;
use std::ops::AddAssign;
use thiserror::Error;

pub const RESULTS_HEADER: [&str; 4] = ["Operation", "Total", "Error", "Success"];

/// Operation counts reported by one or more workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferCounters {
    pub total: u64,
    pub errors: u64,
    pub successes: u64,
}

impl AddAssign for TransferCounters {
    fn add_assign(&mut self, other: Self) {
        self.total += other.total;
        self.errors += other.errors;
        self.successes += other.successes;
    }
}

impl std::iter::Sum for TransferCounters {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |mut acc, counters| {
            acc += counters;
            acc
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatsError {
    #[error("unexpected results header: {0:?}")]
    UnexpectedHeader(String),

    #[error("malformed results row {line:?}: {reason}")]
    MalformedRow { line: String, reason: String },
}

/// Parse the results table out of a worker's stdout.
///
/// `Ok(None)` means no table has been written yet.
pub fn parse_results(output: &str) -> Result<Option<TransferCounters>, StatsError> {
    let mut lines = output.lines();
    let mut rejected_header = None;

    while let Some(line) = lines.next() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.first() != Some(&RESULTS_HEADER[0]) {
            continue;
        }
        if fields != RESULTS_HEADER {
            rejected_header.get_or_insert_with(|| line.trim().to_string());
            continue;
        }

        let mut counters = TransferCounters::default();
        let mut rows = 0usize;
        for row in lines.by_ref() {
            let fields: Vec<&str> = row.split_whitespace().collect();
            if fields.len() != RESULTS_HEADER.len() {
                break;
            }
            counters += parse_row(row, &fields)?;
            rows += 1;
        }
        return Ok((rows > 0).then_some(counters));
    }

    match rejected_header {
        Some(header) => Err(StatsError::UnexpectedHeader(header)),
        None => Ok(None),
    }
}

fn parse_row(line: &str, fields: &[&str]) -> Result<TransferCounters, StatsError> {
    let malformed = |reason: &str| StatsError::MalformedRow {
        line: line.trim().to_string(),
        reason: reason.to_string(),
    };

    let count = |index: usize| {
        fields[index]
            .parse::<u64>()
            .map_err(|_| malformed("counts must be unsigned integers"))
    };

    Ok(TransferCounters {
        total: count(1)?,
        errors: count(2)?,
        successes: count(3)?,
    })
}
