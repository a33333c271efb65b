//! Field-by-field comparison of two persisted snapshots.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    error::PersistenceError,
    snapshot::{read_snapshot, write_snapshot, PersistedSnapshot},
};

/// Which direction of change counts as an improvement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Better {
    Higher,
    Lower,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Improved,
    Regressed,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Count(u64),
    Float(f64),
    /// Microseconds; `None` when the snapshot has no data for it.
    Duration(Option<u64>),
}

impl FieldValue {
    fn magnitude(&self) -> Option<f64> {
        match self {
            Self::Text(_) | Self::Duration(None) => None,
            Self::Count(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Duration(Some(us)) => Some(*us as f64),
        }
    }

    fn display(&self) -> String {
        match self {
            Self::Text(v) => v.clone(),
            Self::Count(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Duration(Some(us)) => display_micros(*us),
            Self::Duration(None) => "-".to_string(),
        }
    }

    fn is_duration(&self) -> bool {
        matches!(self, Self::Duration(_))
    }
}

fn display_micros(us: u64) -> String {
    humantime::format_duration(Duration::from_micros(us)).to_string()
}

/// One entry of the static field table.
pub struct SnapshotField {
    pub label: &'static str,
    /// Whether the field shows up in a comparison at all.
    pub compare: bool,
    pub better: Option<Better>,
    pub extract: fn(&PersistedSnapshot) -> FieldValue,
}

macro_rules! field {
    ($label:literal, $better:expr, |$s:ident| $value:expr) => {
        SnapshotField {
            label: $label,
            compare: true,
            better: $better,
            extract: |$s| $value,
        }
    };
}

/// Every persisted field in declaration order.
pub static SNAPSHOT_FIELDS: &[SnapshotField] = &[
    SnapshotField {
        label: "proc_name",
        compare: false,
        better: None,
        extract: |s| FieldValue::Text(s.proc_name.clone().unwrap_or_default()),
    },
    field!("url", None, |s| FieldValue::Text(s.url.clone())),
    field!("method", None, |s| FieldValue::Text(s.method.clone())),
    field!("connections", None, |s| FieldValue::Count(s.connections as u64)),
    field!("duration", None, |s| FieldValue::Duration(Some(s.duration_us))),
    field!("rps_limit", None, |s| FieldValue::Float(s.rps_limit)),
    field!("max_requests", None, |s| FieldValue::Count(s.max_requests)),
    field!("rps", Some(Better::Higher), |s| FieldValue::Count(s.rps)),
    field!("latency", Some(Better::Lower), |s| FieldValue::Duration(s.latency_us)),
    field!("min", Some(Better::Lower), |s| FieldValue::Duration(s.min_us)),
    field!("p50", Some(Better::Lower), |s| FieldValue::Duration(s.p50_us)),
    field!("p90", Some(Better::Lower), |s| FieldValue::Duration(s.p90_us)),
    field!("p99", Some(Better::Lower), |s| FieldValue::Duration(s.p99_us)),
    field!("p999", Some(Better::Lower), |s| FieldValue::Duration(s.p999_us)),
    field!("max", Some(Better::Lower), |s| FieldValue::Duration(s.max_us)),
    field!("good", Some(Better::Higher), |s| FieldValue::Count(s.good)),
    field!("bad", Some(Better::Lower), |s| FieldValue::Count(s.bad)),
    field!("error", Some(Better::Lower), |s| FieldValue::Count(s.error)),
    field!("body_req_bytes", None, |s| FieldValue::Count(s.body_req_bytes)),
    field!("body_resp_bytes", None, |s| FieldValue::Count(s.body_resp_bytes)),
    field!("time", None, |s| FieldValue::Duration(Some(s.time_us))),
];

#[derive(Debug, Clone, PartialEq)]
pub struct DiffRow {
    pub field: &'static str,
    pub baseline: String,
    pub candidate: String,
    /// `|candidate - baseline|`; `None` for text fields or missing data.
    pub absolute_diff: Option<f64>,
    /// Signed change relative to the baseline, 0 when the baseline is 0.
    pub percent_diff: Option<f64>,
    pub verdict: Option<Verdict>,
    duration: bool,
}

impl DiffRow {
    pub fn absolute(&self) -> String {
        match self.absolute_diff {
            None => String::new(),
            Some(diff) if self.duration => display_micros(diff as u64),
            Some(diff) => diff.to_string(),
        }
    }

    pub fn percent(&self) -> String {
        self.percent_diff
            .map(|pct| format!("{pct:+.2}%"))
            .unwrap_or_default()
    }
}

pub fn compare(baseline: &PersistedSnapshot, candidate: &PersistedSnapshot) -> Vec<DiffRow> {
    SNAPSHOT_FIELDS
        .iter()
        .filter(|field| field.compare)
        .map(|field| {
            let base = (field.extract)(baseline);
            let next = (field.extract)(candidate);
            let mut row = DiffRow {
                field: field.label,
                baseline: base.display(),
                candidate: next.display(),
                absolute_diff: None,
                percent_diff: None,
                verdict: None,
                duration: base.is_duration(),
            };
            if let (Some(b), Some(n)) = (base.magnitude(), next.magnitude()) {
                let diff = n - b;
                row.absolute_diff = Some(diff.abs());
                row.percent_diff = Some(if b == 0.0 { 0.0 } else { diff / b * 100.0 });
                row.verdict = field.better.map(|better| match better {
                    _ if diff == 0.0 => Verdict::Unchanged,
                    Better::Higher if diff > 0.0 => Verdict::Improved,
                    Better::Lower if diff < 0.0 => Verdict::Improved,
                    _ => Verdict::Regressed,
                });
            }
            row
        })
        .collect()
}

pub fn write_compare_csv(path: &Path, rows: &[DiffRow]) -> Result<(), PersistenceError> {
    let report_err = |source| PersistenceError::Report {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(report_err)?;
    writer
        .write_record(["field", "base", "next", "abs_diff", "pct_diff"])
        .map_err(report_err)?;
    for row in rows {
        writer
            .write_record([
                row.field,
                row.baseline.as_str(),
                row.candidate.as_str(),
                row.absolute().as_str(),
                row.percent().as_str(),
            ])
            .map_err(report_err)?;
    }
    writer.flush().map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Persists `snapshot` at `path`.
///
/// With `compare_with_existing` set and a snapshot already at `path`, that file stays untouched as the
/// baseline: the new snapshot goes to `<path>-2.json`, the diff to `<path>-compare.csv`,
/// and the diff rows are returned. Otherwise the returned rows are empty.
pub fn record_and_compare(
    path: &Path,
    snapshot: &PersistedSnapshot,
    compare_with_existing: bool,
) -> Result<Vec<DiffRow>, PersistenceError> {
    let baseline_exists = compare_with_existing
        && path.try_exists().map_err(|source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    if !baseline_exists {
        write_snapshot(path, snapshot)?;
        return Ok(Vec::new());
    }

    let baseline = read_snapshot(path)?;
    write_snapshot(&sibling(path, "-2.json"), snapshot)?;
    let rows = compare(&baseline, snapshot);
    write_compare_csv(&sibling(path, "-compare.csv"), &rows)?;
    Ok(rows)
}
