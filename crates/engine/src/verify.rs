use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::config::VerifyConfig;
use crate::model::{
    CanonicalRow, FieldValue, COL_AMOUNT, COL_COMPANY_CODE, COL_COMPANY_NAME, COL_SOURCE,
};
use crate::stats;

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

// Ledger-account keywords for the sign cross-check. A revenue-like account
// with a negative amount is an error; an expense-like account with a positive
// amount is only a warning.
const REVENUE_KEYWORDS: &[&str] = &["venta", "ingres", "factur"];
const EXPENSE_KEYWORDS: &[&str] = &["gasto", "compr", "cost", "egreso"];

// Date-bearing column candidates, tried in order against the first row; the
// first parseable one drives the monthly grouping for the whole call.
const DATE_COLUMN_CANDIDATES: &[&str] = &["Fecha", "fecha", "Date", "date", "Periodo", "periodo"];

// Formats tried by the flexible date parser. ISO first; slashed and dashed
// forms read day-first (the extracts are Spanish-locale).
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y", "%m/%d/%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

// Diagnostics are part of the dataset contract consumed by the table UI and
// the issue export.
const MSG_REQUIRED_EMPTY: &str = "Campo requerido vacío";
const MSG_INVALID_AMOUNT: &str = "Monto inválido (no numérico o no finito)";
const MSG_OUTLIER: &str = "Posible outlier por magnitud absoluta";
const MSG_DUPLICATE: &str = "Posible duplicado (mismos campos clave)";
const MSG_NEGATIVE_REVENUE: &str = "Monto negativo inesperado para tipo 'Ingresos/Ventas'";
const MSG_POSITIVE_EXPENSE: &str = "Monto positivo inesperado para tipo 'Gastos/Compras'";
const MSG_IQR_ANOMALY: &str = "Anomalía respecto a distribución histórica de la empresa (IQR)";
const MSG_MONTHLY_ANOMALY: &str = "Anomalía mensual por empresa (z-score > 3)";

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// One problem on one row, attached to the column it concerns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellIssue {
    pub column: String,
    pub message: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStat {
    pub issues: usize,
    /// issues / rows in the verified view.
    pub ratio: f64,
}

/// Everything the verification pass found, keyed by original dataset index
/// so callers can filter/sort/paginate without invalidating the result.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReport {
    pub by_index: BTreeMap<usize, Vec<CellIssue>>,
    pub rows_with_issues: usize,
    pub errors: usize,
    pub warnings: usize,
    pub missing_required: usize,
    pub duplicates: usize,
    pub outliers: usize,
    pub invalid_numbers: usize,
    pub cross_field: usize,
    pub monthly_anomalies: usize,
    pub company_iqr_anomalies: usize,
    pub column_stats: BTreeMap<String, ColumnStat>,
    pub hot_columns: Vec<String>,
}

// ---------------------------------------------------------------------------
// Issue accounting
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Tally {
    by_index: BTreeMap<usize, Vec<CellIssue>>,
    column_counts: BTreeMap<String, usize>,
    errors: usize,
    warnings: usize,
}

impl Tally {
    fn add(&mut self, index: usize, column: &str, message: &str, severity: Severity) {
        self.by_index.entry(index).or_default().push(CellIssue {
            column: column.to_string(),
            message: message.to_string(),
            severity,
        });
        match severity {
            Severity::Error => self.errors += 1,
            Severity::Warning => self.warnings += 1,
        }
        *self.column_counts.entry(column.to_string()).or_insert(0) += 1;
    }
}

/// Strict numeric reading of the amount cell, as distinct from the lenient
/// locale-aware `parse_amount` used at ingestion.
enum AmountCell {
    Absent,
    Invalid,
    Value(f64),
}

fn amount_cell(value: &FieldValue) -> AmountCell {
    match value {
        FieldValue::Empty => AmountCell::Absent,
        FieldValue::Number(n) if n.is_finite() => AmountCell::Value(*n),
        FieldValue::Number(_) => AmountCell::Invalid,
        FieldValue::Text(s) => {
            let trimmed = s.trim();
            // Blank text coerces to zero, like the numeric coercion the
            // downstream table applies.
            if trimmed.is_empty() {
                return AmountCell::Value(0.0);
            }
            match trimmed.parse::<f64>() {
                Ok(n) if n.is_finite() => AmountCell::Value(n),
                _ => AmountCell::Invalid,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Date handling
// ---------------------------------------------------------------------------

fn parse_flexible_date(s: &str) -> Option<NaiveDate> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(datetime.date());
        }
    }
    None
}

/// Whether the text contains a `YYYY-M-D`-shaped run.
fn looks_like_iso_date(s: &str) -> bool {
    let bytes = s.as_bytes();
    let digits = |range: &[u8]| range.iter().all(u8::is_ascii_digit);
    for start in 0..bytes.len() {
        let rest = &bytes[start..];
        if rest.len() < 8 || !digits(&rest[..4]) || rest[4] != b'-' {
            continue;
        }
        let rest = &rest[5..];
        for month_len in [2usize, 1] {
            if rest.len() <= month_len || !digits(&rest[..month_len]) || rest[month_len] != b'-' {
                continue;
            }
            let day = &rest[month_len + 1..];
            if day.first().is_some_and(u8::is_ascii_digit) {
                return true;
            }
        }
    }
    false
}

fn field_date(value: &FieldValue) -> Option<NaiveDate> {
    match value {
        FieldValue::Text(s) => parse_flexible_date(s),
        _ => None,
    }
}

/// Find the date-bearing column once per call, from the first row of the
/// view: named candidates first, then any column with ISO-like text.
fn detect_date_column(row: &CanonicalRow) -> Option<String> {
    for key in DATE_COLUMN_CANDIDATES {
        if let Some(value) = row.field(key) {
            if field_date(value).is_some() {
                return Some((*key).to_string());
            }
        }
    }
    for (key, value) in &row.extra {
        if let FieldValue::Text(s) = value {
            if looks_like_iso_date(s) && parse_flexible_date(s).is_some() {
                return Some(key.clone());
            }
        }
    }
    None
}

fn month_key(value: &FieldValue) -> Option<String> {
    field_date(value).map(|d| d.format("%Y-%m").to_string())
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Verify a row view. `index_map[pos]` maps a view position back to the
/// row's index in the full dataset, so issues survive filtering and sorting
/// done by the caller; a short map falls back to positional identity.
///
/// Never fails: rows that defeat a given check simply skip it.
pub fn verify_rows(rows: &[CanonicalRow], index_map: &[usize], config: &VerifyConfig) -> VerifyReport {
    let mut tally = Tally::default();
    let mut missing_required = 0;
    let mut duplicates = 0;
    let mut outliers = 0;
    let mut invalid_numbers = 0;
    let mut cross_field = 0;
    let mut monthly_anomalies = 0;
    let mut company_iqr_anomalies = 0;

    let original_index = |pos: usize| index_map.get(pos).copied().unwrap_or(pos);
    let date_column = rows.first().and_then(detect_date_column);

    let mut seen_keys: HashSet<String> = HashSet::new();
    let mut by_company: HashMap<String, Vec<f64>> = HashMap::new();
    let mut by_company_month: HashMap<(String, String), Vec<f64>> = HashMap::new();

    // Pass 1: independent per-row checks; accumulates the grouping data the
    // second pass needs.
    for (pos, row) in rows.iter().enumerate() {
        let index = original_index(pos);

        // Required columns: company name, company code, source label.
        for (column, value) in [
            (COL_COMPANY_NAME, &row.company_name),
            (COL_COMPANY_CODE, &row.company_code),
            (COL_SOURCE, &row.source),
        ] {
            if value.trim().is_empty() {
                tally.add(index, column, MSG_REQUIRED_EMPTY, Severity::Error);
                missing_required += 1;
            }
        }

        match amount_cell(&row.amount) {
            AmountCell::Absent => {}
            AmountCell::Invalid => {
                tally.add(index, COL_AMOUNT, MSG_INVALID_AMOUNT, Severity::Error);
                invalid_numbers += 1;
            }
            AmountCell::Value(amount) => {
                if amount.abs() > config.outlier_abs {
                    tally.add(index, COL_AMOUNT, MSG_OUTLIER, Severity::Warning);
                    outliers += 1;
                }
                let company = row.company_name.clone();
                by_company.entry(company.clone()).or_default().push(amount);
                if let Some(column) = &date_column {
                    if let Some(month) = row.field(column).and_then(month_key) {
                        by_company_month
                            .entry((company, month))
                            .or_default()
                            .push(amount);
                    }
                }
            }
        }

        // Looser than the merge-time identity on purpose: amount and month
        // are excluded, so re-entries that differ only there still surface.
        let dup_key = format!(
            "{}|{}|{}|{}",
            row.company_code, row.source, row.ledger_account, row.company_name
        );
        if !seen_keys.insert(dup_key) {
            tally.add(index, COL_COMPANY_CODE, MSG_DUPLICATE, Severity::Warning);
            duplicates += 1;
        }
    }

    // Per-company distribution bounds, for groups big enough to trust.
    let company_bounds: HashMap<&String, (f64, f64)> = by_company
        .iter()
        .filter(|(_, amounts)| amounts.len() >= config.min_company_samples)
        .map(|(company, amounts)| {
            let mut sorted = amounts.clone();
            sorted.sort_by(f64::total_cmp);
            let q1 = stats::quantile(&sorted, 0.25);
            let q3 = stats::quantile(&sorted, 0.75);
            let iqr = q3 - q1;
            (
                company,
                (q1 - config.iqr_multiplier * iqr, q3 + config.iqr_multiplier * iqr),
            )
        })
        .collect();

    let month_stats: HashMap<&(String, String), (f64, f64)> = by_company_month
        .iter()
        .filter(|(_, amounts)| amounts.len() >= config.min_month_samples)
        .map(|(group, amounts)| (group, (stats::mean(amounts), stats::stdev_pop(amounts))))
        .collect();

    // Pass 2: group-aware checks.
    for (pos, row) in rows.iter().enumerate() {
        let index = original_index(pos);
        let amount = match amount_cell(&row.amount) {
            AmountCell::Value(amount) => amount,
            _ => continue,
        };

        let ledger = row.ledger_account.to_lowercase();
        if REVENUE_KEYWORDS.iter().any(|kw| ledger.contains(kw)) && amount < 0.0 {
            tally.add(index, COL_AMOUNT, MSG_NEGATIVE_REVENUE, Severity::Error);
            cross_field += 1;
        }
        if EXPENSE_KEYWORDS.iter().any(|kw| ledger.contains(kw)) && amount > 0.0 {
            tally.add(index, COL_AMOUNT, MSG_POSITIVE_EXPENSE, Severity::Warning);
            cross_field += 1;
        }

        if let Some((low, high)) = company_bounds.get(&row.company_name) {
            if amount < *low || amount > *high {
                tally.add(index, COL_AMOUNT, MSG_IQR_ANOMALY, Severity::Warning);
                company_iqr_anomalies += 1;
            }
        }

        if let Some(column) = &date_column {
            if let Some(month) = row.field(column).and_then(month_key) {
                let group = (row.company_name.clone(), month);
                if let Some((mean, stdev)) = month_stats.get(&group) {
                    if *stdev > 0.0 {
                        let z = ((amount - mean) / stdev).abs();
                        if z > config.zscore_threshold {
                            tally.add(index, COL_AMOUNT, MSG_MONTHLY_ANOMALY, Severity::Warning);
                            monthly_anomalies += 1;
                        }
                    }
                }
            }
        }
    }

    // Column hotspots.
    let total_rows = rows.len().max(1) as f64;
    let column_stats: BTreeMap<String, ColumnStat> = tally
        .column_counts
        .iter()
        .map(|(column, issues)| {
            (
                column.clone(),
                ColumnStat {
                    issues: *issues,
                    ratio: *issues as f64 / total_rows,
                },
            )
        })
        .collect();
    let hot_columns: Vec<String> = column_stats
        .iter()
        .filter(|(_, stat)| stat.ratio >= config.hot_column_ratio)
        .map(|(column, _)| column.clone())
        .collect();

    VerifyReport {
        rows_with_issues: tally.by_index.len(),
        by_index: tally.by_index,
        errors: tally.errors,
        warnings: tally.warnings,
        missing_required,
        duplicates,
        outliers,
        invalid_numbers,
        cross_field,
        monthly_anomalies,
        company_iqr_anomalies,
        column_stats,
        hot_columns,
    }
}
