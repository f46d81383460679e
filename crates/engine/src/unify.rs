use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use crate::model::{is_canonical_key, Batch, CanonicalRow, CompanyMapping, FieldValue};
use crate::resolve;

/// Placeholder for companies without a resolvable name in display labels.
pub const UNNAMED_COMPANY: &str = "(Sin nombre)";

// ---------------------------------------------------------------------------
// Identity key
// ---------------------------------------------------------------------------

/// The business identity of a canonical row. Two raw records producing the
/// same key are the same logical entry and get merged.
///
/// Amount and month are part of the identity on purpose: records matching on
/// company/account but differing in amount are distinct entries, not
/// duplicates (see DESIGN.md).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    code: String,
    ledger: String,
    month: String,
    amount_cents: i64,
}

impl DedupKey {
    pub fn for_row(row: &CanonicalRow) -> Self {
        Self {
            code: row.company_code.clone(),
            ledger: row.ledger_account.clone(),
            month: row.month.clone().unwrap_or_default(),
            // Minor units make the 2-decimal rounding exact and hashable.
            amount_cents: (row.standardized_amount() * 100.0).round() as i64,
        }
    }
}

// ---------------------------------------------------------------------------
// Unification
// ---------------------------------------------------------------------------

/// Fold batches into one deduplicated canonical row set, in first-seen key
/// order. Records sharing a `DedupKey` collapse onto the first occurrence,
/// which accumulates their source labels and record count.
pub fn unify_batches(batches: &[Batch], mappings: &[CompanyMapping]) -> Vec<CanonicalRow> {
    let mut directory: HashMap<&str, &str> = HashMap::new();
    for mapping in mappings {
        let code = mapping.code.trim();
        if !code.is_empty() {
            directory.insert(code, mapping.name.trim());
        }
    }

    let mut rows: Vec<CanonicalRow> = Vec::new();
    let mut by_key: HashMap<DedupKey, usize> = HashMap::new();

    for batch in batches {
        for raw in &batch.rows {
            let row = normalize(raw, &batch.label, &directory);
            match by_key.entry(DedupKey::for_row(&row)) {
                Entry::Vacant(slot) => {
                    slot.insert(rows.len());
                    rows.push(row);
                }
                Entry::Occupied(slot) => {
                    let rep = &mut rows[*slot.get()];
                    if !rep.related_sources.iter().any(|s| *s == row.source) {
                        rep.related_sources.push(row.source.clone());
                    }
                    rep.related_count += 1;
                    if rep.company_name.is_empty() && !row.company_name.is_empty() {
                        rep.company_name = row.company_name.clone();
                    }
                }
            }
        }
    }

    rows
}

fn normalize(
    raw: &crate::model::RawRecord,
    label: &str,
    directory: &HashMap<&str, &str>,
) -> CanonicalRow {
    let mut code = resolve::resolve_field(raw, resolve::COMPANY_CODE_KEYS);
    let mut name = resolve::resolve_field(raw, resolve::COMPANY_NAME_KEYS);
    if name.is_empty() {
        if let Some(mapped) = directory.get(code.as_str()) {
            name = (*mapped).to_string();
        }
    }
    resolve::cross_fill(&mut code, &mut name);

    let ledger = resolve::resolve_field(raw, resolve::LEDGER_KEYS);
    let month = resolve::resolve_field(raw, resolve::MONTH_KEYS);
    let amount = resolve::amount_value(raw)
        .map(resolve::parse_amount)
        .unwrap_or(0.0);

    let extra = raw
        .iter()
        .filter(|(key, _)| !is_canonical_key(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    CanonicalRow {
        source: label.to_string(),
        company_code: code,
        company_name: name,
        ledger_account: ledger,
        amount: FieldValue::Number(amount),
        month: (!month.is_empty()).then_some(month),
        related_count: 1,
        related_sources: vec![label.to_string()],
        extra,
    }
}

// ---------------------------------------------------------------------------
// Company directory
// ---------------------------------------------------------------------------

/// Deduplicated `"{name} - {code}"` display labels, Spanish-collated.
pub fn company_display_list(rows: &[CanonicalRow]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut labels = Vec::new();

    for row in rows {
        let name = row.company_name.trim();
        let name = if name.is_empty() { UNNAMED_COMPANY } else { name };
        let label = format!("{} - {}", name, row.company_code.trim())
            .trim()
            .to_string();
        if seen.insert(label.clone()) {
            labels.push(label);
        }
    }

    labels.sort_by(|a, b| collation_key(a).cmp(&collation_key(b)).then_with(|| a.cmp(b)));
    labels
}

/// Approximate `es` collation: case and accent folding, with `ñ` ranking
/// between `n` and `o`.
fn collation_key(s: &str) -> String {
    let mut key = String::with_capacity(s.len());
    for c in s.chars() {
        for lc in c.to_lowercase() {
            match lc {
                'á' | 'à' | 'ä' | 'â' => key.push('a'),
                'é' | 'è' | 'ë' | 'ê' => key.push('e'),
                'í' | 'ì' | 'ï' | 'î' => key.push('i'),
                'ó' | 'ò' | 'ö' | 'ô' => key.push('o'),
                'ú' | 'ù' | 'ü' | 'û' => key.push('u'),
                'ñ' => {
                    key.push('n');
                    key.push('\u{7f}');
                }
                other => key.push(other),
            }
        }
    }
    key
}
