//! Import boundary: in-memory CSV text → batches of raw records, plus the
//! directory-batch conventions. Callers own file reading and encoding.

use crate::error::EngineError;
use crate::model::{Batch, CompanyMapping, FieldValue, RawRecord};
use crate::resolve::resolve_field;

/// A batch whose label contains this (case-insensitive) is the company
/// directory rather than ledger data.
pub const DIRECTORY_LABEL_HINT: &str = "sociedad";

// Header spellings for directory rows, first non-empty wins.
const DIRECTORY_CODE_KEYS: &[&str] = &["codigo", "Codigo", "SOCIEDAD", "Sociedad", "SociedadCodigo"];
const DIRECTORY_NAME_KEYS: &[&str] = &["sociedad", "SociedadNombre", "Nombre"];

/// Detect the most likely field delimiter by checking consistency across the
/// first few lines. The candidate producing the most consistent field count
/// (>1 field) wins; comma on no evidence.
pub fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample_lines: Vec<&str> = content.lines().take(10).collect();

    if sample_lines.is_empty() {
        return b',';
    }

    let mut best = b',';
    let mut best_score = 0u64;

    for &delimiter in candidates {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delimiter)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        if counts.first().copied().unwrap_or(0) <= 1 {
            continue;
        }

        let target = counts[0];
        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;

        if score > best_score {
            best_score = score;
            best = delimiter;
        }
    }

    best
}

/// Parse one extract into a batch of raw records. Headers and cells are
/// trimmed; blank cells land as `Empty`; fully blank lines are dropped.
pub fn load_csv_batch(label: &str, csv_text: &str) -> Result<Batch, EngineError> {
    let delimiter = sniff_delimiter(csv_text);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| EngineError::Csv(format!("batch '{label}': {e}")))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| EngineError::Csv(format!("batch '{label}': {e}")))?;

        let mut row = RawRecord::new();
        let mut has_content = false;
        for (i, header) in headers.iter().enumerate() {
            if header.is_empty() {
                continue;
            }
            let cell = record.get(i).unwrap_or("").trim();
            if cell.is_empty() {
                row.insert(header.clone(), FieldValue::Empty);
            } else {
                has_content = true;
                row.insert(header.clone(), FieldValue::Text(cell.to_string()));
            }
        }
        if has_content {
            rows.push(row);
        }
    }

    Ok(Batch {
        label: label.to_string(),
        rows,
    })
}

/// Separate the directory batch (first label match) from the data batches.
/// Absent directory is fine; the unifier runs with zero mappings.
pub fn split_directory(batches: Vec<Batch>) -> (Vec<Batch>, Option<Batch>) {
    let mut directory = None;
    let mut data = Vec::with_capacity(batches.len());

    for batch in batches {
        if directory.is_none() && batch.label.to_lowercase().contains(DIRECTORY_LABEL_HINT) {
            directory = Some(batch);
        } else {
            data.push(batch);
        }
    }

    (data, directory)
}

/// Extract code → name mappings from a directory batch. Rows without a
/// resolvable code are dropped.
pub fn company_mappings(batch: &Batch) -> Vec<CompanyMapping> {
    batch
        .rows
        .iter()
        .filter_map(|row| {
            let code = resolve_field(row, DIRECTORY_CODE_KEYS);
            if code.is_empty() {
                return None;
            }
            Some(CompanyMapping {
                code,
                name: resolve_field(row, DIRECTORY_NAME_KEYS),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_common_delimiters() {
        assert_eq!(sniff_delimiter("a;b;c\n1;2;3\n"), b';');
        assert_eq!(sniff_delimiter("a,b,c\n1,2,3\n"), b',');
        assert_eq!(sniff_delimiter("a\tb\tc\n1\t2\t3\n"), b'\t');
        assert_eq!(sniff_delimiter("a|b|c\n1|2|3\n"), b'|');
        assert_eq!(sniff_delimiter(""), b',');
    }

    #[test]
    fn sniffs_semicolon_with_decimal_commas() {
        let content = "Soc.;Importe en ML\n1020;-120,84\n1030;190.440,13\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn loads_trimmed_records() {
        let batch = load_csv_batch(
            "enero.csv",
            "Soc. ; Libro Mayor ; Importe en ML\n 1020 ; 2103011004 ; -120,84\n",
        )
        .unwrap();
        assert_eq!(batch.rows.len(), 1);
        assert_eq!(
            batch.rows[0].get("Soc."),
            Some(&FieldValue::Text("1020".into()))
        );
        assert_eq!(
            batch.rows[0].get("Importe en ML"),
            Some(&FieldValue::Text("-120,84".into()))
        );
    }

    #[test]
    fn blank_cells_are_empty_blank_rows_dropped() {
        let batch = load_csv_batch("x.csv", "a,b\n1,\n,\n").unwrap();
        assert_eq!(batch.rows.len(), 1);
        assert_eq!(batch.rows[0].get("b"), Some(&FieldValue::Empty));
    }

    #[test]
    fn short_records_pad_with_empty() {
        let batch = load_csv_batch("x.csv", "a,b,c\n1,2\n").unwrap();
        assert_eq!(batch.rows[0].get("c"), Some(&FieldValue::Empty));
        assert_eq!(batch.rows[0].get("b"), Some(&FieldValue::Text("2".into())));
    }

    #[test]
    fn split_is_case_insensitive_and_takes_first() {
        let batches = vec![
            Batch { label: "enero.csv".into(), rows: vec![] },
            Batch { label: "Sociedades.csv".into(), rows: vec![] },
            Batch { label: "listado_sociedad_v2.csv".into(), rows: vec![] },
        ];
        let (data, directory) = split_directory(batches);
        assert_eq!(directory.unwrap().label, "Sociedades.csv");
        assert_eq!(data.len(), 2);
        assert_eq!(data[1].label, "listado_sociedad_v2.csv");
    }

    #[test]
    fn split_without_directory() {
        let (data, directory) = split_directory(vec![Batch {
            label: "enero.csv".into(),
            rows: vec![],
        }]);
        assert!(directory.is_none());
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn mappings_use_candidate_order_and_drop_codeless_rows() {
        let batch = load_csv_batch(
            "sociedades.csv",
            "codigo,Nombre,SociedadCodigo\n1020,Acme SA,9999\n,Huerfana,\n",
        )
        .unwrap();
        let mappings = company_mappings(&batch);
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].code, "1020");
        assert_eq!(mappings[0].name, "Acme SA");
    }
}
