use crate::model::{FieldValue, RawRecord};

// ---------------------------------------------------------------------------
// Candidate header tables
// ---------------------------------------------------------------------------

// Ordered header spellings per canonical field, covering the language and
// abbreviation variants seen across extracts. New variants are one-line
// additions.
pub const COMPANY_CODE_KEYS: &[&str] = &[
    "Sociedad",
    "Soc.",
    "SociedadCodigo",
    "codigo",
    "SOCIEDAD",
    "Codigo",
];
pub const COMPANY_NAME_KEYS: &[&str] = &["SociedadNombre", "sociedad"];
pub const LEDGER_KEYS: &[&str] = &[
    "Libro Mayor",
    "Libro mayor",
    "Cuenta Contable",
    "libro_mayor",
    "cuenta_contable",
];
pub const AMOUNT_KEYS: &[&str] = &[
    "MontoEstandarizado",
    "monto",
    "Importe en ML",
    "Saldo Contable",
    "importe_ml",
    "saldo_contable",
];
pub const MONTH_KEYS: &[&str] = &["Mes", "mes"];

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// First non-empty trimmed match among `candidates`, else "".
pub fn resolve_field(row: &RawRecord, candidates: &[&str]) -> String {
    for key in candidates {
        if let Some(value) = row.get(*key) {
            let text = value.to_text();
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    String::new()
}

/// The raw amount cell, resolved by the same candidate-table rule.
pub fn amount_value<'a>(row: &'a RawRecord) -> Option<&'a FieldValue> {
    AMOUNT_KEYS
        .iter()
        .filter_map(|key| row.get(*key))
        .find(|value| !value.is_blank())
}

/// If exactly one of code/name resolved, the other takes its value so
/// grouping and filtering by company stay usable with partial sources.
pub fn cross_fill(code: &mut String, name: &mut String) {
    if name.is_empty() && !code.is_empty() {
        *name = code.clone();
    } else if code.is_empty() && !name.is_empty() {
        *code = name.clone();
    }
}

// ---------------------------------------------------------------------------
// Amount parsing
// ---------------------------------------------------------------------------

/// Convert a locale-formatted cell ("190.440,13", "-1.247,12") to a finite
/// number. Total: null, blank, and unparseable input all read as 0.
pub fn parse_amount(value: &FieldValue) -> f64 {
    match value {
        FieldValue::Number(n) if n.is_finite() => *n,
        FieldValue::Number(_) | FieldValue::Empty => 0.0,
        FieldValue::Text(s) => {
            let raw = s.trim();
            if raw.is_empty() {
                return 0.0;
            }
            // Grouping dots stripped, decimal comma becomes a decimal point.
            let normalized: String = raw
                .chars()
                .filter_map(|c| match c {
                    '.' => None,
                    ',' => Some('.'),
                    other => Some(other),
                })
                .collect();
            match normalized.parse::<f64>() {
                Ok(n) if n.is_finite() => n,
                _ => 0.0,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(pairs: &[(&str, &str)]) -> RawRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), FieldValue::Text(v.to_string())))
            .collect()
    }

    #[test]
    fn first_candidate_wins() {
        let row = record(&[("Sociedad", "1020"), ("Codigo", "9999")]);
        assert_eq!(resolve_field(&row, COMPANY_CODE_KEYS), "1020");
    }

    #[test]
    fn empty_candidates_are_skipped() {
        let row = record(&[("Sociedad", "  "), ("Codigo", "9999")]);
        assert_eq!(resolve_field(&row, COMPANY_CODE_KEYS), "9999");
    }

    #[test]
    fn values_are_trimmed() {
        let row = record(&[("Libro Mayor", "  2103011004  ")]);
        assert_eq!(resolve_field(&row, LEDGER_KEYS), "2103011004");
    }

    #[test]
    fn unresolved_is_empty() {
        let row = record(&[("Otra Columna", "x")]);
        assert_eq!(resolve_field(&row, MONTH_KEYS), "");
    }

    #[test]
    fn amount_cell_resolution() {
        let row = record(&[("Importe en ML", "-120,84"), ("Saldo Contable", "7")]);
        let cell = amount_value(&row).unwrap();
        assert_eq!(parse_amount(cell), -120.84);
        assert!(amount_value(&record(&[("monto", "  ")])).is_none());
    }

    #[test]
    fn cross_fill_both_directions() {
        let (mut code, mut name) = ("1020".to_string(), String::new());
        cross_fill(&mut code, &mut name);
        assert_eq!(name, "1020");

        let (mut code, mut name) = (String::new(), "Acme SA".to_string());
        cross_fill(&mut code, &mut name);
        assert_eq!(code, "Acme SA");

        let (mut code, mut name) = (String::new(), String::new());
        cross_fill(&mut code, &mut name);
        assert_eq!((code.as_str(), name.as_str()), ("", ""));
    }

    #[test]
    fn parse_amount_locale_formats() {
        let text = |s: &str| FieldValue::Text(s.to_string());
        assert_eq!(parse_amount(&text("190.440,13")), 190_440.13);
        assert_eq!(parse_amount(&text("-1.247,12")), -1247.12);
        assert_eq!(parse_amount(&text("1.234,56")), 1234.56);
        assert_eq!(parse_amount(&text("42")), 42.0);
        assert_eq!(parse_amount(&text("")), 0.0);
        assert_eq!(parse_amount(&text("abc")), 0.0);
        assert_eq!(parse_amount(&FieldValue::Empty), 0.0);
        assert_eq!(parse_amount(&FieldValue::Number(7.5)), 7.5);
        assert_eq!(parse_amount(&FieldValue::Number(f64::NAN)), 0.0);
        assert_eq!(parse_amount(&FieldValue::Number(f64::INFINITY)), 0.0);
    }

    proptest! {
        #[test]
        fn parse_amount_is_total_and_finite(s in "\\PC*") {
            let n = parse_amount(&FieldValue::Text(s));
            prop_assert!(n.is_finite());
        }

        #[test]
        fn parse_amount_is_idempotent(s in "\\PC*") {
            let once = parse_amount(&FieldValue::Text(s));
            let twice = parse_amount(&FieldValue::Number(once));
            prop_assert_eq!(once, twice);
        }
    }
}
