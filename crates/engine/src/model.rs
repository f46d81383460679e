use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Cell values
// ---------------------------------------------------------------------------

/// One cell of a raw record: text, a number, or nothing.
///
/// Extracts arrive with wildly different schemas, so a row is an open map of
/// these rather than a fixed struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Empty,
}

impl FieldValue {
    /// Text rendering used by field resolution (numbers format with their
    /// shortest round-trip representation).
    pub fn to_text(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
            Self::Empty => String::new(),
        }
    }

    /// Empty, or text that trims to nothing. Numbers are never blank.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Number(_) => false,
            Self::Text(s) => s.trim().is_empty(),
            Self::Empty => true,
        }
    }
}

impl Default for FieldValue {
    fn default() -> Self {
        Self::Empty
    }
}

/// One line from one imported batch, keyed by its original column names.
pub type RawRecord = BTreeMap<String, FieldValue>;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// All rows imported from a single source file.
#[derive(Debug, Clone)]
pub struct Batch {
    pub label: String,
    pub rows: Vec<RawRecord>,
}

/// A company code → display name pair from an auxiliary directory batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyMapping {
    #[serde(rename = "codigo")]
    pub code: String,
    #[serde(rename = "sociedad")]
    pub name: String,
}

// ---------------------------------------------------------------------------
// Canonical rows
// ---------------------------------------------------------------------------

/// Serialized field names are the dataset contract consumed downstream
/// (tables, charts, exports) and referenced by issue columns.
pub const COL_SOURCE: &str = "_source";
pub const COL_COMPANY_CODE: &str = "SociedadCodigo";
pub const COL_COMPANY_NAME: &str = "SociedadNombre";
pub const COL_LEDGER: &str = "LibroMayor";
pub const COL_AMOUNT: &str = "MontoEstandarizado";
pub const COL_MONTH: &str = "Mes";
pub const COL_RELATED_COUNT: &str = "RelatedRecords";
pub const COL_RELATED_SOURCES: &str = "RelatedSources";

/// A unified record: resolved canonical fields plus the original columns
/// passed through untouched in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRow {
    #[serde(rename = "_source", default)]
    pub source: String,
    #[serde(rename = "SociedadCodigo", default)]
    pub company_code: String,
    #[serde(rename = "SociedadNombre", default)]
    pub company_name: String,
    #[serde(rename = "LibroMayor", default)]
    pub ledger_account: String,
    /// Kept as a raw cell so externally built row views can carry a
    /// present-but-non-numeric amount; the unifier always stores `Number`.
    #[serde(rename = "MontoEstandarizado", default)]
    pub amount: FieldValue,
    #[serde(rename = "Mes", default, skip_serializing_if = "Option::is_none")]
    pub month: Option<String>,
    #[serde(rename = "RelatedRecords", default = "default_related_count")]
    pub related_count: u32,
    #[serde(rename = "RelatedSources", default, with = "comma_joined")]
    pub related_sources: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, FieldValue>,
}

fn default_related_count() -> u32 {
    1
}

impl CanonicalRow {
    /// The amount as a finite number; anything else reads as 0.
    pub fn standardized_amount(&self) -> f64 {
        match self.amount {
            FieldValue::Number(n) if n.is_finite() => n,
            _ => 0.0,
        }
    }

    /// Look up a passthrough column by its original name.
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.extra.get(key)
    }
}

/// True for keys owned by the canonical extraction; passthrough keeps the
/// rest (a clashing raw key would duplicate a serialized field).
pub fn is_canonical_key(key: &str) -> bool {
    matches!(
        key,
        COL_SOURCE
            | COL_COMPANY_CODE
            | COL_COMPANY_NAME
            | COL_LEDGER
            | COL_AMOUNT
            | COL_MONTH
            | COL_RELATED_COUNT
            | COL_RELATED_SOURCES
    )
}

/// `RelatedSources` serializes as the comma-joined label list downstream
/// consumers expect.
mod comma_joined {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(labels: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&labels.join(", "))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        let joined = String::deserialize(deserializer)?;
        Ok(joined
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> CanonicalRow {
        CanonicalRow {
            source: "enero.csv".into(),
            company_code: "1020".into(),
            company_name: "Acme SA".into(),
            ledger_account: "2103011004".into(),
            amount: FieldValue::Number(-120.84),
            month: Some("Febrero".into()),
            related_count: 2,
            related_sources: vec!["enero.csv".into(), "enero_v2.csv".into()],
            extra: BTreeMap::from([("Fecha".to_string(), FieldValue::Text("2026-02-03".into()))]),
        }
    }

    #[test]
    fn serializes_with_wire_names() {
        let value = serde_json::to_value(row()).unwrap();
        assert_eq!(value["_source"], "enero.csv");
        assert_eq!(value["SociedadCodigo"], "1020");
        assert_eq!(value["MontoEstandarizado"], -120.84);
        assert_eq!(value["RelatedSources"], "enero.csv, enero_v2.csv");
        assert_eq!(value["Fecha"], "2026-02-03");
    }

    #[test]
    fn month_omitted_when_absent() {
        let mut r = row();
        r.month = None;
        let value = serde_json::to_value(r).unwrap();
        assert!(value.get("Mes").is_none());
    }

    #[test]
    fn deserializes_partial_rows() {
        let r: CanonicalRow =
            serde_json::from_str(r#"{"SociedadCodigo": "30", "MontoEstandarizado": "no es numero"}"#)
                .unwrap();
        assert_eq!(r.company_code, "30");
        assert_eq!(r.company_name, "");
        assert_eq!(r.related_count, 1);
        assert_eq!(r.amount, FieldValue::Text("no es numero".into()));
        assert_eq!(r.standardized_amount(), 0.0);
    }

    #[test]
    fn related_sources_round_trip() {
        let r: CanonicalRow =
            serde_json::from_str(r#"{"RelatedSources": "a.csv, b.csv"}"#).unwrap();
        assert_eq!(r.related_sources, vec!["a.csv", "b.csv"]);
    }

    #[test]
    fn blank_detection() {
        assert!(FieldValue::Empty.is_blank());
        assert!(FieldValue::Text("   ".into()).is_blank());
        assert!(!FieldValue::Text("x".into()).is_blank());
        assert!(!FieldValue::Number(0.0).is_blank());
    }
}
