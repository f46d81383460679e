// Consolida CLI - headless ledger-extract operations

mod exit_codes;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use consolida_engine::ingest::{company_mappings, load_csv_batch, split_directory};
use consolida_engine::{
    company_display_list, unify_batches, verify_rows, Batch, CompanyMapping, EngineError,
    VerifyConfig, VerifyReport,
};

use exit_codes::{EXIT_CONFIG_ERROR, EXIT_IO_ERROR, EXIT_PARSE_ERROR, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "consolida")]
#[command(about = "Unify and verify heterogeneous ledger extracts (headless)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Unify extracts into one deduplicated canonical dataset
    #[command(after_help = "\
A file whose name contains 'sociedad' is treated as the company directory
(code → name) rather than ledger data.

Examples:
  consolida unify enero.csv febrero.csv sociedades.csv
  consolida unify extractos/*.csv --json
  consolida unify extractos/*.csv --output unificado.json")]
    Unify {
        /// Input CSV files (extracts plus an optional directory file)
        files: Vec<PathBuf>,

        /// Output canonical rows as JSON to stdout
        #[arg(long)]
        json: bool,

        /// Write JSON output to file
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Unify extracts, then run the data-quality verification
    #[command(after_help = "\
Examples:
  consolida verify extractos/*.csv
  consolida verify extractos/*.csv --json
  consolida verify extractos/*.csv --issues-out issues.csv
  consolida verify extractos/*.csv --config umbrales.toml")]
    Verify {
        /// Input CSV files (extracts plus an optional directory file)
        files: Vec<PathBuf>,

        /// Output the verification report as JSON to stdout
        #[arg(long)]
        json: bool,

        /// Write the JSON report to file
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Export issues as CSV (originalIndex,column,severity,message)
        #[arg(long)]
        issues_out: Option<PathBuf>,

        /// TOML file overriding the verification thresholds
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List company display labels from the unified dataset
    #[command(after_help = "\
Examples:
  consolida companies extractos/*.csv sociedades.csv")]
    Companies {
        /// Input CSV files
        files: Vec<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Unify { files, json, output } => cmd_unify(&files, json, output),
        Commands::Verify {
            files,
            json,
            output,
            issues_out,
            config,
        } => cmd_verify(&files, json, output, issues_out, config),
        Commands::Companies { files } => cmd_companies(&files),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            eprintln!("error: {}", message);
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO_ERROR, message: msg.into(), hint: None }
    }
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        let code = match err {
            EngineError::Csv(_) => EXIT_PARSE_ERROR,
            EngineError::ConfigParse(_) | EngineError::ConfigValidation(_) => EXIT_CONFIG_ERROR,
        };
        Self { code, message: err.to_string(), hint: None }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_unify(files: &[PathBuf], json: bool, output: Option<PathBuf>) -> Result<(), CliError> {
    let (batches, mappings) = load_inputs(files)?;
    let rows = unify_batches(&batches, &mappings);

    if json || output.is_some() {
        let rendered = serde_json::to_string_pretty(&rows)
            .map_err(|e| CliError::io(format!("cannot serialize rows: {e}")))?;
        return write_or_print(output, &rendered);
    }

    let source_rows: usize = batches.iter().map(|b| b.rows.len()).sum();
    let companies = company_display_list(&rows);
    println!("batches: {}", batches.len());
    println!("source rows: {}", source_rows);
    println!("canonical rows: {}", rows.len());
    println!("merged records: {}", source_rows.saturating_sub(rows.len()));
    println!("companies: {}", companies.len());
    Ok(())
}

fn cmd_verify(
    files: &[PathBuf],
    json: bool,
    output: Option<PathBuf>,
    issues_out: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<(), CliError> {
    let config = match config_path {
        Some(path) => VerifyConfig::from_toml(&read_file_as_utf8(&path)?)?,
        None => VerifyConfig::default(),
    };

    let (batches, mappings) = load_inputs(files)?;
    let rows = unify_batches(&batches, &mappings);
    // The CLI always verifies the whole dataset, so the view is the identity.
    let index_map: Vec<usize> = (0..rows.len()).collect();
    let report = verify_rows(&rows, &index_map, &config);

    if let Some(path) = issues_out {
        write_issues_csv(&path, &report)?;
        eprintln!("issues exported to: {}", path.display());
    }

    if json || output.is_some() {
        let rendered = serde_json::to_string_pretty(&report)
            .map_err(|e| CliError::io(format!("cannot serialize report: {e}")))?;
        return write_or_print(output, &rendered);
    }

    println!("rows: {}", rows.len());
    println!("rows with issues: {}", report.rows_with_issues);
    println!("errors: {}", report.errors);
    println!("warnings: {}", report.warnings);
    println!("missing required: {}", report.missing_required);
    println!("invalid numbers: {}", report.invalid_numbers);
    println!("duplicates: {}", report.duplicates);
    println!("outliers: {}", report.outliers);
    println!("cross-field: {}", report.cross_field);
    println!("company IQR anomalies: {}", report.company_iqr_anomalies);
    println!("monthly anomalies: {}", report.monthly_anomalies);
    if !report.hot_columns.is_empty() {
        println!("hot columns: {}", report.hot_columns.join(", "));
    }
    Ok(())
}

fn cmd_companies(files: &[PathBuf]) -> Result<(), CliError> {
    let (batches, mappings) = load_inputs(files)?;
    let rows = unify_batches(&batches, &mappings);
    for label in company_display_list(&rows) {
        println!("{label}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Input loading
// ---------------------------------------------------------------------------

fn load_inputs(files: &[PathBuf]) -> Result<(Vec<Batch>, Vec<CompanyMapping>), CliError> {
    if files.is_empty() {
        return Err(CliError::args("at least one input file is required"));
    }

    let mut batches = Vec::with_capacity(files.len());
    for path in files {
        let text = read_file_as_utf8(path)?;
        batches.push(load_csv_batch(&label_for(path), &text)?);
    }

    let (data, directory) = split_directory(batches);
    let mappings = directory.as_ref().map(company_mappings).unwrap_or_default();
    Ok((data, mappings))
}

/// Batch label = file name; directory detection keys off it.
fn label_for(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Read file and convert to UTF-8 if needed (Excel-exported extracts are
/// commonly Windows-1252).
fn read_file_as_utf8(path: &Path) -> Result<String, CliError> {
    let mut file = std::fs::File::open(path)
        .map_err(|e| CliError::io(format!("cannot read {}: {e}", path.display())))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| CliError::io(format!("cannot read {}: {e}", path.display())))?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn write_or_print(output: Option<PathBuf>, rendered: &str) -> Result<(), CliError> {
    match output {
        Some(path) => std::fs::write(&path, rendered)
            .map_err(|e| CliError::io(format!("cannot write {}: {e}", path.display()))),
        None => {
            println!("{rendered}");
            Ok(())
        }
    }
}

/// One record per issue, keyed by the row's index in the full dataset.
fn write_issues_csv(path: &Path, report: &VerifyReport) -> Result<(), CliError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| CliError::io(format!("cannot write {}: {e}", path.display())))?;

    writer
        .write_record(["originalIndex", "column", "severity", "message"])
        .map_err(|e| CliError::io(format!("write error: {e}")))?;
    for (index, issues) in &report.by_index {
        for issue in issues {
            writer
                .write_record([
                    index.to_string(),
                    issue.column.clone(),
                    issue.severity.to_string(),
                    issue.message.clone(),
                ])
                .map_err(|e| CliError::io(format!("write error: {e}")))?;
        }
    }
    writer
        .flush()
        .map_err(|e| CliError::io(format!("write error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use consolida_engine::{CanonicalRow, FieldValue};

    fn unified_rows(csv_text: &str) -> Vec<CanonicalRow> {
        let batch = load_csv_batch("extracto.csv", csv_text).unwrap();
        unify_batches(&[batch], &[])
    }

    #[test]
    fn issues_csv_round_trips() {
        let rows = unified_rows("Soc.;SociedadNombre;Libro Mayor;Importe en ML\n;;9000;1,00\n");
        let report = verify_rows(&rows, &[5], &VerifyConfig::default());
        assert_eq!(report.missing_required, 2);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issues.csv");
        write_issues_csv(&path, &report).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut reader = csv::Reader::from_reader(content.as_bytes());
        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get(0), Some("5"));
        assert_eq!(records[0].get(2), Some("error"));
        assert_eq!(records[0].get(3), Some("Campo requerido vacío"));
    }

    #[test]
    fn labels_come_from_file_names() {
        assert_eq!(label_for(Path::new("/tmp/datos/Sociedades.csv")), "Sociedades.csv");
        assert_eq!(label_for(Path::new("enero.csv")), "enero.csv");
    }

    #[test]
    fn windows_1252_files_are_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latin.csv");
        // "Año" in Windows-1252: the ñ is a bare 0xF1 byte.
        std::fs::write(&path, b"A\xf1o,Valor\n2026,1\n").unwrap();
        let text = read_file_as_utf8(&path).unwrap();
        assert!(text.starts_with("Año"));
    }

    #[test]
    fn unified_rows_serialize_with_wire_names() {
        let rows = unified_rows("Soc.;Libro Mayor;Importe en ML\n1020;9000;-1,50\n");
        assert_eq!(rows[0].amount, FieldValue::Number(-1.5));
        let value = serde_json::to_value(&rows).unwrap();
        assert_eq!(value[0]["SociedadCodigo"], "1020");
        assert_eq!(value[0]["MontoEstandarizado"], -1.5);
    }
}
