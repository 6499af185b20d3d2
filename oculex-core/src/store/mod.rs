//! Append-only tabular result store.
//!
//! Records are partitioned into one sheet per test category; every sheet's
//! first row is its header and data rows keep write order. The whole book is
//! held in memory and flushed to a single JSON document after each mutation,
//! so readers always see an immutable snapshot between two flushes.

pub mod schema;

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::session::EventPayload;
use schema::{NOTES_HEADERS, NOTES_SHEET, TestCategory};

/// One stored row: cell values in the owning sheet's schema order.
pub type Row = Vec<Value>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Workbook {
    sheets: BTreeMap<String, Vec<Row>>,
}

impl Workbook {
    /// Insert the sheet with its header row if absent. Never touches
    /// existing rows, so re-initialization cannot duplicate headers.
    fn ensure_sheet(&mut self, title: &str, headers: Vec<Value>) {
        self.sheets
            .entry(title.to_string())
            .or_insert_with(|| vec![headers]);
    }
}

/// Durable, append-only store of test records and clinician notes.
///
/// All mutations serialize on one store-wide write lock held across
/// "find next position, append, flush"; history reads only take the shared
/// side and may observe a state between two flushes.
pub struct ResultStore {
    /// Workbook location; `None` means the store runs memory-only after a
    /// failed load and never touches the medium again.
    path: Option<PathBuf>,
    book: RwLock<Workbook>,
}

impl std::fmt::Debug for ResultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultStore")
            .field("path", &self.path)
            .field("sheet_count", &self.sheet_count())
            .finish()
    }
}

impl ResultStore {
    /// Open the workbook at `path`, creating it on first use.
    ///
    /// An unreadable or corrupt workbook degrades to a memory-only store
    /// rather than failing: the existing file is left untouched and every
    /// subsequent operation keeps working without persistence.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let store = match load_workbook(&path) {
            Ok(book) => Self {
                path: Some(path),
                book: RwLock::new(book),
            },
            Err(err) => {
                error!(path = %path.display(), error = %err, "error opening workbook, continuing in memory");
                Self::in_memory()
            }
        };

        if let Err(err) = store.initialize() {
            error!(error = %err, "error initializing workbook");
        }
        store
    }

    /// A store that never persists. Used for tests and as the degraded mode
    /// after a failed open.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            book: RwLock::new(Workbook::default()),
        }
    }

    /// Ensure every declared category sheet exists with its header row,
    /// then flush. Idempotent: existing sheets and rows are never altered.
    pub fn initialize(&self) -> Result<()> {
        let mut book = self.book.write();
        for category in TestCategory::declared() {
            book.ensure_sheet(category.sheet_title(), category.header_row());
        }
        book.ensure_sheet(
            NOTES_SHEET,
            NOTES_HEADERS.iter().copied().map(Value::from).collect(),
        );
        self.flush_locked(&book)?;

        if let Some(path) = &self.path {
            info!(path = %path.display(), "workbook initialized");
        }
        Ok(())
    }

    /// Append one test record.
    ///
    /// The category name resolves against the declared set, provisioning a
    /// generic single-field sheet for unknown names. Missing payload fields
    /// take their documented defaults, and the accuracy column is always
    /// derived from `correct_points` / `total_points` at write time.
    ///
    /// On a flush failure the row stays appended in memory and the error is
    /// returned; the store itself remains usable.
    pub fn submit_record(
        &self,
        category: &str,
        patient_name: &str,
        fields: &EventPayload,
    ) -> Result<()> {
        let category = TestCategory::from_name(category);
        let row = build_record_row(&category, patient_name, fields);

        let mut book = self.book.write();
        book.ensure_sheet(category.sheet_title(), category.header_row());
        if let Some(rows) = book.sheets.get_mut(category.sheet_title()) {
            rows.push(row);
        }
        self.flush_locked(&book).inspect_err(|err| {
            error!(category = %category, error = %err, "error saving test result");
        })?;
        drop(book);

        info!(category = %category, patient = patient_name, "saved test result");
        Ok(())
    }

    /// Append one clinician note against the notes sheet. The `Date` cell is
    /// generated at call time unless the payload supplies a `timestamp`.
    pub fn submit_note(&self, patient_name: &str, fields: &EventPayload) -> Result<()> {
        let timestamp = fields
            .get("timestamp")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Local::now().format("%Y-%m-%d %H:%M:%S").to_string());

        let row: Row = vec![
            Value::from(patient_name),
            Value::from(timestamp),
            text_cell(fields, "symptoms"),
            text_cell(fields, "medical_concerns"),
            text_cell(fields, "additional_notes"),
        ];

        let mut book = self.book.write();
        book.ensure_sheet(
            NOTES_SHEET,
            NOTES_HEADERS.iter().copied().map(Value::from).collect(),
        );
        if let Some(rows) = book.sheets.get_mut(NOTES_SHEET) {
            rows.push(row);
        }
        self.flush_locked(&book).inspect_err(|err| {
            error!(patient = patient_name, error = %err, "error saving doctor notes");
        })?;
        drop(book);

        info!(patient = patient_name, "saved doctor notes");
        Ok(())
    }

    /// All stored test rows for one patient, keyed by sheet title.
    ///
    /// Scans every sheet except the notes sheet, matching rows on the first
    /// column and preserving write order; categories without matches are
    /// omitted. Never mutates the store, and a malformed sheet is skipped
    /// rather than failing the whole call.
    pub fn get_patient_history(&self, patient_name: &str) -> HashMap<String, Vec<Row>> {
        let book = self.book.read();
        let mut history = HashMap::new();

        for (title, rows) in &book.sheets {
            if title == NOTES_SHEET {
                continue;
            }
            let Some(data_rows) = rows.get(1..) else {
                warn!(sheet = %title, "sheet is missing its header row, skipping");
                continue;
            };

            let matches: Vec<Row> = data_rows
                .iter()
                .filter(|row| {
                    row.first().and_then(Value::as_str) == Some(patient_name)
                })
                .cloned()
                .collect();
            if !matches.is_empty() {
                history.insert(title.clone(), matches);
            }
        }

        history
    }

    /// Number of sheets currently in the workbook.
    pub fn sheet_count(&self) -> usize {
        self.book.read().sheets.len()
    }

    /// Whether mutations are being flushed to a backing file.
    pub fn is_durable(&self) -> bool {
        self.path.is_some()
    }

    /// Workbook location, when the store is durable.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write the whole book to disk, replacing the previous file atomically
    /// so readers of the path never observe a half-written document.
    fn flush_locked(&self, book: &Workbook) -> Result<()> {
        let Some(path) = &self.path else {
            debug!("memory-only store, skipping flush");
            return Ok(());
        };

        let json = serde_json::to_vec_pretty(book)?;
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let mut file = tempfile::NamedTempFile::new_in(dir.unwrap_or(Path::new(".")))?;
        file.write_all(&json)?;
        file.persist(path).map_err(|err| err.error)?;
        Ok(())
    }
}

fn load_workbook(path: &Path) -> Result<Workbook> {
    if !path.exists() {
        return Ok(Workbook::default());
    }
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Build a record row in schema order: the common columns, then the
/// category's extra columns.
fn build_record_row(
    category: &TestCategory,
    patient_name: &str,
    fields: &EventPayload,
) -> Row {
    let now = Local::now();
    let now_time = now.format("%H:%M:%S").to_string();

    let total_points = number(fields, "total_points");
    let correct_points = number(fields, "correct_points");
    let accuracy = if total_points > 0.0 {
        round2(correct_points / total_points * 100.0)
    } else {
        0.0
    };

    let mut row: Row = vec![
        Value::from(patient_name),
        Value::from(now.format("%Y-%m-%d").to_string()),
        fields
            .get("start_time")
            .cloned()
            .unwrap_or_else(|| Value::from(now_time.clone())),
        fields
            .get("end_time")
            .cloned()
            .unwrap_or_else(|| Value::from(now_time)),
        fields.get("duration").cloned().unwrap_or_else(|| Value::from(0)),
        fields
            .get("total_points")
            .cloned()
            .unwrap_or_else(|| Value::from(0)),
        fields
            .get("correct_points")
            .cloned()
            .unwrap_or_else(|| Value::from(0)),
        Value::from(accuracy),
        text_cell(fields, "doctor_notes"),
    ];
    row.extend(category.extra_fields().iter().map(|field| field.cell(fields)));
    row
}

fn number(fields: &EventPayload, key: &str) -> f64 {
    fields.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn text_cell(fields: &EventPayload, key: &str) -> Value {
    fields
        .get(key)
        .cloned()
        .unwrap_or_else(|| Value::from(String::new()))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::schema::COMMON_HEADERS;
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn payload(entries: &[(&str, Value)]) -> EventPayload {
        entries
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn initialize_provisions_every_declared_sheet() {
        let store = ResultStore::in_memory();
        store.initialize().unwrap();

        // Seven test categories plus the notes sheet.
        assert_eq!(store.sheet_count(), 8);
    }

    #[test]
    fn accuracy_is_derived_and_rounded_to_two_decimals() {
        let store = ResultStore::in_memory();
        store.initialize().unwrap();

        store
            .submit_record(
                "visual_field",
                "Jane Doe",
                &payload(&[
                    ("total_points", json!(54)),
                    ("correct_points", json!(48)),
                ]),
            )
            .unwrap();

        let history = store.get_patient_history("Jane Doe");
        let rows = &history["Visual Field"];
        assert_eq!(rows[0][7], json!(88.89));
    }

    #[test]
    fn zero_total_points_stores_zero_accuracy() {
        let store = ResultStore::in_memory();
        store.initialize().unwrap();

        store
            .submit_record(
                "motion",
                "Jane Doe",
                &payload(&[("total_points", json!(0)), ("correct_points", json!(0))]),
            )
            .unwrap();

        let history = store.get_patient_history("Jane Doe");
        assert_eq!(history["Motion Detection"][0][7], json!(0.0));
    }

    #[test]
    fn rows_append_in_call_order() {
        let store = ResultStore::in_memory();
        store.initialize().unwrap();

        for index in 0..5 {
            store
                .submit_record(
                    "sparcs",
                    "Jane Doe",
                    &payload(&[("duration", json!(index))]),
                )
                .unwrap();
            // Interleaved writes to another category must not disturb order.
            store
                .submit_record("edge", "Jane Doe", &payload(&[]))
                .unwrap();
        }

        let history = store.get_patient_history("Jane Doe");
        let durations: Vec<_> =
            history["SPARCS"].iter().map(|row| row[4].clone()).collect();
        assert_eq!(durations, vec![json!(0), json!(1), json!(2), json!(3), json!(4)]);
    }

    #[test]
    fn missing_fields_take_documented_defaults() {
        let store = ResultStore::in_memory();
        store.initialize().unwrap();

        store
            .submit_record("csv1000", "Jane Doe", &payload(&[]))
            .unwrap();

        let history = store.get_patient_history("Jane Doe");
        let row = &history["CSV-1000"][0];
        assert_eq!(row[4], json!(0)); // duration
        assert_eq!(row[7], json!(0.0)); // accuracy
        assert_eq!(row[8], json!("")); // doctor notes
        assert_eq!(row[9], json!("English")); // language
        assert_eq!(row[10], json!("[]")); // contrast levels
    }

    #[test]
    fn unknown_categories_are_provisioned_on_first_use() {
        let store = ResultStore::in_memory();
        store.initialize().unwrap();

        store
            .submit_record(
                "stereo_acuity",
                "Jane Doe",
                &payload(&[("specific_data", json!({"depth": 3}))]),
            )
            .unwrap();

        let history = store.get_patient_history("Jane Doe");
        let rows = &history["stereo_acuity"];
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][COMMON_HEADERS.len()], json!(r#"{"depth":3}"#));
    }

    #[test]
    fn history_is_scoped_to_the_requested_patient() {
        let store = ResultStore::in_memory();
        store.initialize().unwrap();

        store
            .submit_record("edge", "Jane Doe", &payload(&[]))
            .unwrap();
        store
            .submit_record("edge", "John Roe", &payload(&[]))
            .unwrap();

        let history = store.get_patient_history("Jane Doe");
        assert_eq!(history["Edge Detection"].len(), 1);
        assert_eq!(history["Edge Detection"][0][0], json!("Jane Doe"));
    }

    #[test]
    fn history_never_includes_the_notes_sheet() {
        let store = ResultStore::in_memory();
        store.initialize().unwrap();

        store
            .submit_note(
                "Jane Doe",
                &payload(&[("symptoms", json!("blurred vision"))]),
            )
            .unwrap();

        assert!(store.get_patient_history("Jane Doe").is_empty());
    }

    #[test]
    fn notes_generate_a_timestamp_when_absent() {
        let store = ResultStore::in_memory();
        store.initialize().unwrap();

        store
            .submit_note("Jane Doe", &payload(&[("symptoms", json!("halos"))]))
            .unwrap();

        let book = store.book.read();
        let rows = &book.sheets[NOTES_SHEET];
        assert_eq!(rows.len(), 2);
        let stamp = rows[1][1].as_str().unwrap();
        assert_eq!(stamp.len(), "2026-01-01 00:00:00".len());
        assert_eq!(rows[1][2], json!("halos"));
    }

    #[test]
    fn categories_with_no_matches_are_omitted() {
        let store = ResultStore::in_memory();
        store.initialize().unwrap();

        store
            .submit_record("sparcs", "Jane Doe", &payload(&[]))
            .unwrap();

        let history = store.get_patient_history("Jane Doe");
        assert_eq!(history.len(), 1);
        assert!(!history.contains_key("Visual Field"));
    }

    #[test]
    fn reopening_preserves_rows_and_never_duplicates_headers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");

        {
            let store = ResultStore::open(&path);
            assert!(store.is_durable());
            store
                .submit_record(
                    "pelli_robinson",
                    "Jane Doe",
                    &payload(&[
                        ("total_points", json!(20)),
                        ("correct_points", json!(17)),
                    ]),
                )
                .unwrap();
        }

        let reopened = ResultStore::open(&path);
        let history = reopened.get_patient_history("Jane Doe");
        assert_eq!(history["Pelli-Robinson"].len(), 1);
        assert_eq!(history["Pelli-Robinson"][0][7], json!(85.0));

        // Header row stayed singular across the reopen.
        let book = reopened.book.read();
        let rows = &book.sheets["Pelli-Robinson"];
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], json!("Patient Name"));
    }

    #[test]
    fn corrupt_workbooks_degrade_to_memory_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");
        std::fs::write(&path, b"not json").unwrap();

        let store = ResultStore::open(&path);
        assert!(!store.is_durable());
        store
            .submit_record("edge", "Jane Doe", &payload(&[]))
            .unwrap();

        // The corrupt file was left untouched.
        assert_eq!(std::fs::read(&path).unwrap(), b"not json");
    }

    #[test]
    fn concurrent_writers_keep_per_category_row_order() {
        use std::sync::Arc;

        let store = Arc::new(ResultStore::in_memory());
        store.initialize().unwrap();

        let handles: Vec<_> = ["sparcs", "edge", "motion", "pattern"]
            .into_iter()
            .map(|category| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for index in 0..20 {
                        store
                            .submit_record(
                                category,
                                "Jane Doe",
                                &payload(&[("duration", json!(index))]),
                            )
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let history = store.get_patient_history("Jane Doe");
        for rows in history.values() {
            let durations: Vec<_> =
                rows.iter().map(|row| row[4].as_i64().unwrap()).collect();
            let mut sorted = durations.clone();
            sorted.sort_unstable();
            assert_eq!(durations, sorted);
            assert_eq!(durations.len(), 20);
        }
    }
}
