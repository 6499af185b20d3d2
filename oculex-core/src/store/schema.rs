use serde_json::Value;

use crate::session::EventPayload;

/// Sheet reserved for clinician notes; excluded from patient history scans.
pub const NOTES_SHEET: &str = "Doctor Notes";

/// Column titles shared by every test category, in schema order.
pub const COMMON_HEADERS: [&str; 9] = [
    "Patient Name",
    "Test Date",
    "Start Time",
    "End Time",
    "Duration (seconds)",
    "Total Points",
    "Correct Points",
    "Accuracy (%)",
    "Doctor Notes",
];

/// Column titles of the notes sheet, in schema order.
pub const NOTES_HEADERS: [&str; 5] = [
    "Patient Name",
    "Date",
    "Symptoms",
    "Medical Concerns",
    "Additional Notes",
];

/// A named kind of clinical test.
///
/// The set is fixed at store initialization, but unrecognized names resolve
/// to [`TestCategory::Custom`] and get a generic schema on first use instead
/// of being rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TestCategory {
    VisualField,
    Csv1000,
    Edge,
    Motion,
    Pattern,
    PelliRobinson,
    Sparcs,
    Custom(String),
}

impl TestCategory {
    /// Categories provisioned with header rows when the store initializes.
    pub fn declared() -> &'static [TestCategory] {
        DECLARED_CATEGORIES
    }

    /// Resolve a submitted category name, falling back to a custom category
    /// carrying the raw name.
    pub fn from_name(name: &str) -> Self {
        match name {
            "visual_field" => TestCategory::VisualField,
            "csv1000" => TestCategory::Csv1000,
            "edge" => TestCategory::Edge,
            "motion" => TestCategory::Motion,
            "pattern" => TestCategory::Pattern,
            "pelli_robinson" => TestCategory::PelliRobinson,
            "sparcs" => TestCategory::Sparcs,
            other => TestCategory::Custom(other.to_string()),
        }
    }

    /// Sheet title the category's records are appended under.
    pub fn sheet_title(&self) -> &str {
        match self {
            TestCategory::VisualField => "Visual Field",
            TestCategory::Csv1000 => "CSV-1000",
            TestCategory::Edge => "Edge Detection",
            TestCategory::Motion => "Motion Detection",
            TestCategory::Pattern => "Pattern Recognition",
            TestCategory::PelliRobinson => "Pelli-Robinson",
            TestCategory::Sparcs => "SPARCS",
            TestCategory::Custom(name) => name,
        }
    }

    /// Category-specific columns appended after the common field list.
    pub fn extra_fields(&self) -> &'static [ExtraField] {
        match self {
            TestCategory::VisualField => VISUAL_FIELD_EXTRAS,
            TestCategory::Csv1000 => CSV1000_EXTRAS,
            TestCategory::PelliRobinson => PELLI_ROBINSON_EXTRAS,
            TestCategory::Sparcs => SPARCS_EXTRAS,
            // Edge, motion, and pattern never grew dedicated columns; they
            // share the generic single-field schema with custom categories.
            TestCategory::Edge
            | TestCategory::Motion
            | TestCategory::Pattern
            | TestCategory::Custom(_) => GENERIC_EXTRAS,
        }
    }

    /// Header row for the category: common titles plus category extras.
    pub fn header_row(&self) -> Vec<Value> {
        COMMON_HEADERS
            .iter()
            .copied()
            .chain(self.extra_fields().iter().map(|field| field.title))
            .map(Value::from)
            .collect()
    }
}

impl std::fmt::Display for TestCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.sheet_title())
    }
}

const DECLARED_CATEGORIES: &[TestCategory] = &[
    TestCategory::VisualField,
    TestCategory::Csv1000,
    TestCategory::Edge,
    TestCategory::Motion,
    TestCategory::Pattern,
    TestCategory::PelliRobinson,
    TestCategory::Sparcs,
];

const VISUAL_FIELD_EXTRAS: &[ExtraField] = &[
    ExtraField::number("points_tested", "Points Tested"),
    ExtraField::list("sensitivity_map", "Sensitivity Map"),
    ExtraField::number("defects_detected", "Defects Detected"),
];

const CSV1000_EXTRAS: &[ExtraField] = &[
    ExtraField::text("language", "Language", "English"),
    ExtraField::list("contrast_levels", "Contrast Levels"),
    ExtraField::number("letter_accuracy", "Letter Accuracy"),
];

const PELLI_ROBINSON_EXTRAS: &[ExtraField] = &[
    ExtraField::text("language", "Language", "English"),
    ExtraField::number("contrast_sensitivity", "Contrast Sensitivity"),
    ExtraField::number("log_units", "Log Units"),
];

const SPARCS_EXTRAS: &[ExtraField] = &[
    ExtraField::number("quadrant_1", "Quadrant 1"),
    ExtraField::number("quadrant_2", "Quadrant 2"),
    ExtraField::number("quadrant_3", "Quadrant 3"),
    ExtraField::number("quadrant_4", "Quadrant 4"),
];

const GENERIC_EXTRAS: &[ExtraField] =
    &[ExtraField::rendered("specific_data", "Test Specific Data")];

/// How a category-specific column sources and defaults its cell value.
#[derive(Debug, Clone, Copy)]
enum FieldKind {
    /// Numeric reading, defaults to 0.
    Number,
    /// Text taken as-is, with a fixed default.
    Text(&'static str),
    /// Sequence rendered to text, defaults to an empty sequence.
    List,
    /// Any value rendered to text, defaults to empty.
    Rendered,
}

/// One category-specific column: payload key, sheet title, and default.
#[derive(Debug, Clone, Copy)]
pub struct ExtraField {
    pub key: &'static str,
    pub title: &'static str,
    kind: FieldKind,
}

impl ExtraField {
    const fn number(key: &'static str, title: &'static str) -> Self {
        Self { key, title, kind: FieldKind::Number }
    }

    const fn text(key: &'static str, title: &'static str, default: &'static str) -> Self {
        Self { key, title, kind: FieldKind::Text(default) }
    }

    const fn list(key: &'static str, title: &'static str) -> Self {
        Self { key, title, kind: FieldKind::List }
    }

    const fn rendered(key: &'static str, title: &'static str) -> Self {
        Self { key, title, kind: FieldKind::Rendered }
    }

    /// Build the cell value for this column from a submitted payload.
    pub fn cell(&self, fields: &EventPayload) -> Value {
        let value = fields.get(self.key);
        match self.kind {
            FieldKind::Number => value.cloned().unwrap_or_else(|| Value::from(0)),
            FieldKind::Text(default) => {
                value.cloned().unwrap_or_else(|| Value::from(default))
            }
            FieldKind::List => Value::from(
                value.map(render_text).unwrap_or_else(|| "[]".to_string()),
            ),
            FieldKind::Rendered => Value::from(
                value.map(render_text).unwrap_or_default(),
            ),
        }
    }
}

/// Render a payload value as cell text; strings pass through unquoted.
fn render_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_names_resolve_to_declared_categories() {
        assert_eq!(
            TestCategory::from_name("visual_field"),
            TestCategory::VisualField
        );
        assert_eq!(
            TestCategory::from_name("pelli_robinson").sheet_title(),
            "Pelli-Robinson"
        );
    }

    #[test]
    fn unknown_names_become_custom_categories() {
        let category = TestCategory::from_name("stereo_acuity");
        assert_eq!(category, TestCategory::Custom("stereo_acuity".into()));
        assert_eq!(category.sheet_title(), "stereo_acuity");
        assert_eq!(category.extra_fields().len(), 1);
    }

    #[test]
    fn header_rows_prefix_the_common_columns() {
        let headers = TestCategory::Sparcs.header_row();
        assert_eq!(headers.len(), COMMON_HEADERS.len() + 4);
        assert_eq!(headers[0], json!("Patient Name"));
        assert_eq!(headers[9], json!("Quadrant 1"));
    }

    #[test]
    fn list_fields_render_sequences_as_text() {
        let field = ExtraField::list("sensitivity_map", "Sensitivity Map");

        let mut fields = crate::EventPayload::new();
        assert_eq!(field.cell(&fields), json!("[]"));

        fields.insert("sensitivity_map".into(), json!([1, 2, 3]));
        assert_eq!(field.cell(&fields), json!("[1,2,3]"));
    }

    #[test]
    fn text_fields_carry_their_declared_default() {
        let fields = crate::EventPayload::new();
        let language = ExtraField::text("language", "Language", "English");
        assert_eq!(language.cell(&fields), json!("English"));
    }
}
