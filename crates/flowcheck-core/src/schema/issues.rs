//! Issue-set (JSONL) schema validation.
//!
//! The first non-blank line is the Meta header, every later non-blank line is
//! one issue record. Each line is inspected as a raw JSON object against a
//! static field table so every defect on the line is reported in one pass.
//! A record line with no schema or enum errors is then deserialized into the
//! typed [`IssueRecord`].
//!
//! Graph nodes are built from every line with a usable `id`, not just the
//! clean ones, so one bad enum value does not surface as dangling references
//! on the records that depend on it.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::graph::Node;
use crate::jsonl;
use crate::model::{GitState, IssueRecord, IssueSet, Meta, Phase, Priority, StageState};
use crate::report::{Category, Finding, Severity};
use crate::resolve::resolve_under;

/// `path:line` or `path:start-end`.
static REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+):(\d+)(?:-(\d+))?$").expect("ref pattern is valid"));

// ---------------------------------------------------------------------------
// Field table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum FieldKind {
    Text,
    Number,
    Count,
    Flag,
    TextList,
    Enum(&'static [&'static str]),
}

impl FieldKind {
    const fn describe(self) -> &'static str {
        match self {
            Self::Text | Self::Enum(_) => "a string",
            Self::Number => "a number",
            Self::Count => "a non-negative integer",
            Self::Flag => "a boolean",
            Self::TextList => "an array of strings",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FieldSpec {
    name: &'static str,
    kind: FieldKind,
}

const fn field(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind }
}

const RECORD_FIELDS: [FieldSpec; 19] = [
    field("id", FieldKind::Text),
    field("priority", FieldKind::Enum(&Priority::VALUES)),
    field("phase", FieldKind::Number),
    field("area", FieldKind::Text),
    field("title", FieldKind::Text),
    field("description", FieldKind::Text),
    field("depends_on", FieldKind::TextList),
    field("acceptance_criteria", FieldKind::Text),
    field("test_approach", FieldKind::Text),
    field("review_initial_requirements", FieldKind::Text),
    field("review_regression_requirements", FieldKind::Text),
    field("dev_state", FieldKind::Enum(&StageState::VALUES)),
    field("review_initial_state", FieldKind::Enum(&StageState::VALUES)),
    field("review_regression_state", FieldKind::Enum(&StageState::VALUES)),
    field("git_state", FieldKind::Enum(&GitState::VALUES)),
    field("blocked", FieldKind::Flag),
    field("owner", FieldKind::Text),
    field("refs", FieldKind::TextList),
    field("notes", FieldKind::Text),
];

const META_FIELDS: [FieldSpec; 5] = [
    field("plan", FieldKind::Text),
    field("goal", FieldKind::Text),
    field("tech_stack", FieldKind::Text),
    field("source", FieldKind::Text),
    field("total_issues", FieldKind::Count),
];

const META_OPTIONAL: [&str; 4] = ["type", "execution_context", "schema_version", "archived"];

/// Check one field's presence and primitive type.
fn check_field(obj: &Map<String, Value>, spec: FieldSpec, loc: &Loc<'_>, out: &mut Vec<Finding>) {
    let Some(value) = obj.get(spec.name) else {
        out.push(loc.error(Category::Schema, spec.name, format!("missing required field '{}'", spec.name)));
        return;
    };

    let type_ok = match spec.kind {
        FieldKind::Text | FieldKind::Enum(_) => value.is_string(),
        FieldKind::Number => value.is_number(),
        FieldKind::Count => value.as_u64().is_some(),
        FieldKind::Flag => value.is_boolean(),
        FieldKind::TextList => value
            .as_array()
            .is_some_and(|items| items.iter().all(Value::is_string)),
    };
    if !type_ok {
        out.push(loc.error(
            Category::Schema,
            spec.name,
            format!("field '{}' must be {}", spec.name, spec.kind.describe()),
        ));
        return;
    }

    if let (FieldKind::Enum(allowed), Some(text)) = (spec.kind, value.as_str()) {
        if !allowed.contains(&text) {
            out.push(loc.error(
                Category::Enum,
                spec.name,
                format!(
                    "invalid {} '{text}' (expected one of: {})",
                    spec.name,
                    allowed.join(", ")
                ),
            ));
        }
    }
}

/// Location context for one line.
struct Loc<'a> {
    at: String,
    record: Option<&'a str>,
}

impl Loc<'_> {
    fn error(&self, category: Category, field: &str, message: String) -> Finding {
        self.tag(Finding::error(category, self.at.clone(), message).field(field))
    }

    fn warning(&self, category: Category, field: &str, message: String) -> Finding {
        self.tag(Finding::warning(category, self.at.clone(), message).field(field))
    }

    fn info(&self, field: &str, message: String) -> Finding {
        self.tag(Finding::info(self.at.clone(), message).field(field))
    }

    fn tag(&self, finding: Finding) -> Finding {
        match self.record {
            Some(id) => finding.record(id),
            None => finding,
        }
    }
}

// ---------------------------------------------------------------------------
// Parse result
// ---------------------------------------------------------------------------

/// Inputs that are not part of the file itself.
#[derive(Debug, Clone, Copy)]
pub struct IssueSchema<'a> {
    /// Label used in finding locations, usually the file path.
    pub label: &'a str,
    /// Root under which `refs` paths are resolved.
    pub project_root: &'a Path,
    pub supported_versions: &'a [u64],
}

/// A typed record and the physical line it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedRecord {
    pub line: usize,
    pub record: IssueRecord,
}

/// Everything the schema pass learned about an issue set.
#[derive(Debug, Clone, Default)]
pub struct ParsedIssues {
    /// Physical line of the Meta header.
    pub meta_line: Option<usize>,
    /// Typed header, when the Meta line is schema-clean.
    pub meta: Option<Meta>,
    /// Raw `execution_context` value, whatever its shape.
    pub execution_context: Option<Value>,
    /// Number of non-blank lines after the Meta line.
    pub issue_lines: usize,
    /// Schema-clean records in file order.
    pub records: Vec<LocatedRecord>,
    /// One node per line with a usable id, for cycle and order analysis.
    pub nodes: Vec<Node>,
    pub findings: Vec<Finding>,
}

impl ParsedIssues {
    /// `true` when every issue line produced a typed record.
    #[must_use]
    pub fn is_fully_typed(&self) -> bool {
        self.meta.is_some() && self.records.len() == self.issue_lines
    }

    /// The typed issue set, when every line produced a typed value.
    #[must_use]
    pub fn into_set(self) -> Option<IssueSet> {
        if !self.is_fully_typed() {
            return None;
        }
        Some(IssueSet {
            meta: self.meta?,
            records: self.records.into_iter().map(|located| located.record).collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate an issue set and collect every finding.
#[must_use]
pub fn parse_issues(content: &str, schema: &IssueSchema<'_>) -> ParsedIssues {
    let mut parsed = ParsedIssues::default();
    let lines: Vec<jsonl::Line<'_>> = jsonl::records(content).collect();

    let Some((header, body)) = lines.split_first() else {
        parsed
            .findings
            .push(Finding::error(Category::Schema, schema.label, "issue file is empty"));
        return parsed;
    };

    parsed.meta_line = Some(header.number);
    parsed.issue_lines = body.len();
    let meta_loc = Loc {
        at: format!("{}:{}", schema.label, header.number),
        record: None,
    };

    match jsonl::parse_object(header.text) {
        Ok(obj) => check_meta(&obj, body.len(), schema, &meta_loc, &mut parsed),
        Err(e) => parsed
            .findings
            .push(Finding::error(Category::Schema, meta_loc.at.clone(), e.to_string())),
    }

    if body.is_empty() {
        parsed.findings.push(Finding::error(
            Category::Schema,
            schema.label,
            "no issue rows after meta",
        ));
        return parsed;
    }

    let mut rows: Vec<(usize, Map<String, Value>)> = Vec::with_capacity(body.len());
    for line in body {
        match jsonl::parse_object(line.text) {
            Ok(obj) => rows.push((line.number, obj)),
            Err(e) => parsed.findings.push(Finding::error(
                Category::Schema,
                format!("{}:{}", schema.label, line.number),
                e.to_string(),
            )),
        }
    }

    let known_ids: HashSet<&str> = rows
        .iter()
        .filter_map(|(_, obj)| usable_id(obj))
        .collect();
    let mut seen: HashSet<&str> = HashSet::new();

    for (number, obj) in &rows {
        let id = usable_id(obj);
        let loc = Loc {
            at: format!("{}:{number}", schema.label),
            record: id,
        };
        let before = parsed.findings.len();
        check_record(obj, schema, &loc, &mut parsed.findings);

        if let Some(id) = id {
            if !seen.insert(id) {
                parsed.findings.push(loc.error(
                    Category::Reference,
                    "id",
                    format!("duplicate issue id '{id}'"),
                ));
            }
            check_dependencies(id, obj, &known_ids, &loc, &mut parsed.findings);
            parsed.nodes.push(node_from_raw(id, obj));
        }

        let clean = parsed.findings[before..].iter().all(|f| {
            !matches!(f.category, Category::Schema | Category::Enum)
                || f.severity != Severity::Error
        });
        if clean {
            match serde_json::from_value::<IssueRecord>(Value::Object(obj.clone())) {
                Ok(record) => parsed.records.push(LocatedRecord {
                    line: *number,
                    record,
                }),
                Err(e) => parsed.findings.push(loc.error(
                    Category::Schema,
                    "id",
                    format!("record does not match the issue schema: {e}"),
                )),
            }
        }
    }

    parsed
}

fn check_meta(
    obj: &Map<String, Value>,
    issue_lines: usize,
    schema: &IssueSchema<'_>,
    loc: &Loc<'_>,
    parsed: &mut ParsedIssues,
) {
    let out = &mut parsed.findings;
    let before = out.len();

    if obj.get("type").and_then(Value::as_str) != Some(Meta::KIND) {
        out.push(loc.error(Category::Schema, "type", "first line must have type=meta".to_string()));
    }
    for spec in META_FIELDS {
        check_field(obj, spec, loc, out);
    }

    if let Some(declared) = obj.get("total_issues").and_then(Value::as_u64) {
        if usize::try_from(declared).ok() != Some(issue_lines) {
            out.push(loc.error(
                Category::Schema,
                "total_issues",
                format!("Meta total_issues={declared} does not match actual={issue_lines}"),
            ));
        }
    }

    match obj.get("schema_version") {
        None => out.push(loc.warning(
            Category::Schema,
            "schema_version",
            "Meta schema_version is missing".to_string(),
        )),
        Some(value) => match value.as_u64() {
            Some(version) if schema.supported_versions.contains(&version) => {}
            _ => out.push(loc.error(
                Category::Schema,
                "schema_version",
                format!(
                    "unsupported schema_version {value} (supported: {:?})",
                    schema.supported_versions
                ),
            )),
        },
    }

    match obj.get("archived") {
        None | Some(Value::Bool(false)) => {}
        Some(Value::Bool(true)) => out.push(loc.warning(
            Category::Schema,
            "archived",
            "issue set is archived; it has been superseded".to_string(),
        )),
        Some(_) => out.push(loc.error(
            Category::Schema,
            "archived",
            "field 'archived' must be a boolean".to_string(),
        )),
    }

    for key in obj.keys() {
        let known = META_FIELDS.iter().any(|spec| spec.name == key) || META_OPTIONAL.contains(&key.as_str());
        if !known {
            out.push(loc.warning(Category::Schema, key, format!("unknown Meta field '{key}'")));
        }
    }

    parsed.execution_context = obj.get("execution_context").cloned();

    let clean = out[before..].iter().all(|f| f.severity != Severity::Error);
    if clean {
        match serde_json::from_value::<Meta>(Value::Object(obj.clone())) {
            Ok(meta) => parsed.meta = Some(meta),
            Err(e) => out.push(loc.error(
                Category::Schema,
                "type",
                format!("Meta does not match the header schema: {e}"),
            )),
        }
    }
}

fn check_record(
    obj: &Map<String, Value>,
    schema: &IssueSchema<'_>,
    loc: &Loc<'_>,
    out: &mut Vec<Finding>,
) {
    for spec in RECORD_FIELDS {
        check_field(obj, spec, loc, out);
    }

    if obj.get("id").and_then(Value::as_str).is_some_and(|id| id.trim().is_empty()) {
        out.push(loc.error(Category::Schema, "id", "issue id must be a non-empty string".to_string()));
    }

    if let Some(refs) = obj.get("refs").and_then(Value::as_array) {
        if refs.is_empty() {
            out.push(loc.error(Category::Schema, "refs", "refs must be a non-empty array".to_string()));
        }
        for reference in refs.iter().filter_map(Value::as_str) {
            check_ref(reference, schema, loc, out);
        }
    }

    for key in obj.keys() {
        if !RECORD_FIELDS.iter().any(|spec| spec.name == key) {
            out.push(loc.warning(Category::Schema, key, format!("unknown field '{key}'")));
        }
    }
}

fn check_ref(reference: &str, schema: &IssueSchema<'_>, loc: &Loc<'_>, out: &mut Vec<Finding>) {
    let Some(caps) = REF_RE.captures(reference) else {
        out.push(loc.error(Category::Schema, "refs", format!("invalid ref format '{reference}'")));
        return;
    };
    let start: Option<u64> = caps.get(2).and_then(|m| m.as_str().parse().ok());
    let end: Option<u64> = caps.get(3).and_then(|m| m.as_str().parse().ok());
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            out.push(loc.error(
                Category::Schema,
                "refs",
                format!("ref '{reference}' has an end line before its start line"),
            ));
        }
    }
    if let Some(path) = caps.get(1) {
        let resolved = resolve_under(schema.project_root, Path::new(path.as_str()));
        if !resolved.exists() {
            out.push(loc.info("refs", format!("referenced path not found: {}", path.as_str())));
        }
    }
}

fn check_dependencies(
    id: &str,
    obj: &Map<String, Value>,
    known_ids: &HashSet<&str>,
    loc: &Loc<'_>,
    out: &mut Vec<Finding>,
) {
    let Some(deps) = obj.get("depends_on").and_then(Value::as_array) else {
        return;
    };
    for dep in deps.iter().filter_map(Value::as_str) {
        if dep.trim().is_empty() {
            out.push(loc.error(
                Category::Schema,
                "depends_on",
                "depends_on entries must be non-empty strings".to_string(),
            ));
        } else if dep == id {
            out.push(loc.error(
                Category::Reference,
                "depends_on",
                format!("issue '{id}' cannot depend on itself"),
            ));
        } else if !known_ids.contains(dep) {
            out.push(loc.error(
                Category::Reference,
                "depends_on",
                format!("issue '{id}' depends on unknown id '{dep}'"),
            ));
        }
    }
}

fn usable_id(obj: &Map<String, Value>) -> Option<&str> {
    obj.get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
}

/// Graph node from a raw line. Unusable tie-break keys sort last.
fn node_from_raw(id: &str, obj: &Map<String, Value>) -> Node {
    let depends_on = obj
        .get("depends_on")
        .and_then(Value::as_array)
        .map(|deps| {
            deps.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let priority = obj
        .get("priority")
        .and_then(Value::as_str)
        .and_then(|p| p.parse::<Priority>().ok())
        .unwrap_or(Priority::P2);
    let phase = obj
        .get("phase")
        .and_then(Value::as_number)
        .map_or(f64::MAX, |n| Phase(n.clone()).value());
    Node {
        id: id.to_string(),
        depends_on,
        priority,
        phase,
    }
}
