//! Structural checks and duplicate reporting run before the data phase.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::progress::Progress;
use crate::resource::{Destination, Source};
use crate::url_rewrite::model::StagingRow;
use crate::AppResult;

#[derive(Debug, Clone, Copy)]
pub struct ExpectedTable {
    pub name: &'static str,
    pub fields: &'static [&'static str],
}

const URL_KEY_FIELDS: &[&str] = &[
    "value_id",
    "entity_type_id",
    "attribute_id",
    "store_id",
    "entity_id",
    "value",
];

const VARCHAR_FIELDS: &[&str] = &["value_id", "attribute_id", "store_id", "entity_id", "value"];

pub const SOURCE_STRUCTURE: &[ExpectedTable] = &[
    ExpectedTable {
        name: "enterprise_url_rewrite",
        fields: &[
            "url_rewrite_id",
            "request_path",
            "target_path",
            "is_system",
            "guid",
            "identifier",
            "inc",
            "value_id",
        ],
    },
    ExpectedTable {
        name: "catalog_category_entity_url_key",
        fields: URL_KEY_FIELDS,
    },
    ExpectedTable {
        name: "catalog_product_entity_url_key",
        fields: URL_KEY_FIELDS,
    },
    ExpectedTable {
        name: "enterprise_url_rewrite_redirect",
        fields: &["redirect_id", "identifier", "target_path", "options", "description"],
    },
];

pub const DESTINATION_STRUCTURE: &[ExpectedTable] = &[
    ExpectedTable {
        name: "url_rewrite",
        fields: &[
            "url_rewrite_id",
            "entity_type",
            "entity_id",
            "request_path",
            "target_path",
            "redirect_type",
            "store_id",
            "description",
            "is_autogenerated",
            "metadata",
        ],
    },
    ExpectedTable {
        name: "catalog_category_entity_varchar",
        fields: VARCHAR_FIELDS,
    },
    ExpectedTable {
        name: "catalog_product_entity_varchar",
        fields: VARCHAR_FIELDS,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Source,
    Destination,
}

impl Side {
    fn label(self) -> &'static str {
        match self {
            Side::Source => "Source",
            Side::Destination => "Destination",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructureIssue {
    Missing {
        side: Side,
        table: String,
    },
    Mismatch {
        side: Side,
        table: String,
        missing_fields: Vec<String>,
        unexpected_fields: Vec<String>,
    },
}

impl StructureIssue {
    pub fn message(&self) -> String {
        match self {
            StructureIssue::Missing { side, table } => {
                format!("{} table does not exist: {table}", side.label())
            }
            StructureIssue::Mismatch { side, table, .. } => {
                format!("{} table structure does not meet expectation: {table}", side.label())
            }
        }
    }
}

/// Set comparison of expected and actual field names, returned as
/// `(missing, unexpected)`.
pub fn compare_fields(expected: &[&str], actual: &[String]) -> (Vec<String>, Vec<String>) {
    let expected: BTreeSet<&str> = expected.iter().copied().collect();
    let actual: BTreeSet<&str> = actual.iter().map(String::as_str).collect();
    let missing = expected.difference(&actual).map(|f| f.to_string()).collect();
    let unexpected = actual.difference(&expected).map(|f| f.to_string()).collect();
    (missing, unexpected)
}

fn check_table(
    side: Side,
    expected: &ExpectedTable,
    fields: Option<Vec<String>>,
) -> Option<StructureIssue> {
    let Some(fields) = fields else {
        return Some(StructureIssue::Missing {
            side,
            table: expected.name.to_string(),
        });
    };
    let (missing_fields, unexpected_fields) = compare_fields(expected.fields, &fields);
    if missing_fields.is_empty() && unexpected_fields.is_empty() {
        None
    } else {
        Some(StructureIssue::Mismatch {
            side,
            table: expected.name.to_string(),
            missing_fields,
            unexpected_fields,
        })
    }
}

/// Check every expected table on both sides. All mismatches are collected;
/// only I/O failures abort.
pub fn check_structure(
    source: &Source,
    destination: &Destination,
    progress: &mut dyn Progress,
) -> AppResult<Vec<StructureIssue>> {
    progress.start((SOURCE_STRUCTURE.len() + DESTINATION_STRUCTURE.len()) as u64);
    let mut issues = Vec::new();
    for expected in SOURCE_STRUCTURE {
        progress.advance();
        issues.extend(check_table(
            Side::Source,
            expected,
            source.document_fields(expected.name)?,
        ));
    }
    for expected in DESTINATION_STRUCTURE {
        progress.advance();
        issues.extend(check_table(
            Side::Destination,
            expected,
            destination.document_fields(expected.name)?,
        ));
    }
    progress.finish();
    Ok(issues)
}

/// All staging rows sharing one `(request_path, store_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub request_path: String,
    pub store_id: i64,
    pub target_paths: Vec<String>,
}

impl DuplicateGroup {
    pub fn message(&self) -> String {
        format!(
            "Duplicate URL rewrite. Request path: {} Store ID: {} Target paths: {}",
            self.request_path,
            self.store_id,
            self.target_paths.join(", ")
        )
    }
}

/// Fold detector output (already ordered by store and path) into groups.
pub fn group_duplicates(rows: &[StagingRow]) -> Vec<DuplicateGroup> {
    let mut groups: Vec<DuplicateGroup> = Vec::new();
    for row in rows {
        match groups.last_mut() {
            Some(group) if group.request_path == row.request_path && group.store_id == row.store_id => {
                group.target_paths.push(row.target_path.clone());
            }
            _ => groups.push(DuplicateGroup {
                request_path: row.request_path.clone(),
                store_id: row.store_id,
                target_paths: vec![row.target_path.clone()],
            }),
        }
    }
    groups
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub structure: Vec<StructureIssue>,
    pub duplicates: Vec<DuplicateGroup>,
    pub auto_resolve: bool,
}

impl IntegrityReport {
    pub fn passed(&self) -> bool {
        self.structure.is_empty() && (self.duplicates.is_empty() || self.auto_resolve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url_rewrite::model::EntityType;

    fn staging(path: &str, store_id: i64, target: &str) -> StagingRow {
        StagingRow {
            id: None,
            request_path: path.into(),
            target_path: target.into(),
            is_system: true,
            store_id,
            entity_type: EntityType::Category,
            redirect_type: 0,
            product_id: None,
            category_id: None,
            cms_page_id: None,
            description: None,
            priority: 3,
        }
    }

    #[test]
    fn field_order_is_irrelevant() {
        let actual = vec!["value".to_string(), "value_id".to_string()];
        let (missing, unexpected) = compare_fields(&["value_id", "value"], &actual);
        assert!(missing.is_empty());
        assert!(unexpected.is_empty());
    }

    #[test]
    fn reports_both_directions_of_mismatch() {
        let actual = vec!["value_id".to_string(), "legacy".to_string()];
        let (missing, unexpected) = compare_fields(&["value_id", "value"], &actual);
        assert_eq!(missing, vec!["value".to_string()]);
        assert_eq!(unexpected, vec!["legacy".to_string()]);
    }

    #[test]
    fn issue_messages() {
        let missing = StructureIssue::Missing {
            side: Side::Source,
            table: "cms_page".into(),
        };
        assert_eq!(missing.message(), "Source table does not exist: cms_page");
        let mismatch = check_table(
            Side::Destination,
            &DESTINATION_STRUCTURE[1],
            Some(vec!["value_id".into()]),
        )
        .expect("mismatch");
        assert_eq!(
            mismatch.message(),
            "Destination table structure does not meet expectation: catalog_category_entity_varchar"
        );
    }

    #[test]
    fn groups_consecutive_rows() {
        let groups = group_duplicates(&[
            staging("a.html", 1, "t1"),
            staging("a.html", 1, "t2"),
            staging("a.html", 2, "t3"),
            staging("a.html", 2, "t4"),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].target_paths, vec!["t1".to_string(), "t2".to_string()]);
        assert_eq!(groups[1].store_id, 2);
    }

    #[test]
    fn duplicates_only_fail_without_auto_resolve() {
        let mut report = IntegrityReport {
            structure: Vec::new(),
            duplicates: group_duplicates(&[staging("a", 1, "x"), staging("a", 1, "y")]),
            auto_resolve: false,
        };
        assert!(!report.passed());
        report.auto_resolve = true;
        assert!(report.passed());
        report.structure.push(StructureIssue::Missing {
            side: Side::Source,
            table: "x".into(),
        });
        assert!(!report.passed());
    }
}
