//! Checklist data model
//!
//! Item fields are a tagged union keyed by field type, so every variant
//! carries exactly the sub-fields it needs.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use crate::types::{KeeperError, Result};

/// Approval lifecycle of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    #[default]
    Draft,
    Pending,
    Approved,
}

/// Typed inspection value of a checklist item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "fieldType", rename_all = "kebab-case")]
pub enum FieldValue {
    FreeText {
        #[serde(default)]
        value: String,
    },
    SingleSelect {
        options: Vec<String>,
        #[serde(default)]
        selected: Option<String>,
    },
    MultiSelectWithText {
        options: Vec<String>,
        #[serde(default)]
        selected: BTreeSet<String>,
        #[serde(default)]
        text: String,
    },
    DateWithMultiSelect {
        options: Vec<String>,
        #[serde(default)]
        date: Option<NaiveDate>,
        #[serde(default)]
        selected: BTreeSet<String>,
    },
}

impl FieldValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::FreeText { .. } => "free-text",
            Self::SingleSelect { .. } => "single-select",
            Self::MultiSelectWithText { .. } => "multi-select-with-text",
            Self::DateWithMultiSelect { .. } => "date-with-multi-select",
        }
    }

    fn options(&self) -> Option<&[String]> {
        match self {
            Self::FreeText { .. } => None,
            Self::SingleSelect { options, .. }
            | Self::MultiSelectWithText { options, .. }
            | Self::DateWithMultiSelect { options, .. } => Some(options),
        }
    }

    /// Check that options are well formed and selections are drawn from them
    pub fn validate(&self, path: &str) -> Result<()> {
        let Some(options) = self.options() else {
            return Ok(());
        };

        if options.is_empty() {
            return Err(KeeperError::invalid_field(
                format!("{}.options", path),
                "select fields need at least one option",
            ));
        }
        let mut seen = HashSet::new();
        for option in options {
            if !seen.insert(option.as_str()) {
                return Err(KeeperError::invalid_field(
                    format!("{}.options", path),
                    format!("duplicate option '{}'", option),
                ));
            }
        }

        let selected: Vec<&String> = match self {
            Self::SingleSelect { selected, .. } => selected.iter().collect(),
            Self::MultiSelectWithText { selected, .. }
            | Self::DateWithMultiSelect { selected, .. } => selected.iter().collect(),
            Self::FreeText { .. } => Vec::new(),
        };
        for value in selected {
            if !seen.contains(value.as_str()) {
                return Err(KeeperError::invalid_field(
                    format!("{}.selected", path),
                    format!("'{}' is not one of the options", value),
                ));
            }
        }
        Ok(())
    }
}

/// One inspection line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    pub id: String,
    pub label: String,
    /// Reference value the inspector compares against
    #[serde(default)]
    pub spec_value: String,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub checked: bool,
    pub field: FieldValue,
}

/// Opaque reference into the external file store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    pub name: String,
    pub handle: String,
}

/// A group of items that can be switched off as a whole
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistCategory {
    pub id: String,
    pub title: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub items: Vec<ChecklistItem>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

fn default_true() -> bool {
    true
}

/// Completion accounting over enabled categories
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub total_items: usize,
    pub checked_items: usize,
    pub completion_rate: f64,
}

/// All category answers for one asset at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistSubmission {
    pub submission_id: String,
    pub asset_id: String,
    pub status: ApprovalStatus,
    pub categories: Vec<ChecklistCategory>,
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
}

impl ChecklistSubmission {
    /// Recomputed on every call; disabled categories do not count
    pub fn completion(&self) -> Completion {
        let (total, checked) = self
            .categories
            .iter()
            .filter(|c| c.enabled)
            .flat_map(|c| c.items.iter())
            .fold((0usize, 0usize), |(total, checked), item| {
                (total + 1, checked + usize::from(item.checked))
            });

        Completion {
            total_items: total,
            checked_items: checked,
            completion_rate: if total == 0 {
                0.0
            } else {
                checked as f64 / total as f64
            },
        }
    }

    pub fn missing_required(&self) -> Vec<String> {
        missing_required(&self.categories)
    }

    pub fn category_mut(&mut self, category_id: &str) -> Result<&mut ChecklistCategory> {
        self.categories
            .iter_mut()
            .find(|c| c.id == category_id)
            .ok_or_else(|| {
                KeeperError::invalid_field("categoryId", format!("unknown category '{}'", category_id))
            })
    }
}

/// `category/item` ids of required, unchecked items in enabled categories
pub fn missing_required(categories: &[ChecklistCategory]) -> Vec<String> {
    categories
        .iter()
        .filter(|c| c.enabled)
        .flat_map(|c| {
            c.items
                .iter()
                .filter(|i| i.required && !i.checked)
                .map(move |i| format!("{}/{}", c.id, i.id))
        })
        .collect()
}

/// Validate a full category payload before anything is stored
pub fn validate_categories(categories: &[ChecklistCategory]) -> Result<()> {
    let mut category_ids = HashSet::new();
    for (ci, category) in categories.iter().enumerate() {
        let cpath = format!("categories[{}]", ci);
        if category.id.trim().is_empty() {
            return Err(KeeperError::invalid_field(format!("{}.id", cpath), "must not be empty"));
        }
        if !category_ids.insert(category.id.as_str()) {
            return Err(KeeperError::invalid_field(
                format!("{}.id", cpath),
                format!("duplicate category id '{}'", category.id),
            ));
        }

        let mut item_ids = HashSet::new();
        for (ii, item) in category.items.iter().enumerate() {
            let ipath = format!("{}.items[{}]", cpath, ii);
            if item.id.trim().is_empty() {
                return Err(KeeperError::invalid_field(format!("{}.id", ipath), "must not be empty"));
            }
            if !item_ids.insert(item.id.as_str()) {
                return Err(KeeperError::invalid_field(
                    format!("{}.id", ipath),
                    format!("duplicate item id '{}'", item.id),
                ));
            }
            item.field.validate(&format!("{}.field", ipath))?;
        }

        let mut attachment_ids = HashSet::new();
        for (ai, attachment) in category.attachments.iter().enumerate() {
            if !attachment_ids.insert(attachment.id.as_str()) {
                return Err(KeeperError::invalid_field(
                    format!("{}.attachments[{}].id", cpath, ai),
                    format!("duplicate attachment id '{}'", attachment.id),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, checked: bool) -> ChecklistItem {
        ChecklistItem {
            id: id.into(),
            label: id.to_uppercase(),
            spec_value: String::new(),
            required: true,
            checked,
            field: FieldValue::FreeText { value: String::new() },
        }
    }

    fn submission(categories: Vec<ChecklistCategory>) -> ChecklistSubmission {
        ChecklistSubmission {
            submission_id: "chk_1".into(),
            asset_id: "M-1".into(),
            status: ApprovalStatus::Draft,
            categories,
            version: 1,
            created_at: Utc::now(),
            created_by: "op".into(),
            updated_at: Utc::now(),
            submitted_at: None,
            approved_at: None,
            approved_by: None,
        }
    }

    fn category(id: &str, enabled: bool, items: Vec<ChecklistItem>) -> ChecklistCategory {
        ChecklistCategory {
            id: id.into(),
            title: id.into(),
            enabled,
            items,
            attachments: Vec::new(),
        }
    }

    #[test]
    fn test_completion_counts_enabled_only() {
        let s = submission(vec![
            category("a", true, vec![item("1", true), item("2", false)]),
            category("b", false, vec![item("3", true), item("4", true)]),
        ]);
        let c = s.completion();
        assert_eq!(c.total_items, 2);
        assert_eq!(c.checked_items, 1);
        assert!((c.completion_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(s.missing_required(), vec!["a/2".to_string()]);
    }

    #[test]
    fn test_empty_completion_is_zero() {
        let s = submission(vec![category("a", false, vec![item("1", true)])]);
        assert_eq!(s.completion().completion_rate, 0.0);
        assert_eq!(submission(Vec::new()).completion().total_items, 0);
    }

    #[test]
    fn test_field_wire_format() {
        let raw = r#"{
            "id": "gate",
            "label": "Gate condition",
            "specValue": "no burrs",
            "field": {"fieldType": "date-with-multi-select", "options": ["reflected", "not reflected"], "date": "2024-06-01", "selected": ["reflected"]}
        }"#;
        let item: ChecklistItem = serde_json::from_str(raw).unwrap();
        assert!(item.required);
        assert!(!item.checked);
        match &item.field {
            FieldValue::DateWithMultiSelect { date, selected, .. } => {
                assert_eq!(*date, NaiveDate::from_ymd_opt(2024, 6, 1));
                assert!(selected.contains("reflected"));
            }
            other => panic!("unexpected field {:?}", other),
        }
        assert_eq!(item.field.type_name(), "date-with-multi-select");
    }

    #[test]
    fn test_free_text_cannot_carry_options() {
        let raw = r#"{"fieldType": "free-text", "value": "ok"}"#;
        let field: FieldValue = serde_json::from_str(raw).unwrap();
        assert!(field.validate("f").is_ok());
        assert_eq!(field.options(), None);
    }

    #[test]
    fn test_select_outside_options_rejected() {
        let field = FieldValue::SingleSelect {
            options: vec!["OK".into(), "NG".into()],
            selected: Some("MAYBE".into()),
        };
        let err = field.validate("categories[0].items[0].field").unwrap_err();
        assert_eq!(err.field(), Some("categories[0].items[0].field.selected"));
    }

    #[test]
    fn test_validate_categories_rejects_duplicates() {
        let dup_items = vec![category("a", true, vec![item("1", false), item("1", false)])];
        let err = validate_categories(&dup_items).unwrap_err();
        assert_eq!(err.field(), Some("categories[0].items[1].id"));

        let dup_categories = vec![category("a", true, vec![]), category("a", true, vec![])];
        assert!(validate_categories(&dup_categories).is_err());

        let fine = vec![category("a", true, vec![item("1", false)]), category("b", true, vec![])];
        assert!(validate_categories(&fine).is_ok());
    }
}
