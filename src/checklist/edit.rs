//! Field-level edits on a submission
//!
//! Every edit targets one category (and usually one item) and is applied
//! to a working copy; the caller persists the copy only when the edit
//! succeeded, so a rejected edit never leaves a half-applied submission.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::model::{Attachment, ChecklistCategory, ChecklistItem, ChecklistSubmission, FieldValue};
use crate::types::{KeeperError, Result};

/// A single change requested by an inspector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ChecklistEdit {
    /// Free-text value, or the text part of a multi-select-with-text field
    SetText {
        category_id: String,
        item_id: String,
        text: String,
    },
    /// Choose the single option of a single-select field
    Select {
        category_id: String,
        item_id: String,
        option: String,
    },
    /// Add or remove one option of a multi-select field
    ToggleOption {
        category_id: String,
        item_id: String,
        option: String,
    },
    SetDate {
        category_id: String,
        item_id: String,
        #[serde(default)]
        date: Option<NaiveDate>,
    },
    SetChecked {
        category_id: String,
        item_id: String,
        checked: bool,
    },
    SetCategoryEnabled {
        category_id: String,
        enabled: bool,
    },
    AddAttachment {
        category_id: String,
        name: String,
        handle: String,
    },
    RemoveAttachment {
        category_id: String,
        attachment_id: String,
    },
}

impl ChecklistEdit {
    pub fn category_id(&self) -> &str {
        match self {
            Self::SetText { category_id, .. }
            | Self::Select { category_id, .. }
            | Self::ToggleOption { category_id, .. }
            | Self::SetDate { category_id, .. }
            | Self::SetChecked { category_id, .. }
            | Self::SetCategoryEnabled { category_id, .. }
            | Self::AddAttachment { category_id, .. }
            | Self::RemoveAttachment { category_id, .. } => category_id,
        }
    }

    /// Apply to `submission` in place. Status checks are the caller's job.
    pub fn apply(&self, submission: &mut ChecklistSubmission) -> Result<()> {
        let category = submission.category_mut(self.category_id())?;

        if let Self::SetCategoryEnabled { enabled, .. } = self {
            category.enabled = *enabled;
            return Ok(());
        }

        if !category.enabled {
            return Err(KeeperError::invalid_field(
                "categoryId",
                format!("category '{}' is disabled", category.id),
            ));
        }

        match self {
            Self::SetText { item_id, text, .. } => match &mut item_mut(category, item_id)?.field {
                FieldValue::FreeText { value } => *value = text.clone(),
                FieldValue::MultiSelectWithText { text: current, .. } => *current = text.clone(),
                other => return Err(unsupported("text", other)),
            },
            Self::Select { item_id, option, .. } => match &mut item_mut(category, item_id)?.field {
                FieldValue::SingleSelect { options, selected } => {
                    ensure_option(options, option)?;
                    *selected = Some(option.clone());
                }
                other => return Err(unsupported("select", other)),
            },
            Self::ToggleOption { item_id, option, .. } => {
                match &mut item_mut(category, item_id)?.field {
                    FieldValue::MultiSelectWithText { options, selected, .. }
                    | FieldValue::DateWithMultiSelect { options, selected, .. } => {
                        ensure_option(options, option)?;
                        if !selected.remove(option) {
                            selected.insert(option.clone());
                        }
                    }
                    other => return Err(unsupported("toggle-option", other)),
                }
            }
            Self::SetDate { item_id, date, .. } => match &mut item_mut(category, item_id)?.field {
                FieldValue::DateWithMultiSelect { date: current, .. } => *current = *date,
                other => return Err(unsupported("date", other)),
            },
            Self::SetChecked { item_id, checked, .. } => {
                item_mut(category, item_id)?.checked = *checked;
            }
            Self::AddAttachment { name, handle, .. } => {
                if name.trim().is_empty() {
                    return Err(KeeperError::invalid_field("name", "must not be empty"));
                }
                if handle.trim().is_empty() {
                    return Err(KeeperError::invalid_field("handle", "must not be empty"));
                }
                category.attachments.push(Attachment {
                    id: format!("att_{}", uuid::Uuid::new_v4().simple()),
                    name: name.trim().to_string(),
                    handle: handle.clone(),
                });
            }
            Self::RemoveAttachment { attachment_id, .. } => {
                let before = category.attachments.len();
                category.attachments.retain(|a| &a.id != attachment_id);
                if category.attachments.len() == before {
                    return Err(KeeperError::invalid_field(
                        "attachmentId",
                        format!("unknown attachment '{}'", attachment_id),
                    ));
                }
            }
            Self::SetCategoryEnabled { .. } => {}
        }
        Ok(())
    }
}

fn item_mut<'a>(category: &'a mut ChecklistCategory, item_id: &str) -> Result<&'a mut ChecklistItem> {
    category
        .items
        .iter_mut()
        .find(|i| i.id == item_id)
        .ok_or_else(|| KeeperError::invalid_field("itemId", format!("unknown item '{}'", item_id)))
}

fn ensure_option(options: &[String], option: &str) -> Result<()> {
    if options.iter().any(|o| o == option) {
        Ok(())
    } else {
        Err(KeeperError::invalid_field(
            "option",
            format!("'{}' is not one of the options", option),
        ))
    }
}

fn unsupported(op: &str, field: &FieldValue) -> KeeperError {
    KeeperError::invalid_field(
        "op",
        format!("{} is not supported on a {} field", op, field.type_name()),
    )
}
