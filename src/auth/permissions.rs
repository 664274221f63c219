//! Roles and the write-operation table

use serde::{Deserialize, Serialize};
use std::fmt;

/// Staff roles, ordered by privilege
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Role {
    /// Shop-floor operator: records shots, fills checklists, reports repairs
    #[default]
    Operator = 0,
    /// Maintenance lead: manages assets and approves checklists
    Manager = 1,
    /// Can remove assets
    Admin = 2,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Operator => write!(f, "operator"),
            Role::Manager => write!(f, "manager"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

/// Write operations that need a credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Mint an asset session, when sessions require a staff credential
    IssueSession,
    RecordShots,
    CreateChecklist,
    EditChecklist,
    SubmitChecklist,
    ReportRepair,
    UpdateRepair,
    RegisterAsset,
    UpdateAsset,
    ApproveChecklist,
    DeleteAsset,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::IssueSession => "issue_session",
            Operation::RecordShots => "record_shots",
            Operation::CreateChecklist => "create_checklist",
            Operation::EditChecklist => "edit_checklist",
            Operation::SubmitChecklist => "submit_checklist",
            Operation::ReportRepair => "report_repair",
            Operation::UpdateRepair => "update_repair",
            Operation::RegisterAsset => "register_asset",
            Operation::UpdateAsset => "update_asset",
            Operation::ApproveChecklist => "approve_checklist",
            Operation::DeleteAsset => "delete_asset",
        }
    }

    /// Whether an asset session token may perform this operation
    pub fn session_allowed(self) -> bool {
        self != Operation::IssueSession && required_role(self) == Role::Operator
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimum role for an operation
pub fn required_role(operation: Operation) -> Role {
    match operation {
        Operation::IssueSession
        | Operation::RecordShots
        | Operation::CreateChecklist
        | Operation::EditChecklist
        | Operation::SubmitChecklist
        | Operation::ReportRepair
        | Operation::UpdateRepair => Role::Operator,

        Operation::RegisterAsset | Operation::UpdateAsset | Operation::ApproveChecklist => {
            Role::Manager
        }

        Operation::DeleteAsset => Role::Admin,
    }
}

pub fn is_operation_allowed(operation: Operation, role: Role) -> bool {
    role >= required_role(operation)
}
