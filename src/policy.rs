//! Transition policy table
//!
//! Maps each lifecycle operation to the roles allowed to perform it and
//! whether the actor must also own the record. Services call [`authorize`]
//! instead of branching on roles themselves.

use std::fmt;

use crate::error::RecordsError;
use crate::identity::{Actor, Role};

/// Every role-gated operation on fields, crop records and predictions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    CreateField,
    UpdateField,
    DeleteField,
    ApproveField,
    RejectField,
    VerifyField,
    CreateCrop,
    UpdateCrop,
    DeleteCrop,
    VerifyCrop,
    Detect,
}

const FARMER_ONLY: &[Role] = &[Role::Farmer];
const STAFF_ONLY: &[Role] = &[Role::Employee, Role::Admin];

impl Transition {
    /// Roles allowed to attempt this transition
    pub fn allowed_roles(&self) -> &'static [Role] {
        match self {
            Transition::CreateField
            | Transition::UpdateField
            | Transition::DeleteField
            | Transition::CreateCrop
            | Transition::UpdateCrop
            | Transition::DeleteCrop
            | Transition::Detect => FARMER_ONLY,
            Transition::ApproveField
            | Transition::RejectField
            | Transition::VerifyField
            | Transition::VerifyCrop => STAFF_ONLY,
        }
    }

    /// Whether the actor must be the owning farmer
    pub fn requires_ownership(&self) -> bool {
        matches!(
            self,
            Transition::UpdateField
                | Transition::DeleteField
                | Transition::CreateCrop
                | Transition::UpdateCrop
                | Transition::DeleteCrop
                | Transition::Detect
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::CreateField => "create_field",
            Transition::UpdateField => "update_field",
            Transition::DeleteField => "delete_field",
            Transition::ApproveField => "approve_field",
            Transition::RejectField => "reject_field",
            Transition::VerifyField => "verify_field",
            Transition::CreateCrop => "create_crop",
            Transition::UpdateCrop => "update_crop",
            Transition::DeleteCrop => "delete_crop",
            Transition::VerifyCrop => "verify_crop",
            Transition::Detect => "detect",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check that `actor` may perform `transition` on a record owned by `owner_id`
///
/// `owner_id` is ignored for transitions that do not require ownership.
pub fn authorize(
    actor: &Actor,
    transition: Transition,
    owner_id: Option<&str>,
) -> Result<(), RecordsError> {
    if !transition.allowed_roles().contains(&actor.role) {
        return Err(RecordsError::Forbidden(format!(
            "role {} may not {}",
            actor.role, transition
        )));
    }

    if transition.requires_ownership() && owner_id != Some(actor.id.as_str()) {
        return Err(RecordsError::Forbidden(format!(
            "{} may only {} their own records",
            actor, transition
        )));
    }

    Ok(())
}

/// Read access: the owning farmer or any staff member
pub fn authorize_read(actor: &Actor, owner_id: &str) -> Result<(), RecordsError> {
    if actor.is_staff() || actor.id == owner_id {
        Ok(())
    } else {
        Err(RecordsError::Forbidden(format!("{} may not read another farmer's records", actor)))
    }
}
