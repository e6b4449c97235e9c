//! Actor identity for record operations
//!
//! Token handling lives upstream (the gateway). By the time a request reaches
//! this service it carries a resolved actor id and role, and every core
//! operation receives that `Actor` explicitly. Nothing here is cached between
//! calls.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RecordsError;

/// Header carrying the resolved actor id
pub const ACTOR_ID_HEADER: &str = "x-actor-id";

/// Header carrying the resolved actor role
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Role of the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Farmer,
    Employee,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Farmer => "farmer",
            Role::Employee => "employee",
            Role::Admin => "admin",
        }
    }

    /// Employees and admins hold transition rights
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Employee | Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RecordsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "farmer" => Ok(Role::Farmer),
            "employee" => Ok(Role::Employee),
            "admin" => Ok(Role::Admin),
            other => Err(RecordsError::Forbidden(format!("unknown role '{}'", other))),
        }
    }
}

/// The caller of an operation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: id.into(), role }
    }

    pub fn farmer(id: impl Into<String>) -> Self {
        Self::new(id, Role::Farmer)
    }

    pub fn employee(id: impl Into<String>) -> Self {
        Self::new(id, Role::Employee)
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(id, Role::Admin)
    }

    /// Build an actor from raw header values
    pub fn from_headers(id: Option<&str>, role: Option<&str>) -> Result<Self, RecordsError> {
        let id = id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RecordsError::Forbidden(format!("missing {} header", ACTOR_ID_HEADER)))?;
        let role = role
            .ok_or_else(|| {
                RecordsError::Forbidden(format!("missing {} header", ACTOR_ROLE_HEADER))
            })?
            .parse()?;
        Ok(Self::new(id, role))
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.role, self.id)
    }
}
