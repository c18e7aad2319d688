use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "prof")]
    Professor,
    #[serde(rename = "student")]
    Student,
}

impl Role {
    pub const ALL: &[Role] = &[Role::Admin, Role::Professor, Role::Student];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Professor => "prof",
            Role::Student => "student",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Role::Admin => "Admin",
            Role::Professor => "Professor",
            Role::Student => "Student",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "prof" | "professor" => Some(Role::Professor),
            "student" => Some(Role::Student),
            _ => None,
        }
    }
}

/// Accounts created without an explicit role are students.
impl Default for Role {
    fn default() -> Self {
        Role::Student
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
