use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
    Tutor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ManageUsers,
    ManageCourses,
    ManageRewards,
    AwardPoints,
    ProcessClaims,
    RequestRedemption,
    JoinCourse,
    ViewAnyBalance,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Teacher => "teacher",
            Self::Student => "student",
            Self::Tutor => "tutor",
        }
    }

    pub fn allows(self, cap: Capability) -> bool {
        use Capability::*;
        match cap {
            ManageUsers => self == Role::Admin,
            ManageCourses | ManageRewards | AwardPoints | ProcessClaims => {
                matches!(self, Role::Admin | Role::Teacher)
            }
            RequestRedemption | JoinCourse => self == Role::Student,
            ViewAnyBalance => matches!(self, Role::Admin | Role::Teacher | Role::Tutor),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "teacher" => Ok(Self::Teacher),
            "student" => Ok(Self::Student),
            "tutor" => Ok(Self::Tutor),
            other => Err(format!(
                "role must be one of: admin, teacher, student, tutor (got {other})"
            )),
        }
    }
}
