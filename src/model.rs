use crate::roles::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfile {
    pub user_id: String,
    pub school: String,
    pub grade: String,
    pub tutor_id: Option<String>,
    pub course_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherProfile {
    pub user_id: String,
    pub school: String,
    pub subjects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorProfile {
    pub user_id: String,
    pub relationship: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub code: String,
    pub name: String,
    pub grade: String,
    pub school: String,
    pub teacher_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Assignment,
    Reward,
    Bonus,
    System,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Assignment => "assignment",
            Self::Reward => "reward",
            Self::Bonus => "bonus",
            Self::System => "system",
        }
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assignment" => Ok(Self::Assignment),
            "reward" => Ok(Self::Reward),
            "bonus" => Ok(Self::Bonus),
            "system" => Ok(Self::System),
            other => Err(format!(
                "type must be one of: assignment, reward, bonus, system (got {other})"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsTransaction {
    pub id: String,
    pub user_id: String,
    pub amount: i64,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub related_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    /// Inclusive lower bound on `created_at`.
    pub since: Option<DateTime<Utc>>,
    pub kind: Option<TransactionType>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub id: String,
    pub title: String,
    pub description: String,
    pub points_cost: i64,
    pub stock: i64,
    pub active: bool,
    pub category: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Reward {
    pub fn is_redeemable(&self, at: DateTime<Utc>) -> bool {
        self.active && self.stock > 0 && self.expires_at.map_or(true, |exp| at < exp)
    }

    /// Human readable reason when `is_redeemable` is false.
    pub fn unredeemable_reason(&self, at: DateTime<Utc>) -> Option<&'static str> {
        if !self.active {
            Some("reward is inactive")
        } else if self.stock <= 0 {
            Some("reward is out of stock")
        } else if self.expires_at.is_some_and(|exp| at >= exp) {
            Some("reward has expired")
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReward {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub points_cost: i64,
    #[serde(default)]
    pub stock: i64,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub category: String,
    pub created_by: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

/// Partial update. `expires_at: Some(None)` clears the expiry.
#[derive(Debug, Clone, Default)]
pub struct RewardPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub points_cost: Option<i64>,
    pub stock: Option<i64>,
    pub active: Option<bool>,
    pub category: Option<String>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Default)]
pub struct RewardFilter {
    pub active_only: bool,
    pub redeemable_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Pending,
    Approved,
    Rejected,
}

impl ClaimStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        self != Self::Pending
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!(
                "status must be one of: pending, approved, rejected (got {other})"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            other => Err(format!("decision must be approve or reject (got {other})")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardClaim {
    pub id: String,
    pub user_id: String,
    pub reward_id: String,
    pub points_spent: i64,
    pub status: ClaimStatus,
    pub claimed_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub processed_by: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ClaimFilter {
    pub user_id: Option<String>,
    pub reward_id: Option<String>,
    pub status: Option<ClaimStatus>,
}
