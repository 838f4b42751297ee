//! Repository interfaces per entity, and the transaction boundary the
//! workflows run inside.
//!
//! `SqliteStore` is the workspace store used by the sidecar. `MemoryStore`
//! keeps everything in process and exists for tests.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::{StoreError, StoreResult};
use crate::model::{
    ClaimFilter, Course, PointsTransaction, Reward, RewardClaim, StudentProfile, TeacherProfile,
    TransactionFilter, TutorProfile, User,
};
use crate::roles::Role;
use chrono::{DateTime, Utc};

pub trait DirectoryRepo {
    /// Fails with `StoreError::Conflict` when the email is taken.
    fn insert_user(&self, user: &User) -> StoreResult<()>;
    fn get_user(&self, id: &str) -> StoreResult<Option<User>>;
    fn list_users(&self, role: Option<Role>) -> StoreResult<Vec<User>>;

    fn upsert_student(&self, profile: &StudentProfile) -> StoreResult<()>;
    fn get_student(&self, user_id: &str) -> StoreResult<Option<StudentProfile>>;
    fn students_by_tutor(&self, tutor_id: &str) -> StoreResult<Vec<StudentProfile>>;
    fn students_in_course(&self, course_id: &str) -> StoreResult<Vec<StudentProfile>>;

    fn upsert_teacher(&self, profile: &TeacherProfile) -> StoreResult<()>;
    fn get_teacher(&self, user_id: &str) -> StoreResult<Option<TeacherProfile>>;

    fn upsert_tutor(&self, profile: &TutorProfile) -> StoreResult<()>;
    fn get_tutor(&self, user_id: &str) -> StoreResult<Option<TutorProfile>>;
}

/// Append-only. There is deliberately no update or delete.
pub trait LedgerRepo {
    fn append_transaction(&self, tx: &PointsTransaction) -> StoreResult<()>;
    fn balance(&self, user_id: &str) -> StoreResult<i64>;
    /// Ascending by `created_at`, ties in insertion order.
    fn list_transactions(
        &self,
        user_id: &str,
        filter: &TransactionFilter,
    ) -> StoreResult<Vec<PointsTransaction>>;
}

pub trait RewardRepo {
    fn insert_reward(&self, reward: &Reward) -> StoreResult<()>;
    fn get_reward(&self, id: &str) -> StoreResult<Option<Reward>>;
    /// Overwrites every mutable column of an existing reward.
    fn save_reward(&self, reward: &Reward) -> StoreResult<()>;
    fn list_rewards(&self) -> StoreResult<Vec<Reward>>;
}

pub trait ClaimRepo {
    fn insert_claim(&self, claim: &RewardClaim) -> StoreResult<()>;
    fn get_claim(&self, id: &str) -> StoreResult<Option<RewardClaim>>;
    fn save_claim(&self, claim: &RewardClaim) -> StoreResult<()>;
    fn list_claims(&self, filter: &ClaimFilter) -> StoreResult<Vec<RewardClaim>>;
}

pub trait CourseRepo {
    /// Fails with `StoreError::Conflict` when the code is taken.
    fn insert_course(&self, course: &Course) -> StoreResult<()>;
    fn get_course(&self, id: &str) -> StoreResult<Option<Course>>;
    fn course_by_code(&self, code: &str) -> StoreResult<Option<Course>>;
    fn code_exists(&self, code: &str) -> StoreResult<bool>;
    fn touch_course(&self, id: &str, at: DateTime<Utc>) -> StoreResult<()>;
    /// Courses the teacher owns or co-teaches, ordered by name.
    fn courses_for_teacher(&self, teacher_id: &str) -> StoreResult<Vec<Course>>;
    fn add_course_teacher(&self, course_id: &str, teacher_id: &str) -> StoreResult<()>;
    /// Owner first, then co-teachers in the order they were added.
    fn course_teacher_ids(&self, course_id: &str) -> StoreResult<Vec<String>>;
}

pub trait Store: DirectoryRepo + LedgerRepo + RewardRepo + ClaimRepo + CourseRepo {
    /// Runs `f` as one unit: every write inside it is kept, or none is.
    /// Calls nested inside an open unit join it.
    fn atomically<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<StoreError>;
}
