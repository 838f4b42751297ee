use super::{ClaimRepo, CourseRepo, DirectoryRepo, LedgerRepo, RewardRepo, Store};
use crate::error::{StoreError, StoreResult};
use crate::model::{
    ClaimFilter, Course, PointsTransaction, Reward, RewardClaim, StudentProfile, TeacherProfile,
    TransactionFilter, TutorProfile, User,
};
use crate::roles::Role;
use chrono::{DateTime, Utc};
use std::cell::{Cell, RefCell};

#[derive(Debug, Clone, Default)]
struct State {
    users: Vec<User>,
    students: Vec<StudentProfile>,
    teachers: Vec<TeacherProfile>,
    tutors: Vec<TutorProfile>,
    transactions: Vec<PointsTransaction>,
    rewards: Vec<Reward>,
    claims: Vec<RewardClaim>,
    courses: Vec<Course>,
    course_teachers: Vec<(String, String)>,
}

/// Single-threaded store for tests. `atomically` snapshots the whole state
/// and restores it when the closure fails.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RefCell<State>,
    depth: Cell<u32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn upsert_by<T: Clone>(items: &mut Vec<T>, item: &T, same: impl Fn(&T) -> bool) {
    match items.iter_mut().find(|x| same(x)) {
        Some(slot) => *slot = item.clone(),
        None => items.push(item.clone()),
    }
}

impl DirectoryRepo for MemoryStore {
    fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut st = self.state.borrow_mut();
        if st.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict {
                entity: "users",
                key: user.email.clone(),
            });
        }
        st.users.push(user.clone());
        Ok(())
    }

    fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.state.borrow().users.iter().find(|u| u.id == id).cloned())
    }

    fn list_users(&self, role: Option<Role>) -> StoreResult<Vec<User>> {
        let mut out: Vec<User> = self
            .state
            .borrow()
            .users
            .iter()
            .filter(|u| role.map_or(true, |r| u.role == r))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.email.cmp(&b.email)));
        Ok(out)
    }

    fn upsert_student(&self, profile: &StudentProfile) -> StoreResult<()> {
        let mut st = self.state.borrow_mut();
        upsert_by(&mut st.students, profile, |p| p.user_id == profile.user_id);
        Ok(())
    }

    fn get_student(&self, user_id: &str) -> StoreResult<Option<StudentProfile>> {
        Ok(self
            .state
            .borrow()
            .students
            .iter()
            .find(|p| p.user_id == user_id)
            .cloned())
    }

    fn students_by_tutor(&self, tutor_id: &str) -> StoreResult<Vec<StudentProfile>> {
        Ok(self
            .state
            .borrow()
            .students
            .iter()
            .filter(|p| p.tutor_id.as_deref() == Some(tutor_id))
            .cloned()
            .collect())
    }

    fn students_in_course(&self, course_id: &str) -> StoreResult<Vec<StudentProfile>> {
        Ok(self
            .state
            .borrow()
            .students
            .iter()
            .filter(|p| p.course_id.as_deref() == Some(course_id))
            .cloned()
            .collect())
    }

    fn upsert_teacher(&self, profile: &TeacherProfile) -> StoreResult<()> {
        let mut st = self.state.borrow_mut();
        upsert_by(&mut st.teachers, profile, |p| p.user_id == profile.user_id);
        Ok(())
    }

    fn get_teacher(&self, user_id: &str) -> StoreResult<Option<TeacherProfile>> {
        Ok(self
            .state
            .borrow()
            .teachers
            .iter()
            .find(|p| p.user_id == user_id)
            .cloned())
    }

    fn upsert_tutor(&self, profile: &TutorProfile) -> StoreResult<()> {
        let mut st = self.state.borrow_mut();
        upsert_by(&mut st.tutors, profile, |p| p.user_id == profile.user_id);
        Ok(())
    }

    fn get_tutor(&self, user_id: &str) -> StoreResult<Option<TutorProfile>> {
        Ok(self
            .state
            .borrow()
            .tutors
            .iter()
            .find(|p| p.user_id == user_id)
            .cloned())
    }
}

impl LedgerRepo for MemoryStore {
    fn append_transaction(&self, tx: &PointsTransaction) -> StoreResult<()> {
        self.state.borrow_mut().transactions.push(tx.clone());
        Ok(())
    }

    fn balance(&self, user_id: &str) -> StoreResult<i64> {
        Ok(self
            .state
            .borrow()
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .map(|t| t.amount)
            .sum())
    }

    fn list_transactions(
        &self,
        user_id: &str,
        filter: &TransactionFilter,
    ) -> StoreResult<Vec<PointsTransaction>> {
        let mut out: Vec<PointsTransaction> = self
            .state
            .borrow()
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .filter(|t| filter.since.map_or(true, |s| t.created_at >= s))
            .filter(|t| filter.kind.map_or(true, |k| t.kind == k))
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps.
        out.sort_by_key(|t| t.created_at);
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }
}

impl RewardRepo for MemoryStore {
    fn insert_reward(&self, reward: &Reward) -> StoreResult<()> {
        self.state.borrow_mut().rewards.push(reward.clone());
        Ok(())
    }

    fn get_reward(&self, id: &str) -> StoreResult<Option<Reward>> {
        Ok(self
            .state
            .borrow()
            .rewards
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    fn save_reward(&self, reward: &Reward) -> StoreResult<()> {
        let mut st = self.state.borrow_mut();
        let Some(slot) = st.rewards.iter_mut().find(|r| r.id == reward.id) else {
            return Err(StoreError::corrupt(
                "rewards",
                format!("no row for {}", reward.id),
            ));
        };
        *slot = reward.clone();
        Ok(())
    }

    fn list_rewards(&self) -> StoreResult<Vec<Reward>> {
        let mut out = self.state.borrow().rewards.clone();
        out.sort_by_key(|r| r.created_at);
        Ok(out)
    }
}

impl ClaimRepo for MemoryStore {
    fn insert_claim(&self, claim: &RewardClaim) -> StoreResult<()> {
        self.state.borrow_mut().claims.push(claim.clone());
        Ok(())
    }

    fn get_claim(&self, id: &str) -> StoreResult<Option<RewardClaim>> {
        Ok(self
            .state
            .borrow()
            .claims
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    fn save_claim(&self, claim: &RewardClaim) -> StoreResult<()> {
        let mut st = self.state.borrow_mut();
        let Some(slot) = st.claims.iter_mut().find(|c| c.id == claim.id) else {
            return Err(StoreError::corrupt(
                "reward_claims",
                format!("no row for {}", claim.id),
            ));
        };
        *slot = claim.clone();
        Ok(())
    }

    fn list_claims(&self, filter: &ClaimFilter) -> StoreResult<Vec<RewardClaim>> {
        let mut out: Vec<RewardClaim> = self
            .state
            .borrow()
            .claims
            .iter()
            .filter(|c| filter.user_id.as_ref().map_or(true, |u| &c.user_id == u))
            .filter(|c| filter.reward_id.as_ref().map_or(true, |r| &c.reward_id == r))
            .filter(|c| filter.status.map_or(true, |s| c.status == s))
            .cloned()
            .collect();
        out.sort_by_key(|c| c.claimed_at);
        Ok(out)
    }
}

impl CourseRepo for MemoryStore {
    fn insert_course(&self, course: &Course) -> StoreResult<()> {
        let mut st = self.state.borrow_mut();
        if st.courses.iter().any(|c| c.code == course.code) {
            return Err(StoreError::Conflict {
                entity: "courses",
                key: course.code.clone(),
            });
        }
        st.courses.push(course.clone());
        Ok(())
    }

    fn get_course(&self, id: &str) -> StoreResult<Option<Course>> {
        Ok(self
            .state
            .borrow()
            .courses
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    fn course_by_code(&self, code: &str) -> StoreResult<Option<Course>> {
        Ok(self
            .state
            .borrow()
            .courses
            .iter()
            .find(|c| c.code == code)
            .cloned())
    }

    fn code_exists(&self, code: &str) -> StoreResult<bool> {
        Ok(self.state.borrow().courses.iter().any(|c| c.code == code))
    }

    fn touch_course(&self, id: &str, at: DateTime<Utc>) -> StoreResult<()> {
        if let Some(c) = self.state.borrow_mut().courses.iter_mut().find(|c| c.id == id) {
            c.updated_at = at;
        }
        Ok(())
    }

    fn courses_for_teacher(&self, teacher_id: &str) -> StoreResult<Vec<Course>> {
        let st = self.state.borrow();
        let mut out: Vec<Course> = st
            .courses
            .iter()
            .filter(|c| {
                c.teacher_id == teacher_id
                    || st
                        .course_teachers
                        .iter()
                        .any(|(cid, tid)| cid == &c.id && tid == teacher_id)
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.code.cmp(&b.code)));
        Ok(out)
    }

    fn add_course_teacher(&self, course_id: &str, teacher_id: &str) -> StoreResult<()> {
        let mut st = self.state.borrow_mut();
        let exists = st
            .course_teachers
            .iter()
            .any(|(c, t)| c == course_id && t == teacher_id);
        if !exists {
            st.course_teachers
                .push((course_id.to_string(), teacher_id.to_string()));
        }
        Ok(())
    }

    fn course_teacher_ids(&self, course_id: &str) -> StoreResult<Vec<String>> {
        let st = self.state.borrow();
        let Some(course) = st.courses.iter().find(|c| c.id == course_id) else {
            return Ok(Vec::new());
        };
        let mut ids = vec![course.teacher_id.clone()];
        for (c, t) in &st.course_teachers {
            if c == course_id && !ids.contains(t) {
                ids.push(t.clone());
            }
        }
        Ok(ids)
    }
}

impl Store for MemoryStore {
    fn atomically<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<StoreError>,
    {
        if self.depth.get() > 0 {
            return f(self);
        }
        let snapshot = self.state.borrow().clone();
        self.depth.set(1);
        let out = f(self);
        self.depth.set(0);
        if out.is_err() {
            *self.state.borrow_mut() = snapshot;
        }
        out
    }
}
