use crate::error::{AmistError, AmistResult, StoreError};
use crate::model::{StudentProfile, TeacherProfile, TutorProfile, User};
use crate::roles::Role;
use crate::service::{new_id, Amist};
use crate::store::Store;

fn normalize_email(raw: &str) -> AmistResult<String> {
    let email = raw.trim().to_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        return Err(AmistError::InvalidInput(format!("invalid email: {raw}")));
    }
    Ok(email)
}

/// Loads a user and checks its role.
pub(crate) fn require_user<S: Store>(store: &S, id: &str, role: Option<Role>) -> AmistResult<User> {
    let user = store
        .get_user(id)?
        .ok_or_else(|| AmistError::not_found("user", id))?;
    if let Some(expected) = role {
        if user.role != expected {
            return Err(AmistError::RoleMismatch {
                id: id.to_string(),
                expected: expected.as_str(),
                actual: user.role.as_str(),
            });
        }
    }
    Ok(user)
}

impl<S: Store> Amist<S> {
    pub fn create_user(&self, email: &str, name: &str, role: Role) -> AmistResult<User> {
        let email = normalize_email(email)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(AmistError::InvalidInput("name must not be empty".into()));
        }
        let user = User {
            id: new_id(),
            email,
            name: name.to_string(),
            role,
            created_at: self.now(),
        };
        match self.store.insert_user(&user) {
            Ok(()) => {}
            Err(StoreError::Conflict { .. }) => return Err(AmistError::DuplicateEmail(user.email)),
            Err(e) => return Err(e.into()),
        }
        tracing::info!(user_id = %user.id, role = %user.role, "user created");
        Ok(user)
    }

    pub fn get_user(&self, id: &str) -> AmistResult<User> {
        require_user(&self.store, id, None)
    }

    pub fn list_users(&self, role: Option<Role>) -> AmistResult<Vec<User>> {
        Ok(self.store.list_users(role)?)
    }

    /// Creates or replaces the student fields. `tutor_id` and `course_id`
    /// are kept from the stored profile; they change through
    /// `assign_tutor` and `join_course_by_code`.
    pub fn upsert_student_profile(
        &self,
        user_id: &str,
        school: &str,
        grade: &str,
    ) -> AmistResult<StudentProfile> {
        self.store.atomically(|store| -> AmistResult<_> {
            require_user(store, user_id, Some(Role::Student))?;
            let mut profile = store.get_student(user_id)?.unwrap_or_else(|| StudentProfile {
                user_id: user_id.to_string(),
                ..StudentProfile::default()
            });
            profile.school = school.trim().to_string();
            profile.grade = grade.trim().to_string();
            store.upsert_student(&profile)?;
            Ok(profile)
        })
    }

    pub fn upsert_teacher_profile(
        &self,
        user_id: &str,
        school: &str,
        subjects: &[String],
    ) -> AmistResult<TeacherProfile> {
        self.store.atomically(|store| -> AmistResult<_> {
            require_user(store, user_id, Some(Role::Teacher))?;
            let profile = TeacherProfile {
                user_id: user_id.to_string(),
                school: school.trim().to_string(),
                subjects: subjects
                    .iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            };
            store.upsert_teacher(&profile)?;
            Ok(profile)
        })
    }

    pub fn upsert_tutor_profile(&self, user_id: &str, relationship: &str) -> AmistResult<TutorProfile> {
        self.store.atomically(|store| -> AmistResult<_> {
            require_user(store, user_id, Some(Role::Tutor))?;
            let profile = TutorProfile {
                user_id: user_id.to_string(),
                relationship: relationship.trim().to_string(),
            };
            store.upsert_tutor(&profile)?;
            Ok(profile)
        })
    }

    /// Last write wins: any previous tutor is replaced without a check.
    pub fn assign_tutor(&self, student_id: &str, tutor_id: &str) -> AmistResult<StudentProfile> {
        self.store.atomically(|store| -> AmistResult<_> {
            require_user(store, student_id, Some(Role::Student))?;
            require_user(store, tutor_id, Some(Role::Tutor))?;
            let mut profile = store.get_student(student_id)?.unwrap_or_else(|| StudentProfile {
                user_id: student_id.to_string(),
                ..StudentProfile::default()
            });
            let previous = profile.tutor_id.replace(tutor_id.to_string());
            store.upsert_student(&profile)?;
            tracing::info!(student_id, tutor_id, previous = ?previous, "tutor assigned");
            Ok(profile)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::memory_core;

    #[test]
    fn email_is_unique_case_insensitively() {
        let (core, _, _) = memory_core();
        core.create_user("Ana@School.cl", "Ana", Role::Student).unwrap();
        let err = core
            .create_user(" ana@school.cl ", "Ana Two", Role::Teacher)
            .unwrap_err();
        assert!(matches!(err, AmistError::DuplicateEmail(e) if e == "ana@school.cl"));
    }

    #[test]
    fn rejects_malformed_email_and_blank_name() {
        let (core, _, _) = memory_core();
        assert!(matches!(
            core.create_user("nope", "X", Role::Admin),
            Err(AmistError::InvalidInput(_))
        ));
        assert!(matches!(
            core.create_user("x@y.cl", "  ", Role::Admin),
            Err(AmistError::InvalidInput(_))
        ));
    }

    #[test]
    fn assign_tutor_replaces_previous_and_checks_roles() {
        let (core, _, _) = memory_core();
        let s = core.create_user("s@x.cl", "Sofía", Role::Student).unwrap();
        let t1 = core.create_user("t1@x.cl", "Tío", Role::Tutor).unwrap();
        let t2 = core.create_user("t2@x.cl", "Tía", Role::Tutor).unwrap();

        core.assign_tutor(&s.id, &t1.id).unwrap();
        let p = core.assign_tutor(&s.id, &t2.id).unwrap();
        assert_eq!(p.tutor_id.as_deref(), Some(t2.id.as_str()));

        let err = core.assign_tutor(&t1.id, &t2.id).unwrap_err();
        assert!(matches!(err, AmistError::RoleMismatch { expected: "student", .. }));
    }

    #[test]
    fn student_profile_upsert_keeps_assignments() {
        let (core, _, _) = memory_core();
        let s = core.create_user("s@x.cl", "Sofía", Role::Student).unwrap();
        let t = core.create_user("t@x.cl", "Tío", Role::Tutor).unwrap();
        core.assign_tutor(&s.id, &t.id).unwrap();
        let p = core.upsert_student_profile(&s.id, "Escuela Primaria", "7° Básico").unwrap();
        assert_eq!(p.tutor_id.as_deref(), Some(t.id.as_str()));
        assert_eq!(p.grade, "7° Básico");
    }
}
