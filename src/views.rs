//! Per-role read views. Each call recomputes from the store.

use crate::directory::require_user;
use crate::error::{AmistError, AmistResult};
use crate::model::{Course, StudentProfile, User};
use crate::roles::Role;
use crate::service::Amist;
use crate::store::Store;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentView {
    pub user: User,
    pub profile: Option<StudentProfile>,
    pub course: Option<Course>,
    pub teachers: Vec<User>,
    pub balance: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherCourseView {
    #[serde(flatten)]
    pub course: Course,
    pub owner: bool,
    pub student_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorStudentView {
    pub user: User,
    pub profile: StudentProfile,
    pub balance: i64,
}

impl<S: Store> Amist<S> {
    pub fn get_student_profile(&self, user_id: &str) -> AmistResult<StudentView> {
        let user = require_user(&self.store, user_id, Some(Role::Student))?;
        let profile = self.store.get_student(user_id)?;
        let course = match profile.as_ref().and_then(|p| p.course_id.as_deref()) {
            Some(course_id) => self.store.get_course(course_id)?,
            None => None,
        };
        let mut teachers = Vec::new();
        if let Some(c) = course.as_ref() {
            for id in self.store.course_teacher_ids(&c.id)? {
                // Teacher rows are never deleted, but a dangling id should not
                // hide the rest of the profile.
                match self.store.get_user(&id)? {
                    Some(t) => teachers.push(t),
                    None => tracing::warn!(course_id = %c.id, teacher_id = %id, "course teacher missing"),
                }
            }
        }
        let balance = self.store.balance(user_id)?;
        tracing::debug!(user_id, balance, "student profile view");
        Ok(StudentView {
            user,
            profile,
            course,
            teachers,
            balance,
        })
    }

    pub fn get_teacher_courses(&self, teacher_id: &str) -> AmistResult<Vec<TeacherCourseView>> {
        require_user(&self.store, teacher_id, Some(Role::Teacher))?;
        self.store
            .courses_for_teacher(teacher_id)?
            .into_iter()
            .map(|course| {
                let student_count = self.store.students_in_course(&course.id)?.len();
                Ok(TeacherCourseView {
                    owner: course.teacher_id == teacher_id,
                    course,
                    student_count,
                })
            })
            .collect::<Result<Vec<_>, AmistError>>()
    }

    pub fn get_tutor_students(&self, tutor_id: &str) -> AmistResult<Vec<TutorStudentView>> {
        require_user(&self.store, tutor_id, Some(Role::Tutor))?;
        let mut out = Vec::new();
        for profile in self.store.students_by_tutor(tutor_id)? {
            let Some(user) = self.store.get_user(&profile.user_id)? else {
                tracing::warn!(tutor_id, student_id = %profile.user_id, "tutored student missing");
                continue;
            };
            let balance = self.store.balance(&user.id)?;
            out.push(TutorStudentView {
                user,
                profile,
                balance,
            });
        }
        out.sort_by(|a, b| a.user.name.cmp(&b.user.name));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::NewTransaction;
    use crate::model::TransactionType;
    use crate::service::testing::memory_core;

    #[test]
    fn student_view_joins_course_teachers_and_balance() {
        let (core, _, _) = memory_core();
        let owner = core.create_user("t1@x.cl", "Tomás", Role::Teacher).unwrap();
        let co = core.create_user("t2@x.cl", "Teresa", Role::Teacher).unwrap();
        let s = core.create_user("s@x.cl", "Sofía", Role::Student).unwrap();
        let c = core.create_course("7A", "7", "Escuela", &owner.id).unwrap();
        core.add_course_teacher(&c.id, &co.id).unwrap();
        core.join_course_by_code(&s.id, &c.code).unwrap();
        core.record_transaction(NewTransaction {
            user_id: &s.id,
            amount: 35,
            kind: TransactionType::Bonus,
            description: "ayuda",
            created_by: Some(&owner.id),
            related_id: None,
        })
        .unwrap();

        let view = core.get_student_profile(&s.id).unwrap();
        assert_eq!(view.course.unwrap().id, c.id);
        assert_eq!(
            view.teachers.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
            vec![owner.id.as_str(), co.id.as_str()]
        );
        assert_eq!(view.balance, 35);
    }

    #[test]
    fn student_without_course_has_empty_view_parts() {
        let (core, _, _) = memory_core();
        let s = core.create_user("s@x.cl", "Sofía", Role::Student).unwrap();
        let view = core.get_student_profile(&s.id).unwrap();
        assert!(view.profile.is_none());
        assert!(view.course.is_none());
        assert!(view.teachers.is_empty());
        assert_eq!(view.balance, 0);
    }

    #[test]
    fn teacher_courses_count_students() {
        let (core, _, _) = memory_core();
        let t = core.create_user("t@x.cl", "Tomás", Role::Teacher).unwrap();
        let a = core.create_course("B curso", "7", "Escuela", &t.id).unwrap();
        core.create_course("A curso", "8", "Escuela", &t.id).unwrap();
        for n in 0..3 {
            let s = core
                .create_user(&format!("s{n}@x.cl"), &format!("S{n}"), Role::Student)
                .unwrap();
            core.join_course_by_code(&s.id, &a.code).unwrap();
        }
        let courses = core.get_teacher_courses(&t.id).unwrap();
        assert_eq!(
            courses.iter().map(|c| (c.course.name.as_str(), c.student_count)).collect::<Vec<_>>(),
            vec![("A curso", 0), ("B curso", 3)]
        );
        assert!(courses.iter().all(|c| c.owner));
    }

    #[test]
    fn tutor_students_sorted_with_balances() {
        let (core, _, _) = memory_core();
        let tutor = core.create_user("tu@x.cl", "Tía", Role::Tutor).unwrap();
        let b = core.create_user("b@x.cl", "Bruno", Role::Student).unwrap();
        let a = core.create_user("a@x.cl", "Ana", Role::Student).unwrap();
        core.assign_tutor(&b.id, &tutor.id).unwrap();
        core.assign_tutor(&a.id, &tutor.id).unwrap();
        core.record_transaction(NewTransaction {
            user_id: &b.id,
            amount: 12,
            kind: TransactionType::System,
            description: "inicio",
            created_by: None,
            related_id: None,
        })
        .unwrap();

        let rows = core.get_tutor_students(&tutor.id).unwrap();
        assert_eq!(
            rows.iter().map(|r| (r.user.name.as_str(), r.balance)).collect::<Vec<_>>(),
            vec![("Ana", 0), ("Bruno", 12)]
        );
    }

    #[test]
    fn views_check_roles() {
        let (core, _, _) = memory_core();
        let s = core.create_user("s@x.cl", "Sofía", Role::Student).unwrap();
        assert!(matches!(
            core.get_teacher_courses(&s.id),
            Err(AmistError::RoleMismatch { .. })
        ));
        assert!(matches!(
            core.get_tutor_students("ghost"),
            Err(AmistError::NotFound { .. })
        ));
    }
}
