use crate::directory::require_user;
use crate::error::{AmistError, AmistResult, StoreError};
use crate::events::AmistEvent;
use crate::model::{Course, StudentProfile};
use crate::roles::Role;
use crate::service::{new_id, Amist};
use crate::store::Store;

const SCHOOL_PREFIX_LEN: usize = 3;

/// `ESC7` for ("Escuela Primaria", "7° Básico"). Only ASCII letters and
/// digits of the school name count, so codes stay typeable on any keyboard.
pub fn code_prefix(school: &str, grade: &str) -> AmistResult<String> {
    let school_part: String = school
        .chars()
        .flat_map(char::to_uppercase)
        .filter(char::is_ascii_alphanumeric)
        .take(SCHOOL_PREFIX_LEN)
        .collect();
    if school_part.is_empty() {
        return Err(AmistError::InvalidInput(
            "school must contain at least one ASCII letter or digit".into(),
        ));
    }
    let grade_part: String = grade.chars().filter(|c| c.is_ascii_digit()).collect();
    Ok(format!("{school_part}{grade_part}"))
}

fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

impl<S: Store> Amist<S> {
    /// Picks a code whose suffix is not in use yet. Gives up after the
    /// configured number of attempts; hitting that bound means the prefix
    /// space is crowded or the suffix source is broken.
    pub fn generate_course_code(&self, school: &str, grade: &str) -> AmistResult<String> {
        let prefix = code_prefix(school, grade)?;
        self.next_free_code(&self.store, &prefix)
    }

    fn next_free_code(&self, store: &S, prefix: &str) -> AmistResult<String> {
        let attempts = self.config.code_max_attempts.max(1);
        for attempt in 1..=attempts {
            let code = format!(
                "{prefix}{}",
                self.suffixes.next_suffix(self.config.code_suffix_len)
            );
            if !store.code_exists(&code)? {
                return Ok(code);
            }
            tracing::warn!(code = %code, attempt, "course code collision");
        }
        Err(AmistError::CodeGenerationExhausted { attempts })
    }

    pub fn create_course(
        &self,
        name: &str,
        grade: &str,
        school: &str,
        teacher_id: &str,
    ) -> AmistResult<Course> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AmistError::InvalidInput("name must not be empty".into()));
        }
        let prefix = code_prefix(school, grade)?;
        let now = self.now();

        let course = self.store.atomically(|store| -> AmistResult<_> {
            require_user(store, teacher_id, Some(Role::Teacher))?;
            let attempts = self.config.code_max_attempts.max(1);
            for _ in 0..attempts {
                let course = Course {
                    id: new_id(),
                    code: self.next_free_code(store, &prefix)?,
                    name: name.to_string(),
                    grade: grade.trim().to_string(),
                    school: school.trim().to_string(),
                    teacher_id: teacher_id.to_string(),
                    created_at: now,
                    updated_at: now,
                };
                match store.insert_course(&course) {
                    Ok(()) => return Ok(course),
                    // Lost a race with another writer on the UNIQUE index.
                    Err(StoreError::Conflict { key, .. }) => {
                        tracing::warn!(code = %key, "course code taken on insert, regenerating");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Err(AmistError::CodeGenerationExhausted { attempts })
        })?;
        tracing::info!(course_id = %course.id, code = %course.code, teacher_id, "course created");
        Ok(course)
    }

    pub fn get_course(&self, id: &str) -> AmistResult<Course> {
        self.store
            .get_course(id)?
            .ok_or_else(|| AmistError::not_found("course", id))
    }

    /// Owner first, then co-teachers.
    pub fn course_teacher_ids(&self, course_id: &str) -> AmistResult<Vec<String>> {
        Ok(self.store.course_teacher_ids(course_id)?)
    }

    /// Sets the student's course unconditionally. A student who was already
    /// in another course is moved; there is no capacity limit.
    pub fn join_course_by_code(&self, student_id: &str, code: &str) -> AmistResult<Course> {
        let code = normalize_code(code);
        let now = self.now();
        let (course, previous) = self.store.atomically(|store| -> AmistResult<_> {
            require_user(store, student_id, Some(Role::Student))?;
            let course = store
                .course_by_code(&code)?
                .ok_or_else(|| AmistError::InvalidCourseCode(code.clone()))?;
            let mut profile = store.get_student(student_id)?.unwrap_or_else(|| StudentProfile {
                user_id: student_id.to_string(),
                school: course.school.clone(),
                grade: course.grade.clone(),
                ..StudentProfile::default()
            });
            let previous = profile.course_id.replace(course.id.clone());
            store.upsert_student(&profile)?;
            store.touch_course(&course.id, now)?;
            Ok((course, previous))
        })?;
        tracing::info!(student_id, course_id = %course.id, previous = ?previous, "student joined course");
        self.events.publish(
            AmistEvent::CourseJoined {
                student_id: student_id.to_string(),
                course_id: course.id.clone(),
                previous_course_id: previous,
            },
            now,
        );
        Ok(course)
    }

    pub fn add_course_teacher(&self, course_id: &str, teacher_id: &str) -> AmistResult<Vec<String>> {
        let now = self.now();
        self.store.atomically(|store| -> AmistResult<_> {
            require_user(store, teacher_id, Some(Role::Teacher))?;
            if store.get_course(course_id)?.is_none() {
                return Err(AmistError::not_found("course", course_id));
            }
            store.add_course_teacher(course_id, teacher_id)?;
            store.touch_course(course_id, now)?;
            Ok(store.course_teacher_ids(course_id)?)
        })
    }
}
