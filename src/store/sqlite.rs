use super::{ClaimRepo, CourseRepo, DirectoryRepo, LedgerRepo, RewardRepo, Store};
use crate::db::{self, ts_from_sql, ts_to_sql};
use crate::error::{StoreError, StoreResult};
use crate::model::{
    ClaimFilter, Course, PointsTransaction, Reward, RewardClaim, StudentProfile, TeacherProfile,
    TransactionFilter, TutorProfile, User,
};
use crate::roles::Role;
use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::path::Path;
use std::str::FromStr;

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            conn: db::open_db(workspace)?,
        })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        db::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

fn conversion_err(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    ts_from_sql(&raw).map_err(|e| conversion_err(idx, e.to_string()))
}

fn opt_ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| ts_from_sql(&s).map_err(|e| conversion_err(idx, e.to_string())))
        .transpose()
}

fn parsed_col<T: FromStr<Err = String>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| conversion_err(idx, e))
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

const USER_COLS: &str = "id, email, name, role, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        role: parsed_col(row, 3)?,
        created_at: ts_col(row, 4)?,
    })
}

const STUDENT_COLS: &str = "user_id, school, grade, tutor_id, course_id";

fn student_from_row(row: &Row<'_>) -> rusqlite::Result<StudentProfile> {
    Ok(StudentProfile {
        user_id: row.get(0)?,
        school: row.get(1)?,
        grade: row.get(2)?,
        tutor_id: row.get(3)?,
        course_id: row.get(4)?,
    })
}

const COURSE_COLS: &str = "c.id, c.code, c.name, c.grade, c.school, c.teacher_id, c.created_at, c.updated_at";

fn course_from_row(row: &Row<'_>) -> rusqlite::Result<Course> {
    Ok(Course {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        grade: row.get(3)?,
        school: row.get(4)?,
        teacher_id: row.get(5)?,
        created_at: ts_col(row, 6)?,
        updated_at: ts_col(row, 7)?,
    })
}

const TX_COLS: &str = "id, user_id, amount, type, description, created_at, created_by, related_id";

fn tx_from_row(row: &Row<'_>) -> rusqlite::Result<PointsTransaction> {
    Ok(PointsTransaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        amount: row.get(2)?,
        kind: parsed_col(row, 3)?,
        description: row.get(4)?,
        created_at: ts_col(row, 5)?,
        created_by: row.get(6)?,
        related_id: row.get(7)?,
    })
}

const REWARD_COLS: &str =
    "id, title, description, points_cost, stock, active, category, created_by, created_at, expires_at";

fn reward_from_row(row: &Row<'_>) -> rusqlite::Result<Reward> {
    Ok(Reward {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        points_cost: row.get(3)?,
        stock: row.get(4)?,
        active: row.get::<_, i64>(5)? != 0,
        category: row.get(6)?,
        created_by: row.get(7)?,
        created_at: ts_col(row, 8)?,
        expires_at: opt_ts_col(row, 9)?,
    })
}

const CLAIM_COLS: &str =
    "id, user_id, reward_id, points_spent, status, claimed_at, processed_at, processed_by, reason";

fn claim_from_row(row: &Row<'_>) -> rusqlite::Result<RewardClaim> {
    Ok(RewardClaim {
        id: row.get(0)?,
        user_id: row.get(1)?,
        reward_id: row.get(2)?,
        points_spent: row.get(3)?,
        status: parsed_col(row, 4)?,
        claimed_at: ts_col(row, 5)?,
        processed_at: opt_ts_col(row, 6)?,
        processed_by: row.get(7)?,
        reason: row.get(8)?,
    })
}

impl DirectoryRepo for SqliteStore {
    fn insert_user(&self, user: &User) -> StoreResult<()> {
        let res = self.conn.execute(
            "INSERT INTO users(id, email, name, role, created_at) VALUES(?, ?, ?, ?, ?)",
            (
                &user.id,
                &user.email,
                &user.name,
                user.role.as_str(),
                ts_to_sql(&user.created_at),
            ),
        );
        match res {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::Conflict {
                entity: "users",
                key: user.email.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLS} FROM users WHERE id = ?");
        Ok(self.conn.query_row(&sql, [id], user_from_row).optional()?)
    }

    fn list_users(&self, role: Option<Role>) -> StoreResult<Vec<User>> {
        let mut sql = format!("SELECT {USER_COLS} FROM users");
        let mut bind: Vec<Value> = Vec::new();
        if let Some(r) = role {
            sql.push_str(" WHERE role = ?");
            bind.push(Value::Text(r.as_str().to_string()));
        }
        sql.push_str(" ORDER BY name, email");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(bind), user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn upsert_student(&self, p: &StudentProfile) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO student_profiles(user_id, school, grade, tutor_id, course_id)
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
               school = excluded.school,
               grade = excluded.grade,
               tutor_id = excluded.tutor_id,
               course_id = excluded.course_id",
            (&p.user_id, &p.school, &p.grade, &p.tutor_id, &p.course_id),
        )?;
        Ok(())
    }

    fn get_student(&self, user_id: &str) -> StoreResult<Option<StudentProfile>> {
        let sql = format!("SELECT {STUDENT_COLS} FROM student_profiles WHERE user_id = ?");
        Ok(self
            .conn
            .query_row(&sql, [user_id], student_from_row)
            .optional()?)
    }

    fn students_by_tutor(&self, tutor_id: &str) -> StoreResult<Vec<StudentProfile>> {
        let sql = format!(
            "SELECT {STUDENT_COLS} FROM student_profiles WHERE tutor_id = ? ORDER BY rowid"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([tutor_id], student_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn students_in_course(&self, course_id: &str) -> StoreResult<Vec<StudentProfile>> {
        let sql = format!(
            "SELECT {STUDENT_COLS} FROM student_profiles WHERE course_id = ? ORDER BY rowid"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([course_id], student_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn upsert_teacher(&self, p: &TeacherProfile) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO teacher_profiles(user_id, school, subjects_json) VALUES(?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
               school = excluded.school,
               subjects_json = excluded.subjects_json",
            (&p.user_id, &p.school, serde_json::to_string(&p.subjects)?),
        )?;
        Ok(())
    }

    fn get_teacher(&self, user_id: &str) -> StoreResult<Option<TeacherProfile>> {
        let row: Option<(String, String, String)> = self
            .conn
            .query_row(
                "SELECT user_id, school, subjects_json FROM teacher_profiles WHERE user_id = ?",
                [user_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;
        let Some((user_id, school, subjects_json)) = row else {
            return Ok(None);
        };
        Ok(Some(TeacherProfile {
            user_id,
            school,
            subjects: serde_json::from_str(&subjects_json)?,
        }))
    }

    fn upsert_tutor(&self, p: &TutorProfile) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO tutor_profiles(user_id, relationship) VALUES(?, ?)
             ON CONFLICT(user_id) DO UPDATE SET relationship = excluded.relationship",
            (&p.user_id, &p.relationship),
        )?;
        Ok(())
    }

    fn get_tutor(&self, user_id: &str) -> StoreResult<Option<TutorProfile>> {
        Ok(self
            .conn
            .query_row(
                "SELECT user_id, relationship FROM tutor_profiles WHERE user_id = ?",
                [user_id],
                |r| {
                    Ok(TutorProfile {
                        user_id: r.get(0)?,
                        relationship: r.get(1)?,
                    })
                },
            )
            .optional()?)
    }
}

impl LedgerRepo for SqliteStore {
    fn append_transaction(&self, tx: &PointsTransaction) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO points_transactions(id, user_id, amount, type, description, created_at, created_by, related_id)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &tx.id,
                &tx.user_id,
                tx.amount,
                tx.kind.as_str(),
                &tx.description,
                ts_to_sql(&tx.created_at),
                &tx.created_by,
                &tx.related_id,
            ),
        )?;
        Ok(())
    }

    fn balance(&self, user_id: &str) -> StoreResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM points_transactions WHERE user_id = ?",
            [user_id],
            |r| r.get(0),
        )?)
    }

    fn list_transactions(
        &self,
        user_id: &str,
        filter: &TransactionFilter,
    ) -> StoreResult<Vec<PointsTransaction>> {
        let mut sql = format!("SELECT {TX_COLS} FROM points_transactions WHERE user_id = ?");
        let mut bind: Vec<Value> = vec![Value::Text(user_id.to_string())];
        if let Some(since) = filter.since.as_ref() {
            sql.push_str(" AND created_at >= ?");
            bind.push(Value::Text(ts_to_sql(since)));
        }
        if let Some(kind) = filter.kind {
            sql.push_str(" AND type = ?");
            bind.push(Value::Text(kind.as_str().to_string()));
        }
        sql.push_str(" ORDER BY created_at, rowid");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            bind.push(Value::Integer(limit as i64));
        }
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(bind), tx_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl RewardRepo for SqliteStore {
    fn insert_reward(&self, r: &Reward) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO rewards(id, title, description, points_cost, stock, active, category, created_by, created_at, expires_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &r.id,
                &r.title,
                &r.description,
                r.points_cost,
                r.stock,
                r.active as i64,
                &r.category,
                &r.created_by,
                ts_to_sql(&r.created_at),
                r.expires_at.as_ref().map(ts_to_sql),
            ),
        )?;
        Ok(())
    }

    fn get_reward(&self, id: &str) -> StoreResult<Option<Reward>> {
        let sql = format!("SELECT {REWARD_COLS} FROM rewards WHERE id = ?");
        Ok(self.conn.query_row(&sql, [id], reward_from_row).optional()?)
    }

    fn save_reward(&self, r: &Reward) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE rewards SET
               title = ?, description = ?, points_cost = ?, stock = ?,
               active = ?, category = ?, expires_at = ?
             WHERE id = ?",
            (
                &r.title,
                &r.description,
                r.points_cost,
                r.stock,
                r.active as i64,
                &r.category,
                r.expires_at.as_ref().map(ts_to_sql),
                &r.id,
            ),
        )?;
        if changed != 1 {
            return Err(StoreError::corrupt("rewards", format!("no row for {}", r.id)));
        }
        Ok(())
    }

    fn list_rewards(&self) -> StoreResult<Vec<Reward>> {
        let sql = format!("SELECT {REWARD_COLS} FROM rewards ORDER BY created_at, rowid");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], reward_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl ClaimRepo for SqliteStore {
    fn insert_claim(&self, c: &RewardClaim) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO reward_claims(id, user_id, reward_id, points_spent, status, claimed_at, processed_at, processed_by, reason)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &c.id,
                &c.user_id,
                &c.reward_id,
                c.points_spent,
                c.status.as_str(),
                ts_to_sql(&c.claimed_at),
                c.processed_at.as_ref().map(ts_to_sql),
                &c.processed_by,
                &c.reason,
            ),
        )?;
        Ok(())
    }

    fn get_claim(&self, id: &str) -> StoreResult<Option<RewardClaim>> {
        let sql = format!("SELECT {CLAIM_COLS} FROM reward_claims WHERE id = ?");
        Ok(self.conn.query_row(&sql, [id], claim_from_row).optional()?)
    }

    fn save_claim(&self, c: &RewardClaim) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE reward_claims SET status = ?, processed_at = ?, processed_by = ?, reason = ?
             WHERE id = ?",
            (
                c.status.as_str(),
                c.processed_at.as_ref().map(ts_to_sql),
                &c.processed_by,
                &c.reason,
                &c.id,
            ),
        )?;
        if changed != 1 {
            return Err(StoreError::corrupt(
                "reward_claims",
                format!("no row for {}", c.id),
            ));
        }
        Ok(())
    }

    fn list_claims(&self, filter: &ClaimFilter) -> StoreResult<Vec<RewardClaim>> {
        let mut sql = format!("SELECT {CLAIM_COLS} FROM reward_claims WHERE 1 = 1");
        let mut bind: Vec<Value> = Vec::new();
        if let Some(user_id) = filter.user_id.as_ref() {
            sql.push_str(" AND user_id = ?");
            bind.push(Value::Text(user_id.clone()));
        }
        if let Some(reward_id) = filter.reward_id.as_ref() {
            sql.push_str(" AND reward_id = ?");
            bind.push(Value::Text(reward_id.clone()));
        }
        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            bind.push(Value::Text(status.as_str().to_string()));
        }
        sql.push_str(" ORDER BY claimed_at, rowid");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(bind), claim_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl CourseRepo for SqliteStore {
    fn insert_course(&self, c: &Course) -> StoreResult<()> {
        let res = self.conn.execute(
            "INSERT INTO courses(id, code, name, grade, school, teacher_id, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &c.id,
                &c.code,
                &c.name,
                &c.grade,
                &c.school,
                &c.teacher_id,
                ts_to_sql(&c.created_at),
                ts_to_sql(&c.updated_at),
            ),
        );
        match res {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StoreError::Conflict {
                entity: "courses",
                key: c.code.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn get_course(&self, id: &str) -> StoreResult<Option<Course>> {
        let sql = format!("SELECT {COURSE_COLS} FROM courses c WHERE c.id = ?");
        Ok(self.conn.query_row(&sql, [id], course_from_row).optional()?)
    }

    fn course_by_code(&self, code: &str) -> StoreResult<Option<Course>> {
        let sql = format!("SELECT {COURSE_COLS} FROM courses c WHERE c.code = ?");
        Ok(self
            .conn
            .query_row(&sql, [code], course_from_row)
            .optional()?)
    }

    fn code_exists(&self, code: &str) -> StoreResult<bool> {
        let hit: Option<i64> = self
            .conn
            .query_row("SELECT 1 FROM courses WHERE code = ?", [code], |r| r.get(0))
            .optional()?;
        Ok(hit.is_some())
    }

    fn touch_course(&self, id: &str, at: DateTime<Utc>) -> StoreResult<()> {
        self.conn.execute(
            "UPDATE courses SET updated_at = ? WHERE id = ?",
            (ts_to_sql(&at), id),
        )?;
        Ok(())
    }

    fn courses_for_teacher(&self, teacher_id: &str) -> StoreResult<Vec<Course>> {
        let sql = format!(
            "SELECT {COURSE_COLS} FROM courses c
             WHERE c.teacher_id = ?1
                OR EXISTS (
                  SELECT 1 FROM course_teachers ct
                  WHERE ct.course_id = c.id AND ct.teacher_id = ?1
                )
             ORDER BY c.name, c.code"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([teacher_id], course_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn add_course_teacher(&self, course_id: &str, teacher_id: &str) -> StoreResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO course_teachers(course_id, teacher_id) VALUES(?, ?)",
            (course_id, teacher_id),
        )?;
        Ok(())
    }

    fn course_teacher_ids(&self, course_id: &str) -> StoreResult<Vec<String>> {
        let owner: Option<String> = self
            .conn
            .query_row(
                "SELECT teacher_id FROM courses WHERE id = ?",
                [course_id],
                |r| r.get(0),
            )
            .optional()?;
        let Some(owner) = owner else {
            return Ok(Vec::new());
        };
        let mut stmt = self.conn.prepare(
            "SELECT teacher_id FROM course_teachers WHERE course_id = ? ORDER BY rowid",
        )?;
        let co = stmt
            .query_map([course_id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let mut ids = vec![owner];
        for id in co {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

impl Store for SqliteStore {
    fn atomically<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<StoreError>,
    {
        if !self.conn.is_autocommit() {
            return f(self);
        }
        // IMMEDIATE takes the write lock up front, so balance and stock reads
        // inside `f` cannot go stale before our writes land.
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let out = f(self)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TransactionType;
    use chrono::TimeZone;

    fn at(min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 8, min, 0).unwrap()
    }

    fn user(id: &str, email: &str, role: Role) -> User {
        User {
            id: id.into(),
            email: email.into(),
            name: id.into(),
            role,
            created_at: at(0),
        }
    }

    fn tx(id: &str, amount: i64, min: u32) -> PointsTransaction {
        PointsTransaction {
            id: id.into(),
            user_id: "s1".into(),
            amount,
            kind: TransactionType::Bonus,
            description: String::new(),
            created_at: at(min),
            created_by: None,
            related_id: None,
        }
    }

    fn store_with_student() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_user(&user("s1", "s1@x.cl", Role::Student)).unwrap();
        store
    }

    #[test]
    fn duplicate_email_is_conflict() {
        let store = store_with_student();
        let err = store
            .insert_user(&user("s2", "s1@x.cl", Role::Student))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { entity: "users", .. }));
    }

    #[test]
    fn failed_unit_rolls_back_every_write() {
        let store = store_with_student();
        let out: Result<(), StoreError> = store.atomically(|s| {
            s.append_transaction(&tx("t1", 50, 1))?;
            Err(StoreError::corrupt("points_transactions", "boom"))
        });
        assert!(out.is_err());
        assert_eq!(store.balance("s1").unwrap(), 0);
        assert!(store.conn().is_autocommit());
    }

    #[test]
    fn nested_units_join_outer() {
        let store = store_with_student();
        let out: Result<(), StoreError> = store.atomically(|s| {
            s.atomically(|inner| inner.append_transaction(&tx("t1", 5, 1)))?;
            Err(StoreError::corrupt("points_transactions", "outer fails"))
        });
        assert!(out.is_err());
        assert_eq!(store.balance("s1").unwrap(), 0);
    }

    #[test]
    fn transactions_keep_insertion_order_on_equal_timestamps() {
        let store = store_with_student();
        store.append_transaction(&tx("b", 1, 2)).unwrap();
        store.append_transaction(&tx("a", 2, 2)).unwrap();
        store.append_transaction(&tx("c", -1, 1)).unwrap();
        let all = store
            .list_transactions("s1", &TransactionFilter::default())
            .unwrap();
        assert_eq!(
            all.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
            vec!["c", "b", "a"]
        );
        assert_eq!(store.balance("s1").unwrap(), 2);
        let since = store
            .list_transactions(
                "s1",
                &TransactionFilter {
                    since: Some(at(2)),
                    limit: Some(1),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].id, "b");
    }
}
