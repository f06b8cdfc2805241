use chrono::DateTime;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::StoreError;
use crate::models::{Candidate, CandidateFilter};

type Result<T> = std::result::Result<T, StoreError>;

const SCHEMA_VERSION: i64 = 1;

const CANDIDATE_COLUMNS: &str = "id, first_name, last_name, photo, phone_number, email,
     date_of_birth, expected_salary, note, is_favorite";

/// Single owned SQLite connection holding the `candidates` table.
pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let db = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        db.init()?;
        info!(path = %path.display(), "opened candidate database");
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
            path: None,
        };
        db.init()?;
        Ok(db)
    }

    /// `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Idempotent schema setup, run on every open.
    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS candidates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                photo BLOB NOT NULL DEFAULT x'',
                phone_number TEXT NOT NULL,
                email TEXT NOT NULL,
                date_of_birth INTEGER NOT NULL,
                expected_salary INTEGER NOT NULL CHECK (expected_salary >= 0),
                note TEXT,
                is_favorite INTEGER NOT NULL DEFAULT 0 CHECK (is_favorite IN (0, 1))
            );

            CREATE INDEX IF NOT EXISTS idx_candidates_name
                ON candidates(last_name, first_name, id);
            CREATE INDEX IF NOT EXISTS idx_candidates_favorite
                ON candidates(is_favorite, last_name, first_name, id);
            "#,
        )?;
        self.conn
            .pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(())
    }

    // --- Mutations ---

    /// Inserts a row and returns the new id. `candidate.id` is ignored.
    pub fn insert_candidate(&self, candidate: &Candidate) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO candidates (first_name, last_name, photo, phone_number, email,
                                     date_of_birth, expected_salary, note, is_favorite)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                candidate.first_name,
                candidate.last_name,
                candidate.photo,
                candidate.phone_number,
                candidate.email,
                candidate.date_of_birth.timestamp_millis(),
                candidate.expected_salary,
                candidate.note,
                candidate.is_favorite,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Full replace of the row with `candidate.id`. Returns the number of rows
    /// touched, 0 when the id is unknown.
    pub fn update_candidate(&self, candidate: &Candidate) -> Result<usize> {
        let updated = self.conn.execute(
            "UPDATE candidates
             SET first_name = ?1, last_name = ?2, photo = ?3, phone_number = ?4, email = ?5,
                 date_of_birth = ?6, expected_salary = ?7, note = ?8, is_favorite = ?9
             WHERE id = ?10",
            params![
                candidate.first_name,
                candidate.last_name,
                candidate.photo,
                candidate.phone_number,
                candidate.email,
                candidate.date_of_birth.timestamp_millis(),
                candidate.expected_salary,
                candidate.note,
                candidate.is_favorite,
                candidate.id,
            ],
        )?;
        Ok(updated)
    }

    pub fn set_favorite(&self, id: i64, favorite: bool) -> Result<usize> {
        let updated = self.conn.execute(
            "UPDATE candidates SET is_favorite = ?1 WHERE id = ?2",
            params![favorite, id],
        )?;
        Ok(updated)
    }

    pub fn delete_candidate(&self, id: i64) -> Result<usize> {
        let deleted = self
            .conn
            .execute("DELETE FROM candidates WHERE id = ?1", [id])?;
        Ok(deleted)
    }

    pub fn delete_all_candidates(&self) -> Result<usize> {
        let deleted = self.conn.execute("DELETE FROM candidates", [])?;
        Ok(deleted)
    }

    // --- Queries ---

    pub fn get_candidate(&self, id: i64) -> Result<Option<Candidate>> {
        let candidate = self
            .conn
            .query_row(
                &format!("SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE id = ?1"),
                [id],
                Self::row_to_candidate,
            )
            .optional()?;
        Ok(candidate)
    }

    /// Candidates matching `filter`, ordered by last name, first name, id.
    pub fn list_candidates(&self, filter: &CandidateFilter) -> Result<Vec<Candidate>> {
        let mut sql = format!("SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE 1=1");
        let mut values: Vec<Value> = vec![];

        if let Some(favorite) = filter.favorite {
            values.push(Value::Integer(favorite as i64));
            sql.push_str(&format!(" AND is_favorite = ?{}", values.len()));
        }

        if let Some(name) = &filter.name {
            values.push(Value::Text(format!("%{}%", escape_like(name))));
            let n = values.len();
            sql.push_str(&format!(
                " AND (first_name LIKE ?{n} ESCAPE '\\' OR last_name LIKE ?{n} ESCAPE '\\')"
            ));
        }

        sql.push_str(" ORDER BY last_name, first_name, id");

        let mut stmt = self.conn.prepare_cached(&sql)?;
        let candidates = stmt
            .query_map(params_from_iter(values), Self::row_to_candidate)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(candidates)
    }

    pub fn count_candidates(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM candidates", [], |row| row.get(0))?;
        Ok(count)
    }

    fn row_to_candidate(row: &rusqlite::Row) -> rusqlite::Result<Candidate> {
        let millis: i64 = row.get(6)?;
        let date_of_birth = DateTime::from_timestamp_millis(millis)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(6, millis))?;
        let note: Option<String> = row.get(8)?;
        Ok(Candidate {
            id: row.get(0)?,
            first_name: row.get(1)?,
            last_name: row.get(2)?,
            photo: row.get(3)?,
            phone_number: row.get(4)?,
            email: row.get(5)?,
            date_of_birth,
            expected_salary: row.get(7)?,
            note: note.unwrap_or_default(),
            is_favorite: row.get(9)?,
        })
    }
}

/// Escapes LIKE wildcards so the pattern is matched literally.
fn escape_like(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
