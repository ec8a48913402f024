//! User roles and the teacher's student roster

use rusqlite::{params, Connection};

use crate::error::{CoreError, CoreResult};

/// Role resolved for an authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

/// Roster entry created by a teacher. `student_uid` stays empty until
/// the student claims the entry by email match.
#[derive(Debug, Clone)]
pub struct StudentRecord {
    pub id: i64,
    pub teacher_uid: String,
    pub student_uid: Option<String>,
    pub student_email: String,
    pub display_name: String,
    pub active: bool,
}

/// Register an authenticated user with a role. The identity itself is
/// established by the auth collaborator; this only records the role.
pub fn add_user(
    conn: &Connection,
    uid: &str,
    role: Role,
    display_name: &str,
    email: &str,
) -> CoreResult<()> {
    conn.execute(
        "INSERT INTO users (uid, role, display_name, email) VALUES (?1, ?2, ?3, ?4)",
        params![uid, role.as_str(), display_name, email],
    )?;
    Ok(())
}

/// Role for a uid, or `None` when the user is unknown.
pub fn user_role(conn: &Connection, uid: &str) -> CoreResult<Option<Role>> {
    let mut stmt = conn.prepare("SELECT role FROM users WHERE uid = ?1")?;
    let result = stmt.query_row(params![uid], |row| row.get::<_, String>(0));

    match result {
        Ok(role) => Ok(match role.as_str() {
            "teacher" => Some(Role::Teacher),
            "student" => Some(Role::Student),
            _ => None,
        }),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn verify_teacher(conn: &Connection, uid: &str) -> CoreResult<()> {
    match user_role(conn, uid)? {
        Some(Role::Teacher) => Ok(()),
        _ => Err(CoreError::PermissionDenied("user must be a teacher".to_string())),
    }
}

pub(crate) fn verify_student(conn: &Connection, uid: &str) -> CoreResult<()> {
    match user_role(conn, uid)? {
        Some(Role::Student) => Ok(()),
        _ => Err(CoreError::PermissionDenied("user must be a student".to_string())),
    }
}

fn student_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StudentRecord> {
    Ok(StudentRecord {
        id: row.get(0)?,
        teacher_uid: row.get(1)?,
        student_uid: row.get(2)?,
        student_email: row.get(3)?,
        display_name: row.get(4)?,
        active: row.get::<_, i64>(5)? != 0,
    })
}

const STUDENT_COLUMNS: &str =
    "id, teacher_uid, student_uid, student_email, display_name, active";

/// Roster entry claimed by the given student uid.
pub fn student_by_uid(conn: &Connection, student_uid: &str) -> CoreResult<Option<StudentRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STUDENT_COLUMNS} FROM students WHERE student_uid = ?1"
    ))?;
    let result = stmt.query_row(params![student_uid], student_from_row);

    match result {
        Ok(record) => Ok(Some(record)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Teacher creates an unclaimed roster entry for a student email.
pub fn create_student(
    conn: &Connection,
    teacher_uid: &str,
    student_email: &str,
    display_name: &str,
) -> CoreResult<i64> {
    if student_email.trim().is_empty() || display_name.trim().is_empty() {
        return Err(CoreError::InvalidArgument(
            "studentEmail and displayName are required".to_string(),
        ));
    }
    verify_teacher(conn, teacher_uid)?;

    let mut stmt = conn.prepare(
        "SELECT id FROM students WHERE teacher_uid = ?1 AND student_email = ?2 LIMIT 1",
    )?;
    let existing = stmt.query_row(params![teacher_uid, student_email], |row| {
        row.get::<_, i64>(0)
    });
    match existing {
        Ok(_) => {
            return Err(CoreError::AlreadyExists(
                "student with this email already exists".to_string(),
            ))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => {}
        Err(e) => return Err(e.into()),
    }

    conn.execute(
        "INSERT INTO students (teacher_uid, student_uid, student_email, display_name, active)
         VALUES (?1, NULL, ?2, ?3, 1)",
        params![teacher_uid, student_email, display_name],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Student claims the unclaimed roster entry matching their email.
/// The email comes from the auth collaborator, not from client input.
pub fn claim_student_account(
    conn: &Connection,
    student_uid: &str,
    student_email: &str,
) -> CoreResult<i64> {
    verify_student(conn, student_uid)?;

    let mut stmt = conn.prepare(
        "SELECT id FROM students WHERE student_email = ?1 AND student_uid IS NULL LIMIT 1",
    )?;
    let row = stmt.query_row(params![student_email], |row| row.get::<_, i64>(0));
    let student_id = match row {
        Ok(id) => id,
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            return Err(CoreError::NotFound(
                "no unclaimed student account found for this email".to_string(),
            ))
        }
        Err(e) => return Err(e.into()),
    };

    conn.execute(
        "UPDATE students SET student_uid = ?1 WHERE id = ?2",
        params![student_uid, student_id],
    )?;
    Ok(student_id)
}
