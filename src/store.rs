use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::{GradebookError, GradebookResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Instructor,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "student" => Some(Self::Student),
            "instructor" => Some(Self::Instructor),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Instructor => "instructor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Semester {
    Spring,
    Summer,
    Fall,
}

impl Semester {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "spring" => Some(Self::Spring),
            "summer" => Some(Self::Summer),
            "fall" => Some(Self::Fall),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Spring => "spring",
            Self::Summer => "summer",
            Self::Fall => "fall",
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct Course {
    pub course_id: String,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct Section {
    pub section_no: i64,
    pub course_id: String,
    pub year: i64,
    pub semester: Semester,
    pub sec_id: String,
    pub instructor_id: String,
}

/// Section row joined with its course title and dashboard counts.
#[derive(Debug, Clone)]
pub struct SectionSummary {
    pub section: Section,
    pub course_title: String,
    pub enrollment_count: i64,
    pub assignment_count: i64,
}

#[derive(Debug, Clone)]
pub struct Enrollment {
    pub id: String,
    pub student_id: String,
    pub section_no: i64,
    pub final_grade: Option<String>,
}

/// Enrollment joined with the student's identity, in roster order.
#[derive(Debug, Clone)]
pub struct RosterRow {
    pub enrollment_id: String,
    pub student_id: String,
    pub student_name: String,
    pub student_email: String,
    pub final_grade: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Assignment {
    pub id: String,
    pub section_no: i64,
    pub title: String,
    pub due_date: String,
}

#[derive(Debug, Clone)]
pub struct GradeRow {
    pub id: String,
    pub enrollment_id: String,
    pub assignment_id: String,
    pub score: Option<f64>,
}

fn bad_column(idx: usize, what: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, what.into())
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    let id: String = row.get(0)?;
    let name: String = row.get(1)?;
    let email: String = row.get(2)?;
    let role_raw: String = row.get(3)?;
    let role = Role::parse(&role_raw)
        .ok_or_else(|| bad_column(3, format!("unknown role: {}", role_raw)))?;
    Ok(User {
        id,
        name,
        email,
        role,
    })
}

fn section_from_row(row: &Row) -> rusqlite::Result<Section> {
    let section_no: i64 = row.get(0)?;
    let course_id: String = row.get(1)?;
    let year: i64 = row.get(2)?;
    let semester_raw: String = row.get(3)?;
    let semester = Semester::parse(&semester_raw)
        .ok_or_else(|| bad_column(3, format!("unknown semester: {}", semester_raw)))?;
    let sec_id: String = row.get(4)?;
    let instructor_id: String = row.get(5)?;
    Ok(Section {
        section_no,
        course_id,
        year,
        semester,
        sec_id,
        instructor_id,
    })
}

// ---- courses ----

pub fn insert_course(conn: &Connection, course_id: &str, title: &str) -> GradebookResult<Course> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM courses WHERE course_id = ?",
            [course_id],
            |r| r.get(0),
        )
        .optional()?;
    if exists.is_some() {
        return Err(GradebookError::conflict(format!(
            "course already exists: {}",
            course_id
        )));
    }
    conn.execute(
        "INSERT INTO courses(course_id, title) VALUES(?, ?)",
        (course_id, title),
    )?;
    Ok(Course {
        course_id: course_id.to_string(),
        title: title.to_string(),
    })
}

pub fn course_exists(conn: &Connection, course_id: &str) -> GradebookResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM courses WHERE course_id = ?",
            [course_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn list_courses(conn: &Connection) -> GradebookResult<Vec<Course>> {
    let mut stmt = conn.prepare("SELECT course_id, title FROM courses ORDER BY course_id")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Course {
                course_id: row.get(0)?,
                title: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ---- terms ----

pub fn insert_term(conn: &Connection, year: i64, semester: Semester) -> GradebookResult<()> {
    if term_exists(conn, year, semester)? {
        return Err(GradebookError::conflict(format!(
            "term already exists: {} {}",
            year,
            semester.as_str()
        )));
    }
    conn.execute(
        "INSERT INTO terms(year, semester) VALUES(?, ?)",
        (year, semester.as_str()),
    )?;
    Ok(())
}

pub fn term_exists(conn: &Connection, year: i64, semester: Semester) -> GradebookResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM terms WHERE year = ? AND semester = ?",
            (year, semester.as_str()),
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn list_terms(conn: &Connection) -> GradebookResult<Vec<(i64, Semester)>> {
    let mut stmt = conn.prepare(
        "SELECT year, semester FROM terms
         ORDER BY year,
                  CASE semester WHEN 'spring' THEN 0 WHEN 'summer' THEN 1 ELSE 2 END",
    )?;
    let rows = stmt
        .query_map([], |row| {
            let year: i64 = row.get(0)?;
            let semester_raw: String = row.get(1)?;
            let semester = Semester::parse(&semester_raw)
                .ok_or_else(|| bad_column(1, format!("unknown semester: {}", semester_raw)))?;
            Ok((year, semester))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ---- users ----

pub fn insert_user(
    conn: &Connection,
    name: &str,
    email: &str,
    role: Role,
) -> GradebookResult<User> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO users(id, name, email, role) VALUES(?, ?, ?, ?)",
        (&id, name, email, role.as_str()),
    )?;
    Ok(User {
        id,
        name: name.to_string(),
        email: email.to_string(),
        role,
    })
}

pub fn find_user(conn: &Connection, id: &str) -> GradebookResult<Option<User>> {
    let user = conn
        .query_row(
            "SELECT id, name, email, role FROM users WHERE id = ?",
            [id],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn list_users(conn: &Connection) -> GradebookResult<Vec<User>> {
    let mut stmt =
        conn.prepare("SELECT id, name, email, role FROM users ORDER BY name, id")?;
    let rows = stmt
        .query_map([], user_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ---- sections ----

pub fn insert_section(
    conn: &Connection,
    course_id: &str,
    year: i64,
    semester: Semester,
    sec_id: &str,
    instructor_id: &str,
) -> GradebookResult<i64> {
    conn.execute(
        "INSERT INTO sections(course_id, year, semester, sec_id, instructor_id)
         VALUES(?, ?, ?, ?, ?)",
        (course_id, year, semester.as_str(), sec_id, instructor_id),
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find_section(conn: &Connection, section_no: i64) -> GradebookResult<Option<Section>> {
    let section = conn
        .query_row(
            "SELECT section_no, course_id, year, semester, sec_id, instructor_id
             FROM sections WHERE section_no = ?",
            [section_no],
            section_from_row,
        )
        .optional()?;
    Ok(section)
}

pub fn list_sections(
    conn: &Connection,
    term: Option<(i64, Semester)>,
) -> GradebookResult<Vec<SectionSummary>> {
    // Counts come from correlated subqueries to avoid double-counting joins.
    let base = "SELECT s.section_no, s.course_id, s.year, s.semester, s.sec_id, s.instructor_id,
                       c.title,
                       (SELECT COUNT(*) FROM enrollments e WHERE e.section_no = s.section_no),
                       (SELECT COUNT(*) FROM assignments a WHERE a.section_no = s.section_no)
                FROM sections s
                JOIN courses c ON c.course_id = s.course_id";

    let map_row = |row: &Row| -> rusqlite::Result<SectionSummary> {
        Ok(SectionSummary {
            section: section_from_row(row)?,
            course_title: row.get(6)?,
            enrollment_count: row.get(7)?,
            assignment_count: row.get(8)?,
        })
    };

    let rows = match term {
        Some((year, semester)) => {
            let sql = format!("{} WHERE s.year = ? AND s.semester = ? ORDER BY s.section_no", base);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map((year, semester.as_str()), map_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let sql = format!("{} ORDER BY s.section_no", base);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], map_row)?.collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(rows)
}

// ---- enrollments ----

pub fn insert_enrollment(
    conn: &Connection,
    student_id: &str,
    section_no: i64,
) -> GradebookResult<String> {
    if enrollment_exists(conn, student_id, section_no)? {
        return Err(GradebookError::conflict(
            "student is already enrolled in this section",
        ));
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO enrollments(id, student_id, section_no) VALUES(?, ?, ?)",
        (&id, student_id, section_no),
    )?;
    Ok(id)
}

pub fn enrollment_exists(
    conn: &Connection,
    student_id: &str,
    section_no: i64,
) -> GradebookResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM enrollments WHERE student_id = ? AND section_no = ?",
            (student_id, section_no),
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn find_enrollment(conn: &Connection, id: &str) -> GradebookResult<Option<Enrollment>> {
    let enrollment = conn
        .query_row(
            "SELECT id, student_id, section_no, grade FROM enrollments WHERE id = ?",
            [id],
            |row| {
                Ok(Enrollment {
                    id: row.get(0)?,
                    student_id: row.get(1)?,
                    section_no: row.get(2)?,
                    final_grade: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(enrollment)
}

/// Roster order is the canonical gradebook order: student name ascending,
/// ties broken by student id so the sequence is stable.
pub fn roster_for_section(conn: &Connection, section_no: i64) -> GradebookResult<Vec<RosterRow>> {
    let mut stmt = conn.prepare(
        "SELECT e.id, u.id, u.name, u.email, e.grade
         FROM enrollments e
         JOIN users u ON u.id = e.student_id
         WHERE e.section_no = ?
         ORDER BY u.name, u.id",
    )?;
    let rows = stmt
        .query_map([section_no], |row| {
            Ok(RosterRow {
                enrollment_id: row.get(0)?,
                student_id: row.get(1)?,
                student_name: row.get(2)?,
                student_email: row.get(3)?,
                final_grade: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn enrollments_for_student_in_term(
    conn: &Connection,
    student_id: &str,
    year: i64,
    semester: Semester,
) -> GradebookResult<Vec<Enrollment>> {
    let mut stmt = conn.prepare(
        "SELECT e.id, e.student_id, e.section_no, e.grade
         FROM enrollments e
         JOIN sections s ON s.section_no = e.section_no
         WHERE e.student_id = ? AND s.year = ? AND s.semester = ?
         ORDER BY e.section_no",
    )?;
    let rows = stmt
        .query_map((student_id, year, semester.as_str()), |row| {
            Ok(Enrollment {
                id: row.get(0)?,
                student_id: row.get(1)?,
                section_no: row.get(2)?,
                final_grade: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn set_enrollment_grade(
    conn: &Connection,
    enrollment_id: &str,
    grade: Option<&str>,
) -> GradebookResult<()> {
    conn.execute(
        "UPDATE enrollments SET grade = ? WHERE id = ?",
        (grade, enrollment_id),
    )?;
    Ok(())
}

// ---- assignments ----

pub fn insert_assignment(
    conn: &Connection,
    section_no: i64,
    title: &str,
    due_date: &str,
) -> GradebookResult<Assignment> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO assignments(id, section_no, title, due_date) VALUES(?, ?, ?, ?)",
        (&id, section_no, title, due_date),
    )?;
    Ok(Assignment {
        id,
        section_no,
        title: title.to_string(),
        due_date: due_date.to_string(),
    })
}

pub fn find_assignment(conn: &Connection, id: &str) -> GradebookResult<Option<Assignment>> {
    let assignment = conn
        .query_row(
            "SELECT id, section_no, title, due_date FROM assignments WHERE id = ?",
            [id],
            |row| {
                Ok(Assignment {
                    id: row.get(0)?,
                    section_no: row.get(1)?,
                    title: row.get(2)?,
                    due_date: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(assignment)
}

/// Due date ascending; ties broken by id so the catalog order is stable.
/// Dates are stored as %Y-%m-%d text, where lexicographic order is calendar
/// order.
pub fn assignments_for_section(
    conn: &Connection,
    section_no: i64,
) -> GradebookResult<Vec<Assignment>> {
    let mut stmt = conn.prepare(
        "SELECT id, section_no, title, due_date FROM assignments
         WHERE section_no = ?
         ORDER BY due_date, id",
    )?;
    let rows = stmt
        .query_map([section_no], |row| {
            Ok(Assignment {
                id: row.get(0)?,
                section_no: row.get(1)?,
                title: row.get(2)?,
                due_date: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn update_assignment_row(
    conn: &Connection,
    id: &str,
    title: &str,
    due_date: &str,
    section_no: i64,
) -> GradebookResult<()> {
    conn.execute(
        "UPDATE assignments SET title = ?, due_date = ?, section_no = ? WHERE id = ?",
        (title, due_date, section_no, id),
    )?;
    Ok(())
}

pub fn delete_assignment_row(conn: &Connection, id: &str) -> GradebookResult<()> {
    conn.execute("DELETE FROM assignments WHERE id = ?", [id])?;
    Ok(())
}

// ---- grades ----

pub fn find_grade_by_id(conn: &Connection, id: &str) -> GradebookResult<Option<GradeRow>> {
    let grade = conn
        .query_row(
            "SELECT id, enrollment_id, assignment_id, score FROM grades WHERE id = ?",
            [id],
            grade_from_row,
        )
        .optional()?;
    Ok(grade)
}

pub fn grades_for_assignment(
    conn: &Connection,
    assignment_id: &str,
) -> GradebookResult<Vec<GradeRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, enrollment_id, assignment_id, score FROM grades WHERE assignment_id = ?",
    )?;
    let rows = stmt
        .query_map([assignment_id], grade_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn grades_for_enrollment(
    conn: &Connection,
    enrollment_id: &str,
) -> GradebookResult<Vec<GradeRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, enrollment_id, assignment_id, score FROM grades WHERE enrollment_id = ?",
    )?;
    let rows = stmt
        .query_map([enrollment_id], grade_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn grade_from_row(row: &Row) -> rusqlite::Result<GradeRow> {
    Ok(GradeRow {
        id: row.get(0)?,
        enrollment_id: row.get(1)?,
        assignment_id: row.get(2)?,
        score: row.get(3)?,
    })
}

/// Grade rows are created lazily on first write; concurrent writers to the
/// same cell resolve last-writer-wins through the upsert.
pub fn upsert_grade(
    conn: &Connection,
    enrollment_id: &str,
    assignment_id: &str,
    score: Option<f64>,
) -> GradebookResult<()> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO grades(id, enrollment_id, assignment_id, score, updated_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(enrollment_id, assignment_id) DO UPDATE SET
           score = excluded.score,
           updated_at = excluded.updated_at",
        (&id, enrollment_id, assignment_id, score, &now),
    )?;
    Ok(())
}

pub fn update_grade_score(
    conn: &Connection,
    grade_id: &str,
    score: Option<f64>,
) -> GradebookResult<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE grades SET score = ?, updated_at = ? WHERE id = ?",
        (score, &now, grade_id),
    )?;
    Ok(())
}

pub fn scored_grade_count_for_assignment(
    conn: &Connection,
    assignment_id: &str,
) -> GradebookResult<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM grades WHERE assignment_id = ? AND score IS NOT NULL",
        [assignment_id],
        |r| r.get(0),
    )?;
    Ok(count)
}

pub fn delete_grades_for_assignment(
    conn: &Connection,
    assignment_id: &str,
) -> GradebookResult<()> {
    conn.execute("DELETE FROM grades WHERE assignment_id = ?", [assignment_id])?;
    Ok(())
}
