use std::collections::HashSet;

use rusqlite::Connection;
use serde::Serialize;

use crate::error::{GradebookError, GradebookResult};
use crate::guard;
use crate::store::{self, Role};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub enrollment_id: String,
    pub student_id: String,
    pub student_name: String,
    pub student_email: String,
    pub grade: Option<String>,
}

/// One entry of a final-grade batch; a null grade clears the letter.
#[derive(Debug, Clone)]
pub struct FinalGradeUpdate {
    pub enrollment_id: String,
    pub grade: Option<String>,
}

fn validate_final_grade(raw: Option<&str>) -> GradebookResult<Option<String>> {
    match raw {
        None => Ok(None),
        Some(s) => {
            let grade = s.trim();
            if grade.is_empty() || grade.chars().count() > 4 {
                return Err(GradebookError::validation(format!(
                    "final grade must be 1 to 4 characters, got: {:?}",
                    s
                )));
            }
            Ok(Some(grade.to_string()))
        }
    }
}

/// Roster in canonical order, gated to the managing instructor.
pub fn roster_for_section(
    conn: &Connection,
    actor_id: &str,
    section_no: i64,
) -> GradebookResult<Vec<RosterEntry>> {
    guard::require_section_manager(conn, actor_id, section_no)?;
    let rows = store::roster_for_section(conn, section_no)?;
    Ok(rows
        .into_iter()
        .map(|row| RosterEntry {
            enrollment_id: row.enrollment_id,
            student_id: row.student_id,
            student_name: row.student_name,
            student_email: row.student_email,
            grade: row.final_grade,
        })
        .collect())
}

/// Registers a student into a section. Registrar-level operation; the
/// uniqueness of (student, section) is enforced as a conflict.
pub fn enroll_student(
    conn: &Connection,
    student_id: &str,
    section_no: i64,
) -> GradebookResult<String> {
    let student = store::find_user(conn, student_id)?
        .ok_or_else(|| GradebookError::not_found("user", student_id.to_string()))?;
    if student.role != Role::Student {
        return Err(GradebookError::validation(format!(
            "only students can be enrolled, {} is an instructor",
            student.id
        )));
    }
    if store::find_section(conn, section_no)?.is_none() {
        return Err(GradebookError::not_found("section", section_no.to_string()));
    }
    store::insert_enrollment(conn, student_id, section_no)
}

/// Applies a batch of final letter grades atomically: every enrollment is
/// resolved, authorized, and validated before the first write.
pub fn update_final_grades(
    conn: &Connection,
    actor_id: &str,
    updates: &[FinalGradeUpdate],
) -> GradebookResult<usize> {
    if updates.is_empty() {
        return Ok(0);
    }
    let actor = guard::require_actor(conn, actor_id)?;

    let tx = conn.unchecked_transaction()?;
    let mut managed: HashSet<i64> = HashSet::new();
    let mut writes: Vec<(String, Option<String>)> = Vec::with_capacity(updates.len());

    for update in updates {
        let enrollment = store::find_enrollment(&tx, &update.enrollment_id)?.ok_or_else(|| {
            GradebookError::not_found("enrollment", update.enrollment_id.clone())
        })?;
        if !managed.contains(&enrollment.section_no) {
            let section = store::find_section(&tx, enrollment.section_no)?.ok_or_else(|| {
                GradebookError::not_found("section", enrollment.section_no.to_string())
            })?;
            if !guard::can_manage_section(&actor, &section) {
                return Err(GradebookError::forbidden(format!(
                    "actor {} does not manage section {}",
                    actor.id, section.section_no
                )));
            }
            managed.insert(enrollment.section_no);
        }
        let grade = validate_final_grade(update.grade.as_deref())?;
        writes.push((enrollment.id, grade));
    }

    for (enrollment_id, grade) in &writes {
        store::set_enrollment_grade(&tx, enrollment_id, grade.as_deref())?;
    }
    tx.commit()?;
    Ok(writes.len())
}
