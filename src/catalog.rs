use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;

use crate::error::{GradebookError, GradebookResult};
use crate::guard;
use crate::store::{self, Assignment, Section};

/// Assignment as the boundary sees it, with the owning section denormalized
/// in.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentView {
    pub id: String,
    pub title: String,
    pub due_date: String,
    pub course_id: String,
    pub section_id: String,
    pub section_no: i64,
}

fn view(assignment: &Assignment, section: &Section) -> AssignmentView {
    AssignmentView {
        id: assignment.id.clone(),
        title: assignment.title.clone(),
        due_date: assignment.due_date.clone(),
        course_id: section.course_id.clone(),
        section_id: section.sec_id.clone(),
        section_no: section.section_no,
    }
}

fn validate_title(raw: &str) -> GradebookResult<String> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(GradebookError::validation("assignment title must not be empty"));
    }
    Ok(title.to_string())
}

/// Dates are stored in canonical %Y-%m-%d form so that text order is
/// calendar order.
fn validate_due_date(raw: &str) -> GradebookResult<String> {
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        GradebookError::validation(format!("due date must be a YYYY-MM-DD date, got: {}", raw))
    })?;
    Ok(date.format("%Y-%m-%d").to_string())
}

/// Catalog listing for a section, in due-date order. Readable by the
/// managing instructor or an enrolled student.
pub fn list_assignments(
    conn: &Connection,
    actor_id: &str,
    section_no: i64,
) -> GradebookResult<Vec<AssignmentView>> {
    let section = store::find_section(conn, section_no)?
        .ok_or_else(|| GradebookError::not_found("section", section_no.to_string()))?;
    let actor = guard::require_actor(conn, actor_id)?;
    if !guard::can_manage_section(&actor, &section)
        && !guard::can_view_as_student(conn, &actor, section_no)?
    {
        return Err(GradebookError::forbidden(format!(
            "actor {} may not read section {}",
            actor.id, section_no
        )));
    }
    let assignments = store::assignments_for_section(conn, section_no)?;
    Ok(assignments.iter().map(|a| view(a, &section)).collect())
}

pub fn create_assignment(
    conn: &Connection,
    actor_id: &str,
    section_no: i64,
    title: &str,
    due_date: &str,
) -> GradebookResult<AssignmentView> {
    let (_, section) = guard::require_section_manager(conn, actor_id, section_no)?;
    let title = validate_title(title)?;
    let due_date = validate_due_date(due_date)?;
    let assignment = store::insert_assignment(conn, section_no, &title, &due_date)?;
    Ok(view(&assignment, &section))
}

/// Title and due date are replaced outright; everything else is immutable
/// except an optional move to another section the actor also manages.
pub fn update_assignment(
    conn: &Connection,
    actor_id: &str,
    assignment_id: &str,
    title: &str,
    due_date: &str,
    new_section_no: Option<i64>,
) -> GradebookResult<AssignmentView> {
    let assignment = store::find_assignment(conn, assignment_id)?
        .ok_or_else(|| GradebookError::not_found("assignment", assignment_id.to_string()))?;
    let (actor, current) =
        guard::require_section_manager(conn, actor_id, assignment.section_no)?;
    let title = validate_title(title)?;
    let due_date = validate_due_date(due_date)?;

    let target = match new_section_no {
        Some(no) if no != assignment.section_no => {
            let target = store::find_section(conn, no)?
                .ok_or_else(|| GradebookError::not_found("section", no.to_string()))?;
            if !guard::can_manage_section(&actor, &target) {
                return Err(GradebookError::forbidden(format!(
                    "actor {} does not manage section {}",
                    actor.id, no
                )));
            }
            target
        }
        _ => current,
    };

    store::update_assignment_row(conn, assignment_id, &title, &due_date, target.section_no)?;
    Ok(AssignmentView {
        id: assignment.id,
        title,
        due_date,
        course_id: target.course_id.clone(),
        section_id: target.sec_id.clone(),
        section_no: target.section_no,
    })
}

/// Deletion policy: any recorded score blocks the delete with a conflict;
/// unscored placeholder rows carry no data and are removed with the
/// assignment in the same transaction.
pub fn delete_assignment(
    conn: &Connection,
    actor_id: &str,
    assignment_id: &str,
) -> GradebookResult<()> {
    let assignment = store::find_assignment(conn, assignment_id)?
        .ok_or_else(|| GradebookError::not_found("assignment", assignment_id.to_string()))?;
    guard::require_section_manager(conn, actor_id, assignment.section_no)?;

    let scored = store::scored_grade_count_for_assignment(conn, assignment_id)?;
    if scored > 0 {
        return Err(GradebookError::conflict(format!(
            "assignment has {} recorded grade(s); clear them before deleting",
            scored
        )));
    }

    let tx = conn.unchecked_transaction()?;
    store::delete_grades_for_assignment(&tx, assignment_id)?;
    store::delete_assignment_row(&tx, assignment_id)?;
    tx.commit()?;
    Ok(())
}
