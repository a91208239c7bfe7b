use std::collections::{HashMap, HashSet};

use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

use crate::db;
use crate::error::{GradebookError, GradebookResult};
use crate::guard;
use crate::store::{self, Semester};

/// One gradebook cell as the instructor sees it: the student from the
/// roster joined with their grade for one assignment. `grade_id` and
/// `score` are null until a score is first recorded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeView {
    pub grade_id: Option<String>,
    pub enrollment_id: String,
    pub assignment_id: String,
    pub student_name: String,
    pub student_email: String,
    pub assignment_title: String,
    pub course_id: String,
    pub section_id: String,
    pub score: Option<f64>,
}

/// One gradebook cell as a student sees it across a term, with the
/// assignment's due date attached.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentGradeView {
    pub grade_id: Option<String>,
    pub enrollment_id: String,
    pub assignment_id: String,
    pub student_name: String,
    pub student_email: String,
    pub assignment_title: String,
    pub due_date: String,
    pub course_id: String,
    pub section_id: String,
    pub score: Option<f64>,
}

/// One entry of a batch score update. References an existing grade row by
/// id, or an (enrollment, assignment) pair for cells never scored before.
#[derive(Debug, Clone)]
pub struct GradeUpdate {
    pub grade_id: Option<String>,
    pub enrollment_id: Option<String>,
    pub assignment_id: Option<String>,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRange {
    pub min: f64,
    pub max: f64,
}

impl Default for ScoreRange {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 100.0,
        }
    }
}

impl ScoreRange {
    fn contains(self, score: f64) -> bool {
        score >= self.min && score <= self.max
    }
}

/// Grading policy from the settings table; missing or unreadable values
/// fall back to the 0..=100 default.
pub fn load_score_range(conn: &Connection) -> GradebookResult<ScoreRange> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM settings WHERE key = ?",
            [db::GRADING_SETTINGS_KEY],
            |r| r.get(0),
        )
        .optional()?;
    let mut range = ScoreRange::default();
    if let Some(text) = raw {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) {
            if let Some(min) = value.get("scoreMin").and_then(|v| v.as_f64()) {
                range.min = min;
            }
            if let Some(max) = value.get("scoreMax").and_then(|v| v.as_f64()) {
                range.max = max;
            }
        }
    }
    Ok(range)
}

/// Instructor view of one assignment: exactly one row per enrolled
/// student, in roster order. Cells never scored get a placeholder view
/// with null grade id and score, so the caller always sees the full
/// roster.
pub fn grades_for_assignment(
    conn: &Connection,
    actor_id: &str,
    assignment_id: &str,
) -> GradebookResult<Vec<GradeView>> {
    let assignment = store::find_assignment(conn, assignment_id)?
        .ok_or_else(|| GradebookError::not_found("assignment", assignment_id.to_string()))?;
    let (_, section) = guard::require_section_manager(conn, actor_id, assignment.section_no)?;

    let roster = store::roster_for_section(conn, section.section_no)?;
    let by_enrollment: HashMap<String, store::GradeRow> =
        store::grades_for_assignment(conn, assignment_id)?
            .into_iter()
            .map(|g| (g.enrollment_id.clone(), g))
            .collect();

    let views = roster
        .into_iter()
        .map(|row| {
            let grade = by_enrollment.get(&row.enrollment_id);
            GradeView {
                grade_id: grade.map(|g| g.id.clone()),
                enrollment_id: row.enrollment_id,
                assignment_id: assignment.id.clone(),
                student_name: row.student_name,
                student_email: row.student_email,
                assignment_title: assignment.title.clone(),
                course_id: section.course_id.clone(),
                section_id: section.sec_id.clone(),
                score: grade.and_then(|g| g.score),
            }
        })
        .collect();
    Ok(views)
}

/// Student view of a term: every assignment of every section the student
/// is enrolled in, merged and ordered by due date (ties by assignment id)
/// regardless of which section contributed the row. Zero enrollments is an
/// empty list, not an error.
pub fn assignments_for_student(
    conn: &Connection,
    actor_id: &str,
    student_id: &str,
    year: i64,
    semester: &str,
) -> GradebookResult<Vec<AssignmentGradeView>> {
    if actor_id != student_id {
        return Err(GradebookError::forbidden(
            "students may only read their own gradebook",
        ));
    }
    let actor = guard::require_actor(conn, actor_id)?;
    let semester = Semester::parse(semester).ok_or_else(|| {
        GradebookError::validation(format!(
            "semester must be spring, summer, or fall, got: {}",
            semester
        ))
    })?;
    if !store::term_exists(conn, year, semester)? {
        return Err(GradebookError::not_found(
            "term",
            format!("{} {}", year, semester.as_str()),
        ));
    }

    let mut views = Vec::new();
    for enrollment in store::enrollments_for_student_in_term(conn, student_id, year, semester)? {
        let section = store::find_section(conn, enrollment.section_no)?.ok_or_else(|| {
            GradebookError::not_found("section", enrollment.section_no.to_string())
        })?;
        let by_assignment: HashMap<String, store::GradeRow> =
            store::grades_for_enrollment(conn, &enrollment.id)?
                .into_iter()
                .map(|g| (g.assignment_id.clone(), g))
                .collect();
        for assignment in store::assignments_for_section(conn, enrollment.section_no)? {
            let grade = by_assignment.get(&assignment.id);
            views.push(AssignmentGradeView {
                grade_id: grade.map(|g| g.id.clone()),
                enrollment_id: enrollment.id.clone(),
                assignment_id: assignment.id.clone(),
                student_name: actor.name.clone(),
                student_email: actor.email.clone(),
                assignment_title: assignment.title,
                due_date: assignment.due_date,
                course_id: section.course_id.clone(),
                section_id: section.sec_id.clone(),
                score: grade.and_then(|g| g.score),
            });
        }
    }
    views.sort_by(|a, b| {
        a.due_date
            .cmp(&b.due_date)
            .then_with(|| a.assignment_id.cmp(&b.assignment_id))
    });
    Ok(views)
}

/// Applies a batch of score updates atomically: every entry is resolved,
/// authorized, and validated before the first write, and the whole batch
/// commits or rolls back together. A null score returns the cell to
/// ungraded. Returns the number of cells written.
pub fn update_grades(
    conn: &Connection,
    actor_id: &str,
    updates: &[GradeUpdate],
) -> GradebookResult<usize> {
    if updates.is_empty() {
        return Ok(0);
    }
    let actor = guard::require_actor(conn, actor_id)?;
    let range = load_score_range(conn)?;

    // Dropping the transaction on any early return rolls the batch back.
    let tx = conn.unchecked_transaction()?;

    let mut managed: HashSet<i64> = HashSet::new();
    let mut resolved: Vec<(Option<String>, String, String, Option<f64>)> =
        Vec::with_capacity(updates.len());

    for entry in updates {
        let (grade_id, enrollment_id, assignment) = match &entry.grade_id {
            Some(grade_id) => {
                let grade = store::find_grade_by_id(&tx, grade_id)?
                    .ok_or_else(|| GradebookError::not_found("grade", grade_id.clone()))?;
                let assignment = store::find_assignment(&tx, &grade.assignment_id)?
                    .ok_or_else(|| {
                        GradebookError::not_found("assignment", grade.assignment_id.clone())
                    })?;
                (Some(grade.id), grade.enrollment_id, assignment)
            }
            None => {
                let (enrollment_id, assignment_id) =
                    match (&entry.enrollment_id, &entry.assignment_id) {
                        (Some(e), Some(a)) => (e, a),
                        _ => {
                            return Err(GradebookError::validation(
                                "each update needs a gradeId or an enrollmentId and assignmentId",
                            ))
                        }
                    };
                let enrollment = store::find_enrollment(&tx, enrollment_id)?
                    .ok_or_else(|| GradebookError::not_found("enrollment", enrollment_id.clone()))?;
                let assignment = store::find_assignment(&tx, assignment_id)?
                    .ok_or_else(|| GradebookError::not_found("assignment", assignment_id.clone()))?;
                if enrollment.section_no != assignment.section_no {
                    return Err(GradebookError::validation(format!(
                        "enrollment {} and assignment {} belong to different sections",
                        enrollment.id, assignment.id
                    )));
                }
                (None, enrollment.id, assignment)
            }
        };

        if !managed.contains(&assignment.section_no) {
            let section = store::find_section(&tx, assignment.section_no)?.ok_or_else(|| {
                GradebookError::not_found("section", assignment.section_no.to_string())
            })?;
            if !guard::can_manage_section(&actor, &section) {
                return Err(GradebookError::forbidden(format!(
                    "actor {} does not manage section {}",
                    actor.id, section.section_no
                )));
            }
            managed.insert(assignment.section_no);
        }

        if let Some(score) = entry.score {
            if !score.is_finite() {
                return Err(GradebookError::validation("score must be a finite number"));
            }
            if !range.contains(score) {
                return Err(GradebookError::validation(format!(
                    "score {} is outside the allowed range {}..={}",
                    score, range.min, range.max
                )));
            }
        }

        resolved.push((grade_id, enrollment_id, assignment.id, entry.score));
    }

    for (grade_id, enrollment_id, assignment_id, score) in &resolved {
        match grade_id {
            Some(grade_id) => store::update_grade_score(&tx, grade_id, *score)?,
            None => store::upsert_grade(&tx, enrollment_id, assignment_id, *score)?,
        }
    }
    tx.commit()?;
    Ok(resolved.len())
}
