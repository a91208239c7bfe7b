use crate::error::GradebookError;
use crate::ipc::error::{domain_err, err, ok};
use crate::ipc::types::{AppState, Request};
use crate::roster::{self, FinalGradeUpdate};
use crate::store::{self, Role, Semester};
use serde_json::json;

fn handle_sections_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(course_id) = req.params.get("courseId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing courseId", None);
    };
    let Some(year) = req.params.get("year").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing year", None);
    };
    let Some(semester_raw) = req.params.get("semester").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing semester", None);
    };
    let Some(sec_id) = req.params.get("secId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing secId", None);
    };
    let Some(instructor_id) = req.params.get("instructorId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing instructorId", None);
    };

    let semester = match Semester::parse(semester_raw) {
        Some(s) => s,
        None => {
            return domain_err(
                &req.id,
                GradebookError::validation(format!(
                    "semester must be spring, summer, or fall, got: {}",
                    semester_raw
                )),
            )
        }
    };
    let sec_id = sec_id.trim();
    if sec_id.is_empty() {
        return domain_err(
            &req.id,
            GradebookError::validation("secId must not be empty"),
        );
    }

    match store::course_exists(conn, course_id) {
        Ok(true) => {}
        Ok(false) => {
            return domain_err(
                &req.id,
                GradebookError::not_found("course", course_id.to_string()),
            )
        }
        Err(e) => return domain_err(&req.id, e),
    }
    match store::term_exists(conn, year, semester) {
        Ok(true) => {}
        Ok(false) => {
            return domain_err(
                &req.id,
                GradebookError::not_found("term", format!("{} {}", year, semester.as_str())),
            )
        }
        Err(e) => return domain_err(&req.id, e),
    }
    let instructor = match store::find_user(conn, instructor_id) {
        Ok(Some(u)) => u,
        Ok(None) => {
            return domain_err(
                &req.id,
                GradebookError::not_found("user", instructor_id.to_string()),
            )
        }
        Err(e) => return domain_err(&req.id, e),
    };
    if instructor.role != Role::Instructor {
        return domain_err(
            &req.id,
            GradebookError::validation(format!(
                "section owner must have the instructor role, {} is a student",
                instructor.id
            )),
        );
    }

    match store::insert_section(conn, course_id, year, semester, sec_id, instructor_id) {
        Ok(section_no) => ok(
            &req.id,
            json!({
                "sectionNo": section_no,
                "courseId": course_id,
                "year": year,
                "semester": semester.as_str(),
                "secId": sec_id,
                "instructorId": instructor_id
            }),
        ),
        Err(e) => domain_err(&req.id, e),
    }
}

fn handle_sections_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "sections": [] }));
    };

    let year = req.params.get("year").and_then(|v| v.as_i64());
    let semester_raw = req.params.get("semester").and_then(|v| v.as_str());
    let term = match (year, semester_raw) {
        (None, None) => None,
        (Some(year), Some(raw)) => match Semester::parse(raw) {
            Some(s) => Some((year, s)),
            None => {
                return domain_err(
                    &req.id,
                    GradebookError::validation(format!(
                        "semester must be spring, summer, or fall, got: {}",
                        raw
                    )),
                )
            }
        },
        _ => {
            return err(
                &req.id,
                "bad_params",
                "year and semester must be provided together",
                None,
            )
        }
    };

    match store::list_sections(conn, term) {
        Ok(rows) => {
            let sections: Vec<serde_json::Value> = rows
                .iter()
                .map(|s| {
                    json!({
                        "sectionNo": s.section.section_no,
                        "courseId": s.section.course_id,
                        "courseTitle": s.course_title,
                        "year": s.section.year,
                        "semester": s.section.semester.as_str(),
                        "secId": s.section.sec_id,
                        "instructorId": s.section.instructor_id,
                        "studentCount": s.enrollment_count,
                        "assignmentCount": s.assignment_count
                    })
                })
                .collect();
            ok(&req.id, json!({ "sections": sections }))
        }
        Err(e) => domain_err(&req.id, e),
    }
}

fn handle_sections_enroll(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(student_id) = req.params.get("studentId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };
    let Some(section_no) = req.params.get("sectionNo").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing sectionNo", None);
    };

    match roster::enroll_student(conn, student_id, section_no) {
        Ok(enrollment_id) => ok(
            &req.id,
            json!({
                "enrollmentId": enrollment_id,
                "studentId": student_id,
                "sectionNo": section_no
            }),
        ),
        Err(e) => domain_err(&req.id, e),
    }
}

fn handle_sections_roster(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(actor_id) = req.params.get("actorId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing actorId", None);
    };
    let Some(section_no) = req.params.get("sectionNo").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing sectionNo", None);
    };

    match roster::roster_for_section(conn, actor_id, section_no) {
        Ok(entries) => ok(&req.id, json!({ "roster": entries })),
        Err(e) => domain_err(&req.id, e),
    }
}

fn handle_update_final_grades(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(actor_id) = req.params.get("actorId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing actorId", None);
    };
    let Some(entries) = req.params.get("updates").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "updates must be an array", None);
    };

    let mut updates: Vec<FinalGradeUpdate> = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let Some(obj) = entry.as_object() else {
            return err(
                &req.id,
                "bad_params",
                format!("updates[{}] must be an object", i),
                None,
            );
        };
        let Some(enrollment_id) = obj.get("enrollmentId").and_then(|v| v.as_str()) else {
            return err(
                &req.id,
                "bad_params",
                format!("updates[{}] missing enrollmentId", i),
                None,
            );
        };
        let grade = match obj.get("grade") {
            None | Some(serde_json::Value::Null) => None,
            Some(v) => match v.as_str() {
                Some(s) => Some(s.to_string()),
                None => {
                    return err(
                        &req.id,
                        "bad_params",
                        format!("updates[{}].grade must be a string or null", i),
                        None,
                    )
                }
            },
        };
        updates.push(FinalGradeUpdate {
            enrollment_id: enrollment_id.to_string(),
            grade,
        });
    }

    match roster::update_final_grades(conn, actor_id, &updates) {
        Ok(updated) => ok(&req.id, json!({ "updated": updated })),
        Err(e) => domain_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sections.create" => Some(handle_sections_create(state, req)),
        "sections.list" => Some(handle_sections_list(state, req)),
        "sections.enroll" => Some(handle_sections_enroll(state, req)),
        "sections.roster" => Some(handle_sections_roster(state, req)),
        "enrollments.updateFinalGrades" => Some(handle_update_final_grades(state, req)),
        _ => None,
    }
}
