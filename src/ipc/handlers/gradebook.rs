use crate::gradebook::{self, GradeUpdate};
use crate::ipc::error::{domain_err, err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_for_assignment(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(actor_id) = req.params.get("actorId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing actorId", None);
    };
    let Some(assignment_id) = req.params.get("assignmentId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing assignmentId", None);
    };

    match gradebook::grades_for_assignment(conn, actor_id, assignment_id) {
        Ok(grades) => ok(&req.id, json!({ "grades": grades })),
        Err(e) => domain_err(&req.id, e),
    }
}

fn handle_for_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(actor_id) = req.params.get("actorId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing actorId", None);
    };
    let Some(student_id) = req.params.get("studentId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing studentId", None);
    };
    let Some(year) = req.params.get("year").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing year", None);
    };
    let Some(semester) = req.params.get("semester").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing semester", None);
    };

    match gradebook::assignments_for_student(conn, actor_id, student_id, year, semester) {
        Ok(assignments) => ok(&req.id, json!({ "assignments": assignments })),
        Err(e) => domain_err(&req.id, e),
    }
}

fn handle_grades_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(actor_id) = req.params.get("actorId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing actorId", None);
    };
    let Some(entries) = req.params.get("updates").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "updates must be an array", None);
    };

    let mut updates: Vec<GradeUpdate> = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let Some(obj) = entry.as_object() else {
            return err(
                &req.id,
                "bad_params",
                format!("updates[{}] must be an object", i),
                None,
            );
        };

        let get_id = |key: &str| -> Result<Option<String>, serde_json::Value> {
            match obj.get(key) {
                None | Some(serde_json::Value::Null) => Ok(None),
                Some(v) => match v.as_str() {
                    Some(s) => Ok(Some(s.to_string())),
                    None => Err(err(
                        &req.id,
                        "bad_params",
                        format!("updates[{}].{} must be a string or null", i, key),
                        None,
                    )),
                },
            }
        };
        let grade_id = match get_id("gradeId") {
            Ok(v) => v,
            Err(resp) => return resp,
        };
        let enrollment_id = match get_id("enrollmentId") {
            Ok(v) => v,
            Err(resp) => return resp,
        };
        let assignment_id = match get_id("assignmentId") {
            Ok(v) => v,
            Err(resp) => return resp,
        };

        let score = match obj.get("score") {
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("updates[{}] missing score (use null to clear)", i),
                    None,
                )
            }
            Some(serde_json::Value::Null) => None,
            Some(v) => match v.as_f64() {
                Some(f) => Some(f),
                None => {
                    return err(
                        &req.id,
                        "bad_params",
                        format!("updates[{}].score must be a number or null", i),
                        None,
                    )
                }
            },
        };

        updates.push(GradeUpdate {
            grade_id,
            enrollment_id,
            assignment_id,
            score,
        });
    }

    match gradebook::update_grades(conn, actor_id, &updates) {
        Ok(updated) => ok(&req.id, json!({ "updated": updated })),
        Err(e) => domain_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "gradebook.forAssignment" => Some(handle_for_assignment(state, req)),
        "gradebook.forStudent" => Some(handle_for_student(state, req)),
        "grades.update" => Some(handle_grades_update(state, req)),
        _ => None,
    }
}
