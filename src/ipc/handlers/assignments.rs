use crate::catalog;
use crate::ipc::error::{domain_err, err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_assignments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(actor_id) = req.params.get("actorId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing actorId", None);
    };
    let Some(section_no) = req.params.get("sectionNo").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing sectionNo", None);
    };

    match catalog::list_assignments(conn, actor_id, section_no) {
        Ok(assignments) => ok(&req.id, json!({ "assignments": assignments })),
        Err(e) => domain_err(&req.id, e),
    }
}

fn handle_assignments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(actor_id) = req.params.get("actorId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing actorId", None);
    };
    let Some(section_no) = req.params.get("sectionNo").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing sectionNo", None);
    };
    let Some(title) = req.params.get("title").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing title", None);
    };
    let Some(due_date) = req.params.get("dueDate").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing dueDate", None);
    };

    match catalog::create_assignment(conn, actor_id, section_no, title, due_date) {
        Ok(view) => ok(&req.id, json!(view)),
        Err(e) => domain_err(&req.id, e),
    }
}

fn handle_assignments_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(actor_id) = req.params.get("actorId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing actorId", None);
    };
    let Some(assignment_id) = req.params.get("assignmentId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing assignmentId", None);
    };
    let Some(title) = req.params.get("title").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing title", None);
    };
    let Some(due_date) = req.params.get("dueDate").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing dueDate", None);
    };
    let new_section_no = match req.params.get("newSectionNo") {
        None | Some(serde_json::Value::Null) => None,
        Some(v) => match v.as_i64() {
            Some(n) => Some(n),
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    "newSectionNo must be an integer",
                    None,
                )
            }
        },
    };

    match catalog::update_assignment(conn, actor_id, assignment_id, title, due_date, new_section_no)
    {
        Ok(view) => ok(&req.id, json!(view)),
        Err(e) => domain_err(&req.id, e),
    }
}

fn handle_assignments_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(actor_id) = req.params.get("actorId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing actorId", None);
    };
    let Some(assignment_id) = req.params.get("assignmentId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing assignmentId", None);
    };

    match catalog::delete_assignment(conn, actor_id, assignment_id) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => domain_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assignments.list" => Some(handle_assignments_list(state, req)),
        "assignments.create" => Some(handle_assignments_create(state, req)),
        "assignments.update" => Some(handle_assignments_update(state, req)),
        "assignments.delete" => Some(handle_assignments_delete(state, req)),
        _ => None,
    }
}
