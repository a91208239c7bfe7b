use crate::error::GradebookError;
use crate::ipc::error::{domain_err, err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, Role, Semester};
use serde_json::json;

fn handle_courses_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(course_id) = req.params.get("courseId").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing courseId", None);
    };
    let Some(title) = req.params.get("title").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing title", None);
    };
    let course_id = course_id.trim();
    let title = title.trim();
    if course_id.is_empty() {
        return domain_err(
            &req.id,
            GradebookError::validation("course id must not be empty"),
        );
    }
    if title.is_empty() {
        return domain_err(
            &req.id,
            GradebookError::validation("course title must not be empty"),
        );
    }

    match store::insert_course(conn, course_id, title) {
        Ok(course) => ok(
            &req.id,
            json!({ "courseId": course.course_id, "title": course.title }),
        ),
        Err(e) => domain_err(&req.id, e),
    }
}

fn handle_courses_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "courses": [] }));
    };
    match store::list_courses(conn) {
        Ok(courses) => {
            let rows: Vec<serde_json::Value> = courses
                .iter()
                .map(|c| json!({ "courseId": c.course_id, "title": c.title }))
                .collect();
            ok(&req.id, json!({ "courses": rows }))
        }
        Err(e) => domain_err(&req.id, e),
    }
}

fn handle_terms_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(year) = req.params.get("year").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing year", None);
    };
    let Some(semester_raw) = req.params.get("semester").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing semester", None);
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

    match store::insert_term(conn, year, semester) {
        Ok(()) => ok(
            &req.id,
            json!({ "year": year, "semester": semester.as_str() }),
        ),
        Err(e) => domain_err(&req.id, e),
    }
}

fn handle_terms_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "terms": [] }));
    };
    match store::list_terms(conn) {
        Ok(terms) => {
            let rows: Vec<serde_json::Value> = terms
                .iter()
                .map(|(year, semester)| json!({ "year": year, "semester": semester.as_str() }))
                .collect();
            ok(&req.id, json!({ "terms": rows }))
        }
        Err(e) => domain_err(&req.id, e),
    }
}

fn handle_users_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(name) = req.params.get("name").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing name", None);
    };
    let Some(email) = req.params.get("email").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing email", None);
    };
    let Some(role_raw) = req.params.get("role").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing role", None);
    };
    let name = name.trim();
    let email = email.trim();
    if name.is_empty() {
        return domain_err(&req.id, GradebookError::validation("name must not be empty"));
    }
    if email.is_empty() {
        return domain_err(&req.id, GradebookError::validation("email must not be empty"));
    }
    let role = match Role::parse(role_raw) {
        Some(r) => r,
        None => {
            return domain_err(
                &req.id,
                GradebookError::validation(format!(
                    "role must be student or instructor, got: {}",
                    role_raw
                )),
            )
        }
    };

    match store::insert_user(conn, name, email, role) {
        Ok(user) => ok(
            &req.id,
            json!({
                "id": user.id,
                "name": user.name,
                "email": user.email,
                "role": user.role.as_str()
            }),
        ),
        Err(e) => domain_err(&req.id, e),
    }
}

fn handle_users_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "users": [] }));
    };
    match store::list_users(conn) {
        Ok(users) => {
            let rows: Vec<serde_json::Value> = users
                .iter()
                .map(|u| {
                    json!({
                        "id": u.id,
                        "name": u.name,
                        "email": u.email,
                        "role": u.role.as_str()
                    })
                })
                .collect();
            ok(&req.id, json!({ "users": rows }))
        }
        Err(e) => domain_err(&req.id, e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "courses.create" => Some(handle_courses_create(state, req)),
        "courses.list" => Some(handle_courses_list(state, req)),
        "terms.create" => Some(handle_terms_create(state, req)),
        "terms.list" => Some(handle_terms_list(state, req)),
        "users.create" => Some(handle_users_create(state, req)),
        "users.list" => Some(handle_users_list(state, req)),
        _ => None,
    }
}
