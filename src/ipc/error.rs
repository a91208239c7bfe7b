use serde_json::json;

use crate::error::GradebookError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Protocol rendering of the domain error taxonomy.
pub fn domain_err(id: &str, e: GradebookError) -> serde_json::Value {
    match e {
        GradebookError::NotFound { entity, id: target } => err(
            id,
            "not_found",
            format!("{} not found: {}", entity, target),
            Some(json!({ "entity": entity, "id": target })),
        ),
        GradebookError::Forbidden(message) => err(id, "forbidden", message, None),
        GradebookError::Validation(message) => err(id, "validation_error", message, None),
        GradebookError::Conflict(message) => err(id, "conflict", message, None),
        GradebookError::Store(e) => err(id, "db_query_failed", e.to_string(), None),
    }
}
