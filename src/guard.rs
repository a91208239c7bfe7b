use rusqlite::Connection;

use crate::error::{GradebookError, GradebookResult};
use crate::store::{self, Role, Section, User};

/// Resolves the acting user. Unknown actors are rejected outright rather
/// than reported as missing, so probing for user ids reveals nothing.
pub fn require_actor(conn: &Connection, actor_id: &str) -> GradebookResult<User> {
    store::find_user(conn, actor_id)?
        .ok_or_else(|| GradebookError::forbidden(format!("unknown actor: {}", actor_id)))
}

/// Management rights are ownership: the section's instructor and nobody else.
pub fn can_manage_section(actor: &User, section: &Section) -> bool {
    actor.role == Role::Instructor && actor.id == section.instructor_id
}

/// A student may read a section they are enrolled in. Enrollment is the
/// grant; role is implied by the enrollment row.
pub fn can_view_as_student(
    conn: &Connection,
    actor: &User,
    section_no: i64,
) -> GradebookResult<bool> {
    store::enrollment_exists(conn, &actor.id, section_no)
}

/// Gate for every mutating section operation: the section must exist and
/// the actor must manage it. A missing section is NotFound; a section
/// owned by someone else is Forbidden, so the two cases stay
/// distinguishable to callers.
pub fn require_section_manager(
    conn: &Connection,
    actor_id: &str,
    section_no: i64,
) -> GradebookResult<(User, Section)> {
    let section = store::find_section(conn, section_no)?
        .ok_or_else(|| GradebookError::not_found("section", section_no.to_string()))?;
    let actor = require_actor(conn, actor_id)?;
    if !can_manage_section(&actor, &section) {
        return Err(GradebookError::forbidden(format!(
            "actor {} does not manage section {}",
            actor.id, section_no
        )));
    }
    Ok((actor, section))
}
