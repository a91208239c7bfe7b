use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "expected an error response, got: {}",
        value
    );
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

fn assignment_titles(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    actor_id: &str,
    section_no: i64,
) -> Vec<String> {
    let listed = request_ok(
        stdin,
        reader,
        id,
        "assignments.list",
        json!({ "actorId": actor_id, "sectionNo": section_no }),
    );
    listed
        .get("assignments")
        .and_then(|v| v.as_array())
        .map(|rows| {
            rows.iter()
                .filter_map(|r| r.get("title").and_then(|v| v.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn recorded_scores_block_deletion_until_cleared() {
    let workspace = temp_dir("gradebook-delete-policy");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "course",
        "courses.create",
        json!({ "courseId": "CS101", "title": "Intro to Programming" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "term",
        "terms.create",
        json!({ "year": 2024, "semester": "spring" }),
    );
    let instructor = request_ok(
        &mut stdin,
        &mut reader,
        "u1",
        "users.create",
        json!({ "name": "Ted Nguyen", "email": "ted@school.edu", "role": "instructor" }),
    );
    let instructor_id = instructor
        .get("id")
        .and_then(|v| v.as_str())
        .expect("id")
        .to_string();
    let section = request_ok(
        &mut stdin,
        &mut reader,
        "sec",
        "sections.create",
        json!({
            "courseId": "CS101",
            "year": 2024,
            "semester": "spring",
            "secId": "A",
            "instructorId": instructor_id
        }),
    );
    let section_no = section
        .get("sectionNo")
        .and_then(|v| v.as_i64())
        .expect("sectionNo");

    let student = request_ok(
        &mut stdin,
        &mut reader,
        "u2",
        "users.create",
        json!({ "name": "Alice Chen", "email": "alice@school.edu", "role": "student" }),
    );
    let student_id = student.get("id").and_then(|v| v.as_str()).expect("id");
    let enrollment = request_ok(
        &mut stdin,
        &mut reader,
        "e1",
        "sections.enroll",
        json!({ "studentId": student_id, "sectionNo": section_no }),
    );
    let enrollment_id = enrollment
        .get("enrollmentId")
        .and_then(|v| v.as_str())
        .expect("enrollmentId")
        .to_string();

    let mut assignment_ids = Vec::new();
    for (id, title, due) in [
        ("a1", "Untouched", "2024-01-05"),
        ("a2", "Placeholder Only", "2024-01-10"),
        ("a3", "Scored", "2024-01-15"),
    ] {
        let created = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "assignments.create",
            json!({
                "actorId": instructor_id,
                "sectionNo": section_no,
                "title": title,
                "dueDate": due
            }),
        );
        assignment_ids.push(
            created
                .get("id")
                .and_then(|v| v.as_str())
                .expect("id")
                .to_string(),
        );
    }

    // No grade rows at all: deletion is unconditional.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "d1",
        "assignments.delete",
        json!({ "actorId": instructor_id, "assignmentId": assignment_ids[0] }),
    );
    assert_eq!(
        assignment_titles(&mut stdin, &mut reader, "l1", &instructor_id, section_no),
        vec!["Placeholder Only".to_string(), "Scored".to_string()]
    );
    let gone = request(
        &mut stdin,
        &mut reader,
        "v1",
        "gradebook.forAssignment",
        json!({ "actorId": instructor_id, "assignmentId": assignment_ids[0] }),
    );
    assert_eq!(error_code(&gone), "not_found");

    // A null-score row is bookkeeping, not a recorded grade; it goes with the assignment.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "g1",
        "grades.update",
        json!({
            "actorId": instructor_id,
            "updates": [
                { "enrollmentId": enrollment_id, "assignmentId": assignment_ids[1], "score": null }
            ]
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "d2",
        "assignments.delete",
        json!({ "actorId": instructor_id, "assignmentId": assignment_ids[1] }),
    );
    assert_eq!(
        assignment_titles(&mut stdin, &mut reader, "l2", &instructor_id, section_no),
        vec!["Scored".to_string()]
    );

    // A real score blocks deletion.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "g2",
        "grades.update",
        json!({
            "actorId": instructor_id,
            "updates": [
                { "enrollmentId": enrollment_id, "assignmentId": assignment_ids[2], "score": 88.0 }
            ]
        }),
    );
    let blocked = request(
        &mut stdin,
        &mut reader,
        "d3",
        "assignments.delete",
        json!({ "actorId": instructor_id, "assignmentId": assignment_ids[2] }),
    );
    assert_eq!(error_code(&blocked), "conflict");
    assert_eq!(
        assignment_titles(&mut stdin, &mut reader, "l3", &instructor_id, section_no),
        vec!["Scored".to_string()],
        "a refused delete must leave the assignment in place"
    );

    // Clearing the score back to null lifts the block.
    let view = request_ok(
        &mut stdin,
        &mut reader,
        "v2",
        "gradebook.forAssignment",
        json!({ "actorId": instructor_id, "assignmentId": assignment_ids[2] }),
    );
    let grade_id = view
        .get("grades")
        .and_then(|v| v.as_array())
        .and_then(|rows| rows.first().cloned())
        .and_then(|row| row.get("gradeId").and_then(|v| v.as_str()).map(str::to_string))
        .expect("gradeId");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "g3",
        "grades.update",
        json!({
            "actorId": instructor_id,
            "updates": [ { "gradeId": grade_id, "score": null } ]
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "d4",
        "assignments.delete",
        json!({ "actorId": instructor_id, "assignmentId": assignment_ids[2] }),
    );
    assert!(
        assignment_titles(&mut stdin, &mut reader, "l4", &instructor_id, section_no).is_empty()
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn only_the_section_owner_may_delete() {
    let workspace = temp_dir("gradebook-delete-auth");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "course",
        "courses.create",
        json!({ "courseId": "CS101", "title": "Intro to Programming" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "term",
        "terms.create",
        json!({ "year": 2024, "semester": "spring" }),
    );
    let instructor = request_ok(
        &mut stdin,
        &mut reader,
        "u1",
        "users.create",
        json!({ "name": "Ted Nguyen", "email": "ted@school.edu", "role": "instructor" }),
    );
    let instructor_id = instructor
        .get("id")
        .and_then(|v| v.as_str())
        .expect("id")
        .to_string();
    let section = request_ok(
        &mut stdin,
        &mut reader,
        "sec",
        "sections.create",
        json!({
            "courseId": "CS101",
            "year": 2024,
            "semester": "spring",
            "secId": "A",
            "instructorId": instructor_id
        }),
    );
    let section_no = section
        .get("sectionNo")
        .and_then(|v| v.as_i64())
        .expect("sectionNo");
    let assignment = request_ok(
        &mut stdin,
        &mut reader,
        "a1",
        "assignments.create",
        json!({
            "actorId": instructor_id,
            "sectionNo": section_no,
            "title": "Homework 1",
            "dueDate": "2024-01-10"
        }),
    );
    let assignment_id = assignment
        .get("id")
        .and_then(|v| v.as_str())
        .expect("id")
        .to_string();

    let rival = request_ok(
        &mut stdin,
        &mut reader,
        "u2",
        "users.create",
        json!({ "name": "Rita Okafor", "email": "rita@school.edu", "role": "instructor" }),
    );
    let rival_id = rival.get("id").and_then(|v| v.as_str()).expect("id");
    let foreign = request(
        &mut stdin,
        &mut reader,
        "d1",
        "assignments.delete",
        json!({ "actorId": rival_id, "assignmentId": assignment_id }),
    );
    assert_eq!(error_code(&foreign), "forbidden");

    let missing = request(
        &mut stdin,
        &mut reader,
        "d2",
        "assignments.delete",
        json!({ "actorId": instructor_id, "assignmentId": "no-such-assignment" }),
    );
    assert_eq!(error_code(&missing), "not_found");

    assert_eq!(
        assignment_titles(&mut stdin, &mut reader, "l1", &instructor_id, section_no),
        vec!["Homework 1".to_string()]
    );

    let _ = std::fs::remove_dir_all(workspace);
}
