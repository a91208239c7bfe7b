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

struct Seed {
    instructor_id: String,
    section_no: i64,
}

fn seed_section(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &PathBuf,
) -> Seed {
    let _ = request_ok(
        stdin,
        reader,
        "seed-ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "seed-course",
        "courses.create",
        json!({ "courseId": "CS101", "title": "Intro to Programming" }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "seed-term",
        "terms.create",
        json!({ "year": 2024, "semester": "spring" }),
    );
    let instructor = request_ok(
        stdin,
        reader,
        "seed-instructor",
        "users.create",
        json!({ "name": "Ted Nguyen", "email": "ted@school.edu", "role": "instructor" }),
    );
    let instructor_id = instructor
        .get("id")
        .and_then(|v| v.as_str())
        .expect("instructor id")
        .to_string();
    let section = request_ok(
        stdin,
        reader,
        "seed-section",
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
    Seed {
        instructor_id,
        section_no,
    }
}

#[test]
fn catalog_lists_in_due_date_order_with_section_denormalized() {
    let workspace = temp_dir("gradebook-catalog-order");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let seed = seed_section(&mut stdin, &mut reader, &workspace);

    // Created out of due-date order on purpose.
    let hw = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "assignments.create",
        json!({
            "actorId": seed.instructor_id,
            "sectionNo": seed.section_no,
            "title": "Homework 1",
            "dueDate": "2024-01-10"
        }),
    );
    assert_eq!(hw.get("courseId").and_then(|v| v.as_str()), Some("CS101"));
    assert_eq!(hw.get("sectionId").and_then(|v| v.as_str()), Some("A"));
    assert_eq!(
        hw.get("sectionNo").and_then(|v| v.as_i64()),
        Some(seed.section_no)
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "assignments.create",
        json!({
            "actorId": seed.instructor_id,
            "sectionNo": seed.section_no,
            "title": " Quiz 1 ",
            "dueDate": "2024-01-05"
        }),
    );

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "assignments.list",
        json!({ "actorId": seed.instructor_id, "sectionNo": seed.section_no }),
    );
    let assignments = listed
        .get("assignments")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("assignments array");
    assert_eq!(assignments.len(), 2);
    assert_eq!(
        assignments[0].get("title").and_then(|v| v.as_str()),
        Some("Quiz 1"),
        "earliest due date comes first and the title is trimmed"
    );
    assert_eq!(
        assignments[1].get("title").and_then(|v| v.as_str()),
        Some("Homework 1")
    );

    let dues: Vec<&str> = assignments
        .iter()
        .filter_map(|a| a.get("dueDate").and_then(|v| v.as_str()))
        .collect();
    let mut sorted = dues.clone();
    sorted.sort();
    assert_eq!(dues, sorted, "due dates are non-decreasing");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn update_preserves_untouched_fields_and_can_move_sections() {
    let workspace = temp_dir("gradebook-catalog-update");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let seed = seed_section(&mut stdin, &mut reader, &workspace);

    let second_section = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "sections.create",
        json!({
            "courseId": "CS101",
            "year": 2024,
            "semester": "spring",
            "secId": "B",
            "instructorId": seed.instructor_id
        }),
    );
    let second_no = second_section
        .get("sectionNo")
        .and_then(|v| v.as_i64())
        .expect("sectionNo");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "assignments.create",
        json!({
            "actorId": seed.instructor_id,
            "sectionNo": seed.section_no,
            "title": "Lab 1",
            "dueDate": "2024-02-01"
        }),
    );
    let assignment_id = created
        .get("id")
        .and_then(|v| v.as_str())
        .expect("assignment id")
        .to_string();

    // Retitle only: due date, id, and section come through unchanged.
    let retitled = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "assignments.update",
        json!({
            "actorId": seed.instructor_id,
            "assignmentId": assignment_id,
            "title": "Lab 1 (revised)",
            "dueDate": "2024-02-01"
        }),
    );
    assert_eq!(
        retitled.get("id").and_then(|v| v.as_str()),
        Some(assignment_id.as_str())
    );
    assert_eq!(
        retitled.get("dueDate").and_then(|v| v.as_str()),
        Some("2024-02-01")
    );
    assert_eq!(
        retitled.get("sectionNo").and_then(|v| v.as_i64()),
        Some(seed.section_no)
    );

    let moved = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "assignments.update",
        json!({
            "actorId": seed.instructor_id,
            "assignmentId": assignment_id,
            "title": "Lab 1 (revised)",
            "dueDate": "2024-02-01",
            "newSectionNo": second_no
        }),
    );
    assert_eq!(
        moved.get("sectionNo").and_then(|v| v.as_i64()),
        Some(second_no)
    );
    assert_eq!(moved.get("sectionId").and_then(|v| v.as_str()), Some("B"));

    let old_list = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "assignments.list",
        json!({ "actorId": seed.instructor_id, "sectionNo": seed.section_no }),
    );
    assert_eq!(
        old_list
            .get("assignments")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );

    let missing_target = request(
        &mut stdin,
        &mut reader,
        "6",
        "assignments.update",
        json!({
            "actorId": seed.instructor_id,
            "assignmentId": assignment_id,
            "title": "Lab 1",
            "dueDate": "2024-02-01",
            "newSectionNo": 9999
        }),
    );
    assert_eq!(error_code(&missing_target), "not_found");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn catalog_reads_are_owner_or_enrolled_only() {
    let workspace = temp_dir("gradebook-catalog-auth");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let seed = seed_section(&mut stdin, &mut reader, &workspace);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "assignments.create",
        json!({
            "actorId": seed.instructor_id,
            "sectionNo": seed.section_no,
            "title": "Homework 1",
            "dueDate": "2024-01-10"
        }),
    );

    let rival = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "users.create",
        json!({ "name": "Rita Okafor", "email": "rita@school.edu", "role": "instructor" }),
    );
    let rival_id = rival.get("id").and_then(|v| v.as_str()).expect("id");

    // The section exists but is not theirs: forbidden, not not_found.
    let foreign = request(
        &mut stdin,
        &mut reader,
        "3",
        "assignments.list",
        json!({ "actorId": rival_id, "sectionNo": seed.section_no }),
    );
    assert_eq!(error_code(&foreign), "forbidden");

    let ghost_section = request(
        &mut stdin,
        &mut reader,
        "4",
        "assignments.list",
        json!({ "actorId": seed.instructor_id, "sectionNo": 4242 }),
    );
    assert_eq!(error_code(&ghost_section), "not_found");

    let student = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "users.create",
        json!({ "name": "Alice Chen", "email": "alice@school.edu", "role": "student" }),
    );
    let student_id = student
        .get("id")
        .and_then(|v| v.as_str())
        .expect("id")
        .to_string();

    let unenrolled = request(
        &mut stdin,
        &mut reader,
        "6",
        "assignments.list",
        json!({ "actorId": student_id, "sectionNo": seed.section_no }),
    );
    assert_eq!(error_code(&unenrolled), "forbidden");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "sections.enroll",
        json!({ "studentId": student_id, "sectionNo": seed.section_no }),
    );
    let enrolled_view = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "assignments.list",
        json!({ "actorId": student_id, "sectionNo": seed.section_no }),
    );
    assert_eq!(
        enrolled_view
            .get("assignments")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(1)
    );

    let ghost_actor = request(
        &mut stdin,
        &mut reader,
        "9",
        "assignments.list",
        json!({ "actorId": "no-such-user", "sectionNo": seed.section_no }),
    );
    assert_eq!(error_code(&ghost_actor), "forbidden");

    // Mutations stay instructor-only even for enrolled students.
    let student_create = request(
        &mut stdin,
        &mut reader,
        "10",
        "assignments.create",
        json!({
            "actorId": student_id,
            "sectionNo": seed.section_no,
            "title": "Student Made This",
            "dueDate": "2024-03-01"
        }),
    );
    assert_eq!(error_code(&student_create), "forbidden");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn create_rejects_malformed_title_and_date() {
    let workspace = temp_dir("gradebook-catalog-validation");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let seed = seed_section(&mut stdin, &mut reader, &workspace);

    let blank_title = request(
        &mut stdin,
        &mut reader,
        "1",
        "assignments.create",
        json!({
            "actorId": seed.instructor_id,
            "sectionNo": seed.section_no,
            "title": "   ",
            "dueDate": "2024-01-10"
        }),
    );
    assert_eq!(error_code(&blank_title), "validation_error");

    let bad_date = request(
        &mut stdin,
        &mut reader,
        "2",
        "assignments.create",
        json!({
            "actorId": seed.instructor_id,
            "sectionNo": seed.section_no,
            "title": "Homework 1",
            "dueDate": "2024-13-40"
        }),
    );
    assert_eq!(error_code(&bad_date), "validation_error");

    let missing_date = request(
        &mut stdin,
        &mut reader,
        "3",
        "assignments.create",
        json!({
            "actorId": seed.instructor_id,
            "sectionNo": seed.section_no,
            "title": "Homework 1"
        }),
    );
    assert_eq!(error_code(&missing_date), "bad_params");

    // Loose zero-padding is accepted and canonicalized.
    let padded = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "assignments.create",
        json!({
            "actorId": seed.instructor_id,
            "sectionNo": seed.section_no,
            "title": "Quiz 1",
            "dueDate": "2024-1-5"
        }),
    );
    assert_eq!(
        padded.get("dueDate").and_then(|v| v.as_str()),
        Some("2024-01-05")
    );

    let _ = std::fs::remove_dir_all(workspace);
}
