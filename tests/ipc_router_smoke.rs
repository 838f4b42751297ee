mod test_support;

use serde_json::json;
use test_support::{spawn_sidecar, temp_dir};

#[test]
fn protocol_errors_and_unknown_methods() {
    let mut sc = spawn_sidecar();

    let bad = sc.send_raw("{not json");
    assert_eq!(bad["ok"], false);
    assert_eq!(bad.pointer("/error/code"), Some(&json!("bad_json")));

    let health = sc.request_ok("health", json!({}));
    assert_eq!(health["workspacePath"], serde_json::Value::Null);

    assert_eq!(sc.request_err("ledger.balance", json!({ "userId": "x" })), "no_workspace");
    assert_eq!(sc.request_err("grades.compute", json!({})), "not_implemented");
    assert_eq!(sc.request_err("workspace.select", json!({})), "bad_params");
}

#[test]
fn every_method_family_is_routed() {
    let workspace = temp_dir("amist-router-smoke");
    let mut sc = spawn_sidecar();
    sc.open(&workspace);

    for method in [
        "setup.get",
        "users.create",
        "users.get",
        "users.list",
        "profiles.student.upsert",
        "profiles.teacher.upsert",
        "profiles.tutor.upsert",
        "students.assignTutor",
        "ledger.record",
        "ledger.balance",
        "ledger.list",
        "rewards.create",
        "rewards.update",
        "rewards.get",
        "rewards.list",
        "claims.request",
        "claims.process",
        "claims.get",
        "claims.list",
        "courses.generateCode",
        "courses.create",
        "courses.get",
        "courses.join",
        "courses.addTeacher",
        "views.studentProfile",
        "views.teacherCourses",
        "views.tutorStudents",
        "events.drain",
        "backup.exportBundle",
        "backup.importBundle",
    ] {
        let resp = sc.request(method, json!({}));
        assert_ne!(
            resp.pointer("/error/code").and_then(|v| v.as_str()),
            Some("not_implemented"),
            "{method} not routed"
        );
    }

    let _ = std::fs::remove_dir_all(workspace);
}
