mod test_support;

use serde_json::json;
use test_support::{spawn_sidecar, temp_dir};

#[test]
fn setup_defaults_update_and_validation() {
    let workspace = temp_dir("amist-setup");
    let mut sc = spawn_sidecar();
    sc.open(&workspace);

    let initial = sc.request_ok("setup.get", json!({}));
    assert_eq!(initial.pointer("/courseCode/maxAttempts"), Some(&json!(5)));
    assert_eq!(initial.pointer("/courseCode/suffixLength"), Some(&json!(3)));
    assert_eq!(initial.pointer("/notifications/enabled"), Some(&json!(true)));
    assert_eq!(initial.pointer("/notifications/outboxLimit"), Some(&json!(500)));

    let _ = sc.request_ok(
        "setup.update",
        json!({ "section": "courseCode", "patch": { "suffixLength": 5 } }),
    );
    let teacher = sc.create_user("profe@escuela.cl", "Profe", "teacher");
    let course = sc.request_ok(
        "courses.create",
        json!({ "name": "8° A", "grade": "8", "school": "Liceo", "teacherId": teacher }),
    );
    let code = course["course"]["code"].as_str().expect("code");
    assert_eq!(code.len(), "LIC8".len() + 5, "unexpected code {code}");

    for (section, patch) in [
        ("courseCode", json!({ "maxAttempts": 0 })),
        ("courseCode", json!({ "suffixLength": 9 })),
        ("notifications", json!({ "enabled": "yes" })),
        ("notifications", json!({ "unknown": 1 })),
        ("planner", json!({})),
    ] {
        let code = sc.request_err("setup.update", json!({ "section": section, "patch": patch }));
        assert_eq!(code, "bad_params", "{section} {patch}");
    }

    let code = sc.request_err(
        "setup.update",
        json!({
            "actor": { "id": teacher, "role": "teacher" },
            "section": "courseCode",
            "patch": { "maxAttempts": 3 }
        }),
    );
    assert_eq!(code, "forbidden");

    // Settings persist across restarts.
    drop(sc);
    let mut sc = spawn_sidecar();
    sc.open(&workspace);
    let after = sc.request_ok("setup.get", json!({}));
    assert_eq!(after.pointer("/courseCode/suffixLength"), Some(&json!(5)));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn disabled_notifications_leave_outbox_empty() {
    let workspace = temp_dir("amist-setup-notifications");
    let mut sc = spawn_sidecar();
    sc.open(&workspace);
    let teacher = sc.create_user("profe@escuela.cl", "Profe", "teacher");
    let ana = sc.create_user("ana@escuela.cl", "Ana", "student");
    let _ = sc.request_ok(
        "ledger.record",
        json!({ "userId": ana, "amount": 20, "type": "assignment" }),
    );
    let reward = sc.request_ok(
        "rewards.create",
        json!({ "title": "Sticker", "pointsCost": 5, "stock": 10, "createdBy": teacher }),
    );

    let _ = sc.request_ok(
        "claims.request",
        json!({ "userId": ana, "rewardId": reward["reward"]["id"] }),
    );
    let drained = sc.request_ok("events.drain", json!({}));
    let events = drained["events"].as_array().expect("events");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event"], "claim.requested");
    assert_eq!(events[0]["data"]["pointsSpent"], 5);
    assert_eq!(events[0]["seq"], 1);

    let _ = sc.request_ok(
        "setup.update",
        json!({ "section": "notifications", "patch": { "enabled": false } }),
    );
    let _ = sc.request_ok(
        "claims.request",
        json!({ "userId": ana, "rewardId": reward["reward"]["id"] }),
    );
    let drained = sc.request_ok("events.drain", json!({}));
    assert_eq!(drained["events"].as_array().map(|a| a.len()), Some(0));

    let _ = std::fs::remove_dir_all(workspace);
}
