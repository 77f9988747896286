#![allow(clippy::unwrap_used, clippy::expect_used)]

//! A course catalogue guarded by role variables, seen by each kind of caller.

use modkit_acl::{Operation, Policy, PolicyConfig, PolicyOverrides, RuleMatch, User};
use serde_json::{Value, json};

const COURSE_POLICY: &str = r#"
strict: true
variables:
  "@adminWrite": { d: "w", roles: ["administrator"] }
  "@adminRead": { d: "r", roles: ["administrator"] }
  "@adminRW": { d: "rw", roles: ["administrator"] }
  "@instructorWrite": { d: "w", roles: ["instructor"] }
  "@instructorRead": { d: "r", roles: ["instructor"] }
rules:
  "title": ["@read", "@instructorWrite", "@adminWrite"]
  "description": ["@read", "@instructorWrite", "@adminWrite"]
  "seats": ["@read", "@adminRW"]
  "seats.max": ["@adminRW", "@instructorRead"]
  "students": ["@read"]
  "students.*.grades": ["@instructorRead"]
  "students.*.attendance": ["@instructorRead"]
"#;

fn policy() -> Policy {
    PolicyConfig::from_yaml(COURSE_POLICY).unwrap().build().unwrap()
}

fn course() -> Value {
    json!({
        "title": "Field level access control",
        "description": "Hiding what callers may not see.",
        "seats": { "max": 10 },
        "students": [
            { "id": "001", "name": "Ada", "grades": [95, 76, 87], "attendance": 90 },
            { "id": "002", "name": "Grace", "grades": [89, 67, 91], "attendance": 85 },
            { "id": "003", "name": "Linus", "grades": [80, 90, 67], "attendance": 81 }
        ]
    })
}

fn without_student_records(mut course: Value) -> Value {
    for student in course["students"].as_array_mut().unwrap() {
        let student = student.as_object_mut().unwrap();
        student.remove("grades");
        student.remove("attendance");
    }
    course
}

fn without(mut course: Value, keys: &[&str]) -> Value {
    let fields = course.as_object_mut().unwrap();
    for key in keys {
        fields.remove(*key);
    }
    course
}

#[test]
fn administrator_read() {
    let out = policy().read(&course(), &User::new(["administrator"]), None).unwrap();
    assert_eq!(out.data, without_student_records(course()));
}

#[test]
fn administrator_write() {
    let out = policy().write(&course(), &User::new(["administrator"]), None).unwrap();
    assert_eq!(out.data, without(course(), &["students"]));
    assert_eq!(out.removals, vec!["students".to_owned()]);
}

#[test]
fn instructor_read() {
    let out = policy().read(&course(), &User::new(["instructor"]), None).unwrap();
    assert!(out.removals.is_empty());
    assert_eq!(out.data, course());
}

#[test]
fn instructor_write() {
    let out = policy().write(&course(), &User::new(["instructor"]), None).unwrap();
    assert_eq!(out.data, without(course(), &["seats", "students"]));
}

#[test]
fn student_read() {
    let out = policy().read(&course(), &User::new(["student"]), None).unwrap();
    assert_eq!(
        out.data,
        without(without_student_records(course()), &["seats"])
    );
    assert_eq!(
        out.removals,
        [
            "seats.max",
            "students.0.attendance",
            "students.0.grades",
            "students.1.attendance",
            "students.1.grades",
            "students.2.attendance",
            "students.2.grades",
        ]
    );
}

#[test]
fn student_write() {
    let out = policy().write(&course(), &User::new(["student"]), None).unwrap();
    assert_eq!(out.data, json!({}));
}

#[test]
fn trace_explains_each_decision() {
    let out = policy()
        .apply(&course(), &User::new(["instructor"]), Operation::Read, None, true)
        .unwrap();
    let trace = out.trace.unwrap();
    assert_eq!(trace.roles["title"], None);
    assert_eq!(trace.roles["seats.max"], Some(vec!["instructor".to_owned()]));
    assert_eq!(trace.rules["title"], Some(RuleMatch::Key("title".to_owned())));
    assert_eq!(
        trace.rules["students.1.grades"],
        Some(RuleMatch::Keys(vec!["students.*.grades".to_owned()]))
    );
    assert_eq!(
        trace.rules["students.0.id"],
        Some(RuleMatch::Key("students".to_owned()))
    );
}

#[test]
fn copy_exports_the_same_document() {
    let policy = policy();
    let copy = policy.copy();
    assert_eq!(copy.to_json(), policy.to_json());
    assert_eq!(copy.is_strict(), policy.is_strict());
}

#[test]
fn copy_with_an_added_variable() {
    let policy = policy();
    let copy = policy
        .copy_with(PolicyOverrides::new().variable("@asd", json!("r")))
        .unwrap();

    let mut expected = policy.to_json();
    expected.insert("@asd".to_owned(), json!("r"));
    assert_ne!(copy.to_json(), policy.to_json());
    assert_eq!(copy.to_json(), expected);
    assert!(policy.variable("@asd").is_none());
}

#[test]
fn copy_with_can_relax_strictness() {
    let policy = policy();
    let relaxed = policy
        .copy_with(PolicyOverrides::new().strict(false))
        .unwrap();
    let data = json!({ "unknown": 1 });
    assert_eq!(policy.read(&data, &User::default(), None).unwrap().data, json!({}));
    assert_eq!(relaxed.read(&data, &User::default(), None).unwrap().data, data);
}

#[test]
fn export_keeps_references_and_flush_inlines_them() {
    let policy = policy();
    let exported = policy.to_json();
    assert_eq!(exported["seats"], json!(["@read", "@adminRW"]));
    assert_eq!(
        exported["@adminRW"],
        json!({ "d": "rw", "roles": ["administrator"] })
    );
    assert!(!exported.contains_key("@read"));

    let flushed = policy.to_json_flushed().unwrap();
    assert!(flushed.keys().all(|key| !key.starts_with('@')));
    assert_eq!(
        flushed["seats"],
        json!(["r", { "d": "rw", "roles": ["administrator"] }])
    );
}

#[test]
fn exported_document_rebuilds_an_equivalent_policy() {
    let policy = policy();
    let rebuilt: Policy = Policy::new(&Value::Object(policy.to_json())).unwrap();
    assert_eq!(rebuilt.to_json(), policy.to_json());
    for role in ["administrator", "instructor", "student"] {
        let user = User::new([role]);
        assert_eq!(
            rebuilt.read(&course(), &user, None).unwrap(),
            policy.read(&course(), &user, None).unwrap()
        );
    }
}

#[test]
fn render_lists_shortest_keys_first() {
    let rendered = policy().render(false).unwrap();
    let first = rendered.lines().next().unwrap();
    assert_eq!(first, r#"seats: ["@read","@adminRW"]"#);
    assert!(rendered.contains(r#"students.*.attendance: ["@instructorRead"]"#));
}
