use std::{fs, path::Path};

use abide_core::{
    Abide, AbideConfig, AssertionError, Outcome, RunMode, SnapshotError, SnapshotLocation,
    SnapshotStore,
};
use http::{Request, Response};
use serde_json::json;

fn config_with_defaults() -> AbideConfig {
    let mut config = AbideConfig::default();
    config.defaults.insert("Date".to_string(), json!("<date>"));
    config.defaults.insert("X-Request-Id".to_string(), json!("<request-id>"));
    config.defaults.insert("created_at".to_string(), json!("<timestamp>"));
    config
}

fn abide_in(root: &Path, config: AbideConfig, update: bool) -> Abide {
    Abide::new(
        SnapshotStore::new(SnapshotLocation::new(root, "http")),
        config,
        RunMode {
            update,
            single_run: false,
        },
    )
}

fn user_response(date: &str, request_id: &str, created_at: &str, name: &str) -> Response<String> {
    Response::builder()
        .status(200)
        .header("content-type", "application/vnd.acme.v1+json")
        .header("date", date)
        .header("x-request-id", request_id)
        .body(
            json!({
                "name": name,
                "created_at": created_at,
                "roles": [{ "role": "admin", "created_at": created_at }]
            })
            .to_string(),
        )
        .expect("response should build")
}

#[test]
fn json_response_is_stored_normalised() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    let abide = abide_in(temp.path(), config_with_defaults(), true);

    let response = user_response("Mon, 01 Jan 2024", "req-1", "2024-01-01", "ada");
    assert_eq!(
        abide
            .check_http_response("user", &response)
            .expect("create should work"),
        Outcome::Created
    );

    let stored = fs::read_to_string(temp.path().join("__snapshots__/http.snapshot"))
        .expect("snapshot file should exist");
    assert_eq!(
        stored,
        "/* snapshot: user */\n\
         HTTP/1.1 200 OK\n\
         Content-Type: application/vnd.acme.v1+json\n\
         Date: <date>\n\
         X-Request-Id: <request-id>\n\
         \n\
         {\n  \"created_at\": \"<timestamp>\",\n  \"name\": \"ada\",\n  \"roles\": [\n    {\n      \"created_at\": \"<timestamp>\",\n      \"role\": \"admin\"\n    }\n  ]\n}"
    );
}

#[test]
fn volatile_fields_do_not_cause_mismatch() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    abide_in(temp.path(), config_with_defaults(), true)
        .check_http_response(
            "user",
            &user_response("Mon, 01 Jan 2024", "req-1", "2024-01-01", "ada"),
        )
        .expect("create should work");

    let abide = abide_in(temp.path(), config_with_defaults(), false);
    assert_eq!(
        abide
            .check_http_response(
                "user",
                &user_response("Tue, 02 Jan 2024", "req-2", "2024-01-02", "ada"),
            )
            .expect("volatile fields should be neutralised"),
        Outcome::Matched
    );
}

#[test]
fn changed_json_field_is_reported() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    abide_in(temp.path(), config_with_defaults(), true)
        .check_http_response("user", &user_response("d", "r", "c", "ada"))
        .expect("create should work");

    let error = abide_in(temp.path(), config_with_defaults(), false)
        .check_http_response("user", &user_response("d", "r", "c", "grace"))
        .expect_err("changed name should mismatch");
    let AssertionError::Mismatch { diff, .. } = error else {
        panic!("expected a mismatch");
    };
    assert!(diff.contains(".name"), "diff should point at the field: {diff}");
}

#[test]
fn malformed_json_body_is_fatal() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    let abide = abide_in(temp.path(), AbideConfig::default(), true);

    let response = Response::builder()
        .header("content-type", "application/json")
        .body("{broken")
        .expect("response should build");
    let error = abide
        .check_http_response("broken", &response)
        .expect_err("malformed body should fail");
    assert!(matches!(
        error,
        AssertionError::Fatal(SnapshotError::MalformedJsonBody(_))
    ));
}

#[test]
fn non_json_bodies_use_the_generic_path() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    let abide = abide_in(temp.path(), AbideConfig::default(), true);

    let response = Response::builder()
        .header("content-type", "text/plain")
        .body("{not json but fine}")
        .expect("response should build");
    assert_eq!(
        abide
            .check_http_response("plain", &response)
            .expect("plain body should be stored"),
        Outcome::Created
    );
    assert_eq!(
        abide
            .check_http_response("plain", &response)
            .expect("plain body should match"),
        Outcome::Matched
    );
}

#[test]
fn outgoing_and_incoming_requests() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    let abide = abide_in(temp.path(), config_with_defaults(), true);

    let outgoing = Request::builder()
        .method("POST")
        .uri("https://api.example.com/users")
        .header("content-type", "application/json")
        .body(r#"{"name":"ada","created_at":"now"}"#)
        .expect("request should build");
    abide
        .check_http_request_out("create-user", &outgoing)
        .expect("create should work");

    let incoming = Request::builder()
        .uri("/users?limit=1")
        .header("host", "localhost")
        .body(Vec::new())
        .expect("request should build");
    abide
        .check_http_request("list-users", &incoming)
        .expect("create should work");

    let stored = fs::read_to_string(temp.path().join("__snapshots__/http.snapshot"))
        .expect("snapshot file should exist");
    assert!(stored.contains(
        "/* snapshot: create-user */\nPOST /users HTTP/1.1\nHost: api.example.com\nContent-Type: application/json\n\n{\n  \"created_at\": \"<timestamp>\",\n  \"name\": \"ada\"\n}"
    ));
    assert!(stored.contains("/* snapshot: list-users */\nGET /users?limit=1 HTTP/1.1\nHost: localhost"));
}

#[test]
fn empty_json_bodies_match() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    let abide = abide_in(temp.path(), AbideConfig::default(), true);

    let response = Response::builder()
        .status(204)
        .header("content-type", "application/json")
        .body(Vec::new())
        .expect("response should build");
    abide
        .check_http_response("empty", &response)
        .expect("create should work");
    assert_eq!(
        abide
            .check_http_response("empty", &response)
            .expect("empty bodies should match"),
        Outcome::Matched
    );
}
