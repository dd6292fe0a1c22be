//! Verify build/parse methods against JSON test vectors stored in `test-vectors/`.
//!
//! Each vector file describes inputs, the expected request, and a list of
//! simulated responses with whether the operation should accept them.
//! Bodies are compared as parsed JSON so field order does not matter.

use drip_core::{ApiError, CustomFields, DripClient, HttpMethod, HttpRequest, HttpResponse, Subscriber};
use serde_json::Value;

const BASE_URL: &str = "https://api.getdrip.com/v2";

fn client() -> DripClient {
    DripClient::new("abc123", "9999999").unwrap()
}

fn parse_method(s: &str) -> HttpMethod {
    match s {
        "POST" => HttpMethod::Post,
        "DELETE" => HttpMethod::Delete,
        other => panic!("unknown method: {other}"),
    }
}

fn load(raw: &str) -> Vec<Value> {
    let vectors: Value = serde_json::from_str(raw).unwrap();
    vectors["cases"].as_array().unwrap().clone()
}

fn check_request(name: &str, req: &HttpRequest, expected: &Value) {
    assert_eq!(req.method, parse_method(expected["method"].as_str().unwrap()), "{name}: method");
    assert_eq!(req.url, format!("{BASE_URL}{}", expected["path"].as_str().unwrap()), "{name}: url");

    let expected_headers: Vec<(String, String)> = expected["headers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|h| {
            let arr = h.as_array().unwrap();
            (arr[0].as_str().unwrap().to_string(), arr[1].as_str().unwrap().to_string())
        })
        .collect();
    assert_eq!(req.headers, expected_headers, "{name}: headers");

    match expected.get("body") {
        Some(body) => {
            let req_body: Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
            assert_eq!(&req_body, body, "{name}: body");
        }
        None => assert!(req.body.is_none(), "{name}: body should be None"),
    }
}

/// Feed each simulated response to `parse` and compare with its `ok` flag.
fn check_responses(name: &str, case: &Value, parse: impl Fn(HttpResponse) -> Result<(), ApiError>) {
    for sim in case["responses"].as_array().unwrap() {
        let status = sim["status"].as_u64().unwrap() as u16;
        let body = sim["body"].as_str().unwrap().to_string();
        let response = HttpResponse {
            status,
            headers: Vec::new(),
            body: body.clone(),
        };
        let result = parse(response);
        if sim["ok"].as_bool().unwrap() {
            assert!(result.is_ok(), "{name}: status {status} should be accepted");
        } else {
            match result.unwrap_err() {
                ApiError::Api { status: got, body: got_body } => {
                    assert_eq!(got, status, "{name}: status");
                    assert_eq!(got_body, body, "{name}: body");
                }
                other => panic!("{name}: unexpected error {other:?}"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Create or update subscriber
// ---------------------------------------------------------------------------

#[test]
fn subscriber_test_vectors() {
    let c = client();
    for case in load(include_str!("../../test-vectors/subscribers.json")) {
        let name = case["name"].as_str().unwrap();
        let email = case["input"]["email"].as_str().unwrap();
        let fields: CustomFields = case["input"]["custom_fields"].as_object().unwrap().clone();

        let req = c.build_create_or_update_subscriber(email, &fields).unwrap();
        check_request(name, &req, &case["expected_request"]);
        check_responses(name, &case, |r| c.parse_post(r));
    }
}

// ---------------------------------------------------------------------------
// Batch update
// ---------------------------------------------------------------------------

#[test]
fn batch_test_vectors() {
    let c = client();
    for case in load(include_str!("../../test-vectors/batches.json")) {
        let name = case["name"].as_str().unwrap();
        let subscribers: Vec<Subscriber> = serde_json::from_value(case["input"].clone()).unwrap();

        let req = c.build_batch_update_subscribers(&subscribers).unwrap();
        check_request(name, &req, &case["expected_request"]);
        check_responses(name, &case, |r| c.parse_post(r));
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[test]
fn event_test_vectors() {
    let c = client();
    for case in load(include_str!("../../test-vectors/events.json")) {
        let name = case["name"].as_str().unwrap();
        let email = case["input"]["email"].as_str().unwrap();
        let action = case["input"]["action"].as_str().unwrap();

        let req = c.build_record_event(email, action).unwrap();
        check_request(name, &req, &case["expected_request"]);
        check_responses(name, &case, |r| c.parse_post(r));
    }
}

// ---------------------------------------------------------------------------
// Tag / untag
// ---------------------------------------------------------------------------

#[test]
fn tag_test_vectors() {
    let c = client();
    for case in load(include_str!("../../test-vectors/tags.json")) {
        let name = case["name"].as_str().unwrap();
        let email = case["input"]["email"].as_str().unwrap();
        let tag = case["input"]["tag"].as_str().unwrap();

        let req = c.build_tag_subscriber(email, tag).unwrap();
        check_request(name, &req, &case["expected_request"]);
        check_responses(name, &case, |r| c.parse_post(r));
    }
}

#[test]
fn untag_test_vectors() {
    let c = client();
    for case in load(include_str!("../../test-vectors/untag.json")) {
        let name = case["name"].as_str().unwrap();
        let email = case["input"]["email"].as_str().unwrap();
        let tag = case["input"]["tag"].as_str().unwrap();

        let req = c.build_untag_subscriber(email, tag);
        check_request(name, &req, &case["expected_request"]);
        check_responses(name, &case, |r| c.parse_untag_subscriber(r));
    }
}
