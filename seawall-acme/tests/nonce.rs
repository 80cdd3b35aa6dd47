//! Nonce lifecycle tests against a mock directory: every nonce is used exactly once, and
//! `badNonce` errors are retried exactly once per logical call.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use seawall_acme::{b64u, Client, Error};

/// Shared mock server state: a nonce sequence and the record of nonces clients consumed.
struct NonceState {
    counter: AtomicUsize,
    used: Mutex<Vec<String>>,
}

impl NonceState {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            counter: AtomicUsize::new(0),
            used: Mutex::new(Vec::new()),
        })
    }

    fn issue(&self) -> String {
        format!("nonce-{}", self.counter.fetch_add(1, Ordering::SeqCst))
    }

    fn record(&self, request: &Request) {
        self.used.lock().unwrap().push(nonce_of(request));
    }

    fn used(&self) -> Vec<String> {
        self.used.lock().unwrap().clone()
    }
}

/// Extract the nonce a signed request consumed from its protected header.
fn nonce_of(request: &Request) -> String {
    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    let protected =
        b64u::decode(body["protected"].as_str().unwrap()).expect("protected must be base64url");
    let protected: serde_json::Value = serde_json::from_slice(&protected).unwrap();
    protected["nonce"].as_str().unwrap().to_string()
}

fn directory_body(uri: &str) -> serde_json::Value {
    json!({
        "newAccount": format!("{uri}/acme/new-acct"),
        "newNonce": format!("{uri}/acme/new-nonce"),
        "newOrder": format!("{uri}/acme/new-order"),
        "revokeCert": format!("{uri}/acme/revoke-cert"),
        "keyChange": format!("{uri}/acme/key-change"),
        "meta": { "termsOfService": format!("{uri}/terms") },
    })
}

struct NewNonce(Arc<NonceState>);

impl Respond for NewNonce {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        ResponseTemplate::new(204).insert_header("Replay-Nonce", self.0.issue().as_str())
    }
}

struct NewAccount(Arc<NonceState>);

impl Respond for NewAccount {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        self.0.record(request);
        ResponseTemplate::new(201)
            .insert_header("Replay-Nonce", self.0.issue().as_str())
            .insert_header("Location", "https://ex/acct/1")
            .set_body_json(json!({ "status": "valid" }))
    }
}

struct GetOrder(Arc<NonceState>);

impl Respond for GetOrder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        self.0.record(request);
        ResponseTemplate::new(200)
            .insert_header("Replay-Nonce", self.0.issue().as_str())
            .set_body_json(json!({
                "status": "pending",
                "identifiers": [ { "type": "dns", "value": "example.com" } ],
                "authorizations": [ "https://ex/authz/1" ],
                "finalize": "https://ex/order/1/finalize",
            }))
    }
}

/// `new-order` endpoint which fails with `badNonce` a configurable number of times before
/// succeeding.
struct FlakyNewOrder {
    state: Arc<NonceState>,
    failures: usize,
    hits: AtomicUsize,
}

impl Respond for FlakyNewOrder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        self.state.record(request);
        let hit = self.hits.fetch_add(1, Ordering::SeqCst);
        if hit < self.failures {
            ResponseTemplate::new(400)
                .insert_header("Replay-Nonce", self.state.issue().as_str())
                .set_body_json(json!({
                    "type": "urn:ietf:params:acme:error:badNonce",
                    "detail": "JWS has an invalid anti-replay nonce",
                }))
        } else {
            ResponseTemplate::new(201)
                .insert_header("Replay-Nonce", self.state.issue().as_str())
                .insert_header("Location", "https://ex/order/1")
                .set_body_json(json!({
                    "status": "pending",
                    "identifiers": [ { "type": "dns", "value": "example.com" } ],
                    "authorizations": [ "https://ex/authz/1" ],
                    "finalize": "https://ex/order/1/finalize",
                }))
        }
    }
}

// field order matters: the server must shut down before its runtime is dropped
struct TestServer {
    server: MockServer,
    rt: tokio::runtime::Runtime,
    state: Arc<NonceState>,
}

/// Start a mock directory. The runtime must stay alive for the duration of the test since it
/// serves the mock endpoints in the background while the blocking client runs on the test
/// thread.
fn start_server() -> TestServer {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();
    let server = rt.block_on(MockServer::start());
    let state = NonceState::new();

    let directory = directory_body(&server.uri());
    rt.block_on(async {
        Mock::given(method("GET"))
            .and(path("/dir"))
            .respond_with(ResponseTemplate::new(200).set_body_json(directory))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/acme/new-nonce"))
            .respond_with(NewNonce(Arc::clone(&state)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/acme/new-acct"))
            .respond_with(NewAccount(Arc::clone(&state)))
            .mount(&server)
            .await;
    });

    TestServer { rt, server, state }
}

fn connect(server: &TestServer) -> Client {
    let mut client = Client::new(format!("{}/dir", server.server.uri()));
    client.set_allow_http(true);
    client
}

#[test]
fn each_nonce_is_used_exactly_once() {
    let test = start_server();
    let order_url = format!("{}/order/1", test.server.uri());

    test.rt.block_on(
        Mock::given(method("POST"))
            .and(path("/order/1"))
            .respond_with(GetOrder(Arc::clone(&test.state)))
            .mount(&test.server),
    );

    let mut client = connect(&test);
    client.new_account(vec![], true, Some(2048), None).unwrap();
    for _ in 0..3 {
        client.get_order(&order_url).unwrap();
    }

    let used = test.state.used();
    // Four signed requests: the registration and three order queries. Each one must have
    // consumed the most recently issued nonce, and no nonce twice.
    assert_eq!(used, ["nonce-0", "nonce-1", "nonce-2", "nonce-3"]);
}

#[test]
fn bad_nonce_is_retried_once() {
    let test = start_server();

    test.rt.block_on(
        Mock::given(method("POST"))
            .and(path("/acme/new-order"))
            .respond_with(FlakyNewOrder {
                state: Arc::clone(&test.state),
                failures: 1,
                hits: AtomicUsize::new(0),
            })
            .mount(&test.server),
    );

    let mut client = connect(&test);
    client.new_account(vec![], true, Some(2048), None).unwrap();

    let order = client.new_order(vec!["example.com".to_string()]).unwrap();
    assert_eq!(order.location, "https://ex/order/1");

    let posts: Vec<_> = test
        .rt
        .block_on(test.server.received_requests())
        .unwrap()
        .into_iter()
        .filter(|request| request.url.path() == "/acme/new-order")
        .collect();
    assert_eq!(posts.len(), 2, "one badNonce failure must cause exactly one retry");

    // the retry must have used the nonce delivered with the badNonce error
    let used = test.state.used();
    let retry_nonce = &used[used.len() - 1];
    let error_nonce = &used[used.len() - 2];
    assert_ne!(retry_nonce, error_nonce);
}

#[test]
fn two_consecutive_bad_nonces_fail() {
    let test = start_server();

    test.rt.block_on(
        Mock::given(method("POST"))
            .and(path("/acme/new-order"))
            .respond_with(FlakyNewOrder {
                state: Arc::clone(&test.state),
                failures: usize::MAX,
                hits: AtomicUsize::new(0),
            })
            .mount(&test.server),
    );

    let mut client = connect(&test);
    client.new_account(vec![], true, Some(2048), None).unwrap();

    match client.new_order(vec!["example.com".to_string()]) {
        Err(Error::BadNonce) => (),
        other => panic!("expected BadNonce, got {:?}", other.map(|order| order.location)),
    }

    let posts: Vec<_> = test
        .rt
        .block_on(test.server.received_requests())
        .unwrap()
        .into_iter()
        .filter(|request| request.url.path() == "/acme/new-order")
        .collect();
    assert_eq!(posts.len(), 2, "the nonce budget is one retry per logical call");
}
