//! Unit tests for the dispatch engine.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rstest::{fixture, rstest};
use serde_json::{Value, json};
use switchyard_extensions::{
    ConstructorArgs, Extension, ExtensionClass, ExtensionMetadata, HttpVerb, InvocationError,
    MethodDescriptor, MethodMap, RegistrationError,
};

use crate::dispatch::{CommandRequest, DispatchError, DispatchOutcome, ErrorCode};
use crate::logger::LogLevel;
use crate::resolver::AttemptOutcome;
use crate::session::CancellationToken;
use crate::tests::{
    EXECUTE_ROUTE, FAIL_ROUTE, FakeDriverClass, InterceptMode, Journal, PLUGIN_ROUTE,
    RecorderPluginClass, RecordingLogger, SESSION_ROUTE, STATUS_ROUTE, TEXT_ROUTE, TestEngine, URL_ROUTE,
};

#[fixture]
fn android() -> TestEngine {
    TestEngine::with_driver()
}

fn run(harness: &TestEngine, request: CommandRequest) -> Result<DispatchOutcome, DispatchError> {
    harness.engine.dispatch(request, &CancellationToken::new())
}

fn value_of(outcome: Result<DispatchOutcome, DispatchError>) -> Value {
    match outcome {
        Ok(DispatchOutcome::Value { value }) => value,
        Ok(other) => panic!("expected a value, got {other:?}"),
        Err(error) => panic!("dispatch failed: {error}"),
    }
}

// ---------------------------------------------------------------------------
// Session creation
// ---------------------------------------------------------------------------

#[rstest]
fn creates_session_with_merged_capabilities(android: TestEngine) {
    let created = android
        .engine
        .create_session(&json!({
            "capabilities": {
                "alwaysMatch": {"platformName": "Android"},
                "firstMatch": [{"appium:deviceName": "pixel"}]
            }
        }))
        .expect("session created");

    assert_eq!(created.driver, "android");
    assert!(uuid::Uuid::parse_str(&created.session_id).is_ok());
    assert_eq!(
        created.capabilities.to_json(),
        json!({"platformName": "Android", "appium:deviceName": "pixel"})
    );
    assert_eq!(android.engine.session_count().expect("count"), 1);
    assert_eq!(
        android
            .engine
            .session_capabilities(&created.session_id)
            .expect("capabilities"),
        created.capabilities
    );
}

#[rstest]
fn colliding_entry_is_skipped_for_a_later_one(android: TestEngine) {
    let created = android
        .engine
        .create_session(&json!({
            "alwaysMatch": {"platformName": "Android"},
            "firstMatch": [{"platformName": "iOS"}, {"appium:udid": "emulator-5554"}]
        }))
        .expect("second entry negotiates");
    assert_eq!(
        created.capabilities.get("appium:udid"),
        Some(&json!("emulator-5554"))
    );
}

#[rstest]
fn unmatched_capabilities_report_every_attempt(android: TestEngine) {
    let error = android
        .engine
        .create_session(&json!({"alwaysMatch": {"platformName": "Fuchsia"}}))
        .expect_err("no driver accepts Fuchsia");

    let DispatchError::SessionNotCreated { attempts, .. } = &error else {
        panic!("expected SessionNotCreated, got {error}");
    };
    assert_eq!(attempts.len(), 1);
    assert_eq!(
        attempts[0].outcome,
        AttemptOutcome::Declined {
            drivers: vec!["android".to_owned()]
        }
    );
    assert_eq!(error.error_code(), ErrorCode::SessionNotCreated);
    assert_eq!(error.http_status(), 500);
    assert!(android.logger.contains(LogLevel::Error, "no driver accepted"));
}

#[rstest]
#[case::not_an_object(json!("caps"))]
#[case::bad_first_match(json!({"capabilities": {"firstMatch": {}}}))]
fn malformed_capabilities_do_not_create_sessions(android: TestEngine, #[case] payload: Value) {
    let error = android
        .engine
        .create_session(&payload)
        .expect_err("malformed payload");
    assert!(matches!(error, DispatchError::SessionNotCreated { .. }));
    assert_eq!(android.engine.session_count().expect("count"), 0);
}

#[test]
fn constructor_failure_is_session_not_created() {
    let harness = TestEngine::assemble(|builder, journal| {
        builder
            .register(Arc::new(
                FakeDriverClass::new("android", "Android", journal).with_failing_constructor(),
            ))
            .expect("driver registers");
    });
    let error = harness
        .engine
        .create_session(&json!({"alwaysMatch": {"platformName": "Android"}}))
        .expect_err("constructor fails");
    assert!(
        error.to_string().contains("device is offline"),
        "unexpected error: {error}"
    );
    assert_eq!(harness.engine.session_count().expect("count"), 0);
}

#[rstest]
fn unprefixed_capabilities_are_warned_about(android: TestEngine) {
    android
        .engine
        .create_session(&json!({
            "alwaysMatch": {"platformName": "Android", "deviceName": "pixel"}
        }))
        .expect("session created");
    assert!(android.logger.contains(LogLevel::Warn, "deviceName"));
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[rstest]
fn commands_reach_the_session_driver(android: TestEngine) {
    let session = android.android_session();
    let set = run(
        &android,
        CommandRequest::new(HttpVerb::Post, URL_ROUTE)
            .for_session(session.as_str())
            .with_body(json!({"url": "https://example.test", "ignored": true})),
    );
    assert_eq!(value_of(set), Value::Null);

    let get = run(
        &android,
        CommandRequest::new(HttpVerb::Get, URL_ROUTE).for_session(session.as_str()),
    );
    assert_eq!(value_of(get), json!("https://example.test"));
}

#[rstest]
fn wrapped_body_and_unwrapped_result(android: TestEngine) {
    let session = android.android_session();
    let outcome = run(
        &android,
        CommandRequest::new(HttpVerb::Post, EXECUTE_ROUTE)
            .for_session(session.as_str())
            .with_body(json!({"x": 1})),
    );
    assert_eq!(value_of(outcome), json!(42));
    assert!(
        android
            .journal
            .entries()
            .iter()
            .any(|entry| entry.ends_with(r#"execute {"params":{"x":1}}"#)),
        "journal: {:?}",
        android.journal.entries()
    );
}

#[rstest]
fn missing_parameter_is_an_invalid_argument(android: TestEngine) {
    let session = android.android_session();
    let error = run(
        &android,
        CommandRequest::new(HttpVerb::Post, URL_ROUTE)
            .for_session(session.as_str())
            .with_body(json!({})),
    )
    .expect_err("url is required");
    assert_eq!(error.error_code(), ErrorCode::InvalidArgument);
    assert_eq!(error.http_status(), 400);
    assert_eq!(error.parameter_names(), vec!["url"]);
    assert!(android.logger.contains(LogLevel::Warn, "missing required parameters"));
}

#[rstest]
fn route_parameters_become_named_arguments(android: TestEngine) {
    let session = android.android_session();
    let outcome = run(
        &android,
        CommandRequest::new(HttpVerb::Get, TEXT_ROUTE)
            .for_session(session.as_str())
            .with_path_param("elementId", "e-7"),
    );
    assert_eq!(value_of(outcome), json!("e-7"));
}

#[rstest]
fn backend_errors_keep_their_protocol_code(android: TestEngine) {
    let session = android.android_session();
    let error = run(
        &android,
        CommandRequest::new(HttpVerb::Post, FAIL_ROUTE).for_session(session.as_str()),
    )
    .expect_err("backend fails");
    let DispatchError::BackendInvocation { extension, command, .. } = &error else {
        panic!("expected BackendInvocation, got {error}");
    };
    assert_eq!(extension, "android");
    assert_eq!(command, "fail");
    assert_eq!(error.protocol_error(), "no such element");
    assert_eq!(
        error.to_response_body()["value"]["error"],
        json!("no such element")
    );
    assert!(android.logger.contains(LogLevel::Error, "element could not be located"));
}

#[rstest]
#[case::mounted_route(HttpVerb::Get, URL_ROUTE, ErrorCode::InvalidSessionId)]
#[case::unknown_route(HttpVerb::Get, "/session/:sessionId/nothing", ErrorCode::UnknownCommand)]
fn unknown_sessions_are_classified(
    android: TestEngine,
    #[case] verb: HttpVerb,
    #[case] route: &str,
    #[case] expected: ErrorCode,
) {
    let error = run(
        &android,
        CommandRequest::new(verb, route).for_session("no-such-session"),
    )
    .expect_err("session does not exist");
    assert_eq!(error.error_code(), expected);
    assert_eq!(error.http_status(), 404);
}

#[rstest]
fn sessionless_requests_never_reach_drivers(android: TestEngine) {
    let error = run(&android, CommandRequest::new(HttpVerb::Get, URL_ROUTE))
        .expect_err("driver routes need a session");
    assert!(matches!(error, DispatchError::RouteNotFound { .. }));
}

// ---------------------------------------------------------------------------
// Plugins
// ---------------------------------------------------------------------------

fn with_plugins(modes: &[(&'static str, InterceptMode)]) -> TestEngine {
    let modes = modes.to_vec();
    TestEngine::assemble(move |builder, journal| {
        for (name, mode) in modes {
            builder
                .register(Arc::new(RecorderPluginClass::new(name, mode, journal)))
                .expect("plugin registers");
        }
        builder
            .register(Arc::new(FakeDriverClass::new("android", "Android", journal)))
            .expect("driver registers");
    })
}

#[test]
fn interceptors_run_in_registration_order_around_the_driver() {
    let harness = with_plugins(&[
        ("outer", InterceptMode::PassThrough),
        ("inner", InterceptMode::Decorate),
    ]);
    let session = harness.android_session();
    let outcome = run(
        &harness,
        CommandRequest::new(HttpVerb::Get, URL_ROUTE).for_session(session.as_str()),
    );
    assert_eq!(value_of(outcome), json!({"by": "inner", "value": null}));

    let trail: Vec<String> = harness
        .journal
        .entries()
        .into_iter()
        .filter(|entry| entry.contains("getUrl"))
        .collect();
    assert_eq!(
        trail,
        vec![
            "outer:before getUrl",
            "inner:before getUrl",
            "inner:after getUrl",
            "outer:after getUrl",
        ]
    );
}

#[test]
fn interceptor_may_short_circuit_the_driver() {
    let harness = with_plugins(&[
        ("cache", InterceptMode::ShortCircuit),
        ("later", InterceptMode::PassThrough),
    ]);
    let session = harness.android_session();
    let outcome = run(
        &harness,
        CommandRequest::new(HttpVerb::Get, URL_ROUTE).for_session(session.as_str()),
    );
    assert_eq!(value_of(outcome), json!("cache answered"));
    assert!(
        !harness
            .journal
            .entries()
            .iter()
            .any(|entry| entry.starts_with("later:") && entry.contains("getUrl")),
        "later interceptors must not run"
    );
}

#[test]
fn commands_outside_a_plugin_set_skip_it() {
    let harness = with_plugins(&[("recorder", InterceptMode::PassThrough)]);
    let session = harness.android_session();
    run(
        &harness,
        CommandRequest::new(HttpVerb::Post, URL_ROUTE)
            .for_session(session.as_str())
            .with_body(json!({"url": "https://example.test"})),
    )
    .expect("setUrl runs");
    assert!(
        !harness
            .journal
            .entries()
            .iter()
            .any(|entry| entry.contains("setUrl"))
    );
}

#[test]
fn sessionless_plugin_routes_start_one_instance_lazily() {
    let harness = with_plugins(&[("recorder", InterceptMode::PassThrough)]);
    for _ in 0..2 {
        let outcome = run(&harness, CommandRequest::new(HttpVerb::Get, STATUS_ROUTE));
        assert_eq!(
            value_of(outcome),
            json!({"ready": true, "plugin": "recorder"})
        );
    }
    let starts = harness
        .journal
        .entries()
        .into_iter()
        .filter(|entry| entry == "recorder:instantiate sessionless")
        .count();
    assert_eq!(starts, 1);
}

#[test]
fn plugin_session_routes_use_the_session_instance() {
    let harness = with_plugins(&[("recorder", InterceptMode::PassThrough)]);
    let session = harness.android_session();
    let outcome = run(
        &harness,
        CommandRequest::new(HttpVerb::Get, PLUGIN_ROUTE).for_session(session.as_str()),
    );
    let events = value_of(outcome);
    assert!(
        events
            .as_array()
            .is_some_and(|entries| {
                entries.contains(&json!(format!("recorder:instantiate {session}")))
            }),
        "events: {events}"
    );
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn deleting_a_session_terminates_its_instances() {
    let harness = with_plugins(&[("recorder", InterceptMode::PassThrough)]);
    let session = harness.android_session();
    harness.engine.delete_session(&session).expect("deleted");

    let entries = harness.journal.entries();
    assert!(entries.contains(&"recorder:terminate".to_owned()));
    assert!(entries.contains(&format!("android@{session}:terminate")));
    let plugin_first = entries.iter().position(|e| e == "recorder:terminate");
    let driver_last = entries
        .iter()
        .position(|e| *e == format!("android@{session}:terminate"));
    assert!(plugin_first < driver_last, "plugins terminate first");

    let error = run(
        &harness,
        CommandRequest::new(HttpVerb::Get, URL_ROUTE).for_session(session.as_str()),
    )
    .expect_err("session is gone");
    assert!(matches!(error, DispatchError::SessionNotFound { .. }));
    assert!(matches!(
        harness.engine.delete_session(&session),
        Err(DispatchError::SessionNotFound { .. })
    ));
}

fn with_idle_timeout(timeout: Option<Duration>) -> TestEngine {
    let journal = Journal::default();
    let logger = Arc::new(RecordingLogger::default());
    let mut builder = TestEngine::builder(&logger).with_new_command_timeout(timeout);
    builder
        .register(Arc::new(FakeDriverClass::new("android", "Android", &journal)))
        .expect("driver registers");
    TestEngine {
        engine: builder.build(),
        journal,
        logger,
    }
}

#[test]
fn termination_command_destroys_the_session() {
    let harness = with_plugins(&[("recorder", InterceptMode::PassThrough)]);
    let session = harness.android_session();
    let outcome = run(
        &harness,
        CommandRequest::new(HttpVerb::Delete, SESSION_ROUTE).for_session(session.as_str()),
    );
    assert_eq!(value_of(outcome), Value::Null);
    assert_eq!(harness.engine.session_count().expect("count"), 0);

    let driver = format!("android@{session}");
    let trail: Vec<String> = harness
        .journal
        .entries()
        .into_iter()
        .filter(|entry| entry.starts_with(&driver) || entry == "recorder:terminate")
        .collect();
    assert_eq!(
        trail,
        vec![
            format!("{driver}:instantiate"),
            format!("{driver}:deleteSession"),
            "recorder:terminate".to_owned(),
            format!("{driver}:terminate"),
        ]
    );
    let error = run(
        &harness,
        CommandRequest::new(HttpVerb::Get, URL_ROUTE).for_session(session.as_str()),
    )
    .expect_err("session is gone");
    assert!(matches!(error, DispatchError::SessionNotFound { .. }));
}

#[test]
fn idle_sessions_expire_after_the_new_command_timeout() {
    let harness = with_idle_timeout(Some(Duration::from_millis(5)));
    let session = harness.android_session();
    thread::sleep(Duration::from_millis(20));

    let expired = harness.engine.expire_idle_sessions().expect("sweep");
    assert_eq!(expired, vec![session.clone()]);
    assert_eq!(harness.engine.session_count().expect("count"), 0);
    assert!(harness.logger.contains(LogLevel::Warn, &session));
    assert!(
        harness
            .journal
            .entries()
            .contains(&format!("android@{session}:terminate"))
    );
}

#[test]
fn recently_used_sessions_survive_the_sweep() {
    let harness = with_idle_timeout(Some(Duration::from_secs(60)));
    harness.android_session();
    assert!(harness.engine.expire_idle_sessions().expect("sweep").is_empty());
    assert_eq!(harness.engine.session_count().expect("count"), 1);
}

#[test]
fn disabled_timeout_never_expires_sessions() {
    let harness = with_idle_timeout(None);
    harness.android_session();
    thread::sleep(Duration::from_millis(5));
    assert!(harness.engine.expire_idle_sessions().expect("sweep").is_empty());
    assert_eq!(harness.engine.session_count().expect("count"), 1);
}

#[test]
fn shutdown_destroys_every_session() {
    let harness = with_plugins(&[("recorder", InterceptMode::PassThrough)]);
    harness.android_session();
    harness.android_session();
    run(&harness, CommandRequest::new(HttpVerb::Get, STATUS_ROUTE)).expect("status");

    assert_eq!(harness.engine.shutdown().expect("shutdown"), 2);
    assert_eq!(harness.engine.session_count().expect("count"), 0);
    let terminations = harness
        .journal
        .entries()
        .into_iter()
        .filter(|entry| entry == "recorder:terminate")
        .count();
    assert_eq!(terminations, 3, "two session instances and one session-less");
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

struct UnknownCommandDriver(ExtensionMetadata);

impl ExtensionClass for UnknownCommandDriver {
    fn metadata(&self) -> &ExtensionMetadata {
        &self.0
    }

    fn commands(&self) -> &[&str] {
        &[]
    }

    fn method_map(&self) -> MethodMap {
        MethodMap::new().with_route(
            URL_ROUTE,
            HttpVerb::Get,
            MethodDescriptor::new("getUrl"),
        )
    }

    fn instantiate(&self, _args: ConstructorArgs<'_>) -> Result<Box<dyn Extension>, InvocationError> {
        Err(InvocationError::new("never built"))
    }
}

#[test]
fn registration_failures_are_logged_and_returned() {
    let logger = Arc::new(RecordingLogger::default());
    let mut builder = TestEngine::builder(&logger);
    let error = builder
        .register(Arc::new(UnknownCommandDriver(ExtensionMetadata::driver(
            "broken", "1.0.0",
        ))))
        .expect_err("getUrl is not exposed");
    assert!(matches!(error, RegistrationError::UnknownCommand { .. }));
    assert!(logger.contains(LogLevel::Error, "broken"));
    assert!(builder.list_routes().is_empty());
}

#[rstest]
fn routes_are_listed_for_the_transport(android: TestEngine) {
    let routes = android.engine.list_routes();
    assert!(routes.iter().any(|listing| listing.route == URL_ROUTE
        && listing.verb == HttpVerb::Post
        && listing.command == "setUrl"));
    assert_eq!(routes.len(), 8);
}
