use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use api_module::{
    ApiError, ApiModule, ApiResponse, CallState, ClientError, ModuleConfig, RequestConfig,
    RequestData, RequestOptions, Stage, TransportConfig,
};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};


#[tokio::test]
async fn test_post_request_hook_forwards_echoed_body() {
    let server = fixtures::echo_server().await;
    let module = fixtures::flat_module(&server.uri());
    module.use_after(|ctx, next| {
        if let Some(res) = ctx.response_mut() {
            res.data = res.data["data"].clone();
        }
        next.pass()
    });

    let test = module.get_instance().endpoint("test").unwrap();
    let res = test
        .call(RequestData::new().with_body(json!({ "a": 1, "b": 2 })))
        .await
        .unwrap();
    assert_eq!(res.data, json!({ "a": 1, "b": 2 }));
}

#[tokio::test]
async fn test_url_template_and_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/123/999/info"))
        .and(query_param("o", "calvin"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let module = ApiModule::new(
        ModuleConfig::new()
            .module(false)
            .metadatas(json!({ "info": { "method": "get", "url": "/api/{id}/:time/info" } }))
            .base_config(TransportConfig::new().with_base_url(server.uri())),
    )
    .unwrap();

    let info = module.get_instance().endpoint("info").unwrap();
    let res = info
        .call(
            RequestData::new()
                .with_param("id", 123)
                .with_param("time", 999)
                .with_query("o", "calvin"),
        )
        .await
        .unwrap();
    assert_eq!(res.data, json!({ "ok": true }));
    assert_eq!(
        info.last_context().unwrap().parsed_url(),
        "/api/123/999/info"
    );
}

#[tokio::test]
async fn test_fore_request_veto_never_reaches_the_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let module = fixtures::flat_module(&server.uri());
    module.use_before(|ctx, next| {
        ctx.set_error("I am an Error occurred before real request");
        next.pass()
    });

    let test = module.get_instance().endpoint("test").unwrap();
    let err = test.call(RequestData::new()).await.unwrap_err();
    assert_eq!(err.to_string(), "I am an Error occurred before real request");
    assert_eq!(test.last_context().unwrap().state(), CallState::Rejected);
}

#[tokio::test]
async fn test_next_argument_wins_over_context_error() {
    let server = fixtures::echo_server().await;
    let module = fixtures::flat_module(&server.uri());
    module.use_before(|ctx, next| {
        ctx.set_error("set on the context");
        next.fail("passed to next")
    });

    let test = module.get_instance().endpoint("test").unwrap();
    let err = test.call(RequestData::new()).await.unwrap_err();
    assert_eq!(err.to_string(), "passed to next");
}

#[tokio::test]
async fn test_post_request_veto_rejects_after_transport() {
    let server = fixtures::echo_server().await;
    let module = fixtures::flat_module(&server.uri());
    module.use_after(|ctx, next| {
        match ctx.response().map(|res| res.data["data"]["allowed"].clone()) {
            Some(allowed) if allowed == json!(true) => next.pass(),
            _ => next.fail(json!({ "code": 403 })),
        }
    });

    let test = module.get_instance().endpoint("test").unwrap();
    let err = test
        .call(RequestData::new().with_body(json!({ "allowed": false })))
        .await
        .unwrap_err();
    assert_eq!(err.payload(), Some(&json!({ "code": 403 })));

    let res = test
        .call(RequestData::new().with_body(json!({ "allowed": true })))
        .await
        .unwrap();
    assert_eq!(res.status, 200);
}

#[tokio::test]
async fn test_fallback_sees_transport_error_and_decides_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let seen = Arc::new(AtomicUsize::new(0));
    let module = fixtures::flat_module(&server.uri());
    let counter = Arc::clone(&seen);
    module.use_catch(move |ctx, next| {
        if ctx.response_error().and_then(ApiError::status_code) == Some(500) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        next.fail("service unavailable")
    });

    let test = module.get_instance().endpoint("test").unwrap();
    let err = test.call(RequestData::new()).await.unwrap_err();
    assert_eq!(err.to_string(), "service unavailable");
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_default_fallback_rejects_with_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
        .mount(&server)
        .await;

    let module = fixtures::flat_module(&server.uri());
    let test = module.get_instance().endpoint("test").unwrap();
    let err = test.call(RequestData::new()).await.unwrap_err();
    assert!(matches!(
        err,
        ApiError::Client(ClientError::HttpStatus { status: 404, .. })
    ));
}

#[tokio::test]
async fn test_cleared_fallback_still_rejects() {
    let module = fixtures::flat_module("http://127.0.0.1:1");
    module.use_before(|_, next| next.fail("vetoed"));
    module.use_catch(|ctx, next| {
        ctx.clear_error();
        next.pass()
    });

    let test = module.get_instance().endpoint("test").unwrap();
    let err = test.call(RequestData::new()).await.unwrap_err();
    assert!(matches!(err, ApiError::Cleared));
    let ctx = test.last_context().unwrap();
    assert_eq!(ctx.state(), CallState::Rejected);
    assert!(ctx.response_error().is_none());
}

#[tokio::test]
async fn test_state_resets_between_calls() {
    let server = fixtures::echo_server().await;
    let module = fixtures::flat_module(&server.uri());
    module.use_before(|ctx, next| {
        let config = RequestConfig::from_context(ctx);
        ctx.set_response(ApiResponse::new(200, json!({ "early": true }), config));
        ctx.set_options(RequestOptions::new().with_header("x-first-call", "1"));
        ctx.set_error("first call error");
        next.pass()
    });

    let test = module.get_instance().endpoint("test").unwrap();
    let first = RequestData::new().with_body(json!({ "call": 1 }));
    assert!(test.call(first).await.is_err());
    assert!(test.last_context().unwrap().response().is_some());

    let second = RequestData::new()
        .with_body(json!({ "call": 2 }))
        .with_query("o", "calvin");
    let expected = second.clone();
    let clean = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&clean);
    module.use_before(move |ctx, next| {
        let reset = ctx.response().is_none()
            && ctx.response_error().is_none()
            && ctx.options().is_empty()
            && ctx.data() == &expected;
        if reset {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        next.pass()
    });
    let res = test.call(second).await.unwrap();
    assert_eq!(res.data["data"], json!({ "call": 2 }));
    assert_eq!(clean.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_call_options_win_over_middleware_options() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/info"))
        .and(header("x-custom-header", "I am custom header"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let module = fixtures::flat_module("http://127.0.0.1:1");
    module.use_before(|ctx, next| {
        ctx.set_options(
            RequestOptions::new()
                .with_base_url("http://localhost:8877")
                .with_header("x-custom-header", "I am custom header")
                .with_header("Content-Type", "application/x-www-form-urlencoded"),
        );
        next.pass()
    });

    let test = module.get_instance().endpoint("test").unwrap();
    let res = test
        .call_with(
            RequestData::new().with_body(json!({ "a": 1, "b": 2 })),
            RequestOptions::new().with_base_url(server.uri()),
        )
        .await
        .unwrap();

    assert_eq!(res.config.base_url, Some(server.uri()));
    assert_eq!(
        res.config.headers.get("x-custom-header").map(String::as_str),
        Some("I am custom header")
    );
}

#[tokio::test]
async fn test_middleware_base_url_redirects_the_call() {
    let server = fixtures::echo_server().await;
    let module = fixtures::flat_module("http://127.0.0.1:1");
    let target = server.uri();
    module.use_before(move |ctx, next| {
        ctx.set_options(RequestOptions::new().with_base_url(target.clone()));
        next.pass()
    });

    let test = module.get_instance().endpoint("test").unwrap();
    let res = test
        .call(RequestData::new().with_body(json!({ "x": 1 })))
        .await
        .unwrap();
    assert_eq!(res.data["data"], json!({ "x": 1 }));
}

#[tokio::test]
async fn test_cancel_in_flight_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let module = fixtures::flat_module(&server.uri());
    let source = module.generate_cancellation_source();
    let test = module.get_instance().endpoint("test").unwrap();

    let (outcome, ()) = tokio::join!(
        test.call_with(
            RequestData::new(),
            RequestOptions::new().with_cancel_token(source.token()),
        ),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            source.cancel("I want to cancel");
        }
    );

    let err = outcome.unwrap_err();
    assert!(err.is_canceled());
    assert_eq!(err.to_string(), "I want to cancel");
}

#[tokio::test]
async fn test_cancellation_reaches_fallback() {
    let module = fixtures::flat_module("http://127.0.0.1:1");
    let source = module.generate_cancellation_source();
    source.cancel("stop");

    let saw_cancel = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&saw_cancel);
    module.use_catch(move |ctx, next| {
        if ctx.response_error().is_some_and(ApiError::is_canceled) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        next.pass()
    });

    let test = module.get_instance().endpoint("test").unwrap();
    let err = test
        .call_with(
            RequestData::new(),
            RequestOptions::new().with_cancel_token(source.token()),
        )
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "stop");
    assert_eq!(saw_cancel.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_absent_and_panicking_hooks_still_settle() {
    let server = fixtures::echo_server().await;
    let module = fixtures::flat_module(&server.uri());
    let test = module.get_instance().endpoint("test").unwrap();

    for stage in [Stage::Before, Stage::After, Stage::Catch] {
        module.set_hook(stage, None);
    }
    let settled = tokio::time::timeout(Duration::from_secs(2), test.call(RequestData::new())).await;
    assert!(settled.unwrap().is_ok());

    module.use_before(|_, _| panic!("buggy middleware"));
    module.use_after(|_, _| panic!("buggy middleware"));
    let settled = tokio::time::timeout(Duration::from_secs(2), test.call(RequestData::new())).await;
    assert!(settled.unwrap().is_ok());
}

#[tokio::test]
async fn test_response_interceptor_applies_to_module_calls() {
    let server = fixtures::echo_server().await;
    let module = fixtures::flat_module(&server.uri());
    module.http_transport().unwrap().intercept_response(|mut res| {
        res.data = res.data["data"].clone();
        Ok(res)
    });

    let test = module.get_instance().endpoint("test").unwrap();
    let res = test
        .call(RequestData::new().with_body(json!({ "a": 1 })))
        .await
        .unwrap();
    assert_eq!(res.data, json!({ "a": 1 }));
}

#[tokio::test]
async fn test_dynamic_call_with_invalid_options_still_runs() {
    let server = fixtures::echo_server().await;
    let module = fixtures::flat_module(&server.uri());
    let test = module.get_instance().endpoint("test").unwrap();

    let res = test
        .call_value(json!({ "body": { "a": 1, "b": 2 } }), Some(json!(123)))
        .await
        .unwrap();
    assert_eq!(res.data["data"], json!({ "a": 1, "b": 2 }));
}

#[tokio::test]
async fn test_concurrent_calls_do_not_share_state() {
    let server = fixtures::echo_server().await;
    let module = fixtures::flat_module(&server.uri());
    let leaked = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&leaked);
    module.use_before(move |ctx, next| {
        if ctx.response().is_some() {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        next.pass()
    });

    let test = module.get_instance().endpoint("test").unwrap();
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let endpoint = test.clone();
            tokio::spawn(async move {
                endpoint
                    .call(RequestData::new().with_body(json!({ "i": i })))
                    .await
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let res = handle.await.unwrap().unwrap();
        assert_eq!(res.data["data"]["i"], json!(i));
    }
    assert_eq!(leaked.load(Ordering::SeqCst), 0);
}
