//! Integration tests: wiremock servers for the reqwest transport, scripted
//! transports for timing and cancellation behavior.

use async_trait::async_trait;
use resilient_fetch::retry::RetryAlways;
use resilient_fetch::{
    resilient_fetch, CallOutcome, CallStatus, CallbackError, CancelSignal, Error, FetchOptions,
    Fetcher, RequestMetadata, Transport, TransportResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct TestData {
    id: u32,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("resilient_fetch=debug")
        .with_test_writer()
        .try_init();
}

fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    (count.clone(), count)
}

#[tokio::test]
async fn test_recovers_after_two_server_errors() {
    init_tracing();
    let mock_server = MockServer::start().await;
    let (attempt_count, attempt_count_clone) = counter();

    // First two requests fail with 500, third succeeds
    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(move |_req: &wiremock::Request| {
            let count = attempt_count_clone.fetch_add(1, Ordering::SeqCst);
            if count < 2 {
                ResponseTemplate::new(500).set_body_string("Server error")
            } else {
                ResponseTemplate::new(200).set_body_json(TestData { id: 1 })
            }
        })
        .mount(&mock_server)
        .await;

    let (errors, errors_clone) = counter();
    let options = FetchOptions::builder()
        .retry_attempts(3)
        .on_error(move |_| {
            errors_clone.fetch_add(1, Ordering::SeqCst);
        })
        .build();

    let (pending, _cancel) = resilient_fetch::<TestData>(
        format!("{}/data", mock_server.uri()),
        RequestMetadata::default(),
        options,
    )
    .unwrap();

    let response = pending.await.unwrap();

    assert_eq!(response.data, TestData { id: 1 });
    assert_eq!(response.attempts, 3);
    assert!(response.was_retried());
    assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
    assert_eq!(errors.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_single_attempt_reports_http_error() {
    init_tracing();
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Unavailable"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let reported = Arc::new(Mutex::new(Vec::new()));
    let reported_clone = reported.clone();
    let options = FetchOptions::builder()
        .retry_attempts(1)
        .on_error(move |e| reported_clone.lock().unwrap().push(e.payload()))
        .build();

    let (pending, _cancel) = resilient_fetch::<TestData>(
        format!("{}/data", mock_server.uri()),
        RequestMetadata::default(),
        options,
    )
    .unwrap();

    let err = pending.await.unwrap_err();

    match &err {
        Error::HttpError {
            status,
            status_text,
            raw_response,
            ..
        } => {
            assert_eq!(status.as_u16(), 503);
            assert_eq!(status_text, "Service Unavailable");
            assert_eq!(raw_response, "Unavailable");
        }
        other => panic!("Expected HttpError, got {:?}", other),
    }

    let reported = reported.lock().unwrap();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].status, 503);
    assert_eq!(reported[0].message, "Service Unavailable");
}

#[tokio::test]
async fn test_slow_server_times_out() {
    init_tracing();
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(TestData { id: 1 })
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&mock_server)
        .await;

    let options = FetchOptions::builder()
        .timeout(Duration::from_millis(100))
        .build();

    let (pending, _cancel) = resilient_fetch::<TestData>(
        format!("{}/slow", mock_server.uri()),
        RequestMetadata::default(),
        options,
    )
    .unwrap();

    let err = pending.await.unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(err.status(), 408);
    assert_eq!(err.message(), "Request timed out");
}

#[tokio::test]
async fn test_cancel_aborts_in_flight_request() {
    init_tracing();
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(TestData { id: 1 })
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;

    let (errors, errors_clone) = counter();
    let options = FetchOptions::builder()
        .timeout(Duration::from_secs(10))
        .on_error(move |_| {
            errors_clone.fetch_add(1, Ordering::SeqCst);
        })
        .build();

    let (pending, cancel) = resilient_fetch::<TestData>(
        format!("{}/slow", mock_server.uri()),
        RequestMetadata::default(),
        options,
    )
    .unwrap();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let start = std::time::Instant::now();
    let err = pending.await.unwrap_err();

    assert!(err.is_cancellation());
    assert_eq!(err.status(), 499);
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(errors.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_request_metadata_is_passed_through() {
    init_tracing();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/items"))
        .and(query_param("page", "2"))
        .and(header("x-api-key", "secret"))
        .and(body_json(TestData { id: 9 }))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(TestData { id: 9 })
                .insert_header("x-request-id", "abc"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = RequestMetadata::new(http::Method::POST)
        .with_query_param("page", "2")
        .with_header("x-api-key", "secret")
        .unwrap()
        .with_json_body(&TestData { id: 9 })
        .unwrap();

    let (pending, _cancel) = resilient_fetch::<TestData>(
        format!("{}/items", mock_server.uri()),
        request,
        FetchOptions::default(),
    )
    .unwrap();

    let response = pending.await.unwrap();

    assert_eq!(response.status.as_u16(), 201);
    assert_eq!(response.header("x-request-id"), Some("abc"));
    assert_eq!(response.attempts, 1);
}

#[tokio::test]
async fn test_on_response_sees_every_response() {
    init_tracing();
    let mock_server = MockServer::start().await;
    let (attempt_count, attempt_count_clone) = counter();

    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(move |_req: &wiremock::Request| {
            if attempt_count_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                ResponseTemplate::new(404)
            } else {
                ResponseTemplate::new(200).set_body_json(TestData { id: 2 })
            }
        })
        .mount(&mock_server)
        .await;

    let statuses = Arc::new(Mutex::new(Vec::new()));
    let statuses_clone = statuses.clone();
    let options = FetchOptions::builder()
        .on_response(move |head| {
            let statuses = statuses_clone.clone();
            async move {
                statuses.lock().unwrap().push(head.status.as_u16());
                Ok::<(), CallbackError>(())
            }
        })
        .build();

    let (pending, _cancel) = resilient_fetch::<TestData>(
        format!("{}/data", mock_server.uri()),
        RequestMetadata::default(),
        options,
    )
    .unwrap();

    let response = pending.await.unwrap();

    assert_eq!(response.id, 2);
    assert_eq!(*statuses.lock().unwrap(), vec![404, 200]);
    assert_eq!(attempt_count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_outcome_shape_for_success() {
    init_tracing();
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(TestData { id: 1 }))
        .mount(&mock_server)
        .await;

    let (pending, _cancel) = resilient_fetch::<TestData>(
        format!("{}/data", mock_server.uri()),
        RequestMetadata::default(),
        FetchOptions::default(),
    )
    .unwrap();

    let outcome = CallOutcome::from(pending.await);

    assert!(!outcome.loading);
    assert_eq!(outcome.status, CallStatus::Success);
    assert_eq!(outcome.data, Some(TestData { id: 1 }));
    assert!(outcome.error.is_none());
}

#[tokio::test]
async fn test_refused_connection_is_retried_then_reported() {
    init_tracing();

    // Bind only to learn a free port, then release it so connections are refused.
    let uri = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        format!("http://{}", listener.local_addr().unwrap())
    };

    let reported = Arc::new(Mutex::new(Vec::new()));
    let reported_clone = reported.clone();
    let options = FetchOptions::builder()
        .retry_attempts(2)
        .on_error(move |e| reported_clone.lock().unwrap().push(e.status()))
        .build();

    let (pending, _cancel) = resilient_fetch::<TestData>(
        format!("{}/data", uri),
        RequestMetadata::default(),
        options,
    )
    .unwrap();

    let err = pending.await.unwrap_err();

    assert!(matches!(err, Error::Network(_)), "Expected Network, got {:?}", err);
    assert_eq!(err.status(), 0);
    assert_eq!(*reported.lock().unwrap(), vec![0]);
}

#[tokio::test(start_paused = true)]
async fn test_zero_timeout_still_times_out() {
    init_tracing();
    let transport = Delayed::new(Duration::from_millis(10), &[200]);
    let options = FetchOptions::builder().timeout(Duration::ZERO).build();

    let (pending, _cancel) = fetcher(&transport)
        .fetch::<TestData>(URL, RequestMetadata::default(), options)
        .unwrap();

    let err = pending.await.unwrap_err();

    assert!(err.is_timeout());
}

#[tokio::test]
async fn test_invalid_url_is_rejected_up_front() {
    init_tracing();
    let result = resilient_fetch::<TestData>(
        "not a url",
        RequestMetadata::default(),
        FetchOptions::default(),
    );

    assert!(matches!(result, Err(Error::InvalidUrl(_))));
}

/// Answers after `delay` with the next scripted status, observing cancellation.
struct Delayed {
    delay: Duration,
    statuses: Mutex<Vec<u16>>,
    calls: AtomicUsize,
}

impl Delayed {
    fn new(delay: Duration, statuses: &[u16]) -> Arc<Self> {
        Arc::new(Self {
            delay,
            statuses: Mutex::new(statuses.iter().rev().copied().collect()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for Delayed {
    async fn send(
        &self,
        _url: &Url,
        _request: &RequestMetadata,
        signal: &CancelSignal,
    ) -> resilient_fetch::Result<TransportResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        tokio::select! {
            _ = signal.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(self.delay) => {}
        }

        let status = {
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.len() > 1 {
                statuses.pop().unwrap()
            } else {
                statuses[0]
            }
        };
        Ok(TransportResponse::new(
            http::StatusCode::from_u16(status).unwrap(),
            http::HeaderMap::new(),
            r#"{"id":1}"#,
        ))
    }
}

fn fetcher(transport: &Arc<Delayed>) -> Fetcher {
    Fetcher::with_transport(transport.clone())
}

const URL: &str = "https://api.example.com/data";

#[tokio::test(start_paused = true)]
async fn test_timeout_wins_over_late_success() {
    init_tracing();
    let transport = Delayed::new(Duration::from_millis(500), &[200]);
    let (errors, errors_clone) = counter();
    let options = FetchOptions::builder()
        .timeout(Duration::from_millis(100))
        .on_error(move |_| {
            errors_clone.fetch_add(1, Ordering::SeqCst);
        })
        .build();

    let (pending, cancel) = fetcher(&transport)
        .fetch::<TestData>(URL, RequestMetadata::default(), options)
        .unwrap();

    let err = pending.await.unwrap_err();

    assert!(matches!(err, Error::Timeout));
    assert_eq!(transport.calls(), 1);
    // The timeout only stops this call's attempts, it does not cancel the
    // caller's handle, and on_error belongs to the retry loop.
    assert!(!cancel.is_cancelled());
    assert_eq!(errors.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_covers_all_attempts() {
    init_tracing();
    // Each attempt takes 40ms and fails, so three attempts outlast a 100ms budget.
    let transport = Delayed::new(Duration::from_millis(40), &[500]);
    let options = FetchOptions::builder()
        .timeout(Duration::from_millis(100))
        .retry_attempts(3)
        .build();

    let (pending, _cancel) = fetcher(&transport)
        .fetch::<TestData>(URL, RequestMetadata::default(), options)
        .unwrap();

    let err = pending.await.unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(transport.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_loop_settling_first_beats_timeout() {
    init_tracing();
    let transport = Delayed::new(Duration::from_millis(50), &[500, 200]);
    let options = FetchOptions::builder()
        .timeout(Duration::from_millis(150))
        .build();

    let (pending, _cancel) = fetcher(&transport)
        .fetch::<TestData>(URL, RequestMetadata::default(), options)
        .unwrap();

    let response = pending.await.unwrap();

    assert_eq!(response.data.id, 1);
    assert_eq!(response.attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn test_failure_settling_first_beats_timeout() {
    init_tracing();
    let transport = Delayed::new(Duration::from_millis(10), &[502]);
    let options = FetchOptions::builder()
        .timeout(Duration::from_secs(5))
        .retry_attempts(2)
        .build();

    let (pending, _cancel) = fetcher(&transport)
        .fetch::<TestData>(URL, RequestMetadata::default(), options)
        .unwrap();

    let err = pending.await.unwrap_err();

    assert_eq!(err.status(), 502);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_zero_attempts_settles_without_transport() {
    init_tracing();
    let transport = Delayed::new(Duration::from_millis(10), &[200]);
    let options = FetchOptions::builder().retry_attempts(0).build();

    let (pending, _cancel) = fetcher(&transport)
        .fetch::<TestData>(URL, RequestMetadata::default(), options)
        .unwrap();

    let err = pending.await.unwrap_err();

    assert!(matches!(err, Error::NoAttempts));
    assert_eq!(transport.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_does_not_settle_until_attempt_fails() {
    init_tracing();
    let transport = Delayed::new(Duration::from_secs(1), &[200]);
    let (pending, cancel) = fetcher(&transport)
        .fetch::<TestData>(URL, RequestMetadata::default(), FetchOptions::default())
        .unwrap();

    // Let the first attempt start before cancelling.
    tokio::time::sleep(Duration::from_millis(10)).await;
    cancel.cancel();
    cancel.cancel();

    let err = pending.await.unwrap_err();

    assert!(err.is_cancellation());
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_always_spends_attempts_after_cancel() {
    init_tracing();
    let transport = Delayed::new(Duration::from_secs(1), &[200]);
    let (errors, errors_clone) = counter();
    let options = FetchOptions::builder()
        .retry_predicate(RetryAlways)
        .on_error(move |_| {
            errors_clone.fetch_add(1, Ordering::SeqCst);
        })
        .build();

    let (pending, cancel) = fetcher(&transport)
        .fetch::<TestData>(URL, RequestMetadata::default(), options)
        .unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;
    cancel.cancel();

    let err = pending.await.unwrap_err();

    assert!(err.is_cancellation());
    // Later attempts see the cancelled signal and fail before reaching the transport.
    assert_eq!(transport.calls(), 1);
    assert_eq!(errors.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_callback_settles_as_task_failure() {
    init_tracing();
    let transport = Delayed::new(Duration::from_millis(10), &[500]);
    let options = FetchOptions::builder()
        .retry_attempts(1)
        .on_error(|_| panic!("error sink exploded"))
        .build();

    let (pending, _cancel) = fetcher(&transport)
        .fetch::<TestData>(URL, RequestMetadata::default(), options)
        .unwrap();

    let err = pending.await.unwrap_err();

    assert!(matches!(err, Error::TaskFailed(_)));
}

#[tokio::test(start_paused = true)]
async fn test_dropping_pending_call_stops_attempts() {
    init_tracing();
    let transport = Delayed::new(Duration::from_millis(100), &[500]);
    let options = FetchOptions::builder()
        .timeout(Duration::from_secs(10))
        .retry_attempts(5)
        .build();

    let (pending, _cancel) = fetcher(&transport)
        .fetch::<TestData>(URL, RequestMetadata::default(), options)
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    drop(pending);
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(transport.calls(), 2);
}
