mod common;

use core::time::Duration;

use common::{CSRF, VERIFICATION, fast_retry, index_page, simple_transcript, year};
use rhv::{
    Error,
    fetch::{CrawlOutcome, Fetcher},
    roll::RollNumber,
    scrape::{HttpConnector, Session, basic},
    years,
};
use tokio_util::sync::CancellationToken;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, method, path},
};

async fn mount_index(server: &MockServer, scheme: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/{scheme}/studentresult/index.asp")))
        .respond_with(ResponseTemplate::new(200).set_body_string(index_page()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn submits_roll_number_with_both_tokens() {
    let server = MockServer::start().await;
    mount_index(&server, "scheme21").await;
    Mock::given(method("POST"))
        .and(path("/scheme21/studentresult/result.asp"))
        .and(body_string_contains("RollNumber=21BEC030"))
        .and(body_string_contains(format!("CSRFToken={CSRF}")))
        .and(body_string_contains(format!(
            "RequestVerificationToken={VERIFICATION}"
        )))
        .and(body_string_contains("B1=Submit"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(simple_transcript("21BEC030", "A B")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let session = Session::open(basic(Duration::from_secs(5)).unwrap(), &server.uri(), &year("21"));
    let retry = fast_retry();
    let cancel = CancellationToken::new();
    let fetcher = Fetcher {
        session: &session,
        retry: &retry,
        lookahead: 3,
        cancel: &cancel,
    };

    let outcome = fetcher
        .lookup(&RollNumber::parse("21BEC030").unwrap())
        .await
        .unwrap();

    let CrawlOutcome::Record(record) = outcome else {
        panic!("expected a record, got {outcome:?}");
    };
    assert_eq!(record.student_info.roll_number, "21BEC030");
    assert_eq!(record.student_info.student_name, "A B");
}

#[tokio::test]
async fn missing_token_is_retried_with_a_fresh_index_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/scheme21/studentresult/index.asp"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(index_page().replace("CSRFToken", "Other")),
        )
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_index(&server, "scheme21").await;
    Mock::given(method("POST"))
        .and(path("/scheme21/studentresult/result.asp"))
        .and(body_string_contains(format!("CSRFToken={CSRF}")))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(simple_transcript("21BEC030", "A B")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let session = Session::open(basic(Duration::from_secs(5)).unwrap(), &server.uri(), &year("21"));
    let retry = fast_retry();
    let cancel = CancellationToken::new();
    let fetcher = Fetcher {
        session: &session,
        retry: &retry,
        lookahead: 3,
        cancel: &cancel,
    };

    let outcome = fetcher
        .lookup(&RollNumber::parse("21BEC030").unwrap())
        .await
        .unwrap();

    assert!(matches!(outcome, CrawlOutcome::Record(_)), "{outcome:?}");
    let requests = server.received_requests().await.unwrap();
    let count = |m: &str| requests.iter().filter(|r| r.method.as_str() == m).count();
    assert_eq!(count("GET"), 2);
    assert_eq!(count("POST"), 1);
}

#[tokio::test]
async fn error_status_bodies_are_still_read() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/scheme21/studentresult/index.asp"))
        .respond_with(
            ResponseTemplate::new(500).set_body_string("<h1>Server Error in '/' Application.</h1>"),
        )
        .mount(&server)
        .await;

    let session = Session::open(basic(Duration::from_secs(5)).unwrap(), &server.uri(), &year("21"));

    let body = session.index().await.unwrap();
    assert!(body.contains("Server Error"));
    assert!(matches!(
        session.fetch_tokens().await,
        Err(Error::TokenNotFound(_))
    ));
}

#[tokio::test]
async fn slow_portal_times_out_as_a_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(index_page())
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let session = Session::open(
        basic(Duration::from_millis(200)).unwrap(),
        &server.uri(),
        &year("21"),
    );

    let err = session.index().await.unwrap_err();
    assert!(err.is_network(), "{err}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn discovers_years_over_http() {
    let server = MockServer::start().await;
    mount_index(&server, "scheme20").await;
    mount_index(&server, "scheme21").await;
    Mock::given(method("GET"))
        .and(path("/scheme22/studentresult/index.asp"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Server Error"))
        .mount(&server)
        .await;

    let connector = HttpConnector {
        timeout: Duration::from_secs(5),
    };
    let found = years::discover(
        &connector,
        &server.uri(),
        20,
        &fast_retry(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(found, [year("21"), year("20")]);
}
