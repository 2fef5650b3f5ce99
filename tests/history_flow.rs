//! Integration tests for the paginated extraction pipeline: multi-page
//! traversal, partial records, empty-vs-drifted pages, transparent
//! re-authentication, and cursor-carrying terminal errors.

use std::sync::Arc;

use chrono::NaiveDate;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use amazon_orders::{
    Completeness, FetchError, HistoryFilters, OrderStream, PageFailure, TransactionStream,
};

mod support;
use support::{
    NoSolver, ORDERS_EMPTY_PAGE, ORDERS_PARTIAL_PAGE, SIGN_IN_PAGE, TRANSACTIONS_PAGE, fetcher,
    config_for, html, mount_plain_sign_in, order_card, orders_page,
};

fn ten_card_page_one() -> String {
    let cards: Vec<String> = (1..=10)
        .map(|i| {
            order_card(
                &format!("114-0000000-{i:07}"),
                "July 5, 2025",
                &format!("${i}.99"),
            )
        })
        .collect();
    orders_page(&cards, Some("/your-orders/orders?startIndex=10"))
}

fn three_card_page_two() -> String {
    let cards: Vec<String> = (11..=13)
        .map(|i| order_card(&format!("114-0000000-{i:07}"), "July 1, 2025", "$5.00"))
        .collect();
    orders_page(&cards, None)
}

// ---- Ordering and termination ----

#[tokio::test]
async fn test_two_pages_yield_thirteen_records_without_a_third_fetch() {
    let server = MockServer::start().await;
    mount_plain_sign_in(&server).await;
    Mock::given(method("GET"))
        .and(path("/your-orders/orders"))
        .and(query_param("startIndex", "0"))
        .respond_with(html(&ten_card_page_one()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/your-orders/orders"))
        .and(query_param("startIndex", "10"))
        .respond_with(html(&three_card_page_two()))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let fetcher = fetcher(&config, Arc::new(NoSolver));
    let mut stream = OrderStream::new(&fetcher, HistoryFilters::default());

    let mut ids = Vec::new();
    while let Some(order) = stream.next().await {
        ids.push(order.unwrap().order_id.unwrap());
    }
    assert_eq!(ids.len(), 13, "10 + 3 records across both pages");
    assert!(ids[0].ends_with("0000001"), "document order preserved: {ids:?}");
    assert!(ids[12].ends_with("0000013"));
    // Mock expectations verify no third history fetch happened.
}

#[tokio::test]
async fn test_max_pages_stops_before_second_fetch() {
    let server = MockServer::start().await;
    mount_plain_sign_in(&server).await;
    Mock::given(method("GET"))
        .and(path("/your-orders/orders"))
        .and(query_param("startIndex", "0"))
        .respond_with(html(&ten_card_page_one()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/your-orders/orders"))
        .and(query_param("startIndex", "10"))
        .respond_with(html(&three_card_page_two()))
        .expect(0)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let fetcher = fetcher(&config, Arc::new(NoSolver));
    let filters = HistoryFilters {
        max_pages: Some(1),
        ..HistoryFilters::default()
    };
    let mut stream = OrderStream::new(&fetcher, filters);
    let records = stream.collect_remaining().await.unwrap();
    assert_eq!(records.len(), 10);
}

#[tokio::test]
async fn test_date_bound_stops_stream_mid_page() {
    let server = MockServer::start().await;
    mount_plain_sign_in(&server).await;
    // Newest-first page: two recent orders, then an older one.
    let cards = vec![
        order_card("114-0000000-0000001", "July 5, 2025", "$1.00"),
        order_card("114-0000000-0000002", "July 4, 2025", "$2.00"),
        order_card("114-0000000-0000003", "June 1, 2025", "$3.00"),
    ];
    Mock::given(method("GET"))
        .and(path("/your-orders/orders"))
        .respond_with(html(&orders_page(
            &cards,
            Some("/your-orders/orders?startIndex=10"),
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/your-orders/orders"))
        .and(query_param("startIndex", "10"))
        .respond_with(html(&three_card_page_two()))
        .expect(0)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let fetcher = fetcher(&config, Arc::new(NoSolver));
    let filters = HistoryFilters {
        placed_after: Some(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()),
        ..HistoryFilters::default()
    };
    let mut stream = OrderStream::new(&fetcher, filters);
    let records = stream.collect_remaining().await.unwrap();
    assert_eq!(records.len(), 2, "stream stops at the first too-old record");
}

// ---- Partial records ----

#[tokio::test]
async fn test_one_malformed_price_yields_four_complete_one_partial() {
    let server = MockServer::start().await;
    mount_plain_sign_in(&server).await;
    Mock::given(method("GET"))
        .and(path("/your-orders/orders"))
        .respond_with(html(ORDERS_PARTIAL_PAGE))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let fetcher = fetcher(&config, Arc::new(NoSolver));
    let mut stream = OrderStream::new(&fetcher, HistoryFilters::default());
    let records = stream.collect_remaining().await.unwrap();

    assert_eq!(records.len(), 5, "the malformed record is kept, not dropped");
    let complete = records
        .iter()
        .filter(|order| order.completeness.is_complete())
        .count();
    assert_eq!(complete, 4);
    let partial = records
        .iter()
        .find(|order| !order.completeness.is_complete())
        .unwrap();
    assert_eq!(partial.order_id.as_deref(), Some("301-0000003-0000003"));
    assert_eq!(
        partial.completeness,
        Completeness::Partial {
            missing: vec!["item_price"]
        }
    );
}

// ---- Empty page vs markup drift ----

#[tokio::test]
async fn test_empty_history_terminates_cleanly() {
    let server = MockServer::start().await;
    mount_plain_sign_in(&server).await;
    Mock::given(method("GET"))
        .and(path("/your-orders/orders"))
        .respond_with(html(ORDERS_EMPTY_PAGE))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let fetcher = fetcher(&config, Arc::new(NoSolver));
    let mut stream = OrderStream::new(&fetcher, HistoryFilters::default());
    let records = stream.collect_remaining().await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_markup_drift_surfaces_structural_error() {
    let server = MockServer::start().await;
    mount_plain_sign_in(&server).await;
    Mock::given(method("GET"))
        .and(path("/your-orders/orders"))
        .respond_with(html("<html><body><div>redesigned page</div></body></html>"))
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.fetch_attempts = 1;
    let fetcher = fetcher(&config, Arc::new(NoSolver));
    let mut stream = OrderStream::new(&fetcher, HistoryFilters::default());

    let error = stream.next().await.unwrap().unwrap_err();
    assert!(
        matches!(error.source, PageFailure::Extract(_)),
        "expected structural extraction failure, got {error:?}"
    );
    assert!(error.last_cursor.is_none(), "failed on the very first page");
    assert!(stream.next().await.is_none(), "stream stays finished after error");
}

// ---- Session expiry mid-pipeline ----

#[tokio::test]
async fn test_sign_in_bounce_recovers_transparently() {
    let server = MockServer::start().await;
    mount_plain_sign_in(&server).await;
    // First history fetch is served the sign-in form (expired session);
    // after re-authentication the data page comes back.
    Mock::given(method("GET"))
        .and(path("/your-orders/orders"))
        .respond_with(html(SIGN_IN_PAGE))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/your-orders/orders"))
        .respond_with(html(&orders_page(
            &[order_card("114-0000000-0000001", "July 5, 2025", "$1.00")],
            None,
        )))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let fetcher = fetcher(&config, Arc::new(NoSolver));
    let mut stream = OrderStream::new(&fetcher, HistoryFilters::default());
    let records = stream.collect_remaining().await.unwrap();
    assert_eq!(records.len(), 1, "recovery is invisible to the caller");
}

#[tokio::test]
async fn test_persistent_sign_in_bounce_is_session_unrecoverable() {
    let server = MockServer::start().await;
    mount_plain_sign_in(&server).await;
    Mock::given(method("GET"))
        .and(path("/your-orders/orders"))
        .respond_with(html(SIGN_IN_PAGE))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let fetcher = fetcher(&config, Arc::new(NoSolver));
    let mut stream = OrderStream::new(&fetcher, HistoryFilters::default());

    let error = stream.next().await.unwrap().unwrap_err();
    assert!(
        matches!(
            error.source,
            PageFailure::Fetch(FetchError::SessionUnrecoverable { .. })
        ),
        "expected SessionUnrecoverable, got {error:?}"
    );
}

// ---- Resumability ----

#[tokio::test]
async fn test_terminal_error_carries_last_completed_cursor_for_resume() {
    let server = MockServer::start().await;
    mount_plain_sign_in(&server).await;
    Mock::given(method("GET"))
        .and(path("/your-orders/orders"))
        .and(query_param("startIndex", "0"))
        .respond_with(html(&ten_card_page_one()))
        .mount(&server)
        .await;
    // Page two fails once, then recovers for the resumed stream.
    Mock::given(method("GET"))
        .and(path("/your-orders/orders"))
        .and(query_param("startIndex", "10"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/your-orders/orders"))
        .and(query_param("startIndex", "10"))
        .respond_with(html(&three_card_page_two()))
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.fetch_attempts = 1;
    let fetcher = fetcher(&config, Arc::new(NoSolver));

    let mut stream = OrderStream::new(&fetcher, HistoryFilters::default());
    let mut yielded = 0;
    let error = loop {
        match stream.next().await.unwrap() {
            Ok(_) => yielded += 1,
            Err(error) => break error,
        }
    };
    assert_eq!(yielded, 10, "page one drained before the failure surfaced");
    assert_eq!(error.pages_completed, 1);
    let resume_cursor = error.last_cursor.clone().unwrap();

    // Resuming re-reads the last completed page and then advances past the
    // previously failing one.
    let mut resumed = OrderStream::resume_from(&fetcher, HistoryFilters::default(), resume_cursor);
    let records = resumed.collect_remaining().await.unwrap();
    assert_eq!(records.len(), 13, "resume re-fetches page one, then page two");
}

// ---- Transactions ----

#[tokio::test]
async fn test_transactions_stream_correlates_orders() {
    let server = MockServer::start().await;
    mount_plain_sign_in(&server).await;
    Mock::given(method("GET"))
        .and(path("/cpe/yourpayments/transactions"))
        .respond_with(html(TRANSACTIONS_PAGE))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let fetcher = fetcher(&config, Arc::new(NoSolver));
    let mut stream = TransactionStream::new(&fetcher, HistoryFilters::default());
    let records = stream.collect_remaining().await.unwrap();

    assert_eq!(records.len(), 3);
    assert_eq!(
        records[0].order_id.as_deref(),
        Some("114-0004321-5678901"),
        "postings correlate to orders by identifier"
    );
    assert_eq!(records[1].order_id, None, "gift card posting has no order");
    assert_eq!(
        records[2].completed_date,
        Some(NaiveDate::from_ymd_opt(2025, 7, 2).unwrap()),
        "date group headers apply to following postings"
    );
    assert!(records.iter().all(|t| t.completeness.is_complete()));
}
