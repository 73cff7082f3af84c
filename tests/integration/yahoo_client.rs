//! Yahoo API client against a local mock server

use serde_json::json;
use tokio_test::assert_err;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::logging::{init_test_logging, log_test_step};
use stock_workbooks::api::{QuoteSummaryProvider, YahooClient};
use stock_workbooks::models::Config;

async fn client_for(server: &MockServer) -> YahooClient {
    let mut config = Config::default();
    config.rate_limit_per_minute = 60_000;
    config.yahoo.cookie_url = format!("{}/cookie", server.uri());
    config.yahoo.crumb_url = format!("{}/v1/test/getcrumb", server.uri());
    config.yahoo.api_base = server.uri();
    YahooClient::new(&config).unwrap()
}

async fn mount_session(server: &MockServer, crumb: &str, expected_crumbs: u64) {
    Mock::given(method("GET"))
        .and(path("/cookie"))
        .respond_with(ResponseTemplate::new(404).insert_header("set-cookie", "A3=session; Path=/"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/test/getcrumb"))
        .respond_with(ResponseTemplate::new(200).set_body_string(crumb))
        .expect(expected_crumbs)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_crumb_negotiated_once_and_reused() {
    init_test_logging();
    log_test_step("Fetching two tickers over one session");
    let server = MockServer::start().await;
    mount_session(&server, "Xy.z0", 1).await;

    for ticker in ["AAPL", "MSFT"] {
        Mock::given(method("GET"))
            .and(path(format!("/v10/finance/quoteSummary/{}", ticker)))
            .and(query_param("crumb", "Xy.z0"))
            .and(query_param("modules", "financialData"))
            .and(query_param("formatted", "false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "quoteSummary": {
                    "result": [{"financialData": {"currentPrice": {"raw": 100.0}}}],
                    "error": null
                }
            })))
            .expect(1)
            .mount(&server)
            .await;
    }

    let client = client_for(&server).await;
    for ticker in ["AAPL", "MSFT"] {
        let result = client.fetch_modules(ticker, &["financialData"]).await.unwrap().unwrap();
        assert_eq!(result["financialData"]["currentPrice"]["raw"], json!(100.0));
    }
}

#[tokio::test]
async fn test_not_found_is_absent_data() {
    let server = MockServer::start().await;
    mount_session(&server, "c", 1).await;
    Mock::given(method("GET"))
        .and(path("/v10/finance/quoteSummary/ZZZZ"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "quoteSummary": {
                "result": null,
                "error": {"code": "Not Found", "description": "Quote not found for symbol: ZZZZ"}
            }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let result = client.fetch_modules("ZZZZ", &["financialData"]).await.unwrap();
    assert_eq!(result, None);
}

#[tokio::test]
async fn test_empty_result_is_absent_data() {
    let server = MockServer::start().await;
    mount_session(&server, "c", 1).await;
    Mock::given(method("GET"))
        .and(path("/v10/finance/quoteSummary/EMPTY"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "quoteSummary": {"result": [], "error": null}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    assert_eq!(client.fetch_modules("EMPTY", &["price"]).await.unwrap(), None);
}

#[tokio::test]
async fn test_unauthorized_drops_crumb_for_next_attempt() {
    let server = MockServer::start().await;
    mount_session(&server, "c", 2).await;
    Mock::given(method("GET"))
        .and(path("/v10/finance/quoteSummary/AAPL"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Invalid Crumb"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v10/finance/quoteSummary/AAPL"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "quoteSummary": {"result": [{"price": {"currency": "USD"}}], "error": null}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let first = client.fetch_modules("AAPL", &["price"]).await;
    assert_err!(first);

    let second = client.fetch_modules("AAPL", &["price"]).await.unwrap().unwrap();
    assert_eq!(second["price"]["currency"], json!("USD"));
}

#[tokio::test]
async fn test_server_error_is_retryable_failure() {
    let server = MockServer::start().await;
    mount_session(&server, "c", 1).await;
    Mock::given(method("GET"))
        .and(path("/v10/finance/quoteSummary/AAPL"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client.fetch_modules("AAPL", &["price"]).await.unwrap_err();
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn test_chart_shares_the_session_crumb() {
    init_test_logging();
    log_test_step("quoteSummary then daily chart for AAPL");
    let server = MockServer::start().await;
    mount_session(&server, "Xy.z0", 1).await;
    Mock::given(method("GET"))
        .and(path("/v10/finance/quoteSummary/AAPL"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "quoteSummary": {"result": [{"price": {"currency": "USD"}}], "error": null}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/AAPL"))
        .and(query_param("crumb", "Xy.z0"))
        .and(query_param("interval", "1d"))
        .and(query_param("range", "max"))
        .and(query_param("events", "div"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "chart": {
                "result": [{
                    "meta": {"symbol": "AAPL", "gmtoffset": -14400},
                    "timestamp": [1_715_347_800],
                    "events": {"dividends": {"1715347800": {"amount": 0.25, "date": 1_715_347_800}}},
                    "indicators": {"quote": [{"close": [183.05]}], "adjclose": [{"adjclose": [182.8]}]}
                }],
                "error": null
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    client.fetch_modules("AAPL", &["price"]).await.unwrap();
    let chart = client.fetch_chart("AAPL", "1d").await.unwrap().unwrap();

    assert_eq!(chart["meta"]["symbol"], json!("AAPL"));
    assert_eq!(chart["events"]["dividends"]["1715347800"]["amount"], json!(0.25));
}

#[tokio::test]
async fn test_chart_not_found_is_absent_data() {
    let server = MockServer::start().await;
    mount_session(&server, "c", 1).await;
    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/ZZZZ"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "chart": {"result": null, "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/DLST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "chart": {"result": null, "error": {"code": "Not Found", "description": "delisted"}}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    assert_eq!(client.fetch_chart("ZZZZ", "1wk").await.unwrap(), None);
    assert_eq!(client.fetch_chart("DLST", "1mo").await.unwrap(), None);
}

#[tokio::test]
async fn test_chart_rejected_session_drops_crumb() {
    let server = MockServer::start().await;
    mount_session(&server, "c", 2).await;
    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/AAPL"))
        .respond_with(ResponseTemplate::new(403))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v8/finance/chart/AAPL"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "chart": {"result": [{"timestamp": []}], "error": null}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    assert_err!(client.fetch_chart("AAPL", "1mo").await);
    assert!(client.fetch_chart("AAPL", "1mo").await.unwrap().is_some());
}
