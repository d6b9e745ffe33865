//! ClickHouse HTTP interface tests against a mock server

use chrono::NaiveDate;
use ftdp_ingest::{
    clickhouse::{config::ClickHouseConfig, sql::RemoteLoad, ClickHouseClient, ClickHouseFactory},
    error::IngestError,
    registry::FileFormat,
    warehouse::{Warehouse, WarehouseFactory},
};
use wiremock::{
    matchers::{body_string, body_string_contains, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn config_for(server: &MockServer) -> ClickHouseConfig {
    ClickHouseConfig {
        host: server.address().ip().to_string(),
        port: server.address().port(),
        database: "analytics".to_string(),
        ..ClickHouseConfig::default()
    }
}

async fn mount_ping(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Ok.\n"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_connect_pings_server() {
    let server = MockServer::start().await;
    mount_ping(&server).await;

    let client = ClickHouseClient::connect(&config_for(&server)).await.unwrap();
    assert_eq!(client.endpoint(), server.uri());
}

#[tokio::test]
async fn test_connect_fails_without_ping() {
    let server = MockServer::start().await;

    let err = ClickHouseFactory::new(config_for(&server))
        .connect()
        .await
        .err()
        .unwrap();
    assert!(matches!(err, IngestError::UnexpectedResponse(_)));
}

#[tokio::test]
async fn test_unreachable_server_is_connection_error() {
    let config = ClickHouseConfig {
        host: "127.0.0.1".to_string(),
        port: 1,
        connect_timeout_secs: 1,
        ..ClickHouseConfig::default()
    };

    let err = ClickHouseClient::connect(&config).await.err().unwrap();
    assert!(matches!(err, IngestError::Connection { .. }));
}

#[tokio::test]
async fn test_statement_is_posted_with_credentials() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/"))
        .and(query_param("database", "analytics"))
        .and(header("X-ClickHouse-User", "dbt_user"))
        .and(header("X-ClickHouse-Key", "dbt_password"))
        .and(body_string("TRUNCATE TABLE raw_country"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = ClickHouseClient::new(&config_for(&server)).unwrap();
    client.truncate("raw_country").await.unwrap();
}

#[tokio::test]
async fn test_session_settings_travel_as_query_params() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/"))
        .and(query_param("max_insert_threads", "4"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let config = ClickHouseConfig {
        settings: vec![("max_insert_threads".to_string(), "4".to_string())],
        ..config_for(&server)
    };
    let client = ClickHouseClient::new(&config).unwrap();
    client.execute_ddl("CREATE TABLE IF NOT EXISTS t (a UInt8) ENGINE = Memory").await.unwrap();
}

#[tokio::test]
async fn test_count_is_parsed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_string(
            "SELECT count() FROM raw_country WHERE toDate(_ingestion_timestamp, 'UTC') = '2024-06-01'",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_string("5\n"))
        .mount(&server)
        .await;

    let client = ClickHouseClient::new(&config_for(&server)).unwrap();
    let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
    assert_eq!(client.count_ingested_on("raw_country", date).await.unwrap(), 5);
}

#[tokio::test]
async fn test_non_numeric_count_is_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("five"))
        .mount(&server)
        .await;

    let client = ClickHouseClient::new(&config_for(&server)).unwrap();
    let err = client.query_u64("SELECT 5").await.unwrap_err();
    assert!(matches!(err, IngestError::UnexpectedResponse(_)));
}

#[tokio::test]
async fn test_server_exception_becomes_query_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404).set_body_string(
            "Code: 60. DB::Exception: Table analytics.raw_nope does not exist. (UNKNOWN_TABLE)\n",
        ))
        .mount(&server)
        .await;

    let client = ClickHouseClient::new(&config_for(&server)).unwrap();
    match client.truncate("raw_nope").await.unwrap_err() {
        IngestError::Query { status, message } => {
            assert_eq!(status, 404);
            assert!(message.contains("UNKNOWN_TABLE"));
        },
        other => panic!("expected Query error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_remote_load_sends_s3_table_function() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_string_contains("INSERT INTO raw_country (country_id, country)"))
        .and(body_string_contains("FROM s3("))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = ClickHouseClient::new(&config_for(&server)).unwrap();
    let load = RemoteLoad {
        table_name: "raw_country".to_string(),
        url: "s3://food-truck/country/*".to_string(),
        format: FileFormat::Csv,
        columns: "country_id, country".to_string(),
        structure: "country_id UInt64, country String".to_string(),
        credentials: None,
    };
    client.load_remote(&load).await.unwrap();
}
