//! Validation integration tests.
//!
//! Runs the production validator against a real shell, a local HTTP
//! responder and a SQLite database.

#[allow(dead_code)]
mod common;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use chaosdr::config::ValidationSettings;
use chaosdr::process::TokioCommandRunner;
use chaosdr::shutdown::{CancellationSignal, CancellationSource};
use chaosdr::validation::{
    CheckValidator, DatabaseQuery, ValidationConfig, Validator,
};
use chaosdr::DrError;
use common::*;
use sqlx::AnyConnection;
use sqlx::Connection;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn settings() -> ValidationSettings {
    ValidationSettings {
        shell: "sh".to_string(),
        script_timeout: Duration::from_secs(10),
        http_timeout: Duration::from_secs(5),
        query_timeout: Duration::from_secs(10),
    }
}

/// Answer every request with `status_line` until the test ends.
async fn http_responder(status_line: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                    status_line
                );
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    });
    format!("http://{}/health", addr)
}

async fn seeded_database(dir: &TempDir, rows: usize) -> String {
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("restored.db").display());
    sqlx::any::install_default_drivers();
    let mut conn = AnyConnection::connect(&url).await.unwrap();
    sqlx::query("CREATE TABLE orders (id INTEGER PRIMARY KEY, total INTEGER)")
        .execute(&mut conn)
        .await
        .unwrap();
    for i in 0..rows {
        sqlx::query(&format!("INSERT INTO orders (total) VALUES ({})", i * 10))
            .execute(&mut conn)
            .await
            .unwrap();
    }
    conn.close().await.unwrap();
    url
}

fn script_file(dir: &TempDir, body: &str) -> String {
    let path = dir.path().join("check.sh");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "{}", body).unwrap();
    format!("sh {}", path.display())
}

#[tokio::test]
async fn test_all_checks_pass() {
    let dir = TempDir::new().unwrap();
    let config = ValidationConfig {
        script: Some(script_file(&dir, "[ 2 -gt 1 ] || exit 1")),
        api_endpoint: Some(http_responder("200 OK").await),
        expected_status_code: 200,
        database_query: Some(DatabaseQuery {
            connection_string: seeded_database(&dir, 3).await,
            query: "SELECT id FROM orders".to_string(),
            expected_rows: 3,
        }),
    };

    let validator = CheckValidator::from_settings(&settings()).unwrap();
    let report = validator
        .validate(&config, &CancellationSignal::never())
        .await
        .unwrap();
    assert_eq!(check_names(&report.passed), vec!["script", "http", "query"]);
}

#[tokio::test]
async fn test_empty_config_passes_without_checks() {
    let validator = CheckValidator::from_settings(&settings()).unwrap();
    let report = validator
        .validate(&ValidationConfig::default(), &CancellationSignal::never())
        .await
        .unwrap();
    assert!(report.passed.is_empty());
}

#[tokio::test]
async fn test_unexpected_status_code() {
    let config = ValidationConfig {
        api_endpoint: Some(http_responder("503 Service Unavailable").await),
        ..Default::default()
    };

    let err = CheckValidator::from_settings(&settings())
        .unwrap()
        .validate(&config, &CancellationSignal::never())
        .await
        .unwrap_err();
    assert!(matches!(err, DrError::UnexpectedStatusCode { got: 503, want: 200 }));
    assert_eq!(err.failed_check(), Some("http"));
}

#[tokio::test]
async fn test_custom_expected_status_code() {
    let config = ValidationConfig {
        api_endpoint: Some(http_responder("204 No Content").await),
        expected_status_code: 204,
        ..Default::default()
    };

    let report = CheckValidator::from_settings(&settings())
        .unwrap()
        .validate(&config, &CancellationSignal::never())
        .await
        .unwrap();
    assert_eq!(check_names(&report.passed), vec!["http"]);
}

#[tokio::test]
async fn test_row_count_mismatch() {
    let dir = TempDir::new().unwrap();
    let config = ValidationConfig {
        database_query: Some(DatabaseQuery {
            connection_string: seeded_database(&dir, 2).await,
            query: "SELECT id FROM orders".to_string(),
            expected_rows: 5,
        }),
        ..Default::default()
    };

    let err = CheckValidator::from_settings(&settings())
        .unwrap()
        .validate(&config, &CancellationSignal::never())
        .await
        .unwrap_err();
    assert!(matches!(err, DrError::UnexpectedRowCount { got: 2, want: 5 }));
}

#[tokio::test]
async fn test_failing_script_stops_later_checks() {
    let prober = Arc::new(StubProber::new(200));
    let queries = Arc::new(StubQuery::new(1));
    let validator = CheckValidator::new(
        settings(),
        Arc::new(TokioCommandRunner),
        prober.clone(),
        queries.clone(),
    );

    let config = ValidationConfig {
        script: Some("echo replica lag too high; exit 3".to_string()),
        api_endpoint: Some("http://app.sandbox:8080/health".to_string()),
        expected_status_code: 200,
        database_query: Some(DatabaseQuery {
            connection_string: "sqlite://unused.db".to_string(),
            query: "SELECT 1".to_string(),
            expected_rows: 1,
        }),
    };

    let err = validator
        .validate(&config, &CancellationSignal::never())
        .await
        .unwrap_err();
    match err {
        DrError::ScriptFailed { exit_code, output } => {
            assert_eq!(exit_code, Some(3));
            assert!(output.contains("replica lag too high"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(prober.call_count(), 0);
    assert_eq!(queries.call_count(), 0);
}

#[tokio::test]
async fn test_slow_script_times_out() {
    let mut settings = settings();
    settings.script_timeout = Duration::from_millis(100);
    let config = ValidationConfig {
        script: Some("sleep 5".to_string()),
        ..Default::default()
    };

    let err = CheckValidator::from_settings(&settings)
        .unwrap()
        .validate(&config, &CancellationSignal::never())
        .await
        .unwrap_err();
    assert!(matches!(err, DrError::Timeout { ref operation, .. } if operation == "validation script"));
}

#[tokio::test]
async fn test_cancellation_interrupts_script() {
    let (source, signal) = CancellationSource::new();
    let config = ValidationConfig {
        script: Some("sleep 5".to_string()),
        ..Default::default()
    };

    let validator = CheckValidator::from_settings(&settings()).unwrap();
    let run = validator.validate(&config, &signal);
    let cancel = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        source.cancel("operator shutting down");
    };

    let (result, ()) = tokio::join!(run, cancel);
    assert!(matches!(result, Err(DrError::Cancelled(ref r)) if r == "operator shutting down"));
}
