use athena_link::api::scripted::ScriptedService;
use athena_link::api::{ColumnInfo, ExecutionState, QueryExecution, ResultPage};
use athena_link::{Connector, DriverConfig, DriverError, SqlArg};
use chrono::{TimeZone, Utc};
use std::sync::Arc;

const QID: &str = "3f0c6a1e-8d2b-4c55-b7a9-6e1f0d2c4b88";

fn script_success(service: &ScriptedService, query: &str) {
    service
        .on_submit(query, QID)
        .with_statuses(QID, [QueryExecution::new(QID, ExecutionState::Succeeded)])
        .with_page(
            QID,
            None,
            ResultPage::new(vec![ColumnInfo::new("id", "integer")], vec![]).with_update_count(1),
        );
}

#[tokio::test(start_paused = true)]
async fn test_query_binds_arguments_natively() {
    let service = Arc::new(ScriptedService::new());
    let query = "SELECT * FROM events WHERE id = ? AND kind = ? AND at > ?";
    script_success(&service, query);
    let connector = Connector::new(service.clone(), DriverConfig::default());

    let at = Utc.with_ymd_and_hms(2024, 7, 1, 12, 30, 45).unwrap();
    let mut conn = connector.connect();
    conn.query(
        query,
        &[SqlArg::Int(42), SqlArg::from("click"), SqlArg::from(at)],
    )
    .await
    .unwrap();

    let submitted = &service.submissions()[0];
    assert_eq!(submitted.query, query);
    assert_eq!(
        submitted.execution_parameters,
        vec!["42", "click", "'2024-07-01 12:30:45'"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_execute_submits_literal_text() {
    let service = Arc::new(ScriptedService::new());
    script_success(&service, "INSERT INTO t VALUES (7, 'O\\'Brien', 1, NULL, _binary'a\\nb')");
    let connector = Connector::new(service.clone(), DriverConfig::default());

    let mut conn = connector.connect();
    let result = conn
        .execute(
            "INSERT INTO t VALUES (?, ?, ?, ?, ?)",
            &[
                SqlArg::Int(7),
                SqlArg::from("O'Brien"),
                SqlArg::Bool(true),
                SqlArg::Null,
                SqlArg::from(b"a\nb".as_slice()),
            ],
        )
        .await
        .unwrap();
    assert_eq!(result.rows_affected(), 1);

    let submitted = &service.submissions()[0];
    assert!(!submitted.query.contains('?'));
    assert!(submitted.execution_parameters.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_prepared_statement_reuses_text() {
    let service = Arc::new(ScriptedService::new());
    let query = "SELECT * FROM t WHERE id = ?";
    script_success(&service, query);
    let connector = Connector::new(service.clone(), DriverConfig::default());

    let mut conn = connector.connect();
    let mut stmt = conn.prepare(query).unwrap();
    assert_eq!(stmt.num_input(), 1);
    stmt.query(&[SqlArg::Int(1)]).await.unwrap();
    stmt.query(&[SqlArg::Int(2)]).await.unwrap();

    let err = stmt.query(&[]).await.unwrap_err();
    assert!(matches!(err, DriverError::InvalidQuery(_)));

    stmt.close();
    let err = stmt.query(&[SqlArg::Int(3)]).await.unwrap_err();
    assert!(matches!(err, DriverError::StatementClosed));

    let params: Vec<Vec<String>> = service
        .submissions()
        .into_iter()
        .map(|s| s.execution_parameters)
        .collect();
    assert_eq!(params, vec![vec!["1".to_string()], vec!["2".to_string()]]);
}

#[tokio::test]
async fn test_argument_errors_never_reach_the_service() {
    let service = Arc::new(ScriptedService::new());
    let mut config = DriverConfig::default();
    config.max_query_length = 16;
    let connector = Connector::new(service.clone(), config);
    let mut conn = connector.connect();

    let err = conn
        .query("SELECT ?", &[SqlArg::Int(1), SqlArg::Int(2)])
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::InvalidQuery(_)));

    let err = conn
        .query("SELECT ?", &[SqlArg::Unsupported("struct".to_string())])
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::UnsupportedArgumentType(ref name) if name == "struct"));

    let err = conn
        .execute("SELECT ?", &[SqlArg::from("x".repeat(200))])
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::QueryBufferOverflow { limit: 160 }));

    assert!(service.calls().is_empty());
}
