// SPDX-License-Identifier: Apache-2.0

//! End-to-end behaviour of the gate against a spy backend.

mod common;

use std::time::Duration;

use common::{gateway_with, SpyBackend};
use gate_core::{EngineError, RiskTier, SafetyDomain, SafetyMode, TransactionMode, Value};
use sqlgate::migrations::MigrationQuery;
use sqlgate::{ConfirmedOutcome, Gateway};
use tokio_util::sync::CancellationToken;

fn unlock(gateway: &Gateway) {
    gateway.safety().set_mode(SafetyDomain::Database, SafetyMode::Unrestricted);
}

fn token_of(err: EngineError) -> String {
    match err {
        EngineError::ConfirmationRequired { token, .. } => token,
        other => panic!("expected a confirmation request, got {other:?}"),
    }
}

#[tokio::test]
async fn test_select_one_in_restricted_mode() {
    let spy = SpyBackend::direct();
    let gateway = gateway_with(spy.clone());

    let outcome = gateway.engine().execute("SELECT 1;", None).await.unwrap();

    assert_eq!(outcome.tier, RiskTier::Safe);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].rows[0].values, vec![Value::Int(1)]);
    assert!(!outcome.mode_reset);
    assert!(outcome.migration.is_none());
    assert_eq!(gateway.safety().mode(SafetyDomain::Database), SafetyMode::Restricted);
    assert_eq!(gateway.confirmations().pending_count(), 0);

    let plans = spy.plans();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].transaction, TransactionMode::ReadOnly);
    assert!(plans[0].statements[0].returns_rows);
}

#[tokio::test]
async fn test_safe_batches_never_need_unrestricted_mode_or_confirmation() {
    let spy = SpyBackend::direct();
    let gateway = gateway_with(spy.clone());

    for sql in [
        "SELECT * FROM users",
        "WITH recent AS (SELECT id FROM orders) SELECT count(*) FROM recent",
        "EXPLAIN SELECT 1",
        "SHOW search_path",
        "SELECT id FROM jobs FOR UPDATE SKIP LOCKED",
    ] {
        let outcome = gateway.engine().execute(sql, None).await.unwrap();
        assert_eq!(outcome.tier, RiskTier::Safe, "{sql}");
    }
    assert_eq!(gateway.confirmations().pending_count(), 0);
    assert_eq!(spy.round_trips(), 5);
}

#[tokio::test]
async fn test_restricted_mode_rejects_writes_without_contacting_backend() {
    let spy = SpyBackend::direct();
    let gateway = gateway_with(spy.clone());

    for (sql, required) in [
        ("INSERT INTO t VALUES (1)", RiskTier::Write),
        ("UPDATE t SET a = 1", RiskTier::Write),
        ("DROP TABLE t;", RiskTier::Destructive),
        ("GRANT SELECT ON t TO app", RiskTier::Destructive),
    ] {
        match gateway.engine().execute(sql, None).await.unwrap_err() {
            EngineError::ModeViolation {
                domain, required_tier, ..
            } => {
                assert_eq!(domain, SafetyDomain::Database);
                assert_eq!(required_tier, required, "{sql}");
            }
            other => panic!("unexpected error for {sql}: {other:?}"),
        }
    }

    assert_eq!(spy.round_trips(), 0);
    assert!(spy.recorded_migrations().is_empty());
}

#[tokio::test]
async fn test_blocked_operations_fail_in_every_mode() {
    let spy = SpyBackend::direct();
    let gateway = gateway_with(spy.clone());

    for mode in [SafetyMode::Restricted, SafetyMode::Unrestricted] {
        gateway.safety().set_mode(SafetyDomain::Database, mode);
        match gateway
            .engine()
            .execute("SELECT 1; DROP DATABASE production", None)
            .await
            .unwrap_err()
        {
            EngineError::OperationBlocked { statement_index, .. } => assert_eq!(statement_index, Some(1)),
            other => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(spy.round_trips(), 0);
    assert_eq!(gateway.confirmations().pending_count(), 0);
}

#[tokio::test]
async fn test_drop_table_confirm_flow_records_one_migration() {
    let spy = SpyBackend::direct();
    let gateway = gateway_with(spy.clone());
    unlock(&gateway);

    let token = token_of(gateway.engine().execute("DROP TABLE t;", None).await.unwrap_err());
    assert_eq!(spy.round_trips(), 0);
    assert_eq!(gateway.safety().mode(SafetyDomain::Database), SafetyMode::Unrestricted);

    let outcome = match gateway.confirm(&token).await.unwrap() {
        ConfirmedOutcome::Database(outcome) => outcome,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_eq!(outcome.tier, RiskTier::Destructive);
    assert!(outcome.mode_reset);
    assert_eq!(outcome.results[0].affected_rows, Some(1));
    assert_eq!(gateway.safety().mode(SafetyDomain::Database), SafetyMode::Restricted);

    let caller_plans = spy.caller_plans();
    assert_eq!(caller_plans.len(), 1);
    assert_eq!(caller_plans[0].transaction, TransactionMode::ReadWrite);

    let recorded = spy.recorded_migrations();
    assert_eq!(recorded.len(), 1);
    let (version, name, statements) = &recorded[0];
    assert_eq!(version.len(), 14);
    assert!(name.contains("drop") && name.ends_with("_t"), "{name}");
    let executed: Vec<String> = caller_plans[0].statements.iter().map(|s| s.sql.clone()).collect();
    assert_eq!(statements, &executed);

    let migration = outcome.migration.expect("migration recorded");
    assert_eq!(&migration.name, name);
    assert_eq!(migration.statement_count, 1);
}

#[tokio::test]
async fn test_every_destructive_batch_records_its_exact_statements() {
    let spy = SpyBackend::direct();
    let gateway = gateway_with(spy.clone());

    let batches = [
        "CREATE TABLE orders (id bigint primary key, note text DEFAULT 'a;b')",
        "ALTER TABLE orders ADD COLUMN total numeric; COMMENT ON TABLE orders IS 'sales; v2'",
        "INSERT INTO audit VALUES ($$x;y$$); DROP INDEX IF EXISTS idx_old",
    ];
    for sql in batches {
        unlock(&gateway);
        let token = token_of(gateway.engine().execute(sql, None).await.unwrap_err());
        gateway.confirm(&token).await.unwrap();
    }

    let caller_plans = spy.caller_plans();
    let recorded = spy.recorded_migrations();
    assert_eq!(recorded.len(), batches.len());
    for (plan, (_, _, statements)) in caller_plans.iter().zip(&recorded) {
        let executed: Vec<String> = plan.statements.iter().map(|s| s.sql.clone()).collect();
        assert_eq!(statements, &executed);
    }
    assert_eq!(recorded[1].2.len(), 2);

    let versions: Vec<&String> = recorded.iter().map(|(v, _, _)| v).collect();
    assert!(versions.windows(2).all(|w| w[0] < w[1]), "{versions:?}");
}

#[tokio::test]
async fn test_confirmation_tokens_are_single_use() {
    let spy = SpyBackend::direct();
    let gateway = gateway_with(spy.clone());
    unlock(&gateway);

    let token = token_of(gateway.engine().execute("TRUNCATE logs", None).await.unwrap_err());
    gateway.confirm(&token).await.unwrap();

    unlock(&gateway);
    let err = gateway.confirm(&token).await.unwrap_err();
    assert!(matches!(err, EngineError::ConfirmationNotFound { .. }));
    assert_eq!(spy.caller_plans().len(), 1);
}

#[tokio::test]
async fn test_expired_tokens_never_execute() {
    let spy = SpyBackend::direct();
    let gateway = Gateway::with_backend(spy.clone(), Duration::ZERO);
    unlock(&gateway);

    let token = token_of(gateway.engine().execute("DROP TABLE t", None).await.unwrap_err());
    let err = gateway.confirm(&token).await.unwrap_err();
    assert_eq!(err.kind(), "confirmation_not_found");
    assert_eq!(spy.round_trips(), 0);
}

#[tokio::test]
async fn test_confirmation_rechecks_mode() {
    let spy = SpyBackend::direct();
    let gateway = gateway_with(spy.clone());
    unlock(&gateway);

    let token = token_of(gateway.engine().execute("DROP TABLE t", None).await.unwrap_err());
    gateway.safety().set_mode(SafetyDomain::Database, SafetyMode::Restricted);

    let err = gateway.confirm(&token).await.unwrap_err();
    assert_eq!(err.kind(), "mode_violation");
    assert_eq!(spy.round_trips(), 0);
}

#[tokio::test]
async fn test_mode_resets_after_one_risky_batch() {
    let spy = SpyBackend::direct();
    let gateway = gateway_with(spy.clone());
    unlock(&gateway);

    let outcome = gateway
        .engine()
        .execute("INSERT INTO t VALUES (1)", None)
        .await
        .unwrap();
    assert!(outcome.mode_reset);
    assert_eq!(outcome.results[0].affected_rows, Some(1));
    assert!(outcome.migration.is_none());

    let err = gateway
        .engine()
        .execute("INSERT INTO t VALUES (2)", None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "mode_violation");
    assert_eq!(spy.round_trips(), 1);
}

#[tokio::test]
async fn test_several_writes_in_one_batch_need_one_unlock() {
    let spy = SpyBackend::direct();
    let gateway = gateway_with(spy.clone());
    unlock(&gateway);

    let outcome = gateway
        .engine()
        .execute("INSERT INTO t VALUES (1); UPDATE t SET a = 2; DELETE FROM t WHERE a = 3", None)
        .await
        .unwrap();
    assert_eq!(outcome.results.len(), 3);
    assert_eq!(outcome.transaction, TransactionMode::ReadWrite);
    assert_eq!(gateway.safety().mode(SafetyDomain::Database), SafetyMode::Restricted);
}

#[tokio::test]
async fn test_transaction_control_is_rejected_in_every_mode() {
    let spy = SpyBackend::direct();
    let gateway = gateway_with(spy.clone());

    for mode in [SafetyMode::Restricted, SafetyMode::Unrestricted] {
        gateway.safety().set_mode(SafetyDomain::Database, mode);
        match gateway
            .engine()
            .execute("BEGIN; SELECT 1; COMMIT;", None)
            .await
            .unwrap_err()
        {
            EngineError::TransactionControlRejected {
                statement_index, command,
            } => {
                assert_eq!(statement_index, 0);
                assert_eq!(command, "BEGIN");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    let err = gateway
        .engine()
        .execute("SELECT 1; SAVEPOINT s1", None)
        .await
        .unwrap_err();
    assert_eq!(err.statement_index(), Some(1));
    assert_eq!(spy.round_trips(), 0);
}

#[tokio::test]
async fn test_mixed_batch_is_gated_at_its_highest_tier() {
    let spy = SpyBackend::direct();
    let gateway = gateway_with(spy.clone());

    match gateway
        .engine()
        .execute("INSERT INTO a VALUES (1); DROP TABLE b;", None)
        .await
        .unwrap_err()
    {
        EngineError::ModeViolation { required_tier, .. } => assert_eq!(required_tier, RiskTier::Destructive),
        other => panic!("unexpected error: {other:?}"),
    }

    unlock(&gateway);
    let token = token_of(
        gateway
            .engine()
            .execute("INSERT INTO a VALUES (1); DROP TABLE b;", None)
            .await
            .unwrap_err(),
    );
    let outcome = match gateway.confirm(&token).await.unwrap() {
        ConfirmedOutcome::Database(outcome) => outcome,
        other => panic!("unexpected outcome: {other:?}"),
    };
    let tiers: Vec<Option<RiskTier>> = outcome.statements.iter().map(|s| s.tier).collect();
    assert_eq!(tiers, vec![Some(RiskTier::Write), Some(RiskTier::Destructive)]);
    assert_eq!(outcome.migration.map(|m| m.name), Some("drop_table_b".to_string()));
}

#[tokio::test]
async fn test_backend_failure_reports_statement_and_keeps_mode() {
    let spy = SpyBackend::direct();
    let gateway = gateway_with(spy.clone());
    unlock(&gateway);
    spy.fail_at(1);

    match gateway
        .engine()
        .execute("INSERT INTO a VALUES (1); INSERT INTO missing VALUES (2)", None)
        .await
        .unwrap_err()
    {
        EngineError::BackendExecution {
            statement_index,
            code,
            tier,
            ..
        } => {
            assert_eq!(statement_index, Some(1));
            assert_eq!(code.as_deref(), Some("42P01"));
            assert_eq!(tier, RiskTier::Write);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(gateway.safety().mode(SafetyDomain::Database), SafetyMode::Unrestricted);
}

#[tokio::test]
async fn test_failed_destructive_batch_records_nothing() {
    let spy = SpyBackend::direct();
    let gateway = gateway_with(spy.clone());
    unlock(&gateway);

    let token = token_of(gateway.engine().execute("DROP TABLE missing", None).await.unwrap_err());
    spy.fail_at(0);
    let err = gateway.confirm(&token).await.unwrap_err();
    assert_eq!(err.statement_index(), Some(0));
    assert!(spy.recorded_migrations().is_empty());
}

#[tokio::test]
async fn test_recording_failure_is_a_warning() {
    let spy = SpyBackend::direct();
    let gateway = gateway_with(spy.clone());
    unlock(&gateway);
    spy.fail_recording();

    let token = token_of(
        gateway
            .engine()
            .execute("CREATE TABLE orders (id int)", Some("add orders"))
            .await
            .unwrap_err(),
    );
    let outcome = match gateway.confirm(&token).await.unwrap() {
        ConfirmedOutcome::Database(outcome) => outcome,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert!(outcome.migration.is_none());
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].kind(), "recording_degraded");
    assert!(outcome.warnings[0].to_string().contains("add_orders"));
    assert_eq!(outcome.results[0].affected_rows, Some(1));
}

#[tokio::test]
async fn test_syntax_errors_never_reach_the_backend() {
    let spy = SpyBackend::direct();
    let gateway = gateway_with(spy.clone());
    unlock(&gateway);

    let err = gateway
        .engine()
        .execute("INSERT INTO t VALUES (1); DROP TABLE", None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "syntax_error");
    assert_eq!(err.statement_index(), Some(1));
    assert_eq!(spy.round_trips(), 0);
    assert_eq!(gateway.safety().mode(SafetyDomain::Database), SafetyMode::Unrestricted);
}

#[tokio::test]
async fn test_wrapping_depends_on_connection_kind() {
    let direct = SpyBackend::direct();
    let gateway = gateway_with(direct.clone());
    unlock(&gateway);
    let outcome = gateway.engine().execute("SELECT 1", None).await.unwrap();
    assert_eq!(outcome.transaction, TransactionMode::Autocommit);

    let pooled = SpyBackend::pooled();
    let gateway = gateway_with(pooled.clone());
    unlock(&gateway);
    let outcome = gateway.engine().execute("SELECT 1", None).await.unwrap();
    assert_eq!(outcome.transaction, TransactionMode::ReadWrite);

    gateway.safety().set_mode(SafetyDomain::Database, SafetyMode::Restricted);
    let outcome = gateway.engine().execute("SELECT 1; SELECT 2", None).await.unwrap();
    assert_eq!(outcome.transaction, TransactionMode::ReadOnly);
}

#[tokio::test]
async fn test_cancellation_releases_the_backend_call() {
    let spy = SpyBackend::direct();
    spy.stall_for(Duration::from_secs(30));
    let gateway = gateway_with(spy.clone());
    unlock(&gateway);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = gateway
        .engine()
        .execute_cancellable("UPDATE t SET a = 1", None, cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
    assert_eq!(spy.round_trips(), 1);
    assert_eq!(spy.in_flight(), 0);
    assert_eq!(gateway.safety().mode(SafetyDomain::Database), SafetyMode::Unrestricted);
}

#[tokio::test]
async fn test_request_timeout() {
    let spy = SpyBackend::direct();
    spy.stall_for(Duration::from_secs(30));
    let gateway = gateway_with(spy.clone()).with_request_timeout(Duration::from_millis(50));

    let err = gateway.engine().execute("SELECT 1", None).await.unwrap_err();
    assert!(err.is_retryable());
    match err {
        EngineError::Timeout { timeout_ms } => assert_eq!(timeout_ms, 50),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(spy.in_flight(), 0);
}

#[tokio::test]
async fn test_concurrent_risky_batches_share_no_unlock() {
    let spy = SpyBackend::direct();
    spy.stall_for(Duration::from_millis(200));
    let gateway = gateway_with(spy.clone());
    unlock(&gateway);

    let (first, second) = tokio::join!(
        gateway.engine().execute("INSERT INTO t VALUES (1)", None),
        gateway.engine().execute("INSERT INTO t VALUES (2)", None),
    );
    let mut kinds = [first.map(|_| "ok"), second.map(|_| "ok")]
        .into_iter()
        .map(|r| r.unwrap_or_else(|e| e.kind()))
        .collect::<Vec<_>>();
    kinds.sort();
    assert_eq!(kinds, vec!["mode_violation", "ok"]);
    assert_eq!(spy.caller_plans().len(), 1);
    assert_eq!(gateway.safety().mode(SafetyDomain::Database), SafetyMode::Restricted);

    unlock(&gateway);
    let a = token_of(gateway.engine().execute("DROP TABLE a", None).await.unwrap_err());
    let b = token_of(gateway.engine().execute("DROP TABLE b", None).await.unwrap_err());
    let (first, second) = tokio::join!(gateway.confirm(&a), gateway.confirm(&b));
    assert_eq!(usize::from(first.is_ok()) + usize::from(second.is_ok()), 1);
    assert_eq!(spy.caller_plans().len(), 2);
    assert_eq!(spy.recorded_migrations().len(), 1);
}

#[tokio::test]
async fn test_slow_recording_does_not_fail_a_committed_batch() {
    let spy = SpyBackend::direct();
    spy.stall_history_for(Duration::from_secs(5));
    let gateway = gateway_with(spy.clone()).with_request_timeout(Duration::from_millis(100));
    unlock(&gateway);

    let token = token_of(gateway.engine().execute("DROP TABLE t", None).await.unwrap_err());
    let outcome = match gateway.confirm(&token).await.unwrap() {
        ConfirmedOutcome::Database(outcome) => outcome,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert!(outcome.migration.is_none());
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].kind(), "recording_degraded");
    assert!(outcome.warnings[0].to_string().contains("100 ms"));
    assert!(outcome.mode_reset);
    assert_eq!(spy.caller_plans().len(), 1);
    assert_eq!(spy.in_flight(), 0);
    assert_eq!(gateway.safety().mode(SafetyDomain::Database), SafetyMode::Restricted);
}

#[tokio::test]
async fn test_cancellation_after_commit_keeps_the_recording() {
    let spy = SpyBackend::direct();
    spy.stall_history_for(Duration::from_millis(300));
    let gateway = gateway_with(spy.clone());
    unlock(&gateway);

    let token = token_of(
        gateway
            .engine()
            .execute("DROP TABLE t", Some("drop t"))
            .await
            .unwrap_err(),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let outcome = match gateway.confirm_cancellable(&token, cancel).await.unwrap() {
        ConfirmedOutcome::Database(outcome) => outcome,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
    assert_eq!(outcome.migration.map(|m| m.name), Some("drop_t".to_string()));
    assert_eq!(spy.recorded_migrations().len(), 1);
    assert_eq!(gateway.safety().mode(SafetyDomain::Database), SafetyMode::Restricted);
}

#[tokio::test]
async fn test_independent_gateways_share_no_state() {
    let first = gateway_with(SpyBackend::direct());
    let second = gateway_with(SpyBackend::direct());
    unlock(&first);
    assert_eq!(second.safety().mode(SafetyDomain::Database), SafetyMode::Restricted);

    let token = token_of(first.engine().execute("DROP TABLE t", None).await.unwrap_err());
    assert_eq!(second.confirm(&token).await.unwrap_err().kind(), "confirmation_not_found");
}

#[tokio::test]
async fn test_migration_listing() {
    let spy = SpyBackend::direct();
    let gateway = gateway_with(spy.clone());

    for sql in ["CREATE TABLE a (id int)", "CREATE TABLE b (id int)"] {
        unlock(&gateway);
        let token = token_of(gateway.engine().execute(sql, None).await.unwrap_err());
        gateway.confirm(&token).await.unwrap();
    }

    let records = gateway
        .engine()
        .list_migrations(&MigrationQuery::default())
        .await
        .unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].name, "create_table_b");
    assert_eq!(records[1].name, "create_table_a");
    assert!(records[0].version > records[1].version);
    assert!(records.iter().all(|r| r.statements.is_none() && r.statement_count == 1));

    let full = gateway
        .engine()
        .list_migrations(&MigrationQuery {
            include_full_queries: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(
        full[1].statements.as_deref(),
        Some(&["CREATE TABLE a (id int)".to_string()][..])
    );

    let err = gateway
        .engine()
        .list_migrations(&MigrationQuery {
            limit: Some(500),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation_error");

    let list_plan = spy.plans().into_iter().last().unwrap();
    assert_eq!(list_plan.transaction, TransactionMode::ReadOnly);
    assert_eq!(list_plan.statements[0].params[1], Value::Int(50));
}

#[tokio::test]
async fn test_introspection_runs_read_only_with_bound_parameters() {
    let spy = SpyBackend::direct();
    spy.respond(
        "pg_get_userbyid",
        &["schema_name", "owner", "table_count"],
        vec![vec![Value::text("public"), Value::text("postgres"), Value::Int(3)]],
    );
    spy.respond(
        "information_schema.columns",
        &["column_name", "data_type", "is_nullable", "column_default"],
        vec![
            vec![Value::text("id"), Value::text("bigint"), Value::text("NO"), Value::Null],
            vec![Value::text("email"), Value::text("text"), Value::text("YES"), Value::Null],
        ],
    );
    spy.respond("indisprimary", &["column_name"], vec![vec![Value::text("id")]]);
    let gateway = gateway_with(spy.clone());

    let schemas = gateway.engine().list_schemas().await.unwrap();
    assert_eq!(schemas.len(), 1);
    assert_eq!(schemas[0].name, "public");
    assert_eq!(schemas[0].table_count, 3);

    let table = gateway.engine().describe_table("public", "users").await.unwrap();
    assert_eq!(table.primary_key, vec!["id".to_string()]);
    assert!(table.columns[0].is_primary_key && !table.columns[0].nullable);
    assert!(table.columns[1].nullable);
    assert!(table.foreign_keys.is_empty());

    let tables = gateway.engine().list_tables("audit").await.unwrap();
    assert!(tables.is_empty());

    let plans = spy.plans();
    assert_eq!(plans.len(), 3);
    assert!(plans.iter().all(|p| p.transaction == TransactionMode::ReadOnly));
    assert_eq!(plans[1].statements.len(), 3);
    assert_eq!(
        plans[1].statements[0].params,
        vec![Value::text("public"), Value::text("users")]
    );
    assert_eq!(plans[2].statements[0].params, vec![Value::text("audit")]);

    assert_eq!(gateway.engine().list_tables(" ").await.unwrap_err().kind(), "validation_error");
}

#[tokio::test]
async fn test_shutdown_closes_backend() {
    let spy = SpyBackend::direct();
    let gateway = gateway_with(spy.clone());
    gateway.shutdown().await;
    assert!(spy.is_closed());
}
