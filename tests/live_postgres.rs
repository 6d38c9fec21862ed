//! Live tests against a local PostgreSQL server.
//!
//! Expects a server on the daemon's default socket (`/tmp`, port 15433)
//! that lets the current OS user connect without a password.
//! Run: `cargo test --test live_postgres -- --nocapture --ignored`

use pgsql_dbus::prelude::*;

fn bridge() -> Bridge<PgDatabase> {
    Bridge::new(
        PgDatabase::new(),
        ConnectionContext::default(),
        ParsePolicy::Lenient,
    )
}

#[tokio::test]
#[ignore = "Requires PostgreSQL on /tmp:15433 - run with --ignored"]
async fn test_live_ping() {
    assert_eq!(bridge().ping().await, PingStatus::Ok);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL on /tmp:15433 - run with --ignored"]
async fn test_live_typed_row() {
    let mut bridge = bridge();

    let reply = bridge
        .query(Some(
            "SELECT true AS b, 10::int2 AS n, 20::int4 AS i, 30::int8 AS x, \
             1.5::float8 AS d, 'hi'::text AS s, NULL::int4 AS nothing",
        ))
        .await
        .unwrap();

    let names: Vec<&str> = reply.entries().iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["b", "n", "i", "x", "d", "s", "nothing"]);
    assert_eq!(reply.get("b"), Some(&WireValue::Boolean(true)));
    assert_eq!(reply.get("n"), Some(&WireValue::Int16(10)));
    assert_eq!(reply.get("i"), Some(&WireValue::Int32(20)));
    assert_eq!(reply.get("x"), Some(&WireValue::Int64(30)));
    assert_eq!(reply.get("d"), Some(&WireValue::Double(1.5)));
    assert_eq!(reply.get("s"), Some(&WireValue::String("hi".to_string())));
    assert_eq!(reply.get("nothing"), Some(&WireValue::Int32(0)));
}

#[tokio::test]
#[ignore = "Requires PostgreSQL on /tmp:15433 - run with --ignored"]
async fn test_live_first_row_only() {
    let mut bridge = bridge();

    let reply = bridge
        .query(Some("SELECT g AS n, 'r' || g AS label FROM generate_series(1, 3) g"))
        .await
        .unwrap();

    assert_eq!(reply.len(), 2);
    assert_eq!(reply.get("n"), Some(&WireValue::Int32(1)));
    assert_eq!(reply.get("label"), Some(&WireValue::String("r1".to_string())));
}

#[tokio::test]
#[ignore = "Requires PostgreSQL on /tmp:15433 - run with --ignored"]
async fn test_live_syntax_error_is_empty() {
    let mut bridge = bridge();

    let reply = bridge.query(Some("SELEC 1")).await.unwrap();

    assert!(reply.is_empty());
    assert!(bridge.last_error().contains("syntax error"));
}

#[tokio::test]
#[ignore = "Requires PostgreSQL on /tmp:15433 - run with --ignored"]
async fn test_live_rowless_statements_are_empty_without_error() {
    let mut bridge = bridge();

    for sql in [
        "SELECT 1 WHERE false",
        "CREATE TEMP TABLE pgsql_dbus_scratch (a int)",
    ] {
        let reply = bridge.query(Some(sql)).await.unwrap();
        assert!(reply.is_empty(), "{sql}");
        assert_eq!(bridge.last_error(), "", "{sql}");
    }
}

#[tokio::test]
#[ignore = "Requires PostgreSQL on /tmp:15433 - run with --ignored"]
async fn test_live_multi_statement_uses_last_result() {
    let mut bridge = bridge();

    let reply = bridge
        .query(Some("SELECT 1 AS a; SELECT 'x'::text AS b"))
        .await
        .unwrap();
    assert_eq!(reply.len(), 1);
    assert_eq!(reply.get("b"), Some(&WireValue::String("x".to_string())));

    let reply = bridge
        .query(Some(
            "CREATE TEMP TABLE pgsql_dbus_multi (a int); SELECT 1 AS a; UPDATE pgsql_dbus_multi SET a = 2",
        ))
        .await
        .unwrap();
    assert!(reply.is_empty());
    assert_eq!(bridge.last_error(), "");
}
