use super::*;
use crate::clickhouse::{codes, StoreError};
use crate::data_transfer::mapper::ColumnDomain;
use crate::db_types::{ConnectionConfig, Credential};
use crate::error::ErrorKind;
use crate::test_support::FakeStore;

const TARGET: &str = "`db`.`people`";

fn schema(header_derived: bool) -> FrameSchema {
    FrameSchema {
        columns: vec![
            ("id".to_string(), ColumnDomain::Integer),
            ("score".to_string(), ColumnDomain::Float),
            ("ok".to_string(), ColumnDomain::Boolean),
        ],
        header_derived,
    }
}

async fn session_for(store: &FakeStore) -> Box<dyn StoreSession> {
    let config = ConnectionConfig {
        host: "h".into(),
        port: 8123,
        database: "db".into(),
        user: "u".into(),
        secure: false,
        credential: Credential::Password("p".into()),
    };
    store.connector().connect(&config).await.ok().unwrap()
}

#[test]
fn test_build_create_table() {
    assert_eq!(
        build_create_table(TARGET, &schema(true)),
        "CREATE TABLE `db`.`people` (\n    `id` Int64,\n    `score` Float64,\n    `ok` UInt8\n) ENGINE = MergeTree() ORDER BY tuple()"
    );
}

#[tokio::test]
async fn test_existing_table_is_left_alone() {
    let store = FakeStore::new();
    store.add_table("db", "people", &[("name", "String")], vec![]);
    let session = session_for(&store).await;

    for create in [false, true] {
        let outcome = ensure_target(session.as_ref(), TARGET, &schema(true), create)
            .await
            .unwrap();
        assert_eq!(outcome, ProvisionOutcome::Exists);
    }
    assert!(!store.statements().iter().any(|s| s.starts_with("CREATE")));
}

#[tokio::test]
async fn test_missing_table_without_create_is_schema_error() {
    let store = FakeStore::new();
    let session = session_for(&store).await;

    let err = ensure_target(session.as_ref(), TARGET, &schema(true), false)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaError);
    assert!(err.to_string().contains("does not exist"));
}

#[tokio::test]
async fn test_missing_table_is_created_from_schema() {
    let store = FakeStore::new();
    let session = session_for(&store).await;

    let outcome = ensure_target(session.as_ref(), TARGET, &schema(true), true)
        .await
        .unwrap();
    assert_eq!(outcome, ProvisionOutcome::Created);

    let table = store.table("db", "people").unwrap();
    assert_eq!(
        table.columns,
        vec![
            ("id".to_string(), "Int64".to_string()),
            ("score".to_string(), "Float64".to_string()),
            ("ok".to_string(), "UInt8".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_headerless_schema_cannot_create() {
    let store = FakeStore::new();
    let session = session_for(&store).await;

    let err = ensure_target(session.as_ref(), TARGET, &schema(false), true)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaError);
    assert!(store.table("db", "people").is_none());
}

#[tokio::test]
async fn test_duplicate_create_is_ddl_error() {
    let store = FakeStore::new();
    let session = session_for(&store).await;
    store.add_table("db", "people", &[("id", "Int64")], vec![]);

    let err = session
        .command(&build_create_table(TARGET, &schema(true)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(codes::TABLE_ALREADY_EXISTS));
}

#[tokio::test]
async fn test_probe_errors_other_than_unknown_table_propagate() {
    struct Denied;

    #[async_trait::async_trait]
    impl StoreSession for Denied {
        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
        async fn query(
            &self,
            _: &str,
            _: &[(&str, &str)],
        ) -> Result<crate::db_types::QueryResult, StoreError> {
            unreachable!()
        }
        async fn command(&self, _: &str) -> Result<(), StoreError> {
            Err(StoreError::server(403, Some(497), "Code: 497. Not enough privileges"))
        }
        async fn insert_frame(
            &self,
            _: &str,
            _: &crate::data_transfer::frame::TabularFrame,
        ) -> Result<(), StoreError> {
            unreachable!()
        }
        async fn close(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    let err = ensure_target(&Denied, TARGET, &schema(true), true)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreError);
}
