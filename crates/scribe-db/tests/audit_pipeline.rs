//! End-to-end audit pipeline tests.
//!
//! The host's tables live in the same database as the audit tables. Each test
//! drives a `ChangeTracker` the way an ORM would: stage changes, observe,
//! run the SQL, assign generated keys, commit.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

use scribe_core::auditor::Auditor;
use scribe_core::blame::SecurityToken;
use scribe_core::entity::EntitySnapshot;
use scribe_core::enums::{AuditAction, ColumnType};
use scribe_core::errors::CoreError;
use scribe_core::filter::EntityFilter;
use scribe_core::label::Label;
use scribe_core::metadata::{EntityMeta, EntityRegistry, RelationMapping};
use scribe_core::tracker::ChangeTracker;
use scribe_db::ScribeDb;
use scribe_db::error::DatabaseError;
use scribe_db::repos::audit::AuditFilter;
use scribe_db::service::AuditService;

const PRODUCT: &str = "Shop\\Entity\\Product";
const TAG: &str = "Shop\\Entity\\Tag";
const USER: &str = "App\\Entity\\User";

const HOST_SCHEMA: &str = "
    CREATE TABLE products (id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT NOT NULL, qty INTEGER);
    CREATE TABLE tags (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
    CREATE TABLE product_tags (product_id INTEGER NOT NULL, tag_id INTEGER NOT NULL);
    CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
";

fn registry() -> EntityRegistry {
    EntityRegistry::from_entities([
        EntityMeta::new(PRODUCT, "products")
            .scalar("title", ColumnType::String)
            .scalar("qty", ColumnType::Integer)
            .to_many("tags"),
        EntityMeta::new(TAG, "tags").scalar("name", ColumnType::String),
        EntityMeta::new(USER, "users").scalar("name", ColumnType::String),
    ])
    .unwrap()
}

fn tags() -> RelationMapping {
    RelationMapping::many_to_many("tags", "product_tags")
}

fn user(id: i64, name: &str) -> EntitySnapshot {
    EntitySnapshot::detached(USER)
        .with_field("id", id)
        .with_field("name", name)
}

async fn service_with(auditor: Auditor) -> AuditService {
    let db = ScribeDb::open_local(":memory:").await.unwrap();
    db.conn().execute_batch(HOST_SCHEMA).await.unwrap();
    AuditService::from_db(db, auditor)
}

async fn test_service() -> AuditService {
    service_with(Auditor::new(registry())).await
}

async fn count(svc: &AuditService, table: &str) -> i64 {
    let mut rows = svc
        .db()
        .conn()
        .query(&format!("SELECT COUNT(*) FROM {table}"), ())
        .await
        .unwrap();
    rows.next().await.unwrap().unwrap().get::<i64>(0).unwrap()
}

/// Persist a product through an audited transaction and return its key.
async fn insert_product(svc: &AuditService, uow: &mut ChangeTracker, title: &str) -> i64 {
    let widget = uow.persist(
        EntitySnapshot::detached(PRODUCT)
            .with_field("title", title)
            .with_field("qty", 3),
    );
    let mut tx = svc.begin().await.unwrap();
    tx.observe(&*uow);
    tx.execute(
        "INSERT INTO products (title, qty) VALUES (?1, ?2)",
        libsql::params![title, 3],
    )
    .await
    .unwrap();
    let id = tx.last_insert_rowid();
    uow.assign(widget, "id", id).unwrap();
    tx.commit(&*uow).await.unwrap();
    id
}

// ---------------------------------------------------------------------------
// Insert / update / remove
// ---------------------------------------------------------------------------

#[tokio::test]
async fn insert_records_generated_key_label_and_actor() {
    let svc = test_service().await;
    svc.auditor()
        .tokens()
        .set(SecurityToken::authenticated(user(7, "alice")));

    let mut uow = ChangeTracker::new();
    let id = insert_product(&svc, &mut uow, "Widget").await;

    let entries = svc.query_audit(&AuditFilter::default()).await.unwrap();
    assert_eq!(entries.len(), 1);
    let record = &entries[0].record;
    assert_eq!(record.action, AuditAction::Insert);
    assert_eq!(record.table, "products");
    assert_eq!(record.source.class, PRODUCT);
    assert_eq!(record.source.typ, "product");
    assert_eq!(record.source.label.as_deref(), Some("Widget"));
    assert_eq!(record.source.foreign_key, json!(id));
    assert!(record.target.is_none());

    let blame = record.blame.as_ref().unwrap();
    assert_eq!(blame.class, USER);
    assert_eq!(blame.label.as_deref(), Some("alice"));
    assert_eq!(blame.foreign_key, json!(7));

    let diff = record.diff.as_ref().unwrap();
    assert_eq!(diff["title"].old, json!(null));
    assert_eq!(diff["title"].new, json!("Widget"));
    assert_eq!(diff["title"].col, "title");
    assert_eq!(diff["qty"].new, json!(3));
}

#[tokio::test]
async fn update_records_old_and_new_values() {
    let svc = test_service().await;
    svc.db()
        .conn()
        .execute("INSERT INTO products (id, title, qty) VALUES (1, 'Widget', 3)", ())
        .await
        .unwrap();

    let mut uow = ChangeTracker::new();
    let widget = uow.manage(
        EntitySnapshot::detached(PRODUCT)
            .with_field("id", 1)
            .with_field("title", "Widget")
            .with_field("qty", 3),
    );
    uow.set(widget, "qty", 5).unwrap();

    let mut tx = svc.begin().await.unwrap();
    tx.observe(&uow);
    tx.execute("UPDATE products SET qty = 5 WHERE id = 1", ())
        .await
        .unwrap();
    let summary = tx.commit(&uow).await.unwrap();
    assert_eq!(summary.records(), 1);

    let entry = svc.get_audit(summary.audit_ids[0]).await.unwrap().unwrap();
    assert_eq!(entry.record.action, AuditAction::Update);
    let diff = entry.record.diff.unwrap();
    assert_eq!(diff.len(), 1);
    assert_eq!(diff["qty"].old, json!(3));
    assert_eq!(diff["qty"].new, json!(5));
    assert!(entry.record.blame.is_none());
}

#[tokio::test]
async fn remove_keeps_the_key_captured_before_delete() {
    let svc = test_service().await;
    svc.db()
        .conn()
        .execute("INSERT INTO products (id, title) VALUES (42, 'Old')", ())
        .await
        .unwrap();

    let mut uow = ChangeTracker::new();
    let old = uow.manage(
        EntitySnapshot::detached(PRODUCT)
            .with_field("id", 42)
            .with_field("title", "Old"),
    );
    uow.remove(old).unwrap();

    let mut tx = svc.begin().await.unwrap();
    tx.observe(&uow);
    tx.execute("DELETE FROM products WHERE id = 42", ())
        .await
        .unwrap();
    // Hosts clear the key of deleted objects.
    uow.assign(old, "id", scribe_core::value::Value::Null).unwrap();
    tx.commit(&uow).await.unwrap();

    let entries = svc.query_audit(&AuditFilter::default()).await.unwrap();
    assert_eq!(entries.len(), 1);
    let record = &entries[0].record;
    assert_eq!(record.action, AuditAction::Remove);
    assert_eq!(record.source.foreign_key, json!(42));
    assert_eq!(record.source.label.as_deref(), Some("Old"));
    assert!(record.diff.is_none());
    assert_eq!(count(&svc, "products").await, 0);
}

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn associate_and_dissociate_use_the_join_table() {
    let svc = test_service().await;
    let mut uow = ChangeTracker::new();
    let widget = uow.manage(
        EntitySnapshot::detached(PRODUCT)
            .with_field("id", 1)
            .with_field("title", "Widget"),
    );
    let sale = uow.manage(
        EntitySnapshot::detached(TAG)
            .with_field("id", 3)
            .with_field("name", "sale"),
    );
    let new = uow.manage(
        EntitySnapshot::detached(TAG)
            .with_field("id", 4)
            .with_field("name", "new"),
    );
    uow.load_collection(widget, "tags", vec![new]);
    uow.add_to_collection(widget, &tags(), sale);
    uow.remove_from_collection(widget, &tags(), new);

    let mut tx = svc.begin().await.unwrap();
    tx.observe(&uow);
    tx.execute(
        "INSERT INTO product_tags (product_id, tag_id) VALUES (1, 3)",
        (),
    )
    .await
    .unwrap();
    tx.execute(
        "DELETE FROM product_tags WHERE product_id = 1 AND tag_id = 4",
        (),
    )
    .await
    .unwrap();
    tx.commit(&uow).await.unwrap();

    let entries = svc
        .query_audit(&AuditFilter {
            table: Some("product_tags".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);

    let dissociate = &entries[0].record;
    assert_eq!(dissociate.action, AuditAction::Dissociate);
    assert_eq!(dissociate.target.as_ref().unwrap().foreign_key, json!(4));

    let associate = &entries[1].record;
    assert_eq!(associate.action, AuditAction::Associate);
    assert_eq!(associate.source.foreign_key, json!(1));
    let target = associate.target.as_ref().unwrap();
    assert_eq!(target.class, TAG);
    assert_eq!(target.label.as_deref(), Some("sale"));
    assert_eq!(target.table.as_deref(), Some("tags"));
}

// ---------------------------------------------------------------------------
// Filtering and transaction boundaries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unaudited_classes_write_nothing() {
    let auditor = Auditor::new(registry()).with_filter(EntityFilter::new().ignore([PRODUCT]));
    let svc = service_with(auditor).await;

    let mut uow = ChangeTracker::new();
    insert_product(&svc, &mut uow, "Widget").await;

    assert_eq!(count(&svc, "products").await, 1);
    assert_eq!(count(&svc, "audit_logs").await, 0);
    assert_eq!(count(&svc, "audit_associations").await, 0);
}

#[tokio::test]
async fn rollback_writes_nothing() {
    let svc = test_service().await;
    let mut uow = ChangeTracker::new();
    uow.persist(EntitySnapshot::detached(PRODUCT).with_field("title", "Widget"));

    let mut tx = svc.begin().await.unwrap();
    tx.observe(&uow);
    tx.execute("INSERT INTO products (title) VALUES ('Widget')", ())
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    assert_eq!(count(&svc, "products").await, 0);
    assert_eq!(count(&svc, "audit_logs").await, 0);
}

#[tokio::test]
async fn rollback_statement_is_rejected_and_commit_stays_atomic() {
    let svc = test_service().await;
    let mut uow = ChangeTracker::new();
    let widget = uow.persist(EntitySnapshot::detached(PRODUCT).with_field("title", "Widget"));

    let mut tx = svc.begin().await.unwrap();
    tx.observe(&uow);
    tx.execute("INSERT INTO products (title) VALUES ('Widget')", ())
        .await
        .unwrap();
    uow.assign(widget, "id", tx.last_insert_rowid()).unwrap();

    let err = tx.execute("ROLLBACK", ()).await.unwrap_err();
    assert!(matches!(err, DatabaseError::TransactionControl(_)), "got {err:?}");

    let summary = tx.commit(&uow).await.unwrap();
    assert_eq!(summary.records(), 1);
    assert_eq!(count(&svc, "products").await, 1);
    assert_eq!(count(&svc, "audit_logs").await, 1);
}

#[tokio::test]
async fn commit_after_transaction_ended_writes_no_audit_rows() {
    let svc = test_service().await;
    let mut uow = ChangeTracker::new();
    uow.persist(EntitySnapshot::detached(PRODUCT).with_field("title", "Widget"));

    let mut tx = svc.begin().await.unwrap();
    tx.observe(&uow);
    tx.execute("INSERT INTO products (title) VALUES ('Widget')", ())
        .await
        .unwrap();
    // ends the transaction behind the wrapper's back
    svc.db().conn().execute("ROLLBACK", ()).await.unwrap();

    let err = tx.commit(&uow).await.unwrap_err();
    assert!(matches!(err, DatabaseError::TransactionInactive), "got {err:?}");

    assert_eq!(count(&svc, "products").await, 0);
    assert_eq!(count(&svc, "audit_logs").await, 0);
    assert_eq!(count(&svc, "audit_associations").await, 0);
}

#[tokio::test]
async fn dropped_transaction_rolls_back() {
    let svc = test_service().await;
    let mut uow = ChangeTracker::new();
    uow.persist(EntitySnapshot::detached(PRODUCT).with_field("title", "Widget"));

    {
        let mut tx = svc.begin().await.unwrap();
        tx.observe(&uow);
        tx.execute("INSERT INTO products (title) VALUES ('Widget')", ())
            .await
            .unwrap();
    }

    assert_eq!(count(&svc, "products").await, 0);
    assert_eq!(count(&svc, "audit_logs").await, 0);
}

#[tokio::test]
async fn failed_flush_rolls_back_host_changes() {
    let svc = test_service().await;
    let mut uow = ChangeTracker::new();
    uow.persist(EntitySnapshot::detached(PRODUCT).with_field("title", "Widget"));

    let mut tx = svc.begin().await.unwrap();
    tx.observe(&uow);
    tx.execute("INSERT INTO products (title) VALUES ('Widget')", ())
        .await
        .unwrap();
    tx.execute("DROP TABLE audit_logs", ()).await.unwrap();

    let err = tx.commit(&uow).await.unwrap_err();
    assert!(matches!(err, DatabaseError::LibSql(_)), "got {err:?}");

    assert_eq!(count(&svc, "products").await, 0);
    assert_eq!(count(&svc, "audit_logs").await, 0);
}

struct BrokenLabeler;

impl Label for BrokenLabeler {
    fn attach(&mut self, _registry: Arc<EntityRegistry>) {}

    fn label(&self, _entity: &EntitySnapshot) -> Result<String, CoreError> {
        Err(CoreError::Configuration("labeler misconfigured".into()))
    }
}

#[tokio::test]
async fn configuration_errors_abort_the_commit() {
    let svc = service_with(Auditor::new(registry()).with_labeler(BrokenLabeler)).await;
    let mut uow = ChangeTracker::new();
    uow.persist(EntitySnapshot::detached(PRODUCT).with_field("title", "Widget"));

    let mut tx = svc.begin().await.unwrap();
    tx.observe(&uow);
    tx.execute("INSERT INTO products (title) VALUES ('Widget')", ())
        .await
        .unwrap();
    let err = tx.commit(&uow).await.unwrap_err();

    assert!(matches!(
        err,
        DatabaseError::Core(CoreError::Configuration(_))
    ));
    assert_eq!(count(&svc, "products").await, 0);
}

#[tokio::test]
async fn each_transaction_starts_with_an_empty_buffer() {
    let svc = test_service().await;
    let mut uow = ChangeTracker::new();
    insert_product(&svc, &mut uow, "Widget").await;
    uow.reset();

    let mut tx = svc.begin().await.unwrap();
    assert_eq!(tx.observe(&uow), 0);
    assert!(!tx.is_armed());
    let summary = tx.commit(&uow).await.unwrap();

    assert_eq!(summary.records(), 0);
    assert_eq!(svc.count_audit().await.unwrap(), 1);
}

#[tokio::test]
async fn injected_actor_wins_over_the_token() {
    let svc = test_service().await;
    svc.auditor()
        .tokens()
        .set(SecurityToken::authenticated(user(7, "alice")));

    let mut uow = ChangeTracker::new();
    uow.persist(EntitySnapshot::detached(PRODUCT).with_field("title", "Widget"));
    let mut tx = svc.begin().await.unwrap();
    tx.blame_as(user(9, "cron"));
    tx.observe(&uow);
    tx.execute("INSERT INTO products (title) VALUES ('Widget')", ())
        .await
        .unwrap();
    tx.commit(&uow).await.unwrap();

    let entries = svc.query_audit(&AuditFilter::default()).await.unwrap();
    let blame = entries[0].record.blame.as_ref().unwrap();
    assert_eq!(blame.label.as_deref(), Some("cron"));
    assert_eq!(blame.foreign_key, json!(9));
}

#[tokio::test]
async fn anonymous_token_blames_nobody() {
    let svc = test_service().await;
    svc.auditor().tokens().set(SecurityToken::anonymous());

    let mut uow = ChangeTracker::new();
    insert_product(&svc, &mut uow, "Widget").await;

    let entries = svc.query_audit(&AuditFilter::default()).await.unwrap();
    assert!(entries[0].record.blame.is_none());
    assert_eq!(count(&svc, "audit_associations").await, 1);
}

// ---------------------------------------------------------------------------
// On-disk database
// ---------------------------------------------------------------------------

#[tokio::test]
async fn records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("audit.db");
    let path = path.to_str().unwrap();

    {
        let svc = AuditService::new_local(path, Auditor::new(registry()))
            .await
            .unwrap();
        svc.db().conn().execute_batch(HOST_SCHEMA).await.unwrap();
        let mut uow = ChangeTracker::new();
        insert_product(&svc, &mut uow, "Widget").await;
    }

    let svc = AuditService::new_local(path, Auditor::new(registry()))
        .await
        .unwrap();
    assert_eq!(svc.count_audit().await.unwrap(), 1);
    let entry = svc.get_audit(1).await.unwrap().unwrap();
    assert_eq!(entry.record.source.label.as_deref(), Some("Widget"));
}
