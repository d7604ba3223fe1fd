use super::approval::{ApprovalWorkflow, ChangeProposal};
use super::dialect::EntryWrite;
use super::dispatch::{ConfigOperation, run_config_operation};
use super::error::StoreError;
use super::memory::MemoryConnector;
use super::store::ConfigStore;
use super::traits::Connector;
use serde_json::{Map, Value, json};
use shared_types::{ConfigItem, ItemOutcome, Page, RequestStatus, Visibility};
use std::time::Duration;

async fn connected() -> MemoryConnector {
    let mut connector = MemoryConnector::new("testdb");
    connector.connect().await.unwrap();
    connector
}

async fn create_test_store(connector: &MemoryConnector) -> ConfigStore<'_> {
    let store = ConfigStore::new(connector, "allconfig").unwrap();
    store.create_table_if_missing().await.unwrap();
    store
}

fn entry(key: &str, value: Value) -> EntryWrite {
    EntryWrite::new(key, value)
}

#[tokio::test]
async fn test_create_table_is_idempotent() {
    let connector = connected().await;
    let store = ConfigStore::new(&connector, "allconfig").unwrap();

    let before = store.inspect(None).await.unwrap();
    assert!(!before.exists);
    assert!(before.create_table_sql.is_some());

    assert!(store.create_table_if_missing().await.unwrap());
    assert!(!store.create_table_if_missing().await.unwrap());

    store.create_direct(&entry("a", json!(1))).await.unwrap();
    let after = store.inspect(None).await.unwrap();
    assert!(after.exists);
    assert_eq!(after.count, Some(1));
    assert!(after.create_table_sql.is_none());
}

#[test]
fn test_rejects_invalid_table_name() {
    let connector = MemoryConnector::new("testdb");
    let err = ConfigStore::new(&connector, "config; DROP TABLE x").err().unwrap();
    assert!(matches!(err, StoreError::Validation(_)));
}

#[tokio::test]
async fn test_direct_create_and_read() {
    let connector = connected().await;
    let store = create_test_store(&connector).await;

    let write = entry("api_url", json!("https://example.com"))
        .description(Some("public endpoint".into()))
        .maker(Some("alice".into()));
    store.create_direct(&write).await.unwrap();

    let read = store
        .read("api_url", Visibility::ApprovedOnly)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(read.value, json!("https://example.com"));
    assert_eq!(read.description.as_deref(), Some("public endpoint"));
    assert_eq!(read.maker_id.as_deref(), Some("alice"));
    assert!(read.created_at.is_some());

    assert!(store.read("missing", Visibility::All).await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_create_surfaces_backend_error() {
    let connector = connected().await;
    let store = create_test_store(&connector).await;

    store.create_direct(&entry("k", json!("v1"))).await.unwrap();
    let err = store.create_direct(&entry("k", json!("v2"))).await.unwrap_err();
    assert!(matches!(err, StoreError::Backend { .. }));
    assert!(err.to_string().contains("duplicate key"));

    let read = store.read("k", Visibility::All).await.unwrap().unwrap();
    assert_eq!(read.value, json!("v1"));
}

#[tokio::test]
async fn test_update_direct_upserts_and_keeps_description() {
    let connector = connected().await;
    let store = create_test_store(&connector).await;

    store
        .update_direct(&entry("k", json!("v1")).description(Some("first".into())))
        .await
        .unwrap();
    let created = store.read("k", Visibility::All).await.unwrap().unwrap();

    store.update_direct(&entry("k", json!("v2"))).await.unwrap();
    let updated = store.read("k", Visibility::All).await.unwrap().unwrap();
    assert_eq!(updated.value, json!("v2"));
    assert_eq!(updated.description.as_deref(), Some("first"));
    assert_eq!(updated.created_at, created.created_at);
    assert_eq!(store.count(Visibility::All).await.unwrap(), 1);
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let connector = connected().await;
    let store = create_test_store(&connector).await;

    store.create_direct(&entry("k", json!(true))).await.unwrap();
    assert_eq!(store.delete_direct("k").await.unwrap().rows_affected, 1);
    assert_eq!(store.delete_direct("k").await.unwrap().rows_affected, 0);
    assert!(!store.exists("k", Visibility::All).await.unwrap());
}

#[tokio::test]
async fn test_delete_all_clears_entries() {
    let connector = connected().await;
    let store = create_test_store(&connector).await;

    for key in ["a", "b", "c"] {
        store.create_direct(&entry(key, json!(key))).await.unwrap();
    }
    assert_eq!(store.delete_all().await.unwrap().rows_affected, 3);
    assert_eq!(store.count(Visibility::All).await.unwrap(), 0);
}

#[tokio::test]
async fn test_search_is_case_insensitive() {
    let connector = connected().await;
    let store = create_test_store(&connector).await;

    store
        .create_direct(&entry("Database_URL", json!("postgres://db:5432/app")))
        .await
        .unwrap();
    store
        .create_direct(&entry("cache_ttl", json!("300")).description(Some("Cache lifetime".into())))
        .await
        .unwrap();
    store.create_direct(&entry("feature_x", json!("on"))).await.unwrap();

    let by_key = store
        .search("database", Visibility::ApprovedOnly, Page::all())
        .await
        .unwrap();
    assert_eq!(by_key.len(), 1);
    assert_eq!(by_key[0].key, "Database_URL");

    let by_value = store
        .search("POSTGRES", Visibility::ApprovedOnly, Page::all())
        .await
        .unwrap();
    assert_eq!(by_value.len(), 1);

    let by_description = store
        .search("LIFETIME", Visibility::All, Page::all())
        .await
        .unwrap();
    assert_eq!(by_description[0].key, "cache_ttl");

    let err = store
        .search("", Visibility::All, Page::all())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

#[tokio::test]
async fn test_search_escapes_pattern_characters() {
    let connector = connected().await;
    let store = create_test_store(&connector).await;

    store.create_direct(&entry("a.b", json!("x"))).await.unwrap();
    store.create_direct(&entry("axb", json!("y"))).await.unwrap();

    let found = store.search("a.b", Visibility::All, Page::all()).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].key, "a.b");
}

#[tokio::test]
async fn test_read_all_is_ordered_and_paged() {
    let connector = connected().await;
    let store = create_test_store(&connector).await;

    for key in ["c", "a", "d", "b"] {
        store.create_direct(&entry(key, json!(key))).await.unwrap();
    }
    let all = store.read_all(Visibility::ApprovedOnly, Page::all()).await.unwrap();
    let keys: Vec<_> = all.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, vec!["a", "b", "c", "d"]);

    let page = store
        .read_all(Visibility::ApprovedOnly, Page::new(Some(2), Some(1)))
        .await
        .unwrap();
    let keys: Vec<_> = page.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, vec!["b", "c"]);
}

#[tokio::test]
async fn test_filter_accepts_aliases_and_rejects_unknown_fields() {
    let connector = connected().await;
    let store = create_test_store(&connector).await;

    store
        .create_direct(&entry("a", json!("x")).maker(Some("alice".into())))
        .await
        .unwrap();
    store
        .create_direct(&entry("b", json!("x")).maker(Some("bob".into())))
        .await
        .unwrap();

    let mut criteria = Map::new();
    criteria.insert("value".into(), json!("x"));
    criteria.insert("maker_id".into(), json!("bob"));
    let found = store
        .filter(&criteria, Visibility::ApprovedOnly, Page::all())
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].key, "b");

    let mut unknown = Map::new();
    unknown.insert("colour".into(), json!("red"));
    let err = store
        .filter(&unknown, Visibility::All, Page::all())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

#[tokio::test]
async fn test_batch_create_reports_each_item_in_order() {
    let connector = connected().await;
    let store = create_test_store(&connector).await;

    let items = vec![
        ConfigItem::new("a", json!(1)),
        ConfigItem::new("b", json!(2)),
        ConfigItem::new("a", json!(3)),
    ];
    let summary = store.create_batch(&items, Some("alice")).await;
    assert_eq!(summary.total_items, 3);
    assert_eq!(summary.success_count, 2);
    assert_eq!(summary.failure_count, 1);
    assert!(matches!(summary.results[2].outcome, ItemOutcome::Failure { .. }));
    assert_eq!(summary.results[2].key, "a");

    let a = store.read("a", Visibility::All).await.unwrap().unwrap();
    assert_eq!(a.value, json!(1));
    assert_eq!(a.maker_id.as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_batch_update_and_delete() {
    let connector = connected().await;
    let store = create_test_store(&connector).await;

    let items = vec![ConfigItem::new("a", json!(1)), ConfigItem::new("b", json!(2))];
    let summary = store.update_batch(&items, None).await;
    assert_eq!(summary.success_count, 2);

    let summary = store
        .delete_batch(&["a".to_string(), String::new(), "zzz".to_string()])
        .await;
    assert_eq!(summary.total_items, 3);
    assert_eq!(summary.success_count, 2);
    assert!(!summary.outcome_for("").unwrap().is_success());
    assert_eq!(store.count(Visibility::All).await.unwrap(), 1);
}

#[tokio::test]
async fn test_pending_change_is_invisible_until_approved() {
    let connector = connected().await;
    let workflow = ApprovalWorkflow::new(create_test_store(&connector).await);

    let request = workflow
        .submit(ChangeProposal::create("feature_flag", "on", "alice").with_description("rollout"))
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.request_id.len(), 32);

    let store = workflow.store();
    assert!(store.read("feature_flag", Visibility::ApprovedOnly).await.unwrap().is_none());
    assert!(!store.exists("feature_flag", Visibility::All).await.unwrap());

    let approved = workflow
        .approve(&request.request_id, "bob", Some("ship it"))
        .await
        .unwrap();
    assert_eq!(approved.status, RequestStatus::Approved);
    assert_eq!(approved.checker_id.as_deref(), Some("bob"));

    let entry = store
        .read("feature_flag", Visibility::ApprovedOnly)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.value, json!("on"));
    assert_eq!(entry.maker_id.as_deref(), Some("alice"));
    assert_eq!(entry.checker_id.as_deref(), Some("bob"));
    assert_eq!(entry.approval_comment.as_deref(), Some("ship it"));

    let stored = workflow.get_request(&request.request_id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Approved);
    assert!(stored.processed_at.is_some());
}

#[tokio::test]
async fn test_reject_leaves_entries_untouched() {
    let connector = connected().await;
    let workflow = ApprovalWorkflow::new(create_test_store(&connector).await);

    let request = workflow
        .submit(ChangeProposal::create("k", "v", "alice"))
        .await
        .unwrap();
    let rejected = workflow
        .reject(&request.request_id, "bob", Some("not now"))
        .await
        .unwrap();
    assert_eq!(rejected.status, RequestStatus::Rejected);
    assert!(!workflow.store().exists("k", Visibility::All).await.unwrap());

    let history = workflow.list_history(Page::all()).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].approval_comment.as_deref(), Some("not now"));
    assert!(workflow.list_pending(Page::all()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_resolved_request_cannot_be_resolved_again() {
    let connector = connected().await;
    let workflow = ApprovalWorkflow::new(create_test_store(&connector).await);

    let request = workflow
        .submit(ChangeProposal::create("k", "v", "alice"))
        .await
        .unwrap();
    workflow.approve(&request.request_id, "bob", None).await.unwrap();

    let again = workflow
        .approve(&request.request_id, "carol", None)
        .await
        .unwrap_err();
    assert!(matches!(again, StoreError::NotFound(_)));
    let reject = workflow
        .reject(&request.request_id, "carol", None)
        .await
        .unwrap_err();
    assert!(matches!(reject, StoreError::NotFound(_)));

    let missing = workflow.approve("nope", "bob", None).await.unwrap_err();
    assert!(matches!(missing, StoreError::NotFound(_)));
}

#[tokio::test]
async fn test_maker_cannot_resolve_own_request() {
    let connector = connected().await;
    let workflow = ApprovalWorkflow::new(create_test_store(&connector).await);

    let request = workflow
        .submit(ChangeProposal::create("k", "v", "alice"))
        .await
        .unwrap();
    let err = workflow
        .approve(&request.request_id, "alice", None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    let err = workflow
        .reject(&request.request_id, "alice", None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));

    let pending = workflow.list_pending(Page::all()).await.unwrap();
    assert_eq!(pending.len(), 1);
}

#[tokio::test]
async fn test_submit_captures_previous_value() {
    let connector = connected().await;
    let workflow = ApprovalWorkflow::new(create_test_store(&connector).await);
    workflow
        .store()
        .create_direct(&entry("timeout", json!("30")))
        .await
        .unwrap();

    let update = workflow
        .submit(ChangeProposal::update("timeout", "60", "alice"))
        .await
        .unwrap();
    assert_eq!(update.previous_value, Some(json!("30")));

    let delete = workflow
        .submit(ChangeProposal::delete("timeout", "alice"))
        .await
        .unwrap();
    assert_eq!(delete.previous_value, Some(json!("30")));

    let stored = workflow.get_request(&update.request_id).await.unwrap().unwrap();
    assert_eq!(stored.previous_value, Some(json!("30")));
}

#[tokio::test]
async fn test_approved_update_and_delete_apply() {
    let connector = connected().await;
    let workflow = ApprovalWorkflow::new(create_test_store(&connector).await);
    let store = workflow.store();
    store.create_direct(&entry("k", json!("old"))).await.unwrap();

    let update = workflow
        .submit(ChangeProposal::update("k", "new", "alice"))
        .await
        .unwrap();
    workflow.approve(&update.request_id, "bob", None).await.unwrap();
    let read = store.read("k", Visibility::ApprovedOnly).await.unwrap().unwrap();
    assert_eq!(read.value, json!("new"));

    let delete = workflow
        .submit(ChangeProposal::delete("k", "alice"))
        .await
        .unwrap();
    workflow.approve(&delete.request_id, "bob", None).await.unwrap();
    assert!(store.read("k", Visibility::All).await.unwrap().is_none());
}

#[tokio::test]
async fn test_approving_create_of_existing_key_keeps_request_pending() {
    let connector = connected().await;
    let workflow = ApprovalWorkflow::new(create_test_store(&connector).await);

    let request = workflow
        .submit(ChangeProposal::create("k", "proposed", "alice"))
        .await
        .unwrap();
    workflow
        .store()
        .create_direct(&entry("k", json!("direct")))
        .await
        .unwrap();

    let err = workflow
        .approve(&request.request_id, "bob", None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Backend { .. }));
    let stored = workflow.get_request(&request.request_id).await.unwrap().unwrap();
    assert!(stored.is_pending());
    assert!(stored.checker_id.is_none());
    assert!(stored.processed_at.is_none());

    let entry = workflow.store().read("k", Visibility::All).await.unwrap().unwrap();
    assert_eq!(entry.value, json!("direct"));
}

#[tokio::test]
async fn test_concurrent_approvals_apply_once() {
    let connector = connected().await;
    let workflow = ApprovalWorkflow::new(create_test_store(&connector).await);
    workflow
        .store()
        .create_direct(&entry("limit", json!("1")))
        .await
        .unwrap();
    let request = workflow
        .submit(ChangeProposal::update("limit", "2", "alice"))
        .await
        .unwrap();

    let (bob, carol) = tokio::join!(
        workflow.approve(&request.request_id, "bob", Some("bob says yes")),
        workflow.approve(&request.request_id, "carol", Some("carol says yes")),
    );
    let winner = match (bob, carol) {
        (Ok(won), Err(lost)) | (Err(lost), Ok(won)) => {
            assert!(matches!(lost, StoreError::NotFound(_)));
            won
        }
        (a, b) => panic!("expected exactly one approval, got {a:?} and {b:?}"),
    };

    let entry = workflow
        .store()
        .read("limit", Visibility::ApprovedOnly)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.value, json!("2"));
    assert_eq!(entry.checker_id, winner.checker_id);
    assert_eq!(entry.approval_comment, winner.approval_comment);
}

#[tokio::test]
async fn test_submit_validation() {
    let connector = connected().await;
    let workflow = ApprovalWorkflow::new(create_test_store(&connector).await);

    let no_maker = workflow
        .submit(ChangeProposal::create("k", "v", ""))
        .await
        .unwrap_err();
    assert!(matches!(no_maker, StoreError::Validation(_)));

    let mut no_value = ChangeProposal::update("k", "v", "alice");
    no_value.value = None;
    let err = workflow.submit(no_value).await.unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

#[tokio::test]
async fn test_request_listings() {
    let connector = connected().await;
    let workflow = ApprovalWorkflow::new(create_test_store(&connector).await);

    let first = workflow
        .submit(ChangeProposal::create("a", 1, "alice"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = workflow
        .submit(ChangeProposal::create("b", 2, "bob"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let third = workflow
        .submit(ChangeProposal::create("c", 3, "alice"))
        .await
        .unwrap();

    let pending: Vec<_> = workflow
        .list_pending(Page::all())
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.request_id)
        .collect();
    assert_eq!(
        pending,
        vec![first.request_id.clone(), second.request_id.clone(), third.request_id.clone()]
    );

    let mine: Vec<_> = workflow
        .list_mine("alice", Page::all())
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.request_id)
        .collect();
    assert_eq!(mine, vec![third.request_id.clone(), first.request_id.clone()]);

    workflow.approve(&first.request_id, "bob", None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    workflow.reject(&second.request_id, "alice", None).await.unwrap();

    let history: Vec<_> = workflow
        .list_history(Page::all())
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.request_id)
        .collect();
    assert_eq!(history, vec![second.request_id, first.request_id]);

    let limited = workflow.list_pending(Page::new(Some(1), None)).await.unwrap();
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn test_dispatch_governance_round_trip() {
    let connector = connected().await;
    let workflow = ApprovalWorkflow::new(create_test_store(&connector).await);

    let mut submit = ConfigOperation::new("submit_create");
    submit.key = Some("region".into());
    submit.value = Some(json!("eu-west-1"));
    submit.maker_id = Some("alice".into());
    let submitted = run_config_operation(&workflow, &submit).await.unwrap();
    assert_eq!(submitted["status"], "submitted_for_approval");
    assert_eq!(submitted["config_key"], "region");
    assert_eq!(submitted["operation"], "create");
    let request_id = submitted["request_id"].as_str().unwrap().to_string();

    let mut exists = ConfigOperation::new("exists");
    exists.key = Some("region".into());
    let before = run_config_operation(&workflow, &exists).await.unwrap();
    assert_eq!(before, json!({"exists": false, "key": "region"}));

    let mut approve = ConfigOperation::new("approve_request");
    approve.request_id = Some(request_id);
    approve.checker_id = Some("bob".into());
    approve.approval_comment = Some("ok".into());
    let approved = run_config_operation(&workflow, &approve).await.unwrap();
    assert_eq!(approved["status"], "approved");

    let after = run_config_operation(&workflow, &exists).await.unwrap();
    assert_eq!(after["exists"], true);

    let mut get = ConfigOperation::new("get_config");
    get.key = Some("region".into());
    let read = run_config_operation(&workflow, &get).await.unwrap();
    assert_eq!(read["config_value"], "eu-west-1");
}

#[tokio::test]
async fn test_dispatch_aliases_and_validation() {
    let connector = connected().await;
    let workflow = ApprovalWorkflow::new(create_test_store(&connector).await);

    let set_multiple: ConfigOperation = serde_json::from_value(json!({
        "operation": "set_multiple",
        "configs": {"a": "1", "b": "2"}
    }))
    .unwrap();
    let summary = run_config_operation(&workflow, &set_multiple).await.unwrap();
    assert_eq!(summary["success_count"], 2);

    let count = run_config_operation(&workflow, &ConfigOperation::new("count"))
        .await
        .unwrap();
    assert_eq!(count, json!({"count": 2}));

    let overwrite: ConfigOperation = serde_json::from_value(json!({
        "operation": "set_multiple",
        "configs": {"a": "10", "c": "3"}
    }))
    .unwrap();
    let summary = run_config_operation(&workflow, &overwrite).await.unwrap();
    assert_eq!(summary["success_count"], 2);
    assert_eq!(summary["failure_count"], 0);
    let mut read_a = ConfigOperation::new("read");
    read_a.key = Some("a".into());
    let a = run_config_operation(&workflow, &read_a).await.unwrap();
    assert_eq!(a["config_value"], "10");

    let duplicate_items: ConfigOperation = serde_json::from_value(json!({
        "operation": "create_batch",
        "config_items": [{"key": "a", "value": "11"}]
    }))
    .unwrap();
    let summary = run_config_operation(&workflow, &duplicate_items).await.unwrap();
    assert_eq!(summary["failure_count"], 1);

    let count = run_config_operation(&workflow, &ConfigOperation::new("count"))
        .await
        .unwrap();
    assert_eq!(count, json!({"count": 3}));

    let all = run_config_operation(&workflow, &ConfigOperation::new("get_all"))
        .await
        .unwrap();
    assert_eq!(all.as_array().unwrap().len(), 3);

    let err = run_config_operation(&workflow, &ConfigOperation::new("read"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));

    let err = run_config_operation(&workflow, &ConfigOperation::new("filter"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));

    let err = run_config_operation(&workflow, &ConfigOperation::new("approve_request"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));

    let err = run_config_operation(&workflow, &ConfigOperation::new("explode"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::UnsupportedOperation { .. }));
    assert!(err.to_string().contains("explode"));
}
