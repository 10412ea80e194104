mod common;

use std::sync::Arc;

use carewatch_alert::condition::CompareOp;
use carewatch_common::types::{AlertStatus, Severity};
use carewatch_service::config::RetryConfig;
use carewatch_service::rule_builder::{build_rules, RuleConfigRow};
use carewatch_service::{AlertService, ServiceError};
use carewatch_tasks::TaskLinkage;

use common::{
    make_obs, setup_store, threshold_rule, FlakyCatalog, RecordingSink, StaticCatalog, VecHistory,
};

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        base_delay_ms: 1,
    }
}

fn service_with(
    catalog: Arc<dyn carewatch_alert::RuleCatalog>,
    store: Arc<carewatch_storage::AlertStore>,
    tasks: TaskLinkage,
) -> AlertService {
    let history = Arc::new(VecHistory {
        observations: Vec::new(),
    });
    AlertService::new(catalog, history, store, tasks, fast_retry())
}

#[tokio::test]
async fn high_pain_reading_creates_one_pending_alert() {
    let (_dir, store) = setup_store().await;
    let catalog = Arc::new(StaticCatalog {
        rules: vec![threshold_rule("rule-pain", "painLevel", CompareOp::GreaterEqual, 8.0)],
    });
    let service = service_with(catalog, store.clone(), TaskLinkage::disabled());

    let outcomes = service.evaluate(&make_obs("patient-7", "painLevel", 9.0)).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].is_created());

    let alert = outcomes[0].alert();
    assert_eq!(alert.status, AlertStatus::Pending);
    assert_eq!(alert.severity, Severity::High);
    assert_eq!(alert.patient_id, "patient-7");
    assert_eq!(alert.rule_id, "rule-pain");
    assert!(alert.claimed_by.is_none());

    // A second elevated reading shortly after attaches to the open alert
    // instead of creating a new one.
    let outcomes = service.evaluate(&make_obs("patient-7", "painLevel", 9.0)).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(!outcomes[0].is_created());
    assert_eq!(outcomes[0].alert().id, alert.id);

    let supporting = outcomes[0].alert().metadata["supporting_observations"]
        .as_array()
        .unwrap()
        .len();
    assert_eq!(supporting, 1);

    let queue = store.list_open_alerts(Some("patient-7"), None, 10, 0).await.unwrap();
    assert_eq!(queue.len(), 1);
}

#[tokio::test]
async fn normal_reading_creates_nothing() {
    let (_dir, store) = setup_store().await;
    let catalog = Arc::new(StaticCatalog {
        rules: vec![threshold_rule("rule-pain", "painLevel", CompareOp::GreaterEqual, 8.0)],
    });
    let service = service_with(catalog, store.clone(), TaskLinkage::disabled());

    let outcomes = service.evaluate(&make_obs("patient-7", "painLevel", 3.0)).await.unwrap();
    assert!(outcomes.is_empty());
    let queue = store.list_open_alerts(None, None, 10, 0).await.unwrap();
    assert!(queue.is_empty());
}

#[tokio::test]
async fn alert_creation_dispatches_follow_up_task() {
    let (_dir, store) = setup_store().await;
    let mut rule = threshold_rule("rule-pain", "painLevel", CompareOp::GreaterEqual, 8.0);
    rule.spawn_task = true;
    let catalog = Arc::new(StaticCatalog { rules: vec![rule] });
    let (sink, mut rx) = RecordingSink::new();
    let tasks = TaskLinkage::new(vec![sink], 5);
    let service = service_with(catalog, store, tasks);

    let outcomes = service.evaluate(&make_obs("patient-7", "painLevel", 9.0)).await.unwrap();
    let alert_id = outcomes[0].alert().id.clone();

    let task = rx.recv().await.unwrap();
    assert_eq!(task.alert_id, alert_id);
    assert_eq!(task.patient_id, "patient-7");
    assert_eq!(task.severity, Severity::High);

    // Suppressed duplicates do not spawn another task.
    service.evaluate(&make_obs("patient-7", "painLevel", 9.5)).await.unwrap();
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn catalog_outage_queues_observation_for_reevaluation() {
    let (_dir, store) = setup_store().await;
    let rules = vec![threshold_rule("rule-pain", "painLevel", CompareOp::GreaterEqual, 8.0)];
    // Down for the first evaluation's two attempts, healthy afterwards.
    let catalog = Arc::new(FlakyCatalog::new(rules, 2));
    let service = service_with(catalog, store.clone(), TaskLinkage::disabled());

    let obs = make_obs("patient-7", "painLevel", 9.0);
    let err = service.evaluate(&obs).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::UpstreamUnavailable { attempts: 2, .. }
    ));
    assert_eq!(service.queued_for_reevaluation(), 1);
    assert!(store.list_open_alerts(None, None, 10, 0).await.unwrap().is_empty());

    let processed = service.drain_retry_queue().await;
    assert_eq!(processed, 1);
    assert_eq!(service.queued_for_reevaluation(), 0);

    let queue = store.list_open_alerts(Some("patient-7"), None, 10, 0).await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].rule_id, "rule-pain");
}

#[tokio::test]
async fn retry_backoff_survives_large_attempt_budgets() {
    let (_dir, store) = setup_store().await;
    // Catalog never recovers within the attempt budget.
    let catalog = Arc::new(FlakyCatalog::new(
        vec![threshold_rule("rule-pain", "painLevel", CompareOp::GreaterEqual, 8.0)],
        1000,
    ));
    let history = Arc::new(VecHistory {
        observations: Vec::new(),
    });
    let service = AlertService::new(
        catalog,
        history,
        store,
        TaskLinkage::disabled(),
        RetryConfig {
            max_attempts: 70,
            base_delay_ms: 0,
        },
    );

    // Beyond 64 attempts the doubling must clamp instead of overflowing.
    let err = service.evaluate(&make_obs("patient-7", "painLevel", 9.0)).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::UpstreamUnavailable { attempts: 70, .. }
    ));
}

#[tokio::test]
async fn lifecycle_conflicts_surface_as_conflict_errors() {
    let (_dir, store) = setup_store().await;
    let catalog = Arc::new(StaticCatalog {
        rules: vec![threshold_rule("rule-pain", "painLevel", CompareOp::GreaterEqual, 8.0)],
    });
    let service = service_with(catalog, store, TaskLinkage::disabled());

    let outcomes = service.evaluate(&make_obs("patient-7", "painLevel", 9.0)).await.unwrap();
    let alert_id = outcomes[0].alert().id.clone();

    service.claim(&alert_id, "nurse-kim").await.unwrap();
    let err = service.claim(&alert_id, "dr-lee").await.unwrap_err();
    assert!(err.is_conflict());

    service.acknowledge(&alert_id, "nurse-kim").await.unwrap();
    let resolved = service
        .resolve(&alert_id, "nurse-kim", "pain managed, medication adjusted", Some(20))
        .await
        .unwrap();
    assert_eq!(resolved.status, AlertStatus::Resolved);
    assert_eq!(resolved.time_spent_minutes, Some(20));

    // Terminal alerts reject further transitions.
    let err = service.cancel(&alert_id, "admin", "duplicate entry").await.unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn catalog_rows_drive_evaluation_end_to_end() {
    let rows = vec![
        RuleConfigRow {
            id: "rule-pain".to_string(),
            name: "Severe pain".to_string(),
            rule_type: "threshold".to_string(),
            metric_key: "painLevel".to_string(),
            severity: "high".to_string(),
            priority: 0,
            unit: None,
            active: true,
            spawn_task: false,
            config_json: r#"{"operator":"gte","value":8.0}"#.to_string(),
        },
        // Malformed row: skipped at build time, evaluation unaffected.
        RuleConfigRow {
            id: "rule-broken".to_string(),
            name: "Broken".to_string(),
            rule_type: "threshold".to_string(),
            metric_key: "painLevel".to_string(),
            severity: "high".to_string(),
            priority: 0,
            unit: None,
            active: true,
            spawn_task: false,
            config_json: r#"{"operator":"sideways","value":1.0}"#.to_string(),
        },
    ];
    let rules = build_rules(&rows);
    assert_eq!(rules.len(), 1);

    let (_dir, store) = setup_store().await;
    let catalog = Arc::new(StaticCatalog { rules });
    let service = service_with(catalog, store, TaskLinkage::disabled());

    let outcomes = service.evaluate(&make_obs("patient-7", "painLevel", 8.0)).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].alert().rule_id, "rule-pain");
}
