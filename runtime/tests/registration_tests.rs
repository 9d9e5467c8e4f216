//! Integration tests for registering logic and dependencies on a live
//! middleware.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use composable_logic_core::{Action, ConfigError, Dependencies, Effect, Logic, LogicError, MonitorOp};
use composable_logic_runtime::{LogicMiddleware, PipelineConfig};
use composable_logic_testing::{
    MonitorRecorder, RecordingConsumer, init_tracing, properties, test_clock,
};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn attached(logics: Vec<Arc<Logic>>, dependencies: Dependencies) -> (LogicMiddleware, RecordingConsumer) {
    init_tracing();
    let config = PipelineConfig::default()
        .with_warn_timeouts(false)
        .with_clock(Arc::new(test_clock()));
    let middleware = LogicMiddleware::with_config(logics, dependencies, config).unwrap();
    let consumer = RecordingConsumer::new();
    middleware.attach(consumer.shared()).unwrap();
    (middleware, consumer)
}

async fn settle(middleware: &LogicMiddleware) {
    tokio::time::timeout(Duration::from_secs(5), middleware.monitor().settled())
        .await
        .expect("pipeline should settle");
}

fn tagging(action_type: &str, tag: &'static str) -> Arc<Logic> {
    Logic::builder(action_type)
        .transform(move |ctx| Some(ctx.action().clone().with_meta(tag)))
        .build()
}

#[tokio::test]
async fn added_logic_applies_to_later_actions() {
    let (middleware, consumer) = attached(vec![], Dependencies::new());

    middleware.dispatch(Action::new("PING")).unwrap();
    settle(&middleware).await;

    middleware.add_logic(vec![tagging("PING", "seen")]).unwrap();
    assert_eq!(middleware.generation(), 1);
    middleware.dispatch(Action::new("PING")).unwrap();
    settle(&middleware).await;

    assert_eq!(
        consumer.actions(),
        vec![Action::new("PING"), Action::new("PING").with_meta("seen")]
    );
}

#[tokio::test]
async fn in_flight_instances_finish_after_replace() {
    let slow = Logic::builder("SLOW")
        .process(|_ctx| {
            Effect::future(async {
                tokio::time::sleep(Duration::from_millis(40)).await;
                Ok::<_, LogicError>(Some(Action::new("SLOW_DONE")))
            })
        })
        .build();
    let (middleware, consumer) = attached(vec![slow], Dependencies::new());

    middleware.dispatch(Action::new("SLOW")).unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    middleware.replace_logic(vec![tagging("OTHER", "new")]).unwrap();
    settle(&middleware).await;

    assert_eq!(middleware.logic_names(), vec!["L(OTHER)-0"]);
    assert_eq!(consumer.types(), vec!["SLOW", "SLOW_DONE"]);

    middleware.dispatch(Action::new("SLOW")).unwrap();
    middleware.dispatch(Action::new("OTHER")).unwrap();
    settle(&middleware).await;

    let tail: Vec<Action> = consumer.actions().into_iter().skip(2).collect();
    assert_eq!(
        tail,
        vec![Action::new("SLOW"), Action::new("OTHER").with_meta("new")]
    );
}

#[tokio::test]
async fn replacing_with_the_same_logic_still_cancels_older_instances() {
    let fetch = Logic::builder("FETCH")
        .latest(true)
        .process(|ctx| {
            let payload = ctx.action().payload.clone().unwrap_or_default();
            Effect::future(async move {
                tokio::time::sleep(Duration::from_millis(40)).await;
                Ok::<_, LogicError>(Some(Action::new("FETCH_OK").with_payload(payload)))
            })
        })
        .build();
    let (middleware, consumer) = attached(vec![Arc::clone(&fetch)], Dependencies::new());
    let recorder = MonitorRecorder::new(middleware.monitor());

    middleware.dispatch(Action::new("FETCH").with_payload(1)).unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    middleware.replace_logic(vec![fetch]).unwrap();
    middleware.dispatch(Action::new("FETCH").with_payload(2)).unwrap();
    settle(&middleware).await;

    let results: Vec<Action> = consumer
        .actions()
        .into_iter()
        .filter(|a| a.action_type == "FETCH_OK")
        .collect();
    assert_eq!(results, vec![Action::new("FETCH_OK").with_payload(2)]);
    assert_eq!(recorder.count(MonitorOp::DispCancelled), 1);
}

#[tokio::test]
async fn merge_skips_registered_logic() {
    let existing = tagging("A", "a");
    let (middleware, consumer) = attached(vec![Arc::clone(&existing)], Dependencies::new());

    middleware
        .merge_new_logic(vec![existing, tagging("B", "b")])
        .unwrap();
    assert_eq!(middleware.logic_names(), vec!["L(A)-0", "L(B)-1"]);

    middleware.dispatch(Action::new("A")).unwrap();
    middleware.dispatch(Action::new("B")).unwrap();
    settle(&middleware).await;

    assert_eq!(
        consumer.actions(),
        vec![Action::new("A").with_meta("a"), Action::new("B").with_meta("b")]
    );
}

#[tokio::test]
async fn duplicate_add_leaves_the_pipeline_untouched() {
    let logic = tagging("A", "a");
    let (middleware, _consumer) = attached(vec![Arc::clone(&logic)], Dependencies::new());

    let err = middleware.add_logic(vec![logic]).unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateLogic { .. }));
    assert_eq!(middleware.logic_count(), 1);
    assert_eq!(middleware.generation(), 0);
}

#[tokio::test]
async fn injected_dependencies_reach_later_instances() {
    let greet = Logic::builder("GREET")
        .process(|ctx| {
            let name = ctx
                .dependency::<String>("name")
                .map_or_else(|| "nobody".to_string(), |n| n.to_string());
            Action::new("GREETED").with_payload(name)
        })
        .build();
    let (middleware, consumer) = attached(vec![greet], Dependencies::new());

    middleware.dispatch(Action::new("GREET")).unwrap();
    settle(&middleware).await;
    middleware
        .add_deps(&Dependencies::new().with("name", "Ada".to_string()))
        .unwrap();
    middleware.dispatch(Action::new("GREET")).unwrap();
    settle(&middleware).await;

    let greetings: Vec<_> = consumer
        .actions()
        .into_iter()
        .filter(|a| a.action_type == "GREETED")
        .filter_map(|a| a.payload)
        .collect();
    assert_eq!(greetings, vec!["nobody", "Ada"]);
}

#[tokio::test]
async fn conflicting_dependency_is_rejected() {
    let (middleware, _consumer) = attached(vec![], Dependencies::new().with("limit", 10_u32));

    let err = middleware
        .add_deps(&Dependencies::new().with("limit", 20_u32))
        .unwrap_err();
    assert!(matches!(err, ConfigError::DependencyConflict { .. }));
    assert_eq!(middleware.dependencies().get::<u32>("limit").as_deref(), Some(&10));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn wildcard_forwards_every_action_unchanged(actions in prop::collection::vec(properties::action(), 1..8)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let received = runtime.block_on(async {
            let wildcard = Logic::builder("*").build();
            let (middleware, consumer) = attached(vec![wildcard], Dependencies::new());
            for action in actions.clone() {
                middleware.dispatch(action).unwrap();
            }
            settle(&middleware).await;
            consumer.actions()
        });
        // Each matched action runs in its own instance, so only membership is fixed.
        prop_assert_eq!(received.len(), actions.len());
        for action in &actions {
            let expected = actions.iter().filter(|a| *a == action).count();
            let found = received.iter().filter(|a| *a == action).count();
            prop_assert_eq!(found, expected);
        }
    }

    #[test]
    fn unmatched_types_bypass_logic(action_type in properties::action_type()) {
        prop_assume!(action_type != "WATCHED");
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (received, begins) = runtime.block_on(async {
            let watched = Logic::builder("WATCHED").transform(|_ctx| None).build();
            let (middleware, consumer) = attached(vec![watched], Dependencies::new());
            let recorder = MonitorRecorder::new(middleware.monitor());
            middleware.dispatch(Action::new(action_type.clone())).unwrap();
            settle(&middleware).await;
            (consumer.types(), recorder.count(MonitorOp::Begin))
        });
        prop_assert_eq!(received, vec![action_type]);
        prop_assert_eq!(begins, 0);
    }
}
