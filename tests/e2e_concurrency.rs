mod common;

use std::sync::Arc;
use std::time::Duration;

use parlance::{
    ChatRequest, CommitConfig, Persistence, SessionManager, SessionStore, StoreError, Turn,
    TurnOrchestrator,
};

use common::{PirateGenerator, VanishingStore, flow_with, memory_store};

#[tokio::test]
async fn test_concurrent_requests_on_one_session_keep_every_turn() {
    let store = memory_store();
    let generator = Arc::new(PirateGenerator::with_delay(Duration::from_millis(20)));
    let flow = Arc::new(flow_with(store.clone(), generator));

    let first = flow.handle(ChatRequest::new("ahoy")).await.expect("first turn");
    let id = first.session_id.clone();

    let a = {
        let flow = Arc::clone(&flow);
        let id = id.clone();
        tokio::spawn(async move {
            flow.handle(ChatRequest::new("port").in_session(id.as_str()))
                .await
        })
    };
    let b = {
        let flow = Arc::clone(&flow);
        let id = id.clone();
        tokio::spawn(async move {
            flow.handle(ChatRequest::new("starboard").in_session(id.as_str()))
                .await
        })
    };

    a.await.expect("task a").expect("turn a");
    b.await.expect("task b").expect("turn b");

    let stored = store.get(&id).await.expect("get").expect("exists").state;
    let prompts: Vec<&str> = stored
        .turns()
        .iter()
        .step_by(2)
        .map(|t| t.text.as_str())
        .collect();

    assert_eq!(stored.turns().len(), 6);
    assert_eq!(prompts[0], "ahoy");
    assert!(prompts.contains(&"port"));
    assert!(prompts.contains(&"starboard"));
}

/// Two writers that both read the same version (as separate processes
/// would) must merge rather than clobber.
#[tokio::test]
async fn test_stale_writer_merges_onto_latest_state() {
    let store = memory_store();
    let generator = Arc::new(PirateGenerator::new());
    let manager = SessionManager::new(store.clone());
    let orchestrator = TurnOrchestrator::new(
        generator,
        store.clone(),
        "talk like a pirate",
        CommitConfig::default(),
    );
    assert_eq!(orchestrator.system_instruction(), "talk like a pirate");

    let created = orchestrator
        .advance(manager.create_session(), "ahoy")
        .await
        .expect("seed turn");
    let id = created.session.id.clone();

    let reader_a = manager.load_session(&id).await.expect("load a");
    let reader_b = manager.load_session(&id).await.expect("load b");

    let a = orchestrator.advance(reader_a, "port").await.expect("advance a");
    assert!(matches!(a.persistence, Persistence::Saved { attempts: 1, .. }));

    let b = orchestrator
        .advance(reader_b, "starboard")
        .await
        .expect("advance b");
    assert!(matches!(b.persistence, Persistence::Saved { attempts: 2, .. }));

    let expected = vec![
        Turn::user("ahoy"),
        Turn::agent("Arr! ahoy"),
        Turn::user("port"),
        Turn::agent("Arr! port"),
        Turn::user("starboard"),
        Turn::agent("Arr! starboard"),
    ];
    assert_eq!(b.session.state.turns(), expected.as_slice());

    let stored = store.get(&id).await.expect("get").expect("exists").state;
    assert_eq!(stored.turns(), expected.as_slice());
}

#[tokio::test]
async fn test_conflict_without_retries_is_reported_not_overwritten() {
    let store = memory_store();
    let manager = SessionManager::new(store.clone());
    let orchestrator = TurnOrchestrator::new(
        Arc::new(PirateGenerator::new()),
        store.clone(),
        "talk like a pirate",
        CommitConfig {
            optimistic: true,
            max_attempts: 1,
        },
    );

    let created = orchestrator
        .advance(manager.create_session(), "ahoy")
        .await
        .expect("seed turn");
    let id = created.session.id.clone();

    let reader_a = manager.load_session(&id).await.expect("load a");
    let reader_b = manager.load_session(&id).await.expect("load b");

    orchestrator.advance(reader_a, "port").await.expect("advance a");
    let b = orchestrator
        .advance(reader_b, "starboard")
        .await
        .expect("reply is still delivered");

    assert_eq!(b.agent_text, "Arr! starboard");
    assert!(matches!(
        b.persistence,
        Persistence::Failed(StoreError::Conflict { .. })
    ));

    let stored = store.get(&id).await.expect("get").expect("exists").state;
    assert_eq!(stored.turns().len(), 4);
    assert_eq!(stored.turns()[2].text, "port");
}

#[tokio::test]
async fn test_last_write_wins_mode_overwrites() {
    let store = memory_store();
    let manager = SessionManager::new(store.clone());
    let orchestrator = TurnOrchestrator::new(
        Arc::new(PirateGenerator::new()),
        store.clone(),
        "talk like a pirate",
        CommitConfig {
            optimistic: false,
            max_attempts: 1,
        },
    );

    let created = orchestrator
        .advance(manager.create_session(), "ahoy")
        .await
        .expect("seed turn");
    let id = created.session.id.clone();

    let reader_a = manager.load_session(&id).await.expect("load a");
    let reader_b = manager.load_session(&id).await.expect("load b");

    orchestrator.advance(reader_a, "port").await.expect("advance a");
    let b = orchestrator
        .advance(reader_b, "starboard")
        .await
        .expect("advance b");
    assert!(b.persistence.is_saved());

    let stored = store.get(&id).await.expect("get").expect("exists").state;
    let texts: Vec<&str> = stored.turns().iter().map(|t| t.text.as_str()).collect();
    assert_eq!(texts, vec!["ahoy", "Arr! ahoy", "starboard", "Arr! starboard"]);
}

#[tokio::test]
async fn test_record_deleted_mid_commit_is_recreated() {
    let store = Arc::new(VanishingStore::new(memory_store()));
    let manager = SessionManager::new(store.clone());
    let orchestrator = TurnOrchestrator::new(
        Arc::new(PirateGenerator::new()),
        store.clone(),
        "talk like a pirate",
        CommitConfig::default(),
    );

    let created = orchestrator
        .advance(manager.create_session(), "ahoy")
        .await
        .expect("seed turn");
    let id = created.session.id.clone();

    let session = manager.load_session(&id).await.expect("load");
    let outcome = orchestrator.advance(session, "port").await.expect("advance");

    assert!(store.vanished(), "the record should have been removed");
    assert!(matches!(outcome.persistence, Persistence::Saved { attempts: 2, .. }));

    let expected = vec![
        Turn::user("ahoy"),
        Turn::agent("Arr! ahoy"),
        Turn::user("port"),
        Turn::agent("Arr! port"),
    ];
    assert_eq!(outcome.session.state.turns(), expected.as_slice());

    let stored = store.get(&id).await.expect("get").expect("recreated").state;
    assert_eq!(stored.turns(), expected.as_slice());
}
