//! Session lifecycle over the sled store, including reopening the database.

use candor_core::{
    AudioSummary, ContextRecord, CoreError, FinishOutcome, InputModality, ParticipantRecord,
    SessionLifecycle, SessionStatus, SessionStore, SledStore, TurnInput, TurnOutput,
};
use std::sync::Arc;

fn seeded(path: &std::path::Path) -> Arc<SledStore> {
    let store = Arc::new(SledStore::open_path(path).expect("open sled"));
    store
        .put_participant(&ParticipantRecord {
            id: "cand-7".into(),
            name: "Ravi".into(),
            email: Some("ravi@example.com".into()),
        })
        .expect("participant");
    store
        .put_context(&ContextRecord {
            id: "job-7".into(),
            title: "Data Analyst".into(),
            department: Some("Analytics".into()),
            agent_endpoint: Some("https://agents.example/job-7".into()),
            prefer_indian_accent: true,
        })
        .expect("context");
    store
}

fn answer(text: &str) -> TurnInput {
    TurnInput {
        text: text.into(),
        confidence: 0.92,
        modality: InputModality::Voice,
    }
}

fn reply(text: &str) -> TurnOutput {
    TurnOutput {
        text: Some(text.into()),
        audio: Some(AudioSummary {
            provider: "local".into(),
            duration_ms: 1200,
            direct_playback: true,
        }),
    }
}

#[tokio::test]
async fn completed_interview_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let session_id = {
        let store = seeded(dir.path());
        let lifecycle = SessionLifecycle::new(store.clone(), store.clone());

        let session = lifecycle.create("cand-7", "job-7").await.expect("create");
        assert_eq!(session.status, SessionStatus::Pending);
        assert_eq!(
            session.agent_endpoint.as_deref(),
            Some("https://agents.example/job-7")
        );

        lifecycle.activate(&session.id).await.expect("activate");
        lifecycle
            .record_turn(&session.id, answer("I have four years of SQL."), reply("Tell me about a dashboard you built."))
            .await
            .expect("turn 1");
        lifecycle
            .record_turn(&session.id, answer("A churn dashboard in Looker."), reply("Thanks, that concludes our interview."))
            .await
            .expect("turn 2");

        let finished = lifecycle
            .finish(&session.id, FinishOutcome::Completed)
            .await
            .expect("finish");
        assert_eq!(finished.status, SessionStatus::Completed);
        assert!(finished.ended_at.is_some());
        store.flush().expect("flush");
        session.id
    };

    let store = Arc::new(SledStore::open_path(dir.path()).expect("reopen"));
    let lifecycle = SessionLifecycle::new(store.clone(), store.clone());

    let reloaded = lifecycle.get(&session_id).await.expect("reload");
    assert_eq!(reloaded.status, SessionStatus::Completed);
    assert_eq!(reloaded.questions_asked, 2);
    assert_eq!(reloaded.questions_answered, 2);
    assert_eq!(reloaded.turns_recorded, 2);

    let turns = store.list_turns(&session_id).await.expect("turns");
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].sequence, 1);
    assert_eq!(turns[1].input.text, "A churn dashboard in Looker.");

    // Finished sessions stay finished across processes.
    assert!(matches!(
        lifecycle.record_turn(&session_id, answer("one more"), reply("no")).await,
        Err(CoreError::InvalidState(_))
    ));
    assert!(matches!(
        lifecycle.activate(&session_id).await,
        Err(CoreError::InvalidState(_))
    ));
}

#[tokio::test]
async fn pending_session_can_only_be_cancelled() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = seeded(dir.path());
    let lifecycle = SessionLifecycle::new(store.clone(), store.clone());

    let session = lifecycle.create("cand-7", "job-7").await.expect("create");
    assert!(matches!(
        lifecycle.finish(&session.id, FinishOutcome::Completed).await,
        Err(CoreError::InvalidState(_))
    ));

    let cancelled = lifecycle
        .finish(&session.id, FinishOutcome::Cancelled)
        .await
        .expect("cancel");
    assert_eq!(cancelled.status, SessionStatus::Cancelled);

    let stored = store
        .get_session(&session.id)
        .await
        .expect("read")
        .expect("present");
    assert_eq!(stored.status, SessionStatus::Cancelled);
}

#[tokio::test]
async fn unknown_references_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = seeded(dir.path());
    let lifecycle = SessionLifecycle::new(store.clone(), store.clone());

    assert!(matches!(
        lifecycle.create("cand-7", "job-404").await,
        Err(CoreError::NotFound(_))
    ));
    assert!(matches!(
        lifecycle.get(&candor_core::SessionId::generate()).await,
        Err(CoreError::NotFound(_))
    ));
}
