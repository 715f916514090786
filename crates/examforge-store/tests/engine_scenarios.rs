//! End-to-end engine scenarios, run against every store backend.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use futures::future::join_all;

use examforge_core::clock::ManualClock;
use examforge_core::error::FrozenReason;
use examforge_core::events::{AttemptEvent, ChannelEvents};
use examforge_core::gateway::Grading;
use examforge_core::model::{
    AccessPolicy, AnswerValue, AssessmentDefinition, AttemptStatus, GradeEntry, GradingOutcome,
    Question, QuestionKind,
};
use examforge_core::traits::{AssessmentCatalog, AttemptStore};
use examforge_core::catalog::StaticCatalog;
use examforge_core::{AttemptEngine, DenyReason, EngineConfig, EngineError, ErrorKind};
use examforge_store::{MemoryStore, SqliteStore};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn t() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap()
}

fn objective(id: &str, marks: f64, answer: &str) -> Question {
    Question {
        id: id.into(),
        kind: QuestionKind::Objective,
        max_marks: marks,
        answer: Some(AnswerValue::Scalar(answer.into())),
        prompt: format!("Question {id}"),
    }
}

fn subjective(id: &str, marks: f64) -> Question {
    Question {
        id: id.into(),
        kind: QuestionKind::Subjective,
        max_marks: marks,
        answer: None,
        prompt: format!("Discuss {id}"),
    }
}

fn assessment(id: &str, questions: Vec<Question>) -> AssessmentDefinition {
    AssessmentDefinition {
        id: id.into(),
        title: id.to_uppercase(),
        version: 1,
        published: true,
        starts_at: t(),
        ends_at: t() + Duration::seconds(3600),
        access: AccessPolicy::Public,
        time_limit_secs: None,
        graders: vec![],
        questions,
    }
}

/// Three objective questions worth 2 marks each.
fn assessment_a() -> AssessmentDefinition {
    assessment(
        "A",
        vec![
            objective("q1", 2.0, "a"),
            objective("q2", 2.0, "b"),
            objective("q3", 2.0, "c"),
        ],
    )
}

/// One objective (2 marks) plus one subjective (5 marks) question.
fn assessment_b() -> AssessmentDefinition {
    assessment("B", vec![objective("q1", 2.0, "a"), subjective("essay", 5.0)])
}

fn essay_grading(marks: f64) -> Grading {
    Grading {
        grader_id: "grader-1".into(),
        marks: vec![GradeEntry {
            question_id: "essay".into(),
            marks_awarded: marks,
            comment: Some("clear structure".into()),
        }],
        feedback: Some("Good work".into()),
    }
}

struct Harness {
    engine: Arc<AttemptEngine>,
    clock: Arc<ManualClock>,
}

fn harness(store: Arc<dyn AttemptStore>, definitions: Vec<AssessmentDefinition>) -> Harness {
    let clock = Arc::new(ManualClock::new(t() + Duration::seconds(10)));
    let engine = AttemptEngine::new(
        Arc::new(StaticCatalog::new(definitions)),
        store,
        EngineConfig::default(),
    )
    .with_clock(clock.clone());
    Harness {
        engine: Arc::new(engine),
        clock,
    }
}

fn memory_store() -> Arc<dyn AttemptStore> {
    Arc::new(MemoryStore::new())
}

fn sqlite_store() -> Arc<dyn AttemptStore> {
    Arc::new(SqliteStore::open_in_memory().unwrap())
}

/// Catalog whose definitions can be republished mid-test.
#[derive(Default)]
struct RepublishingCatalog {
    definitions: RwLock<Vec<Arc<AssessmentDefinition>>>,
}

impl RepublishingCatalog {
    fn publish(&self, definition: AssessmentDefinition) {
        let mut definitions = self.definitions.write().unwrap();
        definitions.retain(|d| d.id != definition.id);
        definitions.push(Arc::new(definition));
    }
}

#[async_trait]
impl AssessmentCatalog for RepublishingCatalog {
    async fn get_definition(
        &self,
        assessment_id: &str,
    ) -> anyhow::Result<Option<Arc<AssessmentDefinition>>> {
        Ok(self
            .definitions
            .read()
            .unwrap()
            .iter()
            .find(|d| d.id == assessment_id)
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

async fn all_objective_submit_is_evaluated_immediately(store: Arc<dyn AttemptStore>) {
    let h = harness(store, vec![assessment_a()]);
    let attempt = h.engine.start_attempt("A", "S").await.unwrap();
    assert_eq!(attempt.status, AttemptStatus::InProgress);

    h.engine
        .save_answer(attempt.id, "q1", AnswerValue::Scalar("a".into()))
        .await
        .unwrap();
    h.engine
        .save_answer(attempt.id, "q2", AnswerValue::Scalar("wrong".into()))
        .await
        .unwrap();

    let submitted = h.engine.submit_attempt(attempt.id).await.unwrap();
    assert_eq!(submitted.status, AttemptStatus::Evaluated);
    assert_eq!(submitted.total_score, 2.0);
    assert!(submitted.evaluated_at.is_some());

    let outcomes: Vec<_> = submitted.answers.iter().map(|a| a.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            GradingOutcome::Correct,
            GradingOutcome::Incorrect,
            GradingOutcome::Incorrect
        ]
    );
    assert!(submitted.is_score_consistent());

    let stored = h.engine.get_attempt(attempt.id).await.unwrap();
    assert_eq!(stored, submitted);
}

async fn mixed_assessment_waits_for_grader(store: Arc<dyn AttemptStore>) {
    let (events, mut rx) = ChannelEvents::new();
    let engine = AttemptEngine::new(
        Arc::new(StaticCatalog::new([assessment_b()])),
        store,
        EngineConfig::default(),
    )
    .with_clock(Arc::new(ManualClock::new(t() + Duration::seconds(10))))
    .with_events(Arc::new(events));

    let attempt = engine.start_attempt("B", "S").await.unwrap();
    engine
        .save_answer(attempt.id, "q1", AnswerValue::Scalar("a".into()))
        .await
        .unwrap();
    engine
        .save_answer(attempt.id, "essay", AnswerValue::FreeText("My essay".into()))
        .await
        .unwrap();

    let submitted = engine.submit_attempt(attempt.id).await.unwrap();
    assert_eq!(submitted.status, AttemptStatus::Submitted);
    assert_eq!(submitted.total_score, 2.0);
    assert_eq!(
        submitted.answer("essay").unwrap().outcome,
        GradingOutcome::Pending
    );

    let queue = engine
        .list_attempts("B", Some(AttemptStatus::Submitted))
        .await
        .unwrap();
    assert_eq!(queue.len(), 1);

    let evaluated = engine
        .evaluate_attempt(attempt.id, essay_grading(4.0))
        .await
        .unwrap();
    assert_eq!(evaluated.status, AttemptStatus::Evaluated);
    assert_eq!(evaluated.total_score, 6.0);
    assert_eq!(evaluated.feedback.as_deref(), Some("Good work"));
    assert_eq!(evaluated.grader_id.as_deref(), Some("grader-1"));
    let essay = evaluated.answer("essay").unwrap();
    assert_eq!(essay.outcome, GradingOutcome::Graded);
    assert_eq!(essay.comment.as_deref(), Some("clear structure"));

    assert_eq!(
        rx.recv().await,
        Some(AttemptEvent::Submitted {
            attempt_id: attempt.id
        })
    );
    assert_eq!(
        rx.recv().await,
        Some(AttemptEvent::Evaluated {
            attempt_id: attempt.id,
            total_score: 6.0
        })
    );
}

async fn out_of_range_marks_leave_attempt_unchanged(store: Arc<dyn AttemptStore>) {
    let h = harness(store, vec![assessment_b()]);
    let attempt = h.engine.start_attempt("B", "S").await.unwrap();
    let submitted = h.engine.submit_attempt(attempt.id).await.unwrap();

    let err = h
        .engine
        .evaluate_attempt(attempt.id, essay_grading(7.0))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::MarksOutOfRange { .. }));
    assert_eq!(err.kind(), ErrorKind::Validation);

    let stored = h.engine.get_attempt(attempt.id).await.unwrap();
    assert_eq!(stored, submitted);
}

async fn second_start_returns_existing_id(store: Arc<dyn AttemptStore>) {
    let h = harness(store, vec![assessment_a()]);
    let first = h.engine.start_attempt("A", "S").await.unwrap();

    let err = h.engine.start_attempt("A", "S").await.unwrap_err();
    assert_eq!(err.existing_attempt(), Some(first.id));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let found = h.engine.find_attempt("A", "S").await.unwrap();
    assert_eq!(found.id, first.id);
}

async fn concurrent_starts_converge(store: Arc<dyn AttemptStore>) {
    let h = harness(store, vec![assessment_a()]);

    let tasks = (0..16).map(|_| {
        let engine = h.engine.clone();
        tokio::spawn(async move { engine.start_attempt("A", "S").await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    let winner = winners[0].id;

    for result in &results {
        match result {
            Ok(attempt) => assert_eq!(attempt.id, winner),
            Err(e) => assert_eq!(e.existing_attempt(), Some(winner)),
        }
    }
    assert_eq!(h.engine.list_attempts("A", None).await.unwrap().len(), 1);
}

async fn save_racing_submit_is_all_or_nothing(store: Arc<dyn AttemptStore>) {
    let h = harness(store, vec![assessment_a()]);

    for student in 0..8 {
        let student = format!("s{student}");
        let attempt = h.engine.start_attempt("A", &student).await.unwrap();

        let saver = {
            let engine = h.engine.clone();
            tokio::spawn(async move {
                engine
                    .save_answer(attempt.id, "q1", AnswerValue::Scalar("a".into()))
                    .await
            })
        };
        let submitter = {
            let engine = h.engine.clone();
            tokio::spawn(async move { engine.submit_attempt(attempt.id).await })
        };

        let saved = saver.await.unwrap();
        submitter.await.unwrap().unwrap();

        let stored = h.engine.get_attempt(attempt.id).await.unwrap();
        assert_eq!(stored.status, AttemptStatus::Evaluated);
        assert!(stored.is_score_consistent());
        match saved {
            // The save landed before the freeze, so it was graded.
            Ok(_) => {
                let q1 = stored.answer("q1").unwrap();
                assert_eq!(q1.outcome, GradingOutcome::Correct);
                assert_eq!(stored.total_score, 2.0);
            }
            Err(e) => {
                assert!(matches!(
                    e,
                    EngineError::NotMutable {
                        reason: FrozenReason::Status(_),
                        ..
                    } | EngineError::AlreadySubmitted(_)
                ));
                assert!(stored.answer("q1").unwrap().value.is_none());
                assert_eq!(stored.total_score, 0.0);
            }
        }
    }
}

async fn shortcut_never_exposes_submitted(store: Arc<dyn AttemptStore>) {
    let h = harness(store, vec![assessment_a()]);
    let attempt = h.engine.start_attempt("A", "S").await.unwrap();

    let reader = {
        let engine = h.engine.clone();
        tokio::spawn(async move {
            let mut seen = Vec::new();
            loop {
                let status = engine.get_attempt(attempt.id).await.unwrap().status;
                seen.push(status);
                if status == AttemptStatus::Evaluated {
                    return seen;
                }
                tokio::task::yield_now().await;
            }
        })
    };
    h.engine.submit_attempt(attempt.id).await.unwrap();

    let seen = reader.await.unwrap();
    assert!(!seen.contains(&AttemptStatus::Submitted));
}

async fn window_is_inclusive_at_both_ends(store: Arc<dyn AttemptStore>) {
    let h = harness(store, vec![assessment_a()]);

    h.clock.set(t() - Duration::seconds(1));
    let err = h.engine.start_attempt("A", "early").await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::AccessDenied(DenyReason::BeforeWindow)
    ));

    h.clock.set(t());
    h.engine.start_attempt("A", "on-time").await.unwrap();

    h.clock.set(t() + Duration::seconds(3600));
    h.engine.start_attempt("A", "last-second").await.unwrap();

    h.clock.set(t() + Duration::seconds(3601));
    let err = h.engine.start_attempt("A", "late").await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::AccessDenied(DenyReason::AfterWindow)
    ));
    assert_eq!(err.kind(), ErrorKind::AccessDenied);
}

async fn closed_window_freezes_answers(store: Arc<dyn AttemptStore>) {
    let mut def = assessment_a();
    def.time_limit_secs = Some(60);
    let h = harness(store, vec![def]);

    let attempt = h.engine.start_attempt("A", "S").await.unwrap();
    h.clock.advance(Duration::seconds(61));

    let err = h
        .engine
        .save_answer(attempt.id, "q1", AnswerValue::Scalar("a".into()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::NotMutable {
            reason: FrozenReason::WindowClosed,
            ..
        }
    ));
    assert_eq!(err.code(), "window_closed");

    let err = h.engine.submit_attempt(attempt.id).await.unwrap_err();
    assert_eq!(err.code(), "window_closed");

    let stored = h.engine.get_attempt(attempt.id).await.unwrap();
    assert_eq!(stored.status, AttemptStatus::InProgress);
}

async fn status_never_moves_backward(store: Arc<dyn AttemptStore>) {
    let h = harness(store, vec![assessment_b()]);
    let attempt = h.engine.start_attempt("B", "S").await.unwrap();

    let err = h
        .engine
        .evaluate_attempt(attempt.id, essay_grading(3.0))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotSubmitted(_)));

    h.engine.submit_attempt(attempt.id).await.unwrap();
    let err = h.engine.submit_attempt(attempt.id).await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadySubmitted(_)));

    let err = h
        .engine
        .save_answer(attempt.id, "q1", AnswerValue::Scalar("a".into()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let evaluated = h
        .engine
        .evaluate_attempt(attempt.id, essay_grading(3.0))
        .await
        .unwrap();

    // Identical re-evaluation is a no-op; a different one conflicts.
    let again = h
        .engine
        .evaluate_attempt(attempt.id, essay_grading(3.0))
        .await
        .unwrap();
    assert_eq!(again, evaluated);

    let err = h
        .engine
        .evaluate_attempt(attempt.id, essay_grading(5.0))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::EvaluationConflict(_)));
    assert_eq!(h.engine.get_attempt(attempt.id).await.unwrap(), evaluated);
}

async fn assigned_assessment_rejects_outsiders(store: Arc<dyn AttemptStore>) {
    let mut def = assessment_a();
    def.access = AccessPolicy::Assigned {
        students: ["alice".to_string()].into(),
    };
    let h = harness(store, vec![def]);

    h.engine.start_attempt("A", "alice").await.unwrap();
    let err = h.engine.start_attempt("A", "mallory").await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::AccessDenied(DenyReason::NotPermitted)
    ));

    let attempt = h.engine.find_attempt("A", "alice").await.unwrap();
    h.engine.check_owner(attempt.id, "alice").await.unwrap();
    let err = h.engine.check_owner(attempt.id, "mallory").await.unwrap_err();
    assert!(matches!(err, EngineError::AccessDenied(DenyReason::NotOwner)));
}

async fn republished_definition_blocks_submit(store: Arc<dyn AttemptStore>) {
    let catalog = Arc::new(RepublishingCatalog::default());
    catalog.publish(assessment_a());
    let engine = AttemptEngine::new(catalog.clone(), store, EngineConfig::default())
        .with_clock(Arc::new(ManualClock::new(t() + Duration::seconds(10))));

    let attempt = engine.start_attempt("A", "S").await.unwrap();
    let mut v2 = assessment_a();
    v2.version = 2;
    catalog.publish(v2);

    let err = engine.submit_attempt(attempt.id).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::DefinitionChanged {
            bound: 1,
            current: 2,
            ..
        }
    ));
    assert_eq!(
        engine.get_attempt(attempt.id).await.unwrap().status,
        AttemptStatus::InProgress
    );
}

async fn unknown_ids_are_not_found(store: Arc<dyn AttemptStore>) {
    let h = harness(store, vec![assessment_a()]);

    let err = h.engine.start_attempt("nope", "S").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = h.engine.get_attempt(uuid::Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, EngineError::AttemptNotFound(_)));

    let err = h.engine.list_attempts("nope", None).await.unwrap_err();
    assert!(matches!(err, EngineError::AssessmentNotFound(_)));

    let attempt = h.engine.start_attempt("A", "S").await.unwrap();
    let err = h
        .engine
        .save_answer(attempt.id, "q9", AnswerValue::Scalar("a".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownQuestion(_)));
}

async fn oversized_answer_is_rejected(store: Arc<dyn AttemptStore>) {
    let h = harness(store, vec![assessment_b()]);
    let attempt = h.engine.start_attempt("B", "S").await.unwrap();

    let huge = "x".repeat(h.engine.config().max_answer_bytes + 1);
    let err = h
        .engine
        .save_answer(attempt.id, "essay", AnswerValue::FreeText(huge))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::PayloadTooLarge {
            field: "answer",
            ..
        }
    ));
}

async fn concurrent_saves_to_distinct_questions_all_land(store: Arc<dyn AttemptStore>) {
    let questions = (0..20)
        .map(|i| objective(&format!("q{i}"), 1.0, &format!("a{i}")))
        .collect();
    let h = harness(store, vec![assessment("wide", questions)]);
    let attempt = h.engine.start_attempt("wide", "S").await.unwrap();
    let attempt_id = attempt.id;

    let saves = (0..20).map(|i| {
        let engine = h.engine.clone();
        tokio::spawn(async move {
            engine
                .save_answer(
                    attempt_id,
                    &format!("q{i}"),
                    AnswerValue::Scalar(format!("a{i}")),
                )
                .await
        })
    });
    for saved in join_all(saves).await {
        saved.unwrap().unwrap();
    }

    let stored = h.engine.get_attempt(attempt.id).await.unwrap();
    for (i, answer) in stored.answers.iter().enumerate() {
        assert_eq!(answer.question_id, format!("q{i}"));
        assert_eq!(answer.value, Some(AnswerValue::Scalar(format!("a{i}"))));
    }

    let submitted = h.engine.submit_attempt(attempt.id).await.unwrap();
    assert_eq!(submitted.status, AttemptStatus::Evaluated);
    assert_eq!(submitted.total_score, 20.0);
    assert!(submitted.is_score_consistent());
}

async fn racing_saves_to_one_question_keep_one_value(store: Arc<dyn AttemptStore>) {
    let h = harness(store, vec![assessment_a()]);

    for student in 0..8 {
        let attempt = h
            .engine
            .start_attempt("A", &format!("s{student}"))
            .await
            .unwrap();
        let attempt_id = attempt.id;

        let saves = ["a", "wrong"].map(|value| {
            let engine = h.engine.clone();
            tokio::spawn(async move {
                engine
                    .save_answer(attempt_id, "q1", AnswerValue::Scalar(value.into()))
                    .await
            })
        });
        for saved in join_all(saves).await {
            saved.unwrap().unwrap();
        }

        let stored = h.engine.get_attempt(attempt.id).await.unwrap();
        let value = stored.answer("q1").unwrap().value.clone();
        assert!(
            value == Some(AnswerValue::Scalar("a".into()))
                || value == Some(AnswerValue::Scalar("wrong".into())),
            "unexpected stored value {value:?}"
        );

        let submitted = h.engine.submit_attempt(attempt.id).await.unwrap();
        let expected = if value == Some(AnswerValue::Scalar("a".into())) {
            2.0
        } else {
            0.0
        };
        assert_eq!(submitted.total_score, expected);
        assert!(submitted.is_score_consistent());
    }
}

async fn malformed_definition_is_never_served(store: Arc<dyn AttemptStore>) {
    let dir = tempfile::tempdir().unwrap();
    let header = |id: &str| {
        format!(
            "[assessment]\nid = \"{id}\"\ntitle = \"{id}\"\n\
             starts_at = \"2026-06-01T09:00:00Z\"\nends_at = \"2026-06-01T10:00:00Z\"\n"
        )
    };
    std::fs::write(
        dir.path().join("bad.toml"),
        format!(
            "{}\n[[questions]]\nid = \"q1\"\nkind = \"objective\"\nmax_marks = -2\n\
             answer = {{ type = \"scalar\", value = \"a\" }}\n\n\
             [[questions]]\nid = \"essay\"\nkind = \"subjective\"\nmax_marks = nan\n",
            header("bad")
        ),
    )
    .unwrap();
    std::fs::write(
        dir.path().join("good.toml"),
        format!(
            "{}\n[[questions]]\nid = \"q1\"\nkind = \"objective\"\nmax_marks = 2\n\
             answer = {{ type = \"scalar\", value = \"a\" }}\n",
            header("good")
        ),
    )
    .unwrap();

    let engine = AttemptEngine::new(
        Arc::new(StaticCatalog::from_directory(dir.path()).unwrap()),
        store,
        EngineConfig::default(),
    )
    .with_clock(Arc::new(ManualClock::new(t() + Duration::seconds(10))));

    let err = engine.start_attempt("bad", "S").await.unwrap_err();
    assert!(matches!(err, EngineError::AssessmentNotFound(_)));

    let attempt = engine.start_attempt("good", "S").await.unwrap();
    engine
        .save_answer(attempt.id, "q1", AnswerValue::Scalar("a".into()))
        .await
        .unwrap();
    let submitted = engine.submit_attempt(attempt.id).await.unwrap();
    assert_eq!(submitted.total_score, 2.0);
    assert!(submitted
        .answers
        .iter()
        .all(|a| a.marks_awarded >= 0.0 && a.marks_awarded <= 2.0));
}

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

macro_rules! on_every_store {
    ($($scenario:ident),* $(,)?) => {
        mod memory {
            $(
                #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
                async fn $scenario() {
                    super::$scenario(super::memory_store()).await;
                }
            )*
        }

        mod sqlite {
            $(
                #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
                async fn $scenario() {
                    super::$scenario(super::sqlite_store()).await;
                }
            )*
        }
    };
}

on_every_store!(
    all_objective_submit_is_evaluated_immediately,
    mixed_assessment_waits_for_grader,
    out_of_range_marks_leave_attempt_unchanged,
    second_start_returns_existing_id,
    concurrent_starts_converge,
    save_racing_submit_is_all_or_nothing,
    shortcut_never_exposes_submitted,
    window_is_inclusive_at_both_ends,
    closed_window_freezes_answers,
    status_never_moves_backward,
    assigned_assessment_rejects_outsiders,
    republished_definition_blocks_submit,
    unknown_ids_are_not_found,
    oversized_answer_is_rejected,
    concurrent_saves_to_distinct_questions_all_land,
    racing_saves_to_one_question_keep_one_value,
    malformed_definition_is_never_served,
);
