mod common;

use std::{sync::Arc, time::Duration};

use common::{Cell, RecordingBackend, bob_profile, csv_upload, xlsx_upload};
use sheet_onboard::{
    error::{ParseError, PlanError, SessionError},
    infer::{ColumnOverride, StorageType},
    payload::{CellValue, TableColumn, TableCreationPayload},
    reconcile::DuplicateKind,
    session::{IngestionSession, OnboardingOptions, StageOutcome, Step},
};

const SCORES: &str = "age,active\n10,yes\n20,no\n";

fn session_with(backend: &Arc<RecordingBackend>, options: OnboardingOptions) -> IngestionSession {
    IngestionSession::new(backend.clone(), backend.clone(), options)
}

fn new_session(backend: &Arc<RecordingBackend>) -> IngestionSession {
    session_with(backend, OnboardingOptions::default())
}

async fn on_second_step(backend: &Arc<RecordingBackend>) -> IngestionSession {
    let mut session = new_session(backend);
    session.submit_profile(&bob_profile()).await.unwrap();
    session.stage_upload(&csv_upload("scores.csv", SCORES)).unwrap();
    session.complete_first_upload().await.unwrap();
    session
}

#[tokio::test]
async fn bob_onboards_a_scores_table() {
    let backend = Arc::new(RecordingBackend::new());
    let mut session = new_session(&backend);

    session.submit_profile(&bob_profile()).await.unwrap();
    assert_eq!(backend.registrations().len(), 1);
    assert_eq!(backend.registrations()[0].email, "bob@x.com");
    assert_eq!(session.step(), Step::FirstUpload);
    assert_eq!(session.step().index(), 1);
    assert!(!session.actions().next);

    let outcome = session.stage_upload(&csv_upload("scores.csv", SCORES)).unwrap();
    assert_eq!(outcome, StageOutcome::Staged { columns: 2, rows: 2 });
    let created = session.complete_first_upload().await.unwrap();
    assert_eq!(created.as_deref(), Some("bob_scores"));

    assert_eq!(
        backend.payloads(),
        vec![TableCreationPayload {
            table_name: "bob_scores".into(),
            columns: vec![
                TableColumn {
                    name: "age".into(),
                    storage_type: StorageType::Numeric,
                },
                TableColumn {
                    name: "active".into(),
                    storage_type: StorageType::Boolean,
                },
            ],
            rows: vec![
                vec![CellValue::Number(10.0), CellValue::Text("yes".into())],
                vec![CellValue::Number(20.0), CellValue::Text("no".into())],
            ],
        }]
    );
    assert_eq!(session.step(), Step::SecondUpload);
    assert_eq!(session.first_capture().unwrap().header, vec!["age", "active"]);
}

#[tokio::test]
async fn duplicate_second_upload_blocks_completion_until_replaced() {
    let backend = Arc::new(RecordingBackend::new());
    let mut session = on_second_step(&backend).await;

    let outcome = session.stage_upload(&csv_upload("scores.csv", SCORES)).unwrap();
    assert_eq!(outcome, StageOutcome::Duplicate(DuplicateKind::Both));
    assert!(!session.actions().complete);
    assert!(session.last_error().is_some());
    let err = session.complete_second_upload().await.unwrap_err();
    assert!(matches!(err, SessionError::Duplicate(DuplicateKind::Both)));
    assert_eq!(backend.payloads().len(), 1);

    let outcome = session
        .stage_upload(&csv_upload("heights.csv", "name,height\nbob,180\n"))
        .unwrap();
    assert!(matches!(outcome, StageOutcome::Staged { .. }));
    assert!(session.actions().complete);
    assert!(session.last_error().is_none());

    let completion = session.complete_second_upload().await.unwrap();
    assert_eq!(completion.dashboard_path, "/dashboard/bob");
    assert_eq!(completion.table.as_deref(), Some("bob_heights_2"));
    assert_eq!(session.step(), Step::Completed);
    assert_eq!(session.created_tables(), ["bob_scores", "bob_heights_2"]);
    assert!(session.first_capture().is_none());
}

#[tokio::test]
async fn matching_rows_alone_count_as_duplicate() {
    let backend = Arc::new(RecordingBackend::new());
    let mut session = on_second_step(&backend).await;
    let outcome = session
        .stage_upload(&csv_upload("renamed.csv", "years,enabled\n10,yes\n20,no\n"))
        .unwrap();
    assert_eq!(outcome, StageOutcome::Duplicate(DuplicateKind::Rows));
    session.clear_upload().unwrap();
    assert!(session.actions().complete);
}

#[tokio::test]
async fn rejected_file_clears_an_earlier_duplicate_message() {
    let backend = Arc::new(RecordingBackend::new());
    let mut session = on_second_step(&backend).await;
    session.stage_upload(&csv_upload("scores.csv", SCORES)).unwrap();
    assert!(session.last_error().is_some());

    let file = sheet_onboard::upload::UploadedFile::new("notes.pdf", "application/pdf", vec![1]);
    assert!(session.stage_upload(&file).is_err());
    assert!(session.duplicate().is_none());
    assert!(session.last_error().is_none());
    assert!(session.actions().complete);
}

#[tokio::test]
async fn prev_returns_to_first_step_without_side_effects() {
    let backend = Arc::new(RecordingBackend::new());
    let mut session = on_second_step(&backend).await;
    assert!(session.actions().prev);
    session
        .stage_upload(&csv_upload("other.csv", "x\n1\n"))
        .unwrap();

    session.prev().unwrap();
    assert_eq!(session.step(), Step::FirstUpload);
    assert!(session.staged().is_none());
    assert_eq!(backend.payloads().len(), 1);
    assert_eq!(backend.registrations().len(), 1);
    assert!(matches!(
        session.prev(),
        Err(SessionError::InvalidTransition {
            step: Step::FirstUpload,
            ..
        })
    ));
}

#[tokio::test]
async fn steps_complete_without_files() {
    let backend = Arc::new(RecordingBackend::new());
    let mut session = new_session(&backend);
    session.submit_profile(&bob_profile()).await.unwrap();
    assert_eq!(session.complete_first_upload().await.unwrap(), None);
    let completion = session.complete_second_upload().await.unwrap();
    assert_eq!(completion.table, None);
    assert_eq!(completion.dashboard_path, "/dashboard/bob");
    assert!(backend.payloads().is_empty());
}

#[tokio::test]
async fn registration_failure_keeps_the_profile_step() {
    let backend = Arc::new(RecordingBackend::new());
    backend.fail_registration(true);
    let mut session = new_session(&backend);

    let err = session.submit_profile(&bob_profile()).await.unwrap_err();
    assert!(matches!(err, SessionError::Remote(_)));
    assert_eq!(session.step(), Step::Profile);
    assert!(session.last_error().is_some());

    backend.fail_registration(false);
    session.submit_profile(&bob_profile()).await.unwrap();
    assert_eq!(session.step(), Step::FirstUpload);
    assert!(session.last_error().is_none());
}

#[tokio::test]
async fn creation_failure_is_observable_and_retryable() {
    let backend = Arc::new(RecordingBackend::new());
    let mut session = new_session(&backend);
    session.submit_profile(&bob_profile()).await.unwrap();
    session.stage_upload(&csv_upload("scores.csv", SCORES)).unwrap();

    backend.fail_creation(true);
    let err = session.complete_first_upload().await.unwrap_err();
    assert!(matches!(err, SessionError::Remote(_)));
    assert_eq!(session.step(), Step::FirstUpload);
    assert!(session.staged().is_some());
    assert!(session.last_error().unwrap().contains("creation rejected"));
    assert!(session.created_tables().is_empty());

    backend.fail_creation(false);
    session.complete_first_upload().await.unwrap();
    assert_eq!(session.step(), Step::SecondUpload);
}

#[tokio::test]
async fn cancelling_an_in_flight_call_leaves_state_unchanged() {
    let backend = Arc::new(RecordingBackend::new());
    let mut session = new_session(&backend);
    session.submit_profile(&bob_profile()).await.unwrap();
    session.stage_upload(&csv_upload("scores.csv", SCORES)).unwrap();
    backend.hang_creation(true);

    let token = session.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });
    let err = session.complete_first_upload().await.unwrap_err();
    assert!(matches!(err, SessionError::Cancelled));
    assert_eq!(session.step(), Step::FirstUpload);
    assert!(session.staged().is_some());
    assert!(session.last_error().is_none());
    assert!(backend.payloads().is_empty());
}

#[tokio::test]
async fn header_only_file_disables_completion() {
    let backend = Arc::new(RecordingBackend::new());
    let mut session = new_session(&backend);
    session.submit_profile(&bob_profile()).await.unwrap();

    let outcome = session.stage_upload(&csv_upload("empty.csv", "age,active\n")).unwrap();
    assert_eq!(outcome, StageOutcome::NoData);
    assert!(!session.actions().complete);
    let err = session.complete_first_upload().await.unwrap_err();
    assert!(matches!(err, SessionError::NoDataRows));
    assert_eq!(session.step(), Step::FirstUpload);
}

#[tokio::test]
async fn unsupported_files_are_rejected_locally() {
    let backend = Arc::new(RecordingBackend::new());
    let mut session = new_session(&backend);
    session.submit_profile(&bob_profile()).await.unwrap();
    let file = sheet_onboard::upload::UploadedFile::new("notes.pdf", "application/pdf", vec![1, 2]);
    let err = session.stage_upload(&file).unwrap_err();
    assert!(matches!(
        err,
        SessionError::Parse(ParseError::UnsupportedFormat { .. })
    ));
    assert!(session.staged().is_none());
}

#[tokio::test]
async fn column_overrides_shape_the_payload() {
    let backend = Arc::new(RecordingBackend::new());
    let mut session = new_session(&backend);
    session.submit_profile(&bob_profile()).await.unwrap();
    session.stage_upload(&csv_upload("scores.csv", SCORES)).unwrap();

    session
        .override_column(&ColumnOverride::Exclude("active".into()))
        .unwrap();
    session
        .override_column(&ColumnOverride::StorageType("age".into(), StorageType::Real))
        .unwrap();
    let err = session
        .override_column(&ColumnOverride::Include("missing".into()))
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Plan(PlanError::UnknownColumn { .. })
    ));

    session.complete_first_upload().await.unwrap();
    let payload = &backend.payloads()[0];
    assert_eq!(payload.columns.len(), 1);
    assert_eq!(payload.columns[0].storage_type, StorageType::Real);
    assert_eq!(payload.rows[1], vec![CellValue::Number(20.0)]);
}

#[tokio::test]
async fn spreadsheet_uploads_follow_the_same_pipeline() {
    let backend = Arc::new(RecordingBackend::new());
    let mut session = new_session(&backend);
    session.submit_profile(&bob_profile()).await.unwrap();
    let workbook = xlsx_upload(
        "roster.xlsx",
        &[
            vec![Cell::Text("name"), Cell::Text("score"), Cell::Text("member")],
            vec![Cell::Text("amy"), Cell::Number(9.5), Cell::Bool(true)],
            vec![Cell::Blank, Cell::Blank, Cell::Blank],
            vec![Cell::Text("cy"), Cell::Number(7.0), Cell::Bool(false)],
        ],
    );
    let outcome = session.stage_upload(&workbook).unwrap();
    assert_eq!(outcome, StageOutcome::Staged { columns: 3, rows: 2 });
    session.complete_first_upload().await.unwrap();

    let payload = &backend.payloads()[0];
    assert_eq!(payload.table_name, "bob_roster");
    let types = payload
        .columns
        .iter()
        .map(|c| c.storage_type)
        .collect::<Vec<_>>();
    assert_eq!(
        types,
        vec![StorageType::Varchar, StorageType::Real, StorageType::Boolean]
    );
    assert_eq!(payload.rows[1][1], CellValue::Number(7.0));
}

#[tokio::test]
async fn table_names_are_sanitized_unless_disabled() {
    let backend = Arc::new(RecordingBackend::new());
    let mut session = new_session(&backend);
    session.submit_profile(&bob_profile()).await.unwrap();
    session
        .stage_upload(&csv_upload("Sales Report.csv", SCORES))
        .unwrap();
    assert_eq!(
        session.complete_first_upload().await.unwrap().as_deref(),
        Some("bob_Sales_Report")
    );

    let raw = Arc::new(RecordingBackend::new());
    let mut session = session_with(
        &raw,
        OnboardingOptions {
            sanitize_identifiers: false,
            ..OnboardingOptions::default()
        },
    );
    session.submit_profile(&bob_profile()).await.unwrap();
    session
        .stage_upload(&csv_upload("Sales Report.csv", SCORES))
        .unwrap();
    assert_eq!(
        session.complete_first_upload().await.unwrap().as_deref(),
        Some("bob_Sales Report")
    );
}

#[tokio::test]
async fn out_of_order_actions_are_rejected() {
    let backend = Arc::new(RecordingBackend::new());
    let mut session = new_session(&backend);
    assert!(matches!(
        session.complete_first_upload().await,
        Err(SessionError::InvalidTransition {
            step: Step::Profile,
            ..
        })
    ));
    session.submit_profile(&bob_profile()).await.unwrap();
    assert!(matches!(
        session.submit_profile(&bob_profile()).await,
        Err(SessionError::InvalidTransition { .. })
    ));
    assert!(matches!(
        session.complete_second_upload().await,
        Err(SessionError::InvalidTransition {
            step: Step::FirstUpload,
            ..
        })
    ));
    assert_eq!(backend.registrations().len(), 1);
}
