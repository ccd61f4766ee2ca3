//! The onboarding state machine.
//!
//! A session walks `Profile -> FirstUpload -> SecondUpload -> Completed`.
//! Each upload step stages at most one file; completing a step with a staged
//! file sends a table-creation payload to the collaborator, and only an
//! acknowledged call moves the session forward. `prev` steps back from the
//! second upload without any collaborator traffic.
//!
//! Every collaborator call races the session's cancellation token. Dropping
//! or abandoning the session cancels it, and a cancelled call leaves the
//! session exactly as it was before the call.

use std::{fmt, future::Future, sync::Arc};

use log::{debug, info, warn};
use tokio::sync::watch;
use uuid::Uuid;

use crate::{
    error::{SessionError, StoreError},
    infer::ColumnOverride,
    naming::{derive_table_name, sanitize_identifier},
    payload::{TableCreationPayload, build_payload},
    profile::{ProfileForm, RegistrationRecord},
    reconcile::{DuplicateKind, reconcile_sheets},
    sheet::{ParseOptions, ParsedSheet},
    store::{TableCreator, UserRegistry},
    upload::{StagedUpload, UploadedFile, stage_file},
};

pub const DEFAULT_SECOND_TABLE_SUFFIX: &str = "2";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Profile,
    FirstUpload,
    SecondUpload,
    Completed,
}

impl Step {
    pub fn index(&self) -> usize {
        match self {
            Step::Profile => 0,
            Step::FirstUpload => 1,
            Step::SecondUpload => 2,
            Step::Completed => 3,
        }
    }

    pub fn is_upload(&self) -> bool {
        matches!(self, Step::FirstUpload | Step::SecondUpload)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Step::Profile => "profile",
            Step::FirstUpload => "first upload",
            Step::SecondUpload => "second upload",
            Step::Completed => "completed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
pub struct OnboardingOptions {
    pub parse: ParseOptions,
    /// Map derived table names onto `[A-Za-z0-9_]`.
    pub sanitize_identifiers: bool,
    pub second_table_suffix: String,
}

impl Default for OnboardingOptions {
    fn default() -> Self {
        Self {
            parse: ParseOptions::default(),
            sanitize_identifiers: true,
            second_table_suffix: DEFAULT_SECOND_TABLE_SUFFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
enum UploadSlot {
    Vacant,
    NoData { file_name: String },
    Staged(Box<StagedUpload>),
}

/// Result of staging a file on an upload step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Staged { columns: usize, rows: usize },
    /// The file parsed but holds no data rows; completion stays disabled.
    NoData,
    /// The file duplicates the first upload; completion stays disabled.
    Duplicate(DuplicateKind),
}

/// Controls the caller may offer on the current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepActions {
    /// The step's own completion control (profile submit, upload done).
    pub complete: bool,
    /// A generic stepper "Next". Upload steps own their completion control,
    /// so this is never offered there.
    pub next: bool,
    pub prev: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub dashboard_path: String,
    /// Table created by the second upload, if a file was submitted.
    pub table: Option<String>,
}

pub fn dashboard_path(user: &str) -> String {
    format!("/dashboard/{user}")
}

/// Cloneable cancellation flag shared by a session and its observers. Once
/// set it stays set.
#[derive(Debug, Clone)]
pub struct CancelToken {
    flag: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self {
            flag: Arc::new(flag),
        }
    }

    pub fn cancel(&self) {
        self.flag.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.flag.borrow()
    }

    async fn cancelled(&self) {
        let mut rx = self.flag.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Runs a collaborator call unless the token fires first.
async fn guarded<T, F>(token: &CancelToken, call: F) -> Result<T, SessionError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(SessionError::Cancelled),
        result = call => result.map_err(SessionError::from),
    }
}

pub struct IngestionSession {
    id: Uuid,
    options: OnboardingOptions,
    registry: Arc<dyn UserRegistry>,
    creator: Arc<dyn TableCreator>,
    step: Step,
    user: Option<RegistrationRecord>,
    upload: UploadSlot,
    duplicate: Option<DuplicateKind>,
    first_capture: Option<ParsedSheet>,
    created_tables: Vec<String>,
    last_error: Option<String>,
    cancel: CancelToken,
}

impl fmt::Debug for IngestionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionSession")
            .field("id", &self.id)
            .field("step", &self.step)
            .field("user", &self.user_identifier())
            .field("created_tables", &self.created_tables)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

impl IngestionSession {
    pub fn new(
        registry: Arc<dyn UserRegistry>,
        creator: Arc<dyn TableCreator>,
        options: OnboardingOptions,
    ) -> Self {
        let id = Uuid::new_v4();
        debug!("[{id}] Onboarding session started");
        Self {
            id,
            options,
            registry,
            creator,
            step: Step::Profile,
            user: None,
            upload: UploadSlot::Vacant,
            duplicate: None,
            first_capture: None,
            created_tables: Vec::new(),
            last_error: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn user(&self) -> Option<&RegistrationRecord> {
        self.user.as_ref()
    }

    pub fn user_identifier(&self) -> Option<&str> {
        self.user.as_ref().map(RegistrationRecord::user_identifier)
    }

    pub fn staged(&self) -> Option<&StagedUpload> {
        match &self.upload {
            UploadSlot::Staged(staged) => Some(&**staged),
            _ => None,
        }
    }

    pub fn duplicate(&self) -> Option<DuplicateKind> {
        self.duplicate
    }

    /// Sheet captured when the first upload was acknowledged.
    pub fn first_capture(&self) -> Option<&ParsedSheet> {
        self.first_capture.as_ref()
    }

    /// Tables the collaborator acknowledged during this session, in order.
    pub fn created_tables(&self) -> &[String] {
        &self.created_tables
    }

    /// Most recent collaborator or duplicate error still in effect.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn cancellation_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn actions(&self) -> StepActions {
        match self.step {
            Step::Profile => StepActions {
                complete: true,
                next: true,
                prev: false,
            },
            Step::FirstUpload => StepActions {
                complete: !matches!(self.upload, UploadSlot::NoData { .. }),
                next: false,
                prev: false,
            },
            Step::SecondUpload => StepActions {
                complete: !matches!(self.upload, UploadSlot::NoData { .. })
                    && self.duplicate.is_none(),
                next: false,
                prev: true,
            },
            Step::Completed => StepActions::default(),
        }
    }

    fn require(&self, allowed: &[Step], action: &'static str) -> Result<(), SessionError> {
        if allowed.contains(&self.step) {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                step: self.step,
                action,
            })
        }
    }

    fn advance(&mut self, next: Step) {
        info!("[{}] Step {} -> {}", self.id, self.step, next);
        self.step = next;
        self.upload = UploadSlot::Vacant;
        self.duplicate = None;
    }

    fn record_remote_failure(&mut self, err: SessionError) -> SessionError {
        match &err {
            SessionError::Cancelled => {
                warn!("[{}] Collaborator call cancelled on the {} step", self.id, self.step)
            }
            other => {
                warn!("[{}] Collaborator call failed: {other}", self.id);
                self.last_error = Some(other.to_string());
            }
        }
        err
    }

    /// Validates and registers the profile. A registration failure keeps the
    /// session on the profile step.
    pub async fn submit_profile(&mut self, form: &ProfileForm) -> Result<(), SessionError> {
        self.require(&[Step::Profile], "submit the profile")?;
        let record = form.validate()?;
        let registry = Arc::clone(&self.registry);
        let token = self.cancel.clone();
        if let Err(err) = guarded(&token, registry.register(&record)).await {
            return Err(self.record_remote_failure(err));
        }
        info!("[{}] Registered profile for '{}'", self.id, record.first_name);
        self.user = Some(record);
        self.last_error = None;
        self.advance(Step::FirstUpload);
        Ok(())
    }

    /// Parses and infers a file for the current upload step, replacing any
    /// previously staged file. On the second step the result is reconciled
    /// against the first upload.
    pub fn stage_upload(&mut self, file: &UploadedFile) -> Result<StageOutcome, SessionError> {
        self.require(&[Step::FirstUpload, Step::SecondUpload], "upload a file")?;
        self.upload = UploadSlot::Vacant;
        self.duplicate = None;
        self.last_error = None;
        let staged = match stage_file(file, &self.options.parse) {
            Ok(Some(staged)) => staged,
            Ok(None) => {
                self.upload = UploadSlot::NoData {
                    file_name: file.file_name.clone(),
                };
                return Ok(StageOutcome::NoData);
            }
            Err(err) => {
                warn!("[{}] Rejected upload '{}': {err}", self.id, file.file_name);
                return Err(err.into());
            }
        };

        let verdict = match (&self.step, &self.first_capture) {
            (Step::SecondUpload, Some(prior)) => reconcile_sheets(&staged.sheet, prior),
            _ => None,
        };
        let outcome = match verdict {
            Some(kind) => {
                info!("[{}] '{}' duplicates the first upload ({kind:?})", self.id, file.file_name);
                self.last_error = Some(kind.to_string());
                StageOutcome::Duplicate(kind)
            }
            None => StageOutcome::Staged {
                columns: staged.sheet.width(),
                rows: staged.sheet.rows.len(),
            },
        };
        self.duplicate = verdict;
        self.upload = UploadSlot::Staged(Box::new(staged));
        Ok(outcome)
    }

    /// Removes the staged file and any duplicate error it caused.
    pub fn clear_upload(&mut self) -> Result<(), SessionError> {
        self.require(&[Step::FirstUpload, Step::SecondUpload], "clear the upload")?;
        self.upload = UploadSlot::Vacant;
        self.duplicate = None;
        self.last_error = None;
        Ok(())
    }

    pub fn override_column(&mut self, adjustment: &ColumnOverride) -> Result<(), SessionError> {
        self.require(&[Step::FirstUpload, Step::SecondUpload], "change a column")?;
        match &mut self.upload {
            UploadSlot::Staged(staged) => {
                staged.plan.apply(adjustment)?;
                debug!("[{}] Applied {adjustment:?}", self.id);
                Ok(())
            }
            _ => Err(SessionError::InvalidTransition {
                step: self.step,
                action: "change a column without a staged file",
            }),
        }
    }

    fn table_name(&self, user: &str, file_name: &str, disambiguator: Option<&str>) -> String {
        let name = derive_table_name(user, file_name, disambiguator);
        if self.options.sanitize_identifiers {
            sanitize_identifier(&name)
        } else {
            name
        }
    }

    fn staged_payload(
        &self,
        disambiguator: Option<&str>,
    ) -> Result<Option<TableCreationPayload>, SessionError> {
        let user = self.user_identifier().unwrap_or_default();
        match &self.upload {
            UploadSlot::Vacant => Ok(None),
            UploadSlot::NoData { file_name } => {
                debug!("[{}] '{file_name}' has no data rows", self.id);
                Err(SessionError::NoDataRows)
            }
            UploadSlot::Staged(staged) => {
                let name = self.table_name(user, &staged.file_name, disambiguator);
                Ok(Some(build_payload(&name, &staged.sheet, &staged.plan)?))
            }
        }
    }

    async fn submit(&mut self, payload: &TableCreationPayload) -> Result<(), SessionError> {
        let creator = Arc::clone(&self.creator);
        let token = self.cancel.clone();
        info!(
            "[{}] Creating table '{}' ({} column(s), {} row(s))",
            self.id,
            payload.table_name,
            payload.columns.len(),
            payload.rows.len()
        );
        match guarded(&token, creator.create_table(payload)).await {
            Ok(()) => {
                self.created_tables.push(payload.table_name.clone());
                self.last_error = None;
                Ok(())
            }
            Err(err) => Err(self.record_remote_failure(err)),
        }
    }

    /// Completes the first upload step. Returns the created table name, or
    /// `None` when the step was completed without a file.
    pub async fn complete_first_upload(&mut self) -> Result<Option<String>, SessionError> {
        self.require(&[Step::FirstUpload], "complete the first upload")?;
        let Some(payload) = self.staged_payload(None)? else {
            info!("[{}] First upload skipped", self.id);
            self.advance(Step::SecondUpload);
            return Ok(None);
        };
        self.submit(&payload).await?;
        if let UploadSlot::Staged(staged) =
            std::mem::replace(&mut self.upload, UploadSlot::Vacant)
        {
            self.first_capture = Some(staged.sheet);
        }
        self.advance(Step::SecondUpload);
        Ok(Some(payload.table_name))
    }

    /// Completes onboarding. A staged file is submitted under the second
    /// table suffix unless it duplicates the first upload.
    pub async fn complete_second_upload(&mut self) -> Result<Completion, SessionError> {
        self.require(&[Step::SecondUpload], "complete the second upload")?;
        if let Some(kind) = self.duplicate {
            return Err(SessionError::Duplicate(kind));
        }
        let suffix = self.options.second_table_suffix.clone();
        let table = match self.staged_payload(Some(&suffix))? {
            Some(payload) => {
                self.submit(&payload).await?;
                Some(payload.table_name)
            }
            None => {
                info!("[{}] Second upload skipped", self.id);
                None
            }
        };
        let completion = Completion {
            dashboard_path: dashboard_path(self.user_identifier().unwrap_or_default()),
            table,
        };
        self.first_capture = None;
        self.advance(Step::Completed);
        info!("[{}] Onboarding complete, redirecting to {}", self.id, completion.dashboard_path);
        Ok(completion)
    }

    /// Steps back from the second upload to the first. Nothing is sent.
    pub fn prev(&mut self) -> Result<(), SessionError> {
        self.require(&[Step::SecondUpload], "go back")?;
        self.last_error = None;
        self.advance(Step::FirstUpload);
        Ok(())
    }

    /// Ends the flow early, cancelling any in-flight collaborator call.
    pub fn abandon(self) {
        info!("[{}] Onboarding abandoned on the {} step", self.id, self.step);
    }
}

impl Drop for IngestionSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
