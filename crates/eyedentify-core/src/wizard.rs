//! The four-step enrollment wizard.
//!
//! ```text
//! CollectingData → CapturingPhoto → ScanningIris → Finalizing → Succeeded
//!                                                            ↘ Failed
//! ```
//!
//! All progress lives in an [`EnrollmentDraft`] kept in a [`DraftStore`]
//! under the wizard's session, so a wizard rebuilt for the same session
//! resumes where the previous one stopped. Each step requires every earlier
//! step's section of the draft; entering a step whose prerequisites are
//! missing lands on the earliest incomplete step instead.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{Local, Months, NaiveDate, Utc};
use rand::Rng;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  allocator::IdentifierAllocator,
  audit::{AuditLog, NewOperation, OperationResult, OperationType},
  citizen::{CitizenRecord, NewCitizen, Operator},
  draft::{DraftStore, EnrollmentDraft, PhotoRef, SessionId},
  iris::{IrisCapture, IrisScanner, ScanProgress, random_base36},
  national_id::NationalId,
  normalize::{DEFAULT_AUTHORITY, normalize},
  store::{CitizenStore, ObjectStorage},
  validation::{BiographicData, BiographicForm},
};

pub const PHOTO_BUCKET: &str = "photos-cni";
pub const CARD_SERIES_LEN: usize = 7;
pub const VALIDITY_YEARS: u32 = 10;

// ─── States ──────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  strum::Display,
  strum::EnumIter,
)]
pub enum WizardStep {
  #[strum(to_string = "personal data")]
  CollectingData,
  #[strum(to_string = "photo")]
  CapturingPhoto,
  #[strum(to_string = "iris scan")]
  ScanningIris,
  #[strum(to_string = "confirmation")]
  Finalizing,
}

impl WizardStep {
  /// 1-based position shown to the operator.
  pub fn number(self) -> usize { self as usize + 1 }

  /// The earliest step whose draft section is missing.
  pub fn earliest_incomplete(draft: Option<&EnrollmentDraft>) -> Self {
    match draft {
      None => Self::CollectingData,
      Some(d) if d.biographic.is_none() => Self::CollectingData,
      Some(d) if d.photo.is_none() => Self::CapturingPhoto,
      Some(d) if d.iris.is_none() => Self::ScanningIris,
      Some(_) => Self::Finalizing,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnrollmentState {
  Active(WizardStep),
  Succeeded {
    national_id: NationalId,
    record:      Box<CitizenRecord>,
  },
  Failed {
    message: String,
  },
}

impl EnrollmentState {
  pub fn step(&self) -> Option<WizardStep> {
    match self {
      Self::Active(step) => Some(*step),
      _ => None,
    }
  }

  pub fn is_terminal(&self) -> bool { self.step().is_none() }
}

// ─── Document fields ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EnrollmentConfig {
  pub authority:      String,
  pub validity_years: u32,
  pub photo_bucket:   String,
  /// Audit label used when the enrolling operator could not be resolved.
  pub operator_label: String,
}

impl Default for EnrollmentConfig {
  fn default() -> Self {
    Self {
      authority:      DEFAULT_AUTHORITY.to_owned(),
      validity_years: VALIDITY_YEARS,
      photo_bucket:   PHOTO_BUCKET.to_owned(),
      operator_label: "Unknown operator".to_owned(),
    }
  }
}

/// `issue` plus whole calendar years. A 29 February issue date expires on
/// 28 February.
pub fn expiration_date(issue: NaiveDate, years: u32) -> NaiveDate {
  issue
    .checked_add_months(Months::new(years.saturating_mul(12)))
    .unwrap_or(NaiveDate::MAX)
}

/// A random uppercase alphanumeric card series.
pub fn card_series<R: Rng + ?Sized>(rng: &mut R) -> String {
  random_base36(rng, CARD_SERIES_LEN)
}

fn photo_extension(content_type: &str) -> &'static str {
  match content_type {
    "image/png" => "png",
    "image/webp" => "webp",
    _ => "jpg",
  }
}

// ─── Wizard ──────────────────────────────────────────────────────────────────

pub struct EnrollmentWizard<S, B, D> {
  store:     Arc<S>,
  storage:   Arc<B>,
  drafts:    Arc<D>,
  audit:     Arc<AuditLog>,
  allocator: IdentifierAllocator<S>,
  config:    EnrollmentConfig,
  session:   SessionId,
  state:     EnrollmentState,
}

struct Submitted {
  national_id: NationalId,
  record:      CitizenRecord,
}

impl<S, B, D> EnrollmentWizard<S, B, D>
where
  S: CitizenStore,
  B: ObjectStorage,
  D: DraftStore,
{
  /// Open the wizard for `session`, resuming any draft already stored.
  pub fn new(
    store: Arc<S>,
    storage: Arc<B>,
    drafts: Arc<D>,
    audit: Arc<AuditLog>,
    session: SessionId,
  ) -> Result<Self> {
    let step = WizardStep::earliest_incomplete(drafts.load(session)?.as_ref());
    Ok(Self {
      allocator: IdentifierAllocator::new(Arc::clone(&store)),
      store,
      storage,
      drafts,
      audit,
      config: EnrollmentConfig::default(),
      session,
      state: EnrollmentState::Active(step),
    })
  }

  pub fn with_config(mut self, config: EnrollmentConfig) -> Self {
    self.config = config;
    self
  }

  pub fn with_allocator(mut self, allocator: IdentifierAllocator<S>) -> Self {
    self.allocator = allocator;
    self
  }

  pub fn session(&self) -> SessionId { self.session }

  pub fn state(&self) -> &EnrollmentState { &self.state }

  pub fn draft(&self) -> Result<Option<EnrollmentDraft>> {
    self.drafts.load(self.session)
  }

  /// Move to `requested`, or to the earliest incomplete step when an earlier
  /// step's data is missing. Returns the step actually entered.
  pub fn enter(&mut self, requested: WizardStep) -> Result<WizardStep> {
    if self.state.is_terminal() {
      return Err(Error::RunFinished);
    }
    let earliest = WizardStep::earliest_incomplete(self.draft()?.as_ref());
    let entered = requested.min(earliest);
    if entered != requested {
      info!(%requested, redirect = %entered, "missing prerequisite; redirecting");
    }
    self.state = EnrollmentState::Active(entered);
    Ok(entered)
  }

  /// The stored draft, provided `step` is reachable from it.
  fn draft_for(&self, step: WizardStep) -> Result<EnrollmentDraft> {
    if self.state.is_terminal() {
      return Err(Error::RunFinished);
    }
    let draft = self
      .draft()?
      .unwrap_or_else(|| EnrollmentDraft::new(Utc::now()));
    let earliest = WizardStep::earliest_incomplete(Some(&draft));
    if step > earliest {
      return Err(Error::StepUnavailable {
        requested: step,
        redirect:  earliest,
      });
    }
    Ok(draft)
  }

  fn advance(
    &mut self,
    draft: &EnrollmentDraft,
    next: WizardStep,
  ) -> Result<()> {
    self.drafts.save(self.session, draft)?;
    self.state = EnrollmentState::Active(next);
    Ok(())
  }

  // ── Step 1 ────────────────────────────────────────────────────────────

  /// Validate the form and store it. An invalid form leaves the state and
  /// the draft untouched.
  pub fn submit_biographic(
    &mut self,
    form: &BiographicForm,
  ) -> Result<BiographicData> {
    let mut draft = self.draft_for(WizardStep::CollectingData)?;
    let data = form
      .validate(Local::now().date_naive())
      .map_err(Error::Validation)?;
    draft.biographic = Some(data.clone());
    self.advance(&draft, WizardStep::CapturingPhoto)?;
    Ok(data)
  }

  // ── Step 2 ────────────────────────────────────────────────────────────

  /// Upload the captured photo under a fresh key and record its URL.
  pub async fn submit_photo(
    &mut self,
    bytes: Bytes,
    content_type: &str,
    cancel: &CancellationToken,
  ) -> Result<PhotoRef> {
    let mut draft = self.draft_for(WizardStep::CapturingPhoto)?;
    let key = format!("{}.{}", Uuid::new_v4(), photo_extension(content_type));

    let upload =
      self
        .storage
        .upload(&self.config.photo_bucket, &key, bytes, content_type);
    let url = tokio::select! {
      biased;
      _ = cancel.cancelled() => return Err(Error::Cancelled),
      uploaded = upload => uploaded.map_err(|e| Error::Upload(Box::new(e)))?,
    };

    info!(%key, "enrollment photo uploaded");
    let photo = PhotoRef { key, url };
    draft.photo = Some(photo.clone());
    self.advance(&draft, WizardStep::ScanningIris)?;
    Ok(photo)
  }

  // ── Step 3 ────────────────────────────────────────────────────────────

  /// Run the simulated scanner and record its result.
  pub async fn scan_iris(
    &mut self,
    scanner: &IrisScanner,
    progress: &mpsc::UnboundedSender<ScanProgress>,
    cancel: &CancellationToken,
  ) -> Result<IrisCapture> {
    self.draft_for(WizardStep::ScanningIris)?;
    let capture = scanner.run(progress, cancel).await?;
    self.complete_iris(capture.clone())?;
    Ok(capture)
  }

  /// Record a finished scan, e.g. one run in a background task.
  pub fn complete_iris(&mut self, capture: IrisCapture) -> Result<()> {
    let mut draft = self.draft_for(WizardStep::ScanningIris)?;
    draft.iris = Some(capture);
    self.advance(&draft, WizardStep::Finalizing)
  }

  // ── Step 4 ────────────────────────────────────────────────────────────

  /// Issue the national ID and write the citizen record.
  ///
  /// Success logs an Enrollment/success audit entry and clears the draft.
  /// Any other failure moves to [`EnrollmentState::Failed`], logs an
  /// Enrollment/error entry, and keeps the draft for [`Self::retry`].
  /// Cancellation before the insert writes nothing and stays on this step.
  pub async fn finalize(
    &mut self,
    operator_user_id: &str,
    cancel: &CancellationToken,
  ) -> Result<CitizenRecord> {
    let draft = self.draft_for(WizardStep::Finalizing)?;

    // Failures after the lookup are attributed to the resolved operator.
    let (operator_label, outcome) =
      match self.resolve_operator(operator_user_id, cancel).await {
        Ok(operator) => {
          let outcome = self.submit(&draft, &operator, cancel).await;
          (operator.display_name, outcome)
        }
        Err(e) => (self.config.operator_label.clone(), Err(e)),
      };

    match outcome {
      Ok(Submitted { national_id, record }) => {
        let elapsed = (Utc::now() - draft.started_at).num_milliseconds();
        self.audit.append(
          NewOperation::new(
            OperationType::Enrollment,
            &operator_label,
            OperationResult::Success,
          )
          .national_id(national_id.to_string())
          .duration_secs(elapsed as f64 / 1000.0),
        );
        if let Err(e) = self.drafts.clear(self.session) {
          warn!(error = %e, "could not clear enrollment draft");
        }
        info!(%national_id, "enrollment complete");
        self.state = EnrollmentState::Succeeded {
          national_id,
          record: Box::new(record.clone()),
        };
        Ok(record)
      }
      Err(Error::Cancelled) => Err(Error::Cancelled),
      Err(e) => {
        warn!(error = %e, "enrollment failed; draft kept for retry");
        self.audit.append(
          NewOperation::new(
            OperationType::Enrollment,
            &operator_label,
            OperationResult::Error,
          )
          .details(json!({ "error": e.to_string() })),
        );
        self.state = EnrollmentState::Failed { message: e.to_string() };
        Err(e)
      }
    }
  }

  async fn resolve_operator(
    &self,
    operator_user_id: &str,
    cancel: &CancellationToken,
  ) -> Result<Operator> {
    tokio::select! {
      biased;
      _ = cancel.cancelled() => Err(Error::Cancelled),
      found = self.store.find_operator(operator_user_id) => found
        .map_err(|e| Error::Submission(Box::new(e)))?
        .ok_or_else(|| Error::OperatorLookup(operator_user_id.to_owned())),
    }
  }

  async fn submit(
    &self,
    draft: &EnrollmentDraft,
    operator: &Operator,
    cancel: &CancellationToken,
  ) -> Result<Submitted> {
    let (Some(bio), Some(photo)) = (&draft.biographic, &draft.photo) else {
      return Err(Error::StepUnavailable {
        requested: WizardStep::Finalizing,
        redirect:  WizardStep::earliest_incomplete(Some(draft)),
      });
    };

    let issue_date = Local::now().date_naive();
    let expiration = expiration_date(issue_date, self.config.validity_years);
    let series = card_series(&mut rand::rng());

    if cancel.is_cancelled() {
      return Err(Error::Cancelled);
    }

    let (national_id, row) = self
      .allocator
      .insert_with_retry(cancel, |national_id| {
        new_citizen(
          bio,
          photo,
          operator,
          national_id,
          issue_date,
          expiration,
          &series,
          &self.config,
        )
      })
      .await?;

    Ok(Submitted {
      national_id,
      record: normalize(&row, Utc::now()),
    })
  }

  // ── After a run ───────────────────────────────────────────────────────

  /// Leave [`EnrollmentState::Failed`] and return to the step the kept
  /// draft supports.
  pub fn retry(&mut self) -> Result<WizardStep> {
    if !matches!(self.state, EnrollmentState::Failed { .. }) {
      return Err(Error::RunFinished);
    }
    let step = WizardStep::earliest_incomplete(self.draft()?.as_ref());
    self.state = EnrollmentState::Active(step);
    Ok(step)
  }

  /// Discard the current draft and start over in the same session.
  pub fn abandon(&mut self) -> Result<()> {
    self.drafts.clear(self.session)?;
    self.state = EnrollmentState::Active(WizardStep::CollectingData);
    Ok(())
  }

  /// Start a fresh run under a new session.
  pub fn restart(&mut self) -> Result<SessionId> {
    if !matches!(self.state, EnrollmentState::Succeeded { .. }) {
      self.drafts.clear(self.session)?;
    }
    self.session = SessionId::new();
    self.state = EnrollmentState::Active(WizardStep::CollectingData);
    Ok(self.session)
  }
}

#[allow(clippy::too_many_arguments)]
fn new_citizen(
  bio: &BiographicData,
  photo: &PhotoRef,
  operator: &Operator,
  national_id: NationalId,
  issue_date: NaiveDate,
  expiration_date: NaiveDate,
  card_series: &str,
  config: &EnrollmentConfig,
) -> NewCitizen {
  NewCitizen {
    national_id,
    family_name: bio.family_name.clone(),
    given_names: bio.given_names.clone(),
    birth_date: bio.birth_date,
    birth_place: bio.birth_place.clone(),
    sex: bio.sex,
    height_cm: bio.height_cm,
    profession: bio.profession.clone(),
    address: bio.address.clone(),
    phone: bio.phone.clone(),
    email: bio.email.clone(),
    issue_date,
    expiration_date,
    authority: config.authority.clone(),
    card_series: card_series.to_owned(),
    photo_url: Some(photo.url.clone()),
    iris_left_url: None,
    iris_right_url: None,
    latitude: None,
    longitude: None,
    operator_id: operator.user_id.clone(),
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::Ordering;

  use rand::{SeedableRng, rngs::StdRng};

  use super::*;
  use crate::{
    audit::AuditLog,
    draft::MemoryDraftStore,
    testing::{FakeStorage, FakeStore},
    validation::Field,
  };

  type Wizard = EnrollmentWizard<FakeStore, FakeStorage, MemoryDraftStore>;

  struct Harness {
    store:   Arc<FakeStore>,
    storage: Arc<FakeStorage>,
    drafts:  Arc<MemoryDraftStore>,
    audit:   Arc<AuditLog>,
  }

  impl Harness {
    fn new() -> Self {
      let store = Arc::new(FakeStore::new());
      store.add_operator("user-1", "Mariama Diallo");
      Self {
        store,
        storage: Arc::new(FakeStorage::default()),
        drafts: Arc::new(MemoryDraftStore::new()),
        audit: Arc::new(AuditLog::in_memory()),
      }
    }

    fn wizard(&self, session: SessionId) -> Wizard {
      EnrollmentWizard::new(
        Arc::clone(&self.store),
        Arc::clone(&self.storage),
        Arc::clone(&self.drafts),
        Arc::clone(&self.audit),
        session,
      )
      .unwrap()
    }
  }

  fn awa() -> BiographicForm {
    BiographicForm {
      given_names: "Awa".into(),
      family_name: "Ndiaye".into(),
      birth_date:  "1990-05-12".into(),
      birth_place: "Thiès".into(),
      sex:         "F".into(),
      address:     "Rue 10, Médina, Dakar".into(),
      phone:       "+221771234567".into(),
      email:       String::new(),
      height_cm:   "168".into(),
      profession:  "Nurse".into(),
      consent:     true,
    }
  }

  async fn to_finalizing(wizard: &mut Wizard) {
    let cancel = CancellationToken::new();
    wizard.submit_biographic(&awa()).unwrap();
    wizard.submit_photo(Bytes::from_static(b"jpeg"), "image/jpeg", &cancel).await.unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();
    wizard.scan_iris(&IrisScanner::instant(), &tx, &cancel).await.unwrap();
  }

  fn date(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

  #[test]
  fn expiration_is_ten_calendar_years() {
    assert_eq!(expiration_date(date(2025, 3, 14), 10), date(2035, 3, 14));
    assert_eq!(expiration_date(date(2024, 2, 29), 10), date(2034, 2, 28));
    assert_eq!(expiration_date(date(2028, 2, 29), 4), date(2032, 2, 29));
  }

  #[test]
  fn card_series_is_seven_alphanumerics() {
    let series = card_series(&mut StdRng::seed_from_u64(3));
    assert_eq!(series.len(), CARD_SERIES_LEN);
    assert!(series.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
  }

  #[test]
  fn valid_form_advances_to_photo() {
    let h = Harness::new();
    let mut wizard = h.wizard(SessionId::new());
    let data = wizard.submit_biographic(&awa()).unwrap();

    assert_eq!(wizard.state(), &EnrollmentState::Active(WizardStep::CapturingPhoto));
    assert_eq!(wizard.draft().unwrap().unwrap().biographic, Some(data));
  }

  #[test]
  fn invalid_form_does_not_advance() {
    let h = Harness::new();
    let mut wizard = h.wizard(SessionId::new());
    let mut form = awa();
    form.family_name = "N".into();

    let Err(Error::Validation(errors)) = wizard.submit_biographic(&form) else {
      panic!("expected a validation error");
    };
    assert!(errors.get(Field::FamilyName).is_some());
    assert_eq!(wizard.state(), &EnrollmentState::Active(WizardStep::CollectingData));
    assert!(wizard.draft().unwrap().is_none());
  }

  #[tokio::test]
  async fn steps_cannot_be_skipped() {
    let h = Harness::new();
    let mut wizard = h.wizard(SessionId::new());

    assert_eq!(wizard.enter(WizardStep::Finalizing).unwrap(), WizardStep::CollectingData);
    let err = wizard
      .submit_photo(Bytes::from_static(b"x"), "image/jpeg", &CancellationToken::new())
      .await
      .unwrap_err();
    assert!(matches!(
      err,
      Error::StepUnavailable { requested: WizardStep::CapturingPhoto, redirect: WizardStep::CollectingData }
    ));

    wizard.submit_biographic(&awa()).unwrap();
    assert_eq!(wizard.enter(WizardStep::ScanningIris).unwrap(), WizardStep::CapturingPhoto);
    assert_eq!(wizard.enter(WizardStep::CollectingData).unwrap(), WizardStep::CollectingData);
  }

  #[tokio::test]
  async fn resumes_from_a_stored_draft() {
    let h = Harness::new();
    let session = SessionId::new();
    let mut first = h.wizard(session);
    first.submit_biographic(&awa()).unwrap();

    let second = h.wizard(session);
    assert_eq!(second.state(), &EnrollmentState::Active(WizardStep::CapturingPhoto));
  }

  #[tokio::test]
  async fn photo_is_uploaded_under_a_uuid_key() {
    let h = Harness::new();
    let mut wizard = h.wizard(SessionId::new());
    wizard.submit_biographic(&awa()).unwrap();
    let photo = wizard
      .submit_photo(Bytes::from_static(b"jpeg"), "image/jpeg", &CancellationToken::new())
      .await
      .unwrap();

    let objects = h.storage.objects.lock().unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].0, PHOTO_BUCKET);
    assert!(photo.key.ends_with(".jpg"));
    assert!(Uuid::parse_str(photo.key.trim_end_matches(".jpg")).is_ok());
    assert_eq!(photo.url, format!("memory://{PHOTO_BUCKET}/{}", photo.key));
  }

  #[tokio::test]
  async fn failed_upload_keeps_the_step() {
    let h = Harness::new();
    h.storage.fail.store(true, Ordering::SeqCst);
    let mut wizard = h.wizard(SessionId::new());
    wizard.submit_biographic(&awa()).unwrap();
    let err = wizard
      .submit_photo(Bytes::from_static(b"jpeg"), "image/jpeg", &CancellationToken::new())
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Upload(_)));
    assert_eq!(wizard.state(), &EnrollmentState::Active(WizardStep::CapturingPhoto));
    assert!(wizard.draft().unwrap().unwrap().biographic.is_some());
  }

  #[tokio::test]
  async fn finalize_issues_id_logs_and_clears_draft() {
    let h = Harness::new();
    let mut wizard = h.wizard(SessionId::new());
    to_finalizing(&mut wizard).await;

    let record = wizard.finalize("user-1", &CancellationToken::new()).await.unwrap();
    let year = Local::now().date_naive().format("%Y").to_string();
    assert_eq!(record.national_id, format!("SN-{year}-000001"));
    assert_eq!(record.authority, DEFAULT_AUTHORITY);
    assert_eq!(record.card_series.len(), CARD_SERIES_LEN);
    assert!(record.photo_url.is_some());
    assert_eq!(
      record.expiration_date,
      expiration_date(Local::now().date_naive(), 10).format("%Y-%m-%d").to_string()
    );

    let entries = h.audit.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, OperationType::Enrollment);
    assert_eq!(entries[0].result, OperationResult::Success);
    assert_eq!(entries[0].national_id.as_deref(), Some(record.national_id.as_str()));
    assert_eq!(entries[0].operator, "Mariama Diallo");
    assert!(entries[0].duration_secs.is_some());

    assert!(wizard.draft().unwrap().is_none());
    assert!(matches!(wizard.state(), EnrollmentState::Succeeded { .. }));
    assert!(matches!(wizard.enter(WizardStep::CollectingData), Err(Error::RunFinished)));
  }

  #[tokio::test]
  async fn unknown_operator_fails_and_keeps_draft() {
    let h = Harness::new();
    let mut wizard = h.wizard(SessionId::new());
    to_finalizing(&mut wizard).await;

    let err = wizard.finalize("stranger", &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, Error::OperatorLookup(_)));
    assert!(matches!(wizard.state(), EnrollmentState::Failed { .. }));
    assert!(wizard.draft().unwrap().unwrap().iris.is_some());
    assert!(h.store.rows().is_empty());

    let entries = h.audit.entries();
    assert_eq!(entries[0].result, OperationResult::Error);
    assert_eq!(entries[0].operator, EnrollmentConfig::default().operator_label);

    assert_eq!(wizard.retry().unwrap(), WizardStep::Finalizing);
    wizard.finalize("user-1", &CancellationToken::new()).await.unwrap();
    assert_eq!(h.store.rows().len(), 1);
  }

  #[tokio::test]
  async fn insert_failure_is_a_submission_error() {
    let h = Harness::new();
    h.store.fail_insert.store(true, Ordering::SeqCst);
    let mut wizard = h.wizard(SessionId::new());
    to_finalizing(&mut wizard).await;

    let err = wizard.finalize("user-1", &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, Error::Submission(_)));
    let EnrollmentState::Failed { message } = wizard.state() else { panic!() };
    assert!(message.contains("submission"));

    let entries = h.audit.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].result, OperationResult::Error);
    assert_eq!(entries[0].operator, "Mariama Diallo");
  }

  #[tokio::test]
  async fn conflicting_ids_are_retried() {
    let h = Harness::new();
    h.store.conflicts_remaining.store(2, Ordering::SeqCst);
    let mut wizard = h.wizard(SessionId::new());
    to_finalizing(&mut wizard).await;

    let record = wizard.finalize("user-1", &CancellationToken::new()).await.unwrap();
    assert!(record.national_id.ends_with("000003"));
  }

  #[tokio::test]
  async fn cancelled_finalize_writes_nothing() {
    let h = Harness::new();
    let mut wizard = h.wizard(SessionId::new());
    to_finalizing(&mut wizard).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    assert!(matches!(wizard.finalize("user-1", &cancel).await, Err(Error::Cancelled)));
    assert!(h.store.rows().is_empty());
    assert!(h.audit.is_empty());
    assert_eq!(wizard.state(), &EnrollmentState::Active(WizardStep::Finalizing));
  }

  #[tokio::test]
  async fn restart_begins_a_fresh_run() {
    let h = Harness::new();
    let mut wizard = h.wizard(SessionId::new());
    to_finalizing(&mut wizard).await;
    wizard.finalize("user-1", &CancellationToken::new()).await.unwrap();

    let old = wizard.session();
    let new = wizard.restart().unwrap();
    assert_ne!(old, new);
    assert_eq!(wizard.state(), &EnrollmentState::Active(WizardStep::CollectingData));
    assert!(wizard.draft().unwrap().is_none());
  }

  #[tokio::test]
  async fn abandon_discards_the_draft() {
    let h = Harness::new();
    let mut wizard = h.wizard(SessionId::new());
    wizard.submit_biographic(&awa()).unwrap();
    wizard.abandon().unwrap();
    assert!(wizard.draft().unwrap().is_none());
    assert_eq!(wizard.state(), &EnrollmentState::Active(WizardStep::CollectingData));
  }
}
