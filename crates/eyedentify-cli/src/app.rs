//! Application state machine and event dispatcher.

use std::{future::Future, path::Path, sync::Arc, time::Duration};

use bytes::Bytes;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use eyedentify_core::{
  Error,
  audit::{
    AuditFilter, AuditLog, AuditOperation, AuditStats, OperationResult,
    OperationType, Period,
  },
  citizen::CitizenRecord,
  directory::{CitizenDirectory, CitizenQuery, DirectoryStats, filter_and_sort},
  draft::{MemoryDraftStore, SessionId},
  identification::{IdentificationOutcome, IdentificationSimulator},
  iris::{IrisCapture, IrisScanner, ScanProgress},
  session::SessionContainer,
  validation::{BiographicForm, Field, ValidationErrors},
  wizard::{EnrollmentConfig, EnrollmentState, EnrollmentWizard, WizardStep},
};
use tokio::{
  sync::mpsc,
  task::{JoinError, JoinHandle},
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::ApiClient;

pub type Wizard = EnrollmentWizard<ApiClient, ApiClient, MemoryDraftStore>;

/// Number of operations the dashboard lists.
const RECENT_OPERATIONS: usize = 5;

/// Biographic form fields in display order.
pub const FORM_FIELDS: [Field; 11] = [
  Field::GivenNames,
  Field::FamilyName,
  Field::BirthDate,
  Field::BirthPlace,
  Field::Sex,
  Field::Address,
  Field::Phone,
  Field::Email,
  Field::HeightCm,
  Field::Profession,
  Field::Consent,
];

// ─── Screen ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
  SignIn,
  Dashboard,
  CitizenList,
  CitizenDetail,
  Enrollment,
  Identification,
  History,
}

// ─── Settings ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Settings {
  pub success_rate:  f64,
  pub display_delay: Duration,
  pub scanner:       IrisScanner,
  pub enrollment:    EnrollmentConfig,
}

// ─── Background jobs ──────────────────────────────────────────────────────────

/// A spawned task with its own cancellation token.
struct Job<T> {
  cancel: CancellationToken,
  handle: JoinHandle<T>,
}

impl<T: Send + 'static> Job<T> {
  fn spawn<F, Fut>(f: F) -> Self
  where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
  {
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(f(cancel.clone()));
    Self { cancel, handle }
  }

  fn is_finished(&self) -> bool { self.handle.is_finished() }

  fn cancel(&self) { self.cancel.cancel() }

  async fn join(self) -> Result<T, JoinError> { self.handle.await }
}

/// A running iris scan and its progress feed.
struct Scan<T> {
  job:      Job<T>,
  progress: mpsc::UnboundedReceiver<ScanProgress>,
}

impl<T: Send + 'static> Scan<T> {
  /// Drain pending progress; the newest event wins.
  fn latest_progress(&mut self) -> Option<ScanProgress> {
    let mut latest = None;
    while let Ok(p) = self.progress.try_recv() {
      latest = Some(p);
    }
    latest
  }
}

// ─── Per-screen state ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct SignInForm {
  pub email:          String,
  pub password:       String,
  pub password_focus: bool,
  pub error:          Option<String>,
}

#[derive(Debug, Default)]
pub struct Dashboard {
  pub citizens: DirectoryStats,
  pub audit:    AuditStats,
  pub recent:   Vec<AuditOperation>,
}

#[derive(Debug, Default)]
pub struct CitizenList {
  pub records:   Vec<CitizenRecord>,
  pub query:     CitizenQuery,
  pub searching: bool,
  pub cursor:    usize,
}

impl CitizenList {
  pub fn visible(&self) -> Vec<CitizenRecord> {
    filter_and_sort(self.records.clone(), &self.query)
  }
}

pub struct Enrollment {
  /// `None` while a background upload or submission owns the wizard.
  wizard:          Option<Wizard>,
  /// Session of the last wizard seen, for resuming its draft.
  session:         SessionId,
  /// Last observed wizard state, for drawing while the wizard is away.
  pub state:       EnrollmentState,
  pub form:        BiographicForm,
  pub field:       usize,
  pub errors:      ValidationErrors,
  pub photo_path:  String,
  pub progress:    Option<ScanProgress>,
  pub iris:        Option<IrisCapture>,
  pub message:     Option<String>,
  job:             Option<Job<(Wizard, Result<String, Error>)>>,
  scan:            Option<Scan<Result<IrisCapture, Error>>>,
}

impl Enrollment {
  fn new(wizard: Wizard) -> Self {
    Self {
      state: wizard.state().clone(),
      session: wizard.session(),
      wizard: Some(wizard),
      form: BiographicForm::default(),
      field: 0,
      errors: ValidationErrors::default(),
      photo_path: String::new(),
      progress: None,
      iris: None,
      message: None,
      job: None,
      scan: None,
    }
  }

  pub fn busy(&self) -> bool { self.job.is_some() || self.scan.is_some() }

  pub fn scanning(&self) -> bool { self.scan.is_some() }

  pub fn current_field(&self) -> Field { FORM_FIELDS[self.field] }

  /// The wizard step currently accepting text input, if any.
  fn typing(&self) -> bool {
    !self.busy()
      && matches!(
        self.state,
        EnrollmentState::Active(WizardStep::CollectingData | WizardStep::CapturingPhoto)
      )
  }

  fn cancel(&self) {
    if let Some(job) = &self.job {
      job.cancel();
    }
    if let Some(scan) = &self.scan {
      scan.job.cancel();
    }
  }

  fn sync_state(&mut self) {
    if let Some(wizard) = &self.wizard {
      self.state = wizard.state().clone();
      self.session = wizard.session();
    }
  }

  fn reset_inputs(&mut self) {
    self.form = BiographicForm::default();
    self.field = 0;
    self.errors = ValidationErrors::default();
    self.photo_path.clear();
    self.progress = None;
    self.iris = None;
  }

  /// Collect finished background work.
  async fn poll(&mut self) {
    if let Some(scan) = &mut self.scan {
      if let Some(p) = scan.latest_progress() {
        self.progress = Some(p);
      }
      if scan.job.is_finished()
        && let Some(scan) = self.scan.take()
      {
        match scan.job.join().await {
          Ok(Ok(capture)) => self.finish_scan(capture),
          Ok(Err(Error::Cancelled)) => self.message = Some("Scan cancelled.".into()),
          Ok(Err(e)) => self.message = Some(format!("Scan failed: {e}")),
          Err(e) => self.message = Some(format!("Scan task failed: {e}")),
        }
      }
    }

    if self.job.as_ref().is_some_and(Job::is_finished)
      && let Some(job) = self.job.take()
    {
      match job.join().await {
        Ok((wizard, result)) => {
          self.wizard = Some(wizard);
          self.sync_state();
          self.message = Some(match result {
            Ok(msg) => msg,
            Err(Error::Cancelled) => "Cancelled.".into(),
            Err(e) => e.to_string(),
          });
        }
        Err(e) => {
          warn!(error = %e, "enrollment task failed; wizard will be reopened");
          self.message = Some(format!("Enrollment task failed: {e}"));
        }
      }
    }
  }

  fn finish_scan(&mut self, capture: IrisCapture) {
    let Some(wizard) = &mut self.wizard else { return };
    match wizard.complete_iris(capture.clone()) {
      Ok(()) => {
        self.message = Some(format!(
          "Iris captured: {} ({}%)",
          capture.quality, capture.metrics.overall
        ));
        self.iris = Some(capture);
      }
      Err(e) => self.message = Some(e.to_string()),
    }
    self.sync_state();
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IdentifyPhase {
  Idle,
  Scanning,
  Matched(Box<CitizenRecord>),
  NoMatch,
  Failed(String),
}

pub struct Identification {
  pub phase:    IdentifyPhase,
  pub progress: Option<ScanProgress>,
  scan:         Option<Scan<Result<IdentificationOutcome, Error>>>,
}

impl Identification {
  fn cancel(&self) {
    if let Some(scan) = &self.scan {
      scan.job.cancel();
    }
  }

  async fn poll(&mut self) {
    let Some(scan) = &mut self.scan else { return };
    if let Some(p) = scan.latest_progress() {
      self.progress = Some(p);
    }
    if !scan.job.is_finished() {
      return;
    }
    let Some(scan) = self.scan.take() else { return };
    self.phase = match scan.job.join().await {
      Ok(Ok(IdentificationOutcome::Match(record))) => IdentifyPhase::Matched(record),
      Ok(Ok(IdentificationOutcome::NoMatch)) => IdentifyPhase::NoMatch,
      Ok(Err(Error::Cancelled)) => IdentifyPhase::Idle,
      Ok(Err(e)) => IdentifyPhase::Failed(e.to_string()),
      Err(e) => IdentifyPhase::Failed(e.to_string()),
    };
  }
}

#[derive(Debug, Default)]
pub struct History {
  pub filter:    AuditFilter,
  pub search:    String,
  pub searching: bool,
  pub cursor:    usize,
}

// ─── App ──────────────────────────────────────────────────────────────────────

/// Top-level application state.
pub struct App {
  pub screen:         Screen,
  /// One-line status message shown in the status bar.
  pub status_msg:     String,
  pub client:         Arc<ApiClient>,
  pub session:        SessionContainer<ApiClient>,
  pub audit:          Arc<AuditLog>,
  pub directory:      CitizenDirectory<ApiClient>,
  pub settings:       Settings,
  drafts:             Arc<MemoryDraftStore>,
  pub sign_in:        SignInForm,
  pub dashboard:      Dashboard,
  pub citizens:       CitizenList,
  pub detail:         Option<CitizenRecord>,
  pub enrollment:     Enrollment,
  pub identification: Identification,
  pub history:        History,
}

impl App {
  pub async fn new(
    client: ApiClient,
    audit: Arc<AuditLog>,
    settings: Settings,
  ) -> eyedentify_core::Result<Self> {
    let client = Arc::new(client);
    let session = SessionContainer::start(Arc::clone(&client)).await;
    let drafts = Arc::new(MemoryDraftStore::new());
    let wizard = new_wizard(&client, &audit, &settings, &drafts, SessionId::new())?;
    let screen = if session.current_user().is_some() {
      Screen::Dashboard
    } else {
      Screen::SignIn
    };

    Ok(Self {
      screen,
      status_msg: String::new(),
      directory: CitizenDirectory::new(Arc::clone(&client)),
      client,
      session,
      audit,
      settings,
      drafts,
      sign_in: SignInForm::default(),
      dashboard: Dashboard::default(),
      citizens: CitizenList::default(),
      detail: None,
      enrollment: Enrollment::new(wizard),
      identification: Identification {
        phase:    IdentifyPhase::Idle,
        progress: None,
        scan:     None,
      },
      history: History::default(),
    })
  }

  /// Label recorded as the operator in audit entries.
  pub fn operator_label(&self) -> String {
    self
      .session
      .current_user()
      .map(|u| u.label().to_owned())
      .unwrap_or_else(|| self.settings.enrollment.operator_label.clone())
  }

  // ── Data loading ──────────────────────────────────────────────────────────

  pub async fn refresh_dashboard(&mut self) {
    match self.directory.stats().await {
      Ok(stats) => {
        self.dashboard.citizens = stats;
        self.status_msg.clear();
      }
      Err(e) => self.status_msg = format!("Error: {e}"),
    }
    self.dashboard.audit = self.audit.stats();
    self.dashboard.recent = self.audit.recent(RECENT_OPERATIONS);
  }

  pub async fn load_citizens(&mut self) {
    self.status_msg = "Loading citizens…".into();
    match self.directory.records().await {
      Ok(records) => {
        self.citizens.records = records;
        self.citizens.cursor = 0;
        self.status_msg.clear();
      }
      Err(e) => self.status_msg = format!("Error: {e}"),
    }
  }

  pub fn history_entries(&self) -> Vec<AuditOperation> {
    self.audit.query(&self.history.filter)
  }

  /// Collect finished background work. Called once per frame.
  pub async fn tick(&mut self) {
    self.enrollment.poll().await;
    self.recover_wizard();
    self.identification.poll().await;
  }

  /// A background task that died took the wizard with it. Reopen the same
  /// session; the draft store still holds whatever it had saved.
  fn recover_wizard(&mut self) {
    let e = &mut self.enrollment;
    if e.wizard.is_some() || e.job.is_some() {
      return;
    }
    match new_wizard(&self.client, &self.audit, &self.settings, &self.drafts, e.session) {
      Ok(wizard) => {
        e.wizard = Some(wizard);
        e.sync_state();
      }
      Err(err) => e.message = Some(format!("Cannot reopen enrollment: {err}")),
    }
  }

  // ── Navigation ────────────────────────────────────────────────────────────

  /// Switch screens, cancelling whatever the screen being left had in
  /// flight.
  pub async fn go_to(&mut self, screen: Screen) {
    if self.screen == screen {
      return;
    }
    match self.screen {
      Screen::Enrollment => self.enrollment.cancel(),
      Screen::Identification => self.identification.cancel(),
      _ => {}
    }
    self.screen = screen;
    match screen {
      Screen::Dashboard => self.refresh_dashboard().await,
      Screen::CitizenList => self.load_citizens().await,
      Screen::Enrollment => self.enter_enrollment(),
      Screen::History => self.history.cursor = 0,
      _ => {}
    }
  }

  fn enter_enrollment(&mut self) {
    let Some(wizard) = &mut self.enrollment.wizard else { return };
    if let Some(step) = wizard.state().step()
      && let Err(e) = wizard.enter(step)
    {
      self.enrollment.message = Some(e.to_string());
    }
    self.enrollment.sync_state();
  }

  // ── Key handling ──────────────────────────────────────────────────────────

  /// Whether keystrokes currently go into a text field.
  fn typing(&self) -> bool {
    match self.screen {
      Screen::SignIn => true,
      Screen::CitizenList => self.citizens.searching,
      Screen::History => self.history.searching,
      Screen::Enrollment => self.enrollment.typing(),
      _ => false,
    }
  }

  /// Process a key event. Returns `true` to continue, `false` to quit.
  pub async fn handle_key(&mut self, key: KeyEvent) -> anyhow::Result<bool> {
    // Global: Ctrl-C quits from anywhere.
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
      return Ok(false);
    }

    if !self.typing() && self.screen != Screen::SignIn {
      match key.code {
        KeyCode::Char('q') => return Ok(false),
        KeyCode::Char('1') => return self.nav(Screen::Dashboard).await,
        KeyCode::Char('2') => return self.nav(Screen::CitizenList).await,
        KeyCode::Char('3') => return self.nav(Screen::Enrollment).await,
        KeyCode::Char('4') => return self.nav(Screen::Identification).await,
        KeyCode::Char('5') => return self.nav(Screen::History).await,
        KeyCode::Char('o') => {
          self.sign_out().await;
          return Ok(true);
        }
        _ => {}
      }
    }

    match self.screen {
      Screen::SignIn => return self.handle_sign_in_key(key).await,
      Screen::Dashboard => self.handle_dashboard_key(key).await,
      Screen::CitizenList => self.handle_list_key(key).await,
      Screen::CitizenDetail => self.handle_detail_key(key).await,
      Screen::Enrollment => self.handle_enrollment_key(key).await,
      Screen::Identification => self.handle_identification_key(key).await,
      Screen::History => self.handle_history_key(key).await,
    }
    Ok(true)
  }

  async fn nav(&mut self, screen: Screen) -> anyhow::Result<bool> {
    self.go_to(screen).await;
    Ok(true)
  }

  async fn sign_out(&mut self) {
    self.enrollment.cancel();
    self.identification.cancel();
    if let Err(e) = self.session.sign_out().await {
      self.status_msg = format!("Error: {e}");
      return;
    }
    self.sign_in = SignInForm::default();
    self.screen = Screen::SignIn;
  }

  async fn handle_sign_in_key(&mut self, key: KeyEvent) -> anyhow::Result<bool> {
    let form = &mut self.sign_in;
    match key.code {
      KeyCode::Esc => return Ok(false),
      KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
        form.password_focus = !form.password_focus;
      }
      KeyCode::Backspace => {
        if form.password_focus {
          form.password.pop();
        } else {
          form.email.pop();
        }
      }
      KeyCode::Char(c) => {
        if form.password_focus {
          form.password.push(c);
        } else {
          form.email.push(c);
        }
      }
      KeyCode::Enter => {
        let (email, password) = (form.email.trim().to_owned(), form.password.clone());
        match self.session.sign_in(&email, &password).await {
          Ok(user) => {
            info!(user_id = %user.user_id, "operator signed in");
            self.sign_in = SignInForm::default();
            self.screen = Screen::Dashboard;
            self.refresh_dashboard().await;
          }
          Err(e) => {
            self.sign_in.password.clear();
            self.sign_in.error = Some(e.to_string());
          }
        }
      }
      _ => {}
    }
    Ok(true)
  }

  async fn handle_dashboard_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('g') {
      self.refresh_dashboard().await;
    }
  }

  // ── Citizen list & detail ─────────────────────────────────────────────────

  async fn handle_list_key(&mut self, key: KeyEvent) {
    let list = &mut self.citizens;
    if list.searching {
      match key.code {
        KeyCode::Esc => {
          list.searching = false;
          list.query.text.clear();
        }
        KeyCode::Enter => list.searching = false,
        KeyCode::Backspace => {
          list.query.text.pop();
        }
        KeyCode::Char(c) => list.query.text.push(c),
        _ => {}
      }
      list.cursor = 0;
      return;
    }

    match key.code {
      KeyCode::Down | KeyCode::Char('j') => {
        if list.cursor + 1 < list.visible().len() {
          list.cursor += 1;
        }
      }
      KeyCode::Up | KeyCode::Char('k') => list.cursor = list.cursor.saturating_sub(1),
      KeyCode::Char('/') => {
        list.searching = true;
        list.query.text.clear();
        list.cursor = 0;
      }
      KeyCode::Char('s') => {
        list.query.sort = list.query.sort.next();
        list.cursor = 0;
      }
      KeyCode::Char('t') => {
        list.query.enrolled_today_only = !list.query.enrolled_today_only;
        list.cursor = 0;
      }
      KeyCode::Char('g') => self.load_citizens().await,
      KeyCode::Enter | KeyCode::Right | KeyCode::Char('l') => {
        if let Some(record) = list.visible().into_iter().nth(list.cursor) {
          self.detail = Some(record);
          self.screen = Screen::CitizenDetail;
        }
      }
      _ => {}
    }
  }

  async fn handle_detail_key(&mut self, key: KeyEvent) {
    if matches!(key.code, KeyCode::Esc | KeyCode::Left | KeyCode::Char('h')) {
      self.detail = None;
      self.screen = Screen::CitizenList;
    }
  }

  // ── Enrollment ────────────────────────────────────────────────────────────

  async fn handle_enrollment_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Esc {
      self.enrollment.cancel();
      self.go_to(Screen::Dashboard).await;
      return;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('d') {
      self.abandon_enrollment();
      return;
    }
    if self.enrollment.busy() {
      return;
    }

    match self.enrollment.state.clone() {
      EnrollmentState::Active(WizardStep::CollectingData) => self.form_key(key),
      EnrollmentState::Active(WizardStep::CapturingPhoto) => match key.code {
        KeyCode::Enter => self.start_upload().await,
        KeyCode::Backspace => {
          self.enrollment.photo_path.pop();
        }
        KeyCode::Char(c) => self.enrollment.photo_path.push(c),
        _ => {}
      },
      EnrollmentState::Active(WizardStep::ScanningIris) => {
        if key.code == KeyCode::Enter {
          self.start_enrollment_scan();
        }
      }
      EnrollmentState::Active(WizardStep::Finalizing) => {
        if key.code == KeyCode::Enter {
          self.start_finalize();
        }
      }
      EnrollmentState::Succeeded { .. } => {
        if key.code == KeyCode::Char('n') {
          self.restart_enrollment();
        }
      }
      EnrollmentState::Failed { .. } => {
        if key.code == KeyCode::Char('r') {
          self.with_wizard(|w| w.retry().map(|step| format!("Retrying from {step}.")));
        }
      }
    }
  }

  fn form_key(&mut self, key: KeyEvent) {
    let e = &mut self.enrollment;
    let field = e.current_field();
    match key.code {
      KeyCode::Tab | KeyCode::Down => e.field = (e.field + 1) % FORM_FIELDS.len(),
      KeyCode::BackTab | KeyCode::Up => {
        e.field = (e.field + FORM_FIELDS.len() - 1) % FORM_FIELDS.len();
      }
      KeyCode::Char(' ') if field == Field::Consent => e.form.consent = !e.form.consent,
      KeyCode::Backspace => {
        if let Some(value) = form_text_mut(&mut e.form, field) {
          value.pop();
        }
      }
      KeyCode::Char(c) => {
        if let Some(value) = form_text_mut(&mut e.form, field) {
          value.push(c);
        }
      }
      KeyCode::Enter => self.submit_form(),
      _ => {}
    }
  }

  fn submit_form(&mut self) {
    let e = &mut self.enrollment;
    let Some(wizard) = &mut e.wizard else { return };
    match wizard.submit_biographic(&e.form) {
      Ok(data) => {
        e.errors = ValidationErrors::default();
        e.message = Some(format!(
          "Biographic data saved for {} {}.",
          data.given_names, data.family_name
        ));
      }
      Err(Error::Validation(errors)) => {
        e.message = Some(format!("{} field(s) need attention.", errors.len()));
        if let Some(pos) = errors
          .iter()
          .next()
          .and_then(|(f, _)| FORM_FIELDS.iter().position(|x| *x == f))
        {
          e.field = pos;
        }
        e.errors = errors;
      }
      Err(err) => e.message = Some(err.to_string()),
    }
    e.sync_state();
  }

  async fn start_upload(&mut self) {
    let path = self.enrollment.photo_path.trim().to_owned();
    if path.is_empty() {
      self.enrollment.message = Some("Enter the path of the captured photo.".into());
      return;
    }
    let bytes = match tokio::fs::read(&path).await {
      Ok(bytes) if !bytes.is_empty() => Bytes::from(bytes),
      Ok(_) => {
        self.enrollment.message = Some(format!("{path} is empty."));
        return;
      }
      Err(e) => {
        self.enrollment.message = Some(format!("Cannot read {path}: {e}"));
        return;
      }
    };
    let content_type = photo_content_type(Path::new(&path)).to_owned();

    let Some(mut wizard) = self.enrollment.wizard.take() else { return };
    self.enrollment.message = Some("Uploading photo…".into());
    self.enrollment.job = Some(Job::spawn(move |cancel| async move {
      let result = wizard
        .submit_photo(bytes, &content_type, &cancel)
        .await
        .map(|photo| format!("Photo uploaded: {}", photo.url));
      (wizard, result)
    }));
  }

  fn start_enrollment_scan(&mut self) {
    let scanner = self.settings.scanner.clone();
    let (tx, rx) = mpsc::unbounded_channel();
    self.enrollment.progress = None;
    self.enrollment.message = None;
    self.enrollment.scan = Some(Scan {
      job:      Job::spawn(move |cancel| async move { scanner.run(&tx, &cancel).await }),
      progress: rx,
    });
  }

  fn start_finalize(&mut self) {
    let Some(user) = self.session.current_user() else {
      self.enrollment.message = Some("Sign in again to submit.".into());
      return;
    };
    let Some(mut wizard) = self.enrollment.wizard.take() else { return };
    self.enrollment.message = Some("Submitting enrollment…".into());
    self.enrollment.job = Some(Job::spawn(move |cancel| async move {
      let result = wizard
        .finalize(&user.user_id, &cancel)
        .await
        .map(|record| format!("Enrolled {} as {}.", record.full_name(), record.national_id));
      (wizard, result)
    }));
  }

  fn restart_enrollment(&mut self) {
    self.with_wizard(|w| w.restart().map(|_| "New enrollment started.".to_owned()));
    self.enrollment.reset_inputs();
  }

  fn abandon_enrollment(&mut self) {
    self.enrollment.cancel();
    if self.enrollment.busy() {
      self.enrollment.message = Some("Wait for the current step to stop.".into());
      return;
    }
    self.with_wizard(|w| w.abandon().map(|()| "Draft discarded.".to_owned()));
    self.enrollment.reset_inputs();
  }

  fn with_wizard(
    &mut self,
    f: impl FnOnce(&mut Wizard) -> eyedentify_core::Result<String>,
  ) {
    let e = &mut self.enrollment;
    let Some(wizard) = &mut e.wizard else { return };
    e.message = Some(match f(wizard) {
      Ok(msg) => msg,
      Err(err) => err.to_string(),
    });
    e.sync_state();
  }

  // ── Identification ────────────────────────────────────────────────────────

  async fn handle_identification_key(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Esc => {
        self.identification.cancel();
        self.go_to(Screen::Dashboard).await;
      }
      KeyCode::Enter if self.identification.scan.is_none() => self.start_identification(),
      _ => {}
    }
  }

  fn start_identification(&mut self) {
    let simulator = IdentificationSimulator::new(
      Arc::clone(&self.client),
      Arc::clone(&self.audit),
      self.operator_label(),
    )
    .with_success_probability(self.settings.success_rate)
    .with_display_delay(self.settings.display_delay);
    let scanner = self.settings.scanner.clone();
    let (tx, rx) = mpsc::unbounded_channel();

    self.identification.phase = IdentifyPhase::Scanning;
    self.identification.progress = None;
    self.identification.scan = Some(Scan {
      job:      Job::spawn(move |cancel| async move {
        scanner.run(&tx, &cancel).await?;
        simulator.attempt(&cancel).await
      }),
      progress: rx,
    });
  }

  // ── History ───────────────────────────────────────────────────────────────

  async fn handle_history_key(&mut self, key: KeyEvent) {
    let h = &mut self.history;
    if h.searching {
      match key.code {
        KeyCode::Esc => {
          h.searching = false;
          h.search.clear();
        }
        KeyCode::Enter => h.searching = false,
        KeyCode::Backspace => {
          h.search.pop();
        }
        KeyCode::Char(c) => h.search.push(c),
        _ => {}
      }
      h.filter.search = (!h.search.trim().is_empty()).then(|| h.search.clone());
      h.cursor = 0;
      return;
    }

    match key.code {
      KeyCode::Char('/') => h.searching = true,
      KeyCode::Char('p') => h.filter.period = next_period(h.filter.period),
      KeyCode::Char('t') => h.filter.kind = next_kind(h.filter.kind),
      KeyCode::Char('r') => h.filter.result = next_result(h.filter.result),
      KeyCode::Down | KeyCode::Char('j') => h.cursor += 1,
      KeyCode::Up | KeyCode::Char('k') => h.cursor = h.cursor.saturating_sub(1),
      _ => {}
    }
    if !matches!(key.code, KeyCode::Down | KeyCode::Up | KeyCode::Char('j' | 'k')) {
      h.cursor = 0;
    }
    let len = self.history_entries().len();
    self.history.cursor = self.history.cursor.min(len.saturating_sub(1));
  }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn new_wizard(
  client: &Arc<ApiClient>,
  audit: &Arc<AuditLog>,
  settings: &Settings,
  drafts: &Arc<MemoryDraftStore>,
  session: SessionId,
) -> eyedentify_core::Result<Wizard> {
  Ok(
    EnrollmentWizard::new(
      Arc::clone(client),
      Arc::clone(client),
      Arc::clone(drafts),
      Arc::clone(audit),
      session,
    )?
    .with_config(settings.enrollment.clone()),
  )
}

/// The text buffer behind a form field; `None` for the consent checkbox.
pub fn form_text_mut(form: &mut BiographicForm, field: Field) -> Option<&mut String> {
  Some(match field {
    Field::GivenNames => &mut form.given_names,
    Field::FamilyName => &mut form.family_name,
    Field::BirthDate => &mut form.birth_date,
    Field::BirthPlace => &mut form.birth_place,
    Field::Sex => &mut form.sex,
    Field::Address => &mut form.address,
    Field::Phone => &mut form.phone,
    Field::Email => &mut form.email,
    Field::HeightCm => &mut form.height_cm,
    Field::Profession => &mut form.profession,
    Field::Consent => return None,
  })
}

pub fn form_text(form: &BiographicForm, field: Field) -> String {
  match field {
    Field::GivenNames => form.given_names.clone(),
    Field::FamilyName => form.family_name.clone(),
    Field::BirthDate => form.birth_date.clone(),
    Field::BirthPlace => form.birth_place.clone(),
    Field::Sex => form.sex.clone(),
    Field::Address => form.address.clone(),
    Field::Phone => form.phone.clone(),
    Field::Email => form.email.clone(),
    Field::HeightCm => form.height_cm.clone(),
    Field::Profession => form.profession.clone(),
    Field::Consent => if form.consent { "[x]" } else { "[ ]" }.to_owned(),
  }
}

fn photo_content_type(path: &Path) -> &'static str {
  match path
    .extension()
    .and_then(|e| e.to_str())
    .map(str::to_ascii_lowercase)
    .as_deref()
  {
    Some("png") => "image/png",
    Some("webp") => "image/webp",
    _ => "image/jpeg",
  }
}

fn next_period(p: Period) -> Period {
  match p {
    Period::All => Period::Today,
    Period::Today => Period::Last7Days,
    Period::Last7Days => Period::Last30Days,
    Period::Last30Days => Period::All,
  }
}

fn next_kind(k: Option<OperationType>) -> Option<OperationType> {
  match k {
    None => Some(OperationType::Enrollment),
    Some(OperationType::Enrollment) => Some(OperationType::Identification),
    Some(OperationType::Identification) => None,
  }
}

fn next_result(r: Option<OperationResult>) -> Option<OperationResult> {
  match r {
    None => Some(OperationResult::Success),
    Some(OperationResult::Success) => Some(OperationResult::NotFound),
    Some(OperationResult::NotFound) => Some(OperationResult::Error),
    Some(OperationResult::Error) => None,
  }
}

#[cfg(test)]
mod tests {
  use crate::client::ApiConfig;

  use super::*;

  async fn offline_app() -> App {
    let client = ApiClient::new(ApiConfig {
      base_url: "http://127.0.0.1:9".into(),
      timeout:  Duration::from_secs(1),
    })
    .unwrap();
    let settings = Settings {
      success_rate:  1.0,
      display_delay: Duration::ZERO,
      scanner:       IrisScanner::instant(),
      enrollment:    EnrollmentConfig::default(),
    };
    App::new(client, Arc::new(AuditLog::in_memory()), settings)
      .await
      .unwrap()
  }

  #[tokio::test]
  async fn wizard_is_reopened_after_its_task_dies() {
    let mut app = offline_app().await;
    app.enrollment.form = BiographicForm {
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
    };
    app.submit_form();
    assert_eq!(
      app.enrollment.state,
      EnrollmentState::Active(WizardStep::CapturingPhoto)
    );
    let session = app.enrollment.session;

    let _lost = app.enrollment.wizard.take();
    app.enrollment.job = Some(Job::spawn(|_cancel| async move {
      panic!("upload task died")
    }));
    while !app.enrollment.job.as_ref().unwrap().is_finished() {
      tokio::task::yield_now().await;
    }

    app.tick().await;
    assert!(app.enrollment.wizard.is_some());
    assert!(app.enrollment.job.is_none());
    assert_eq!(app.enrollment.session, session);
    assert_eq!(
      app.enrollment.state,
      EnrollmentState::Active(WizardStep::CapturingPhoto)
    );
    assert!(app.enrollment.message.as_deref().unwrap().contains("task failed"));
  }

  #[test]
  fn filters_cycle_back_to_unfiltered() {
    let mut p = Period::All;
    for _ in 0..4 {
      p = next_period(p);
    }
    assert_eq!(p, Period::All);

    assert_eq!(next_kind(next_kind(next_kind(None))), None);
    let mut r = None;
    for _ in 0..4 {
      r = next_result(r);
    }
    assert_eq!(r, None);
  }

  #[test]
  fn photo_types_from_extension() {
    assert_eq!(photo_content_type(Path::new("/tmp/face.PNG")), "image/png");
    assert_eq!(photo_content_type(Path::new("face.webp")), "image/webp");
    assert_eq!(photo_content_type(Path::new("face.jpeg")), "image/jpeg");
    assert_eq!(photo_content_type(Path::new("face")), "image/jpeg");
  }

  #[test]
  fn every_text_field_has_a_buffer() {
    let mut form = BiographicForm::default();
    for field in FORM_FIELDS {
      let has_buffer = form_text_mut(&mut form, field).is_some();
      assert_eq!(has_buffer, field != Field::Consent, "{field}");
    }
    form.consent = true;
    assert_eq!(form_text(&form, Field::Consent), "[x]");
  }
}
