//! Simulated iris acquisition.
//!
//! There is no biometric processing here: a scan walks a fixed list of
//! analysis messages on a timer, then draws plausible quality metrics.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{Error, Result};

pub const ANALYSIS_STEPS: [&str; 18] = [
  "Initializing iris sensor",
  "Calibrating infrared illumination",
  "Detecting left eye",
  "Locating pupil boundary",
  "Segmenting iris texture",
  "Normalizing iris image",
  "Extracting left iris features",
  "Checking left image quality",
  "Detecting right eye",
  "Locating pupil boundary",
  "Segmenting iris texture",
  "Normalizing iris image",
  "Extracting right iris features",
  "Checking right image quality",
  "Generating biometric template",
  "Encrypting template",
  "Checking for duplicate enrollment",
  "Computing quality metrics",
];

const STEP_DURATIONS_MS: [u64; 9] = [800, 600, 1200, 1200, 1000, 1500, 800, 600, 400];
const DEFAULT_STEP_MS: u64 = 800;
const COMPLETION_DELAY_MS: u64 = 500;

/// How long the scanner dwells on analysis step `step` (zero-based).
pub fn step_duration(step: usize) -> Duration {
  Duration::from_millis(
    STEP_DURATIONS_MS.get(step).copied().unwrap_or(DEFAULT_STEP_MS),
  )
}

// ─── Results ─────────────────────────────────────────────────────────────────

/// Per-criterion scores out of 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityMetrics {
  pub focus:          u8,
  pub illumination:   u8,
  pub occlusion:      u8,
  pub pupil_dilation: u8,
  pub overall:        u8,
}

impl QualityMetrics {
  pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
    let mut metrics = Self {
      focus:          rng.random_range(80..=99),
      illumination:   rng.random_range(85..=99),
      occlusion:      rng.random_range(90..=99),
      pupil_dilation: rng.random_range(75..=99),
      overall:        0,
    };
    metrics.overall = metrics.weighted_overall();
    metrics
  }

  /// `round(0.30·focus + 0.25·illumination + 0.25·occlusion + 0.20·pupil)`.
  pub fn weighted_overall(&self) -> u8 {
    let score = f64::from(self.focus) * 0.30
      + f64::from(self.illumination) * 0.25
      + f64::from(self.occlusion) * 0.25
      + f64::from(self.pupil_dilation) * 0.20;
    score.round().clamp(0.0, 100.0) as u8
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IrisQuality {
  Excellent,
  Good,
  Acceptable,
  Poor,
}

impl IrisQuality {
  pub fn from_overall(overall: u8) -> Self {
    match overall {
      90.. => Self::Excellent,
      80..=89 => Self::Good,
      70..=79 => Self::Acceptable,
      _ => Self::Poor,
    }
  }
}

/// Marker that the iris step finished, kept in the enrollment draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrisCapture {
  pub analysis_id:  String,
  pub completed_at: DateTime<Utc>,
  pub quality:      IrisQuality,
  pub metrics:      QualityMetrics,
}

/// One progress report from a running scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanProgress {
  /// Zero-based index into [`ANALYSIS_STEPS`].
  pub step:    usize,
  pub total:   usize,
  pub message: &'static str,
  pub percent: u8,
}

// ─── Scanner ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct IrisScanner {
  step_durations:   Vec<Duration>,
  completion_delay: Duration,
  /// Fixed seed for the quality metrics; thread RNG when `None`.
  seed:             Option<u64>,
}

impl Default for IrisScanner {
  fn default() -> Self {
    Self {
      step_durations:   (0..ANALYSIS_STEPS.len()).map(step_duration).collect(),
      completion_delay: Duration::from_millis(COMPLETION_DELAY_MS),
      seed:             None,
    }
  }
}

impl IrisScanner {
  pub fn new() -> Self { Self::default() }

  /// A scanner that never sleeps.
  pub fn instant() -> Self {
    Self {
      step_durations:   vec![Duration::ZERO; ANALYSIS_STEPS.len()],
      completion_delay: Duration::ZERO,
      seed:             None,
    }
  }

  /// Dwell times per analysis step. Steps past the end of `durations` do
  /// not dwell.
  pub fn with_step_durations(
    mut self,
    durations: impl IntoIterator<Item = Duration>,
  ) -> Self {
    self.step_durations = durations.into_iter().collect();
    self
  }

  pub fn with_completion_delay(mut self, delay: Duration) -> Self {
    self.completion_delay = delay;
    self
  }

  pub fn with_seed(mut self, seed: u64) -> Self {
    self.seed = Some(seed);
    self
  }

  /// Run a full scan, reporting each step on `progress` before dwelling on
  /// it. Progress is best-effort: a dropped receiver does not stop the scan.
  pub async fn run(
    &self,
    progress: &mpsc::UnboundedSender<ScanProgress>,
    cancel: &CancellationToken,
  ) -> Result<IrisCapture> {
    let total = ANALYSIS_STEPS.len();

    for (step, message) in ANALYSIS_STEPS.iter().enumerate() {
      let _ = progress.send(ScanProgress {
        step,
        total,
        message,
        percent: ((step + 1) * 100 / total) as u8,
      });
      let dwell = self.step_durations.get(step).copied().unwrap_or_default();
      pause(dwell, cancel).await?;
    }

    let metrics = match self.seed {
      Some(seed) => QualityMetrics::sample(&mut StdRng::seed_from_u64(seed)),
      None => QualityMetrics::sample(&mut rand::rng()),
    };
    pause(self.completion_delay, cancel).await?;

    let capture = IrisCapture {
      analysis_id: analysis_id(Utc::now()),
      completed_at: Utc::now(),
      quality: IrisQuality::from_overall(metrics.overall),
      metrics,
    };
    debug!(
      analysis_id = %capture.analysis_id,
      overall = capture.metrics.overall,
      "iris scan complete"
    );
    Ok(capture)
  }
}

async fn pause(duration: Duration, cancel: &CancellationToken) -> Result<()> {
  tokio::select! {
    biased;
    _ = cancel.cancelled() => Err(Error::Cancelled),
    _ = tokio::time::sleep(duration) => Ok(()),
  }
}

const BASE36: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

pub(crate) fn to_base36(mut n: u64) -> String {
  if n == 0 {
    return "0".into();
  }
  let mut digits = Vec::new();
  while n > 0 {
    digits.push(BASE36[(n % 36) as usize]);
    n /= 36;
  }
  digits.reverse();
  String::from_utf8_lossy(&digits).into_owned()
}

/// `count` uppercase base36 characters.
pub(crate) fn random_base36<R: Rng + ?Sized>(rng: &mut R, count: usize) -> String {
  (0..count)
    .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
    .collect()
}

/// `IRIS-<base36 millis>-<6 random base36>`.
fn analysis_id(now: DateTime<Utc>) -> String {
  let millis = u64::try_from(now.timestamp_millis()).unwrap_or_default();
  format!("IRIS-{}-{}", to_base36(millis), random_base36(&mut rand::rng(), 6))
}

#[cfg(test)]
mod tests {
  use std::time::Instant;

  use super::*;

  #[test]
  fn step_durations_follow_the_schedule() {
    assert_eq!(step_duration(0), Duration::from_millis(800));
    assert_eq!(step_duration(5), Duration::from_millis(1500));
    assert_eq!(step_duration(8), Duration::from_millis(400));
    assert_eq!(step_duration(9), Duration::from_millis(800));
    assert_eq!(step_duration(17), Duration::from_millis(800));
  }

  #[test]
  fn sampled_metrics_stay_in_range() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..500 {
      let m = QualityMetrics::sample(&mut rng);
      assert!((80..=99).contains(&m.focus));
      assert!((85..=99).contains(&m.illumination));
      assert!((90..=99).contains(&m.occlusion));
      assert!((75..=99).contains(&m.pupil_dilation));
      assert_eq!(m.overall, m.weighted_overall());
      assert!(m.overall >= 82);
    }
  }

  #[test]
  fn weighted_overall_rounds() {
    let m = QualityMetrics {
      focus:          90,
      illumination:   90,
      occlusion:      95,
      pupil_dilation: 80,
      overall:        0,
    };
    // 27 + 22.5 + 23.75 + 16 = 89.25
    assert_eq!(m.weighted_overall(), 89);
    assert_eq!(IrisQuality::from_overall(89), IrisQuality::Good);
    assert_eq!(IrisQuality::from_overall(90), IrisQuality::Excellent);
    assert_eq!(IrisQuality::from_overall(40), IrisQuality::Poor);
  }

  #[test]
  fn base36_encoding() {
    assert_eq!(to_base36(0), "0");
    assert_eq!(to_base36(35), "Z");
    assert_eq!(to_base36(36), "10");
    let s = random_base36(&mut StdRng::seed_from_u64(1), 7);
    assert_eq!(s.len(), 7);
    assert!(s.bytes().all(|b| BASE36.contains(&b)));
  }

  #[tokio::test]
  async fn scan_reports_every_step() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let capture = IrisScanner::instant()
      .run(&tx, &CancellationToken::new())
      .await
      .unwrap();
    drop(tx);

    let mut seen = Vec::new();
    while let Some(p) = rx.recv().await {
      seen.push(p);
    }
    assert_eq!(seen.len(), ANALYSIS_STEPS.len());
    assert_eq!(seen.last().unwrap().percent, 100);
    assert!(capture.analysis_id.starts_with("IRIS-"));
    assert_eq!(capture.quality, IrisQuality::from_overall(capture.metrics.overall));
  }

  #[tokio::test]
  async fn cancelled_scan_stops() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = IrisScanner::new().run(&tx, &cancel).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
  }

  #[tokio::test]
  async fn seeded_scans_repeat_their_metrics() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let scanner = IrisScanner::instant().with_seed(42);

    let a = scanner.run(&tx, &cancel).await.unwrap();
    let b = scanner.run(&tx, &cancel).await.unwrap();
    assert_eq!(a.metrics, b.metrics);
  }

  #[tokio::test]
  async fn custom_step_durations_are_honoured() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let scanner = IrisScanner::instant()
      .with_step_durations([Duration::from_millis(30), Duration::from_millis(30)]);

    let started = Instant::now();
    scanner.run(&tx, &CancellationToken::new()).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(60));
  }
}
