//!
//! src/simulator.rs  Andrew Belles  Oct 19th, 2026
//!
//! Fulfillment simulator. A tick driven state machine walks a session
//! through extraction, encoding, tagging and (optionally) finalizing on a
//! fixed schedule, then produces a placeholder artifact. Nothing is
//! downloaded, transcoded or tagged.
//!

use std::{fmt, str::FromStr, time::Duration};

use chrono::{DateTime, Utc};
use tokio::{sync::watch, task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::SonicError;
use crate::types::StampedTrack;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Extracting,
    Encoding,
    Tagging,
    Finalizing,
    Complete,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Extracting => "Extracting Audio Stream (yt-dlp)",
            Stage::Encoding => "Converting (FFmpeg)",
            Stage::Tagging => "Embedding ID3 Metadata (Mutagen)",
            Stage::Finalizing => "Finalizing Export",
            Stage::Complete => "Download Ready",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extracting => "extracting",
            Stage::Encoding => "encoding",
            Stage::Tagging => "tagging",
            Stage::Finalizing => "finalizing",
            Stage::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// One row of a schedule: the stage runs from `start` to `end` percent,
/// adding `step` every `interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePlan {
    pub stage: Stage,
    pub start: u8,
    pub end: u8,
    pub step: u8,
    pub interval: Duration,
}

const fn plan(stage: Stage, start: u8, end: u8, step: u8, interval_ms: u64) -> StagePlan {
    StagePlan { stage, start, end, step, interval: Duration::from_millis(interval_ms) }
}

const STANDARD: [StagePlan; 3] = [
    plan(Stage::Extracting, 0, 30, 2, 40),
    plan(Stage::Encoding, 30, 75, 1, 60),
    plan(Stage::Tagging, 75, 95, 3, 100),
];

const EXTENDED: [StagePlan; 4] = [
    plan(Stage::Extracting, 0, 25, 1, 50),
    plan(Stage::Encoding, 25, 70, 1, 80),
    plan(Stage::Tagging, 70, 90, 2, 150),
    plan(Stage::Finalizing, 90, 100, 5, 200),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Pipeline {
    #[default]
    Standard,
    Extended,
}

impl FromStr for Pipeline {
    type Err = SonicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" | "a" => Ok(Pipeline::Standard),
            "extended" | "b" => Ok(Pipeline::Extended),
            other => Err(SonicError::Config(format!("unknown pipeline: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    plans: Vec<StagePlan>,
}

impl Schedule {
    pub fn for_pipeline(pipeline: Pipeline) -> Result<Self, SonicError> {
        match pipeline {
            Pipeline::Standard => Self::new(STANDARD.to_vec()),
            Pipeline::Extended => Self::new(EXTENDED.to_vec()),
        }
    }

    /// Rejects schedules that could skip, stall or run backwards
    pub fn new(plans: Vec<StagePlan>) -> Result<Self, SonicError> {
        let Some(first) = plans.first() else {
            return Err(SonicError::Config("schedule has no stages".to_string()));
        };
        if first.start != 0 {
            return Err(SonicError::Config("schedule must start at 0".to_string()));
        }

        let mut prev: Option<&StagePlan> = None;
        for p in &plans {
            if p.stage == Stage::Complete {
                return Err(SonicError::Config("complete is terminal, not a stage".to_string()));
            }
            if p.end <= p.start || p.end > 100 || p.step == 0 {
                return Err(SonicError::Config(format!(
                    "stage {} has bad bounds {}..{} step {}", p.stage, p.start, p.end, p.step
                )));
            }
            if let Some(q) = prev {
                if p.stage <= q.stage || p.start != q.end {
                    return Err(SonicError::Config(format!(
                        "stage {} does not follow {}", p.stage, q.stage
                    )));
                }
            }
            prev = Some(p);
        }
        Ok(Self { plans })
    }

    /// Upper bound on wall time for one session
    pub fn total_duration(&self) -> Duration {
        self.plans.iter()
            .map(|p| {
                let ticks = (p.end - p.start).div_ceil(p.step);
                p.interval * u32::from(ticks)
            })
            .sum()
    }
}

/// Observable state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub stage: Stage,
    pub percent: u8,
}

impl Progress {
    pub fn is_complete(&self) -> bool {
        self.stage == Stage::Complete
    }
}

pub struct FulfillmentSession {
    id: Uuid,
    target: StampedTrack,
    schedule: Schedule,
    cursor: usize,
    percent: u8,
    started_at: DateTime<Utc>,
}

impl FulfillmentSession {
    pub fn new(id: Uuid, target: StampedTrack, schedule: Schedule) -> Self {
        let percent = schedule.plans.first().map(|p| p.start).unwrap_or(0);
        Self {
            id,
            target,
            schedule,
            cursor: 0,
            percent,
            started_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn stage(&self) -> Stage {
        self.schedule.plans.get(self.cursor)
            .map(|p| p.stage)
            .unwrap_or(Stage::Complete)
    }

    pub fn progress(&self) -> Progress {
        Progress { stage: self.stage(), percent: self.percent }
    }

    /// Wait before the next tick; `None` once complete
    pub fn next_interval(&self) -> Option<Duration> {
        self.schedule.plans.get(self.cursor).map(|p| p.interval)
    }

    /// Advances one step. Reaching a stage's end moves to the next stage
    /// in the same update; past the last stage the session is complete at
    /// 100. Ticking a complete session is a no-op.
    pub fn tick(&mut self) -> Progress {
        let Some(plan) = self.schedule.plans.get(self.cursor).copied() else {
            return self.progress();
        };

        self.percent = self.percent.saturating_add(plan.step).min(plan.end);
        if self.percent >= plan.end {
            self.cursor += 1;
            if self.cursor >= self.schedule.plans.len() {
                self.percent = 100;
            }
        }
        self.progress()
    }

    /// Drives the session to completion unless `cancel` fires first
    pub async fn run(
        mut self,
        progress: watch::Sender<Progress>,
        cancel: CancellationToken,
    ) -> SessionOutcome {
        info!(
            session = %self.id, title = %self.target.record.title,
            tier = %self.target.tier, "export.start"
        );

        while let Some(wait) = self.next_interval() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let last = self.progress();
                    info!(session = %self.id, stage = %last.stage,
                          percent = last.percent, "export.cancelled");
                    return SessionOutcome::Cancelled {
                        session_id: self.id,
                        target: self.target,
                        last,
                    };
                }
                _ = sleep(wait) => {}
            }

            let before = self.stage();
            let now = self.tick();
            if now.stage != before {
                debug!(session = %self.id, stage = %now.stage,
                       percent = now.percent, "export.stage");
            }
            // receivers may have gone away; the session still finishes
            let _ = progress.send(now);
        }

        let artifact = Artifact::synthesize(&self.target, self.id);
        let elapsed_ms = (Utc::now() - self.started_at).num_milliseconds();
        info!(session = %self.id, file = %artifact.file_name, elapsed_ms, "export.complete");
        SessionOutcome::Completed(Completed {
            session_id: self.id,
            target: self.target,
            artifact,
        })
    }
}

/// Placeholder payload handed to the save primitive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn synthesize(target: &StampedTrack, session_id: Uuid) -> Self {
        let r = &target.record;
        let body = format!(
            "SonicFetch simulated export\n\
             session: {session_id}\n\
             title: {}\nartist: {}\nalbum: {}\nyear: {}\ngenre: {}\nduration: {}\n\
             tier: {}\n\
             This file is a placeholder and contains no audio.\n",
            r.title, r.artist, r.album, r.year, r.genre, r.duration, target.tier.label()
        );
        Self {
            file_name: target.file_name(),
            mime: target.tier.mime(),
            bytes: body.into_bytes(),
        }
    }
}

/// Proof that a session reached `complete`
#[derive(Debug, Clone)]
pub struct Completed {
    pub session_id: Uuid,
    pub target: StampedTrack,
    pub artifact: Artifact,
}

#[derive(Debug, Clone)]
pub enum SessionOutcome {
    Completed(Completed),
    Cancelled {
        session_id: Uuid,
        target: StampedTrack,
        last: Progress,
    },
}

/// What a caller holds while an export runs
#[derive(Debug, Clone)]
pub struct ExportWatch {
    pub session_id: Uuid,
    pub progress: watch::Receiver<Progress>,
    pub cancel: CancellationToken,
}

/// Spawns the session on the runtime
pub fn spawn(session: FulfillmentSession) -> (ExportWatch, JoinHandle<SessionOutcome>) {
    let (tx, rx) = watch::channel(session.progress());
    let cancel = CancellationToken::new();
    let watch = ExportWatch {
        session_id: session.id(),
        progress: rx,
        cancel: cancel.clone(),
    };
    let handle = tokio::spawn(session.run(tx, cancel));
    (watch, handle)
}
