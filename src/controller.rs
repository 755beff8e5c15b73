//!
//! src/controller.rs  Andrew Belles  Oct 19th, 2026
//!
//! Single owner of the presentation state. Mediates between the
//! metadata query service, the fulfillment simulator and the sink
//!
//!

use std::path::PathBuf;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::errors::{SearchError, SonicError};
use crate::search::{MetadataBackend, MetadataQueryService};
use crate::simulator::{self, ExportWatch, FulfillmentSession, Schedule, SessionOutcome};
use crate::sink::ArtifactSink;
use crate::state::PresentationState;
use crate::types::{StampedTrack, Tier};

/// How an export ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportReport {
    Saved { target: StampedTrack, path: PathBuf },
    Cancelled { target: StampedTrack, percent: u8 },
}

struct Running {
    session_id: Uuid,
    cancel: CancellationToken,
    handle: JoinHandle<SessionOutcome>,
}

pub struct Controller<B, S> {
    state: PresentationState,
    service: MetadataQueryService<B>,
    schedule: Schedule,
    sink: S,
    running: Option<Running>,
}

impl<B: MetadataBackend, S: ArtifactSink> Controller<B, S> {
    pub fn new(service: MetadataQueryService<B>, schedule: Schedule, sink: S) -> Self {
        Self {
            state: PresentationState::new(),
            service,
            schedule,
            sink,
            running: None,
        }
    }

    pub fn state(&self) -> &PresentationState {
        &self.state
    }

    /// Runs a search and applies its result. Blank queries are rejected
    /// with `EmptyQuery` and leave everything as it was.
    pub async fn search(&mut self, query: &str) -> Result<usize, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        self.state.set_query(query.trim());
        self.state.set_loading(true);
        let result = self.service.search(query).await;
        self.state.set_loading(false);

        match result {
            Ok(outcome) => {
                let count = outcome.records.len();
                self.state.apply_results(outcome);
                Ok(count)
            }
            Err(e) => {
                warn!(error = %e, query = %self.state.query(), "controller.search.failed");
                self.state.apply_failure(e.clone());
                Err(e)
            }
        }
    }

    pub fn set_tier(&mut self, tier: Tier) {
        info!(tier = %tier, "controller.tier");
        self.state.set_tier(tier);
    }

    /// Starts the simulator for the record at `index`; rejected with
    /// `Busy` while another export runs.
    pub fn begin_export(&mut self, index: usize) -> Result<ExportWatch, SonicError> {
        let session_id = Uuid::new_v4();
        let target = self.state.begin_export(index, session_id)?;

        let session = FulfillmentSession::new(session_id, target, self.schedule.clone());
        let (watch, handle) = simulator::spawn(session);

        self.running = Some(Running { session_id, cancel: watch.cancel.clone(), handle });
        Ok(watch)
    }

    /// Waits for the running export. A completed session is saved and
    /// recorded; a cancelled one is dismissed without history.
    pub async fn finish_export(&mut self) -> Result<ExportReport, SonicError> {
        let running = self.running.take().ok_or(SonicError::NoActiveExport)?;

        let outcome = match running.handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.state.dismiss_export();
                return Err(e.into());
            }
        };

        match outcome {
            SessionOutcome::Completed(done) => {
                let saved = self.sink.save(&done.artifact);
                let path = match saved {
                    Ok(path) => path,
                    Err(e) => {
                        warn!(session = %done.session_id, error = %e, "controller.export.save_failed");
                        self.state.dismiss_export();
                        return Err(e);
                    }
                };
                self.state.complete_export(&done)?;
                info!(session = %running.session_id, path = %path.display(), "controller.export.saved");
                Ok(ExportReport::Saved { target: done.target, path })
            }
            SessionOutcome::Cancelled { session_id, target, last } => {
                self.state.dismiss_export();
                info!(session = %session_id, percent = last.percent, "controller.export.dismissed");
                Ok(ExportReport::Cancelled { target, percent: last.percent })
            }
        }
    }

    /// Cancels the running export and forgets it at once; its timer task
    /// winds down on its own.
    pub fn dismiss_export(&mut self) -> Result<StampedTrack, SonicError> {
        let running = self.running.take().ok_or(SonicError::NoActiveExport)?;
        running.cancel.cancel();
        let active = self.state.dismiss_export().ok_or(SonicError::NoActiveExport)?;
        info!(session = %running.session_id, "controller.export.dismissed");
        Ok(active.target)
    }

    /// Artwork to open for the result at `index`, placeholder included
    pub fn artwork_link(&self, index: usize) -> Result<Url, SonicError> {
        self.state.record(index)
            .map(|r| r.artwork_url())
            .ok_or_else(|| SonicError::NotFound(format!("no result at position {}", index + 1)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::search::fake::{reply_with, FakeBackend};
    use crate::search::BackendReply;
    use crate::simulator::{Artifact, Pipeline};
    use crate::sink::memory::MemorySink;

    type TestController = Controller<FakeBackend, Arc<MemorySink>>;

    fn controller_with<S: ArtifactSink>(backend: FakeBackend, sink: S) -> Controller<FakeBackend, S> {
        let service = MetadataQueryService::new(backend, 8, true);
        let schedule = Schedule::for_pipeline(Pipeline::Standard).expect("built-in schedule");
        Controller::new(service, schedule, sink)
    }

    fn controller(backend: FakeBackend) -> (TestController, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::default());
        (controller_with(backend, sink.clone()), sink)
    }

    /// Export directory that refuses every write
    struct FailingSink;

    impl ArtifactSink for FailingSink {
        fn save(&self, _artifact: &Artifact) -> Result<PathBuf, SonicError> {
            Err(SonicError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied, "export dir is read-only"
            )))
        }
    }

    fn saved_names(sink: &MemorySink) -> Vec<String> {
        sink.saved.lock()
            .map(|s| s.iter().map(|a| a.file_name.clone()).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn top_hits_are_displayed_with_the_active_tier() -> Result<(), SonicError> {
        let (mut ctl, _) = controller(FakeBackend::with(Ok(reply_with(8))));
        ctl.set_tier(Tier::Flac);

        assert_eq!(ctl.search("Top Hits 2024").await?, 8);
        let shown = ctl.state().displayed();
        assert_eq!(shown.len(), 8);
        assert!(shown.iter().all(|t| t.tier == Tier::Flac));
        assert_eq!(ctl.state().query(), "Top Hits 2024");
        assert!(!ctl.state().is_loading());
        Ok(())
    }

    #[tokio::test]
    async fn malformed_reply_leaves_an_empty_typed_failure() {
        let reply = BackendReply { text: "{not json".to_string(), sources: vec![] };
        let (mut ctl, _) = controller(FakeBackend::with(Ok(reply)));

        let result = ctl.search("anything").await;

        assert!(matches!(result, Err(SearchError::MalformedResponse(_))));
        assert_eq!(ctl.state().result_count(), 0);
        assert!(!ctl.state().is_loading());
        assert!(ctl.state().last_failure().is_some());
    }

    #[tokio::test]
    async fn blank_query_changes_nothing() -> Result<(), SonicError> {
        let backend = FakeBackend::with(Ok(reply_with(3)));
        let (mut ctl, _) = controller(backend.clone());
        ctl.search("first").await?;

        assert_eq!(ctl.search("   ").await, Err(SearchError::EmptyQuery));
        assert_eq!(backend.calls(), 1);
        assert_eq!(ctl.state().result_count(), 3);
        assert_eq!(ctl.state().query(), "first");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn lossless_export_is_saved_and_recorded() -> Result<(), SonicError> {
        let (mut ctl, sink) = controller(FakeBackend::with(Ok(reply_with(2))));
        ctl.search("x").await?;
        ctl.set_tier(Tier::Flac);

        let watch = ctl.begin_export(0)?;
        assert_eq!(ctl.state().active().map(|a| a.session_id), Some(watch.session_id));

        match ctl.finish_export().await? {
            ExportReport::Saved { target, .. } => assert_eq!(target.tier, Tier::Flac),
            other => panic!("expected save, got {other:?}"),
        }
        assert_eq!(saved_names(&sink), ["Artist 0 - Song 0 (FLAC).flac"]);
        assert_eq!(ctl.state().recent().count(), 1);
        assert!(ctl.state().active().is_none());
        assert_eq!(watch.progress.borrow().percent, 100);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_dismisses_without_history() -> Result<(), SonicError> {
        let mut ctl = controller_with(FakeBackend::with(Ok(reply_with(2))), FailingSink);
        ctl.search("x").await?;

        ctl.begin_export(0)?;
        assert!(matches!(ctl.finish_export().await, Err(SonicError::Io(_))));

        assert!(ctl.state().active().is_none());
        assert_eq!(ctl.state().recent().count(), 0);
        assert!(ctl.begin_export(1).is_ok());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn second_export_is_busy() -> Result<(), SonicError> {
        let (mut ctl, _) = controller(FakeBackend::with(Ok(reply_with(2))));
        ctl.search("x").await?;

        let first = ctl.begin_export(0)?;
        assert!(matches!(ctl.begin_export(1), Err(SonicError::Busy(id)) if id == first.session_id));

        ctl.finish_export().await?;
        assert!(ctl.begin_export(1).is_ok());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn dismissed_export_is_not_recorded() -> Result<(), SonicError> {
        let (mut ctl, sink) = controller(FakeBackend::with(Ok(reply_with(2))));
        ctl.search("x").await?;

        ctl.begin_export(0)?;
        let dismissed = ctl.dismiss_export()?;

        assert_eq!(dismissed.record.title, "Song 0");
        assert_eq!(ctl.state().recent().count(), 0);
        assert!(saved_names(&sink).is_empty());
        assert!(matches!(ctl.finish_export().await, Err(SonicError::NoActiveExport)));
        assert!(ctl.begin_export(1).is_ok());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_watch_yields_a_cancelled_report() -> Result<(), SonicError> {
        let (mut ctl, sink) = controller(FakeBackend::with(Ok(reply_with(1))));
        ctl.search("x").await?;

        let watch = ctl.begin_export(0)?;
        watch.cancel.cancel();

        match ctl.finish_export().await? {
            ExportReport::Cancelled { percent, .. } => assert!(percent < 100),
            other => panic!("expected cancellation, got {other:?}"),
        }
        assert_eq!(ctl.state().recent().count(), 0);
        assert!(ctl.state().active().is_none());
        assert!(saved_names(&sink).is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn sixth_completion_evicts_the_first() -> Result<(), SonicError> {
        let (mut ctl, _) = controller(FakeBackend::with(Ok(reply_with(6))));
        ctl.search("x").await?;

        for i in 0..6 {
            ctl.begin_export(i)?;
            ctl.finish_export().await?;
        }
        let titles: Vec<&str> = ctl.state().recent()
            .map(|t| t.record.title.as_str())
            .collect();
        assert_eq!(titles, ["Song 5", "Song 4", "Song 3", "Song 2", "Song 1"]);
        Ok(())
    }

    #[tokio::test]
    async fn artwork_link_points_at_the_record() -> Result<(), SonicError> {
        let (mut ctl, _) = controller(FakeBackend::with(Ok(reply_with(2))));
        ctl.search("x").await?;

        assert_eq!(ctl.artwork_link(1)?.as_str(), "https://example.com/1.jpg");
        assert!(matches!(ctl.artwork_link(7), Err(SonicError::NotFound(_))));
        Ok(())
    }
}
