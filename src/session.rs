//! The long-lived organizer state an adapter talks to.
//!
//! A [`Session`] owns the category set, the settings and the undo log. At
//! most one batch runs at a time; it runs on a worker thread and reports
//! through a channel that the returned [`BatchHandle`] reads from.

use crate::batch::{
    BatchEvent, BatchListener, BatchRequest, BatchRun, BatchSummary, CancelToken, ChannelListener,
};
use crate::category::CategorySet;
use crate::config::{EntryFilter, Settings, ShelverConfig};
use crate::error::{SessionError, UndoError};
use crate::undo::{UndoLog, UndoReport};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

/// Clears the busy flag when dropped, including during a panic.
struct BusyGuard(Arc<AtomicBool>);

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Session {
    categories: CategorySet,
    settings: Settings,
    filter: EntryFilter,
    undo: Arc<Mutex<UndoLog>>,
    busy: Arc<AtomicBool>,
}

impl Session {
    pub fn new(categories: CategorySet, settings: Settings) -> Self {
        let undo = UndoLog::new(settings.undo_capacity);
        Self {
            categories,
            settings,
            filter: EntryFilter::default(),
            undo: Arc::new(Mutex::new(undo)),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Builds a session from a loaded configuration: preset, custom
    /// categories, overrides, settings and entry filters.
    pub fn from_config(config: &ShelverConfig) -> Result<Self, SessionError> {
        let categories = config.build_categories()?;
        let filter = config.compile_filters()?;
        Ok(Self::new(categories, config.organizer.clone()).with_filter(filter))
    }

    pub fn with_filter(mut self, filter: EntryFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn categories(&self) -> &CategorySet {
        &self.categories
    }

    /// Changes made here apply to batches started afterwards.
    pub fn categories_mut(&mut self) -> &mut CategorySet {
        &mut self.categories
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn set_category_override(&mut self, id: &str, name: &str) -> Result<(), SessionError> {
        self.categories.set_override(id, name)?;
        Ok(())
    }

    pub fn reset_category_names(&mut self) {
        self.categories.clear_overrides();
    }

    /// Start time and move count of each undoable batch, newest first.
    pub fn history(&self) -> Vec<(DateTime<Utc>, usize)> {
        self.undo_log()
            .iter()
            .map(|record| (record.started_at(), record.len()))
            .collect()
    }

    fn undo_log(&self) -> MutexGuard<'_, UndoLog> {
        self.undo.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Starts a batch on a worker thread.
    ///
    /// # Errors
    ///
    /// [`SessionError::BatchInProgress`] if a batch or an undo is running.
    pub fn start_batch(&self, request: BatchRequest) -> Result<BatchHandle, SessionError> {
        let guard = BusyGuard::acquire(&self.busy).ok_or(SessionError::BatchInProgress)?;

        let run = BatchRun::new(request, self.categories.clone(), &self.settings)
            .with_filter(self.filter.clone());
        let cancel = CancelToken::new();
        let (sender, events) = mpsc::channel();
        let undo = Arc::clone(&self.undo);
        let token = cancel.clone();

        let worker = thread::Builder::new()
            .name("shelver-batch".to_string())
            .spawn(move || {
                let mut listener = ChannelListener::new(sender);
                let summary = run.execute(&mut listener, &token, &undo);
                drop(guard);
                listener.on_terminal(summary.state, &summary);
                summary
            })
            .map_err(SessionError::Spawn)?;

        Ok(BatchHandle {
            events,
            cancel,
            worker: Some(worker),
        })
    }

    /// Requests cancellation. The batch stops before its next item.
    pub fn cancel_batch(&self, handle: &BatchHandle) {
        handle.cancel();
    }

    /// Runs a batch on the calling thread, reporting to `listener`.
    pub fn run_blocking<L>(
        &self,
        request: BatchRequest,
        listener: &mut L,
        cancel: &CancelToken,
    ) -> Result<BatchSummary, SessionError>
    where
        L: BatchListener + ?Sized,
    {
        let guard = BusyGuard::acquire(&self.busy).ok_or(SessionError::BatchInProgress)?;

        let summary = BatchRun::new(request, self.categories.clone(), &self.settings)
            .with_filter(self.filter.clone())
            .execute(listener, cancel, &self.undo);
        drop(guard);
        listener.on_terminal(summary.state, &summary);
        Ok(summary)
    }

    /// Reverts the most recent batch.
    ///
    /// # Errors
    ///
    /// [`UndoError::BatchRunning`] while a batch runs, otherwise whatever
    /// [`UndoLog::undo_last`] reports.
    pub fn undo_last(&self) -> Result<UndoReport, UndoError> {
        let _guard = BusyGuard::acquire(&self.busy).ok_or(UndoError::BatchRunning)?;
        self.undo_log().undo_last()
    }
}

/// The caller's side of a running batch.
pub struct BatchHandle {
    events: Receiver<BatchEvent>,
    cancel: CancelToken,
    worker: Option<JoinHandle<BatchSummary>>,
}

impl BatchHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Blocking iterator over events in emission order. Ends after the
    /// terminal event.
    pub fn events(&self) -> impl Iterator<Item = BatchEvent> + '_ {
        self.events.iter()
    }

    pub fn try_event(&self) -> Option<BatchEvent> {
        self.events.try_recv().ok()
    }

    /// Replays every event on `listener` as it arrives, then returns the
    /// summary.
    pub fn drive<L>(self, listener: &mut L) -> BatchSummary
    where
        L: BatchListener + ?Sized,
    {
        for event in self.events.iter() {
            match event {
                BatchEvent::Progress(percent) => listener.on_progress(percent),
                BatchEvent::Status { message, level } => listener.on_status(&message, level),
                BatchEvent::Unclassified {
                    extensions,
                    folders,
                } => listener.on_unclassified(&extensions, &folders),
                BatchEvent::Terminal { state, summary } => listener.on_terminal(state, &summary),
            }
        }
        self.wait()
    }

    /// Waits for the worker and returns its summary. Unread events are
    /// discarded.
    pub fn wait(mut self) -> BatchSummary {
        for _ in self.events.iter() {}
        match self.worker.take().map(JoinHandle::join) {
            Some(Ok(summary)) => summary,
            _ => BatchSummary::failed("Error organizing items: worker stopped unexpectedly".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchState;
    use crate::category::Preset;
    use std::fs;
    use tempfile::TempDir;

    fn session() -> Session {
        Session::new(Preset::Media.load().unwrap(), Settings::default())
    }

    fn fixture() -> (TempDir, BatchRequest) {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("in");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("a.mp4"), "v").unwrap();
        fs::write(src.join("b.png"), "i").unwrap();
        let request = BatchRequest::new(
            src,
            temp_dir.path().join("out"),
            ["Videos".to_string(), "Images".to_string()],
        );
        (temp_dir, request)
    }

    #[test]
    fn test_worker_events_arrive_in_order() {
        let session = session();
        let (_temp_dir, request) = fixture();

        let handle = session.start_batch(request).unwrap();
        let events: Vec<BatchEvent> = handle.events().collect();

        assert!(matches!(events[0], BatchEvent::Progress(50)));
        assert!(matches!(events[1], BatchEvent::Progress(100)));
        assert!(matches!(events[2], BatchEvent::Status { .. }));
        match &events[3] {
            BatchEvent::Terminal { state, summary } => {
                assert_eq!(*state, BatchState::Completed);
                assert_eq!(summary.files_moved, 2);
            }
            other => panic!("expected terminal event, got {:?}", other),
        }
        assert_eq!(events.len(), 4);
        assert!(!session.is_busy());
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn test_busy_flag_released_before_terminal_event() {
        let session = session();
        let (_temp_dir, request) = fixture();

        let handle = session.start_batch(request).unwrap();
        for event in handle.events() {
            if let BatchEvent::Terminal { .. } = event {
                assert!(!session.is_busy());
            }
        }
    }

    #[test]
    fn test_rejects_work_while_busy() {
        let session = session();
        let (_temp_dir, request) = fixture();
        session.busy.store(true, Ordering::SeqCst);

        assert!(matches!(
            session.start_batch(request.clone()),
            Err(SessionError::BatchInProgress)
        ));
        assert!(matches!(session.undo_last(), Err(UndoError::BatchRunning)));
        assert!(matches!(
            session.run_blocking(request, &mut (), &CancelToken::new()),
            Err(SessionError::BatchInProgress)
        ));

        session.busy.store(false, Ordering::SeqCst);
        assert!(matches!(session.undo_last(), Err(UndoError::NothingToUndo)));
    }

    #[test]
    fn test_wait_then_undo() {
        let session = session();
        let (temp_dir, request) = fixture();

        let summary = session.start_batch(request).unwrap().wait();
        assert_eq!(summary.state, BatchState::Completed);
        assert!(temp_dir.path().join("out/Videos/a.mp4").exists());

        let report = session.undo_last().unwrap();
        assert_eq!(report.restored, 2);
        assert!(temp_dir.path().join("in/a.mp4").exists());
        assert!(temp_dir.path().join("in/b.png").exists());
    }

    #[test]
    fn test_cancel_before_first_item() {
        let session = session();
        let (temp_dir, request) = fixture();

        let cancel = CancelToken::new();
        cancel.cancel();
        let summary = session.run_blocking(request, &mut (), &cancel).unwrap();

        assert_eq!(summary.state, BatchState::Cancelled);
        assert_eq!(summary.processed, 0);
        assert!(temp_dir.path().join("in/a.mp4").exists());
        assert!(session.history().is_empty());
    }

    #[derive(Default)]
    struct Counter {
        progress: usize,
        terminal: usize,
    }

    impl BatchListener for Counter {
        fn on_progress(&mut self, _percent: u8) {
            self.progress += 1;
        }

        fn on_terminal(&mut self, _state: BatchState, _summary: &BatchSummary) {
            self.terminal += 1;
        }
    }

    #[test]
    fn test_drive_replays_events_on_listener() {
        let session = session();
        let (_temp_dir, request) = fixture();

        let mut counter = Counter::default();
        let summary = session.start_batch(request).unwrap().drive(&mut counter);

        assert_eq!(summary.processed, 2);
        assert_eq!(counter.progress, 2);
        assert_eq!(counter.terminal, 1);
    }

    #[test]
    fn test_clear_undo_on_start() {
        let settings = Settings {
            clear_undo_on_start: true,
            ..Settings::default()
        };
        let session = Session::new(Preset::Media.load().unwrap(), settings);

        let (_first, request) = fixture();
        session.start_batch(request).unwrap().wait();
        let (_second, request) = fixture();
        session.start_batch(request).unwrap().wait();

        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn test_refused_batch_keeps_history_with_clear_on_start() {
        let settings = Settings {
            clear_undo_on_start: true,
            ..Settings::default()
        };
        let session = Session::new(Preset::Media.load().unwrap(), settings);

        let (temp_dir, request) = fixture();
        session.start_batch(request).unwrap().wait();
        assert_eq!(session.history().len(), 1);

        let missing = BatchRequest::new(
            temp_dir.path().join("missing"),
            temp_dir.path().join("out"),
            ["Videos".to_string()],
        );
        let summary = session.start_batch(missing).unwrap().wait();
        assert_eq!(summary.state, BatchState::Failed);

        let unknown = BatchRequest::new(
            temp_dir.path().join("in"),
            temp_dir.path().join("out"),
            ["Nope".to_string()],
        );
        let summary = session.run_blocking(unknown, &mut (), &CancelToken::new()).unwrap();
        assert_eq!(summary.state, BatchState::Failed);

        assert_eq!(session.history().len(), 1);
        assert_eq!(session.undo_last().unwrap().restored, 2);
    }

    #[test]
    fn test_override_applies_to_next_batch() {
        let mut session = session();
        session.set_category_override("Videos", "Footage").unwrap();
        assert!(session.set_category_override("Nope", "x").is_err());

        let (temp_dir, request) = fixture();
        session.start_batch(request).unwrap().wait();
        assert!(temp_dir.path().join("out/Footage/a.mp4").exists());

        session.reset_category_names();
        assert_eq!(session.categories().resolve_destination_name("Videos"), "Videos");
    }
}
