//! Review Session Manager
//!
//! One session per identity, created on its first committed transition:
//!
//! ```text
//! Idle -> SourceSelected | ClozePromptPending -> Reviewing(cursor) -> Complete
//! ```
//!
//! The session map lock is only held to snapshot or apply state. Store calls
//! and question generation run outside it; results are applied only if the
//! session's generation is unchanged since the snapshot.
//!
//! Actions that move a session run one at a time per identity, holding that
//! identity's transition lock from snapshot through persist and commit. A
//! reset therefore never lands between a rating's check and its write.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::action::Action;
use super::error::{IdentityId, Result, ReviewError};
use super::view::ViewModel;
use crate::cloze::{ClozeGate, QuestionGenerator};
use crate::highlights::{sync_highlights, HighlightImporter};
use crate::review::algorithm::{compute_next_schedule_with, validate_quality};
use crate::review::due::{due_for_source, due_globally, source_summaries, DueScope};
use crate::review::reset::reset_source;
use crate::review::{NoteId, NoteUpdate, ReviewStore, SourceId};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    SourceSelected {
        source_id: SourceId,
    },
    ClozePromptPending {
        source_id: SourceId,
    },
    Reviewing {
        scope: DueScope,
        queue: Vec<NoteId>,
        cursor: usize,
        cloze: bool,
    },
    Complete {
        reviewed: usize,
    },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::SourceSelected { .. } => "a source is selected",
            Self::ClozePromptPending { .. } => "waiting for the cloze choice",
            Self::Reviewing { .. } => "reviewing",
            Self::Complete { .. } => "the review is complete",
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Session {
    state: SessionState,
    /// Bumped on every committed transition
    generation: u64,
}

pub struct SessionManager<S: ReviewStore + ?Sized, G: QuestionGenerator + ?Sized> {
    store: Arc<S>,
    gate: ClozeGate<S, G>,
    importer: Arc<dyn HighlightImporter>,
    authorized_identity: IdentityId,
    sessions: Mutex<HashMap<IdentityId, Session>>,
    transition_locks: Mutex<HashMap<IdentityId, Arc<AsyncMutex<()>>>>,
}

impl<S, G> SessionManager<S, G>
where
    S: ReviewStore + ?Sized,
    G: QuestionGenerator + ?Sized,
{
    pub fn new(
        store: Arc<S>,
        generator: Arc<G>,
        importer: Arc<dyn HighlightImporter>,
        authorized_identity: IdentityId,
        generator_timeout: Duration,
    ) -> Self {
        Self {
            gate: ClozeGate::new(Arc::clone(&store), generator, generator_timeout),
            store,
            importer,
            authorized_identity,
            sessions: Mutex::new(HashMap::new()),
            transition_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Daily prompt for an external timer to deliver
    pub fn scheduled_prompt(&self) -> ViewModel {
        ViewModel::scheduled_prompt()
    }

    /// Current state of an identity's session
    pub fn state(&self, identity: IdentityId) -> SessionState {
        self.snapshot(identity).state
    }

    /// Apply one action for `identity` and return what to show next.
    ///
    /// Errors leave the session as it was, with one exception: once a rating
    /// is persisted the cursor moves on even if rendering the next note
    /// fails. `Action::Resume` re-renders it.
    pub async fn handle(&self, identity: IdentityId, action: Action) -> Result<ViewModel> {
        if identity != self.authorized_identity {
            log::warn!(
                "Rejected {} from unauthorized identity {}",
                action.name(),
                identity
            );
            return Err(ReviewError::Unauthorized(identity));
        }

        log::debug!("Identity {} requested {}", identity, action.name());

        let _transition = match action {
            Action::Sync | Action::ListTopics | Action::Resume => None,
            _ => Some(self.lock_transitions(identity).await),
        };

        let result = match action {
            Action::SelectSource(source_id) => self.select_source(identity, source_id),
            Action::ConfirmCloze(enabled) => self.confirm_cloze(identity, enabled).await,
            Action::SubmitRating { note_id, score } => {
                self.submit_rating(identity, note_id, score).await
            }
            Action::Reset(source_id) => self.reset(identity, source_id),
            Action::Sync => self.sync(),
            Action::ListTopics => self.list_topics(),
            Action::StartScheduledReview => self.start_scheduled(identity).await,
            Action::Resume => self.resume(identity).await,
        };

        if let Err(e) = &result {
            log::warn!("{} failed for identity {}: {}", action.name(), identity, e);
        }
        result
    }

    fn select_source(&self, identity: IdentityId, source_id: SourceId) -> Result<ViewModel> {
        let source = self.store.get_source(source_id)?;

        let (state, view) = if source.cloze_enabled {
            (
                SessionState::ClozePromptPending { source_id },
                ViewModel::cloze_prompt(&source),
            )
        } else {
            (
                SessionState::SourceSelected { source_id },
                ViewModel::source_selected(&source),
            )
        };

        log::info!(
            "Identity {} selected source {} ({})",
            identity,
            source.id,
            source.title
        );
        self.replace_state(identity, state);
        Ok(view)
    }

    async fn confirm_cloze(&self, identity: IdentityId, enabled: bool) -> Result<ViewModel> {
        let action = Action::ConfirmCloze(enabled);
        let snapshot = self.snapshot(identity);
        let source_id = match &snapshot.state {
            SessionState::SourceSelected { source_id }
            | SessionState::ClozePromptPending { source_id } => *source_id,
            other => return Err(state_error(&action, other)),
        };

        let queue = due_for_source(self.store.as_ref(), source_id, Utc::now())?;
        if queue.is_empty() {
            log::info!("Nothing due for source {}", source_id);
            self.commit(
                identity,
                snapshot.generation,
                &action,
                SessionState::Complete { reviewed: 0 },
            )?;
            return Ok(ViewModel::complete(0));
        }

        let view = self.render_note(&queue.note_ids, 0, enabled).await?;

        log::info!(
            "Starting review of source {}: {} notes, cloze {}",
            source_id,
            queue.len(),
            if enabled { "on" } else { "off" }
        );
        self.commit(
            identity,
            snapshot.generation,
            &action,
            SessionState::Reviewing {
                scope: queue.scope,
                queue: queue.note_ids,
                cursor: 0,
                cloze: enabled,
            },
        )?;
        Ok(view)
    }

    async fn submit_rating(
        &self,
        identity: IdentityId,
        note_id: NoteId,
        score: i32,
    ) -> Result<ViewModel> {
        let action = Action::SubmitRating { note_id, score };
        let Session { state, generation } = self.snapshot(identity);
        let (scope, queue, cursor, cloze) = match state {
            SessionState::Reviewing {
                scope,
                queue,
                cursor,
                cloze,
            } => (scope, queue, cursor, cloze),
            other => return Err(state_error(&action, &other)),
        };

        if queue.get(cursor) != Some(&note_id) {
            return Err(ReviewError::InvalidInput(format!(
                "note {} is not the note under review",
                note_id
            )));
        }
        validate_quality(score)?;

        let note = self.store.get_note(note_id)?;
        let now = Utc::now();
        let schedule = compute_next_schedule_with(
            &mut rand::thread_rng(),
            now,
            note.review_count,
            note.interval,
            note.last_reviewed,
            score,
        )?;

        // Held transition lock makes this check and the write below atomic
        self.ensure_current(identity, generation, &action)?;
        self.store.update_note(
            note_id,
            &NoteUpdate {
                easiness_factor: Some(schedule.easiness_factor),
                next_due_date: Some(Some(schedule.next_due_date)),
                last_reviewed: Some(Some(now)),
                interval: Some(schedule.interval),
                review_count: Some(note.review_count + 1),
                ..NoteUpdate::default()
            },
        )?;

        log::info!(
            "Note {} rated {}: interval {} days, next review {}",
            note_id,
            score,
            schedule.interval,
            schedule.next_due_date
        );

        let next = cursor + 1;
        if next >= queue.len() {
            let reviewed = queue.len();
            self.commit(
                identity,
                generation,
                &action,
                SessionState::Complete { reviewed },
            )?;
            log::info!("Identity {} completed review of {} notes", identity, reviewed);
            return Ok(ViewModel::complete(reviewed));
        }

        self.commit(
            identity,
            generation,
            &action,
            SessionState::Reviewing {
                scope,
                queue: queue.clone(),
                cursor: next,
                cloze,
            },
        )?;
        self.render_note(&queue, next, cloze).await
    }

    fn reset(&self, identity: IdentityId, source_id: SourceId) -> Result<ViewModel> {
        let (source, affected) = reset_source(self.store.as_ref(), source_id)?;

        self.replace_state(identity, SessionState::Idle);
        Ok(ViewModel::reset_done(&source.title, affected))
    }

    fn sync(&self) -> Result<ViewModel> {
        let report = sync_highlights(self.store.as_ref(), self.importer.as_ref())?;
        Ok(ViewModel::synced(&report))
    }

    fn list_topics(&self) -> Result<ViewModel> {
        let summaries = source_summaries(self.store.as_ref(), Utc::now())?;
        Ok(ViewModel::topics(&summaries))
    }

    async fn start_scheduled(&self, identity: IdentityId) -> Result<ViewModel> {
        let queue = due_globally(self.store.as_ref(), Utc::now())?;
        if queue.is_empty() {
            log::info!("No notes left to review today");
            self.replace_state(identity, SessionState::Complete { reviewed: 0 });
            return Ok(ViewModel::complete(0));
        }

        let view = self.render_note(&queue.note_ids, 0, false).await?;

        log::info!("Starting scheduled review of {} notes", queue.len());
        self.replace_state(
            identity,
            SessionState::Reviewing {
                scope: queue.scope,
                queue: queue.note_ids,
                cursor: 0,
                cloze: false,
            },
        );
        Ok(view)
    }

    async fn resume(&self, identity: IdentityId) -> Result<ViewModel> {
        match self.snapshot(identity).state {
            SessionState::Reviewing {
                queue,
                cursor,
                cloze,
                ..
            } => self.render_note(&queue, cursor, cloze).await,
            SessionState::Complete { reviewed } => Ok(ViewModel::complete(reviewed)),
            other => Err(state_error(&Action::Resume, &other)),
        }
    }

    /// Fetch the note at `position`, filling its cloze pair when asked
    async fn render_note(&self, queue: &[NoteId], position: usize, cloze: bool) -> Result<ViewModel> {
        let note_id = queue.get(position).copied().ok_or_else(|| {
            ReviewError::InvalidInput(format!("no note at position {}", position))
        })?;

        let mut note = self.store.get_note(note_id)?;
        if cloze {
            note = self.gate.ensure_cloze(note).await?;
        }
        let source = self.store.get_source(note.source_id)?;

        Ok(ViewModel::note(&note, position, queue.len(), &source.title, cloze))
    }

    /// Waits for the identity's in-flight transition, if any, to finish
    async fn lock_transitions(&self, identity: IdentityId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .transition_locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(identity).or_default())
        };
        lock.lock_owned().await
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<IdentityId, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self, identity: IdentityId) -> Session {
        self.sessions().get(&identity).cloned().unwrap_or_default()
    }

    /// Unconditional transition used by the "start over" actions
    fn replace_state(&self, identity: IdentityId, state: SessionState) {
        let mut sessions = self.sessions();
        let session = sessions.entry(identity).or_default();
        log::debug!(
            "Identity {}: {} -> {}",
            identity,
            session.state.name(),
            state.name()
        );
        session.state = state;
        session.generation += 1;
    }

    /// Apply `state` only if nothing else was committed since `generation`
    fn commit(
        &self,
        identity: IdentityId,
        generation: u64,
        action: &Action,
        state: SessionState,
    ) -> Result<()> {
        let mut sessions = self.sessions();
        let session = sessions.entry(identity).or_default();
        if session.generation != generation {
            log::warn!(
                "Dropping stale {} for identity {}: session changed concurrently",
                action.name(),
                identity
            );
            return Err(state_error(action, &session.state));
        }

        log::debug!(
            "Identity {}: {} -> {}",
            identity,
            session.state.name(),
            state.name()
        );
        session.state = state;
        session.generation += 1;
        Ok(())
    }

    fn ensure_current(&self, identity: IdentityId, generation: u64, action: &Action) -> Result<()> {
        let sessions = self.sessions();
        match sessions.get(&identity) {
            Some(session) if session.generation == generation => Ok(()),
            Some(session) => Err(state_error(action, &session.state)),
            None if generation == 0 => Ok(()),
            None => Err(state_error(action, &SessionState::Idle)),
        }
    }
}

fn state_error(action: &Action, state: &SessionState) -> ReviewError {
    ReviewError::State {
        action: action.name(),
        state: state.name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloze::{ClozeQa, DisabledGenerator, GeneratorError, DEFAULT_GENERATOR_TIMEOUT};
    use crate::highlights::ImportError;
    use crate::review::{Highlight, NewNote, NewSource, Note, Source, SqliteReviewStore};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc;

    const USER: IdentityId = 42;

    #[derive(Default)]
    struct CountingGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QuestionGenerator for CountingGenerator {
        async fn generate_cloze(&self, content: &str) -> std::result::Result<ClozeQa, GeneratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ClozeQa {
                question: format!("{} ___", content.split_whitespace().next().unwrap_or("")),
                answer: content.to_string(),
            })
        }
    }

    /// Fails once on the second note, then behaves like `CountingGenerator`
    #[derive(Default)]
    struct SecondNoteFailsOnce {
        failed: AtomicBool,
        inner: CountingGenerator,
    }

    #[async_trait]
    impl QuestionGenerator for SecondNoteFailsOnce {
        async fn generate_cloze(&self, content: &str) -> std::result::Result<ClozeQa, GeneratorError> {
            if content.contains("number 2") && !self.failed.swap(true, Ordering::SeqCst) {
                return Err(GeneratorError::Api {
                    status: 503,
                    body: "overloaded".into(),
                });
            }
            self.inner.generate_cloze(content).await
        }
    }

    /// Holds the first rating write until the test releases it
    struct GatedStore {
        inner: SqliteReviewStore,
        entered: Mutex<Option<mpsc::Sender<()>>>,
        release: Mutex<Option<mpsc::Receiver<()>>>,
    }

    impl ReviewStore for GatedStore {
        fn get_source(&self, id: SourceId) -> crate::review::storage::Result<Source> {
            self.inner.get_source(id)
        }
        fn find_source_by_title(
            &self,
            title: &str,
        ) -> crate::review::storage::Result<Option<Source>> {
            self.inner.find_source_by_title(title)
        }
        fn list_sources(&self) -> crate::review::storage::Result<Vec<Source>> {
            self.inner.list_sources()
        }
        fn create_source(&self, source: &NewSource) -> crate::review::storage::Result<Source> {
            self.inner.create_source(source)
        }
        fn set_cloze_enabled(
            &self,
            id: SourceId,
            enabled: bool,
        ) -> crate::review::storage::Result<Source> {
            self.inner.set_cloze_enabled(id, enabled)
        }
        fn get_note(&self, id: NoteId) -> crate::review::storage::Result<Note> {
            self.inner.get_note(id)
        }
        fn create_note(&self, note: &NewNote) -> crate::review::storage::Result<Note> {
            self.inner.create_note(note)
        }
        fn update_note(
            &self,
            id: NoteId,
            update: &NoteUpdate,
        ) -> crate::review::storage::Result<Note> {
            if update.review_count.is_some() {
                if let Some(entered) = self.entered.lock().unwrap().take() {
                    entered.send(()).unwrap();
                    let release = self.release.lock().unwrap().take().unwrap();
                    release.recv().unwrap();
                }
            }
            self.inner.update_note(id, update)
        }
        fn note_exists(&self, title: &str, location: &str) -> crate::review::storage::Result<bool> {
            self.inner.note_exists(title, location)
        }
        fn notes_for_source(
            &self,
            source_id: SourceId,
            due_before: DateTime<Utc>,
        ) -> crate::review::storage::Result<Vec<Note>> {
            self.inner.notes_for_source(source_id, due_before)
        }
        fn pending_notes(
            &self,
            due_before: DateTime<Utc>,
        ) -> crate::review::storage::Result<Vec<Note>> {
            self.inner.pending_notes(due_before)
        }
        fn reset_source(&self, id: SourceId) -> crate::review::storage::Result<usize> {
            self.inner.reset_source(id)
        }
    }

    struct FixedImporter(Vec<Highlight>);

    impl HighlightImporter for FixedImporter {
        fn load_highlights(&self) -> std::result::Result<Vec<Highlight>, ImportError> {
            Ok(self.0.clone())
        }
    }

    fn setup_with<G: QuestionGenerator + 'static>(
        generator: G,
        highlights: Vec<Highlight>,
    ) -> (
        Arc<SqliteReviewStore>,
        Arc<G>,
        SessionManager<SqliteReviewStore, G>,
    ) {
        let store = Arc::new(SqliteReviewStore::open_in_memory().unwrap());
        let generator = Arc::new(generator);
        let manager = SessionManager::new(
            Arc::clone(&store),
            Arc::clone(&generator),
            Arc::new(FixedImporter(highlights)),
            USER,
            DEFAULT_GENERATOR_TIMEOUT,
        );
        (store, generator, manager)
    }

    fn setup() -> (
        Arc<SqliteReviewStore>,
        Arc<CountingGenerator>,
        SessionManager<SqliteReviewStore, CountingGenerator>,
    ) {
        setup_with(CountingGenerator::default(), Vec::new())
    }

    fn seed(store: &SqliteReviewStore, title: &str, count: usize) -> (Source, Vec<NoteId>) {
        let source = store.create_source(&NewSource::kindle(title)).unwrap();
        let ids = (0..count)
            .map(|i| {
                store
                    .create_note(&NewNote {
                        source_id: source.id,
                        content: format!("Highlight number {} of {}", i + 1, title),
                        location: format!("{}", 100 + i),
                    })
                    .unwrap()
                    .id
            })
            .collect();
        (source, ids)
    }

    fn rating(note_id: NoteId, score: i32) -> Action {
        Action::SubmitRating { note_id, score }
    }

    #[tokio::test]
    async fn test_two_fresh_notes_complete_after_two_ratings() {
        let (store, _, manager) = setup();
        let (source, ids) = seed(&store, "Book A", 2);
        // Stored timestamps are truncated to milliseconds
        let before = Utc::now() - ChronoDuration::milliseconds(1);

        let view = manager.handle(USER, Action::SelectSource(source.id)).await.unwrap();
        assert_eq!(
            manager.state(USER),
            SessionState::SourceSelected { source_id: source.id }
        );
        assert_eq!(view.keyboard_options[0].action, Action::ConfirmCloze(false));

        let view = manager.handle(USER, Action::ConfirmCloze(false)).await.unwrap();
        assert!(view.display_text.contains("Note #1/2"));
        assert!(view.display_text.contains("From: Book A"));

        let view = manager.handle(USER, rating(ids[0], 5)).await.unwrap();
        assert!(view.display_text.contains("Note #2/2"));
        assert!(!view.is_complete);

        let view = manager.handle(USER, rating(ids[1], 5)).await.unwrap();
        assert!(view.is_complete);
        assert_eq!(manager.state(USER), SessionState::Complete { reviewed: 2 });

        let after = Utc::now();
        for id in ids {
            let note = store.get_note(id).unwrap();
            assert_eq!(note.review_count, 1);
            assert_eq!(note.interval, 0);
            assert_eq!(note.easiness_factor, None);
            let due = note.next_due_date.unwrap();
            assert!(due >= before && due <= after);
            assert_eq!(note.last_reviewed, Some(due));
        }
    }

    #[tokio::test]
    async fn test_second_review_uses_one_day_tier() {
        let (store, _, manager) = setup();
        let (source, ids) = seed(&store, "Book A", 1);

        for _ in 0..2 {
            manager.handle(USER, Action::SelectSource(source.id)).await.unwrap();
            manager.handle(USER, Action::ConfirmCloze(false)).await.unwrap();
            manager.handle(USER, rating(ids[0], 3)).await.unwrap();
        }

        let note = store.get_note(ids[0]).unwrap();
        assert_eq!(note.review_count, 2);
        assert_eq!(note.interval, 1);
        let last = note.last_reviewed.unwrap();
        assert_eq!(note.next_due_date, Some(last + ChronoDuration::days(1)));
    }

    #[tokio::test]
    async fn test_actions_without_selection_are_state_errors() {
        let (store, _, manager) = setup();
        let (_, ids) = seed(&store, "Book A", 1);

        for action in [Action::ConfirmCloze(false), rating(ids[0], 4), Action::Resume] {
            let err = manager.handle(USER, action).await.unwrap_err();
            assert!(matches!(err, ReviewError::State { .. }), "{:?}", action);
        }
        assert_eq!(manager.state(USER), SessionState::Idle);
        assert_eq!(store.get_note(ids[0]).unwrap().review_count, 0);
    }

    #[tokio::test]
    async fn test_rating_during_cloze_prompt_keeps_state() {
        let (store, _, manager) = setup();
        let (source, ids) = seed(&store, "Book A", 1);
        store.set_cloze_enabled(source.id, true).unwrap();

        manager.handle(USER, Action::SelectSource(source.id)).await.unwrap();
        let pending = SessionState::ClozePromptPending { source_id: source.id };
        assert_eq!(manager.state(USER), pending);

        let err = manager.handle(USER, rating(ids[0], 5)).await.unwrap_err();
        assert!(matches!(err, ReviewError::State { .. }));
        assert_eq!(manager.state(USER), pending);
    }

    #[tokio::test]
    async fn test_invalid_score_and_wrong_note_do_not_mutate() {
        let (store, _, manager) = setup();
        let (source, ids) = seed(&store, "Book A", 2);
        manager.handle(USER, Action::SelectSource(source.id)).await.unwrap();
        manager.handle(USER, Action::ConfirmCloze(false)).await.unwrap();
        let reviewing = manager.state(USER);

        let err = manager.handle(USER, rating(ids[0], 7)).await.unwrap_err();
        assert!(matches!(err, ReviewError::InvalidScore(7)));

        let err = manager.handle(USER, rating(ids[1], 5)).await.unwrap_err();
        assert!(matches!(err, ReviewError::InvalidInput(_)));

        assert_eq!(manager.state(USER), reviewing);
        assert_eq!(store.get_note(ids[0]).unwrap().review_count, 0);
        assert_eq!(store.get_note(ids[1]).unwrap().review_count, 0);
    }

    #[tokio::test]
    async fn test_cloze_generated_once_across_renders() {
        let (store, generator, manager) = setup();
        let (source, ids) = seed(&store, "Book A", 1);
        store.set_cloze_enabled(source.id, true).unwrap();

        let prompt = manager.handle(USER, Action::SelectSource(source.id)).await.unwrap();
        assert_eq!(prompt.keyboard_options[0].action, Action::ConfirmCloze(true));

        let view = manager.handle(USER, Action::ConfirmCloze(true)).await.unwrap();
        assert!(view.display_text.contains("Highlight ___"));

        let again = manager.handle(USER, Action::Resume).await.unwrap();
        assert_eq!(again, view);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert!(store.get_note(ids[0]).unwrap().has_cloze());

        let done = manager.handle(USER, rating(ids[0], 4)).await.unwrap();
        assert!(done.is_complete);
    }

    #[tokio::test]
    async fn test_cloze_pair_generated_for_next_note() {
        let (store, generator, manager) = setup();
        let (source, ids) = seed(&store, "Book A", 2);
        store.set_cloze_enabled(source.id, true).unwrap();
        manager.handle(USER, Action::SelectSource(source.id)).await.unwrap();
        manager.handle(USER, Action::ConfirmCloze(true)).await.unwrap();
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert!(!store.get_note(ids[1]).unwrap().has_cloze());

        let view = manager.handle(USER, rating(ids[0], 4)).await.unwrap();

        assert!(view.display_text.contains("Note #2/2"));
        assert!(view.display_text.contains("❓ Highlight ___"));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
        let next = store.get_note(ids[1]).unwrap();
        assert!(next.has_cloze());
        assert_eq!(next.review_count, 0);
    }

    #[tokio::test]
    async fn test_failed_next_render_keeps_rating_and_resumes() {
        let (store, _, manager) = setup_with(SecondNoteFailsOnce::default(), Vec::new());
        let (source, ids) = seed(&store, "Book A", 2);
        store.set_cloze_enabled(source.id, true).unwrap();
        manager.handle(USER, Action::SelectSource(source.id)).await.unwrap();
        manager.handle(USER, Action::ConfirmCloze(true)).await.unwrap();

        let err = manager.handle(USER, rating(ids[0], 4)).await.unwrap_err();

        assert!(matches!(
            err,
            ReviewError::ExternalService { retryable: true, .. }
        ));
        assert_eq!(store.get_note(ids[0]).unwrap().review_count, 1);
        assert!(matches!(
            manager.state(USER),
            SessionState::Reviewing { cursor: 1, cloze: true, .. }
        ));

        let view = manager.handle(USER, Action::Resume).await.unwrap();
        assert!(view.display_text.contains("Note #2/2"));
        assert!(view.display_text.contains("❓ Highlight ___"));
        assert_eq!(store.get_note(ids[0]).unwrap().review_count, 1);
        assert_eq!(store.get_note(ids[1]).unwrap().review_count, 0);

        let done = manager.handle(USER, rating(ids[1], 5)).await.unwrap();
        assert!(done.is_complete);
        assert_eq!(store.get_note(ids[1]).unwrap().review_count, 1);
    }

    #[tokio::test]
    async fn test_generator_failure_preserves_state() {
        let (store, _, manager) = setup_with(DisabledGenerator, Vec::new());
        let (source, ids) = seed(&store, "Book A", 1);
        store.set_cloze_enabled(source.id, true).unwrap();
        manager.handle(USER, Action::SelectSource(source.id)).await.unwrap();

        let err = manager.handle(USER, Action::ConfirmCloze(true)).await.unwrap_err();

        assert!(matches!(
            err,
            ReviewError::ExternalService { retryable: false, .. }
        ));
        assert_eq!(
            manager.state(USER),
            SessionState::ClozePromptPending { source_id: source.id }
        );

        // Plain notes still work without a generator
        let view = manager.handle(USER, Action::ConfirmCloze(false)).await.unwrap();
        assert!(view.display_text.contains("Note #1/1"));
        assert!(!store.get_note(ids[0]).unwrap().has_cloze());
    }

    #[tokio::test]
    async fn test_unauthorized_identity_is_rejected() {
        let (store, _, manager) = setup();
        let (source, _) = seed(&store, "Book A", 1);

        let err = manager.handle(7, Action::SelectSource(source.id)).await.unwrap_err();

        assert!(matches!(err, ReviewError::Unauthorized(7)));
        assert!(manager.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_source_is_not_found() {
        let (_, _, manager) = setup();

        let err = manager.handle(USER, Action::SelectSource(99)).await.unwrap_err();

        assert!(matches!(err, ReviewError::NotFound(_)));
        assert_eq!(manager.state(USER), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_reset_from_reviewing_returns_to_idle() {
        let (store, _, manager) = setup();
        let (source, ids) = seed(&store, "Book A", 2);
        manager.handle(USER, Action::SelectSource(source.id)).await.unwrap();
        manager.handle(USER, Action::ConfirmCloze(false)).await.unwrap();
        manager.handle(USER, rating(ids[0], 5)).await.unwrap();

        let err = manager.handle(USER, Action::Reset(999)).await.unwrap_err();
        assert!(matches!(err, ReviewError::NotFound(_)));
        assert!(matches!(manager.state(USER), SessionState::Reviewing { cursor: 1, .. }));

        let view = manager.handle(USER, Action::Reset(source.id)).await.unwrap();
        assert!(view.display_text.contains("2 notes"));
        assert_eq!(manager.state(USER), SessionState::Idle);

        let note = store.get_note(ids[0]).unwrap();
        assert_eq!(note.review_count, 0);
        assert_eq!(note.next_due_date, None);
        assert_eq!(note.last_reviewed, None);
    }

    #[tokio::test]
    async fn test_empty_queue_completes_immediately() {
        let (store, _, manager) = setup();
        let (source, _) = seed(&store, "Empty Book", 0);
        manager.handle(USER, Action::SelectSource(source.id)).await.unwrap();

        let view = manager.handle(USER, Action::ConfirmCloze(false)).await.unwrap();

        assert!(view.is_complete);
        assert_eq!(manager.state(USER), SessionState::Complete { reviewed: 0 });
    }

    #[tokio::test]
    async fn test_scheduled_review_uses_global_queue() {
        let (store, _, manager) = setup();
        let (_, ids) = seed(&store, "Book A", 3);

        let view = manager.handle(USER, Action::StartScheduledReview).await.unwrap();
        assert!(view.is_complete);
        assert!(view.display_text.contains("No notes left"));

        let now = Utc::now();
        store
            .update_note(
                ids[0],
                &NoteUpdate {
                    next_due_date: Some(Some(now - ChronoDuration::days(1))),
                    last_reviewed: Some(Some(now - ChronoDuration::days(7))),
                    interval: Some(6),
                    review_count: Some(3),
                    ..NoteUpdate::default()
                },
            )
            .unwrap();
        store
            .update_note(
                ids[1],
                &NoteUpdate {
                    next_due_date: Some(Some(now + ChronoDuration::days(1))),
                    review_count: Some(2),
                    ..NoteUpdate::default()
                },
            )
            .unwrap();

        let view = manager.handle(USER, Action::StartScheduledReview).await.unwrap();
        assert!(view.display_text.contains("Note #1/1"));
        assert_eq!(
            manager.state(USER),
            SessionState::Reviewing {
                scope: DueScope::Global,
                queue: vec![ids[0]],
                cursor: 0,
                cloze: false,
            }
        );

        let done = manager.handle(USER, rating(ids[0], 4)).await.unwrap();
        assert!(done.is_complete);
        let note = store.get_note(ids[0]).unwrap();
        assert_eq!(note.review_count, 4);
        assert!(note.easiness_factor.is_some());
    }

    #[tokio::test]
    async fn test_stale_commit_is_rejected() {
        let (store, _, manager) = setup();
        let (source, _) = seed(&store, "Book A", 1);
        manager.handle(USER, Action::SelectSource(source.id)).await.unwrap();
        let stale = manager.snapshot(USER);

        // A concurrent selection lands first
        manager.handle(USER, Action::SelectSource(source.id)).await.unwrap();

        let err = manager
            .commit(
                USER,
                stale.generation,
                &Action::ConfirmCloze(false),
                SessionState::Complete { reviewed: 0 },
            )
            .unwrap_err();
        assert!(matches!(err, ReviewError::State { .. }));
        assert_eq!(
            manager.state(USER),
            SessionState::SourceSelected { source_id: source.id }
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reset_waits_for_inflight_rating() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let store = Arc::new(GatedStore {
            inner: SqliteReviewStore::open_in_memory().unwrap(),
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(Some(release_rx)),
        });
        let (source, ids) = seed(&store.inner, "Book A", 2);
        let manager = Arc::new(SessionManager::new(
            Arc::clone(&store),
            Arc::new(CountingGenerator::default()),
            Arc::new(FixedImporter(Vec::new())),
            USER,
            DEFAULT_GENERATOR_TIMEOUT,
        ));
        manager.handle(USER, Action::SelectSource(source.id)).await.unwrap();
        manager.handle(USER, Action::ConfirmCloze(false)).await.unwrap();

        let first = ids[0];
        let rating_task = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.handle(USER, rating(first, 5)).await }
        });
        tokio::task::spawn_blocking(move || entered_rx.recv())
            .await
            .unwrap()
            .unwrap();

        // The rating is now between its session check and its write
        let source_id = source.id;
        let reset_task = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.handle(USER, Action::Reset(source_id)).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!reset_task.is_finished());

        release_tx.send(()).unwrap();
        let rated = rating_task.await.unwrap().unwrap();
        assert!(rated.display_text.contains("Note #2/2"));
        let reset = reset_task.await.unwrap().unwrap();
        assert!(reset.display_text.contains("Book A (2 notes)"));

        assert_eq!(manager.state(USER), SessionState::Idle);
        let note = store.get_note(first).unwrap();
        assert_eq!(note.review_count, 0);
        assert_eq!(note.next_due_date, None);
        assert_eq!(note.last_reviewed, None);
    }

    #[tokio::test]
    async fn test_sync_then_list_topics() {
        let highlights = vec![
            Highlight {
                title: "Deep Work: Rules for Focused Success".into(),
                author: "Cal Newport".into(),
                location: "12".into(),
                date_added: None,
                content: "Clarity about what matters provides clarity about what does not.".into(),
            },
            Highlight {
                title: "Deep Work: Rules for Focused Success".into(),
                author: "Cal Newport".into(),
                location: "40".into(),
                date_added: None,
                content: "Efforts to deepen your focus will struggle.".into(),
            },
        ];
        let (store, _, manager) = setup_with(CountingGenerator::default(), highlights);

        let view = manager.handle(USER, Action::Sync).await.unwrap();
        assert!(view.display_text.contains("2 new"));
        let view = manager.handle(USER, Action::Sync).await.unwrap();
        assert!(view.display_text.contains("0 new, 2 already known"));

        let topics = manager.handle(USER, Action::ListTopics).await.unwrap();
        let source = store
            .find_source_by_title("Deep Work: Rules for Focused Success")
            .unwrap()
            .unwrap();
        assert!(topics.display_text.contains("(2 notes, 2 due)"));
        assert_eq!(topics.keyboard_options[0].label, "Deep Work");
        assert_eq!(
            topics.keyboard_options[0].action,
            Action::SelectSource(source.id)
        );
        assert_eq!(manager.state(USER), SessionState::Idle);
    }

    #[test]
    fn test_scheduled_prompt_offers_start() {
        let (_, _, manager) = setup();
        let prompt = manager.scheduled_prompt();
        assert_eq!(
            prompt.keyboard_options[0].action,
            Action::StartScheduledReview
        );
    }
}
