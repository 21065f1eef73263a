//! Task lifecycle manager — owns the state machine per task.
//!
//! Creation, poll scheduling, status interpretation, retry/backoff on
//! transient failure, terminal transition, and terminal notifications.
//! All collaborators are injected handles; the manager holds no ambient
//! state beyond a shadow cache of the last-persisted record per task,
//! used when the store is degraded.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::error::{Error, TaskError};
use crate::notify::{AgentEvent, Notifier};
use crate::remote::{JobClient, JobStatus};
use crate::store::Database;
use crate::task::model::{TaskRecord, TaskState};
use crate::task::scheduler::PollScheduler;

/// Drives each task from creation to a terminal state via scheduled polls.
pub struct LifecycleManager {
    store: Arc<dyn Database>,
    client: Arc<dyn JobClient>,
    scheduler: Arc<dyn PollScheduler>,
    notifier: Arc<Notifier>,
    config: AgentConfig,
    /// Last known record per task, kept so a store outage never aborts an
    /// in-flight generation. Refreshed on every load and persist.
    fallback: RwLock<HashMap<Uuid, TaskRecord>>,
}

impl LifecycleManager {
    pub fn new(
        store: Arc<dyn Database>,
        client: Arc<dyn JobClient>,
        scheduler: Arc<dyn PollScheduler>,
        notifier: Arc<Notifier>,
        config: AgentConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            client,
            scheduler,
            notifier,
            config,
            fallback: RwLock::new(HashMap::new()),
        })
    }

    /// Start a new image-generation task.
    ///
    /// Calls the remote create operation first; on failure no task is
    /// persisted and the error is returned to the caller. On success the
    /// task is written as `Running` and the first poll is scheduled.
    pub async fn start(&self, prompt: &str) -> Result<TaskRecord, Error> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(TaskError::EmptyPrompt.into());
        }

        let job_id = self.client.create_job(prompt).await?;

        let mut task = TaskRecord::new(prompt);
        task.mark_running(&job_id)?;
        self.persist(&task).await;

        info!(task_id = %task.id, job_id = %job_id, "Image generation started");
        self.notifier
            .announce(
                AgentEvent::TaskStarted { task: task.clone() },
                &format!("🎨 Generating an image for \"{prompt}\"…"),
            )
            .await;

        self.scheduler
            .schedule_poll(self.config.initial_poll_delay, task.id);
        Ok(task)
    }

    /// One scheduled status check. The sole driver of all transitions after
    /// creation; safe to invoke on terminal or duplicate schedules.
    pub async fn poll_attempt(&self, task_id: Uuid) -> Result<(), Error> {
        let Some(mut task) = self.load(task_id).await else {
            error!(task_id = %task_id, "Poll for unknown task; giving up");
            return Ok(());
        };

        // Duplicate or late-scheduled attempts on a settled task are no-ops.
        if task.state != TaskState::Running {
            debug!(task_id = %task_id, state = %task.state, "Poll on non-running task ignored");
            return Ok(());
        }

        let Some(job_id) = task.external_job_id.clone() else {
            error!(task_id = %task_id, "Running task has no remote job id; giving up");
            return Ok(());
        };

        match self.client.job_status(&job_id).await {
            Err(e) => {
                // Never terminal by itself; retry with backoff.
                warn!(task_id = %task_id, error = %e, "Status check failed; will retry");
                task.touch();
                self.persist(&task).await;
                self.notifier.broadcast(AgentEvent::TaskRetrying {
                    id: task.id,
                    reason: e.to_string(),
                });
                self.scheduler
                    .schedule_poll(self.config.retry_backoff, task.id);
            }
            Ok(JobStatus::Running) => {
                task.touch();
                self.persist(&task).await;
                self.notifier
                    .broadcast(AgentEvent::TaskProgress { id: task.id });
                self.scheduler
                    .schedule_poll(self.config.poll_interval, task.id);
            }
            Ok(JobStatus::Completed { result_url }) => {
                // Best-effort enrichment: copy the result into durable storage.
                let (url, stored_name, degraded) =
                    match self.client.store_object(&result_url).await {
                        Ok(stored) => (stored.url, Some(stored.name), false),
                        Err(e) => {
                            warn!(task_id = %task_id, error = %e, "Storing image failed; keeping original URL");
                            (result_url, None, true)
                        }
                    };

                task.complete(&url, stored_name)?;
                // Durably record the transition before notifying.
                self.persist(&task).await;

                let text = match (&task.stored_name, degraded) {
                    (Some(name), _) => format!("✅ Your image is ready: {url} (saved as {name})"),
                    (None, true) => {
                        format!("✅ Your image is ready: {url} (saving a copy failed)")
                    }
                    (None, false) => format!("✅ Your image is ready: {url}"),
                };
                info!(task_id = %task.id, url = %url, "Image generation completed");
                self.notifier
                    .announce(
                        AgentEvent::TaskCompleted {
                            task: task.clone(),
                            degraded,
                        },
                        &text,
                    )
                    .await;
                // Terminal: no further polls for this task.
            }
            Ok(JobStatus::Failed) => {
                task.fail()?;
                self.persist(&task).await;

                info!(task_id = %task.id, "Image generation failed");
                self.notifier
                    .announce(
                        AgentEvent::TaskFailed { id: task.id },
                        &format!("❌ Image generation failed for \"{}\"", task.prompt),
                    )
                    .await;
            }
        }

        Ok(())
    }

    /// Reschedule polls for tasks that were `Running` when the process last
    /// stopped. Returns the number of tasks recovered.
    pub async fn recover(&self) -> usize {
        let tasks = match self.store.list_tasks().await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(error = %e, "Startup recovery skipped; store unavailable");
                return 0;
            }
        };

        let mut recovered = 0;
        for task in tasks {
            if task.state == TaskState::Running {
                self.fallback.write().await.insert(task.id, task.clone());
                self.scheduler
                    .schedule_poll(self.config.initial_poll_delay, task.id);
                recovered += 1;
            }
        }
        if recovered > 0 {
            info!(count = recovered, "Recovered running tasks from store");
        }
        recovered
    }

    /// Load a task, falling back to the shadow cache when the store is
    /// degraded or the record is missing.
    async fn load(&self, task_id: Uuid) -> Option<TaskRecord> {
        match self.store.get_task(task_id).await {
            Ok(Some(task)) => {
                self.fallback.write().await.insert(task_id, task.clone());
                Some(task)
            }
            Ok(None) => {
                warn!(task_id = %task_id, "Task missing from store; using in-memory record");
                self.fallback.read().await.get(&task_id).cloned()
            }
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Store read failed; using in-memory record");
                self.fallback.read().await.get(&task_id).cloned()
            }
        }
    }

    /// Persist a record, always updating the shadow cache first. A store
    /// failure is logged and absorbed; the next poll re-persists.
    async fn persist(&self, task: &TaskRecord) {
        self.fallback.write().await.insert(task.id, task.clone());
        if let Err(e) = self.store.put_task(task).await {
            warn!(task_id = %task.id, error = %e, "Persisting task failed; continuing in-memory");
        }
    }
}

/// Drain scheduled poll wake-ups into `poll_attempt` calls.
pub fn spawn_poll_pump(
    manager: Arc<LifecycleManager>,
    mut rx: mpsc::UnboundedReceiver<Uuid>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(task_id) = rx.recv().await {
            if let Err(e) = manager.poll_attempt(task_id).await {
                warn!(task_id = %task_id, error = %e, "Poll attempt failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;
    use crate::error::{DatabaseError, RemoteError};
    use crate::remote::StoredObject;
    use crate::store::{ChatMessage, LibSqlBackend};

    // ── Test doubles ────────────────────────────────────────────────

    /// Programmable job client: each call pops the next scripted result.
    #[derive(Default)]
    struct MockJobClient {
        create_results: Mutex<VecDeque<Result<String, RemoteError>>>,
        status_results: Mutex<VecDeque<Result<JobStatus, RemoteError>>>,
        store_results: Mutex<VecDeque<Result<StoredObject, RemoteError>>>,
        status_calls: AtomicUsize,
        store_calls: AtomicUsize,
    }

    impl MockJobClient {
        fn script_create(&self, result: Result<String, RemoteError>) {
            self.create_results.lock().unwrap().push_back(result);
        }
        fn script_status(&self, result: Result<JobStatus, RemoteError>) {
            self.status_results.lock().unwrap().push_back(result);
        }
        fn script_store(&self, result: Result<StoredObject, RemoteError>) {
            self.store_results.lock().unwrap().push_back(result);
        }
    }

    #[async_trait]
    impl JobClient for MockJobClient {
        async fn create_job(&self, _prompt: &str) -> Result<String, RemoteError> {
            self.create_results
                .lock()
                .unwrap()
                .pop_front()
                .expect("unscripted create_job call")
        }

        async fn job_status(&self, _job_id: &str) -> Result<JobStatus, RemoteError> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            self.status_results
                .lock()
                .unwrap()
                .pop_front()
                .expect("unscripted job_status call")
        }

        async fn store_object(&self, _source_url: &str) -> Result<StoredObject, RemoteError> {
            self.store_calls.fetch_add(1, Ordering::SeqCst);
            self.store_results
                .lock()
                .unwrap()
                .pop_front()
                .expect("unscripted store_object call")
        }
    }

    /// Scheduler that records every request instead of timing anything.
    #[derive(Default)]
    struct RecordingScheduler {
        scheduled: Mutex<Vec<(Duration, Uuid)>>,
    }

    impl RecordingScheduler {
        fn scheduled(&self) -> Vec<(Duration, Uuid)> {
            self.scheduled.lock().unwrap().clone()
        }
    }

    impl PollScheduler for RecordingScheduler {
        fn schedule_poll(&self, delay: Duration, task_id: Uuid) {
            self.scheduled.lock().unwrap().push((delay, task_id));
        }
    }

    /// Store wrapper whose reads/writes can be switched to fail.
    struct FlakyStore {
        inner: LibSqlBackend,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
    }

    impl FlakyStore {
        async fn new() -> Self {
            Self {
                inner: LibSqlBackend::new_memory().await.unwrap(),
                fail_reads: AtomicBool::new(false),
                fail_writes: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl Database for FlakyStore {
        async fn run_migrations(&self) -> Result<(), DatabaseError> {
            self.inner.run_migrations().await
        }
        async fn put_task(&self, task: &TaskRecord) -> Result<(), DatabaseError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(DatabaseError::Query("disk is on fire".into()));
            }
            self.inner.put_task(task).await
        }
        async fn get_task(&self, id: Uuid) -> Result<Option<TaskRecord>, DatabaseError> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(DatabaseError::Query("disk is on fire".into()));
            }
            self.inner.get_task(id).await
        }
        async fn list_tasks(&self) -> Result<Vec<TaskRecord>, DatabaseError> {
            self.inner.list_tasks().await
        }
        async fn append_chat_message(&self, role: &str, content: &str) -> Result<(), DatabaseError> {
            self.inner.append_chat_message(role, content).await
        }
        async fn list_chat_messages(&self, limit: usize) -> Result<Vec<ChatMessage>, DatabaseError> {
            self.inner.list_chat_messages(limit).await
        }
    }

    struct Harness {
        manager: Arc<LifecycleManager>,
        client: Arc<MockJobClient>,
        scheduler: Arc<RecordingScheduler>,
        store: Arc<dyn Database>,
        notifier: Arc<Notifier>,
    }

    fn test_config() -> AgentConfig {
        AgentConfig {
            initial_poll_delay: Duration::from_secs(5),
            poll_interval: Duration::from_secs(10),
            retry_backoff: Duration::from_secs(15),
            ..AgentConfig::default()
        }
    }

    async fn harness_with_store(store: Arc<dyn Database>) -> Harness {
        let client = Arc::new(MockJobClient::default());
        let scheduler = Arc::new(RecordingScheduler::default());
        let notifier = Notifier::new(Arc::clone(&store));
        let manager = LifecycleManager::new(
            Arc::clone(&store),
            client.clone() as Arc<dyn JobClient>,
            scheduler.clone() as Arc<dyn PollScheduler>,
            Arc::clone(&notifier),
            test_config(),
        );
        Harness {
            manager,
            client,
            scheduler,
            store,
            notifier,
        }
    }

    async fn harness() -> Harness {
        let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        harness_with_store(store).await
    }

    /// Drain all immediately-available events.
    fn drain(rx: &mut tokio::sync::broadcast::Receiver<AgentEvent>) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                Err(TryRecvError::Lagged(_)) => continue,
            }
        }
        events
    }

    // ── Start ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn start_persists_running_and_schedules_first_poll() {
        let h = harness().await;
        let mut events = h.notifier.subscribe();
        h.client.script_create(Ok("job-1".into()));

        let task = h.manager.start("a red bicycle").await.unwrap();

        assert_eq!(task.state, TaskState::Running);
        assert_eq!(task.external_job_id.as_deref(), Some("job-1"));

        let stored = h.store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.state, TaskState::Running);

        let scheduled = h.scheduler.scheduled();
        assert_eq!(scheduled, vec![(Duration::from_secs(5), task.id)]);

        let events = drain(&mut events);
        assert!(matches!(events.as_slice(), [AgentEvent::TaskStarted { .. }]));
    }

    #[tokio::test]
    async fn start_failure_leaves_no_partial_state() {
        let h = harness().await;
        h.client
            .script_create(Err(RemoteError::Unavailable("connection refused".into())));

        let err = h.manager.start("a red bicycle").await.unwrap_err();
        assert!(matches!(err, Error::Remote(RemoteError::Unavailable(_))));

        assert!(h.store.list_tasks().await.unwrap().is_empty());
        assert!(h.scheduler.scheduled().is_empty());
    }

    #[tokio::test]
    async fn start_rejects_empty_prompt() {
        let h = harness().await;
        let err = h.manager.start("   ").await.unwrap_err();
        assert!(matches!(err, Error::Task(TaskError::EmptyPrompt)));
        assert!(h.store.list_tasks().await.unwrap().is_empty());
    }

    // ── Polling ─────────────────────────────────────────────────────

    async fn started_task(h: &Harness) -> TaskRecord {
        h.client.script_create(Ok("job-1".into()));
        h.manager.start("a red bicycle").await.unwrap()
    }

    #[tokio::test]
    async fn poll_running_reschedules_at_poll_interval() {
        let h = harness().await;
        let task = started_task(&h).await;
        let before = h.store.get_task(task.id).await.unwrap().unwrap().updated_at;
        let mut events = h.notifier.subscribe();

        tokio::time::sleep(Duration::from_millis(5)).await;
        h.client.script_status(Ok(JobStatus::Running));
        h.manager.poll_attempt(task.id).await.unwrap();

        let stored = h.store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.state, TaskState::Running);
        assert!(stored.updated_at > before);

        // start scheduled the first poll; this one rescheduled at poll_interval.
        let scheduled = h.scheduler.scheduled();
        assert_eq!(scheduled.last(), Some(&(Duration::from_secs(10), task.id)));

        let events = drain(&mut events);
        assert!(matches!(events.as_slice(), [AgentEvent::TaskProgress { .. }]));
    }

    #[tokio::test]
    async fn poll_transport_failure_retries_with_backoff() {
        let h = harness().await;
        let task = started_task(&h).await;
        let mut events = h.notifier.subscribe();

        h.client
            .script_status(Err(RemoteError::Unavailable("timeout".into())));
        h.manager.poll_attempt(task.id).await.unwrap();

        // Never terminal by itself: still Running, retry at retry_backoff.
        let stored = h.store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.state, TaskState::Running);
        assert_eq!(
            h.scheduler.scheduled().last(),
            Some(&(Duration::from_secs(15), task.id))
        );

        let events = drain(&mut events);
        match events.as_slice() {
            [AgentEvent::TaskRetrying { id, reason }] => {
                assert_eq!(*id, task.id);
                assert!(reason.contains("timeout"));
            }
            other => panic!("Expected one TaskRetrying, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn poll_completed_stores_object_and_notifies_once() {
        let h = harness().await;
        let task = started_task(&h).await;
        let mut events = h.notifier.subscribe();

        h.client.script_status(Ok(JobStatus::Completed {
            result_url: "https://x/img.png".into(),
        }));
        h.client.script_store(Ok(StoredObject {
            url: "https://store/img.png".into(),
            name: "img.png".into(),
        }));
        h.manager.poll_attempt(task.id).await.unwrap();

        let stored = h.store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.state, TaskState::Completed);
        assert_eq!(stored.result_url.as_deref(), Some("https://store/img.png"));
        assert_eq!(stored.stored_name.as_deref(), Some("img.png"));

        // No reschedule after a terminal transition.
        let schedules_before = h.scheduler.scheduled().len();
        assert_eq!(schedules_before, 1); // only the schedule from start()

        let events = drain(&mut events);
        match events.as_slice() {
            [AgentEvent::TaskCompleted { task: t, degraded }] => {
                assert_eq!(t.id, task.id);
                assert!(!degraded);
            }
            other => panic!("Expected exactly one TaskCompleted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn enrichment_failure_keeps_original_url_and_completes() {
        let h = harness().await;
        let task = started_task(&h).await;
        let mut events = h.notifier.subscribe();

        h.client.script_status(Ok(JobStatus::Completed {
            result_url: "https://x/img.png".into(),
        }));
        h.client
            .script_store(Err(RemoteError::Unavailable("filestore down".into())));
        h.manager.poll_attempt(task.id).await.unwrap();

        let stored = h.store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.state, TaskState::Completed);
        assert_eq!(stored.result_url.as_deref(), Some("https://x/img.png"));
        assert!(stored.stored_name.is_none());

        let events = drain(&mut events);
        match events.as_slice() {
            [AgentEvent::TaskCompleted { degraded, .. }] => assert!(degraded),
            other => panic!("Expected one degraded TaskCompleted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn poll_failed_marks_failed_and_notifies_once() {
        let h = harness().await;
        let task = started_task(&h).await;
        let mut events = h.notifier.subscribe();

        h.client.script_status(Ok(JobStatus::Failed));
        h.manager.poll_attempt(task.id).await.unwrap();

        let stored = h.store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.state, TaskState::Failed);
        assert!(stored.result_url.is_none());
        assert_eq!(h.scheduler.scheduled().len(), 1); // only the schedule from start()

        let events = drain(&mut events);
        assert!(matches!(events.as_slice(), [AgentEvent::TaskFailed { .. }]));
        assert_eq!(h.client.store_calls.load(Ordering::SeqCst), 0);
    }

    // ── Idempotence ─────────────────────────────────────────────────

    #[tokio::test]
    async fn poll_on_terminal_task_is_noop() {
        let h = harness().await;
        let task = started_task(&h).await;

        h.client.script_status(Ok(JobStatus::Failed));
        h.manager.poll_attempt(task.id).await.unwrap();

        let before = h.store.get_task(task.id).await.unwrap().unwrap();
        let schedules = h.scheduler.scheduled().len();
        let status_calls = h.client.status_calls.load(Ordering::SeqCst);
        let mut events = h.notifier.subscribe();

        // A late-scheduled duplicate arrives after the terminal transition.
        h.manager.poll_attempt(task.id).await.unwrap();

        let after = h.store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(after.state, before.state);
        assert_eq!(after.updated_at, before.updated_at);
        assert_eq!(h.scheduler.scheduled().len(), schedules);
        assert_eq!(h.client.status_calls.load(Ordering::SeqCst), status_calls);
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn concurrent_polls_on_completed_task_are_noops() {
        let h = harness().await;
        let task = started_task(&h).await;

        h.client.script_status(Ok(JobStatus::Completed {
            result_url: "https://x/img.png".into(),
        }));
        h.client.script_store(Ok(StoredObject {
            url: "https://store/img.png".into(),
            name: "img.png".into(),
        }));
        h.manager.poll_attempt(task.id).await.unwrap();

        let store_calls = h.client.store_calls.load(Ordering::SeqCst);
        let mut events = h.notifier.subscribe();

        let (a, b) = tokio::join!(
            h.manager.poll_attempt(task.id),
            h.manager.poll_attempt(task.id)
        );
        a.unwrap();
        b.unwrap();

        // No duplicate notifications, no second store attempt.
        assert!(drain(&mut events).is_empty());
        assert_eq!(h.client.store_calls.load(Ordering::SeqCst), store_calls);
        assert_eq!(h.scheduler.scheduled().len(), 1);
    }

    // ── Store degradation ───────────────────────────────────────────

    #[tokio::test]
    async fn store_outage_does_not_abort_generation() {
        let flaky = Arc::new(FlakyStore::new().await);
        let store: Arc<dyn Database> = Arc::clone(&flaky) as Arc<dyn Database>;
        let h = harness_with_store(store).await;
        let mut events = h.notifier.subscribe();

        let task = started_task(&h).await;

        // Store goes dark for both reads and writes.
        flaky.fail_reads.store(true, Ordering::SeqCst);
        flaky.fail_writes.store(true, Ordering::SeqCst);

        h.client.script_status(Ok(JobStatus::Completed {
            result_url: "https://x/img.png".into(),
        }));
        h.client.script_store(Ok(StoredObject {
            url: "https://store/img.png".into(),
            name: "img.png".into(),
        }));
        h.manager.poll_attempt(task.id).await.unwrap();

        // The in-memory record completed and the user was notified.
        let events = drain(&mut events);
        assert!(events
            .iter()
            .any(|e| matches!(e, AgentEvent::TaskCompleted { .. })));

        // And the terminal check still holds through the fallback record.
        let mut more = h.notifier.subscribe();
        h.manager.poll_attempt(task.id).await.unwrap();
        assert!(drain(&mut more).is_empty());
    }

    #[tokio::test]
    async fn persistence_is_retried_on_next_poll() {
        let flaky = Arc::new(FlakyStore::new().await);
        let store: Arc<dyn Database> = Arc::clone(&flaky) as Arc<dyn Database>;
        let h = harness_with_store(store).await;

        // First write fails; the record lives only in the shadow cache.
        flaky.fail_writes.store(true, Ordering::SeqCst);
        let task = started_task(&h).await;
        assert!(h.store.get_task(task.id).await.unwrap().is_none());

        // Store recovers; the next natural poll re-persists.
        flaky.fail_writes.store(false, Ordering::SeqCst);
        h.client.script_status(Ok(JobStatus::Running));
        h.manager.poll_attempt(task.id).await.unwrap();

        let stored = h.store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.state, TaskState::Running);
        assert_eq!(stored.external_job_id.as_deref(), Some("job-1"));
    }

    // ── Recovery ────────────────────────────────────────────────────

    #[tokio::test]
    async fn recover_reschedules_only_running_tasks() {
        let h = harness().await;

        let mut running = TaskRecord::new("still going");
        running.mark_running("job-a").unwrap();
        h.store.put_task(&running).await.unwrap();

        let mut done = TaskRecord::new("finished");
        done.mark_running("job-b").unwrap();
        done.complete("https://x/done.png", None).unwrap();
        h.store.put_task(&done).await.unwrap();

        let recovered = h.manager.recover().await;

        assert_eq!(recovered, 1);
        assert_eq!(
            h.scheduler.scheduled(),
            vec![(Duration::from_secs(5), running.id)]
        );
    }
}
