//! Job status machine.
//!
//! A [`JobMachine`] submits one job and polls it until the backend reports a
//! terminal status, the caller cancels, or transient failures exhaust the
//! retry budget:
//!
//! ```text
//! Idle -> Submitting -> Polling -> { Completed | Failed | Cancelled | Errored }
//! ```
//!
//! Every transition is delivered to subscribers in order. The poll timer
//! lives in a single spawned task owned by the machine; it is released on
//! cancel, on any terminal state, and when the machine is dropped.

use std::fmt;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use client_logging::{client_debug, client_error, client_info, client_warn, POLL_TARGET};
use runboard_core::{Observers, Subscription};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{ClientError, Job, JobStatus, Transport};

#[derive(Debug, Clone)]
pub struct MachineSettings {
    /// Delay between the end of one poll and the start of the next.
    pub poll_interval: Duration,
    /// Consecutive transient poll failures tolerated before giving up.
    pub max_retries: u32,
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_retries: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MachineState {
    Idle,
    Submitting,
    Polling,
    Completed,
    Failed,
    Cancelled,
    Errored,
}

impl MachineState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MachineState::Completed
                | MachineState::Failed
                | MachineState::Cancelled
                | MachineState::Errored
        )
    }

    fn is_active(self) -> bool {
        matches!(self, MachineState::Submitting | MachineState::Polling)
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MachineState::Idle => "idle",
            MachineState::Submitting => "submitting",
            MachineState::Polling => "polling",
            MachineState::Completed => "completed",
            MachineState::Failed => "failed",
            MachineState::Cancelled => "cancelled",
            MachineState::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// A state change together with the latest job snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: MachineState,
    pub job: Option<Job>,
    /// The failure that caused `Errored`.
    pub error: Option<ClientError>,
}

/// Drives a single backend job from submission to a terminal state.
///
/// At most one job is in flight per machine; [`JobMachine::start`] fails with
/// [`ClientError::AlreadyRunning`] while submitting or polling. Once the
/// machine is terminal (including after [`JobMachine::cancel`]) it can be
/// started again.
pub struct JobMachine {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    settings: MachineSettings,
    core: Mutex<Core>,
    observers: Observers<Transition>,
    state_tx: watch::Sender<MachineState>,
}

struct Core {
    state: MachineState,
    job: Option<Job>,
    last_error: Option<ClientError>,
    /// Consecutive transient poll failures.
    failures: u32,
    /// Bumped on every start; stale submissions and pollers compare against it.
    epoch: u64,
    poller: Option<Poller>,
}

/// The poll timer: one task plus the token that stops it.
struct Poller {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Poller {
    fn release(self) {
        self.token.cancel();
        self.handle.abort();
    }
}

impl JobMachine {
    pub fn new(transport: Arc<dyn Transport>, settings: MachineSettings) -> Self {
        let (state_tx, _) = watch::channel(MachineState::Idle);
        Self {
            inner: Arc::new(Inner {
                transport,
                settings,
                core: Mutex::new(Core {
                    state: MachineState::Idle,
                    job: None,
                    last_error: None,
                    failures: 0,
                    epoch: 0,
                    poller: None,
                }),
                observers: Observers::new(),
                state_tx,
            }),
        }
    }

    pub fn settings(&self) -> &MachineSettings {
        &self.inner.settings
    }

    pub fn state(&self) -> MachineState {
        self.inner.lock().state
    }

    /// Latest job snapshot for the current or most recent job.
    pub fn job(&self) -> Option<Job> {
        self.inner.lock().job.clone()
    }

    pub fn last_error(&self) -> Option<ClientError> {
        self.inner.lock().last_error.clone()
    }

    /// Registers `callback` for every subsequent transition.
    ///
    /// If the machine is already terminal, `callback` is also invoked with the
    /// terminal transition before this returns.
    pub fn subscribe(
        &self,
        callback: impl Fn(&Transition) + Send + Sync + 'static,
    ) -> Subscription {
        let callback = Arc::new(callback);
        let (subscription, replay) = {
            let core = self.inner.lock();
            let listener = callback.clone();
            let subscription = self
                .inner
                .observers
                .subscribe(move |transition: &Transition| listener(transition));
            let replay = core.state.is_terminal().then(|| core.transition());
            (subscription, replay)
        };
        if let Some(terminal) = replay {
            callback(&terminal);
        }
        subscription
    }

    /// Submits a job for `project_id` and begins polling it.
    ///
    /// Returns the submitted job. A submission failure moves the machine to
    /// `Errored` and is returned without polling. If the machine is cancelled
    /// while the submission is in flight, the job is returned but never polled.
    /// Dropping the returned future before the submission answers cancels it.
    pub async fn start(&self, project_id: &str) -> Result<Job, ClientError> {
        let epoch = {
            let mut core = self.inner.lock();
            if core.state.is_active() {
                return Err(ClientError::AlreadyRunning);
            }
            core.epoch += 1;
            core.job = None;
            core.last_error = None;
            core.failures = 0;
            self.inner.enter(&mut core, MachineState::Submitting, None, None);
            core.epoch
        };
        self.inner.observers.flush();
        let guard = SubmitGuard {
            inner: &self.inner,
            epoch,
        };

        client_info!(target: POLL_TARGET, "submitting job for project {project_id}");
        let submitted = self.inner.transport.submit_job(project_id).await;
        guard.disarm();

        let outcome = {
            let mut core = self.inner.lock();
            if core.epoch != epoch || core.state != MachineState::Submitting {
                client_debug!(target: POLL_TARGET, "submission finished after cancel; not polling");
                submitted
            } else {
                match submitted {
                    Ok(job) => {
                        client_info!(
                            target: POLL_TARGET,
                            "job {} submitted ({})",
                            job.job_id,
                            job.status
                        );
                        let status = job.status;
                        self.inner
                            .enter(&mut core, MachineState::Polling, Some(job.clone()), None);
                        if let Some(terminal) = terminal_state(status) {
                            self.inner.enter(&mut core, terminal, None, None);
                        } else {
                            core.poller = Some(self.spawn_poller(epoch, &job));
                        }
                        Ok(job)
                    }
                    Err(err) => {
                        client_error!(target: POLL_TARGET, "job submission failed: {err}");
                        self.inner
                            .enter(&mut core, MachineState::Errored, None, Some(err.clone()));
                        Err(err)
                    }
                }
            }
        };
        self.inner.observers.flush();
        outcome
    }

    /// Stops polling and moves to `Cancelled`. No-op unless submitting or polling.
    pub fn cancel(&self) {
        {
            let mut core = self.inner.lock();
            if !core.state.is_active() {
                return;
            }
            client_info!(target: POLL_TARGET, "job cancelled from {}", core.state);
            self.inner.enter(&mut core, MachineState::Cancelled, None, None);
        }
        self.inner.observers.flush();
    }

    /// Resolves once the machine is terminal, or immediately when idle.
    pub async fn wait(&self) -> MachineState {
        let mut rx = self.inner.state_tx.subscribe();
        let result = rx
            .wait_for(|state| state.is_terminal() || *state == MachineState::Idle)
            .await
            .map(|state| *state);
        // The sender lives as long as `self`, so the channel cannot close here.
        result.unwrap_or_else(|_| self.state())
    }

    /// Whether a poll timer is currently held.
    pub fn has_pending_poll(&self) -> bool {
        self.inner.lock().poller.is_some()
    }

    fn spawn_poller(&self, epoch: u64, job: &Job) -> Poller {
        let token = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            self.inner.clone(),
            epoch,
            job.project_id.clone(),
            job.job_id.clone(),
            token.clone(),
        ));
        Poller { token, handle }
    }
}

/// Moves an abandoned submission to `Cancelled` when the `start` future is
/// dropped before the backend answers.
struct SubmitGuard<'a> {
    inner: &'a Inner,
    epoch: u64,
}

impl SubmitGuard<'_> {
    fn disarm(self) {
        std::mem::forget(self);
    }
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        {
            let mut core = self.inner.lock();
            if core.epoch != self.epoch || core.state != MachineState::Submitting {
                return;
            }
            client_warn!(target: POLL_TARGET, "submission abandoned by caller");
            self.inner.enter(&mut core, MachineState::Cancelled, None, None);
        }
        self.inner.observers.flush();
    }
}

impl Drop for JobMachine {
    fn drop(&mut self) {
        if let Some(poller) = self.inner.lock().poller.take() {
            poller.release();
        }
    }
}

impl fmt::Debug for JobMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.inner.lock();
        f.debug_struct("JobMachine")
            .field("state", &core.state)
            .field("job", &core.job.as_ref().map(|job| job.job_id.as_str()))
            .field("failures", &core.failures)
            .finish()
    }
}

impl Core {
    fn transition(&self) -> Transition {
        Transition {
            state: self.state,
            job: self.job.clone(),
            error: self.last_error.clone(),
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a transition and queues it for subscribers. Callers flush
    /// after releasing the lock.
    fn enter(
        &self,
        core: &mut Core,
        state: MachineState,
        job: Option<Job>,
        error: Option<ClientError>,
    ) {
        client_debug!(target: POLL_TARGET, "{} -> {}", core.state, state);
        core.state = state;
        if job.is_some() {
            core.job = job;
        }
        if error.is_some() {
            core.last_error = error;
        }
        if state.is_terminal() {
            if let Some(poller) = core.poller.take() {
                poller.release();
            }
        }
        self.state_tx.send_replace(state);
        self.observers.enqueue(core.transition());
    }

    fn on_poll_result(&self, epoch: u64, result: Result<Job, ClientError>) -> ControlFlow<()> {
        let flow = {
            let mut core = self.lock();
            if core.epoch != epoch || core.state != MachineState::Polling {
                return ControlFlow::Break(());
            }
            match result {
                Ok(job) => {
                    core.failures = 0;
                    match terminal_state(job.status) {
                        Some(terminal) => {
                            client_info!(target: POLL_TARGET, "job {} {}", job.job_id, job.status);
                            // Running on the poll task itself: detach, don't abort.
                            core.poller = None;
                            self.enter(&mut core, terminal, Some(job), None);
                            ControlFlow::Break(())
                        }
                        None => {
                            self.enter(&mut core, MachineState::Polling, Some(job), None);
                            ControlFlow::Continue(())
                        }
                    }
                }
                Err(err) if err.is_transient() => {
                    core.failures += 1;
                    if core.failures > self.settings.max_retries {
                        client_error!(
                            target: POLL_TARGET,
                            "giving up after {} failed polls: {err}",
                            core.failures
                        );
                        core.poller = None;
                        self.enter(&mut core, MachineState::Errored, None, Some(err));
                        ControlFlow::Break(())
                    } else {
                        client_warn!(
                            target: POLL_TARGET,
                            "poll failed ({}/{}): {err}",
                            core.failures,
                            self.settings.max_retries
                        );
                        ControlFlow::Continue(())
                    }
                }
                Err(err) => {
                    client_error!(target: POLL_TARGET, "poll failed permanently: {err}");
                    core.poller = None;
                    self.enter(&mut core, MachineState::Errored, None, Some(err));
                    ControlFlow::Break(())
                }
            }
        };
        self.observers.flush();
        flow
    }
}

fn terminal_state(status: JobStatus) -> Option<MachineState> {
    match status {
        JobStatus::Completed => Some(MachineState::Completed),
        JobStatus::Failed => Some(MachineState::Failed),
        JobStatus::Queued | JobStatus::Running | JobStatus::Unknown => None,
    }
}

async fn poll_loop(
    inner: Arc<Inner>,
    epoch: u64,
    project_id: String,
    job_id: String,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(inner.settings.poll_interval) => {}
        }

        let result = inner.transport.poll_job_status(&project_id, &job_id).await;
        if token.is_cancelled() {
            return;
        }
        if inner.on_poll_result(epoch, result).is_break() {
            return;
        }
    }
}
