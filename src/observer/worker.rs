//! Per-account polling worker.
//!
//! A worker logs in once, then checks the account every polling period. The
//! actor mailbox runs one message at a time, so a tick never overlaps the
//! previous one; the next tick is scheduled only after the current one ends.
//! Every failure is reported to the supervisor, which decides whether to
//! replace the worker.

use crate::observer::auth;
use crate::observer::checks::{AccountMonitor, SubscriptionPolicy};
use crate::observer::errors::ObserverError;
use crate::observer::extract::PageExtractor;
use crate::observer::supervisor::SupervisorMsg;
use crate::observer::types::{Account, AccountId, ObserverSettings};
use crate::session::Transport;
use async_trait::async_trait;
use ractor::concurrency::JoinHandle;
use ractor::{Actor, ActorCell, ActorId, ActorProcessingErr, ActorRef, MessagingErr, SpawnErr};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// A failure raised by one worker instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerFailure {
    pub account: AccountId,
    /// Identifies the worker instance that failed.
    pub generation: u64,
    pub error: ObserverError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Authenticating,
    Polling,
    /// Login failed; the worker waits to be destroyed.
    Failed,
}

pub enum WorkerMsg {
    Authenticate,
    Tick,
    #[cfg(test)]
    Phase(tokio::sync::oneshot::Sender<WorkerPhase>),
}

#[derive(Clone)]
pub struct WorkerArgs {
    pub account: Account,
    pub generation: u64,
    pub settings: Arc<ObserverSettings>,
    pub transport: Arc<dyn Transport>,
    pub extractor: Arc<dyn PageExtractor>,
    pub supervisor: ActorRef<SupervisorMsg>,
}

pub struct WorkerState {
    args: WorkerArgs,
    phase: WorkerPhase,
    monitor: Option<AccountMonitor>,
    next_tick: Option<JoinHandle<Result<(), MessagingErr<WorkerMsg>>>>,
    span: tracing::Span,
}

impl WorkerState {
    fn report(&self, error: ObserverError) {
        let failure = WorkerFailure {
            account: self.args.account.id.clone(),
            generation: self.args.generation,
            error,
        };
        if self
            .args
            .supervisor
            .send_message(SupervisorMsg::WorkerFailed(failure))
            .is_err()
        {
            self.span
                .in_scope(|| tracing::debug!("Supervisor gone, failure report dropped"));
        }
    }
}

pub struct PollingWorker;

#[async_trait]
impl Actor for PollingWorker {
    type Msg = WorkerMsg;
    type State = WorkerState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: WorkerArgs,
    ) -> Result<Self::State, ActorProcessingErr> {
        let span = tracing::info_span!("observer", account = %args.account.id);
        span.in_scope(|| tracing::info!(generation = args.generation, "Starting observer"));
        myself
            .send_message(WorkerMsg::Authenticate)
            .map_err(|_| ActorProcessingErr::from("worker mailbox closed on start"))?;
        Ok(WorkerState {
            args,
            phase: WorkerPhase::Authenticating,
            monitor: None,
            next_tick: None,
            span,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMsg::Authenticate => {
                if state.phase != WorkerPhase::Authenticating {
                    return Ok(());
                }
                let result = auth::authenticate(
                    &state.args.account,
                    &state.args.settings,
                    state.args.transport.clone(),
                    state.args.extractor.as_ref(),
                )
                .instrument(state.span.clone())
                .await;
                match result {
                    Ok(session) => {
                        let policy =
                            SubscriptionPolicy::from_flag(state.args.settings.remove_subscriptions);
                        state.monitor = Some(AccountMonitor::new(
                            state.args.account.id.clone(),
                            session,
                            policy,
                        ));
                        state.phase = WorkerPhase::Polling;
                        state.span.in_scope(|| {
                            tracing::info!(
                                period = ?state.args.settings.polling_period,
                                "Polling started"
                            )
                        });
                        if myself.send_message(WorkerMsg::Tick).is_err() {
                            state
                                .span
                                .in_scope(|| tracing::debug!("Mailbox closed before first tick"));
                        }
                    }
                    Err(e) => {
                        state.phase = WorkerPhase::Failed;
                        state.report(e);
                    }
                }
            }
            WorkerMsg::Tick => {
                if state.phase != WorkerPhase::Polling {
                    return Ok(());
                }
                let started = Instant::now();
                if let Some(monitor) = state.monitor.as_mut() {
                    let result = monitor.tick().instrument(state.span.clone()).await;
                    match result {
                        Ok(removal_failures) => {
                            for e in removal_failures {
                                state.report(e);
                            }
                        }
                        Err(e) => state.report(e),
                    }
                }
                let delay = state
                    .args
                    .settings
                    .polling_period
                    .saturating_sub(started.elapsed());
                state.next_tick = Some(myself.send_after(delay, || WorkerMsg::Tick));
            }
            #[cfg(test)]
            WorkerMsg::Phase(reply) => {
                if reply.send(state.phase).is_err() {
                    tracing::debug!("Phase reply channel closed");
                }
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let Some(timer) = state.next_tick.take() {
            timer.abort();
        }
        state.span.in_scope(|| tracing::info!("Observer stopped"));
        Ok(())
    }
}

/// Process-facing handle to one worker actor.
#[derive(Clone)]
pub struct WorkerHandle {
    actor: ActorRef<WorkerMsg>,
}

impl WorkerHandle {
    /// Spawns a worker, linked to `supervisor` when given.
    pub async fn spawn(
        args: WorkerArgs,
        supervisor: Option<ActorCell>,
    ) -> Result<(Self, JoinHandle<()>), SpawnErr> {
        let (actor, join) = match supervisor {
            Some(cell) => PollingWorker::spawn_linked(None, PollingWorker, args, cell).await?,
            None => PollingWorker::spawn(None, PollingWorker, args).await?,
        };
        Ok((Self { actor }, join))
    }

    pub fn id(&self) -> ActorId {
        self.actor.get_id()
    }

    /// Current phase, or `None` once the worker has stopped.
    #[cfg(test)]
    pub async fn phase(&self) -> Option<WorkerPhase> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.actor.send_message(WorkerMsg::Phase(tx)).ok()?;
        rx.await.ok()
    }

    /// Stops the worker after its current message. Safe to call repeatedly.
    pub fn destroy(&self) {
        self.actor.stop(None);
    }
}

#[cfg(test)]
#[path = "tests/worker_tests.rs"]
mod tests;
