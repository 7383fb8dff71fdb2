//! Observer supervisor.
//!
//! The supervisor owns one slot per configured account, starts a polling
//! worker for each and replaces failed workers with linear backoff. Only the
//! supervisor actor touches the slots, so failure bookkeeping needs no locks.

use crate::observer::errors::ObserverError;
use crate::observer::extract::PageExtractor;
use crate::observer::failure::{FailureRecord, RestartDecision, RestartPolicy};
use crate::observer::types::{Account, AccountId, ObserverSettings};
use crate::observer::worker::{WorkerArgs, WorkerFailure, WorkerHandle};
use crate::session::Transport;
use async_trait::async_trait;
use chrono::Utc;
use ractor::concurrency::JoinHandle;
use ractor::{Actor, ActorProcessingErr, ActorRef, MessagingErr, SpawnErr, SupervisionEvent};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Messages for the observer supervisor.
pub enum SupervisorMsg {
    /// Start a worker for every account that has none yet.
    Run,
    /// A worker reported a failure.
    WorkerFailed(WorkerFailure),
    /// Backoff for an account elapsed.
    Restart { account: AccountId, generation: u64 },
    LiveWorkers(oneshot::Sender<usize>),
    Status(oneshot::Sender<Vec<AccountStatus>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    /// Configured, not started yet.
    Pending,
    Running,
    /// Waiting for a scheduled restart.
    Restarting,
    /// Failure budget exhausted; never retried again.
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountStatus {
    pub account: AccountId,
    pub state: AccountState,
    pub failures: u32,
}

pub struct SupervisorArgs {
    pub accounts: Vec<Account>,
    pub settings: ObserverSettings,
    pub transport: Arc<dyn Transport>,
    pub extractor: Arc<dyn PageExtractor>,
}

enum Slot {
    Pending,
    Running(WorkerHandle),
    Restarting(JoinHandle<Result<(), MessagingErr<SupervisorMsg>>>),
    Abandoned,
}

struct AccountSlot {
    account: Account,
    generation: u64,
    failures: FailureRecord,
    slot: Slot,
}

impl AccountSlot {
    fn state(&self) -> AccountState {
        match self.slot {
            Slot::Pending => AccountState::Pending,
            Slot::Running(_) => AccountState::Running,
            Slot::Restarting(_) => AccountState::Restarting,
            Slot::Abandoned => AccountState::Abandoned,
        }
    }
}

pub struct SupervisorState {
    settings: Arc<ObserverSettings>,
    policy: RestartPolicy,
    transport: Arc<dyn Transport>,
    extractor: Arc<dyn PageExtractor>,
    slots: Vec<AccountSlot>,
}

impl SupervisorState {
    fn slot_mut(&mut self, account: &AccountId) -> Option<&mut AccountSlot> {
        self.slots.iter_mut().find(|s| &s.account.id == account)
    }

    fn live_workers(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| !matches!(s.slot, Slot::Abandoned))
            .count()
    }
}

/// The observer supervisor actor.
pub struct ObserverSupervisor;

impl ObserverSupervisor {
    async fn start_worker(
        myself: &ActorRef<SupervisorMsg>,
        state: &mut SupervisorState,
        account: &AccountId,
    ) {
        let settings = state.settings.clone();
        let transport = state.transport.clone();
        let extractor = state.extractor.clone();
        let Some(slot) = state.slot_mut(account) else {
            return;
        };
        slot.generation += 1;
        let args = WorkerArgs {
            account: slot.account.clone(),
            generation: slot.generation,
            settings,
            transport,
            extractor,
            supervisor: myself.clone(),
        };
        let generation = slot.generation;
        match WorkerHandle::spawn(args, Some(myself.get_cell())).await {
            Ok((handle, _join)) => slot.slot = Slot::Running(handle),
            Err(e) => {
                tracing::error!(account = %account, error = %e, "Unable to spawn observer");
                slot.slot = Slot::Pending;
                let failure = WorkerFailure {
                    account: account.clone(),
                    generation,
                    error: ObserverError::Crashed {
                        message: e.to_string(),
                    },
                };
                Self::on_failure(myself, state, failure, true);
            }
        }
    }

    /// Applies the restart policy to a failure of the current worker generation.
    ///
    /// `force` accepts the failure even when no worker is running, which is
    /// the case when spawning itself failed.
    fn on_failure(
        myself: &ActorRef<SupervisorMsg>,
        state: &mut SupervisorState,
        failure: WorkerFailure,
        force: bool,
    ) {
        let policy = state.policy;
        let Some(slot) = state.slot_mut(&failure.account) else {
            tracing::warn!(account = %failure.account, "Failure reported for unknown account");
            return;
        };
        let current = slot.generation == failure.generation
            && (force || matches!(slot.slot, Slot::Running(_)));
        if !current {
            tracing::debug!(
                account = %failure.account,
                generation = failure.generation,
                error = %failure.error,
                "Ignoring failure from replaced observer"
            );
            return;
        }

        tracing::error!(
            account = %failure.account,
            kind = failure.error.kind(),
            error = %failure.error,
            "Observer failed"
        );
        if let Slot::Running(handle) = &slot.slot {
            handle.destroy();
        }

        match policy.on_failure(&mut slot.failures, Utc::now()) {
            RestartDecision::Restart { attempt, delay } => {
                tracing::info!(
                    account = %failure.account,
                    attempt,
                    delay = ?delay,
                    "Scheduling observer restart"
                );
                let account = failure.account.clone();
                let generation = slot.generation;
                let timer = myself.send_after(delay, move || SupervisorMsg::Restart {
                    account,
                    generation,
                });
                slot.slot = Slot::Restarting(timer);
            }
            RestartDecision::Abandon { failures } => {
                tracing::error!(
                    account = %failure.account,
                    failures,
                    abandoned = true,
                    "Unable to restart observer: max fails limit reached"
                );
                slot.slot = Slot::Abandoned;
            }
        }
    }
}

#[async_trait]
impl Actor for ObserverSupervisor {
    type Msg = SupervisorMsg;
    type State = SupervisorState;
    type Arguments = SupervisorArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: SupervisorArgs,
    ) -> Result<Self::State, ActorProcessingErr> {
        let mut slots: Vec<AccountSlot> = Vec::with_capacity(args.accounts.len());
        for account in args.accounts {
            if slots.iter().any(|s| s.account.id == account.id) {
                tracing::warn!(account = %account.id, "Duplicate account ignored");
                continue;
            }
            slots.push(AccountSlot {
                account,
                generation: 0,
                failures: FailureRecord::new(),
                slot: Slot::Pending,
            });
        }
        Ok(SupervisorState {
            policy: RestartPolicy::from_settings(&args.settings),
            settings: Arc::new(args.settings),
            transport: args.transport,
            extractor: args.extractor,
            slots,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisorMsg::Run => {
                let pending: Vec<AccountId> = state
                    .slots
                    .iter()
                    .filter(|s| matches!(s.slot, Slot::Pending) && s.generation == 0)
                    .map(|s| s.account.id.clone())
                    .collect();
                for account in pending {
                    tracing::info!(account = %account, "Starting observer");
                    Self::start_worker(&myself, state, &account).await;
                }
            }
            SupervisorMsg::WorkerFailed(failure) => {
                Self::on_failure(&myself, state, failure, false);
            }
            SupervisorMsg::Restart {
                account,
                generation,
            } => {
                let due = state.slot_mut(&account).is_some_and(|s| {
                    s.generation == generation && matches!(s.slot, Slot::Restarting(_))
                });
                if due {
                    tracing::info!(account = %account, "Restarting observer");
                    Self::start_worker(&myself, state, &account).await;
                }
            }
            SupervisorMsg::LiveWorkers(reply) => {
                if reply.send(state.live_workers()).is_err() {
                    tracing::debug!("Live workers reply channel closed");
                }
            }
            SupervisorMsg::Status(reply) => {
                let status = state
                    .slots
                    .iter()
                    .map(|s| AccountStatus {
                        account: s.account.id.clone(),
                        state: s.state(),
                        failures: s.failures.count(),
                    })
                    .collect();
                if reply.send(status).is_err() {
                    tracing::debug!("Status reply channel closed");
                }
            }
        }
        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        evt: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match evt {
            SupervisionEvent::ActorFailed(cell, reason) => {
                let crashed = state.slots.iter().find_map(|s| match &s.slot {
                    Slot::Running(handle) if handle.id() == cell.get_id() => {
                        Some((s.account.id.clone(), s.generation))
                    }
                    _ => None,
                });
                if let Some((account, generation)) = crashed {
                    let failure = WorkerFailure {
                        account,
                        generation,
                        error: ObserverError::Crashed {
                            message: reason.to_string(),
                        },
                    };
                    Self::on_failure(&myself, state, failure, false);
                }
            }
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                tracing::debug!(actor = ?cell.get_id(), reason = ?reason, "Observer terminated");
            }
            _ => {}
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        for slot in &mut state.slots {
            match std::mem::replace(&mut slot.slot, Slot::Pending) {
                Slot::Running(handle) => handle.destroy(),
                Slot::Restarting(timer) => timer.abort(),
                other => slot.slot = other,
            }
        }
        tracing::info!("Supervisor stopped");
        Ok(())
    }
}

/// Process-facing handle to the supervisor.
#[derive(Clone)]
pub struct SupervisorHandle {
    actor: ActorRef<SupervisorMsg>,
}

impl SupervisorHandle {
    /// Spawns the supervisor and starts one worker per account.
    pub async fn start(args: SupervisorArgs) -> Result<(Self, JoinHandle<()>), SpawnErr> {
        let (actor, join) = ObserverSupervisor::spawn(None, ObserverSupervisor, args).await?;
        if actor.send_message(SupervisorMsg::Run).is_err() {
            tracing::warn!("Supervisor stopped before run");
        }
        Ok((Self { actor }, join))
    }

    /// Accounts that are running or waiting for a restart. Zero once destroyed.
    pub async fn live_workers(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        if self.actor.send_message(SupervisorMsg::LiveWorkers(tx)).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    pub async fn status(&self) -> Vec<AccountStatus> {
        let (tx, rx) = oneshot::channel();
        if self.actor.send_message(SupervisorMsg::Status(tx)).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Tears down every worker and the supervisor. Safe to call repeatedly.
    pub fn destroy(&self) {
        self.actor.stop(None);
    }
}

#[cfg(test)]
#[path = "tests/supervisor_tests.rs"]
mod tests;
