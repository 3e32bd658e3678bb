//! Event loop that owns a [`ClientProjection`].
//!
//! Taps, display ticks, push messages, purchase answers and network outcomes
//! all funnel into one `tokio::select!` loop, so the mirror is mutated from
//! a single task without locking. Award requests run on spawned tasks and report back
//! through an internal channel; the loop never awaits the network.

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::client::GameApi;
use super::{ClientProjection, OutboundAward, ProjectionView, ServerUpdate, TICK_INTERVAL};
use crate::db::AccountWithRelated;
use crate::protocol::{PointsResponse, PushMessage};

enum Command {
    Tap,
    Snapshot(oneshot::Sender<ProjectionView>),
    ServerCopy(oneshot::Sender<AccountWithRelated>),
    Push(PushMessage),
    Update(Box<ServerUpdate>),
    Shutdown,
}

struct Outcome {
    id: u64,
    result: anyhow::Result<PointsResponse>,
}

/// Cloneable handle to a running driver.
#[derive(Clone)]
pub struct DriverHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl DriverHandle {
    /// Returns false once the driver has stopped.
    pub fn tap(&self) -> bool {
        self.commands.send(Command::Tap).is_ok()
    }

    pub fn push(&self, message: PushMessage) -> bool {
        self.commands.send(Command::Push(message)).is_ok()
    }

    /// Reconcile a purchase, task or wallet answer.
    pub fn apply(&self, update: ServerUpdate) -> bool {
        self.commands.send(Command::Update(Box::new(update))).is_ok()
    }

    pub async fn view(&self) -> Option<ProjectionView> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(Command::Snapshot(tx)).ok()?;
        rx.await.ok()
    }

    /// The last authoritative copy, without local deltas.
    pub async fn server_copy(&self) -> Option<AccountWithRelated> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(Command::ServerCopy(tx)).ok()?;
        rx.await.ok()
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

/// Start the loop. The join handle yields the projection back on shutdown.
pub fn spawn<A: GameApi>(api: A, projection: ClientProjection) -> (DriverHandle, JoinHandle<ClientProjection>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(run(api, projection, rx));
    (DriverHandle { commands: tx }, handle)
}

fn send_award<A: GameApi>(api: &A, account_id: i64, award: OutboundAward, outcomes: &mpsc::UnboundedSender<Outcome>) {
    let api = api.clone();
    let outcomes = outcomes.clone();
    tokio::spawn(async move {
        let result = api.award_points(account_id, award.request).await;
        let _ = outcomes.send(Outcome {
            id: award.id,
            result,
        });
    });
}

async fn run<A: GameApi>(
    api: A,
    mut projection: ClientProjection,
    mut commands: mpsc::UnboundedReceiver<Command>,
) -> ClientProjection {
    let account_id = projection.account_id();
    let (outcome_tx, mut outcomes) = mpsc::unbounded_channel::<Outcome>();
    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(award) = projection.tick(Utc::now()) {
                    debug!(account_id, points = award.request.points, "passive sync");
                    send_award(&api, account_id, award, &outcome_tx);
                }
            }
            command = commands.recv() => match command {
                Some(Command::Tap) => {
                    if let Some(award) = projection.begin_tap(Utc::now()) {
                        send_award(&api, account_id, award, &outcome_tx);
                    }
                }
                Some(Command::Snapshot(reply)) => {
                    let _ = reply.send(projection.view(Utc::now()));
                }
                Some(Command::ServerCopy(reply)) => {
                    let _ = reply.send(projection.server_copy().clone());
                }
                Some(Command::Push(message)) => projection.apply_push(message),
                Some(Command::Update(update)) => projection.apply_update(&update),
                Some(Command::Shutdown) | None => break,
            },
            Some(outcome) = outcomes.recv() => match outcome.result {
                Ok(response) => {
                    projection.confirm(outcome.id, &response);
                }
                Err(e) => {
                    if let Some(delta) = projection.fail(outcome.id) {
                        warn!(account_id, error = %e, kind = ?delta.kind, points = delta.points, "award failed, reverted");
                    }
                }
            },
        }
    }
    projection
}
