use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::lifecycle::{LifecycleController, SlotSnapshot, TournamentPhase};

const MIN_TICK: Duration = Duration::from_millis(1);

/// Commands sent from request handlers to the engine tick loop.
#[derive(Debug)]
pub enum LifecycleCommand {
    ShutdownForUpdate {
        reply: oneshot::Sender<bool>,
    },
    PvpTimerStart {
        delay_secs: u64,
        reply: oneshot::Sender<bool>,
    },
    DuelingEvent {
        reply: oneshot::Sender<bool>,
    },
    StopPvp,
    StopDuel,
    IsOnline {
        username: String,
        reply: oneshot::Sender<bool>,
    },
    /// Replies once every command queued before it has been applied.
    Flush {
        reply: oneshot::Sender<bool>,
    },
    Stop,
}

/// Thread-safe front for a controller running on the engine loop.
///
/// Mutations are submitted as [`LifecycleCommand`]s and applied between
/// ticks. Timer queries read the last published [`SlotSnapshot`].
#[derive(Clone)]
pub struct LifecycleHandle {
    cmd_tx: mpsc::UnboundedSender<LifecycleCommand>,
    status: watch::Receiver<SlotSnapshot>,
    running: Arc<AtomicBool>,
}

impl LifecycleHandle {
    pub async fn shutdown_for_update(&self) -> bool {
        self.request(|reply| LifecycleCommand::ShutdownForUpdate { reply })
            .await
    }

    pub async fn pvp_timer_start(&self, delay_secs: u64) -> bool {
        self.request(|reply| LifecycleCommand::PvpTimerStart { delay_secs, reply })
            .await
    }

    pub async fn dueling_event(&self) -> bool {
        self.request(|reply| LifecycleCommand::DuelingEvent { reply })
            .await
    }

    pub async fn is_online(&self, username: &str) -> bool {
        let username = username.to_string();
        self.request(|reply| LifecycleCommand::IsOnline { username, reply })
            .await
    }

    /// Wait until previously submitted commands have been applied.
    pub async fn flush(&self) -> bool {
        self.request(|reply| LifecycleCommand::Flush { reply }).await
    }

    pub fn stop_pvp(&self) {
        self.send(LifecycleCommand::StopPvp);
    }

    pub fn stop_duel(&self) {
        self.send(LifecycleCommand::StopDuel);
    }

    /// Ask the engine loop to exit.
    pub fn stop(&self) {
        self.send(LifecycleCommand::Stop);
    }

    pub fn time_till_shutdown(&self) -> i64 {
        self.status.borrow().time_till_shutdown()
    }

    pub fn time_till_pvp(&self) -> i64 {
        self.status.borrow().time_till_pvp()
    }

    pub fn time_till_duel(&self) -> i64 {
        self.status.borrow().time_till_duel()
    }

    pub fn pvp_is_running(&self) -> bool {
        self.status.borrow().pvp_is_running()
    }

    pub fn waiting_is_running(&self) -> bool {
        self.status.borrow().waiting_is_running()
    }

    pub fn phase(&self) -> TournamentPhase {
        self.status.borrow().phase()
    }

    /// False once the update shutdown has fired.
    pub fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Whether the engine loop is still accepting commands.
    pub fn is_attached(&self) -> bool {
        !self.cmd_tx.is_closed()
    }

    fn send(&self, cmd: LifecycleCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            tracing::warn!("Engine loop has stopped, dropping lifecycle command");
        }
    }

    async fn request(&self, make: impl FnOnce(oneshot::Sender<bool>) -> LifecycleCommand) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.cmd_tx.send(make(reply_tx)).is_err() {
            tracing::warn!("Engine loop has stopped, lifecycle request refused");
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }
}

/// Spawn the engine tick loop as a tokio task.
/// Returns the handle for submitting commands and the task handle.
pub fn spawn_engine_loop(
    controller: LifecycleController,
    tick_interval: Duration,
) -> (LifecycleHandle, JoinHandle<()>) {
    // tokio::time::interval panics on a zero period.
    let tick_interval = tick_interval.max(MIN_TICK);
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let handle = LifecycleHandle {
        cmd_tx,
        status: controller.subscribe(),
        running: controller.running_flag(),
    };

    let task = tokio::spawn(async move {
        run_engine_loop(controller, cmd_rx, tick_interval).await;
    });

    (handle, task)
}

/// The single engine thread: fires due events each tick and applies
/// submitted commands in between.
async fn run_engine_loop(
    mut controller: LifecycleController,
    mut cmd_rx: mpsc::UnboundedReceiver<LifecycleCommand>,
    tick_interval: Duration,
) {
    let mut interval = tokio::time::interval(tick_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tracing::info!(tick_ms = tick_interval.as_millis() as u64, "Engine loop started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let fired = controller.tick(tokio::time::Instant::now().into_std());
                if fired > 0 {
                    tracing::debug!(fired, "Fired scheduled events");
                }
                if !controller.running() {
                    tracing::info!("Server stopped, leaving engine loop");
                    break;
                }
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(LifecycleCommand::ShutdownForUpdate { reply }) => {
                        let _ = reply.send(controller.shutdown_for_update());
                    },
                    Some(LifecycleCommand::PvpTimerStart { delay_secs, reply }) => {
                        let _ = reply.send(controller.pvp_timer_start(delay_secs));
                    },
                    Some(LifecycleCommand::DuelingEvent { reply }) => {
                        let _ = reply.send(controller.dueling_event());
                    },
                    Some(LifecycleCommand::StopPvp) => controller.stop_pvp(),
                    Some(LifecycleCommand::StopDuel) => controller.stop_duel(),
                    Some(LifecycleCommand::IsOnline { username, reply }) => {
                        let _ = reply.send(controller.is_online(&username));
                    },
                    Some(LifecycleCommand::Flush { reply }) => {
                        let _ = reply.send(true);
                    },
                    Some(LifecycleCommand::Stop) | None => {
                        tracing::info!("Engine loop stop requested");
                        break;
                    },
                }
            }
        }
    }
}
