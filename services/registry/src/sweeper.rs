//! Periodic cleanup of expired verification codes and timed-out forming teams.
//!
//! Deadlines live in the database, so a restarted process picks up whatever
//! expired while it was down on its first tick.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::state::AppState;
use crate::usecase::sweep::{FormationTimeoutSweepUseCase, SweepExpiredCodesUseCase};

pub struct Sweeper {
    state: AppState,
    interval: Duration,
}

impl Sweeper {
    pub fn new(state: AppState, interval: Duration) -> Self {
        Self { state, interval }
    }

    pub async fn run_cycle(&self) {
        debug!("starting sweep cycle");
        let now = Utc::now();

        let codes = SweepExpiredCodesUseCase {
            codes: self.state.code_repo(),
        };
        if let Err(e) = codes.execute(now).await {
            warn!(error = %e, "code sweep failed");
        }

        let teams = FormationTimeoutSweepUseCase {
            teams: self.state.team_repo(),
            platform: self.state.platform(),
            roles: self.state.roles.clone(),
        };
        if let Err(e) = teams.execute(now).await {
            warn!(error = %e, "formation sweep failed");
        }
    }

    /// Spawn the sweep loop. It ends once `shutdown` turns `true` or its
    /// sender is dropped.
    pub fn start(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_secs = self.interval.as_secs(), "sweeper started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.run_cycle().await,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("sweeper stopped");
        })
    }
}
