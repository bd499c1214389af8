//! Safe mode orchestration on top of the risk controller.
//!
//! Adds cooldown-gated enabling, manual disabling and a supervisor loop that
//! expires safe mode on time and reports every transition to the notifier.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::non_zero_or;
use crate::notification::{Event, Notifier, SafeModeData};
use crate::risk::{ReleaseCause, RiskController, RiskEvent};

/// Supervisor polling interval when the config leaves it unset.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(10);

/// SafeModeSystem dedups safe mode triggers and supervises expiry.
pub struct SafeModeSystem {
    risk: Arc<RiskController>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    monitor_interval: Duration,
    last_trigger: Mutex<Option<DateTime<Utc>>>,
}

impl SafeModeSystem {
    /// Creates the system. A zero interval falls back to the default.
    pub fn new(
        risk: Arc<RiskController>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        monitor_interval: Duration,
    ) -> Self {
        Self {
            risk,
            notifier,
            clock,
            monitor_interval: non_zero_or(monitor_interval, DEFAULT_MONITOR_INTERVAL),
            last_trigger: Mutex::new(None),
        }
    }

    /// False while the previous trigger is younger than the cooldown.
    pub async fn should_enable(&self, reason: &str) -> bool {
        let last = *self.last_trigger.lock().await;
        let allowed = self.outside_cooldown(last);
        if !allowed {
            debug!(reason = %reason, "Safe mode trigger within cooldown, ignored");
        }
        allowed
    }

    /// Trips safe mode unless a trigger fired within the cooldown. Returns
    /// whether it fired.
    pub async fn enable(&self, reason: &str) -> bool {
        let mut last = self.last_trigger.lock().await;
        if !self.outside_cooldown(*last) {
            debug!(reason = %reason, "Safe mode trigger within cooldown, ignored");
            return false;
        }

        let until = self.risk.trigger_safe_mode(reason).await;
        *last = Some(self.clock.now());
        drop(last);

        self.notify_enabled(reason, until);
        true
    }

    /// Leaves safe mode now. Returns false when it was not active.
    pub async fn disable(&self, notify: bool) -> bool {
        let released = self.risk.release(ReleaseCause::Manual).await;
        if !released {
            debug!("Safe mode disable requested while inactive");
            return false;
        }

        info!("Safe mode disabled manually");
        if notify {
            self.notify_released(ReleaseCause::Manual);
        }
        true
    }

    /// Supervisor loop. Expires safe mode on every tick and reports trips and
    /// expiries published by the risk controller. Returns once `shutdown`
    /// flips to true or its sender is dropped.
    pub async fn auto_monitor(&self, mut shutdown: watch::Receiver<bool>) {
        let mut events = self.risk.subscribe();
        let mut ticker = tokio::time::interval(self.monitor_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(interval_ms = self.monitor_interval.as_millis() as u64, "Safe mode monitor started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.risk.expire_if_due().await;
                }

                event = events.recv() => match event {
                    Ok(RiskEvent::Tripped { reason, until }) => self.on_tripped(&reason, until).await,
                    Ok(RiskEvent::Released { cause: ReleaseCause::Expired }) => {
                        info!("Safe mode expired");
                        self.notify_released(ReleaseCause::Expired);
                    }
                    Ok(RiskEvent::Released { cause: ReleaseCause::Manual }) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped = skipped, "Safe mode monitor lagged behind risk events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Safe mode monitor stopped");
    }

    /// Runs [`Self::auto_monitor`] on its own task.
    pub fn spawn_monitor(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let system = Arc::clone(self);
        tokio::spawn(async move { system.auto_monitor(shutdown).await })
    }

    /// Trips raised inside the risk controller count as triggers too.
    async fn on_tripped(&self, reason: &str, until: DateTime<Utc>) {
        let mut last = self.last_trigger.lock().await;
        if !self.outside_cooldown(*last) {
            return;
        }
        *last = Some(self.clock.now());
        drop(last);

        self.notify_enabled(reason, until);
    }

    fn outside_cooldown(&self, last: Option<DateTime<Utc>>) -> bool {
        match last {
            Some(at) => self.clock.now() - at >= self.risk.cooldown(),
            None => true,
        }
    }

    fn notify_enabled(&self, reason: &str, until: DateTime<Utc>) {
        self.notifier.send_async(Event::safe_mode(SafeModeData {
            enabled: true,
            reason: reason.to_string(),
            until: Some(until),
        }));
    }

    fn notify_released(&self, cause: ReleaseCause) {
        self.notifier.send_async(Event::safe_mode(SafeModeData {
            enabled: false,
            reason: cause.to_string(),
            until: None,
        }));
    }
}
