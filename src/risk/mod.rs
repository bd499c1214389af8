//! Safe mode state machine and trade-permission gate.
//!
//! The controller is either NORMAL or SAFE. Danger signals (losing streaks,
//! scoring failures, volatility spikes, drawdown) move it to SAFE for a fixed
//! cooldown. Leaving SAFE happens lazily: the first observer after the
//! deadline clears the flag through [`RiskController::expire_if_due`].

mod trigger;

pub use trigger::{ReleaseCause, RiskEvent, SafeModeTrigger};

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{Mutex, broadcast};
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::config::{MAX_SAFE_MODE_COOLDOWN_MINUTES, RiskConfig};

/// Losing closes in a row that trip `continuous_loss`.
pub const LOSS_STREAK_LIMIT: u32 = 3;

/// Scoring failures in a row that trip `ai_error`.
pub const AI_ERROR_LIMIT: u32 = 2;

const EVENT_CAPACITY: usize = 64;

/// Mutable risk counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RiskState {
    pub safe_mode: bool,
    pub safe_mode_until: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub error_count: u32,
    pub loss_streak: u32,
    /// Last reported daily drawdown ratio.
    pub drawdown: Decimal,
    /// Number of times safe mode has been tripped or extended.
    pub trips: u64,
}

/// Serializable snapshot of counters and limits.
#[derive(Debug, Clone, Serialize)]
pub struct RiskReport {
    #[serde(flatten)]
    pub state: RiskState,
    pub max_daily_loss_pct: Decimal,
    pub max_position_pct: Decimal,
    pub cooldown_minutes: i64,
    pub triggers: Vec<SafeModeTrigger>,
}

/// RiskController owns the safe mode state and the trading gate.
pub struct RiskController {
    max_daily_loss_pct: Decimal,
    max_position_pct: Decimal,
    cooldown: Duration,
    triggers: HashSet<SafeModeTrigger>,
    clock: Arc<dyn Clock>,
    state: Mutex<RiskState>,
    events: broadcast::Sender<RiskEvent>,
}

impl RiskController {
    /// Creates a controller in the NORMAL state.
    pub fn new(config: &RiskConfig, clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            max_daily_loss_pct: config.max_daily_loss_pct,
            max_position_pct: config.max_position_size_pct,
            cooldown: Duration::minutes(
                config
                    .safe_mode_cooldown_minutes
                    .clamp(0, MAX_SAFE_MODE_COOLDOWN_MINUTES),
            ),
            triggers: config.safe_mode_triggers.iter().copied().collect(),
            clock,
            state: Mutex::new(RiskState::default()),
            events,
        }
    }

    /// Receiver of every subsequent trip and release.
    pub fn subscribe(&self) -> broadcast::Receiver<RiskEvent> {
        self.events.subscribe()
    }

    /// Safe mode duration.
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Whether `trigger` is allowed to switch safe mode on.
    pub fn is_enabled(&self, trigger: SafeModeTrigger) -> bool {
        self.triggers.contains(&trigger)
    }

    /// Enters SAFE (or extends the deadline) for one cooldown from now.
    pub async fn trigger_safe_mode(&self, reason: &str) -> DateTime<Utc> {
        let mut state = self.state.lock().await;
        self.trip_locked(&mut state, reason)
    }

    /// Clears an expired deadline. Returns true when this call performed the
    /// transition back to NORMAL.
    pub async fn expire_if_due(&self) -> bool {
        let mut state = self.state.lock().await;
        self.expire_locked(&mut state)
    }

    /// Whether safe mode is active, expiring it first when due.
    pub async fn check_safe_mode(&self) -> bool {
        let mut state = self.state.lock().await;
        self.expire_locked(&mut state);
        state.safe_mode
    }

    /// Trading gate.
    pub async fn should_trade(&self) -> bool {
        !self.check_safe_mode().await
    }

    /// Records a closed trade. Any non-losing close resets the streak.
    pub async fn on_trade_result(&self, pnl: Decimal) -> Option<SafeModeTrigger> {
        let mut state = self.state.lock().await;
        self.expire_locked(&mut state);

        if pnl < Decimal::ZERO {
            state.loss_streak += 1;
        } else {
            state.loss_streak = 0;
        }

        if state.loss_streak >= LOSS_STREAK_LIMIT {
            return self.fire_locked(&mut state, SafeModeTrigger::ContinuousLoss);
        }
        None
    }

    /// Records a scoring failure.
    pub async fn on_ai_error(&self) -> Option<SafeModeTrigger> {
        let mut state = self.state.lock().await;
        self.expire_locked(&mut state);

        state.error_count += 1;
        warn!(error_count = state.error_count, "Scoring failure recorded");

        if state.error_count >= AI_ERROR_LIMIT {
            return self.fire_locked(&mut state, SafeModeTrigger::AiError);
        }
        None
    }

    /// Records a successful scoring call; failures must be consecutive.
    pub async fn on_ai_success(&self) {
        self.state.lock().await.error_count = 0;
    }

    /// Records a volatility reading.
    pub async fn on_atr_spike(&self, value: Decimal, threshold: Decimal) -> Option<SafeModeTrigger> {
        if value <= threshold {
            return None;
        }
        let mut state = self.state.lock().await;
        self.expire_locked(&mut state);
        self.fire_locked(&mut state, SafeModeTrigger::HighAtrSpike)
    }

    /// Records the current daily drawdown ratio.
    pub async fn on_drawdown(&self, ratio: Decimal) -> Option<SafeModeTrigger> {
        let mut state = self.state.lock().await;
        self.expire_locked(&mut state);

        state.drawdown = ratio;
        if ratio > self.max_daily_loss_pct {
            return self.fire_locked(&mut state, SafeModeTrigger::DrawdownExceeded);
        }
        None
    }

    /// Leaves SAFE immediately. Returns false when already NORMAL.
    pub async fn release(&self, cause: ReleaseCause) -> bool {
        let mut state = self.state.lock().await;
        if !state.safe_mode {
            return false;
        }
        self.release_locked(&mut state, cause);
        true
    }

    /// Size cap: `size <= balance * max_position_pct`, independent of safe mode.
    pub fn check_max_position(&self, size: Decimal, balance: Decimal) -> bool {
        size <= balance * self.max_position_pct
    }

    /// Snapshot of counters and limits.
    pub async fn report(&self) -> RiskReport {
        let triggers = SafeModeTrigger::ALL
            .into_iter()
            .filter(|t| self.triggers.contains(t))
            .collect();

        RiskReport {
            state: self.state.lock().await.clone(),
            max_daily_loss_pct: self.max_daily_loss_pct,
            max_position_pct: self.max_position_pct,
            cooldown_minutes: self.cooldown.num_minutes(),
            triggers,
        }
    }

    /// Trips for `trigger` when it is in the configured set.
    fn fire_locked(&self, state: &mut RiskState, trigger: SafeModeTrigger) -> Option<SafeModeTrigger> {
        if !self.is_enabled(trigger) {
            return None;
        }
        self.trip_locked(state, trigger.as_str());
        Some(trigger)
    }

    fn trip_locked(&self, state: &mut RiskState, reason: &str) -> DateTime<Utc> {
        let until = self
            .clock
            .now()
            .checked_add_signed(self.cooldown)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let extended = state.safe_mode;

        state.safe_mode = true;
        state.safe_mode_until = Some(until);
        state.reason = Some(reason.to_string());
        state.trips += 1;

        error!(
            reason = %reason,
            until = %until,
            extended = extended,
            "Safe mode tripped"
        );

        // No receivers is fine.
        let _ = self.events.send(RiskEvent::Tripped {
            reason: reason.to_string(),
            until,
        });
        until
    }

    fn expire_locked(&self, state: &mut RiskState) -> bool {
        if !state.safe_mode {
            return false;
        }
        match state.safe_mode_until {
            Some(until) if self.clock.now() < until => false,
            _ => {
                self.release_locked(state, ReleaseCause::Expired);
                true
            }
        }
    }

    fn release_locked(&self, state: &mut RiskState, cause: ReleaseCause) {
        state.safe_mode = false;
        state.safe_mode_until = None;
        state.reason = None;
        state.error_count = 0;
        state.loss_streak = 0;

        info!(cause = %cause, "Safe mode released");

        let _ = self.events.send(RiskEvent::Released { cause });
    }
}
