//! Subscriptions: one-shot execution with heartbeat/on-change gating, and the
//! scheduler that re-executes recurring subscriptions until their stream is
//! cancelled.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::Duration;

use gnmilite_core::protocol::{
    is_equal_values, now_nanos, ListMode, Notification, SubscribeResponse, SubscriptionList,
    SubscriptionMode, SubscriptionSpec, TypedValue, Update,
};
use gnmilite_core::tree::{Device, Selection};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{GnmiError, Result};
use crate::get::get_val;
use crate::select::{advance_selection, select_path};

/// Shortest period a recurring subscription may tick at.
pub const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(1);

/// Outbound side of a Subscribe stream.
pub trait SubscriptionSink: Send + Sync {
    fn send(&self, resp: SubscribeResponse) -> Result<()>;
}

impl<F> SubscriptionSink for F
where
    F: Fn(SubscribeResponse) -> Result<()> + Send + Sync,
{
    fn send(&self, resp: SubscribeResponse) -> Result<()> {
        self(resp)
    }
}

/// Anything the scheduler can tick.
pub trait RecurringSubscription: Send + Sync + 'static {
    fn execute(&self) -> Result<()>;

    fn sample_interval(&self) -> Duration;
}

#[derive(Debug, Default)]
struct State {
    previous_value: Option<TypedValue>,
    previous_time: Option<Instant>,
}

/// One subscription of a subscription list.
pub struct Subscription {
    device: Arc<dyn Device>,
    prefix: Option<Arc<dyn Selection>>,
    spec: SubscriptionSpec,
    sink: Arc<dyn SubscriptionSink>,
    state: Mutex<State>,
}

impl Subscription {
    pub fn new(
        device: Arc<dyn Device>,
        prefix: Option<Arc<dyn Selection>>,
        spec: SubscriptionSpec,
        sink: Arc<dyn SubscriptionSink>,
    ) -> Self {
        Self {
            device,
            prefix,
            spec,
            sink,
            state: Mutex::new(State::default()),
        }
    }

    pub fn spec(&self) -> &SubscriptionSpec {
        &self.spec
    }

    /// Read the current value and emit it unless this is an ON_CHANGE
    /// subscription whose value has not changed since the last emission and
    /// whose heartbeat has not elapsed yet. Runs never overlap: a call made
    /// while another run is in progress waits for it.
    pub fn execute(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.run(&mut state)
    }

    /// Like [`execute`](Self::execute), but returns `Ok(false)` without
    /// running when another run is in progress.
    pub fn try_execute(&self) -> Result<bool> {
        let mut state = match self.state.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
            Err(TryLockError::WouldBlock) => return Ok(false),
        };
        self.run(&mut state).map(|()| true)
    }

    fn run(&self, state: &mut State) -> Result<()> {
        let sel = advance_selection(
            self.device.as_ref(),
            self.prefix.as_deref(),
            self.spec.path.as_ref(),
        )?;
        tracing::debug!(path = %sel.path(), "sub request");
        let val = get_val(sel.as_ref())?;

        let now = Instant::now();
        if let (Some(prev), Some(at)) = (&state.previous_value, state.previous_time) {
            if now.duration_since(at) < self.spec.heartbeat()
                && self.spec.mode == SubscriptionMode::OnChange
                && is_equal_values(Some(prev), Some(&val))
            {
                return Ok(());
            }
        }

        let resp = SubscribeResponse::Update(Notification {
            timestamp: now_nanos(),
            update: vec![Update {
                path: self.spec.path.clone().unwrap_or_default(),
                val: val.clone(),
            }],
        });
        self.sink.send(resp)?;
        state.previous_value = Some(val);
        state.previous_time = Some(now);
        Ok(())
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

impl RecurringSubscription for Subscription {
    /// A tick that finds a run in progress (e.g. a poll) is skipped.
    fn execute(&self) -> Result<()> {
        if !self.try_execute()? {
            tracing::debug!(path = ?self.spec.path, "previous run still in progress, tick skipped");
        }
        Ok(())
    }

    fn sample_interval(&self) -> Duration {
        self.spec.effective_sample_interval()
    }
}

type Registry = Mutex<HashMap<Uuid, Arc<dyn RecurringSubscription>>>;

/// Owns the ticking tasks of every recurring subscription.
#[derive(Default)]
pub struct SubscriptionManager {
    active: Arc<Registry>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `sub` to run every sample interval until `token` is
    /// cancelled. The first tick is one interval from now. Must be called
    /// from within a tokio runtime.
    pub fn register(
        &self,
        token: &CancellationToken,
        sub: Arc<dyn RecurringSubscription>,
    ) -> Result<Uuid> {
        let period = sub.sample_interval();
        check_period(period)?;
        let id = Uuid::new_v4();
        lock(&self.active).insert(id, Arc::clone(&sub));
        tracing::debug!(%id, ?period, "starting ticker");

        let registry = Arc::clone(&self.active);
        let token = token.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if token.is_cancelled() {
                            break;
                        }
                        if let Err(e) = sub.execute() {
                            tracing::warn!(%id, "cannot execute subscription: {}", e);
                        }
                    }
                }
            }
            lock(&registry).remove(&id);
            tracing::debug!(%id, "ticker stopped");
        });
        Ok(id)
    }

    /// Number of subscriptions whose task is still running.
    pub fn active_count(&self) -> usize {
        lock(&self.active).len()
    }
}

fn check_period(period: Duration) -> Result<()> {
    if period.is_zero() {
        return Err(GnmiError::NoSampleInterval);
    }
    if period < MIN_SAMPLE_INTERVAL {
        return Err(GnmiError::SampleIntervalTooShort {
            given: period,
            min: MIN_SAMPLE_INTERVAL,
        });
    }
    Ok(())
}

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<Uuid, Arc<dyn RecurringSubscription>>> {
    registry.lock().unwrap_or_else(|e| e.into_inner())
}

/// Validate and start a subscription list: resolve its prefix once, execute
/// every subscription synchronously, then schedule them unless the list is
/// ONCE. The first failure aborts the list and nothing of it is scheduled.
pub fn handle_subscribe_list(
    device: &Arc<dyn Device>,
    manager: &SubscriptionManager,
    token: &CancellationToken,
    list: &SubscriptionList,
    sink: Arc<dyn SubscriptionSink>,
) -> Result<Vec<Arc<Subscription>>> {
    let prefix: Option<Arc<dyn Selection>> =
        select_path(device.as_ref(), &list.use_models, list.prefix.as_ref())?.map(Arc::from);

    let recurring = list.mode != ListMode::Once;
    if recurring {
        for spec in &list.subscription {
            check_period(spec.effective_sample_interval())?;
        }
    }

    let mut created = Vec::with_capacity(list.subscription.len());
    for spec in &list.subscription {
        tracing::debug!(mode = ?list.mode, sub_mode = ?spec.mode, "new subscription");
        let sub = Arc::new(Subscription::new(
            Arc::clone(device),
            prefix.clone(),
            spec.clone(),
            Arc::clone(&sink),
        ));
        sub.execute()?;
        created.push(sub);
    }
    if recurring {
        for sub in &created {
            manager.register(token, Arc::clone(sub) as Arc<dyn RecurringSubscription>)?;
        }
    }
    Ok(created)
}
