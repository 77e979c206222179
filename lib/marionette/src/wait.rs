//! Condition waiting: suspend a request until a predicate holds, a signal
//! fires, or the deadline expires.

use crate::bridge::BridgeCtx;
use crate::serialize;
use crate::tasks::{Observe, Progress};
use hashbrown::HashSet;
use serde_json::{json, Value as Json};
use strand::contract::SubscriptionId;

pub const DEFAULT_TIMEOUT: f64 = 10.0;
pub const DEFAULT_POLL_INTERVAL: f64 = 0.1;
/// Signal waits poll their latch at a finer granularity.
pub const SIGNAL_POLL_INTERVAL: f64 = 0.05;

/// Routes one-shot signal subscriptions owned by waiters. The bridge feeds
/// every drained fire through [`SignalHub::note_fire`]; fires belonging to a
/// waiter latch here instead of reaching the event accumulator.
pub struct SignalHub {
    waiters: HashSet<SubscriptionId>,
    latched: HashSet<SubscriptionId>,
}

impl SignalHub {
    #[inline]
    pub fn new() -> SignalHub {
        SignalHub {
            waiters: HashSet::new(),
            latched: HashSet::new(),
        }
    }

    #[inline]
    pub fn register_waiter(&mut self, sub: SubscriptionId) {
        self.waiters.insert(sub);
    }

    /// Returns true when the fire belonged to a waiter and was latched.
    #[inline]
    pub fn note_fire(&mut self, sub: SubscriptionId) -> bool {
        if self.waiters.contains(&sub) {
            self.latched.insert(sub);
            return true;
        }
        false
    }

    /// Consumes the latch for one subscription.
    #[inline]
    pub fn take_latched(&mut self, sub: SubscriptionId) -> bool {
        self.latched.remove(&sub)
    }

    #[inline]
    pub fn forget(&mut self, sub: SubscriptionId) {
        self.waiters.remove(&sub);
        self.latched.remove(&sub);
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Condition {
    NodeExists,
    NodeFreed,
    PropertyEquals,
    PropertyGreater,
    PropertyLess,
    Signal,
}

impl Condition {
    pub fn parse(raw: &str) -> Option<Condition> {
        match raw {
            "node_exists" => Some(Condition::NodeExists),
            "node_freed" => Some(Condition::NodeFreed),
            "property_equals" => Some(Condition::PropertyEquals),
            "property_greater" => Some(Condition::PropertyGreater),
            "property_less" => Some(Condition::PropertyLess),
            "signal" => Some(Condition::Signal),
            _ => None,
        }
    }
}

/// Polled waiter, advanced once per frame by the task pump. Elapsed time is
/// measured on the engine clock, so a paused or time-scaled game stretches
/// the wait exactly as it stretches gameplay.
pub struct WaitForTask {
    condition: Condition,
    target: String,
    property: Option<String>,
    expected: Json,
    signal_sub: Option<SubscriptionId>,
    timeout: f64,
    poll_interval: f64,
    started: Option<f64>,
    next_poll: f64,
    observe: Observe,
    description: String,
}

impl WaitForTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        condition: Condition,
        target: String,
        property: Option<String>,
        expected: Json,
        signal_sub: Option<SubscriptionId>,
        timeout: f64,
        poll_interval: f64,
        observe: Observe,
        description: String,
    ) -> WaitForTask {
        WaitForTask {
            condition,
            target,
            property,
            expected,
            signal_sub,
            timeout,
            poll_interval,
            started: None,
            next_poll: 0.0,
            observe,
            description,
        }
    }

    pub fn advance(&mut self, ctx: &mut BridgeCtx) -> Progress {
        let now = ctx.engine.clock().seconds;
        let started = *self.started.get_or_insert(now);

        if now < self.next_poll {
            return Progress::Pending;
        }

        let elapsed = now - started;

        if self.evaluate(ctx) {
            self.cleanup(ctx);
            let mut base = json!({
                "condition_met": true,
                "elapsed": elapsed,
                "_description": self.description,
            });
            crate::routes::attach_observation(ctx, &mut base, self.observe);
            return Progress::Ready(crate::bridge::Reply::Json(base));
        }

        if elapsed >= self.timeout {
            self.cleanup(ctx);
            // Not an error; the caller decides what a timeout means.
            return Progress::Ready(crate::bridge::Reply::Json(json!({
                "condition_met": false,
                "elapsed": elapsed,
                "_description": format!("{} (timed out)", self.description),
            })));
        }

        self.next_poll = now + self.poll_interval;
        Progress::Pending
    }

    fn evaluate(&mut self, ctx: &mut BridgeCtx) -> bool {
        match self.condition {
            Condition::NodeExists => ctx.refs.resolve(&*ctx.engine, &self.target, None).is_some(),
            Condition::NodeFreed => ctx.refs.resolve(&*ctx.engine, &self.target, None).is_none(),
            Condition::Signal => match self.signal_sub {
                Some(sub) => ctx.hub.take_latched(sub),
                None => false,
            },
            Condition::PropertyEquals | Condition::PropertyGreater | Condition::PropertyLess => {
                let node = match ctx.refs.resolve(&*ctx.engine, &self.target, None) {
                    Some(node) => node,
                    None => return false,
                };
                let property = match &self.property {
                    Some(property) => property,
                    None => return false,
                };
                let actual = match ctx.engine.get_property(node, property) {
                    Ok(value) => serialize::to_json(&value),
                    Err(_) => return false,
                };

                match self.condition {
                    // Serialized-form equality, stable across JSON round-trips.
                    Condition::PropertyEquals => actual == self.expected,
                    Condition::PropertyGreater => match (actual.as_f64(), self.expected.as_f64()) {
                        (Some(actual), Some(expected)) => actual > expected,
                        _ => false,
                    },
                    Condition::PropertyLess => match (actual.as_f64(), self.expected.as_f64()) {
                        (Some(actual), Some(expected)) => actual < expected,
                        _ => false,
                    },
                    _ => unreachable!(),
                }
            }
        }
    }

    /// One-shot signal subscriptions are explicitly disconnected whether the
    /// wait succeeded or timed out.
    fn cleanup(&mut self, ctx: &mut BridgeCtx) {
        if let Some(sub) = self.signal_sub.take() {
            ctx.engine.disconnect(sub);
            ctx.hub.forget(sub);
        }
    }
}
