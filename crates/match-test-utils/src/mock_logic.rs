//! Scripted match logic for registry and pipeline tests.
//!
//! A [`MockLogic`] decides joins according to its [`JoinBehavior`] and records
//! every callback in a [`CallRecorder`] shared by all matches created from the
//! same registration, so a test can observe what the actor delivered.
//!
//! # Example
//!
//! ```rust,ignore
//! use match_test_utils::MockLogic;
//!
//! let logic = MockLogic::rejecting();
//! let calls = logic.calls();
//!
//! let mut modules = LogicModules::new();
//! logic.register(&mut modules, "mock");
//!
//! // ... drive the registry ...
//! assert_eq!(calls.join_count(), 1);
//! ```

use async_trait::async_trait;
use match_service::actors::{JoinAttempt, MatchDataMessage};
use match_service::logic::{LogicModules, MatchContext, MatchLogic};
use match_service::presence::MatchPresence;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Op code that makes a [`MockLogic`] request termination from `on_data`.
pub const OP_TERMINATE: i64 = -100;

/// How a [`MockLogic`] answers join attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JoinBehavior {
    #[default]
    Accept,
    Reject,
    /// Never answer.
    Stall,
    /// Panic inside the callback.
    Panic,
}

#[derive(Debug, Default)]
struct Calls {
    joins: Vec<JoinAttempt>,
    leaves: Vec<MatchPresence>,
    data: Vec<MatchDataMessage>,
}

/// Shared log of the callbacks a [`MockLogic`] received.
#[derive(Debug, Clone, Default)]
pub struct CallRecorder {
    inner: Arc<Mutex<Calls>>,
}

impl CallRecorder {
    fn lock(&self) -> MutexGuard<'_, Calls> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn join_count(&self) -> usize {
        self.lock().joins.len()
    }

    pub fn joins(&self) -> Vec<JoinAttempt> {
        self.lock().joins.clone()
    }

    pub fn leave_count(&self) -> usize {
        self.lock().leaves.len()
    }

    pub fn leaves(&self) -> Vec<MatchPresence> {
        self.lock().leaves.clone()
    }

    pub fn data_count(&self) -> usize {
        self.lock().data.len()
    }

    pub fn data(&self) -> Vec<MatchDataMessage> {
        self.lock().data.clone()
    }

    /// Wait up to one second for at least `count` leave callbacks.
    pub async fn wait_for_leaves(&self, count: usize) -> bool {
        self.wait_until(|calls| calls.leaves.len() >= count).await
    }

    /// Wait up to one second for at least `count` data callbacks.
    pub async fn wait_for_data(&self, count: usize) -> bool {
        self.wait_until(|calls| calls.data.len() >= count).await
    }

    async fn wait_until(&self, done: impl Fn(&Calls) -> bool) -> bool {
        for _ in 0..200 {
            if done(&self.lock()) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        done(&self.lock())
    }
}

/// Match logic with scripted join decisions.
#[derive(Debug, Clone, Default)]
pub struct MockLogic {
    join: JoinBehavior,
    echo_data: bool,
    calls: CallRecorder,
}

impl MockLogic {
    pub fn new(join: JoinBehavior) -> Self {
        Self {
            join,
            ..Self::default()
        }
    }

    pub fn accepting() -> Self {
        Self::new(JoinBehavior::Accept)
    }

    pub fn rejecting() -> Self {
        Self::new(JoinBehavior::Reject)
    }

    pub fn stalling() -> Self {
        Self::new(JoinBehavior::Stall)
    }

    pub fn panicking() -> Self {
        Self::new(JoinBehavior::Panic)
    }

    /// Broadcast every data message back to all members, sender included.
    #[must_use]
    pub fn echo_data(mut self) -> Self {
        self.echo_data = true;
        self
    }

    /// Recorder shared by every instance cloned from this one.
    pub fn calls(&self) -> CallRecorder {
        self.calls.clone()
    }

    /// Register this logic under `name`; each new match gets a clone.
    pub fn register(&self, modules: &mut LogicModules, name: &str) {
        let template = self.clone();
        modules.register(name, move |_| Ok(Box::new(template.clone()) as Box<dyn MatchLogic>));
    }
}

#[async_trait]
impl MatchLogic for MockLogic {
    async fn on_join_attempt(&mut self, _ctx: &mut MatchContext, attempt: &JoinAttempt) -> bool {
        self.calls.lock().joins.push(attempt.clone());
        match self.join {
            JoinBehavior::Accept => true,
            JoinBehavior::Reject => false,
            JoinBehavior::Stall => std::future::pending().await,
            JoinBehavior::Panic => panic!("mock logic panicked on join"),
        }
    }

    async fn on_leave(&mut self, _ctx: &mut MatchContext, presences: &[MatchPresence]) {
        self.calls.lock().leaves.extend_from_slice(presences);
    }

    async fn on_data(&mut self, ctx: &mut MatchContext, message: &MatchDataMessage) {
        self.calls.lock().data.push(message.clone());
        if message.op_code == OP_TERMINATE {
            ctx.terminate();
        } else if self.echo_data {
            ctx.broadcast(
                message.op_code,
                message.data.clone(),
                Some(message.sender()),
                None,
            );
        }
    }
}
