//! Match logic seam.
//!
//! Each authoritative match owns one [`MatchLogic`] instance, called only from
//! the match actor's loop. Logic never touches the registry, tracker or router
//! directly: it records requests on the [`MatchContext`] and the actor applies
//! them after the callback returns.

use crate::actors::messages::{JoinAttempt, MatchDataMessage};
use crate::errors::MatchError;
use crate::identifier::MatchId;
use crate::presence::MatchPresence;
use bytes::Bytes;
use common::types::SessionId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Name of the built-in relay module.
pub const BROADCAST_MODULE: &str = "broadcast";

/// Game logic driven by a match actor.
///
/// Callbacks may be slow; the join bridge enforces its own timeout.
#[async_trait::async_trait]
pub trait MatchLogic: Send {
    /// Decide whether a session may join.
    async fn on_join_attempt(&mut self, ctx: &mut MatchContext, attempt: &JoinAttempt) -> bool;

    /// Observe presences leaving the match.
    async fn on_leave(&mut self, ctx: &mut MatchContext, presences: &[MatchPresence]);

    /// Handle client data.
    async fn on_data(&mut self, ctx: &mut MatchContext, message: &MatchDataMessage);
}

/// Side effect requested by match logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchEffect {
    /// Evict presences from the match stream.
    Kick(Vec<MatchPresence>),
    /// Deliver data to stream members; `recipients: None` means everyone.
    Broadcast {
        op_code: i64,
        data: Bytes,
        sender: Option<MatchPresence>,
        recipients: Option<Vec<MatchPresence>>,
    },
    /// End the match.
    Terminate,
}

/// Per-callback view of the running match.
#[derive(Debug)]
pub struct MatchContext {
    match_id: MatchId,
    effects: Vec<MatchEffect>,
}

impl MatchContext {
    #[must_use]
    pub fn new(match_id: MatchId) -> Self {
        Self {
            match_id,
            effects: Vec::new(),
        }
    }

    /// The match being driven.
    #[must_use]
    pub fn match_id(&self) -> &MatchId {
        &self.match_id
    }

    /// Remove presences from the match.
    pub fn kick(&mut self, presences: Vec<MatchPresence>) {
        if !presences.is_empty() {
            self.effects.push(MatchEffect::Kick(presences));
        }
    }

    /// Send data to match members.
    pub fn broadcast(
        &mut self,
        op_code: i64,
        data: Bytes,
        sender: Option<MatchPresence>,
        recipients: Option<Vec<MatchPresence>>,
    ) {
        self.effects.push(MatchEffect::Broadcast {
            op_code,
            data,
            sender,
            recipients,
        });
    }

    /// Ask for the match to be closed once the current callback returns.
    pub fn terminate(&mut self) {
        self.effects.push(MatchEffect::Terminate);
    }

    /// Whether termination has been requested.
    #[must_use]
    pub fn is_terminating(&self) -> bool {
        self.effects.contains(&MatchEffect::Terminate)
    }

    /// Take the effects recorded so far.
    pub fn take_effects(&mut self) -> Vec<MatchEffect> {
        std::mem::take(&mut self.effects)
    }
}

/// Builds a fresh logic instance for a new match.
pub type LogicFactory =
    Arc<dyn Fn(&MatchId) -> Result<Box<dyn MatchLogic>, MatchError> + Send + Sync>;

/// Named match logic modules available on this node.
#[derive(Clone, Default)]
pub struct LogicModules {
    factories: HashMap<String, LogicFactory>,
}

impl fmt::Debug for LogicModules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogicModules")
            .field("modules", &self.names())
            .finish()
    }
}

impl LogicModules {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Modules shipped with the service.
    #[must_use]
    pub fn with_builtin(max_players: Option<usize>) -> Self {
        let mut modules = Self::new();
        modules.register(BROADCAST_MODULE, move |_| {
            Ok(Box::new(BroadcastLogic::new(max_players)) as Box<dyn MatchLogic>)
        });
        modules
    }

    /// Register (or replace) a module factory.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&MatchId) -> Result<Box<dyn MatchLogic>, MatchError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered module names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Instantiate the named module for `match_id`.
    ///
    /// # Errors
    ///
    /// Returns `MatchError::ModuleNotFound` for unknown names and whatever the
    /// factory returns when it fails.
    pub fn load(&self, name: &str, match_id: &MatchId) -> Result<Box<dyn MatchLogic>, MatchError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| MatchError::ModuleNotFound(name.to_string()))?;
        factory(match_id)
    }
}

/// Relay module: accepts joins up to an optional cap and forwards every data
/// message to every other member.
#[derive(Debug, Default)]
pub struct BroadcastLogic {
    max_players: Option<usize>,
    members: HashMap<SessionId, MatchPresence>,
}

impl BroadcastLogic {
    #[must_use]
    pub fn new(max_players: Option<usize>) -> Self {
        Self {
            max_players,
            members: HashMap::new(),
        }
    }

    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

#[async_trait::async_trait]
impl MatchLogic for BroadcastLogic {
    async fn on_join_attempt(&mut self, _ctx: &mut MatchContext, attempt: &JoinAttempt) -> bool {
        if self.members.contains_key(&attempt.session_id) {
            return true;
        }
        if self
            .max_players
            .is_some_and(|max| self.members.len() >= max)
        {
            return false;
        }
        self.members.insert(attempt.session_id, attempt.presence());
        true
    }

    async fn on_leave(&mut self, _ctx: &mut MatchContext, presences: &[MatchPresence]) {
        for presence in presences {
            self.members.remove(&presence.session_id);
        }
    }

    async fn on_data(&mut self, ctx: &mut MatchContext, message: &MatchDataMessage) {
        let recipients: Vec<MatchPresence> = self
            .members
            .values()
            .filter(|member| member.session_id != message.session_id)
            .cloned()
            .collect();
        if recipients.is_empty() {
            return;
        }
        ctx.broadcast(
            message.op_code,
            message.data.clone(),
            Some(message.sender()),
            Some(recipients),
        );
    }
}
