//! Pre-wired test nodes and sessions.
//!
//! A [`TestNode`] assembles the real tracker, registry and pipeline of one
//! node around a [`RecordingRouter`], so tests exercise production code and
//! only observe delivery.

use crate::mock_logic::MockLogic;
use crate::mock_router::RecordingRouter;
use common::types::{SessionId, UserId};
use match_service::actors::{ActorMetrics, LocalMatchRegistry, DEFAULT_MAILBOX_CAPACITY};
use match_service::envelope::{
    Envelope, EnvelopeMessage, MatchCreate, MatchDataSend, MatchJoin, MatchLeave, StreamPresence,
};
use match_service::logic::LogicModules;
use match_service::pipeline::MatchPipeline;
use match_service::session::SessionInfo;
use match_service::tracker::LocalTracker;
use std::sync::Arc;

/// Node label used when a test does not care.
pub const TEST_NODE: &str = "node-a";

/// A connected session with fresh random ids.
pub fn test_session(username: &str) -> SessionInfo {
    SessionInfo::new(UserId::new(), SessionId::new(), username)
}

/// The wire view of a session, for data-send filters.
pub fn stream_presence(session: &SessionInfo) -> StreamPresence {
    StreamPresence::from(session)
}

/// Envelope builders for pipeline tests.
pub mod envelopes {
    use super::{
        Envelope, EnvelopeMessage, MatchCreate, MatchDataSend, MatchJoin, MatchLeave,
        StreamPresence,
    };

    pub fn create(cid: &str) -> Envelope {
        Envelope::new(
            Some(cid.to_string()),
            EnvelopeMessage::MatchCreate(MatchCreate {}),
        )
    }

    pub fn join(cid: &str, match_id: &str) -> Envelope {
        Envelope::new(
            Some(cid.to_string()),
            EnvelopeMessage::MatchJoin(MatchJoin {
                match_id: Some(match_id.to_string()),
                token: None,
            }),
        )
    }

    pub fn leave(cid: &str, match_id: &str) -> Envelope {
        Envelope::new(
            Some(cid.to_string()),
            EnvelopeMessage::MatchLeave(MatchLeave {
                match_id: match_id.to_string(),
            }),
        )
    }

    pub fn data(match_id: &str, op_code: i64, data: &[u8], presences: Vec<StreamPresence>) -> Envelope {
        Envelope::new(
            None,
            EnvelopeMessage::MatchDataSend(MatchDataSend {
                match_id: match_id.to_string(),
                op_code,
                data: data.to_vec(),
                presences,
            }),
        )
    }
}

/// Builder for [`TestNode`].
#[derive(Debug)]
pub struct TestNodeBuilder {
    node: String,
    mailbox_capacity: usize,
    modules: LogicModules,
}

impl TestNodeBuilder {
    /// Use a specific mailbox capacity for new matches.
    #[must_use]
    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity;
        self
    }

    /// Register `logic` under `name`.
    #[must_use]
    pub fn module(mut self, name: &str, logic: &MockLogic) -> Self {
        logic.register(&mut self.modules, name);
        self
    }

    pub fn build(self) -> TestNode {
        let tracker = Arc::new(LocalTracker::new(self.node.clone()));
        let router = Arc::new(RecordingRouter::new());
        let registry = LocalMatchRegistry::new(
            self.node.clone(),
            self.mailbox_capacity,
            self.modules,
            tracker.clone(),
            router.clone(),
            ActorMetrics::new(),
        );
        let pipeline = MatchPipeline::new(tracker.clone(), router.clone(), Arc::clone(&registry));

        TestNode {
            node: self.node,
            tracker,
            router,
            registry,
            pipeline,
        }
    }
}

/// One node's match stack with a recording router.
pub struct TestNode {
    pub node: String,
    pub tracker: Arc<LocalTracker>,
    pub router: Arc<RecordingRouter>,
    pub registry: Arc<LocalMatchRegistry>,
    pub pipeline: MatchPipeline,
}

impl TestNode {
    /// Start building a node labelled `node` with the built-in modules.
    pub fn builder(node: &str) -> TestNodeBuilder {
        TestNodeBuilder {
            node: node.to_string(),
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            modules: LogicModules::with_builtin(None),
        }
    }

    /// A node with only the built-in modules.
    pub fn new() -> Self {
        Self::builder(TEST_NODE).build()
    }

    /// A node where `logic` is registered as `"mock"`.
    pub fn with_logic(logic: &MockLogic) -> Self {
        Self::builder(TEST_NODE).module("mock", logic).build()
    }

    /// Run one envelope through the pipeline.
    pub async fn send(&self, session: &SessionInfo, envelope: Envelope) -> Option<Envelope> {
        self.pipeline.process(session, envelope).await
    }

    /// Create an authoritative match and return its wire id.
    ///
    /// # Panics
    ///
    /// Panics if the module cannot be loaded.
    pub async fn create_authoritative(&self, module: &str) -> String {
        self.registry
            .new_match(module)
            .await
            .expect("match should be created")
            .match_id()
            .to_string()
    }

    /// Create a relayed match owned by `session` and return its wire id.
    pub fn create_relayed(&self, session: &SessionInfo) -> String {
        self.pipeline.match_create(session).match_id
    }
}

impl Default for TestNode {
    fn default() -> Self {
        Self::new()
    }
}
