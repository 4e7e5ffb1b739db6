//! # Match Test Utilities
//!
//! Shared test utilities for the match service.
//!
//! ## Modules
//!
//! - `mock_logic` - Scripted match logic with a shared call recorder
//! - `mock_router` - Router that records deliveries
//! - `fixtures` - Sessions, envelopes and fully wired test nodes
//!
//! ## Usage
//!
//! ```rust,ignore
//! use match_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let logic = MockLogic::accepting();
//!     let node = TestNode::with_logic(&logic);
//!     let alice = test_session("alice");
//!
//!     let match_id = node.create_authoritative("mock").await;
//!     let reply = node.send(&alice, envelopes::join("1", &match_id)).await;
//!
//!     assert_eq!(logic.calls().join_count(), 1);
//! }
//! ```

pub mod fixtures;
pub mod mock_logic;
pub mod mock_router;

pub use fixtures::{envelopes, stream_presence, test_session, TestNode, TestNodeBuilder, TEST_NODE};
pub use mock_logic::{CallRecorder, JoinBehavior, MockLogic, OP_TERMINATE};
pub use mock_router::{Delivery, RecordingRouter};
