//! Concierge core: routing, prompt projection and action execution for a
//! skill-based customer-support agent running against a mutable backend mock.

pub mod action;
pub mod llm_client;
pub mod mock_state;
pub mod policy;
pub mod preview;
pub mod projector;
pub mod prompts;
pub mod routing;
pub mod session;
pub mod skill;
pub mod transcript;

pub use mock_state::{MockState, MockStore};
pub use session::{SessionController, TurnOutcome};
pub use skill::Skill;
