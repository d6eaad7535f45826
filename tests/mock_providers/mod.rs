//! Mock Provider Servers
//!
//! In-process stand-ins for the remote live agent:
//! - WebSocket live agent with a scripted conversation

// Allow dead code in test infrastructure - not every test binary uses every helper
#![allow(dead_code)]

pub mod live_agent_mock;

pub use live_agent_mock::{AgentStep, LiveAgentMock, LiveAgentMockState};
