//! Compatibility layer between Rig and the research pipeline

mod rig_agent_adapter;

pub use rig_agent_adapter::RigAgentAdapter;
