pub mod assignment;
pub mod capacity;
pub mod config;
pub mod error;
pub mod gatekeeper;
pub mod item;
pub mod log;
pub mod node;
pub mod provision;
pub mod registry;
pub mod shutdown;
pub mod surface;

pub use error::{OneShotError, Result};
pub use node::{CauseOfBlockage, EphemeralNode, NodeState};
