//! Identity and value model shared by every layer.
//!
//! # Responsibility
//! - Define `Handle`, the path identity of stateful objects and events.
//! - Define `Value`, the closed set of persistable primitive shapes.
//!
//! # Invariants
//! - Handle paths are deterministic and unique within one run's object tree.
//! - Every `Value` survives an encode/decode cycle unchanged.

pub mod handle;
pub mod value;
