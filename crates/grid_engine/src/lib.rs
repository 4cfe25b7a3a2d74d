//! # grid_engine
//!
//! The engine side of the grid simulation scheduler.
//!
//! This crate provides:
//!
//! - [`Engine`] — the adapter contract the scheduler drives (advance,
//!   re-solve, read/write element properties).
//! - [`ElementId`] / [`ElementName`] — stable element handles and
//!   `Class.name` identifiers.
//! - [`ElementStore`] — the arena owning every element record.
//! - [`PropertyValue`] — the value of one element property.
//! - [`SandboxEngine`] — a deterministic in-memory engine built from a
//!   [`SandboxSpec`].

pub mod element;
pub mod engine;
pub mod error;
pub mod sandbox;
pub mod store;
pub mod value;

pub use element::{ElementAllocator, ElementId, ElementName};
pub use engine::{Engine, TimeStep};
pub use error::EngineError;
pub use sandbox::{SandboxEngine, SandboxSpec};
pub use store::{ElementRecord, ElementStore};
pub use value::PropertyValue;
