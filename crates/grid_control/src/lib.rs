//! # grid_control
//!
//! Feedback controllers for the grid simulation scheduler.
//!
//! This crate provides:
//!
//! - [`Controller`] — the update contract every controller satisfies.
//! - [`PvController`], [`StorageController`], [`TransformerController`] —
//!   the built-in kinds, unified by [`AnyController`].
//! - [`ControllerSpec`] / [`ControllerSettings`] — declarative definitions.
//! - [`ControllerFactory`] — validates specs and binds controllers to
//!   engine elements.
//! - [`ControllerSet`] — controllers grouped by [`Priority`] tier.
//! - [`PresetRegistry`] — named settings shared across controllers.

pub mod any;
pub mod controller;
pub mod error;
pub mod factory;
pub mod presets;
pub mod pv;
pub mod set;
pub mod settings;
pub mod storage;
pub mod transformer;

pub use any::AnyController;
pub use controller::{Controller, ControllerState, Decision, EpochMemo, Priority};
pub use error::ConstructionError;
pub use factory::ControllerFactory;
pub use presets::PresetRegistry;
pub use pv::{PvController, PvMode, PvSettings};
pub use set::ControllerSet;
pub use settings::{ControllerKind, ControllerSettings, ControllerSpec, SettingsSource};
pub use storage::{StorageController, StorageSettings};
pub use transformer::{TransformerController, TransformerSettings};
