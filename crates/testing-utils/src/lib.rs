//! # Coordinator Testing Utils
//!
//! Shared testing utilities for the coordination workspace.
//!
//! - **Builders**: `InstanceRegistrationBuilder` with sensible defaults
//! - **Mocks**: fault-injecting registration backends and task cache stores
//! - **Helpers**: a manually driven `ManualClock` and async wait helpers
//!
//! ```toml
//! [dev-dependencies]
//! coordinator-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
