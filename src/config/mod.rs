//! Configuration module for the rendering engine
//!
//! This module provides the `EngineConfig` struct and its builder for
//! configuring browser launch, navigation targets and time budgets with
//! validation and sensible defaults.

// Sub-modules
pub mod builder;
pub mod getters;
pub mod types;

// Re-exports for public API
pub use builder::EngineConfigBuilder;
pub use types::{Budget, Endpoint, EndpointBudgets, EngineConfig, ExecutionMode, ViewportConfig};
