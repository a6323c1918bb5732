//! Application layer running the kiosk workflow.
//!
//! This module defines the `KioskEngine`, the entry point for driving the
//! workflow. It uses an actor-like pattern with `tokio` channels so the
//! workflow state is only ever touched by one task.

pub mod engine;
