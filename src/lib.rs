// ABOUTME: Root library module for the chatrelay binary.
// ABOUTME: Exposes the runtime wiring, logging setup and platform adapters.

pub mod app;
pub mod logging;
pub mod platform;
