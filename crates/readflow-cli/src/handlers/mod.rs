//! Command handlers.
//!
//! Each handler takes resolved settings and its own arguments, drives the
//! library crates and formats output for the terminal.

pub mod health;
pub mod segment;
pub mod speak;
pub mod voices;
