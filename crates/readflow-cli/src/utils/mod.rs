//! Input helpers shared by handlers.

pub mod controls;
pub mod input;
