//! Utilities module - text processing shared across the crate

pub mod text_utils;

pub use text_utils::TextUtils;
