// mica-embed - Embedding API for the Mica scripting language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! # mica-embed
//!
//! High-level interface for running Mica from Rust: the [`Engine`]
//! facade, the [`evaluate`] pipeline, default globals, and native
//! registration from declaration headers.

pub mod engine;

pub use engine::{add_native, default_globals, evaluate, Engine};
