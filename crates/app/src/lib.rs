//! Command-line front end for resonare
//!
//! The binary lives in `src/cli/main.rs`; this library holds the pieces of
//! it worth testing on their own.

pub mod effect_arg;
pub mod pipeline;

pub use effect_arg::parse_effect_arg;
pub use pipeline::{render_file, RenderReport};
