#![allow(dead_code)]

pub mod cli;
pub mod compiler;
pub mod diagnostics;
pub mod project;

pub use cli::*;
pub use compiler::stringtable::{StringId, StringTable};
