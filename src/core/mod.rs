// src/core/mod.rs
mod engine;

pub mod annotations;
pub mod inspect;
pub mod model;
pub mod parser;
pub mod program;
pub mod report;
pub mod signature;
pub mod syntax;

pub use engine::Engine;
