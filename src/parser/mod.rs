//! Parser module for pipeline files

pub mod ast;
pub mod grammar;

pub use ast::*;
pub use grammar::parse_pipeline;
