//! The tag templating language: parser, syntax tree, evaluator and a
//! version-keyed cache of compiled bodies.

pub mod ast;
pub mod cache;
pub mod evaluator;
pub mod parser;

pub use ast::{ArgRef, LookupKind, ModLookup, Node, Predicate, Subject, Template, TemplateStats};
pub use cache::TemplateCache;
pub use evaluator::{evaluate, EvalContext, EvalLimits, LookupTable, LookupValue, ModerationView};
pub use parser::parse;
