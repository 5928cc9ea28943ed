//! Template resolution
//!
//! Renders naming templates against a per-target context and applies
//! literal replacements to the result.

mod render;
mod replace;

pub use render::{render, Template, TemplateContext, TemplateError};
pub use replace::Replacer;
