//! # The standard tag catalog
//!
//! Every tag satisfies the generic [`Tag`] parse contract and produces
//! nodes satisfying the [`crate::ast::Node`] render contract. The registry
//! is a plain name-to-implementation map; parsers dispatch by string key.

pub mod assign;
pub mod capture;
pub mod case;
pub mod cycle;
pub mod echo;
pub mod for_tag;
pub mod if_tag;
pub mod include;
pub mod increment;
pub mod render;

use std::collections::HashMap;

use crate::environment::Tag;

/// The standard tag set, registered by [`crate::environment::Environment::new`].
pub fn standard_tags() -> HashMap<String, Box<dyn Tag>> {
    let mut tags: HashMap<String, Box<dyn Tag>> = HashMap::new();
    tags.insert("assign".to_string(), Box::new(assign::AssignTag));
    tags.insert("capture".to_string(), Box::new(capture::CaptureTag));
    tags.insert("case".to_string(), Box::new(case::CaseTag));
    tags.insert("cycle".to_string(), Box::new(cycle::CycleTag));
    tags.insert("decrement".to_string(), Box::new(increment::DecrementTag));
    tags.insert("echo".to_string(), Box::new(echo::EchoTag));
    tags.insert("for".to_string(), Box::new(for_tag::ForTag));
    tags.insert("break".to_string(), Box::new(for_tag::BreakTag));
    tags.insert("continue".to_string(), Box::new(for_tag::ContinueTag));
    tags.insert("if".to_string(), Box::new(if_tag::IfTag));
    tags.insert("include".to_string(), Box::new(include::IncludeTag));
    tags.insert("increment".to_string(), Box::new(increment::IncrementTag));
    tags.insert("render".to_string(), Box::new(render::RenderTag));
    tags.insert("unless".to_string(), Box::new(if_tag::UnlessTag));
    tags
}
