//! The token transformers, by stage:
//!
//! | stage | transformer | rank |
//! |-------|-------------|------|
//! | 1 | [`OnlyIncludeHandler`] | 0.010 |
//! | 1 | [`IncludeDirectiveHandler`] | 0.020, 0.021 |
//! | 1 | [`BehaviorSwitchHandler`] | 0.140 |
//! | 2 | [`TemplateHandler`] | 1.100 |
//! | 2 | [`AttributeExpander`] | 1.120 |
//! | 2 | [`LinkHandler`] | 1.150 |
//! | 3 | [`QuoteTransformer`] | 2.100, 2.101 |
//! | 3 | [`ListHandler`] | 2.490 |
//! | 3 | [`Sanitizer`] | 2.900 |
//! | 3 | [`ParagraphWrapper`] | 2.950 |

mod attributes;
mod behavior_switch;
mod include;
mod links;
mod lists;
mod paragraphs;
mod quotes;
mod sanitizer;
pub mod templates;

pub use attributes::AttributeExpander;
pub use behavior_switch::BehaviorSwitchHandler;
pub use include::{IncludeDirectiveHandler, OnlyIncludeHandler};
pub use links::LinkHandler;
pub use lists::ListHandler;
pub use paragraphs::ParagraphWrapper;
pub use quotes::QuoteTransformer;
pub use sanitizer::Sanitizer;
pub use templates::TemplateHandler;
