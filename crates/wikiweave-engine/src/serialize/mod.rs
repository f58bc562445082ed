//! # Serialization
//!
//! Two ways out of a [`Document`](crate::Document):
//!
//! - [`serialize`] writes HTML, optionally with `data-parsoid` provenance
//!   attributes and a map from expansion `about` ids to the byte range of
//!   their output.
//! - [`reconstruct_source`] rebuilds the page source from the source ranges
//!   of the top-level nodes. Succeeding means every byte of non-whitespace
//!   source is accounted for by exactly one node.

mod html;
mod wikitext;

pub use html::{SerializeOptions, Serialized, body_html, serialize};
pub use wikitext::{ReconstructError, reconstruct_source};
