//! inkpad-dom: the editable page model.
//!
//! An arena document with the pieces of the browser DOM that an editing kernel
//! leans on: tree mutation, markup in and out, boundary-point ranges, a live
//! selection, inline styles, renderer-supplied element boxes for hit testing,
//! and mutation records for an observer to batch up.

pub mod document;
pub mod error;
pub mod markup;
pub mod mutation;
pub mod node;
pub mod range;
pub mod style;

pub use document::Document;
pub use error::DomError;
pub use markup::is_void_element;
pub use mutation::{MutationKind, MutationRecord};
pub use node::{Attribute, Element, NodeId, NodeKind, Rect};
pub use range::{DomRange, Position};
pub use style::{format_px, parse_px};
