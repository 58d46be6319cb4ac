//! Chainable element collections over a live document tree, with a frame-stepped
//! property animation engine.
//!
//! The entry points are [`query`] and [`ready`]. Both take a [`Document`], the
//! deterministic in-memory tree that stands in for a browser host: it parses HTML
//! fragments, resolves selectors, stores listeners and runs timers on a virtual clock
//! that only advances when the caller asks it to.
//!
//! ```
//! use dom_chain::{query, AnimateOptions, Document};
//!
//! let doc = Document::from_html("<div id='box' style='left: 0px'></div>")?;
//! let boxes = query(&doc, "#box")?;
//! boxes.add_class("moving")?.animate([("left", 120.0)], AnimateOptions::new().duration(100.0), None)?;
//!
//! doc.flush()?;
//! assert_eq!(doc.style(boxes.elements()[0], "left")?, "120px");
//! # Ok::<(), dom_chain::Error>(())
//! ```

use std::error::Error as StdError;
use std::fmt;

mod animation;
mod document;
mod dom;
mod dom_utils;
mod element_set;
mod events;
mod html;
mod insertion;
mod ready;
mod selector;
mod timers;
mod unique_id;

pub use animation::{
    AnimateOptions, CompletionCallback, FrameBudget, PropertyAccessor, PropertyGetter,
    PropertyRegistry, PropertySetter,
};
pub use document::{ComputedStyle, Document};
pub use dom::NodeId;
pub use element_set::{ElementSet, Query, query};
pub use events::{Event, EventHandler};
pub use insertion::Insertable;
pub use ready::{Ready, ReadyState, ready};
pub use timers::{PendingTimer, TimerId};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    HtmlParse(String),
    UnsupportedSelector(String),
    Dom(String),
    EmptySet { operation: &'static str },
    Timer(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HtmlParse(msg) => write!(f, "html parse error: {msg}"),
            Self::UnsupportedSelector(selector) => write!(f, "unsupported selector: {selector}"),
            Self::Dom(msg) => write!(f, "dom error: {msg}"),
            Self::EmptySet { operation } => {
                write!(f, "{operation} called on an empty element set")
            }
            Self::Timer(msg) => write!(f, "timer error: {msg}"),
        }
    }
}

impl StdError for Error {}

#[cfg(test)]
mod tests;
