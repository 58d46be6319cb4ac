use crate::Document;
use crate::element_set::ElementSet;

/// Loading phase of a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
}

impl ReadyState {
    /// Interactive or complete; `DOMContentLoaded` has already fired.
    pub fn is_ready(self) -> bool {
        !matches!(self, Self::Loading)
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Interactive => "interactive",
            Self::Complete => "complete",
        }
    }
}

/// Outcome of [`ready`].
pub enum Ready<T> {
    /// The document was already ready and the action ran synchronously.
    Ran(T),
    /// The action waits for `DOMContentLoaded`; the set wraps the document node.
    Deferred(ElementSet),
}

impl<T> Ready<T> {
    pub fn ran(self) -> Option<T> {
        match self {
            Self::Ran(value) => Some(value),
            Self::Deferred(_) => None,
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }
}

/// Runs `action` now if `doc` is ready, otherwise once when it becomes interactive.
///
/// A deferred action's return value is dropped.
pub fn ready<T, F>(doc: &Document, action: F) -> Ready<T>
where
    F: FnOnce(&Document) -> T + 'static,
{
    if doc.ready_state().is_ready() {
        return Ready::Ran(action(doc));
    }

    doc.when_ready(move |doc| {
        action(doc);
    });
    Ready::Deferred(ElementSet::from_nodes(doc, vec![doc.root()]))
}
