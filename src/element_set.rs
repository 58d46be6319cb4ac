use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::ops::ControlFlow;
use std::rc::Rc;

use crate::animation::{self, AnimateOptions, AnimationSlot, CompletionCallback};
use crate::dom::NodeId;
use crate::events::EventHandler;
use crate::insertion::{InsertPosition, Insertable, insert_into, resolve_single};
use crate::unique_id::ensure_unique_id;
use crate::{Document, Error, Result};

const VISIBLE_VALUES: [&str; 4] = ["", "visible", "initial", "inherit"];

/// What [`query`] resolves into an [`ElementSet`].
///
/// Strings starting with `<` are markup, any other string is a selector.
#[derive(Debug)]
pub enum Query {
    Selector(String),
    Markup(String),
    Node(NodeId),
    Nodes(Vec<NodeId>),
    Document,
    Collection(ElementSet),
}

impl From<&str> for Query {
    fn from(query: &str) -> Self {
        Query::from(query.to_string())
    }
}

impl From<String> for Query {
    fn from(query: String) -> Self {
        if query.starts_with('<') {
            Query::Markup(query)
        } else {
            Query::Selector(query)
        }
    }
}

impl From<NodeId> for Query {
    fn from(node: NodeId) -> Self {
        Query::Node(node)
    }
}

impl From<Vec<NodeId>> for Query {
    fn from(nodes: Vec<NodeId>) -> Self {
        Query::Nodes(nodes)
    }
}

impl From<&[NodeId]> for Query {
    fn from(nodes: &[NodeId]) -> Self {
        Query::Nodes(nodes.to_vec())
    }
}

impl From<ElementSet> for Query {
    fn from(set: ElementSet) -> Self {
        Query::Collection(set)
    }
}

impl From<&Document> for Query {
    fn from(_: &Document) -> Self {
        Query::Document
    }
}

/// Wraps whatever `query` resolves to.
///
/// Markup that cannot be materialized yields an empty set (the failure is logged);
/// selector errors are returned as they come from the document.
pub fn query(doc: &Document, query: impl Into<Query>) -> Result<ElementSet> {
    let elements = match query.into() {
        Query::Collection(set) => return Ok(set),
        Query::Markup(markup) => doc.create_element(&markup).into_iter().collect(),
        Query::Selector(selector) => doc.query_selector_all(None, &selector)?,
        Query::Node(node) => vec![node],
        Query::Nodes(nodes) => nodes,
        Query::Document => vec![doc.root()],
    };
    Ok(ElementSet::from_nodes(doc, elements))
}

/// Ordered collection of nodes with a chainable mutation API.
///
/// Setters apply to every member and return `Result<&Self>`. Getters read the first
/// member and fail with [`Error::EmptySet`] when there is none.
pub struct ElementSet {
    document: Document,
    elements: Vec<NodeId>,
    length: usize,
    animation: Rc<RefCell<AnimationSlot>>,
}

impl fmt::Debug for ElementSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementSet")
            .field("elements", &self.elements)
            .field("length", &self.length)
            .field("animating", &self.is_animating())
            .finish()
    }
}

impl ElementSet {
    pub(crate) fn from_nodes(doc: &Document, elements: Vec<NodeId>) -> Self {
        Self {
            document: doc.clone(),
            length: elements.len(),
            elements,
            animation: Rc::default(),
        }
    }

    /// Member count taken when the set was built. `reverse` and `splice` do not update
    /// it; [`elements`](Self::elements) always reflects the current sequence.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn elements(&self) -> &[NodeId] {
        &self.elements
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    fn first_member(&self, operation: &'static str) -> Result<NodeId> {
        self.elements
            .first()
            .copied()
            .ok_or(Error::EmptySet { operation })
    }

    fn for_each_member(&self, mut f: impl FnMut(NodeId) -> Result<()>) -> Result<&Self> {
        for node in &self.elements {
            f(*node)?;
        }
        Ok(self)
    }

    // Events and iteration

    pub fn on(&self, event_type: &str, handler: &EventHandler) -> &Self {
        for node in &self.elements {
            self.document.add_event_listener(*node, event_type, handler);
        }
        self
    }

    pub fn off(&self, event_type: &str, handler: &EventHandler) -> &Self {
        for node in &self.elements {
            self.document.remove_event_listener(*node, event_type, handler);
        }
        self
    }

    /// Dispatches a bubbling, cancelable event carrying `detail` at every member.
    pub fn trigger<T: Any>(&self, event_type: &str, detail: T) -> Result<&Self> {
        let detail: Rc<dyn Any> = Rc::new(detail);
        self.for_each_member(|node| {
            self.document
                .dispatch_event(node, event_type, Some(Rc::clone(&detail)))
                .map(|_| ())
        })
    }

    /// Calls `f` with each member and its index until it breaks.
    pub fn each<F>(&self, mut f: F) -> &Self
    where
        F: FnMut(NodeId, usize) -> ControlFlow<()>,
    {
        for (index, node) in self.elements.iter().enumerate() {
            if f(*node, index).is_break() {
                break;
            }
        }
        self
    }

    pub fn reverse(&mut self) -> &mut Self {
        self.elements.reverse();
        self
    }

    // Content

    pub fn text(&self) -> Result<String> {
        self.document.text_content(self.first_member("text")?)
    }

    pub fn set_text(&self, text: &str) -> Result<&Self> {
        self.for_each_member(|node| self.document.set_text_content(node, text))
    }

    pub fn html(&self) -> Result<String> {
        self.document.inner_html(self.first_member("html")?)
    }

    /// Clears every member, then appends `content` to each.
    pub fn set_html<'a>(&self, content: impl Into<Insertable<'a>>) -> Result<&Self> {
        self.for_each_member(|node| self.document.set_inner_html(node, ""))?;
        self.append(content)
    }

    pub fn outer_html(&self) -> Result<String> {
        self.document.outer_html(self.first_member("outer_html")?)
    }

    pub fn empty(&self) -> Result<&Self> {
        self.set_text("")
    }

    // Insertion and structure

    pub fn append<'a>(&self, content: impl Into<Insertable<'a>>) -> Result<&Self> {
        self.insert(content.into(), InsertPosition::Append)
    }

    /// Inserts before each member's first child, or appends when it has none.
    pub fn prepend<'a>(&self, content: impl Into<Insertable<'a>>) -> Result<&Self> {
        self.insert(content.into(), InsertPosition::Prepend)
    }

    pub fn after<'a>(&self, content: impl Into<Insertable<'a>>) -> Result<&Self> {
        self.insert(content.into(), InsertPosition::After)
    }

    pub fn before<'a>(&self, content: impl Into<Insertable<'a>>) -> Result<&Self> {
        self.insert(content.into(), InsertPosition::Before)
    }

    fn insert(&self, content: Insertable<'_>, position: InsertPosition) -> Result<&Self> {
        insert_into(&self.document, &self.elements, content, position)?;
        Ok(self)
    }

    /// Puts `content` where the first member was and returns the replaced node.
    pub fn replace_with<'a>(&self, content: impl Into<Insertable<'a>>) -> Result<NodeId> {
        let target = self.first_member("replace_with")?;
        let replacement = resolve_single(&self.document, content.into(), "replace_with")?;
        let parent = self
            .document
            .parent(target)
            .ok_or_else(|| Error::Dom("replace_with target has no parent node".into()))?;
        self.document.replace_child(parent, replacement, target)?;
        Ok(target)
    }

    /// New single-member set around a detached deep copy of the first member.
    pub fn deep_clone(&self) -> Result<ElementSet> {
        let copy = self
            .document
            .clone_node(self.first_member("deep_clone")?, true)?;
        Ok(ElementSet::from_nodes(&self.document, vec![copy]))
    }

    pub fn value(&self) -> Result<String> {
        self.document.value(self.first_member("value")?)
    }

    pub fn set_value(&self, value: &str) -> Result<&Self> {
        self.for_each_member(|node| self.document.set_value(node, value))
    }

    /// Set around the first member's parent; empty when it is detached.
    pub fn parent(&self) -> Result<ElementSet> {
        let parent = self.document.parent(self.first_member("parent")?);
        Ok(ElementSet::from_nodes(
            &self.document,
            parent.into_iter().collect(),
        ))
    }

    /// Detaches every member and keeps the chain going.
    pub fn delete(&self) -> Result<&Self> {
        self.for_each_member(|node| {
            let parent = self
                .document
                .parent(node)
                .ok_or_else(|| Error::Dom("delete target has no parent node".into()))?;
            self.document.remove_child(parent, node)
        })
    }

    pub fn remove(&self) -> Result<()> {
        self.delete().map(|_| ())
    }

    // Visibility and classes

    pub fn show(&self) -> Result<&Self> {
        self.css("visibility", "visible")
    }

    pub fn hide(&self) -> Result<&Self> {
        self.css("visibility", "collapse")
    }

    /// Inline visibility of the first member is unset or one of the visible keywords.
    pub fn visible(&self) -> Result<bool> {
        let visibility = self
            .document
            .style(self.first_member("visible")?, "visibility")?;
        Ok(VISIBLE_VALUES.contains(&visibility.as_str()))
    }

    /// The first member is attached to a parent.
    pub fn exists(&self) -> Result<bool> {
        Ok(self.document.parent(self.first_member("exists")?).is_some())
    }

    pub fn add_class(&self, class_name: &str) -> Result<&Self> {
        self.for_each_member(|node| self.document.add_class(node, class_name))
    }

    pub fn remove_class(&self, class_name: &str) -> Result<&Self> {
        self.for_each_member(|node| self.document.remove_class(node, class_name))
    }

    // Attributes and style

    pub fn css(&self, property: &str, value: &str) -> Result<&Self> {
        self.for_each_member(|node| self.document.set_style(node, property, value))
    }

    pub fn css_map<I, K, V>(&self, rules: I) -> Result<&Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let rules = rules.into_iter().collect::<Vec<_>>();
        self.for_each_member(|node| {
            for (property, value) in &rules {
                self.document
                    .set_style(node, property.as_ref(), value.as_ref())?;
            }
            Ok(())
        })
    }

    pub fn attr(&self, name: &str) -> Result<Option<String>> {
        self.document.attribute(self.first_member("attr")?, name)
    }

    /// Sets `name` on every member. An empty `value` writes nothing, the same as
    /// leaving the value out.
    pub fn set_attr(&self, name: &str, value: &str) -> Result<&Self> {
        if value.is_empty() {
            return Ok(self);
        }
        self.for_each_member(|node| self.document.set_attribute(node, name, value))
    }

    pub fn set_attrs<I, K, V>(&self, attrs: I) -> Result<&Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let attrs = attrs.into_iter().collect::<Vec<_>>();
        self.for_each_member(|node| {
            for (name, value) in &attrs {
                self.document
                    .set_attribute(node, name.as_ref(), value.as_ref())?;
            }
            Ok(())
        })
    }

    /// Gives every member without an id a fresh `_uuid-N` one and returns the first
    /// member's id.
    pub fn unique_id(&self) -> Result<String> {
        let first = self.first_member("unique_id")?;
        let mut first_id = None;
        for node in &self.elements {
            let id = ensure_unique_id(&self.document, *node)?;
            if *node == first && first_id.is_none() {
                first_id = id;
            }
        }
        first_id.ok_or_else(|| Error::Dom("unique_id target is not an element".into()))
    }

    pub fn focus(&self) -> Result<()> {
        self.document.focus(self.first_member("focus")?)
    }

    // Navigation and accessors

    /// Descendants of the first member matching `selector`.
    pub fn find(&self, selector: &str) -> Result<ElementSet> {
        let scope = self.first_member("find")?;
        let found = self.document.query_selector_all(Some(scope), selector)?;
        Ok(ElementSet::from_nodes(&self.document, found))
    }

    /// Child nodes of the first member, text nodes included.
    pub fn children(&self) -> Result<ElementSet> {
        let children = self.document.child_nodes(self.first_member("children")?);
        Ok(ElementSet::from_nodes(&self.document, children))
    }

    pub fn first(&self) -> Option<NodeId> {
        self.element(0)
    }

    pub fn last(&self) -> Option<NodeId> {
        self.element(-1)
    }

    /// Member at `index`. Negative values count back from the end and clamp at the
    /// first member.
    pub fn element(&self, index: isize) -> Option<NodeId> {
        let position = if index < 0 {
            self.elements.len().saturating_sub(index.unsigned_abs())
        } else {
            index.unsigned_abs()
        };
        self.elements.get(position).copied()
    }

    /// Removes `delete_count` members starting at `start`, inserts `items` in their
    /// place and returns the removed members. `start` follows the same negative
    /// indexing and clamping as `Array.prototype.splice`.
    pub fn splice<I>(&mut self, start: isize, delete_count: usize, items: I) -> Vec<NodeId>
    where
        I: IntoIterator<Item = NodeId>,
    {
        let len = self.elements.len();
        let start = if start < 0 {
            len.saturating_sub(start.unsigned_abs())
        } else {
            start.unsigned_abs().min(len)
        };
        let end = start.saturating_add(delete_count).min(len);
        self.elements.splice(start..end, items).collect()
    }

    // Animation

    /// Animates each property toward its target on every member.
    ///
    /// `options` takes an [`AnimateOptions`], `()` for the defaults or a number for the
    /// duration. `callback` is used only when `options` has no completion callback.
    /// Any run this set was already tracking is stopped first.
    pub fn animate<P, K>(
        &self,
        properties: P,
        options: impl Into<AnimateOptions>,
        callback: Option<CompletionCallback>,
    ) -> Result<&Self>
    where
        P: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let targets = properties
            .into_iter()
            .map(|(name, target)| (name.into(), target))
            .collect();
        animation::start(
            &self.document,
            &self.elements,
            &self.animation,
            targets,
            options.into(),
            callback,
        )?;
        Ok(self)
    }

    /// Cancels the running animation, if any. The completion callback runs here when
    /// at least one frame was applied.
    pub fn stop(&self) -> &Self {
        animation::stop(&self.document, &self.animation);
        self
    }

    pub fn is_animating(&self) -> bool {
        self.animation.borrow().is_active()
    }
}
