use crate::dom::NodeId;
use crate::element_set::ElementSet;
use crate::{Document, Error, Result};

/// Content accepted by `append`, `prepend`, `after`, `before`, `set_html` and
/// `replace_with`.
///
/// Markup and single nodes are inserted as-is into the first target and deep-cloned for
/// every further target. A collection contributes only its first member, which is moved
/// from target to target and so ends up in the last one. Markup that is empty or only
/// whitespace inserts nothing, so it never adds a bare text node.
#[derive(Debug)]
pub enum Insertable<'a> {
    Markup(String),
    Node(NodeId),
    Collection(&'a ElementSet),
}

impl From<&str> for Insertable<'_> {
    fn from(markup: &str) -> Self {
        Insertable::Markup(markup.to_string())
    }
}

impl From<String> for Insertable<'_> {
    fn from(markup: String) -> Self {
        Insertable::Markup(markup)
    }
}

impl From<NodeId> for Insertable<'_> {
    fn from(node: NodeId) -> Self {
        Insertable::Node(node)
    }
}

impl<'a> From<&'a ElementSet> for Insertable<'a> {
    fn from(set: &'a ElementSet) -> Self {
        Insertable::Collection(set)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InsertPosition {
    Append,
    Prepend,
    After,
    Before,
}

impl InsertPosition {
    fn operation(self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::Prepend => "prepend",
            Self::After => "after",
            Self::Before => "before",
        }
    }
}

enum Source {
    // Materialized or caller-supplied node: cloned for every target after the first.
    Cloned(NodeId),
    // First member of a collection: the same node moves to each target.
    Moved(NodeId),
}

fn materialize(doc: &Document, markup: &str) -> Result<NodeId> {
    doc.create_element(markup)
        .ok_or_else(|| Error::HtmlParse(format!("cannot materialize markup {markup:?}")))
}

/// Resolves `content` to the one node it stands for.
pub(crate) fn resolve_single(
    doc: &Document,
    content: Insertable<'_>,
    operation: &'static str,
) -> Result<NodeId> {
    match content {
        Insertable::Markup(markup) => materialize(doc, &markup),
        Insertable::Node(node) => Ok(node),
        Insertable::Collection(set) => set
            .first()
            .ok_or(Error::EmptySet { operation }),
    }
}

/// Inserts `content` relative to every target. Empty markup inserts nothing.
pub(crate) fn insert_into(
    doc: &Document,
    targets: &[NodeId],
    content: Insertable<'_>,
    position: InsertPosition,
) -> Result<()> {
    let source = match content {
        Insertable::Markup(markup) if markup.trim().is_empty() => return Ok(()),
        Insertable::Markup(markup) => Source::Cloned(materialize(doc, &markup)?),
        Insertable::Node(node) => Source::Cloned(node),
        Insertable::Collection(set) => Source::Moved(set.first().ok_or(Error::EmptySet {
            operation: position.operation(),
        })?),
    };

    for (index, target) in targets.iter().enumerate() {
        let node = match source {
            Source::Cloned(node) if index == 0 => node,
            Source::Cloned(node) => doc.clone_node(node, true)?,
            Source::Moved(node) => node,
        };
        insert_at(doc, *target, node, position)?;
    }
    Ok(())
}

fn insert_at(doc: &Document, target: NodeId, node: NodeId, position: InsertPosition) -> Result<()> {
    match position {
        InsertPosition::Append => doc.append_child(target, node),
        InsertPosition::Prepend => match doc.first_child(target) {
            Some(first) => doc.insert_before(target, node, first),
            None => doc.append_child(target, node),
        },
        InsertPosition::After => {
            let parent = detached_parent(doc, target, position)?;
            match doc.next_sibling(target) {
                Some(next) => doc.insert_before(parent, node, next),
                None => doc.append_child(parent, node),
            }
        }
        InsertPosition::Before => {
            let parent = detached_parent(doc, target, position)?;
            doc.insert_before(parent, node, target)
        }
    }
}

fn detached_parent(doc: &Document, target: NodeId, position: InsertPosition) -> Result<NodeId> {
    doc.parent(target).ok_or_else(|| {
        Error::Dom(format!(
            "{} target has no parent node",
            position.operation()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query;

    fn tags(doc: &Document, parent: NodeId) -> Vec<String> {
        doc.child_nodes(parent)
            .into_iter()
            .map(|node| doc.tag_name(node).unwrap_or_else(|| "#text".into()))
            .collect()
    }

    #[test]
    fn markup_is_cloned_for_every_target_after_the_first() -> Result<()> {
        let doc = Document::from_html("<ul><li></li><li></li><li></li></ul>")?;
        let items = query(&doc, "li")?;
        insert_into(
            &doc,
            items.elements(),
            "<b>x</b>".into(),
            InsertPosition::Append,
        )?;

        let inserted = items
            .elements()
            .iter()
            .filter_map(|li| doc.first_child(*li))
            .collect::<Vec<_>>();
        assert_eq!(inserted.len(), 3);
        assert_ne!(inserted[0], inserted[1]);
        assert_ne!(inserted[1], inserted[2]);
        Ok(())
    }

    #[test]
    fn collection_moves_its_first_member_to_the_last_target() -> Result<()> {
        let doc = Document::from_html("<div id=a></div><div id=b></div><span id=s></span>")?;
        let targets = query(&doc, "div")?;
        let span = query(&doc, "#s")?;
        insert_into(
            &doc,
            targets.elements(),
            (&span).into(),
            InsertPosition::Append,
        )?;

        let b = doc.by_id("b").expect("b");
        let a = doc.by_id("a").expect("a");
        assert!(doc.child_nodes(a).is_empty());
        assert_eq!(tags(&doc, b), vec!["span"]);
        Ok(())
    }

    #[test]
    fn prepend_and_after_fall_back_to_append() -> Result<()> {
        let doc = Document::from_html("<div id=host><p id=only></p></div><div id=blank></div>")?;
        let blank = doc.by_id("blank").expect("blank");
        let only = doc.by_id("only").expect("only");
        let host = doc.by_id("host").expect("host");

        insert_into(&doc, &[blank], "<i></i>".into(), InsertPosition::Prepend)?;
        assert_eq!(tags(&doc, blank), vec!["i"]);

        insert_into(&doc, &[only], "<em></em>".into(), InsertPosition::After)?;
        insert_into(&doc, &[only], "<hr>".into(), InsertPosition::Before)?;
        assert_eq!(tags(&doc, host), vec!["hr", "p", "em"]);
        Ok(())
    }

    #[test]
    fn after_on_detached_target_is_a_dom_error() -> Result<()> {
        let doc = Document::new();
        let detached = doc.create_element("<div></div>").expect("div");
        let result = insert_into(&doc, &[detached], "<p></p>".into(), InsertPosition::After);
        assert!(matches!(result, Err(Error::Dom(_))));
        Ok(())
    }

    #[test]
    fn empty_collection_source_is_rejected() -> Result<()> {
        let doc = Document::from_html("<div></div>")?;
        let targets = query(&doc, "div")?;
        let nothing = query(&doc, ".missing")?;
        let result = insert_into(
            &doc,
            targets.elements(),
            (&nothing).into(),
            InsertPosition::Before,
        );
        assert_eq!(result, Err(Error::EmptySet { operation: "before" }));
        Ok(())
    }
}
