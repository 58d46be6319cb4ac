use std::sync::atomic::{AtomicU64, Ordering};

use crate::dom::NodeId;
use crate::{Document, Result};

const PREFIX: &str = "_uuid-";

// Shared by every document in the process and never reset.
static NEXT_ID: AtomicU64 = AtomicU64::new(0);

fn next_unique_id() -> String {
    let n = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{PREFIX}{n}")
}

/// Returns the element's id, assigning a fresh `_uuid-N` when it has none.
///
/// Non-element nodes are left untouched and report `None`.
pub(crate) fn ensure_unique_id(doc: &Document, node: NodeId) -> Result<Option<String>> {
    if doc.tag_name(node).is_none() {
        return Ok(None);
    }
    if let Some(id) = doc.attribute(node, "id")?.filter(|id| !id.is_empty()) {
        return Ok(Some(id));
    }
    let id = next_unique_id();
    doc.set_attribute(node, "id", &id)?;
    Ok(Some(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assigns_once_and_keeps_existing_ids() -> Result<()> {
        let doc = Document::from_html("<p id='keep'></p><p></p><p id=''></p>")?;
        let nodes = doc.child_nodes(doc.root());

        assert_eq!(ensure_unique_id(&doc, nodes[0])?.as_deref(), Some("keep"));

        let assigned = ensure_unique_id(&doc, nodes[1])?.expect("element id");
        assert!(assigned.starts_with(PREFIX));
        assert_eq!(ensure_unique_id(&doc, nodes[1])?, Some(assigned.clone()));

        let empty_replaced = ensure_unique_id(&doc, nodes[2])?.expect("element id");
        assert_ne!(empty_replaced, assigned);
        assert_eq!(doc.by_id(&empty_replaced), Some(nodes[2]));
        Ok(())
    }

    #[test]
    fn counter_is_shared_across_documents() -> Result<()> {
        let first = Document::from_html("<i></i>")?;
        let second = Document::from_html("<i></i>")?;
        let a = ensure_unique_id(&first, first.child_nodes(first.root())[0])?;
        let b = ensure_unique_id(&second, second.child_nodes(second.root())[0])?;
        assert_ne!(a, b);
        Ok(())
    }
}
