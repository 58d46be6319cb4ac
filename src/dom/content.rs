use super::*;

impl Dom {
    pub(crate) fn text_content(&self, node_id: NodeId) -> String {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROWTH, || {
            match &self.nodes[node_id.0].node_type {
                NodeType::Document | NodeType::Element(_) => {
                    let mut out = String::new();
                    for child in &self.nodes[node_id.0].children {
                        out.push_str(&self.text_content(*child));
                    }
                    out
                }
                NodeType::Text(text) => text.clone(),
            }
        })
    }

    pub(crate) fn set_text_content(&mut self, node_id: NodeId, value: &str) -> Result<()> {
        match &mut self.nodes[node_id.0].node_type {
            NodeType::Text(text) => {
                *text = value.to_string();
                return Ok(());
            }
            NodeType::Document => {
                return Err(Error::Dom("textContent target is the document".into()));
            }
            NodeType::Element(_) => {}
        }
        self.clear_children(node_id);
        if !value.is_empty() {
            self.create_text(node_id, value.to_string());
        }
        self.rebuild_id_index();
        Ok(())
    }

    pub(crate) fn inner_html(&self, node_id: NodeId) -> Result<String> {
        if self.element(node_id).is_none() {
            return Err(Error::Dom("innerHTML target is not an element".into()));
        }
        let mut out = String::new();
        for child in &self.nodes[node_id.0].children {
            out.push_str(&self.dump_node(*child));
        }
        Ok(out)
    }

    pub(crate) fn outer_html(&self, node_id: NodeId) -> Result<String> {
        if self.element(node_id).is_none() {
            return Err(Error::Dom("outerHTML target is not an element".into()));
        }
        Ok(self.dump_node(node_id))
    }

    pub(crate) fn set_inner_html(&mut self, node_id: NodeId, html: &str) -> Result<()> {
        if self.element(node_id).is_none() {
            return Err(Error::Dom("innerHTML target is not an element".into()));
        }

        let fragment = parse_html(html)?;
        self.clear_children(node_id);

        let children = fragment.nodes[fragment.root.0].children.clone();
        for child in children {
            self.import_subtree(&fragment, child, Some(node_id))?;
        }

        self.rebuild_id_index();
        Ok(())
    }

    /// Copies `source_node` and its descendants out of another arena.
    pub(crate) fn import_subtree(
        &mut self,
        source: &Dom,
        source_node: NodeId,
        parent: Option<NodeId>,
    ) -> Result<NodeId> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROWTH, || {
            let node_type = match &source.nodes[source_node.0].node_type {
                NodeType::Document => {
                    return Err(Error::Dom("cannot import a document node".into()));
                }
                other => other.clone(),
            };

            let node = self.create_node(parent, node_type);
            for child in &source.nodes[source_node.0].children {
                self.import_subtree(source, *child, Some(node))?;
            }
            Ok(node)
        })
    }

    /// Detached copy of `node_id`; `deep` also copies the descendants.
    pub(crate) fn clone_node(&mut self, node_id: NodeId, deep: bool) -> Result<NodeId> {
        self.ensure_node(node_id)?;
        if matches!(self.nodes[node_id.0].node_type, NodeType::Document) {
            return Err(Error::Dom("cannot clone the document node".into()));
        }
        Ok(self.clone_subtree(node_id, None, deep))
    }

    fn clone_subtree(&mut self, node_id: NodeId, parent: Option<NodeId>, deep: bool) -> NodeId {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROWTH, || {
            let node_type = self.nodes[node_id.0].node_type.clone();
            let clone = self.create_node(parent, node_type);
            if deep {
                for child in self.nodes[node_id.0].children.clone() {
                    self.clone_subtree(child, Some(clone), true);
                }
            }
            clone
        })
    }

    pub(crate) fn dump_node(&self, node_id: NodeId) -> String {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROWTH, || {
            match &self.nodes[node_id.0].node_type {
                NodeType::Document => {
                    let mut out = String::new();
                    for child in &self.nodes[node_id.0].children {
                        out.push_str(&self.dump_node(*child));
                    }
                    out
                }
                NodeType::Text(text) => escape_html_text_for_serialization(text),
                NodeType::Element(element) => {
                    let mut out = String::new();
                    out.push('<');
                    out.push_str(&element.tag_name);
                    let mut attrs = element.attrs.iter().collect::<Vec<_>>();
                    attrs.sort_by(|(left, _), (right, _)| left.cmp(right));
                    for (k, v) in attrs {
                        out.push(' ');
                        out.push_str(k);
                        out.push_str("=\"");
                        out.push_str(&escape_html_attr_for_serialization(v));
                        out.push('"');
                    }
                    out.push('>');
                    if is_void_tag(&element.tag_name) {
                        return out;
                    }
                    let raw_text_container = element.tag_name.eq_ignore_ascii_case("script")
                        || element.tag_name.eq_ignore_ascii_case("style");
                    for child in &self.nodes[node_id.0].children {
                        match &self.nodes[child.0].node_type {
                            NodeType::Text(text) if raw_text_container => out.push_str(text),
                            _ => out.push_str(&self.dump_node(*child)),
                        }
                    }
                    out.push_str("</");
                    out.push_str(&element.tag_name);
                    out.push('>');
                    out
                }
            }
        })
    }
}
