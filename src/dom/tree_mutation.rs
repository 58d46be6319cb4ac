use super::*;

impl Dom {
    fn ensure_insertable(&self, parent: NodeId, child: NodeId, operation: &str) -> Result<()> {
        if !self.can_have_children(parent) {
            return Err(Error::Dom(format!("{operation} target cannot have children")));
        }
        if !self.is_valid_node(child) {
            return Err(Error::Dom(format!("{operation} node is invalid")));
        }
        if child == self.root || child == parent {
            return Err(Error::Dom(format!("invalid {operation} node")));
        }

        // The parent must not live inside the child's subtree.
        let mut cursor = Some(parent);
        while let Some(node) = cursor {
            if node == child {
                return Err(Error::Dom(format!("{operation} would create a cycle")));
            }
            cursor = self.parent(node);
        }
        Ok(())
    }

    fn detach_from_parent(&mut self, child: NodeId) {
        if let Some(old_parent) = self.parent(child) {
            self.nodes[old_parent.0].children.retain(|id| *id != child);
        }
        self.nodes[child.0].parent = None;
    }

    pub(crate) fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.ensure_insertable(parent, child, "appendChild")?;
        self.detach_from_parent(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        self.rebuild_id_index();
        Ok(())
    }

    pub(crate) fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: NodeId,
    ) -> Result<()> {
        self.ensure_insertable(parent, child, "insertBefore")?;
        if self.parent(reference) != Some(parent) {
            return Err(Error::Dom(
                "insertBefore reference is not a direct child".into(),
            ));
        }
        if child == reference {
            return Ok(());
        }

        self.detach_from_parent(child);
        let index = self.nodes[parent.0]
            .children
            .iter()
            .position(|id| *id == reference)
            .ok_or_else(|| Error::Dom("insertBefore reference is missing".into()))?;

        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(index, child);
        self.rebuild_id_index();
        Ok(())
    }

    pub(crate) fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if self.parent(child) != Some(parent) {
            return Err(Error::Dom(
                "removeChild target is not a direct child".into(),
            ));
        }
        self.detach_from_parent(child);
        if self
            .active_element
            .is_some_and(|active| active == child || self.is_descendant_of(active, child))
        {
            self.active_element = None;
        }
        self.rebuild_id_index();
        Ok(())
    }

    /// Puts `replacement` where `target` was and detaches `target`.
    pub(crate) fn replace_child(
        &mut self,
        parent: NodeId,
        replacement: NodeId,
        target: NodeId,
    ) -> Result<()> {
        if self.parent(target) != Some(parent) {
            return Err(Error::Dom(
                "replaceChild target is not a direct child".into(),
            ));
        }
        if replacement == target {
            return Ok(());
        }
        self.insert_before(parent, replacement, target)?;
        self.remove_child(parent, target)
    }

    pub(crate) fn clear_children(&mut self, node_id: NodeId) {
        let old_children = std::mem::take(&mut self.nodes[node_id.0].children);
        for child in old_children {
            self.nodes[child.0].parent = None;
        }
    }
}
