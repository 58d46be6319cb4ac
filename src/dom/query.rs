use super::*;

impl Dom {
    /// Matching elements in document order. With a scope only its descendants are
    /// candidates, as with `Element.querySelectorAll`.
    pub(crate) fn query_selector_all(
        &self,
        scope: Option<NodeId>,
        selector: &str,
    ) -> Result<Vec<NodeId>> {
        let groups = parse_selector_groups(selector)?;

        let root = match scope {
            Some(scope) => {
                self.ensure_node(scope)?;
                scope
            }
            None => {
                let id_shortcut = match groups.as_slice() {
                    [chain] if chain.len() == 1 => chain[0].step.id_only(),
                    _ => None,
                };
                if let Some(id) = id_shortcut {
                    return Ok(self.by_id_all(id));
                }
                self.root
            }
        };

        let mut matched = Vec::new();
        self.walk_elements(root, &mut |node_id| {
            if groups.iter().any(|chain| self.matches_chain(node_id, chain)) {
                matched.push(node_id);
            }
        });
        Ok(matched)
    }

    fn walk_elements(&self, node_id: NodeId, visit: &mut dyn FnMut(NodeId)) {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROWTH, || {
            for child in &self.nodes[node_id.0].children {
                if self.element(*child).is_some() {
                    visit(*child);
                }
                self.walk_elements(*child, visit);
            }
        })
    }

    /// Right-to-left match of a combinator chain. A candidate ancestor or sibling that
    /// leads nowhere is abandoned for the next one.
    fn matches_chain(&self, node_id: NodeId, chain: &[SelectorPart]) -> bool {
        let Some((last, rest)) = chain.split_last() else {
            return false;
        };
        if !self.matches_step(node_id, &last.step) {
            return false;
        }
        if rest.is_empty() {
            return true;
        }

        match last.combinator.unwrap_or(SelectorCombinator::Descendant) {
            SelectorCombinator::Child => self
                .parent(node_id)
                .is_some_and(|parent| self.matches_chain(parent, rest)),
            SelectorCombinator::Descendant => {
                std::iter::successors(self.parent(node_id), |node| self.parent(*node))
                    .any(|ancestor| self.matches_chain(ancestor, rest))
            }
            SelectorCombinator::AdjacentSibling => self
                .preceding_elements(node_id)
                .next()
                .is_some_and(|sibling| self.matches_chain(sibling, rest)),
            SelectorCombinator::GeneralSibling => self
                .preceding_elements(node_id)
                .any(|sibling| self.matches_chain(sibling, rest)),
        }
    }

    fn matches_step(&self, node_id: NodeId, step: &SelectorStep) -> bool {
        let Some(element) = self.element(node_id) else {
            return false;
        };

        step.tag
            .as_ref()
            .is_none_or(|tag| element.tag_name.eq_ignore_ascii_case(tag))
            && step
                .id
                .as_ref()
                .is_none_or(|id| element.attrs.get("id") == Some(id))
            && step
                .classes
                .iter()
                .all(|class_name| has_class(element, class_name))
            && step.attrs.iter().all(|cond| cond.matches(&element.attrs))
            && step
                .pseudo_classes
                .iter()
                .all(|pseudo| self.matches_pseudo(node_id, pseudo))
    }

    fn matches_pseudo(&self, node_id: NodeId, pseudo: &SelectorPseudoClass) -> bool {
        let (before, after) = self.siblings_around(node_id);
        let no_elements = |nodes: &[NodeId]| nodes.iter().all(|id| self.element(*id).is_none());
        match pseudo {
            SelectorPseudoClass::FirstChild => no_elements(before),
            SelectorPseudoClass::LastChild => no_elements(after),
            SelectorPseudoClass::OnlyChild => no_elements(before) && no_elements(after),
            SelectorPseudoClass::Empty => self.nodes[node_id.0].children.is_empty(),
            SelectorPseudoClass::Focus => self.active_element == Some(node_id),
            SelectorPseudoClass::Not(groups) => {
                !groups.iter().any(|chain| self.matches_chain(node_id, chain))
            }
        }
    }

    fn siblings_around(&self, node_id: NodeId) -> (&[NodeId], &[NodeId]) {
        let Some(parent) = self.parent(node_id) else {
            return (&[], &[]);
        };
        let children = &self.nodes[parent.0].children;
        match children.iter().position(|id| *id == node_id) {
            Some(pos) => (&children[..pos], &children[pos + 1..]),
            None => (&[], &[]),
        }
    }

    // Nearest first.
    fn preceding_elements(&self, node_id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let (before, _) = self.siblings_around(node_id);
        before
            .iter()
            .rev()
            .copied()
            .filter(move |id| self.element(*id).is_some())
    }
}
