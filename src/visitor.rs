use crate::dom::{Document, NodeId, NodeKind};
use crate::options::RuntimeOptions;

/// Read-only view handed to visitors.
pub struct Tree<'a> {
    pub doc: &'a Document,
    pub options: &'a RuntimeOptions,
}

impl<'a> Tree<'a> {
    pub fn new(doc: &'a Document, options: &'a RuntimeOptions) -> Self {
        Self { doc, options }
    }
}

/// The OwnedTreeVisitor trait is the single traversal of a component's owned tree:
/// its light children followed by its isolated scope.
///
/// Rules:
/// 1. Nested component elements are visited but never descended into; their
///    subtrees belong to them.
/// 2. Expression elements are leaves; their content is source text.
/// 3. Implementers override `visit_*` methods and call `walk_*` to continue.
pub trait OwnedTreeVisitor {
    fn visit_owner(&mut self, tree: &Tree<'_>, host: NodeId) {
        walk_owner(self, tree, host);
    }

    fn visit_node(&mut self, tree: &Tree<'_>, node: NodeId) {
        walk_node(self, tree, node);
    }

    fn visit_element(&mut self, tree: &Tree<'_>, element: NodeId) {
        walk_children(self, tree, element);
    }

    fn visit_scope_root(&mut self, tree: &Tree<'_>, scope: NodeId) {
        walk_children(self, tree, scope);
    }

    fn visit_component(&mut self, _tree: &Tree<'_>, _component: NodeId) {
        // Leaf: owned by the nested component
    }

    fn visit_expression(&mut self, _tree: &Tree<'_>, _expression: NodeId) {
        // Leaf
    }

    fn visit_text(&mut self, _tree: &Tree<'_>, _text: NodeId) {
        // Leaf
    }
}

pub fn walk_owner<V: OwnedTreeVisitor + ?Sized>(visitor: &mut V, tree: &Tree<'_>, host: NodeId) {
    walk_children(visitor, tree, host);
    if let Some(scope) = tree.doc.scope_of(host) {
        visitor.visit_scope_root(tree, scope);
    }
}

pub fn walk_children<V: OwnedTreeVisitor + ?Sized>(visitor: &mut V, tree: &Tree<'_>, node: NodeId) {
    for child in tree.doc.children(node) {
        visitor.visit_node(tree, *child);
    }
}

pub fn walk_node<V: OwnedTreeVisitor + ?Sized>(visitor: &mut V, tree: &Tree<'_>, node: NodeId) {
    match tree.doc.kind(node) {
        Some(NodeKind::Element(element)) => {
            if element.tag == tree.options.component_tag {
                visitor.visit_component(tree, node);
            } else if element.tag == tree.options.expression_tag {
                visitor.visit_expression(tree, node);
            } else {
                visitor.visit_element(tree, node);
            }
        }
        Some(NodeKind::Text(_)) => visitor.visit_text(tree, node),
        Some(NodeKind::ScopeRoot { .. }) => visitor.visit_scope_root(tree, node),
        _ => {}
    }
}

/// Every node of an owned tree, nested component elements included.
#[derive(Default)]
pub struct OwnedNodes {
    pub nodes: Vec<NodeId>,
}

impl OwnedTreeVisitor for OwnedNodes {
    fn visit_node(&mut self, tree: &Tree<'_>, node: NodeId) {
        self.nodes.push(node);
        walk_node(self, tree, node);
    }

    fn visit_scope_root(&mut self, tree: &Tree<'_>, scope: NodeId) {
        self.nodes.push(scope);
        walk_children(self, tree, scope);
    }
}

/// Expression elements and directly nested components of an owned tree.
#[derive(Default)]
pub struct PassTargets {
    pub expressions: Vec<NodeId>,
    pub components: Vec<NodeId>,
}

impl OwnedTreeVisitor for PassTargets {
    fn visit_component(&mut self, _tree: &Tree<'_>, component: NodeId) {
        self.components.push(component);
    }

    fn visit_expression(&mut self, _tree: &Tree<'_>, expression: NodeId) {
        self.expressions.push(expression);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_targets_stop_at_nested_components() {
        let mut doc = Document::parse(
            r#"<data-consumer id="outer">
                 <data-expr>a</data-expr>
                 <div><data-consumer id="inner"><data-expr>b</data-expr></data-consumer></div>
               </data-consumer>"#,
        );
        let outer = doc.element_by_id("outer").unwrap();
        let scope = doc.attach_scope(outer).unwrap();
        doc.append_markup(scope, "<p><data-expr>c</data-expr></p>");

        let options = RuntimeOptions::default();
        let tree = Tree::new(&doc, &options);
        let mut targets = PassTargets::default();
        targets.visit_owner(&tree, outer);

        let texts: Vec<String> = targets
            .expressions
            .iter()
            .map(|n| doc.text_content(*n))
            .collect();
        assert_eq!(texts, vec!["a", "c"]);
        assert_eq!(targets.components, vec![doc.element_by_id("inner").unwrap()]);
    }

    #[test]
    fn test_owned_nodes_include_scope_root() {
        let mut doc = Document::parse(r#"<data-consumer id="host"></data-consumer>"#);
        let host = doc.element_by_id("host").unwrap();
        let scope = doc.attach_scope(host).unwrap();
        doc.append_markup(scope, "<span>x</span>");

        let options = RuntimeOptions::default();
        let mut owned = OwnedNodes::default();
        owned.visit_owner(&Tree::new(&doc, &options), host);
        assert_eq!(owned.nodes[0], scope);
        assert_eq!(owned.nodes.len(), 3);
    }
}
