//! Rebuilds the implicit section / sub-category / line-item hierarchy of a
//! report table from row labels and row order.
//!
//! The scan keeps two cursors: the open level-0 section and the open level-1
//! sub-category. Scoped rules are checked against the label of the cursor that
//! is open *now*, so the same keyword can land under different parents.

use crate::schema::{GroupingGrammar, GroupingRule, RuleKind, UnmatchedPolicy};
use crate::statement::TabularStatement;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Stable node identity: the row's position in the source sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum NodeKind {
    Standalone,
    Section,
    SubCategory,
    LineItem,
    /// Claimed by no rule; placed according to the grammar's unmatched policy.
    Unmatched,
}

impl From<RuleKind> for NodeKind {
    fn from(kind: RuleKind) -> Self {
        match kind {
            RuleKind::Standalone => NodeKind::Standalone,
            RuleKind::Section => NodeKind::Section,
            RuleKind::SubCategory => NodeKind::SubCategory,
            RuleKind::LineItem => NodeKind::LineItem,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: NodeId,
    pub row_data: Vec<String>,
    pub level: u8,
    pub kind: NodeKind,
    /// Rendered bold; sections and sub-categories always are.
    pub is_header: bool,
    pub default_expanded: bool,
    pub is_expanded: bool,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn label(&self) -> &str {
        self.row_data.first().map(String::as_str).unwrap_or("")
    }

    pub fn is_collapsible(&self) -> bool {
        !self.children.is_empty()
    }

    fn count(&self) -> usize {
        1 + self.children.iter().map(TreeNode::count).sum::<usize>()
    }

    fn find(&self, id: NodeId) -> Option<&TreeNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    fn apply_expansion(&mut self, state: &ExpansionState) {
        self.is_expanded = state.resolve(self.id, self.default_expanded);
        for child in &mut self.children {
            child.apply_expansion(state);
        }
    }
}

/// One row of the flattened structure: who sits where, without display state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutlineEntry {
    pub id: NodeId,
    pub level: u8,
    pub parent: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Forest {
    pub roots: Vec<TreeNode>,
}

impl Forest {
    pub fn node_count(&self) -> usize {
        self.roots.iter().map(TreeNode::count).sum()
    }

    pub fn find(&self, id: NodeId) -> Option<&TreeNode> {
        self.roots.iter().find_map(|n| n.find(id))
    }

    /// Structure in document order, ignoring expansion flags.
    pub fn outline(&self) -> Vec<OutlineEntry> {
        fn walk(node: &TreeNode, parent: Option<NodeId>, out: &mut Vec<OutlineEntry>) {
            out.push(OutlineEntry {
                id: node.id,
                level: node.level,
                parent,
            });
            for child in &node.children {
                walk(child, Some(node.id), out);
            }
        }

        let mut out = Vec::with_capacity(self.node_count());
        for root in &self.roots {
            walk(root, None, &mut out);
        }
        out
    }

    /// Nodes a table shows: every root, plus children of expanded nodes.
    pub fn visible_rows(&self) -> Vec<&TreeNode> {
        fn walk<'a>(node: &'a TreeNode, out: &mut Vec<&'a TreeNode>) {
            out.push(node);
            if node.is_expanded {
                for child in &node.children {
                    walk(child, out);
                }
            }
        }

        let mut out = Vec::new();
        for root in &self.roots {
            walk(root, &mut out);
        }
        out
    }

    pub fn apply_expansion(&mut self, state: &ExpansionState) {
        for root in &mut self.roots {
            root.apply_expansion(state);
        }
    }
}

/// Expand/collapse state owned by the view, kept across tree rebuilds.
///
/// A node's flag resolves as: explicit toggle, then the expand-all switch,
/// then the rule default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpansionState {
    pub expand_all: Option<bool>,
    overrides: BTreeMap<NodeId, bool>,
}

impl ExpansionState {
    pub fn new(expand_all: Option<bool>) -> Self {
        Self {
            expand_all,
            overrides: BTreeMap::new(),
        }
    }

    /// Forces every node open or closed, discarding individual toggles.
    pub fn set_expand_all(&mut self, expanded: bool) {
        self.expand_all = Some(expanded);
        self.overrides.clear();
    }

    /// Flips one node. Siblings and descendants keep their own state.
    pub fn toggle(&mut self, node: &TreeNode) -> bool {
        let next = !node.is_expanded;
        self.overrides.insert(node.id, next);
        next
    }

    pub fn resolve(&self, id: NodeId, default_expanded: bool) -> bool {
        if let Some(&flag) = self.overrides.get(&id) {
            return flag;
        }
        self.expand_all.unwrap_or(default_expanded)
    }
}

/// Where a single row lands given the cursors open before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement<'g> {
    Standalone(&'g GroupingRule),
    Section(&'g GroupingRule),
    SubCategory(&'g GroupingRule),
    LineItem(&'g GroupingRule),
    Unmatched,
}

pub struct TreeBuilder<'g> {
    grammar: &'g GroupingGrammar,
}

impl<'g> TreeBuilder<'g> {
    pub fn new(grammar: &'g GroupingGrammar) -> Self {
        Self { grammar }
    }

    fn first_rule(&self, kind: RuleKind, label: &str) -> impl Iterator<Item = &'g GroupingRule> {
        let label = label.to_string();
        let grammar: &'g GroupingGrammar = self.grammar;
        grammar
            .rules
            .iter()
            .filter(move |r| r.kind == kind && r.matches_label(&label))
    }

    /// Classifies one label against the open section / sub-category labels.
    pub fn classify(
        &self,
        label: &str,
        section: Option<&str>,
        sub_category: Option<&str>,
    ) -> Placement<'g> {
        if let Some(rule) = self.first_rule(RuleKind::Standalone, label).next() {
            return Placement::Standalone(rule);
        }
        if let Some(rule) = self.first_rule(RuleKind::Section, label).next() {
            return Placement::Section(rule);
        }
        if let Some(parent) = section {
            if let Some(rule) = self
                .first_rule(RuleKind::SubCategory, label)
                .find(|r| r.accepts_parent(parent))
            {
                return Placement::SubCategory(rule);
            }
        }
        if let Some(parent) = sub_category {
            if let Some(rule) = self
                .first_rule(RuleKind::LineItem, label)
                .find(|r| r.accepts_parent(parent))
            {
                return Placement::LineItem(rule);
            }
        }
        Placement::Unmatched
    }

    pub fn build(&self, statement: &TabularStatement, expansion: &ExpansionState) -> Forest {
        let mut roots: Vec<TreeNode> = Vec::new();
        let mut section: Option<usize> = None;
        let mut sub_category: Option<usize> = None;

        for (idx, row) in statement.rows.iter().enumerate() {
            let label = statement.label(idx);
            let section_label = section.map(|s| roots[s].label().to_string());
            let sub_label =
                section.and_then(|s| sub_category.map(|c| roots[s].children[c].label().to_string()));

            let placement = self.classify(label, section_label.as_deref(), sub_label.as_deref());
            let node = |kind: NodeKind, level: u8, default_expanded: bool| {
                let is_header = matches!(kind, NodeKind::Section | NodeKind::SubCategory)
                    || self
                        .grammar
                        .header_patterns
                        .iter()
                        .any(|p| !p.is_empty() && label.contains(p.as_str()));
                TreeNode {
                    id: NodeId(idx),
                    row_data: row.clone(),
                    level,
                    kind,
                    is_header,
                    default_expanded,
                    is_expanded: expansion.resolve(NodeId(idx), default_expanded),
                    children: Vec::new(),
                }
            };

            match placement {
                Placement::Standalone(rule) => {
                    section = None;
                    sub_category = None;
                    roots.push(node(NodeKind::Standalone, 0, rule.default_expanded));
                }
                Placement::Section(rule) => {
                    sub_category = None;
                    roots.push(node(NodeKind::Section, 0, rule.default_expanded));
                    section = Some(roots.len() - 1);
                }
                Placement::SubCategory(rule) => {
                    // classify only yields SubCategory while a section is open
                    if let Some(s) = section {
                        let parent = &mut roots[s];
                        parent
                            .children
                            .push(node(NodeKind::SubCategory, 1, rule.default_expanded));
                        sub_category = Some(parent.children.len() - 1);
                    }
                }
                Placement::LineItem(rule) => {
                    if let (Some(s), Some(c)) = (section, sub_category) {
                        roots[s].children[c]
                            .children
                            .push(node(NodeKind::LineItem, 2, rule.default_expanded));
                    }
                }
                Placement::Unmatched => {
                    let orphan_only = self.grammar.unmatched == UnmatchedPolicy::TopLevel;
                    match (section, sub_category) {
                        (Some(s), Some(c)) if !orphan_only => {
                            roots[s].children[c]
                                .children
                                .push(node(NodeKind::Unmatched, 2, false));
                        }
                        (Some(s), None) if !orphan_only => {
                            roots[s].children.push(node(NodeKind::Unmatched, 1, false));
                        }
                        _ => {
                            debug!("Row {} ('{}') matched no grouping rule", idx, label);
                            roots.push(node(NodeKind::Unmatched, 0, false));
                        }
                    }
                }
            }
        }

        Forest { roots }
    }
}

pub fn build_forest(
    statement: &TabularStatement,
    grammar: &GroupingGrammar,
    expansion: &ExpansionState,
) -> Forest {
    TreeBuilder::new(grammar).build(statement, expansion)
}
