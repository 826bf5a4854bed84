//! Directed-graph description of an ER specification.
//!
//! A [`Diagram`] holds one node per entity and one labeled edge per
//! relationship. [`Diagram::to_dot`] writes it as Graphviz DOT for the
//! external layout engine in [`crate::render`].

use serde::{Deserialize, Serialize};

use crate::ErSpec;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum Layout {
    #[default]
    LeftToRight,
    TopToBottom,
}

impl Layout {
    fn rankdir(self) -> &'static str {
        match self {
            Layout::LeftToRight => "LR",
            Layout::TopToBottom => "TB",
        }
    }
}

/// Cosmetic attributes applied to every node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DiagramStyle {
    #[serde(default)]
    pub layout: Layout,
    #[serde(default = "default_fill_color")]
    pub fill_color: String,
}

fn default_fill_color() -> String {
    "lightblue".to_string()
}

impl Default for DiagramStyle {
    fn default() -> Self {
        Self {
            layout: Layout::default(),
            fill_color: default_fill_color(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramNode {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramEdge {
    pub from: String,
    pub to: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagram {
    pub nodes: Vec<DiagramNode>,
    pub edges: Vec<DiagramEdge>,
}

impl Diagram {
    pub fn from_spec(spec: &ErSpec) -> Self {
        let dangling = spec.dangling_endpoints();
        if !dangling.is_empty() {
            tracing::warn!(
                endpoints = ?dangling,
                "relationships reference undeclared entities; rendering them anyway"
            );
        }

        let nodes = spec
            .entities()
            .iter()
            .map(|name| DiagramNode {
                id: name.clone(),
                label: name.clone(),
            })
            .collect();
        let edges = spec
            .relationships()
            .iter()
            .map(|rel| DiagramEdge {
                from: rel.from.clone(),
                to: rel.to.clone(),
                label: rel.relation.clone(),
            })
            .collect();

        Self { nodes, edges }
    }

    pub fn to_dot(&self, style: &DiagramStyle) -> String {
        let mut out = String::with_capacity(64 + 48 * (self.nodes.len() + self.edges.len()));

        out.push_str("// ER Diagram\ndigraph {\n");
        out.push_str("\trankdir=");
        out.push_str(style.layout.rankdir());
        out.push('\n');

        for node in &self.nodes {
            out.push('\t');
            push_quoted(&mut out, &node.id);
            out.push_str(" [label=");
            push_quoted(&mut out, &node.label);
            out.push_str(" color=");
            push_quoted(&mut out, &style.fill_color);
            out.push_str(" shape=box style=filled]\n");
        }

        for edge in &self.edges {
            out.push('\t');
            push_quoted(&mut out, &edge.from);
            out.push_str(" -> ");
            push_quoted(&mut out, &edge.to);
            out.push_str(" [label=");
            push_quoted(&mut out, &edge.label);
            out.push_str("]\n");
        }

        out.push_str("}\n");
        out
    }
}

/// Write `s` as a DOT double-quoted string.
fn push_quoted(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            c => out.push(c),
        }
    }
    out.push('"');
}
