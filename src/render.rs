//! Graphviz rendering for plans.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::errors::RunError;
use crate::graph::{EdgeKind, NodeKind};
use crate::plan::Plan;
use crate::registry::Registry;
use crate::transform::plan_with_value_stores_unpruned;

const LITERAL_COLOR: &str = "#009AA6";
const CALL_COLOR: &str = "#E37222";
const STORED_COLOR: &str = "#BB2FED";

/// Rendering tunables.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// Truncate the visible scope depth; `None` shows full scopes.
    pub level: Option<usize>,
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

fn truncated_scope(scope: &[String], level: Option<usize>) -> Vec<String> {
    match level {
        Some(level) => scope.iter().take(level).cloned().collect(),
        None => scope.to_vec(),
    }
}

/// Render a plan as a Graphviz DOT document.
///
/// When a registry is provided the write/read rewrite is applied first,
/// treating every stored pair as stale so the full physical structure is
/// visible; no store I/O happens during rendering.
pub fn render_dot(
    plan: &Plan,
    registry: Option<&Registry>,
    options: RenderOptions,
) -> Result<String, RunError> {
    let stored: FxHashSet<petgraph::stable_graph::NodeIndex> = registry
        .map(|registry| registry.iter().map(|(node, _)| node.index).collect())
        .unwrap_or_default();
    let transformed;
    let plan = match registry {
        Some(registry) if !registry.is_empty() => {
            transformed = plan_with_value_stores_unpruned(plan, registry)?;
            &transformed
        }
        _ => plan,
    };

    let mut lines: Vec<String> = vec![
        "digraph plan {".to_string(),
        "  rankdir=LR;".to_string(),
        "  fontname=\"Courier\";".to_string(),
        "  fontsize=10;".to_string(),
        "  node [shape=box style=filled fontcolor=white fontname=\"Courier\" fontsize=10 margin=0.05];".to_string(),
        "  edge [arrowhead=open fontname=\"Courier\" fontsize=9];".to_string(),
    ];

    // Group nodes into clusters by (truncated) scope.
    let mut clusters: FxHashMap<Vec<String>, Vec<petgraph::stable_graph::NodeIndex>> =
        FxHashMap::default();
    for index in plan.graph.node_indices() {
        let scope = truncated_scope(&plan.graph[index].scope, options.level);
        clusters.entry(scope).or_default().push(index);
    }
    let mut cluster_keys: Vec<Vec<String>> = clusters.keys().cloned().collect();
    cluster_keys.sort();

    for (cluster_id, scope) in cluster_keys.iter().enumerate() {
        let mut nodes = clusters.remove(scope).expect("cluster exists");
        nodes.sort();
        let indent = if scope.is_empty() { "  " } else { "    " };
        if !scope.is_empty() {
            lines.push(format!("  subgraph cluster_{cluster_id} {{"));
            lines.push(format!("    label=\"{}\";", escape(&scope.join("/"))));
            lines.push("    color=\"#666666\";".to_string());
        }
        for index in nodes {
            let data = &plan.graph[index];
            let color = if stored.contains(&index) {
                STORED_COLOR
            } else {
                match &data.kind {
                    NodeKind::Literal(_) => LITERAL_COLOR,
                    NodeKind::Call(_) => CALL_COLOR,
                }
            };
            lines.push(format!(
                "{indent}node_{} [label=\"{}\" fillcolor=\"{color}\"];",
                index.index(),
                escape(&data.label()),
            ));
        }
        if !scope.is_empty() {
            lines.push("  }".to_string());
        }
    }

    let mut edges: Vec<String> = plan
        .graph
        .edge_references()
        .map(|edge| {
            let attrs = match edge.weight() {
                EdgeKind::Positional { index } => format!(" [label=\"{index}\"]"),
                EdgeKind::Keyword { name, .. } => format!(" [label=\"{}\"]", escape(&name)),
                EdgeKind::Dependency => " [style=dashed]".to_string(),
            };
            format!(
                "  node_{} -> node_{}{attrs};",
                edge.source().index(),
                edge.target().index()
            )
        })
        .collect();
    edges.sort();
    lines.extend(edges);

    lines.push("}".to_string());
    Ok(lines.join("\n"))
}

/// Render a plan to an image by piping DOT through the `dot` executable.
pub fn render_image(
    plan: &Plan,
    registry: Option<&Registry>,
    options: RenderOptions,
    output_path: &Path,
) -> anyhow::Result<PathBuf> {
    let mut output_path = output_path.to_path_buf();
    if output_path.extension().is_none() {
        output_path = output_path.with_extension("png");
    }
    let format = output_path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("png")
        .to_string();

    let dot = render_dot(plan, registry, options).map_err(anyhow::Error::new)?;

    let mut child = Command::new("dot")
        .arg(format!("-T{format}"))
        .arg("-o")
        .arg(&output_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|_| anyhow::anyhow!("graphviz executable not found; install Graphviz"))?;
    if let Some(stdin) = child.stdin.as_mut() {
        stdin.write_all(dot.as_bytes())?;
    }
    let status = child.wait()?;
    if !status.success() {
        anyhow::bail!("dot exited with {status}");
    }
    Ok(output_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::func::SymFn;
    use crate::plan::CallArgs;
    use crate::value::Value;

    fn add_fn() -> SymFn {
        SymFn::binary("add", ["a", "b"], |a, b| {
            Ok(Value::Int(a.as_int().unwrap_or(0) + b.as_int().unwrap_or(0)))
        })
    }

    #[test]
    fn dot_output_contains_nodes_edges_and_labels() {
        let mut plan = Plan::new();
        plan.call(&add_fn(), CallArgs::new().arg(1).kwarg("b", 2)).expect("call");
        let dot = render_dot(&plan, None, RenderOptions::default()).expect("render");
        assert!(dot.starts_with("digraph plan {"));
        assert!(dot.contains("add"));
        assert!(dot.contains("label=\"b\""));
        assert!(dot.ends_with("}"));
    }

    #[test]
    fn scope_level_truncation_merges_clusters() {
        let mut plan = Plan::new();
        plan.scope(["outer", "inner"], |plan| plan.lit(1));
        let full = render_dot(&plan, None, RenderOptions { level: None }).expect("render");
        assert!(full.contains("outer/inner"));
        let truncated =
            render_dot(&plan, None, RenderOptions { level: Some(1) }).expect("render");
        assert!(truncated.contains("label=\"outer\""));
        assert!(!truncated.contains("outer/inner"));
    }

    #[test]
    fn a_registry_shows_the_write_read_structure_without_store_io() {
        use crate::registry::Registry;
        use crate::stores::TestStore;
        use std::sync::Arc;

        let mut plan = Plan::new();
        let mut registry = Registry::new();
        let x = plan.call(&add_fn(), CallArgs::new().arg(1).arg(2)).expect("call");
        let store = Arc::new(TestStore::new().deny_get_modified_time());
        registry.add(x, store).expect("add");

        let dot = render_dot(&plan, Some(&registry), RenderOptions::default())
            .expect("render never touches the store");
        assert!(dot.contains("write"));
        assert!(dot.contains("read"));
        assert!(dot.contains(STORED_COLOR));
    }

    #[test]
    fn quotes_in_labels_are_escaped() {
        let mut plan = Plan::new();
        plan.lit("say \"hi\"");
        let dot = render_dot(&plan, None, RenderOptions::default()).expect("render");
        assert!(dot.contains("\\\""));
    }
}
