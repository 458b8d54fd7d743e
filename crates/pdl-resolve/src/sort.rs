//! Dependency graphs and topological orders.
//!
//! Two independent orders are derived from the plans: creation order (edges
//! follow references inside constructor arguments, including nested object
//! values) and registration order (edges follow references inside
//! registration-point values). Graphs map entry keys to neighbor keys, each
//! edge annotated with the span of the reference that established it, so a
//! cycle report can quote every step.

use crate::ctors::{ArgPlan, CtorPlan};
use crate::registration::PointPlan;
use crate::store::VarKey;
use crate::validate::Plans;
use indexmap::IndexMap;
use pdl_ast::{Diagnostic, ErrorKind, SourceMap, Span};

/// The reference syntax that established a dependency edge.
#[derive(Debug, Clone, Copy)]
pub struct RefEdge {
    pub span: Span,
}

/// Adjacency: entry -> (dependency -> witnessing reference).
pub type Graph = IndexMap<VarKey, IndexMap<VarKey, RefEdge>>;

/// Which order is being computed; selects the cycle error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKind {
    Creation,
    Registration,
}

/// Build the creation-order dependency graph.
pub fn creation_graph(plans: &Plans) -> Graph {
    let mut graph: Graph = IndexMap::new();
    for (key, plan) in &plans.entries {
        let mut edges = IndexMap::new();
        if let Some(ctor) = &plan.ctor {
            collect_ctor_edges(plans, ctor, &mut edges);
        }
        edges.retain(|target, _| plans.entries.contains_key(target));
        graph.insert(key.clone(), edges);
    }
    graph
}

/// Build the registration-order dependency graph. Property-value references
/// are ignored; only registration-point values contribute edges.
pub fn registration_graph(plans: &Plans) -> Graph {
    let mut graph: Graph = IndexMap::new();
    for (key, plan) in &plans.entries {
        let mut edges = IndexMap::new();
        for registration in &plan.registrations {
            match &registration.point {
                PointPlan::Reference { key: target, span } => {
                    edges.insert(target.clone(), RefEdge { span: *span });
                }
                PointPlan::Object(span) => {
                    if let Some(object) = plans.objects.get(span) {
                        collect_ctor_edges(plans, &object.ctor, &mut edges);
                    }
                }
                PointPlan::Null | PointPlan::Constructed { .. } => {}
            }
        }
        edges.retain(|target, _| plans.entries.contains_key(target));
        graph.insert(key.clone(), edges);
    }
    graph
}

/// References inside constructor arguments, recursing through nested object
/// values (their own registration concerns do not exist).
fn collect_ctor_edges(plans: &Plans, ctor: &CtorPlan, edges: &mut IndexMap<VarKey, RefEdge>) {
    for arg in &ctor.args {
        match arg {
            ArgPlan::Reference { key, span } => {
                edges.entry(key.clone()).or_insert(RefEdge { span: *span });
            }
            ArgPlan::Object(span) => {
                if let Some(object) = plans.objects.get(span) {
                    collect_ctor_edges(plans, &object.ctor, edges);
                }
            }
            ArgPlan::Value(_) | ArgPlan::Machine => {}
        }
    }
}

/// Topologically order the graph (dependencies first), preserving
/// declaration order among independent entries.
pub fn topological_order(
    graph: &Graph,
    kind: SortKind,
    sources: &SourceMap,
) -> Result<Vec<VarKey>, Diagnostic> {
    let mut order: Vec<VarKey> = Vec::new();
    let mut placed: Vec<bool> = vec![false; graph.len()];

    loop {
        let mut progressed = false;
        for (index, (key, edges)) in graph.iter().enumerate() {
            if placed[index] {
                continue;
            }
            let ready = edges.keys().all(|target| {
                graph
                    .get_index_of(target)
                    .map(|t| placed[t])
                    .unwrap_or(true)
            });
            if ready {
                placed[index] = true;
                order.push(key.clone());
                progressed = true;
            }
        }
        if order.len() == graph.len() {
            return Ok(order);
        }
        if !progressed {
            return Err(report_cycle(graph, &placed, kind, sources));
        }
    }
}

/// Reconstruct one cycle among the unplaced entries and render it as a
/// ladder of referencing steps with positions.
fn report_cycle(
    graph: &Graph,
    placed: &[bool],
    kind: SortKind,
    sources: &SourceMap,
) -> Diagnostic {
    // Walk unplaced edges until a key repeats; every unplaced entry sits on
    // or leads into a cycle, so this terminates.
    let start = graph
        .iter()
        .enumerate()
        .find(|(index, _)| !placed[*index])
        .map(|(_, (key, _))| key.clone())
        .expect("BUG: stalled sort with no unplaced entry");

    let mut path: Vec<(VarKey, VarKey, RefEdge)> = Vec::new();
    let mut seen: Vec<VarKey> = vec![start.clone()];
    let mut current = start;
    let cycle_start;
    loop {
        let edges = &graph[&current];
        let (next, edge) = edges
            .iter()
            .find(|(target, _)| {
                graph
                    .get_index_of(*target)
                    .map(|t| !placed[t])
                    .unwrap_or(false)
            })
            .map(|(target, edge)| (target.clone(), *edge))
            .expect("BUG: unplaced entry with no unplaced dependency");
        path.push((current.clone(), next.clone(), edge));
        if let Some(position) = seen.iter().position(|k| k == &next) {
            cycle_start = position;
            break;
        }
        seen.push(next.clone());
        current = next;
    }

    let steps: Vec<String> = path[cycle_start..]
        .iter()
        .map(|(from, to, edge)| {
            let (line, col) = sources.line_col(edge.span);
            format!(
                "  {} -> {} ({}:{}:{}: '{}')",
                from,
                to,
                sources.file_name(edge.span),
                line,
                col,
                sources.snippet(edge.span)
            )
        })
        .collect();

    let (error_kind, what) = match kind {
        SortKind::Creation => (ErrorKind::CreationOrderCycle, "creation"),
        SortKind::Registration => (ErrorKind::RegistrationOrderCycle, "registration"),
    };
    let first_span = path[cycle_start].2.span;
    Diagnostic::new(
        error_kind,
        first_span,
        format!("{} order cycle:\n{}", what, steps.join("\n")),
    )
}
