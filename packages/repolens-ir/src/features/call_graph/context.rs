//! Context-sensitive call graph
//!
//! Each call is refined by a call context: (call site, caller context,
//! constant argument values). Constant arguments are tracked only for
//! literals and variables whose only defining writes are constants — no
//! heap or conditional constant propagation. Beyond the configured depth,
//! contexts merge into a depth-capped summary context per function.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::shared::models::{EdgeKind, IrDocument};

#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Maximum context chain depth; contexts merge beyond it
    pub max_depth: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self { max_depth: 5 }
    }
}

/// One call context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallContext {
    pub id: usize,
    /// Function this context belongs to
    pub function_id: String,
    /// Call site (edge id) that created this context; None for roots and
    /// depth-merged summaries
    pub call_site_id: Option<String>,
    /// Parent context in the chain
    pub caller_context: Option<usize>,
    /// Constant argument values at the site (position/keyword → literal)
    pub constant_args: BTreeMap<String, serde_json::Value>,
    pub depth: usize,
    /// True when contexts beyond max_depth merged into this one
    pub merged: bool,
}

struct Site {
    edge_id: String,
    callee: String,
    const_args: BTreeMap<String, serde_json::Value>,
}

/// Context-sensitive call graph over one IR document
pub struct ContextSensitiveCallGraph {
    contexts: Vec<CallContext>,
    /// context id → callee context ids
    successors: HashMap<usize, Vec<usize>>,
    /// function id → context ids
    by_function: HashMap<String, Vec<usize>>,
}

impl ContextSensitiveCallGraph {
    pub fn build(doc: &IrDocument, config: ContextConfig) -> Self {
        let mut sites_by_caller: HashMap<String, Vec<Site>> = HashMap::new();
        let mut has_incoming: HashSet<String> = HashSet::new();
        let mut functions: Vec<String> = Vec::new();

        for node in &doc.nodes {
            if node.kind.is_callable() {
                functions.push(node.id.clone());
            }
        }
        functions.sort();

        for edge in &doc.edges {
            if edge.kind != EdgeKind::Calls {
                continue;
            }
            let const_args: BTreeMap<String, serde_json::Value> = edge
                .attr("const_args")
                .and_then(|v| v.as_object().cloned())
                .map(|m| m.into_iter().collect())
                .unwrap_or_default();
            has_incoming.insert(edge.target_id.clone());
            sites_by_caller
                .entry(edge.source_id.clone())
                .or_default()
                .push(Site {
                    edge_id: edge.id.clone(),
                    callee: edge.target_id.clone(),
                    const_args,
                });
        }
        for sites in sites_by_caller.values_mut() {
            sites.sort_by(|a, b| a.edge_id.cmp(&b.edge_id));
        }

        let mut graph = Self {
            contexts: Vec::new(),
            successors: HashMap::new(),
            by_function: HashMap::new(),
        };

        // Roots: entry functions with no incoming calls
        let mut queue: VecDeque<usize> = VecDeque::new();
        for function in &functions {
            if !has_incoming.contains(function) {
                let id = graph.push_context(CallContext {
                    id: 0,
                    function_id: function.clone(),
                    call_site_id: None,
                    caller_context: None,
                    constant_args: BTreeMap::new(),
                    depth: 0,
                    merged: false,
                });
                queue.push_back(id);
            }
        }

        // Depth-capped summary contexts, one per function on demand
        let mut merged_for: HashMap<String, usize> = HashMap::new();
        // Dedup: (parent context, site) expands once
        let mut expanded: HashSet<(usize, String)> = HashSet::new();

        while let Some(ctx_id) = queue.pop_front() {
            let (function, depth) = {
                let ctx = &graph.contexts[ctx_id];
                (ctx.function_id.clone(), ctx.depth)
            };
            let sites = match sites_by_caller.get(&function) {
                Some(sites) => sites,
                None => continue,
            };
            for site in sites {
                if !expanded.insert((ctx_id, site.edge_id.clone())) {
                    continue;
                }
                let callee_ctx = if depth + 1 > config.max_depth {
                    *merged_for.entry(site.callee.clone()).or_insert_with(|| {
                        graph.push_context(CallContext {
                            id: 0,
                            function_id: site.callee.clone(),
                            call_site_id: None,
                            caller_context: None,
                            constant_args: BTreeMap::new(),
                            depth: config.max_depth + 1,
                            merged: true,
                        })
                    })
                } else {
                    graph.push_context(CallContext {
                        id: 0,
                        function_id: site.callee.clone(),
                        call_site_id: Some(site.edge_id.clone()),
                        caller_context: Some(ctx_id),
                        constant_args: site.const_args.clone(),
                        depth: depth + 1,
                        merged: false,
                    })
                };
                graph.successors.entry(ctx_id).or_default().push(callee_ctx);
                queue.push_back(callee_ctx);
            }
        }

        graph
    }

    fn push_context(&mut self, mut context: CallContext) -> usize {
        let id = self.contexts.len();
        context.id = id;
        self.by_function
            .entry(context.function_id.clone())
            .or_default()
            .push(id);
        self.contexts.push(context);
        id
    }

    pub fn contexts_for(&self, function_id: &str) -> Vec<&CallContext> {
        self.by_function
            .get(function_id)
            .map(|ids| ids.iter().map(|id| &self.contexts[*id]).collect())
            .unwrap_or_default()
    }

    pub fn context(&self, id: usize) -> Option<&CallContext> {
        self.contexts.get(id)
    }

    /// Functions reachable from a context, following its refinement chain
    pub fn reachable_from(&self, context_id: usize) -> Vec<String> {
        let mut visited_ctx: HashSet<usize> = HashSet::new();
        let mut functions: Vec<String> = Vec::new();
        let mut seen_fn: HashSet<String> = HashSet::new();
        let mut stack = vec![context_id];
        while let Some(ctx) = stack.pop() {
            if !visited_ctx.insert(ctx) {
                continue;
            }
            if let Some(succ) = self.successors.get(&ctx) {
                for next in succ {
                    let function = &self.contexts[*next].function_id;
                    if seen_fn.insert(function.clone()) {
                        functions.push(function.clone());
                    }
                    stack.push(*next);
                }
            }
        }
        functions.sort();
        functions
    }

    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }
}
