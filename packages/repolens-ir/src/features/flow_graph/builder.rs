//! CFG builder
//!
//! Blocks are partitioned at if/elif/else, for/while, try/except/finally,
//! and return/raise/break/continue. Each block records the variable names
//! it defines and uses; data-flow emission later rewrites them to node ids.

use std::collections::HashSet;

use crate::features::parsing::{ParsedTree, SyntaxKind, SyntaxNode};
use crate::shared::models::{
    CfgBlock, CfgBlockKind, CfgEdge, CfgEdgeKind, ControlFlowGraph, FileIr, Span,
};
use crate::shared::utils::ids;

struct LoopFrame {
    header_id: String,
    after_id: String,
}

struct CfgBuilder<'a> {
    tree: &'a ParsedTree,
    function_node_id: String,
    blocks: Vec<CfgBlock>,
    edges: Vec<CfgEdge>,
    counter: usize,
    exit_id: String,
    loop_stack: Vec<LoopFrame>,
}

impl<'a> CfgBuilder<'a> {
    fn new(tree: &'a ParsedTree, function_node_id: &str) -> Self {
        Self {
            tree,
            function_node_id: function_node_id.to_string(),
            blocks: Vec::new(),
            edges: Vec::new(),
            counter: 0,
            exit_id: String::new(),
            loop_stack: Vec::new(),
        }
    }

    fn new_block(&mut self, kind: CfgBlockKind, span: Span) -> String {
        let id = ids::block_id(&self.function_node_id, self.counter);
        self.counter += 1;
        self.blocks.push(CfgBlock::new(id.clone(), kind, span));
        id
    }

    fn edge(&mut self, source: &str, target: &str, kind: CfgEdgeKind) {
        self.edges.push(CfgEdge::new(source, target, kind));
    }

    fn block_mut(&mut self, id: &str) -> &mut CfgBlock {
        self.blocks
            .iter_mut()
            .find(|b| b.id == id)
            .expect("block exists in builder")
    }

    fn record(&mut self, block_id: &str, stmt: &SyntaxNode) {
        let (defs, uses) = collect_defs_uses(self.tree, stmt);
        let block = self.block_mut(block_id);
        for d in defs {
            if !block.defined_variable_ids.contains(&d) {
                block.defined_variable_ids.push(d);
            }
        }
        for u in uses {
            if !block.used_variable_ids.contains(&u) {
                block.used_variable_ids.push(u);
            }
        }
        if block.span == Span::zero() {
            block.span = stmt.span;
        } else {
            block.span.end_line = block.span.end_line.max(stmt.span.end_line);
            block.span.end_col = stmt.span.end_col;
        }
    }

    fn record_condition(&mut self, block_id: &str, condition: &SyntaxNode) {
        let text = self.tree.text_of(condition).to_string();
        let uses = collect_identifiers(self.tree, condition);
        let block = self.block_mut(block_id);
        block.condition_text = Some(text);
        for u in uses {
            if !block.used_variable_ids.contains(&u) {
                block.used_variable_ids.push(u);
            }
        }
    }

    /// Process a statement sequence starting in `current`. Returns the open
    /// block after the sequence, or None when all paths terminated.
    fn process_statements(
        &mut self,
        statements: &[SyntaxNode],
        mut current: Option<String>,
    ) -> Option<String> {
        for stmt in statements {
            let open = match current.take() {
                Some(id) => id,
                // Code after a terminator is unreachable; stop partitioning.
                None => return None,
            };
            current = self.process_statement(stmt, open);
        }
        current
    }

    fn process_statement(&mut self, stmt: &SyntaxNode, current: String) -> Option<String> {
        match &stmt.kind {
            SyntaxKind::IfStmt => self.process_if(stmt, current),
            SyntaxKind::WhileStmt | SyntaxKind::ForStmt => self.process_loop(stmt, current),
            SyntaxKind::TryStmt => self.process_try(stmt, current),
            SyntaxKind::ReturnStmt => {
                self.record(&current, stmt);
                let exit = self.exit_id.clone();
                self.edge(&current, &exit, CfgEdgeKind::Normal);
                None
            }
            SyntaxKind::RaiseStmt => {
                self.record(&current, stmt);
                let exit = self.exit_id.clone();
                self.edge(&current, &exit, CfgEdgeKind::Exception);
                None
            }
            SyntaxKind::BreakStmt => {
                if let Some(frame) = self.loop_stack.last() {
                    let after = frame.after_id.clone();
                    self.edge(&current, &after, CfgEdgeKind::Normal);
                }
                None
            }
            SyntaxKind::ContinueStmt => {
                if let Some(frame) = self.loop_stack.last() {
                    let header = frame.header_id.clone();
                    self.edge(&current, &header, CfgEdgeKind::LoopBack);
                }
                None
            }
            SyntaxKind::WithStmt => {
                self.record(&current, stmt);
                if let Some(body) = stmt.child_by_field("body") {
                    self.process_statements(&body.children, Some(current))
                } else {
                    Some(current)
                }
            }
            _ => {
                self.record(&current, stmt);
                Some(current)
            }
        }
    }

    fn process_if(&mut self, stmt: &SyntaxNode, current: String) -> Option<String> {
        // Collect (condition, body) arms plus the optional trailing else
        let mut arms: Vec<(&SyntaxNode, &SyntaxNode)> = Vec::new();
        if let (Some(cond), Some(cons)) = (
            stmt.child_by_field("condition"),
            stmt.child_by_field("consequence"),
        ) {
            arms.push((cond, cons));
        }
        let mut else_body: Option<&SyntaxNode> = None;
        for child in &stmt.children {
            match child.raw_kind.as_str() {
                "elif_clause" => {
                    if let (Some(cond), Some(cons)) = (
                        child.child_by_field("condition"),
                        child.child_by_field("consequence"),
                    ) {
                        arms.push((cond, cons));
                    }
                }
                "else_clause" => {
                    else_body = child.children.iter().find(|c| c.raw_kind == "block");
                }
                _ => {}
            }
        }
        if arms.is_empty() {
            return Some(current);
        }

        let join = self.new_block(CfgBlockKind::Block, stmt.span);
        let mut prev_cond: Option<String> = None;

        for (cond, body) in &arms {
            let cond_id = self.new_block(CfgBlockKind::Condition, cond.span);
            self.record_condition(&cond_id, cond);
            match prev_cond {
                None => self.edge(&current, &cond_id, CfgEdgeKind::Normal),
                Some(prev) => self.edge(&prev, &cond_id, CfgEdgeKind::FalseBranch),
            }

            let branch_start = self.new_block(CfgBlockKind::Block, body.span);
            self.edge(&cond_id, &branch_start, CfgEdgeKind::TrueBranch);
            if let Some(end) = self.process_statements(&body.children, Some(branch_start)) {
                self.edge(&end, &join, CfgEdgeKind::Normal);
            }
            prev_cond = Some(cond_id);
        }

        let last_cond = prev_cond.expect("at least one arm");
        match else_body {
            Some(body) => {
                let else_start = self.new_block(CfgBlockKind::Block, body.span);
                self.edge(&last_cond, &else_start, CfgEdgeKind::FalseBranch);
                if let Some(end) = self.process_statements(&body.children, Some(else_start)) {
                    self.edge(&end, &join, CfgEdgeKind::Normal);
                }
            }
            None => self.edge(&last_cond, &join, CfgEdgeKind::FalseBranch),
        }

        Some(join)
    }

    fn process_loop(&mut self, stmt: &SyntaxNode, current: String) -> Option<String> {
        let header = self.new_block(CfgBlockKind::LoopHeader, stmt.span);
        self.edge(&current, &header, CfgEdgeKind::Normal);

        match stmt.kind {
            SyntaxKind::WhileStmt => {
                if let Some(cond) = stmt.child_by_field("condition") {
                    self.record_condition(&header, cond);
                }
            }
            _ => {
                // for target in iterable: target is defined, iterable is read
                if let Some(left) = stmt.child_by_field("left") {
                    let defs = collect_identifiers(self.tree, left);
                    let block = self.block_mut(&header);
                    block.defined_variable_ids.extend(defs);
                }
                if let Some(right) = stmt.child_by_field("right") {
                    let uses = collect_identifiers(self.tree, right);
                    let text = self.tree.text_of(right).to_string();
                    let block = self.block_mut(&header);
                    block.condition_text = Some(text);
                    block.used_variable_ids.extend(uses);
                }
            }
        }

        let after = self.new_block(CfgBlockKind::Block, stmt.span);
        let body_start = {
            let body_span = stmt.child_by_field("body").map(|b| b.span).unwrap_or(stmt.span);
            self.new_block(CfgBlockKind::Block, body_span)
        };
        self.edge(&header, &body_start, CfgEdgeKind::TrueBranch);
        self.edge(&header, &after, CfgEdgeKind::FalseBranch);

        self.loop_stack.push(LoopFrame {
            header_id: header.clone(),
            after_id: after.clone(),
        });
        if let Some(body) = stmt.child_by_field("body") {
            if let Some(end) = self.process_statements(&body.children, Some(body_start)) {
                self.edge(&end, &header, CfgEdgeKind::LoopBack);
            }
        }
        self.loop_stack.pop();

        Some(after)
    }

    fn process_try(&mut self, stmt: &SyntaxNode, current: String) -> Option<String> {
        let try_block = self.new_block(CfgBlockKind::Try, stmt.span);
        self.edge(&current, &try_block, CfgEdgeKind::Normal);

        let body_end = stmt
            .children
            .iter()
            .find(|c| c.raw_kind == "block")
            .and_then(|body| self.process_statements(&body.children, Some(try_block.clone())));

        let mut arm_ends: Vec<String> = Vec::new();
        if let Some(end) = body_end {
            arm_ends.push(end);
        }

        for child in &stmt.children {
            if child.raw_kind == "except_clause" {
                let catch = self.new_block(CfgBlockKind::Catch, child.span);
                self.edge(&try_block, &catch, CfgEdgeKind::Exception);
                if let Some(block) = child.children.iter().find(|c| c.raw_kind == "block") {
                    if let Some(end) = self.process_statements(&block.children, Some(catch)) {
                        arm_ends.push(end);
                    }
                } else {
                    arm_ends.push(catch);
                }
            }
        }

        let finally = stmt
            .children
            .iter()
            .find(|c| c.raw_kind == "finally_clause");

        match finally {
            Some(clause) => {
                let fin = self.new_block(CfgBlockKind::Finally, clause.span);
                for end in &arm_ends {
                    self.edge(end, &fin, CfgEdgeKind::Normal);
                }
                if arm_ends.is_empty() {
                    self.edge(&try_block, &fin, CfgEdgeKind::Normal);
                }
                if let Some(block) = clause.children.iter().find(|c| c.raw_kind == "block") {
                    self.process_statements(&block.children, Some(fin))
                } else {
                    Some(fin)
                }
            }
            None => {
                if arm_ends.is_empty() {
                    return None;
                }
                let join = self.new_block(CfgBlockKind::Block, stmt.span);
                for end in &arm_ends {
                    self.edge(end, &join, CfgEdgeKind::Normal);
                }
                Some(join)
            }
        }
    }

    fn finish(mut self, entry_id: String) -> ControlFlowGraph {
        // Prune blocks unreachable from entry (dead code after terminators),
        // keeping Exit: it is a structural invariant.
        let mut reachable: HashSet<String> = HashSet::new();
        let mut stack = vec![entry_id];
        while let Some(id) = stack.pop() {
            if !reachable.insert(id.clone()) {
                continue;
            }
            for edge in &self.edges {
                if edge.source_block_id == id && !reachable.contains(&edge.target_block_id) {
                    stack.push(edge.target_block_id.clone());
                }
            }
        }
        let exit_id = self.exit_id.clone();
        self.blocks
            .retain(|b| reachable.contains(&b.id) || b.id == exit_id);
        self.edges.retain(|e| {
            (reachable.contains(&e.source_block_id) || e.source_block_id == exit_id)
                && (reachable.contains(&e.target_block_id) || e.target_block_id == exit_id)
        });

        ControlFlowGraph {
            function_node_id: self.function_node_id,
            blocks: self.blocks,
            edges: self.edges,
        }
    }
}

/// Build the CFG for one function body
pub fn build_cfg(tree: &ParsedTree, function_node_id: &str, body: &SyntaxNode) -> ControlFlowGraph {
    let mut builder = CfgBuilder::new(tree, function_node_id);

    let entry = builder.new_block(CfgBlockKind::Entry, body.span);
    builder.exit_id = builder.new_block(CfgBlockKind::Exit, body.span);

    let first = builder.new_block(CfgBlockKind::Block, body.span);
    builder.edge(&entry, &first, CfgEdgeKind::Normal);

    if let Some(end) = builder.process_statements(&body.children, Some(first)) {
        let exit = builder.exit_id.clone();
        builder.edge(&end, &exit, CfgEdgeKind::Normal);
    }

    builder.finish(entry)
}

/// Build CFGs for every function/method/lambda in a file's IR, matching IR
/// nodes to syntax by body span.
pub fn build_flow_graphs(tree: &ParsedTree, ir: &mut FileIr) {
    let functions: Vec<(String, Span)> = ir
        .nodes
        .iter()
        .filter(|n| n.kind.is_callable())
        .filter_map(|n| n.body_span.map(|s| (n.id.clone(), s)))
        .collect();

    for (node_id, body_span) in functions {
        let body = tree.root.walk().find(|syntax| {
            matches!(syntax.kind, SyntaxKind::Block) && syntax.span == body_span
        });
        if let Some(body) = body {
            let cfg = build_cfg(tree, &node_id, body);
            ir.control_flow_graphs.push(cfg);
        }
    }
}

/// All identifier texts in a subtree, excluding attribute names
fn collect_identifiers(tree: &ParsedTree, node: &SyntaxNode) -> Vec<String> {
    let mut out = Vec::new();
    collect_identifiers_into(tree, node, &mut out);
    out
}

fn collect_identifiers_into(tree: &ParsedTree, node: &SyntaxNode, out: &mut Vec<String>) {
    if node.kind == SyntaxKind::NameExpr && node.field.as_deref() != Some("attribute") {
        let name = tree.text_of(node).to_string();
        if !out.contains(&name) {
            out.push(name);
        }
        return;
    }
    for child in &node.children {
        collect_identifiers_into(tree, child, out);
    }
}

/// (defined, used) variable names of one statement
fn collect_defs_uses(tree: &ParsedTree, stmt: &SyntaxNode) -> (Vec<String>, Vec<String>) {
    // Assignments may sit inside an expression_statement wrapper
    let assignment = match &stmt.kind {
        SyntaxKind::AssignmentStmt | SyntaxKind::AugAssignmentStmt => Some(stmt),
        SyntaxKind::ExpressionStmt => stmt.children.iter().find(|c| {
            matches!(
                c.kind,
                SyntaxKind::AssignmentStmt | SyntaxKind::AugAssignmentStmt
            )
        }),
        _ => None,
    };

    match assignment {
        Some(assign) => {
            let defs = assign
                .child_by_field("left")
                .map(|l| collect_identifiers(tree, l))
                .unwrap_or_default();
            let mut uses = assign
                .child_by_field("right")
                .map(|r| collect_identifiers(tree, r))
                .unwrap_or_default();
            if assign.kind == SyntaxKind::AugAssignmentStmt {
                for d in &defs {
                    if !uses.contains(d) {
                        uses.push(d.clone());
                    }
                }
            }
            (defs, uses)
        }
        None => (Vec::new(), collect_identifiers(tree, stmt)),
    }
}
