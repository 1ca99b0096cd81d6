//! Python IR generator
//!
//! Translates a parsed Python tree into the language-neutral IR. Name
//! resolution runs against the scope stack; calls resolve through the
//! ladder bare-name → typed receiver → import alias → synthesized
//! external. Malformed subtrees are skipped with a diagnostic.

use std::collections::{BTreeMap, HashMap};

use crate::features::parsing::{ParsedTree, SyntaxKind, SyntaxNode};
use crate::features::type_resolution::{NarrowingCondition, Type, TypeState};
use crate::shared::models::{
    Diagnostic, EdgeKind, FileIr, NodeKind, Result, Span,
};
use crate::shared::utils::ScopeKind;

use super::builder::IrBuilder;
use super::ports::IrGenerator;

/// Implicit parameters skipped during parameter processing
const IMPLICIT_PARAMS: &[&str] = &["self", "cls"];

/// Import names that mark a file as test-related
const TEST_IMPORT_HINTS: &[&str] = &["pytest", "unittest"];

pub struct PythonIrGenerator;

impl PythonIrGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PythonIrGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IrGenerator for PythonIrGenerator {
    fn language(&self) -> &'static str {
        "python"
    }

    fn generate(&self, tree: &ParsedTree, _previous: Option<&FileIr>) -> Result<FileIr> {
        let module_path = module_path_from(&tree.file_path);
        let mut builder = IrBuilder::new(&tree.file_path, "python", &module_path);
        let mut state = ModuleState::default();

        let is_test = is_test_path(&tree.file_path) || has_test_imports(tree);
        let docstring = block_docstring(tree, &tree.root);
        builder.create_file_node(tree.root.span, is_test, docstring);

        for error in &tree.errors {
            builder.push_diagnostic(
                Diagnostic::warning("parse", &tree.file_path, error.message.clone())
                    .with_span(error.span),
            );
        }

        // Pre-register top-level definitions so forward references resolve.
        self.pre_register(tree, &mut builder, &tree.root);

        for stmt in &tree.root.children {
            self.walk_statement(tree, &mut builder, stmt, &mut state, None);
        }

        self.emit_overrides(&mut builder, &state);

        Ok(builder.finish())
    }
}

/// Module-wide bookkeeping collected during the walk
#[derive(Default)]
struct ModuleState {
    /// class fqn → member name → node id
    class_members: HashMap<String, HashMap<String, String>>,
    /// class fqn → resolved base node ids (in-file only)
    class_bases: HashMap<String, Vec<String>>,
}

/// Per-function walk context
#[derive(Clone, Default)]
struct FnCtx {
    function_id: String,
    /// Declared types from annotations: var → type
    declared: HashMap<String, Type>,
    /// Per-branch type state; joined (union) at branch merge points
    narrowed: TypeState,
    /// Variables whose only assignment so far is a constant literal
    consts: HashMap<String, Option<serde_json::Value>>,
    /// Enclosing class fqn when this is a method
    class_fqn: Option<String>,
}

impl FnCtx {
    fn effective_type(&self, var: &str) -> Option<&Type> {
        self.narrowed.get(var).or_else(|| self.declared.get(var))
    }
}

impl PythonIrGenerator {
    /// Register names of definitions directly under `parent` in the current
    /// scope (ids are deterministic, so they can be computed up front).
    fn pre_register(&self, tree: &ParsedTree, b: &mut IrBuilder, parent: &SyntaxNode) {
        for child in &parent.children {
            let def = definition_of(child);
            if let Some(def) = def {
                if let Some(name_node) = def.child_by_field("name") {
                    let name = tree.text_of(name_node).to_string();
                    let id = b.node_id(&b.scopes.fqn_with(&name));
                    b.scopes.define(&name, id);
                }
            }
        }
    }

    fn walk_statement(
        &self,
        tree: &ParsedTree,
        b: &mut IrBuilder,
        stmt: &SyntaxNode,
        state: &mut ModuleState,
        mut ctx: Option<&mut FnCtx>,
    ) {
        if stmt.is_error {
            b.push_diagnostic(
                Diagnostic::warning(
                    "ir_generation",
                    b.file_path().to_string(),
                    "skipped malformed subtree",
                )
                .with_span(stmt.span),
            );
            return;
        }

        match &stmt.kind {
            SyntaxKind::ImportDecl => self.handle_import(tree, b, stmt),
            SyntaxKind::FunctionDef => {
                self.handle_function(tree, b, stmt, state, &[], ctx.as_deref_mut())
            }
            SyntaxKind::ClassDef => self.handle_class(tree, b, stmt, state, &[]),
            SyntaxKind::AssignmentStmt | SyntaxKind::AugAssignmentStmt => {
                self.handle_assignment(tree, b, stmt, ctx.as_deref_mut())
            }
            SyntaxKind::ExpressionStmt => {
                for child in &stmt.children {
                    match &child.kind {
                        SyntaxKind::AssignmentStmt | SyntaxKind::AugAssignmentStmt => {
                            self.handle_assignment(tree, b, child, ctx.as_deref_mut())
                        }
                        _ => self.walk_expression(tree, b, child, ctx.as_deref_mut()),
                    }
                }
            }
            SyntaxKind::IfStmt => self.handle_if(tree, b, stmt, state, ctx.as_deref_mut()),
            SyntaxKind::ForStmt | SyntaxKind::WhileStmt => {
                if let Some(cond) = stmt.child_by_field("condition") {
                    self.walk_expression(tree, b, cond, ctx.as_deref_mut());
                }
                if let Some(right) = stmt.child_by_field("right") {
                    self.walk_expression(tree, b, right, ctx.as_deref_mut());
                }
                if let Some(body) = stmt.child_by_field("body") {
                    let body_children: Vec<SyntaxNode> = body.children.clone();
                    for inner in &body_children {
                        self.walk_statement(tree, b, inner, state, ctx.as_deref_mut());
                    }
                }
            }
            SyntaxKind::TryStmt => {
                for child in &stmt.children.clone() {
                    match child.raw_kind.as_str() {
                        "block" => {
                            for inner in &child.children {
                                self.walk_statement(tree, b, inner, state, ctx.as_deref_mut());
                            }
                        }
                        "except_clause" | "finally_clause" | "else_clause" => {
                            if let Some(block) =
                                child.children.iter().find(|c| c.raw_kind == "block")
                            {
                                for inner in &block.children {
                                    self.walk_statement(tree, b, inner, state, ctx.as_deref_mut());
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
            SyntaxKind::WithStmt => self.handle_with(tree, b, stmt, state, ctx.as_deref_mut()),
            SyntaxKind::ReturnStmt => {
                for child in &stmt.children {
                    self.walk_expression(tree, b, child, ctx.as_deref_mut());
                }
            }
            SyntaxKind::RaiseStmt => self.handle_raise(tree, b, stmt, ctx.as_deref_mut()),
            SyntaxKind::Other(raw) if raw == "decorated_definition" => {
                self.handle_decorated(tree, b, stmt, state, ctx.as_deref_mut())
            }
            _ => {
                // Statements with no IR contribution still get their
                // expressions scanned for calls.
                for child in &stmt.children {
                    self.walk_expression(tree, b, child, ctx.as_deref_mut());
                }
            }
        }
    }

    fn handle_decorated(
        &self,
        tree: &ParsedTree,
        b: &mut IrBuilder,
        stmt: &SyntaxNode,
        state: &mut ModuleState,
        ctx: Option<&mut FnCtx>,
    ) {
        let decorators: Vec<String> = stmt
            .children
            .iter()
            .filter(|c| c.kind == SyntaxKind::Decorator)
            .map(|d| decorator_name(tree, d))
            .collect();

        if let Some(def) = stmt.child_by_field("definition") {
            match def.kind {
                SyntaxKind::FunctionDef => {
                    self.handle_function(tree, b, def, state, &decorators, ctx)
                }
                SyntaxKind::ClassDef => self.handle_class(tree, b, def, state, &decorators),
                _ => {}
            }
        }
    }

    // ── Imports ─────────────────────────────────────────────────────────

    fn handle_import(&self, tree: &ParsedTree, b: &mut IrBuilder, stmt: &SyntaxNode) {
        let importer_id = b
            .scopes
            .parent_node_id()
            .unwrap_or_else(|| b.node_id(b.module_path()));

        if stmt.raw_kind == "import_statement" {
            // import a.b [as c]
            for child in &stmt.children.clone() {
                match child.raw_kind.as_str() {
                    "dotted_name" => {
                        let module = tree.text_of(child).to_string();
                        self.emit_import(b, &importer_id, &module, None, child.span);
                    }
                    "aliased_import" => {
                        let module = child
                            .child_by_field("name")
                            .map(|n| tree.text_of(n).to_string())
                            .unwrap_or_default();
                        let alias = child
                            .child_by_field("alias")
                            .map(|n| tree.text_of(n).to_string());
                        self.emit_import(b, &importer_id, &module, alias, child.span);
                    }
                    _ => {}
                }
            }
        } else {
            // from a.b import x [as y], z
            let module = stmt
                .child_by_field("module_name")
                .map(|n| tree.text_of(n).to_string())
                .unwrap_or_default();
            let mut seen_import_kw = false;
            for child in &stmt.children.clone() {
                if child.raw_kind == "import" {
                    seen_import_kw = true;
                    continue;
                }
                if !seen_import_kw {
                    continue;
                }
                match child.raw_kind.as_str() {
                    "dotted_name" => {
                        let name = tree.text_of(child).to_string();
                        let fqn = join_module(&module, &name);
                        self.emit_import(b, &importer_id, &fqn, Some(name), child.span);
                    }
                    "aliased_import" => {
                        let name = child
                            .child_by_field("name")
                            .map(|n| tree.text_of(n).to_string())
                            .unwrap_or_default();
                        let alias = child
                            .child_by_field("alias")
                            .map(|n| tree.text_of(n).to_string());
                        let fqn = join_module(&module, &name);
                        self.emit_import(b, &importer_id, &fqn, alias.or(Some(name)), child.span);
                    }
                    "wildcard_import" => {
                        self.emit_import(b, &importer_id, &module, None, child.span);
                    }
                    _ => {}
                }
            }
        }
    }

    /// Create an Import node plus the IMPORTS edge, and register the local
    /// alias in the current scope.
    fn emit_import(
        &self,
        b: &mut IrBuilder,
        importer_id: &str,
        imported_fqn: &str,
        alias: Option<String>,
        span: Span,
    ) {
        if imported_fqn.is_empty() {
            return;
        }
        let local_name = alias
            .clone()
            .unwrap_or_else(|| imported_fqn.split('.').next_back().unwrap_or(imported_fqn).to_string());
        b.scopes.define_alias(&local_name, imported_fqn);

        let import_node_id = format!("{}:import:{}", b.node_id(b.module_path()), imported_fqn);
        if !b.has_node(&import_node_id) {
            let node = crate::shared::models::Node::new(
                import_node_id.clone(),
                NodeKind::Import,
                imported_fqn.to_string(),
                b.file_path().to_string(),
                span,
            )
            .with_language("python")
            .with_name(local_name.clone());
            b.push_node(node);
        }

        let mut attrs = BTreeMap::new();
        if let Some(alias) = alias {
            attrs.insert("alias".to_string(), serde_json::json!(alias));
        }
        b.add_edge_with_attrs(EdgeKind::Imports, importer_id, imported_fqn, Some(span), attrs);
    }

    // ── Functions ───────────────────────────────────────────────────────

    fn handle_function(
        &self,
        tree: &ParsedTree,
        b: &mut IrBuilder,
        def: &SyntaxNode,
        state: &mut ModuleState,
        decorators: &[String],
        _enclosing: Option<&mut FnCtx>,
    ) {
        let name = match def.child_by_field("name") {
            Some(n) => tree.text_of(n).to_string(),
            None => {
                b.push_diagnostic(
                    Diagnostic::warning(
                        "ir_generation",
                        b.file_path().to_string(),
                        "function definition without a name",
                    )
                    .with_span(def.span),
                );
                return;
            }
        };

        let in_class = b.scopes.in_class_body();
        let kind = if in_class {
            NodeKind::Method
        } else {
            NodeKind::Function
        };
        let class_fqn = in_class.then(|| b.scopes.fqn());

        let body = def.child_by_field("body");
        let body_span = body.map(|n| n.span);
        let source_text = tree.text_of(def);
        let fn_id = b.create_definition(kind, &name, def.span, body_span, source_text);

        if let Some(class_fqn) = &class_fqn {
            state
                .class_members
                .entry(class_fqn.clone())
                .or_default()
                .insert(name.clone(), fn_id.clone());
        }

        if let Some(node) = b.node_mut(&fn_id) {
            node.docstring = body.and_then(|body| block_docstring(tree, body));
        }

        let is_async = def.children.iter().any(|c| c.raw_kind == "async");
        let is_static = decorators.iter().any(|d| d == "staticmethod");

        // Decorator edges
        for decorator in decorators {
            let deco_id = self.resolve_symbol(b, decorator);
            b.add_edge(EdgeKind::Decorates, &deco_id, &fn_id, Some(def.span));
        }

        // Function scope with parameters
        b.scopes.push(ScopeKind::Function, name.clone());
        if let Some(frame) = b.scopes.current_mut() {
            frame.node_id = Some(fn_id.clone());
        }

        let mut ctx = FnCtx {
            function_id: fn_id.clone(),
            class_fqn,
            ..Default::default()
        };

        let mut param_type_ids = Vec::new();
        let mut param_count = 0usize;
        if let Some(params) = def.child_by_field("parameters") {
            for param in &params.children.clone() {
                if let Some((pname, annotation)) = parameter_parts(tree, param) {
                    if IMPLICIT_PARAMS.contains(&pname.as_str()) {
                        continue;
                    }
                    param_count += 1;
                    let var_id = b.create_definition(
                        NodeKind::Variable,
                        &pname,
                        param.span,
                        None,
                        tree.text_of(param),
                    );
                    if let Some(raw) = &annotation {
                        let type_id = b.resolve_type(raw);
                        param_type_ids.extend(type_id.clone());
                        if let Some(type_id) = type_id {
                            if let Some(node) = b.node_mut(&var_id) {
                                node.declared_type_id = Some(type_id.clone());
                            }
                            self.emit_type_reference(b, &var_id, &type_id, param.span);
                        }
                        ctx.declared.insert(pname.clone(), Type::parse(raw));
                    }
                }
            }
        }

        let return_type_id = def
            .child_by_field("return_type")
            .and_then(|n| b.resolve_type(tree.text_of(n)));

        let raw_signature = signature_text(tree, def);
        b.attach_signature(
            &fn_id,
            &name,
            &raw_signature,
            param_type_ids,
            return_type_id,
            is_async,
            is_static,
        );

        // Cyclomatic complexity and parameter arity
        let complexity = body.map(cyclomatic_complexity).unwrap_or(1);
        if let Some(node) = b.node_mut(&fn_id) {
            let attrs = node.attrs.get_or_insert_with(BTreeMap::new);
            attrs.insert("complexity".to_string(), serde_json::json!(complexity));
            attrs.insert("param_count".to_string(), serde_json::json!(param_count));
        }

        // Walk the body
        if let Some(body) = body {
            let body_children: Vec<SyntaxNode> = body.children.clone();
            for stmt in &body_children {
                self.walk_statement(tree, b, stmt, state, Some(&mut ctx));
            }
        }

        b.scopes.pop();
    }

    // ── Classes ─────────────────────────────────────────────────────────

    fn handle_class(
        &self,
        tree: &ParsedTree,
        b: &mut IrBuilder,
        def: &SyntaxNode,
        state: &mut ModuleState,
        decorators: &[String],
    ) {
        let name = match def.child_by_field("name") {
            Some(n) => tree.text_of(n).to_string(),
            None => return,
        };

        let body = def.child_by_field("body");
        let class_id = b.create_definition(
            NodeKind::Class,
            &name,
            def.span,
            body.map(|n| n.span),
            tree.text_of(def),
        );
        let class_fqn = b.scopes.fqn_with(&name);

        if let Some(node) = b.node_mut(&class_id) {
            node.docstring = body.and_then(|body| block_docstring(tree, body));
        }

        for decorator in decorators {
            let deco_id = self.resolve_symbol(b, decorator);
            b.add_edge(EdgeKind::Decorates, &deco_id, &class_id, Some(def.span));
        }

        // Bases → INHERITS edges
        let mut base_ids = Vec::new();
        if let Some(supers) = def.child_by_field("superclasses") {
            for base in &supers.children.clone() {
                if matches!(base.kind, SyntaxKind::NameExpr | SyntaxKind::AttributeExpr) {
                    let base_name = tree.text_of(base).to_string();
                    let base_id = self.resolve_symbol(b, &base_name);
                    b.add_edge(EdgeKind::Inherits, &class_id, &base_id, Some(base.span));
                    base_ids.push(base_id);
                }
            }
        }
        state.class_bases.insert(class_fqn.clone(), base_ids);

        // Class scope; pre-register members for forward references
        b.scopes.push(ScopeKind::Class, name);
        if let Some(frame) = b.scopes.current_mut() {
            frame.node_id = Some(class_id.clone());
        }
        if let Some(body) = body {
            self.pre_register(tree, b, body);
            for member_stmt in &body.children.clone() {
                match &member_stmt.kind {
                    SyntaxKind::ExpressionStmt => {
                        // Class-level assignment → Field
                        for child in &member_stmt.children.clone() {
                            if child.kind == SyntaxKind::AssignmentStmt {
                                self.handle_class_field(tree, b, child, state, &class_fqn);
                            }
                        }
                    }
                    _ => self.walk_statement(tree, b, member_stmt, state, None),
                }
            }
        }
        b.scopes.pop();
    }

    fn handle_class_field(
        &self,
        tree: &ParsedTree,
        b: &mut IrBuilder,
        assignment: &SyntaxNode,
        state: &mut ModuleState,
        class_fqn: &str,
    ) {
        if let Some(left) = assignment.child_by_field("left") {
            if left.kind == SyntaxKind::NameExpr {
                let fname = tree.text_of(left).to_string();
                let field_id = b.create_definition(
                    NodeKind::Field,
                    &fname,
                    assignment.span,
                    None,
                    tree.text_of(assignment),
                );
                if let Some(type_node) = assignment.child_by_field("type") {
                    if let Some(type_id) = b.resolve_type(tree.text_of(type_node)) {
                        if let Some(node) = b.node_mut(&field_id) {
                            node.declared_type_id = Some(type_id);
                        }
                    }
                }
                state
                    .class_members
                    .entry(class_fqn.to_string())
                    .or_default()
                    .insert(fname, field_id);
            }
        }
        if let Some(right) = assignment.child_by_field("right") {
            self.walk_expression(tree, b, right, None);
        }
    }

    /// OVERRIDES edges: a method whose name also exists on an in-file base
    fn emit_overrides(&self, b: &mut IrBuilder, state: &ModuleState) {
        let mut edges = Vec::new();
        for (class_fqn, bases) in &state.class_bases {
            let members = match state.class_members.get(class_fqn) {
                Some(m) => m,
                None => continue,
            };
            for base_id in bases {
                // Base fqn from the deterministic id scheme
                let base_fqn = base_id.rsplit(':').next().unwrap_or_default().to_string();
                if let Some(base_members) = state.class_members.get(&base_fqn) {
                    for (name, method_id) in members {
                        if let Some(base_method_id) = base_members.get(name) {
                            edges.push((method_id.clone(), base_method_id.clone()));
                        }
                    }
                }
            }
        }
        for (method_id, base_method_id) in edges {
            b.add_edge(EdgeKind::Overrides, &method_id, &base_method_id, None);
        }
    }

    // ── Statements inside bodies ────────────────────────────────────────

    fn handle_assignment(
        &self,
        tree: &ParsedTree,
        b: &mut IrBuilder,
        assignment: &SyntaxNode,
        mut ctx: Option<&mut FnCtx>,
    ) {
        if let Some(left) = assignment.child_by_field("left") {
            if left.kind == SyntaxKind::NameExpr {
                let name = tree.text_of(left).to_string();
                // First sight of this name in scope creates the Variable node
                if b.scopes.resolve(&name).is_none() {
                    let var_id = b.create_definition(
                        NodeKind::Variable,
                        &name,
                        assignment.span,
                        None,
                        tree.text_of(assignment),
                    );
                    if let Some(scope_id) = b.scopes.parent_node_id() {
                        if scope_id != var_id {
                            b.add_edge(EdgeKind::Defines, &scope_id, &var_id, Some(assignment.span));
                        }
                    }
                }
                if let Some(type_node) = assignment.child_by_field("type") {
                    let raw = tree.text_of(type_node).to_string();
                    if let Some(ctx) = ctx.as_deref_mut() {
                        ctx.declared.insert(name.clone(), Type::parse(&raw));
                    }
                    b.resolve_type(&raw);
                }
                // Constant tracking: a name is constant while its only
                // assignments are literals.
                if let Some(ctx) = ctx.as_deref_mut() {
                    let value = assignment
                        .child_by_field("right")
                        .and_then(|r| literal_value(tree, r));
                    match ctx.consts.get(&name) {
                        None => {
                            ctx.consts.insert(name.clone(), value);
                        }
                        Some(_) => {
                            ctx.consts.insert(name.clone(), None);
                        }
                    }
                }
            }
        }
        if let Some(right) = assignment.child_by_field("right") {
            self.walk_expression(tree, b, right, ctx);
        }
    }

    fn handle_if(
        &self,
        tree: &ParsedTree,
        b: &mut IrBuilder,
        stmt: &SyntaxNode,
        state: &mut ModuleState,
        mut ctx: Option<&mut FnCtx>,
    ) {
        let condition = stmt.child_by_field("condition");
        if let Some(cond) = condition {
            self.walk_expression(tree, b, cond, ctx.as_deref_mut());
        }

        let narrowing = condition.and_then(|c| extract_narrowing(tree, c));

        // Branch entry states derive from the pre-branch state; the
        // declared type is seeded so the false branch has something to
        // subtract from.
        let base = ctx.as_deref().map(|c| {
            let mut base = c.narrowed.clone();
            if let Some(cond) = &narrowing {
                if base.get(cond.var()).is_none() {
                    if let Some(declared) = c.declared.get(cond.var()) {
                        base.set(cond.var(), declared.clone());
                    }
                }
            }
            base
        });

        let mut exit_states: Vec<TypeState> = Vec::new();

        // Then branch, under the true-branch narrowing
        if let Some(consequence) = stmt.child_by_field("consequence") {
            if let Some(exit) = self.walk_branch(
                tree,
                b,
                consequence,
                state,
                ctx.as_deref_mut(),
                base.as_ref(),
                &narrowing,
                true,
            ) {
                exit_states.push(exit);
            }
        }

        let mut has_else = false;
        for child in &stmt.children.clone() {
            match child.raw_kind.as_str() {
                "elif_clause" => {
                    if let Some(cond) = child.child_by_field("condition") {
                        self.walk_expression(tree, b, cond, ctx.as_deref_mut());
                    }
                    if let Some(consequence) = child.child_by_field("consequence") {
                        let elif_narrowing = child
                            .child_by_field("condition")
                            .and_then(|c| extract_narrowing(tree, c));
                        if let Some(exit) = self.walk_branch(
                            tree,
                            b,
                            consequence,
                            state,
                            ctx.as_deref_mut(),
                            base.as_ref(),
                            &elif_narrowing,
                            true,
                        ) {
                            exit_states.push(exit);
                        }
                    }
                }
                "else_clause" => {
                    has_else = true;
                    if let Some(body) = child.children.iter().find(|c| c.raw_kind == "block") {
                        if let Some(exit) = self.walk_branch(
                            tree,
                            b,
                            body,
                            state,
                            ctx.as_deref_mut(),
                            base.as_ref(),
                            &narrowing,
                            false,
                        ) {
                            exit_states.push(exit);
                        }
                    }
                }
                _ => {}
            }
        }

        // Join point: the post-branch state is the union of predecessor
        // states, variable by variable. Without an else, the fall-through
        // path (condition false) is a predecessor too.
        if let Some(ctx) = ctx.as_deref_mut() {
            if !has_else {
                let fall_through = match (&narrowing, &base) {
                    (Some(cond), Some(base)) => base.apply(cond, false),
                    (None, Some(base)) => base.clone(),
                    _ => TypeState::new(),
                };
                exit_states.push(fall_through);
            }
            ctx.narrowed = TypeState::join(&exit_states);
        }
    }

    /// Walk a branch body under its entry state (the base state refined by
    /// the branch's narrowing). Returns the branch's exit state so the
    /// caller can join it with the other predecessors.
    #[allow(clippy::too_many_arguments)]
    fn walk_branch(
        &self,
        tree: &ParsedTree,
        b: &mut IrBuilder,
        body: &SyntaxNode,
        state: &mut ModuleState,
        mut ctx: Option<&mut FnCtx>,
        base: Option<&TypeState>,
        narrowing: &Option<NarrowingCondition>,
        true_branch: bool,
    ) -> Option<TypeState> {
        if let (Some(ctx), Some(base)) = (ctx.as_deref_mut(), base) {
            ctx.narrowed = match narrowing {
                Some(cond) => base.apply(cond, true_branch),
                None => base.clone(),
            };
        }

        let body_children: Vec<SyntaxNode> = body.children.clone();
        for stmt in &body_children {
            self.walk_statement(tree, b, stmt, state, ctx.as_deref_mut());
        }

        ctx.as_deref().map(|c| c.narrowed.clone())
    }

    fn handle_with(
        &self,
        tree: &ParsedTree,
        b: &mut IrBuilder,
        stmt: &SyntaxNode,
        state: &mut ModuleState,
        mut ctx: Option<&mut FnCtx>,
    ) {
        let caller_id = self.caller_id(b, ctx.as_deref());
        if let Some(clause) = stmt.children.iter().find(|c| c.raw_kind == "with_clause") {
            for item in clause.children.iter().filter(|c| c.raw_kind == "with_item") {
                // The managed resource is USES-linked to the enclosing scope
                let value = item.child_by_field("value").or_else(|| item.children.first());
                if let Some(value) = value {
                    let resource_expr = match value.raw_kind.as_str() {
                        "as_pattern" => value.children.first(),
                        _ => Some(value),
                    };
                    if let Some(expr) = resource_expr {
                        let raw = tree.text_of(expr);
                        let resource_raw = raw.split('(').next().unwrap_or(raw).trim();
                        if !resource_raw.is_empty() {
                            let target = self.resolve_symbol(b, resource_raw);
                            b.add_edge(EdgeKind::Uses, &caller_id, &target, Some(item.span));
                        }
                        self.walk_expression(tree, b, expr, ctx.as_deref_mut());
                    }
                }
            }
        }
        if let Some(body) = stmt.child_by_field("body") {
            let body_children: Vec<SyntaxNode> = body.children.clone();
            for inner in &body_children {
                self.walk_statement(tree, b, inner, state, ctx.as_deref_mut());
            }
        }
    }

    fn handle_raise(
        &self,
        tree: &ParsedTree,
        b: &mut IrBuilder,
        stmt: &SyntaxNode,
        mut ctx: Option<&mut FnCtx>,
    ) {
        let caller_id = self.caller_id(b, ctx.as_deref());
        for child in &stmt.children {
            let raised = match &child.kind {
                SyntaxKind::CallExpr => child.child_by_field("function"),
                SyntaxKind::NameExpr | SyntaxKind::AttributeExpr => Some(child),
                _ => None,
            };
            if let Some(raised) = raised {
                let name = tree.text_of(raised).to_string();
                let target = self.resolve_symbol(b, &name);
                b.add_edge(EdgeKind::Throws, &caller_id, &target, Some(stmt.span));
            }
            self.walk_expression(tree, b, child, ctx.as_deref_mut());
        }
    }

    // ── Expressions and calls ───────────────────────────────────────────

    fn walk_expression(
        &self,
        tree: &ParsedTree,
        b: &mut IrBuilder,
        expr: &SyntaxNode,
        mut ctx: Option<&mut FnCtx>,
    ) {
        match &expr.kind {
            SyntaxKind::CallExpr => self.handle_call(tree, b, expr, ctx),
            SyntaxKind::LambdaDef => {
                let ordinal = b.next_lambda_ordinal();
                let name = format!("<lambda#{}>", ordinal);
                b.create_definition(NodeKind::Lambda, &name, expr.span, None, tree.text_of(expr));
                if let Some(body) = expr.child_by_field("body") {
                    self.walk_expression(tree, b, body, ctx);
                }
            }
            _ => {
                for child in &expr.children.clone() {
                    self.walk_expression(tree, b, child, ctx.as_deref_mut());
                }
            }
        }
    }

    fn handle_call(
        &self,
        tree: &ParsedTree,
        b: &mut IrBuilder,
        call: &SyntaxNode,
        mut ctx: Option<&mut FnCtx>,
    ) {
        let caller_id = self.caller_id(b, ctx.as_deref());

        if let Some(function) = call.child_by_field("function") {
            let (target_id, is_instantiation) =
                self.resolve_callee(tree, b, function, ctx.as_deref());

            let mut attrs = BTreeMap::new();
            if let Some(args) = call.child_by_field("arguments") {
                attrs.insert(
                    "arg_count".to_string(),
                    serde_json::json!(count_arguments(args)),
                );
                let const_args = constant_arguments(tree, args, ctx.as_deref());
                if !const_args.is_empty() {
                    attrs.insert("const_args".to_string(), serde_json::json!(const_args));
                }
            }

            let kind = if is_instantiation {
                EdgeKind::Instantiates
            } else {
                EdgeKind::Calls
            };
            if attrs.is_empty() {
                b.add_edge(kind, &caller_id, &target_id, Some(call.span));
            } else {
                b.add_edge_with_attrs(kind, &caller_id, &target_id, Some(call.span), attrs);
            }
        }

        // Nested calls in arguments
        if let Some(args) = call.child_by_field("arguments") {
            for arg in &args.children.clone() {
                self.walk_expression(tree, b, arg, ctx.as_deref_mut());
            }
        }
    }

    /// Call resolution ladder. Returns (target id or fqn, is_instantiation).
    fn resolve_callee(
        &self,
        tree: &ParsedTree,
        b: &mut IrBuilder,
        function: &SyntaxNode,
        ctx: Option<&FnCtx>,
    ) -> (String, bool) {
        match &function.kind {
            SyntaxKind::NameExpr => {
                let name = tree.text_of(function).to_string();
                // 1. bare name against the scope stack
                if let Some(node_id) = b.scopes.resolve(&name).map(str::to_string) {
                    let is_class = b
                        .node_mut(&node_id)
                        .map(|n| n.kind == NodeKind::Class)
                        .unwrap_or(false);
                    return (node_id, is_class);
                }
                // 3. imported alias → canonical fqn (rewritten cross-file)
                if let Some(fqn) = b.scopes.resolve_alias(&name).map(str::to_string) {
                    return (fqn, false);
                }
                // 4. unresolved → external function
                (b.ensure_external(NodeKind::ExternalFunction, &name), false)
            }
            SyntaxKind::AttributeExpr => {
                let object = function.child_by_field("object");
                let attribute = function
                    .child_by_field("attribute")
                    .map(|n| tree.text_of(n).to_string())
                    .unwrap_or_default();

                if let Some(object) = object {
                    if object.kind == SyntaxKind::NameExpr {
                        let receiver = tree.text_of(object).to_string();

                        // self.m() → member on the enclosing class; the
                        // class scope frame carries pre-registered members,
                        // so forward references inside the class resolve.
                        // Inherited members fall back to an external.
                        if receiver == "self" || receiver == "cls" {
                            if let Some(class_fqn) = ctx.and_then(|c| c.class_fqn.clone()) {
                                if let Some(node_id) =
                                    b.scopes.resolve(&attribute).map(str::to_string)
                                {
                                    return (node_id, false);
                                }
                                let raw = format!("{}.{}", class_fqn, attribute);
                                return (
                                    b.ensure_external(NodeKind::ExternalFunction, &raw),
                                    false,
                                );
                            }
                        }

                        // 2. receiver with a known (possibly narrowed) type
                        if let Some(ty) = ctx.and_then(|c| c.effective_type(&receiver)) {
                            if let crate::features::type_resolution::TypeKind::Named(type_name) =
                                &ty.kind
                            {
                                let type_name = type_name.clone();
                                if let Some(class_id) =
                                    b.scopes.resolve(&type_name).map(str::to_string)
                                {
                                    let class_fqn = class_id
                                        .rsplit(':')
                                        .next()
                                        .unwrap_or(type_name.as_str())
                                        .to_string();
                                    let method_id =
                                        b.node_id(&format!("{}.{}", class_fqn, attribute));
                                    if b.has_node(&method_id) {
                                        return (method_id, false);
                                    }
                                }
                                let raw = format!("{}.{}", type_name, attribute);
                                return (
                                    b.ensure_external(NodeKind::ExternalFunction, &raw),
                                    false,
                                );
                            }
                        }

                        // 3. receiver is an import alias
                        if let Some(fqn) = b.scopes.resolve_alias(&receiver).map(str::to_string) {
                            return (format!("{}.{}", fqn, attribute), false);
                        }
                    }
                }

                // 4. opaque receiver → external with the raw reference
                let raw = tree.text_of(function).to_string();
                (b.ensure_external(NodeKind::ExternalFunction, &raw), false)
            }
            _ => {
                let raw = tree.text_of(function).to_string();
                (b.ensure_external(NodeKind::ExternalFunction, &raw), false)
            }
        }
    }

    /// Resolve a plain symbol reference (decorator, base class, raised
    /// exception): scope → alias → external symbol.
    fn resolve_symbol(&self, b: &mut IrBuilder, name: &str) -> String {
        if let Some(node_id) = b.scopes.resolve(name).map(str::to_string) {
            return node_id;
        }
        if let Some(fqn) = b.scopes.resolve_alias(name).map(str::to_string) {
            return fqn;
        }
        b.ensure_external(NodeKind::ExternalSymbol, name)
    }

    fn caller_id(&self, b: &IrBuilder, ctx: Option<&FnCtx>) -> String {
        ctx.map(|c| c.function_id.clone())
            .or_else(|| b.scopes.parent_node_id())
            .unwrap_or_else(|| b.node_id(b.module_path()))
    }

    fn emit_type_reference(&self, b: &mut IrBuilder, owner_id: &str, type_id: &str, span: Span) {
        let target = b.type_target(type_id).map(str::to_string);
        if let Some(target) = target {
            b.add_edge(EdgeKind::References, owner_id, &target, Some(span));
        }
    }
}

// ── Free helpers ────────────────────────────────────────────────────────

fn definition_of(stmt: &SyntaxNode) -> Option<&SyntaxNode> {
    match &stmt.kind {
        SyntaxKind::FunctionDef | SyntaxKind::ClassDef => Some(stmt),
        SyntaxKind::Other(raw) if raw == "decorated_definition" => stmt.child_by_field("definition"),
        _ => None,
    }
}

/// `src/pkg/mod.py` → `pkg.mod`; `pkg/__init__.py` → `pkg`
pub fn module_path_from(file_path: &str) -> String {
    let without_ext = file_path.trim_end_matches(".py").trim_end_matches(".pyi");
    let without_src = without_ext.strip_prefix("src/").unwrap_or(without_ext);
    let without_init = without_src
        .strip_suffix("/__init__")
        .unwrap_or(without_src);
    without_init.replace('/', ".")
}

fn is_test_path(file_path: &str) -> bool {
    let name = file_path.rsplit('/').next().unwrap_or(file_path);
    file_path.starts_with("tests/")
        || file_path.contains("/tests/")
        || name.starts_with("test_")
        || name.ends_with("_test.py")
        || name == "conftest.py"
}

fn has_test_imports(tree: &ParsedTree) -> bool {
    tree.root
        .children
        .iter()
        .filter(|c| c.kind == SyntaxKind::ImportDecl)
        .any(|imp| {
            let text = tree.text_of(imp);
            TEST_IMPORT_HINTS.iter().any(|hint| text.contains(hint))
        })
}

/// Docstring of a block: a leading expression statement holding a string
fn block_docstring(tree: &ParsedTree, block: &SyntaxNode) -> Option<String> {
    let first = block.children.first()?;
    if first.kind != SyntaxKind::ExpressionStmt {
        return None;
    }
    let string = first.children.first()?;
    if string.raw_kind != "string" {
        return None;
    }
    let raw = tree.text_of(string);
    Some(
        raw.trim_matches(|c| c == '"' || c == '\'')
            .trim()
            .to_string(),
    )
}

fn decorator_name(tree: &ParsedTree, decorator: &SyntaxNode) -> String {
    let inner = decorator
        .children
        .iter()
        .find(|c| {
            matches!(
                c.kind,
                SyntaxKind::NameExpr | SyntaxKind::AttributeExpr | SyntaxKind::CallExpr
            )
        });
    match inner {
        Some(node) if node.kind == SyntaxKind::CallExpr => node
            .child_by_field("function")
            .map(|f| tree.text_of(f).to_string())
            .unwrap_or_default(),
        Some(node) => tree.text_of(node).to_string(),
        None => tree.text_of(decorator).trim_start_matches('@').to_string(),
    }
}

/// (name, annotation) of one parameter node
fn parameter_parts(tree: &ParsedTree, param: &SyntaxNode) -> Option<(String, Option<String>)> {
    match &param.kind {
        SyntaxKind::NameExpr => Some((tree.text_of(param).to_string(), None)),
        SyntaxKind::ParameterDecl => {
            let name = param
                .child_by_field("name")
                .or_else(|| param.first_of_kind(&SyntaxKind::NameExpr))
                .map(|n| tree.text_of(n).to_string())?;
            let annotation = param
                .child_by_field("type")
                .map(|n| tree.text_of(n).to_string());
            Some((name, annotation))
        }
        SyntaxKind::Other(raw) if raw == "list_splat_pattern" || raw == "dictionary_splat_pattern" => {
            param
                .first_of_kind(&SyntaxKind::NameExpr)
                .map(|n| (tree.text_of(n).to_string(), None))
        }
        _ => None,
    }
}

/// Signature text: everything before the body block, trailing colon
/// stripped (annotations contain colons, so splitting on `:` is wrong)
fn signature_text(tree: &ParsedTree, def: &SyntaxNode) -> String {
    let full = tree.text_of(def);
    match def.child_by_field("body") {
        Some(body) if body.start_byte >= def.start_byte => {
            let head_len = (body.start_byte - def.start_byte).min(full.len());
            full[..head_len]
                .trim_end()
                .trim_end_matches(':')
                .trim_end()
                .to_string()
        }
        _ => full.lines().next().unwrap_or(full).trim().to_string(),
    }
}

/// Cyclomatic complexity: 1 + branches + loops + handlers + boolean ops.
/// Nested defs and lambdas have their own CFG and complexity, so their
/// whole subtrees are skipped rather than counted into the enclosing
/// function.
fn cyclomatic_complexity(body: &SyntaxNode) -> u32 {
    let mut complexity = 1u32;
    let mut stack: Vec<&SyntaxNode> = body.children.iter().collect();
    while let Some(node) = stack.pop() {
        match node.raw_kind.as_str() {
            "function_definition" | "lambda" => continue,
            "if_statement" | "elif_clause" | "conditional_expression" => complexity += 1,
            "for_statement" | "while_statement" => complexity += 1,
            "except_clause" => complexity += 1,
            "boolean_operator" => complexity += 1,
            _ => {}
        }
        stack.extend(node.children.iter());
    }
    complexity
}

/// Literal value of an expression, when it is one of the tracked constant
/// forms (bool, int, string, None)
fn literal_value(tree: &ParsedTree, expr: &SyntaxNode) -> Option<serde_json::Value> {
    match expr.raw_kind.as_str() {
        "true" => Some(serde_json::json!(true)),
        "false" => Some(serde_json::json!(false)),
        "none" => Some(serde_json::Value::Null),
        "integer" => tree.text_of(expr).parse::<i64>().ok().map(|v| serde_json::json!(v)),
        "string" => Some(serde_json::json!(tree
            .text_of(expr)
            .trim_matches(|c| c == '"' || c == '\''))),
        _ => None,
    }
}

/// Number of real arguments at a call site (punctuation excluded)
fn count_arguments(args: &SyntaxNode) -> usize {
    args.children
        .iter()
        .filter(|c| !matches!(c.raw_kind.as_str(), "(" | ")" | ","))
        .count()
}

/// Constant arguments at a call site: literals, plus names whose only
/// defining writes in the caller are constants. Keyed by position or
/// keyword name.
fn constant_arguments(
    tree: &ParsedTree,
    args: &SyntaxNode,
    ctx: Option<&FnCtx>,
) -> BTreeMap<String, serde_json::Value> {
    let mut out = BTreeMap::new();
    let mut position = 0usize;
    for arg in &args.children {
        match arg.raw_kind.as_str() {
            "keyword_argument" => {
                let name = arg
                    .child_by_field("name")
                    .map(|n| tree.text_of(n).to_string())
                    .unwrap_or_default();
                if let Some(value) = arg.child_by_field("value").and_then(|v| literal_value(tree, v))
                {
                    out.insert(name, value);
                }
            }
            "(" | ")" | "," => {}
            _ => {
                if let Some(value) = literal_value(tree, arg) {
                    out.insert(position.to_string(), value);
                } else if arg.kind == SyntaxKind::NameExpr {
                    let name = tree.text_of(arg);
                    if let Some(Some(value)) = ctx.and_then(|c| c.consts.get(name)) {
                        out.insert(position.to_string(), value.clone());
                    }
                }
                position += 1;
            }
        }
    }
    out
}

/// Extract a narrowing condition from a branch condition expression
fn extract_narrowing(tree: &ParsedTree, condition: &SyntaxNode) -> Option<NarrowingCondition> {
    match &condition.kind {
        // isinstance(x, T) or a TypeGuard-style predicate
        SyntaxKind::CallExpr => {
            let function = condition.child_by_field("function")?;
            let fname = tree.text_of(function);
            let args = condition.child_by_field("arguments")?;
            let positional: Vec<&SyntaxNode> = args
                .children
                .iter()
                .filter(|c| !matches!(c.raw_kind.as_str(), "(" | ")" | ","))
                .collect();
            if fname == "isinstance" && positional.len() == 2 {
                let var = tree.text_of(positional[0]).to_string();
                let type_name = tree.text_of(positional[1]).to_string();
                return Some(NarrowingCondition::IsInstance { var, type_name });
            }
            None
        }
        // x is None / x is not None / x == None
        SyntaxKind::BinaryExpr if condition.raw_kind == "comparison_operator" => {
            let text = tree.text_of(condition);
            let first = condition.children.first()?;
            if first.kind != SyntaxKind::NameExpr {
                return None;
            }
            let var = tree.text_of(first).to_string();
            if text.contains("is not None") || text.contains("!= None") {
                Some(NarrowingCondition::IsNotNone { var })
            } else if text.contains("is None") || text.contains("== None") {
                Some(NarrowingCondition::IsNone { var })
            } else {
                None
            }
        }
        // truthy `if x:`
        SyntaxKind::NameExpr => Some(NarrowingCondition::Truthy {
            var: tree.text_of(condition).to_string(),
        }),
        _ => None,
    }
}

fn join_module(module: &str, name: &str) -> String {
    if module.is_empty() {
        name.to_string()
    } else if module.ends_with('.') {
        // `from . import x` → `.x`, keeping the relative-dot prefix intact
        format!("{}{}", module, name)
    } else {
        format!("{}.{}", module, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::parsing::{SourceParser, TreeSitterParser};

    fn generate(source: &str, path: &str) -> FileIr {
        let parser = TreeSitterParser::python();
        let tree = parser.parse(source, path).unwrap();
        PythonIrGenerator::new().generate(&tree, None).unwrap()
    }

    #[test]
    fn test_empty_file_has_only_file_node() {
        let ir = generate("", "src/empty.py");
        assert_eq!(ir.nodes.len(), 1);
        assert_eq!(ir.nodes[0].kind, NodeKind::File);
    }

    #[test]
    fn test_function_nodes_and_ids() {
        let ir = generate("def greet(name: str) -> str:\n    return name\n", "src/app.py");
        let func = ir.node_by_fqn("app.greet").expect("function node");
        assert_eq!(func.kind, NodeKind::Function);
        assert_eq!(func.id, "python:src/app.py:app.greet");
        assert!(func.content_hash.is_some());
        assert!(func.signature_id.is_some());

        let sig = ir.signature_for(&func.id).expect("signature");
        assert_eq!(sig.parameter_type_ids.len(), 1);
        assert!(sig.return_type_id.is_some());
    }

    #[test]
    fn test_method_skips_self_parameter() {
        let ir = generate(
            "class Greeter:\n    def greet(self, name):\n        return name\n",
            "src/app.py",
        );
        let method = ir.node_by_fqn("app.Greeter.greet").expect("method");
        assert_eq!(method.kind, NodeKind::Method);
        // self is skipped; only `name` becomes a Variable
        let params: Vec<_> = ir
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Variable)
            .collect();
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].name.as_deref(), Some("name"));
    }

    #[test]
    fn test_import_alias_and_edge() {
        let ir = generate("import numpy as np\n", "src/app.py");
        let import_edge = ir
            .edges
            .iter()
            .find(|e| e.kind == EdgeKind::Imports)
            .expect("imports edge");
        assert_eq!(import_edge.target_id, "numpy");
        assert_eq!(import_edge.alias(), Some("np"));
        assert!(ir.nodes.iter().any(|n| n.kind == NodeKind::Import));
    }

    #[test]
    fn test_from_import_canonical_fqn() {
        let ir = generate("from utils import helper\n", "src/app.py");
        let import_edge = ir
            .edges
            .iter()
            .find(|e| e.kind == EdgeKind::Imports)
            .unwrap();
        assert_eq!(import_edge.target_id, "utils.helper");
    }

    #[test]
    fn test_in_file_call_resolves_to_node_id() {
        let ir = generate(
            "def helper():\n    pass\n\ndef main():\n    helper()\n",
            "src/app.py",
        );
        let call = ir.edges.iter().find(|e| e.kind == EdgeKind::Calls).unwrap();
        assert_eq!(call.source_id, "python:src/app.py:app.main");
        assert_eq!(call.target_id, "python:src/app.py:app.helper");
    }

    #[test]
    fn test_forward_reference_resolves() {
        let ir = generate(
            "def main():\n    later()\n\ndef later():\n    pass\n",
            "src/app.py",
        );
        let call = ir.edges.iter().find(|e| e.kind == EdgeKind::Calls).unwrap();
        assert_eq!(call.target_id, "python:src/app.py:app.later");
    }

    #[test]
    fn test_unresolved_call_synthesizes_external() {
        let ir = generate("def main():\n    print('hi')\n", "src/app.py");
        let call = ir.edges.iter().find(|e| e.kind == EdgeKind::Calls).unwrap();
        assert_eq!(call.target_id, "python:external:print");
        let external = ir.nodes.iter().find(|n| n.id == call.target_id).unwrap();
        assert_eq!(external.kind, NodeKind::ExternalFunction);
    }

    #[test]
    fn test_aliased_attribute_call_uses_canonical_fqn() {
        let ir = generate("import numpy as np\n\ndef f():\n    np.array([])\n", "src/app.py");
        let call = ir.edges.iter().find(|e| e.kind == EdgeKind::Calls).unwrap();
        assert_eq!(call.target_id, "numpy.array");
    }

    #[test]
    fn test_instantiation_edge_for_local_class() {
        let ir = generate(
            "class Service:\n    pass\n\ndef make():\n    return Service()\n",
            "src/app.py",
        );
        let inst = ir
            .edges
            .iter()
            .find(|e| e.kind == EdgeKind::Instantiates)
            .expect("instantiates edge");
        assert_eq!(inst.target_id, "python:src/app.py:app.Service");
    }

    #[test]
    fn test_inherits_edges_not_node_fields() {
        let ir = generate(
            "class Base:\n    pass\n\nclass Child(Base):\n    pass\n",
            "src/app.py",
        );
        let inherits = ir
            .edges
            .iter()
            .find(|e| e.kind == EdgeKind::Inherits)
            .unwrap();
        assert_eq!(inherits.source_id, "python:src/app.py:app.Child");
        assert_eq!(inherits.target_id, "python:src/app.py:app.Base");
    }

    #[test]
    fn test_override_detection() {
        let ir = generate(
            "class Base:\n    def run(self):\n        pass\n\nclass Child(Base):\n    def run(self):\n        pass\n",
            "src/app.py",
        );
        let overrides = ir
            .edges
            .iter()
            .find(|e| e.kind == EdgeKind::Overrides)
            .expect("overrides edge");
        assert_eq!(overrides.source_id, "python:src/app.py:app.Child.run");
        assert_eq!(overrides.target_id, "python:src/app.py:app.Base.run");
    }

    #[test]
    fn test_narrowed_receiver_call() {
        // Scenario: isinstance narrowing routes the attribute call to str
        let source = "def process(x: int | str):\n    if isinstance(x, str):\n        x.upper()\n    else:\n        x + 1\n";
        let ir = generate(source, "src/app.py");
        let calls: Vec<_> = ir
            .edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Calls)
            .collect();
        assert!(calls
            .iter()
            .any(|e| e.target_id == "python:external:str.upper"));
        assert!(!calls
            .iter()
            .any(|e| e.target_id == "python:external:int.upper"));
    }

    #[test]
    fn test_branch_narrowing_joins_at_merge() {
        // Inside the branch x is str; after the merge the union is back,
        // so the trailing call must not resolve against str.
        let source = "def process(x: int | str):\n    if isinstance(x, str):\n        x.upper()\n    x.mystery()\n";
        let ir = generate(source, "src/app.py");
        let calls: Vec<_> = ir
            .edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Calls)
            .collect();
        assert!(calls
            .iter()
            .any(|e| e.target_id == "python:external:str.upper"));
        assert!(!calls
            .iter()
            .any(|e| e.target_id == "python:external:str.mystery"));
    }

    #[test]
    fn test_self_call_resolves_to_method() {
        let source = "class S:\n    def a(self):\n        self.b()\n    def b(self):\n        pass\n";
        let ir = generate(source, "src/app.py");
        let call = ir.edges.iter().find(|e| e.kind == EdgeKind::Calls).unwrap();
        assert_eq!(call.target_id, "python:src/app.py:app.S.b");
    }

    #[test]
    fn test_raise_emits_throws() {
        let ir = generate(
            "def f():\n    raise ValueError('bad')\n",
            "src/app.py",
        );
        let throws = ir.edges.iter().find(|e| e.kind == EdgeKind::Throws).unwrap();
        assert_eq!(throws.source_id, "python:src/app.py:app.f");
        assert_eq!(throws.target_id, "python:external:ValueError");
    }

    #[test]
    fn test_complexity_attribute() {
        let source = "def f(a, b):\n    if a and b:\n        return 1\n    for i in a:\n        pass\n    return 0\n";
        let ir = generate(source, "src/app.py");
        let func = ir.node_by_fqn("app.f").unwrap();
        // 1 + if + and + for = 4
        assert_eq!(func.attr("complexity"), Some(&serde_json::json!(4)));
    }

    #[test]
    fn test_complexity_ignores_nested_defs() {
        let source = "def outer():\n    def inner(a, b):\n        if a and b:\n            return 1\n        return 0\n    return inner\n";
        let ir = generate(source, "src/app.py");
        // inner's branches do not count into outer
        let outer = ir.node_by_fqn("app.outer").unwrap();
        assert_eq!(outer.attr("complexity"), Some(&serde_json::json!(1)));
        // 1 + if + and
        let inner = ir.node_by_fqn("app.outer.inner").unwrap();
        assert_eq!(inner.attr("complexity"), Some(&serde_json::json!(3)));
    }

    #[test]
    fn test_const_args_recorded_on_call_edge() {
        let source = "def f(flag):\n    pass\n\ndef main():\n    f(True)\n    f(False)\n";
        let ir = generate(source, "src/app.py");
        let calls: Vec<_> = ir
            .edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Calls)
            .collect();
        assert_eq!(calls.len(), 2);
        let const_args: Vec<_> = calls
            .iter()
            .filter_map(|e| e.attr("const_args"))
            .collect();
        assert_eq!(const_args.len(), 2);
        assert_ne!(const_args[0], const_args[1]);
    }

    #[test]
    fn test_const_propagated_variable() {
        let source = "def g(v):\n    pass\n\ndef main():\n    mode = 'fast'\n    g(mode)\n";
        let ir = generate(source, "src/app.py");
        let call = ir
            .edges
            .iter()
            .find(|e| e.kind == EdgeKind::Calls && e.attr("const_args").is_some())
            .expect("const-arg call");
        assert_eq!(
            call.attr("const_args"),
            Some(&serde_json::json!({"0": "fast"}))
        );
    }

    #[test]
    fn test_test_file_detection() {
        let ir = generate("def test_x():\n    pass\n", "tests/test_app.py");
        let file = ir.nodes.iter().find(|n| n.kind == NodeKind::File).unwrap();
        assert_eq!(file.is_test_file, Some(true));

        let ir2 = generate("import pytest\n", "src/helpers.py");
        let file2 = ir2.nodes.iter().find(|n| n.kind == NodeKind::File).unwrap();
        assert_eq!(file2.is_test_file, Some(true));

        let ir3 = generate("x = 1\n", "src/helpers.py");
        let file3 = ir3.nodes.iter().find(|n| n.kind == NodeKind::File).unwrap();
        assert_eq!(file3.is_test_file, Some(false));
    }

    #[test]
    fn test_docstrings_captured() {
        let source = "\"\"\"Module doc.\"\"\"\n\ndef f():\n    \"\"\"Fn doc.\"\"\"\n    pass\n";
        let ir = generate(source, "src/app.py");
        let file = ir.nodes.iter().find(|n| n.kind == NodeKind::File).unwrap();
        assert_eq!(file.docstring.as_deref(), Some("Module doc."));
        let func = ir.node_by_fqn("app.f").unwrap();
        assert_eq!(func.docstring.as_deref(), Some("Fn doc."));
    }

    #[test]
    fn test_malformed_code_produces_diagnostic_not_panic() {
        let ir = generate("def broken(:\n    pass\n\ndef ok():\n    pass\n", "src/app.py");
        assert!(!ir.diagnostics.is_empty());
        // The well-formed part is still generated
        assert!(ir.node_by_fqn("app.ok").is_some());
    }

    #[test]
    fn test_module_path_mapping() {
        assert_eq!(module_path_from("src/myapp/services/user.py"), "myapp.services.user");
        assert_eq!(module_path_from("myapp/models.py"), "myapp.models");
        assert_eq!(module_path_from("main.py"), "main");
        assert_eq!(module_path_from("pkg/__init__.py"), "pkg");
    }

    #[test]
    fn test_id_stability_across_regeneration() {
        let source = "def f():\n    pass\n";
        let a = generate(source, "src/app.py");
        let b = generate(source, "src/app.py");
        let ids_a: Vec<_> = a.nodes.iter().map(|n| &n.id).collect();
        let ids_b: Vec<_> = b.nodes.iter().map(|n| &n.id).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn test_body_edit_keeps_node_id() {
        let a = generate("def f():\n    return 1\n", "src/app.py");
        let b = generate("def f():\n    return 2\n", "src/app.py");
        let fa = a.node_by_fqn("app.f").unwrap();
        let fb = b.node_by_fqn("app.f").unwrap();
        assert_eq!(fa.id, fb.id);
        assert_ne!(fa.content_hash, fb.content_hash);
    }
}
