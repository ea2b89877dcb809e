//! Two-sweep static analysis over the AST.
//!
//! Sweep 1 records which names are reassigned (the emitter picks `const` vs
//! `var` from this). Sweep 2 infers a coarse type tag for every name and
//! derives per-function metadata: parameter types, return type and whether an
//! allocator must be threaded through (a fixed point over the call graph).

use std::collections::{BTreeMap, BTreeSet};

use crate::ast::{AssignTarget, BinaryOperator, Expression, Program, Statement, UnaryOperator};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Int,
    Float,
    Bool,
    Str,
    List,
    Dict,
    Tuple,
    PyObject,
    Instance(String),
    Void,
}

impl Type {
    /// Heap-typed values are reference counted and need scoped release.
    pub fn is_heap(&self) -> bool {
        matches!(
            self,
            Type::Str | Type::List | Type::Dict | Type::Tuple | Type::PyObject
        )
    }

    fn from_hint(hint: &str) -> Option<Type> {
        match hint {
            "int" => Some(Type::Int),
            "float" => Some(Type::Float),
            "bool" => Some(Type::Bool),
            "str" => Some(Type::Str),
            _ => None,
        }
    }
}

/// Name → tag map for one scope. A name is declared once; later assignments
/// are reassignments and never rebind the tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    pub types: BTreeMap<String, Type>,
    pub reassigned: BTreeSet<String>,
}

impl Scope {
    pub fn type_of(&self, name: &str) -> Option<&Type> {
        self.types.get(name)
    }

    pub fn is_reassigned(&self, name: &str) -> bool {
        self.reassigned.contains(name)
    }

    fn declare(&mut self, name: &str, ty: Type) {
        // Never weaken an existing tag.
        self.types.entry(name.to_string()).or_insert(ty);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub name: String,
    pub params: Vec<(String, Type)>,
    pub return_type: Type,
    pub needs_allocator: bool,
    pub is_async: bool,
}

impl FunctionInfo {
    /// Fallible iff the function may allocate or returns a runtime object.
    pub fn is_fallible(&self) -> bool {
        self.needs_allocator || self.return_type == Type::PyObject
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    pub name: String,
    pub params: Vec<String>,
    pub has_return: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub name: String,
    /// Instance fields in declaration order, from `self.<f> = ...` in
    /// `__init__`. All fields are i64 in the supported subset.
    pub fields: Vec<String>,
    pub init_params: Vec<String>,
    pub methods: Vec<MethodInfo>,
}

impl ClassInfo {
    pub fn has_methods(&self) -> bool {
        !self.methods.is_empty()
    }

    pub fn method(&self, name: &str) -> Option<&MethodInfo> {
        self.methods.iter().find(|m| m.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Analysis {
    pub module_scope: Scope,
    /// Function name (or `Class.method`) → local scope.
    pub scopes: BTreeMap<String, Scope>,
    pub functions: BTreeMap<String, FunctionInfo>,
    pub classes: BTreeMap<String, ClassInfo>,
    pub module_needs_allocator: bool,
}

impl Analysis {
    pub fn function(&self, name: &str) -> Option<&FunctionInfo> {
        self.functions.get(name)
    }

    pub fn class(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(name)
    }
}

pub fn analyze(program: &Program) -> Analysis {
    let mut analyzer = Analyzer::default();
    analyzer.run(program);
    analyzer.analysis
}

#[derive(Default)]
struct Analyzer {
    analysis: Analysis,
}

impl Analyzer {
    fn run(&mut self, program: &Program) {
        // Class shapes first so constructor calls resolve while functions
        // and module statements are swept.
        for statement in &program.statements {
            if let Statement::ClassDef { name, body, .. } = statement {
                let info = collect_class(name, body);
                self.analysis.classes.insert(name.clone(), info);
            }
        }

        for statement in &program.statements {
            match statement {
                Statement::FunctionDef {
                    name,
                    params,
                    returns,
                    body,
                    is_async,
                    ..
                } => {
                    self.analyze_function(name, params, returns.as_deref(), body, *is_async);
                }
                Statement::ClassDef { name, body, .. } => {
                    self.analyze_class_bodies(name, body);
                }
                _ => {}
            }
        }

        let mut module_scope = Scope::default();
        for statement in &program.statements {
            sweep_reassignments(statement, &mut module_scope);
        }
        module_scope.types.clear();
        for statement in &program.statements {
            self.sweep_types(statement, &mut module_scope);
        }
        self.analysis.module_scope = module_scope;

        self.propagate_allocator_need(program);
        self.analysis.module_needs_allocator = program
            .statements
            .iter()
            .filter(|s| !matches!(s, Statement::FunctionDef { .. } | Statement::ClassDef { .. }))
            .any(|s| statement_needs_allocator(&self.analysis, &self.analysis.module_scope, s));
    }

    fn analyze_class_bodies(&mut self, class_name: &str, body: &[Statement]) {
        for member in body {
            let Statement::FunctionDef {
                name,
                params,
                body: method_body,
                ..
            } = member
            else {
                continue;
            };
            let mut scope = Scope::default();
            for param in params {
                let ty = if param.name == "self" {
                    Type::Instance(class_name.to_string())
                } else {
                    // Instance fields and method arithmetic are i64-only.
                    Type::Int
                };
                scope.declare(&param.name, ty);
            }
            for statement in method_body {
                sweep_reassignments(statement, &mut scope);
            }
            let param_names: BTreeSet<String> = params.iter().map(|p| p.name.clone()).collect();
            for param in &param_names {
                scope.reassigned.remove(param);
            }
            // Sweep 1 declared placeholder tags; sweep 2 re-derives them.
            scope.types.retain(|name, _| param_names.contains(name));
            for statement in method_body {
                self.sweep_types(statement, &mut scope);
            }
            self.analysis
                .scopes
                .insert(format!("{class_name}.{name}"), scope);
        }
    }

    fn analyze_function(
        &mut self,
        name: &str,
        params: &[crate::ast::Param],
        returns: Option<&str>,
        body: &[Statement],
        is_async: bool,
    ) {
        let mut scope = Scope::default();
        let mut param_types = Vec::new();
        for param in params {
            let ty = param
                .hint
                .as_deref()
                .and_then(Type::from_hint)
                .unwrap_or_else(|| infer_param_type(&param.name, body));
            scope.declare(&param.name, ty.clone());
            param_types.push((param.name.clone(), ty));
        }

        for statement in body {
            sweep_reassignments(statement, &mut scope);
        }
        let param_names: BTreeSet<String> = param_types.iter().map(|(n, _)| n.clone()).collect();
        for param in &param_names {
            scope.reassigned.remove(param);
        }
        // Sweep 1 declared placeholder tags; sweep 2 re-derives them.
        scope.types.retain(|n, _| param_names.contains(n));

        for statement in body {
            self.sweep_types(statement, &mut scope);
        }

        let return_type = returns
            .and_then(|hint| match hint {
                "None" => Some(Type::Void),
                other => Type::from_hint(other).map(|ty| match ty {
                    Type::Int | Type::Bool => Type::Int,
                    _ => Type::PyObject,
                }),
            })
            .unwrap_or_else(|| infer_return_type(body, &scope));

        self.analysis.scopes.insert(name.to_string(), scope);
        self.analysis.functions.insert(
            name.to_string(),
            FunctionInfo {
                name: name.to_string(),
                params: param_types,
                return_type,
                needs_allocator: false, // settled by the fixed point below
                is_async,
            },
        );
    }

    fn sweep_types(&self, statement: &Statement, scope: &mut Scope) {
        match statement {
            Statement::Assign { target, value, .. } => match target {
                AssignTarget::Name(name) => {
                    let ty = infer_expr_type(&self.analysis, scope, value);
                    scope.declare(name, ty);
                }
                AssignTarget::Tuple(names) => {
                    // Element types are not tracked through tuples.
                    for name in names {
                        scope.declare(name, Type::PyObject);
                    }
                }
                AssignTarget::Attribute { .. } => {}
            },
            Statement::If {
                then_body,
                else_body,
                ..
            } => {
                for s in then_body.iter().chain(else_body) {
                    self.sweep_types(s, scope);
                }
            }
            Statement::While { body, .. } => {
                for s in body {
                    self.sweep_types(s, scope);
                }
            }
            Statement::For {
                target,
                iterable,
                body,
                ..
            } => {
                declare_loop_targets(target, iterable, scope);
                for s in body {
                    self.sweep_types(s, scope);
                }
            }
            _ => {}
        }
    }

    /// Seed with syntactic needs, then iterate the call graph until no flag
    /// changes. Unresolved callees never contribute.
    fn propagate_allocator_need(&mut self, program: &Program) {
        // A pyobject-returning function always carries the allocator: its
        // boxed results (and their release) need one on both sides.
        for info in self.analysis.functions.values_mut() {
            if info.return_type == Type::PyObject {
                info.needs_allocator = true;
            }
        }

        let mut bodies: BTreeMap<String, &[Statement]> = BTreeMap::new();
        for statement in &program.statements {
            if let Statement::FunctionDef { name, body, .. } = statement {
                bodies.insert(name.clone(), body);
            }
        }

        loop {
            let mut changed = false;
            for (name, body) in &bodies {
                if self
                    .analysis
                    .functions
                    .get(name)
                    .is_some_and(|f| f.needs_allocator)
                {
                    continue;
                }
                let scope = self.analysis.scopes.get(name).cloned().unwrap_or_default();
                let needs = body
                    .iter()
                    .any(|s| statement_needs_allocator(&self.analysis, &scope, s));
                if needs {
                    if let Some(info) = self.analysis.functions.get_mut(name) {
                        info.needs_allocator = true;
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }
    }
}

// -- sweep 1: reassignment detection --------------------------------------

fn sweep_reassignments(statement: &Statement, scope: &mut Scope) {
    match statement {
        Statement::Assign { target, .. } => match target {
            AssignTarget::Name(name) => {
                if scope.types.contains_key(name) {
                    scope.reassigned.insert(name.clone());
                } else {
                    scope.declare(name, Type::PyObject);
                }
            }
            AssignTarget::Tuple(names) => {
                for name in names {
                    if scope.types.contains_key(name) {
                        scope.reassigned.insert(name.clone());
                    } else {
                        scope.declare(name, Type::PyObject);
                    }
                }
            }
            AssignTarget::Attribute { .. } => {}
        },
        Statement::If {
            then_body,
            else_body,
            ..
        } => {
            for s in then_body.iter().chain(else_body) {
                sweep_reassignments(s, scope);
            }
        }
        Statement::While { body, .. } => {
            for s in body {
                sweep_reassignments(s, scope);
            }
        }
        Statement::For { target, body, .. } => {
            // Loop variables are rebound on every iteration.
            for name in &target.names {
                scope.declare(name, Type::PyObject);
                scope.reassigned.insert(name.clone());
            }
            for s in body {
                sweep_reassignments(s, scope);
            }
        }
        _ => {}
    }
}

fn declare_loop_targets(target: &crate::ast::ForTarget, iterable: &Expression, scope: &mut Scope) {
    let callee_name = match iterable {
        Expression::Call { callee, .. } => match callee.as_ref() {
            Expression::Identifier(name) => Some(name.as_str()),
            _ => None,
        },
        _ => None,
    };
    match callee_name {
        Some("range") => {
            for name in &target.names {
                scope.declare(name, Type::Int);
            }
        }
        Some("enumerate") => {
            if let Some(first) = target.names.first() {
                scope.declare(first, Type::Int);
            }
            for name in target.names.iter().skip(1) {
                scope.declare(name, Type::PyObject);
            }
        }
        _ => {
            for name in &target.names {
                scope.declare(name, Type::PyObject);
            }
        }
    }
}

// -- sweep 2: expression typing --------------------------------------------

/// Ordered inference rules for a right-hand-side expression. Also used by
/// the emitter to pick representations at every use site.
pub fn infer_expr_type(analysis: &Analysis, scope: &Scope, expr: &Expression) -> Type {
    match expr {
        // Rule 1: literals.
        Expression::Integer(_) => Type::Int,
        Expression::Float(_) => Type::Float,
        Expression::Boolean(_) => Type::Bool,
        Expression::String(_) => Type::Str,
        Expression::NoneLiteral => Type::PyObject,
        // Rule 2: collection literals.
        Expression::List(_) => Type::List,
        Expression::Dict(_) => Type::Dict,
        Expression::Tuple(_) => Type::Tuple,
        // Rule 3: copy the source name's tag.
        Expression::Identifier(name) => scope
            .type_of(name)
            .or_else(|| analysis.module_scope.type_of(name))
            .cloned()
            .unwrap_or(Type::PyObject),
        // Rule 4: Add chains containing a string are string concats; every
        // other binary operation is integer (or boolean) arithmetic.
        Expression::BinaryOp { op, .. } => {
            if *op == BinaryOperator::Add && expr_is_string_concat(analysis, scope, expr) {
                Type::Str
            } else if op.yields_bool() {
                Type::Bool
            } else {
                Type::Int
            }
        }
        Expression::UnaryOp { op, .. } => match op {
            UnaryOperator::Not => Type::Bool,
            _ => Type::Int,
        },
        Expression::Conditional { then_value, .. } => {
            infer_expr_type(analysis, scope, then_value)
        }
        // Rule 5: calls.
        Expression::Call { callee, .. } => match callee.as_ref() {
            Expression::Identifier(name) => {
                if analysis.classes.contains_key(name) {
                    Type::Instance(name.clone())
                } else if name == "len" {
                    Type::Int
                } else if let Some(info) = analysis.functions.get(name) {
                    match info.return_type {
                        Type::Int => Type::Int,
                        _ => Type::PyObject,
                    }
                } else {
                    Type::PyObject
                }
            }
            Expression::Attribute { object, name: method } => {
                // Calls on a class instance resolve through the class's
                // method table rather than the built-in one.
                if let Expression::Identifier(receiver) = object.as_ref() {
                    if let Some(Type::Instance(class_name)) = scope
                        .type_of(receiver)
                        .or_else(|| analysis.module_scope.type_of(receiver))
                    {
                        if let Some(class) = analysis.classes.get(class_name) {
                            return if class.method(method).is_some_and(|m| m.has_return) {
                                Type::Int
                            } else {
                                Type::PyObject
                            };
                        }
                    }
                }
                method_result_type(method)
            }
            _ => Type::PyObject,
        },
        // Rule 6: element types are not tracked.
        Expression::Subscript { .. } => Type::PyObject,
        // Rule 7: fallback.
        _ => Type::PyObject,
    }
}

/// An Add chain is a string concat when any operand in the chain is tagged
/// string. Nested Adds are searched on both sides, so `(1 + 2) + "x"` is
/// flagged.
pub fn expr_is_string_concat(analysis: &Analysis, scope: &Scope, expr: &Expression) -> bool {
    match expr {
        Expression::BinaryOp {
            left,
            op: BinaryOperator::Add,
            right,
        } => {
            expr_is_string_concat(analysis, scope, left)
                || expr_is_string_concat(analysis, scope, right)
        }
        Expression::String(_) => true,
        Expression::Identifier(name) => {
            matches!(
                scope
                    .type_of(name)
                    .or_else(|| analysis.module_scope.type_of(name)),
                Some(Type::Str)
            )
        }
        Expression::Call { callee, .. } => match callee.as_ref() {
            Expression::Attribute { name: method, .. } => method_result_type(method) == Type::Str,
            Expression::Identifier(name) => {
                matches!(
                    analysis.functions.get(name).map(|f| &f.return_type),
                    Some(Type::Str)
                )
            }
            _ => false,
        },
        _ => false,
    }
}

// -- allocator-need predicate ----------------------------------------------

pub fn statement_needs_allocator(
    analysis: &Analysis,
    scope: &Scope,
    statement: &Statement,
) -> bool {
    match statement {
        Statement::Assign { target, value, .. } => {
            // Tuple unpacking indexes the source through the runtime.
            matches!(target, AssignTarget::Tuple(_))
                || expr_needs_allocator(analysis, scope, value)
        }
        Statement::Expr { value, .. } => expr_needs_allocator(analysis, scope, value),
        Statement::Return { value, .. } => value
            .as_ref()
            .is_some_and(|v| expr_needs_allocator(analysis, scope, v)),
        Statement::If {
            condition,
            then_body,
            else_body,
            ..
        } => {
            expr_needs_allocator(analysis, scope, condition)
                || then_body
                    .iter()
                    .chain(else_body)
                    .any(|s| statement_needs_allocator(analysis, scope, s))
        }
        Statement::While {
            condition, body, ..
        } => {
            expr_needs_allocator(analysis, scope, condition)
                || body
                    .iter()
                    .any(|s| statement_needs_allocator(analysis, scope, s))
        }
        Statement::For {
            iterable, body, ..
        } => {
            expr_needs_allocator(analysis, scope, iterable)
                || body
                    .iter()
                    .any(|s| statement_needs_allocator(analysis, scope, s))
        }
        _ => false,
    }
}

fn expr_needs_allocator(analysis: &Analysis, scope: &Scope, expr: &Expression) -> bool {
    match expr {
        Expression::String(_)
        | Expression::List(_)
        | Expression::Dict(_)
        | Expression::Tuple(_) => true,
        // The indexer allocates a fresh reference.
        Expression::Subscript { .. } => true,
        Expression::BinaryOp { left, right, .. } => {
            if expr_is_string_concat(analysis, scope, expr) {
                return true;
            }
            expr_needs_allocator(analysis, scope, left)
                || expr_needs_allocator(analysis, scope, right)
        }
        Expression::UnaryOp { operand, .. } => expr_needs_allocator(analysis, scope, operand),
        Expression::Conditional {
            condition,
            then_value,
            else_value,
        } => {
            expr_needs_allocator(analysis, scope, condition)
                || expr_needs_allocator(analysis, scope, then_value)
                || expr_needs_allocator(analysis, scope, else_value)
        }
        Expression::Call { callee, args } => {
            let callee_needs = match callee.as_ref() {
                Expression::Identifier(name) => {
                    // Callers of pyobject-returning functions own (and must
                    // release) the result, so they need the allocator too.
                    name == "len"
                        || analysis
                            .functions
                            .get(name)
                            .is_some_and(|f| f.needs_allocator || f.return_type == Type::PyObject)
                }
                Expression::Attribute { object, .. } => {
                    attribute_call_allocates(analysis, scope, object)
                }
                _ => false,
            };
            callee_needs
                || args
                    .iter()
                    .any(|a| expr_needs_allocator(analysis, scope, a))
        }
        Expression::Attribute { .. } => false,
        _ => false,
    }
}

fn attribute_call_allocates(analysis: &Analysis, scope: &Scope, object: &Expression) -> bool {
    if let Expression::Identifier(receiver) = object {
        // Class-instance method calls never allocate in the subset;
        // everything else (string/list/dict methods, json.*, http.*)
        // dispatches into allocating runtime helpers.
        let receiver_type = scope
            .type_of(receiver)
            .or_else(|| analysis.module_scope.type_of(receiver));
        if matches!(receiver_type, Some(Type::Instance(_))) {
            return false;
        }
    }
    true
}

// -- class shape collection ------------------------------------------------

fn collect_class(class_name: &str, body: &[Statement]) -> ClassInfo {
    let mut fields = Vec::new();
    let mut init_params = Vec::new();
    let mut methods = Vec::new();

    for member in body {
        let Statement::FunctionDef {
            name, params, body, ..
        } = member
        else {
            continue;
        };
        let plain_params: Vec<String> = params
            .iter()
            .map(|p| p.name.clone())
            .filter(|p| p != "self")
            .collect();

        if name == "__init__" {
            init_params = plain_params;
            collect_self_fields(body, &mut fields);
        } else {
            methods.push(MethodInfo {
                name: name.clone(),
                params: plain_params,
                has_return: body_has_return(body),
            });
        }
    }

    ClassInfo {
        name: class_name.to_string(),
        fields,
        init_params,
        methods,
    }
}

/// `self.<name> = ...` assignments in `__init__`, in source order.
fn collect_self_fields(body: &[Statement], fields: &mut Vec<String>) {
    for statement in body {
        match statement {
            Statement::Assign {
                target:
                    AssignTarget::Attribute {
                        object: Expression::Identifier(receiver),
                        name,
                    },
                ..
            } if receiver == "self" => {
                if !fields.contains(name) {
                    fields.push(name.clone());
                }
            }
            Statement::If {
                then_body,
                else_body,
                ..
            } => {
                collect_self_fields(then_body, fields);
                collect_self_fields(else_body, fields);
            }
            Statement::While { body, .. } | Statement::For { body, .. } => {
                collect_self_fields(body, fields);
            }
            _ => {}
        }
    }
}

fn body_has_return(body: &[Statement]) -> bool {
    body.iter().any(|statement| match statement {
        Statement::Return { value, .. } => value.is_some(),
        Statement::If {
            then_body,
            else_body,
            ..
        } => body_has_return(then_body) || body_has_return(else_body),
        Statement::While { body, .. } | Statement::For { body, .. } => body_has_return(body),
        _ => false,
    })
}

// -- parameter and return inference ----------------------------------------

/// Parameter inference for non-class functions without hints: pyobject when
/// the parameter is concatenated with a string, used as an attribute
/// receiver, subscripted, or passed to `len`; i64 otherwise.
fn infer_param_type(param: &str, body: &[Statement]) -> Type {
    if body.iter().any(|s| statement_forces_object(param, s)) {
        Type::PyObject
    } else {
        Type::Int
    }
}

fn statement_forces_object(param: &str, statement: &Statement) -> bool {
    match statement {
        Statement::Assign { value, .. } | Statement::Expr { value, .. } => {
            expr_forces_object(param, value)
        }
        Statement::Return { value, .. } => value
            .as_ref()
            .is_some_and(|v| expr_forces_object(param, v)),
        Statement::If {
            condition,
            then_body,
            else_body,
            ..
        } => {
            expr_forces_object(param, condition)
                || then_body
                    .iter()
                    .chain(else_body)
                    .any(|s| statement_forces_object(param, s))
        }
        Statement::While {
            condition, body, ..
        } => {
            expr_forces_object(param, condition)
                || body.iter().any(|s| statement_forces_object(param, s))
        }
        Statement::For {
            iterable, body, ..
        } => {
            expr_forces_object(param, iterable)
                || body.iter().any(|s| statement_forces_object(param, s))
        }
        _ => false,
    }
}

fn expr_forces_object(param: &str, expr: &Expression) -> bool {
    match expr {
        Expression::BinaryOp {
            left,
            op: BinaryOperator::Add,
            right,
        } => {
            let param_on_left =
                matches!(left.as_ref(), Expression::Identifier(n) if n == param);
            if param_on_left && add_chain_contains_string(expr) {
                return true;
            }
            expr_forces_object(param, left) || expr_forces_object(param, right)
        }
        Expression::BinaryOp { left, right, .. } => {
            expr_forces_object(param, left) || expr_forces_object(param, right)
        }
        Expression::UnaryOp { operand, .. } => expr_forces_object(param, operand),
        Expression::Conditional {
            condition,
            then_value,
            else_value,
        } => {
            expr_forces_object(param, condition)
                || expr_forces_object(param, then_value)
                || expr_forces_object(param, else_value)
        }
        Expression::Attribute { object, .. } => {
            matches!(object.as_ref(), Expression::Identifier(n) if n == param)
                || expr_forces_object(param, object)
        }
        Expression::Subscript { object, index } => {
            matches!(object.as_ref(), Expression::Identifier(n) if n == param)
                || expr_forces_object(param, object)
                || expr_forces_object(param, index)
        }
        Expression::Call { callee, args } => {
            if let Expression::Identifier(name) = callee.as_ref() {
                // len(p) and iteration over p both demand the boxed form.
                let demands_object = matches!(name.as_str(), "len" | "enumerate" | "zip");
                if demands_object
                    && args
                        .iter()
                        .any(|a| matches!(a, Expression::Identifier(n) if n == param))
                {
                    return true;
                }
            }
            expr_forces_object(param, callee) || args.iter().any(|a| expr_forces_object(param, a))
        }
        _ => false,
    }
}

fn add_chain_contains_string(expr: &Expression) -> bool {
    match expr {
        Expression::String(_) => true,
        Expression::BinaryOp {
            left,
            op: BinaryOperator::Add,
            right,
        } => add_chain_contains_string(left) || add_chain_contains_string(right),
        _ => false,
    }
}

/// Return inference: most general of all reachable `return` values,
/// `pyobject > int > void`.
fn infer_return_type(body: &[Statement], scope: &Scope) -> Type {
    let mut result = Type::Void;
    collect_return_type(body, scope, &mut result);
    result
}

fn collect_return_type(body: &[Statement], scope: &Scope, result: &mut Type) {
    for statement in body {
        match statement {
            Statement::Return { value, .. } => {
                let ty = match value {
                    None => Type::Void,
                    Some(expr) => match return_value_type(expr, scope) {
                        Type::Int | Type::Bool => Type::Int,
                        Type::Void => Type::Void,
                        _ => Type::PyObject,
                    },
                };
                widen(result, ty);
            }
            Statement::If {
                then_body,
                else_body,
                ..
            } => {
                collect_return_type(then_body, scope, result);
                collect_return_type(else_body, scope, result);
            }
            Statement::While { body, .. } | Statement::For { body, .. } => {
                collect_return_type(body, scope, result);
            }
            _ => {}
        }
    }
}

fn return_value_type(expr: &Expression, scope: &Scope) -> Type {
    match expr {
        Expression::Integer(_) | Expression::Boolean(_) => Type::Int,
        Expression::String(_)
        | Expression::List(_)
        | Expression::Dict(_)
        | Expression::Tuple(_)
        | Expression::NoneLiteral
        | Expression::Float(_) => Type::PyObject,
        Expression::Identifier(name) => match scope.type_of(name) {
            Some(Type::Int) | Some(Type::Bool) | Some(Type::Instance(_)) | None => Type::Int,
            Some(_) => Type::PyObject,
        },
        Expression::BinaryOp { op, .. } => {
            if *op == BinaryOperator::Add && add_chain_is_stringy(expr, scope) {
                Type::PyObject
            } else {
                Type::Int
            }
        }
        Expression::UnaryOp { .. } => Type::Int,
        Expression::Call { callee, .. } => match callee.as_ref() {
            Expression::Identifier(name) if name == "len" => Type::Int,
            _ => Type::PyObject,
        },
        Expression::Subscript { .. } => Type::PyObject,
        Expression::Conditional { then_value, .. } => return_value_type(then_value, scope),
        Expression::Attribute { .. } => Type::PyObject,
    }
}

fn add_chain_is_stringy(expr: &Expression, scope: &Scope) -> bool {
    match expr {
        Expression::String(_) => true,
        Expression::Identifier(name) => matches!(scope.type_of(name), Some(Type::Str)),
        Expression::BinaryOp {
            left,
            op: BinaryOperator::Add,
            right,
        } => add_chain_is_stringy(left, scope) || add_chain_is_stringy(right, scope),
        _ => false,
    }
}

fn widen(current: &mut Type, observed: Type) {
    let rank = |ty: &Type| match ty {
        Type::Void => 0usize,
        Type::Int => 1,
        _ => 2,
    };
    if rank(&observed) > rank(current) {
        *current = observed;
    }
}

pub fn method_result_type(method: &str) -> Type {
    match method {
        "upper" | "lower" | "strip" | "lstrip" | "rstrip" | "replace" | "capitalize" | "title"
        | "swapcase" | "center" | "join" => Type::Str,
        "copy" | "reversed" | "split" => Type::List,
        "count" | "index" | "find" => Type::Int,
        _ => Type::PyObject,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;
    use indoc::indoc;

    fn analyzed(source: &str) -> Analysis {
        analyze(&parse_source(source).expect("parse failed"))
    }

    #[test]
    fn infers_literal_tags() {
        let analysis = analyzed(indoc! {"
            a = 1
            b = \"hi\"
            c = [1, 2]
            d = {\"k\": 1}
            e = (1, 2)
            f = None
            g = True
            h = 2.5
        "});
        let scope = &analysis.module_scope;
        assert_eq!(scope.type_of("a"), Some(&Type::Int));
        assert_eq!(scope.type_of("b"), Some(&Type::Str));
        assert_eq!(scope.type_of("c"), Some(&Type::List));
        assert_eq!(scope.type_of("d"), Some(&Type::Dict));
        assert_eq!(scope.type_of("e"), Some(&Type::Tuple));
        assert_eq!(scope.type_of("f"), Some(&Type::PyObject));
        assert_eq!(scope.type_of("g"), Some(&Type::Bool));
        assert_eq!(scope.type_of("h"), Some(&Type::Float));
    }

    #[test]
    fn copies_tags_through_names() {
        let analysis = analyzed("a = \"hi\"\nb = a\n");
        assert_eq!(analysis.module_scope.type_of("b"), Some(&Type::Str));
    }

    #[test]
    fn string_concat_is_detected_through_chains() {
        let analysis = analyzed(indoc! {"
            a = \"x\"
            b = a + \"y\" + \"z\"
            c = (1 + 2) + \"x\"
            d = 1 + 2
        "});
        let scope = &analysis.module_scope;
        assert_eq!(scope.type_of("b"), Some(&Type::Str));
        assert_eq!(scope.type_of("c"), Some(&Type::Str));
        assert_eq!(scope.type_of("d"), Some(&Type::Int));
    }

    #[test]
    fn method_table_drives_call_tags() {
        let analysis = analyzed(indoc! {"
            s = \"hi\"
            a = s.upper()
            b = s.split()
            c = s.find(\"h\")
            d = s.startswith(\"h\")
        "});
        let scope = &analysis.module_scope;
        assert_eq!(scope.type_of("a"), Some(&Type::Str));
        assert_eq!(scope.type_of("b"), Some(&Type::List));
        assert_eq!(scope.type_of("c"), Some(&Type::Int));
        assert_eq!(scope.type_of("d"), Some(&Type::PyObject));
    }

    #[test]
    fn subscript_is_pyobject() {
        let analysis = analyzed("xs = [1]\na = xs[0]\n");
        assert_eq!(analysis.module_scope.type_of("a"), Some(&Type::PyObject));
    }

    #[test]
    fn class_instantiation_tags_instance() {
        let analysis = analyzed(indoc! {"
            class C:
                def __init__(self, x):
                    self.x = x
            c = C(41)
        "});
        assert_eq!(
            analysis.module_scope.type_of("c"),
            Some(&Type::Instance("C".to_string()))
        );
    }

    #[test]
    fn detects_reassignment_without_rebinding_tag() {
        let analysis = analyzed("x = 1\nx = 2\ny = 3\n");
        let scope = &analysis.module_scope;
        assert!(scope.is_reassigned("x"));
        assert!(!scope.is_reassigned("y"));
        assert_eq!(scope.type_of("x"), Some(&Type::Int));
    }

    #[test]
    fn tag_is_never_weakened() {
        // `x` is tagged by its first assignment; the later assignment does
        // not change it.
        let analysis = analyzed("x = \"s\"\nx = f()\n");
        assert_eq!(analysis.module_scope.type_of("x"), Some(&Type::Str));
    }

    #[test]
    fn infers_param_types() {
        let analysis = analyzed(indoc! {"
            def f(n):
                return n + 1

            def g(s):
                return s.upper()

            def h(xs):
                return len(xs)

            def k(xs):
                return xs[0]
        "});
        assert_eq!(analysis.function("f").unwrap().params[0].1, Type::Int);
        assert_eq!(analysis.function("g").unwrap().params[0].1, Type::PyObject);
        assert_eq!(analysis.function("h").unwrap().params[0].1, Type::PyObject);
        assert_eq!(analysis.function("k").unwrap().params[0].1, Type::PyObject);
    }

    #[test]
    fn param_concatenated_with_string_is_pyobject() {
        let analysis = analyzed(indoc! {"
            def greet(name):
                return name + \"!\"
        "});
        assert_eq!(
            analysis.function("greet").unwrap().params[0].1,
            Type::PyObject
        );
    }

    #[test]
    fn hints_override_param_inference() {
        let analysis = analyzed(indoc! {"
            def f(n: int, s: str):
                return 0
        "});
        let info = analysis.function("f").unwrap();
        assert_eq!(info.params[0].1, Type::Int);
        assert_eq!(info.params[1].1, Type::Str);
    }

    #[test]
    fn infers_return_types() {
        let analysis = analyzed(indoc! {"
            def f(n):
                return n

            def g():
                return \"hi\"

            def h():
                x = 1
                x = x + 1

            def mixed(n):
                if n < 0:
                    return 0
                return \"neg\"
        "});
        assert_eq!(analysis.function("f").unwrap().return_type, Type::Int);
        assert_eq!(analysis.function("g").unwrap().return_type, Type::PyObject);
        assert_eq!(analysis.function("h").unwrap().return_type, Type::Void);
        // Most general wins.
        assert_eq!(
            analysis.function("mixed").unwrap().return_type,
            Type::PyObject
        );
    }

    #[test]
    fn allocator_need_is_syntactic_and_transitive() {
        let analysis = analyzed(indoc! {"
            def pure(n):
                return n + 1

            def makes_string():
                return \"hi\"

            def calls_maker():
                return makes_string()

            def calls_pure(n):
                return pure(n)
        "});
        assert!(!analysis.function("pure").unwrap().needs_allocator);
        assert!(analysis.function("makes_string").unwrap().needs_allocator);
        assert!(analysis.function("calls_maker").unwrap().needs_allocator);
        assert!(!analysis.function("calls_pure").unwrap().needs_allocator);
    }

    #[test]
    fn len_and_subscript_need_allocator() {
        let analysis = analyzed(indoc! {"
            def f(xs):
                return len(xs)

            def g(xs):
                return xs[0]
        "});
        assert!(analysis.function("f").unwrap().needs_allocator);
        assert!(analysis.function("g").unwrap().needs_allocator);
    }

    #[test]
    fn fallible_iff_allocating_or_object_returning() {
        let analysis = analyzed(indoc! {"
            def pure(n):
                return n + 1

            def s():
                return \"x\"
        "});
        assert!(!analysis.function("pure").unwrap().is_fallible());
        assert!(analysis.function("s").unwrap().is_fallible());
    }

    #[test]
    fn collects_class_shape() {
        let analysis = analyzed(indoc! {"
            class Point:
                def __init__(self, x, y):
                    self.x = x
                    self.y = y

                def dist2(self):
                    return self.x * self.x + self.y * self.y

                def shift(self, dx):
                    self.x = self.x + dx
        "});
        let class = analysis.class("Point").unwrap();
        assert_eq!(class.fields, vec!["x".to_string(), "y".to_string()]);
        assert_eq!(class.init_params, vec!["x".to_string(), "y".to_string()]);
        assert_eq!(class.methods.len(), 2);
        assert!(class.methods[0].has_return);
        assert!(!class.methods[1].has_return);
    }

    #[test]
    fn analysis_is_idempotent() {
        let source = indoc! {"
            def greet(name):
                return name + \"!\"

            s = \"hello\"
            t = s.upper()
            n = len(t)
            n = n + 1
        "};
        let program = parse_source(source).expect("parse failed");
        let first = analyze(&program);
        let second = analyze(&program);
        assert_eq!(first, second);
    }

    #[test]
    fn loop_targets_follow_iterable_shape() {
        let analysis = analyzed(indoc! {"
            def f(xs):
                total = 0
                for i in range(10):
                    total = total + i
                for j, v in enumerate(xs):
                    total = total + j
                return total
        "});
        let scope = &analysis.scopes["f"];
        assert_eq!(scope.type_of("i"), Some(&Type::Int));
        assert_eq!(scope.type_of("j"), Some(&Type::Int));
        assert_eq!(scope.type_of("v"), Some(&Type::PyObject));
        assert!(scope.is_reassigned("i"));
    }

    #[test]
    fn module_allocator_flag_tracks_top_level_needs() {
        let with = analyzed("s = \"hi\"\n");
        assert!(with.module_needs_allocator);
        let without = analyzed("x = 1\ny = x + 1\n");
        assert!(!without.module_needs_allocator);
    }
}
