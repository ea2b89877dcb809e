//! Zig code emission.
//!
//! Takes the AST plus the analyzer's tables and produces one self-contained
//! Zig module: the embedded runtime namespace, module preamble slots, class
//! structs, async frames, user functions, and a `main` wrapping the top-level
//! statements. Heap values get scoped release through `defer runtime.decref`;
//! fallible calls carry `try`; the per-compilation allocator is threaded
//! through every function the analyzer flagged.

use std::collections::{BTreeMap, HashSet};

use thiserror::Error;

use crate::analyzer::{
    self, Analysis, ClassInfo, FunctionInfo, Scope, Type, infer_expr_type,
};
use crate::ast::{
    AssignTarget, BinaryOperator, Expression, ForTarget, Program, Statement, UnaryOperator,
};

use self::zig_runtime::{escape_zig_string, runtime_source};

mod zig_runtime;

#[derive(Debug, Error, PartialEq)]
pub enum EmitError {
    #[error(
        "Unsupported for-loop iterable at line {line}: only range(), enumerate() and zip() can be iterated"
    )]
    UnsupportedForLoop { line: usize },
    #[error("range() expects one name and 1 to 3 integer arguments at line {line}")]
    InvalidRangeArgs { line: usize },
    #[error("enumerate() expects one list argument and an index, value target pair at line {line}")]
    InvalidEnumerateTarget { line: usize },
    #[error("zip() expects one list argument per loop target at line {line}")]
    InvalidZipTarget { line: usize },
    #[error("Unsupported import '{module}' at line {line}: only json and http are available")]
    UnsupportedImport { module: String, line: usize },
    #[error("Unsupported assignment target at line {line}")]
    UnsupportedTarget { line: usize },
    #[error("Unsupported: {detail} at line {line}")]
    Unsupported { detail: String, line: usize },
}

pub type EmitResult<T> = Result<T, EmitError>;

/// Emit the complete Zig module for an analyzed program.
pub fn emit_program(program: &Program, analysis: &Analysis) -> EmitResult<String> {
    Emitter::new(analysis).emit(program)
}

/// An emitted expression fragment. `owned` marks a fresh reference the
/// consumer must release (or hand off).
struct Piece {
    code: String,
    ty: Type,
    owned: bool,
}

impl Piece {
    fn new(code: impl Into<String>, ty: Type, owned: bool) -> Self {
        Self {
            code: code.into(),
            ty,
            owned,
        }
    }
}

struct Emitter<'a> {
    analysis: &'a Analysis,
    out: String,
    indent_level: usize,
    preamble: Vec<String>,
    json_slots: BTreeMap<String, String>,
    temp_counter: usize,
    declared: HashSet<String>,
    scope_key: Option<String>,
    current_return: Type,
    in_async_frame: bool,
    line: usize,
    module_aliases: BTreeMap<String, String>,
    function_aliases: BTreeMap<String, (String, String)>,
}

impl<'a> Emitter<'a> {
    fn new(analysis: &'a Analysis) -> Self {
        Self {
            analysis,
            out: String::new(),
            indent_level: 0,
            preamble: Vec::new(),
            json_slots: BTreeMap::new(),
            temp_counter: 0,
            declared: HashSet::new(),
            scope_key: None,
            current_return: Type::Void,
            in_async_frame: false,
            line: 0,
            module_aliases: BTreeMap::new(),
            function_aliases: BTreeMap::new(),
        }
    }

    fn emit(mut self, program: &Program) -> EmitResult<String> {
        self.collect_imports(program)?;

        let mut classes = Vec::new();
        let mut functions = Vec::new();
        let mut top_level = Vec::new();
        for statement in &program.statements {
            match statement {
                Statement::ClassDef { .. } => classes.push(statement),
                Statement::FunctionDef { .. } => functions.push(statement),
                _ => top_level.push(statement),
            }
        }

        for statement in &classes {
            self.emit_class_def(statement)?;
        }
        for statement in &functions {
            self.emit_function_def(statement)?;
        }
        self.emit_main(&top_level)?;

        let mut module = String::from("const std = @import(\"std\");\n\n");
        module.push_str(&runtime_source());
        module.push('\n');
        if !self.preamble.is_empty() {
            for slot in &self.preamble {
                module.push_str(slot);
                module.push('\n');
            }
            module.push('\n');
        }
        module.push_str(&self.out);
        Ok(module)
    }

    // -- imports -----------------------------------------------------------

    fn collect_imports(&mut self, program: &Program) -> EmitResult<()> {
        for statement in &program.statements {
            match statement {
                Statement::Import {
                    module,
                    alias,
                    span,
                } => {
                    if module != "json" && module != "http" {
                        return Err(EmitError::UnsupportedImport {
                            module: module.clone(),
                            line: span.line,
                        });
                    }
                    let local = alias.clone().unwrap_or_else(|| module.clone());
                    self.module_aliases.insert(local, module.clone());
                }
                Statement::ImportFrom {
                    module,
                    names,
                    span,
                } => {
                    for imported in names {
                        let allowed = matches!(
                            (module.as_str(), imported.name.as_str()),
                            ("json", "loads") | ("json", "dumps") | ("http", "get")
                        );
                        if !allowed {
                            return Err(EmitError::UnsupportedImport {
                                module: format!("{}.{}", module, imported.name),
                                line: span.line,
                            });
                        }
                        let local = imported
                            .alias
                            .clone()
                            .unwrap_or_else(|| imported.name.clone());
                        self.function_aliases
                            .insert(local, (module.clone(), imported.name.clone()));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    // -- classes -----------------------------------------------------------

    fn emit_class_def(&mut self, statement: &Statement) -> EmitResult<()> {
        let Statement::ClassDef { name, body, .. } = statement else {
            return Ok(());
        };
        let info = self
            .analysis
            .class(name)
            .cloned()
            .unwrap_or_else(|| ClassInfo {
                name: name.clone(),
                fields: Vec::new(),
                init_params: Vec::new(),
                methods: Vec::new(),
            });
        let zname = mangle(name);

        self.push_line(&format!("const {zname} = struct {{"));
        self.indent_level += 1;
        for field in &info.fields {
            self.push_line(&format!("{}: i64,", mangle(field)));
        }
        if !info.fields.is_empty() {
            self.push_line("");
        }

        let mut has_init = false;
        for member in body {
            let Statement::FunctionDef {
                name: method_name,
                body: method_body,
                ..
            } = member
            else {
                continue;
            };
            if method_name == "__init__" {
                has_init = true;
                self.emit_class_init(name, &info, method_body)?;
            } else {
                self.emit_class_method(name, &info, method_name, method_body)?;
            }
        }
        if !has_init {
            self.push_line(&format!("fn init() {zname} {{"));
            self.push_line("    return .{};");
            self.push_line("}");
        }

        self.indent_level -= 1;
        self.push_line("};");
        self.push_line("");
        Ok(())
    }

    fn emit_class_init(
        &mut self,
        class_name: &str,
        info: &ClassInfo,
        body: &[Statement],
    ) -> EmitResult<()> {
        let zname = mangle(class_name);
        let params = info
            .init_params
            .iter()
            .map(|p| format!("{}: i64", mangle(p)))
            .collect::<Vec<_>>()
            .join(", ");
        self.push_line(&format!("fn init({params}) {zname} {{"));
        self.indent_level += 1;

        if info.fields.is_empty() && body.is_empty() {
            self.push_line("return .{};");
        } else {
            let defaults = info
                .fields
                .iter()
                .map(|f| format!(".{} = 0", mangle(f)))
                .collect::<Vec<_>>()
                .join(", ");
            if info.fields.is_empty() {
                self.push_line(&format!("var self = {zname}{{}};"));
            } else {
                self.push_line(&format!("var self = {zname}{{ {defaults} }};"));
            }
            self.enter_scope(
                format!("{class_name}.__init__"),
                info.init_params
                    .iter()
                    .map(String::as_str)
                    .chain(std::iter::once("self")),
                Type::Void,
            );
            for statement in body {
                self.emit_statement(statement)?;
            }
            self.leave_scope();
            self.push_line("return self;");
        }

        self.indent_level -= 1;
        self.push_line("}");
        self.push_line("");
        Ok(())
    }

    fn emit_class_method(
        &mut self,
        class_name: &str,
        info: &ClassInfo,
        method_name: &str,
        body: &[Statement],
    ) -> EmitResult<()> {
        let zname = mangle(class_name);
        let method = info.method(method_name).cloned().unwrap_or_else(|| {
            crate::analyzer::MethodInfo {
                name: method_name.to_string(),
                params: Vec::new(),
                has_return: false,
            }
        });
        let mut params = vec![format!("self: *{zname}")];
        for param in &method.params {
            params.push(format!("{}: i64", mangle(param)));
        }
        let ret = if method.has_return { "i64" } else { "void" };
        self.push_line(&format!(
            "fn {}({}) {} {{",
            mangle(method_name),
            params.join(", "),
            ret
        ));
        self.indent_level += 1;

        let return_type = if method.has_return {
            Type::Int
        } else {
            Type::Void
        };
        self.enter_scope(
            format!("{class_name}.{method_name}"),
            method
                .params
                .iter()
                .map(String::as_str)
                .chain(std::iter::once("self")),
            return_type,
        );
        for statement in body {
            self.emit_statement(statement)?;
        }
        self.leave_scope();

        if method.has_return && !matches!(body.last(), Some(Statement::Return { .. })) {
            self.push_line("return 0;");
        }
        self.indent_level -= 1;
        self.push_line("}");
        self.push_line("");
        Ok(())
    }

    // -- functions ---------------------------------------------------------

    fn emit_function_def(&mut self, statement: &Statement) -> EmitResult<()> {
        let Statement::FunctionDef {
            name,
            body,
            is_async,
            span,
            ..
        } = statement
        else {
            return Ok(());
        };
        self.line = span.line;
        let Some(info) = self.analysis.function(name).cloned() else {
            return Ok(());
        };
        if *is_async {
            self.emit_async_function(name, &info, body)
        } else {
            self.emit_sync_function(name, &info, body)
        }
    }

    fn signature_params(&self, info: &FunctionInfo) -> Vec<String> {
        let mut params = Vec::new();
        for (param, ty) in &info.params {
            params.push(format!("{}: {}", mangle(param), zig_param_type(ty)));
        }
        if info.needs_allocator {
            params.push("allocator: std.mem.Allocator".to_string());
        }
        params
    }

    fn signature_return(&self, info: &FunctionInfo) -> String {
        let ret = zig_return_type(&info.return_type);
        if info.is_fallible() {
            format!("!{ret}")
        } else {
            ret.to_string()
        }
    }

    fn emit_sync_function(
        &mut self,
        name: &str,
        info: &FunctionInfo,
        body: &[Statement],
    ) -> EmitResult<()> {
        self.push_line(&format!(
            "fn {}({}) {} {{",
            mangle(name),
            self.signature_params(info).join(", "),
            self.signature_return(info)
        ));
        self.indent_level += 1;

        self.enter_scope(
            name.to_string(),
            info.params.iter().map(|(p, _)| p.as_str()),
            info.return_type.clone(),
        );
        for statement in body {
            self.emit_statement(statement)?;
        }
        self.leave_scope();

        if !matches!(body.last(), Some(Statement::Return { .. })) {
            match info.return_type {
                Type::Int => self.push_line("return 0;"),
                Type::PyObject => self.push_line("return runtime.none();"),
                _ => {}
            }
        }
        self.indent_level -= 1;
        self.push_line("}");
        self.push_line("");
        Ok(())
    }

    /// Async lowering: a single-shot frame with a three-state machine and a
    /// wrapper of the original name that resumes it once. `resume` is a Zig
    /// keyword, so the frame operation is named `step`.
    fn emit_async_function(
        &mut self,
        name: &str,
        info: &FunctionInfo,
        body: &[Statement],
    ) -> EmitResult<()> {
        let zname = mangle(name);
        let frame = format!("{zname}_Frame");
        let has_result = info.return_type != Type::Void;

        self.push_line(&format!("const {frame} = struct {{"));
        self.indent_level += 1;
        self.push_line("state: State,");
        for (param, ty) in &info.params {
            self.push_line(&format!("{}: {},", mangle(param), zig_param_type(ty)));
        }
        if has_result {
            self.push_line(&format!(
                "result: {},",
                zig_return_type(&info.return_type)
            ));
        }
        self.push_line("");
        self.push_line("const State = enum { start, running, done };");
        self.push_line("");

        // init stores the parameters as frame fields.
        let init_params = info
            .params
            .iter()
            .map(|(p, ty)| format!("{}: {}", mangle(p), zig_param_type(ty)))
            .collect::<Vec<_>>()
            .join(", ");
        self.push_line(&format!("fn init({init_params}) {frame} {{"));
        let mut fields = vec![".state = .start".to_string()];
        for (param, _) in &info.params {
            let z = mangle(param);
            fields.push(format!(".{z} = {z}"));
        }
        if has_result {
            let default = match info.return_type {
                Type::Int => "0".to_string(),
                _ => "runtime.none()".to_string(),
            };
            fields.push(format!(".result = {default}"));
        }
        self.push_line(&format!("    return .{{ {} }};", fields.join(", ")));
        self.push_line("}");
        self.push_line("");

        let mut step_params = vec![format!("self: *{frame}")];
        if info.needs_allocator {
            step_params.push("allocator: std.mem.Allocator".to_string());
        }
        self.push_line(&format!(
            "fn step({}) {} {{",
            step_params.join(", "),
            self.signature_return(info)
        ));
        self.indent_level += 1;
        self.push_line("if (self.state == .start) {");
        self.indent_level += 1;
        self.push_line("self.state = .running;");
        for (param, _) in &info.params {
            if body_mentions(body, param) {
                let z = mangle(param);
                self.push_line(&format!("const {z} = self.{z};"));
            }
        }

        self.enter_scope(
            name.to_string(),
            info.params.iter().map(|(p, _)| p.as_str()),
            info.return_type.clone(),
        );
        self.in_async_frame = true;
        for statement in body {
            self.emit_statement(statement)?;
        }
        self.in_async_frame = false;
        self.leave_scope();

        if !matches!(body.last(), Some(Statement::Return { .. })) {
            self.push_line("self.state = .done;");
        }
        self.indent_level -= 1;
        self.push_line("}");
        if has_result {
            self.push_line("return self.result;");
        }
        self.indent_level -= 1;
        self.push_line("}");
        self.indent_level -= 1;
        self.push_line("};");
        self.push_line("");

        // Wrapper constructs the frame, resumes it once and unwraps.
        self.push_line(&format!(
            "fn {}({}) {} {{",
            zname,
            self.signature_params(info).join(", "),
            self.signature_return(info)
        ));
        let args = info
            .params
            .iter()
            .map(|(p, _)| mangle(p))
            .collect::<Vec<_>>()
            .join(", ");
        self.push_line(&format!("    var frame = {frame}.init({args});"));
        let step_arg = if info.needs_allocator { "allocator" } else { "" };
        let marker = if info.is_fallible() { "try " } else { "" };
        self.push_line(&format!("    return {marker}frame.step({step_arg});"));
        self.push_line("}");
        self.push_line("");
        Ok(())
    }

    // -- main --------------------------------------------------------------

    fn emit_main(&mut self, top_level: &[&Statement]) -> EmitResult<()> {
        let needs_allocator = self.analysis.module_needs_allocator;
        if needs_allocator {
            self.push_line("pub fn main() !void {");
            self.indent_level += 1;
            self.push_line("var gpa = std.heap.GeneralPurposeAllocator(.{}){};");
            self.push_line("defer _ = gpa.deinit();");
            self.push_line("const allocator = gpa.allocator();");
            self.push_line("");
        } else {
            self.push_line("pub fn main() !void {");
            self.indent_level += 1;
        }

        self.scope_key = None;
        self.declared = HashSet::new();
        self.current_return = Type::Void;
        for statement in top_level {
            self.emit_statement(statement)?;
        }

        self.indent_level -= 1;
        self.push_line("}");
        Ok(())
    }

    // -- statements --------------------------------------------------------

    fn emit_statement(&mut self, statement: &Statement) -> EmitResult<()> {
        self.line = statement.span().line;
        match statement {
            Statement::Assign { target, value, .. } => self.emit_assign(target, value),
            Statement::Expr { value, .. } => self.emit_expr_statement(value),
            Statement::If {
                condition,
                then_body,
                else_body,
                ..
            } => {
                let cond = as_condition(&self.bool_code(condition)?);
                self.push_line(&format!("if ({cond}) {{"));
                self.indent_level += 1;
                for s in then_body {
                    self.emit_statement(s)?;
                }
                self.indent_level -= 1;
                if else_body.is_empty() {
                    self.push_line("}");
                } else {
                    self.push_line("} else {");
                    self.indent_level += 1;
                    for s in else_body {
                        self.emit_statement(s)?;
                    }
                    self.indent_level -= 1;
                    self.push_line("}");
                }
                Ok(())
            }
            Statement::While {
                condition, body, ..
            } => {
                let cond = as_condition(&self.bool_code(condition)?);
                self.push_line(&format!("while ({cond}) {{"));
                self.indent_level += 1;
                for s in body {
                    self.emit_statement(s)?;
                }
                self.indent_level -= 1;
                self.push_line("}");
                Ok(())
            }
            Statement::For {
                target,
                iterable,
                body,
                span,
            } => {
                self.line = span.line;
                self.emit_for(target, iterable, body)
            }
            Statement::Return { value, .. } => self.emit_return(value.as_ref()),
            Statement::Import { .. } | Statement::ImportFrom { .. } => Ok(()),
            Statement::Pass { .. } => Ok(()),
            Statement::FunctionDef { span, .. } | Statement::ClassDef { span, .. } => {
                Err(EmitError::Unsupported {
                    detail: "nested definition".to_string(),
                    line: span.line,
                })
            }
        }
    }

    fn emit_assign(&mut self, target: &AssignTarget, value: &Expression) -> EmitResult<()> {
        match target {
            AssignTarget::Name(name) => self.emit_name_assign(name, value),
            AssignTarget::Attribute { object, name } => {
                let object_piece = self.emit_expr(object)?;
                if !matches!(object_piece.ty, Type::Instance(_)) {
                    return Err(EmitError::UnsupportedTarget { line: self.line });
                }
                let code = self.int_code(value)?;
                self.push_line(&format!("{}.{} = {};", object_piece.code, mangle(name), code));
                Ok(())
            }
            AssignTarget::Tuple(names) => {
                let source = self.emit_expr(value)?;
                let source_code = self.borrowed_code(source);
                for (index, name) in names.iter().enumerate() {
                    let element = Piece::new(
                        format!("try runtime.getIndex(allocator, {source_code}, {index})"),
                        Type::PyObject,
                        true,
                    );
                    self.bind_name(name, element)?;
                }
                Ok(())
            }
        }
    }

    fn emit_name_assign(&mut self, name: &str, value: &Expression) -> EmitResult<()> {
        let declared_type = self
            .lookup_type(name)
            .unwrap_or(Type::PyObject);
        let piece = match declared_type {
            Type::Int => {
                let code = self.int_code(value)?;
                Piece::new(code, Type::Int, false)
            }
            Type::Bool => {
                let code = self.bool_code(value)?;
                Piece::new(code, Type::Bool, false)
            }
            Type::Float => {
                let code = self.float_code(value)?;
                Piece::new(code, Type::Float, false)
            }
            Type::Instance(_) => self.emit_expr(value)?,
            _ => {
                // Heap binding; coerce the value into an object reference.
                let piece = self.emit_expr(value)?;
                self.object_piece(piece)?
            }
        };
        self.bind_name(name, piece)
    }

    /// First assignment declares the binding (const unless reassigned or an
    /// addressable instance); later assignments release the old heap value
    /// before storing the new one.
    fn bind_name(&mut self, name: &str, piece: Piece) -> EmitResult<()> {
        let zname = mangle(name);
        let ty = self.lookup_type(name).unwrap_or_else(|| piece.ty.clone());
        let reassigned = self.is_reassigned(name);
        let first = self.declared.insert(name.to_string());

        if ty.is_heap() {
            if first {
                if reassigned {
                    self.push_line(&format!(
                        "var {zname}: *runtime.PyObject = {};",
                        piece.code
                    ));
                } else {
                    self.push_line(&format!("const {zname} = {};", piece.code));
                }
                if !piece.owned {
                    // Sharing an existing reference.
                    self.push_line(&format!("runtime.incref({zname});"));
                }
                self.push_line(&format!("defer runtime.decref({zname}, allocator);"));
            } else {
                // Every heap tag releases the old value on reassignment.
                // The new value is evaluated first: it may read the old one
                // (`s = s + "!"`).
                let fresh = self.fresh_temp("new");
                self.push_line(&format!("const {fresh} = {};", piece.code));
                if !piece.owned {
                    self.push_line(&format!("runtime.incref({fresh});"));
                }
                self.push_line(&format!("runtime.decref({zname}, allocator);"));
                self.push_line(&format!("{zname} = {fresh};"));
            }
            return Ok(());
        }

        match ty {
            Type::Instance(class_name) => {
                let addressable = self
                    .analysis
                    .class(&class_name)
                    .is_some_and(ClassInfo::has_methods);
                if first {
                    let keyword = if reassigned || addressable { "var" } else { "const" };
                    self.push_line(&format!("{keyword} {zname} = {};", piece.code));
                } else {
                    self.push_line(&format!("{zname} = {};", piece.code));
                }
            }
            _ => {
                let annotation = match ty {
                    Type::Bool => ": bool",
                    Type::Float => ": f64",
                    _ => ": i64",
                };
                if first {
                    if reassigned {
                        self.push_line(&format!("var {zname}{annotation} = {};", piece.code));
                    } else {
                        self.push_line(&format!("const {zname} = {};", piece.code));
                    }
                } else {
                    self.push_line(&format!("{zname} = {};", piece.code));
                }
            }
        }
        Ok(())
    }

    fn emit_return(&mut self, value: Option<&Expression>) -> EmitResult<()> {
        if self.scope_key.is_none() {
            return Err(EmitError::Unsupported {
                detail: "return outside of function".to_string(),
                line: self.line,
            });
        }

        if self.in_async_frame {
            return self.emit_async_return(value);
        }

        let Some(expr) = value else {
            self.push_line("return;");
            return Ok(());
        };
        match self.current_return.clone() {
            Type::Int => {
                let code = self.int_code(expr)?;
                self.push_line(&format!("return {code};"));
            }
            Type::Void => {
                self.push_line("return;");
            }
            _ => {
                let piece = self.emit_expr(expr)?;
                let piece = self.object_piece(piece)?;
                if piece.owned {
                    self.push_line(&format!("return {};", piece.code));
                } else if is_plain_name(&piece.code) {
                    // Sharing the binding with the caller.
                    self.push_line(&format!("runtime.incref({});", piece.code));
                    self.push_line(&format!("return {};", piece.code));
                } else {
                    let temp = self.fresh_temp("ret");
                    self.push_line(&format!("const {temp} = {};", piece.code));
                    self.push_line(&format!("runtime.incref({temp});"));
                    self.push_line(&format!("return {temp};"));
                }
            }
        }
        Ok(())
    }

    fn emit_async_return(&mut self, value: Option<&Expression>) -> EmitResult<()> {
        match self.current_return.clone() {
            Type::Void => {
                self.push_line("self.state = .done;");
                self.push_line("return;");
            }
            Type::Int => {
                let code = match value {
                    Some(expr) => self.int_code(expr)?,
                    None => "0".to_string(),
                };
                self.push_line("self.state = .done;");
                self.push_line(&format!("self.result = {code};"));
                self.push_line("return self.result;");
            }
            _ => {
                let code = match value {
                    Some(expr) => {
                        let piece = self.emit_expr(expr)?;
                        let piece = self.object_piece(piece)?;
                        if piece.owned {
                            piece.code
                        } else {
                            let temp = self.fresh_temp("ret");
                            self.push_line(&format!("const {temp} = {};", piece.code));
                            self.push_line(&format!("runtime.incref({temp});"));
                            temp
                        }
                    }
                    None => "runtime.none()".to_string(),
                };
                self.push_line("self.state = .done;");
                self.push_line(&format!("self.result = {code};"));
                self.push_line("return self.result;");
            }
        }
        Ok(())
    }

    // -- for loops ---------------------------------------------------------

    fn emit_for(
        &mut self,
        target: &ForTarget,
        iterable: &Expression,
        body: &[Statement],
    ) -> EmitResult<()> {
        let Expression::Call { callee, args } = iterable else {
            return Err(EmitError::UnsupportedForLoop { line: self.line });
        };
        let Expression::Identifier(builtin) = callee.as_ref() else {
            return Err(EmitError::UnsupportedForLoop { line: self.line });
        };
        match builtin.as_str() {
            "range" => self.emit_range_for(target, args, body),
            "enumerate" => self.emit_enumerate_for(target, args, body),
            "zip" => self.emit_zip_for(target, args, body),
            _ => Err(EmitError::UnsupportedForLoop { line: self.line }),
        }
    }

    /// `for x in range(a[, b[, c]])` lowers to an induction variable and a
    /// while loop; defaults start=0, step=1.
    fn emit_range_for(
        &mut self,
        target: &ForTarget,
        args: &[Expression],
        body: &[Statement],
    ) -> EmitResult<()> {
        if target.names.len() != 1 || args.is_empty() || args.len() > 3 {
            return Err(EmitError::InvalidRangeArgs { line: self.line });
        }
        let name = &target.names[0];
        let zname = mangle(name);

        let (start, end, step) = match args.len() {
            1 => ("0".to_string(), self.loop_bound_code(&args[0])?, "1".to_string()),
            2 => (
                self.int_code(&args[0])?,
                self.loop_bound_code(&args[1])?,
                "1".to_string(),
            ),
            _ => (
                self.int_code(&args[0])?,
                self.loop_bound_code(&args[1])?,
                self.loop_bound_code(&args[2])?,
            ),
        };

        if self.declared.insert(name.to_string()) {
            self.push_line(&format!("var {zname}: i64 = {start};"));
        } else {
            self.push_line(&format!("{zname} = {start};"));
        }
        self.push_line(&format!("while ({zname} < {end}) {{"));
        self.indent_level += 1;
        for statement in body {
            self.emit_statement(statement)?;
        }
        self.push_line(&format!("{zname} += {step};"));
        self.indent_level -= 1;
        self.push_line("}");
        Ok(())
    }

    /// Loop bounds are evaluated once; anything beyond a literal is hoisted
    /// into a const so body mutations cannot move the end or step.
    fn loop_bound_code(&mut self, expr: &Expression) -> EmitResult<String> {
        match expr {
            Expression::Integer(_) => self.int_code(expr),
            _ => {
                let code = self.int_code(expr)?;
                let temp = self.fresh_temp("bound");
                self.push_line(&format!("const {temp} = {code};"));
                Ok(temp)
            }
        }
    }

    /// `for i, v in enumerate(xs)` iterates the list's element array with a
    /// paired integer index.
    fn emit_enumerate_for(
        &mut self,
        target: &ForTarget,
        args: &[Expression],
        body: &[Statement],
    ) -> EmitResult<()> {
        if target.names.len() != 2 || args.len() != 1 {
            return Err(EmitError::InvalidEnumerateTarget { line: self.line });
        }
        let index_name = &target.names[0];
        let value_name = &target.names[1];
        let source = self.emit_expr(&args[0])?;
        let source_code = self.borrowed_code(source);

        let value_used = body_mentions(body, value_name);
        let index_used = body_mentions(body, index_name);
        let value_capture = if value_used {
            mangle(value_name)
        } else {
            "_".to_string()
        };

        if index_used {
            let raw_index = self.fresh_temp("idx");
            self.push_line(&format!(
                "for (runtime.PyList.items({source_code}), 0..) |{value_capture}, {raw_index}| {{"
            ));
            self.indent_level += 1;
            self.push_line(&format!(
                "const {}: i64 = @intCast({raw_index});",
                mangle(index_name)
            ));
        } else {
            self.push_line(&format!(
                "for (runtime.PyList.items({source_code})) |{value_capture}| {{"
            ));
            self.indent_level += 1;
        }
        for statement in body {
            self.emit_statement(statement)?;
        }
        self.indent_level -= 1;
        self.push_line("}");
        Ok(())
    }

    /// `for x, y in zip(a, b)`: parallel iteration over the element arrays,
    /// sliced to the common minimum length.
    fn emit_zip_for(
        &mut self,
        target: &ForTarget,
        args: &[Expression],
        body: &[Statement],
    ) -> EmitResult<()> {
        if target.names.len() < 2 || target.names.len() != args.len() {
            return Err(EmitError::InvalidZipTarget { line: self.line });
        }
        let zip_id = self.temp_counter;
        self.temp_counter += 1;

        let mut slices = Vec::new();
        for (position, arg) in args.iter().enumerate() {
            let piece = self.emit_expr(arg)?;
            let code = self.borrowed_code(piece);
            let slice = format!("__zip{zip_id}_{position}");
            self.push_line(&format!("const {slice} = runtime.PyList.items({code});"));
            slices.push(slice);
        }
        let mut min_code = format!("{}.len", slices[0]);
        for slice in &slices[1..] {
            min_code = format!("@min({min_code}, {slice}.len)");
        }
        let len_name = format!("__zip{zip_id}_len");
        self.push_line(&format!("const {len_name} = {min_code};"));

        let operands = slices
            .iter()
            .map(|s| format!("{s}[0..{len_name}]"))
            .collect::<Vec<_>>()
            .join(", ");
        let captures = target
            .names
            .iter()
            .map(|n| {
                if body_mentions(body, n) {
                    mangle(n)
                } else {
                    "_".to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        self.push_line(&format!("for ({operands}) |{captures}| {{"));
        self.indent_level += 1;
        for statement in body {
            self.emit_statement(statement)?;
        }
        self.indent_level -= 1;
        self.push_line("}");
        Ok(())
    }

    // -- expression statements ---------------------------------------------

    fn emit_expr_statement(&mut self, value: &Expression) -> EmitResult<()> {
        if let Expression::Call { callee, args } = value {
            if let Expression::Identifier(name) = callee.as_ref() {
                match name.as_str() {
                    "print" => return self.emit_print(args),
                    "sleep" => {
                        if args.len() != 1 {
                            return Err(EmitError::Unsupported {
                                detail: "sleep() expects one argument".to_string(),
                                line: self.line,
                            });
                        }
                        let code = self.int_code(&args[0])?;
                        self.push_line(&format!("runtime.sleep({code});"));
                        return Ok(());
                    }
                    _ => {}
                }
            }
            let piece = self.emit_call(callee, args)?;
            match piece.ty {
                Type::Void => self.push_line(&format!("{};", piece.code)),
                ty if ty.is_heap() && piece.owned => {
                    let temp = self.fresh_temp("t");
                    self.push_line(&format!("const {temp} = {};", piece.code));
                    self.push_line(&format!("defer runtime.decref({temp}, allocator);"));
                }
                _ => self.push_line(&format!("_ = {};", piece.code)),
            }
            return Ok(());
        }

        let piece = self.emit_expr(value)?;
        if piece.ty.is_heap() && piece.owned {
            let temp = self.fresh_temp("t");
            self.push_line(&format!("const {temp} = {};", piece.code));
            self.push_line(&format!("defer runtime.decref({temp}, allocator);"));
        } else {
            self.push_line(&format!("_ = {};", piece.code));
        }
        Ok(())
    }

    fn emit_print(&mut self, args: &[Expression]) -> EmitResult<()> {
        for (position, arg) in args.iter().enumerate() {
            if position > 0 {
                self.push_line("runtime.printSpace();");
            }
            let piece = self.emit_expr(arg)?;
            match piece.ty {
                Type::Int => self.push_line(&format!("runtime.printInt({});", piece.code)),
                Type::Bool => self.push_line(&format!("runtime.printBool({});", piece.code)),
                Type::Float => self.push_line(&format!("runtime.printFloat({});", piece.code)),
                Type::Instance(_) | Type::Void => {
                    return Err(EmitError::Unsupported {
                        detail: "print() of a class instance".to_string(),
                        line: self.line,
                    });
                }
                _ => {
                    let code = self.borrowed_code(piece);
                    self.push_line(&format!("runtime.printObject({code});"));
                }
            }
        }
        self.push_line("runtime.printNewline();");
        Ok(())
    }

    // -- expressions -------------------------------------------------------

    fn emit_expr(&mut self, expr: &Expression) -> EmitResult<Piece> {
        match expr {
            Expression::Integer(value) => Ok(Piece::new(value.to_string(), Type::Int, false)),
            Expression::Float(value) => Ok(Piece::new(format!("{value:?}"), Type::Float, false)),
            Expression::Boolean(value) => Ok(Piece::new(
                if *value { "true" } else { "false" },
                Type::Bool,
                false,
            )),
            Expression::NoneLiteral => Ok(Piece::new("runtime.none()", Type::PyObject, false)),
            Expression::String(value) => Ok(Piece::new(
                format!(
                    "try runtime.PyString.create(allocator, \"{}\")",
                    escape_zig_string(value)
                ),
                Type::Str,
                true,
            )),
            Expression::Identifier(name) => {
                let ty = self.lookup_type(name).unwrap_or(Type::PyObject);
                Ok(Piece::new(mangle(name), ty, false))
            }
            Expression::List(elements) => self.emit_list_literal(elements),
            Expression::Dict(entries) => self.emit_dict_literal(entries),
            Expression::Tuple(elements) => self.emit_tuple_literal(elements),
            Expression::BinaryOp { left, op, right } => self.emit_binary_op(expr, left, *op, right),
            Expression::UnaryOp { op, operand } => match op {
                UnaryOperator::Not => {
                    let code = self.bool_code(operand)?;
                    Ok(Piece::new(format!("!({code})"), Type::Bool, false))
                }
                UnaryOperator::Neg => {
                    let code = self.int_code(operand)?;
                    Ok(Piece::new(format!("-({code})"), Type::Int, false))
                }
                UnaryOperator::Pos => {
                    let code = self.int_code(operand)?;
                    Ok(Piece::new(format!("({code})"), Type::Int, false))
                }
                UnaryOperator::Invert => {
                    let code = self.int_code(operand)?;
                    Ok(Piece::new(format!("~({code})"), Type::Int, false))
                }
            },
            Expression::Conditional {
                condition,
                then_value,
                else_value,
            } => {
                let cond = as_condition(&self.bool_code(condition)?);
                let then_ty = self.type_of_expr(then_value);
                let else_ty = self.type_of_expr(else_value);
                if then_ty == Type::Int && else_ty == Type::Int {
                    let t = self.int_code(then_value)?;
                    let e = self.int_code(else_value)?;
                    Ok(Piece::new(
                        format!("if ({cond}) {t} else {e}"),
                        Type::Int,
                        false,
                    ))
                } else {
                    let t_piece = self.emit_expr(then_value)?;
                    let t = self.borrowed_code(t_piece);
                    let e_piece = self.emit_expr(else_value)?;
                    let e = self.borrowed_code(e_piece);
                    Ok(Piece::new(
                        format!("if ({cond}) {t} else {e}"),
                        Type::PyObject,
                        false,
                    ))
                }
            }
            Expression::Call { callee, args } => self.emit_call(callee, args),
            Expression::Attribute { object, name } => {
                let piece = self.emit_expr(object)?;
                if matches!(piece.ty, Type::Instance(_)) {
                    Ok(Piece::new(
                        format!("{}.{}", piece.code, mangle(name)),
                        Type::Int,
                        false,
                    ))
                } else {
                    Err(EmitError::Unsupported {
                        detail: format!("attribute access '.{name}' on a non-instance value"),
                        line: self.line,
                    })
                }
            }
            Expression::Subscript { object, index } => {
                let object_piece = self.emit_expr(object)?;
                let object_code = self.borrowed_code(object_piece);
                let code = match (&**index, self.type_of_expr(index)) {
                    (Expression::String(key), _) => format!(
                        "try runtime.getKey(allocator, {object_code}, \"{}\")",
                        escape_zig_string(key)
                    ),
                    (_, Type::Int) | (_, Type::Bool) => {
                        let index_code = self.int_code(index)?;
                        format!("try runtime.getIndex(allocator, {object_code}, {index_code})")
                    }
                    _ => {
                        let key_piece = self.emit_expr(index)?;
                        let key_code = self.borrowed_code(key_piece);
                        format!("try runtime.getItem(allocator, {object_code}, {key_code})")
                    }
                };
                Ok(Piece::new(code, Type::PyObject, true))
            }
        }
    }

    fn emit_list_literal(&mut self, elements: &[Expression]) -> EmitResult<Piece> {
        let label = self.fresh_label();
        let list = self.fresh_temp("list");
        let mut code = format!("{label}: {{\n");
        code.push_str(&self.line_in_block(&format!(
            "const {list} = try runtime.PyList.create(allocator);"
        )));
        for element in elements {
            let owned = self.owned_object_lines(element, &mut code)?;
            code.push_str(&self.line_in_block(&format!(
                "try runtime.PyList.append(allocator, {list}, {owned});"
            )));
        }
        code.push_str(&self.line_in_block(&format!("break :{label} {list};")));
        code.push_str(&self.indent_str());
        code.push('}');
        Ok(Piece::new(code, Type::List, true))
    }

    fn emit_dict_literal(&mut self, entries: &[(Expression, Expression)]) -> EmitResult<Piece> {
        let label = self.fresh_label();
        let dict = self.fresh_temp("dict");
        let mut code = format!("{label}: {{\n");
        code.push_str(&self.line_in_block(&format!(
            "const {dict} = try runtime.PyDict.create(allocator);"
        )));
        for (key, value) in entries {
            let key_code = self.owned_object_lines(key, &mut code)?;
            let value_code = self.owned_object_lines(value, &mut code)?;
            code.push_str(&self.line_in_block(&format!(
                "try runtime.PyDict.setItem(allocator, {dict}, {key_code}, {value_code});"
            )));
        }
        code.push_str(&self.line_in_block(&format!("break :{label} {dict};")));
        code.push_str(&self.indent_str());
        code.push('}');
        Ok(Piece::new(code, Type::Dict, true))
    }

    fn emit_tuple_literal(&mut self, elements: &[Expression]) -> EmitResult<Piece> {
        let label = self.fresh_label();
        let tuple = self.fresh_temp("tuple");
        let mut code = format!("{label}: {{\n");
        code.push_str(&self.line_in_block(&format!(
            "const {tuple} = try runtime.PyTuple.create(allocator, {});",
            elements.len()
        )));
        for (position, element) in elements.iter().enumerate() {
            let owned = self.owned_object_lines(element, &mut code)?;
            code.push_str(&self.line_in_block(&format!(
                "runtime.PyTuple.set({tuple}, {position}, {owned});"
            )));
        }
        code.push_str(&self.line_in_block(&format!("break :{label} {tuple};")));
        code.push_str(&self.indent_str());
        code.push('}');
        Ok(Piece::new(code, Type::Tuple, true))
    }

    /// Inline-owned object expression for container construction; borrowed
    /// sources gain an incref line inside the block.
    fn owned_object_lines(
        &mut self,
        expr: &Expression,
        block: &mut String,
    ) -> EmitResult<String> {
        let piece = self.emit_expr(expr)?;
        let piece = self.object_piece(piece)?;
        if piece.owned {
            Ok(piece.code)
        } else {
            block.push_str(&self.line_in_block(&format!("runtime.incref({});", piece.code)));
            Ok(piece.code)
        }
    }

    fn emit_binary_op(
        &mut self,
        whole: &Expression,
        left: &Expression,
        op: BinaryOperator,
        right: &Expression,
    ) -> EmitResult<Piece> {
        if op == BinaryOperator::Add && self.is_string_concat(whole) {
            return self.emit_concat_chain(whole);
        }

        match op {
            BinaryOperator::And | BinaryOperator::Or => {
                let l = self.bool_code(left)?;
                let r = self.bool_code(right)?;
                let word = if op == BinaryOperator::And { "and" } else { "or" };
                Ok(Piece::new(format!("({l} {word} {r})"), Type::Bool, false))
            }
            BinaryOperator::In => {
                let needle_piece = self.emit_expr(left)?;
                let needle = self.borrowed_object_code(needle_piece)?;
                let haystack_piece = self.emit_expr(right)?;
                let haystack = self.borrowed_code(haystack_piece);
                Ok(Piece::new(
                    format!("runtime.contains({haystack}, {needle})"),
                    Type::Bool,
                    false,
                ))
            }
            BinaryOperator::Is => {
                let l_piece = self.emit_expr(left)?;
                let l = self.borrowed_object_code(l_piece)?;
                let r_piece = self.emit_expr(right)?;
                let r = self.borrowed_object_code(r_piece)?;
                Ok(Piece::new(format!("({l} == {r})"), Type::Bool, false))
            }
            BinaryOperator::Equal | BinaryOperator::NotEqual => {
                let left_ty = self.type_of_expr(left);
                let right_ty = self.type_of_expr(right);
                if left_ty.is_heap() || right_ty.is_heap() {
                    let l_piece = self.emit_expr(left)?;
                    let l = self.borrowed_object_code(l_piece)?;
                    let r_piece = self.emit_expr(right)?;
                    let r = self.borrowed_object_code(r_piece)?;
                    let negate = if op == BinaryOperator::NotEqual { "!" } else { "" };
                    Ok(Piece::new(
                        format!("{negate}runtime.equals({l}, {r})"),
                        Type::Bool,
                        false,
                    ))
                } else {
                    let l = self.int_code(left)?;
                    let r = self.int_code(right)?;
                    let symbol = if op == BinaryOperator::Equal { "==" } else { "!=" };
                    Ok(Piece::new(
                        format!("({l} {symbol} {r})"),
                        Type::Bool,
                        false,
                    ))
                }
            }
            BinaryOperator::Less
            | BinaryOperator::LessEqual
            | BinaryOperator::Greater
            | BinaryOperator::GreaterEqual => {
                let symbol = match op {
                    BinaryOperator::Less => "<",
                    BinaryOperator::LessEqual => "<=",
                    BinaryOperator::Greater => ">",
                    _ => ">=",
                };
                if self.type_of_expr(left) == Type::Float
                    || self.type_of_expr(right) == Type::Float
                {
                    let l = self.float_code(left)?;
                    let r = self.float_code(right)?;
                    Ok(Piece::new(
                        format!("({l} {symbol} {r})"),
                        Type::Bool,
                        false,
                    ))
                } else {
                    let l = self.int_code(left)?;
                    let r = self.int_code(right)?;
                    Ok(Piece::new(
                        format!("({l} {symbol} {r})"),
                        Type::Bool,
                        false,
                    ))
                }
            }
            _ => {
                let float = self.type_of_expr(left) == Type::Float
                    || self.type_of_expr(right) == Type::Float;
                if float {
                    let l = self.float_code(left)?;
                    let r = self.float_code(right)?;
                    let code = match op {
                        BinaryOperator::Add => format!("({l} + {r})"),
                        BinaryOperator::Sub => format!("({l} - {r})"),
                        BinaryOperator::Mul => format!("({l} * {r})"),
                        BinaryOperator::Div => format!("({l} / {r})"),
                        BinaryOperator::FloorDiv => format!("@divFloor({l}, {r})"),
                        BinaryOperator::Mod => format!("@mod({l}, {r})"),
                        BinaryOperator::Pow => format!("std.math.pow(f64, {l}, {r})"),
                        _ => {
                            return Err(EmitError::Unsupported {
                                detail: "bitwise operation on floats".to_string(),
                                line: self.line,
                            });
                        }
                    };
                    return Ok(Piece::new(code, Type::Float, false));
                }
                let l = self.int_code(left)?;
                let r = self.int_code(right)?;
                let code = match op {
                    BinaryOperator::Add => format!("({l} + {r})"),
                    BinaryOperator::Sub => format!("({l} - {r})"),
                    BinaryOperator::Mul => format!("({l} * {r})"),
                    // Zig rejects bare `/` on runtime signed operands.
                    BinaryOperator::Div => format!("@divTrunc({l}, {r})"),
                    BinaryOperator::FloorDiv => format!("@divFloor({l}, {r})"),
                    BinaryOperator::Mod => format!("@mod({l}, {r})"),
                    BinaryOperator::Pow => format!("runtime.intPow({l}, {r})"),
                    BinaryOperator::LeftShift => format!("std.math.shl(i64, {l}, {r})"),
                    BinaryOperator::RightShift => format!("std.math.shr(i64, {l}, {r})"),
                    BinaryOperator::BitAnd => format!("({l} & {r})"),
                    BinaryOperator::BitXor => format!("({l} ^ {r})"),
                    BinaryOperator::BitOr => format!("({l} | {r})"),
                    _ => {
                        return Err(EmitError::Unsupported {
                            detail: "operator".to_string(),
                            line: self.line,
                        });
                    }
                };
                Ok(Piece::new(code, Type::Int, false))
            }
        }
    }

    /// String concatenation: flatten the Add chain, hold each part in a
    /// released temporary, then fold through PyString.concat; intermediate
    /// results are released too.
    fn emit_concat_chain(&mut self, expr: &Expression) -> EmitResult<Piece> {
        let mut parts = Vec::new();
        flatten_add_chain(expr, &mut parts);

        let mut part_names = Vec::new();
        for part in &parts {
            let piece = self.emit_expr(part)?;
            let piece = self.object_piece(piece)?;
            // Owned parts are parked in released temporaries; borrowed
            // bindings are used directly.
            let name = self.borrowed_code(piece);
            part_names.push(name);
        }

        let mut acc = part_names[0].clone();
        for (position, part) in part_names.iter().enumerate().skip(1) {
            if position + 1 == part_names.len() {
                return Ok(Piece::new(
                    format!("try runtime.PyString.concat(allocator, {acc}, {part})"),
                    Type::Str,
                    true,
                ));
            }
            let next = self.fresh_temp("concat");
            self.push_line(&format!(
                "const {next} = try runtime.PyString.concat(allocator, {acc}, {part});"
            ));
            self.push_line(&format!("defer runtime.decref({next}, allocator);"));
            acc = next;
        }
        // Single part: share it.
        self.push_line(&format!("runtime.incref({acc});"));
        Ok(Piece::new(acc, Type::Str, true))
    }

    // -- calls -------------------------------------------------------------

    fn emit_call(&mut self, callee: &Expression, args: &[Expression]) -> EmitResult<Piece> {
        match callee {
            Expression::Identifier(name) => self.emit_name_call(name, args),
            Expression::Attribute { object, name } => {
                if let Expression::Identifier(receiver) = object.as_ref() {
                    if let Some(module) = self.module_aliases.get(receiver).cloned() {
                        return self.emit_module_call(&module, name, args);
                    }
                }
                self.emit_method_call(object, name, args)
            }
            _ => Err(EmitError::Unsupported {
                detail: "call target".to_string(),
                line: self.line,
            }),
        }
    }

    fn emit_name_call(&mut self, name: &str, args: &[Expression]) -> EmitResult<Piece> {
        match name {
            "print" => {
                return Err(EmitError::Unsupported {
                    detail: "print() in expression position".to_string(),
                    line: self.line,
                });
            }
            "len" => {
                if args.len() != 1 {
                    return Err(EmitError::Unsupported {
                        detail: "len() expects one argument".to_string(),
                        line: self.line,
                    });
                }
                let piece = self.emit_expr(&args[0])?;
                let code = self.borrowed_code(piece);
                return Ok(Piece::new(
                    format!("try runtime.len(allocator, {code})"),
                    Type::Int,
                    false,
                ));
            }
            "range" | "enumerate" | "zip" => {
                return Err(EmitError::Unsupported {
                    detail: format!("{name}() outside a for-loop"),
                    line: self.line,
                });
            }
            _ => {}
        }

        if let Some((module, function)) = self.function_aliases.get(name).cloned() {
            return self.emit_module_call(&module, &function, args);
        }

        if let Some(class) = self.analysis.class(name).cloned() {
            if args.len() != class.init_params.len() {
                return Err(EmitError::Unsupported {
                    detail: format!(
                        "constructor {name}() expects {} arguments",
                        class.init_params.len()
                    ),
                    line: self.line,
                });
            }
            let mut rendered = Vec::new();
            for arg in args {
                rendered.push(self.int_code(arg)?);
            }
            return Ok(Piece::new(
                format!("{}.init({})", mangle(name), rendered.join(", ")),
                Type::Instance(name.to_string()),
                false,
            ));
        }

        let Some(info) = self.analysis.function(name).cloned() else {
            return Err(EmitError::Unsupported {
                detail: format!("unknown function '{name}'"),
                line: self.line,
            });
        };
        if args.len() != info.params.len() {
            return Err(EmitError::Unsupported {
                detail: format!("{name}() expects {} arguments", info.params.len()),
                line: self.line,
            });
        }

        let mut rendered = Vec::new();
        for (arg, (_, param_ty)) in args.iter().zip(&info.params) {
            let code = match param_ty {
                Type::Int => self.int_code(arg)?,
                Type::Bool => self.bool_code(arg)?,
                Type::Float => self.float_code(arg)?,
                _ => {
                    let piece = self.emit_expr(arg)?;
                    self.borrowed_object_code(piece)?
                }
            };
            rendered.push(code);
        }
        if info.needs_allocator {
            rendered.push("allocator".to_string());
        }
        let marker = if info.is_fallible() { "try " } else { "" };
        let ty = match info.return_type {
            Type::Void => Type::Void,
            Type::Int => Type::Int,
            _ => Type::PyObject,
        };
        let owned = ty == Type::PyObject;
        Ok(Piece::new(
            format!("{marker}{}({})", mangle(name), rendered.join(", ")),
            ty,
            owned,
        ))
    }

    /// `json.loads` / `json.dumps` / `http.get` lower directly to runtime
    /// helpers. A constant-literal `json.loads` is memoised through a
    /// nullable module slot under check-else-parse-else-store.
    fn emit_module_call(
        &mut self,
        module: &str,
        function: &str,
        args: &[Expression],
    ) -> EmitResult<Piece> {
        match (module, function) {
            ("json", "loads") => {
                if args.len() != 1 {
                    return Err(EmitError::Unsupported {
                        detail: "json.loads expects one argument".to_string(),
                        line: self.line,
                    });
                }
                if let Expression::String(literal) = &args[0] {
                    return Ok(self.emit_cached_json_literal(literal));
                }
                let piece = self.emit_expr(&args[0])?;
                let code = self.borrowed_code(piece);
                Ok(Piece::new(
                    format!(
                        "try runtime.jsonLoads(allocator, runtime.PyString.value({code}))"
                    ),
                    Type::PyObject,
                    true,
                ))
            }
            ("json", "dumps") => {
                if args.len() != 1 {
                    return Err(EmitError::Unsupported {
                        detail: "json.dumps expects one argument".to_string(),
                        line: self.line,
                    });
                }
                let piece = self.emit_expr(&args[0])?;
                let code = self.borrowed_code(piece);
                Ok(Piece::new(
                    format!("try runtime.jsonDumps(allocator, {code})"),
                    Type::Str,
                    true,
                ))
            }
            ("http", "get") => {
                if args.len() != 1 {
                    return Err(EmitError::Unsupported {
                        detail: "http.get expects one argument".to_string(),
                        line: self.line,
                    });
                }
                let piece = self.emit_expr(&args[0])?;
                let code = self.borrowed_code(piece);
                Ok(Piece::new(
                    format!("try runtime.httpGet(allocator, {code})"),
                    Type::Tuple,
                    true,
                ))
            }
            _ => Err(EmitError::Unsupported {
                detail: format!("unknown module function {module}.{function}"),
                line: self.line,
            }),
        }
    }

    /// One slot per distinct literal text; lexically different but
    /// equivalent JSON gets separate slots.
    fn emit_cached_json_literal(&mut self, literal: &str) -> Piece {
        let slot = match self.json_slots.get(literal) {
            Some(existing) => existing.clone(),
            None => {
                let slot = format!("__json_slot_{}", self.json_slots.len());
                self.preamble
                    .push(format!("var {slot}: ?*runtime.PyObject = null;"));
                self.json_slots.insert(literal.to_string(), slot.clone());
                slot
            }
        };
        let label = self.fresh_label();
        let escaped = escape_zig_string(literal);
        let mut code = format!("{label}: {{\n");
        code.push_str(&self.line_in_block(&format!("if ({slot}) |cached| {{")));
        code.push_str(&self.line_in_block("    runtime.incref(cached);"));
        code.push_str(&self.line_in_block(&format!("    break :{label} cached;")));
        code.push_str(&self.line_in_block("}"));
        code.push_str(&self.line_in_block(&format!(
            "const parsed = try runtime.jsonLoads(allocator, \"{escaped}\");"
        )));
        code.push_str(&self.line_in_block("runtime.incref(parsed);"));
        code.push_str(&self.line_in_block(&format!("{slot} = parsed;")));
        code.push_str(&self.line_in_block(&format!("break :{label} parsed;")));
        code.push_str(&self.indent_str());
        code.push('}');
        Piece::new(code, Type::PyObject, true)
    }

    fn emit_method_call(
        &mut self,
        object: &Expression,
        method: &str,
        args: &[Expression],
    ) -> EmitResult<Piece> {
        let receiver_piece = self.emit_expr(object)?;

        if let Type::Instance(class_name) = receiver_piece.ty.clone() {
            let Some(class) = self.analysis.class(&class_name).cloned() else {
                return Err(EmitError::Unsupported {
                    detail: format!("unknown class '{class_name}'"),
                    line: self.line,
                });
            };
            let Some(info) = class.method(method).cloned() else {
                return Err(EmitError::Unsupported {
                    detail: format!("unknown method '{method}' on class {class_name}"),
                    line: self.line,
                });
            };
            if args.len() != info.params.len() {
                return Err(EmitError::Unsupported {
                    detail: format!("{method}() expects {} arguments", info.params.len()),
                    line: self.line,
                });
            }
            let mut rendered = Vec::new();
            for arg in args {
                rendered.push(self.int_code(arg)?);
            }
            let ty = if info.has_return { Type::Int } else { Type::Void };
            return Ok(Piece::new(
                format!(
                    "{}.{}({})",
                    receiver_piece.code,
                    mangle(method),
                    rendered.join(", ")
                ),
                ty,
                false,
            ));
        }

        let receiver_ty = receiver_piece.ty.clone();
        let recv = self.borrowed_code(receiver_piece);
        self.dispatch_runtime_method(&receiver_ty, &recv, method, args)
    }

    /// Method calls on built-in value types dispatch through a fixed table
    /// of runtime helpers; the receiver's coarse tag picks between the
    /// string and list variants of shared names.
    fn dispatch_runtime_method(
        &mut self,
        receiver_ty: &Type,
        recv: &str,
        method: &str,
        args: &[Expression],
    ) -> EmitResult<Piece> {
        let arity = |expected: usize, this: &Self| -> EmitResult<()> {
            if args.len() != expected {
                Err(EmitError::Unsupported {
                    detail: format!("{method}() expects {expected} arguments"),
                    line: this.line,
                })
            } else {
                Ok(())
            }
        };

        match method {
            // String transforms returning fresh strings.
            "upper" | "lower" | "strip" | "lstrip" | "rstrip" | "capitalize" | "title"
            | "swapcase" => {
                arity(0, self)?;
                Ok(Piece::new(
                    format!("try runtime.PyString.{method}(allocator, {recv})"),
                    Type::Str,
                    true,
                ))
            }
            "replace" => {
                arity(2, self)?;
                let from = self.argument_object(&args[0])?;
                let to = self.argument_object(&args[1])?;
                Ok(Piece::new(
                    format!("try runtime.PyString.replace(allocator, {recv}, {from}, {to})"),
                    Type::Str,
                    true,
                ))
            }
            "center" => {
                arity(1, self)?;
                let width = self.int_code(&args[0])?;
                Ok(Piece::new(
                    format!("try runtime.PyString.center(allocator, {recv}, {width})"),
                    Type::Str,
                    true,
                ))
            }
            "join" => {
                arity(1, self)?;
                let values = self.argument_object(&args[0])?;
                Ok(Piece::new(
                    format!("try runtime.PyString.join(allocator, {recv}, {values})"),
                    Type::Str,
                    true,
                ))
            }
            "split" => match args.len() {
                0 => Ok(Piece::new(
                    format!("try runtime.PyString.split(allocator, {recv})"),
                    Type::List,
                    true,
                )),
                1 => {
                    let sep = self.argument_object(&args[0])?;
                    Ok(Piece::new(
                        format!("try runtime.PyString.splitSep(allocator, {recv}, {sep})"),
                        Type::List,
                        true,
                    ))
                }
                _ => Err(EmitError::Unsupported {
                    detail: "split() expects at most one argument".to_string(),
                    line: self.line,
                }),
            },
            "startswith" | "endswith" => {
                arity(1, self)?;
                let probe = self.argument_object(&args[0])?;
                Ok(Piece::new(
                    format!("try runtime.PyString.{method}({recv}, {probe})"),
                    Type::PyObject,
                    true,
                ))
            }
            "isdigit" | "isalpha" => {
                arity(0, self)?;
                Ok(Piece::new(
                    format!("try runtime.PyString.{method}({recv})"),
                    Type::PyObject,
                    true,
                ))
            }
            "find" => {
                arity(1, self)?;
                let needle = self.argument_object(&args[0])?;
                Ok(Piece::new(
                    format!("try runtime.PyString.find({recv}, {needle})"),
                    Type::Int,
                    false,
                ))
            }
            "count" | "index" => {
                arity(1, self)?;
                let value = self.argument_object(&args[0])?;
                let namespace = if *receiver_ty == Type::Str {
                    "PyString"
                } else {
                    "PyList"
                };
                Ok(Piece::new(
                    format!("try runtime.{namespace}.{method}({recv}, {value})"),
                    Type::Int,
                    false,
                ))
            }
            "append" => {
                arity(1, self)?;
                let value = self.owned_argument(&args[0])?;
                Ok(Piece::new(
                    format!("try runtime.PyList.append(allocator, {recv}, {value})"),
                    Type::Void,
                    false,
                ))
            }
            "pop" => {
                arity(0, self)?;
                Ok(Piece::new(
                    format!("try runtime.PyList.pop(allocator, {recv})"),
                    Type::PyObject,
                    true,
                ))
            }
            "extend" => {
                arity(1, self)?;
                let other = self.argument_object(&args[0])?;
                Ok(Piece::new(
                    format!("try runtime.PyList.extend(allocator, {recv}, {other})"),
                    Type::Void,
                    false,
                ))
            }
            "reverse" => {
                arity(0, self)?;
                Ok(Piece::new(
                    format!("runtime.PyList.reverse({recv})"),
                    Type::Void,
                    false,
                ))
            }
            "remove" => {
                arity(1, self)?;
                let value = self.argument_object(&args[0])?;
                Ok(Piece::new(
                    format!("try runtime.PyList.remove(allocator, {recv}, {value})"),
                    Type::Void,
                    false,
                ))
            }
            "insert" => {
                arity(2, self)?;
                let position = self.int_code(&args[0])?;
                let value = self.owned_argument(&args[1])?;
                Ok(Piece::new(
                    format!("try runtime.PyList.insert(allocator, {recv}, {position}, {value})"),
                    Type::Void,
                    false,
                ))
            }
            "clear" => {
                arity(0, self)?;
                Ok(Piece::new(
                    format!("runtime.PyList.clear(allocator, {recv})"),
                    Type::Void,
                    false,
                ))
            }
            "sort" => {
                arity(0, self)?;
                Ok(Piece::new(
                    format!("runtime.PyList.sort({recv})"),
                    Type::Void,
                    false,
                ))
            }
            "copy" | "reversed" => {
                arity(0, self)?;
                Ok(Piece::new(
                    format!("try runtime.PyList.{method}(allocator, {recv})"),
                    Type::List,
                    true,
                ))
            }
            "keys" | "values" => {
                arity(0, self)?;
                Ok(Piece::new(
                    format!("try runtime.PyDict.{method}(allocator, {recv})"),
                    Type::List,
                    true,
                ))
            }
            "items" => {
                arity(0, self)?;
                Ok(Piece::new(
                    format!("try runtime.PyDict.entryList(allocator, {recv})"),
                    Type::List,
                    true,
                ))
            }
            "get" => {
                if args.is_empty() || args.len() > 2 {
                    return Err(EmitError::Unsupported {
                        detail: "get() expects one or two arguments".to_string(),
                        line: self.line,
                    });
                }
                let key = self.argument_object(&args[0])?;
                let default = if args.len() == 2 {
                    self.argument_object(&args[1])?
                } else {
                    "runtime.none()".to_string()
                };
                Ok(Piece::new(
                    format!("try runtime.PyDict.get(allocator, {recv}, {key}, {default})"),
                    Type::PyObject,
                    true,
                ))
            }
            "update" => {
                arity(1, self)?;
                let other = self.argument_object(&args[0])?;
                Ok(Piece::new(
                    format!("try runtime.PyDict.update(allocator, {recv}, {other})"),
                    Type::Void,
                    false,
                ))
            }
            _ => Err(EmitError::Unsupported {
                detail: format!("unknown method '{method}'"),
                line: self.line,
            }),
        }
    }

    // -- coercions ---------------------------------------------------------

    fn type_of_expr(&self, expr: &Expression) -> Type {
        let scope = self.current_scope();
        infer_expr_type(self.analysis, scope, expr)
    }

    fn is_string_concat(&self, expr: &Expression) -> bool {
        analyzer::expr_is_string_concat(self.analysis, self.current_scope(), expr)
    }

    fn current_scope(&self) -> &Scope {
        match &self.scope_key {
            Some(key) => self
                .analysis
                .scopes
                .get(key)
                .unwrap_or(&self.analysis.module_scope),
            None => &self.analysis.module_scope,
        }
    }

    fn lookup_type(&self, name: &str) -> Option<Type> {
        let scope = self.current_scope();
        scope
            .type_of(name)
            .or_else(|| self.analysis.module_scope.type_of(name))
            .cloned()
    }

    fn is_reassigned(&self, name: &str) -> bool {
        self.current_scope().is_reassigned(name)
            || (self.scope_key.is_none() && self.analysis.module_scope.is_reassigned(name))
    }

    /// i64-valued code for an expression.
    fn int_code(&mut self, expr: &Expression) -> EmitResult<String> {
        let piece = self.emit_expr(expr)?;
        match piece.ty {
            Type::Int => Ok(piece.code),
            Type::Bool => Ok(format!("@intFromBool({})", piece.code)),
            Type::Float => Ok(format!("@as(i64, @intFromFloat({}))", piece.code)),
            Type::Instance(_) | Type::Void => Err(EmitError::Unsupported {
                detail: "integer value expected".to_string(),
                line: self.line,
            }),
            _ => {
                let code = self.borrowed_code(piece);
                Ok(format!("try runtime.asInt({code})"))
            }
        }
    }

    fn float_code(&mut self, expr: &Expression) -> EmitResult<String> {
        let piece = self.emit_expr(expr)?;
        match piece.ty {
            Type::Float => Ok(piece.code),
            Type::Int => Ok(format!("@as(f64, @floatFromInt({}))", piece.code)),
            Type::Bool => Ok(format!(
                "@as(f64, @floatFromInt(@intFromBool({})))",
                piece.code
            )),
            _ => {
                let code = self.borrowed_code(piece);
                Ok(format!("try runtime.asFloat({code})"))
            }
        }
    }

    /// Boolean condition code. Comparisons pass through; integers test
    /// against zero; runtime objects go through truthy().
    fn bool_code(&mut self, expr: &Expression) -> EmitResult<String> {
        let piece = self.emit_expr(expr)?;
        match piece.ty {
            Type::Bool => Ok(piece.code),
            Type::Int => Ok(format!("({}) != 0", piece.code)),
            Type::Float => Ok(format!("({}) != 0", piece.code)),
            Type::Instance(_) | Type::Void => Err(EmitError::Unsupported {
                detail: "condition value expected".to_string(),
                line: self.line,
            }),
            _ => Ok(format!("runtime.truthy({})", piece.code)),
        }
    }

    /// Coerces a piece to a *PyObject piece, boxing native values.
    fn object_piece(&mut self, piece: Piece) -> EmitResult<Piece> {
        match piece.ty {
            Type::Int => Ok(Piece::new(
                format!("try runtime.PyInt.create(allocator, {})", piece.code),
                Type::PyObject,
                true,
            )),
            Type::Float => Ok(Piece::new(
                format!("try runtime.PyFloat.create(allocator, {})", piece.code),
                Type::PyObject,
                true,
            )),
            Type::Bool => Ok(Piece::new(
                format!("runtime.boolean({})", piece.code),
                Type::PyObject,
                false,
            )),
            Type::Instance(_) | Type::Void => Err(EmitError::Unsupported {
                detail: "runtime value expected".to_string(),
                line: self.line,
            }),
            _ => Ok(piece),
        }
    }

    /// A borrowed-usable reference: owned pieces are parked in a released
    /// temporary first.
    fn borrowed_code(&mut self, piece: Piece) -> String {
        if piece.owned {
            self.materialize(piece)
        } else {
            piece.code
        }
    }

    fn borrowed_object_code(&mut self, piece: Piece) -> EmitResult<String> {
        let piece = self.object_piece(piece)?;
        Ok(self.borrowed_code(piece))
    }

    /// Borrowed object argument for runtime helpers that do not take
    /// ownership.
    fn argument_object(&mut self, expr: &Expression) -> EmitResult<String> {
        let piece = self.emit_expr(expr)?;
        self.borrowed_object_code(piece)
    }

    /// Owned object argument for runtime helpers that take ownership
    /// (append, insert, setItem); borrowed sources are increfed first.
    fn owned_argument(&mut self, expr: &Expression) -> EmitResult<String> {
        let piece = self.emit_expr(expr)?;
        let piece = self.object_piece(piece)?;
        if piece.owned {
            Ok(piece.code)
        } else {
            self.push_line(&format!("runtime.incref({});", piece.code));
            Ok(piece.code)
        }
    }

    fn materialize(&mut self, piece: Piece) -> String {
        let temp = self.fresh_temp("t");
        self.push_line(&format!("const {temp} = {};", piece.code));
        self.push_line(&format!("defer runtime.decref({temp}, allocator);"));
        temp
    }

    // -- plumbing ----------------------------------------------------------

    fn enter_scope<'s>(
        &mut self,
        key: String,
        params: impl Iterator<Item = &'s str>,
        return_type: Type,
    ) {
        self.scope_key = Some(key);
        self.declared = params.map(str::to_string).collect();
        self.current_return = return_type;
    }

    fn leave_scope(&mut self) {
        self.scope_key = None;
        self.declared = HashSet::new();
        self.current_return = Type::Void;
    }

    fn fresh_temp(&mut self, prefix: &str) -> String {
        let id = self.temp_counter;
        self.temp_counter += 1;
        format!("__{prefix}_{id}")
    }

    fn fresh_label(&mut self) -> String {
        let id = self.temp_counter;
        self.temp_counter += 1;
        format!("blk{id}")
    }

    fn push_line(&mut self, line: &str) {
        if line.is_empty() {
            self.out.push('\n');
            return;
        }
        for _ in 0..self.indent_level {
            self.out.push_str("    ");
        }
        self.out.push_str(line);
        self.out.push('\n');
    }

    fn indent_str(&self) -> String {
        "    ".repeat(self.indent_level)
    }

    fn line_in_block(&self, line: &str) -> String {
        format!("{}    {line}\n", self.indent_str())
    }
}

/// Strips one redundant outer paren layer so conditions render as
/// `if (a < b)` rather than `if ((a < b))`.
fn as_condition(code: &str) -> String {
    if code.starts_with('(') && code.ends_with(')') {
        let inner = &code[1..code.len() - 1];
        let mut depth = 0i32;
        let mut wraps = true;
        for c in inner.chars() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth < 0 {
                        wraps = false;
                        break;
                    }
                }
                _ => {}
            }
        }
        if wraps && depth == 0 {
            return inner.to_string();
        }
    }
    code.to_string()
}

fn is_plain_name(code: &str) -> bool {
    !code.is_empty()
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn flatten_add_chain<'e>(expr: &'e Expression, parts: &mut Vec<&'e Expression>) {
    match expr {
        Expression::BinaryOp {
            left,
            op: BinaryOperator::Add,
            right,
        } => {
            flatten_add_chain(left, parts);
            flatten_add_chain(right, parts);
        }
        other => parts.push(other),
    }
}

fn zig_param_type(ty: &Type) -> &'static str {
    match ty {
        Type::Int => "i64",
        Type::Bool => "bool",
        Type::Float => "f64",
        _ => "*runtime.PyObject",
    }
}

fn zig_return_type(ty: &Type) -> &'static str {
    match ty {
        Type::Int => "i64",
        Type::Void => "void",
        _ => "*runtime.PyObject",
    }
}

const ZIG_KEYWORDS: &[&str] = &[
    "addrspace",
    "align",
    "allowzero",
    "and",
    "anyframe",
    "anytype",
    "asm",
    "async",
    "await",
    "break",
    "callconv",
    "catch",
    "comptime",
    "const",
    "continue",
    "defer",
    "else",
    "enum",
    "errdefer",
    "error",
    "export",
    "extern",
    "fn",
    "for",
    "if",
    "inline",
    "linksection",
    "noalias",
    "noinline",
    "nosuspend",
    "opaque",
    "or",
    "orelse",
    "packed",
    "pub",
    "resume",
    "return",
    "struct",
    "suspend",
    "switch",
    "test",
    "threadlocal",
    "try",
    "union",
    "unreachable",
    "usingnamespace",
    "var",
    "volatile",
    "while",
];

/// Names the emitted module itself claims.
const RESERVED_NAMES: &[&str] = &["std", "runtime", "allocator", "main", "gpa"];

fn mangle(name: &str) -> String {
    if ZIG_KEYWORDS.contains(&name) || RESERVED_NAMES.contains(&name) {
        format!("{name}_")
    } else {
        name.to_string()
    }
}

fn body_mentions(body: &[Statement], name: &str) -> bool {
    body.iter().any(|s| statement_mentions(s, name))
}

fn statement_mentions(statement: &Statement, name: &str) -> bool {
    match statement {
        Statement::Assign { target, value, .. } => {
            let target_hit = match target {
                AssignTarget::Name(n) => n == name,
                AssignTarget::Tuple(names) => names.iter().any(|n| n == name),
                AssignTarget::Attribute { object, .. } => expr_mentions(object, name),
            };
            target_hit || expr_mentions(value, name)
        }
        Statement::Expr { value, .. } => expr_mentions(value, name),
        Statement::Return { value, .. } => {
            value.as_ref().is_some_and(|v| expr_mentions(v, name))
        }
        Statement::If {
            condition,
            then_body,
            else_body,
            ..
        } => {
            expr_mentions(condition, name)
                || body_mentions(then_body, name)
                || body_mentions(else_body, name)
        }
        Statement::While {
            condition, body, ..
        } => expr_mentions(condition, name) || body_mentions(body, name),
        Statement::For {
            target,
            iterable,
            body,
            ..
        } => {
            target.names.iter().any(|n| n == name)
                || expr_mentions(iterable, name)
                || body_mentions(body, name)
        }
        _ => false,
    }
}

fn expr_mentions(expr: &Expression, name: &str) -> bool {
    match expr {
        Expression::Identifier(n) => n == name,
        Expression::List(items) | Expression::Tuple(items) => {
            items.iter().any(|e| expr_mentions(e, name))
        }
        Expression::Dict(entries) => entries
            .iter()
            .any(|(k, v)| expr_mentions(k, name) || expr_mentions(v, name)),
        Expression::BinaryOp { left, right, .. } => {
            expr_mentions(left, name) || expr_mentions(right, name)
        }
        Expression::UnaryOp { operand, .. } => expr_mentions(operand, name),
        Expression::Conditional {
            condition,
            then_value,
            else_value,
        } => {
            expr_mentions(condition, name)
                || expr_mentions(then_value, name)
                || expr_mentions(else_value, name)
        }
        Expression::Call { callee, args } => {
            expr_mentions(callee, name) || args.iter().any(|a| expr_mentions(a, name))
        }
        Expression::Attribute { object, .. } => expr_mentions(object, name),
        Expression::Subscript { object, index } => {
            expr_mentions(object, name) || expr_mentions(index, name)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;
    use crate::parser::parse_source;
    use indoc::indoc;

    fn emit(source: &str) -> String {
        let program = parse_source(source).expect("parse failed");
        let analysis = analyze(&program);
        emit_program(&program, &analysis).expect("emit failed")
    }

    fn emit_err(source: &str) -> EmitError {
        let program = parse_source(source).expect("parse failed");
        let analysis = analyze(&program);
        emit_program(&program, &analysis).expect_err("expected emit failure")
    }

    #[test]
    fn emits_pure_int_function() {
        let zig = emit(indoc! {"
            def f(n):
                return n
            print(f(7))
        "});
        assert!(zig.contains("fn f(n: i64) i64 {"));
        assert!(zig.contains("runtime.printInt(f(7));"));
        assert!(zig.contains("pub fn main() !void {"));
        // No allocator anywhere in a pure-int program.
        assert!(!zig.contains("GeneralPurposeAllocator"));
    }

    #[test]
    fn emits_recursion_without_allocator() {
        let zig = emit(indoc! {"
            def fibonacci(n):
                if n < 2:
                    return n
                return fibonacci(n - 1) + fibonacci(n - 2)

            print(fibonacci(10))
        "});
        assert!(zig.contains("fn fibonacci(n: i64) i64 {"));
        assert!(zig.contains("if (n < 2) {"));
        assert!(zig.contains("return (fibonacci((n - 1)) + fibonacci((n - 2)));"));
    }

    #[test]
    fn string_bindings_get_scoped_release() {
        let zig = emit(indoc! {"
            a = \"Hello\"
            b = \"World\"
            print(a + \", \" + b + \"!\")
        "});
        assert!(zig.contains("const a = try runtime.PyString.create(allocator, \"Hello\");"));
        assert!(zig.contains("defer runtime.decref(a, allocator);"));
        assert!(zig.contains("runtime.PyString.concat(allocator,"));
        assert!(zig.contains("var gpa = std.heap.GeneralPurposeAllocator(.{}){};"));
    }

    #[test]
    fn reassigned_heap_binding_releases_old_value() {
        let zig = emit(indoc! {"
            s = \"a\"
            s = \"b\"
        "});
        assert!(zig.contains("var s: *runtime.PyObject = try runtime.PyString.create(allocator, \"a\");"));
        assert!(zig.contains("= try runtime.PyString.create(allocator, \"b\");"));
        // New value first, then release of the old binding.
        assert!(zig.contains("runtime.decref(s, allocator);"));
    }

    #[test]
    fn list_literal_appends_and_len() {
        let zig = emit(indoc! {"
            xs = [1, 2, 3]
            xs.append(4)
            print(len(xs))
        "});
        assert!(zig.contains("try runtime.PyList.create(allocator)"));
        assert!(zig.contains(
            "try runtime.PyList.append(allocator, xs, try runtime.PyInt.create(allocator, 4));"
        ));
        assert!(zig.contains("runtime.printInt(try runtime.len(allocator, xs));"));
    }

    #[test]
    fn range_loop_lowers_to_while() {
        let zig = emit(indoc! {"
            for i in range(3):
                print(i)
        "});
        assert!(zig.contains("var i: i64 = 0;"));
        assert!(zig.contains("while (i < 3) {"));
        assert!(zig.contains("i += 1;"));
    }

    #[test]
    fn range_with_start_and_step() {
        let zig = emit(indoc! {"
            for i in range(2, 10, 3):
                print(i)
        "});
        assert!(zig.contains("var i: i64 = 2;"));
        assert!(zig.contains("while (i < 10) {"));
        assert!(zig.contains("i += 3;"));
    }

    #[test]
    fn enumerate_lowers_to_indexed_for() {
        let zig = emit(indoc! {"
            xs = [1, 2]
            for i, v in enumerate(xs):
                print(i)
                print(v)
        "});
        assert!(zig.contains("for (runtime.PyList.items(xs), 0..) |v, "));
        assert!(zig.contains(": i64 = @intCast("));
    }

    #[test]
    fn zip_lowers_to_parallel_for_over_min_length() {
        let zig = emit(indoc! {"
            a = [1, 2]
            b = [3, 4]
            for x, y in zip(a, b):
                print(x)
                print(y)
        "});
        assert!(zig.contains("runtime.PyList.items(a);"));
        assert!(zig.contains("@min("));
        assert!(zig.contains(") |x, y| {"));
    }

    #[test]
    fn class_lowers_to_struct_with_init_and_methods() {
        let zig = emit(indoc! {"
            class C:
                def __init__(self, x):
                    self.x = x

                def g(self):
                    return self.x + 1

            c = C(41)
            print(c.g())
        "});
        assert!(zig.contains("const C = struct {"));
        assert!(zig.contains("x: i64,"));
        assert!(zig.contains("fn init(x: i64) C {"));
        assert!(zig.contains("fn g(self: *C) i64 {"));
        assert!(zig.contains("return (self.x + 1);"));
        assert!(zig.contains("var c = C.init(41);"));
        assert!(zig.contains("runtime.printInt(c.g());"));
    }

    #[test]
    fn async_function_lowers_to_frame_and_wrapper() {
        let zig = emit(indoc! {"
            async def compute(n):
                return n + 1

            print(compute(41))
        "});
        assert!(zig.contains("const compute_Frame = struct {"));
        assert!(zig.contains("const State = enum { start, running, done };"));
        assert!(zig.contains("fn step(self: *compute_Frame) i64 {"));
        assert!(zig.contains("self.state = .running;"));
        assert!(zig.contains("self.state = .done;"));
        assert!(zig.contains("var frame = compute_Frame.init(n);"));
        assert!(zig.contains("return frame.step();"));
    }

    #[test]
    fn json_loads_literal_is_memoised() {
        let zig = emit(indoc! {"
            from json import loads
            cfg = loads(\"{\\\"k\\\": 1}\")
            cfg2 = loads(\"{\\\"k\\\": 1}\")
        "});
        assert!(zig.contains("var __json_slot_0: ?*runtime.PyObject = null;"));
        // One slot for two identical literals.
        assert!(!zig.contains("__json_slot_1"));
        assert!(zig.contains("if (__json_slot_0) |cached| {"));
        assert!(zig.contains("runtime.incref(cached);"));
        assert!(zig.contains("try runtime.jsonLoads(allocator,"));
    }

    #[test]
    fn distinct_json_literals_get_distinct_slots() {
        let zig = emit(indoc! {"
            from json import loads
            a = loads(\"[1]\")
            b = loads(\"[2]\")
        "});
        assert!(zig.contains("__json_slot_0"));
        assert!(zig.contains("__json_slot_1"));
    }

    #[test]
    fn http_get_lowers_to_runtime_helper() {
        let zig = emit(indoc! {"
            from http import get
            status = get(\"http://example.com\")
        "});
        assert!(zig.contains("try runtime.httpGet(allocator,"));
    }

    #[test]
    fn rejects_unknown_imports() {
        let err = emit_err("import os\n");
        assert!(matches!(err, EmitError::UnsupportedImport { .. }));
        let err = emit_err("from json import encode\n");
        assert!(matches!(err, EmitError::UnsupportedImport { .. }));
    }

    #[test]
    fn rejects_unsupported_for_iterables() {
        let err = emit_err(indoc! {"
            xs = [1]
            for x in xs:
                print(x)
        "});
        assert!(matches!(err, EmitError::UnsupportedForLoop { .. }));
    }

    #[test]
    fn rejects_bad_range_args() {
        let err = emit_err(indoc! {"
            for x in range():
                print(x)
        "});
        assert!(matches!(err, EmitError::InvalidRangeArgs { .. }));
        let err = emit_err(indoc! {"
            for x, y in range(3):
                print(x)
        "});
        assert!(matches!(err, EmitError::InvalidRangeArgs { .. }));
    }

    #[test]
    fn rejects_bad_enumerate_and_zip_targets() {
        let err = emit_err(indoc! {"
            xs = [1]
            for v in enumerate(xs):
                print(v)
        "});
        assert!(matches!(err, EmitError::InvalidEnumerateTarget { .. }));
        let err = emit_err(indoc! {"
            a = [1]
            b = [2]
            for x in zip(a, b):
                print(x)
        "});
        assert!(matches!(err, EmitError::InvalidZipTarget { .. }));
    }

    #[test]
    fn fallible_functions_get_try_markers() {
        let zig = emit(indoc! {"
            def greet(name):
                return name + \"!\"

            s = greet(\"zyth\")
            print(s)
        "});
        assert!(zig.contains("fn greet(name: *runtime.PyObject, allocator: std.mem.Allocator) !*runtime.PyObject {"));
        assert!(zig.contains("try greet("));
    }

    #[test]
    fn returned_binding_is_shared_not_double_released() {
        let zig = emit(indoc! {"
            def make():
                s = \"x\"
                return s

            t = make()
            print(t)
        "});
        // The local keeps its defer; the return path increfs to transfer.
        assert!(zig.contains("defer runtime.decref(s, allocator);"));
        assert!(zig.contains("runtime.incref(s);"));
        assert!(zig.contains("return s;"));
    }

    #[test]
    fn integer_division_and_power_lower_to_runtime_safe_forms() {
        let zig = emit(indoc! {"
            a = 7 // 2
            b = 7 % 3
            c = 2 ** 8
            d = 7 / 2
            e = 1 << 4
        "});
        assert!(zig.contains("@divFloor(7, 2)"));
        assert!(zig.contains("@mod(7, 3)"));
        assert!(zig.contains("runtime.intPow(2, 8)"));
        assert!(zig.contains("@divTrunc(7, 2)"));
        assert!(zig.contains("std.math.shl(i64, 1, 4)"));
    }

    #[test]
    fn emission_is_deterministic() {
        let source = indoc! {"
            def greet(name):
                return name + \"!\"

            s = greet(\"a\")
            xs = [1, 2]
            xs.append(3)
            print(len(xs))
            print(s)
        "};
        assert_eq!(emit(source), emit(source));
    }

    #[test]
    fn module_contains_runtime_namespace_once() {
        let zig = emit("x = 1\n");
        assert_eq!(zig.matches("const runtime = struct {").count(), 1);
        assert!(zig.starts_with("const std = @import(\"std\");"));
    }

    #[test]
    fn keyword_names_are_mangled() {
        let zig = emit("test = 1\nprint(test)\n");
        assert!(zig.contains("const test_ = 1;"));
        assert!(zig.contains("runtime.printInt(test_);"));
    }

    #[test]
    fn docstrings_do_not_reach_emission() {
        let zig = emit(indoc! {"
            def f():
                \"\"\"Doc.\"\"\"
                return 1

            print(f())
        "});
        assert!(!zig.contains("Doc."));
    }

    #[test]
    fn subscript_produces_released_reference() {
        let zig = emit(indoc! {"
            xs = [1, 2]
            a = xs[0]
            print(a)
        "});
        assert!(zig.contains("const a = try runtime.getIndex(allocator, xs, 0);"));
        assert!(zig.contains("defer runtime.decref(a, allocator);"));
    }

    #[test]
    fn string_method_calls_dispatch_through_table() {
        let zig = emit(indoc! {"
            s = \"hi\"
            u = s.upper()
            parts = s.split()
            n = s.find(\"h\")
            print(u)
        "});
        assert!(zig.contains("try runtime.PyString.upper(allocator, s)"));
        assert!(zig.contains("try runtime.PyString.split(allocator, s)"));
        assert!(zig.contains("try runtime.PyString.find(s,"));
    }

    #[test]
    fn dict_literal_and_methods() {
        let zig = emit(indoc! {"
            d = {\"a\": 1}
            ks = d.keys()
            v = d.get(\"a\")
            print(len(ks))
        "});
        assert!(zig.contains("try runtime.PyDict.create(allocator)"));
        assert!(zig.contains("try runtime.PyDict.setItem(allocator,"));
        assert!(zig.contains("try runtime.PyDict.keys(allocator, d)"));
        assert!(zig.contains("try runtime.PyDict.get(allocator, d,"));
    }
}
