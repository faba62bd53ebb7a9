use swc_core::{
    common::Spanned,
    ecma::{
        ast::*,
        visit::{Visit, VisitWith},
    },
};

use crate::model::Position;
use crate::parse::ParsedSource;

// -----------------------------------------------------------------------------
// Callable shapes
// -----------------------------------------------------------------------------

/// The declaration forms a named method can take.
#[derive(Clone, Debug)]
pub enum Callable {
    /// `function name() {}`
    FunctionDecl(FnDecl),
    /// `class A { name() {} }`
    ClassMethod(ClassMethod),
    /// `({ name() {} })`
    ObjectMethod(MethodProp),
    /// `const name = () => {}`
    ArrowVariable(VarDeclarator),
}

fn prop_name(key: &PropName) -> Option<String> {
    match key {
        PropName::Ident(i) => Some(i.sym.to_string()),
        PropName::Str(s) => Some(s.value.to_string()),
        _ => None,
    }
}

impl Callable {
    pub fn name(&self) -> Option<String> {
        match self {
            Callable::FunctionDecl(f) => Some(f.ident.sym.to_string()),
            Callable::ClassMethod(m) => prop_name(&m.key),
            Callable::ObjectMethod(m) => prop_name(&m.key),
            Callable::ArrowVariable(d) => d.name.as_ident().map(|b| b.id.sym.to_string()),
        }
    }

    /// Block body. `None` for bodiless declarations and expression-bodied
    /// arrows.
    pub fn body(&self) -> Option<&BlockStmt> {
        match self {
            Callable::FunctionDecl(f) => f.function.body.as_ref(),
            Callable::ClassMethod(m) => m.function.body.as_ref(),
            Callable::ObjectMethod(m) => m.function.body.as_ref(),
            Callable::ArrowVariable(d) => match d.init.as_deref() {
                Some(Expr::Arrow(arrow)) => match &*arrow.body {
                    BlockStmtOrExpr::BlockStmt(block) => Some(block),
                    BlockStmtOrExpr::Expr(_) => None,
                },
                _ => None,
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Callable::FunctionDecl(_) => "function",
            Callable::ClassMethod(_) => "class-method",
            Callable::ObjectMethod(_) => "object-method",
            Callable::ArrowVariable(_) => "arrow-variable",
        }
    }
}

// -----------------------------------------------------------------------------
// Traversal
// -----------------------------------------------------------------------------

/// Walks the whole tree and offers every callable shape to `on_callable`.
/// Stops descending once `done` is set.
struct CallableWalker<F: FnMut(Callable) -> bool> {
    on_callable: F,
    done: bool,
}

impl<F: FnMut(Callable) -> bool> CallableWalker<F> {
    fn offer(&mut self, callable: Callable) {
        if !self.done && (self.on_callable)(callable) {
            self.done = true;
        }
    }
}

impl<F: FnMut(Callable) -> bool> Visit for CallableWalker<F> {
    fn visit_fn_decl(&mut self, n: &FnDecl) {
        self.offer(Callable::FunctionDecl(n.clone()));
        if !self.done {
            n.visit_children_with(self);
        }
    }

    fn visit_class_method(&mut self, n: &ClassMethod) {
        self.offer(Callable::ClassMethod(n.clone()));
        if !self.done {
            n.visit_children_with(self);
        }
    }

    fn visit_method_prop(&mut self, n: &MethodProp) {
        self.offer(Callable::ObjectMethod(n.clone()));
        if !self.done {
            n.visit_children_with(self);
        }
    }

    fn visit_var_declarator(&mut self, n: &VarDeclarator) {
        if matches!(n.init.as_deref(), Some(Expr::Arrow(_))) {
            self.offer(Callable::ArrowVariable(n.clone()));
        }
        if !self.done {
            n.visit_children_with(self);
        }
    }
}

fn walk(module: &Module, on_callable: impl FnMut(Callable) -> bool) {
    let mut walker = CallableWalker {
        on_callable,
        done: false,
    };
    module.visit_with(&mut walker);
}

// -----------------------------------------------------------------------------
// Queries
// -----------------------------------------------------------------------------

/// First callable named `name`, in any of the supported shapes.
pub fn find_callable(module: &Module, name: &str) -> Option<Callable> {
    let mut found = None;
    walk(module, |callable| {
        if callable.name().as_deref() == Some(name) {
            found = Some(callable);
            true
        } else {
            false
        }
    });
    found
}

/// Position of the first statement in the body of `name`. This is where a
/// HEAD injection lands. An empty body counts as not found.
pub fn body_start(source: &ParsedSource, name: &str) -> Option<Position> {
    let callable = find_callable(source.module(), name)?;
    let first = callable.body()?.stmts.first()?;
    Some(source.position_of(first.span()))
}

/// Names of every callable, in traversal order, without duplicates.
pub fn callable_names(module: &Module) -> Vec<String> {
    let mut names: Vec<String> = vec![];
    walk(module, |callable| {
        if let Some(name) = callable.name() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        false
    });
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = "{\n  const x = 1; return x;\n}";

    fn locate(code: &str, name: &str) -> Option<Position> {
        let parsed = ParsedSource::parse("shape.js", code).unwrap();
        body_start(&parsed, name)
    }

    #[test]
    fn function_declaration() {
        let code = format!("function target() {BODY}");
        assert_eq!(locate(&code, "target"), Some(Position::new(2, 2)));
    }

    #[test]
    fn class_method() {
        let code = format!("class A {{\ntarget() {BODY}\n}}");
        assert_eq!(locate(&code, "target"), Some(Position::new(3, 2)));
    }

    #[test]
    fn object_method() {
        let code = format!("const o = {{\ntarget() {BODY}\n}};");
        assert_eq!(locate(&code, "target"), Some(Position::new(3, 2)));
    }

    #[test]
    fn arrow_variable() {
        let code = format!("const target = () => {BODY};");
        assert_eq!(locate(&code, "target"), Some(Position::new(2, 2)));
    }

    #[test]
    fn nested_callables_are_found() {
        let code = format!("export function outer() {{\n  const inner = () => {BODY};\n}}");
        assert_eq!(locate(&code, "inner"), Some(Position::new(3, 2)));
    }

    #[test]
    fn empty_body_and_missing_name_are_not_found() {
        assert_eq!(locate("function target() {}", "target"), None);
        assert_eq!(locate("function other() { a(); }", "target"), None);
        assert_eq!(locate("const target = () => 1;", "target"), None);
    }

    #[test]
    fn names_cover_every_shape() {
        let parsed = ParsedSource::parse(
            "names.js",
            "function a() {}\nclass K { b() {} }\nconst o = { c() {}, b() {} };\nconst d = () => {};",
        )
        .unwrap();
        assert_eq!(callable_names(parsed.module()), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn find_callable_reports_shape() {
        let parsed = ParsedSource::parse("k.js", "class K { run() { go(); } }").unwrap();
        let callable = find_callable(parsed.module(), "run").unwrap();
        assert_eq!(callable.kind(), "class-method");
        assert_eq!(callable.body().map(|b| b.stmts.len()), Some(1));
    }
}
