//! The NFN expression AST: a tree of `Call`, `NameRef` and `Literal`
//! nodes, per spec.md §4.2's expression grammar.
//!
//! ```text
//! expr   := call | name | literal
//! call   := ident '(' arglist? ')'
//! arglist:= expr (',' expr)*
//! name   := '/' ident ('/' ident)*
//! literal:= integer | quoted_string
//! ```

use udcn_common::Name;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `fn_name(args...)`. `fn_name` may carry a `language:` prefix
    /// (e.g. `"PYTHON:sum"`) picking the executor the call dispatches
    /// to; see [`crate::executor::split_language_tag`].
    Call { fn_name: String, args: Vec<Expr> },
    /// A reference to named data the computation needs fetched before
    /// it can run, e.g. `/data` in `f(/data)`.
    NameRef(Name),
    Literal(Literal),
}

impl Expr {
    /// Every `NameRef` leaf reachable from this expression, deduplicated.
    pub fn name_refs(&self) -> Vec<Name> {
        let mut out = Vec::new();
        self.collect_name_refs(&mut out);
        out
    }

    fn collect_name_refs(&self, out: &mut Vec<Name>) {
        match self {
            Expr::NameRef(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_name_refs(out);
                }
            }
            Expr::Literal(_) => {}
        }
    }
}
