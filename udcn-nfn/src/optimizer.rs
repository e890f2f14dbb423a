//! The "to-data-first" optimizer: decides whether a computation can run
//! locally right away, needs more data fetched first, or should be
//! handed off to a peer forwarder entirely.
//!
//! Per spec.md §4.2, `forwarding_decision` is only consulted once
//! `required_data` comes back empty — global placement optimization
//! across the network (deciding to ship a computation elsewhere purely
//! on cost grounds) is out of scope, so the decision here is a simple
//! "run it here" unless the expression names no executor we have.

use udcn_common::Name;

use crate::ast::Expr;
use crate::executor::split_language_tag;

/// What the NFN layer should do next for a computation, once
/// `required_data` is satisfied.
#[derive(Debug, Clone, PartialEq)]
pub enum ForwardingDecision {
    /// Run it with a local executor.
    RunLocally,
    /// Rewrite to the given name and forward it to the FIB-resolved
    /// peer instead of executing locally (no local executor for the
    /// expression's language tag).
    Forward(Name),
}

pub trait NfnOptimizer: Send + Sync {
    /// The `NameRef`s this expression still needs fetched before it can
    /// run, in the order they appear. Empty once every dependency has
    /// already arrived.
    fn required_data(&self, expr: &Expr, available: &[Name]) -> Vec<Name>;

    /// Only called once `required_data` is empty. `rewritten_name` is
    /// the network name the computation would be re-issued under if
    /// forwarded (same prefix and expression, no dependencies left).
    fn forwarding_decision(
        &self,
        expr: &Expr,
        rewritten_name: &Name,
        known_languages: &[String],
    ) -> ForwardingDecision;
}

/// Default optimizer: fetches every named dependency before running,
/// then runs locally if the expression's language tag (if any) matches
/// a registered executor, otherwise forwards unchanged.
#[derive(Debug, Default)]
pub struct ToDataFirstOptimizer;

impl NfnOptimizer for ToDataFirstOptimizer {
    fn required_data(&self, expr: &Expr, available: &[Name]) -> Vec<Name> {
        expr.name_refs()
            .into_iter()
            .filter(|n| !available.contains(n))
            .collect()
    }

    fn forwarding_decision(
        &self,
        expr: &Expr,
        rewritten_name: &Name,
        known_languages: &[String],
    ) -> ForwardingDecision {
        let fn_name = match expr {
            Expr::Call { fn_name, .. } => fn_name,
            _ => return ForwardingDecision::RunLocally,
        };
        let (language, _) = split_language_tag(fn_name);
        match language {
            Some(lang) if !known_languages.iter().any(|l| l == lang) => {
                ForwardingDecision::Forward(rewritten_name.clone())
            }
            _ => ForwardingDecision::RunLocally,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Literal;

    fn call(fn_name: &str, args: Vec<Expr>) -> Expr {
        Expr::Call {
            fn_name: fn_name.into(),
            args,
        }
    }

    #[test]
    fn required_data_reports_missing_names_only() {
        let opt = ToDataFirstOptimizer;
        let expr = call(
            "add",
            vec![
                Expr::NameRef(Name::from_string("/a")),
                Expr::NameRef(Name::from_string("/b")),
            ],
        );
        let available = vec![Name::from_string("/a")];
        assert_eq!(
            opt.required_data(&expr, &available),
            vec![Name::from_string("/b")]
        );
    }

    #[test]
    fn required_data_empty_once_everything_available() {
        let opt = ToDataFirstOptimizer;
        let expr = call("add", vec![Expr::Literal(Literal::Int(1))]);
        assert!(opt.required_data(&expr, &[]).is_empty());
    }

    #[test]
    fn forwards_when_language_unknown_locally() {
        let opt = ToDataFirstOptimizer;
        let expr = call("PYTHON:sum", vec![]);
        let name = Name::from_string("/lib/PYTHON:sum()/NFN");
        let known = vec!["RUST".to_string()];
        assert_eq!(
            opt.forwarding_decision(&expr, &name, &known),
            ForwardingDecision::Forward(name)
        );
    }

    #[test]
    fn runs_locally_when_language_matches_or_untagged() {
        let opt = ToDataFirstOptimizer;
        let known = vec!["RUST".to_string()];
        let tagged = call("RUST:sum", vec![]);
        let name = Name::from_string("/lib/RUST:sum()/NFN");
        assert_eq!(
            opt.forwarding_decision(&tagged, &name, &known),
            ForwardingDecision::RunLocally
        );

        let untagged = call("sum", vec![]);
        assert_eq!(
            opt.forwarding_decision(&untagged, &name, &known),
            ForwardingDecision::RunLocally
        );
    }
}
