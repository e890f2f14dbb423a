//! Executors run a parsed [`Expr`] to a value once every `NameRef` it
//! needs has been fetched into argument form.
//!
//! Each call name may carry a `LANGUAGE:` prefix (e.g. `PYTHON:sum`)
//! naming the executor it should dispatch to; an untagged name falls
//! back to whichever single executor is registered. Computations run
//! on `spawn_blocking` so a slow or CPU-heavy executor never stalls the
//! NFN layer's event loop, and each call is bounded by a deadline via
//! `tokio::time::timeout` — a computation that overruns it is reported
//! as failed rather than left running forever.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use udcn_common::Error;

use crate::ast::{Expr, Literal};

/// A resolved argument or result value.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecValue {
    Int(i64),
    Str(String),
    Bytes(Bytes),
}

impl ExecValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ExecValue::Int(n) => Some(*n),
            ExecValue::Str(s) => s.parse().ok(),
            ExecValue::Bytes(b) => std::str::from_utf8(b).ok()?.trim().parse().ok(),
        }
    }
}

/// Splits a call name on its first `:`, returning `(language, bare_name)`.
/// A name with no `:` has no language tag.
pub fn split_language_tag(fn_name: &str) -> (Option<&str>, &str) {
    match fn_name.split_once(':') {
        Some((lang, rest)) => (Some(lang), rest),
        None => (None, fn_name),
    }
}

/// A computation backend for one language. Implementations must be
/// cheap to call repeatedly and safe to run from a blocking thread.
pub trait NfnExecutor: Send + Sync {
    /// The language tag this executor answers to, e.g. `"RUST"`.
    fn language(&self) -> &str;

    /// Executes `fn_name` (already stripped of its language tag) with
    /// the given already-evaluated arguments.
    fn call(&self, fn_name: &str, args: &[ExecValue]) -> Result<ExecValue, Error>;
}

/// A small built-in executor covering the arithmetic operations used
/// throughout the test corpus and suitable as a default when no
/// external language runtime is configured: `add`, `sub`, `mul`, `div`,
/// `concat`, `len`.
#[derive(Debug, Default)]
pub struct ArithmeticExecutor;

impl NfnExecutor for ArithmeticExecutor {
    fn language(&self) -> &str {
        "RUST"
    }

    fn call(&self, fn_name: &str, args: &[ExecValue]) -> Result<ExecValue, Error> {
        match fn_name {
            "add" | "sub" | "mul" | "div" => {
                let ints: Vec<i64> = args
                    .iter()
                    .map(|a| a.as_int().ok_or_else(|| Error::Executor(format!("{fn_name}: non-numeric argument"))))
                    .collect::<Result<_, _>>()?;
                if ints.is_empty() {
                    return Err(Error::Executor(format!("{fn_name}: no arguments")));
                }
                let result = match fn_name {
                    "add" => ints.iter().sum(),
                    "sub" => ints[1..].iter().fold(ints[0], |acc, n| acc - n),
                    "mul" => ints.iter().product(),
                    "div" => {
                        let mut iter = ints.iter();
                        let first = *iter.next().unwrap();
                        let mut acc = first;
                        for n in iter {
                            if *n == 0 {
                                return Err(Error::Executor("div: division by zero".into()));
                            }
                            acc /= n;
                        }
                        acc
                    }
                    _ => unreachable!(),
                };
                Ok(ExecValue::Int(result))
            }
            "concat" => {
                let mut out = String::new();
                for a in args {
                    match a {
                        ExecValue::Str(s) => out.push_str(s),
                        ExecValue::Int(n) => out.push_str(&n.to_string()),
                        ExecValue::Bytes(b) => out.push_str(&String::from_utf8_lossy(b)),
                    }
                }
                Ok(ExecValue::Str(out))
            }
            "len" => {
                let n = match args.first() {
                    Some(ExecValue::Str(s)) => s.len() as i64,
                    Some(ExecValue::Bytes(b)) => b.len() as i64,
                    Some(ExecValue::Int(_)) | None => {
                        return Err(Error::Executor("len: expects a string or bytes argument".into()))
                    }
                };
                Ok(ExecValue::Int(n))
            }
            other => Err(Error::Executor(format!("unknown function {other:?}"))),
        }
    }
}

/// Owns the registered executors and runs calls under a deadline on
/// the blocking thread pool.
pub struct ExecutorPool {
    executors: HashMap<String, Arc<dyn NfnExecutor>>,
    deadline: Duration,
}

impl ExecutorPool {
    pub fn new(deadline: Duration) -> Self {
        Self {
            executors: HashMap::new(),
            deadline,
        }
    }

    pub fn register(&mut self, executor: Arc<dyn NfnExecutor>) {
        self.executors.insert(executor.language().to_string(), executor);
    }

    pub fn languages(&self) -> Vec<String> {
        self.executors.keys().cloned().collect()
    }

    /// Resolves `fn_name`'s language tag to a registered executor. An
    /// untagged name dispatches to the sole registered executor if
    /// there is exactly one.
    fn resolve(&self, fn_name: &str) -> Result<(Arc<dyn NfnExecutor>, String), Error> {
        let (language, bare) = split_language_tag(fn_name);
        let executor = match language {
            Some(lang) => self
                .executors
                .get(lang)
                .cloned()
                .ok_or_else(|| Error::Executor(format!("no executor registered for language {lang:?}")))?,
            None => {
                if self.executors.len() == 1 {
                    self.executors.values().next().unwrap().clone()
                } else {
                    return Err(Error::Executor(format!(
                        "call {fn_name:?} has no language tag and {} executors are registered",
                        self.executors.len()
                    )));
                }
            }
        };
        Ok((executor, bare.to_string()))
    }

    /// Evaluates `expr` given that every `NameRef` it names has already
    /// been resolved to a value in `resolved`.
    pub async fn evaluate(&self, expr: &Expr, resolved: &HashMap<udcn_common::Name, ExecValue>) -> Result<ExecValue, Error> {
        match expr {
            Expr::Call { fn_name, args } => {
                let (executor, bare_name) = self.resolve(fn_name)?;
                let mut arg_values = Vec::with_capacity(args.len());
                for arg in args {
                    arg_values.push(Box::pin(self.evaluate(arg, resolved)).await?);
                }
                let deadline = self.deadline;
                let call_name = bare_name;
                let result = tokio::time::timeout(
                    deadline,
                    tokio::task::spawn_blocking(move || executor.call(&call_name, &arg_values)),
                )
                .await
                .map_err(|_| Error::Executor("computation exceeded its deadline".into()))?
                .map_err(|e| Error::Executor(format!("executor task panicked: {e}")))??;
                Ok(result)
            }
            _ => Self::to_value(expr, resolved),
        }
    }

    fn to_value(expr: &Expr, resolved: &HashMap<udcn_common::Name, ExecValue>) -> Result<ExecValue, Error> {
        match expr {
            Expr::Literal(Literal::Int(n)) => Ok(ExecValue::Int(*n)),
            Expr::Literal(Literal::Str(s)) => Ok(ExecValue::Str(s.clone())),
            Expr::NameRef(name) => resolved
                .get(name)
                .cloned()
                .ok_or_else(|| Error::Executor(format!("no resolved value for name {name}"))),
            Expr::Call { .. } => Err(Error::Executor("call requires async evaluation".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> ExecutorPool {
        let mut pool = ExecutorPool::new(Duration::from_secs(1));
        pool.register(Arc::new(ArithmeticExecutor));
        pool
    }

    #[test]
    fn splits_language_tag() {
        assert_eq!(split_language_tag("PYTHON:sum"), (Some("PYTHON"), "sum"));
        assert_eq!(split_language_tag("sum"), (None, "sum"));
    }

    #[tokio::test]
    async fn evaluates_nested_arithmetic() {
        let expr = Expr::Call {
            fn_name: "add".into(),
            args: vec![
                Expr::Literal(Literal::Int(2)),
                Expr::Call {
                    fn_name: "mul".into(),
                    args: vec![Expr::Literal(Literal::Int(3)), Expr::Literal(Literal::Int(4))],
                },
            ],
        };
        let result = pool().evaluate(&expr, &HashMap::new()).await.unwrap();
        assert_eq!(result, ExecValue::Int(14));
    }

    #[tokio::test]
    async fn evaluates_name_ref_from_resolved_map() {
        let name = udcn_common::Name::from_string("/data");
        let mut resolved = HashMap::new();
        resolved.insert(name.clone(), ExecValue::Int(7));
        let expr = Expr::Call {
            fn_name: "add".into(),
            args: vec![Expr::NameRef(name), Expr::Literal(Literal::Int(1))],
        };
        let result = pool().evaluate(&expr, &resolved).await.unwrap();
        assert_eq!(result, ExecValue::Int(8));
    }

    #[tokio::test]
    async fn division_by_zero_fails() {
        let expr = Expr::Call {
            fn_name: "div".into(),
            args: vec![Expr::Literal(Literal::Int(1)), Expr::Literal(Literal::Int(0))],
        };
        assert!(pool().evaluate(&expr, &HashMap::new()).await.is_err());
    }

    #[tokio::test]
    async fn unresolved_name_ref_fails() {
        let expr = Expr::NameRef(udcn_common::Name::from_string("/missing"));
        assert!(pool().evaluate(&expr, &HashMap::new()).await.is_err());
    }
}
