//! Protected evaluation with result/error capture.

use tracing::debug;

use crate::error::{BindError, BindResult};
use crate::gc::{Sexp, SexpType};
use crate::guard::OwnershipGuard;
use crate::host::{with_host, Host};

/// Lifecycle of a [`ProtectedEvaluator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvalState {
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// Evaluates one expression without letting host errors unwind.
///
/// The outcome is recorded rather than raised: after `run`, exactly one of
/// `result()` (on success) or `error()` (on failure, the host condition
/// object) is meaningful; the other reads as `NULL`.
#[derive(Debug)]
pub struct ProtectedEvaluator {
    expr: OwnershipGuard,
    state: EvalState,
    outcome: Option<OwnershipGuard>,
}

impl ProtectedEvaluator {
    pub fn new(expr: Sexp) -> Self {
        Self {
            expr: OwnershipGuard::pinned(expr),
            state: EvalState::Idle,
            outcome: None,
        }
    }

    pub fn expression(&self) -> Sexp {
        self.expr.sexp()
    }

    pub fn state(&self) -> EvalState {
        self.state
    }

    /// Evaluate in `env`.  Never raises; returns the terminal state.
    pub fn run(&mut self, env: Sexp) -> EvalState {
        self.state = EvalState::Running;
        self.outcome = None;
        let expr = self.expr.sexp();
        let outcome = with_host(|h| h.eval_protected(expr, env));
        let (state, value) = match outcome {
            Ok(v) => (EvalState::Succeeded, v),
            Err(cond) => (EvalState::Failed, cond),
        };
        self.outcome = Some(OwnershipGuard::pinned(value));
        self.state = state;
        if state == EvalState::Failed {
            debug!(message = ?self.error_message(), "protected evaluation failed");
        }
        state
    }

    pub fn run_global(&mut self) -> EvalState {
        let env = with_host(|h| h.global_env());
        self.run(env)
    }

    pub fn successful(&self) -> bool {
        self.state == EvalState::Succeeded
    }

    /// The value, or `NULL` unless the last run succeeded.
    pub fn result(&self) -> Sexp {
        self.outcome_in(EvalState::Succeeded)
    }

    /// The condition object, or `NULL` unless the last run failed.
    pub fn error(&self) -> Sexp {
        self.outcome_in(EvalState::Failed)
    }

    fn outcome_in(&self, state: EvalState) -> Sexp {
        match &self.outcome {
            Some(g) if self.state == state => g.sexp(),
            _ => with_host(|h| h.nil()),
        }
    }

    /// The `message` field of the condition after a failed run.
    pub fn error_message(&self) -> Option<String> {
        if self.state != EvalState::Failed {
            return None;
        }
        let cond = self.error();
        with_host(|h| condition_message(h, cond))
    }

    /// Consume the evaluator, turning a failure into an error.
    pub fn into_result(self) -> BindResult<Sexp> {
        match self.state {
            EvalState::Succeeded => Ok(self.result()),
            EvalState::Failed => Err(BindError::Evaluation(
                self.error_message().unwrap_or_else(|| "unknown error".to_owned()),
            )),
            EvalState::Idle | EvalState::Running => {
                Err(BindError::Evaluation("expression was not evaluated".to_owned()))
            }
        }
    }
}

/// Extract `message` from a condition list.
pub(crate) fn condition_message(h: &dyn Host, cond: Sexp) -> Option<String> {
    if h.type_of(cond) != SexpType::List {
        return None;
    }
    let names = h.get_attrib(cond, "names");
    if h.type_of(names) != SexpType::String {
        return None;
    }
    let idx = (0..h.length(names)).find(|&i| {
        let c = h.string_elt(names, i);
        h.char_str(c) == Some("message")
    })?;
    let msg = h.vector_elt(cond, idx);
    if h.type_of(msg) != SexpType::String || h.length(msg) == 0 {
        return None;
    }
    let c = h.string_elt(msg, 0);
    h.char_str(c).map(str::to_owned)
}

/// Evaluate `expr` in `env` and return its value, or the host's message as
/// an `Evaluation` error.
pub fn eval_in(expr: Sexp, env: Sexp) -> BindResult<Sexp> {
    let mut ev = ProtectedEvaluator::new(expr);
    ev.run(env);
    ev.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{as_value, wrap};

    fn call1(fun: &str, arg: Sexp) -> Sexp {
        with_host(|h| {
            let f = h.install(fun);
            let nil = h.nil();
            let args = h.cons(arg, nil);
            h.lcons(f, args)
        })
    }

    #[test]
    fn success_records_result() {
        crate::test_support::init_tracing();
        let mut ev = ProtectedEvaluator::new(call1("identity", wrap(3)));
        assert_eq!(ev.state(), EvalState::Idle);
        assert_eq!(ev.run_global(), EvalState::Succeeded);
        assert!(ev.successful());
        let nil = with_host(|h| h.nil());
        assert_eq!(as_value::<i32>(ev.result()), Ok(3));
        assert_eq!(ev.error(), nil);
        assert_eq!(ev.error_message(), None);
    }

    #[test]
    fn arithmetic_result_is_the_value() {
        let expr = crate::test_support::call("+", &[wrap(1), wrap(2)]);
        let mut ev = ProtectedEvaluator::new(expr);
        assert_eq!(ev.run_global(), EvalState::Succeeded);
        assert_eq!(as_value::<f64>(ev.result()), Ok(3.0));
    }

    #[test]
    fn failure_never_raises() {
        let mut ev = ProtectedEvaluator::new(call1("stop", wrap("boom")));
        assert_eq!(ev.run_global(), EvalState::Failed);
        assert!(!ev.successful());
        assert_eq!(ev.result(), with_host(|h| h.nil()));
        assert_eq!(ev.error_message().as_deref(), Some("boom"));
        assert_eq!(ev.into_result(), Err(BindError::Evaluation("boom".into())));
    }

    #[test]
    fn result_survives_collection() {
        let mut ev = ProtectedEvaluator::new(call1("c", wrap(vec![1, 2, 3])));
        ev.run_global();
        let result = ev.result();
        with_host(|h| h.collect_garbage());
        assert_eq!(with_host(|h| h.length(result)), 3);
    }

    #[test]
    fn evaluator_balances_pins() {
        let before = with_host(|h| h.heap_stats().preserved_total);
        {
            let mut ev = ProtectedEvaluator::new(call1("identity", wrap(1.5)));
            ev.run_global();
            ev.run_global();
        }
        assert_eq!(with_host(|h| h.heap_stats().preserved_total), before);
    }
}
