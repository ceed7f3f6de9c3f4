//! Call evaluator of the reference host.
//!
//! Enough of an evaluator to run the calls the binding layer issues:
//! symbol lookup with promise forcing, closure application with lazy
//! argument promises, and a fixed table of builtins.

use std::str::FromStr;

use strum::{EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};
use tracing::debug;

use super::coerce::Scalar;
use crate::gc::{is_na_real, Binding, CellKind, HeapObject, HostHeap, Sexp, SexpType};
use crate::gc::{NA_INTEGER, NA_REAL};

/// Non-local exit out of the evaluator.
#[derive(Clone, Debug)]
pub(crate) enum Flow {
    /// An error condition with its message and the call it is reported
    /// against (`NULL` at top level).
    Error { message: String, call: Sexp },
}

pub(crate) type EvalResult = Result<Sexp, Flow>;

pub(crate) fn signal(message: impl Into<String>, call: Sexp) -> Flow {
    Flow::Error {
        message: message.into(),
        call,
    }
}

/// Builtins bound in the base environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumString, EnumIter, IntoStaticStr)]
pub enum BuiltinId {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "c")]
    Combine,
    #[strum(serialize = "list")]
    List,
    #[strum(serialize = "length")]
    Length,
    #[strum(serialize = "identity")]
    Identity,
    #[strum(serialize = "stop")]
    Stop,
    #[strum(serialize = "quote")]
    Quote,
    #[strum(serialize = "{")]
    Brace,
    #[strum(serialize = "as.environment")]
    AsEnvironment,
    #[strum(serialize = "as.pairlist")]
    AsPairlist,
    #[strum(serialize = "as.expression")]
    AsExpression,
    #[strum(serialize = "as.call")]
    AsCall,
    #[strum(serialize = "as.character")]
    AsCharacter,
    #[strum(serialize = "as.integer")]
    AsInteger,
    #[strum(serialize = "as.numeric")]
    AsNumeric,
    #[strum(serialize = "as.logical")]
    AsLogical,
}

impl BuiltinId {
    /// Specials see their arguments unevaluated.
    pub fn is_special(self) -> bool {
        matches!(self, BuiltinId::Quote | BuiltinId::Brace)
    }

    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// Evaluated call arguments: `(tag, value)`, tag `NULL` when unnamed.
type Args = [(Sexp, Sexp)];

fn expect_args(id: BuiltinId, args: &Args, n: usize, call: Sexp) -> Result<(), Flow> {
    if args.len() != n {
        Err(signal(
            format!(
                "{} arguments passed to '{}' which requires {}",
                args.len(),
                id.name(),
                n
            ),
            call,
        ))
    } else {
        Ok(())
    }
}

/// Rank of a type when combining vectors; `None` means "goes into a list".
fn combine_rank(ty: SexpType) -> Option<u8> {
    Some(match ty {
        SexpType::Nil => 0,
        SexpType::Raw => 1,
        SexpType::Logical => 2,
        SexpType::Integer => 3,
        SexpType::Real => 4,
        SexpType::Complex => 5,
        SexpType::String => 6,
        _ => return None,
    })
}

const RANKED: [SexpType; 7] = [
    SexpType::Nil,
    SexpType::Raw,
    SexpType::Logical,
    SexpType::Integer,
    SexpType::Real,
    SexpType::Complex,
    SexpType::String,
];

impl HostHeap {
    pub(crate) fn install_builtins(&mut self) {
        let base = self.base_env;
        for id in BuiltinId::iter() {
            let name = id.name();
            self.intern(name);
            let fun = self.alloc(HeapObject::Builtin {
                name: name.to_owned(),
                special: id.is_special(),
            });
            self.frame_mut(base).bindings.insert(
                name.to_owned(),
                Binding {
                    value: fun,
                    locked: false,
                    active: false,
                },
            );
        }
    }

    /// Entry point for protected evaluation.  Runs a collection first when
    /// the allocation threshold was reached, then evaluates; failures come
    /// back as a condition object.
    pub(crate) fn eval_top(&mut self, expr: Sexp, env: Sexp) -> Result<Sexp, Sexp> {
        if self.eval_depth == 0 && self.should_collect() {
            self.collect([expr, env]);
        }
        let saved_calls = self.call_stack.len();
        match self.eval(expr, env) {
            Ok(v) => Ok(v),
            Err(Flow::Error { message, call }) => {
                self.call_stack.truncate(saved_calls);
                debug!(%message, "evaluation failed");
                Err(self.make_condition(&message, call))
            }
        }
    }

    /// `list(message = ., call = .)` classed as a simple error condition.
    pub(crate) fn make_condition(&mut self, message: &str, call: Sexp) -> Sexp {
        let msg = self.alloc_from_scalars(SexpType::String, &[Scalar::Str(Some(message.into()))]);
        let msg = msg.unwrap_or(self.nil);
        let cond = self.alloc(HeapObject::List(vec![msg, call]));
        let names = [Scalar::Str(Some("message".into())), Scalar::Str(Some("call".into()))];
        if let Some(names) = self.alloc_from_scalars(SexpType::String, &names) {
            self.set_attr(cond, "names", names);
        }
        let class = ["simpleError", "error", "condition"].map(|c| Scalar::Str(Some(c.into())));
        if let Some(class) = self.alloc_from_scalars(SexpType::String, &class) {
            self.set_attr(cond, "class", class);
        }
        cond
    }

    pub(crate) fn eval(&mut self, expr: Sexp, env: Sexp) -> EvalResult {
        if self.eval_depth >= self.max_eval_depth {
            return Err(signal(
                "evaluation nested too deeply: infinite recursion / options(expressions=)?",
                self.nil,
            ));
        }
        self.eval_depth += 1;
        let result = self.eval_inner(expr, env);
        self.eval_depth -= 1;
        result
    }

    fn eval_inner(&mut self, expr: Sexp, env: Sexp) -> EvalResult {
        match self.get(expr).sexp_type() {
            SexpType::Symbol => self.eval_symbol(expr, env),
            SexpType::Promise => self.force_promise(expr),
            SexpType::Language => self.eval_call(expr, env),
            SexpType::Expression => {
                let items = match self.get(expr) {
                    HeapObject::Expression(v) => v.clone(),
                    _ => unreachable!(),
                };
                let mut last = self.nil;
                for item in items {
                    last = self.eval(item, env)?;
                }
                Ok(last)
            }
            _ => Ok(expr),
        }
    }

    fn eval_symbol(&mut self, sym: Sexp, env: Sexp) -> EvalResult {
        if sym == self.missing {
            return Err(signal("argument is missing, with no default", self.nil));
        }
        let name = self.symbol_str(sym).to_owned();
        let value = self.env_lookup(env, &name)?;
        if value == self.unbound {
            Err(signal(format!("object '{name}' not found"), self.nil))
        } else if value == self.missing {
            Err(signal(
                format!("argument \"{name}\" is missing, with no default"),
                self.nil,
            ))
        } else if self.get(value).sexp_type() == SexpType::Promise {
            self.force_promise(value)
        } else {
            Ok(value)
        }
    }

    pub(crate) fn force_promise(&mut self, p: Sexp) -> EvalResult {
        let (code, env) = match self.get_mut(p) {
            HeapObject::Promise {
                value: Some(v), ..
            } => return Ok(*v),
            HeapObject::Promise { seen: true, code, .. } => {
                let code = *code;
                return Err(signal(
                    "promise already under evaluation: recursive default argument reference or earlier problems?",
                    code,
                ));
            }
            HeapObject::Promise {
                code, env, seen, ..
            } => {
                *seen = true;
                (*code, *env)
            }
            _ => panic!("force_promise on non-promise"),
        };
        let result = self.eval(code, env);
        if let HeapObject::Promise { value, seen, .. } = self.get_mut(p) {
            *seen = false;
            if let Ok(v) = &result {
                *value = Some(*v);
            }
        }
        result
    }

    /// Resolve a function by name, skipping non-function bindings.
    fn find_fun(&mut self, sym: Sexp, env: Sexp, call: Sexp) -> EvalResult {
        let name = self.symbol_str(sym).to_owned();
        let mut cursor = env;
        while cursor != self.nil {
            let mut value = self.frame_lookup(cursor, &name)?;
            if value != self.unbound && self.get(value).sexp_type() == SexpType::Promise {
                value = self.force_promise(value)?;
            }
            if value != self.unbound && self.get(value).sexp_type().is_function() {
                return Ok(value);
            }
            cursor = self.frame(cursor).parent;
        }
        Err(signal(format!("could not find function \"{name}\""), call))
    }

    fn eval_call(&mut self, call: Sexp, env: Sexp) -> EvalResult {
        let head = self.cell_car(call);
        let fun = match self.get(head).sexp_type() {
            SexpType::Symbol => self.find_fun(head, env, call)?,
            SexpType::Language => self.eval(head, env)?,
            _ => head,
        };
        let args = self.cell_cdr(call);
        match self.get(fun) {
            HeapObject::Builtin { name, special } => {
                let special = *special;
                let id = BuiltinId::from_str(name)
                    .map_err(|_| signal(format!("unknown builtin '{name}'"), call))?;
                if special {
                    self.apply_special(id, call, args, env)
                } else {
                    let values = self.eval_args(args, env)?;
                    self.apply_builtin(id, call, &values, env)
                }
            }
            HeapObject::Closure { .. } => self.apply_closure(fun, call, args, env),
            _ => Err(signal("attempt to apply non-function", call)),
        }
    }

    fn eval_args(&mut self, mut cursor: Sexp, env: Sexp) -> Result<Vec<(Sexp, Sexp)>, Flow> {
        let mut out = Vec::new();
        while let HeapObject::Cell { car, cdr, tag, .. } = self.get(cursor) {
            let (car, next, tag) = (*car, *cdr, *tag);
            out.push((tag, self.eval(car, env)?));
            cursor = next;
        }
        Ok(out)
    }

    /// Bind arguments to formals (exact names first, then by position) as
    /// promises in a fresh frame, then evaluate the body there.
    fn apply_closure(&mut self, fun: Sexp, call: Sexp, args: Sexp, env: Sexp) -> EvalResult {
        let (formals, body, cloenv) = match self.get(fun) {
            HeapObject::Closure { formals, body, env } => (*formals, *body, *env),
            _ => panic!("apply_closure on non-closure"),
        };

        let mut params: Vec<(String, Sexp, Option<Sexp>)> = Vec::new();
        let mut cursor = formals;
        while let HeapObject::Cell { car, cdr, tag, .. } = self.get(cursor) {
            let (default, next, tag) = (*car, *cdr, *tag);
            params.push((self.symbol_str(tag).to_owned(), default, None));
            cursor = next;
        }

        let mut positional = Vec::new();
        let mut cursor = args;
        while let HeapObject::Cell { car, cdr, tag, .. } = self.get(cursor) {
            let (arg, next, tag) = (*car, *cdr, *tag);
            if tag != self.nil {
                let name = self.symbol_str(tag);
                match params.iter_mut().find(|(p, _, bound)| p == name && bound.is_none()) {
                    Some(slot) => slot.2 = Some(arg),
                    None => {
                        let name = name.to_owned();
                        return Err(signal(format!("unused argument ({name} = )"), call));
                    }
                }
            } else {
                positional.push(arg);
            }
            cursor = next;
        }
        let mut positional = positional.into_iter();
        for slot in params.iter_mut().filter(|p| p.2.is_none()) {
            match positional.next() {
                Some(arg) => slot.2 = Some(arg),
                None => break,
            }
        }
        if positional.next().is_some() {
            return Err(signal("unused argument", call));
        }

        let frame = self.alloc_env(cloenv);
        for (name, default, supplied) in params {
            let value = match supplied {
                Some(arg) => self.delay(arg, env),
                None if default == self.missing => self.missing,
                None => self.delay(default, frame),
            };
            self.frame_mut(frame).bindings.insert(
                name,
                Binding {
                    value,
                    locked: false,
                    active: false,
                },
            );
        }

        self.call_stack.push(call);
        let result = self.eval(body, frame);
        self.call_stack.pop();
        result
    }

    /// Wrap `code` in a promise unless it evaluates to itself.
    fn delay(&mut self, code: Sexp, env: Sexp) -> Sexp {
        match self.get(code).sexp_type() {
            SexpType::Symbol | SexpType::Language | SexpType::Promise => {
                self.alloc(HeapObject::Promise {
                    code,
                    env,
                    value: None,
                    seen: false,
                })
            }
            _ => code,
        }
    }

    fn apply_special(&mut self, id: BuiltinId, call: Sexp, args: Sexp, env: Sexp) -> EvalResult {
        match id {
            BuiltinId::Quote => {
                if self.list_length(args) != 1 {
                    return Err(signal(
                        format!("{} arguments passed to 'quote' which requires 1", self.list_length(args)),
                        call,
                    ));
                }
                Ok(self.cell_car(args))
            }
            BuiltinId::Brace => {
                let mut last = self.nil;
                for expr in self.list_to_vec(args) {
                    last = self.eval(expr, env)?;
                }
                Ok(last)
            }
            _ => Err(signal(format!("'{}' is not a special", id.name()), call)),
        }
    }

    fn apply_builtin(&mut self, id: BuiltinId, call: Sexp, args: &Args, env: Sexp) -> EvalResult {
        match id {
            BuiltinId::Add | BuiltinId::Sub | BuiltinId::Mul | BuiltinId::Div => {
                self.arith(id, call, args)
            }
            BuiltinId::Combine => self.combine(call, args),
            BuiltinId::List => {
                let items = args.iter().map(|(_, v)| *v).collect();
                let list = self.alloc(HeapObject::List(items));
                self.set_names_from_tags(list, args);
                Ok(list)
            }
            BuiltinId::Length => {
                expect_args(id, args, 1, call)?;
                let n = self.object_length(args[0].1);
                let n = i32::try_from(n).unwrap_or(NA_INTEGER);
                Ok(self.alloc(HeapObject::Integer(vec![n])))
            }
            BuiltinId::Identity => {
                expect_args(id, args, 1, call)?;
                Ok(args[0].1)
            }
            BuiltinId::Stop => {
                let mut message = String::new();
                for (_, v) in args {
                    for s in self.scalars(*v).unwrap_or_default() {
                        message.push_str(s.to_str().as_deref().unwrap_or("NA"));
                    }
                }
                let context = self.call_stack.last().copied().unwrap_or(self.nil);
                Err(signal(message, context))
            }
            BuiltinId::AsEnvironment => {
                expect_args(id, args, 1, call)?;
                self.as_environment(args[0].1, call, env)
            }
            BuiltinId::AsPairlist => {
                expect_args(id, args, 1, call)?;
                self.coerce_or_signal(args[0].1, SexpType::Pairlist, call)
            }
            BuiltinId::AsExpression => {
                expect_args(id, args, 1, call)?;
                let x = args[0].1;
                match self.get(x).sexp_type() {
                    SexpType::Symbol | SexpType::Language => {
                        Ok(self.alloc(HeapObject::Expression(vec![x])))
                    }
                    _ => self.coerce_or_signal(x, SexpType::Expression, call),
                }
            }
            BuiltinId::AsCall => {
                expect_args(id, args, 1, call)?;
                let x = args[0].1;
                match self.get(x).sexp_type() {
                    SexpType::Language => Ok(x),
                    SexpType::List | SexpType::Expression | SexpType::Pairlist
                        if self.object_length(x) > 0 =>
                    {
                        let list = self.coerce_or_signal(x, SexpType::Pairlist, call)?;
                        let list = if list == x { self.duplicate_chain(x) } else { list };
                        if let HeapObject::Cell { kind, .. } = self.get_mut(list) {
                            *kind = CellKind::Language;
                        }
                        Ok(list)
                    }
                    _ => Err(signal("invalid argument list", call)),
                }
            }
            BuiltinId::AsCharacter => {
                expect_args(id, args, 1, call)?;
                self.coerce_or_signal(args[0].1, SexpType::String, call)
            }
            BuiltinId::AsInteger => {
                expect_args(id, args, 1, call)?;
                self.coerce_or_signal(args[0].1, SexpType::Integer, call)
            }
            BuiltinId::AsNumeric => {
                expect_args(id, args, 1, call)?;
                self.coerce_or_signal(args[0].1, SexpType::Real, call)
            }
            BuiltinId::AsLogical => {
                expect_args(id, args, 1, call)?;
                self.coerce_or_signal(args[0].1, SexpType::Logical, call)
            }
            BuiltinId::Quote | BuiltinId::Brace => {
                Err(signal(format!("'{}' is a special", id.name()), call))
            }
        }
    }

    fn coerce_or_signal(&mut self, x: Sexp, ty: SexpType, call: Sexp) -> EvalResult {
        match self.coerce_to(x, ty) {
            Some(v) => Ok(v),
            None => {
                let from = self.get(x).sexp_type();
                Err(signal(
                    format!("cannot coerce type '{from}' to vector of type '{ty}'"),
                    call,
                ))
            }
        }
    }

    fn duplicate_chain(&mut self, x: Sexp) -> Sexp {
        let cells: Vec<(Sexp, Sexp)> = {
            let mut v = Vec::new();
            let mut cursor = x;
            while let HeapObject::Cell { car, cdr, tag, .. } = self.get(cursor) {
                v.push((*car, *tag));
                cursor = *cdr;
            }
            v
        };
        let mut head = self.nil;
        for (car, tag) in cells.into_iter().rev() {
            head = self.alloc_cell(CellKind::Pairlist, car, head);
            *self.cell_mut(head).2 = tag;
        }
        head
    }

    /// `as.environment`: environments pass through, numbers index the
    /// search path from the global environment, strings name an entry on
    /// it, lists become a fresh environment.
    fn as_environment(&mut self, x: Sexp, call: Sexp, env: Sexp) -> EvalResult {
        match self.get(x).sexp_type() {
            SexpType::Environment => Ok(x),
            SexpType::Integer | SexpType::Real | SexpType::Logical => {
                let pos = self
                    .scalars(x)
                    .and_then(|s| s.first().map(Scalar::to_integer))
                    .unwrap_or(NA_INTEGER);
                if pos == -1 {
                    return Ok(env);
                }
                let search = self.search_path();
                usize::try_from(pos)
                    .ok()
                    .and_then(|p| p.checked_sub(1))
                    .and_then(|p| search.get(p).copied())
                    .ok_or_else(|| signal("invalid 'pos' argument", call))
            }
            SexpType::String => {
                let name = self
                    .scalars(x)
                    .and_then(|s| s.first().and_then(Scalar::to_str))
                    .unwrap_or_default();
                let search = self.search_path();
                let found = search.into_iter().find(|&e| {
                    let attr = self.attr(e, "name");
                    attr != self.nil
                        && self
                            .scalars(attr)
                            .and_then(|s| s.first().and_then(Scalar::to_str))
                            .as_deref()
                            == Some(name.as_str())
                });
                found.ok_or_else(|| {
                    signal(format!("no item called \"{name}\" on the search list"), call)
                })
            }
            SexpType::List => {
                let items = match self.get(x) {
                    HeapObject::List(v) => v.clone(),
                    _ => unreachable!(),
                };
                let names = self.attr(x, "names");
                let names = if names == self.nil {
                    Vec::new()
                } else {
                    self.scalars(names).unwrap_or_default()
                };
                let out = self.alloc_env(self.empty_env);
                for (i, value) in items.into_iter().enumerate() {
                    if let Some(name) = names.get(i).and_then(Scalar::to_str) {
                        if !name.is_empty() {
                            self.define(out, &name, value);
                        }
                    }
                }
                Ok(out)
            }
            other => Err(signal(
                format!("invalid object for 'as.environment': {other}"),
                call,
            )),
        }
    }

    /// The global environment and its enclosures, excluding the empty root.
    pub(crate) fn search_path(&self) -> Vec<Sexp> {
        let mut out = Vec::new();
        let mut cursor = self.global_env;
        while cursor != self.nil && cursor != self.empty_env {
            out.push(cursor);
            cursor = self.frame(cursor).parent;
        }
        out
    }

    pub(crate) fn object_length(&self, x: Sexp) -> usize {
        match self.get(x) {
            HeapObject::Nil => 0,
            HeapObject::Cell { .. } => self.list_length(x),
            HeapObject::Env(frame) => frame.bindings.len(),
            HeapObject::Logical(v) | HeapObject::Integer(v) => v.len(),
            HeapObject::Real(v) => v.len(),
            HeapObject::Complex(v) => v.len(),
            HeapObject::Raw(v) => v.len(),
            HeapObject::Str(v) | HeapObject::List(v) | HeapObject::Expression(v) => v.len(),
            HeapObject::Char(s) => s.as_ref().map_or(2, String::len),
            _ => 1,
        }
    }

    fn set_names_from_tags(&mut self, x: Sexp, args: &Args) {
        if args.iter().all(|(tag, _)| *tag == self.nil) {
            return;
        }
        let names: Vec<Scalar> = args
            .iter()
            .map(|(tag, _)| {
                Scalar::Str(Some(if *tag == self.nil {
                    String::new()
                } else {
                    self.symbol_str(*tag).to_owned()
                }))
            })
            .collect();
        if let Some(names) = self.alloc_from_scalars(SexpType::String, &names) {
            self.set_attr(x, "names", names);
        }
    }

    fn arith(&mut self, op: BuiltinId, call: Sexp, args: &Args) -> EvalResult {
        let numeric = |heap: &HostHeap, x: Sexp| {
            matches!(
                heap.get(x).sexp_type(),
                SexpType::Logical | SexpType::Integer | SexpType::Real
            )
        };
        let (x, y) = match args {
            [(_, x)] if matches!(op, BuiltinId::Add | BuiltinId::Sub) => {
                if !numeric(self, *x) {
                    return Err(signal("invalid argument to unary operator", call));
                }
                let zero = self.alloc(HeapObject::Integer(vec![0]));
                (zero, *x)
            }
            [(_, x), (_, y)] => (*x, *y),
            _ => {
                return Err(signal(
                    format!("operator '{}' needs two arguments", op.name()),
                    call,
                ))
            }
        };
        if !numeric(self, x) || !numeric(self, y) {
            return Err(signal("non-numeric argument to binary operator", call));
        }
        let a = self.scalars(x).unwrap_or_default();
        let b = self.scalars(y).unwrap_or_default();
        let n = if a.is_empty() || b.is_empty() {
            0
        } else {
            a.len().max(b.len())
        };
        let integer = op != BuiltinId::Div
            && self.get(x).sexp_type() != SexpType::Real
            && self.get(y).sexp_type() != SexpType::Real;

        let out = if integer {
            let values = (0..n)
                .map(|i| {
                    let (p, q) = (a[i % a.len()].to_integer(), b[i % b.len()].to_integer());
                    if p == NA_INTEGER || q == NA_INTEGER {
                        return NA_INTEGER;
                    }
                    let r = match op {
                        BuiltinId::Add => p.checked_add(q),
                        BuiltinId::Sub => p.checked_sub(q),
                        _ => p.checked_mul(q),
                    };
                    r.filter(|v| *v != NA_INTEGER).unwrap_or(NA_INTEGER)
                })
                .collect();
            self.alloc(HeapObject::Integer(values))
        } else {
            let values = (0..n)
                .map(|i| {
                    let (p, q) = (a[i % a.len()].to_real(), b[i % b.len()].to_real());
                    if is_na_real(p) || is_na_real(q) {
                        return NA_REAL;
                    }
                    match op {
                        BuiltinId::Add => p + q,
                        BuiltinId::Sub => p - q,
                        BuiltinId::Mul => p * q,
                        _ => p / q,
                    }
                })
                .collect();
            self.alloc(HeapObject::Real(values))
        };
        // Attributes (dim, names) follow the operand that fixed the length.
        let source = if args.len() == 1 || a.len() != n { y } else { x };
        self.copy_attrs(source, out);
        Ok(out)
    }

    fn combine(&mut self, _call: Sexp, args: &Args) -> EvalResult {
        let mut rank = Some(0u8);
        for (_, v) in args {
            let r = combine_rank(self.get(*v).sexp_type());
            rank = match (rank, r) {
                (Some(a), Some(b)) => Some(a.max(b)),
                _ => None,
            };
        }

        let mut names: Vec<String> = Vec::new();
        let mut named = false;
        let mut push_names = |heap: &HostHeap, tag: Sexp, v: Sexp, count: usize| {
            let prefix = (tag != heap.nil).then(|| heap.symbol_str(tag).to_owned());
            let own = heap.attr(v, "names");
            let own: Vec<Option<String>> = if own != heap.nil {
                heap.scalars(own)
                    .unwrap_or_default()
                    .iter()
                    .map(Scalar::to_str)
                    .collect()
            } else {
                Vec::new()
            };
            for i in 0..count {
                let elem = own.get(i).cloned().flatten().filter(|s| !s.is_empty());
                let name = match (&prefix, elem) {
                    (Some(p), Some(e)) => format!("{p}.{e}"),
                    (Some(p), None) if count == 1 => p.clone(),
                    (Some(p), None) => format!("{p}{}", i + 1),
                    (None, Some(e)) => e,
                    (None, None) => String::new(),
                };
                named |= !name.is_empty();
                names.push(name);
            }
        };

        let out = match rank {
            Some(0) => return Ok(self.nil),
            Some(r) => {
                let mut items = Vec::new();
                for (tag, v) in args {
                    let s = self.scalars(*v).unwrap_or_default();
                    push_names(&*self, *tag, *v, s.len());
                    items.extend(s);
                }
                let ty = RANKED[usize::from(r)];
                self.alloc_from_scalars(ty, &items).unwrap_or(self.nil)
            }
            None => {
                let mut items = Vec::new();
                for (tag, v) in args {
                    match self.get(*v).sexp_type() {
                        SexpType::Nil => {}
                        SexpType::List | SexpType::Expression => {
                            let elems = match self.get(*v) {
                                HeapObject::List(e) | HeapObject::Expression(e) => e.clone(),
                                _ => unreachable!(),
                            };
                            push_names(&*self, *tag, *v, elems.len());
                            items.extend(elems);
                        }
                        ty if combine_rank(ty).is_some() => {
                            let scalars = self.scalars(*v).unwrap_or_default();
                            push_names(&*self, *tag, *v, scalars.len());
                            for s in scalars {
                                if let Some(one) = self.alloc_from_scalars(ty, &[s]) {
                                    items.push(one);
                                }
                            }
                        }
                        _ => {
                            push_names(&*self, *tag, *v, 1);
                            items.push(*v);
                        }
                    }
                }
                self.alloc(HeapObject::List(items))
            }
        };
        if named && out != self.nil {
            let names: Vec<Scalar> = names.into_iter().map(|n| Scalar::Str(Some(n))).collect();
            if let Some(names) = self.alloc_from_scalars(SexpType::String, &names) {
                self.set_attr(out, "names", names);
            }
        }
        Ok(out)
    }
}
