use crate::{Expression, OpTag, Operator, Value};
use thiserror::Error;

/// Errors in evaluating an [`Expression`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// The identifier cannot be resolved.
    #[error("unknown identifier `{0}`")]
    UnknownIdentifier(String),
    /// The operands do not have the types required by the operator.
    #[error("operator `{0}` applied to operands of the wrong type")]
    TypeMismatch(OpTag),
    /// Division (or remainder) by zero.
    #[error("division by zero")]
    DivisionByZero,
    /// Integer overflow.
    #[error("integer overflow evaluating operator `{0}`")]
    Overflow(OpTag),
    /// Array index out of bounds.
    #[error("index {index} out of bounds for array of length {len}")]
    OutOfBounds {
        /// The index.
        index: i64,
        /// The length of the array.
        len: usize,
    },
    /// Distributions have no single value.
    #[error("distributions cannot be evaluated to a single value")]
    Distribution,
    /// The iterator of an array constructor is not an identifier.
    #[error("array constructor iterator must be an identifier")]
    Iterator,
}

#[derive(Clone, Copy)]
enum Num {
    Int(i64),
    Real(f64),
}

impl Num {
    fn real(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Real(r) => r,
        }
    }
}

fn num(value: Value, op: OpTag) -> Result<Num, EvalError> {
    match value {
        Value::Int(i) => Ok(Num::Int(i)),
        Value::Real(r) => Ok(Num::Real(r)),
        Value::Constant(c) => Ok(Num::Real(c.value())),
        Value::Bool(_) | Value::Array(_) => Err(EvalError::TypeMismatch(op)),
    }
}

fn boolean(value: Value, op: OpTag) -> Result<bool, EvalError> {
    match value {
        Value::Bool(b) => Ok(b),
        _ => Err(EvalError::TypeMismatch(op)),
    }
}

fn int_arith(
    op: OpTag,
    lhs: Num,
    rhs: Num,
    int: impl Fn(i64, i64) -> Option<i64>,
    real: impl Fn(f64, f64) -> f64,
) -> Result<Value, EvalError> {
    match (lhs, rhs) {
        (Num::Int(l), Num::Int(r)) => int(l, r).map(Value::Int).ok_or(EvalError::Overflow(op)),
        _ => Ok(Value::Real(real(lhs.real(), rhs.real()))),
    }
}

fn equal(lhs: &Value, rhs: &Value, op: OpTag) -> Result<bool, EvalError> {
    match (lhs, rhs) {
        (Value::Bool(l), Value::Bool(r)) => Ok(l == r),
        (Value::Int(l), Value::Int(r)) => Ok(l == r),
        (Value::Array(l), Value::Array(r)) => {
            if l.len() != r.len() {
                return Ok(false);
            }
            l.iter().zip(r).try_fold(true, |acc, (l, r)| {
                equal(l, r, op).map(|eq| acc && eq)
            })
        }
        (l, r) => Ok(num(l.clone(), op)?.real() == num(r.clone(), op)?.real()),
    }
}

impl Expression {
    /// Evaluates a closed expression to a [`Value`],
    /// resolving identifiers through `env`.
    ///
    /// Arithmetic on integers stays integer, except for `/`, `pow` and `log`
    /// which always produce reals; mixed integer/real arithmetic produces reals.
    ///
    /// ```
    /// # use fmgen_core::{Expression, OpTag, Value};
    /// let exp = Expression::binary(
    ///     OpTag::Add,
    ///     Expression::identifier("x"),
    ///     Expression::from(2),
    /// );
    /// let val = exp.eval(&|id| (id == "x").then_some(Value::Int(40)));
    /// assert_eq!(val, Ok(Value::Int(42)));
    /// ```
    pub fn eval(&self, env: &dyn Fn(&str) -> Option<Value>) -> Result<Value, EvalError> {
        match self {
            Expression::Literal(Value::Constant(c)) => Ok(Value::Real(c.value())),
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Identifier(name) => {
                env(name).ok_or_else(|| EvalError::UnknownIdentifier(name.clone()))
            }
            Expression::Distribution(_) => Err(EvalError::Distribution),
            Expression::Operator(operator) if operator.op().is_helper() => {
                Expression::Operator(operator.clone())
                    .lower_helpers()
                    .eval(env)
            }
            Expression::Operator(operator) => eval_operator(operator, env),
        }
    }
}

fn eval_operator(
    operator: &Operator,
    env: &dyn Fn(&str) -> Option<Value>,
) -> Result<Value, EvalError> {
    let op = operator.op();
    let operands = operator.operands().map(|(_, exp)| exp).collect::<Vec<_>>();
    match (op, operands.as_slice()) {
        (OpTag::Ite, [cond, then, otherwise]) => {
            if boolean(cond.eval(env)?, op)? {
                then.eval(env)
            } else {
                otherwise.eval(env)
            }
        }
        (OpTag::And, [lhs, rhs]) => {
            Ok(Value::Bool(boolean(lhs.eval(env)?, op)? && boolean(rhs.eval(env)?, op)?))
        }
        (OpTag::Or, [lhs, rhs]) => {
            Ok(Value::Bool(boolean(lhs.eval(env)?, op)? || boolean(rhs.eval(env)?, op)?))
        }
        (OpTag::Implies, [lhs, rhs]) => {
            Ok(Value::Bool(!boolean(lhs.eval(env)?, op)? || boolean(rhs.eval(env)?, op)?))
        }
        (OpTag::Not, [exp]) => Ok(Value::Bool(!boolean(exp.eval(env)?, op)?)),
        (OpTag::Equal, [lhs, rhs]) => Ok(Value::Bool(equal(&lhs.eval(env)?, &rhs.eval(env)?, op)?)),
        (OpTag::NotEqual, [lhs, rhs]) => {
            Ok(Value::Bool(!equal(&lhs.eval(env)?, &rhs.eval(env)?, op)?))
        }
        (OpTag::Less | OpTag::LessEq | OpTag::Greater | OpTag::GreaterEq, [lhs, rhs]) => {
            let lhs = num(lhs.eval(env)?, op)?;
            let rhs = num(rhs.eval(env)?, op)?;
            let ordering = match (lhs, rhs) {
                (Num::Int(l), Num::Int(r)) => Some(l.cmp(&r)),
                _ => lhs.real().partial_cmp(&rhs.real()),
            };
            Ok(Value::Bool(ordering.is_some_and(|ord| match op {
                OpTag::Less => ord.is_lt(),
                OpTag::LessEq => ord.is_le(),
                OpTag::Greater => ord.is_gt(),
                _ => ord.is_ge(),
            })))
        }
        (
            OpTag::Add
            | OpTag::Sub
            | OpTag::Mul
            | OpTag::Div
            | OpTag::Mod
            | OpTag::Pow
            | OpTag::Log
            | OpTag::Min
            | OpTag::Max,
            [lhs, rhs],
        ) => {
            let lhs = num(lhs.eval(env)?, op)?;
            let rhs = num(rhs.eval(env)?, op)?;
            match op {
                OpTag::Add => int_arith(op, lhs, rhs, i64::checked_add, |l, r| l + r),
                OpTag::Sub => int_arith(op, lhs, rhs, i64::checked_sub, |l, r| l - r),
                OpTag::Mul => int_arith(op, lhs, rhs, i64::checked_mul, |l, r| l * r),
                OpTag::Min => int_arith(op, lhs, rhs, |l, r| Some(l.min(r)), f64::min),
                OpTag::Max => int_arith(op, lhs, rhs, |l, r| Some(l.max(r)), f64::max),
                OpTag::Div if rhs.real() == 0. => Err(EvalError::DivisionByZero),
                OpTag::Div => Ok(Value::Real(lhs.real() / rhs.real())),
                OpTag::Mod if rhs.real() == 0. => Err(EvalError::DivisionByZero),
                OpTag::Mod => int_arith(op, lhs, rhs, i64::checked_rem, |l, r| l % r),
                OpTag::Pow => Ok(Value::Real(lhs.real().powf(rhs.real()))),
                _ => Ok(Value::Real(lhs.real().ln() / rhs.real().ln())),
            }
        }
        (OpTag::Abs, [exp]) => match num(exp.eval(env)?, op)? {
            Num::Int(i) => i.checked_abs().map(Value::Int).ok_or(EvalError::Overflow(op)),
            Num::Real(r) => Ok(Value::Real(r.abs())),
        },
        (OpTag::Floor | OpTag::Ceil, [exp]) => match num(exp.eval(env)?, op)? {
            Num::Int(i) => Ok(Value::Int(i)),
            Num::Real(r) if op == OpTag::Floor => Ok(Value::Int(r.floor() as i64)),
            Num::Real(r) => Ok(Value::Int(r.ceil() as i64)),
        },
        (OpTag::Sin, [exp]) => Ok(Value::Real(num(exp.eval(env)?, op)?.real().sin())),
        (OpTag::Cos, [exp]) => Ok(Value::Real(num(exp.eval(env)?, op)?.real().cos())),
        (OpTag::ArrayValue, [elements]) => match elements.eval(env)? {
            Value::Array(values) => values
                .into_iter()
                .map(|v| Expression::Literal(v).eval(env))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            _ => Err(EvalError::TypeMismatch(op)),
        },
        (OpTag::ArrayCreate, [var, length, exp]) => {
            let var = var.as_identifier().ok_or(EvalError::Iterator)?;
            let length = match length.eval(env)? {
                Value::Int(len) if len >= 0 => len,
                _ => return Err(EvalError::TypeMismatch(op)),
            };
            (0..length)
                .map(|idx| {
                    exp.eval(&|id| {
                        if id == var {
                            Some(Value::Int(idx))
                        } else {
                            env(id)
                        }
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        (OpTag::ArrayAccess, [array, index]) => {
            let Value::Array(values) = array.eval(env)? else {
                return Err(EvalError::TypeMismatch(op));
            };
            let Value::Int(index) = index.eval(env)? else {
                return Err(EvalError::TypeMismatch(op));
            };
            usize::try_from(index)
                .ok()
                .and_then(|idx| values.get(idx).cloned())
                .ok_or(EvalError::OutOfBounds {
                    index,
                    len: values.len(),
                })
        }
        _ => Err(EvalError::TypeMismatch(op)),
    }
}

impl Value {
    /// Converts a (possibly integer) numeric value into a `f64`, if possible.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            Value::Constant(c) => Some(c.value()),
            Value::Bool(_) | Value::Array(_) => None,
        }
    }
}
