use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value as Json, json};
use std::{collections::BTreeMap, fmt, ops::Not};
use thiserror::Error;

/// Errors in building an [`Expression`] or reading it from its dictionary form.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    /// The operator tag is not known.
    #[error("unknown operator `{0}`")]
    UnknownOperator(String),
    /// A required operand was not provided.
    #[error("operator `{op}` requires operand `{operand}`")]
    MissingOperand {
        /// The operator.
        op: OpTag,
        /// The missing operand.
        operand: &'static str,
    },
    /// An operand that the operator does not take was provided.
    #[error("operator `{op}` does not take operand `{operand}`")]
    UnexpectedOperand {
        /// The operator.
        op: OpTag,
        /// The unexpected operand.
        operand: String,
    },
    /// The distribution is not known.
    #[error("unknown distribution `{0}`")]
    UnknownDistribution(String),
    /// The arguments of the distribution are malformed.
    #[error("distribution `{0}` has malformed arguments")]
    DistributionArgs(String),
    /// The bounds of a uniform distribution are inverted.
    #[error("uniform distribution has lower bound {lower} greater than upper bound {upper}")]
    UniformBounds {
        /// Lower bound.
        lower: f64,
        /// Upper bound.
        upper: f64,
    },
    /// The constant symbol is not known.
    #[error("unknown constant `{0}`")]
    UnknownConstant(String),
    /// The dictionary does not represent any expression.
    #[error("malformed expression `{0}`")]
    Malformed(String),
}

const BINARY: &[&str] = &["left", "right"];
const UNARY: &[&str] = &["exp"];
const ITE: &[&str] = &["if", "then", "else"];
const ARRAY_VALUE: &[&str] = &["elements"];
const ARRAY_CREATE: &[&str] = &["var", "length", "exp"];
const ARRAY_ACCESS: &[&str] = &["exp", "index"];
const POINT: &[&str] = &["x", "y"];
const SEGMENT: &[&str] = &["x1", "y1", "x2", "y2"];

/// The tag of an operator.
///
/// Each tag has a fixed set of operands (see [`OpTag::operands`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OpTag {
    /// Sum `+`.
    Add,
    /// Difference `-`.
    Sub,
    /// Product `*`.
    Mul,
    /// Real division `/`.
    Div,
    /// Remainder `%`.
    Mod,
    /// Power `pow`.
    Pow,
    /// Logarithm of `left` in base `right`.
    Log,
    /// Minimum.
    Min,
    /// Maximum.
    Max,
    /// `<`
    Less,
    /// `≤`
    LessEq,
    /// `>`
    Greater,
    /// `≥`
    GreaterEq,
    /// `=`
    Equal,
    /// `≠`
    NotEqual,
    /// `∧`
    And,
    /// `∨`
    Or,
    /// `⇒`
    Implies,
    /// `¬`
    Not,
    /// Absolute value.
    Abs,
    /// Floor.
    Floor,
    /// Ceiling.
    Ceil,
    /// Sine.
    Sin,
    /// Cosine.
    Cos,
    /// Round to the nearest integer.
    Round,
    /// Meters to (rounded) centimeters.
    ToCm,
    /// Centimeters to meters.
    ToM,
    /// Radians to (rounded) degrees in `[0, 360)`.
    ToDeg,
    /// Degrees to radians.
    ToRad,
    /// If-then-else.
    Ite,
    /// Array value literal `av`.
    ArrayValue,
    /// Array constructor `ac`.
    ArrayCreate,
    /// Array access `aa`.
    ArrayAccess,
    /// Euclidean norm of a 2D vector.
    Norm2d,
    /// Dot product of two 2D vectors.
    Dot2d,
    /// Cross product of two 2D vectors.
    Cross2d,
}

impl OpTag {
    /// The JANI name of the operator.
    pub const fn tag(self) -> &'static str {
        match self {
            OpTag::Add => "+",
            OpTag::Sub => "-",
            OpTag::Mul => "*",
            OpTag::Div => "/",
            OpTag::Mod => "%",
            OpTag::Pow => "pow",
            OpTag::Log => "log",
            OpTag::Min => "min",
            OpTag::Max => "max",
            OpTag::Less => "<",
            OpTag::LessEq => "≤",
            OpTag::Greater => ">",
            OpTag::GreaterEq => "≥",
            OpTag::Equal => "=",
            OpTag::NotEqual => "≠",
            OpTag::And => "∧",
            OpTag::Or => "∨",
            OpTag::Implies => "⇒",
            OpTag::Not => "¬",
            OpTag::Abs => "abs",
            OpTag::Floor => "floor",
            OpTag::Ceil => "ceil",
            OpTag::Sin => "sin",
            OpTag::Cos => "cos",
            OpTag::Round => "round",
            OpTag::ToCm => "to_cm",
            OpTag::ToM => "to_m",
            OpTag::ToDeg => "to_deg",
            OpTag::ToRad => "to_rad",
            OpTag::Ite => "ite",
            OpTag::ArrayValue => "av",
            OpTag::ArrayCreate => "ac",
            OpTag::ArrayAccess => "aa",
            OpTag::Norm2d => "norm2d",
            OpTag::Dot2d => "dot2d",
            OpTag::Cross2d => "cross2d",
        }
    }

    /// Parses an operator tag, also accepting the usual ASCII spellings
    /// (`&&`, `and`, `||`, `or`, `!`, `==`, `!=`, `<=`, `>=`, `=>`).
    ///
    /// ```
    /// # use fmgen_core::OpTag;
    /// assert_eq!(OpTag::from_tag("&&"), Some(OpTag::And));
    /// assert_eq!(OpTag::from_tag("≤"), Some(OpTag::LessEq));
    /// assert_eq!(OpTag::from_tag("xor"), None);
    /// ```
    pub fn from_tag(tag: &str) -> Option<Self> {
        let op = match tag {
            "+" => OpTag::Add,
            "-" => OpTag::Sub,
            "*" => OpTag::Mul,
            "/" => OpTag::Div,
            "%" => OpTag::Mod,
            "pow" => OpTag::Pow,
            "log" => OpTag::Log,
            "min" => OpTag::Min,
            "max" => OpTag::Max,
            "<" => OpTag::Less,
            "≤" | "<=" => OpTag::LessEq,
            ">" => OpTag::Greater,
            "≥" | ">=" => OpTag::GreaterEq,
            "=" | "==" => OpTag::Equal,
            "≠" | "!=" => OpTag::NotEqual,
            "∧" | "&&" | "and" => OpTag::And,
            "∨" | "||" | "or" => OpTag::Or,
            "⇒" | "=>" => OpTag::Implies,
            "¬" | "!" => OpTag::Not,
            "abs" => OpTag::Abs,
            "floor" => OpTag::Floor,
            "ceil" => OpTag::Ceil,
            "sin" => OpTag::Sin,
            "cos" => OpTag::Cos,
            "round" => OpTag::Round,
            "to_cm" => OpTag::ToCm,
            "to_m" => OpTag::ToM,
            "to_deg" => OpTag::ToDeg,
            "to_rad" => OpTag::ToRad,
            "ite" => OpTag::Ite,
            "av" => OpTag::ArrayValue,
            "ac" => OpTag::ArrayCreate,
            "aa" => OpTag::ArrayAccess,
            "norm2d" => OpTag::Norm2d,
            "dot2d" => OpTag::Dot2d,
            "cross2d" => OpTag::Cross2d,
            _ => return None,
        };
        Some(op)
    }

    /// The names of the operands required by the operator, in their canonical order.
    pub const fn operands(self) -> &'static [&'static str] {
        match self {
            OpTag::Add
            | OpTag::Sub
            | OpTag::Mul
            | OpTag::Div
            | OpTag::Mod
            | OpTag::Pow
            | OpTag::Log
            | OpTag::Min
            | OpTag::Max
            | OpTag::Less
            | OpTag::LessEq
            | OpTag::Greater
            | OpTag::GreaterEq
            | OpTag::Equal
            | OpTag::NotEqual
            | OpTag::And
            | OpTag::Or
            | OpTag::Implies => BINARY,
            OpTag::Not
            | OpTag::Abs
            | OpTag::Floor
            | OpTag::Ceil
            | OpTag::Sin
            | OpTag::Cos
            | OpTag::Round
            | OpTag::ToCm
            | OpTag::ToM
            | OpTag::ToDeg
            | OpTag::ToRad => UNARY,
            OpTag::Ite => ITE,
            OpTag::ArrayValue => ARRAY_VALUE,
            OpTag::ArrayCreate => ARRAY_CREATE,
            OpTag::ArrayAccess => ARRAY_ACCESS,
            OpTag::Norm2d => POINT,
            OpTag::Dot2d | OpTag::Cross2d => SEGMENT,
        }
    }

    /// Whether the operator is a helper that has to be lowered
    /// (see [`Expression::lower_helpers`]) before being handed to a JANI model checker.
    pub const fn is_helper(self) -> bool {
        matches!(
            self,
            OpTag::Round
                | OpTag::ToCm
                | OpTag::ToM
                | OpTag::ToDeg
                | OpTag::ToRad
                | OpTag::Norm2d
                | OpTag::Dot2d
                | OpTag::Cross2d
        )
    }
}

impl fmt::Display for OpTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Mathematical constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MathConstant {
    /// Euler's number.
    E,
    /// Archimedes' constant.
    Pi,
}

impl MathConstant {
    /// The JANI symbol of the constant.
    pub const fn symbol(self) -> &'static str {
        match self {
            MathConstant::E => "e",
            MathConstant::Pi => "π",
        }
    }

    /// The numeric value of the constant.
    pub const fn value(self) -> f64 {
        match self {
            MathConstant::E => std::f64::consts::E,
            MathConstant::Pi => std::f64::consts::PI,
        }
    }
}

/// A literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Real value.
    Real(f64),
    /// Symbolic mathematical constant.
    Constant(MathConstant),
    /// Fixed-length list of values, as in the elements of an array-value operator.
    Array(Vec<Value>),
}

impl Value {
    /// Translates the value to its JANI dictionary form.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => json!(i),
            Value::Real(r) => json!(r),
            Value::Constant(c) => json!({ "constant": c.symbol() }),
            Value::Array(values) => Json::Array(values.iter().map(Value::to_json).collect()),
        }
    }

    /// Reads a value from its JANI dictionary form.
    pub fn from_json(json: &Json) -> Result<Self, ExpressionError> {
        match json {
            Json::Bool(b) => Ok(Value::Bool(*b)),
            Json::Number(n) => n
                .as_i64()
                .map(Value::Int)
                .or_else(|| n.as_f64().map(Value::Real))
                .ok_or_else(|| ExpressionError::Malformed(json.to_string())),
            Json::Array(values) => values
                .iter()
                .map(Value::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Json::Object(map) => match map.get("constant").and_then(Json::as_str) {
                Some("e") => Ok(Value::Constant(MathConstant::E)),
                Some("π") => Ok(Value::Constant(MathConstant::Pi)),
                Some(other) => Err(ExpressionError::UnknownConstant(other.to_owned())),
                None => Err(ExpressionError::Malformed(json.to_string())),
            },
            Json::Null | Json::String(_) => Err(ExpressionError::Malformed(json.to_string())),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r:?}"),
            Value::Constant(c) => f.write_str(c.symbol()),
            Value::Array(values) => {
                f.write_str("[")?;
                for (idx, value) in values.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// A statistical distribution over real values.
#[derive(Debug, Clone, PartialEq)]
pub enum Distribution {
    /// Uniform distribution over `[lower, upper]`.
    Uniform {
        /// Lower bound.
        lower: f64,
        /// Upper bound.
        upper: f64,
    },
}

impl Distribution {
    /// Creates a uniform distribution, failing if `lower > upper`.
    pub fn uniform(lower: f64, upper: f64) -> Result<Self, ExpressionError> {
        // written this way to reject NaN bounds as well
        if lower <= upper {
            Ok(Distribution::Uniform { lower, upper })
        } else {
            Err(ExpressionError::UniformBounds { lower, upper })
        }
    }

    /// Approximates the distribution with `resolution` equally-spaced values.
    ///
    /// ```
    /// # use fmgen_core::Distribution;
    /// let values = Distribution::uniform(1.0, 3.0).unwrap().discretize(100);
    /// assert_eq!(values.len(), 100);
    /// assert_eq!(values[0], 1.0);
    /// assert!((values[10] - 1.2).abs() < 1e-9);
    /// assert!((values[99] - 2.98).abs() < 1e-9);
    /// ```
    pub fn discretize(&self, resolution: usize) -> Vec<f64> {
        match *self {
            Distribution::Uniform { lower, upper } => {
                let step = (upper - lower) / resolution as f64;
                (0..resolution).map(|k| lower + k as f64 * step).collect()
            }
        }
    }

    fn to_json(&self) -> Json {
        match self {
            Distribution::Uniform { lower, upper } => {
                json!({ "distribution": "Uniform", "args": [lower, upper] })
            }
        }
    }

    fn from_json(map: &Map<String, Json>) -> Result<Self, ExpressionError> {
        let name = map
            .get("distribution")
            .and_then(Json::as_str)
            .ok_or_else(|| ExpressionError::Malformed(Json::Object(map.clone()).to_string()))?;
        match name {
            "Uniform" => {
                let args = map
                    .get("args")
                    .and_then(Json::as_array)
                    .map(|args| args.iter().filter_map(Json::as_f64).collect::<Vec<_>>())
                    .ok_or_else(|| ExpressionError::DistributionArgs(name.to_owned()))?;
                match args.as_slice() {
                    [lower, upper] => Distribution::uniform(*lower, *upper),
                    _ => Err(ExpressionError::DistributionArgs(name.to_owned())),
                }
            }
            _ => Err(ExpressionError::UnknownDistribution(name.to_owned())),
        }
    }
}

/// An operator applied to its named operands.
///
/// The set of operands is checked against [`OpTag::operands`] at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Operator {
    op: OpTag,
    operands: BTreeMap<&'static str, Expression>,
}

impl Operator {
    /// Creates a new operator application,
    /// failing if any required operand is missing or an unknown one is given.
    ///
    /// ```
    /// # use fmgen_core::{Expression, OpTag, Operator};
    /// let sum = Operator::new(
    ///     OpTag::Add,
    ///     [("left", Expression::from(1)), ("right", Expression::identifier("x"))],
    /// )
    /// .expect("well-formed");
    /// assert_eq!(sum.op(), OpTag::Add);
    ///
    /// Operator::new(OpTag::Add, [("left", Expression::from(1))]).expect_err("missing operand");
    /// ```
    pub fn new<S: AsRef<str>>(
        op: OpTag,
        operands: impl IntoIterator<Item = (S, Expression)>,
    ) -> Result<Self, ExpressionError> {
        let mut map = BTreeMap::new();
        for (role, operand) in operands {
            let role = op
                .operands()
                .iter()
                .find(|r| **r == role.as_ref())
                .ok_or_else(|| ExpressionError::UnexpectedOperand {
                    op,
                    operand: role.as_ref().to_owned(),
                })?;
            map.insert(*role, operand);
        }
        if let Some(missing) = op.operands().iter().find(|r| !map.contains_key(*r)) {
            return Err(ExpressionError::MissingOperand {
                op,
                operand: *missing,
            });
        }
        Ok(Self { op, operands: map })
    }

    // Operands are given in canonical order.
    fn from_parts(op: OpTag, operands: Vec<Expression>) -> Self {
        debug_assert_eq!(op.operands().len(), operands.len());
        Self {
            op,
            operands: op.operands().iter().copied().zip(operands).collect(),
        }
    }

    /// The operator's tag.
    pub fn op(&self) -> OpTag {
        self.op
    }

    /// The operand with the given name, if any.
    pub fn operand(&self, role: &str) -> Option<&Expression> {
        self.operands.get(role)
    }

    /// Iterates over operands in the canonical order of [`OpTag::operands`].
    pub fn operands(&self) -> impl Iterator<Item = (&'static str, &Expression)> {
        self.op
            .operands()
            .iter()
            .filter_map(|role| self.operands.get(role).map(|exp| (*role, exp)))
    }

    /// Consumes the operator returning its operands in canonical order.
    pub fn into_operands(mut self) -> Vec<Expression> {
        self.op
            .operands()
            .iter()
            .filter_map(|role| self.operands.remove(role))
            .collect()
    }

    fn map(&self, f: impl Fn(&Expression) -> Expression) -> Self {
        Self {
            op: self.op,
            operands: self
                .operands
                .iter()
                .map(|(role, exp)| (*role, f(exp)))
                .collect(),
        }
    }
}

/// An expression of the JANI-like language.
///
/// An expression is exactly one of a literal value, an identifier,
/// an operator applied to named operands, or a statistical distribution.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A literal value.
    Literal(Value),
    /// A (possibly dotted) name referencing a variable, a constant or an event field.
    Identifier(String),
    /// An operator applied to its operands.
    Operator(Operator),
    /// A statistical distribution.
    Distribution(Distribution),
}

impl Expression {
    /// Creates an identifier expression.
    pub fn identifier(name: impl Into<String>) -> Self {
        Expression::Identifier(name.into())
    }

    /// Creates a binary operator expression with operands `left` and `right`.
    pub fn binary(op: OpTag, left: Expression, right: Expression) -> Self {
        debug_assert_eq!(op.operands(), BINARY);
        Expression::Operator(Operator::from_parts(op, vec![left, right]))
    }

    /// Creates a unary operator expression with operand `exp`.
    pub fn unary(op: OpTag, exp: Expression) -> Self {
        debug_assert_eq!(op.operands(), UNARY);
        Expression::Operator(Operator::from_parts(op, vec![exp]))
    }

    /// Creates an if-then-else expression.
    pub fn ite(cond: Expression, then: Expression, otherwise: Expression) -> Self {
        Expression::Operator(Operator::from_parts(OpTag::Ite, vec![cond, then, otherwise]))
    }

    /// Creates an array access expression `array[index]`.
    pub fn array_access(array: Expression, index: Expression) -> Self {
        Expression::Operator(Operator::from_parts(OpTag::ArrayAccess, vec![array, index]))
    }

    /// Creates an array of `length` elements,
    /// where the element at index `var` takes the value of `exp`.
    pub fn array_create(var: impl Into<String>, length: Expression, exp: Expression) -> Self {
        Expression::Operator(Operator::from_parts(
            OpTag::ArrayCreate,
            vec![Expression::Identifier(var.into()), length, exp],
        ))
    }

    /// Creates an array-value literal.
    pub fn array_value(elements: Vec<Value>) -> Self {
        Expression::Operator(Operator::from_parts(
            OpTag::ArrayValue,
            vec![Expression::Literal(Value::Array(elements))],
        ))
    }

    /// Conjunction of `self` and `rhs`.
    pub fn and(self, rhs: Expression) -> Self {
        Expression::binary(OpTag::And, self, rhs)
    }

    /// Disjunction of `self` and `rhs`.
    pub fn or(self, rhs: Expression) -> Self {
        Expression::binary(OpTag::Or, self, rhs)
    }

    /// The name, if the expression is an identifier.
    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Expression::Identifier(name) => Some(name),
            _ => None,
        }
    }

    /// The value, if the expression is a literal.
    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Expression::Literal(value) => Some(value),
            _ => None,
        }
    }

    /// The operator, if the expression is an operator application.
    pub fn as_operator(&self) -> Option<&Operator> {
        match self {
            Expression::Operator(operator) => Some(operator),
            _ => None,
        }
    }

    /// Whether the expression contains a distribution anywhere in its tree.
    pub fn contains_distribution(&self) -> bool {
        match self {
            Expression::Distribution(_) => true,
            Expression::Operator(operator) => operator
                .operands()
                .any(|(_, exp)| exp.contains_distribution()),
            Expression::Literal(_) | Expression::Identifier(_) => false,
        }
    }

    /// Whether the expression contains an operator with the given tag.
    pub fn contains_op(&self, op: OpTag) -> bool {
        match self {
            Expression::Operator(operator) => {
                operator.op == op || operator.operands().any(|(_, exp)| exp.contains_op(op))
            }
            _ => false,
        }
    }

    /// Replaces the leading component `from` of every identifier with `to`.
    ///
    /// ```
    /// # use fmgen_core::Expression;
    /// let exp = Expression::identifier("_event.data").rename_prefix("_event", "level");
    /// assert_eq!(exp, Expression::identifier("level.data"));
    /// let exp = Expression::identifier("_events").rename_prefix("_event", "level");
    /// assert_eq!(exp, Expression::identifier("_events"));
    /// ```
    pub fn rename_prefix(&self, from: &str, to: &str) -> Self {
        match self {
            Expression::Identifier(name) => {
                if name == from {
                    Expression::Identifier(to.to_owned())
                } else if let Some(rest) = name
                    .strip_prefix(from)
                    .and_then(|rest| rest.strip_prefix('.'))
                {
                    Expression::Identifier(format!("{to}.{rest}"))
                } else {
                    self.clone()
                }
            }
            Expression::Operator(operator) => {
                Expression::Operator(operator.map(|exp| exp.rename_prefix(from, to)))
            }
            Expression::Literal(_) | Expression::Distribution(_) => self.clone(),
        }
    }

    /// Rewrites helper operators (see [`OpTag::is_helper`])
    /// in terms of the standard JANI operators.
    ///
    /// ```
    /// # use fmgen_core::{Expression, OpTag};
    /// let norm = Expression::Operator(
    ///     fmgen_core::Operator::new(
    ///         OpTag::Norm2d,
    ///         [("x", Expression::from(3.0)), ("y", Expression::from(4.0))],
    ///     )
    ///     .unwrap(),
    /// );
    /// let lowered = norm.lower_helpers();
    /// assert!(!lowered.contains_op(OpTag::Norm2d));
    /// assert!(lowered.contains_op(OpTag::Pow));
    /// ```
    pub fn lower_helpers(&self) -> Self {
        match self {
            Expression::Operator(operator) => {
                let lowered = operator.map(Expression::lower_helpers);
                if lowered.op.is_helper() {
                    lower_helper(lowered)
                } else {
                    Expression::Operator(lowered)
                }
            }
            Expression::Literal(_) | Expression::Identifier(_) | Expression::Distribution(_) => {
                self.clone()
            }
        }
    }

    /// Translates the expression to its JANI dictionary form.
    pub fn to_json(&self) -> Json {
        match self {
            Expression::Literal(value) => value.to_json(),
            Expression::Identifier(name) => Json::String(name.clone()),
            Expression::Operator(operator) => {
                let mut map = Map::new();
                map.insert("op".to_owned(), Json::String(operator.op.tag().to_owned()));
                for (role, exp) in operator.operands() {
                    map.insert(role.to_owned(), exp.to_json());
                }
                Json::Object(map)
            }
            Expression::Distribution(distribution) => distribution.to_json(),
        }
    }

    /// Reads an expression from its JANI dictionary form.
    ///
    /// ```
    /// # use fmgen_core::{Expression, OpTag};
    /// let json = serde_json::json!({"op": "&&", "left": "a", "right": true});
    /// let exp = Expression::from_json(&json).expect("valid expression");
    /// assert_eq!(exp.as_operator().map(|op| op.op()), Some(OpTag::And));
    /// ```
    pub fn from_json(json: &Json) -> Result<Self, ExpressionError> {
        match json {
            Json::String(name) => Ok(Expression::Identifier(name.clone())),
            Json::Object(map) if map.contains_key("op") => {
                let tag = map
                    .get("op")
                    .and_then(Json::as_str)
                    .ok_or_else(|| ExpressionError::Malformed(json.to_string()))?;
                let op = OpTag::from_tag(tag)
                    .ok_or_else(|| ExpressionError::UnknownOperator(tag.to_owned()))?;
                let operands = map
                    .iter()
                    .filter(|(key, _)| key.as_str() != "op")
                    .map(|(key, value)| Expression::from_json(value).map(|exp| (key, exp)))
                    .collect::<Result<Vec<_>, _>>()?;
                Operator::new(op, operands).map(Expression::Operator)
            }
            Json::Object(map) if map.contains_key("distribution") => {
                Distribution::from_json(map).map(Expression::Distribution)
            }
            _ => Value::from_json(json).map(Expression::Literal),
        }
    }
}

fn lower_helper(operator: Operator) -> Expression {
    use Expression as E;

    let op = operator.op;
    let pi = || E::Literal(Value::Constant(MathConstant::Pi));
    let round = |exp: Expression| {
        E::unary(
            OpTag::Floor,
            E::binary(OpTag::Add, exp, E::Literal(Value::Real(0.5))),
        )
    };
    match (op, operator.into_operands().as_slice()) {
        (OpTag::Round, [exp]) => round(exp.clone()),
        (OpTag::ToCm, [exp]) => round(E::binary(OpTag::Mul, exp.clone(), E::from(100))),
        (OpTag::ToM, [exp]) => E::binary(OpTag::Mul, exp.clone(), E::from(0.01)),
        (OpTag::ToDeg, [exp]) => E::binary(
            OpTag::Mod,
            round(E::binary(
                OpTag::Div,
                E::binary(OpTag::Mul, exp.clone(), E::from(180)),
                pi(),
            )),
            E::from(360),
        ),
        (OpTag::ToRad, [exp]) => E::binary(
            OpTag::Div,
            E::binary(OpTag::Mul, exp.clone(), pi()),
            E::from(180),
        ),
        (OpTag::Norm2d, [x, y]) => E::binary(
            OpTag::Pow,
            E::binary(
                OpTag::Add,
                E::binary(OpTag::Mul, x.clone(), x.clone()),
                E::binary(OpTag::Mul, y.clone(), y.clone()),
            ),
            E::from(0.5),
        ),
        (OpTag::Dot2d, [x1, y1, x2, y2]) => E::binary(
            OpTag::Add,
            E::binary(OpTag::Mul, x1.clone(), x2.clone()),
            E::binary(OpTag::Mul, y1.clone(), y2.clone()),
        ),
        (OpTag::Cross2d, [x1, y1, x2, y2]) => E::binary(
            OpTag::Sub,
            E::binary(OpTag::Mul, x1.clone(), y2.clone()),
            E::binary(OpTag::Mul, y1.clone(), x2.clone()),
        ),
        (_, operands) => E::Operator(Operator::from_parts(op, operands.to_vec())),
    }
}

impl Not for Expression {
    type Output = Expression;

    fn not(self) -> Self::Output {
        Expression::unary(OpTag::Not, self)
    }
}

impl From<Value> for Expression {
    fn from(value: Value) -> Self {
        Expression::Literal(value)
    }
}

impl From<bool> for Expression {
    fn from(value: bool) -> Self {
        Expression::Literal(Value::Bool(value))
    }
}

impl From<i64> for Expression {
    fn from(value: i64) -> Self {
        Expression::Literal(Value::Int(value))
    }
}

impl From<f64> for Expression {
    fn from(value: f64) -> Self {
        Expression::Literal(Value::Real(value))
    }
}

impl From<&str> for Expression {
    fn from(name: &str) -> Self {
        Expression::identifier(name)
    }
}

impl From<String> for Expression {
    fn from(name: String) -> Self {
        Expression::Identifier(name)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(value) => write!(f, "{value}"),
            Expression::Identifier(name) => f.write_str(name),
            Expression::Distribution(Distribution::Uniform { lower, upper }) => {
                write!(f, "Uniform({lower:?}, {upper:?})")
            }
            Expression::Operator(operator) => {
                let op = operator.op;
                match (op, operator.operand_list().as_slice()) {
                    (_, [left, right]) if op.operands() == BINARY => {
                        write!(f, "({left} {op} {right})")
                    }
                    (OpTag::Not, [exp]) => write!(f, "¬{exp}"),
                    (OpTag::Ite, [cond, then, otherwise]) => {
                        write!(f, "({cond} ? {then} : {otherwise})")
                    }
                    (OpTag::ArrayAccess, [array, index]) => write!(f, "{array}[{index}]"),
                    (OpTag::ArrayValue, [elements]) => write!(f, "{elements}"),
                    (_, operands) => {
                        write!(f, "{op}(")?;
                        for (idx, exp) in operands.iter().enumerate() {
                            if idx > 0 {
                                f.write_str(", ")?;
                            }
                            write!(f, "{exp}")?;
                        }
                        f.write_str(")")
                    }
                }
            }
        }
    }
}

impl Operator {
    fn operand_list(&self) -> Vec<&Expression> {
        self.operands().map(|(_, exp)| exp).collect()
    }
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = Json::deserialize(deserializer)?;
        Expression::from_json(&json).map_err(serde::de::Error::custom)
    }
}
