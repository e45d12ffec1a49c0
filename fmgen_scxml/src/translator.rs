//! Translation of ECMAScript expressions into JANI [`Expression`]s.

use crate::types::{ArrayShape, BaseType, length_variable};
use boa_ast::{
    Expression as JsExpression, Statement, StatementListItem,
    expression::{
        Call,
        access::{PropertyAccess, PropertyAccessField},
        literal::{ArrayLiteral, Literal},
        operator::{
            Binary, Unary,
            binary::{ArithmeticOp, BinaryOp, LogicalOp, RelationalOp},
            unary::UnaryOp,
        },
    },
    scope::Scope,
};
use boa_interner::{Interner, Sym};
use boa_parser::{Parser, Source};
use fmgen_core::{Distribution, Expression, OpTag, Value};
use logos::Logos;
use thiserror::Error;

/// The reason an expression could not be translated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TranslationCause {
    /// The source is not valid ECMAScript.
    #[error("parse error: {0}")]
    Parse(String),
    /// The source is not made of exactly one expression.
    #[error("the source must contain exactly one expression")]
    NotAnExpression,
    /// Capitalized boolean literals are identifiers in ECMAScript.
    #[error("'{0}' is not a boolean literal: did you mean to use lowercase 'true' or 'false'?")]
    CapitalizedBoolean(String),
    /// The construct is not supported.
    #[error("unsupported construct: {0}")]
    Unsupported(&'static str),
    /// The unary operator is not supported.
    #[error("unsupported unary operator {0}")]
    UnaryOperator(String),
    /// The binary operator is not supported.
    #[error("unsupported binary operator {0}")]
    BinaryOperator(String),
    /// Only functions of the form `Math.<name>` can be called.
    #[error("callee must have the form 'Math.<function>'")]
    Callee,
    /// The function is not supported.
    #[error("unknown function 'Math.{0}'")]
    UnknownFunction(String),
    /// The function is called with the wrong number of arguments.
    #[error("function 'Math.{function}' takes {expected} arguments but {found} were given")]
    Arity {
        /// The called function.
        function: String,
        /// The number of arguments it takes.
        expected: usize,
        /// The number of arguments given.
        found: usize,
    },
    /// Array literals need the type and size of the array they are assigned to.
    #[error("array literals are only supported where the array type is known")]
    MissingArrayShape,
    /// Array elements must be literals of the array's element type.
    #[error("array elements must be literals of type {0:?}")]
    ArrayElement(BaseType),
    /// The array literal is larger than the array's max size.
    #[error("array literal has {len} elements, but max size is {max}")]
    ArrayTooLong {
        /// Number of elements of the literal.
        len: usize,
        /// Max size of the array.
        max: usize,
    },
    /// A symbol could not be resolved.
    #[error("unresolved symbol")]
    Symbol,
}

/// Failure to translate an expression, with the source that caused it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("failed to translate expression '{source_text}'")]
pub struct TranslationError {
    /// The source of the expression.
    pub source_text: String,
    /// What went wrong.
    #[source]
    pub cause: TranslationCause,
}

/// Translates an ECMAScript expression into an [`Expression`].
///
/// Array literals are only accepted together with the `shape` of the array they define.
///
/// ```
/// # use fmgen_scxml::translate;
/// let exp = translate("_event.data < 20 && !Math.abs(x) == 1.0", None).unwrap();
/// assert_eq!(exp.to_string(), "((_event.data < 20) ∧ (¬abs(x) = 1.0))");
/// ```
pub fn translate(source: &str, shape: Option<&ArrayShape>) -> Result<Expression, TranslationError> {
    translate_with_lengths(source, shape).map(|(exp, _)| exp)
}

/// Like [`translate`], but if the expression is an array literal
/// also returns its lengths before padding, one value per dimension
/// (see [`ArrayShape::zero_lengths`] for their layout).
///
/// ```
/// # use fmgen_scxml::{ArrayShape, BaseType, translate_with_lengths};
/// # use fmgen_core::Value;
/// let shape = ArrayShape { base: BaseType::Int, max_sizes: vec![3, 2] };
/// let (_, lengths) = translate_with_lengths("[[1], [2, 3]]", Some(&shape)).unwrap();
/// let inner = Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(0)]);
/// assert_eq!(lengths, Some(vec![Value::Int(2), inner]));
/// ```
pub fn translate_with_lengths(
    source: &str,
    shape: Option<&ArrayShape>,
) -> Result<(Expression, Option<Vec<Value>>), TranslationError> {
    let error = |cause| TranslationError {
        source_text: source.to_owned(),
        cause,
    };
    let mut interner = Interner::default();
    let script = Parser::new(Source::from_bytes(source))
        .parse_script(&Scope::new_global(), &mut interner)
        .map_err(|err| error(TranslationCause::Parse(err.to_string())))?;
    let expression = match script.statements().statements() {
        [StatementListItem::Statement(statement)] => {
            let statement: &Statement = statement;
            match statement {
                Statement::Expression(expression) => expression,
                _ => return Err(error(TranslationCause::NotAnExpression)),
            }
        }
        _ => return Err(error(TranslationCause::NotAnExpression)),
    };
    let lengths = match (strip_parens(expression), shape) {
        (JsExpression::ArrayLiteral(array), Some(shape)) => {
            Some(literal_lengths(array.as_ref(), shape))
        }
        _ => None,
    };
    let mut translator = Translator {
        interner: &interner,
        numbers: numeric_lexemes(source).into_iter(),
    };
    translator
        .expression(expression, shape)
        .map(|exp| (exp, lengths))
        .map_err(error)
}

// Lengths of each dimension of an array literal, padded as the literal itself.
fn literal_lengths(elements: &[Option<JsExpression>], shape: &ArrayShape) -> Vec<Value> {
    let len = i64::try_from(elements.len()).unwrap_or(i64::MAX);
    let mut lengths = vec![Value::Int(len)];
    if let Some(inner) = shape.inner() {
        let nested: Vec<Vec<Value>> = (0..shape.max_sizes[0])
            .map(|idx| match elements.get(idx).and_then(Option::as_ref).map(strip_parens) {
                Some(JsExpression::ArrayLiteral(array)) => literal_lengths(array.as_ref(), &inner),
                _ => inner.zero_lengths(),
            })
            .collect();
        for dim in 0..inner.max_sizes.len() {
            lengths.push(Value::Array(
                nested.iter().map(|row| row[dim].clone()).collect(),
            ));
        }
    }
    lengths
}

// `a[i][j].length` is the length of dimension 3 of `a` at `[i][j]`.
fn length_access(exp: Expression, dimension: usize) -> Option<Expression> {
    match exp {
        Expression::Identifier(name) => {
            Some(Expression::identifier(length_variable(&name, dimension)))
        }
        Expression::Operator(operator) if operator.op() == OpTag::ArrayAccess => {
            let mut operands = operator.into_operands().into_iter();
            let (array, index) = (operands.next()?, operands.next()?);
            length_access(array, dimension + 1).map(|array| Expression::array_access(array, index))
        }
        _ => None,
    }
}

#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
enum Lexeme {
    #[regex(r"[0-9]+(\.[0-9]*)?([eE][+-]?[0-9]+)?")]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?")]
    Number,
    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*")]
    Identifier,
    #[regex(r#""([^"\\]|\\.)*""#)]
    #[regex(r"'([^'\\]|\\.)*'")]
    String,
}

// The raw numeric literals of the source, in order.
// The parser folds `1.0` into an integer literal: the raw text tells them apart.
fn numeric_lexemes(source: &str) -> Vec<&str> {
    let mut lexer = Lexeme::lexer(source);
    let mut numbers = Vec::new();
    while let Some(token) = lexer.next() {
        if token == Ok(Lexeme::Number) {
            numbers.push(lexer.slice());
        }
    }
    numbers
}

fn strip_parens(mut exp: &JsExpression) -> &JsExpression {
    while let JsExpression::Parenthesized(paren) = exp {
        exp = paren.expression();
    }
    exp
}

struct Translator<'a> {
    interner: &'a Interner,
    // Consumed in source order, one per numeric literal.
    numbers: std::vec::IntoIter<&'a str>,
}

impl<'a> Translator<'a> {
    fn resolve(&self, sym: Sym) -> Result<&'a str, TranslationCause> {
        self.interner
            .resolve(sym)
            .and_then(|name| name.utf8())
            .ok_or(TranslationCause::Symbol)
    }

    fn expression(
        &mut self,
        exp: &JsExpression,
        shape: Option<&ArrayShape>,
    ) -> Result<Expression, TranslationCause> {
        match exp {
            JsExpression::Parenthesized(paren) => self.expression(paren.expression(), shape),
            JsExpression::Literal(literal) => self.literal(literal).map(Expression::Literal),
            JsExpression::Identifier(ident) => match self.resolve(ident.sym())? {
                name @ ("True" | "False") => {
                    Err(TranslationCause::CapitalizedBoolean(name.to_owned()))
                }
                name => Ok(Expression::identifier(name)),
            },
            JsExpression::PropertyAccess(access) => self.property_access(access),
            JsExpression::Unary(unary) => self.unary(unary),
            JsExpression::Binary(binary) => self.binary(binary),
            JsExpression::Call(call) => self.call(call),
            JsExpression::ArrayLiteral(array) => {
                let shape = shape.ok_or(TranslationCause::MissingArrayShape)?;
                self.array(array, shape)
            }
            JsExpression::Conditional(_) => Err(TranslationCause::Unsupported("conditional")),
            JsExpression::Assign(_) => Err(TranslationCause::Unsupported("assignment")),
            JsExpression::Update(_) => Err(TranslationCause::Unsupported("increment/decrement")),
            _ => Err(TranslationCause::Unsupported("expression")),
        }
    }

    fn literal(&mut self, literal: &Literal) -> Result<Value, TranslationCause> {
        match literal {
            Literal::Bool(b) => Ok(Value::Bool(*b)),
            Literal::Int(int) => {
                let lexeme = self.numbers.next().unwrap_or_default();
                if lexeme.matches('.').count() == 1 {
                    Ok(Value::Real(f64::from(*int)))
                } else {
                    Ok(Value::Int(i64::from(*int)))
                }
            }
            // reals, and integers out of the i32 range
            Literal::Num(num) => {
                let lexeme = self.numbers.next().unwrap_or_default();
                let integral = !lexeme.is_empty()
                    && lexeme.bytes().all(|byte| byte.is_ascii_digit())
                    && num.fract() == 0.;
                match lexeme.parse::<i64>() {
                    Ok(int) if integral => Ok(Value::Int(int)),
                    _ => Ok(Value::Real(*num)),
                }
            }
            Literal::String(_) => Err(TranslationCause::Unsupported("string literal")),
            _ => Err(TranslationCause::Unsupported("literal")),
        }
    }

    fn property_access(&mut self, access: &PropertyAccess) -> Result<Expression, TranslationCause> {
        let PropertyAccess::Simple(access) = access else {
            return Err(TranslationCause::Unsupported("private or super property access"));
        };
        let target = self.expression(access.target(), None)?;
        match access.field() {
            PropertyAccessField::Const(field) => match (target, self.resolve(*field)?) {
                (Expression::Identifier(name), field) => {
                    Ok(Expression::Identifier(format!("{name}.{field}")))
                }
                (target, "length") => length_access(target, 1)
                    .ok_or(TranslationCause::Unsupported("length of a computed value")),
                _ => Err(TranslationCause::Unsupported("member of a computed value")),
            },
            PropertyAccessField::Expr(index) => {
                let index = self.expression(index, None)?;
                Ok(Expression::array_access(target, index))
            }
        }
    }

    fn unary(&mut self, unary: &Unary) -> Result<Expression, TranslationCause> {
        match unary.op() {
            UnaryOp::Minus => {
                let exp = self.expression(unary.target(), None)?;
                Ok(Expression::binary(OpTag::Sub, Expression::from(0i64), exp))
            }
            UnaryOp::Not => {
                let exp = self.expression(unary.target(), None)?;
                Ok(!exp)
            }
            op => Err(TranslationCause::UnaryOperator(format!("{op:?}"))),
        }
    }

    fn binary(&mut self, binary: &Binary) -> Result<Expression, TranslationCause> {
        let op = match binary.op() {
            BinaryOp::Arithmetic(op) => match op {
                ArithmeticOp::Add => OpTag::Add,
                ArithmeticOp::Sub => OpTag::Sub,
                ArithmeticOp::Mul => OpTag::Mul,
                ArithmeticOp::Div => OpTag::Div,
                ArithmeticOp::Mod => OpTag::Mod,
                ArithmeticOp::Exp => OpTag::Pow,
            },
            BinaryOp::Relational(op) => match op {
                RelationalOp::Equal | RelationalOp::StrictEqual => OpTag::Equal,
                RelationalOp::NotEqual | RelationalOp::StrictNotEqual => OpTag::NotEqual,
                RelationalOp::LessThan => OpTag::Less,
                RelationalOp::LessThanOrEqual => OpTag::LessEq,
                RelationalOp::GreaterThan => OpTag::Greater,
                RelationalOp::GreaterThanOrEqual => OpTag::GreaterEq,
                op => return Err(TranslationCause::BinaryOperator(format!("{op:?}"))),
            },
            BinaryOp::Logical(LogicalOp::And) => OpTag::And,
            BinaryOp::Logical(LogicalOp::Or) => OpTag::Or,
            op => return Err(TranslationCause::BinaryOperator(format!("{op:?}"))),
        };
        let lhs = self.expression(binary.lhs(), None)?;
        let rhs = self.expression(binary.rhs(), None)?;
        Ok(Expression::binary(op, lhs, rhs))
    }

    fn call(&mut self, call: &Call) -> Result<Expression, TranslationCause> {
        let JsExpression::PropertyAccess(PropertyAccess::Simple(callee)) = call.function() else {
            return Err(TranslationCause::Callee);
        };
        let (JsExpression::Identifier(object), PropertyAccessField::Const(function)) =
            (callee.target(), callee.field())
        else {
            return Err(TranslationCause::Callee);
        };
        if self.resolve(object.sym())? != "Math" {
            return Err(TranslationCause::Callee);
        }
        let function = self.resolve(*function)?;
        let (op, arity) = match function {
            "abs" => (Some(OpTag::Abs), 1),
            "floor" => (Some(OpTag::Floor), 1),
            "ceil" => (Some(OpTag::Ceil), 1),
            "cos" => (Some(OpTag::Cos), 1),
            "sin" => (Some(OpTag::Sin), 1),
            "log" => (Some(OpTag::Log), 2),
            "pow" => (Some(OpTag::Pow), 2),
            "min" => (Some(OpTag::Min), 2),
            "max" => (Some(OpTag::Max), 2),
            "random" => (None, 0),
            _ => return Err(TranslationCause::UnknownFunction(function.to_owned())),
        };
        if call.args().len() != arity {
            return Err(TranslationCause::Arity {
                function: function.to_owned(),
                expected: arity,
                found: call.args().len(),
            });
        }
        let mut args = Vec::with_capacity(arity);
        for arg in call.args() {
            args.push(self.expression(arg, None)?);
        }
        let mut args = args.into_iter();
        match (op, args.next(), args.next()) {
            (Some(op), Some(exp), None) => Ok(Expression::unary(op, exp)),
            (Some(op), Some(lhs), Some(rhs)) => Ok(Expression::binary(op, lhs, rhs)),
            _ => Ok(Expression::Distribution(Distribution::Uniform {
                lower: 0.,
                upper: 1.,
            })),
        }
    }

    fn array(&mut self, array: &ArrayLiteral, shape: &ArrayShape) -> Result<Expression, TranslationCause> {
        if array.as_ref().is_empty() {
            Ok(shape.zero_filled())
        } else {
            self.array_values(array.as_ref(), shape)
                .map(Expression::array_value)
        }
    }

    fn array_values(
        &mut self,
        elements: &[Option<JsExpression>],
        shape: &ArrayShape,
    ) -> Result<Vec<Value>, TranslationCause> {
        let max = shape.max_sizes[0];
        if elements.len() > max {
            return Err(TranslationCause::ArrayTooLong {
                len: elements.len(),
                max,
            });
        }
        let inner = shape.inner();
        let mut values = Vec::with_capacity(max);
        for element in elements {
            let element = element
                .as_ref()
                .map(strip_parens)
                .ok_or(TranslationCause::ArrayElement(shape.base))?;
            let value = match (&inner, element) {
                (Some(inner), JsExpression::ArrayLiteral(nested)) => {
                    self.array_values(nested.as_ref(), inner).map(Value::Array)?
                }
                (Some(_), _) => return Err(TranslationCause::ArrayElement(shape.base)),
                (None, element) => self.array_element(element, shape.base)?,
            };
            values.push(value);
        }
        values.resize(max, shape.zero_element());
        Ok(values)
    }

    fn array_element(&mut self, element: &JsExpression, base: BaseType) -> Result<Value, TranslationCause> {
        let value = match strip_parens(element) {
            JsExpression::Literal(literal) => self.literal(literal)?,
            JsExpression::Unary(unary) if matches!(unary.op(), UnaryOp::Minus) => {
                match self.array_element(unary.target(), base)? {
                    Value::Int(int) => Value::Int(-int),
                    Value::Real(real) => Value::Real(-real),
                    _ => return Err(TranslationCause::ArrayElement(base)),
                }
            }
            _ => return Err(TranslationCause::ArrayElement(base)),
        };
        match (base, value) {
            (BaseType::Real, Value::Int(int)) => Ok(Value::Real(int as f64)),
            (BaseType::Real, value @ Value::Real(_))
            | (BaseType::Int, value @ Value::Int(_))
            | (BaseType::Bool, value @ Value::Bool(_)) => Ok(value),
            _ => Err(TranslationCause::ArrayElement(base)),
        }
    }
}
