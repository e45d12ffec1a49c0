use fmgen_core::{Expression, Type, Value, Variable};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Errors in parsing a [`DataType`] tag.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataTypeError {
    /// The base type is not supported.
    #[error("unknown data type '{0}'")]
    UnknownType(String),
    /// The array dimensions are malformed.
    #[error("malformed array dimensions in '{0}'")]
    MalformedArray(String),
}

/// Scalar types of the description language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    /// Booleans.
    Bool,
    /// Integers of any width and signedness.
    Int,
    /// Floating point numbers of any precision.
    Real,
}

impl BaseType {
    /// The corresponding JANI type.
    pub fn to_type(self) -> Type {
        match self {
            BaseType::Bool => Type::Bool,
            BaseType::Int => Type::Int,
            BaseType::Real => Type::Real,
        }
    }

    /// The zero value of the type.
    pub fn zero(self) -> Value {
        match self {
            BaseType::Bool => Value::Bool(false),
            BaseType::Int => Value::Int(0),
            BaseType::Real => Value::Real(0.),
        }
    }
}

impl FromStr for BaseType {
    type Err = DataTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bool" | "boolean" => Ok(BaseType::Bool),
            "int" | "int8" | "int16" | "int32" | "int64" | "uint8" | "uint16" | "uint32"
            | "uint64" => Ok(BaseType::Int),
            "real" | "float32" | "float64" | "double" => Ok(BaseType::Real),
            _ => Err(DataTypeError::UnknownType(s.to_owned())),
        }
    }
}

/// A data type tag, as in `int32`, `float64[10]` or `bool[][3]`.
///
/// Each array dimension can have a declared max size.
///
/// ```
/// # use fmgen_scxml::{BaseType, DataType};
/// let data_type: DataType = "uint8[4][]".parse().unwrap();
/// assert_eq!(data_type.base, BaseType::Int);
/// assert_eq!(data_type.dims, [Some(4), None]);
/// assert_eq!(data_type.to_string(), "int[4][]");
/// assert!("string".parse::<DataType>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DataType {
    /// The scalar type of the (elements of) the data.
    pub base: BaseType,
    /// Array dimensions, outermost first, with their max size if declared.
    pub dims: Vec<Option<usize>>,
}

impl DataType {
    /// A scalar type.
    pub fn scalar(base: BaseType) -> Self {
        Self {
            base,
            dims: Vec::new(),
        }
    }

    /// Whether the type is an array type.
    pub fn is_array(&self) -> bool {
        !self.dims.is_empty()
    }

    /// The corresponding JANI type.
    pub fn to_type(&self) -> Type {
        self.dims
            .iter()
            .fold(self.base.to_type(), |base, _| Type::Array(Box::new(base)))
    }

    /// The shape of an array type, using `max_array_size` for undeclared sizes.
    pub fn shape(&self, max_array_size: usize) -> Option<ArrayShape> {
        self.is_array().then(|| ArrayShape {
            base: self.base,
            max_sizes: self
                .dims
                .iter()
                .map(|dim| dim.unwrap_or(max_array_size))
                .collect(),
        })
    }

    /// The default value: zero for scalars, zero-filled arrays of max size for arrays.
    pub fn default_value(&self, max_array_size: usize) -> Expression {
        match self.shape(max_array_size) {
            Some(shape) => shape.zero_filled(),
            None => Expression::Literal(self.base.zero()),
        }
    }
}

impl FromStr for DataType {
    type Err = DataTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (base, mut rest) = s.split_at(s.find('[').unwrap_or(s.len()));
        let base = base.parse()?;
        let mut dims = Vec::new();
        while !rest.is_empty() {
            let (dim, tail) = rest
                .strip_prefix('[')
                .and_then(|rest| rest.split_once(']'))
                .ok_or_else(|| DataTypeError::MalformedArray(s.to_owned()))?;
            let dim = match dim.trim() {
                "" => None,
                size => Some(
                    size.parse()
                        .map_err(|_| DataTypeError::MalformedArray(s.to_owned()))?,
                ),
            };
            dims.push(dim);
            rest = tail;
        }
        Ok(Self { base, dims })
    }
}

impl TryFrom<String> for DataType {
    type Error = DataTypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DataType> for String {
    fn from(value: DataType) -> Self {
        value.to_string()
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = match self.base {
            BaseType::Bool => "bool",
            BaseType::Int => "int",
            BaseType::Real => "real",
        };
        f.write_str(base)?;
        for dim in &self.dims {
            match dim {
                Some(size) => write!(f, "[{size}]")?,
                None => f.write_str("[]")?,
            }
        }
        Ok(())
    }
}

/// Name of the variable holding the lengths of the given dimension of `array`,
/// counting dimensions from 1.
///
/// The length of the outermost dimension is `<array>.length`, an integer.
/// Dimension `d > 1` has one length per element of the outer dimensions,
/// so `<array>.d<d>.length` is an integer array with `d - 1` dimensions.
///
/// ```
/// # use fmgen_scxml::length_variable;
/// assert_eq!(length_variable("points", 1), "points.length");
/// assert_eq!(length_variable("points", 2), "points.d2.length");
/// ```
pub fn length_variable(array: &str, dimension: usize) -> String {
    if dimension <= 1 {
        format!("{array}.length")
    } else {
        format!("{array}.d{dimension}.length")
    }
}

// A length value as an expression: arrays of lengths become array values.
pub(crate) fn length_expression(value: Value) -> Expression {
    match value {
        Value::Array(values) => Expression::array_value(values),
        value => Expression::Literal(value),
    }
}

/// Element type and max size per dimension of an array,
/// needed to translate array literals into fixed-size JANI arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayShape {
    /// Element type.
    pub base: BaseType,
    /// Max size of each dimension, outermost first. Never empty.
    pub max_sizes: Vec<usize>,
}

impl ArrayShape {
    /// A one-dimensional array shape.
    pub fn new(base: BaseType, max_size: usize) -> Self {
        Self {
            base,
            max_sizes: vec![max_size],
        }
    }

    /// The shape of the elements, if they are arrays themselves.
    pub fn inner(&self) -> Option<ArrayShape> {
        (self.max_sizes.len() > 1).then(|| ArrayShape {
            base: self.base,
            max_sizes: self.max_sizes[1..].to_vec(),
        })
    }

    /// An array constructor of max size filled with zeros.
    pub fn zero_filled(&self) -> Expression {
        self.zero_filled_from(0)
    }

    fn zero_filled_from(&self, dim: usize) -> Expression {
        let fill = if dim + 1 < self.max_sizes.len() {
            self.zero_filled_from(dim + 1)
        } else {
            Expression::Literal(self.base.zero())
        };
        let length = i64::try_from(self.max_sizes[dim]).unwrap_or(i64::MAX);
        Expression::array_create(
            format!("__array_iterator_dim_{dim}"),
            Expression::from(length),
            fill,
        )
    }

    /// The lengths of an empty array, one value per dimension:
    /// the outermost is `0`, the others zero-filled integer arrays.
    pub fn zero_lengths(&self) -> Vec<Value> {
        let mut lengths = vec![Value::Int(0)];
        if let Some(inner) = self.inner() {
            lengths.extend(
                inner
                    .zero_lengths()
                    .into_iter()
                    .map(|length| Value::Array(vec![length; self.max_sizes[0]])),
            );
        }
        lengths
    }

    /// The variables holding the lengths of each dimension of the array `name`
    /// (see [`length_variable`]), initialized to `lengths` if given, or to zero.
    pub fn length_variables(
        &self,
        name: &str,
        lengths: Option<&[Value]>,
        transient: bool,
    ) -> Vec<Variable> {
        let zeros = self.zero_lengths();
        (1..=self.max_sizes.len())
            .map(|dim| {
                let r#type = (1..dim).fold(Type::Int, |base, _| Type::Array(Box::new(base)));
                let init = lengths
                    .and_then(|lengths| lengths.get(dim - 1))
                    .unwrap_or(&zeros[dim - 1]);
                let init = length_expression(init.clone());
                Variable::new(length_variable(name, dim), r#type, Some(init), transient)
            })
            .collect()
    }

    /// A zero value for the elements: a zero scalar,
    /// or an array of zeros for multi-dimensional arrays.
    pub fn zero_element(&self) -> Value {
        fn zeros(base: BaseType, sizes: &[usize]) -> Value {
            match sizes {
                [] => base.zero(),
                [size, rest @ ..] => Value::Array(vec![zeros(base, rest); *size]),
            }
        }
        zeros(self.base, &self.max_sizes[1..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tags() {
        assert_eq!("int32".parse(), Ok(DataType::scalar(BaseType::Int)));
        assert_eq!("double".parse(), Ok(DataType::scalar(BaseType::Real)));
        assert_eq!(
            "float32[3]".parse::<DataType>().unwrap().to_type(),
            Type::Array(Box::new(Type::Real))
        );
        assert!("int[".parse::<DataType>().is_err());
        assert!("int[x]".parse::<DataType>().is_err());
        assert!("int[2]x".parse::<DataType>().is_err());
    }

    #[test]
    fn zero_filled_shapes() {
        let shape = ArrayShape {
            base: BaseType::Int,
            max_sizes: vec![2, 3],
        };
        let zero = shape.zero_filled().eval(&|_| None).unwrap();
        let row = Value::Array(vec![Value::Int(0); 3]);
        assert_eq!(zero, Value::Array(vec![row.clone(), row.clone()]));
        assert_eq!(shape.zero_element(), row);
        assert_eq!(shape.inner(), Some(ArrayShape::new(BaseType::Int, 3)));
    }

    #[test]
    fn length_variables() {
        let shape = ArrayShape {
            base: BaseType::Real,
            max_sizes: vec![2, 3, 4],
        };
        let variables = shape.length_variables("grid", None, false);
        let names: Vec<_> = variables.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["grid.length", "grid.d2.length", "grid.d3.length"]);
        assert_eq!(variables[0].r#type, Type::Int);
        assert_eq!(
            variables[2].r#type,
            Type::Array(Box::new(Type::Array(Box::new(Type::Int))))
        );
        let zero = variables[2]
            .initial_value
            .as_ref()
            .unwrap()
            .eval(&|_| None)
            .unwrap();
        let row = Value::Array(vec![Value::Int(0); 3]);
        assert_eq!(zero, Value::Array(vec![row.clone(), row]));

        let lengths = [Value::Int(1), Value::Array(vec![Value::Int(2), Value::Int(0)])];
        let variables = ArrayShape {
            base: BaseType::Int,
            max_sizes: vec![2, 2],
        }
        .length_variables("m", Some(&lengths), false);
        assert_eq!(variables[0].initial_value, Some(Expression::from(1i64)));
        assert_eq!(
            variables[1].initial_value,
            Some(Expression::array_value(vec![Value::Int(2), Value::Int(0)]))
        );
    }
}
