use crate::Value;
use serde::{Deserialize, Serialize};

/// The type of a variable or constant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "TypeRepr", into = "TypeRepr")]
pub enum Type {
    /// Boolean type.
    Bool,
    /// Integer type.
    Int,
    /// Real type.
    Real,
    /// Array type with the given element type.
    Array(Box<Type>),
}

impl Type {
    /// The default value of a scalar type (`false`, `0` or `0.0`).
    ///
    /// Arrays have no default value, as their size is not part of the type.
    pub fn default_value(&self) -> Option<Value> {
        match self {
            Type::Bool => Some(Value::Bool(false)),
            Type::Int => Some(Value::Int(0)),
            Type::Real => Some(Value::Real(0.)),
            Type::Array(_) => None,
        }
    }

    /// Whether a value can be assigned to a variable of this type.
    ///
    /// Integer values can be assigned to real variables.
    ///
    /// ```
    /// # use fmgen_core::{Type, Value};
    /// assert!(Type::Real.accepts(&Value::Int(1)));
    /// assert!(!Type::Int.accepts(&Value::Real(1.5)));
    /// let array = Type::Array(Box::new(Type::Bool));
    /// assert!(array.accepts(&Value::Array(vec![Value::Bool(true), Value::Bool(false)])));
    /// ```
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Type::Bool, Value::Bool(_))
            | (Type::Int, Value::Int(_))
            | (Type::Real, Value::Int(_) | Value::Real(_) | Value::Constant(_)) => true,
            (Type::Array(base), Value::Array(values)) => values.iter().all(|v| base.accepts(v)),
            _ => false,
        }
    }

    /// The scalar type at the bottom of (possibly nested) array types.
    pub fn base(&self) -> &Type {
        match self {
            Type::Array(base) => base.base(),
            _ => self,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum TypeRepr {
    Basic(BasicType),
    Array { kind: ArrayKind, base: Box<TypeRepr> },
}

#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum BasicType {
    Bool,
    Int,
    Real,
}

#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ArrayKind {
    Array,
}

impl From<TypeRepr> for Type {
    fn from(repr: TypeRepr) -> Self {
        match repr {
            TypeRepr::Basic(BasicType::Bool) => Type::Bool,
            TypeRepr::Basic(BasicType::Int) => Type::Int,
            TypeRepr::Basic(BasicType::Real) => Type::Real,
            TypeRepr::Array { base, .. } => Type::Array(Box::new(Type::from(*base))),
        }
    }
}

impl From<Type> for TypeRepr {
    fn from(r#type: Type) -> Self {
        match r#type {
            Type::Bool => TypeRepr::Basic(BasicType::Bool),
            Type::Int => TypeRepr::Basic(BasicType::Int),
            Type::Real => TypeRepr::Basic(BasicType::Real),
            Type::Array(base) => TypeRepr::Array {
                kind: ArrayKind::Array,
                base: Box::new(TypeRepr::from(*base)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_form() {
        assert_eq!(serde_json::to_value(Type::Real).unwrap(), json!("real"));
        let array = Type::Array(Box::new(Type::Int));
        assert_eq!(
            serde_json::to_value(&array).unwrap(),
            json!({"kind": "array", "base": "int"})
        );
        let parsed: Type = serde_json::from_value(json!({"kind": "array", "base": "int"})).unwrap();
        assert_eq!(parsed, array);
        assert!(serde_json::from_value::<Type>(json!("float")).is_err());
    }
}
