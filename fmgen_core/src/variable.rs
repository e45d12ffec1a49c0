use crate::{Expression, Type};
use log::warn;
use serde::{Deserialize, Serialize};

/// A typed variable, either global or local to an automaton.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Variable {
    /// Name of the variable.
    pub name: String,
    /// Type of the variable.
    #[serde(rename = "type")]
    pub r#type: Type,
    /// Transient variables are not part of the state of the model.
    #[serde(default)]
    pub transient: bool,
    /// The initial value of the variable, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_value: Option<Expression>,
}

impl Variable {
    /// Creates a new variable.
    ///
    /// Some model checkers do not handle non-transient real variables well,
    /// so a warning is logged when one is created.
    pub fn new(
        name: impl Into<String>,
        r#type: Type,
        initial_value: Option<Expression>,
        transient: bool,
    ) -> Self {
        let name = name.into();
        if r#type == Type::Real && !transient {
            warn!("variable '{name}' is a non-transient real: some model checkers may not support it");
        }
        Self {
            name,
            r#type,
            transient,
            initial_value,
        }
    }

    /// Creates a non-transient variable initialized to the default value of its type.
    pub fn with_default(name: impl Into<String>, r#type: Type) -> Self {
        let init = r#type.default_value().map(Expression::Literal);
        Self::new(name, r#type, init, false)
    }
}

/// A model constant.
///
/// Constants without value are free parameters of the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constant {
    /// Name of the constant.
    pub name: String,
    /// Type of the constant.
    #[serde(rename = "type")]
    pub r#type: Type,
    /// Value of the constant, unless it is a free parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Expression>,
}

impl Constant {
    /// Creates a new constant.
    pub fn new(name: impl Into<String>, r#type: Type, value: Option<Expression>) -> Self {
        Self {
            name: name.into(),
            r#type,
            value,
        }
    }
}
