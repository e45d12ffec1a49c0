use crate::{interface::Interface, types::DataType};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// A system of communicating state machines, as read from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModelDescription {
    /// Name of the model.
    pub name: String,
    /// Global constants, visible by every automaton.
    #[serde(default)]
    pub constants: Vec<ConstantDecl>,
    /// The state machines of the system.
    pub automata: Vec<StateMachine>,
    /// Properties, passed through to the model untouched.
    #[serde(default)]
    pub properties: Vec<Json>,
}

/// A constant declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConstantDecl {
    /// Name of the constant.
    pub name: String,
    /// Declared type of the constant.
    #[serde(rename = "type")]
    pub r#type: DataType,
    /// ECMAScript expression for the value, or nothing for free constants.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// A single state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StateMachine {
    /// Name of the automaton it compiles to.
    pub name: String,
    /// The locations (states) of the machine.
    pub locations: Vec<String>,
    /// The initial locations.
    pub initial: Vec<String>,
    /// Interface handlers relay events,
    /// and their idle self-loops carry no information.
    #[serde(default)]
    pub interface_handler: bool,
    /// Local variables.
    #[serde(default)]
    pub variables: Vec<VariableDecl>,
    /// The communication interfaces the machine declares.
    #[serde(default)]
    pub interfaces: Vec<Interface>,
    /// The transitions.
    #[serde(default)]
    pub edges: Vec<EdgeDecl>,
}

/// A local variable declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VariableDecl {
    /// Name of the variable.
    pub name: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub r#type: DataType,
    /// Initializer, as an ECMAScript expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<String>,
    /// Whether the variable is transient.
    #[serde(default)]
    pub transient: bool,
}

/// A transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EdgeDecl {
    /// Source location.
    pub location: String,
    /// Guard, as an ECMAScript expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<String>,
    /// Action label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Probabilistic outcomes.
    pub destinations: Vec<DestinationDecl>,
}

/// An outcome of a transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DestinationDecl {
    /// Target location.
    pub location: String,
    /// Probability, as an ECMAScript expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<String>,
    /// Ordered assignments.
    #[serde(default)]
    pub assignments: Vec<AssignmentDecl>,
}

/// An assignment `target := value`, both ECMAScript expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentDecl {
    /// The assigned variable or array element.
    pub target: String,
    /// The assigned value.
    pub value: String,
}
