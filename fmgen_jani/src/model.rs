use crate::Composition;
use fmgen_core::{
    Assignment, Automaton, AutomatonError, Constant, Destination, Edge, Expression, Variable,
};
use log::trace;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors in building a [`Model`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// An automaton with the same name is already in the model.
    #[error("automaton '{0}' is already defined")]
    DuplicateAutomaton(String),
    /// A global variable with the same name is already in the model.
    #[error("global variable '{0}' is already defined")]
    DuplicateVariable(String),
    /// A constant with the same name is already in the model.
    #[error("constant '{0}' is already defined")]
    DuplicateConstant(String),
    /// There is no automaton with the given name.
    #[error("automaton '{0}' does not exist")]
    UnknownAutomaton(String),
    /// The element is already part of the composition.
    #[error("automaton '{0}' is already an element of the composition")]
    DuplicateElement(String),
    /// The element is not part of the composition.
    #[error("automaton '{0}' is not an element of the composition")]
    UnknownElement(String),
    /// A sync with the same result is already in the composition.
    #[error("sync '{0}' is already defined")]
    DuplicateSync(String),
    /// An automaton is listed twice in the same sync.
    #[error("automaton '{automaton}' participates twice in sync '{sync}'")]
    RepeatedParticipant {
        /// The sync's result.
        sync: String,
        /// The repeated automaton.
        automaton: String,
    },
    /// A sync vector does not have one entry per composed element.
    #[error("sync vectors and composition elements have different lengths")]
    SyncLength,
    /// The composition and the automata of the model do not match.
    #[error("composition elements do not match the automata of the model")]
    ElementsMismatch,
    /// An automaton is synchronized on an action it has no edge for.
    #[error("automaton '{automaton}' has no edge with action '{action}'")]
    MissingAction {
        /// The automaton.
        automaton: String,
        /// The action.
        action: String,
    },
    /// The model has no composition.
    #[error("the model has no composition")]
    MissingComposition,
    /// Error in an automaton of the model.
    #[error(transparent)]
    Automaton(#[from] AutomatonError),
}

/// Optional language features of JANI used by a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Feature {
    /// Array types and array operators.
    Arrays,
    /// `sin`, `cos` and related operators.
    TrigonometricFunctions,
}

/// A JANI model: global variables and constants,
/// a set of automata and their parallel composition.
///
/// ```
/// # use fmgen_core::{Automaton, Destination, Edge};
/// # use fmgen_jani::{Composition, Model};
/// let mut model = Model::new("example");
/// let mut automaton = Automaton::new("clock");
/// automaton.add_location("loc");
/// automaton.make_initial("loc").unwrap();
/// automaton
///     .add_edge(Edge::new("loc", Destination::new("loc")).with_action("tick"))
///     .unwrap();
/// model.add_automaton(automaton).unwrap();
///
/// let mut composition = Composition::default();
/// composition.add_element("clock").unwrap();
/// model.set_composition(composition).unwrap();
/// // Actions not in any sync are synchronized on their own
/// assert!(model.composition().unwrap().has_sync("tick"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "ModelRepr", try_from = "ModelRepr")]
pub struct Model {
    name: String,
    features: BTreeSet<Feature>,
    metadata: Map<String, Json>,
    variables: Vec<Variable>,
    constants: Vec<Constant>,
    automata: Vec<Automaton>,
    composition: Option<Composition>,
    properties: Vec<Json>,
}

impl Model {
    /// Creates an empty model.
    pub fn new(name: impl Into<String>) -> Self {
        let mut metadata = Map::new();
        metadata.insert(
            "description".to_owned(),
            Json::String(format!("Generated by fmgen {}", env!("CARGO_PKG_VERSION"))),
        );
        Self {
            name: name.into(),
            features: BTreeSet::new(),
            metadata,
            variables: Vec::new(),
            constants: Vec::new(),
            automata: Vec::new(),
            composition: None,
            properties: Vec::new(),
        }
    }

    /// The name of the model.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declares the use of an optional feature.
    pub fn add_feature(&mut self, feature: Feature) {
        self.features.insert(feature);
    }

    /// The declared features.
    pub fn features(&self) -> impl Iterator<Item = Feature> + '_ {
        self.features.iter().copied()
    }

    /// Adds a global variable.
    pub fn add_variable(&mut self, variable: Variable) -> Result<(), ModelError> {
        if self.variable(&variable.name).is_some() {
            return Err(ModelError::DuplicateVariable(variable.name));
        }
        self.variables.push(variable);
        Ok(())
    }

    /// The global variable with the given name, if any.
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|var| var.name == name)
    }

    /// The global variables, in insertion order.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Adds a constant.
    pub fn add_constant(&mut self, constant: Constant) -> Result<(), ModelError> {
        if self.constant(&constant.name).is_some() {
            return Err(ModelError::DuplicateConstant(constant.name));
        }
        self.constants.push(constant);
        Ok(())
    }

    /// The constant with the given name, if any.
    pub fn constant(&self, name: &str) -> Option<&Constant> {
        self.constants.iter().find(|c| c.name == name)
    }

    /// The constants, in insertion order.
    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }

    /// Adds an automaton, which has to be complete (see [`Automaton::check`]).
    pub fn add_automaton(&mut self, automaton: Automaton) -> Result<(), ModelError> {
        if self.automaton(automaton.name()).is_some() {
            return Err(ModelError::DuplicateAutomaton(automaton.name().to_owned()));
        }
        automaton.check()?;
        self.automata.push(automaton);
        Ok(())
    }

    /// The automaton with the given name, if any.
    pub fn automaton(&self, name: &str) -> Option<&Automaton> {
        self.automata.iter().find(|a| a.name() == name)
    }

    /// Mutable access to the automaton with the given name, if any.
    pub fn automaton_mut(&mut self, name: &str) -> Option<&mut Automaton> {
        self.automata.iter_mut().find(|a| a.name() == name)
    }

    /// The automata, in insertion order.
    pub fn automata(&self) -> &[Automaton] {
        &self.automata
    }

    /// Mutable access to the automata.
    pub fn automata_mut(&mut self) -> &mut [Automaton] {
        &mut self.automata
    }

    /// Removes the edges labelled by `action` from every automaton,
    /// returning how many were removed.
    pub fn remove_edges_with_action(&mut self, action: &str) -> usize {
        self.automata
            .iter_mut()
            .map(|automaton| automaton.remove_edges_with_action(action))
            .sum()
    }

    /// The composition, once set.
    pub fn composition(&self) -> Option<&Composition> {
        self.composition.as_ref()
    }

    /// Sets the composition of the model's automata,
    /// then synchronizes on their own all actions that are not part of any sync
    /// (see [`Model::generate_missing_syncs`]).
    ///
    /// The composition must have exactly the model's automata as elements,
    /// and each action in a sync must label some edge of its automaton.
    pub fn set_composition(&mut self, composition: Composition) -> Result<(), ModelError> {
        self.validate_composition(&composition)?;
        self.composition = Some(composition);
        self.generate_missing_syncs()
    }

    fn validate_composition(&self, composition: &Composition) -> Result<(), ModelError> {
        if !composition.is_valid() {
            return Err(ModelError::SyncLength);
        }
        if composition.elements().len() != self.automata.len() {
            return Err(ModelError::ElementsMismatch);
        }
        let automata = composition
            .elements()
            .iter()
            .map(|name| {
                self.automaton(name)
                    .ok_or_else(|| ModelError::UnknownAutomaton(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        composition.syncs().iter().try_for_each(|sync| {
            sync.participants().try_for_each(|(idx, action)| {
                let automaton = automata[idx];
                if automaton.has_action(action) {
                    Ok(())
                } else {
                    Err(ModelError::MissingAction {
                        automaton: automaton.name().to_owned(),
                        action: action.to_owned(),
                    })
                }
            })
        })
    }

    /// Adds a sync, with the action itself as result,
    /// for each action of each automaton that does not take part in any sync.
    pub fn generate_missing_syncs(&mut self) -> Result<(), ModelError> {
        let composition = self
            .composition
            .as_mut()
            .ok_or(ModelError::MissingComposition)?;
        for automaton in &self.automata {
            for action in automaton.actions() {
                if !composition.is_synchronized(automaton.name(), action) {
                    trace!("adding sync for action '{action}'");
                    composition.add_sync(action, [(automaton.name(), action)])?;
                }
            }
        }
        Ok(())
    }

    /// Adds a property, which is carried through as-is.
    pub fn add_property(&mut self, property: Json) {
        self.properties.push(property);
    }

    /// The properties of the model.
    pub fn properties(&self) -> &[Json] {
        &self.properties
    }

    /// Rewrites helper operators in every expression of the model
    /// (see [`Expression::lower_helpers`]).
    pub fn lower_helpers(&mut self) {
        fn lower(exp: &mut Expression) {
            *exp = exp.lower_helpers();
        }
        fn lower_variable(var: &mut Variable) {
            var.initial_value.iter_mut().for_each(lower);
        }
        fn lower_assignment(assignment: &mut Assignment) {
            lower(&mut assignment.target);
            lower(&mut assignment.value);
        }
        fn lower_destination(dest: &mut Destination) {
            dest.probability.iter_mut().for_each(lower);
            dest.assignments.iter_mut().for_each(lower_assignment);
        }
        fn lower_edge(edge: &mut Edge) {
            edge.guard.iter_mut().for_each(lower);
            edge.destinations.iter_mut().for_each(lower_destination);
        }

        self.variables.iter_mut().for_each(lower_variable);
        self.constants
            .iter_mut()
            .for_each(|c| c.value.iter_mut().for_each(lower));
        for automaton in &mut self.automata {
            automaton.variables_mut().for_each(lower_variable);
            automaton.edges_mut().iter_mut().for_each(lower_edge);
        }
    }

    /// The model in JANI form.
    pub fn to_json(&self) -> Result<Json, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Reads a model from its JANI form.
    pub fn from_json(json: Json) -> Result<Self, serde_json::Error> {
        serde_json::from_value(json)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ModelType {
    Mdp,
}

#[derive(Serialize, Deserialize)]
struct ActionRepr {
    name: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ModelRepr {
    jani_version: u32,
    name: String,
    #[serde(rename = "type")]
    model_type: ModelType,
    #[serde(default)]
    metadata: Map<String, Json>,
    #[serde(default)]
    features: Vec<Feature>,
    #[serde(default)]
    variables: Vec<Variable>,
    #[serde(default)]
    constants: Vec<Constant>,
    #[serde(default)]
    actions: Vec<ActionRepr>,
    automata: Vec<Automaton>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    system: Option<Composition>,
    #[serde(default)]
    properties: Vec<Json>,
}

impl From<Model> for ModelRepr {
    fn from(model: Model) -> Self {
        let actions = model
            .automata
            .iter()
            .flat_map(Automaton::actions)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|name| ActionRepr {
                name: name.to_owned(),
            })
            .collect();
        Self {
            jani_version: 1,
            name: model.name,
            model_type: ModelType::Mdp,
            metadata: model.metadata,
            features: model.features.into_iter().collect(),
            variables: model.variables,
            constants: model.constants,
            actions,
            automata: model.automata,
            system: model.composition,
            properties: model.properties,
        }
    }
}

impl TryFrom<ModelRepr> for Model {
    type Error = ModelError;

    fn try_from(repr: ModelRepr) -> Result<Self, Self::Error> {
        let mut model = Model::new(repr.name);
        model.metadata = repr.metadata;
        model.features = repr.features.into_iter().collect();
        repr.variables
            .into_iter()
            .try_for_each(|var| model.add_variable(var))?;
        repr.constants
            .into_iter()
            .try_for_each(|c| model.add_constant(c))?;
        repr.automata
            .into_iter()
            .try_for_each(|automaton| model.add_automaton(automaton))?;
        if let Some(composition) = repr.system {
            model.validate_composition(&composition)?;
            model.composition = Some(composition);
        }
        model.properties = repr.properties;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fmgen_core::Type;

    fn automaton(name: &str, actions: &[&str]) -> Automaton {
        let mut automaton = Automaton::new(name);
        automaton.add_location("loc");
        automaton.make_initial("loc").unwrap();
        for action in actions {
            automaton
                .add_edge(Edge::new("loc", Destination::new("loc")).with_action(*action))
                .unwrap();
        }
        automaton
    }

    #[test]
    fn duplicates() {
        let mut model = Model::new("test");
        model.add_automaton(automaton("a", &[])).unwrap();
        assert_eq!(
            model.add_automaton(automaton("a", &[])),
            Err(ModelError::DuplicateAutomaton("a".to_owned()))
        );
        model
            .add_variable(Variable::with_default("x", Type::Int))
            .unwrap();
        assert!(model
            .add_variable(Variable::with_default("x", Type::Bool))
            .is_err());
        model
            .add_constant(Constant::new("c", Type::Int, None))
            .unwrap();
        assert!(model.add_constant(Constant::new("c", Type::Int, None)).is_err());
        assert!(matches!(
            model.add_automaton(Automaton::new("no_initial")),
            Err(ModelError::Automaton(AutomatonError::NoInitialLocation(_)))
        ));
    }

    #[test]
    fn composition_checks() {
        let mut model = Model::new("test");
        model.add_automaton(automaton("a", &["go"])).unwrap();
        model.add_automaton(automaton("b", &["go", "stop"])).unwrap();

        let mut composition = Composition::default();
        composition.add_element("a").unwrap();
        assert_eq!(
            model.set_composition(composition.clone()),
            Err(ModelError::ElementsMismatch)
        );

        composition.add_element("b").unwrap();
        let mut wrong = composition.clone();
        wrong.add_sync("x", [("a", "stop")]).unwrap();
        assert!(matches!(
            model.set_composition(wrong),
            Err(ModelError::MissingAction { .. })
        ));

        composition
            .add_sync("go", [("a", "go"), ("b", "go")])
            .unwrap();
        model.set_composition(composition).unwrap();
        let composition = model.composition().unwrap();
        assert_eq!(composition.syncs().len(), 2);
        assert!(composition.is_synchronized("b", "stop"));
    }
}
