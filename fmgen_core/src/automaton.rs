use crate::{Expression, Value, Variable};
use log::trace;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Errors in building or combining [`Automaton`]s.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AutomatonError {
    /// A location is referenced but does not belong to the automaton.
    #[error("location '{location}' does not belong to automaton '{automaton}'")]
    MissingLocation {
        /// The automaton.
        automaton: String,
        /// The missing location.
        location: String,
    },
    /// A variable with the same name is already defined in the automaton.
    #[error("variable '{variable}' is already defined in automaton '{automaton}'")]
    DuplicateVariable {
        /// The automaton.
        automaton: String,
        /// The duplicated variable.
        variable: String,
    },
    /// Only automata with the same name can be merged.
    #[error("cannot merge automaton '{found}' into automaton '{expected}'")]
    NameMismatch {
        /// Name of the receiving automaton.
        expected: String,
        /// Name of the merged automaton.
        found: String,
    },
    /// The automaton has no initial location.
    #[error("automaton '{0}' has no initial location")]
    NoInitialLocation(String),
}

/// An assignment of a value to a variable (or to an element of an array variable).
///
/// Assignments on the same destination are executed in order of `index`;
/// assignments sharing the same index are executed simultaneously.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// The assigned variable, or an array access expression.
    #[serde(rename = "ref")]
    pub target: Expression,
    /// The assigned value.
    pub value: Expression,
    /// Evaluation order.
    #[serde(default)]
    pub index: u32,
}

impl Assignment {
    /// Creates a new assignment.
    pub fn new(target: impl Into<Expression>, value: Expression, index: u32) -> Self {
        Self {
            target: target.into(),
            value,
            index,
        }
    }
}

/// A possible outcome of an [`Edge`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    /// Target location.
    pub location: String,
    /// Probability of the destination; certain if omitted.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "wrapped")]
    pub probability: Option<Expression>,
    /// Ordered assignments.
    #[serde(default)]
    pub assignments: Vec<Assignment>,
}

impl Destination {
    /// Creates a destination with no assignments.
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            probability: None,
            assignments: Vec::new(),
        }
    }

    /// Sets the probability of the destination.
    pub fn with_probability(mut self, probability: Expression) -> Self {
        self.probability = Some(probability);
        self
    }

    /// Appends an assignment.
    pub fn with_assignment(mut self, assignment: Assignment) -> Self {
        self.assignments.push(assignment);
        self
    }
}

/// A guarded transition from a location to one or more probabilistic [`Destination`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Source location.
    pub location: String,
    /// Action label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Guard; always enabled if omitted.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "wrapped")]
    pub guard: Option<Expression>,
    /// Destinations.
    pub destinations: SmallVec<[Destination; 1]>,
}

impl Edge {
    /// Creates an unguarded edge with a single destination and no action.
    /// The action can be set later, or generated when the edge is added to an [`Automaton`].
    pub fn new(location: impl Into<String>, destination: Destination) -> Self {
        let mut destinations = SmallVec::new();
        destinations.push(destination);
        Self {
            location: location.into(),
            action: None,
            guard: None,
            destinations,
        }
    }

    /// Sets the action of the edge.
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Sets the guard of the edge.
    pub fn with_guard(mut self, guard: Expression) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Appends a destination.
    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destinations.push(destination);
        self
    }

    // A self-loop with a single destination, no effects and no effective guard.
    fn is_empty_self_loop(&self) -> bool {
        matches!(self.destinations.as_slice(), [dest] if dest.location == self.location && dest.assignments.is_empty())
            && self
                .guard
                .as_ref()
                .is_none_or(|guard| *guard == Expression::Literal(Value::Bool(true)))
    }
}

// (De)serializes an optional expression as `{"exp": ...}`.
mod wrapped {
    use crate::Expression;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Wrapper<E> {
        exp: E,
    }

    pub(super) fn serialize<S: Serializer>(
        exp: &Option<Expression>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        exp.as_ref().map(|exp| Wrapper { exp }).serialize(serializer)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Expression>, D::Error> {
        Option::<Wrapper<Expression>>::deserialize(deserializer)
            .map(|wrapper| wrapper.map(|w| w.exp))
    }
}

/// An automaton: locations, local variables and edges.
///
/// Every location referenced by an edge or marked initial belongs to the automaton:
/// this is checked eagerly as edges are added.
///
/// ```
/// # use fmgen_core::{Automaton, Destination, Edge};
/// let mut automaton = Automaton::new("counter");
/// automaton.add_location("idle");
/// automaton.make_initial("idle").expect("location exists");
///
/// // Edges without action get one generated
/// let action = automaton
///     .add_edge(Edge::new("idle", Destination::new("idle")))
///     .expect("locations exist");
/// assert_eq!(action, "counter_action_0");
///
/// automaton
///     .add_edge(Edge::new("idle", Destination::new("busy")))
///     .expect_err("location 'busy' does not exist");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "AutomatonRepr", try_from = "AutomatonRepr")]
pub struct Automaton {
    name: String,
    locations: BTreeSet<String>,
    initial_locations: BTreeSet<String>,
    variables: BTreeMap<String, Variable>,
    edges: Vec<Edge>,
    // Next id for generated action names.
    action_id: usize,
}

impl Automaton {
    /// Creates an empty automaton.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locations: BTreeSet::new(),
            initial_locations: BTreeSet::new(),
            variables: BTreeMap::new(),
            edges: Vec::new(),
            action_id: 0,
        }
    }

    /// The name of the automaton.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a location, returning `false` if it was already present.
    pub fn add_location(&mut self, location: impl Into<String>) -> bool {
        self.locations.insert(location.into())
    }

    /// Marks an existing location as initial.
    pub fn make_initial(&mut self, location: &str) -> Result<(), AutomatonError> {
        self.has_location(location)?;
        self.initial_locations.insert(location.to_owned());
        Ok(())
    }

    /// Adds a local variable; its name has to be unique within the automaton.
    pub fn add_variable(&mut self, variable: Variable) -> Result<(), AutomatonError> {
        if self.variables.contains_key(&variable.name) {
            return Err(AutomatonError::DuplicateVariable {
                automaton: self.name.clone(),
                variable: variable.name,
            });
        }
        self.variables.insert(variable.name.clone(), variable);
        Ok(())
    }

    fn has_location(&self, location: &str) -> Result<(), AutomatonError> {
        if self.locations.contains(location) {
            Ok(())
        } else {
            Err(AutomatonError::MissingLocation {
                automaton: self.name.clone(),
                location: location.to_owned(),
            })
        }
    }

    /// Adds an edge and returns its action.
    ///
    /// Edges without action are given a fresh one of the form `{name}_action_{n}`,
    /// where `n` counts the actions generated so far for this automaton.
    /// Fails if the source or any destination location does not belong to the automaton.
    pub fn add_edge(&mut self, mut edge: Edge) -> Result<String, AutomatonError> {
        self.has_location(&edge.location)?;
        edge.destinations
            .iter()
            .try_for_each(|dest| self.has_location(&dest.location))?;
        let action = match &edge.action {
            Some(action) => action.clone(),
            None => {
                let action = format!("{}_action_{}", self.name, self.action_id);
                self.action_id += 1;
                edge.action = Some(action.clone());
                action
            }
        };
        self.edges.push(edge);
        Ok(action)
    }

    /// The locations of the automaton, in lexicographic order.
    pub fn locations(&self) -> impl Iterator<Item = &str> {
        self.locations.iter().map(String::as_str)
    }

    /// The initial locations of the automaton, in lexicographic order.
    pub fn initial_locations(&self) -> impl Iterator<Item = &str> {
        self.initial_locations.iter().map(String::as_str)
    }

    /// The local variable with the given name, if any.
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    /// The local variables, by name.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }

    /// Mutable access to the local variables, by name.
    pub fn variables_mut(&mut self) -> impl Iterator<Item = &mut Variable> {
        self.variables.values_mut()
    }

    /// The edges, in insertion order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Mutable access to the edges.
    ///
    /// Edges can be modified in place but not added or removed:
    /// use [`Automaton::add_edge`] to add new ones.
    /// Locations referenced by modified edges have to be added beforehand.
    pub fn edges_mut(&mut self) -> &mut [Edge] {
        &mut self.edges
    }

    /// The set of actions labelling the automaton's edges.
    pub fn actions(&self) -> BTreeSet<&str> {
        self.edges
            .iter()
            .filter_map(|edge| edge.action.as_deref())
            .collect()
    }

    /// Whether any edge is labelled by the given action.
    pub fn has_action(&self, action: &str) -> bool {
        self.edges
            .iter()
            .any(|edge| edge.action.as_deref() == Some(action))
    }

    /// Merges another automaton with the same name into this one:
    /// locations, initial locations and variables are joined, edges are concatenated.
    /// Actions generated for `other` are renumbered after those generated for `self`.
    ///
    /// Fails without modifying `self` if names differ or a variable is defined in both.
    pub fn merge(&mut self, other: Automaton) -> Result<(), AutomatonError> {
        if self.name != other.name {
            return Err(AutomatonError::NameMismatch {
                expected: self.name.clone(),
                found: other.name,
            });
        }
        if let Some(variable) = other
            .variables
            .keys()
            .find(|name| self.variables.contains_key(*name))
        {
            return Err(AutomatonError::DuplicateVariable {
                automaton: self.name.clone(),
                variable: variable.clone(),
            });
        }
        let offset = self.action_id;
        let other_generated = other.action_id;
        let generated = format!("{}_action_", self.name);
        let renumber = |mut edge: Edge| {
            let n = edge
                .action
                .as_deref()
                .and_then(|action| action.strip_prefix(generated.as_str()))
                .and_then(|n| n.parse::<usize>().ok())
                .filter(|n| *n < other_generated);
            if let Some(n) = n {
                edge.action = Some(format!("{generated}{}", n + offset));
            }
            edge
        };
        self.edges.extend(other.edges.into_iter().map(renumber));
        self.locations.extend(other.locations);
        self.initial_locations.extend(other.initial_locations);
        self.variables.extend(other.variables);
        self.action_id += other_generated;
        Ok(())
    }

    /// Removes all edges labelled by the given action, returning how many were removed.
    pub fn remove_edges_with_action(&mut self, action: &str) -> usize {
        let len = self.edges.len();
        self.edges
            .retain(|edge| edge.action.as_deref() != Some(action));
        let removed = len - self.edges.len();
        if removed > 0 {
            trace!(
                "removed {removed} edges with action '{action}' from automaton '{}'",
                self.name
            );
        }
        removed
    }

    /// Removes self-loops that have a single destination, no assignments and no guard
    /// (or a guard that is literally `true`), returning how many were removed.
    pub fn remove_empty_self_loop_edges(&mut self) -> usize {
        let len = self.edges.len();
        self.edges.retain(|edge| !edge.is_empty_self_loop());
        len - self.edges.len()
    }

    /// Checks that the automaton is complete, i.e., it has at least one initial location
    /// and every location referenced by its edges exists.
    pub fn check(&self) -> Result<(), AutomatonError> {
        if self.initial_locations.is_empty() {
            return Err(AutomatonError::NoInitialLocation(self.name.clone()));
        }
        self.initial_locations
            .iter()
            .try_for_each(|loc| self.has_location(loc))?;
        self.edges.iter().try_for_each(|edge| {
            self.has_location(&edge.location)?;
            edge.destinations
                .iter()
                .try_for_each(|dest| self.has_location(&dest.location))
        })
    }
}

#[derive(Serialize, Deserialize)]
struct LocationRepr {
    name: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct AutomatonRepr {
    name: String,
    locations: Vec<LocationRepr>,
    initial_locations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    variables: Vec<Variable>,
    #[serde(default)]
    edges: Vec<Edge>,
}

impl From<Automaton> for AutomatonRepr {
    fn from(automaton: Automaton) -> Self {
        Self {
            name: automaton.name,
            locations: automaton
                .locations
                .into_iter()
                .map(|name| LocationRepr { name })
                .collect(),
            initial_locations: automaton.initial_locations.into_iter().collect(),
            variables: automaton.variables.into_values().collect(),
            edges: automaton.edges,
        }
    }
}

impl TryFrom<AutomatonRepr> for Automaton {
    type Error = AutomatonError;

    fn try_from(repr: AutomatonRepr) -> Result<Self, Self::Error> {
        let mut automaton = Automaton::new(repr.name);
        repr.locations.into_iter().for_each(|loc| {
            automaton.add_location(loc.name);
        });
        repr.initial_locations
            .iter()
            .try_for_each(|loc| automaton.make_initial(loc))?;
        repr.variables
            .into_iter()
            .try_for_each(|var| automaton.add_variable(var))?;
        for edge in repr.edges {
            automaton.add_edge(edge)?;
        }
        Ok(automaton)
    }
}
