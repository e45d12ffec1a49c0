use crate::{
    description::{AssignmentDecl, DestinationDecl, EdgeDecl, StateMachine, VariableDecl},
    event::{EventRegistry, RegistryError},
    interface::{Direction, Endpoint},
    timers::Timer,
    translator::{TranslationError, translate_with_lengths},
    types::{ArrayShape, DataType, length_expression, length_variable},
};
use fmgen_core::{
    Assignment, Automaton, AutomatonError, Destination, Edge, Expression, OpTag, Value, Variable,
};
use log::{debug, trace};
use std::collections::HashMap;
use thiserror::Error;

/// Prefix of the payload references in receiving edges.
pub(crate) const EVENT_PAYLOAD: &str = "_event";

/// Errors in assembling an automaton from a [`StateMachine`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AssemblyError {
    /// An expression failed to translate.
    #[error("error in {context}")]
    Translation {
        /// Where the expression appears.
        context: String,
        /// The translation failure.
        #[source]
        error: TranslationError,
    },
    /// The initial value does not have the declared type.
    #[error("initial value of variable '{variable}' is not of type {}", .r#type)]
    InitialValueType {
        /// The variable.
        variable: String,
        /// Its declared type.
        r#type: DataType,
    },
    /// An edge without destinations.
    #[error("edge {0} has no destinations")]
    NoDestinations(usize),
    /// Inconsistent event registrations.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Malformed automaton.
    #[error(transparent)]
    Automaton(#[from] AutomatonError),
}

/// The result of assembling a state machine.
#[derive(Debug, Clone)]
pub struct Assembled {
    /// The automaton.
    pub automaton: Automaton,
    /// The timers it declares.
    pub timers: Vec<Timer>,
    /// Whether it uses arrays.
    pub uses_arrays: bool,
    /// Whether it uses trigonometric functions.
    pub uses_trigonometry: bool,
}

struct Assembler<'a> {
    constants: &'a HashMap<String, Value>,
    max_array_size: usize,
    arrays: HashMap<String, ArrayShape>,
    sends: HashMap<String, Endpoint>,
    receives: HashMap<String, Endpoint>,
    uses_arrays: bool,
    uses_trigonometry: bool,
}

/// Assembles the automaton of a state machine, and registers its events.
///
/// `constants` are used to check the initial values of variables,
/// and `max_array_size` bounds the arrays declared without size.
pub fn assemble(
    machine: &StateMachine,
    registry: &mut EventRegistry,
    constants: &HashMap<String, Value>,
    max_array_size: usize,
) -> Result<Assembled, AssemblyError> {
    let mut assembler = Assembler {
        constants,
        max_array_size,
        arrays: HashMap::new(),
        sends: HashMap::new(),
        receives: HashMap::new(),
        uses_arrays: false,
        uses_trigonometry: false,
    };
    let mut automaton = Automaton::new(machine.name.as_str());
    for location in &machine.locations {
        automaton.add_location(location.as_str());
    }
    for location in &machine.initial {
        automaton.make_initial(location)?;
    }
    for decl in &machine.variables {
        for variable in assembler.variable(decl)? {
            automaton.add_variable(variable)?;
        }
    }
    let mut timers = Vec::new();
    for interface in &machine.interfaces {
        timers.extend(interface.timer());
        for endpoint in interface.endpoints() {
            let map = match endpoint.direction {
                Direction::Send => &mut assembler.sends,
                Direction::Receive => &mut assembler.receives,
            };
            map.insert(endpoint.action(), endpoint);
        }
    }
    for (idx, decl) in machine.edges.iter().enumerate() {
        let edge = assembler.edge(idx, decl)?;
        automaton.add_edge(edge)?;
    }
    if machine.interface_handler {
        let removed = automaton.remove_empty_self_loop_edges();
        debug!("removed {removed} empty self-loops from interface handler '{}'", machine.name);
    }
    for edge in automaton.edges() {
        let Some(action) = edge.action.as_deref() else {
            continue;
        };
        if let Some(endpoint) = assembler.sends.get(action) {
            trace!("'{}' sends '{}'", machine.name, endpoint.event);
            registry.add_sender(&endpoint.event, &machine.name, action, endpoint.fields.as_ref())?;
        } else if let Some(endpoint) = assembler.receives.get(action) {
            trace!("'{}' receives '{}'", machine.name, endpoint.event);
            registry.add_receiver(&endpoint.event, &machine.name, action, endpoint.fields.as_ref())?;
        }
    }
    Ok(Assembled {
        automaton,
        timers,
        uses_arrays: assembler.uses_arrays,
        uses_trigonometry: assembler.uses_trigonometry,
    })
}

// The lengths of each dimension of the array `value`, if they can be tracked.
fn value_lengths(
    value: &Expression,
    lengths: Option<Vec<Value>>,
    shape: &ArrayShape,
) -> Option<Vec<Expression>> {
    let dims = shape.max_sizes.len();
    match value {
        Expression::Identifier(other) => Some(
            (1..=dims)
                .map(|dim| Expression::identifier(length_variable(other, dim)))
                .collect(),
        ),
        Expression::Operator(operator) if operator.op() == OpTag::ArrayValue => {
            lengths.map(|lengths| lengths.into_iter().map(length_expression).collect())
        }
        Expression::Operator(operator) if operator.op() == OpTag::ArrayCreate => Some(
            shape
                .zero_lengths()
                .into_iter()
                .map(length_expression)
                .collect(),
        ),
        _ => None,
    }
}

impl Assembler<'_> {
    fn translate(
        &mut self,
        source: &str,
        shape: Option<&ArrayShape>,
        context: impl FnOnce() -> String,
    ) -> Result<(Expression, Option<Vec<Value>>), AssemblyError> {
        let (exp, lengths) =
            translate_with_lengths(source, shape).map_err(|error| AssemblyError::Translation {
                context: context(),
                error,
            })?;
        self.uses_trigonometry |= exp.contains_op(OpTag::Sin) || exp.contains_op(OpTag::Cos);
        Ok((exp, lengths))
    }

    fn variable(&mut self, decl: &VariableDecl) -> Result<Vec<Variable>, AssemblyError> {
        let shape = decl.r#type.shape(self.max_array_size);
        let (init, lengths) = match &decl.expr {
            Some(expr) => self.translate(expr, shape.as_ref(), || {
                format!("initial value of variable '{}'", decl.name)
            })?,
            None => (decl.r#type.default_value(self.max_array_size), None),
        };
        let constants = self.constants;
        if let Ok(value) = init.eval(&|id| constants.get(id).cloned()) {
            if !decl.r#type.to_type().accepts(&value) {
                return Err(AssemblyError::InitialValueType {
                    variable: decl.name.clone(),
                    r#type: decl.r#type.clone(),
                });
            }
        }
        let mut variables = vec![Variable::new(
            decl.name.as_str(),
            decl.r#type.to_type(),
            Some(init),
            decl.transient,
        )];
        if let Some(shape) = shape {
            self.uses_arrays = true;
            variables.extend(shape.length_variables(
                &decl.name,
                lengths.as_deref(),
                decl.transient,
            ));
            self.arrays.insert(decl.name.clone(), shape);
        }
        Ok(variables)
    }

    // The shape of the array written by `target`, if it is one.
    fn target_shape(&self, target: &Expression, sending: Option<&Endpoint>) -> Option<ArrayShape> {
        match target {
            Expression::Identifier(name) => self.arrays.get(name).cloned().or_else(|| {
                let endpoint = sending?;
                let field = name
                    .strip_prefix(endpoint.event.as_str())?
                    .strip_prefix('.')?;
                endpoint
                    .fields
                    .as_ref()?
                    .get(field)?
                    .shape(self.max_array_size)
            }),
            Expression::Operator(operator) if operator.op() == OpTag::ArrayAccess => self
                .target_shape(operator.operand("exp")?, sending)?
                .inner(),
            _ => None,
        }
    }

    fn edge(&mut self, idx: usize, decl: &EdgeDecl) -> Result<Edge, AssemblyError> {
        let action = decl.action.as_deref();
        let sending = action.and_then(|action| self.sends.get(action)).cloned();
        let receiving = action
            .and_then(|action| self.receives.get(action))
            .map(|endpoint| endpoint.event.clone());
        let payload = |exp: Expression| match &receiving {
            Some(event) => exp.rename_prefix(EVENT_PAYLOAD, event),
            None => exp,
        };
        let location = &decl.location;

        let mut destinations = Vec::with_capacity(decl.destinations.len());
        for (dest_idx, dest) in decl.destinations.iter().enumerate() {
            let context = || format!("destination {dest_idx} of edge {idx} from '{location}'");
            let destination = self.destination(dest, sending.as_ref(), &payload, context)?;
            destinations.push(destination);
        }
        let mut destinations = destinations.into_iter();
        let first = destinations.next().ok_or(AssemblyError::NoDestinations(idx))?;
        let mut edge = destinations.fold(Edge::new(location.as_str(), first), Edge::with_destination);
        if let Some(action) = action {
            edge = edge.with_action(action);
        }
        if let Some(guard) = &decl.guard {
            let (guard, _) = self.translate(guard, None, || {
                format!("guard of edge {idx} from '{location}'")
            })?;
            edge = edge.with_guard(payload(guard));
        }
        Ok(edge)
    }

    fn destination(
        &mut self,
        decl: &DestinationDecl,
        sending: Option<&Endpoint>,
        payload: &dyn Fn(Expression) -> Expression,
        context: impl Fn() -> String,
    ) -> Result<Destination, AssemblyError> {
        let mut destination = Destination::new(decl.location.as_str());
        if let Some(probability) = &decl.probability {
            let (probability, _) =
                self.translate(probability, None, || format!("probability of {}", context()))?;
            destination = destination.with_probability(payload(probability));
        }
        let mut index = 0;
        for assignment in &decl.assignments {
            for assignment in self.assignment(assignment, sending, payload, &context, index)? {
                index = assignment.index + 1;
                destination = destination.with_assignment(assignment);
            }
        }
        if let Some(endpoint) = sending {
            let valid = format!("{}.valid", endpoint.event);
            let assigned = destination
                .assignments
                .iter()
                .any(|assignment| assignment.target.as_identifier() == Some(valid.as_str()));
            if !assigned {
                destination = destination.with_assignment(Assignment::new(valid, true.into(), index));
            }
        }
        Ok(destination)
    }

    // The assignment, followed by the bookkeeping of array lengths.
    fn assignment(
        &mut self,
        decl: &AssignmentDecl,
        sending: Option<&Endpoint>,
        payload: &dyn Fn(Expression) -> Expression,
        context: &dyn Fn() -> String,
        index: u32,
    ) -> Result<Vec<Assignment>, AssemblyError> {
        let (target, _) = self.translate(&decl.target, None, || {
            format!("target '{}' in {}", decl.target, context())
        })?;
        let target = payload(target);
        let shape = self.target_shape(&target, sending);
        let (value, lengths) = self.translate(&decl.value, shape.as_ref(), || {
            format!("value of '{}' in {}", decl.target, context())
        })?;
        let value = payload(value);

        let mut bookkeeping = Vec::new();
        match &target {
            Expression::Operator(operator) if operator.op() == OpTag::ArrayAccess => {
                if let (Some(Expression::Identifier(array)), Some(idx)) =
                    (operator.operand("exp"), operator.operand("index"))
                {
                    if self.arrays.contains_key(array) || sending.is_some() {
                        let length = length_variable(array, 1);
                        let next = Expression::binary(OpTag::Add, idx.clone(), 1i64.into());
                        let grown =
                            Expression::binary(OpTag::Max, next, Expression::identifier(&length));
                        bookkeeping.push((Expression::identifier(length), grown));
                        // writing a whole row sets the lengths of the inner dimensions at `idx`
                        let inner = shape
                            .as_ref()
                            .and_then(|shape| value_lengths(&value, lengths, shape));
                        for (dim, length) in inner.into_iter().flatten().enumerate() {
                            let row = Expression::array_access(
                                Expression::identifier(length_variable(array, dim + 2)),
                                idx.clone(),
                            );
                            bookkeeping.push((row, length));
                        }
                    }
                }
            }
            Expression::Identifier(array) => {
                let tracked = shape
                    .as_ref()
                    .and_then(|shape| value_lengths(&value, lengths, shape));
                for (dim, length) in tracked.into_iter().flatten().enumerate() {
                    let target = Expression::identifier(length_variable(array, dim + 1));
                    bookkeeping.push((target, length));
                }
            }
            _ => {}
        }
        let mut assignments = vec![Assignment::new(target, value, index)];
        assignments.extend(
            bookkeeping
                .into_iter()
                .map(|(length, value)| Assignment::new(length, value, index + 1)),
        );
        Ok(assignments)
    }
}
