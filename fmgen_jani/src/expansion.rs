//! Compilation of random distributions into probabilistic branching.
//!
//! JANI destinations only support a finite list of outcomes with explicit probabilities,
//! so assignments whose value depends on a distribution are split into
//! a uniform choice among the discretized values of the distribution.

use crate::{Model, ModelError};
use fmgen_core::{
    Assignment, Automaton, AutomatonError, Destination, Edge, Expression, ExpressionError,
    Operator,
};
use log::{debug, info};
use thiserror::Error;

/// Errors in compiling away random distributions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpansionError {
    /// Distributions have to be discretized into at least one value.
    #[error("the resolution of distributions must be positive")]
    Resolution,
    /// Initial values cannot be random.
    #[error("variable '{0}' has a random initial value")]
    RandomInitialValue(String),
    /// Guards cannot be random.
    #[error("edge '{action}' of automaton '{automaton}' has a random guard")]
    RandomGuard {
        /// The automaton.
        automaton: String,
        /// The edge's action.
        action: String,
    },
    /// Probabilities cannot be random.
    #[error("edge '{action}' of automaton '{automaton}' has a random probability")]
    RandomProbability {
        /// The automaton.
        automaton: String,
        /// The edge's action.
        action: String,
    },
    /// Error rebuilding an expression.
    #[error(transparent)]
    Expression(#[from] ExpressionError),
    /// Error adding the expanded edges.
    #[error(transparent)]
    Automaton(#[from] AutomatonError),
    /// Error synchronizing the expanded edges.
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Expands an expression into all the variants obtained
/// by replacing each distribution with one of its `resolution` discretized values.
///
/// Operands are expanded in their canonical order,
/// and variants are enumerated with the last operand varying fastest,
/// so that `n` distributions produce `resolution^n` variants.
///
/// ```
/// # use fmgen_core::{Distribution, Expression, OpTag};
/// # use fmgen_jani::expand_distributions;
/// let uniform = Expression::Distribution(Distribution::uniform(0.0, 1.0).unwrap());
/// let sum = Expression::binary(OpTag::Add, uniform.clone(), uniform);
/// let variants = expand_distributions(&sum, 10).unwrap();
/// assert_eq!(variants.len(), 100);
/// assert_eq!(variants[1].to_string(), "(0.0 + 0.1)");
/// ```
pub fn expand_distributions(
    exp: &Expression,
    resolution: usize,
) -> Result<Vec<Expression>, ExpressionError> {
    match exp {
        Expression::Literal(_) | Expression::Identifier(_) => Ok(vec![exp.clone()]),
        Expression::Distribution(distribution) => Ok(distribution
            .discretize(resolution)
            .into_iter()
            .map(Expression::from)
            .collect()),
        Expression::Operator(operator) if !exp.contains_distribution() => {
            Ok(vec![Expression::Operator(operator.clone())])
        }
        Expression::Operator(operator) => {
            let mut variants: Vec<Vec<(&'static str, Expression)>> = vec![Vec::new()];
            for (role, operand) in operator.operands() {
                let expanded = expand_distributions(operand, resolution)?;
                variants = variants
                    .into_iter()
                    .flat_map(|prefix| {
                        expanded.iter().map(move |exp| {
                            let mut operands = prefix.clone();
                            operands.push((role, exp.clone()));
                            operands
                        })
                    })
                    .collect();
            }
            variants
                .into_iter()
                .map(|operands| Operator::new(operator.op(), operands).map(Expression::Operator))
                .collect()
        }
    }
}

/// Replaces every assignment of a random value in the model
/// with a uniform probabilistic choice among `resolution` discretized values,
/// then synchronizes the newly created actions (see [`Model::generate_missing_syncs`]).
///
/// An edge `src -[action]-> target` whose destination `d` assigns a random value
/// at position `i` of its (index-ordered) assignments is split into the chain
/// `src -> L1 -> L2 -> target`, where
///
/// - `L1` is `{src}_{action}_e{e}_dest_{d}_expanded_assign_{i}` (with `e` the index of the edge),
///   reached with the assignments preceding `i`;
/// - `L2` is `{src}_{action}_e{e}_dest_{d}_after_assign_{i}`,
///   reached through the edge `{L1}_branch` which assigns one of the discretized values;
/// - `target` is reached through the edge `{L2}_continue`
///   with the assignments following `i`, which are expanded in turn.
pub fn expand_random_variables(
    model: &mut Model,
    resolution: usize,
) -> Result<(), ExpansionError> {
    if resolution == 0 {
        return Err(ExpansionError::Resolution);
    }
    let time = std::time::Instant::now();
    info!(target: "build", "expanding random distributions with resolution {resolution}");

    let initial_values = model.variables().iter().chain(
        model
            .automata()
            .iter()
            .flat_map(|automaton| automaton.variables()),
    );
    for var in initial_values {
        if var
            .initial_value
            .as_ref()
            .is_some_and(Expression::contains_distribution)
        {
            return Err(ExpansionError::RandomInitialValue(var.name.clone()));
        }
    }

    let mut expanded = 0;
    for automaton in model.automata_mut() {
        expanded += expand_automaton(automaton, resolution)?;
    }
    if model.composition().is_some() {
        model.generate_missing_syncs()?;
    }
    info!(
        "expanded {expanded} random assignments in {:?}",
        time.elapsed()
    );
    Ok(())
}

struct Split {
    destination: usize,
    expanded_location: String,
    prior: Vec<Assignment>,
    branch: Edge,
    continuation: Edge,
}

fn expand_automaton(automaton: &mut Automaton, resolution: usize) -> Result<usize, ExpansionError> {
    let mut expanded = 0;
    // Edges added while expanding are visited as well.
    let mut e = 0;
    while e < automaton.edges().len() {
        let splits = split_edge(automaton, e, resolution)?;
        for split in splits {
            debug!(
                "expanding random assignment of automaton '{}' into {} branches",
                automaton.name(),
                split.branch.destinations.len()
            );
            automaton.add_location(split.expanded_location.clone());
            automaton.add_location(split.continuation.location.clone());
            let dest = &mut automaton.edges_mut()[e].destinations[split.destination];
            dest.location = split.expanded_location;
            dest.assignments = split.prior;
            automaton.add_edge(split.branch)?;
            automaton.add_edge(split.continuation)?;
            expanded += 1;
        }
        e += 1;
    }
    Ok(expanded)
}

fn split_edge(
    automaton: &Automaton,
    e: usize,
    resolution: usize,
) -> Result<Vec<Split>, ExpansionError> {
    let edge = &automaton.edges()[e];
    let action = edge.action.as_deref().unwrap_or_default();
    if edge
        .guard
        .as_ref()
        .is_some_and(Expression::contains_distribution)
    {
        return Err(ExpansionError::RandomGuard {
            automaton: automaton.name().to_owned(),
            action: action.to_owned(),
        });
    }

    let mut splits = Vec::new();
    for (d, dest) in edge.destinations.iter().enumerate() {
        if dest
            .probability
            .as_ref()
            .is_some_and(Expression::contains_distribution)
        {
            return Err(ExpansionError::RandomProbability {
                automaton: automaton.name().to_owned(),
                action: action.to_owned(),
            });
        }
        let mut prior = dest.assignments.clone();
        prior.sort_by_key(|assignment| assignment.index);
        let Some(i) = prior
            .iter()
            .position(|assignment| assignment.value.contains_distribution())
        else {
            continue;
        };
        let following = prior.split_off(i + 1);
        let random = prior.remove(i);

        let values = expand_distributions(&random.value, resolution)?;
        let probability = Expression::from(1. / values.len() as f64);
        let prefix = format!("{}_{action}_e{e}_dest_{d}", edge.location);
        let expanded_location = format!("{prefix}_expanded_assign_{i}");
        let after_location = format!("{prefix}_after_assign_{i}");

        let branch = Edge {
            location: expanded_location.clone(),
            action: Some(format!("{expanded_location}_branch")),
            guard: None,
            destinations: values
                .into_iter()
                .map(|value| {
                    Destination::new(&after_location)
                        .with_probability(probability.clone())
                        .with_assignment(Assignment::new(random.target.clone(), value, 0))
                })
                .collect(),
        };
        let continuation = Edge::new(
            &after_location,
            Destination {
                location: dest.location.clone(),
                probability: None,
                assignments: following,
            },
        )
        .with_action(format!("{after_location}_continue"));

        splits.push(Split {
            destination: d,
            expanded_location,
            prior,
            branch,
            continuation,
        });
    }
    Ok(splits)
}
