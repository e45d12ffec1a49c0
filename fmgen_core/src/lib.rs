//! Expression language and state-machine intermediate representation
//! for the `fmgen` compiler.
//!
//! The crate models the subset of the [JANI](https://jani-spec.org/) formalism
//! needed to express networks of communicating automata:
//!
//! - [`Expression`]s, with operators addressed by named operands,
//!   and their round-trip translation to the JANI dictionary form;
//! - a typed evaluator for constant folding ([`Expression::eval`]);
//! - [`Automaton`]s made of locations, guarded [`Edge`]s,
//!   probabilistic [`Destination`]s and ordered [`Assignment`]s;
//! - typed [`Variable`]s and [`Constant`]s.
//!
//! Composition of automata and the top-level model live in `fmgen_jani`.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod automaton;
mod eval;
mod expression;
mod types;
mod variable;

pub use automaton::{Assignment, Automaton, AutomatonError, Destination, Edge};
pub use eval::EvalError;
pub use expression::{
    Distribution, Expression, ExpressionError, MathConstant, OpTag, Operator, Value,
};
pub use types::Type;
pub use variable::{Constant, Variable};
