//! Front end of the `fmgen` compiler.
//!
//! Compiles a [`ModelDescription`], a system of state machines
//! communicating through events, into a JANI [`Model`]:
//!
//! - ECMAScript expressions are translated with [`translate`];
//! - each [`StateMachine`] is assembled into an automaton ([`assemble`]),
//!   registering the events it sends and receives;
//! - timers are driven by a global timer automaton ([`global_timer_automaton`]);
//! - automata are synchronized through one automaton per event ([`assemble_syncs`]);
//! - random distributions are expanded into probabilistic branching.
//!
//! [`convert`] runs the whole pipeline.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod assembler;
mod description;
mod event;
mod interface;
mod sync;
mod timers;
mod translator;
mod types;

use anyhow::{Context, ensure};
use fmgen_core::{Constant, Expression, Value};
use fmgen_jani::{Feature, Model, expand_random_variables};
use log::{info, warn};
use std::{collections::HashMap, fs::File, io::Read, path::Path, time::Instant};

pub use assembler::{Assembled, AssemblyError, assemble};
pub use description::{
    AssignmentDecl, ConstantDecl, DestinationDecl, EdgeDecl, ModelDescription, StateMachine,
    VariableDecl,
};
pub use event::{Event, EventClass, EventRegistry, RegistryError};
pub use interface::{Direction, Endpoint, Fields, Interface};
pub use sync::{SyncError, assemble_syncs};
pub use timers::{
    GLOBAL_TIMER, GLOBAL_TIMER_ENABLE, GLOBAL_TIMER_TICK, TIMER_PREFIX, TimeUnit, Timer,
    TimerError, global_timer_automaton,
};
pub use translator::{TranslationCause, TranslationError, translate, translate_with_lengths};
pub use types::{ArrayShape, BaseType, DataType, DataTypeError, length_variable};

/// Parameters of the conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionConfig {
    /// Max size of arrays declared without size, and of array payloads.
    pub max_array_size: usize,
    /// Number of values each random distribution is discretized into.
    pub resolution: usize,
    /// Time horizon of the global timer, in nanoseconds.
    pub max_time_ns: u64,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_array_size: 100,
            resolution: 100,
            max_time_ns: 100_000_000_000,
        }
    }
}

/// Reads a model description from a JSON file.
pub fn load(path: &Path) -> anyhow::Result<ModelDescription> {
    let time = Instant::now();
    info!(target: "parser", "parsing model description file '{}'", path.display());
    let mut file =
        File::open(path).with_context(|| format!("failed to open file '{}'", path.display()))?;
    let mut buf = String::new();
    file.read_to_string(&mut buf)
        .with_context(|| format!("failed to read file '{}' to string", path.display()))?;
    let description: ModelDescription = serde_json::from_str(&buf)
        .with_context(|| format!("failed to parse model description in '{}'", path.display()))?;
    info!("parsing complete in {:?}", time.elapsed());
    Ok(description)
}

fn add_constants(
    model: &mut Model,
    description: &ModelDescription,
    config: &ConversionConfig,
) -> anyhow::Result<HashMap<String, Value>> {
    let mut constants = HashMap::new();
    for decl in &description.constants {
        let shape = decl.r#type.shape(config.max_array_size);
        let mut value = decl
            .value
            .as_deref()
            .map(|value| translate(value, shape.as_ref()))
            .transpose()
            .with_context(|| format!("failed to translate value of constant '{}'", decl.name))?;
        let folded = value
            .as_ref()
            .and_then(|exp| exp.eval(&|id| constants.get(id).cloned()).ok());
        if let Some(folded) = folded {
            ensure!(
                decl.r#type.to_type().accepts(&folded),
                "value of constant '{}' is not of type {}",
                decl.name,
                decl.r#type
            );
            // array values stay in their `av` form
            if !matches!(folded, Value::Array(_)) {
                value = Some(Expression::Literal(folded.clone()));
            }
            constants.insert(decl.name.clone(), folded);
        }
        model.add_constant(Constant::new(decl.name.as_str(), decl.r#type.to_type(), value))?;
    }
    Ok(constants)
}

/// Compiles a model description into a JANI model.
///
/// ```
/// # use fmgen_scxml::{ConversionConfig, ModelDescription, convert};
/// let description: ModelDescription = serde_json::from_value(serde_json::json!({
///     "name": "ping",
///     "automata": [
///         {
///             "name": "sender",
///             "locations": ["idle"],
///             "initial": ["idle"],
///             "interfaces": [{"kind": "event", "name": "ping", "direction": "send"}],
///             "edges": [{"location": "idle", "action": "ping_on_send", "destinations": [{"location": "idle"}]}]
///         },
///         {
///             "name": "receiver",
///             "locations": ["idle"],
///             "initial": ["idle"],
///             "interfaces": [{"kind": "event", "name": "ping", "direction": "receive"}],
///             "edges": [{"location": "idle", "action": "ping_on_receive", "destinations": [{"location": "idle"}]}]
///         }
///     ]
/// }))
/// .unwrap();
/// let model = convert(&description, &ConversionConfig::default()).unwrap();
/// assert!(model.automaton("ping").is_some());
/// assert!(model.variable("ping.valid").is_some());
/// ```
pub fn convert(description: &ModelDescription, config: &ConversionConfig) -> anyhow::Result<Model> {
    let time = Instant::now();
    info!(target: "build", "converting model '{}'", description.name);
    let mut model = Model::new(description.name.as_str());
    let constants = add_constants(&mut model, description, config)?;

    let mut registry = EventRegistry::default();
    let mut timers = Vec::new();
    for machine in &description.automata {
        let assembled = assemble(machine, &mut registry, &constants, config.max_array_size)
            .with_context(|| format!("failed to assemble automaton '{}'", machine.name))?;
        if assembled.uses_arrays {
            model.add_feature(Feature::Arrays);
        }
        if assembled.uses_trigonometry {
            model.add_feature(Feature::TrigonometricFunctions);
        }
        timers.extend(assembled.timers);
        model.add_automaton(assembled.automaton)?;
    }
    if !timers.is_empty() {
        let global_timer = global_timer_automaton(&timers, config.max_time_ns)
            .context("failed to build the global timer")?;
        model.add_automaton(global_timer)?;
    }

    let unconsumed = assemble_syncs(&mut model, &registry, &timers, config.max_array_size)
        .context("failed to synchronize automata")?;
    for event in unconsumed {
        warn!("event '{event}' is sent but never received");
    }
    expand_random_variables(&mut model, config.resolution)
        .context("failed to expand random variables")?;
    model.lower_helpers();
    for property in &description.properties {
        model.add_property(property.clone());
    }
    info!("conversion completed in {:?}", time.elapsed());
    Ok(model)
}
