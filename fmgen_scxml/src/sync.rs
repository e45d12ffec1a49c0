use crate::{
    event::{Event, EventClass, EventRegistry},
    timers::{GLOBAL_TIMER, GLOBAL_TIMER_ENABLE, GLOBAL_TIMER_TICK, Timer},
};
use fmgen_core::{Automaton, AutomatonError, Destination, Edge, Type, Variable};
use fmgen_jani::{Composition, Feature, Model, ModelError};
use log::{debug, info, trace};
use std::{iter::once, time::Instant};
use thiserror::Error;

const WAITING: &str = "waiting";
const RECEIVED: &str = "received";

/// Errors in synchronizing the automata of a model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    /// Some automaton waits for an event nobody sends.
    #[error("event '{0}' is received but never sent")]
    NoSender(String),
    /// An automaton sends or receives an event through the wrong action.
    #[error("automaton '{automaton}' uses action '{found}' for event '{event}' instead of '{expected}'")]
    ActionMismatch {
        /// The event.
        event: String,
        /// The automaton.
        automaton: String,
        /// The expected action.
        expected: String,
        /// The registered action.
        found: String,
    },
    /// A timer nobody receives.
    #[error("no automaton receives the events of timer '{0}'")]
    UnknownTimer(String),
    /// A timer received by more than one automaton.
    #[error("events of timer '{timer}' are received by {found} automata")]
    TimerReceivers {
        /// The timer.
        timer: String,
        /// Number of receiving automata.
        found: usize,
    },
    /// Timers are declared, but the global timer automaton is missing.
    #[error("timers require the global timer automaton")]
    MissingGlobalTimer,
    /// Error building an event automaton.
    #[error(transparent)]
    Automaton(#[from] AutomatonError),
    /// Error building the model.
    #[error(transparent)]
    Model(#[from] ModelError),
}

fn check_actions<'a>(
    event: &Event,
    participants: impl Iterator<Item = (&'a str, &'a str)>,
    expected: &str,
) -> Result<(), SyncError> {
    for (automaton, action) in participants {
        if action != expected {
            return Err(SyncError::ActionMismatch {
                event: event.name().to_owned(),
                automaton: automaton.to_owned(),
                expected: expected.to_owned(),
                found: action.to_owned(),
            });
        }
    }
    Ok(())
}

// The automaton keeping track of whether the event has been sent and not received yet.
fn event_automaton(event: &Event, timed: bool) -> Result<Automaton, AutomatonError> {
    let mut automaton = Automaton::new(event.name());
    automaton.add_location(WAITING);
    automaton.make_initial(WAITING)?;
    if timed {
        automaton
            .add_edge(Edge::new(WAITING, Destination::new(WAITING)).with_action(GLOBAL_TIMER_ENABLE))?;
    }
    if event.has_receivers() {
        automaton.add_location(RECEIVED);
        automaton
            .add_edge(Edge::new(WAITING, Destination::new(RECEIVED)).with_action(event.on_send()))?;
        automaton.add_edge(
            Edge::new(RECEIVED, Destination::new(WAITING)).with_action(event.on_receive()),
        )?;
    } else {
        automaton
            .add_edge(Edge::new(WAITING, Destination::new(WAITING)).with_action(event.on_send()))?;
    }
    Ok(automaton)
}

// Payload and validity flag of the event, as global variables.
fn event_variables(
    model: &mut Model,
    event: &Event,
    max_array_size: usize,
) -> Result<(), ModelError> {
    for (field, data_type) in event.fields().into_iter().flatten() {
        let name = format!("{}.{field}", event.name());
        let init = data_type.default_value(max_array_size);
        model.add_variable(Variable::new(
            name.as_str(),
            data_type.to_type(),
            Some(init),
            false,
        ))?;
        if let Some(shape) = data_type.shape(max_array_size) {
            model.add_feature(Feature::Arrays);
            for length in shape.length_variables(&name, None, false) {
                model.add_variable(length)?;
            }
        }
    }
    model.add_variable(Variable::new(
        format!("{}.valid", event.name()),
        Type::Bool,
        Some(false.into()),
        false,
    ))
}

/// Synchronizes the automata of the model through the events in `registry`,
/// and sets the resulting composition.
///
/// Every event gets its own automaton,
/// so that it is received only after being sent,
/// and global variables for its payload.
/// If there are `timers`, time advances only when no event is pending.
///
/// Returns the events that are sent but never received.
pub fn assemble_syncs(
    model: &mut Model,
    registry: &EventRegistry,
    timers: &[Timer],
    max_array_size: usize,
) -> Result<Vec<String>, SyncError> {
    let time = Instant::now();
    info!(target: "build", "synchronizing {} events", registry.len());
    let mut composition = Composition::default();
    for automaton in model.automata() {
        composition.add_element(automaton.name())?;
    }
    let timed = !timers.is_empty();
    if timed && model.automaton(GLOBAL_TIMER).is_none() {
        return Err(SyncError::MissingGlobalTimer);
    }
    let mut enabled = Vec::new();
    let mut unconsumed = Vec::new();

    for event in registry.iter() {
        match event.classify() {
            EventClass::Timer => {
                trace!("event '{}' is driven by the global timer", event.name());
                continue;
            }
            EventClass::Optional => {
                let removed = model.remove_edges_with_action(&event.on_receive());
                debug!(
                    "event '{}' is never sent: removed {removed} receiving edges",
                    event.name()
                );
                continue;
            }
            EventClass::Synchronized if !event.has_senders() => {
                return Err(SyncError::NoSender(event.name().to_owned()));
            }
            EventClass::Synchronized => {}
        }
        let on_send = event.on_send();
        let on_receive = event.on_receive();
        check_actions(event, event.senders(), &on_send)?;
        check_actions(event, event.receivers(), &on_receive)?;

        model.add_automaton(event_automaton(event, timed)?)?;
        composition.add_element(event.name())?;
        if event.has_receivers() {
            composition.add_sync(
                on_receive.as_str(),
                once((event.name(), on_receive.as_str())).chain(event.receivers()),
            )?;
        } else {
            debug!("event '{}' has no receivers", event.name());
            unconsumed.push(event.name().to_owned());
        }
        composition.add_sync(
            on_send.as_str(),
            once((event.name(), on_send.as_str())).chain(event.senders()),
        )?;
        if timed {
            enabled.push(event.name());
        }
        event_variables(model, event, max_array_size)?;
    }

    let enables = || enabled.iter().map(|event| (*event, GLOBAL_TIMER_ENABLE));
    if timed {
        composition.add_sync(
            GLOBAL_TIMER_TICK,
            once((GLOBAL_TIMER, GLOBAL_TIMER_TICK)).chain(enables()),
        )?;
    }
    for timer in timers {
        let event = registry
            .get(&timer.rate_event())
            .ok_or_else(|| SyncError::UnknownTimer(timer.name.clone()))?;
        let on_receive = event.on_receive();
        let mut receivers = event.receivers();
        let (receiver, action) = match (receivers.next(), receivers.next()) {
            (Some(receiver), None) => receiver,
            (None, _) => return Err(SyncError::UnknownTimer(timer.name.clone())),
            (Some(_), Some(_)) => {
                return Err(SyncError::TimerReceivers {
                    timer: timer.name.clone(),
                    found: event.receivers().count(),
                });
            }
        };
        check_actions(event, once((receiver, action)), &on_receive)?;
        composition.add_sync(
            on_receive.as_str(),
            [(GLOBAL_TIMER, on_receive.as_str()), (receiver, action)]
                .into_iter()
                // shortens the lifetimes of the enabled events to that of `on_receive`
                .chain(enables().map(|(event, action)| (event, action))),
        )?;
    }

    model.set_composition(composition)?;
    info!("synchronization completed in {:?}", time.elapsed());
    Ok(unconsumed)
}
