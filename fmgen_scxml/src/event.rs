use crate::{interface::Fields, timers::TIMER_PREFIX};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Inconsistent registrations of an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// An automaton uses two different actions for the same side of an event.
    #[error("automaton '{automaton}' uses both '{existing}' and '{action}' for event '{event}'")]
    ConflictingAction {
        /// The event.
        event: String,
        /// The automaton.
        automaton: String,
        /// The action registered first.
        existing: String,
        /// The conflicting action.
        action: String,
    },
    /// Two automata declare different payloads for the same event.
    #[error("conflicting payload declarations for event '{0}'")]
    ConflictingFields(String),
}

/// How an event is handled when synchronizing automata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    /// The rate event of a timer, driven by the global timer.
    Timer,
    /// An event nobody sends and nobody has to wait for:
    /// its receiving edges are dead.
    Optional,
    /// Synchronized through an event automaton.
    Synchronized,
}

/// An event, with the automata sending and receiving it.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    name: String,
    fields: Option<Fields>,
    senders: BTreeMap<String, String>,
    receivers: BTreeMap<String, String>,
}

impl Event {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            fields: None,
            senders: BTreeMap::new(),
            receivers: BTreeMap::new(),
        }
    }

    /// Name of the event.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Payload schema, if any automaton declared it.
    pub fn fields(&self) -> Option<&Fields> {
        self.fields.as_ref()
    }

    /// Sending automata, with the action they send with.
    pub fn senders(&self) -> impl Iterator<Item = (&str, &str)> {
        self.senders.iter().map(|(a, b)| (a.as_str(), b.as_str()))
    }

    /// Receiving automata, with the action they receive with.
    pub fn receivers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.receivers.iter().map(|(a, b)| (a.as_str(), b.as_str()))
    }

    /// Whether some automaton sends the event.
    pub fn has_senders(&self) -> bool {
        !self.senders.is_empty()
    }

    /// Whether some automaton receives the event.
    pub fn has_receivers(&self) -> bool {
        !self.receivers.is_empty()
    }

    /// The sending action.
    pub fn on_send(&self) -> String {
        format!("{}_on_send", self.name)
    }

    /// The receiving action.
    pub fn on_receive(&self) -> String {
        format!("{}_on_receive", self.name)
    }

    /// Classifies the event.
    ///
    /// Action feedback and goal rejections, and behavior-tree halts,
    /// are optional when no automaton sends them.
    pub fn classify(&self) -> EventClass {
        if self.name.starts_with(TIMER_PREFIX) {
            return EventClass::Timer;
        }
        if self.has_senders() {
            return EventClass::Synchronized;
        }
        let optional_action = self.name.strip_prefix("action_").is_some_and(|name| {
            name.ends_with("_feedback") || name.ends_with("_goal_rejected")
        });
        let optional_bt = self.name.strip_prefix("bt_").is_some_and(|name| {
            name.ends_with("_halt") || name.ends_with("_halt_response")
        });
        if optional_action || optional_bt {
            EventClass::Optional
        } else {
            EventClass::Synchronized
        }
    }

    fn set_fields(&mut self, fields: Option<&Fields>) -> Result<(), RegistryError> {
        match (&self.fields, fields) {
            (_, None) => Ok(()),
            (None, Some(fields)) => {
                self.fields = Some(fields.clone());
                Ok(())
            }
            (Some(existing), Some(fields)) if existing == fields => Ok(()),
            (Some(_), Some(_)) => Err(RegistryError::ConflictingFields(self.name.clone())),
        }
    }
}

fn insert(
    map: &mut BTreeMap<String, String>,
    event: &str,
    automaton: &str,
    action: &str,
) -> Result<(), RegistryError> {
    match map.get(automaton) {
        Some(existing) if existing != action => Err(RegistryError::ConflictingAction {
            event: event.to_owned(),
            automaton: automaton.to_owned(),
            existing: existing.clone(),
            action: action.to_owned(),
        }),
        Some(_) => Ok(()),
        None => {
            map.insert(automaton.to_owned(), action.to_owned());
            Ok(())
        }
    }
}

/// The events of a system, in order of first registration.
///
/// ```
/// # use fmgen_scxml::{EventClass, EventRegistry};
/// let mut registry = EventRegistry::default();
/// registry.add_receiver("action_nav_feedback", "client", "action_nav_feedback_on_receive", None).unwrap();
/// let event = registry.get("action_nav_feedback").unwrap();
/// assert_eq!(event.classify(), EventClass::Optional);
/// assert!(registry.add_receiver("action_nav_feedback", "client", "other", None).is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct EventRegistry {
    events: Vec<Event>,
    index: HashMap<String, usize>,
}

impl EventRegistry {
    fn entry(&mut self, name: &str) -> &mut Event {
        let idx = *self.index.entry(name.to_owned()).or_insert_with(|| {
            self.events.push(Event::new(name));
            self.events.len() - 1
        });
        &mut self.events[idx]
    }

    /// Registers `automaton` as sender of `event` through `action`.
    pub fn add_sender(
        &mut self,
        event: &str,
        automaton: &str,
        action: &str,
        fields: Option<&Fields>,
    ) -> Result<(), RegistryError> {
        let entry = self.entry(event);
        entry.set_fields(fields)?;
        insert(&mut entry.senders, event, automaton, action)
    }

    /// Registers `automaton` as receiver of `event` through `action`.
    pub fn add_receiver(
        &mut self,
        event: &str,
        automaton: &str,
        action: &str,
        fields: Option<&Fields>,
    ) -> Result<(), RegistryError> {
        let entry = self.entry(event);
        entry.set_fields(fields)?;
        insert(&mut entry.receivers, event, automaton, action)
    }

    /// The event with the given name.
    pub fn get(&self, name: &str) -> Option<&Event> {
        self.index.get(name).map(|idx| &self.events[*idx])
    }

    /// The events, in order of first registration.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether no event is registered.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BaseType, DataType};

    #[test]
    fn registration_order() {
        let mut registry = EventRegistry::default();
        registry.add_sender("b", "x", "b_on_send", None).unwrap();
        registry.add_receiver("a", "y", "a_on_receive", None).unwrap();
        registry.add_receiver("b", "y", "b_on_receive", None).unwrap();
        let names: Vec<_> = registry.iter().map(Event::name).collect();
        assert_eq!(names, ["b", "a"]);
        let b = registry.get("b").unwrap();
        assert_eq!(b.senders().collect::<Vec<_>>(), [("x", "b_on_send")]);
        assert_eq!(b.receivers().collect::<Vec<_>>(), [("y", "b_on_receive")]);
    }

    #[test]
    fn payload_conflicts() {
        let int = Fields::from([("data".to_owned(), DataType::scalar(BaseType::Int))]);
        let real = Fields::from([("data".to_owned(), DataType::scalar(BaseType::Real))]);
        let mut registry = EventRegistry::default();
        registry.add_sender("e", "x", "e_on_send", None).unwrap();
        registry.add_receiver("e", "y", "e_on_receive", Some(&int)).unwrap();
        registry.add_sender("e", "z", "e_on_send", Some(&int)).unwrap();
        assert_eq!(
            registry.add_receiver("e", "w", "e_on_receive", Some(&real)),
            Err(RegistryError::ConflictingFields("e".to_owned()))
        );
        assert_eq!(registry.get("e").unwrap().fields(), Some(&int));
    }

    #[test]
    fn classification() {
        let mut registry = EventRegistry::default();
        for event in [
            "ros_time_rate.t",
            "bt_1_halt",
            "bt_1_halt_response",
            "action_a_goal_rejected",
            "action_a_result",
            "level",
        ] {
            registry
                .add_receiver(event, "r", &format!("{event}_on_receive"), None)
                .unwrap();
        }
        let classes: Vec<_> = registry.iter().map(Event::classify).collect();
        assert_eq!(
            classes,
            [
                EventClass::Timer,
                EventClass::Optional,
                EventClass::Optional,
                EventClass::Optional,
                EventClass::Synchronized,
                EventClass::Synchronized,
            ]
        );
        registry.add_sender("bt_1_halt", "s", "bt_1_halt_on_send", None).unwrap();
        assert_eq!(
            registry.get("bt_1_halt").unwrap().classify(),
            EventClass::Synchronized
        );
    }
}
