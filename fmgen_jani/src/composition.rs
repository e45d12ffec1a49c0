use crate::ModelError;
use serde::{Deserialize, Serialize};

/// A synchronization vector: the automata participating in `result`,
/// each with the action it fires, aligned with [`Composition::elements`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sync {
    /// The action resulting from the synchronization.
    pub result: String,
    /// For each element of the composition, its action, or `None` if it does not participate.
    pub synchronise: Vec<Option<String>>,
}

impl Sync {
    /// The participating elements' indexes, with their actions.
    pub fn participants(&self) -> impl Iterator<Item = (usize, &str)> {
        self.synchronise
            .iter()
            .enumerate()
            .filter_map(|(idx, action)| action.as_deref().map(|action| (idx, action)))
    }
}

/// Parallel composition of automata, synchronized on actions.
///
/// ```
/// # use fmgen_jani::Composition;
/// let mut composition = Composition::default();
/// composition.add_element("sender").unwrap();
/// composition.add_element("receiver").unwrap();
/// composition
///     .add_sync("msg", [("sender", "send"), ("receiver", "recv")])
///     .unwrap();
/// // Elements added later do not participate in existing syncs
/// composition.add_element("observer").unwrap();
/// assert!(composition.is_valid());
/// assert_eq!(composition.syncs()[0].synchronise[2], None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Composition {
    elements: Vec<String>,
    syncs: Vec<Sync>,
}

impl Composition {
    /// Adds an automaton to the composition.
    pub fn add_element(&mut self, automaton: impl Into<String>) -> Result<(), ModelError> {
        let automaton = automaton.into();
        if self.elements.contains(&automaton) {
            return Err(ModelError::DuplicateElement(automaton));
        }
        self.elements.push(automaton);
        self.syncs
            .iter_mut()
            .for_each(|sync| sync.synchronise.push(None));
        Ok(())
    }

    /// Adds a sync on the given `(automaton, action)` pairs, resulting in the action `result`.
    pub fn add_sync<'a>(
        &mut self,
        result: impl Into<String>,
        participants: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<(), ModelError> {
        let result = result.into();
        if self.syncs.iter().any(|sync| sync.result == result) {
            return Err(ModelError::DuplicateSync(result));
        }
        let mut synchronise = vec![None; self.elements.len()];
        for (automaton, action) in participants {
            let idx = self.element_index(automaton)?;
            if synchronise[idx].is_some() {
                return Err(ModelError::RepeatedParticipant {
                    sync: result,
                    automaton: automaton.to_owned(),
                });
            }
            synchronise[idx] = Some(action.to_owned());
        }
        self.syncs.push(Sync {
            result,
            synchronise,
        });
        Ok(())
    }

    fn element_index(&self, automaton: &str) -> Result<usize, ModelError> {
        self.elements
            .iter()
            .position(|element| element == automaton)
            .ok_or_else(|| ModelError::UnknownElement(automaton.to_owned()))
    }

    /// The composed automata, in order.
    pub fn elements(&self) -> &[String] {
        &self.elements
    }

    /// The synchronizations, in insertion order.
    pub fn syncs(&self) -> &[Sync] {
        &self.syncs
    }

    /// Whether the sync with the given result exists.
    pub fn has_sync(&self, result: &str) -> bool {
        self.syncs.iter().any(|sync| sync.result == result)
    }

    /// Whether `action` of `automaton` takes part in any sync.
    pub fn is_synchronized(&self, automaton: &str, action: &str) -> bool {
        self.element_index(automaton).is_ok_and(|idx| {
            self.syncs
                .iter()
                .any(|sync| sync.synchronise[idx].as_deref() == Some(action))
        })
    }

    /// Whether every sync vector is as long as the list of elements.
    pub fn is_valid(&self) -> bool {
        self.syncs
            .iter()
            .all(|sync| sync.synchronise.len() == self.elements.len())
    }
}

#[derive(Serialize, Deserialize)]
struct ElementRepr {
    automaton: String,
}

#[derive(Serialize, Deserialize)]
struct CompositionRepr {
    elements: Vec<ElementRepr>,
    #[serde(default)]
    syncs: Vec<Sync>,
}

impl Serialize for Composition {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut syncs = self.syncs.clone();
        syncs.sort_by(|a, b| a.result.cmp(&b.result));
        CompositionRepr {
            elements: self
                .elements
                .iter()
                .map(|automaton| ElementRepr {
                    automaton: automaton.clone(),
                })
                .collect(),
            syncs,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Composition {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = CompositionRepr::deserialize(deserializer)?;
        let composition = Composition {
            elements: repr.elements.into_iter().map(|e| e.automaton).collect(),
            syncs: repr.syncs,
        };
        if composition.is_valid() {
            Ok(composition)
        } else {
            Err(serde::de::Error::custom(ModelError::SyncLength))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_errors() {
        let mut composition = Composition::default();
        composition.add_element("a").unwrap();
        composition.add_element("b").unwrap();
        assert_eq!(
            composition.add_element("a"),
            Err(ModelError::DuplicateElement("a".to_owned()))
        );
        assert_eq!(
            composition.add_sync("x", [("c", "go")]),
            Err(ModelError::UnknownElement("c".to_owned()))
        );
        assert!(matches!(
            composition.add_sync("x", [("a", "go"), ("a", "stop")]),
            Err(ModelError::RepeatedParticipant { .. })
        ));
        composition.add_sync("x", [("b", "go")]).unwrap();
        assert_eq!(
            composition.add_sync("x", [("a", "go")]),
            Err(ModelError::DuplicateSync("x".to_owned()))
        );
        assert!(composition.is_synchronized("b", "go"));
        assert!(!composition.is_synchronized("a", "go"));
        assert_eq!(
            composition.syncs()[0].participants().collect::<Vec<_>>(),
            [(1, "go")]
        );
    }

    #[test]
    fn syncs_sorted_by_result() {
        let mut composition = Composition::default();
        composition.add_element("a").unwrap();
        composition.add_sync("zeta", [("a", "z")]).unwrap();
        composition.add_sync("alpha", [("a", "x")]).unwrap();
        let json = serde_json::to_value(&composition).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "elements": [{"automaton": "a"}],
                "syncs": [
                    {"result": "alpha", "synchronise": ["x"]},
                    {"result": "zeta", "synchronise": ["z"]},
                ]
            })
        );
        let parsed: Composition = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.syncs().len(), 2);
        assert!(serde_json::from_value::<Composition>(serde_json::json!({
            "elements": [{"automaton": "a"}],
            "syncs": [{"result": "r", "synchronise": ["x", null]}]
        }))
        .is_err());
    }
}
