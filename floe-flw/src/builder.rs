//  BUILDER.rs
//    by Eisfeld
//
//  Created:
//    13 Feb 2023, 11:12:40
//  Last edited:
//    11 Apr 2023, 09:31:08
//  Auto updated?
//    Yes
//
//  Description:
//!   Implements the FlowBuilder, which chains tool states into a complete
//!   flow definition.
//

use log::debug;
use serde_json::{Map, Value};

use crate::errors::BuildError;
use crate::spec::{FlowBlueprint, FlowDefinition, FlowTool};


/***** TESTS *****/




/***** LIBRARY *****/
/// Defines a builder that chains flow tools into a complete flow definition.
///
/// Tools contribute their states unlinked; the builder wires each state to the next in
/// submission order, marks the final state terminal and aggregates the required input keys.
#[derive(Clone, Debug)]
pub struct FlowBuilder {
    /// The comment for the resulting definition.
    comment : String,
    /// The states collected so far, in submission order, with the contributing tool's name.
    states  : Vec<(String, String, Value)>,
    /// The aggregated `$.input` keys, deduplicated, in first-seen order.
    inputs  : Vec<String>,
}

impl FlowBuilder {
    /// Constructor for the FlowBuilder that initializes it to an empty flow.
    ///
    /// # Arguments
    /// - `comment`: The human-readable account the resulting definition carries.
    ///
    /// # Returns
    /// A new FlowBuilder instance.
    #[inline]
    pub fn new(comment: impl Into<String>) -> Self {
        Self {
            comment : comment.into(),
            states  : vec![],
            inputs  : vec![],
        }
    }

    /// Appends the given tool's states to the flow.
    ///
    /// # Arguments
    /// - `tool`: The tool whose states to append. They will run after everything already
    ///   added and before anything added later.
    ///
    /// # Returns
    /// The same builder, for chaining.
    pub fn then(mut self, tool: &dyn FlowTool) -> Self {
        for (name, state) in tool.states() {
            self.states.push((tool.name().into(), name, state));
        }
        for key in tool.required_input() {
            if !self.inputs.contains(&key) { self.inputs.push(key); }
        }
        self
    }

    /// Builds the collected states into a complete flow definition.
    ///
    /// # Returns
    /// A FlowBlueprint carrying the linked definition and the aggregated input keys.
    ///
    /// # Errors
    /// This function errors if no states were added, if two states share a name, or if a
    /// tool contributed a state that is not a JSON object.
    pub fn build(self) -> Result<FlowBlueprint, BuildError> {
        if self.states.is_empty() { return Err(BuildError::EmptyFlow); }
        debug!("Building flow '{}' out of {} states...", self.comment, self.states.len());

        // Collect the names up front so every state knows its successor
        let names: Vec<String> = self.states.iter().map(|(_, name, _)| name.clone()).collect();

        let start_at: String = names[0].clone();
        let mut states: Map<String, Value> = Map::new();
        for (i, (tool, name, state)) in self.states.into_iter().enumerate() {
            // Only objects can carry a Next/End field
            let mut state: Map<String, Value> = match state {
                Value::Object(map) => map,
                _                  => { return Err(BuildError::NonObjectState{ tool, name }); },
            };

            // Link it to its successor (or mark it terminal)
            if i + 1 < names.len() {
                state.insert("Next".into(), Value::String(names[i + 1].clone()));
            } else {
                state.insert("End".into(), Value::Bool(true));
            }

            // Reject name collisions
            if states.insert(name.clone(), Value::Object(state)).is_some() {
                return Err(BuildError::DuplicateState{ name });
            }
        }

        // Done
        Ok(FlowBlueprint {
            definition : FlowDefinition {
                comment : self.comment,
                start_at,
                states,
            },
            required_input : self.inputs,
        })
    }
}
