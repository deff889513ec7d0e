//! Variable table and event definitions.
//!
//! `Set Variable NAME == value` inputs define `<<NAME>>`; later definitions
//! replace earlier ones. Variables defined inside a `Define Event == X`
//! block apply only when event X is selected and take precedence over
//! `Set Variable` definitions of the same name. `<<~s1~>>`-style tokens
//! are answered by the context.

use regex::Regex;
use std::collections::HashMap;
use tmf_core::{Context, ControlFile, Input, ParseError, ScopeKind};

/// One `Define Event` block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventDefinition {
    pub name: String,
    /// `Set Variable` definitions, in file order.
    pub variables: Vec<(String, String)>,
    /// `BC Event Source == TOKEN | VALUE` substitutions, in file order.
    pub sources: Vec<(String, String)>,
}

/// Every `Define Event` block found in a model, keyed case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct EventDefinitions {
    events: Vec<EventDefinition>,
    index: HashMap<String, usize>,
}

fn event_name(input: &Input) -> Option<&str> {
    input
        .scope()
        .iter()
        .find(|s| s.kind == ScopeKind::EventVariable && !s.negated)
        .and_then(|s| s.tokens.first())
        .map(String::as_str)
}

/// `TOKEN | VALUE` split of a `BC Event Source` value.
fn source_pair(rhs: &str) -> Option<(String, String)> {
    let (token, value) = rhs.split_once('|')?;
    let token = token.trim();
    (!token.is_empty()).then(|| (token.to_string(), value.trim().to_string()))
}

impl EventDefinitions {
    /// Collect definitions from `inputs`.
    pub fn from_inputs<'a>(inputs: impl IntoIterator<Item = &'a Input>) -> EventDefinitions {
        let mut defs = EventDefinitions::default();
        for input in inputs {
            let Some(name) = event_name(input) else {
                continue;
            };
            let rhs = input.rhs().unwrap_or("");
            if let Some(var) = input.variable_name() {
                defs.entry(name).variables.push((var.to_string(), rhs.to_string()));
            } else if input.lhs().eq_ignore_ascii_case("bc event source") {
                match source_pair(rhs) {
                    Some(pair) => defs.entry(name).sources.push(pair),
                    None => tracing::warn!(
                        file = %input.owner().display(),
                        line = input.command().prov.line,
                        "BC Event Source needs 'TOKEN | VALUE'"
                    ),
                }
            }
        }
        defs
    }

    /// Collect definitions from a control file and the event file it
    /// references.
    pub fn collect(cf: &ControlFile) -> Result<EventDefinitions, ParseError> {
        let mut inputs: Vec<Input> = cf.inputs().to_vec();
        if let Some(tef) = cf.tef()? {
            inputs.extend(tef.inputs().iter().cloned());
        }
        let defs = EventDefinitions::from_inputs(&inputs);
        tracing::debug!(events = defs.len(), "collected event definitions");
        Ok(defs)
    }

    fn entry(&mut self, name: &str) -> &mut EventDefinition {
        let key = name.to_ascii_lowercase();
        let i = match self.index.get(&key) {
            Some(i) => *i,
            None => {
                self.events.push(EventDefinition {
                    name: name.to_string(),
                    ..EventDefinition::default()
                });
                self.index.insert(key, self.events.len() - 1);
                self.events.len() - 1
            }
        };
        &mut self.events[i]
    }

    pub fn get(&self, name: &str) -> Option<&EventDefinition> {
        self.index
            .get(&name.to_ascii_lowercase())
            .map(|i| &self.events[*i])
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventDefinition> {
        self.events.iter()
    }
}

/// Case-insensitive ordered name/value pairs.
#[derive(Debug, Clone, Default)]
struct Entries {
    pairs: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl Entries {
    fn set(&mut self, name: &str, value: &str) {
        let key = name.to_ascii_lowercase();
        match self.index.get(&key) {
            Some(i) => self.pairs[*i].1 = value.to_string(),
            None => {
                self.pairs.push((name.to_string(), value.to_string()));
                self.index.insert(key, self.pairs.len() - 1);
            }
        }
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.index
            .get(&name.to_ascii_lowercase())
            .map(|i| self.pairs[*i].1.as_str())
    }
}

/// Variables visible while resolving one part of a model.
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    context: Context,
    set: Entries,
    event: Entries,
    /// Literal `BC Event Source` replacements (token, value).
    sources: Vec<(String, String)>,
    legacy_token: Option<String>,
    legacy_value: Option<String>,
}

impl VariableTable {
    /// A table for `context`, seeded with the variables and sources of
    /// every selected event.
    pub fn new(context: &Context, events: &EventDefinitions) -> VariableTable {
        let mut table = VariableTable {
            context: context.clone(),
            ..VariableTable::default()
        };
        for name in context.events() {
            match events.get(&name) {
                Some(def) => {
                    for (var, value) in &def.variables {
                        table.event.set(var, value);
                    }
                    table.sources.extend(def.sources.iter().cloned());
                }
                None => tracing::debug!(event = %name, "no definition for selected event"),
            }
        }
        table
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Record a `Set Variable` definition.
    pub fn set(&mut self, name: &str, value: &str) {
        self.set.set(name, value);
    }

    /// Value of `<<name>>`: a scenario/event wildcard, then event
    /// variables, then `Set Variable` definitions.
    pub fn get(&self, name: &str) -> Option<String> {
        if let Some(v) = self.context.wildcard_value(name) {
            return Some(v.to_string());
        }
        self.event
            .get(name)
            .or_else(|| self.set.get(name))
            .map(str::to_string)
    }

    /// Replace every known `<<TOKEN>>`; returns the text and the tokens
    /// that stayed unresolved.
    pub fn substitute(&self, text: &str) -> (String, Vec<String>) {
        tmf_core::patterns::substitute(text, &|name| self.get(name))
    }

    /// Legacy `BC Event Text` (the token) / `BC Event Name` (its value).
    pub fn set_legacy_event_text(&mut self, token: &str) {
        self.legacy_token = Some(token.to_string());
    }

    pub fn set_legacy_event_name(&mut self, value: &str) {
        self.legacy_value = Some(value.to_string());
    }

    fn literal_pairs(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<(&str, &str)> = self
            .sources
            .iter()
            .map(|(t, v)| (t.as_str(), v.as_str()))
            .collect();
        if let (Some(t), Some(v)) = (&self.legacy_token, &self.legacy_value) {
            pairs.push((t.as_str(), v.as_str()));
        }
        pairs
    }

    /// Apply the event source replacements to a database file name,
    /// ignoring case.
    pub fn replace_sources(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (token, value) in self.literal_pairs() {
            let Ok(re) = Regex::new(&format!("(?i){}", regex::escape(token))) else {
                continue;
            };
            out = re.replace_all(&out, regex::NoExpand(value)).into_owned();
        }
        out
    }

    /// Names of the `Set Variable` definitions in order.
    pub fn names(&self) -> Vec<&str> {
        self.set.pairs.iter().map(|(n, _)| n.as_str()).collect()
    }
}
