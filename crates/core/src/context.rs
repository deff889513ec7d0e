//! Resolution context: the concrete scenario and event selection.
//!
//! A context is normalised from batch-style flags (`-s1 D02 -e1 Q100`) or
//! from explicit lists. Selections are keyed by slot number so the order
//! the flags were given in never matters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    scenarios: BTreeMap<u32, String>,
    events: BTreeMap<u32, String>,
}

enum Flag {
    Scenario(Option<u32>),
    Event(Option<u32>),
}

fn parse_flag(arg: &str) -> Option<Flag> {
    let body = arg.strip_prefix('-').unwrap_or(arg);
    let mut chars = body.chars();
    let head = chars.next()?.to_ascii_lowercase();
    let rest: String = chars.collect();
    let slot = if rest.is_empty() {
        None
    } else {
        Some(rest.parse::<u32>().ok()?)
    };
    match head {
        's' => Some(Flag::Scenario(slot)),
        'e' => Some(Flag::Event(slot)),
        _ => None,
    }
}

fn next_free(map: &BTreeMap<u32, String>) -> u32 {
    (1..).find(|n| !map.contains_key(n)).unwrap_or(1)
}

impl Context {
    /// Parse batch-style flags. Unknown flags (and their values) are ignored.
    pub fn parse(args: &str) -> Context {
        let words: Vec<&str> = args.split_whitespace().collect();
        Context::from_args(&words)
    }

    /// Parse an already-split argument list.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Context {
        let mut ctx = Context::default();
        let mut i = 0;
        while i < args.len() {
            let arg = args[i].as_ref();
            let flag = if arg.starts_with('-') {
                parse_flag(arg)
            } else {
                None
            };
            let value = args.get(i + 1).filter(|v| !v.as_ref().starts_with('-'));
            match (flag, value) {
                (Some(Flag::Scenario(slot)), Some(value)) => {
                    let slot = slot.unwrap_or_else(|| next_free(&ctx.scenarios));
                    ctx.scenarios.insert(slot, value.as_ref().to_string());
                    i += 2;
                }
                (Some(Flag::Event(slot)), Some(value)) => {
                    let slot = slot.unwrap_or_else(|| next_free(&ctx.events));
                    ctx.events.insert(slot, value.as_ref().to_string());
                    i += 2;
                }
                (Some(_), None) => {
                    tracing::warn!(flag = arg, "context flag has no value");
                    i += 1;
                }
                _ => {
                    if arg.starts_with('-') {
                        tracing::warn!(flag = arg, "ignoring unknown context flag");
                    }
                    i += 1;
                }
            }
        }
        ctx
    }

    /// Build a context from ordered lists; list position `n` becomes slot
    /// `n + 1`.
    pub fn from_lists(scenarios: &[String], events: &[String]) -> Context {
        Context {
            scenarios: (1u32..).zip(scenarios.iter().cloned()).collect(),
            events: (1u32..).zip(events.iter().cloned()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty() && self.events.is_empty()
    }

    /// Selected scenario names in slot order.
    pub fn scenarios(&self) -> Vec<String> {
        self.scenarios.values().cloned().collect()
    }

    /// Selected event names in slot order.
    pub fn events(&self) -> Vec<String> {
        self.events.values().cloned().collect()
    }

    pub fn scenario(&self, slot: u32) -> Option<&str> {
        self.scenarios.get(&slot).map(String::as_str)
    }

    pub fn event(&self, slot: u32) -> Option<&str> {
        self.events.get(&slot).map(String::as_str)
    }

    /// `(slot, name)` pairs for every selected event.
    pub fn event_slots(&self) -> impl Iterator<Item = (u32, &str)> {
        self.events.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn scenario_slots(&self) -> impl Iterator<Item = (u32, &str)> {
        self.scenarios.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Flat argument list (`-s1 D02 -e1 Q100`) as passed to the solver.
    pub fn to_args(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (slot, name) in &self.scenarios {
            out.push(format!("-s{}", slot));
            out.push(name.clone());
        }
        for (slot, name) in &self.events {
            out.push(format!("-e{}", slot));
            out.push(name.clone());
        }
        out
    }

    /// Value for a scenario/event wildcard body such as `~s1~` or `~e~`
    /// (a missing slot number means slot 1).
    pub fn wildcard_value(&self, body: &str) -> Option<&str> {
        let inner = body.strip_prefix('~')?.strip_suffix('~')?;
        let mut chars = inner.chars();
        let head = chars.next()?.to_ascii_lowercase();
        let rest: String = chars.collect();
        let slot = if rest.is_empty() {
            1
        } else {
            rest.parse::<u32>().ok()?
        };
        match head {
            's' => self.scenario(slot),
            'e' => self.event(slot),
            _ => None,
        }
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_args().join(" "))
    }
}
