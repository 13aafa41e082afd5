//! Decomposition of a control device command list into named state values.
//!
//! Each [`StatePattern`] is a regex with two named groups: `VAL`, the value of
//! the state, and a symbolic name for the state. The symbolic group must
//! enclose the whole matched text so it can be stripped from the command,
//! leaving a remainder for the next pattern.
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::descriptors::ValueType;
use crate::error::PatternError;

/// Name of the pseudo state holding the unmatched text of every command
pub const REMAINDER: &str = "remainder";

#[derive(Debug, Clone)]
pub struct StatePattern {
    name: String,
    regex: Regex,
}

impl StatePattern {
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let regex = Regex::new(pattern)?;
        let names: Vec<&str> = regex.capture_names().flatten().collect();
        if names.len() != 2 {
            return Err(PatternError::WrongGroupCount(pattern.to_string()));
        }
        if !names.contains(&"VAL") {
            return Err(PatternError::MissingValue(pattern.to_string()));
        }
        let name = names
            .iter()
            .find(|n| **n != "VAL")
            .map(|n| n.to_string())
            .ok_or_else(|| PatternError::WrongGroupCount(pattern.to_string()))?;
        if name.to_lowercase() == REMAINDER {
            return Err(PatternError::ReservedName(name));
        }
        Ok(Self { name, regex })
    }

    /// Symbolic name of the state value
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

/// Compile patterns, dropping exact duplicates. Two patterns sharing a symbolic
/// name is an error.
pub fn compile_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<StatePattern>, PatternError> {
    let mut compiled: Vec<StatePattern> = Vec::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        if compiled.iter().any(|p| p.as_str() == pattern) {
            continue;
        }
        let state = StatePattern::new(pattern)?;
        if compiled.iter().any(|p| p.name == state.name) {
            return Err(PatternError::DuplicateName(state.name));
        }
        compiled.push(state);
    }
    Ok(compiled)
}

/// Parsed values of one state, index aligned with the command list
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommandValues {
    Float(Vec<f64>),
    Text(Vec<String>),
}

impl CommandValues {
    pub fn len(&self) -> usize {
        match self {
            CommandValues::Float(v) => v.len(),
            CommandValues::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            CommandValues::Float(_) => ValueType::F64,
            CommandValues::Text(v) => {
                ValueType::Str(v.iter().map(|s| s.chars().count()).max().unwrap_or(0))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedState {
    /// None for the remainder
    pub pattern: Option<String>,
    pub values: CommandValues,
    /// Text matched by the symbolic group for each command
    pub cl_str: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub states: BTreeMap<String, ParsedState>,
    /// Recoverable problems met while parsing, for the caller to report or drop
    pub warnings: Vec<String>,
}

impl ParseOutcome {
    /// At least one named state besides the remainder was recovered
    pub fn is_success(&self) -> bool {
        self.states.keys().any(|k| k != REMAINDER)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Float(f64),
    Text(String),
}

impl Cell {
    fn parse(raw: &str) -> Option<Self> {
        if let Ok(v) = raw.trim().parse::<f64>() {
            return Some(Cell::Float(v));
        }
        let text = raw.trim();
        if text.is_empty() {
            None
        } else {
            Some(Cell::Text(text.to_string()))
        }
    }
}

/// Every cell present and of one kind. Vacuously true for an empty list.
fn is_homogeneous(cells: &[Option<Cell>]) -> bool {
    let mut kinds = cells.iter().map(|c| match c {
        Some(Cell::Float(_)) => Some(0u8),
        Some(Cell::Text(_)) => Some(1u8),
        None => None,
    });
    match kinds.next() {
        None => true,
        Some(None) => false,
        Some(first) => kinds.all(|k| k == first),
    }
}

struct WorkingState<'p> {
    pattern: &'p StatePattern,
    cells: Vec<Option<Cell>>,
    cl_str: Vec<Option<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandListParser {
    command_list: Vec<String>,
}

impl CommandListParser {
    pub fn new<S: Into<String>>(command_list: impl IntoIterator<Item = S>) -> Self {
        Self {
            command_list: command_list.into_iter().map(Into::into).collect(),
        }
    }

    pub fn command_list(&self) -> &[String] {
        &self.command_list
    }

    /// Apply the patterns in order, each to whatever text the previous ones left.
    ///
    /// A pattern only consumes text when it produced a value for every command
    /// and all values have one kind. States with gaps or mixed kinds are dropped
    /// with a warning. The remainder is dropped as soon as it contains an empty
    /// command, which also stops further patterns from being applied.
    pub fn apply_patterns(&self, patterns: &[StatePattern]) -> Result<ParseOutcome, PatternError> {
        let mut seen: Vec<&str> = Vec::new();
        for p in patterns {
            if seen.contains(&p.name()) {
                return Err(PatternError::DuplicateName(p.name.clone()));
            }
            seen.push(p.name());
        }

        let mut working: Vec<WorkingState> = patterns
            .iter()
            .map(|pattern| WorkingState {
                pattern,
                cells: Vec::new(),
                cl_str: Vec::new(),
            })
            .collect();
        let mut remainder: Option<Vec<String>> = Some(self.command_list.clone());

        if self.command_list.iter().any(|c| c.is_empty()) {
            remainder = None;
        } else {
            for state in working.iter_mut() {
                let Some(commands) = remainder.as_ref() else {
                    break;
                };
                let mut stripped_commands: Vec<Option<String>> = Vec::new();
                for command in commands {
                    match state.pattern.regex.captures(command) {
                        Some(caps) => {
                            let value = caps.name("VAL").map(|m| m.as_str()).unwrap_or_default();
                            let matched = caps
                                .name(&state.pattern.name)
                                .map(|m| m.as_str())
                                .unwrap_or_default();
                            state.cells.push(Cell::parse(value));
                            state.cl_str.push(Some(matched.to_string()));
                            let stripped = command.replace(matched, "").trim().to_string();
                            stripped_commands.push((!stripped.is_empty()).then_some(stripped));
                        }
                        None => {
                            state.cells.push(None);
                            state.cl_str.push(None);
                        }
                    }
                }
                if is_homogeneous(&state.cells) {
                    let replaced: Option<Vec<String>> = stripped_commands.into_iter().collect();
                    remainder = replaced;
                    if remainder.is_none() {
                        break;
                    }
                }
            }
        }

        let mut outcome = ParseOutcome::default();
        for state in working {
            let name = state.pattern.name.clone();
            if state.cells.is_empty() || state.cells.iter().any(Option::is_none) {
                outcome.warnings.push(format!(
                    "symbolic group ({name}) removed since some or all of the command list has None values"
                ));
                continue;
            }
            if !is_homogeneous(&state.cells) {
                outcome.warnings.push(format!(
                    "symbolic group ({name}) removed since all entries in the command list do NOT have the same type"
                ));
                continue;
            }
            let values = match state.cells.first() {
                Some(Some(Cell::Float(_))) => CommandValues::Float(
                    state
                        .cells
                        .iter()
                        .filter_map(|c| match c {
                            Some(Cell::Float(v)) => Some(*v),
                            _ => None,
                        })
                        .collect(),
                ),
                _ => CommandValues::Text(
                    state
                        .cells
                        .iter()
                        .filter_map(|c| match c {
                            Some(Cell::Text(v)) => Some(v.clone()),
                            _ => None,
                        })
                        .collect(),
                ),
            };
            outcome.states.insert(
                name,
                ParsedState {
                    pattern: Some(state.pattern.as_str().to_string()),
                    values,
                    cl_str: state.cl_str.into_iter().flatten().collect(),
                },
            );
        }
        match remainder {
            Some(commands) if !commands.is_empty() => {
                outcome.states.insert(
                    REMAINDER.to_string(),
                    ParsedState {
                        pattern: None,
                        values: CommandValues::Text(commands.clone()),
                        cl_str: commands,
                    },
                );
            }
            Some(_) => outcome.warnings.push(format!(
                "symbolic group ({REMAINDER}) removed since some or all of the command list has None values"
            )),
            None => (),
        }

        if !outcome.is_success() {
            outcome.states.clear();
        }
        Ok(outcome)
    }
}
