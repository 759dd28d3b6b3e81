//! Lookup filters and the exactly-one resolution policy.

use std::fmt;

use regex::Regex;
use serde::Serialize;

use crate::error::RelayError;

/// Backend-side filter term, serialized the way the compute API expects
/// (`[{"Name": "...", "Values": [...]}]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Filter {
    pub name: String,
    pub values: Vec<String>,
}

impl Filter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: vec![value.into()],
        }
    }
}

/// In-process predicate applied to candidate names after the backend query.
#[derive(Debug, Clone)]
pub enum Refinement {
    NameEquals(String),
    NameMatches(Regex),
}

impl Refinement {
    fn accepts(&self, name: Option<&str>) -> bool {
        match (self, name) {
            (Refinement::NameEquals(expected), Some(name)) => name == expected,
            (Refinement::NameMatches(pattern), Some(name)) => pattern.is_match(name),
            (_, None) => false,
        }
    }
}

/// Describes what a resolver is looking for: the entity kind, the backend
/// filter terms, and an optional in-process refinement.
#[derive(Debug, Clone)]
pub struct LookupFilter {
    entity: &'static str,
    terms: Vec<Filter>,
    refinement: Option<Refinement>,
}

impl LookupFilter {
    pub fn new(entity: &'static str) -> Self {
        Self {
            entity,
            terms: Vec::new(),
            refinement: None,
        }
    }

    pub fn with_term(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.terms.push(Filter::new(name, value));
        self
    }

    pub fn refined_by(mut self, refinement: Refinement) -> Self {
        self.refinement = Some(refinement);
        self
    }

    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn terms(&self) -> &[Filter] {
        &self.terms
    }

    /// True if a backend match also passes the in-process refinement.
    pub fn accepts(&self, name: Option<&str>) -> bool {
        self.refinement
            .as_ref()
            .is_none_or(|refinement| refinement.accepts(name))
    }
}

impl fmt::Display for LookupFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self
            .terms
            .iter()
            .map(|term| format!("{}={}", term.name, term.values.join(",")))
            .collect();
        match &self.refinement {
            Some(Refinement::NameEquals(name)) => parts.push(format!("name={name}")),
            Some(Refinement::NameMatches(pattern)) => parts.push(format!("name~{pattern}")),
            None => {}
        }
        if parts.is_empty() {
            write!(f, "[any]")
        } else {
            write!(f, "[{}]", parts.join(" "))
        }
    }
}

/// Reduce candidates to the single match or fail.
///
/// Zero candidates is `NotFound`, more than one is `Ambiguous`. There is no
/// tie-break.
pub fn exactly_one<T>(filter: &LookupFilter, mut candidates: Vec<T>) -> Result<T, RelayError> {
    match candidates.len() {
        0 => Err(RelayError::not_found(filter)),
        1 => Ok(candidates.remove(0)),
        count => Err(RelayError::ambiguous(filter, count)),
    }
}
