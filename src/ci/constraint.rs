//! Step execution constraints.
//!
//! Each dimension is an include/exclude pair of glob patterns. An empty pair
//! places no restriction on its dimension; the step runs only when every
//! dimension passes.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::HashMap;

use crate::utils::glob_match;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "ConstraintDef")]
pub struct Constraint {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Constraint {
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    pub fn matches(&self, value: &str) -> bool {
        if self.excludes(value) {
            return false;
        }
        self.include.is_empty() || self.includes(value)
    }

    pub fn includes(&self, value: &str) -> bool {
        self.include.iter().any(|pattern| glob_match(pattern, value))
    }

    pub fn excludes(&self, value: &str) -> bool {
        self.exclude.iter().any(|pattern| glob_match(pattern, value))
    }
}

/// Accepts `branch: master`, `branch: [master, dev]` or
/// `branch: { include: ..., exclude: ... }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ConstraintDef {
    Single(String),
    List(Vec<String>),
    Detailed {
        #[serde(default)]
        include: StringOrList,
        #[serde(default)]
        exclude: StringOrList,
    },
}

#[derive(Deserialize, Default)]
#[serde(untagged)]
enum StringOrList {
    #[default]
    None,
    Single(String),
    List(Vec<String>),
}

impl From<StringOrList> for Vec<String> {
    fn from(value: StringOrList) -> Self {
        match value {
            StringOrList::None => Vec::new(),
            StringOrList::Single(s) => vec![s],
            StringOrList::List(list) => list,
        }
    }
}

impl From<ConstraintDef> for Constraint {
    fn from(def: ConstraintDef) -> Self {
        match def {
            ConstraintDef::Single(s) => Constraint {
                include: vec![s],
                exclude: Vec::new(),
            },
            ConstraintDef::List(include) => Constraint {
                include,
                exclude: Vec::new(),
            },
            ConstraintDef::Detailed { include, exclude } => Constraint {
                include: include.into(),
                exclude: exclude.into(),
            },
        }
    }
}

/// Matrix filter: every include pair must be present in the job matrix, and
/// the step is rejected when all exclude pairs are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "HashMap<String, Value>")]
pub struct ConstraintMap {
    pub include: HashMap<String, String>,
    pub exclude: HashMap<String, String>,
}

impl ConstraintMap {
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    pub fn matches(&self, params: &HashMap<String, String>) -> bool {
        if self.is_empty() {
            return true;
        }

        if !self.exclude.is_empty() {
            let excluded = self
                .exclude
                .iter()
                .all(|(key, val)| params.get(key) == Some(val));
            if excluded {
                return false;
            }
        }

        self.include
            .iter()
            .all(|(key, val)| params.get(key) == Some(val))
    }
}

impl TryFrom<HashMap<String, Value>> for ConstraintMap {
    type Error = String;

    fn try_from(map: HashMap<String, Value>) -> std::result::Result<Self, Self::Error> {
        let detailed = map.keys().any(|k| k == "include" || k == "exclude");
        if !detailed {
            return Ok(ConstraintMap {
                include: stringify_map(map),
                exclude: HashMap::new(),
            });
        }

        let mut constraint = ConstraintMap::default();
        for (key, value) in map {
            if key != "include" && key != "exclude" {
                return Err(format!(
                    "matrix constraint mixes '{}' with include/exclude",
                    key
                ));
            }
            let pairs: HashMap<String, Value> = serde_yaml::from_value(value)
                .map_err(|e| format!("matrix {} must be a map of values: {}", key, e))?;
            if key == "include" {
                constraint.include = stringify_map(pairs);
            } else {
                constraint.exclude = stringify_map(pairs);
            }
        }
        Ok(constraint)
    }
}

fn stringify_map(map: HashMap<String, Value>) -> HashMap<String, String> {
    map.into_iter()
        .map(|(k, v)| (k, scalar_to_string(&v)))
        .collect()
}

/// Renders a YAML scalar the way it was written.
pub(crate) fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// The `when` block of a step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Constraints {
    pub platform: Constraint,
    /// Deploy target.
    pub environment: Constraint,
    pub event: Constraint,
    pub branch: Constraint,
    pub status: Constraint,
    pub matrix: ConstraintMap,
}

impl Constraints {
    pub fn matches(
        &self,
        platform: &str,
        deploy: &str,
        event: &str,
        branch: &str,
        status: &str,
        matrix: &HashMap<String, String>,
    ) -> bool {
        self.platform.matches(platform)
            && self.environment.matches(deploy)
            && self.event.matches(event)
            && self.branch.matches(branch)
            && self.status.matches(status)
            && self.matrix.matches(matrix)
    }
}
