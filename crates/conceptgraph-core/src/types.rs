use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type NodeId = Uuid;
pub type EdgeId = Uuid;
pub type SnapshotId = Uuid;

/// Kind of entity a node represents. Collaborator output is free-form text,
/// so parsing is lenient and unknown kinds collapse to `Concept`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Concept,
    Entity,
    Process,
    Attribute,
}

impl Default for NodeType {
    fn default() -> Self {
        NodeType::Concept
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeType::Concept => "concept",
            NodeType::Entity => "entity",
            NodeType::Process => "process",
            NodeType::Attribute => "attribute",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for NodeType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "entity" => NodeType::Entity,
            "process" => NodeType::Process,
            "attribute" => NodeType::Attribute,
            _ => NodeType::Concept,
        })
    }
}

/// Typed attribute value. Extensible metadata stays checkable instead of
/// degrading into stringly-typed dictionaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Flag(bool),
    Number(f64),
    Text(String),
    List(Vec<AttributeValue>),
}

impl AttributeValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Text(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::Text(s)
    }
}

impl From<f64> for AttributeValue {
    fn from(n: f64) -> Self {
        AttributeValue::Number(n)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Flag(b)
    }
}

pub const DESCRIPTION_KEY: &str = "description";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub attributes: HashMap<String, AttributeValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Metadata {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            attributes: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn description(&self) -> Option<&str> {
        self.attributes.get(DESCRIPTION_KEY).and_then(|v| v.as_text())
    }

    pub fn set_description<S: Into<String>>(&mut self, description: S) {
        self.attributes
            .insert(DESCRIPTION_KEY.to_string(), AttributeValue::Text(description.into()));
        self.updated_at = Utc::now();
    }

    /// Copies attributes from `other` that are absent here. Existing values
    /// always win; merge never overwrites.
    pub fn absorb_absent(&mut self, other: &Metadata) {
        for (key, value) in &other.attributes {
            self.attributes
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        self.updated_at = Utc::now();
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::new()
    }
}

/// One entry in an entity's append-only merge history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRecord {
    pub timestamp: DateTime<Utc>,
    pub merged_label: String,
    pub reason: String,
}

impl MergeRecord {
    pub fn new<L: Into<String>, R: Into<String>>(merged_label: L, reason: R) -> Self {
        Self {
            timestamp: Utc::now(),
            merged_label: merged_label.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackSource {
    System,
    User,
}

impl fmt::Display for FeedbackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedbackSource::System => write!(f, "system"),
            FeedbackSource::User => write!(f, "user"),
        }
    }
}

/// Append-only feedback log entry. The payload stays schemaless because
/// feedback kinds range from expansion evaluations to free-form user notes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub timestamp: DateTime<Utc>,
    pub source: FeedbackSource,
    pub kind: String,
    pub payload: serde_json::Value,
}

pub const EXPANSION_EVALUATION_KIND: &str = "expansion_evaluation";

/// Quality measurements for one expansion iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionEvaluation {
    pub nodes_added: usize,
    pub edges_added: usize,
    pub edges_per_new_node: f64,
    pub density_change: f64,
    pub node_type_diversity: usize,
    pub edge_label_diversity: usize,
    pub iteration: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_type_parses_leniently() {
        assert_eq!("entity".parse::<NodeType>().unwrap(), NodeType::Entity);
        assert_eq!(" Process ".parse::<NodeType>().unwrap(), NodeType::Process);
        assert_eq!("whatever".parse::<NodeType>().unwrap(), NodeType::Concept);
        assert_eq!("".parse::<NodeType>().unwrap(), NodeType::Concept);
    }

    #[test]
    fn attribute_value_untagged_roundtrip() {
        let value = AttributeValue::List(vec![
            AttributeValue::Text("a".into()),
            AttributeValue::Number(2.0),
            AttributeValue::Flag(true),
        ]);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"["a",2.0,true]"#);
        let back: AttributeValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn absorb_absent_keeps_existing_values() {
        let mut a = Metadata::new();
        a.set_description("original");
        let mut b = Metadata::new();
        b.set_description("other");
        b.attributes.insert("extra".into(), AttributeValue::Flag(true));

        a.absorb_absent(&b);
        assert_eq!(a.description(), Some("original"));
        assert_eq!(a.attributes.get("extra"), Some(&AttributeValue::Flag(true)));
    }
}
