use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Reserved score key for the final exam.
pub const EXAM_KEY: &str = "exam";

/// Scale used for the exam when no CA components are in play.
pub const EXAM_ONLY_SCALE: u32 = 100;

pub const MAX_LABEL_CHARS: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("cutoff must be a non-negative integer")]
    InvalidCutoff,
    #[error("component label must be 1 to 40 characters")]
    InvalidLabel,
    #[error("unknown component: {0}")]
    UnknownComponent(String),
    #[error("at least one CA component is required while CA is enabled")]
    LastComponent,
}

impl SchemaError {
    pub fn kind(&self) -> &'static str {
        match self {
            SchemaError::InvalidCutoff => "invalid_cutoff",
            SchemaError::InvalidLabel => "invalid_label",
            SchemaError::UnknownComponent(_) => "unknown_component",
            SchemaError::LastComponent => "last_component",
        }
    }
}

/// Address of one score cell within a student's record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScoreKey {
    Exam,
    Component(String),
}

impl ScoreKey {
    pub fn as_str(&self) -> &str {
        match self {
            ScoreKey::Exam => EXAM_KEY,
            ScoreKey::Component(id) => id.as_str(),
        }
    }
}

impl fmt::Display for ScoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ScoreKey {
    fn from(s: &str) -> Self {
        let t = s.trim();
        if t.eq_ignore_ascii_case(EXAM_KEY) {
            ScoreKey::Exam
        } else {
            ScoreKey::Component(t.to_string())
        }
    }
}

impl Serialize for ScoreKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ScoreKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(ScoreKey::from(s.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VisibleColumns {
    #[default]
    All,
    ExamOnly,
    CaOnly,
}

impl VisibleColumns {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Some(Self::All),
            "examonly" | "exam_only" | "exam" => Some(Self::ExamOnly),
            "caonly" | "ca_only" | "ca" => Some(Self::CaOnly),
            _ => None,
        }
    }

    pub fn shows_ca(self) -> bool {
        self != VisibleColumns::ExamOnly
    }

    pub fn shows_exam(self) -> bool {
        self != VisibleColumns::CaOnly
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub id: String,
    pub label: String,
    pub cutoff: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentSchema {
    pub components: Vec<Component>,
    pub exam_cutoff: u32,
    pub normalize_to_hundred: bool,
    pub ca_enabled: bool,
    #[serde(default)]
    pub visible_columns: VisibleColumns,
    /// Cutoff given to components appended by `add_component`.
    #[serde(default = "default_component_cutoff", skip_serializing)]
    pub default_component_cutoff: u32,
}

fn default_component_cutoff() -> u32 {
    30
}

impl AssessmentSchema {
    /// Exam-only schema with one dormant CA component, ready to be switched on.
    pub fn with_defaults(default_component_cutoff: u32, exam_cutoff: u32) -> Self {
        let mut schema = Self {
            components: Vec::new(),
            exam_cutoff,
            normalize_to_hundred: false,
            ca_enabled: false,
            visible_columns: VisibleColumns::All,
            default_component_cutoff,
        };
        schema.push_component("CA1".to_string());
        schema
    }

    pub fn total_cutoff(&self) -> u32 {
        if !self.ca_enabled {
            return EXAM_ONLY_SCALE;
        }
        self.components
            .iter()
            .map(|c| c.cutoff)
            .fold(self.exam_cutoff, u32::saturating_add)
    }

    pub fn component(&self, id: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.id == id)
    }

    /// Upper bound for a cell, or `None` when the key is not part of the schema.
    pub fn cutoff_for(&self, key: &ScoreKey) -> Option<u32> {
        match key {
            ScoreKey::Exam if self.ca_enabled => Some(self.exam_cutoff),
            ScoreKey::Exam => Some(EXAM_ONLY_SCALE),
            ScoreKey::Component(id) => self.component(id).map(|c| c.cutoff),
        }
    }

    /// Keys that can currently take entries, in display order.
    pub fn writable_keys(&self) -> Vec<ScoreKey> {
        let mut keys = Vec::with_capacity(self.components.len() + 1);
        if self.ca_enabled {
            keys.extend(
                self.components
                    .iter()
                    .map(|c| ScoreKey::Component(c.id.clone())),
            );
        }
        keys.push(ScoreKey::Exam);
        keys
    }

    pub fn is_writable(&self, key: &ScoreKey) -> bool {
        match key {
            ScoreKey::Exam => true,
            ScoreKey::Component(id) => self.ca_enabled && self.component(id).is_some(),
        }
    }

    pub fn add_component(&mut self, label: &str) -> Result<String, SchemaError> {
        let label = label.trim();
        if label.chars().count() > MAX_LABEL_CHARS {
            return Err(SchemaError::InvalidLabel);
        }
        let label = if label.is_empty() {
            format!("CA{}", self.components.len() + 1)
        } else {
            label.to_string()
        };
        Ok(self.push_component(label))
    }

    fn push_component(&mut self, label: String) -> String {
        let id = Uuid::new_v4().to_string();
        self.components.push(Component {
            id: id.clone(),
            label,
            cutoff: self.default_component_cutoff,
        });
        id
    }

    pub fn remove_component(&mut self, id: &str) -> Result<Component, SchemaError> {
        let Some(pos) = self.components.iter().position(|c| c.id == id) else {
            return Err(SchemaError::UnknownComponent(id.to_string()));
        };
        if self.ca_enabled && self.components.len() == 1 {
            return Err(SchemaError::LastComponent);
        }
        Ok(self.components.remove(pos))
    }

    pub fn rename_component(&mut self, id: &str, label: &str) -> Result<(), SchemaError> {
        let label = label.trim();
        if label.is_empty() || label.chars().count() > MAX_LABEL_CHARS {
            return Err(SchemaError::InvalidLabel);
        }
        let Some(c) = self.components.iter_mut().find(|c| c.id == id) else {
            return Err(SchemaError::UnknownComponent(id.to_string()));
        };
        c.label = label.to_string();
        Ok(())
    }

    pub fn set_cutoff(&mut self, key: &ScoreKey, value: i64) -> Result<(), SchemaError> {
        let value = u32::try_from(value).map_err(|_| SchemaError::InvalidCutoff)?;
        match key {
            ScoreKey::Exam => self.exam_cutoff = value,
            ScoreKey::Component(id) => {
                let Some(c) = self.components.iter_mut().find(|c| &c.id == id) else {
                    return Err(SchemaError::UnknownComponent(id.clone()));
                };
                c.cutoff = value;
            }
        }
        Ok(())
    }

    pub fn set_ca_enabled(&mut self, enabled: bool) {
        self.ca_enabled = enabled;
        if enabled && self.components.is_empty() {
            self.push_component("CA1".to_string());
        }
    }

    pub fn set_normalize(&mut self, enabled: bool) {
        self.normalize_to_hundred = enabled;
    }

    pub fn set_visible_columns(&mut self, columns: VisibleColumns) {
        self.visible_columns = columns;
    }

    /// Checks a host-supplied schema before a session adopts it.
    pub fn check(&self) -> Result<(), SchemaError> {
        if self.ca_enabled && self.components.is_empty() {
            return Err(SchemaError::LastComponent);
        }
        let mut seen = std::collections::HashSet::new();
        for c in &self.components {
            if c.id.eq_ignore_ascii_case(EXAM_KEY) || c.id.trim().is_empty() || !seen.insert(&c.id) {
                return Err(SchemaError::UnknownComponent(c.id.clone()));
            }
            if c.label.chars().count() > MAX_LABEL_CHARS {
                return Err(SchemaError::InvalidLabel);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentInit {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub cutoff: Option<i64>,
}

/// Host-supplied starting point for a new session's schema.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaInit {
    #[serde(default)]
    pub components: Vec<ComponentInit>,
    #[serde(default)]
    pub exam_cutoff: Option<i64>,
    #[serde(default)]
    pub normalize_to_hundred: bool,
    #[serde(default)]
    pub ca_enabled: bool,
    #[serde(default)]
    pub visible_columns: VisibleColumns,
}

impl AssessmentSchema {
    pub fn from_init(
        init: SchemaInit,
        default_component_cutoff: u32,
        default_exam_cutoff: u32,
    ) -> Result<Self, SchemaError> {
        let mut schema = Self::with_defaults(default_component_cutoff, default_exam_cutoff);
        if !init.components.is_empty() {
            schema.components.clear();
            for c in &init.components {
                let id = schema.add_component(&c.label)?;
                if let Some(cutoff) = c.cutoff {
                    schema.set_cutoff(&ScoreKey::Component(id), cutoff)?;
                }
            }
        }
        if let Some(exam) = init.exam_cutoff {
            schema.set_cutoff(&ScoreKey::Exam, exam)?;
        }
        schema.set_ca_enabled(init.ca_enabled);
        schema.set_normalize(init.normalize_to_hundred);
        schema.set_visible_columns(init.visible_columns);
        Ok(schema)
    }
}

/// Parses a cutoff from a wire value: integers, or strings holding one.
pub fn parse_cutoff(raw: &serde_json::Value) -> Result<i64, SchemaError> {
    if let Some(n) = raw.as_i64() {
        return Ok(n);
    }
    if let Some(s) = raw.as_str() {
        return s.trim().parse::<i64>().map_err(|_| SchemaError::InvalidCutoff);
    }
    Err(SchemaError::InvalidCutoff)
}
