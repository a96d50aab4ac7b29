use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::db;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupSection {
    Entry,
    Printer,
}

impl SetupSection {
    pub const ALL: [SetupSection; 2] = [SetupSection::Entry, SetupSection::Printer];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "entry" => Some(Self::Entry),
            "printer" => Some(Self::Printer),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Printer => "printer",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Entry => "setup.entry",
            Self::Printer => "setup.printer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntrySettings {
    pub page_size: usize,
    pub show_more_increment: usize,
    pub autosave_delay_ms: u64,
    pub default_component_cutoff: u32,
    pub default_exam_cutoff: u32,
}

impl Default for EntrySettings {
    fn default() -> Self {
        Self {
            page_size: 10,
            show_more_increment: 10,
            autosave_delay_ms: 600,
            default_component_cutoff: 30,
            default_exam_cutoff: 70,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterSettings {
    pub school_name: String,
    pub signature_label: String,
    pub show_generated_at: bool,
}

impl Default for PrinterSettings {
    fn default() -> Self {
        Self {
            school_name: String::new(),
            signature_label: "Subject teacher's signature".to_string(),
            show_generated_at: true,
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    let v = match section {
        SetupSection::Entry => serde_json::to_value(EntrySettings::default()),
        SetupSection::Printer => serde_json::to_value(PrinterSettings::default()),
    };
    v.unwrap_or_else(|_| json!({}))
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.chars().count() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

pub fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::Entry => match k.as_str() {
                "pageSize" | "showMoreIncrement" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 200)?));
                }
                "autosaveDelayMs" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 10_000)?));
                }
                "defaultComponentCutoff" | "defaultExamCutoff" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 999)?));
                }
                _ => return Err(format!("unknown entry field: {}", k)),
            },
            SetupSection::Printer => match k.as_str() {
                "schoolName" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 120)?));
                }
                "signatureLabel" => {
                    let s = parse_string_max(v, k, 60)?;
                    if s.is_empty() {
                        return Err(format!("{} must not be empty", k));
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                "showGeneratedAt" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown printer field: {}", k)),
            },
        }
    }
    Ok(())
}

pub fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults field by field.
            for (k, v) in saved_obj {
                let mut one = Map::new();
                one.insert(k.clone(), v.clone());
                if let Err(e) = merge_section_patch(section, &mut current, &one) {
                    tracing::warn!(section = section.name(), error = %e, "ignoring saved setting");
                }
            }
        }
    }
    Ok(current)
}

pub fn save_section(
    conn: &rusqlite::Connection,
    section: SetupSection,
    value: &Value,
) -> anyhow::Result<()> {
    db::settings_set_json(conn, section.key(), value)
}

/// Typed settings for a session; defaults when no workspace is selected.
pub fn load_entry(conn: Option<&rusqlite::Connection>) -> anyhow::Result<EntrySettings> {
    let Some(conn) = conn else {
        return Ok(EntrySettings::default());
    };
    Ok(serde_json::from_value(load_section(conn, SetupSection::Entry)?)?)
}

pub fn load_printer(conn: Option<&rusqlite::Connection>) -> anyhow::Result<PrinterSettings> {
    let Some(conn) = conn else {
        return Ok(PrinterSettings::default());
    };
    Ok(serde_json::from_value(load_section(conn, SetupSection::Printer)?)?)
}
