use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::schema::{AssessmentSchema, ScoreKey};

/// Entered values for one student. A missing key is "no mark", not zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreRecord {
    values: BTreeMap<ScoreKey, u32>,
}

impl ScoreRecord {
    pub fn get(&self, key: &ScoreKey) -> Option<u32> {
        self.values.get(key).copied()
    }

    pub fn set(&mut self, key: ScoreKey, value: u32) -> Option<u32> {
        self.values.insert(key, value)
    }

    pub fn clear(&mut self, key: &ScoreKey) -> Option<u32> {
        self.values.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalMark {
    Unentered,
    Mark(u32),
}

impl FinalMark {
    pub fn value(self) -> Option<u32> {
        match self {
            FinalMark::Unentered => None,
            FinalMark::Mark(v) => Some(v),
        }
    }
}

/// Rendered in place of statistics when nothing has been entered.
pub const NO_DATA: &str = "-";

/// `round(min(total * 100 / total_cutoff, 100))` with ties rounding up.
///
/// Integer form of `floor(100 * total / cutoff + 0.5)` so exact halves never
/// drift below the tie because of float error.
pub fn normalize_to_hundred(total: u64, total_cutoff: u64) -> u32 {
    debug_assert!(total_cutoff > 0);
    let rounded = (200 * total + total_cutoff) / (2 * total_cutoff);
    rounded.min(100) as u32
}

pub fn compute_final(schema: &AssessmentSchema, record: Option<&ScoreRecord>) -> FinalMark {
    let Some(record) = record else {
        return FinalMark::Unentered;
    };

    if !schema.ca_enabled {
        // Exam-only marks are already on the 100-point scale.
        return match record.get(&ScoreKey::Exam) {
            Some(v) => FinalMark::Mark(v),
            None => FinalMark::Unentered,
        };
    }

    let mut entered_any = false;
    let mut total: u64 = 0;
    for key in schema.writable_keys() {
        if let Some(v) = record.get(&key) {
            entered_any = true;
            total += u64::from(v);
        }
    }
    if !entered_any {
        return FinalMark::Unentered;
    }

    if schema.normalize_to_hundred {
        let cutoff = u64::from(schema.total_cutoff());
        if cutoff == 0 {
            return FinalMark::Unentered;
        }
        return FinalMark::Mark(normalize_to_hundred(total, cutoff));
    }
    FinalMark::Mark(u32::try_from(total).unwrap_or(u32::MAX))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterStats {
    pub entered_count: usize,
    pub mean: Option<f64>,
    pub max: Option<u32>,
    pub min: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterStatsDisplay {
    pub entered_count: String,
    pub mean: String,
    pub max: String,
    pub min: String,
}

impl RosterStats {
    pub fn display(&self) -> RosterStatsDisplay {
        RosterStatsDisplay {
            entered_count: self.entered_count.to_string(),
            mean: self
                .mean
                .map(|m| format!("{:.2}", m))
                .unwrap_or_else(|| NO_DATA.to_string()),
            max: self
                .max
                .map(|v| v.to_string())
                .unwrap_or_else(|| NO_DATA.to_string()),
            min: self
                .min
                .map(|v| v.to_string())
                .unwrap_or_else(|| NO_DATA.to_string()),
        }
    }
}

/// `sum / count` in hundredths, ties rounding up, in integers so the result
/// agrees with `normalize_to_hundred`.
pub fn mean_hundredths(sum: u64, count: u64) -> u64 {
    debug_assert!(count > 0);
    (200 * sum + count) / (2 * count)
}

pub fn aggregate<I>(finals: I) -> RosterStats
where
    I: IntoIterator<Item = FinalMark>,
{
    let mut entered_count: usize = 0;
    let mut sum: u64 = 0;
    let mut max: Option<u32> = None;
    let mut min: Option<u32> = None;

    for f in finals {
        let FinalMark::Mark(v) = f else {
            continue;
        };
        entered_count += 1;
        sum += u64::from(v);
        max = Some(max.map_or(v, |m| m.max(v)));
        min = Some(min.map_or(v, |m| m.min(v)));
    }

    let mean = if entered_count > 0 {
        Some(mean_hundredths(sum, entered_count as u64) as f64 / 100.0)
    } else {
        None
    };

    RosterStats {
        entered_count,
        mean,
        max,
        min,
    }
}
