use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

use crate::autosave::{Autosave, AutosaveStatus};
use crate::calc::{self, FinalMark, RosterStats, ScoreRecord};
use crate::export::{self, PrintLayout};
use crate::roster::{self, Student, ViewState};
use crate::schema::{AssessmentSchema, Component, SchemaError, ScoreKey, VisibleColumns};
use crate::settings::{EntrySettings, PrinterSettings};
use crate::validate::{self, Validation, ValidationError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    #[serde(default)]
    pub exam_name: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub term: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

impl SessionMeta {
    /// True when the exam or class name is set, so saved snapshots can be
    /// matched back to this marks-entry flow.
    pub fn names_flow(&self) -> bool {
        let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        set(&self.exam_name) || set(&self.class_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub meta: SessionMeta,
    pub schema: AssessmentSchema,
    pub scores: BTreeMap<String, ScoreRecord>,
    pub taken_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpenError {
    #[error("duplicate student id in roster: {0}")]
    DuplicateStudent(String),
    #[error("student id must not be empty")]
    EmptyStudentId,
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    #[error("student not found: {0}")]
    UnknownStudent(String),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryOutcome {
    pub validation: Validation,
    pub value: Option<u32>,
    pub final_mark: FinalMark,
}

/// One marks-entry flow: schema, score records, roster and view state.
pub struct MarkSession {
    id: String,
    meta: SessionMeta,
    schema: AssessmentSchema,
    records: HashMap<String, ScoreRecord>,
    roster: Vec<Student>,
    view: ViewState,
    autosave: Option<Autosave>,
}

impl MarkSession {
    pub fn open(
        id: String,
        roster: Vec<Student>,
        schema: Option<AssessmentSchema>,
        meta: SessionMeta,
        settings: &EntrySettings,
        autosave: Option<Autosave>,
    ) -> Result<Self, OpenError> {
        let mut seen = HashSet::new();
        for s in &roster {
            if s.id.trim().is_empty() {
                return Err(OpenError::EmptyStudentId);
            }
            if !seen.insert(s.id.as_str()) {
                return Err(OpenError::DuplicateStudent(s.id.clone()));
            }
        }

        let schema = match schema {
            Some(mut s) => {
                s.default_component_cutoff = settings.default_component_cutoff;
                s.check()?;
                s
            }
            None => AssessmentSchema::with_defaults(
                settings.default_component_cutoff,
                settings.default_exam_cutoff,
            ),
        };

        tracing::info!(session_id = %id, students = roster.len(), "session opened");
        Ok(Self {
            id,
            meta,
            schema,
            records: HashMap::new(),
            roster,
            view: ViewState::new(settings.page_size, settings.show_more_increment),
            autosave,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn meta(&self) -> &SessionMeta {
        &self.meta
    }

    pub fn schema(&self) -> &AssessmentSchema {
        &self.schema
    }

    pub fn roster(&self) -> &[Student] {
        &self.roster
    }

    pub fn view_state(&self) -> &ViewState {
        &self.view
    }

    pub fn record(&self, student_id: &str) -> Option<&ScoreRecord> {
        self.records.get(student_id)
    }

    fn has_student(&self, student_id: &str) -> bool {
        self.roster.iter().any(|s| s.id == student_id)
    }

    // --- schema ---------------------------------------------------------

    pub fn add_component(&mut self, label: &str) -> Result<String, SchemaError> {
        let id = self.schema.add_component(label)?;
        self.touch();
        Ok(id)
    }

    pub fn remove_component(&mut self, id: &str) -> Result<Component, SchemaError> {
        let removed = self.schema.remove_component(id)?;
        let key = ScoreKey::Component(removed.id.clone());
        for rec in self.records.values_mut() {
            rec.clear(&key);
        }
        self.records.retain(|_, r| !r.is_empty());
        self.touch();
        Ok(removed)
    }

    pub fn rename_component(&mut self, id: &str, label: &str) -> Result<(), SchemaError> {
        self.schema.rename_component(id, label)?;
        self.touch();
        Ok(())
    }

    pub fn set_cutoff(&mut self, key: &ScoreKey, value: i64) -> Result<(), SchemaError> {
        self.schema.set_cutoff(key, value)?;
        self.touch();
        Ok(())
    }

    pub fn set_ca_enabled(&mut self, enabled: bool) {
        self.schema.set_ca_enabled(enabled);
        self.touch();
    }

    pub fn set_normalize(&mut self, enabled: bool) {
        self.schema.set_normalize(enabled);
        self.touch();
    }

    pub fn set_visible_columns(&mut self, columns: VisibleColumns) {
        self.schema.set_visible_columns(columns);
        self.touch();
    }

    // --- entries --------------------------------------------------------

    /// Runs `raw` through the validator; only an accepted value is stored.
    pub fn enter(
        &mut self,
        student_id: &str,
        key: &ScoreKey,
        raw: &str,
    ) -> Result<EntryOutcome, EntryError> {
        if !self.has_student(student_id) {
            return Err(EntryError::UnknownStudent(student_id.to_string()));
        }
        let max = match self.schema.cutoff_for(key) {
            Some(max) if self.schema.is_writable(key) => max,
            _ => return Err(ValidationError::NotEditable { key: key.clone() }.into()),
        };

        let validation = validate::validate(raw, max);
        match &validation {
            Validation::Accepted(v) => {
                let rec = self.records.entry(student_id.to_string()).or_default();
                rec.set(key.clone(), *v);
                tracing::debug!(session_id = %self.id, student_id, key = %key, value = v, "entry accepted");
                self.touch();
            }
            Validation::Rejected(e) => {
                tracing::debug!(session_id = %self.id, student_id, key = %key, error = %e, "entry rejected");
                return Err(e.clone().into());
            }
            Validation::Pending | Validation::Ignored => {}
        }

        let record = self.records.get(student_id);
        Ok(EntryOutcome {
            validation,
            value: record.and_then(|r| r.get(key)),
            final_mark: calc::compute_final(&self.schema, record),
        })
    }

    pub fn clear_entry(&mut self, student_id: &str, key: &ScoreKey) -> Result<Option<u32>, EntryError> {
        if !self.has_student(student_id) {
            return Err(EntryError::UnknownStudent(student_id.to_string()));
        }
        if !self.schema.is_writable(key) {
            return Err(ValidationError::NotEditable { key: key.clone() }.into());
        }
        let Some(rec) = self.records.get_mut(student_id) else {
            return Ok(None);
        };
        let previous = rec.clear(key);
        if rec.is_empty() {
            self.records.remove(student_id);
        }
        if previous.is_some() {
            self.touch();
        }
        Ok(previous)
    }

    pub fn final_for(&self, student_id: &str) -> FinalMark {
        calc::compute_final(&self.schema, self.records.get(student_id))
    }

    // --- roster view ----------------------------------------------------

    pub fn visible(&self) -> Vec<&Student> {
        self.view.apply(&self.roster)
    }

    pub fn match_count(&self) -> usize {
        roster::match_count(&self.roster, &self.view.search_term)
    }

    pub fn search(&mut self, term: &str) -> bool {
        self.view.set_search(term)
    }

    pub fn show_more(&mut self) {
        self.view.show_more();
    }

    /// Statistics over the visible subset only.
    pub fn visible_stats(&self) -> RosterStats {
        calc::aggregate(self.visible().into_iter().map(|s| self.final_for(&s.id)))
    }

    // --- export ---------------------------------------------------------

    pub fn csv(&self) -> anyhow::Result<String> {
        export::to_csv(&self.roster, &self.schema, &self.records)
    }

    pub fn csv_file_name(&self) -> String {
        export::csv_file_name(&self.meta)
    }

    pub fn print_layout(&self, printer: &PrinterSettings) -> PrintLayout {
        export::to_print_layout(&self.roster, &self.schema, &self.records, &self.meta, printer)
    }

    // --- persistence ----------------------------------------------------

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            meta: self.meta.clone(),
            schema: self.schema.clone(),
            scores: self
                .records
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            taken_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Adopts a saved schema and the scores of students still on the roster.
    pub fn restore(&mut self, snapshot: SessionSnapshot) -> Result<usize, SchemaError> {
        let mut schema = snapshot.schema;
        schema.default_component_cutoff = self.schema.default_component_cutoff;
        schema.check()?;
        self.schema = schema;
        self.records = snapshot
            .scores
            .into_iter()
            .filter(|(id, rec)| !rec.is_empty() && self.roster.iter().any(|s| &s.id == id))
            .collect();
        tracing::info!(session_id = %self.id, restored = self.records.len(), "session restored");
        Ok(self.records.len())
    }

    fn touch(&self) {
        if let Some(autosave) = &self.autosave {
            autosave.schedule(self.snapshot());
        }
    }

    pub fn autosave_status(&self) -> Option<AutosaveStatus> {
        self.autosave.as_ref().map(|a| a.status())
    }

    pub fn save_now(&self) -> Result<bool, String> {
        let Some(autosave) = &self.autosave else {
            return Ok(false);
        };
        autosave.flush(Some(self.snapshot()))?;
        Ok(true)
    }

    /// Discards any pending autosave and stops the worker.
    pub fn close(mut self) {
        if let Some(autosave) = self.autosave.take() {
            autosave.shutdown();
        }
        tracing::info!(session_id = %self.id, "session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(n: usize) -> Vec<Student> {
        (1..=n)
            .map(|i| Student {
                id: format!("s{}", i),
                name: format!("Student {:02}", i),
                admission_number: Some(format!("ADM{:03}", i)),
                gender: None,
                phone: None,
            })
            .collect()
    }

    fn open(n: usize) -> MarkSession {
        MarkSession::open(
            "t".into(),
            roster(n),
            None,
            SessionMeta::default(),
            &EntrySettings::default(),
            None,
        )
        .expect("open")
    }

    fn ca1(s: &MarkSession) -> ScoreKey {
        ScoreKey::Component(s.schema().components[0].id.clone())
    }

    #[test]
    fn exam_only_scenario() {
        let mut s = open(3);
        s.set_normalize(true);
        let out = s.enter("s1", &ScoreKey::Exam, "85").expect("enter");
        assert_eq!(out.validation, Validation::Accepted(85));
        assert_eq!(out.final_mark, FinalMark::Mark(85));
    }

    #[test]
    fn ca_entries_blocked_while_ca_disabled() {
        let mut s = open(1);
        let key = ca1(&s);
        let e = s.enter("s1", &key, "10").expect_err("not editable");
        assert_eq!(e, EntryError::Invalid(ValidationError::NotEditable { key }));
        assert!(s.record("s1").is_none());
    }

    #[test]
    fn out_of_range_keeps_previous_value() {
        let mut s = open(2);
        s.set_ca_enabled(true);
        let key = ca1(&s);
        s.enter("s1", &key, "20").expect("enter");
        let e = s.enter("s1", &key, "45").expect_err("rejected");
        assert_eq!(e.to_string(), "Marks must be between 0 and 30");
        assert_eq!(s.record("s1").and_then(|r| r.get(&key)), Some(20));

        s.enter("s2", &key, "45").expect_err("rejected");
        assert!(s.record("s2").is_none());
        assert_eq!(s.final_for("s2"), FinalMark::Unentered);
    }

    #[test]
    fn pending_and_ignored_do_not_touch_state() {
        let mut s = open(1);
        s.enter("s1", &ScoreKey::Exam, "40").expect("enter");
        let out = s.enter("s1", &ScoreKey::Exam, "").expect("pending");
        assert_eq!(out.validation, Validation::Pending);
        assert_eq!(out.value, Some(40));
        let out = s.enter("s1", &ScoreKey::Exam, "4x").expect("ignored");
        assert_eq!(out.validation, Validation::Ignored);
        assert_eq!(out.value, Some(40));
    }

    #[test]
    fn toggling_ca_preserves_entries() {
        let mut s = open(1);
        s.set_ca_enabled(true);
        let key = ca1(&s);
        s.enter("s1", &key, "25").expect("enter");
        s.enter("s1", &ScoreKey::Exam, "60").expect("enter");
        assert_eq!(s.final_for("s1"), FinalMark::Mark(85));

        s.set_ca_enabled(false);
        assert_eq!(s.final_for("s1"), FinalMark::Mark(60));
        assert_eq!(s.record("s1").and_then(|r| r.get(&key)), Some(25));

        s.set_ca_enabled(true);
        assert_eq!(s.final_for("s1"), FinalMark::Mark(85));
    }

    #[test]
    fn removing_component_drops_its_scores() {
        let mut s = open(1);
        s.set_ca_enabled(true);
        let first = ca1(&s);
        let second = s.add_component("Quiz").expect("add");
        s.enter("s1", &first, "10").expect("enter");
        s.remove_component(first.as_str()).expect("remove");
        assert!(s.record("s1").is_none());
        assert_eq!(
            s.remove_component(&second),
            Err(SchemaError::LastComponent)
        );
    }

    #[test]
    fn stats_follow_the_visible_subset() {
        let mut s = open(12);
        s.enter("s1", &ScoreKey::Exam, "80").expect("enter");
        s.enter("s2", &ScoreKey::Exam, "60").expect("enter");
        s.enter("s11", &ScoreKey::Exam, "10").expect("enter");

        let st = s.visible_stats();
        assert_eq!(st.entered_count, 2);
        assert_eq!(st.mean, Some(70.0));

        s.show_more();
        let st = s.visible_stats();
        assert_eq!(st.entered_count, 3);
        assert_eq!(st.min, Some(10));

        s.search("Student 02");
        let st = s.visible_stats();
        assert_eq!(st.entered_count, 1);
        assert_eq!(st.max, Some(60));

        s.search("nobody");
        assert_eq!(s.visible_stats().display().mean, "-");
    }

    #[test]
    fn duplicate_roster_ids_are_rejected() {
        let mut r = roster(2);
        r[1].id = "s1".into();
        let res = MarkSession::open(
            "t".into(),
            r,
            None,
            SessionMeta::default(),
            &EntrySettings::default(),
            None,
        );
        assert_eq!(res.err(), Some(OpenError::DuplicateStudent("s1".into())));
    }

    #[test]
    fn restore_keeps_only_roster_students() {
        let mut a = open(2);
        a.enter("s1", &ScoreKey::Exam, "55").expect("enter");
        a.enter("s2", &ScoreKey::Exam, "65").expect("enter");
        let snap = a.snapshot();

        let mut b = MarkSession::open(
            "u".into(),
            roster(1),
            None,
            SessionMeta::default(),
            &EntrySettings::default(),
            None,
        )
        .expect("open");
        assert_eq!(b.restore(snap).expect("restore"), 1);
        assert_eq!(b.final_for("s1"), FinalMark::Mark(55));
    }

    #[test]
    fn meta_names_flow_only_with_exam_or_class() {
        assert!(!SessionMeta::default().names_flow());
        let blank = SessionMeta {
            exam_name: Some("  ".into()),
            subject: Some("Maths".into()),
            ..SessionMeta::default()
        };
        assert!(!blank.names_flow());
        let class_only = SessionMeta {
            class_name: Some("SS1".into()),
            ..SessionMeta::default()
        };
        assert!(class_only.names_flow());
    }

    #[test]
    fn empty_roster_is_valid() {
        let s = open(0);
        assert!(s.visible().is_empty());
        assert_eq!(s.visible_stats().entered_count, 0);
        assert_eq!(s.csv().expect("csv"), "Name,Exam,Final\n");
    }
}
