use serde::Serialize;
use std::collections::HashMap;

use crate::calc::{self, FinalMark, RosterStatsDisplay, ScoreRecord, NO_DATA};
use crate::roster::Student;
use crate::schema::{AssessmentSchema, ScoreKey};
use crate::session::SessionMeta;
use crate::settings::PrinterSettings;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ColumnKind {
    Name,
    Score(ScoreKey),
    Final,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Column {
    header: String,
    kind: ColumnKind,
}

/// Name, shown CA columns, exam if shown, final always.
fn marksheet_columns(schema: &AssessmentSchema) -> Vec<Column> {
    let mut cols = vec![Column {
        header: "Name".to_string(),
        kind: ColumnKind::Name,
    }];
    if schema.ca_enabled && schema.visible_columns.shows_ca() {
        for c in &schema.components {
            cols.push(Column {
                header: c.label.clone(),
                kind: ColumnKind::Score(ScoreKey::Component(c.id.clone())),
            });
        }
    }
    if schema.visible_columns.shows_exam() {
        cols.push(Column {
            header: "Exam".to_string(),
            kind: ColumnKind::Score(ScoreKey::Exam),
        });
    }
    cols.push(Column {
        header: "Final".to_string(),
        kind: ColumnKind::Final,
    });
    cols
}

fn row_cells(
    cols: &[Column],
    student: &Student,
    schema: &AssessmentSchema,
    record: Option<&ScoreRecord>,
    blank: &str,
) -> Vec<String> {
    cols.iter()
        .map(|col| match &col.kind {
            ColumnKind::Name => student.display_name().to_string(),
            ColumnKind::Score(key) => record
                .and_then(|r| r.get(key))
                .map(|v| v.to_string())
                .unwrap_or_else(|| blank.to_string()),
            ColumnKind::Final => match calc::compute_final(schema, record) {
                FinalMark::Mark(v) => v.to_string(),
                FinalMark::Unentered => blank.to_string(),
            },
        })
        .collect()
}

/// Full-roster marksheet as CSV text. Unentered cells are left empty.
pub fn to_csv(
    roster: &[Student],
    schema: &AssessmentSchema,
    records: &HashMap<String, ScoreRecord>,
) -> anyhow::Result<String> {
    let cols = marksheet_columns(schema);
    let mut w = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    w.write_record(cols.iter().map(|c| c.header.as_str()))?;
    for student in roster {
        w.write_record(row_cells(
            &cols,
            student,
            schema,
            records.get(&student.id),
            "",
        ))?;
    }
    let bytes = w.into_inner().map_err(|e| anyhow::anyhow!(e.to_string()))?;
    Ok(String::from_utf8(bytes)?)
}

/// `{subject}_{class}_marks.csv` with anything but ASCII letters, digits
/// and `-` mapped to `_`.
pub fn csv_file_name(meta: &SessionMeta) -> String {
    let clean = |s: &str| -> String {
        s.trim()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    };
    let mut parts: Vec<String> = Vec::new();
    for raw in [meta.subject.as_deref(), meta.class_name.as_deref()] {
        if let Some(s) = raw.filter(|s| !s.trim().is_empty()) {
            parts.push(clean(s));
        }
    }
    if parts.is_empty() {
        parts.push("marksheet".to_string());
    }
    format!("{}_marks.csv", parts.join("_"))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintHeader {
    pub school_name: String,
    pub exam_name: String,
    pub class_name: String,
    pub subject: String,
    pub term: String,
    pub date: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintRow {
    pub index: usize,
    pub student_id: String,
    pub cells: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintLayout {
    pub header: PrintHeader,
    pub columns: Vec<String>,
    pub rows: Vec<PrintRow>,
    pub summary: RosterStatsDisplay,
    pub signature_line: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
}

pub fn to_print_layout(
    roster: &[Student],
    schema: &AssessmentSchema,
    records: &HashMap<String, ScoreRecord>,
    meta: &SessionMeta,
    printer: &PrinterSettings,
) -> PrintLayout {
    let cols = marksheet_columns(schema);
    let now = chrono::Local::now();

    let rows = roster
        .iter()
        .enumerate()
        .map(|(i, s)| PrintRow {
            index: i + 1,
            student_id: s.id.clone(),
            cells: row_cells(&cols, s, schema, records.get(&s.id), NO_DATA),
        })
        .collect();

    let summary = calc::aggregate(
        roster
            .iter()
            .map(|s| calc::compute_final(schema, records.get(&s.id))),
    )
    .display();

    let or_blank = |v: &Option<String>| v.clone().unwrap_or_default();
    PrintLayout {
        header: PrintHeader {
            school_name: printer.school_name.clone(),
            exam_name: or_blank(&meta.exam_name),
            class_name: or_blank(&meta.class_name),
            subject: or_blank(&meta.subject),
            term: or_blank(&meta.term),
            date: meta
                .date
                .clone()
                .unwrap_or_else(|| now.format("%Y-%m-%d").to_string()),
        },
        columns: cols.into_iter().map(|c| c.header).collect(),
        rows,
        summary,
        signature_line: format!("{}: ______________________", printer.signature_label),
        generated_at: printer
            .show_generated_at
            .then(|| now.format("%Y-%m-%d %H:%M").to_string()),
    }
}

impl PrintLayout {
    /// Fixed-width plain text for the platform print facility.
    pub fn render_text(&self) -> String {
        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in &self.rows {
            for (w, cell) in widths.iter_mut().zip(&row.cells) {
                *w = (*w).max(cell.chars().count());
            }
        }
        let num_width = self.rows.len().to_string().len().max(1);

        let mut out = String::new();
        let h = &self.header;
        if !h.school_name.is_empty() {
            out.push_str(&h.school_name);
            out.push('\n');
        }
        out.push_str(&format!("Exam: {}    Class: {}\n", h.exam_name, h.class_name));
        out.push_str(&format!(
            "Subject: {}    Term: {}    Date: {}\n\n",
            h.subject, h.term, h.date
        ));

        let line = |cells: &[String], lead: &str| -> String {
            let mut s = format!("{:>num_width$}  ", lead);
            for (i, (cell, w)) in cells.iter().zip(&widths).enumerate() {
                if i == 0 {
                    s.push_str(&format!("{:<w$}", cell, w = *w));
                } else {
                    s.push_str(&format!("  {:>w$}", cell, w = *w));
                }
            }
            s.trim_end().to_string()
        };

        out.push_str(&line(&self.columns, "#"));
        out.push('\n');
        for row in &self.rows {
            out.push_str(&line(&row.cells, &row.index.to_string()));
            out.push('\n');
        }

        out.push_str(&format!(
            "\nEntered: {}    Mean: {}    Max: {}    Min: {}\n\n",
            self.summary.entered_count, self.summary.mean, self.summary.max, self.summary.min
        ));
        out.push_str(&self.signature_line);
        out.push('\n');
        if let Some(at) = &self.generated_at {
            out.push_str(&format!("Generated {}\n", at));
        }
        out
    }
}
