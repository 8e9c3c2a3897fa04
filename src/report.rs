use std::fmt::Write;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregator;
use crate::models::{Module, Student};

const PLACEHOLDER: &str = "-";

/// Display language for the table headers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Fr,
    En,
}

impl Locale {
    pub fn student_label(self) -> &'static str {
        match self {
            Locale::Fr => "Élève",
            Locale::En => "Student",
        }
    }

    pub fn total_label(self) -> &'static str {
        "Total"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub student_width: usize,
    pub column_width: usize,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            student_width: 30,
            column_width: 18,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleColumn {
    pub id: i64,
    pub code: String,
    pub abbreviation: String,
    pub name: String,
    pub total_periods: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectCell {
    pub id: i64,
    pub abbreviation: String,
    pub name: String,
    pub absences: u32,
    pub excused: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleCell {
    pub module_id: i64,
    pub absences: u32,
    pub excused: u32,
    pub total_periods: u32,
    pub percentage: f64,
    pub subjects: Vec<SubjectCell>,
}

impl ModuleCell {
    pub fn label(&self) -> String {
        format!(
            "{} / {} ({:.1}%)",
            self.absences, self.total_periods, self.percentage
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub absences: u64,
    pub excused: u64,
    pub periods: u64,
}

impl Totals {
    pub fn label(&self) -> String {
        format!("{} / {} / {}", self.absences, self.excused, self.periods)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentRow {
    pub id: i64,
    pub last_name: String,
    pub first_name: String,
    /// One entry per module column; `None` renders as the placeholder.
    pub cells: Vec<Option<ModuleCell>>,
    pub totals: Totals,
}

impl StudentRow {
    pub fn name_label(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
    }
}

/// The aggregated state laid out in display order.
#[derive(Debug, Clone, Serialize)]
pub struct ReportTable {
    pub modules: Vec<ModuleColumn>,
    pub students: Vec<StudentRow>,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    generated_at: DateTime<Utc>,
    source: &'a str,
    #[serde(flatten)]
    table: &'a ReportTable,
}

/// Percentage of scheduled periods missed, rounded to one decimal.
/// Zero scheduled periods yields 0.0.
pub fn percentage(absences: u32, total_periods: u32) -> f64 {
    if total_periods == 0 {
        return 0.0;
    }
    let raw = f64::from(absences) / f64::from(total_periods) * 100.0;
    (raw * 10.0).round() / 10.0
}

fn sorted_modules(aggregator: &Aggregator) -> Vec<&Module> {
    let mut modules: Vec<&Module> = aggregator.modules().values().collect();
    modules.sort_by(|a, b| {
        a.abbreviation
            .cmp(&b.abbreviation)
            .then_with(|| a.id.cmp(&b.id))
    });
    modules
}

fn sorted_students(aggregator: &Aggregator) -> Vec<&Student> {
    let mut students: Vec<&Student> = aggregator.students().values().collect();
    students.sort_by(|a, b| {
        a.last_name
            .cmp(&b.last_name)
            .then_with(|| a.first_name.cmp(&b.first_name))
            .then_with(|| a.id.cmp(&b.id))
    });
    students
}

fn module_cell(
    aggregator: &Aggregator,
    student: &Student,
    module: &Module,
) -> Option<ModuleCell> {
    let counter = aggregator.counter(student.id, module.id)?;
    if counter.absences == 0 {
        return None;
    }

    let subjects = counter
        .subjects
        .iter()
        .map(|(subject_id, count)| {
            let subject = aggregator.subject(module.id, *subject_id);
            SubjectCell {
                id: *subject_id,
                abbreviation: subject
                    .map(|subject| subject.abbreviation.clone())
                    .unwrap_or_default(),
                name: subject
                    .map(|subject| subject.name.clone())
                    .unwrap_or_default(),
                absences: count.absences,
                excused: count.excused,
            }
        })
        .collect();

    Some(ModuleCell {
        module_id: module.id,
        absences: counter.absences,
        excused: counter.excused,
        total_periods: module.total_periods,
        percentage: percentage(counter.absences, module.total_periods),
        subjects,
    })
}

pub fn build_table(aggregator: &Aggregator) -> ReportTable {
    let modules = sorted_modules(aggregator);
    let all_periods: u64 = modules
        .iter()
        .map(|module| u64::from(module.total_periods))
        .sum();

    let students = sorted_students(aggregator)
        .into_iter()
        .map(|student| {
            let mut totals = Totals {
                periods: all_periods,
                ..Totals::default()
            };
            let cells: Vec<Option<ModuleCell>> = modules
                .iter()
                .map(|module| module_cell(aggregator, student, module))
                .collect();

            for cell in cells.iter().flatten() {
                totals.absences += u64::from(cell.absences);
                totals.excused += u64::from(cell.excused);
            }

            StudentRow {
                id: student.id,
                last_name: student.last_name.clone(),
                first_name: student.first_name.clone(),
                cells,
                totals,
            }
        })
        .collect();

    ReportTable {
        modules: modules
            .into_iter()
            .map(|module| ModuleColumn {
                id: module.id,
                code: module.code.clone(),
                abbreviation: module.abbreviation.clone(),
                name: module.name.clone(),
                total_periods: module.total_periods,
            })
            .collect(),
        students,
    }
}

fn push_cell(line: &mut String, value: &str, width: usize) {
    let _ = write!(line, " {value:<width$}");
}

/// Renders the table as fixed-width lines: the header, then one line per student.
pub fn render_text(table: &ReportTable, layout: Layout, locale: Locale) -> Vec<String> {
    let mut lines = Vec::with_capacity(table.students.len() + 1);

    let mut header = format!(
        "{:<width$}",
        locale.student_label(),
        width = layout.student_width
    );
    for module in &table.modules {
        push_cell(&mut header, &module.abbreviation, layout.column_width);
    }
    push_cell(&mut header, locale.total_label(), layout.column_width);
    lines.push(header);

    for student in &table.students {
        let mut line = format!(
            "{:<width$}",
            student.name_label(),
            width = layout.student_width
        );
        for cell in &student.cells {
            match cell {
                Some(cell) => push_cell(&mut line, &cell.label(), layout.column_width),
                None => push_cell(&mut line, PLACEHOLDER, layout.column_width),
            }
        }
        push_cell(&mut line, &student.totals.label(), layout.column_width);
        lines.push(line);
    }

    lines
}

pub fn render_json(table: &ReportTable, source: &str) -> anyhow::Result<String> {
    let report = JsonReport {
        generated_at: Utc::now(),
        source,
        table,
    };
    Ok(serde_json::to_string_pretty(&report)?)
}
