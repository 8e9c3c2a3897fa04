use std::collections::{BTreeMap, HashMap};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::models::{AbsenceCounter, AttendanceRow, Module, Student, Subject};

/// Decides whether a row counts as an absence.
///
/// Excused absences are counted the same way under every rule: the excused
/// marker must equal 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AbsenceRule {
    /// The absence marker equals 0.
    #[default]
    Marker,
    /// The excused marker is 0 or 1.
    Excuse,
    /// Every row is an absence.
    Always,
}

impl AbsenceRule {
    pub fn is_absence(self, absence_marker: i64, excused_marker: i64) -> bool {
        match self {
            AbsenceRule::Marker => absence_marker == 0,
            AbsenceRule::Excuse => matches!(excused_marker, 0 | 1),
            AbsenceRule::Always => true,
        }
    }
}

/// Registries built from one pass over the attendance rows.
#[derive(Debug, Default)]
pub struct Aggregator {
    rule: AbsenceRule,
    students: BTreeMap<i64, Student>,
    modules: BTreeMap<i64, Module>,
    // subjects seen before their module was registered
    pending_subjects: HashMap<i64, BTreeMap<i64, Subject>>,
    counters: HashMap<(i64, i64), AbsenceCounter>,
    rows: usize,
}

impl Aggregator {
    pub fn new(rule: AbsenceRule) -> Self {
        Self {
            rule,
            ..Self::default()
        }
    }

    pub fn rule(&self) -> AbsenceRule {
        self.rule
    }

    pub fn rows_seen(&self) -> usize {
        self.rows
    }

    pub fn register_student(&mut self, id: i64, last_name: &str, first_name: &str) {
        self.students.entry(id).or_insert_with(|| Student {
            id,
            last_name: last_name.to_string(),
            first_name: first_name.to_string(),
        });
    }

    pub fn register_module(
        &mut self,
        id: i64,
        code: &str,
        abbreviation: &str,
        name: &str,
        total_periods: u32,
    ) {
        if self.modules.contains_key(&id) {
            return;
        }

        let subjects = self.pending_subjects.remove(&id).unwrap_or_default();
        self.modules.insert(
            id,
            Module {
                id,
                code: code.to_string(),
                abbreviation: abbreviation.to_string(),
                name: name.to_string(),
                total_periods,
                subjects,
            },
        );
    }

    pub fn register_subject(
        &mut self,
        module_id: i64,
        subject_id: i64,
        abbreviation: &str,
        name: &str,
    ) {
        let subjects = match self.modules.get_mut(&module_id) {
            Some(module) => &mut module.subjects,
            None => self.pending_subjects.entry(module_id).or_default(),
        };

        subjects.entry(subject_id).or_insert_with(|| Subject {
            abbreviation: abbreviation.to_string(),
            name: name.to_string(),
        });
    }

    pub fn record_event(
        &mut self,
        student_id: i64,
        module_id: i64,
        subject_id: i64,
        absence_marker: i64,
        excused_marker: i64,
    ) {
        let is_absence = self.rule.is_absence(absence_marker, excused_marker);
        let is_excused = excused_marker == 1;

        let counter = self.counters.entry((student_id, module_id)).or_default();
        let subject = counter.subjects.entry(subject_id).or_default();

        if is_absence {
            counter.absences += 1;
            subject.absences += 1;
        }
        if is_excused {
            counter.excused += 1;
            subject.excused += 1;
        }
    }

    /// Registers the reference data carried by a row and records its event.
    pub fn ingest_row(&mut self, row: &AttendanceRow) {
        self.register_student(row.student_id, &row.last_name, &row.first_name);
        self.register_module(
            row.module_id,
            &row.module_code,
            &row.module_abbreviation,
            &row.module_name,
            row.module_periods,
        );
        self.register_subject(
            row.module_id,
            row.subject_id,
            &row.subject_abbreviation,
            &row.subject_name,
        );
        self.record_event(
            row.student_id,
            row.module_id,
            row.subject_id,
            row.absence_marker,
            row.excused_marker,
        );
        self.rows += 1;
    }

    pub fn students(&self) -> &BTreeMap<i64, Student> {
        &self.students
    }

    pub fn modules(&self) -> &BTreeMap<i64, Module> {
        &self.modules
    }

    pub fn counter(&self, student_id: i64, module_id: i64) -> Option<&AbsenceCounter> {
        self.counters.get(&(student_id, module_id))
    }

    /// Subjects recorded for a module, whether or not the module itself is registered.
    pub fn subject(&self, module_id: i64, subject_id: i64) -> Option<&Subject> {
        self.modules
            .get(&module_id)
            .map(|module| &module.subjects)
            .or_else(|| self.pending_subjects.get(&module_id))
            .and_then(|subjects| subjects.get(&subject_id))
    }

    #[cfg(test)]
    pub fn counters(&self) -> &HashMap<(i64, i64), AbsenceCounter> {
        &self.counters
    }
}
