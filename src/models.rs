use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Student {
    pub id: i64,
    pub last_name: String,
    pub first_name: String,
}

/// Keyed by its id inside the owning module's subject map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub abbreviation: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub id: i64,
    pub code: String,
    pub abbreviation: String,
    pub name: String,
    pub total_periods: u32,
    pub subjects: BTreeMap<i64, Subject>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubjectCounter {
    pub absences: u32,
    pub excused: u32,
}

/// Absence totals for one (student, module) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbsenceCounter {
    pub absences: u32,
    pub excused: u32,
    pub subjects: BTreeMap<i64, SubjectCounter>,
}

/// One parsed line of the attendance file, numeric fields already coerced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttendanceRow {
    pub student_id: i64,
    pub last_name: String,
    pub first_name: String,
    pub module_id: i64,
    pub module_code: String,
    pub module_abbreviation: String,
    pub module_name: String,
    pub module_periods: u32,
    pub subject_id: i64,
    pub subject_abbreviation: String,
    pub subject_name: String,
    pub absence_marker: i64,
    pub excused_marker: i64,
}
