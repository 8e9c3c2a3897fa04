use std::borrow::Cow;
use std::path::Path;
use std::str::FromStr;

use csv::StringRecord;
use encoding_rs::{Encoding, UTF_8};
use serde::Deserialize;
use tracing::{debug, info, trace, warn};

use crate::aggregate::Aggregator;
use crate::error::IngestError;
use crate::models::AttendanceRow;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Settings for reading one attendance file.
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    pub delimiter: u8,
    pub fallback: &'static Encoding,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            delimiter: b';',
            fallback: encoding_rs::WINDOWS_1252,
        }
    }
}

impl ReadOptions {
    pub fn with_fallback_label(mut self, label: &str) -> Result<Self, IngestError> {
        self.fallback = Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| {
            IngestError::UnknownEncoding {
                label: label.to_string(),
            }
        })?;
        Ok(self)
    }
}

#[derive(Debug)]
pub struct DecodedInput {
    pub text: String,
    pub encoding: &'static Encoding,
}

/// One record as written in the file, mapped by header name. Columns absent
/// from the header read as blank.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CsvRow {
    student_id: String,
    name: String,
    first_name: String,
    module_id: String,
    module_code: String,
    module_abrev: String,
    module_name: String,
    module_nb_periodes_total: String,
    subject_id: String,
    subject_abrev: String,
    subject_name: String,
    absence_position: String,
    excuse: String,
}

impl From<CsvRow> for AttendanceRow {
    fn from(row: CsvRow) -> Self {
        AttendanceRow {
            student_id: coerce(&row.student_id, 0),
            last_name: row.name,
            first_name: row.first_name,
            module_id: coerce(&row.module_id, 0),
            module_code: row.module_code,
            module_abbreviation: row.module_abrev,
            module_name: row.module_name,
            module_periods: coerce(&row.module_nb_periodes_total, 0),
            subject_id: coerce(&row.subject_id, 0),
            subject_abbreviation: row.subject_abrev,
            subject_name: row.subject_name,
            absence_marker: coerce(&row.absence_position, 0),
            excused_marker: coerce(&row.excuse, 0),
        }
    }
}

/// Parses a numeric field, falling back to `default` when it is blank or malformed.
pub fn coerce<T: FromStr>(value: &str, default: T) -> T {
    let trimmed = value.trim();
    match trimmed.parse() {
        Ok(parsed) => parsed,
        Err(_) => {
            if !trimmed.is_empty() {
                trace!("coercing malformed numeric field {trimmed:?} to default");
            }
            default
        }
    }
}

/// Decodes the file contents as UTF-8, then with the fallback encoding.
pub fn decode(bytes: &[u8], fallback: &'static Encoding) -> Result<DecodedInput, IngestError> {
    let attempts = [UTF_8, fallback];

    for encoding in attempts {
        let body = if encoding == UTF_8 {
            bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
        } else {
            bytes
        };

        match encoding.decode_without_bom_handling_and_without_replacement(body) {
            Some(text) => {
                if encoding != UTF_8 {
                    warn!("input is not valid UTF-8, decoded as {}", encoding.name());
                }
                return Ok(DecodedInput {
                    text: Cow::into_owned(text),
                    encoding,
                });
            }
            None => debug!("decoding as {} failed", encoding.name()),
        }
    }

    Err(IngestError::Decode {
        tried: attempts
            .iter()
            .map(|encoding| encoding.name())
            .collect::<Vec<_>>()
            .join(", "),
    })
}

pub fn read_input(path: &Path, options: ReadOptions) -> Result<DecodedInput, IngestError> {
    if !path.is_file() {
        return Err(IngestError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let bytes = std::fs::read(path).map_err(|source| IngestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("read {} bytes from {}", bytes.len(), path.display());

    decode(&bytes, options.fallback)
}

/// Parses delimited text into rows. Records the CSV reader cannot split are
/// skipped with a warning.
pub fn parse_rows(text: &str, delimiter: u8) -> Result<Vec<AttendanceRow>, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    debug!("header columns: {:?}", headers.iter().collect::<Vec<_>>());
    if !["student_id", "module_id"]
        .iter()
        .all(|column| headers.iter().any(|header| header == *column))
    {
        warn!("header row has no student_id or module_id column, ids default to 0");
    }

    let mut rows = Vec::new();
    let mut record = StringRecord::new();
    let mut line = 1;
    loop {
        line += 1;
        match reader.read_record(&mut record) {
            Ok(false) => break,
            Ok(true) => {
                // short rows: trailing columns read as blank
                while record.len() < headers.len() {
                    record.push_field("");
                }
                match record.deserialize::<CsvRow>(Some(&headers)) {
                    Ok(raw) => rows.push(AttendanceRow::from(raw)),
                    Err(err) => warn!("skipping record at line {line}: {err}"),
                }
            }
            Err(err) if err.is_io_error() => return Err(err.into()),
            Err(err) => warn!("skipping record at line {line}: {err}"),
        }
    }

    Ok(rows)
}

/// Reads the attendance file and folds every row into `aggregator`.
pub fn load_into(
    path: &Path,
    options: ReadOptions,
    aggregator: &mut Aggregator,
) -> Result<usize, IngestError> {
    let input = read_input(path, options)?;
    let rows = parse_rows(&input.text, options.delimiter)?;

    for row in &rows {
        aggregator.ingest_row(row);
    }

    info!(
        "ingested {} rows from {} ({})",
        rows.len(),
        path.display(),
        input.encoding.name()
    );
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AbsenceRule;
    use std::io::Write;

    const HEADER: &str = "student_id;name;first_name;module_id;module_code;module_abrev;module_name;module_nb_periodes_total;subject_id;subject_abrev;subject_name;absence_position;excuse";

    #[test]
    fn coerce_defaults_on_bad_input() {
        assert_eq!(coerce::<i64>("42", 0), 42);
        assert_eq!(coerce::<i64>(" 7 ", 0), 7);
        assert_eq!(coerce::<i64>("", 0), 0);
        assert_eq!(coerce::<i64>("abc", 0), 0);
        assert_eq!(coerce::<u32>("-3", 0), 0);
        assert_eq!(coerce::<i64>("-3", 0), -3);
    }

    #[test]
    fn parses_rows_by_header_name() {
        let text = format!(
            "{HEADER};extra\n1;Dupont;Jean;10;M10;MATH;Mathematiques;20;3;ALG;Algebre;0;1;ignored\n"
        );
        let rows = parse_rows(&text, b';').unwrap();
        assert_eq!(rows.len(), 1);

        let row = &rows[0];
        assert_eq!(row.student_id, 1);
        assert_eq!(row.last_name, "Dupont");
        assert_eq!(row.first_name, "Jean");
        assert_eq!(row.module_id, 10);
        assert_eq!(row.module_code, "M10");
        assert_eq!(row.module_abbreviation, "MATH");
        assert_eq!(row.module_periods, 20);
        assert_eq!(row.subject_id, 3);
        assert_eq!(row.subject_name, "Algebre");
        assert_eq!(row.absence_marker, 0);
        assert_eq!(row.excused_marker, 1);
    }

    #[test]
    fn malformed_fields_do_not_drop_the_row() {
        let text = format!("{HEADER}\nx;Martin;Ana;;M20;PHYS;Physique;n/a;;;;;oui\n");
        let rows = parse_rows(&text, b';').unwrap();
        assert_eq!(rows.len(), 1);

        let row = &rows[0];
        assert_eq!(row.student_id, 0);
        assert_eq!(row.module_id, 0);
        assert_eq!(row.module_periods, 0);
        assert_eq!(row.absence_marker, 0);
        assert_eq!(row.excused_marker, 0);
        assert_eq!(row.last_name, "Martin");
    }

    #[test]
    fn missing_columns_and_short_rows_are_blank() {
        let text = "student_id;name;first_name;module_id\n5;Leroy\n";
        let rows = parse_rows(text, b';').unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].student_id, 5);
        assert_eq!(rows[0].last_name, "Leroy");
        assert_eq!(rows[0].first_name, "");
        assert_eq!(rows[0].module_id, 0);
        assert_eq!(rows[0].module_abbreviation, "");
    }

    #[test]
    fn maps_reordered_and_padded_columns_by_name() {
        let text = "excuse ; module_id ; student_id ; name\n 1 ; 10 ;  3 ;  Petit \n";
        let rows = parse_rows(text, b';').unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].excused_marker, 1);
        assert_eq!(rows[0].module_id, 10);
        assert_eq!(rows[0].student_id, 3);
        assert_eq!(rows[0].last_name, "Petit");
        assert_eq!(rows[0].subject_name, "");
    }

    #[test]
    fn decodes_utf8_and_strips_bom() {
        let bytes = "\u{feff}name\nÉlise\n".as_bytes();
        let decoded = decode(bytes, encoding_rs::WINDOWS_1252).unwrap();
        assert_eq!(decoded.encoding, UTF_8);
        assert_eq!(decoded.text, "name\nÉlise\n");
    }

    #[test]
    fn falls_back_to_legacy_encoding() {
        // "Élise" in Windows-1252
        let bytes = b"name\n\xC9lise\n";
        let decoded = decode(bytes, encoding_rs::WINDOWS_1252).unwrap();
        assert_eq!(decoded.encoding, encoding_rs::WINDOWS_1252);
        assert_eq!(decoded.text, "name\nÉlise\n");
    }

    #[test]
    fn fails_when_fallback_cannot_decode() {
        let bytes = b"\xFF\xFE\xFD";
        let err = decode(bytes, UTF_8).unwrap_err();
        assert!(matches!(err, IngestError::Decode { .. }));
    }

    #[test]
    fn unknown_fallback_label_is_rejected() {
        let err = ReadOptions::default()
            .with_fallback_label("klingon")
            .unwrap_err();
        assert!(matches!(err, IngestError::UnknownEncoding { .. }));

        let options = ReadOptions::default().with_fallback_label("latin1").unwrap();
        assert_eq!(options.fallback, encoding_rs::WINDOWS_1252);
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.csv");
        let mut aggregator = Aggregator::new(AbsenceRule::Marker);

        let err = load_into(&path, ReadOptions::default(), &mut aggregator).unwrap_err();
        assert!(matches!(err, IngestError::NotFound { .. }));
    }

    #[test]
    fn loads_legacy_encoded_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{HEADER}").unwrap();
        file.write_all(b"1;M\xFCller;J\xE9r\xF4me;10;M10;MATH;Maths;20;1;ALG;Alg;0;0\n")
            .unwrap();
        file.write_all(b"1;M\xFCller;J\xE9r\xF4me;10;M10;MATH;Maths;20;1;ALG;Alg;0;1\n")
            .unwrap();
        file.flush().unwrap();

        let mut aggregator = Aggregator::new(AbsenceRule::Marker);
        let count = load_into(file.path(), ReadOptions::default(), &mut aggregator).unwrap();
        assert_eq!(count, 2);

        let student = &aggregator.students()[&1];
        assert_eq!(student.last_name, "Müller");
        assert_eq!(student.first_name, "Jérôme");

        let counter = aggregator.counter(1, 10).unwrap();
        assert_eq!(counter.absences, 2);
        assert_eq!(counter.excused, 1);
    }
}
