use std::collections::HashMap;
use std::io::Read;

use crate::error::ValidationError;
use crate::models::{BullyingCategory, Gender, Submission};

pub const COL_NAME: &str = "Name";
pub const COL_GENDER: &str = "Gender";
pub const COL_AGE: &str = "Age";
pub const COL_GRADE: &str = "Grade";
pub const COL_SEVERITY: &str = "Bullying Severity";
pub const COL_SUPPORT: &str = "Social Support";
pub const COL_MENTAL: &str = "Mental Health";
pub const COL_CATEGORY: &str = "Bullying Type";

/// Columns an upload needs before a single record can be built from it.
pub const RECORD_COLUMNS: [&str; 8] = [
    COL_NAME,
    COL_GENDER,
    COL_AGE,
    COL_GRADE,
    COL_SEVERITY,
    COL_SUPPORT,
    COL_MENTAL,
    COL_CATEGORY,
];

/// Header names accepted for each record column, English first. The
/// Indonesian names come from the earlier upload template.
const COLUMN_ALIASES: [&[&str]; 8] = [
    &[COL_NAME, "Nama"],
    &[COL_GENDER, "Jenis Kelamin"],
    &[COL_AGE, "Umur"],
    &[COL_GRADE, "Kelas"],
    &[COL_SEVERITY, "Tingkat Bullying"],
    &[COL_SUPPORT, "Dukungan Sosial"],
    &[COL_MENTAL, "Kesehatan Mental"],
    &[COL_CATEGORY, "Jenis Bullying"],
];

fn is_record_column(column: &str) -> bool {
    let column = column.trim();
    COLUMN_ALIASES
        .iter()
        .flat_map(|names| names.iter())
        .any(|name| name.eq_ignore_ascii_case(column))
}

pub const AGE_RANGE: (i64, i64) = (5, 20);
pub const GRADE_RANGE: (i64, i64) = (1, 12);
pub const SCALE_RANGE: (i64, i64) = (1, 10);

/// Answers typed into the form, before validation.
#[derive(Debug, Clone, Default)]
pub struct ManualEntry {
    pub name: String,
    pub gender: Option<String>,
    pub age: i64,
    pub grade_level: i64,
    pub bullying_severity: i64,
    pub social_support: i64,
    pub mental_health: i64,
    pub bullying_category: String,
}

fn check_range(field: &'static str, value: i64, (min, max): (i64, i64)) -> Result<i64, ValidationError> {
    if value < min || value > max {
        return Err(ValidationError::OutOfRange {
            field,
            min,
            max,
            value,
        });
    }
    Ok(value)
}

impl ManualEntry {
    pub fn validate(self) -> Result<Submission, ValidationError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::MissingField { field: "name" });
        }

        let gender_raw = self
            .gender
            .filter(|raw| !raw.trim().is_empty())
            .ok_or(ValidationError::MissingField { field: "gender" })?;
        let gender = Gender::normalize(&gender_raw).ok_or(ValidationError::UnknownGender {
            row: 1,
            value: gender_raw,
        })?;

        let bullying_category = BullyingCategory::normalize(&self.bullying_category).ok_or(
            ValidationError::UnknownCategory {
                row: 1,
                value: self.bullying_category.clone(),
            },
        )?;

        Ok(Submission {
            name,
            gender,
            age: check_range("age", self.age, AGE_RANGE)?,
            grade_level: check_range("grade", self.grade_level, GRADE_RANGE)?,
            bullying_severity: check_range("bullying severity", self.bullying_severity, SCALE_RANGE)?,
            social_support: check_range("social support", self.social_support, SCALE_RANGE)?,
            mental_health: check_range("mental health", self.mental_health, SCALE_RANGE)?,
            bullying_category,
        })
    }
}

/// Parses an uploaded CSV into submissions, all or nothing.
///
/// Header names are matched ignoring case and surrounding whitespace, and
/// each record column may use its English or Indonesian name.
/// `required_columns` is checked on top of [`RECORD_COLUMNS`]. Numeric
/// cells must be whole numbers but are not range-checked.
pub fn parse_batch<R: Read>(
    reader: R,
    required_columns: &[String],
) -> Result<Vec<Submission>, ValidationError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|err| ValidationError::Unreadable(err.to_string()))?
        .clone();
    let index: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(position, name)| (name.trim().to_lowercase(), position))
        .collect();

    let mut resolved: HashMap<&'static str, usize> = HashMap::new();
    let mut missing: Vec<String> = Vec::new();
    for names in COLUMN_ALIASES {
        match names.iter().find_map(|name| index.get(&name.to_lowercase())) {
            Some(&position) => {
                resolved.insert(names[0], position);
            }
            None => missing.push(names[0].to_string()),
        }
    }
    // Any name of a record column counts as present once that column
    // resolved; a missing one is already reported under its English name.
    for column in required_columns {
        let present = index.contains_key(&column.trim().to_lowercase()) || is_record_column(column);
        if !present && !missing.contains(column) {
            missing.push(column.clone());
        }
    }
    if !missing.is_empty() {
        return Err(ValidationError::MissingColumns(missing));
    }

    let position = |column: &str| resolved[column];
    let mut submissions = Vec::new();

    for (offset, result) in reader.records().enumerate() {
        let row = offset + 1;
        let record = result.map_err(|err| ValidationError::Unreadable(err.to_string()))?;
        let cell = |column: &str| record.get(position(column)).unwrap_or("").to_string();
        let number = |column: &str| -> Result<i64, ValidationError> {
            let value = cell(column);
            value.parse::<i64>().map_err(|_| ValidationError::NotANumber {
                row,
                column: column.to_string(),
                value,
            })
        };

        let gender_raw = cell(COL_GENDER);
        if gender_raw.is_empty() {
            return Err(ValidationError::EmptyCell {
                row,
                field: COL_GENDER.to_string(),
            });
        }
        let gender = Gender::normalize(&gender_raw).ok_or(ValidationError::UnknownGender {
            row,
            value: gender_raw.clone(),
        })?;

        let category_raw = cell(COL_CATEGORY);
        if category_raw.is_empty() {
            return Err(ValidationError::EmptyCell {
                row,
                field: COL_CATEGORY.to_string(),
            });
        }
        let bullying_category = BullyingCategory::normalize(&category_raw).ok_or(
            ValidationError::UnknownCategory {
                row,
                value: category_raw.clone(),
            },
        )?;

        submissions.push(Submission {
            name: cell(COL_NAME),
            gender,
            age: number(COL_AGE)?,
            grade_level: number(COL_GRADE)?,
            bullying_severity: number(COL_SEVERITY)?,
            social_support: number(COL_SUPPORT)?,
            mental_health: number(COL_MENTAL)?,
            bullying_category,
        });
    }

    if submissions.is_empty() {
        return Err(ValidationError::EmptyBatch);
    }
    Ok(submissions)
}
