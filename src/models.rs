use std::fmt;

use serde::{Deserialize, Serialize};

pub const LEDGER_HEADER: [&str; 10] = [
    "No",
    "Name",
    "Gender",
    "Age",
    "Grade",
    "Bullying Severity",
    "Social Support",
    "Mental Health",
    "Bullying Type",
    "Predicted Score",
];

/// Header written by ledgers started with the earlier Indonesian form.
pub const LEGACY_HEADER: [&str; 10] = [
    "No",
    "Nama",
    "Jenis Kelamin",
    "Umur",
    "Kelas",
    "Tingkat Bullying",
    "Dukungan Sosial",
    "Kesehatan Mental",
    "Jenis Bullying",
    "Prediksi Prestasi",
];

pub const ID_COLUMN: usize = 0;
pub const CATEGORY_COLUMN: usize = 8;
pub const SCORE_COLUMN: usize = 9;

/// One ledger row as persisted: plain text cells, header included.
pub type LedgerRow = Vec<String>;

pub fn header_row() -> LedgerRow {
    LEDGER_HEADER.iter().map(|cell| cell.to_string()).collect()
}

fn is_header(row: &[String]) -> bool {
    [LEDGER_HEADER, LEGACY_HEADER].iter().any(|header| {
        row.len() == header.len()
            && row
                .iter()
                .zip(header.iter())
                .all(|(cell, name)| cell.trim().eq_ignore_ascii_case(name))
    })
}

/// The snapshot without its leading header row, if it has one.
pub fn data_rows(rows: &[LedgerRow]) -> &[LedgerRow] {
    match rows.first() {
        Some(first) if is_header(first) => &rows[1..],
        _ => rows,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// Case and whitespace insensitive; accepts the single-letter and
    /// Indonesian forms found in older uploads.
    pub fn normalize(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "m" | "male" | "l" | "laki-laki" => Some(Gender::Male),
            "f" | "female" | "p" | "perempuan" => Some(Gender::Female),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BullyingCategory {
    Physical,
    Verbal,
    Social,
    Cyber,
    Sexual,
}

impl BullyingCategory {
    pub fn normalize(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "physical" | "fisik" => Some(BullyingCategory::Physical),
            "verbal" => Some(BullyingCategory::Verbal),
            "social" | "sosial" => Some(BullyingCategory::Social),
            "cyber" => Some(BullyingCategory::Cyber),
            "sexual" | "seksual" => Some(BullyingCategory::Sexual),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BullyingCategory::Physical => "Physical",
            BullyingCategory::Verbal => "Verbal",
            BullyingCategory::Social => "Social",
            BullyingCategory::Cyber => "Cyber",
            BullyingCategory::Sexual => "Sexual",
        }
    }
}

impl fmt::Display for BullyingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Model input, always in the order severity, support, mental health.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector(pub [f64; 3]);

/// A validated survey answer that has not been scored or numbered yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub name: String,
    pub gender: Gender,
    pub age: i64,
    pub grade_level: i64,
    pub bullying_severity: i64,
    pub social_support: i64,
    pub mental_health: i64,
    pub bullying_category: BullyingCategory,
}

impl Submission {
    pub fn features(&self) -> FeatureVector {
        FeatureVector([
            self.bullying_severity as f64,
            self.social_support as f64,
            self.mental_health as f64,
        ])
    }

    pub fn into_record(self, id: u64, predicted_score: f64) -> Record {
        Record {
            id,
            name: self.name,
            gender: self.gender,
            age: self.age,
            grade_level: self.grade_level,
            bullying_severity: self.bullying_severity,
            social_support: self.social_support,
            mental_health: self.mental_health,
            bullying_category: self.bullying_category,
            predicted_score,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: u64,
    pub name: String,
    pub gender: Gender,
    pub age: i64,
    pub grade_level: i64,
    pub bullying_severity: i64,
    pub social_support: i64,
    pub mental_health: i64,
    pub bullying_category: BullyingCategory,
    pub predicted_score: f64,
}

impl Record {
    pub fn to_row(&self) -> LedgerRow {
        vec![
            self.id.to_string(),
            self.name.clone(),
            self.gender.to_string(),
            self.age.to_string(),
            self.grade_level.to_string(),
            self.bullying_severity.to_string(),
            self.social_support.to_string(),
            self.mental_health.to_string(),
            self.bullying_category.to_string(),
            self.predicted_score.to_string(),
        ]
    }

    /// Reads a persisted row back; `None` for the header or anything the
    /// ledger holds that this program would not have written.
    pub fn from_row(row: &[String]) -> Option<Self> {
        if row.len() != LEDGER_HEADER.len() {
            return None;
        }

        Some(Record {
            id: row[0].trim().parse().ok().filter(|id| *id > 0)?,
            name: row[1].clone(),
            gender: Gender::normalize(&row[2])?,
            age: row[3].trim().parse().ok()?,
            grade_level: row[4].trim().parse().ok()?,
            bullying_severity: row[5].trim().parse().ok()?,
            social_support: row[6].trim().parse().ok()?,
            mental_health: row[7].trim().parse().ok()?,
            bullying_category: BullyingCategory::normalize(&row[8])?,
            predicted_score: row[9].trim().parse().ok()?,
        })
    }
}
