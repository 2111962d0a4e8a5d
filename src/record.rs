use std::collections::BTreeMap;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentInfo {
    pub roll_number: String,
    pub student_name: String,
    pub father_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub no: i64,
    pub subject: String,
    pub code: String,
    pub credits: i64,
    pub grade: String,
    pub marks: i64,
}

/// Subjects keep the row order of the source table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Semester {
    pub semester_name: String,
    pub subjects: Vec<Subject>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub student_info: StudentInfo,
    /// Keyed by the semester code, e.g. `S01`.
    pub semesters: BTreeMap<CompactString, Semester>,
}
