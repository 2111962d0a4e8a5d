use compact_str::CompactString;
use scraper::{Html, Selector};

use crate::{
    error::ParseError,
    record::{Semester, StudentInfo, StudentRecord, Subject},
};

const ROLL_NUMBER: &str = "ROLL NUMBER";
const STUDENT_NAME: &str = "STUDENT NAME";
const FATHER_NAME: &str = "FATHER NAME";
const SEMESTER: &str = "Semester";
const REGULAR_RESULT: &str = "Regular Result";
/// Rows whose first cell names the institution are page chrome.
const INSTITUTION: &str = "Hamirpur";

/// Every `<tr>` of the page reduced to the trimmed text of its cells.
fn rows(html: &str) -> Vec<Vec<String>> {
    let document = Html::parse_document(html);
    let sel_tr = Selector::parse("tr").unwrap();
    let sel_td = Selector::parse("td").unwrap();

    document
        .select(&sel_tr)
        .map(|tr| {
            tr.select(&sel_td)
                .map(|td| td.text().map(str::trim).collect())
                .collect()
        })
        .collect()
}

fn is_relevant(row: &[String]) -> bool {
    match row.first() {
        None => false,
        Some(first) if first == REGULAR_RESULT || first.contains(INSTITUTION) => false,
        Some(first) if first.contains(ROLL_NUMBER) => true,
        Some(_) => matches!(row.len(), 1 | 6),
    }
}

fn integer(field: &'static str, value: &str) -> Result<i64, ParseError> {
    value.parse().map_err(|_| ParseError::BadInteger {
        field,
        value: value.to_owned(),
    })
}

fn strip_label(cell: &str, label: &str) -> String {
    cell.replace(label, "").trim().to_owned()
}

/// Builds a transcript from the result page. Any subject row with a
/// non-integer number, credit or mark column rejects the whole page.
pub fn parse(html: &str) -> Result<StudentRecord, ParseError> {
    let mut record = StudentRecord::default();
    let mut current: Option<CompactString> = None;

    for row in rows(html).into_iter().filter(|row| is_relevant(row)) {
        match &row[..] {
            [roll, name, father] if roll.contains(ROLL_NUMBER) => {
                record.student_info = StudentInfo {
                    roll_number: strip_label(roll, ROLL_NUMBER),
                    student_name: strip_label(name, STUDENT_NAME),
                    father_name: strip_label(father, FATHER_NAME),
                };
            }
            [header] if header.starts_with(SEMESTER) => {
                let Some(key) = header.split_whitespace().next_back() else {
                    continue;
                };
                record.semesters.insert(
                    key.into(),
                    Semester {
                        semester_name: header.clone(),
                        subjects: Vec::new(),
                    },
                );
                current = Some(key.into());
            }
            [no, subject, code, credits, grade, marks] => {
                let Some(semester) = current.as_ref().and_then(|k| record.semesters.get_mut(k))
                else {
                    tracing::debug!(target: "parse", "subject row before any semester: {row:?}");
                    continue;
                };
                semester.subjects.push(Subject {
                    no: integer("no", no)?,
                    subject: subject.clone(),
                    code: code.clone(),
                    credits: integer("credits", credits)?,
                    grade: grade.clone(),
                    marks: integer("marks", marks)?,
                });
            }
            _ => {}
        }
    }

    if record.student_info.roll_number.is_empty() {
        return Err(ParseError::MissingRollNumber);
    }
    Ok(record)
}
