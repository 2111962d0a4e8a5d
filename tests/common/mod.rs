#![allow(dead_code)]

use core::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use rhv::{
    Error,
    config::{CrawlConfig, YearSelection},
    retry::RetryPolicy,
    roll::{Branch, YearPartition},
    scrape::{Connect, Transport},
};

pub const CSRF: &str = "csrf123";
pub const VERIFICATION: &str = "verify456";

pub const ROLL_PROBLEM: &str =
    "<html><body><h3>Roll number Problem, please check.</h3></body></html>";
pub const SERVER_ERROR: &str = "<html><head><title>Server Error</title></head></html>";

pub fn index_page() -> String {
    format!(
        r#"<html><body><form action="result.asp" method="post">
        <input type="text" name="RollNumber">
        <input type="hidden" name="CSRFToken" value="{CSRF}">
        <input type="hidden" name="RequestVerificationToken" value="{VERIFICATION}">
        <input type="submit" name="B1" value="Submit">
        </form></body></html>"#
    )
}

/// A result page with one semester holding `subjects` rows of
/// `(no, subject, code, credits, grade, marks)`.
pub fn transcript(roll: &str, name: &str, subjects: &[[&str; 6]]) -> String {
    let mut html = format!(
        "<html><body><table>\
         <tr><td>National Institute of Technology Hamirpur</td></tr>\
         <tr><td>Regular Result</td></tr>\
         <tr><td><b>ROLL NUMBER</b> {roll}</td><td><b>STUDENT NAME</b> {name}</td><td><b>FATHER NAME</b> X Y</td></tr>\
         </table><table>\
         <tr><td>Semester S01</td></tr>"
    );
    for row in subjects {
        html.push_str("<tr>");
        for cell in row {
            html.push_str("<td>");
            html.push_str(cell);
            html.push_str("</td>");
        }
        html.push_str("</tr>");
    }
    html.push_str("</table></body></html>");
    html
}

pub fn simple_transcript(roll: &str, name: &str) -> String {
    transcript(roll, name, &[["1", "Data Structures", "BEC201", "4", "A", "85"]])
}

/// Scripted stand-in for the results portal.
#[derive(Default)]
pub struct FakePortal {
    years: Vec<&'static str>,
    pages: HashMap<String, String>,
    failures: Mutex<HashMap<String, u32>>,
    submissions: Mutex<Vec<String>>,
    index_fetches: AtomicUsize,
}

impl FakePortal {
    pub fn new(years: &[&'static str]) -> Self {
        Self {
            years: years.to_vec(),
            ..Self::default()
        }
    }

    /// Publishes a normal transcript for `roll`.
    pub fn with_record(mut self, roll: &str, name: &str) -> Self {
        self.pages
            .insert(roll.to_owned(), simple_transcript(roll, name));
        self
    }

    /// Answers `roll` with an arbitrary body.
    pub fn with_page(mut self, roll: &str, body: String) -> Self {
        self.pages.insert(roll.to_owned(), body);
        self
    }

    /// Makes the next `n` submissions of `roll` fail at the network layer.
    pub fn failing(self, roll: &str, n: u32) -> Self {
        self.failures.lock().insert(roll.to_owned(), n);
        self
    }

    pub fn submissions(&self) -> Vec<String> {
        self.submissions.lock().clone()
    }

    pub fn index_fetches(&self) -> usize {
        self.index_fetches.load(Ordering::SeqCst)
    }

    fn scheme_year(url: &str) -> Option<&str> {
        let at = url.find("/scheme")? + "/scheme".len();
        url.get(at..at + 2)
    }
}

impl Transport for FakePortal {
    async fn fetch(&self, url: &str) -> Result<String, Error> {
        self.index_fetches.fetch_add(1, Ordering::SeqCst);
        match Self::scheme_year(url) {
            Some(year) if self.years.contains(&year) && url.ends_with("/studentresult/index.asp") => {
                Ok(index_page())
            }
            _ => Ok(SERVER_ERROR.to_owned()),
        }
    }

    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<String, Error> {
        assert!(url.ends_with("/studentresult/result.asp"), "{url}");
        let field = |name: &str| {
            form.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| *v)
                .unwrap_or_default()
        };
        assert_eq!(field("CSRFToken"), CSRF);
        assert_eq!(field("RequestVerificationToken"), VERIFICATION);
        assert_eq!(field("B1"), "Submit");

        let roll = field("RollNumber").to_owned();
        self.submissions.lock().push(roll.clone());

        if let Some(n) = self.failures.lock().get_mut(&roll).filter(|n| **n > 0) {
            *n -= 1;
            return Err(Error::Network("connection reset by peer".into()));
        }

        Ok(self
            .pages
            .get(&roll)
            .cloned()
            .unwrap_or_else(|| ROLL_PROBLEM.to_owned()))
    }
}

#[derive(Clone)]
pub struct FakeConnector(pub Arc<FakePortal>);

impl Connect for FakeConnector {
    type Transport = Arc<FakePortal>;

    fn connect(&self) -> Result<Arc<FakePortal>, Error> {
        Ok(Arc::clone(&self.0))
    }
}

pub fn year(s: &str) -> YearPartition {
    YearPartition::new(s).unwrap()
}

pub fn branch(s: &str) -> Branch {
    Branch::new(s).unwrap()
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        backoff: 2.0,
    }
}

pub fn config(years: &[&str], branches: &[&str]) -> CrawlConfig {
    CrawlConfig {
        portal: "http://portal.test".to_owned(),
        years: YearSelection::Fixed(years.iter().map(|s| year(s)).collect()),
        branches: branches.iter().map(|s| branch(s)).collect(),
        retry: fast_retry(),
        ..CrawlConfig::default()
    }
}
