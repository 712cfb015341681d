use std::fmt::Display;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use log::info;
use serde::Serialize;

use crate::grading::{GradeReport, QuestionStats};
use crate::interpret::PageResult;

#[derive(Debug)]
pub enum ExportError {
    Io(std::io::Error),
    Csv(csv::Error),
    Json(serde_json::Error),
}

impl Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::Io(e) => write!(f, "cannot write export: {}", e),
            ExportError::Csv(e) => write!(f, "cannot write table: {}", e),
            ExportError::Json(e) => write!(f, "cannot write report: {}", e),
        }
    }
}

impl std::error::Error for ExportError {}

impl From<std::io::Error> for ExportError {
    fn from(e: std::io::Error) -> Self {
        ExportError::Io(e)
    }
}

impl From<csv::Error> for ExportError {
    fn from(e: csv::Error) -> Self {
        ExportError::Csv(e)
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(e: serde_json::Error) -> Self {
        ExportError::Json(e)
    }
}

pub type Table = Vec<Vec<String>>;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn footer_row(caption: &str, questions: &[QuestionStats], cell: impl Fn(&QuestionStats) -> String) -> Vec<String> {
    std::iter::once(caption.to_string())
        .chain(questions.iter().map(cell))
        .collect()
}

/// One row per student with every question's reading, then a blank spacer
/// and per-question statistics.
pub fn results_table(report: &GradeReport, option_labels: &[String]) -> Table {
    let questions = &report.questions;
    let mut rows = vec![footer_row("Student", questions, |q| format!("Q{}", q.question))];

    for student in &report.students {
        rows.push(
            std::iter::once(student.label.clone())
                .chain(questions.iter().map(|q| {
                    student
                        .answers
                        .get(&q.question)
                        .map(ToString::to_string)
                        .unwrap_or_default()
                }))
                .collect(),
        );
    }

    rows.push(vec![]);
    rows.push(vec![]);

    rows.push(footer_row("Question Number", questions, |q| q.question.to_string()));
    rows.push(footer_row("Total mark", questions, |q| q.mark.to_string()));
    rows.push(footer_row("Average", questions, |q| {
        (round2(q.correct_ratio()) * q.mark).to_string()
    }));
    rows.push(footer_row("Percentage", questions, |q| {
        format!("{:.1}%", q.correct_ratio() * 100.0)
    }));
    rows.push(footer_row("Answer", questions, |q| {
        q.key.clone().unwrap_or_else(|| "-".to_string())
    }));
    for label in option_labels {
        rows.push(footer_row(label, questions, |q| {
            format!("{:.0}%", q.option_ratio(label) * 100.0)
        }));
    }

    rows
}

/// `Student, Score, Percentage`, one row per student.
pub fn scores_table(report: &GradeReport) -> Table {
    let header = ["Student", "Score", "Percentage"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    std::iter::once(header)
        .chain(report.students.iter().map(|student| {
            let percentage = if student.total_possible > 0.0 {
                format!("{:.1}%", student.percentage)
            } else {
                "0%".to_string()
            };
            vec![student.label.clone(), student.score.to_string(), percentage]
        }))
        .collect()
}

/// Writes rows of differing length as CSV.
pub fn write_csv(path: &Path, rows: &[Vec<String>]) -> Result<(), ExportError> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_path(path)?;
    for row in rows {
        if row.is_empty() {
            // a record needs at least one field
            writer.write_record([""])?;
        } else {
            writer.write_record(row)?;
        }
    }
    writer.flush()?;
    info!("wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Report<'a> {
    pages: &'a [PageResult],
    grades: &'a GradeReport,
}

/// Raw page readings and the graded report as one pretty-printed document.
pub fn write_json(path: &Path, pages: &[PageResult], report: &GradeReport) -> Result<(), ExportError> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, &Report { pages, grades: report })?;
    info!("wrote report to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grading::{grade, AnswerKey, MarkWeights, StudentRecord, WeightSection};
    use crate::geometry::Offset;
    use crate::interpret::RegionResult;
    use crate::sheet::RegionKind;
    use crate::types::{Detection, PageId, RegionId, Symbol};

    fn abcd() -> Vec<String> {
        ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect()
    }

    fn page(index: usize, symbols: &[Symbol]) -> PageResult {
        PageResult {
            index,
            page_id: PageId::for_index(index),
            offset: Offset::default(),
            regions: vec![RegionResult {
                id: RegionId::new(format!("p{}_b1", index)),
                kind: RegionKind::Answer { start_question: 1 },
                detections: symbols
                    .iter()
                    .enumerate()
                    .map(|(i, symbol)| Detection {
                        question: Some(i as u32 + 1),
                        row: Some(i),
                        symbol: symbol.clone(),
                        confidence: 1.0,
                    })
                    .collect(),
            }],
        }
    }

    fn letter(label: &str, index: usize) -> Symbol {
        Symbol::Resolved {
            label: label.to_string(),
            index,
        }
    }

    fn sample_report() -> (Vec<PageResult>, GradeReport) {
        let pages = vec![
            page(0, &[letter("A", 0), letter("B", 1), letter("C", 2)]),
            page(1, &[letter("A", 0), Symbol::Multiple, Symbol::Blank]),
            page(2, &[letter("B", 1), letter("B", 1), letter("D", 3)]),
        ];
        let report = grade(&pages, Some(&AnswerKey::parse("ABC")), &MarkWeights::default());
        (pages, report)
    }

    #[test]
    fn results_table_has_rows_then_footer() {
        let (_, report) = sample_report();
        let table = results_table(&report, &abcd());

        assert_eq!(table[0], vec!["Student", "Q1", "Q2", "Q3"]);
        assert_eq!(table[1], vec!["Page 1", "A", "B", "C"]);
        assert_eq!(table[2], vec!["Page 2", "A", "MULT", "BLANK"]);
        assert!(table[4].is_empty() && table[5].is_empty());
        assert_eq!(table[6], vec!["Question Number", "1", "2", "3"]);
        assert_eq!(table[7], vec!["Total mark", "1", "1", "1"]);
        assert_eq!(table[8], vec!["Average", "0.67", "0.67", "0.33"]);
        assert_eq!(table[9], vec!["Percentage", "66.7%", "66.7%", "33.3%"]);
        assert_eq!(table[10], vec!["Answer", "A", "B", "C"]);
        assert_eq!(table[11], vec!["A", "67%", "0%", "0%"]);
        assert_eq!(table[12], vec!["B", "33%", "67%", "0%"]);
        assert_eq!(table.len(), 15);
    }

    #[test]
    fn average_scales_the_rounded_ratio_by_the_mark() {
        let pages = vec![
            page(0, &[letter("A", 0)]),
            page(1, &[letter("B", 1)]),
            page(2, &[letter("B", 1)]),
        ];
        let weights = MarkWeights::new(vec![WeightSection::new(1, 1, 2.5)]);
        let report = grade(&pages, Some(&AnswerKey::parse("A")), &weights);
        let table = results_table(&report, &abcd());
        let average = table.iter().find(|row| row.first().map(String::as_str) == Some("Average"));
        assert_eq!(average, Some(&vec!["Average".to_string(), (0.33 * 2.5).to_string()]));
    }

    #[test]
    fn footer_shows_dash_without_key() {
        let pages = vec![page(0, &[letter("D", 3)])];
        let report = grade(&pages, None, &MarkWeights::default());
        let table = results_table(&report, &abcd());
        let answer = table.iter().find(|row| row.first().map(String::as_str) == Some("Answer"));
        assert_eq!(answer, Some(&vec!["Answer".to_string(), "-".to_string()]));
    }

    #[test]
    fn scores_table_formats_percentages() {
        let (_, mut report) = sample_report();
        report.students.push(StudentRecord {
            page_index: 3,
            label: "Page 4".to_string(),
            answers: Default::default(),
            score: 0.0,
            total_possible: 0.0,
            percentage: 0.0,
        });

        let table = scores_table(&report);
        assert_eq!(table[0], vec!["Student", "Score", "Percentage"]);
        assert_eq!(table[1], vec!["Page 1", "3", "100.0%"]);
        assert_eq!(table[2], vec!["Page 2", "1", "33.3%"]);
        assert_eq!(table[4], vec!["Page 4", "0", "0%"]);
    }

    #[test]
    fn csv_keeps_spacer_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let rows = vec![
            vec!["Student".to_string(), "Q1".to_string()],
            vec![],
            vec!["Answer".to_string(), "-".to_string()],
        ];
        write_csv(&path, &rows).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "Student,Q1\n\"\"\nAnswer,-\n");
    }

    #[test]
    fn json_report_carries_pages_and_grades() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let (pages, report) = sample_report();
        write_json(&path, &pages, &report).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["pages"].as_array().map(Vec::len), Some(3));
        assert_eq!(value["grades"]["hasKey"], serde_json::json!(true));
        assert_eq!(value["grades"]["students"][0]["label"], "Page 1");
    }
}
