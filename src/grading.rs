use std::collections::BTreeMap;
use std::path::Path;

use log::debug;
use logging_timer::time;
use serde::{de::IgnoredAny, Deserialize, Deserializer, Serialize};

use crate::interpret::PageResult;
use crate::sheet::{ConfigError, RegionKind};
use crate::types::{Detection, IdentifierField, Symbol};

/// Expected answers, question 1 first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerKey {
    answers: Vec<String>,
}

impl AnswerKey {
    /// Reads every A-D letter (any case) in order; the n-th letter found is
    /// the answer to question n. Everything else, numbering included, is
    /// ignored.
    pub fn parse(text: &str) -> Self {
        let answers = text
            .chars()
            .map(|c| c.to_ascii_uppercase())
            .filter(|c| matches!(c, 'A'..='D'))
            .map(String::from)
            .collect();
        Self { answers }
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    pub fn get(&self, question: u32) -> Option<&str> {
        let index = question.checked_sub(1)? as usize;
        self.answers.get(index).map(String::as_str)
    }

    /// `(question, answer)` pairs in question order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.answers
            .iter()
            .enumerate()
            .map(|(i, answer)| (i as u32 + 1, answer.as_str()))
    }

    pub fn is_correct(&self, detection: &Detection) -> bool {
        match (detection.question, detection.symbol.label()) {
            (Some(question), Some(label)) => self.get(question) == Some(label),
            _ => false,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMark {
    Number(f64),
    Text(String),
    Other(IgnoredAny),
}

fn lenient_mark<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawMark::deserialize(deserializer)? {
        RawMark::Number(mark) => mark,
        RawMark::Text(text) => text.trim().parse().unwrap_or(f64::NAN),
        RawMark::Other(_) => f64::NAN,
    })
}

fn default_mark() -> f64 {
    1.0
}

/// A run of questions worth `mark` each.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightSection {
    pub start: u32,
    pub end: u32,
    #[serde(deserialize_with = "lenient_mark", default = "default_mark")]
    pub mark: f64,
}

fn usable_mark(mark: f64) -> f64 {
    if mark.is_nan() || mark <= 0.0 {
        1.0
    } else {
        mark
    }
}

impl WeightSection {
    pub fn new(start: u32, end: u32, mark: f64) -> Self {
        Self { start, end, mark }.normalized()
    }

    /// Clamps a malformed section instead of rejecting it: an unusable mark
    /// becomes 1 and a reversed range collapses to its start.
    pub fn normalized(self) -> Self {
        Self {
            start: self.start,
            end: self.end.max(self.start),
            mark: usable_mark(self.mark),
        }
    }

    pub fn contains(&self, question: u32) -> bool {
        (self.start..=self.end).contains(&question)
    }
}

/// Per-question marks. Sections may overlap; the last listed section that
/// covers a question decides its mark.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkWeights {
    sections: Vec<WeightSection>,
}

impl MarkWeights {
    pub fn new(sections: Vec<WeightSection>) -> Self {
        Self {
            sections: sections.into_iter().map(WeightSection::normalized).collect(),
        }
    }

    /// Reads a JSON array of sections.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let sections: Vec<WeightSection> =
            serde_json::from_str(&json).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        Ok(Self::new(sections))
    }

    pub fn sections(&self) -> &[WeightSection] {
        &self.sections
    }

    pub fn mark_for(&self, question: u32) -> f64 {
        self.sections
            .iter()
            .rev()
            .find(|section| section.contains(question))
            .map_or(1.0, |section| usable_mark(section.mark))
    }
}

fn usable_key(key: Option<&AnswerKey>) -> Option<&AnswerKey> {
    key.filter(|key| !key.is_empty())
}

/// Drops answer rows past the last question that matters: the key length if
/// there is a key, otherwise the last question answered on this page.
pub fn trim_trailing_questions(page: &mut PageResult, key: Option<&AnswerKey>) {
    let limit = match usable_key(key) {
        Some(key) => key.len() as u32,
        None => page
            .answers()
            .filter(|detection| !detection.symbol.is_blank())
            .filter_map(|detection| detection.question)
            .max()
            .unwrap_or(0),
    };

    for region in page
        .regions
        .iter_mut()
        .filter(|region| matches!(region.kind, RegionKind::Answer { .. }))
    {
        region
            .detections
            .retain(|detection| detection.question.map_or(true, |q| q <= limit));
    }
}

fn identifier_value(page: &PageResult, field: IdentifierField) -> Option<&str> {
    page.regions
        .iter()
        .find(|region| region.kind == RegionKind::Identifier { field })
        .and_then(|region| region.detections.first())
        .and_then(|detection| detection.symbol.label())
}

/// Level, class letter and roll number run together, e.g. `3B07`. Unread
/// fields show as `?`; a page with no readable field is named by position.
pub fn student_label(page: &PageResult) -> String {
    let values: Vec<Option<&str>> = IdentifierField::ALL
        .iter()
        .map(|field| identifier_value(page, *field))
        .collect();

    if values.iter().all(Option::is_none) {
        format!("Page {}", page.index + 1)
    } else {
        values.iter().map(|value| value.unwrap_or("?")).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionStats {
    pub question: u32,
    pub mark: f64,
    pub key: Option<String>,
    /// Students with a reading for this question, blank or not.
    pub attempts: u32,
    pub correct: u32,
    /// How often each symbol was read, `BLANK` and `MULT` included.
    pub option_counts: BTreeMap<String, u32>,
}

impl QuestionStats {
    fn new(question: u32, mark: f64, key: Option<String>) -> Self {
        Self {
            question,
            mark,
            key,
            attempts: 0,
            correct: 0,
            option_counts: BTreeMap::new(),
        }
    }

    fn denominator(&self) -> f64 {
        self.attempts.max(1) as f64
    }

    pub fn correct_ratio(&self) -> f64 {
        self.correct as f64 / self.denominator()
    }

    pub fn option_ratio(&self, symbol: &str) -> f64 {
        self.option_counts.get(symbol).copied().unwrap_or(0) as f64 / self.denominator()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub page_index: usize,
    pub label: String,
    pub answers: BTreeMap<u32, Symbol>,
    pub score: f64,
    pub total_possible: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeReport {
    pub students: Vec<StudentRecord>,
    pub questions: Vec<QuestionStats>,
    pub has_key: bool,
}

/// Scores every page against `key` and collects per-question statistics.
/// Trimming is applied to copies, so `pages` can be graded again after the
/// key or weights change.
#[time]
pub fn grade(pages: &[PageResult], key: Option<&AnswerKey>, weights: &MarkWeights) -> GradeReport {
    let key = usable_key(key);
    let trimmed: Vec<PageResult> = pages
        .iter()
        .cloned()
        .map(|mut page| {
            trim_trailing_questions(&mut page, key);
            page
        })
        .collect();

    let max_question = trimmed
        .iter()
        .flat_map(|page| page.answers())
        .filter_map(|detection| detection.question)
        .max()
        .unwrap_or(0);

    let mut questions: Vec<QuestionStats> = (1..=max_question)
        .map(|q| {
            let expected = key.and_then(|key| key.get(q)).map(String::from);
            QuestionStats::new(q, weights.mark_for(q), expected)
        })
        .collect();

    let students = trimmed
        .iter()
        .map(|page| {
            let mut record = StudentRecord {
                page_index: page.index,
                label: student_label(page),
                answers: BTreeMap::new(),
                score: 0.0,
                total_possible: 0.0,
                percentage: 0.0,
            };

            for detection in page.answers() {
                let Some(question) = detection.question else {
                    continue;
                };
                let mark = weights.mark_for(question);
                let correct = key.map_or(false, |key| key.is_correct(detection));

                record.total_possible += mark;
                if correct {
                    record.score += mark;
                }
                record.answers.insert(question, detection.symbol.clone());

                let index = question.checked_sub(1).map(|i| i as usize);
                if let Some(stats) = index.and_then(|i| questions.get_mut(i)) {
                    stats.attempts += 1;
                    *stats
                        .option_counts
                        .entry(detection.symbol.to_string())
                        .or_insert(0) += 1;
                    if correct {
                        stats.correct += 1;
                    }
                }
            }

            if record.total_possible > 0.0 {
                record.percentage = record.score / record.total_possible * 100.0;
            }
            debug!(
                "{}: {} / {} ({:.1}%)",
                record.label, record.score, record.total_possible, record.percentage
            );
            record
        })
        .collect();

    GradeReport {
        students,
        questions,
        has_key: key.is_some(),
    }
}
