use std::fmt::Display;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::alignment::AlignmentConfig;
use crate::classify::MarkThresholds;
use crate::geometry::{is_gap_row, row_layout, Offset, RegionBounds, RowLayout};
use crate::types::{IdentifierField, PageId, RegionId, Size};

/// Calibration for one physical bubble-sheet layout. Every position is a
/// fraction of the page width or height, so the same template fits any scan
/// resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SheetTemplate {
    pub answer_blocks: AnswerBlockLayout,
    pub identifier_block: IdentifierBlockLayout,
    pub alignment: AlignmentConfig,
    pub thresholds: MarkThresholds,
}

/// The answer grid: identical blocks of rows, one option per column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnswerBlockLayout {
    pub width_ratio: f32,
    pub height_ratio: f32,
    pub top_ratio: f32,
    pub rows: u32,
    pub labels: Vec<String>,
    pub gap_ratio: f32,
    pub has_gaps: bool,
    pub blocks: Vec<AnswerBlockPlacement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerBlockPlacement {
    pub left_ratio: f32,
    pub start_question: u32,
    /// Fixed pixel nudge applied on top of the proportional top.
    #[serde(default)]
    pub y_nudge: f32,
}

impl Default for AnswerBlockLayout {
    fn default() -> Self {
        Self {
            width_ratio: 0.165,
            height_ratio: 0.468,
            top_ratio: 0.273,
            rows: 35,
            labels: labels(&["A", "B", "C", "D"]),
            gap_ratio: 0.6,
            has_gaps: true,
            blocks: vec![
                AnswerBlockPlacement {
                    left_ratio: 0.43,
                    start_question: 1,
                    y_nudge: 0.0,
                },
                AnswerBlockPlacement {
                    left_ratio: 0.723,
                    start_question: 31,
                    y_nudge: -3.0,
                },
            ],
        }
    }
}

/// The student identifier: single-column bubble strips sharing a top edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdentifierBlockLayout {
    pub top_ratio: f32,
    pub height_ratio: f32,
    pub width_ratio: f32,
    pub gap_ratio: f32,
    pub has_gaps: bool,
    pub fields: Vec<IdentifierColumnLayout>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifierColumnLayout {
    pub field: IdentifierField,
    pub left_ratio: f32,
    /// Column height as a fraction of the block height.
    pub height_scale: f32,
    /// One label per row, top to bottom.
    pub labels: Vec<String>,
}

impl Default for IdentifierBlockLayout {
    fn default() -> Self {
        let digits = labels(&["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"]);
        Self {
            top_ratio: 0.066,
            height_ratio: 0.135,
            width_ratio: 0.015,
            gap_ratio: 1.0,
            has_gaps: false,
            fields: vec![
                IdentifierColumnLayout {
                    field: IdentifierField::Level,
                    left_ratio: 0.435,
                    height_scale: 0.7,
                    labels: labels(&["1", "2", "3", "4", "5", "6", "7"]),
                },
                IdentifierColumnLayout {
                    field: IdentifierField::Letter,
                    left_ratio: 0.505,
                    height_scale: 0.6,
                    labels: labels(&["A", "B", "C", "D", "E", "S"]),
                },
                IdentifierColumnLayout {
                    field: IdentifierField::Ten,
                    left_ratio: 0.6,
                    height_scale: 1.0,
                    labels: digits.clone(),
                },
                IdentifierColumnLayout {
                    field: IdentifierField::Unit,
                    left_ratio: 0.64,
                    height_scale: 1.0,
                    labels: digits,
                },
            ],
        }
    }
}

fn labels(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "cannot read {}: {}", path.display(), e),
            ConfigError::Parse(path, e) => write!(f, "cannot parse {}: {}", path.display(), e),
            ConfigError::Invalid(reason) => write!(f, "invalid template: {}", reason),
        }
    }
}

impl std::error::Error for ConfigError {}

impl SheetTemplate {
    /// Reads a template from JSON. Missing keys keep their calibrated defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let template: SheetTemplate =
            serde_json::from_str(&json).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        template.validate()?;
        Ok(template)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let answers = &self.answer_blocks;
        if answers.rows == 0 {
            return Err(ConfigError::Invalid("answer blocks need at least one row".into()));
        }
        if answers.labels.is_empty() {
            return Err(ConfigError::Invalid("answer blocks need at least one option label".into()));
        }
        if let Some(column) = self
            .identifier_block
            .fields
            .iter()
            .find(|column| column.labels.is_empty())
        {
            return Err(ConfigError::Invalid(format!(
                "identifier column {:?} has no row labels",
                column.field
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum RegionKind {
    #[serde(rename_all = "camelCase", rename = "answer")]
    Answer { start_question: u32 },

    #[serde(rename = "identifier")]
    Identifier { field: IdentifierField },
}

/// A rectangle of the page subdivided into bubble cells.
///
/// Answer regions have one column per option label and one row per question
/// (plus gap rows). Identifier regions are a single column with one row per
/// label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    pub id: RegionId,
    pub kind: RegionKind,
    pub bounds: RegionBounds,
    pub rows: u32,
    pub columns: u32,
    pub labels: Vec<String>,
    pub gap_ratio: f32,
    pub has_gaps: bool,
}

impl Region {
    pub fn row_layout(&self) -> Vec<RowLayout> {
        row_layout(self.bounds.height, self.rows, self.gap_ratio, self.has_gaps)
    }

    /// Number of rows that hold bubbles.
    pub fn question_count(&self) -> u32 {
        (0..self.rows as usize)
            .filter(|row| !is_gap_row(*row, self.has_gaps))
            .count() as u32
    }

    pub fn caption(&self) -> String {
        match self.kind {
            RegionKind::Identifier { field } => field.caption().to_string(),
            RegionKind::Answer { start_question } => {
                let last = (start_question + self.question_count()).saturating_sub(1);
                format!("Q{} - Q{}", start_question, last)
            }
        }
    }

    pub fn is_answer(&self) -> bool {
        matches!(self.kind, RegionKind::Answer { .. })
    }

    pub fn move_to(&mut self, x: f32, y: f32) {
        self.bounds.x = x;
        self.bounds.y = y;
    }
}

/// Lays the template out on a page of `size` pixels, shifted by `offset`.
pub fn standard_regions(
    template: &SheetTemplate,
    size: Size<u32>,
    page_id: &PageId,
    offset: Offset,
) -> Vec<Region> {
    let width = size.width as f32;
    let height = size.height as f32;
    let mut regions = vec![];

    let id_block = &template.identifier_block;
    let id_top = height * id_block.top_ratio + offset.y;
    let id_height = height * id_block.height_ratio;
    for column in &id_block.fields {
        regions.push(Region {
            id: RegionId::new(format!("{}_id_{}", page_id, column.field.id_suffix())),
            kind: RegionKind::Identifier {
                field: column.field,
            },
            bounds: RegionBounds {
                x: width * column.left_ratio + offset.x,
                y: id_top,
                width: width * id_block.width_ratio,
                height: id_height * column.height_scale,
            },
            rows: column.labels.len() as u32,
            columns: 1,
            labels: column.labels.clone(),
            gap_ratio: id_block.gap_ratio,
            has_gaps: id_block.has_gaps,
        });
    }

    let answers = &template.answer_blocks;
    let answer_top = height * answers.top_ratio + offset.y;
    for (i, block) in answers.blocks.iter().enumerate() {
        regions.push(Region {
            id: RegionId::new(format!("{}_b{}", page_id, i + 1)),
            kind: RegionKind::Answer {
                start_question: block.start_question,
            },
            bounds: RegionBounds {
                x: width * block.left_ratio + offset.x,
                y: answer_top + block.y_nudge,
                width: width * answers.width_ratio,
                height: height * answers.height_ratio,
            },
            rows: answers.rows,
            columns: answers.labels.len() as u32,
            labels: answers.labels.clone(),
            gap_ratio: answers.gap_ratio,
            has_gaps: answers.has_gaps,
        });
    }

    regions
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PAGE: Size<u32> = Size {
        width: 1000,
        height: 2000,
    };

    fn find<'a>(regions: &'a [Region], id: &str) -> &'a Region {
        regions
            .iter()
            .find(|r| r.id.as_str() == id)
            .unwrap_or_else(|| panic!("missing region {}", id))
    }

    #[test]
    fn standard_regions_have_the_fixed_shape() {
        let regions = standard_regions(
            &SheetTemplate::default(),
            PAGE,
            &PageId::for_index(0),
            Offset::default(),
        );
        assert_eq!(regions.len(), 6);

        let ids: Vec<&str> = regions.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["p0_id_level", "p0_id_letter", "p0_id_n1", "p0_id_n2", "p0_b1", "p0_b2"]
        );

        let row_counts: Vec<u32> = regions.iter().map(|r| r.rows).collect();
        assert_eq!(row_counts, vec![7, 6, 10, 10, 35, 35]);

        for region in &regions {
            match region.kind {
                RegionKind::Answer { .. } => {
                    assert_eq!(region.labels.len() as u32, region.columns);
                }
                RegionKind::Identifier { .. } => {
                    assert_eq!(region.columns, 1);
                    assert_eq!(region.labels.len() as u32, region.rows);
                }
            }
        }
    }

    #[test]
    fn answer_blocks_use_calibrated_proportions() {
        let regions = standard_regions(
            &SheetTemplate::default(),
            PAGE,
            &PageId::for_index(2),
            Offset::default(),
        );
        let b1 = find(&regions, "p2_b1");
        let b2 = find(&regions, "p2_b2");

        assert!((b1.bounds.x - 430.0).abs() < 1e-3);
        assert!((b1.bounds.y - 546.0).abs() < 1e-3);
        assert!((b1.bounds.width - 165.0).abs() < 1e-3);
        assert!((b1.bounds.height - 936.0).abs() < 1e-3);
        assert!((b2.bounds.x - 723.0).abs() < 1e-3);
        assert!((b2.bounds.y - 543.0).abs() < 1e-3);
        assert_eq!(b1.kind, RegionKind::Answer { start_question: 1 });
        assert_eq!(b2.kind, RegionKind::Answer { start_question: 31 });
    }

    #[test]
    fn identifier_columns_scale_their_height() {
        let regions = standard_regions(
            &SheetTemplate::default(),
            PAGE,
            &PageId::for_index(0),
            Offset::default(),
        );
        let level = find(&regions, "p0_id_level");
        let letter = find(&regions, "p0_id_letter");
        let unit = find(&regions, "p0_id_n2");

        assert!((level.bounds.y - 132.0).abs() < 1e-3);
        assert!((level.bounds.height - 189.0).abs() < 1e-3);
        assert!((letter.bounds.height - 162.0).abs() < 1e-3);
        assert!((unit.bounds.height - 270.0).abs() < 1e-3);
        assert!((unit.bounds.x - 640.0).abs() < 1e-3);
        assert!((unit.bounds.width - 15.0).abs() < 1e-3);
        assert_eq!(letter.labels, labels(&["A", "B", "C", "D", "E", "S"]));
    }

    #[test]
    fn offset_shifts_every_region() {
        let template = SheetTemplate::default();
        let page_id = PageId::for_index(0);
        let plain = standard_regions(&template, PAGE, &page_id, Offset::default());
        let shifted = standard_regions(&template, PAGE, &page_id, Offset::new(7.0, -4.0));
        for (a, b) in plain.iter().zip(&shifted) {
            assert!((b.bounds.x - a.bounds.x - 7.0).abs() < 1e-3);
            assert!((b.bounds.y - a.bounds.y + 4.0).abs() < 1e-3);
            assert_eq!(a.bounds.width, b.bounds.width);
            assert_eq!(a.bounds.height, b.bounds.height);
        }
    }

    #[test]
    fn captions_describe_the_region() {
        let regions = standard_regions(
            &SheetTemplate::default(),
            PAGE,
            &PageId::for_index(0),
            Offset::default(),
        );
        assert_eq!(find(&regions, "p0_b1").caption(), "Q1 - Q30");
        assert_eq!(find(&regions, "p0_b2").caption(), "Q31 - Q60");
        assert_eq!(find(&regions, "p0_id_letter").caption(), "Cls");
        assert_eq!(find(&regions, "p0_b1").question_count(), 30);
    }

    #[test]
    fn partial_template_json_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "answerBlocks": {{ "rows": 12 }}, "thresholds": {{ "answer": {{ "darkThreshold": 210 }} }} }}"#
        )
        .unwrap();

        let template = SheetTemplate::load(file.path()).unwrap();
        assert_eq!(template.answer_blocks.rows, 12);
        assert_eq!(template.answer_blocks.width_ratio, 0.165);
        assert_eq!(template.thresholds.answer.dark_threshold, 210);
        assert_eq!(template.thresholds.identifier.dark_threshold, 220);
        assert_eq!(template.alignment.expected_rule_y_ratio, 0.227);
    }

    #[test]
    fn invalid_templates_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "answerBlocks": {{ "labels": [] }} }}"#).unwrap();
        assert!(matches!(
            SheetTemplate::load(file.path()),
            Err(ConfigError::Invalid(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            SheetTemplate::load(file.path()),
            Err(ConfigError::Parse(_, _))
        ));
    }
}
