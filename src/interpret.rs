use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use image::GrayImage;
use log::{debug, info, warn};
use logging_timer::time;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::alignment::detect_offset;
use crate::classify::{scan_region, MarkThresholds};
use crate::debug::write_page_debug_image;
use crate::geometry::Offset;
use crate::grading::AnswerKey;
use crate::image_utils::to_luminance;
use crate::sheet::{standard_regions, Region, RegionKind, SheetTemplate};
use crate::types::{Detection, PageId, RegionId, Size};

#[derive(Debug, Clone)]
pub struct InterpretOptions {
    pub template: SheetTemplate,
    pub debug: bool,
    /// Spread pages over the rayon pool. Output order is the input order
    /// either way.
    pub parallel: bool,
    /// Only used to color debug images.
    pub answer_key: Option<AnswerKey>,
}

impl Default for InterpretOptions {
    fn default() -> Self {
        Self {
            template: SheetTemplate::default(),
            debug: false,
            parallel: true,
            answer_key: None,
        }
    }
}

#[derive(Debug)]
pub enum InterpretError {
    /// The page could not be decoded into a raster.
    ImageOpenError(PathBuf, String),
}

impl Display for InterpretError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterpretError::ImageOpenError(path, reason) => {
                write!(f, "cannot decode page image {}: {}", path.display(), reason)
            }
        }
    }
}

impl std::error::Error for InterpretError {}

/// Detections of one region, in row order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionResult {
    pub id: RegionId,
    pub kind: RegionKind,
    pub detections: Vec<Detection>,
}

/// Everything read from one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    /// Position of the page in the batch, from 0.
    pub index: usize,
    pub page_id: PageId,
    pub offset: Offset,
    pub regions: Vec<RegionResult>,
}

impl PageResult {
    pub fn detections_for(&self, id: &RegionId) -> Option<&[Detection]> {
        self.regions
            .iter()
            .find(|region| &region.id == id)
            .map(|region| region.detections.as_slice())
    }

    /// All answer detections, in region order.
    pub fn answers(&self) -> impl Iterator<Item = &Detection> {
        self.regions
            .iter()
            .filter(|region| matches!(region.kind, RegionKind::Answer { .. }))
            .flat_map(|region| region.detections.iter())
    }
}

/// A loaded page: its grayscale raster, the regions laid over it, and what
/// has been read from them so far.
#[derive(Debug, Clone)]
pub struct Page {
    pub index: usize,
    pub id: PageId,
    pub image: GrayImage,
    pub offset: Offset,
    pub regions: Vec<Region>,
    results: Vec<RegionResult>,
}

impl Page {
    /// Registers the template against `image` and lays out the standard
    /// regions.
    pub fn new(index: usize, image: GrayImage, template: &SheetTemplate) -> Self {
        let id = PageId::for_index(index);
        let offset = detect_offset(&image, &template.alignment);
        let regions = standard_regions(template, Self::size_of(&image), &id, offset);
        Self {
            index,
            id,
            image,
            offset,
            regions,
            results: vec![],
        }
    }

    fn size_of(image: &GrayImage) -> Size<u32> {
        Size {
            width: image.width(),
            height: image.height(),
        }
    }

    pub fn size(&self) -> Size<u32> {
        Self::size_of(&self.image)
    }

    pub fn results(&self) -> &[RegionResult] {
        &self.results
    }

    /// Reads every region of the page.
    pub fn detect(&mut self, thresholds: &MarkThresholds) {
        self.results = self
            .regions
            .iter()
            .map(|region| RegionResult {
                id: region.id.clone(),
                kind: region.kind,
                detections: scan_region(&self.image, region, thresholds),
            })
            .collect();
    }

    /// The topmost-listed region containing the point, if any.
    pub fn region_at(&self, x: f32, y: f32) -> Option<&Region> {
        self.regions.iter().find(|region| region.bounds.contains(x, y))
    }

    /// Moves a region's origin. Detections were measured against the old
    /// geometry, so they are dropped.
    pub fn move_region(&mut self, id: &RegionId, x: f32, y: f32) -> bool {
        match self.regions.iter_mut().find(|region| &region.id == id) {
            Some(region) => {
                region.move_to(x, y);
                self.results.clear();
                true
            }
            None => false,
        }
    }

    /// Discards manual adjustments: registers again and restores the template
    /// layout.
    pub fn reset_template(&mut self, template: &SheetTemplate) {
        self.offset = detect_offset(&self.image, &template.alignment);
        self.regions = standard_regions(template, self.size(), &self.id, self.offset);
        self.results.clear();
    }

    pub fn result(&self) -> PageResult {
        PageResult {
            index: self.index,
            page_id: self.id.clone(),
            offset: self.offset,
            regions: self.results.clone(),
        }
    }
}

/// Decodes a page image into a luminance raster.
#[time]
pub fn load_page_image(image_path: &Path) -> Result<GrayImage, InterpretError> {
    match image::open(image_path) {
        Ok(img) => Ok(to_luminance(&img.into_rgb8())),
        Err(e) => Err(InterpretError::ImageOpenError(
            image_path.to_path_buf(),
            e.to_string(),
        )),
    }
}

/// Loads, registers and reads one page.
#[time]
pub fn interpret_page(
    index: usize,
    image_path: &Path,
    options: &InterpretOptions,
) -> Result<PageResult, InterpretError> {
    let image = load_page_image(image_path)?;
    let mut page = Page::new(index, image, &options.template);
    page.detect(&options.template.thresholds);
    debug!("{}: read {}", page.id, image_path.display());
    for (region, result) in page.regions.iter().zip(page.results()) {
        debug!(
            "{} {}: {} detections",
            region.id,
            region.caption(),
            result.detections.len()
        );
    }

    if options.debug {
        if let Err(e) = write_page_debug_image(
            image_path,
            &page,
            &options.template.alignment,
            options.answer_key.as_ref(),
        ) {
            warn!("{}: could not write debug image: {}", page.id, e);
        }
    }

    Ok(page.result())
}

/// Reads every page. `progress` gets `(completed, total)` after each page.
/// The first page that fails to decode fails the batch.
#[time("info")]
pub fn interpret_pages<P>(
    image_paths: &[PathBuf],
    options: &InterpretOptions,
    progress: P,
) -> Result<Vec<PageResult>, InterpretError>
where
    P: Fn(usize, usize) + Sync,
{
    let total = image_paths.len();
    let completed = AtomicUsize::new(0);
    let run = |(index, path): (usize, &PathBuf)| -> Result<PageResult, InterpretError> {
        let result = interpret_page(index, path, options)?;
        progress(completed.fetch_add(1, Ordering::SeqCst) + 1, total);
        Ok(result)
    };

    let results = if options.parallel {
        image_paths
            .par_iter()
            .enumerate()
            .map(run)
            .collect::<Result<Vec<_>, _>>()?
    } else {
        image_paths
            .iter()
            .enumerate()
            .map(run)
            .collect::<Result<Vec<_>, _>>()?
    };

    info!("read {} pages", results.len());
    Ok(results)
}
