//! Pupil localization by cascaded regression trees.
//!
//! Unlike the face cascade this does not search: it starts from a seed
//! window and each stage nudges the estimate by the summed tree outputs,
//! shrinking the window as it goes.

use std::path::Path;

use rand::Rng;
use tracing::info;

use crate::cascade::{Detection, ModelReader};
use crate::error::Result;
use crate::image::Image;

const MODEL_NAME: &str = "pupil localizer";

/// Seed placement relative to the face window.
const EYE_ROW_OFFSET: f64 = 0.075;
const EYE_COL_OFFSET: f64 = 0.175;
const EYE_SEED_SIZE: f64 = 0.35;

/// Random seed jitter used when localizing with perturbations.
const JITTER_SIZE_MIN: f64 = 0.925;
const JITTER_SIZE_SPAN: f64 = 0.15;
const JITTER_POSITION: f64 = 0.15;

/// Localized pupil centre, in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyePoint {
    pub row: f64,
    pub col: f64,
}

impl EyePoint {
    pub fn new(row: f64, col: f64) -> Self {
        Self { row, col }
    }
}

/// Starting window for one localization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeSeed {
    pub row: f64,
    pub col: f64,
    pub size: f64,
}

/// Left and right eye seeds for a face detection.
pub fn eye_seeds(face: &Detection) -> [EyeSeed; 2] {
    let row = face.row - EYE_ROW_OFFSET * face.size;
    let size = EYE_SEED_SIZE * face.size;
    [
        EyeSeed {
            row,
            col: face.col - EYE_COL_OFFSET * face.size,
            size,
        },
        EyeSeed {
            row,
            col: face.col + EYE_COL_OFFSET * face.size,
            size,
        },
    ]
}

/// Immutable pupil regression cascade.
#[derive(Debug, Clone)]
pub struct PuplocModel {
    num_stages: usize,
    scale_multiplier: f32,
    trees_per_stage: usize,
    tree_depth: u32,
    /// `4 * (2^depth - 1)` test codes per tree, root at node 0.
    codes: Vec<i8>,
    /// `2^depth` (row, col) output pairs per tree.
    leaves: Vec<f32>,
}

impl PuplocModel {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = ModelReader::new(MODEL_NAME, bytes);
        let num_stages = reader.read_count("stage count")?;
        let scale_multiplier = reader.read_f32()?;
        let trees_per_stage = reader.read_count("trees per stage")?;
        let tree_depth = reader.read_tree_depth()?;

        let nodes = 1usize << tree_depth;
        let num_trees = num_stages.saturating_mul(trees_per_stage);
        reader.require(num_trees, (4 * nodes - 4) + 8 * nodes)?;
        let mut codes = Vec::with_capacity(num_trees * (4 * nodes - 4));
        let mut leaves = Vec::with_capacity(num_trees * 2 * nodes);
        for _ in 0..num_trees {
            codes.extend(reader.read_codes(4 * nodes - 4)?);
            for _ in 0..2 * nodes {
                leaves.push(reader.read_f32()?);
            }
        }

        info!(num_stages, trees_per_stage, tree_depth, "loaded pupil localizer");
        Ok(Self {
            num_stages,
            scale_multiplier,
            trees_per_stage,
            tree_depth,
            codes,
            leaves,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn num_stages(&self) -> usize {
        self.num_stages
    }

    /// Run every stage once from the given window and return `(row, col)`.
    pub fn localize(&self, image: &Image, mut row: f64, mut col: f64, mut size: f64) -> (f64, f64) {
        let nodes = 1usize << self.tree_depth;
        let at = |base: f64, code: i8, size: f64| ((256.0 * base + f64::from(code) * size) as i32) >> 8;

        let mut root = 0;
        for stage in 0..self.num_stages {
            let (mut dr, mut dc) = (0.0f64, 0.0f64);
            for tree in 0..self.trees_per_stage {
                let mut idx = 0;
                for _ in 0..self.tree_depth {
                    let node = &self.codes[root + 4 * idx..root + 4 * idx + 4];
                    let a = image.get_clamped(at(row, node[0], size), at(col, node[1], size));
                    let b = image.get_clamped(at(row, node[2], size), at(col, node[3], size));
                    idx = 2 * idx + 1 + usize::from(a > b);
                }
                let leaf = 2
                    * (self.trees_per_stage * nodes * stage + nodes * tree + idx - (nodes - 1));
                dr += f64::from(self.leaves[leaf]);
                dc += f64::from(self.leaves[leaf + 1]);
                root += 4 * nodes - 4;
            }
            row += dr * size;
            col += dc * size;
            size *= f64::from(self.scale_multiplier);
        }
        (row, col)
    }

    /// Localize from `perturbations` jittered copies of `seed` and take the
    /// per-axis median. A single perturbation uses the seed as is.
    ///
    /// Returns `None` when the estimate leaves the image.
    pub fn locate<R: Rng>(
        &self,
        image: &Image,
        seed: EyeSeed,
        perturbations: usize,
        rng: &mut R,
    ) -> Option<EyePoint> {
        let (row, col) = if perturbations <= 1 {
            self.localize(image, seed.row, seed.col, seed.size)
        } else {
            let mut rows = Vec::with_capacity(perturbations);
            let mut cols = Vec::with_capacity(perturbations);
            for _ in 0..perturbations {
                let size = seed.size * (JITTER_SIZE_MIN + JITTER_SIZE_SPAN * rng.gen::<f64>());
                let row = seed.row + seed.size * JITTER_POSITION * (0.5 - rng.gen::<f64>());
                let col = seed.col + seed.size * JITTER_POSITION * (0.5 - rng.gen::<f64>());
                let (r, c) = self.localize(image, row, col, size);
                rows.push(r);
                cols.push(c);
            }
            (median(&mut rows), median(&mut cols))
        };

        if row.is_finite() && col.is_finite() && image.contains(row, col) {
            Some(EyePoint::new(row, col))
        } else {
            None
        }
    }
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    values[values.len() / 2]
}
