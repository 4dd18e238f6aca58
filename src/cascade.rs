//! Multiscale face detection with a pixel-comparison tree cascade.
//!
//! Every tree in the cascade is a complete binary tree of depth `tree_depth`.
//! Internal nodes compare two pixel intensities at offsets relative to the
//! window centre, expressed in units of `window_size / 256`, and the leaves
//! hold confidence increments. After each tree the running sum is checked
//! against that tree's threshold, so each tree doubles as a reject stage.

use std::path::Path;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::image::Image;

const MODEL_NAME: &str = "cascade";

/// Trees deeper than this are rejected by the loaders.
pub(crate) const MAX_TREE_DEPTH: i32 = 16;

/// Number of header bytes preceding the cascade dimensions.
const CASCADE_HEADER_LEN: usize = 8;

/// A detected window: centre, diameter and cascade confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub row: f64,
    pub col: f64,
    pub size: f64,
    /// Accumulated stage margin. Not a probability.
    pub score: f64,
}

impl Detection {
    pub fn new(row: f64, col: f64, size: f64, score: f64) -> Self {
        Self {
            row,
            col,
            size,
            score,
        }
    }
}

/// Window sweep parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    /// Window step as a fraction of the window size.
    pub shift_factor: f64,
    pub min_size: f64,
    pub max_size: f64,
    /// Growth factor between consecutive window sizes.
    pub scale_factor: f64,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            shift_factor: 0.1,
            min_size: 100.0,
            max_size: 1000.0,
            scale_factor: 1.1,
        }
    }
}

/// Immutable face classifier forest.
#[derive(Debug, Clone)]
pub struct CascadeModel {
    tree_depth: u32,
    /// Four test codes per node, `2^depth` node slots per tree. Slot 0 is
    /// unused so that the root sits at index 1.
    codes: Vec<i8>,
    /// `2^depth` leaf outputs per tree.
    leaves: Vec<f32>,
    thresholds: Vec<f32>,
}

impl CascadeModel {
    /// Parse a facefinder cascade.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = ModelReader::new(MODEL_NAME, bytes);
        reader.skip(CASCADE_HEADER_LEN)?;
        let tree_depth = reader.read_tree_depth()?;
        let num_trees = reader.read_count("tree count")?;

        let nodes = 1usize << tree_depth;
        reader.require(num_trees, (4 * nodes - 4) + 4 * nodes + 4)?;
        let mut codes = Vec::with_capacity(num_trees * 4 * nodes);
        let mut leaves = Vec::with_capacity(num_trees * nodes);
        let mut thresholds = Vec::with_capacity(num_trees);
        for _ in 0..num_trees {
            codes.extend_from_slice(&[0; 4]);
            codes.extend(reader.read_codes(4 * nodes - 4)?);
            for _ in 0..nodes {
                leaves.push(reader.read_f32()?);
            }
            thresholds.push(reader.read_f32()?);
        }
        if reader.remaining() > 0 {
            debug!(trailing = reader.remaining(), "ignoring trailing cascade bytes");
        }

        info!(tree_depth, num_trees, "loaded face cascade");
        Ok(Self {
            tree_depth,
            codes,
            leaves,
            thresholds,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn num_trees(&self) -> usize {
        self.thresholds.len()
    }

    pub fn tree_depth(&self) -> u32 {
        self.tree_depth
    }

    /// Evaluate the window of diameter `size` centred at `(row, col)`.
    ///
    /// Returns the confidence margin when every stage passes.
    pub fn classify_region(&self, image: &Image, row: i32, col: i32, size: f64) -> Option<f64> {
        let r = f64::from(256 * row);
        let c = f64::from(256 * col);
        let nodes = 1usize << self.tree_depth;
        let at = |base: f64, code: i8| ((base + f64::from(code) * size) as i32) >> 8;

        let mut root = 0;
        let mut sum = 0.0f64;
        for (tree, &threshold) in self.thresholds.iter().enumerate() {
            let mut idx = 1;
            for _ in 0..self.tree_depth {
                let node = &self.codes[root + 4 * idx..root + 4 * idx + 4];
                let a = image.get_clamped(at(r, node[0]), at(c, node[1]));
                let b = image.get_clamped(at(r, node[2]), at(c, node[3]));
                idx = 2 * idx + usize::from(a <= b);
            }
            sum += f64::from(self.leaves[nodes * tree + idx - nodes]);
            if sum <= f64::from(threshold) {
                return None;
            }
            root += 4 * nodes;
        }
        let last = self.thresholds.last().copied().map_or(0.0, f64::from);
        Some(sum - last)
    }
}

/// Sweep square windows from `min_size` to `max_size` over the image.
pub fn run_cascade(image: &Image, model: &CascadeModel, params: &DetectionParams) -> Vec<Detection> {
    let nrows = image.nrows() as i32;
    let ncols = image.ncols() as i32;
    let mut detections = Vec::new();

    let mut size = params.min_size;
    while size <= params.max_size {
        let step = (params.shift_factor * size).max(1.0) as i32;
        let offset = (size / 2.0 + 1.0) as i32;

        let mut r = offset;
        while r <= nrows - offset {
            let mut c = offset;
            while c <= ncols - offset {
                if let Some(score) = model.classify_region(image, r, c, size) {
                    if score > 0.0 {
                        detections.push(Detection::new(f64::from(r), f64::from(c), size, score));
                    }
                }
                c += step;
            }
            r += step;
        }
        size *= params.scale_factor;
    }

    debug!(count = detections.len(), "raw cascade detections");
    detections
}

/// Little-endian cursor shared by the model loaders.
pub(crate) struct ModelReader<'a> {
    model: &'static str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ModelReader<'a> {
    pub(crate) fn new(model: &'static str, bytes: &'a [u8]) -> Self {
        Self {
            model,
            bytes,
            pos: 0,
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(Error::model_format(
                self.model,
                format!(
                    "truncated at byte {}: needed {len} more bytes, {} available",
                    self.pos,
                    self.remaining()
                ),
            ));
        }
        let bytes: &'a [u8] = self.bytes;
        let slice = &bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Fail early when `count` records of `record_len` bytes cannot fit.
    pub(crate) fn require(&self, count: usize, record_len: usize) -> Result<()> {
        match count.checked_mul(record_len) {
            Some(needed) if needed <= self.remaining() => Ok(()),
            _ => Err(Error::model_format(
                self.model,
                format!(
                    "{count} records of {record_len} bytes exceed the {} bytes available",
                    self.remaining()
                ),
            )),
        }
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }

    pub(crate) fn read_i32(&mut self) -> Result<i32> {
        let mut word = [0u8; 4];
        word.copy_from_slice(self.take(4)?);
        Ok(i32::from_le_bytes(word))
    }

    pub(crate) fn read_f32(&mut self) -> Result<f32> {
        let mut word = [0u8; 4];
        word.copy_from_slice(self.take(4)?);
        Ok(f32::from_le_bytes(word))
    }

    pub(crate) fn read_codes(&mut self, len: usize) -> Result<impl Iterator<Item = i8> + 'a> {
        Ok(self.take(len)?.iter().map(|&b| b as i8))
    }

    pub(crate) fn read_tree_depth(&mut self) -> Result<u32> {
        let depth = self.read_i32()?;
        if !(0..=MAX_TREE_DEPTH).contains(&depth) {
            return Err(Error::model_format(
                self.model,
                format!("tree depth {depth} outside 0..={MAX_TREE_DEPTH}"),
            ));
        }
        Ok(depth as u32)
    }

    /// Read a strictly positive element count.
    pub(crate) fn read_count(&mut self, what: &str) -> Result<usize> {
        let count = self.read_i32()?;
        if count <= 0 {
            return Err(Error::model_format(
                self.model,
                format!("{what} must be positive, got {count}"),
            ));
        }
        Ok(count as usize)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// One tree of the given depth in on-disk layout.
    pub(crate) struct TreeSpec {
        pub codes: Vec<i8>,
        pub leaves: Vec<f32>,
        pub threshold: f32,
    }

    pub(crate) fn encode_cascade(depth: i32, trees: &[TreeSpec]) -> Vec<u8> {
        let mut bytes = vec![0u8; CASCADE_HEADER_LEN];
        bytes.extend_from_slice(&depth.to_le_bytes());
        bytes.extend_from_slice(&(trees.len() as i32).to_le_bytes());
        for tree in trees {
            bytes.extend(tree.codes.iter().map(|&c| c as u8));
            for leaf in &tree.leaves {
                bytes.extend_from_slice(&leaf.to_le_bytes());
            }
            bytes.extend_from_slice(&tree.threshold.to_le_bytes());
        }
        bytes
    }

    /// Depth-1 tree comparing the window centre with itself, so the test
    /// always takes the `<=` branch and yields `value`.
    pub(crate) fn constant_tree(value: f32, threshold: f32) -> TreeSpec {
        TreeSpec {
            codes: vec![0; 4],
            leaves: vec![-1000.0, value],
            threshold,
        }
    }

    fn flat(nrows: usize, ncols: usize, value: u8) -> Image {
        Image::from_fn(nrows, ncols, |_, _| value)
    }

    #[test]
    fn parses_and_scores_constant_cascade() {
        let bytes = encode_cascade(1, &[constant_tree(3.0, 1.0), constant_tree(2.0, 4.5)]);
        let model = CascadeModel::from_bytes(&bytes).unwrap();
        assert_eq!(model.num_trees(), 2);
        assert_eq!(model.tree_depth(), 1);

        let image = flat(50, 50, 80);
        let score = model.classify_region(&image, 25, 25, 20.0).unwrap();
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn failing_stage_rejects_window() {
        let bytes = encode_cascade(1, &[constant_tree(3.0, 1.0), constant_tree(-5.0, 0.0)]);
        let model = CascadeModel::from_bytes(&bytes).unwrap();
        let image = flat(50, 50, 80);
        assert_eq!(model.classify_region(&image, 25, 25, 20.0), None);
    }

    #[test]
    fn margin_equal_to_threshold_rejects() {
        let bytes = encode_cascade(1, &[constant_tree(2.0, 2.0)]);
        let model = CascadeModel::from_bytes(&bytes).unwrap();
        let image = flat(10, 10, 0);
        assert_eq!(model.classify_region(&image, 5, 5, 4.0), None);
    }

    #[test]
    fn pixel_tests_follow_window_scale() {
        // Compare the centre against a point 64/256 of the window to the right:
        // centre <= right scores, anything else rejects.
        let tree = TreeSpec {
            codes: vec![0, 0, 0, 64],
            leaves: vec![-1.0, 5.0],
            threshold: 0.0,
        };
        let model = CascadeModel::from_bytes(&encode_cascade(1, &[tree])).unwrap();
        // Bright band starting at column 30.
        let image = Image::from_fn(40, 60, |_, c| if c >= 30 { 200 } else { 10 });
        // Window 40 wide centred at col 25: offset is (6400 + 2560) >> 8 = 35.
        assert_eq!(model.classify_region(&image, 20, 25, 40.0), Some(5.0));
        // Centre already inside the band: 200 <= 200 still passes.
        assert_eq!(model.classify_region(&image, 20, 35, 40.0), Some(5.0));
        // Window 8 wide centred at col 25: offset lands on col 27, both dark.
        assert_eq!(model.classify_region(&image, 20, 25, 8.0), Some(5.0));

        let inverted = Image::from_fn(40, 60, |_, c| if c >= 30 { 10 } else { 200 });
        assert_eq!(model.classify_region(&inverted, 20, 25, 40.0), None);
    }

    #[test]
    fn sweep_visits_expected_windows() {
        let model = CascadeModel::from_bytes(&encode_cascade(1, &[constant_tree(1.0, 0.0)])).unwrap();
        let image = flat(100, 100, 0);
        let params = DetectionParams {
            shift_factor: 0.5,
            min_size: 40.0,
            max_size: 45.0,
            scale_factor: 1.5,
        };
        let detections = run_cascade(&image, &model, &params);
        // offset 21, step 20: rows/cols 21, 41, 61, 79 excluded (> 100 - 21)
        assert_eq!(detections.len(), 9);
        assert!(detections.iter().all(|d| d.size == 40.0 && d.score == 1.0));
        assert_eq!(detections[0].row, 21.0);
        assert_eq!(detections[8].col, 61.0);
    }

    #[test]
    fn sweep_grows_window_until_max() {
        let model = CascadeModel::from_bytes(&encode_cascade(1, &[constant_tree(1.0, 0.0)])).unwrap();
        let image = flat(200, 200, 0);
        let params = DetectionParams {
            shift_factor: 1.0,
            min_size: 100.0,
            max_size: 130.0,
            scale_factor: 1.2,
        };
        let sizes: Vec<f64> = run_cascade(&image, &model, &params)
            .iter()
            .map(|d| d.size)
            .collect();
        assert!(sizes.contains(&100.0));
        assert!(sizes.iter().any(|&s| (s - 120.0).abs() < 1e-9));
        assert!(sizes.iter().all(|&s| s <= 130.0));
    }

    #[test]
    fn empty_image_yields_no_detections() {
        let model = CascadeModel::from_bytes(&encode_cascade(1, &[constant_tree(1.0, 0.0)])).unwrap();
        let image = flat(20, 20, 0);
        assert!(run_cascade(&image, &model, &DetectionParams::default()).is_empty());
    }

    #[test]
    fn rejects_malformed_bytes() {
        assert!(CascadeModel::from_bytes(&[]).is_err());
        assert!(CascadeModel::from_bytes(&encode_cascade(1, &[])).is_err());
        assert!(CascadeModel::from_bytes(&encode_cascade(-1, &[])).is_err());

        let mut oversized = vec![0u8; CASCADE_HEADER_LEN];
        oversized.extend_from_slice(&6i32.to_le_bytes());
        oversized.extend_from_slice(&i32::MAX.to_le_bytes());
        assert!(CascadeModel::from_bytes(&oversized).is_err());

        let mut truncated = encode_cascade(1, &[constant_tree(1.0, 0.0)]);
        truncated.pop();
        let err = CascadeModel::from_bytes(&truncated).unwrap_err();
        assert!(matches!(err, Error::ModelFormat { model: "cascade", .. }));
    }
}
