//! End-to-end runs of the frame pipeline on synthetic faces.

use approx::assert_abs_diff_eq;
use eye_overlay::{
    CascadeModel, FacePipeline, OverlayTransform, PipelineConfig, PuplocModel, Renderer, Result,
    RgbaFrame,
};

const NROWS: usize = 200;
const NCOLS: usize = 200;
const FACE_CENTER: (i32, i32) = (100, 100);
// The eye seeds for the detected face sit at (86.5, 68.5) and (86.5, 131.5).
const LEFT_EYE: (i32, i32) = (84, 64);
const RIGHT_EYE: (i32, i32) = (84, 136);

/// Single tree passing windows whose centre is brighter than the point
/// half a window up and to the left.
fn bright_window_cascade() -> CascadeModel {
    let mut bytes = vec![0u8; 8];
    bytes.extend_from_slice(&1i32.to_le_bytes());
    bytes.extend_from_slice(&1i32.to_le_bytes());
    bytes.extend([0i8, 0, -127, -127].iter().map(|&c| c as u8));
    bytes.extend_from_slice(&30.0f32.to_le_bytes());
    bytes.extend_from_slice(&(-1000.0f32).to_le_bytes());
    bytes.extend_from_slice(&0.0f32.to_le_bytes());
    CascadeModel::from_bytes(&bytes).unwrap()
}

/// Depth-2 tree stepping `step` window sizes towards whichever of the two
/// samples `reach/256` of a window away along one axis is brighter, and
/// staying put on a tie.
fn push_step_tree(bytes: &mut Vec<u8>, axis: usize, reach: i8, step: f32) {
    let mut near = [0i8; 2];
    let mut far = [0i8; 2];
    near[axis] = -reach;
    far[axis] = reach;
    let nodes = [
        [near[0], near[1], far[0], far[1]],
        [far[0], far[1], near[0], near[1]],
        [0, 0, 0, 0],
    ];
    bytes.extend(nodes.iter().flatten().map(|&c| c as u8));

    let mut forward = [0.0f32; 2];
    forward[axis] = step;
    let leaves = [[0.0, 0.0], forward, [-forward[0], -forward[1]], [0.0, 0.0]];
    for leaf in leaves.iter().flatten() {
        bytes.extend_from_slice(&leaf.to_le_bytes());
    }
}

/// Eight shrinking stages that climb towards bright spots, one tree per axis.
fn bright_spot_localizer() -> PuplocModel {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&8i32.to_le_bytes());
    bytes.extend_from_slice(&0.85f32.to_le_bytes());
    bytes.extend_from_slice(&2i32.to_le_bytes());
    bytes.extend_from_slice(&2i32.to_le_bytes());
    for _ in 0..8 {
        push_step_tree(&mut bytes, 1, 50, 0.08);
        push_step_tree(&mut bytes, 0, 50, 0.08);
    }
    PuplocModel::from_bytes(&bytes).unwrap()
}

fn in_disc(r: i32, c: i32, center: (i32, i32), radius: i32) -> bool {
    (r - center.0).pow(2) + (c - center.1).pow(2) <= radius * radius
}

/// Dark background, a mid grey face and two bright eyes.
fn face_frame() -> RgbaFrame {
    let mut data = Vec::with_capacity(NROWS * NCOLS * 4);
    for r in 0..NROWS as i32 {
        for c in 0..NCOLS as i32 {
            let v = if in_disc(r, c, LEFT_EYE, 6) || in_disc(r, c, RIGHT_EYE, 6) {
                250
            } else if in_disc(r, c, FACE_CENTER, 60) {
                130
            } else {
                20
            };
            data.extend_from_slice(&[v, v, v, 255]);
        }
    }
    RgbaFrame::new(data, NROWS, NCOLS).unwrap()
}

fn empty_frame() -> RgbaFrame {
    RgbaFrame::new(vec![20; NROWS * NCOLS * 4], NROWS, NCOLS).unwrap()
}

fn pipeline() -> FacePipeline {
    let config = PipelineConfig {
        min_size: 180,
        max_size: 190,
        perturbations: 1,
        ..Default::default()
    };
    FacePipeline::new(bright_window_cascade(), bright_spot_localizer(), config).unwrap()
}

#[derive(Default)]
struct CountingRenderer {
    drawn: Vec<OverlayTransform>,
}

impl Renderer for CountingRenderer {
    fn asset_width(&self) -> f64 {
        128.0
    }

    fn draw_overlay(&mut self, transform: &OverlayTransform) -> Result<()> {
        self.drawn.push(*transform);
        Ok(())
    }
}

#[test]
fn single_face_gets_eye_overlay() {
    let mut pipeline = pipeline();
    let mut renderer = CountingRenderer::default();
    let report = pipeline.run_frame(&face_frame(), &mut renderer).unwrap();

    assert_eq!(report.clusters.len(), 1);
    assert_eq!(report.faces.len(), 1);
    let face = &report.faces[0];
    assert_abs_diff_eq!(face.detection.row, 100.0, epsilon = 1e-9);
    assert_abs_diff_eq!(face.detection.col, 100.0, epsilon = 1e-9);

    let left = face.eyes[0].expect("left eye");
    let right = face.eyes[1].expect("right eye");
    for (eye, truth) in [(left, LEFT_EYE), (right, RIGHT_EYE)] {
        assert!(
            (eye.row - f64::from(truth.0)).abs() <= 1.0 && (eye.col - f64::from(truth.1)).abs() <= 1.0,
            "eye at ({}, {}) vs {truth:?}",
            eye.row,
            eye.col
        );
    }
    let mid_row = (left.row + right.row) / 2.0;
    let mid_col = (left.col + right.col) / 2.0;
    let true_row = f64::from(LEFT_EYE.0 + RIGHT_EYE.0) / 2.0;
    let true_col = f64::from(LEFT_EYE.1 + RIGHT_EYE.1) / 2.0;
    assert!((mid_row - true_row).abs() <= 1.0, "row {mid_row} vs {true_row}");
    assert!((mid_col - true_col).abs() <= 1.0, "col {mid_col} vs {true_col}");

    assert_eq!(renderer.drawn.len(), 1);
    let transform = renderer.drawn[0];
    assert_abs_diff_eq!(transform.center_x, mid_col, epsilon = 1e-9);
    assert_abs_diff_eq!(transform.center_y, mid_row, epsilon = 1e-9);
    assert_abs_diff_eq!(transform.rotation, 0.0, epsilon = 0.02);
    // about 72 px between the eyes against half of a 128 px asset
    assert_abs_diff_eq!(transform.scale, 72.0 / 64.0, epsilon = 0.03);
}

#[test]
fn no_face_no_overlay() {
    let mut pipeline = pipeline();
    let mut renderer = CountingRenderer::default();
    let report = pipeline.run_frame(&empty_frame(), &mut renderer).unwrap();
    assert!(report.raw.is_empty());
    assert!(report.clusters.is_empty());
    assert!(renderer.drawn.is_empty());
}

#[test]
fn steady_face_stays_one_cluster() {
    let mut pipeline = pipeline();
    let mut renderer = CountingRenderer::default();
    let frame = face_frame();
    let mut scores = Vec::new();
    for _ in 0..8 {
        let report = pipeline.run_frame(&frame, &mut renderer).unwrap();
        assert_eq!(report.clusters.len(), 1);
        scores.push(report.clusters[0].score);
    }
    // confidence grows until the memory is full, then holds
    assert!(scores.windows(2).take(4).all(|w| w[1] > w[0]));
    assert!(scores[4..].iter().all(|&s| s == scores[4]));
    assert_eq!(renderer.drawn.len(), 8);
}

#[test]
fn overlay_outlives_face_for_memory_depth() {
    let mut pipeline = pipeline();
    let mut renderer = CountingRenderer::default();
    pipeline.run_frame(&face_frame(), &mut renderer).unwrap();
    pipeline.run_frame(&face_frame(), &mut renderer).unwrap();

    let mut decorated = Vec::new();
    for _ in 0..6 {
        let before = renderer.drawn.len();
        pipeline.run_frame(&empty_frame(), &mut renderer).unwrap();
        decorated.push(renderer.drawn.len() > before);
    }
    // two remembered frames score 240; one frame alone still clears 50
    assert_eq!(decorated, vec![true, true, true, true, false, false]);
}
