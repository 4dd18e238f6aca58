use crate::puploc::EyePoint;

/// Upper bound on the asset scale.
pub const MAX_OVERLAY_SCALE: f64 = 3.0;

/// Placement of the overlay asset for one face.
///
/// The renderer translates to the centre, scales uniformly, rotates, then
/// draws the asset centred on the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayTransform {
    pub center_x: f64,
    pub center_y: f64,
    pub scale: f64,
    pub rotation: f64,
}

impl OverlayTransform {
    /// Anchor an asset `asset_width` pixels wide to a pair of eyes.
    ///
    /// `eye1 - eye0` defines the orientation, so swapping the eyes turns the
    /// asset upside down.
    pub fn from_eyes(eye0: EyePoint, eye1: EyePoint, asset_width: f64) -> Self {
        let d_row = eye1.row - eye0.row;
        let d_col = eye1.col - eye0.col;
        let distance = (d_row * d_row + d_col * d_col).sqrt();
        Self {
            center_x: (eye0.col + eye1.col) / 2.0,
            center_y: (eye0.row + eye1.row) / 2.0,
            scale: MAX_OVERLAY_SCALE.min(distance / (asset_width / 2.0)),
            rotation: d_row.atan2(d_col),
        }
    }

    /// 2x3 matrix mapping asset pixel `(x, y)` to canvas `(x, y)`.
    pub fn asset_affine(&self, asset_width: f64, asset_height: f64) -> [[f64; 3]; 2] {
        let (sin, cos) = self.rotation.sin_cos();
        let a = self.scale * cos;
        let b = self.scale * sin;
        let ox = -asset_width / 2.0;
        let oy = -asset_height / 2.0;
        [
            [a, -b, a * ox - b * oy + self.center_x],
            [b, a, b * ox + a * oy + self.center_y],
        ]
    }
}

/// Overlay transform when both eyes were found, `None` otherwise.
pub fn compute_transform(
    eye0: Option<EyePoint>,
    eye1: Option<EyePoint>,
    asset_width: f64,
) -> Option<OverlayTransform> {
    Some(OverlayTransform::from_eyes(eye0?, eye1?, asset_width))
}
