use crate::error::{Error, Result};

/// Single channel intensity image.
///
/// Pixel `(row, col)` lives at `pixels[row * ldim + col]`, so `ldim` may be
/// larger than `ncols` when the buffer carries row padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pixels: Vec<u8>,
    nrows: usize,
    ncols: usize,
    ldim: usize,
}

impl Image {
    pub fn new(pixels: Vec<u8>, nrows: usize, ncols: usize, ldim: usize) -> Result<Self> {
        if ldim < ncols {
            return Err(Error::InvalidConfig(format!(
                "row stride {ldim} is smaller than column count {ncols}"
            )));
        }
        let expected = nrows * ldim;
        if pixels.len() != expected {
            return Err(Error::FrameSize {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            pixels,
            nrows,
            ncols,
            ldim,
        })
    }

    /// Build an image by evaluating `f(row, col)` for every pixel.
    pub fn from_fn(nrows: usize, ncols: usize, mut f: impl FnMut(usize, usize) -> u8) -> Self {
        let mut pixels = Vec::with_capacity(nrows * ncols);
        for r in 0..nrows {
            for c in 0..ncols {
                pixels.push(f(r, c));
            }
        }
        Self {
            pixels,
            nrows,
            ncols,
            ldim: ncols,
        }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn ldim(&self) -> usize {
        self.ldim
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.pixels[row * self.ldim + col]
    }

    /// Pixel lookup with both coordinates clamped into the image.
    pub(crate) fn get_clamped(&self, row: i32, col: i32) -> u8 {
        let r = row.clamp(0, self.nrows as i32 - 1) as usize;
        let c = col.clamp(0, self.ncols as i32 - 1) as usize;
        self.pixels[r * self.ldim + c]
    }

    pub fn contains(&self, row: f64, col: f64) -> bool {
        row >= 0.0 && col >= 0.0 && row < self.nrows as f64 && col < self.ncols as f64
    }
}

/// Interleaved RGBA frame as delivered by a frame source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaFrame {
    data: Vec<u8>,
    nrows: usize,
    ncols: usize,
}

impl RgbaFrame {
    pub fn new(data: Vec<u8>, nrows: usize, ncols: usize) -> Result<Self> {
        let expected = nrows * ncols * 4;
        if data.len() != expected {
            return Err(Error::FrameSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { data, nrows, ncols })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn to_grayscale(&self) -> Image {
        Image {
            pixels: gray_pixels(&self.data),
            nrows: self.nrows,
            ncols: self.ncols,
            ldim: self.ncols,
        }
    }
}

/// Convert an RGBA buffer to intensity using `(2R + 7G + B) / 10`,
/// truncated. Alpha is ignored.
pub fn rgba_to_grayscale(rgba: &[u8], nrows: usize, ncols: usize) -> Result<Image> {
    let expected = nrows * ncols * 4;
    if rgba.len() != expected {
        return Err(Error::FrameSize {
            expected,
            actual: rgba.len(),
        });
    }
    Ok(Image {
        pixels: gray_pixels(rgba),
        nrows,
        ncols,
        ldim: ncols,
    })
}

fn gray_pixels(rgba: &[u8]) -> Vec<u8> {
    rgba.chunks_exact(4)
        .map(|px| {
            let weighted = 2 * u32::from(px[0]) + 7 * u32::from(px[1]) + u32::from(px[2]);
            (weighted / 10) as u8
        })
        .collect()
}
