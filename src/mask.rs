//! Background-color keying.
//!
//! The mask is a single-channel alpha plane over the sheet: 0 keys a pixel
//! out entirely, 255 keeps it. Keying is binary on the Chebyshev distance
//! between a pixel's RGB and the picked key color; an optional Gaussian
//! feather then softens the boundary. The mask only ever multiplies into the
//! alpha channel, so color data is preserved and dropping the key restores
//! the sheet exactly.

use image::{GrayImage, Luma, RgbaImage};
use imageproc::filter::gaussian_blur_f32;
use tracing::debug;

/// Largest tolerance the sliders and CLI accept.
pub const MAX_TOLERANCE: u8 = 80;
/// Largest feather radius the sliders and CLI accept.
pub const MAX_FEATHER: u8 = 12;

const DEFAULT_TOLERANCE: u8 = 16;
const DEFAULT_FEATHER: u8 = 3;

/// Background-key parameters.
///
/// `key` stays `None` until a color is picked; without one the engine passes
/// buffers through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskSettings {
    pub key: Option<[u8; 3]>,
    /// Chebyshev distance at or below which a pixel counts as background.
    pub tolerance: u8,
    /// Gaussian blur radius applied to the binary mask.
    pub feather: u8,
    /// Feather on/off switch. Turning it off keeps the configured radius.
    pub antialias: bool,
}

impl Default for MaskSettings {
    fn default() -> Self {
        Self {
            key: None,
            tolerance: DEFAULT_TOLERANCE,
            feather: DEFAULT_FEATHER,
            antialias: true,
        }
    }
}

impl MaskSettings {
    /// Feather radius that actually applies under the antialias switch.
    pub fn effective_feather(&self) -> u8 {
        if self.antialias {
            self.feather
        } else {
            0
        }
    }
}

/// Builds the alpha mask for `key` over `image`.
///
/// Pixels within `tolerance` of the key drop to 0, everything else stays at
/// 255. A positive `feather` blurs the binary mask so the cut edge fades
/// over a few pixels instead of stair-stepping.
pub fn key_mask(image: &RgbaImage, key: [u8; 3], tolerance: u8, feather: u8) -> GrayImage {
    debug!("building mask: key={key:?} tolerance={tolerance} feather={feather}");
    let mask = GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let pixel = image.get_pixel(x, y).0;
        if chebyshev(pixel, key) <= tolerance {
            Luma([0])
        } else {
            Luma([255])
        }
    });
    if feather > 0 {
        gaussian_blur_f32(&mask, f32::from(feather))
    } else {
        mask
    }
}

/// Multiplies `mask` into the alpha channel of `image`, leaving color
/// channels untouched. Products are rounded to the nearest integer.
pub fn apply_mask(image: &RgbaImage, mask: &GrayImage) -> RgbaImage {
    let mut out = image.clone();
    for (pixel, masked) in out.pixels_mut().zip(mask.pixels()) {
        pixel.0[3] = scale_alpha(pixel.0[3], masked.0[0]);
    }
    out
}

/// Applies `settings` to `image`, returning the keyed buffer.
///
/// With no key set this is the identity and the result is byte-identical to
/// the input.
///
/// # Example
/// ```
/// use iconslice::mask::{self, MaskSettings};
/// use image::{Rgba, RgbaImage};
///
/// let sheet = RgbaImage::from_pixel(4, 4, Rgba([200, 10, 10, 255]));
/// let settings = MaskSettings {
///     key: Some([200, 10, 10]),
///     ..MaskSettings::default()
/// };
/// assert!(mask::apply(&sheet, &settings).pixels().all(|p| p.0[3] == 0));
/// ```
pub fn apply(image: &RgbaImage, settings: &MaskSettings) -> RgbaImage {
    match settings.key {
        Some(key) => {
            let mask = key_mask(image, key, settings.tolerance, settings.effective_feather());
            apply_mask(image, &mask)
        }
        None => image.clone(),
    }
}

/// Chebyshev distance between a pixel's RGB and the key. Alpha is ignored.
fn chebyshev(pixel: [u8; 4], key: [u8; 3]) -> u8 {
    pixel[0]
        .abs_diff(key[0])
        .max(pixel[1].abs_diff(key[1]))
        .max(pixel[2].abs_diff(key[2]))
}

/// `round(alpha * mask / 255)` in integer arithmetic.
fn scale_alpha(alpha: u8, mask: u8) -> u8 {
    ((u32::from(alpha) * u32::from(mask) + 127) / 255) as u8
}
