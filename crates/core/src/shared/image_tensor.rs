//! Floating-point RGB buffers exchanged between the cascade and its evaluators.
//!
//! Values stay raw (0–255) inside the cascade; evaluator adapters call
//! [`ImageTensor::to_normalized_nchw`] exactly once per inference call.

use image::imageops::{self, FilterType};
use image::Rgb32FImage;
use ndarray::{s, Array3, Array4, ArrayView3};

use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Channel mean subtracted before inference.
pub const IMAGE_MEAN: f32 = 127.5;

/// Scale applied after mean subtraction (1 / 128).
pub const IMAGE_INV_STDDEV: f32 = 0.0078125;

const CHANNELS: usize = 3;

/// Dense 3-channel `f32` image in `(height, width, channel)` layout.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageTensor {
    data: Array3<f32>,
}

impl ImageTensor {
    pub fn from_array(data: Array3<f32>) -> Self {
        debug_assert_eq!(data.shape()[2], CHANNELS, "tensor must have 3 channels");
        Self { data }
    }

    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            data: Array3::zeros((height, width, CHANNELS)),
        }
    }

    /// Converts an RGB frame to `f32` without rescaling intensities.
    pub fn from_frame(frame: &Frame) -> Self {
        debug_assert_eq!(frame.channels() as usize, CHANNELS);
        Self {
            data: frame.as_ndarray().mapv(f32::from),
        }
    }

    pub fn width(&self) -> usize {
        self.data.shape()[1]
    }

    pub fn height(&self) -> usize {
        self.data.shape()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    /// Extracts `region`, zero-filling every pixel that falls outside the
    /// source. The result always has the region's exact dimensions; a region
    /// entirely outside the image yields an all-zero tensor.
    pub fn crop_padded(&self, region: &Region) -> ImageTensor {
        let out_w = region.width.max(0) as usize;
        let out_h = region.height.max(0) as usize;
        let mut out = Array3::<f32>::zeros((out_h, out_w, CHANNELS));

        if let Some(inside) = region.clamp_to(self.width() as u32, self.height() as u32) {
            let dst_x = (inside.x - region.x) as usize;
            let dst_y = (inside.y - region.y) as usize;
            let w = inside.width as usize;
            let h = inside.height as usize;

            let src = self.data.slice(s![
                inside.y as usize..inside.bottom() as usize,
                inside.x as usize..inside.right() as usize,
                ..
            ]);
            out.slice_mut(s![dst_y..dst_y + h, dst_x..dst_x + w, ..])
                .assign(&src);
        }

        ImageTensor { data: out }
    }

    /// Bilinear resize to `width × height`.
    pub fn resize(&self, width: u32, height: u32) -> ImageTensor {
        if self.width() == width as usize && self.height() == height as usize {
            return self.clone();
        }
        if self.is_empty() || width == 0 || height == 0 {
            return ImageTensor::zeros(width as usize, height as usize);
        }

        // `image` clamps float samples to [0, 1], so resample in unit range.
        let raw: Vec<f32> = self.data.iter().map(|v| v / 255.0).collect();
        let src = Rgb32FImage::from_raw(self.width() as u32, self.height() as u32, raw)
            .expect("tensor length must match its dimensions");
        let resized = imageops::resize(&src, width, height, FilterType::Triangle);

        let data = Array3::from_shape_vec(
            (height as usize, width as usize, CHANNELS),
            resized.into_raw().into_iter().map(|v| v * 255.0).collect(),
        )
        .expect("resized buffer length must match requested dimensions");
        ImageTensor { data }
    }

    /// `(v - 127.5) / 128` in `[1, 3, H, W]` layout, ready for inference.
    pub fn to_normalized_nchw(&self) -> Array4<f32> {
        Array4::from_shape_fn((1, CHANNELS, self.height(), self.width()), |(_, c, y, x)| {
            (self.data[[y, x, c]] - IMAGE_MEAN) * IMAGE_INV_STDDEV
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// 4x4 tensor whose pixel (y, x, c) holds `100*y + 10*x + c + 1`.
    fn ramp(width: usize, height: usize) -> ImageTensor {
        ImageTensor::from_array(Array3::from_shape_fn((height, width, 3), |(y, x, c)| {
            (100 * y + 10 * x + c + 1) as f32
        }))
    }

    // ── Construction ─────────────────────────────────────────────────

    #[test]
    fn test_from_frame_keeps_raw_intensities() {
        let frame = Frame::new(vec![0, 128, 255, 10, 20, 30], 2, 1, 3);
        let t = ImageTensor::from_frame(&frame);
        assert_eq!(t.width(), 2);
        assert_eq!(t.height(), 1);
        assert_relative_eq!(t.view()[[0, 0, 1]], 128.0);
        assert_relative_eq!(t.view()[[0, 0, 2]], 255.0);
        assert_relative_eq!(t.view()[[0, 1, 0]], 10.0);
    }

    // ── Region extraction ────────────────────────────────────────────

    #[test]
    fn test_crop_inside_matches_direct_slice() {
        let t = ramp(4, 4);
        let crop = t.crop_padded(&Region::new(1, 1, 2, 3));
        assert_eq!(crop.width(), 2);
        assert_eq!(crop.height(), 3);
        assert_eq!(crop.view(), t.view().slice(s![1..4, 1..3, ..]));
    }

    #[test]
    fn test_crop_half_outside_left_is_zero_filled() {
        let t = ramp(4, 4);
        // Left half (x in -2..0) is outside, right half (x in 0..2) inside.
        let crop = t.crop_padded(&Region::new(-2, 0, 4, 4));
        assert_eq!(crop.width(), 4);
        assert!(crop.view().slice(s![.., 0..2, ..]).iter().all(|&v| v == 0.0));
        assert_eq!(
            crop.view().slice(s![.., 2..4, ..]),
            t.view().slice(s![.., 0..2, ..])
        );
    }

    #[test]
    fn test_crop_half_outside_bottom_right() {
        let t = ramp(4, 4);
        let crop = t.crop_padded(&Region::new(2, 2, 4, 4));
        assert_eq!(
            crop.view().slice(s![0..2, 0..2, ..]),
            t.view().slice(s![2..4, 2..4, ..])
        );
        assert!(crop.view().slice(s![2..4, .., ..]).iter().all(|&v| v == 0.0));
        assert!(crop.view().slice(s![.., 2..4, ..]).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_crop_entirely_outside_is_all_zero() {
        let t = ramp(4, 4);
        let crop = t.crop_padded(&Region::new(10, 10, 3, 2));
        assert_eq!(crop.width(), 3);
        assert_eq!(crop.height(), 2);
        assert!(crop.view().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_crop_larger_than_image_embeds_it() {
        let t = ramp(2, 2);
        let crop = t.crop_padded(&Region::new(-1, -1, 4, 4));
        assert_eq!(crop.view().slice(s![1..3, 1..3, ..]), t.view());
        assert_relative_eq!(crop.view()[[0, 0, 0]], 0.0);
        assert_relative_eq!(crop.view()[[3, 3, 2]], 0.0);
    }

    // ── Resize ───────────────────────────────────────────────────────

    #[test]
    fn test_resize_output_shape() {
        let t = ramp(8, 6);
        let r = t.resize(12, 12);
        assert_eq!(r.width(), 12);
        assert_eq!(r.height(), 12);
    }

    #[test]
    fn test_resize_uniform_image_keeps_value_above_one() {
        let t = ImageTensor::from_array(Array3::from_elem((10, 10, 3), 200.0));
        let r = t.resize(24, 24);
        for &v in r.view().iter() {
            assert_relative_eq!(v, 200.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_resize_same_size_is_identity() {
        let t = ramp(5, 3);
        assert_eq!(t.resize(5, 3), t);
    }

    #[test]
    fn test_resize_empty_source_yields_zeros() {
        let t = ImageTensor::zeros(0, 0);
        let r = t.resize(4, 4);
        assert_eq!(r, ImageTensor::zeros(4, 4));
    }

    // ── Normalization ────────────────────────────────────────────────

    #[test]
    fn test_normalized_nchw_layout_and_values() {
        let mut data = Array3::<f32>::zeros((2, 3, 3));
        data[[1, 2, 0]] = 255.0;
        data[[0, 1, 2]] = 127.5;
        let n = ImageTensor::from_array(data).to_normalized_nchw();

        assert_eq!(n.shape(), &[1, 3, 2, 3]);
        assert_relative_eq!(n[[0, 0, 1, 2]], (255.0 - 127.5) / 128.0);
        assert_relative_eq!(n[[0, 2, 0, 1]], 0.0);
        assert_relative_eq!(n[[0, 1, 0, 0]], -127.5 / 128.0);
    }
}
