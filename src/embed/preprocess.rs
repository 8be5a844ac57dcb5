//! Image-to-tensor preprocessing for each backbone.
//!
//! All pipelines end in a 224×224 CHW float buffer normalised per channel.
//! They differ in how they get there: ResNet and CLIP resize the shorter side
//! then centre-crop, while SigLIP squashes the whole image to 224×224.

use anyhow::Result;
use candle_core::{Device, Tensor};
use image::imageops::{self, FilterType};
use image::RgbImage;

use super::ModelKind;

pub const INPUT_SIZE: u32 = 224;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

pub const IMAGENET: Normalization = Normalization {
    mean: [0.485, 0.456, 0.406],
    std: [0.229, 0.224, 0.225],
};

pub const CLIP: Normalization = Normalization {
    mean: [0.481_454_66, 0.457_827_5, 0.408_210_73],
    std: [0.268_629_54, 0.261_302_58, 0.275_777_11],
};

pub const SIGLIP: Normalization = Normalization {
    mean: [0.5, 0.5, 0.5],
    std: [0.5, 0.5, 0.5],
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resize {
    /// Scale so the shorter side equals `shorter`, then centre-crop to the input size.
    ShorterSideThenCrop { shorter: u32, filter: FilterType },
    /// Scale straight to the input size, ignoring aspect ratio.
    Exact { filter: FilterType },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preprocess {
    pub resize: Resize,
    pub normalization: Normalization,
}

impl Preprocess {
    pub fn resnet() -> Self {
        Self {
            resize: Resize::ShorterSideThenCrop {
                shorter: 256,
                filter: FilterType::Triangle,
            },
            normalization: IMAGENET,
        }
    }

    pub fn clip() -> Self {
        Self {
            resize: Resize::ShorterSideThenCrop {
                shorter: INPUT_SIZE,
                filter: FilterType::CatmullRom,
            },
            normalization: CLIP,
        }
    }

    pub fn siglip() -> Self {
        Self {
            resize: Resize::Exact {
                filter: FilterType::CatmullRom,
            },
            normalization: SIGLIP,
        }
    }

    pub fn for_model(kind: ModelKind) -> Self {
        match kind {
            ModelKind::ResNet => Self::resnet(),
            ModelKind::Clip => Self::clip(),
            ModelKind::SigLip => Self::siglip(),
        }
    }

    /// Resize and crop to `INPUT_SIZE` square.
    pub fn fit(&self, image: &RgbImage) -> RgbImage {
        match self.resize {
            Resize::ShorterSideThenCrop { shorter, filter } => {
                center_crop(&resize_shorter(image, shorter, filter), INPUT_SIZE)
            }
            Resize::Exact { filter } => imageops::resize(image, INPUT_SIZE, INPUT_SIZE, filter),
        }
    }

    /// Normalised pixels in CHW order, length 3·224·224.
    pub fn pixels(&self, image: &RgbImage) -> Vec<f32> {
        let fitted = self.fit(image);
        let plane = (INPUT_SIZE * INPUT_SIZE) as usize;
        let mut out = vec![0f32; 3 * plane];
        for (i, pixel) in fitted.pixels().enumerate() {
            for c in 0..3 {
                let value = pixel[c] as f32 / 255.0;
                out[c * plane + i] =
                    (value - self.normalization.mean[c]) / self.normalization.std[c];
            }
        }
        out
    }

    /// A `(1, 3, 224, 224)` batch of one, on `device`.
    pub fn tensor(&self, image: &RgbImage, device: &Device) -> Result<Tensor> {
        let size = INPUT_SIZE as usize;
        let tensor = Tensor::from_vec(self.pixels(image), (3, size, size), device)?;
        Ok(tensor.unsqueeze(0)?)
    }
}

/// Scale so the shorter side equals `target`, keeping aspect ratio.
/// The longer side is truncated, matching torchvision's `Resize(int)`.
pub fn resize_shorter(image: &RgbImage, target: u32, filter: FilterType) -> RgbImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return image.clone();
    }
    let (new_w, new_h) = if w <= h {
        (target, (h as u64 * target as u64 / w as u64) as u32)
    } else {
        ((w as u64 * target as u64 / h as u64) as u32, target)
    };
    imageops::resize(image, new_w.max(1), new_h.max(1), filter)
}

/// Take the centred `size`×`size` window. Images smaller than that on
/// either side are scaled up first.
pub fn center_crop(image: &RgbImage, size: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    if w < size || h < size {
        return imageops::resize(image, size, size, FilterType::Triangle);
    }
    let left = ((w - size) as f64 / 2.0).round() as u32;
    let top = ((h - size) as f64 / 2.0).round() as u32;
    imageops::crop_imm(image, left, top, size, size).to_image()
}
