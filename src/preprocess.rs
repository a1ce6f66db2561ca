use image::{imageops::FilterType, DynamicImage, GenericImageView};

use crate::error::Result;

pub const CHANNELS: usize = 3;

/// A batch-of-one RGB image laid out as `[1, size, size, 3]`, row-major,
/// pixel values kept in `[0, 255]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    size: u32,
    data: Vec<f32>,
}

impl ImageTensor {
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn shape(&self) -> [u64; 4] {
        let s = self.size as u64;
        [1, s, s, CHANNELS as u64]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// Decodes `image_data` and turns it into a model input of edge `size`.
pub fn preprocess_image(image_data: &[u8], size: u32) -> Result<ImageTensor> {
    let img = image::load_from_memory(image_data)?;
    Ok(to_tensor(&img, size))
}

/// Squashes `img` to `size x size` without keeping the aspect ratio, using
/// nearest-neighbour sampling, and flattens it to RGB floats.
pub fn to_tensor(img: &DynamicImage, size: u32) -> ImageTensor {
    let resized = if img.dimensions() == (size, size) {
        img.to_rgb8()
    } else {
        img.resize_exact(size, size, FilterType::Nearest).to_rgb8()
    };

    let mut data = Vec::with_capacity(size as usize * size as usize * CHANNELS);
    for pixel in resized.pixels() {
        data.push(pixel[0] as f32);
        data.push(pixel[1] as f32);
        data.push(pixel[2] as f32);
    }

    ImageTensor { size, data }
}
