use std::io::Cursor;
use std::str::FromStr;

use image::{imageops::FilterType, io::Reader as ImageReader, DynamicImage, RgbImage};

pub const IMAGE_SIZE: u32 = 224;

/// ImageNet channel statistics the classifier weights were trained against.
pub const CHANNEL_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const CHANNEL_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Memory order of the input tensor expected by the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    /// `[1, 3, H, W]`, the layout of torchvision exports.
    Nchw,
    /// `[1, H, W, 3]`, the layout of TF-native graphs.
    Nhwc,
}

impl FromStr for TensorLayout {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nchw" => Ok(TensorLayout::Nchw),
            "nhwc" => Ok(TensorLayout::Nhwc),
            _ => Err(()),
        }
    }
}

/// A normalized single-image batch ready to feed to the classifier.
#[derive(Debug, Clone)]
pub struct ImageTensor {
    pub dims: [u64; 4],
    pub data: Vec<f32>,
}

/// Decodes `bytes` (format sniffed from content) and runs the fixed
/// resize/normalize pipeline.
pub fn preprocess(bytes: &[u8], layout: TensorLayout) -> Result<ImageTensor, image::ImageError> {
    let img = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?;
    Ok(preprocess_image(&img, layout))
}

pub fn preprocess_image(img: &DynamicImage, layout: TensorLayout) -> ImageTensor {
    // Direct resize, aspect ratio is not preserved.
    let resized: RgbImage = img
        .resize_exact(IMAGE_SIZE, IMAGE_SIZE, FilterType::Triangle)
        .to_rgb8();

    let side = IMAGE_SIZE as usize;
    let plane = side * side;
    let mut data = vec![0.0f32; plane * 3];

    for (x, y, pixel) in resized.enumerate_pixels() {
        let offset = y as usize * side + x as usize;
        for c in 0..3 {
            let value = normalize(pixel[c], c);
            let index = match layout {
                TensorLayout::Nchw => c * plane + offset,
                TensorLayout::Nhwc => offset * 3 + c,
            };
            data[index] = value;
        }
    }

    let s = IMAGE_SIZE as u64;
    let dims = match layout {
        TensorLayout::Nchw => [1, 3, s, s],
        TensorLayout::Nhwc => [1, s, s, 3],
    };

    ImageTensor { dims, data }
}

fn normalize(value: u8, channel: usize) -> f32 {
    (value as f32 / 255.0 - CHANNEL_MEAN[channel]) / CHANNEL_STD[channel]
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageOutputFormat, Rgb};

    fn png_bytes(img: RgbImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageOutputFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn solid_red_pixel_normalizes_per_channel() {
        let bytes = png_bytes(RgbImage::from_pixel(1, 1, Rgb([255, 0, 0])));
        let tensor = preprocess(&bytes, TensorLayout::Nchw).unwrap();

        assert_eq!(tensor.dims, [1, 3, 224, 224]);
        assert_eq!(tensor.data.len(), 3 * 224 * 224);

        let plane = 224 * 224;
        let red = (1.0 - 0.485) / 0.229;
        let green = (0.0 - 0.456) / 0.224;
        let blue = (0.0 - 0.406) / 0.225;
        assert!((tensor.data[0] - red).abs() < 1e-5);
        assert!((tensor.data[plane] - green).abs() < 1e-5);
        assert!((tensor.data[2 * plane + 500] - blue).abs() < 1e-5);
    }

    #[test]
    fn nhwc_interleaves_channels() {
        let bytes = png_bytes(RgbImage::from_pixel(3, 7, Rgb([0, 255, 0])));
        let tensor = preprocess(&bytes, TensorLayout::Nhwc).unwrap();

        assert_eq!(tensor.dims, [1, 224, 224, 3]);
        let green = (1.0 - 0.456) / 0.224;
        assert!((tensor.data[1] - green).abs() < 1e-5);
        assert!((tensor.data[4] - green).abs() < 1e-5);
    }

    #[test]
    fn grayscale_input_becomes_three_channels() {
        let gray = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(10, 10, image::Luma([128])));
        let tensor = preprocess_image(&gray, TensorLayout::Nchw);
        assert_eq!(tensor.data.len(), 3 * 224 * 224);
    }

    #[test]
    fn empty_and_text_payloads_fail_to_decode() {
        assert!(preprocess(&[], TensorLayout::Nchw).is_err());
        assert!(preprocess(b"definitely not an image", TensorLayout::Nchw).is_err());
    }

    #[test]
    fn layout_parses_case_insensitively() {
        assert_eq!("NCHW".parse::<TensorLayout>(), Ok(TensorLayout::Nchw));
        assert_eq!("nhwc".parse::<TensorLayout>(), Ok(TensorLayout::Nhwc));
        assert!("chw".parse::<TensorLayout>().is_err());
    }
}
