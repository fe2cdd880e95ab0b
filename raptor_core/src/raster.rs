//! Raster images and the decoder seam.
//!
//! The index only needs width, height and per-pixel truecolor access, plus a
//! string metadata map on training images carrying `rx`, `ry` and `rz`.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use image::{DynamicImage, RgbaImage};

use crate::color::Truecolor;
use crate::error::{RaptorError, RaptorResult};
use crate::grid_hash::Rotation;

/// Metadata keys holding the rotation of a training image.
pub const ROTATION_KEYS: [&str; 3] = ["rx", "ry", "rz"];

/// Read-only pixel access.
pub trait PixelSource {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Truecolor at `(x, y)`; `Truecolor::BACKGROUND` means no pixel.
    fn pixel(&self, x: u32, y: u32) -> Truecolor;
}

/// Owned truecolor raster, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    pixels: Vec<Truecolor>,
}

impl RasterImage {
    /// All-background image.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![Truecolor::BACKGROUND; width as usize * height as usize],
        }
    }

    pub fn from_pixels(width: u32, height: u32, pixels: Vec<Truecolor>) -> RaptorResult<Self> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(RaptorError::invalid_config(
                "pixels",
                pixels.len().to_string(),
                format!("expected {} pixels for {}x{}", expected, width, height),
            ));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn from_rgba_image(image: &RgbaImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            pixels: image
                .pixels()
                .map(|px| Truecolor::from_rgba8(px.0))
                .collect(),
        }
    }

    pub fn to_rgba_image(&self) -> RgbaImage {
        RgbaImage::from_fn(self.width, self.height, |x, y| {
            let c = self.pixel(x, y);
            image::Rgba([c.r(), c.g(), c.b(), c.a()])
        })
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// # Panics
    ///
    /// Panics if `(x, y)` is outside the image.
    pub fn set(&mut self, x: u32, y: u32, color: Truecolor) {
        assert!(x < self.width && y < self.height, "pixel out of bounds");
        let offset = self.offset(x, y);
        self.pixels[offset] = color;
    }

    /// Non-background pixels, columns outermost (x, then y).
    pub fn foreground(&self) -> impl Iterator<Item = (u32, u32, Truecolor)> + '_ {
        (0..self.width).flat_map(move |x| {
            (0..self.height).filter_map(move |y| {
                let color = self.pixel(x, y);
                (!color.is_background()).then_some((x, y, color))
            })
        })
    }

    pub fn foreground_count(&self) -> usize {
        self.pixels.iter().filter(|c| !c.is_background()).count()
    }
}

impl PixelSource for RasterImage {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    fn pixel(&self, x: u32, y: u32) -> Truecolor {
        self.pixels[self.offset(x, y)]
    }
}

/// Decoder output: pixels plus textual metadata.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub raster: RasterImage,
    pub metadata: HashMap<String, String>,
}

impl DecodedImage {
    /// Parse the `rx`/`ry`/`rz` metadata entries of the image at `path`.
    pub fn rotation(&self, path: &Path) -> RaptorResult<Rotation> {
        let mut values = [0.0f64; 3];
        for (slot, key) in values.iter_mut().zip(ROTATION_KEYS) {
            let raw = self
                .metadata
                .get(key)
                .ok_or_else(|| RaptorError::missing_rotation(path, key, "key not present"))?;
            *slot = raw.trim().parse::<f64>().map_err(|err| {
                RaptorError::missing_rotation(path, key, format!("'{}': {}", raw, err))
            })?;
        }
        let rotation = Rotation::new(values[0], values[1], values[2]);
        if !rotation.is_finite() {
            return Err(RaptorError::missing_rotation(
                path,
                "rx/ry/rz",
                "components must be finite",
            ));
        }
        Ok(rotation)
    }
}

/// Image decoding seam.
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> RaptorResult<DecodedImage>;
}

/// PNG decoder. Pixels and text chunks (tEXt, zTXt, iTXt) come from a single
/// pass over the file, so chunks stored after the image data are included.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngDecoder;

impl PngDecoder {
    fn text_chunks(info: &png::Info<'_>, path: &Path) -> RaptorResult<HashMap<String, String>> {
        let mut metadata = HashMap::new();
        for chunk in &info.uncompressed_latin1_text {
            metadata.insert(chunk.keyword.clone(), chunk.text.clone());
        }
        for chunk in &info.compressed_latin1_text {
            let text = chunk
                .get_text()
                .map_err(|err| RaptorError::decode(path, err))?;
            metadata.insert(chunk.keyword.clone(), text);
        }
        for chunk in &info.utf8_text {
            let text = chunk
                .get_text()
                .map_err(|err| RaptorError::decode(path, err))?;
            metadata.insert(chunk.keyword.clone(), text);
        }
        Ok(metadata)
    }

    /// Widen an 8-bit frame of any color type to RGBA.
    fn to_rgba(
        width: u32,
        height: u32,
        color_type: png::ColorType,
        bytes: Vec<u8>,
        path: &Path,
    ) -> RaptorResult<RgbaImage> {
        let malformed = || RaptorError::decode(path, "frame size does not match its header");
        let image = match color_type {
            png::ColorType::Rgba => {
                return RgbaImage::from_raw(width, height, bytes).ok_or_else(malformed)
            }
            png::ColorType::Rgb => DynamicImage::ImageRgb8(
                image::RgbImage::from_raw(width, height, bytes).ok_or_else(malformed)?,
            ),
            png::ColorType::Grayscale => DynamicImage::ImageLuma8(
                image::GrayImage::from_raw(width, height, bytes).ok_or_else(malformed)?,
            ),
            png::ColorType::GrayscaleAlpha => DynamicImage::ImageLumaA8(
                image::GrayAlphaImage::from_raw(width, height, bytes).ok_or_else(malformed)?,
            ),
            png::ColorType::Indexed => {
                return Err(RaptorError::decode(path, "palette was not expanded"))
            }
        };
        Ok(image.to_rgba8())
    }
}

impl ImageDecoder for PngDecoder {
    fn decode(&self, path: &Path) -> RaptorResult<DecodedImage> {
        let file = File::open(path).map_err(|err| RaptorError::decode(path, err))?;
        let mut decoder = png::Decoder::new(BufReader::new(file));
        decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
        let mut reader = decoder
            .read_info()
            .map_err(|err| RaptorError::decode(path, err))?;

        let mut buffer = vec![0; reader.output_buffer_size()];
        let frame = reader
            .next_frame(&mut buffer)
            .map_err(|err| RaptorError::decode(path, err))?;
        buffer.truncate(frame.buffer_size());
        // Consume the remaining chunks up to IEND so trailing text is recorded.
        reader
            .finish()
            .map_err(|err| RaptorError::decode(path, err))?;

        let metadata = Self::text_chunks(reader.info(), path)?;
        let rgba = Self::to_rgba(frame.width, frame.height, frame.color_type, buffer, path)?;
        Ok(DecodedImage {
            raster: RasterImage::from_rgba_image(&rgba),
            metadata,
        })
    }
}

/// A decoded training image with its rotation.
#[derive(Debug, Clone)]
pub struct TrainingImage {
    /// Source path, or a synthetic label for in-memory images.
    pub path: PathBuf,
    pub raster: RasterImage,
    pub rotation: Rotation,
}

impl TrainingImage {
    pub fn new(path: impl Into<PathBuf>, raster: RasterImage, rotation: Rotation) -> Self {
        Self {
            path: path.into(),
            raster,
            rotation,
        }
    }

    /// Decode `path` and read its rotation metadata.
    pub fn load<D: ImageDecoder + ?Sized>(decoder: &D, path: &Path) -> RaptorResult<Self> {
        let decoded = decoder.decode(path)?;
        let rotation = decoded.rotation(path)?;
        Ok(Self::new(path, decoded.raster, rotation))
    }
}
