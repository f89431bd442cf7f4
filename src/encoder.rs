//! JPEG encoding of extracted regions.
//!
//! The encoder never collects its output. Every compressed byte is handed to
//! a caller-owned [`ByteSink`] as soon as the JPEG encoder produces it, so
//! the caller decides where the stream goes and for how long the sink lives.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder;
use thiserror::Error;

use crate::pixel::RgbBuffer;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

pub const MIN_JPEG_QUALITY: u8 = 1;
pub const MAX_JPEG_QUALITY: u8 = 100;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("RGB buffer holds {actual} bytes, expected {expected} for {width}x{height}")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("JPEG encoder error: {0}")]
    Encoder(String),

    #[error("Sink error: {0}")]
    Sink(#[from] io::Error),
}

/// Sequential, write-only consumer of encoded bytes.
pub trait ByteSink {
    fn put(&mut self, byte: u8) -> io::Result<()>;

    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ByteSink for Vec<u8> {
    fn put(&mut self, byte: u8) -> io::Result<()> {
        self.push(byte);
        Ok(())
    }
}

/// Sink writing to a file on disk.
pub struct FileSink {
    writer: BufWriter<File>,
}

impl FileSink {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
        })
    }
}

impl ByteSink for FileSink {
    fn put(&mut self, byte: u8) -> io::Result<()> {
        self.writer.write_all(&[byte])
    }

    fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

// Adapts a sink to `io::Write` for the JPEG encoder.
struct SinkWriter<'a, S: ByteSink + ?Sized> {
    sink: &'a mut S,
}

impl<S: ByteSink + ?Sized> Write for SinkWriter<'_, S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &byte in buf {
            self.sink.put(byte)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImageEncoder {
    quality: u8,
}

impl Default for ImageEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl ImageEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encodes `rgb` as baseline JPEG into `sink`.
    ///
    /// The output only depends on the pixel data and the quality.
    pub fn encode<S: ByteSink + ?Sized>(
        &self,
        rgb: &[u8],
        width: u32,
        height: u32,
        sink: &mut S,
    ) -> Result<(), EncodeError> {
        let expected = width as usize * height as usize * 3;
        if rgb.len() != expected || expected == 0 {
            return Err(EncodeError::BufferSize {
                width,
                height,
                expected,
                actual: rgb.len(),
            });
        }

        {
            let mut writer = SinkWriter { sink: &mut *sink };
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, self.quality);
            encoder
                .encode(rgb, width, height, ExtendedColorType::Rgb8)
                .map_err(|e| match e {
                    image::ImageError::IoError(io) => EncodeError::Sink(io),
                    other => EncodeError::Encoder(other.to_string()),
                })?;
        }
        sink.finish()?;
        Ok(())
    }

    pub fn encode_buffer<S: ByteSink + ?Sized>(
        &self,
        rgb: &RgbBuffer,
        sink: &mut S,
    ) -> Result<(), EncodeError> {
        self.encode(&rgb.data, rgb.width, rgb.height, sink)
    }
}
