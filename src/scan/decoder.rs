//! QR decoder capability
//!
//! The sequencer only needs "grayscale pixels in, optional text out", so any
//! engine can be plugged in. Closures implement the trait directly, which is
//! what the tests use.

use std::panic::{catch_unwind, AssertUnwindSafe};
use thiserror::Error;
use tracing::trace;

use crate::camera::frame::GrayImage;

/// The decode engine failed on one attempt
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("decode engine failure: {0}")]
pub struct DecodeError(pub String);

/// Pixel buffer to optional decoded string
pub trait Decoder: Send {
    /// Engine identifier
    fn name(&self) -> &'static str {
        "custom"
    }

    /// Decode the first QR code found in `image`
    ///
    /// `Ok(None)` means nothing was found; `Err` is an engine failure.
    fn decode(&mut self, image: &GrayImage<'_>) -> Result<Option<String>, DecodeError>;
}

impl<F> Decoder for F
where
    F: FnMut(&GrayImage<'_>) -> Result<Option<String>, DecodeError> + Send,
{
    fn decode(&mut self, image: &GrayImage<'_>) -> Result<Option<String>, DecodeError> {
        self(image)
    }
}

/// Pure Rust decoder backed by `rqrr`
#[derive(Debug, Default, Clone, Copy)]
pub struct RqrrDecoder;

impl RqrrDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for RqrrDecoder {
    fn name(&self) -> &'static str {
        "rqrr"
    }

    fn decode(&mut self, image: &GrayImage<'_>) -> Result<Option<String>, DecodeError> {
        let image = *image;
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
                image.width(),
                image.height(),
                |x, y| image.pixel(x, y),
            );
            let grids = prepared.detect_grids();
            trace!("rqrr found {} candidate grids", grids.len());

            let mut last_error = None;
            for grid in grids {
                match grid.decode() {
                    Ok((_meta, content)) if !content.is_empty() => return Ok(Some(content)),
                    Ok(_) => {}
                    Err(e) => last_error = Some(DecodeError(format!("{:?}", e))),
                }
            }
            match last_error {
                Some(e) => Err(e),
                None => Ok(None),
            }
        }));

        outcome.unwrap_or_else(|_| Err(DecodeError("rqrr panicked".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_decoder() {
        let mut decoder = |image: &GrayImage<'_>| -> Result<Option<String>, DecodeError> {
            Ok((image.pixel(0, 0) == 0).then(|| "dark".to_string()))
        };
        let dark = GrayImage::new(&[0, 0, 0, 0], 2, 2).unwrap();
        let light = GrayImage::new(&[255, 255, 255, 255], 2, 2).unwrap();
        assert_eq!(decoder.decode(&dark), Ok(Some("dark".to_string())));
        assert_eq!(decoder.decode(&light), Ok(None));
        assert_eq!(Decoder::name(&decoder), "custom");
    }

    #[test]
    fn test_rqrr_blank_frame_is_empty() {
        let pixels = vec![255u8; 120 * 120];
        let image = GrayImage::new(&pixels, 120, 120).unwrap();
        assert_eq!(RqrrDecoder::new().decode(&image), Ok(None));
    }
}
