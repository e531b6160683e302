//! Decode strategy sequencer
//!
//! One sampled frame gets up to three decode attempts, cheapest first:
//!
//! 1. full frame, normal polarity
//! 2. full frame, normal then inverted polarity
//! 3. centre crop, normal then inverted polarity (large frames only)
//!
//! The first decoded string wins. Engine failures are logged and treated like
//! a miss, so one bad attempt never hides a later success.

use serde::Serialize;
use tracing::trace;

use super::decoder::{DecodeError, Decoder};
use super::strategy::try_in_order;
use crate::camera::frame::GrayImage;
use crate::config::ScanConfig;
use crate::utils::LogThrottler;
use crate::warn_throttled;

/// Which pixels an attempt looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    FullFrame,
    CenterCrop,
}

/// Which polarities an attempt tries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Inversion {
    /// Dark modules on a light background only
    None,
    /// Normal polarity, then inverted
    Both,
}

/// One entry of the decode plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DecodeAttempt {
    pub region: Region,
    pub inversion: Inversion,
}

impl DecodeAttempt {
    pub const FULL: Self = Self {
        region: Region::FullFrame,
        inversion: Inversion::None,
    };
    pub const FULL_INVERTED: Self = Self {
        region: Region::FullFrame,
        inversion: Inversion::Both,
    };
    pub const CROP_INVERTED: Self = Self {
        region: Region::CenterCrop,
        inversion: Inversion::Both,
    };
}

/// A successful decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeHit {
    pub text: String,
    pub attempt: DecodeAttempt,
    /// Whether the winning pass used inverted pixels
    pub inverted: bool,
}

/// Runs the decode plan against sampled frames
pub struct DecodeSequencer {
    decoder: Box<dyn Decoder>,
    min_crop_dimension: u32,
    /// Scale applied to each side of the crop
    crop_side_scale: f64,
    /// Scratch for the centre crop
    crop: Vec<u8>,
    /// Scratch for the inverted pass
    inverted: Vec<u8>,
    throttler: LogThrottler,
}

impl DecodeSequencer {
    pub fn new(decoder: Box<dyn Decoder>, config: &ScanConfig) -> Self {
        Self {
            decoder,
            min_crop_dimension: config.min_crop_dimension,
            crop_side_scale: config.crop_area_ratio.clamp(0.01, 1.0).sqrt(),
            crop: Vec::new(),
            inverted: Vec::new(),
            throttler: LogThrottler::with_secs(10),
        }
    }

    pub fn decoder_name(&self) -> &'static str {
        self.decoder.name()
    }

    /// Attempts that apply to a frame of this size, in order
    pub fn plan(&self, width: usize, height: usize) -> Vec<DecodeAttempt> {
        let min = self.min_crop_dimension as usize;
        let mut plan = vec![DecodeAttempt::FULL, DecodeAttempt::FULL_INVERTED];
        if width >= min && height >= min {
            plan.push(DecodeAttempt::CROP_INVERTED);
        }
        plan
    }

    /// Run the plan; `None` means every attempt missed or failed
    pub fn run(&mut self, image: GrayImage<'_>) -> Option<DecodeHit> {
        let plan = self.plan(image.width(), image.height());
        let Self {
            decoder,
            crop_side_scale,
            crop,
            inverted,
            throttler,
            ..
        } = self;

        let outcome = try_in_order(plan, |attempt| {
            let region = match attempt.region {
                Region::FullFrame => image,
                Region::CenterCrop => match center_crop(image, *crop_side_scale, crop) {
                    Some(region) => region,
                    None => return Ok(None),
                },
            };
            decode_region(&mut **decoder, region, attempt.inversion, inverted)
        });

        for (attempt, error) in &outcome.failures {
            warn_throttled!(
                throttler,
                "decode_engine",
                "Decode attempt {:?} failed: {}",
                attempt,
                error
            );
        }

        let (attempt, (text, inverted)) = outcome.winner?;
        trace!(?attempt, inverted, "decoded QR payload");
        Some(DecodeHit {
            text,
            attempt,
            inverted,
        })
    }
}

/// Decode one region at the requested polarities
fn decode_region(
    decoder: &mut dyn Decoder,
    region: GrayImage<'_>,
    inversion: Inversion,
    scratch: &mut Vec<u8>,
) -> Result<Option<(String, bool)>, DecodeError> {
    let polarities: &[bool] = match inversion {
        Inversion::None => &[false],
        Inversion::Both => &[false, true],
    };

    let outcome = try_in_order(polarities.iter().copied(), |&invert| {
        let decoded = if invert {
            scratch.clear();
            scratch.extend(region.pixels().iter().map(|p| 255 - p));
            match GrayImage::new(scratch.as_slice(), region.width(), region.height()) {
                Some(flipped) => decoder.decode(&flipped),
                None => Ok(None),
            }
        } else {
            decoder.decode(&region)
        };
        // Empty text counts as a miss
        decoded.map(|text| text.filter(|t| !t.is_empty()))
    });

    match outcome.winner {
        Some((invert, text)) => Ok(Some((text, invert))),
        None => match outcome.failures.into_iter().next() {
            Some((_, e)) => Err(e),
            None => Ok(None),
        },
    }
}

/// Copy the centred sub-rectangle into `scratch`
fn center_crop<'a>(
    image: GrayImage<'_>,
    side_scale: f64,
    scratch: &'a mut Vec<u8>,
) -> Option<GrayImage<'a>> {
    let (width, height) = crop_size(image.width(), image.height(), side_scale);
    if width == 0 || height == 0 {
        return None;
    }
    let x0 = (image.width() - width) / 2;
    let y0 = (image.height() - height) / 2;

    scratch.clear();
    let pixels = image.pixels();
    for y in y0..y0 + height {
        let start = y * image.width() + x0;
        scratch.extend_from_slice(&pixels[start..start + width]);
    }
    GrayImage::new(scratch.as_slice(), width, height)
}

fn crop_size(width: usize, height: usize, side_scale: f64) -> (usize, usize) {
    let w = ((width as f64) * side_scale).round() as usize;
    let h = ((height as f64) * side_scale).round() as usize;
    (w.min(width), h.min(height))
}
