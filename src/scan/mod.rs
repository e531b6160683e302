//! Frame sampling, QR decoding and payload classification

pub mod classify;
pub mod decoder;
pub mod sampler;
pub mod sequencer;
pub mod strategy;

pub use classify::{classify, ClassifiedPayload};
pub use decoder::{DecodeError, Decoder, RqrrDecoder};
pub use sampler::{FrameSampler, SamplerStats, TickOutcome};
pub use sequencer::{DecodeAttempt, DecodeHit, DecodeSequencer, Inversion, Region};
pub use strategy::{try_in_order, SequenceOutcome};
