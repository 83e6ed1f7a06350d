//! Signal processing pipelines
//!
//! This module provides signal processing for AAD data:
//! - [`filters`]: Butterworth cascades, zero-phase filtering, auditory filter banks
//! - [`fft`]: FFT-based fast convolution
//! - [`resample`]: Band-limited resampling and integer decimation
//! - [`envelope`]: Multi-band speech envelope extraction
//! - [`alignment`]: EEG preprocessing and trial alignment

pub mod alignment;
pub mod envelope;
pub mod fft;
pub mod filters;
pub mod resample;
