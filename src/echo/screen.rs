//! Audio-level screening of a recorded window
//!
//! Runs before transcription: a noise gate profiled on the system's own
//! output, then frame-wise voice activity detection.

use crate::voice::rms_energy;

/// Attenuate frames that sit at or below the reference noise floor
///
/// The floor is the RMS of `reference`. Each frame of `samples` is scaled by
/// how far its own RMS rises above that floor, so frames dominated by the
/// playback bleed are silenced and louder speech passes mostly untouched.
pub fn reduce_noise(samples: &mut [f32], reference: &[f32], frame_size: usize) {
    let floor = rms_energy(reference);
    if floor <= f32::EPSILON || frame_size == 0 {
        return;
    }

    for frame in samples.chunks_mut(frame_size) {
        let energy = rms_energy(frame);
        let gain = if energy <= floor {
            0.0
        } else {
            (energy - floor) / energy
        };
        for sample in frame.iter_mut() {
            *sample *= gain;
        }
    }
}

/// Fraction of complete frames whose energy exceeds `threshold`
///
/// Trailing samples that do not fill a frame are ignored. Returns `None`
/// when the window holds no complete frame.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn voiced_ratio(samples: &[f32], frame_size: usize, threshold: f32) -> Option<f32> {
    if frame_size == 0 {
        return None;
    }

    let frames = samples.chunks_exact(frame_size);
    let total = frames.len();
    if total == 0 {
        return None;
    }

    let voiced = frames.filter(|f| rms_energy(f) > threshold).count();
    Some(voiced as f32 / total as f32)
}
