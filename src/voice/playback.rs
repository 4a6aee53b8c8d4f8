//! Audio playback to speakers

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use super::{AudioClip, AudioSink};
use crate::alert::AlertChannel;
use crate::{Error, Result};

/// Sample rate for playback (matches common TTS output)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Flags shared between a channel slot and its playback thread
#[derive(Clone)]
struct Slot {
    stop: Arc<AtomicBool>,
    busy: Arc<AtomicBool>,
}

impl Slot {
    fn new() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
            busy: Arc::new(AtomicBool::new(true)),
        }
    }

    fn halt(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.busy.store(false, Ordering::SeqCst);
    }
}

/// [`AudioSink`] on the default output device
///
/// Every play gets its own thread owning the `cpal` stream (streams are not
/// `Send`). Each channel slot tracks only its latest play, so a stopped
/// thread finishing late never marks a newer clip as idle.
pub struct CpalSink {
    config: StreamConfig,
    slots: Mutex<HashMap<AlertChannel, Slot>>,
}

impl CpalSink {
    /// Open the default output device
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supports = |channels: u16| {
            move |c: &cpal::SupportedStreamConfigRange| {
                c.channels() == channels
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            }
        };

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(supports(1))
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(supports(2))
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self {
            config,
            slots: Mutex::new(HashMap::new()),
        })
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<AlertChannel, Slot>> {
        self.slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl AudioSink for CpalSink {
    fn start(&self, channel: AlertChannel, clip: &AudioClip) -> Result<()> {
        let samples = if clip.sample_rate() == PLAYBACK_SAMPLE_RATE {
            clip.samples().to_vec()
        } else {
            resample(clip.samples(), clip.sample_rate(), PLAYBACK_SAMPLE_RATE)?
        };

        let slot = Slot::new();
        if let Some(previous) = self.slots().insert(channel, slot.clone()) {
            previous.halt();
        }

        let config = self.config.clone();
        std::thread::Builder::new()
            .name(format!("playback-{channel}"))
            .spawn(move || {
                if let Err(e) = play_blocking(&config, samples, &slot.stop) {
                    tracing::error!(%channel, error = %e, "playback failed");
                }
                slot.busy.store(false, Ordering::SeqCst);
            })
            .map_err(|e| Error::Audio(format!("failed to spawn playback thread: {e}")))?;

        Ok(())
    }

    fn stop(&self, channel: AlertChannel) {
        if let Some(slot) = self.slots().get(&channel) {
            slot.halt();
        }
    }

    fn is_busy(&self, channel: AlertChannel) -> bool {
        self.slots()
            .get(&channel)
            .is_some_and(|slot| slot.busy.load(Ordering::SeqCst))
    }

    fn prepare(&self, clip: AudioClip) -> Result<AudioClip> {
        if clip.sample_rate() == PLAYBACK_SAMPLE_RATE {
            return Ok(clip);
        }
        let samples = resample(clip.samples(), clip.sample_rate(), PLAYBACK_SAMPLE_RATE)?;
        Ok(AudioClip::new(samples, PLAYBACK_SAMPLE_RATE))
    }
}

/// Play samples until finished or `stop` is raised
fn play_blocking(config: &StreamConfig, samples: Vec<f32>, stop: &AtomicBool) -> Result<()> {
    if samples.is_empty() {
        return Ok(());
    }

    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device".to_string()))?;

    let channels = config.channels as usize;
    let sample_count = samples.len();
    let samples = Arc::new(samples);
    let position = Arc::new(AtomicUsize::new(0));

    let stream = {
        let samples = Arc::clone(&samples);
        let position = Arc::clone(&position);
        device
            .build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut pos = position.load(Ordering::Relaxed);
                    for frame in data.chunks_mut(channels) {
                        let sample = samples.get(pos).copied().unwrap_or(0.0);
                        frame.fill(sample);
                        if pos < samples.len() {
                            pos += 1;
                        }
                    }
                    position.store(pos, Ordering::Relaxed);
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?
    };

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    let duration_ms = (sample_count as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);
    let timeout = Duration::from_millis(duration_ms + 500);
    let start = Instant::now();

    while position.load(Ordering::Relaxed) < sample_count {
        if stop.load(Ordering::SeqCst) {
            tracing::debug!("playback interrupted");
            return Ok(());
        }
        if start.elapsed() > timeout {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    // Let the device drain its last buffer
    std::thread::sleep(Duration::from_millis(100));

    drop(stream);
    tracing::debug!(samples = sample_count, "playback complete");

    Ok(())
}

/// Decode MP3 bytes to mono f32 samples and their sample rate
///
/// # Errors
///
/// Returns error if the data is not valid MP3
pub fn decode_mp3(mp3_data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = PLAYBACK_SAMPLE_RATE;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if let Ok(rate) = u32::try_from(frame.sample_rate) {
                    sample_rate = rate;
                }
                if frame.channels == 2 {
                    // Stereo: average channels
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok((samples, sample_rate))
}

/// Resample mono audio using rubato
///
/// The final partial chunk is zero-padded so no speech is cut off.
///
/// # Errors
///
/// Returns error if the resampler cannot be built or fails
#[allow(clippy::cast_possible_truncation)]
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let chunk_size = 1024;
    let sub_chunks = 2;

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, chunk_size, sub_chunks, 1)
            .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    let mut output = Vec::with_capacity(samples.len() * to_rate as usize / from_rate as usize);

    for chunk in samples.chunks(chunk_size) {
        let mut input: Vec<f64> = chunk.iter().map(|&s| f64::from(s)).collect();
        input.resize(chunk_size, 0.0);
        let result = resampler
            .process(&[input], None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend(result[0].iter().map(|&s| s as f32));
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_garbage_or_yields_nothing() {
        // minimp3 skips non-frame bytes, so garbage decodes to no samples
        match decode_mp3(&[0u8; 64]) {
            Ok((samples, _)) => assert!(samples.is_empty()),
            Err(e) => assert!(e.to_string().contains("MP3")),
        }
    }

    #[test]
    fn resample_same_rate_is_identity() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&samples, 16000, 16000).unwrap(), samples);
    }

    #[test]
    fn resample_changes_length_proportionally() {
        let samples = vec![0.0f32; 16000];
        let out = resample(&samples, 16000, 24000).unwrap();
        // Padding and filter delay make this approximate
        assert!(out.len() >= 23000 && out.len() <= 26000, "len = {}", out.len());
    }
}
