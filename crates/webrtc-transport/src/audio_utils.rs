use rubato::{FastFixedIn, PolynomialDegree, Resampler};

/// G.711 runs at a fixed 8 kHz, mono.
pub const PCMU_SAMPLE_RATE: u32 = 8000;
/// Samples per 20 ms packet at [`PCMU_SAMPLE_RATE`].
pub const PCMU_FRAME_SAMPLES: usize = 160;

const ULAW_BIAS: i32 = 0x84;
const ULAW_CLIP: i32 = 32635;

/// Creates a resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,                     // No cutoff frequency, pass all frequencies
        PolynomialDegree::Cubic, // Cubic interpolation for quality
        chunk_size,
        1, // 1 channel (mono)
    )?;
    Ok(resampler)
}

/// Converts a slice of f32 samples to a vector of i16 samples.
pub fn convert_f32_to_i16(pcm32: &[f32]) -> Vec<i16> {
    pcm32
        .iter()
        .map(|&sample| (sample * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

/// Converts a slice of i16 samples to a vector of f32 samples.
pub fn convert_i16_to_f32(pcm16: &[i16]) -> Vec<f32> {
    pcm16
        .iter()
        .map(|&sample| sample as f32 / 32768.0)
        .collect()
}

/// Encodes one linear PCM16 sample as G.711 µ-law.
pub fn linear_to_ulaw(sample: i16) -> u8 {
    let mut pcm = sample as i32;
    let sign = if pcm < 0 {
        pcm = -pcm;
        0x80
    } else {
        0
    };
    pcm = pcm.min(ULAW_CLIP) + ULAW_BIAS;

    let mut exponent = 7;
    let mut mask = 0x4000;
    while exponent > 0 && pcm & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = (pcm >> (exponent + 3)) & 0x0F;
    !((sign | (exponent << 4) | mantissa) as u8)
}

/// Decodes one G.711 µ-law byte to linear PCM16.
pub fn ulaw_to_linear(byte: u8) -> i16 {
    let u = !byte as i32;
    let exponent = (u >> 4) & 0x07;
    let mantissa = u & 0x0F;
    let magnitude = (((mantissa << 3) + ULAW_BIAS) << exponent) - ULAW_BIAS;
    if u & 0x80 != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

pub fn encode_ulaw(pcm32: &[f32]) -> Vec<u8> {
    convert_f32_to_i16(pcm32)
        .into_iter()
        .map(linear_to_ulaw)
        .collect()
}

pub fn decode_ulaw(payload: &[u8]) -> Vec<f32> {
    let pcm16: Vec<i16> = payload.iter().copied().map(ulaw_to_linear).collect();
    convert_i16_to_f32(&pcm16)
}

/// Resamples an unbounded mono stream delivered in arbitrarily sized pieces.
///
/// Input is buffered until the fixed-size resampler has a full chunk, so the
/// output lags the input by at most one chunk.
pub struct StreamResampler {
    inner: Option<FastFixedIn<f32>>,
    pending: Vec<f32>,
}

impl StreamResampler {
    const CHUNK: usize = 480;

    pub fn new(in_rate: u32, out_rate: u32) -> anyhow::Result<Self> {
        let inner = if in_rate == out_rate {
            None
        } else {
            Some(create_resampler(in_rate as f64, out_rate as f64, Self::CHUNK)?)
        };
        Ok(Self {
            inner,
            pending: Vec::new(),
        })
    }

    pub fn is_passthrough(&self) -> bool {
        self.inner.is_none()
    }

    pub fn push(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(resampler) = self.inner.as_mut() else {
            return samples.to_vec();
        };

        self.pending.extend_from_slice(samples);
        let mut output = Vec::new();
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let chunk: Vec<f32> = self.pending.drain(..needed).collect();
            match resampler.process(&[chunk], None) {
                Ok(mut channels) => output.append(&mut channels[0]),
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping audio chunk that failed to resample");
                }
            }
        }
        output
    }
}

/// Cuts an 8 kHz stream into 20 ms µ-law packets.
#[derive(Default)]
pub struct PcmuFramer {
    pending: Vec<f32>,
}

impl PcmuFramer {
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(samples);
        let complete = self.pending.len() / PCMU_FRAME_SAMPLES * PCMU_FRAME_SAMPLES;
        let frames = self.pending[..complete]
            .chunks_exact(PCMU_FRAME_SAMPLES)
            .map(encode_ulaw)
            .collect();
        self.pending.drain(..complete);
        frames
    }
}
