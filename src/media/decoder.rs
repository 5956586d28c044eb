//! Audio media backend using symphonia.
//!
//! Decodes the common audio formats (MP3, FLAC, Vorbis, AAC, WAV, ...) to
//! PCM on a background thread and feeds the engine through the lock-free
//! frame queue. Everything the mixer contract requires happens here:
//! channel-layout conversion to stereo, rate conversion to the engine rate
//! (rubato), seek-window trimming, and i16 quantization.
//!
//! This backend is audio-only; `video_ready`/`read_video` keep their
//! trait defaults.

use crate::error::{Error, Result};
use crate::media::{
    pcm_ring, MediaBackend, MediaInput, MediaRead, MediaSource, PcmConsumer, PcmFrame,
    PcmProducer, VideoMode,
};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use std::io::{Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info, warn};

/// Frames of decoded audio buffered ahead of the mixer (~250 ms at 48 kHz).
const RING_FRAMES_PER_SECOND_DIV: u32 = 4;
const RING_FRAMES_MIN: usize = 4096;

/// Fixed input chunk for the streaming resampler.
const RESAMPLE_CHUNK: usize = 1024;

/// Media backend decoding audio files with symphonia.
pub struct SymphoniaBackend {
    rate: AtomicU32,
    equal_mono: AtomicBool,
    status: AtomicBool,
}

impl SymphoniaBackend {
    pub fn new() -> Self {
        Self {
            rate: AtomicU32::new(0),
            equal_mono: AtomicBool::new(false),
            status: AtomicBool::new(false),
        }
    }
}

impl Default for SymphoniaBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaBackend for SymphoniaBackend {
    fn init(&self, rate: u32, status: bool, equal_mono: bool) {
        self.rate.store(rate, Ordering::Relaxed);
        self.status.store(status, Ordering::Relaxed);
        self.equal_mono.store(equal_mono, Ordering::Relaxed);
        debug!("symphonia backend initialized at {} Hz", rate);
    }

    fn open(&self, input: MediaInput, ext: &str) -> Result<Box<dyn MediaSource>> {
        let rate = self.rate.load(Ordering::Relaxed);
        if rate == 0 {
            return Err(Error::Sound("media backend not initialized".to_string()));
        }

        let source = SymphoniaSource::open(
            input,
            ext,
            rate,
            self.equal_mono.load(Ordering::Relaxed),
            self.status.load(Ordering::Relaxed),
        )?;
        Ok(Box::new(source))
    }
}

/// Wraps a host-supplied reader as a symphonia byte source.
struct ReaderSource {
    inner: Box<dyn MediaRead>,
}

impl Read for ReaderSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for ReaderSource {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl symphonia::core::io::MediaSource for ReaderSource {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

/// Flags shared with the decode thread.
struct SourceCtl {
    stop: AtomicBool,
    paused: AtomicBool,
    ready: AtomicBool,
    finished: AtomicBool,
}

impl SourceCtl {
    fn new() -> Self {
        Self {
            stop: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        }
    }
}

/// Everything the decode thread needs, assembled at open and consumed by
/// `start`.
struct DecodeJob {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    src_rate: u32,
    src_channels: usize,
    out_rate: u32,
    equal_mono: bool,
    range: (f64, f64),
    producer: PcmProducer,
    ctl: Arc<SourceCtl>,
}

/// An open audio stream backed by a symphonia decode thread.
pub(crate) struct SymphoniaSource {
    ctl: Arc<SourceCtl>,
    consumer: PcmConsumer,
    job: Option<DecodeJob>,
    thread: Option<thread::JoinHandle<()>>,
    duration: f64,
}

impl SymphoniaSource {
    fn open(
        input: MediaInput,
        ext: &str,
        out_rate: u32,
        equal_mono: bool,
        status: bool,
    ) -> Result<Self> {
        let mut hint = Hint::new();
        if !ext.is_empty() {
            hint.with_extension(ext);
        }

        let mss = match input {
            MediaInput::Path(path) => {
                if ext.is_empty() {
                    if let Some(e) = path.extension().and_then(|e| e.to_str()) {
                        hint.with_extension(e);
                    }
                }
                let file = std::fs::File::open(&path).map_err(|e| {
                    Error::Sound(format!("failed to open {}: {}", path.display(), e))
                })?;
                MediaSourceStream::new(Box::new(file), Default::default())
            }
            MediaInput::Reader(inner) => {
                MediaSourceStream::new(Box::new(ReaderSource { inner }), Default::default())
            }
        };

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| Error::Sound(format!("failed to probe format: {}", e)))?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Sound("no audio track found".to_string()))?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let src_rate = codec_params
            .sample_rate
            .ok_or_else(|| Error::Sound("sample rate not found".to_string()))?;
        let src_channels = codec_params
            .channels
            .map(|c| c.count())
            .ok_or_else(|| Error::Sound("channel count not found".to_string()))?;
        if src_channels == 0 {
            return Err(Error::Sound("media has no audio channels".to_string()));
        }

        let duration = match (codec_params.time_base, codec_params.n_frames) {
            (Some(tb), Some(n)) => {
                let time = tb.calc_time(n);
                time.seconds as f64 + time.frac
            }
            _ => 0.0,
        };

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Sound(format!("failed to create decoder: {}", e)))?;

        if status {
            info!(
                "opened '{}' stream: {} Hz, {} channel(s), {:.1} s",
                ext, src_rate, src_channels, duration
            );
        } else {
            debug!(
                "opened '{}' stream: {} Hz, {} channel(s), {:.1} s",
                ext, src_rate, src_channels, duration
            );
        }

        let capacity =
            ((out_rate / RING_FRAMES_PER_SECOND_DIV) as usize).max(RING_FRAMES_MIN);
        let (producer, consumer) = pcm_ring(capacity);
        let ctl = Arc::new(SourceCtl::new());

        Ok(Self {
            ctl: Arc::clone(&ctl),
            consumer,
            job: Some(DecodeJob {
                format,
                decoder,
                track_id,
                src_rate,
                src_channels,
                out_rate,
                equal_mono,
                range: (0.0, 0.0),
                producer,
                ctl,
            }),
            thread: None,
            duration,
        })
    }
}

impl MediaSource for SymphoniaSource {
    fn set_range(&mut self, start_s: f64, end_s: f64) {
        if let Some(job) = self.job.as_mut() {
            job.range = (start_s.max(0.0), end_s);
        }
    }

    fn want_video(&mut self, _mode: VideoMode) {
        // Audio-only backend; video channels still play their soundtrack.
    }

    fn start(&mut self) {
        if let Some(job) = self.job.take() {
            self.thread = Some(thread::spawn(move || job.run()));
        }
    }

    fn pause(&mut self, paused: bool) {
        self.ctl.paused.store(paused, Ordering::Relaxed);
    }

    fn is_ready(&self) -> bool {
        self.ctl.ready.load(Ordering::Relaxed) || self.ctl.finished.load(Ordering::Relaxed)
    }

    fn read_audio(&mut self, dest: &mut [i16]) -> usize {
        let want = dest.len() / 2;
        let mut got = 0usize;

        while got < want {
            match self.consumer.pop() {
                Some(frame) => {
                    dest[got * 2] = frame.left;
                    dest[got * 2 + 1] = frame.right;
                    got += 1;
                }
                None => break,
            }
        }

        if got < want {
            if self.ctl.finished.load(Ordering::Relaxed) && self.consumer.occupied_len() == 0 {
                // True end of stream: deliver the tail (possibly 0 frames).
                return got;
            }
            // Decoder behind; substitute silence rather than faking EOF.
            self.consumer.note_underrun(want - got);
            for frame in got..want {
                dest[frame * 2] = 0;
                dest[frame * 2 + 1] = 0;
            }
            return want;
        }

        got
    }

    fn duration(&self) -> f64 {
        self.duration
    }
}

impl Drop for SymphoniaSource {
    fn drop(&mut self) {
        self.ctl.stop.store(true, Ordering::Relaxed);
        self.job = None;
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl DecodeJob {
    /// Decode thread body: packets to stereo f32, seek-window trim, rate
    /// conversion, i16 quantization, ring push.
    fn run(mut self) {
        let mut resampler = if self.src_rate != self.out_rate {
            match StreamResampler::new(self.src_rate, self.out_rate) {
                Ok(rs) => Some(rs),
                Err(e) => {
                    warn!("resampler init failed, ending stream: {}", e);
                    self.ctl.finished.store(true, Ordering::Relaxed);
                    self.ctl.ready.store(true, Ordering::Relaxed);
                    return;
                }
            }
        } else {
            None
        };

        let skip_frames = (self.range.0 * self.src_rate as f64) as u64;
        let end_frame = if self.range.1 > self.range.0 && self.range.1 > 0.0 {
            (self.range.1 * self.src_rate as f64) as u64
        } else {
            u64::MAX
        };

        let mono_gain = if self.equal_mono {
            std::f32::consts::FRAC_1_SQRT_2
        } else {
            1.0
        };

        let mut sample_buf: Option<SampleBuffer<f32>> = None;
        let mut stereo: Vec<f32> = Vec::new();
        let mut converted: Vec<f32> = Vec::new();
        let mut seen: u64 = 0;

        'decode: loop {
            if self.ctl.stop.load(Ordering::Relaxed) {
                break;
            }
            if self.ctl.paused.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(5));
                continue;
            }

            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(symphonia::core::errors::Error::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    debug!("reached end of stream");
                    break;
                }
                Err(e) => {
                    warn!("error reading packet: {}", e);
                    break;
                }
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!("decode error: {}", e);
                    continue;
                }
            };

            let spec = *decoded.spec();
            let needed_samples = decoded.capacity() * spec.channels.count();
            let needs_new = sample_buf
                .as_ref()
                .map_or(true, |buf| buf.capacity() < needed_samples);
            if needs_new {
                sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
            }
            let buf = match sample_buf.as_mut() {
                Some(buf) => buf,
                None => continue,
            };
            buf.copy_interleaved_ref(decoded);

            to_stereo(buf.samples(), self.src_channels, mono_gain, &mut stereo);
            let frames = stereo.len() / 2;
            if frames == 0 {
                continue;
            }

            // Seek-window trim, in source frames.
            let pkt_start = seen;
            seen += frames as u64;
            if pkt_start + frames as u64 <= skip_frames {
                continue;
            }
            if pkt_start >= end_frame {
                break;
            }
            let begin = skip_frames.saturating_sub(pkt_start) as usize;
            let end = (frames as u64).min(end_frame - pkt_start) as usize;
            let window = &stereo[begin * 2..end * 2];

            converted.clear();
            match resampler.as_mut() {
                Some(rs) => {
                    if let Err(e) = rs.push(window, &mut converted) {
                        warn!("resampling failed, ending stream: {}", e);
                        break;
                    }
                }
                None => converted.extend_from_slice(window),
            }

            if !self.push_frames(&converted) {
                break 'decode;
            }
            self.ctl.ready.store(true, Ordering::Relaxed);

            if pkt_start + frames as u64 >= end_frame {
                break;
            }
        }

        // Drain whatever the resampler still holds.
        if let Some(rs) = resampler.as_mut() {
            converted.clear();
            if let Err(e) = rs.flush(&mut converted) {
                warn!("resampler flush failed: {}", e);
            } else {
                self.push_frames(&converted);
            }
        }

        self.ctl.finished.store(true, Ordering::Relaxed);
        self.ctl.ready.store(true, Ordering::Relaxed);
    }

    /// Quantize and push interleaved stereo f32; parks while the ring is
    /// full. Returns false when the source was dropped mid-push.
    fn push_frames(&mut self, samples: &[f32]) -> bool {
        for pair in samples.chunks_exact(2) {
            let frame = PcmFrame {
                left: quantize(pair[0]),
                right: quantize(pair[1]),
            };
            loop {
                if self.ctl.stop.load(Ordering::Relaxed) {
                    return false;
                }
                if self.producer.push(frame) {
                    break;
                }
                thread::sleep(Duration::from_millis(1));
            }
        }
        true
    }
}

#[inline]
fn quantize(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// Fold an interleaved buffer of `channels` lanes into interleaved stereo.
fn to_stereo(input: &[f32], channels: usize, mono_gain: f32, out: &mut Vec<f32>) {
    out.clear();
    match channels {
        1 => {
            out.reserve(input.len() * 2);
            for &s in input {
                let v = s * mono_gain;
                out.push(v);
                out.push(v);
            }
        }
        2 => out.extend_from_slice(input),
        n => {
            // Front left/right carry the mix; further lanes are dropped.
            out.reserve(input.len() / n * 2);
            for frame in input.chunks_exact(n) {
                out.push(frame[0]);
                out.push(frame[1]);
            }
        }
    }
}

/// Streaming stereo resampler: fixed-size rubato chunks over an
/// accumulation buffer.
struct StreamResampler {
    inner: FastFixedIn<f32>,
    pending: Vec<f32>,
}

impl StreamResampler {
    fn new(src_rate: u32, out_rate: u32) -> Result<Self> {
        let inner = FastFixedIn::<f32>::new(
            out_rate as f64 / src_rate as f64,
            1.0,
            PolynomialDegree::Septic,
            RESAMPLE_CHUNK,
            2,
        )
        .map_err(|e| Error::Sound(format!("failed to create resampler: {}", e)))?;

        Ok(Self {
            inner,
            pending: Vec::new(),
        })
    }

    /// Feed interleaved stereo input; append resampled output to `out`.
    fn push(&mut self, input: &[f32], out: &mut Vec<f32>) -> Result<()> {
        self.pending.extend_from_slice(input);

        while self.pending.len() >= RESAMPLE_CHUNK * 2 {
            let chunk: Vec<f32> = self.pending.drain(..RESAMPLE_CHUNK * 2).collect();
            let planar = deinterleave(&chunk);
            let resampled = self
                .inner
                .process(&planar, None)
                .map_err(|e| Error::Sound(format!("resampling failed: {}", e)))?;
            interleave(&resampled, out);
        }
        Ok(())
    }

    /// Process the remaining partial chunk and drain the filter delay.
    fn flush(&mut self, out: &mut Vec<f32>) -> Result<()> {
        if !self.pending.is_empty() {
            let rest: Vec<f32> = self.pending.drain(..).collect();
            let planar = deinterleave(&rest);
            let resampled = self
                .inner
                .process_partial(Some(planar.as_slice()), None)
                .map_err(|e| Error::Sound(format!("resampling failed: {}", e)))?;
            interleave(&resampled, out);
        }
        let tail = self
            .inner
            .process_partial::<Vec<f32>>(None, None)
            .map_err(|e| Error::Sound(format!("resampling failed: {}", e)))?;
        interleave(&tail, out);
        Ok(())
    }
}

fn deinterleave(input: &[f32]) -> Vec<Vec<f32>> {
    let frames = input.len() / 2;
    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);
    for pair in input.chunks_exact(2) {
        left.push(pair[0]);
        right.push(pair[1]);
    }
    vec![left, right]
}

fn interleave(planar: &[Vec<f32>], out: &mut Vec<f32>) {
    if planar.len() < 2 {
        return;
    }
    let frames = planar[0].len().min(planar[1].len());
    out.reserve(frames * 2);
    for i in 0..frames {
        out.push(planar[0][i]);
        out.push(planar[1][i]);
    }
}
