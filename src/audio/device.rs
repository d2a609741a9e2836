//! Audio input capability used by the capture loop.
//!
//! A backend opens a source for a [`StreamSpec`]; the source hands out fixed-size blocks of
//! interleaved `i16` samples through a blocking [`AudioSource::read`]. Dropping the source
//! closes the device.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    Device, SampleFormat, SampleRate, StreamConfig, SupportedStreamConfig,
    SupportedStreamConfigRange,
};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::Duration;

use crate::error::{CaptureError, DeviceError};

/// Longest a live read waits for the device before reporting a transient timeout.
pub const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Callback chunks buffered between the device thread and the capture loop
const CHUNK_QUEUE_DEPTH: usize = 64;

/// Sample formats the stream builder converts, most preferred first.
const PREFERRED_FORMATS: [SampleFormat; 3] = [SampleFormat::F32, SampleFormat::I16, SampleFormat::U16];

#[derive(Clone, Debug, PartialEq)]
pub struct StreamSpec {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames per block; a block holds `block_frames * channels` samples
    pub block_frames: usize,
    pub source: Option<String>,
}

impl StreamSpec {
    pub fn block_len(&self) -> usize {
        self.block_frames * self.channels as usize
    }
}

pub trait AudioBackend: Send + Sync {
    /// Open an input. Called on the capture thread, which then owns the source.
    fn open(&self, spec: &StreamSpec) -> Result<Box<dyn AudioSource>, DeviceError>;
}

pub trait AudioSource {
    /// Block until `block` is completely filled with interleaved samples.
    fn read(&mut self, block: &mut [i16]) -> Result<(), CaptureError>;
}

/// Live capture through the platform's default cpal host.
#[derive(Debug, Default)]
pub struct CpalBackend;

impl AudioBackend for CpalBackend {
    fn open(&self, spec: &StreamSpec) -> Result<Box<dyn AudioSource>, DeviceError> {
        let host = cpal::default_host();
        let device = select_device(&host, spec.source.as_deref())?;
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let ranges: Vec<SupportedStreamConfigRange> = device
            .supported_input_configs()
            .map_err(|e| DeviceError::Config(e.to_string()))?
            .collect();
        let supported = choose_config(&ranges, spec)?;
        let sample_format = supported.sample_format();
        let config = supported.config();

        let (chunk_tx, chunk_rx) = bounded::<Vec<i16>>(CHUNK_QUEUE_DEPTH);
        let (error_tx, error_rx) = bounded::<String>(CHUNK_QUEUE_DEPTH);

        let stream = match sample_format {
            SampleFormat::I16 => build_stream::<i16>(&device, &config, chunk_tx, error_tx),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, chunk_tx, error_tx),
            SampleFormat::F32 => build_stream::<f32>(&device, &config, chunk_tx, error_tx),
            other => return Err(DeviceError::UnsupportedFormat(format!("{other:?}"))),
        }?;

        stream
            .play()
            .map_err(|e| DeviceError::Play(e.to_string()))?;

        log::info!(
            "Audio input: {} @ {}Hz, {} ch, {:?} samples",
            name,
            spec.sample_rate,
            spec.channels,
            sample_format
        );

        Ok(Box::new(CpalSource {
            _stream: stream,
            reader: ChunkReader::new(chunk_rx, error_rx, READ_TIMEOUT),
        }))
    }
}

fn select_device(host: &cpal::Host, source: Option<&str>) -> Result<Device, DeviceError> {
    match source {
        None => host.default_input_device().ok_or(DeviceError::NoDefaultInput),
        Some(wanted) => host
            .input_devices()
            .map_err(|e| DeviceError::Enumerate(e.to_string()))?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            .ok_or_else(|| DeviceError::NotFound(wanted.to_string())),
    }
}

/// Pick a supported range that covers the requested rate and channel count exactly.
fn choose_config(
    ranges: &[SupportedStreamConfigRange],
    spec: &StreamSpec,
) -> Result<SupportedStreamConfig, DeviceError> {
    let rate = SampleRate(spec.sample_rate);
    PREFERRED_FORMATS
        .iter()
        .find_map(|&format| {
            ranges.iter().find(|range| {
                range.sample_format() == format
                    && range.channels() == spec.channels
                    && range.min_sample_rate() <= rate
                    && rate <= range.max_sample_rate()
            })
        })
        .map(|range| range.clone().with_sample_rate(rate))
        .ok_or_else(|| DeviceError::UnsupportedConfig {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            supported: describe_ranges(ranges),
        })
}

fn describe_ranges(ranges: &[SupportedStreamConfigRange]) -> String {
    if ranges.is_empty() {
        return "none".to_string();
    }
    ranges
        .iter()
        .map(|range| {
            format!(
                "{} ch {}-{} Hz {:?}",
                range.channels(),
                range.min_sample_rate().0,
                range.max_sample_rate().0,
                range.sample_format()
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    chunk_tx: Sender<Vec<i16>>,
    error_tx: Sender<String>,
) -> Result<cpal::Stream, DeviceError>
where
    T: cpal::SizedSample + Send + 'static,
    i16: cpal::FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let chunk: Vec<i16> = data
                    .iter()
                    .map(|&sample| cpal::Sample::from_sample(sample))
                    .collect();
                // Overrun: the capture loop fell behind, drop the chunk rather than block
                let _ = chunk_tx.try_send(chunk);
            },
            move |err| {
                let _ = error_tx.try_send(err.to_string());
            },
            None,
        )
        .map_err(|e| DeviceError::Build(e.to_string()))
}

/// Keeps the cpal stream alive while its chunks are read.
struct CpalSource {
    _stream: cpal::Stream,
    reader: ChunkReader,
}

impl AudioSource for CpalSource {
    fn read(&mut self, block: &mut [i16]) -> Result<(), CaptureError> {
        self.reader.read(block)
    }
}

/// Reassembles callback-sized chunks into fixed-size blocks.
///
/// Chunks arrive in whatever size the driver picks; samples left over after a block is
/// filled are kept for the next read.
struct ChunkReader {
    chunks: Receiver<Vec<i16>>,
    errors: Receiver<String>,
    pending: Vec<i16>,
    offset: usize,
    timeout: Duration,
}

impl ChunkReader {
    fn new(chunks: Receiver<Vec<i16>>, errors: Receiver<String>, timeout: Duration) -> Self {
        Self {
            chunks,
            errors,
            pending: Vec::new(),
            offset: 0,
            timeout,
        }
    }

    fn read(&mut self, block: &mut [i16]) -> Result<(), CaptureError> {
        let mut filled = 0;
        while filled < block.len() {
            if self.offset >= self.pending.len() {
                match self.errors.try_recv() {
                    Ok(message) => return Err(CaptureError::Stream(message)),
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
                }
                self.pending = match self.chunks.recv_timeout(self.timeout) {
                    Ok(chunk) => chunk,
                    Err(RecvTimeoutError::Timeout) => return Err(CaptureError::Timeout),
                    Err(RecvTimeoutError::Disconnected) => return Err(CaptureError::EndOfStream),
                };
                self.offset = 0;
            }

            let n = (block.len() - filled).min(self.pending.len() - self.offset);
            block[filled..filled + n].copy_from_slice(&self.pending[self.offset..self.offset + n]);
            filled += n;
            self.offset += n;
        }
        Ok(())
    }
}

/// Information about an available audio input device
#[derive(Debug)]
pub struct InputDeviceInfo {
    pub name: String,
    pub is_default: bool,
}

pub fn list_input_devices() -> Result<Vec<InputDeviceInfo>, DeviceError> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = host
        .input_devices()
        .map_err(|e| DeviceError::Enumerate(e.to_string()))?;

    Ok(devices
        .map(|device| {
            let name = device.name().unwrap_or_else(|_| "Unknown Device".to_string());
            let is_default = default_name.as_deref() == Some(name.as_str());
            InputDeviceInfo { name, is_default }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::SupportedBufferSize;

    fn reader() -> (Sender<Vec<i16>>, Sender<String>, ChunkReader) {
        let (chunk_tx, chunk_rx) = bounded(16);
        let (error_tx, error_rx) = bounded(16);
        let reader = ChunkReader::new(chunk_rx, error_rx, Duration::from_millis(20));
        (chunk_tx, error_tx, reader)
    }

    #[test]
    fn block_spans_uneven_chunks() {
        let (chunks, _errors, mut reader) = reader();
        chunks.send(vec![1, 2]).unwrap();
        chunks.send(vec![3]).unwrap();
        chunks.send(vec![4, 5, 6]).unwrap();

        let mut block = [0i16; 6];
        reader.read(&mut block).unwrap();
        assert_eq!(block, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn leftover_samples_start_the_next_block() {
        let (chunks, _errors, mut reader) = reader();
        chunks.send(vec![1, 2, 3, 4, 5]).unwrap();
        chunks.send(vec![6, 7, 8]).unwrap();

        let mut block = [0i16; 3];
        reader.read(&mut block).unwrap();
        assert_eq!(block, [1, 2, 3]);
        reader.read(&mut block).unwrap();
        assert_eq!(block, [4, 5, 6]);
        reader.read(&mut block[..2]).unwrap();
        assert_eq!(&block[..2], &[7, 8]);
    }

    #[test]
    fn empty_chunks_are_skipped() {
        let (chunks, _errors, mut reader) = reader();
        chunks.send(vec![]).unwrap();
        chunks.send(vec![9, 9]).unwrap();

        let mut block = [0i16; 2];
        reader.read(&mut block).unwrap();
        assert_eq!(block, [9, 9]);
    }

    #[test]
    fn stream_error_is_reported() {
        let (chunks, errors, mut reader) = reader();
        errors.send("device unplugged".to_string()).unwrap();
        chunks.send(vec![1, 2]).unwrap();

        let mut block = [0i16; 2];
        assert_eq!(
            reader.read(&mut block),
            Err(CaptureError::Stream("device unplugged".to_string()))
        );
        // the error is consumed, the queued chunk is still there
        reader.read(&mut block).unwrap();
        assert_eq!(block, [1, 2]);
    }

    #[test]
    fn closed_stream_ends() {
        let (chunks, _errors, mut reader) = reader();
        chunks.send(vec![1]).unwrap();
        drop(chunks);

        let mut block = [0i16; 2];
        assert_eq!(reader.read(&mut block), Err(CaptureError::EndOfStream));
    }

    #[test]
    fn silent_stream_times_out() {
        let (_chunks, _errors, mut reader) = reader();
        let mut block = [0i16; 2];
        assert_eq!(reader.read(&mut block), Err(CaptureError::Timeout));
    }

    fn range(channels: u16, min: u32, max: u32, format: SampleFormat) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(min),
            SampleRate(max),
            SupportedBufferSize::Unknown,
            format,
        )
    }

    fn spec(sample_rate: u32, channels: u16) -> StreamSpec {
        StreamSpec {
            sample_rate,
            channels,
            block_frames: 1024,
            source: None,
        }
    }

    #[test]
    fn picks_range_covering_rate_and_channels() {
        let ranges = [
            range(1, 48000, 48000, SampleFormat::F32),
            range(2, 8000, 96000, SampleFormat::I16),
            range(1, 8000, 96000, SampleFormat::I16),
        ];
        let chosen = choose_config(&ranges, &spec(44100, 1)).unwrap();
        assert_eq!(chosen.channels(), 1);
        assert_eq!(chosen.sample_rate(), SampleRate(44100));
        assert_eq!(chosen.sample_format(), SampleFormat::I16);
        assert_eq!(chosen.config().buffer_size, cpal::BufferSize::Default);
    }

    #[test]
    fn prefers_float_samples() {
        let ranges = [
            range(2, 8000, 96000, SampleFormat::U16),
            range(2, 8000, 96000, SampleFormat::F32),
        ];
        let chosen = choose_config(&ranges, &spec(48000, 2)).unwrap();
        assert_eq!(chosen.sample_format(), SampleFormat::F32);
    }

    #[test]
    fn unsupported_rate_lists_what_the_device_offers() {
        let ranges = [range(2, 48000, 48000, SampleFormat::F32)];
        match choose_config(&ranges, &spec(44100, 2)) {
            Err(DeviceError::UnsupportedConfig {
                sample_rate,
                channels,
                supported,
            }) => {
                assert_eq!(sample_rate, 44100);
                assert_eq!(channels, 2);
                assert_eq!(supported, "2 ch 48000-48000 Hz F32");
            }
            other => panic!("expected UnsupportedConfig, got {:?}", other),
        }
    }

    #[test]
    fn unconvertible_formats_are_not_chosen() {
        let ranges = [range(1, 8000, 96000, SampleFormat::I32)];
        assert!(matches!(
            choose_config(&ranges, &spec(44100, 1)),
            Err(DeviceError::UnsupportedConfig { .. })
        ));
    }
}
