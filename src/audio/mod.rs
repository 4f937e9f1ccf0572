//! Audio I/O for the CLI frontend.
//!
//! Reads raw little-endian f32 mono PCM from stdin and writes the processed
//! stream to stdout.

use std::io::{self, Read, Write};

use log::debug;

use crate::circuits::Circuit;
use crate::error::{Result, SimError};

/// Buffer size for audio processing (in samples).
pub const BUFFER_SIZE: usize = 256;

const SAMPLE_BYTES: usize = 4;

/// Block reader over any byte source.
pub struct AudioInput<R> {
    reader: R,
    buffer: Vec<u8>,
    /// Bytes of an incomplete sample carried over from the last read
    pending: usize,
}

impl<R: Read> AudioInput<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: vec![0u8; BUFFER_SIZE * SAMPLE_BYTES],
            pending: 0,
        }
    }

    /// Read up to `samples.len()` samples.
    /// Returns the number of samples read, or 0 on EOF.
    pub fn read_block(&mut self, samples: &mut [f32]) -> Result<usize> {
        let wanted = (samples.len() * SAMPLE_BYTES).min(self.buffer.len());
        let mut filled = self.pending;

        // Keep reading until at least one whole sample is available.
        while filled < SAMPLE_BYTES.min(wanted) {
            let n = self
                .reader
                .read(&mut self.buffer[filled..wanted])
                .map_err(|e| SimError::AudioInputError {
                    message: e.to_string(),
                })?;
            if n == 0 {
                if filled > 0 {
                    debug!("dropping {filled} trailing bytes at end of input");
                }
                self.pending = 0;
                return Ok(0);
            }
            filled += n;
        }

        let count = filled / SAMPLE_BYTES;
        for (sample, bytes) in samples.iter_mut().zip(self.buffer[..count * SAMPLE_BYTES].chunks_exact(SAMPLE_BYTES)) {
            *sample = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        }

        self.pending = filled - count * SAMPLE_BYTES;
        self.buffer.copy_within(count * SAMPLE_BYTES..filled, 0);
        Ok(count)
    }
}

/// Block writer over any byte sink.
pub struct AudioOutput<W> {
    writer: W,
    buffer: Vec<u8>,
}

impl<W: Write> AudioOutput<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            buffer: Vec::with_capacity(BUFFER_SIZE * SAMPLE_BYTES),
        }
    }

    /// Write a block of samples.
    pub fn write_block(&mut self, samples: &[f32]) -> Result<()> {
        self.buffer.clear();
        for sample in samples {
            self.buffer.extend_from_slice(&sample.to_le_bytes());
        }
        self.writer
            .write_all(&self.buffer)
            .map_err(|e| SimError::AudioOutputError {
                message: e.to_string(),
            })
    }

    /// Flush the output stream.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(|e| SimError::AudioOutputError {
            message: e.to_string(),
        })
    }
}

/// Run `circuit` over every sample from `reader`, writing to `writer`.
///
/// Returns the number of samples processed.
pub fn process_stream<R: Read, W: Write>(circuit: &mut dyn Circuit, reader: R, writer: W) -> Result<u64> {
    let mut input = AudioInput::new(reader);
    let mut output = AudioOutput::new(writer);
    let mut block = vec![0.0f32; BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let samples_read = input.read_block(&mut block)?;
        if samples_read == 0 {
            break;
        }

        circuit.process(&mut block[..samples_read], 0);
        output.write_block(&block[..samples_read])?;
        total += samples_read as u64;
    }

    output.flush()?;
    Ok(total)
}

/// Process audio from stdin to stdout with `circuit`.
pub fn process_audio(circuit: &mut dyn Circuit) -> Result<u64> {
    process_stream(circuit, io::stdin().lock(), io::stdout().lock())
}
