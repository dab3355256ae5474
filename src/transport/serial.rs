//! Serial transport for the Ninja Cape
//!
//! The cape talks newline-delimited JSON at 9600 baud, 8N1. Reader and writer
//! are generic over tokio's `AsyncRead`/`AsyncWrite` so the same code runs
//! over a real port, a `tokio::io::duplex` pipe in tests, or nothing at all in
//! dry-run mode.

use super::{FrameReader, FrameWriter};
use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf,
};
use tokio_serial::{
    ClearBuffer, DataBits, Parity, SerialPort, SerialPortBuilderExt, SerialStream, StopBits,
};
use tracing::{debug, info, warn};

/// Default line speed of the cape UART
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Serial transport errors
#[derive(Debug, Error)]
pub enum SerialError {
    #[error("failed to open serial port {path}")]
    Open {
        path: String,
        #[source]
        source: tokio_serial::Error,
    },
    #[error("serial read failed")]
    Read(#[source] std::io::Error),
    #[error("serial write failed")]
    Write(#[source] std::io::Error),
    #[error("serial port closed")]
    Closed,
}

/// Reader half of an opened serial port
pub type SerialPortReader = SerialLineReader<ReadHalf<SerialStream>>;
/// Writer half of an opened serial port
pub type SerialPortWriter = SerialFrameWriter<WriteHalf<SerialStream>>;

/// Open the cape serial port and split it into reader and writer halves
///
/// Any bytes already buffered on the input side are discarded so the first
/// line read is a whole frame.
pub fn open_serial(
    path: &str,
    baud_rate: u32,
) -> Result<(SerialPortReader, SerialPortWriter), SerialError> {
    info!(path = %path, baud_rate, "Opening serial port");

    let stream = tokio_serial::new(path, baud_rate)
        .data_bits(DataBits::Eight)
        .stop_bits(StopBits::One)
        .parity(Parity::None)
        .open_native_async()
        .map_err(|source| SerialError::Open {
            path: path.to_string(),
            source,
        })?;

    if let Err(e) = stream.clear(ClearBuffer::Input) {
        warn!(path = %path, error = %e, "Failed to flush serial input buffer");
    }

    let (read_half, write_half) = tokio::io::split(stream);
    Ok((
        SerialLineReader::new(read_half),
        SerialFrameWriter::new(write_half),
    ))
}

/// Dry-run serial pair: reads never produce a line, writes are logged and discarded
pub fn dummy_serial() -> (DummySerialReader, DummySerialWriter) {
    info!("Using dummy serial transport");
    (DummySerialReader, DummySerialWriter::default())
}

/// Newline-delimited line reader
pub struct SerialLineReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin + Send> SerialLineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::with_capacity(256),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> FrameReader for SerialLineReader<R> {
    async fn read_line(&mut self) -> Result<Option<String>, SerialError> {
        self.buf.clear();
        let read = self
            .reader
            .read_until(b'\n', &mut self.buf)
            .await
            .map_err(SerialError::Read)?;

        if read == 0 {
            return Ok(None);
        }

        // Line noise must not take the reader down
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}

/// Frame writer that flushes after every frame
pub struct SerialFrameWriter<W> {
    writer: W,
    closed: bool,
}

impl<W: AsyncWrite + Unpin + Send> SerialFrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            closed: false,
        }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> FrameWriter for SerialFrameWriter<W> {
    async fn write_frame(&mut self, frame: &str) -> Result<(), SerialError> {
        if self.closed {
            return Err(SerialError::Closed);
        }
        self.writer
            .write_all(frame.as_bytes())
            .await
            .map_err(SerialError::Write)?;
        self.writer.flush().await.map_err(SerialError::Write)
    }

    async fn close(&mut self) -> Result<(), SerialError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.writer.shutdown().await.map_err(SerialError::Write)
    }
}

/// Reader that waits forever, like an idle cape
pub struct DummySerialReader;

#[async_trait]
impl FrameReader for DummySerialReader {
    async fn read_line(&mut self) -> Result<Option<String>, SerialError> {
        std::future::pending().await
    }
}

/// Writer that logs frames instead of sending them
#[derive(Default)]
pub struct DummySerialWriter {
    closed: bool,
}

#[async_trait]
impl FrameWriter for DummySerialWriter {
    async fn write_frame(&mut self, frame: &str) -> Result<(), SerialError> {
        if self.closed {
            return Err(SerialError::Closed);
        }
        debug!(frame = %frame, "Dummy serial write");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SerialError> {
        self.closed = true;
        Ok(())
    }
}
