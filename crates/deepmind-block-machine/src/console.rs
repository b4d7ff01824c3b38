use {
    crate::{
        abi_decoder::AbiDecoder,
        hydrator::Hydrator,
        scanner::spawn_scanner,
        state_machine::{ParseCtx, ParseError},
        types::Block,
    },
    futures_util::Stream,
    std::io::BufRead,
    tokio::sync::mpsc,
};

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("trace stream read failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct ConsoleReaderConfig {
    /// Bound of the scanner-to-parser line channel. A full channel blocks the
    /// scanner thread on the source.
    pub line_buffer_size: usize,
}

impl Default for ConsoleReaderConfig {
    fn default() -> Self {
        Self {
            line_buffer_size: 10_000,
        }
    }
}

///
/// Async driver around the sans-IO [`ParseCtx`].
///
/// Owns the scanner thread feeding it lines and surfaces one [`Block`] per
/// `ACCEPTED_BLOCK` directive, in stream order. `Ok(None)` means the source
/// reached end-of-stream; tearing down the source is the only cancellation
/// mechanism.
///
pub struct ConsoleReader {
    ctx: ParseCtx,
    lines: mpsc::Receiver<std::io::Result<String>>,
}

impl ConsoleReader {
    pub fn new(
        source: impl BufRead + Send + 'static,
        hydrator: Box<dyn Hydrator>,
    ) -> std::io::Result<Self> {
        Self::with_config(source, hydrator, ConsoleReaderConfig::default())
    }

    pub fn with_config(
        source: impl BufRead + Send + 'static,
        hydrator: Box<dyn Hydrator>,
        config: ConsoleReaderConfig,
    ) -> std::io::Result<Self> {
        let lines = spawn_scanner(source, config.line_buffer_size)?;
        Ok(Self {
            ctx: ParseCtx::new(hydrator),
            lines,
        })
    }

    pub fn abi_decoder(&self) -> &AbiDecoder {
        self.ctx.abi_decoder()
    }

    /// Consumes lines until one completes a block, the source ends, or a
    /// hard protocol error surfaces.
    pub async fn read_block(&mut self) -> Result<Option<Block>, ReadError> {
        while let Some(line) = self.lines.recv().await {
            if let Some(block) = self.ctx.process_line(&line?)? {
                return Ok(Some(block));
            }
        }
        Ok(None)
    }

    /// Adapts the reader into a fallible block stream that ends at
    /// end-of-stream or stops at the first hard error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Block, ReadError>> {
        futures_util::stream::try_unfold(self, |mut reader| async move {
            Ok(reader.read_block().await?.map(|block| (block, reader)))
        })
    }
}
