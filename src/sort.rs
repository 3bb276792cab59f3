//! External sorter.

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::fs;
use std::io::{self, prelude::*};
use std::path::{Path, PathBuf};
use std::string::FromUtf8Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::buffer::{skip_byte_order_mark, Chunk, ChunkReader};
use crate::chunk::{self, ChunkFileReader, TempFiles};
use crate::gate::AdmissionGate;
use crate::merger::HeapMerger;
use crate::record::{Line, RecordError};

/// Default read/write buffer size.
pub const DEFAULT_RW_BUF_SIZE: usize = 64 * 1024;
/// Default chunk (temporary file) size.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Sorting error.
#[derive(Debug)]
pub enum SortError {
    /// Common I/O error.
    IO(io::Error),
    /// Input line does not have the `<number>. <text>` shape.
    MalformedRecord(RecordError),
    /// Input data is not valid UTF-8.
    InvalidUtf8(FromUtf8Error),
    /// Input starts with a byte-order mark of an unsupported encoding.
    UnsupportedEncoding(&'static str),
    /// Sorter parameters are not usable.
    InvalidConfig(String),
    /// Settings file is not valid JSON.
    ConfigFormat(serde_json::Error),
    /// Workers thread pool initialization error.
    ThreadPoolBuildError(rayon::ThreadPoolBuildError),
    /// A pipeline stage panicked.
    StagePanicked(&'static str),
    /// A pipeline stage lost its downstream stage.
    Disconnected(&'static str),
    /// Sorting was canceled through the cancel flag.
    Canceled,
}

impl Error for SortError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::IO(err) => Some(err),
            SortError::MalformedRecord(err) => Some(err),
            SortError::InvalidUtf8(err) => Some(err),
            SortError::ConfigFormat(err) => Some(err),
            SortError::ThreadPoolBuildError(err) => Some(err),
            SortError::UnsupportedEncoding(_)
            | SortError::InvalidConfig(_)
            | SortError::StagePanicked(_)
            | SortError::Disconnected(_)
            | SortError::Canceled => None,
        }
    }
}

impl Display for SortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::IO(err) => write!(f, "I/O operation failed: {}", err),
            SortError::MalformedRecord(err) => write!(f, "malformed record: {}", err),
            SortError::InvalidUtf8(err) => write!(f, "input is not valid UTF-8: {}", err),
            SortError::UnsupportedEncoding(encoding) => write!(f, "unsupported input encoding: {}", encoding),
            SortError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            SortError::ConfigFormat(err) => write!(f, "configuration format error: {}", err),
            SortError::ThreadPoolBuildError(err) => write!(f, "thread pool initialization failed: {}", err),
            SortError::StagePanicked(stage) => write!(f, "{} stage panicked", stage),
            SortError::Disconnected(stage) => write!(f, "{} stage lost its downstream stage", stage),
            SortError::Canceled => write!(f, "sorting canceled"),
        }
    }
}

impl From<io::Error> for SortError {
    fn from(err: io::Error) -> Self {
        SortError::IO(err)
    }
}

/// Path of the sorted result for `input`, e.g. `data.txt` gives `data.sorted.txt`.
pub fn sorted_path(input: &Path) -> PathBuf {
    chunk::derived_path(input, "sorted")
}

/// External sorter builder. Provides methods for [`ExternalSorter`] initialization.
#[derive(Clone, Debug)]
pub struct ExternalSorterBuilder {
    /// Number of threads to be used to sort chunks in parallel.
    threads_number: Option<usize>,
    /// Directory to be used to store temporary files.
    tmp_dir: Option<PathBuf>,
    /// Input, chunk and output file read/write buffer size.
    rw_buf_size: usize,
    /// Chunk size threshold in bytes.
    chunk_size: usize,
    /// Flag to be observed to stop sorting early.
    cancel_flag: Option<Arc<AtomicBool>>,
}

impl ExternalSorterBuilder {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        ExternalSorterBuilder::default()
    }

    /// Builds an [`ExternalSorter`] instance using provided configuration.
    pub fn build(self) -> Result<ExternalSorter, SortError> {
        let mut sorter = ExternalSorter::new(
            self.threads_number,
            self.tmp_dir.as_deref(),
            self.rw_buf_size,
            self.chunk_size,
        )?;
        if let Some(cancel_flag) = self.cancel_flag {
            sorter.canceled = cancel_flag;
        }

        return Ok(sorter);
    }

    /// Sets number of threads to be used to sort chunks in parallel.
    pub fn with_threads_number(mut self, threads_number: usize) -> ExternalSorterBuilder {
        self.threads_number = Some(threads_number);
        return self;
    }

    /// Sets directory to be used to store temporary files.
    pub fn with_tmp_dir(mut self, path: &Path) -> ExternalSorterBuilder {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Sets read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> ExternalSorterBuilder {
        self.rw_buf_size = buf_size;
        return self;
    }

    /// Sets chunk size, the amount of input text sorted in memory and stored in one temporary file.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> ExternalSorterBuilder {
        self.chunk_size = chunk_size;
        return self;
    }

    /// Sets a shared flag. Once it is set the sorter stops at the next chunk or merged record
    /// with [`SortError::Canceled`] and removes its temporary files.
    pub fn with_cancel_flag(mut self, cancel_flag: Arc<AtomicBool>) -> ExternalSorterBuilder {
        self.cancel_flag = Some(cancel_flag);
        return self;
    }
}

impl Default for ExternalSorterBuilder {
    fn default() -> Self {
        ExternalSorterBuilder {
            threads_number: None,
            tmp_dir: None,
            rw_buf_size: DEFAULT_RW_BUF_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            cancel_flag: None,
        }
    }
}

/// External sorter.
///
/// Sorting runs in two phases. The split phase is a pipeline of a producer reading input chunks,
/// a pool of workers sorting them and a sink storing sorted chunks to temporary files.
/// Stages are connected by single slot channels, and the producer and the sink share an
/// admission gate so that reading can not run ahead of writing. The merge phase then
/// merges all temporary files into the result file.
///
/// Both phases observe a cancel flag (see [`ExternalSorter::cancel_flag`]). A canceled run
/// returns [`SortError::Canceled`] and removes its temporary files.
pub struct ExternalSorter {
    /// Sorting thread pool.
    thread_pool: rayon::ThreadPool,
    /// Directory to be used to store temporary files.
    tmp_dir: Option<PathBuf>,
    /// Input, chunk and output file read/write buffer size.
    rw_buf_size: usize,
    /// Chunk size threshold in bytes.
    chunk_size: usize,
    canceled: Arc<AtomicBool>,
}

impl ExternalSorter {
    /// Creates a new external sorter instance.
    ///
    /// # Arguments
    /// * `threads_number` - Number of threads to be used to sort chunks in parallel. If the parameter is [`None`]
    ///   threads number will be selected based on available CPU core number.
    /// * `tmp_dir` - Directory to be used to store temporary files. If parameter is [`None`] temporary files
    ///   are placed next to the input file.
    /// * `rw_buf_size` - Read/write buffer size.
    /// * `chunk_size` - Chunk size threshold.
    pub fn new(
        threads_number: Option<usize>,
        tmp_dir: Option<&Path>,
        rw_buf_size: usize,
        chunk_size: usize,
    ) -> Result<Self, SortError> {
        if rw_buf_size == 0 {
            return Err(SortError::InvalidConfig("buffer size must be positive".to_string()));
        }
        if chunk_size == 0 {
            return Err(SortError::InvalidConfig("chunk size must be positive".to_string()));
        }
        if threads_number == Some(0) {
            return Err(SortError::InvalidConfig("threads number must be positive".to_string()));
        }

        return Ok(ExternalSorter {
            thread_pool: Self::init_thread_pool(threads_number)?,
            tmp_dir: tmp_dir.map(Path::to_path_buf),
            rw_buf_size,
            chunk_size,
            canceled: Arc::new(AtomicBool::new(false)),
        });
    }

    /// Returns the cancel flag. Setting it stops a running sort with [`SortError::Canceled`].
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.canceled.clone()
    }

    fn init_thread_pool(threads_number: Option<usize>) -> Result<rayon::ThreadPool, SortError> {
        let mut thread_pool_builder = rayon::ThreadPoolBuilder::new().thread_name(|idx| format!("sort-worker-{}", idx));

        if let Some(threads_number) = threads_number {
            thread_pool_builder = thread_pool_builder.num_threads(threads_number);
        }
        let thread_pool = thread_pool_builder
            .build()
            .map_err(SortError::ThreadPoolBuildError)?;
        log::info!("initialized thread-pool (threads: {})", thread_pool.current_num_threads());

        return Ok(thread_pool);
    }

    /// Sorts `input` file into a file named after it (see [`sorted_path`]) and returns the result path.
    /// Temporary files are removed whether sorting succeeds or not.
    pub fn sort_file(&self, input: &Path) -> Result<PathBuf, SortError> {
        let started = Instant::now();
        let output = sorted_path(input);

        let temp_files = self.split(input)?;
        self.merge(&temp_files, &output)?;
        drop(temp_files);

        log::info!("{} sorted into {} in {:?}", input.display(), output.display(), started.elapsed());

        return Ok(output);
    }

    /// Splits `input` file into sorted temporary files.
    pub fn split(&self, input: &Path) -> Result<TempFiles, SortError> {
        let started = Instant::now();
        let input_file = fs::File::open(input)?;
        let temp_files = self.split_reader(input_file, input)?;
        log::info!(
            "splitting to {} temporary files completed in {:?}",
            temp_files.len(),
            started.elapsed()
        );

        return Ok(temp_files);
    }

    /// Splits input data into sorted temporary files named after `input_path`.
    pub fn split_reader<R: Read>(&self, input: R, input_path: &Path) -> Result<TempFiles, SortError> {
        let input = skip_byte_order_mark(input)?;

        let gate = AdmissionGate::default();
        let (chunk_tx, chunk_rx) = bounded::<Chunk>(1);
        let (sorted_tx, sorted_rx) = bounded::<Chunk>(1);

        thread::scope(|scope| {
            let sink = scope.spawn(|| self.run_sink(input_path, sorted_rx, &gate));
            let workers = scope.spawn(move || {
                self.thread_pool
                    .broadcast(|_| run_worker(&chunk_rx, &sorted_tx))
                    .into_iter()
                    .sum::<usize>()
            });

            let reader = ChunkReader::new(input, self.rw_buf_size, self.chunk_size).with_gate(&gate);
            let produced = run_producer(reader, chunk_tx, &self.canceled);

            let sorted = workers.join().map_err(|_| SortError::StagePanicked("worker"));
            let stored = sink.join().map_err(|_| SortError::StagePanicked("sink"));

            match (produced, sorted, stored) {
                (_, Err(err), _) | (_, _, Err(err)) | (_, _, Ok(Err(err))) => Err(err),
                (Err(err), _, _) => Err(err),
                (Ok(chunks), Ok(sorted), Ok(Ok(temp_files))) => {
                    log::debug!("{} chunks read, {} sorted, {} stored", chunks, sorted, temp_files.len());
                    Ok(temp_files)
                }
            }
        })
    }

    /// Merges sorted temporary files into `output` file. Returns the number of records written.
    /// On failure an incomplete `output` file is removed.
    pub fn merge(&self, temp_files: &TempFiles, output: &Path) -> Result<u64, SortError> {
        let started = Instant::now();
        self.check_canceled()?;

        let sources = temp_files
            .paths()
            .iter()
            .map(|path| ChunkFileReader::open(path, self.rw_buf_size))
            .collect::<Result<Vec<_>, _>>()?;
        let merger = HeapMerger::new(sources, |a: &Line, b: &Line| a.key().cmp(&b.key()))?;
        log::debug!("merging {} non-empty temporary files", merger.active_inputs());

        let output_file = fs::File::create(output)?;
        let records = match self.write_merged(merger, output_file) {
            Ok(records) => records,
            Err(err) => {
                match fs::remove_file(output) {
                    Ok(()) => log::debug!("incomplete output {} removed", output.display()),
                    Err(remove_err) => log::warn!("incomplete output {} not removed: {}", output.display(), remove_err),
                }
                return Err(err);
            }
        };

        log::info!("merging temporary files completed in {:?} ({} records)", started.elapsed(), records);

        return Ok(records);
    }

    fn write_merged<I>(&self, lines: I, output: fs::File) -> Result<u64, SortError>
    where
        I: Iterator<Item = Result<Line, SortError>>,
    {
        let mut output_writer = io::BufWriter::with_capacity(self.rw_buf_size, output);
        let mut records: u64 = 0;
        for line in lines {
            self.check_canceled()?;
            let line = line?;
            output_writer.write_all(line.as_str().as_bytes())?;
            output_writer.write_all(b"\n")?;
            records += 1;
        }
        output_writer.flush()?;

        return Ok(records);
    }

    fn check_canceled(&self) -> Result<(), SortError> {
        if self.canceled.load(Ordering::Relaxed) {
            return Err(SortError::Canceled);
        }

        return Ok(());
    }

    /// Stores sorted chunks in arrival order, one temporary file per chunk.
    fn run_sink(&self, input_path: &Path, sorted_rx: Receiver<Chunk>, gate: &AdmissionGate) -> Result<TempFiles, SortError> {
        let mut temp_files = TempFiles::new();

        for chunk in sorted_rx.iter() {
            self.check_canceled()?;
            let _permit = gate.acquire();
            let path = chunk::part_path(input_path, self.tmp_dir.as_deref(), temp_files.len());

            log::debug!(
                "saving chunk of {} records ({} bytes) to {}",
                chunk.len(),
                chunk.text_len(),
                path.display()
            );
            if let Err(err) = chunk::dump(&path, &chunk, self.rw_buf_size) {
                // not registered yet, so remove it here
                let _ = fs::remove_file(&path);
                return Err(err);
            }
            temp_files.push(path);
        }

        return Ok(temp_files);
    }
}

fn run_producer<R: Read>(
    reader: ChunkReader<'_, R>,
    chunk_tx: Sender<Chunk>,
    canceled: &AtomicBool,
) -> Result<usize, SortError> {
    let mut chunks = 0;
    for chunk in reader {
        if canceled.load(Ordering::Relaxed) {
            return Err(SortError::Canceled);
        }
        let chunk = chunk?;
        log::debug!("chunk of {} records read", chunk.len());
        chunk_tx.send(chunk).map_err(|_| SortError::Disconnected("producer"))?;
        chunks += 1;
    }

    return Ok(chunks);
}

fn run_worker(chunk_rx: &Receiver<Chunk>, sorted_tx: &Sender<Chunk>) -> usize {
    let mut sorted = 0;
    for mut chunk in chunk_rx.iter() {
        chunk.sort();
        if sorted_tx.send(chunk).is_err() {
            // sink is gone, stop taking chunks
            break;
        }
        sorted += 1;
    }

    sorted
}
