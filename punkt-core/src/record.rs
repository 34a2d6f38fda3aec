use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use log::warn;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{PunktError, Result};

/// A JSONL record, fields kept in file order.
pub type Record = Map<String, Value>;

pub struct RecordReader<R: BufRead> {
    reader: R,
    line: String,
    line_number: usize,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            line_number: 0,
        }
    }

    /// Number of lines consumed so far, blank ones included.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            self.line.clear();
            self.reader.read_line(&mut self.line)?;

            if self.line.is_empty() {
                // EOF reached
                return Ok(None);
            }
            self.line_number += 1;

            let line = self.line.trim();
            if line.is_empty() {
                continue;
            }

            return serde_json::from_str(line)
                .map(Some)
                .map_err(|source| PunktError::Json {
                    line: self.line_number,
                    source,
                });
        }
    }
}

impl RecordReader<Box<dyn BufRead + Send>> {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(open_input(path)?))
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

fn is_zstd(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "zst")
}

/// Opens `path` for reading, decompressing `.zst` files on the fly.
pub fn open_input(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let io_err = |e| PunktError::io(e, Some(path.to_path_buf()));
    let file = File::open(path).map_err(io_err)?;
    if is_zstd(path) {
        let decoder = zstd::Decoder::new(file).map_err(io_err)?;
        Ok(Box::new(BufReader::new(decoder)))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

fn wrap_output(file: File, path: &Path) -> Result<Box<dyn Write>> {
    if is_zstd(path) {
        let encoder = zstd::Encoder::new(file, 0)?.auto_finish();
        Ok(Box::new(BufWriter::new(encoder)))
    } else {
        Ok(Box::new(BufWriter::new(file)))
    }
}

/// Creates (truncating) `path`, creating parent directories as needed.
pub fn create_output(path: &Path) -> Result<Box<dyn Write>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| PunktError::io(e, Some(parent.to_path_buf())))?;
    }
    let file = File::create(path).map_err(|e| PunktError::io(e, Some(path.to_path_buf())))?;
    wrap_output(file, path)
}

/// Opens `path` for appending. Appending to a `.zst` file starts a new zstd frame.
pub fn append_output(path: &Path) -> Result<Box<dyn Write>> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| PunktError::io(e, Some(path.to_path_buf())))?;
    wrap_output(file, path)
}

/// Number of lines in `path`, `0` if it does not exist.
pub fn count_lines(path: &Path) -> Result<usize> {
    if !path.exists() {
        return Ok(0);
    }
    let mut reader = open_input(path)?;
    let mut count = 0;
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        let n = reader
            .read_until(b'\n', &mut buffer)
            .map_err(|e| PunktError::io(e, Some(path.to_path_buf())))?;
        if n == 0 {
            return Ok(count);
        }
        count += 1;
    }
}

/// Readies an output left behind by an interrupted run for appending and
/// returns the number of complete lines it holds, `0` if it does not exist.
///
/// A last line without its newline is dropped. In a `.zst` file the unfinished
/// last frame is dropped as well, keeping every complete line it decodes to.
pub fn recover_lines(path: &Path) -> Result<usize> {
    if !path.exists() {
        return Ok(0);
    }
    let io_err = |e| PunktError::io(e, Some(path.to_path_buf()));

    let mut reader = open_input(path)?;
    let mut count = 0;
    let mut complete_bytes = 0u64;
    let mut buffer = Vec::new();
    let damaged = loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer) {
            Ok(0) => break false,
            Ok(n) if buffer.ends_with(b"\n") => {
                count += 1;
                complete_bytes += n as u64;
            }
            Ok(_) => break true,
            Err(e) if is_zstd(path) => {
                warn!("{} is truncated ({e})", path.display());
                break true;
            }
            Err(e) => return Err(io_err(e)),
        }
    };
    drop(reader);

    if damaged {
        warn!("Keeping the first {count} complete lines of {}", path.display());
        if is_zstd(path) {
            rewrite_zstd_prefix(path, count)?;
        } else {
            OpenOptions::new()
                .write(true)
                .open(path)
                .and_then(|file| file.set_len(complete_bytes))
                .map_err(io_err)?;
        }
    }
    Ok(count)
}

/// Replaces `path` with a single finished frame holding its first `lines` lines.
fn rewrite_zstd_prefix(path: &Path, lines: usize) -> Result<()> {
    let io_err = |e| PunktError::io(e, Some(path.to_path_buf()));
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let temp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;

    let mut reader = open_input(path)?;
    let mut encoder = zstd::Encoder::new(temp.as_file(), 0).map_err(io_err)?;
    let mut buffer = Vec::new();
    for _ in 0..lines {
        buffer.clear();
        reader.read_until(b'\n', &mut buffer).map_err(io_err)?;
        encoder.write_all(&buffer).map_err(io_err)?;
    }
    encoder.finish().map_err(io_err)?;
    drop(reader);

    temp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

/// Writes `value` as a single JSON line.
pub fn write_record<W: Write + ?Sized, T: Serialize>(writer: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer(&mut *writer, value)?;
    writer.write_all(b"\n")?;
    Ok(())
}

pub fn get_str<'a>(record: &'a Record, key: &str) -> Option<&'a str> {
    record.get(key).and_then(Value::as_str)
}
