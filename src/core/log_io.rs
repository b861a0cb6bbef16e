use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::model::LogEvent;
use super::parser::LineParser;

/// Extension of capture files written by the normalizer.
pub const CAPTURE_EXTENSION: &str = "jsonl";

/// Follows a growing file, handing out complete lines only.
pub struct LogTailer {
    file: File,
    position: u64,
    path: PathBuf,
}

impl LogTailer {
    /// Open positioned at the end: only lines written from now on are read.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let mut tailer = Self::open_from_start(path)?;
        tailer.position = tailer.file.metadata()?.len();
        Ok(tailer)
    }

    pub fn open_from_start(path: impl AsRef<Path>) -> io::Result<Self> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref)?;
        Ok(Self {
            file,
            position: 0,
            path: path_ref.to_path_buf(),
        })
    }

    /// Lines completed since the last call. A trailing partial line stays
    /// unread until its newline arrives.
    pub fn read_new_lines(&mut self) -> io::Result<Vec<String>> {
        let mut lines = Vec::new();

        if self.file.metadata()?.len() < self.position {
            log::info!("{:?} was truncated, reading from the start", self.path);
            self.position = 0;
        }

        self.file.seek(SeekFrom::Start(self.position))?;
        let mut reader = BufReader::new(&self.file);
        let mut buffer = String::new();

        loop {
            buffer.clear();
            let bytes_read = reader.read_line(&mut buffer)?;
            if bytes_read == 0 || !buffer.ends_with('\n') {
                break;
            }
            self.position += bytes_read as u64;
            let line = buffer.trim_end_matches(&['\r', '\n'][..]).to_string();
            lines.push(line);
        }

        Ok(lines)
    }

    pub fn rewind(&mut self) -> io::Result<()> {
        self.position = 0;
        self.file.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A tailer paired with the parser for its capture.
pub struct CaptureTailer {
    tailer: LogTailer,
    parser: LineParser,
}

impl CaptureTailer {
    pub fn new(tailer: LogTailer) -> Self {
        Self {
            tailer,
            parser: LineParser::new(),
        }
    }

    pub fn read_new_events(&mut self) -> io::Result<Vec<LogEvent>> {
        let lines = self.tailer.read_new_lines()?;
        Ok(lines
            .iter()
            .filter_map(|line| self.parser.parse_line(line))
            .collect())
    }

    pub fn path(&self) -> &Path {
        self.tailer.path()
    }
}

pub fn read_full_lines(path: impl AsRef<Path>) -> io::Result<Vec<String>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut lines = Vec::new();

    for line_result in reader.lines() {
        let line = line_result?;
        lines.push(line);
    }

    Ok(lines)
}

/// Read a whole capture into an ordered batch of events.
pub fn read_capture(path: impl AsRef<Path>) -> io::Result<Vec<LogEvent>> {
    let lines = read_full_lines(path)?;
    let mut events = Vec::new();
    let mut parser = LineParser::new();

    for line in lines {
        if let Some(event) = parser.parse_line(&line) {
            events.push(event);
        }
    }

    Ok(events)
}

/// Most recently modified capture file in `dir`.
pub fn latest_capture(dir: impl AsRef<Path>) -> io::Result<Option<PathBuf>> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let is_capture = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(CAPTURE_EXTENSION));
        if !is_capture {
            continue;
        }

        let last_modified = fs::metadata(&path)?
            .modified()
            .unwrap_or(SystemTime::UNIX_EPOCH);
        match &newest {
            Some((existing, _)) if *existing >= last_modified => {} // Keep existing
            _ => newest = Some((last_modified, path)),
        }
    }

    Ok(newest.map(|(_, path)| path))
}
