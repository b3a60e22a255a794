//! Date- and size-rotated log file.
//!
//! Files are named `<prefix>-YYYY-MM-DD.log`. When the day's file reaches
//! the size cap, writing continues in `<prefix>-YYYY-MM-DD.log.1`, `.2`, …
//! When the date changes, files whose date is older than the retention
//! window are deleted.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{Days, NaiveDate};

const DEFAULT_MAX_BYTES: u64 = 20 * 1024 * 1024;
const DEFAULT_RETENTION_DAYS: u64 = 14;

#[derive(Debug)]
pub struct RollingFile {
    dir: PathBuf,
    prefix: String,
    max_bytes: u64,
    retention_days: u64,
    current: Option<Segment>,
}

#[derive(Debug)]
struct Segment {
    date: NaiveDate,
    index: u32,
    file: File,
    written: u64,
}

impl RollingFile {
    /// 20 MiB per file, 14 days of retention. Creates `dir` if needed.
    pub fn new(dir: &Path, prefix: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            prefix: prefix.to_owned(),
            max_bytes: DEFAULT_MAX_BYTES,
            retention_days: DEFAULT_RETENTION_DAYS,
            current: None,
        })
    }

    pub fn max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn retention_days(mut self, days: u64) -> Self {
        self.retention_days = days;
        self
    }

    /// Appends `line`, rotating first if `today` changed or the file is full.
    pub fn write_line(&mut self, line: &[u8], today: NaiveDate) -> io::Result<()> {
        // A first open counts as a new day: leftovers from earlier runs are pruned too.
        let rotate = match &self.current {
            Some(seg) if seg.date == today => {
                seg.written > 0 && seg.written + line.len() as u64 > self.max_bytes
            }
            _ => {
                self.prune(today)?;
                true
            }
        };

        if rotate {
            let from = match &self.current {
                Some(seg) if seg.date == today => seg.index + 1,
                _ => 0,
            };
            self.current = Some(self.open(today, from)?);
        }

        let Some(seg) = self.current.as_mut() else {
            return Ok(());
        };
        seg.file.write_all(line)?;
        seg.written += line.len() as u64;
        Ok(())
    }

    pub fn path_for(&self, date: NaiveDate, index: u32) -> PathBuf {
        let base = format!("{}-{}.log", self.prefix, date.format("%Y-%m-%d"));
        match index {
            0 => self.dir.join(base),
            n => self.dir.join(format!("{base}.{n}")),
        }
    }

    /// Opens the first segment at or after `from` that still has room.
    fn open(&self, date: NaiveDate, from: u32) -> io::Result<Segment> {
        let mut index = from;
        loop {
            let path = self.path_for(date, index);
            let written = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            if written < self.max_bytes {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                return Ok(Segment { date, index, file, written });
            }
            index += 1;
        }
    }

    /// Deletes this prefix's files dated before the retention window.
    fn prune(&self, today: NaiveDate) -> io::Result<()> {
        let Some(cutoff) = today.checked_sub_days(Days::new(self.retention_days)) else {
            return Ok(());
        };
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(date) = name.to_str().and_then(|n| self.date_of(n)) else {
                continue;
            };
            if date < cutoff {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    fn date_of(&self, file_name: &str) -> Option<NaiveDate> {
        let rest = file_name.strip_prefix(&self.prefix)?.strip_prefix('-')?;
        let date = rest.get(..10)?;
        if !rest[10..].starts_with(".log") {
            return None;
        }
        NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
    }
}
