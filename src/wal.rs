use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Append-only log of room and reservation events.
///
/// Each entry is `[u32 le: len][bincode: Event][u32 le: crc32 of payload]`.
/// A torn or corrupt tail (crash mid-write) ends replay; everything before it is kept.
///
/// Appends are encoded into an in-memory batch and reach the file only in
/// `flush_sync`. A failed flush cuts the file back to its last durable length,
/// so a batch is either wholly on disk or not at all.
pub struct Wal {
    file: File,
    path: PathBuf,
    batch: Vec<u8>,
    batch_events: u64,
    /// File length after the last successful flush.
    durable_len: u64,
    appends_since_compact: u64,
}

fn open_for_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn compact_tmp_path(path: &Path) -> PathBuf {
    path.with_extension("wal.tmp")
}

fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())
}

/// `Ok(None)` at a clean end of file or a torn entry.
fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<Option<()>> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(Some(())),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

/// Read one entry and check its CRC. Returns the event and its encoded size;
/// `Ok(None)` means replay should stop here.
fn read_entry(reader: &mut impl Read) -> io::Result<Option<(Event, u64)>> {
    let mut word = [0u8; 4];
    if read_exact_or_eof(reader, &mut word)?.is_none() {
        return Ok(None);
    }
    let mut payload = vec![0u8; u32::from_le_bytes(word) as usize];
    if read_exact_or_eof(reader, &mut payload)?.is_none() {
        return Ok(None);
    }
    if read_exact_or_eof(reader, &mut word)?.is_none() {
        return Ok(None);
    }
    if u32::from_le_bytes(word) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    Ok(bincode::deserialize::<Event>(&payload)
        .ok()
        .map(|event| (event, 8 + payload.len() as u64)))
}

/// Intact events plus the byte length they occupy.
fn scan(path: &Path) -> io::Result<(Vec<Event>, u64, u64)> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0, 0)),
        Err(e) => return Err(e),
    };
    let total = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    let mut events = Vec::new();
    let mut valid: u64 = 0;
    while let Some((event, size)) = read_entry(&mut reader)? {
        valid += size;
        events.push(event);
    }
    Ok((events, valid, total))
}

impl Wal {
    /// Open (or create) the log at `path` for appending at its current end.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = open_for_append(path)?;
        let durable_len = file.metadata()?.len();
        Ok(Self {
            file,
            path: path.to_path_buf(),
            batch: Vec::new(),
            batch_events: 0,
            durable_len,
            appends_since_compact: 0,
        })
    }

    /// Replay the log, cut off any torn tail and open it for appending, so new
    /// entries land directly after the last intact one.
    pub fn recover(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let (events, valid, total) = scan(path)?;
        if valid < total {
            tracing::warn!(
                "{}: truncating {} trailing bytes after {} events",
                path.display(),
                total - valid,
                events.len()
            );
            OpenOptions::new().write(true).open(path)?.set_len(valid)?;
        }
        Ok((Self::open(path)?, events))
    }

    /// Append one event and fsync. The ledger batches with `append_buffered` instead.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Add an event to the pending batch. Not durable until `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        let mut entry = Vec::new();
        encode_event(&mut entry, event)?;
        self.batch.extend_from_slice(&entry);
        self.batch_events += 1;
        self.appends_since_compact += 1;
        Ok(())
    }

    /// Drop the pending batch without writing it.
    pub fn discard_pending(&mut self) {
        self.appends_since_compact -= self.batch_events;
        self.batch.clear();
        self.batch_events = 0;
    }

    /// Write the pending batch and fsync. On failure nothing of the batch stays on disk.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let result = self
            .file
            .write_all(&self.batch)
            .and_then(|()| self.file.sync_data());
        match result {
            Ok(()) => {
                self.durable_len += self.batch.len() as u64;
                self.batch.clear();
                self.batch_events = 0;
                Ok(())
            }
            Err(e) => {
                self.discard_pending();
                if let Err(trunc) = self.file.set_len(self.durable_len) {
                    tracing::warn!(
                        "{}: could not roll back failed flush: {trunc}",
                        self.path.display()
                    );
                }
                Err(e)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Write the compacted event set next to the log and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(compact_tmp_path(path))?);
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the compacted file over the log and reopen it.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(compact_tmp_path(&self.path), &self.path)?;
        *self = Self::open(&self.path)?;
        Ok(())
    }

    /// Both compaction phases in one call.
    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    /// Every intact event in the log, in append order. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        let (events, valid, total) = scan(path)?;
        if valid < total {
            tracing::warn!(
                "{}: ignoring {} trailing bytes after {} events",
                path.display(),
                total - valid,
                events.len()
            );
        }
        Ok(events)
    }
}
