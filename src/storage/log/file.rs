use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use bytes::BufMut;
use log::debug;
use parking_lot::Mutex;

use crate::common::PageId;
use crate::concurrency::TransactionId;
use crate::error::{Error, Result};
use super::{LogFile, LogRecord};

/// Append-only write-ahead log file. Each record is a big-endian u32 length followed by the
/// bincode encoding of a LogRecord.
pub struct FileLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    sync: bool,
}

impl FileLog {
    /// Opens the log at path, creating it if needed. With sync set, force also syncs the file to
    /// disk.
    pub fn open(path: impl AsRef<Path>, sync: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!("Opened write-ahead log {}", path.display());
        Ok(Self { path, writer: Mutex::new(BufWriter::new(file)), sync })
    }

    /// Reads back every complete record in the log. A torn record at the tail is ignored.
    pub fn records(&self) -> Result<Vec<LogRecord>> {
        self.writer.lock().flush()?;
        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut records = Vec::new();
        let mut len_buf = [0u8; 4];
        loop {
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::UnexpectedEof => break,
                Err(err) => return Err(err.into()),
            }
            let len = u32::from_be_bytes(len_buf) as usize;
            let mut record = vec![0u8; len];
            match reader.read_exact(&mut record) {
                Ok(()) => records.push(bincode::deserialize(&record)?),
                Err(err) if err.kind() == ErrorKind::UnexpectedEof => break,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(records)
    }
}

impl Display for FileLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "file:{}", self.path.display())
    }
}

impl LogFile for FileLog {
    fn log_write(&self, tid: TransactionId, pid: PageId, before: &[u8], after: &[u8]) -> Result<()> {
        let record = LogRecord { txn: tid.id(), page: pid, before: before.to_vec(), after: after.to_vec() };
        let encoded = bincode::serialize(&record)?;
        let len = u32::try_from(encoded.len())
            .map_err(|_| Error::Internal(format!("Log record of {} bytes too large", encoded.len())))?;

        let mut buf = Vec::with_capacity(4 + encoded.len());
        buf.put_u32(len);
        buf.put_slice(&encoded);
        self.writer.lock().write_all(&buf)?;
        Ok(())
    }

    fn force(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.flush()?;
        if self.sync {
            writer.get_ref().sync_data()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_records_round_trip_across_reopen() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("wal.log");
        let tid = TransactionId::new();
        {
            let log = FileLog::open(&path, true)?;
            log.log_write(tid, PageId::new(1, 0), &[0; 8], &[1; 8])?;
            log.log_write(tid, PageId::new(1, 2), &[2; 8], &[3; 8])?;
            log.force()?;
        }

        let log = FileLog::open(&path, false)?;
        log.log_write(tid, PageId::new(2, 0), &[], &[9])?;
        let records = log.records()?;
        assert_eq!(3, records.len());
        assert_eq!(PageId::new(1, 2), records[1].page);
        assert_eq!(vec![3; 8], records[1].after);
        assert_eq!(tid.id(), records[2].txn);
        Ok(())
    }

    #[test]
    fn test_torn_tail_ignored() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("wal.log");
        let log = FileLog::open(&path, false)?;
        log.log_write(TransactionId::new(), PageId::new(1, 0), &[0; 4], &[1; 4])?;
        log.force()?;

        let mut file = OpenOptions::new().append(true).open(&path)?;
        file.write_all(&[0, 0, 0, 200, 1, 2])?;

        assert_eq!(1, log.records()?.len());
        Ok(())
    }
}
