use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Bytes of framing around each payload: length prefix plus CRC trailer.
const FRAME_OVERHEAD: u64 = 8;

/// Largest payload a frame may declare. Anything bigger is garbage, not an event.
const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

fn write_frame(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "event too large for one frame"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

enum Frame {
    Event(Event, u64),
    End,
    /// Short read, bad CRC or undecodable payload. Everything from here on is dropped.
    Torn,
}

/// `Ok(false)` if the reader ran dry before `buf` was filled.
fn fill(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn read_frame(reader: &mut impl Read) -> io::Result<Frame> {
    let mut len_buf = [0u8; 4];
    if !fill(reader, &mut len_buf)? {
        return Ok(Frame::End);
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Ok(Frame::Torn);
    }

    let mut payload = vec![0u8; len];
    let mut crc_buf = [0u8; 4];
    if !fill(reader, &mut payload)? || !fill(reader, &mut crc_buf)? {
        return Ok(Frame::Torn);
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(Frame::Torn);
    }
    match bincode::deserialize::<Event>(&payload) {
        Ok(event) => Ok(Frame::Event(event, len as u64 + FRAME_OVERHEAD)),
        Err(_) => Ok(Frame::Torn),
    }
}

/// Result of reading a log back from disk.
#[derive(Debug, Default)]
pub struct Replay {
    pub events: Vec<Event>,
    /// Length of the prefix made of intact frames.
    pub intact_bytes: u64,
    /// Bytes after the last intact frame (a crash mid-write, or corruption).
    pub discarded_bytes: u64,
}

/// Append-only event log.
///
/// Each entry is `[u32 len][bincode Event][u32 crc32]`, little-endian. One
/// entry is the unit of atomicity: a torn last entry is ignored on replay.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Buffer one entry. Not durable until [`Wal::sync`].
    pub fn push(&mut self, event: &Event) -> io::Result<()> {
        write_frame(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    /// Current length of the log file. Excludes anything still buffered.
    pub fn file_len(&self) -> io::Result<u64> {
        Ok(self.writer.get_ref().metadata()?.len())
    }

    /// Append `events` and fsync them as one unit. On any error the log is cut
    /// back to where it was, so none of them survive a restart.
    pub fn commit(&mut self, events: &[&Event]) -> io::Result<()> {
        let mark = self.file_len()?;
        let appends = self.appends_since_compact;
        let written = events
            .iter()
            .try_for_each(|event| self.push(event))
            .and_then(|()| self.sync());
        if let Err(e) = written {
            self.appends_since_compact = appends;
            self.rollback(mark)?;
            return Err(e);
        }
        Ok(())
    }

    /// Drop buffered bytes and truncate the file to `len`.
    pub fn rollback(&mut self, len: u64) -> io::Result<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        file.set_len(len)?;
        file.sync_all()?;
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
        // into_parts hands back the unflushed buffer instead of writing it on drop.
        let _ = stale.into_parts();
        Ok(())
    }

    /// Replace the log with `snapshot`: write a sibling temp file, fsync it,
    /// rename it over the log and reopen for appending.
    pub fn rewrite(&mut self, snapshot: &[Event]) -> io::Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        {
            let mut tmp = BufWriter::new(File::create(&tmp_path)?);
            for event in snapshot {
                write_frame(&mut tmp, event)?;
            }
            tmp.flush()?;
            tmp.get_ref().sync_all()?;
        }
        self.sync()?;
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    /// Replay and cut off a torn tail, so appends made after a crash land
    /// directly behind the last intact entry.
    pub fn recover(path: &Path) -> io::Result<Replay> {
        let replay = Self::replay(path)?;
        if replay.discarded_bytes > 0 {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(replay.intact_bytes)?;
            file.sync_all()?;
        }
        Ok(replay)
    }

    /// Read every intact entry. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Replay> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Replay::default()),
            Err(e) => return Err(e),
        };
        let total = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut replay = Replay::default();
        let mut consumed = 0u64;

        loop {
            match read_frame(&mut reader)? {
                Frame::Event(event, size) => {
                    consumed += size;
                    replay.events.push(event);
                }
                Frame::End | Frame::Torn => break,
            }
        }
        replay.intact_bytes = consumed;
        replay.discarded_bytes = total.saturating_sub(consumed);
        Ok(replay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use ulid::Ulid;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("frontdesk_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn room_created(name: &str) -> Event {
        Event::RoomCreated {
            room: Room {
                id: Ulid::new(),
                name: name.into(),
                rate: 100,
                status: RoomStatus::Available,
            },
        }
    }

    #[test]
    fn push_sync_and_replay() {
        let path = tmp_path("push_sync_and_replay.wal");
        let events = vec![
            room_created("101"),
            Event::BookingPaid {
                id: Ulid::new(),
                method: "Cash".into(),
            },
        ];
        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.push(e).unwrap();
            }
            wal.sync().unwrap();
            assert_eq!(wal.appends_since_compact(), 2);
        }

        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, events);
        assert_eq!(replay.discarded_bytes, 0);
    }

    #[test]
    fn replay_missing_file_is_empty() {
        let path = tmp_path("missing.wal");
        let replay = Wal::replay(&path).unwrap();
        assert!(replay.events.is_empty());
    }

    #[test]
    fn torn_tail_is_discarded() {
        let path = tmp_path("torn_tail.wal");
        let event = room_created("101");
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.push(&event).unwrap();
            wal.sync().unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[9u8, 0, 0, 0, 1, 2]).unwrap();
        }

        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![event]);
        assert_eq!(replay.discarded_bytes, 6);
    }

    #[test]
    fn recover_truncates_torn_tail_before_new_appends() {
        let path = tmp_path("recover_torn_tail.wal");
        let first = room_created("101");
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.commit(&[&first]).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[40u8, 0, 0, 0, 1, 2, 3]).unwrap();
        }

        let recovered = Wal::recover(&path).unwrap();
        assert_eq!(recovered.events, vec![first.clone()]);
        assert_eq!(recovered.discarded_bytes, 7);

        let second = room_created("102");
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.commit(&[&second]).unwrap();
        }

        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![first, second]);
        assert_eq!(replay.discarded_bytes, 0);
    }

    #[test]
    fn rollback_discards_buffered_and_synced_frames() {
        let path = tmp_path("rollback.wal");
        let kept = room_created("101");
        let mut wal = Wal::open(&path).unwrap();
        wal.commit(&[&kept]).unwrap();
        let mark = wal.file_len().unwrap();

        // one frame already on disk, one still buffered
        wal.push(&room_created("102")).unwrap();
        wal.sync().unwrap();
        wal.push(&room_created("103")).unwrap();
        wal.rollback(mark).unwrap();
        assert_eq!(wal.file_len().unwrap(), mark);

        let after = room_created("104");
        wal.commit(&[&after]).unwrap();
        drop(wal);

        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![kept, after]);
        assert_eq!(replay.discarded_bytes, 0);
    }

    #[test]
    fn bad_crc_stops_replay() {
        let path = tmp_path("bad_crc.wal");
        let first = room_created("101");
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.push(&first).unwrap();
            wal.sync().unwrap();
        }
        {
            let payload = bincode::serialize(&room_created("102")).unwrap();
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&0xDEAD_BEEFu32.to_le_bytes()).unwrap();
        }

        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![first]);
        assert!(replay.discarded_bytes > 0);
    }

    #[test]
    fn rewrite_replaces_history() {
        let path = tmp_path("rewrite.wal");
        let mut wal = Wal::open(&path).unwrap();
        for i in 0..5 {
            wal.push(&room_created(&format!("{i}"))).unwrap();
        }
        wal.sync().unwrap();

        let snapshot = vec![room_created("only")];
        wal.rewrite(&snapshot).unwrap();
        assert_eq!(wal.appends_since_compact(), 0);

        let after = room_created("after");
        wal.push(&after).unwrap();
        wal.sync().unwrap();

        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![snapshot[0].clone(), after]);
        assert!(!path.with_extension("wal.tmp").exists());
    }
}
