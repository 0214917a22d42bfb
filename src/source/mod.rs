pub mod companion;

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

pub use companion::{
    base_name, check_extensions, file_name, filename_extension, open_by_ext, open_by_filename,
    parent_path, resolve_sibling, swap_extension,
};

/// Byte order selected per call, since container families mix both
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endian {
    Big,
    Little,
}

impl Endian {
    pub fn read_u16(self, buf: &[u8]) -> u16 {
        match self {
            Endian::Big => BigEndian::read_u16(buf),
            Endian::Little => LittleEndian::read_u16(buf),
        }
    }

    pub fn read_i16(self, buf: &[u8]) -> i16 {
        match self {
            Endian::Big => BigEndian::read_i16(buf),
            Endian::Little => LittleEndian::read_i16(buf),
        }
    }

    pub fn read_u32(self, buf: &[u8]) -> u32 {
        match self {
            Endian::Big => BigEndian::read_u32(buf),
            Endian::Little => LittleEndian::read_u32(buf),
        }
    }

    pub fn read_i32(self, buf: &[u8]) -> i32 {
        match self {
            Endian::Big => BigEndian::read_i32(buf),
            Endian::Little => LittleEndian::read_i32(buf),
        }
    }
}

/// Random-access byte range source. The core never assumes sequential reads.
pub trait ByteSource: Send + Sync {
    /// Fill `buf` from `offset`; anything short of the full length is an error
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), SourceError>;

    /// Total length in bytes
    fn size(&self) -> u64;

    /// Name as given when opened (may include a path)
    fn name(&self) -> &str;

    /// Open another source by full name, resolved the same way this one was
    fn open_sibling(&self, _name: &str) -> Option<Box<dyn ByteSource>> {
        None
    }

    fn read(&self, offset: u64, length: usize) -> Result<Vec<u8>, SourceError> {
        let mut buf = vec![0u8; length];
        self.read_exact_at(offset, &mut buf)?;
        Ok(buf)
    }
}

/// Typed reads on top of any byte source
pub trait ByteSourceExt {
    fn read_u8(&self, offset: u64) -> Result<u8, SourceError>;
    fn read_u16(&self, offset: u64, endian: Endian) -> Result<u16, SourceError>;
    fn read_i16(&self, offset: u64, endian: Endian) -> Result<i16, SourceError>;
    fn read_u32(&self, offset: u64, endian: Endian) -> Result<u32, SourceError>;
    fn read_i32(&self, offset: u64, endian: Endian) -> Result<i32, SourceError>;
    /// Compare a 4-byte tag stored in file order
    fn is_id32(&self, offset: u64, id: &[u8; 4]) -> bool;
}

impl<S: ByteSource + ?Sized> ByteSourceExt for S {
    fn read_u8(&self, offset: u64) -> Result<u8, SourceError> {
        let mut buf = [0u8; 1];
        self.read_exact_at(offset, &mut buf)?;
        Ok(buf[0])
    }

    fn read_u16(&self, offset: u64, endian: Endian) -> Result<u16, SourceError> {
        let mut buf = [0u8; 2];
        self.read_exact_at(offset, &mut buf)?;
        Ok(endian.read_u16(&buf))
    }

    fn read_i16(&self, offset: u64, endian: Endian) -> Result<i16, SourceError> {
        let mut buf = [0u8; 2];
        self.read_exact_at(offset, &mut buf)?;
        Ok(endian.read_i16(&buf))
    }

    fn read_u32(&self, offset: u64, endian: Endian) -> Result<u32, SourceError> {
        let mut buf = [0u8; 4];
        self.read_exact_at(offset, &mut buf)?;
        Ok(endian.read_u32(&buf))
    }

    fn read_i32(&self, offset: u64, endian: Endian) -> Result<i32, SourceError> {
        let mut buf = [0u8; 4];
        self.read_exact_at(offset, &mut buf)?;
        Ok(endian.read_i32(&buf))
    }

    fn is_id32(&self, offset: u64, id: &[u8; 4]) -> bool {
        let mut buf = [0u8; 4];
        self.read_exact_at(offset, &mut buf).is_ok() && &buf == id
    }
}

fn check_range(offset: u64, requested: usize, size: u64) -> Result<(), SourceError> {
    let end = offset.checked_add(requested as u64);
    match end {
        Some(end) if end <= size => Ok(()),
        _ => Err(SourceError::ShortRead {
            offset,
            requested,
            available: size.saturating_sub(offset) as usize,
        }),
    }
}

/// Filesystem-backed source
pub struct FileSource {
    name: String,
    file: Mutex<File>,
    size: u64,
}

impl FileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SourceError::NotFound {
                name: path.to_string_lossy().to_string(),
            },
            _ => SourceError::Io(e),
        })?;
        let size = file.metadata()?.len();

        Ok(Self {
            name: path.to_string_lossy().to_string(),
            file: Mutex::new(file),
            size,
        })
    }
}

impl ByteSource for FileSource {
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), SourceError> {
        check_range(offset, buf.len(), self.size)?;

        let mut file = self
            .file
            .lock()
            .map_err(|_| SourceError::Io(std::io::Error::new(std::io::ErrorKind::Other, "file lock poisoned")))?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn open_sibling(&self, name: &str) -> Option<Box<dyn ByteSource>> {
        match FileSource::open(name) {
            Ok(source) => Some(Box::new(source)),
            Err(e) => {
                log::debug!("Companion '{}' not opened: {}", name, e);
                None
            }
        }
    }
}

/// In-memory source, optionally attached to a volume for companion lookups
#[derive(Clone)]
pub struct MemorySource {
    name: String,
    data: Arc<[u8]>,
    volume: Option<MemoryVolume>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: Arc::from(data.into()),
            volume: None,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

impl ByteSource for MemorySource {
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), SourceError> {
        check_range(offset, buf.len(), self.data.len() as u64)?;
        let start = offset as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn open_sibling(&self, name: &str) -> Option<Box<dyn ByteSource>> {
        let volume = self.volume.as_ref()?;
        volume.open(name).map(|s| Box::new(s) as Box<dyn ByteSource>)
    }
}

/// Named set of in-memory files. Sources opened from it can find their companions.
#[derive(Clone, Default)]
pub struct MemoryVolume {
    files: Arc<RwLock<HashMap<String, Arc<[u8]>>>>,
}

impl MemoryVolume {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: impl Into<String>, data: impl Into<Vec<u8>>) {
        if let Ok(mut files) = self.files.write() {
            files.insert(name.into(), Arc::from(data.into()));
        }
    }

    pub fn open(&self, name: &str) -> Option<MemorySource> {
        let files = self.files.read().ok()?;
        let data = files.get(name)?.clone();
        Some(MemorySource {
            name: name.to_string(),
            data,
            volume: Some(self.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_endian_reads() {
        let source = MemorySource::new("a.bin", vec![0x12, 0x34, 0x56, 0x78, 0xff, 0xfe]);

        assert_eq!(source.read_u16(0, Endian::Big).unwrap(), 0x1234);
        assert_eq!(source.read_u16(0, Endian::Little).unwrap(), 0x3412);
        assert_eq!(source.read_u32(0, Endian::Big).unwrap(), 0x12345678);
        assert_eq!(source.read_u32(0, Endian::Little).unwrap(), 0x78563412);
        assert_eq!(source.read_i16(4, Endian::Big).unwrap(), -2);
        assert_eq!(source.read_u8(5).unwrap(), 0xfe);
    }

    #[test]
    fn test_short_read_reports_available() {
        let source = MemorySource::new("a.bin", vec![0u8; 10]);

        match source.read(8, 4) {
            Err(SourceError::ShortRead { offset, requested, available }) => {
                assert_eq!(offset, 8);
                assert_eq!(requested, 4);
                assert_eq!(available, 2);
            }
            other => panic!("Expected ShortRead, got {:?}", other.map(|v| v.len())),
        }
        assert!(source.read(20, 1).is_err());
    }

    #[test]
    fn test_is_id32() {
        let source = MemorySource::new("a.bin", b"RIFX\0\0\0\0".to_vec());
        assert!(source.is_id32(0, b"RIFX"));
        assert!(!source.is_id32(0, b"RIFF"));
        assert!(!source.is_id32(6, b"RIFX"));
    }

    #[test]
    fn test_file_source_random_access() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();

        let source = FileSource::open(file.path()).unwrap();
        assert_eq!(source.size(), 8);
        assert_eq!(source.read(6, 2).unwrap(), vec![7, 8]);
        assert_eq!(source.read(0, 2).unwrap(), vec![1, 2]);
        assert!(matches!(source.read(7, 2), Err(SourceError::ShortRead { .. })));
    }

    #[test]
    fn test_file_source_missing() {
        assert!(matches!(
            FileSource::open("/nonexistent/file.gsb"),
            Err(SourceError::NotFound { .. })
        ));
    }

    #[test]
    fn test_memory_volume_siblings() {
        let volume = MemoryVolume::new();
        volume.insert("music/bgm.gsb", vec![0u8; 4]);
        volume.insert("music/bgm.gsp", b"GSND".to_vec());

        let data = volume.open("music/bgm.gsb").unwrap();
        let header = data.open_sibling("music/bgm.gsp").unwrap();
        assert!(header.is_id32(0, b"GSND"));
        assert!(data.open_sibling("music/other.gsp").is_none());

        let detached = MemorySource::new("bgm.gsb", vec![0u8; 4]);
        assert!(detached.open_sibling("bgm.gsp").is_none());
    }
}
