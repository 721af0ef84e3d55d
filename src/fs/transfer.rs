//! Transfer gate
//!
//! Single-file create, open, read, write and directory creation. Reads are
//! gated by [`ReadMode`]: inline previews are capped by
//! [`TransferLimits::inline_read_max`], downloads are streamed through a
//! fixed buffer and never held in memory whole.

use crate::config::{CreateKind, TransferLimits};
use crate::error::{HostFilesError, IoResultExt, Result, SizeLimit};
use crate::remote::{RemoteFile, RemoteFs};
use std::fmt;
use std::io::{Read, Write};

/// Buffer size for streamed transfers
pub const STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// How the caller wants file content delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// Return the whole content as text, subject to the inline cap
    #[default]
    Inline,
    /// Stream the content, no size cap
    Download,
}

/// Result of a gated read
pub enum ReadOutcome {
    /// Full content as text
    Inline(String),
    /// Content to be streamed to the caller
    Download(Download),
}

impl fmt::Debug for ReadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline(text) => f.debug_tuple("Inline").field(&text.len()).finish(),
            Self::Download(d) => f.debug_tuple("Download").field(d).finish(),
        }
    }
}

/// A streaming download. Owns the remote handle; dropping it releases the
/// handle even if the stream was not consumed.
pub struct Download {
    /// Suggested file name, the last path segment
    pub filename: String,
    /// Size reported when the handle was opened
    pub size: u64,
    path: String,
    reader: Box<dyn RemoteFile>,
}

impl fmt::Debug for Download {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Download")
            .field("filename", &self.filename)
            .field("size", &self.size)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Download {
    /// Copy the remaining content into `writer`; returns bytes copied
    pub fn stream_to<W: Write + ?Sized>(mut self, writer: &mut W) -> Result<u64> {
        let path = self.path.clone();
        copy_stream(&mut self.reader, writer, &path)
    }
}

impl Read for Download {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

/// Copy `reader` into `writer` through a [`STREAM_BUFFER_SIZE`] buffer.
///
/// Errors are attributed to `path`.
pub fn copy_stream<R, W>(reader: &mut R, writer: &mut W, path: &str) -> Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buffer = vec![0u8; STREAM_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).remote_path(path),
        };
        writer.write_all(&buffer[..n]).remote_path(path)?;
        total += n as u64;
    }

    writer.flush().remote_path(path)?;
    Ok(total)
}

/// Create an empty file. Fails if the parent directory is missing.
pub fn create_file(fs: &dyn RemoteFs, path: &str) -> Result<()> {
    let mut file = fs.create(path)?;
    file.flush().remote_path(path)
}

/// Create one directory. Not idempotent.
pub fn mkdir(fs: &dyn RemoteFs, path: &str) -> Result<()> {
    fs.mkdir(path)
}

/// Create a file or a directory
pub fn create(fs: &dyn RemoteFs, path: &str, kind: CreateKind) -> Result<()> {
    if path.is_empty() {
        return Err(HostFilesError::invalid("path must not be empty"));
    }
    match kind {
        CreateKind::File => create_file(fs, path),
        CreateKind::Dir => mkdir(fs, path),
    }
}

/// Create a directory, accepting one that already exists
pub fn ensure_dir(fs: &dyn RemoteFs, path: &str) -> Result<()> {
    match fs.mkdir(path) {
        Ok(()) => Ok(()),
        Err(e) => match fs.stat(path) {
            Ok(stat) if stat.is_dir() => {
                tracing::debug!("Directory {} already exists", path);
                Ok(())
            }
            _ => Err(e),
        },
    }
}

/// Open a file for reading
pub fn open(fs: &dyn RemoteFs, path: &str) -> Result<Box<dyn RemoteFile>> {
    fs.open(path)
}

/// Read an open handle according to `mode`.
///
/// Inline reads of files at or above `limits.inline_read_max` fail with
/// [`HostFilesError::TooLarge`] and the handle is released.
pub fn read(
    mut handle: Box<dyn RemoteFile>,
    path: &str,
    mode: ReadMode,
    limits: &TransferLimits,
) -> Result<ReadOutcome> {
    let size = handle.stat()?.size;

    match mode {
        ReadMode::Inline => {
            if size >= limits.inline_read_max {
                return Err(HostFilesError::TooLarge {
                    limit: SizeLimit::InlineRead,
                    size,
                    max: limits.inline_read_max,
                });
            }

            let mut content = Vec::with_capacity(size as usize);
            handle
                .take(limits.inline_read_max)
                .read_to_end(&mut content)
                .remote_path(path)?;

            Ok(ReadOutcome::Inline(String::from_utf8_lossy(&content).into_owned()))
        }
        ReadMode::Download => Ok(ReadOutcome::Download(Download {
            filename: download_filename(path)?,
            size,
            path: path.to_string(),
            reader: handle,
        })),
    }
}

/// Open and read `path` in one step
pub fn read_path(
    fs: &dyn RemoteFs,
    path: &str,
    mode: ReadMode,
    limits: &TransferLimits,
) -> Result<ReadOutcome> {
    let handle = open(fs, path)?;
    read(handle, path, mode, limits)
}

/// Replace the full content of a file
pub fn write(fs: &dyn RemoteFs, path: &str, content: &[u8]) -> Result<()> {
    let mut file = fs.create(path)?;
    file.write_all(content).remote_path(path)?;
    file.flush().remote_path(path)
}

/// Stream at most `size` bytes of `content` into a new file at `path`.
///
/// Content running past `size` fails with [`SizeLimit::DeclaredSize`] and
/// the partial file is removed.
pub fn write_declared(
    fs: &dyn RemoteFs,
    path: &str,
    content: &mut dyn Read,
    size: u64,
) -> Result<u64> {
    let mut file = fs.create(path)?;
    let written = copy_stream(&mut Read::take(&mut *content, size), &mut file, path)?;
    drop(file);

    let mut extra = [0u8; 1];
    let overflow = loop {
        match content.read(&mut extra) {
            Ok(n) => break n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).remote_path(path),
        }
    };
    if overflow == 0 {
        return Ok(written);
    }

    if let Err(e) = fs.remove_file(path) {
        tracing::warn!("Could not remove truncated upload {}: {}", path, e);
    }
    Err(HostFilesError::TooLarge {
        limit: SizeLimit::DeclaredSize,
        size: written + overflow as u64,
        max: size,
    })
}

/// File name offered for a download: the last path segment
pub fn download_filename(path: &str) -> Result<String> {
    let name = crate::remote::file_name(path);
    if name.is_empty() {
        return Err(HostFilesError::invalid(format!(
            "cannot download '{}': path ends with a separator",
            path
        )));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{FsCall, MemoryFs};

    /// Writer that records the largest single write it received
    #[derive(Default)]
    struct ChunkRecorder {
        total: usize,
        largest: usize,
    }

    impl Write for ChunkRecorder {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.total += buf.len();
            self.largest = self.largest.max(buf.len());
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_inline_read_below_limit() {
        let fs = MemoryFs::new();
        fs.add_file("/etc/hostname", "web-01\n");
        let limits = TransferLimits::default();

        match read_path(&fs, "/etc/hostname", ReadMode::Inline, &limits).unwrap() {
            ReadOutcome::Inline(text) => assert_eq!(text, "web-01\n"),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_inline_read_at_limit_is_too_large() {
        let fs = MemoryFs::new();
        let limits = TransferLimits::default();
        fs.add_file("/big.log", vec![b'a'; limits.inline_read_max as usize]);
        fs.add_file("/almost.log", vec![b'a'; limits.inline_read_max as usize - 1]);

        let err = read_path(&fs, "/big.log", ReadMode::Inline, &limits).unwrap_err();
        assert!(matches!(
            err,
            HostFilesError::TooLarge { limit: SizeLimit::InlineRead, .. }
        ));
        assert!(err.to_string().contains("download"));

        assert!(read_path(&fs, "/almost.log", ReadMode::Inline, &limits).is_ok());
    }

    #[test]
    fn test_download_streams_in_bounded_chunks() {
        let fs = MemoryFs::new();
        let size = 3 * 1024 * 1024 + 17;
        fs.add_file("/var/dump.bin", vec![7u8; size]);
        let limits = TransferLimits::default();

        let outcome = read_path(&fs, "/var/dump.bin", ReadMode::Download, &limits).unwrap();
        let download = match outcome {
            ReadOutcome::Download(d) => d,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(download.filename, "dump.bin");
        assert_eq!(download.size, size as u64);

        let mut sink = ChunkRecorder::default();
        assert_eq!(download.stream_to(&mut sink).unwrap(), size as u64);
        assert_eq!(sink.total, size);
        assert!(sink.largest <= STREAM_BUFFER_SIZE);
    }

    #[test]
    fn test_write_replaces_content() {
        let fs = MemoryFs::new();
        fs.add_file("/app/config.ini", "old content that is longer");
        write(&fs, "/app/config.ini", b"new").unwrap();
        assert_eq!(fs.read_file("/app/config.ini").unwrap(), b"new");
    }

    #[test]
    fn test_create_dispatches_on_kind() {
        let fs = MemoryFs::new();
        create(&fs, "/srv", CreateKind::Dir).unwrap();
        create(&fs, "/srv/empty.txt", CreateKind::File).unwrap();
        assert!(fs.is_dir("/srv"));
        assert_eq!(fs.read_file("/srv/empty.txt").unwrap(), b"");

        assert!(create(&fs, "/srv", CreateKind::Dir).is_err());
        assert!(create(&fs, "/nope/a.txt", CreateKind::File).unwrap_err().is_not_found());
    }

    #[test]
    fn test_ensure_dir_tolerates_existing_directory() {
        let fs = MemoryFs::new();
        fs.add_dir("/srv");
        fs.add_file("/srv/file", "x");

        ensure_dir(&fs, "/srv").unwrap();
        assert!(ensure_dir(&fs, "/srv/file").is_err());
        assert_eq!(fs.mkdir_count("/srv"), 1);
    }

    #[test]
    fn test_open_missing_file() {
        let fs = MemoryFs::new();
        match open(&fs, "/missing") {
            Err(e) => assert!(e.is_not_found()),
            Ok(_) => panic!("opened a missing file"),
        }
        assert_eq!(fs.calls(), vec![FsCall::Open("/missing".to_string())]);
    }

    #[test]
    fn test_write_declared_rejects_oversized_content() {
        let fs = MemoryFs::new();
        fs.add_dir("/up");

        let mut exact: &[u8] = b"0123456789";
        assert_eq!(write_declared(&fs, "/up/exact", &mut exact, 10).unwrap(), 10);
        assert_eq!(fs.read_file("/up/exact").unwrap(), b"0123456789");

        let data = vec![7u8; 10_000];
        let mut long: &[u8] = &data;
        let err = write_declared(&fs, "/up/long", &mut long, 10).unwrap_err();
        assert!(matches!(
            err,
            HostFilesError::TooLarge { limit: SizeLimit::DeclaredSize, max: 10, .. }
        ));
        assert_eq!(err.code(), 413);
        assert!(!fs.exists("/up/long"));
    }

    #[test]
    fn test_download_filename() {
        assert_eq!(download_filename("/usr/local/test.java").unwrap(), "test.java");
        assert_eq!(download_filename("notes.txt").unwrap(), "notes.txt");
        assert!(download_filename("/usr/local/").is_err());
    }
}
