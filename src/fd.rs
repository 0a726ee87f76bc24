use flate2::{Compression, read::GzDecoder, write::GzEncoder};

use std::{
    fs::File,
    io::{BufRead, BufReader, Read, Write},
    path::Path,
};

/// Readable RINEX (or any text) content, possibly gzip compressed.
/// Compressed files must be terminated with ".gz".
pub enum FileDescriptor {
    Plain(File),
    Gzip(GzDecoder<File>),
}

impl Read for FileDescriptor {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Plain(r) => r.read(buf),
            Self::Gzip(r) => r.read(buf),
        }
    }
}

impl FileDescriptor {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let fd = File::open(path)?;

        if is_gzip(path) {
            Ok(Self::Gzip(GzDecoder::new(fd)))
        } else {
            Ok(Self::Plain(fd))
        }
    }

    /// Buffered line reader
    pub fn lines(path: &Path) -> std::io::Result<BufReader<Self>> {
        Ok(BufReader::new(Self::open(path)?))
    }
}

/// Writable descriptor
pub enum OutputDescriptor {
    Plain(File),
    Gzip(GzEncoder<File>),
}

impl Write for OutputDescriptor {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::Plain(w) => w.write(data),
            Self::Gzip(w) => w.write(data),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Plain(w) => w.flush(),
            Self::Gzip(w) => w.flush(),
        }
    }
}

impl OutputDescriptor {
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let fd = File::create(path)?;

        if is_gzip(path) {
            let compression = Compression::new(5);
            Ok(Self::Gzip(GzEncoder::new(fd, compression)))
        } else {
            Ok(Self::Plain(fd))
        }
    }

    /// Flushes and terminates the gzip stream, if any
    pub fn finish(self) -> std::io::Result<()> {
        match self {
            Self::Plain(mut w) => w.flush(),
            Self::Gzip(w) => {
                w.finish()?;
                Ok(())
            },
        }
    }
}

pub fn is_gzip(path: &Path) -> bool {
    path.extension().map(|ext| ext == "gz").unwrap_or(false)
}

/// Reads all lines, line terminations included, so content can be rewritten verbatim.
pub fn read_lines(path: &Path) -> std::io::Result<Vec<String>> {
    let mut reader = FileDescriptor::lines(path)?;
    let mut lines = Vec::with_capacity(1024);

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line)? {
            0 => break,
            _ => lines.push(line),
        }
    }

    Ok(lines)
}

/// Decompressing copy. The target is always plain.
pub fn copy_plain(source: &Path, target: &Path) -> std::io::Result<u64> {
    if is_gzip(source) {
        let mut reader = FileDescriptor::open(source)?;
        let mut writer = File::create(target)?;
        std::io::copy(&mut reader, &mut writer)
    } else {
        std::fs::copy(source, target)
    }
}
