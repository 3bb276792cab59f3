//! Sorted chunks stored on file system.

use std::ffi::OsString;
use std::fs;
use std::io::{self, prelude::*};
use std::path::{Path, PathBuf};

use crate::buffer::Chunk;
use crate::record::Line;
use crate::sort::SortError;

/// Derives a sibling path of `path` with `segment` inserted before the extension,
/// e.g. `data.txt` + `part-3` gives `data.part-3.txt`.
pub fn derived_path(path: &Path, segment: &str) -> PathBuf {
    let mut file_name = OsString::new();
    if let Some(stem) = path.file_stem() {
        file_name.push(stem);
    }
    file_name.push(".");
    file_name.push(segment);
    if let Some(extension) = path.extension() {
        file_name.push(".");
        file_name.push(extension);
    }

    path.with_file_name(file_name)
}

/// Path of the `number`-th temporary chunk file of `input`, placed in `dir` if given.
pub fn part_path(input: &Path, dir: Option<&Path>, number: usize) -> PathBuf {
    let path = derived_path(input, &format!("part-{}", number));
    match (dir, path.file_name()) {
        (Some(dir), Some(file_name)) => dir.join(file_name),
        _ => path,
    }
}

/// Writes chunk records to a new file, one record per line.
pub fn dump(path: &Path, chunk: &Chunk, buf_size: usize) -> Result<(), SortError> {
    let mut chunk_writer = io::BufWriter::with_capacity(buf_size, fs::File::create(path)?);
    for line in chunk.lines() {
        chunk_writer.write_all(line.as_bytes())?;
        chunk_writer.write_all(b"\n")?;
    }
    chunk_writer.flush()?;

    return Ok(());
}

/// Lazy line sequence over a chunk file.
///
/// Only the `\n` terminator written by [`dump`] is stripped, any `\r` before it belongs to the record.
pub struct ChunkFileReader {
    lines: io::Split<io::BufReader<fs::File>>,
}

impl ChunkFileReader {
    pub fn open(path: &Path, buf_size: usize) -> Result<Self, SortError> {
        let file = fs::File::open(path)?;
        return Ok(ChunkFileReader {
            lines: io::BufReader::with_capacity(buf_size, file).split(b'\n'),
        });
    }
}

impl Iterator for ChunkFileReader {
    type Item = Result<Line, SortError>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = match self.lines.next()? {
            Ok(bytes) => String::from_utf8(bytes).map_err(SortError::InvalidUtf8),
            Err(err) => Err(SortError::IO(err)),
        };

        Some(line.and_then(|line| Line::parse(line).map_err(SortError::MalformedRecord)))
    }
}

/// Temporary chunk files. Every registered file is removed when the set is dropped.
#[derive(Debug, Default)]
pub struct TempFiles {
    paths: Vec<PathBuf>,
}

impl TempFiles {
    pub fn new() -> Self {
        TempFiles::default()
    }

    /// Registers a completely written file.
    pub fn push(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl Drop for TempFiles {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            match fs::remove_file(&path) {
                Ok(()) => log::debug!("temporary file {} removed", path.display()),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => log::warn!("temporary file {} not removed: {}", path.display(), err),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::path::{Path, PathBuf};

    use rstest::*;

    use super::{derived_path, dump, part_path, ChunkFileReader, TempFiles};
    use crate::buffer::Chunk;
    use crate::sort::SortError;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[rstest]
    #[case("text.txt", "sorted", "text.sorted.txt")]
    #[case("/data/text.txt", "part-0", "/data/text.part-0.txt")]
    #[case("/data/archive.tar.gz", "part-12", "/data/archive.tar.part-12.gz")]
    #[case("/data/input", "sorted", "/data/input.sorted")]
    fn test_derived_path(#[case] path: &str, #[case] segment: &str, #[case] expected: &str) {
        assert_eq!(derived_path(Path::new(path), segment), PathBuf::from(expected));
    }

    #[test]
    fn test_part_path_in_tmp_dir() {
        let path = part_path(Path::new("/data/text.txt"), Some(Path::new("/scratch")), 7);
        assert_eq!(path, PathBuf::from("/scratch/text.part-7.txt"));
    }

    #[rstest]
    fn test_chunk_file(tmp_dir: tempfile::TempDir) {
        let mut chunk = Chunk::from_text("3. Banana\n10. Apple\n2. Apple\n".to_string()).unwrap();
        chunk.sort();

        let path = tmp_dir.path().join("chunk.part-0.txt");
        dump(&path, &chunk, 4).unwrap();

        let restored: Vec<String> = ChunkFileReader::open(&path, 4)
            .unwrap()
            .map(|line| line.unwrap().into_string())
            .collect();
        assert_eq!(restored, Vec::from_iter(chunk.lines()));
    }

    #[rstest]
    fn test_chunk_file_malformed_line(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("broken.txt");
        fs::write(&path, "1. fine\nbroken\n").unwrap();

        let mut reader = ChunkFileReader::open(&path, 16).unwrap();
        assert_eq!(reader.next().unwrap().unwrap().as_str(), "1. fine");
        assert!(matches!(reader.next(), Some(Err(SortError::MalformedRecord(_)))));
    }

    #[rstest]
    fn test_chunk_file_keeps_carriage_return(tmp_dir: tempfile::TempDir) {
        let mut chunk = Chunk::from_text("2. a\r\r\n1. a\t\n3. a\r \n".to_string()).unwrap();
        chunk.sort();
        assert_eq!(Vec::from_iter(chunk.lines()), vec!["1. a\t", "2. a\r", "3. a\r "]);

        let path = tmp_dir.path().join("chunk.part-0.txt");
        dump(&path, &chunk, 8).unwrap();

        let restored: Vec<String> = ChunkFileReader::open(&path, 8)
            .unwrap()
            .map(|line| line.unwrap().into_string())
            .collect();
        assert_eq!(restored, Vec::from_iter(chunk.lines()));
    }

    #[rstest]
    fn test_chunk_file_invalid_utf8(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("broken.txt");
        fs::write(&path, b"1. \xff\xfe\n").unwrap();

        let mut reader = ChunkFileReader::open(&path, 16).unwrap();
        assert!(matches!(reader.next(), Some(Err(SortError::InvalidUtf8(_)))));
    }

    #[rstest]
    fn test_temp_files_removed_on_drop(tmp_dir: tempfile::TempDir) {
        let paths: Vec<PathBuf> = (0..3).map(|n| tmp_dir.path().join(format!("t.part-{}.txt", n))).collect();

        let mut files = TempFiles::new();
        for path in &paths {
            fs::write(path, "1. a\n").unwrap();
            files.push(path.clone());
        }
        // already removed files are skipped silently
        fs::remove_file(&paths[1]).unwrap();
        assert_eq!(files.len(), 3);

        drop(files);
        assert!(paths.iter().all(|path| !path.exists()));
    }
}
