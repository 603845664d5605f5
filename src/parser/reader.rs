//! Tab-delimited source file reading (Windows-1252 encoded)

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use encoding_rs::WINDOWS_1252;

use crate::error::{ImportError, ImportResult};

/// A decoded source file: header row plus a one-pass stream of data rows
pub struct DelimitedFile {
    path: PathBuf,
    header: Vec<String>,
    data_lines: u64,
    reader: csv::Reader<Cursor<Vec<u8>>>,
}

impl DelimitedFile {
    pub fn open(path: &Path) -> ImportResult<Self> {
        if !path.exists() {
            return Err(ImportError::SourceMissing {
                path: path.to_path_buf(),
            });
        }

        let bytes = fs::read(path).map_err(|e| ImportError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::from_bytes(path, &bytes)
    }

    /// Decode raw Windows-1252 bytes and read the header row
    pub fn from_bytes(path: &Path, bytes: &[u8]) -> ImportResult<Self> {
        let (text, _, had_errors) = WINDOWS_1252.decode(bytes);
        if had_errors {
            tracing::warn!(path = %path.display(), "source contains undecodable bytes");
        }

        let text = text.into_owned();
        let data_lines = text.lines().filter(|l| !l.trim().is_empty()).count().saturating_sub(1) as u64;

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .from_reader(Cursor::new(text.into_bytes()));

        let mut first = csv::StringRecord::new();
        let has_header = reader.read_record(&mut first).map_err(|e| ImportError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        if !has_header {
            return Err(ImportError::EmptySource {
                path: path.to_path_buf(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            header: first.iter().map(str::to_string).collect(),
            data_lines,
            reader,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Approximate number of data rows, for progress reporting
    pub fn data_lines(&self) -> u64 {
        self.data_lines
    }

    /// Consume the file, yielding raw data rows in file order
    pub fn into_rows(self) -> impl Iterator<Item = ImportResult<Vec<String>>> {
        let path = self.path;
        self.reader.into_records().map(move |record| {
            record
                .map(|r| r.iter().map(str::to_string).collect())
                .map_err(|e| ImportError::Parse {
                    path: path.clone(),
                    source: e,
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latin1(s: &str) -> Vec<u8> {
        let (bytes, _, _) = WINDOWS_1252.encode(s);
        bytes.into_owned()
    }

    #[test]
    fn test_header_and_rows() {
        let bytes = latin1("TG-Code\tMarke\tTüren\nA1\tAUDI\t4\nB2\tBMW\n");
        let file = DelimitedFile::from_bytes(Path::new("t.txt"), &bytes).unwrap();
        assert_eq!(file.header(), &["TG-Code", "Marke", "Türen"]);
        assert_eq!(file.data_lines(), 2);

        let rows: Vec<_> = file.into_rows().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows, vec![vec!["A1", "AUDI", "4"], vec!["B2", "BMW"]]);
    }

    #[test]
    fn test_latin1_bytes_decoded() {
        // 0xE4 = 'ä', 0xDF = 'ß' in Windows-1252
        let bytes = b"TG-Code\tStra\xDFe\nA1\tK\xE4se\n".to_vec();
        let file = DelimitedFile::from_bytes(Path::new("t.txt"), &bytes).unwrap();
        assert_eq!(file.header()[1], "Straße");
        let rows: Vec<_> = file.into_rows().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows[0][1], "Käse");
    }

    #[test]
    fn test_blank_lines_ignored() {
        let bytes = latin1("TG-Code\tMarke\n\nA1\tAUDI\n\n");
        let file = DelimitedFile::from_bytes(Path::new("t.txt"), &bytes).unwrap();
        let rows: Vec<_> = file.into_rows().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_empty_file() {
        let result = DelimitedFile::from_bytes(Path::new("t.txt"), b"");
        assert!(matches!(result, Err(ImportError::EmptySource { .. })));
    }

    #[test]
    fn test_missing_file() {
        let result = DelimitedFile::open(Path::new("/nonexistent/definitely/missing.txt"));
        assert!(matches!(result, Err(ImportError::SourceMissing { .. })));
    }
}
