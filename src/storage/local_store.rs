use polars::prelude::*;
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use tracing::info;

use crate::error::{PipelineError, Result};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Output encodings for a table file, picked from its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Parquet,
}

impl TableFormat {
    pub fn from_path(path: &str) -> Self {
        match Path::new(path).extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("parquet") => TableFormat::Parquet,
            _ => TableFormat::Csv,
        }
    }
}

/// Reads and writes pipeline tables on the local filesystem
pub struct LocalStorage;

impl LocalStorage {
    /// Read a UTF-8 CSV with header. A leading BOM is dropped and every
    /// column is read as text so callers decide how to parse it.
    pub fn read_csv(path: &str) -> Result<DataFrame> {
        let bytes = std::fs::read(path).map_err(|e| PipelineError::io(path, e))?;
        let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes).to_vec();

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .into_reader_with_file_handle(Cursor::new(body))
            .finish()?;

        info!("Loaded {} rows x {} columns from {}", df.height(), df.width(), path);
        Ok(df)
    }

    /// Write a UTF-8 CSV with BOM, creating parent directories
    pub fn write_csv(df: &mut DataFrame, path: &str) -> Result<()> {
        let mut file = Self::create(path)?;
        CsvWriter::new(&mut file)
            .include_bom(true)
            .include_header(true)
            .finish(df)?;
        info!("Wrote {} rows to {}", df.height(), path);
        Ok(())
    }

    pub fn write_parquet(df: &mut DataFrame, path: &str) -> Result<()> {
        let file = Self::create(path)?;
        ParquetWriter::new(file).finish(df)?;
        info!("Wrote {} rows to {}", df.height(), path);
        Ok(())
    }

    /// CSV or Parquet depending on the extension
    pub fn write_table(df: &mut DataFrame, path: &str) -> Result<()> {
        match TableFormat::from_path(path) {
            TableFormat::Csv => Self::write_csv(df, path),
            TableFormat::Parquet => Self::write_parquet(df, path),
        }
    }

    fn create(path: &str) -> Result<File> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(path, e))?;
            }
        }
        File::create(path).map_err(|e| PipelineError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(TableFormat::from_path("data/out.parquet"), TableFormat::Parquet);
        assert_eq!(TableFormat::from_path("data/out.PARQUET"), TableFormat::Parquet);
        assert_eq!(TableFormat::from_path("data/out.csv"), TableFormat::Csv);
        assert_eq!(TableFormat::from_path("data/out"), TableFormat::Csv);
    }

    #[test]
    fn test_csv_written_with_bom_reads_back_as_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("table.csv");
        let path = path.to_str().unwrap();

        let mut df = df!(
            "address" => &["東京都渋谷区", "東京都新宿区"],
            "rent" => &[15.0, 8.0]
        )
        .unwrap();
        LocalStorage::write_csv(&mut df, path).unwrap();

        let bytes = std::fs::read(path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));

        let loaded = LocalStorage::read_csv(path).unwrap();
        assert_eq!(loaded.height(), 2);
        let address = loaded.column("address").unwrap();
        assert_eq!(address.str().unwrap().get(0), Some("東京都渋谷区"));
        assert_eq!(loaded.column("rent").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn test_parquet_extension_writes_parquet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("table.parquet");
        let path = path.to_str().unwrap();

        let mut df = df!(
            "address" => &["東京都渋谷区", "東京都新宿区"],
            "rent" => &[15.0, 8.0]
        )
        .unwrap();
        LocalStorage::write_table(&mut df, path).unwrap();

        let bytes = std::fs::read(path).unwrap();
        assert!(bytes.starts_with(b"PAR1"));

        let loaded = ParquetReader::new(File::open(path).unwrap()).finish().unwrap();
        assert_eq!(loaded.height(), 2);
        let rent = loaded.column("rent").unwrap();
        assert_eq!(rent.dtype(), &DataType::Float64);
        assert_eq!(rent.f64().unwrap().get(1), Some(8.0));
        let address = loaded.column("address").unwrap();
        assert_eq!(address.str().unwrap().get(0), Some("東京都渋谷区"));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = LocalStorage::read_csv("does/not/exist.csv").unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
        assert!(err.to_string().contains("does/not/exist.csv"));
    }
}
