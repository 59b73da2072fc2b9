//! CSV writer/reader for the canonical models.
//!
//! Every file starts with a header row, even when no records follow, so an
//! empty fetch result still produces a well-formed file.

use std::io::{Read, Write};

use serde::{Serialize, de::DeserializeOwned};
use snafu::{Backtrace, ResultExt, Snafu};

/// Types that have a fixed CSV column layout.
pub trait CsvRecord {
    /// Column names in serialization order.
    const HEADER: &'static [&'static str];
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CsvError {
    /// An error occurred while writing records.
    #[snafu(display("Failed to write CSV: {source}"))]
    Write {
        source: ::csv::Error,
        backtrace: Backtrace,
    },

    /// A record could not be decoded into the target model.
    #[snafu(display("Failed to read CSV: {source}"))]
    Read {
        source: ::csv::Error,
        backtrace: Backtrace,
    },

    /// The header row does not match the model's columns.
    #[snafu(display("Unexpected CSV header: {found:?}"))]
    Header {
        found: Vec<String>,
        backtrace: Backtrace,
    },

    /// A generic I/O error.
    #[snafu(display("I/O error: {source}"))]
    Io {
        source: std::io::Error,
        backtrace: Backtrace,
    },
}

/// Writes `rows` as CSV (header first) and flushes the writer.
pub fn write_rows<W, T>(writer: W, rows: &[T]) -> Result<(), CsvError>
where
    W: Write,
    T: CsvRecord + Serialize,
{
    let mut w = ::csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    w.write_record(T::HEADER).context(WriteSnafu)?;
    for row in rows {
        w.serialize(row).context(WriteSnafu)?;
    }
    w.flush().context(IoSnafu)?;
    Ok(())
}

/// Reads all records, checking the header against `T::HEADER`.
pub fn read_rows<R, T>(reader: R) -> Result<Vec<T>, CsvError>
where
    R: Read,
    T: CsvRecord + DeserializeOwned,
{
    let mut r = ::csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    let header = r.headers().context(ReadSnafu)?;
    if !header.iter().eq(T::HEADER.iter().copied()) {
        return HeaderSnafu {
            found: header.iter().map(str::to_string).collect::<Vec<_>>(),
        }
        .fail();
    }
    r.deserialize()
        .collect::<Result<Vec<T>, _>>()
        .context(ReadSnafu)
}
