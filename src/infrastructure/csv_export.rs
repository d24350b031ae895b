//! CSV export of emitted variants

use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::domain::VariantRecord;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("failed to create {path}: {source}")]
    Create {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to flush CSV: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Serialize)]
struct CsvRow<'a> {
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "Link")]
    link: &'a str,
    #[serde(rename = "Set")]
    set: &'a str,
    #[serde(rename = "Card Number")]
    number: &'a str,
    #[serde(rename = "Surface")]
    surface: &'a str,
    #[serde(rename = "Price")]
    price: f64,
    #[serde(rename = "Image")]
    image: &'a str,
    #[serde(rename = "Stock")]
    stock: i64,
}

impl<'a> From<&'a VariantRecord> for CsvRow<'a> {
    fn from(record: &'a VariantRecord) -> Self {
        Self {
            name: &record.name,
            link: &record.link,
            set: &record.set,
            number: &record.number,
            surface: &record.surface,
            price: record.price,
            image: &record.image,
            stock: record.stock_quantity,
        }
    }
}

const HEADER: [&str; 8] = [
    "Name",
    "Link",
    "Set",
    "Card Number",
    "Surface",
    "Price",
    "Image",
    "Stock",
];

/// Write `records` with a header row; returns the number of rows written.
pub fn write_records<W: Write>(writer: W, records: &[VariantRecord]) -> Result<usize, ExportError> {
    let mut csv = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    // written explicitly so an empty export still has a header
    csv.write_record(HEADER)?;
    for record in records {
        csv.serialize(CsvRow::from(record))?;
    }
    csv.flush()?;
    Ok(records.len())
}

/// Write `records` to `path`, replacing any existing file.
pub fn export_to_file(path: &Path, records: &[VariantRecord]) -> Result<usize, ExportError> {
    let file = File::create(path).map_err(|source| ExportError::Create {
        path: path.display().to_string(),
        source,
    })?;
    let written = write_records(file, records)?;
    info!("💾 Wrote {} rows to {}", written, path.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> VariantRecord {
        VariantRecord {
            name: "Lightning Bolt".to_string(),
            link: "https://shop.test/p-lightning-bolt-m10-1".to_string(),
            set: "Magic 2010".to_string(),
            number: "146".to_string(),
            surface: "Non-foil".to_string(),
            price: 12.5,
            image: "https://cdn.shop.test/1001.jpg".to_string(),
            stock_quantity: 7,
        }
    }

    #[test]
    fn writes_header_and_rows() {
        let mut buffer = Vec::new();
        let written = write_records(&mut buffer, &[record()]).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert_eq!(written, 1);
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("Name,Link,Set,Card Number,Surface,Price,Image,Stock"));
        assert_eq!(
            lines.next(),
            Some("Lightning Bolt,https://shop.test/p-lightning-bolt-m10-1,Magic 2010,146,Non-foil,12.5,https://cdn.shop.test/1001.jpg,7")
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn fields_with_commas_are_quoted() {
        let mut row = record();
        row.name = "Borrowing 100,000 Arrows".to_string();
        let mut buffer = Vec::new();
        write_records(&mut buffer, &[row]).unwrap();

        assert!(String::from_utf8(buffer).unwrap().contains("\"Borrowing 100,000 Arrows\""));
    }

    #[test]
    fn empty_export_still_has_a_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stock.csv");

        assert_eq!(export_to_file(&path, &[]).unwrap(), 0);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Name,Link,Set,Card Number,Surface,Price,Image,Stock\n"
        );
    }
}
