use std::path::Path;

use crate::models::DocumentRow;
use crate::pipeline::import::write_atomically;
use crate::pipeline::IngestError;

/// Column order of the persisted table.
pub const HEADERS: [&str; 7] = [
    "document_date",
    "sender",
    "recipient",
    "document_number",
    "total_weight",
    "inserted_on",
    "provenance",
];

/// Parse every row. A missing file is an empty table.
pub fn read_rows(path: &Path) -> Result<Vec<DocumentRow>, IngestError> {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut reader = csv::Reader::from_reader(file);
    let mut rows = Vec::new();
    for record in reader.deserialize::<DocumentRow>() {
        rows.push(record?);
    }
    Ok(rows)
}

/// Replace the table with `rows`, header included.
pub fn write_rows(path: &Path, rows: &[DocumentRow]) -> Result<(), IngestError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(HEADERS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| IngestError::Serialization(e.to_string()))?;

    write_atomically(path, &bytes).map_err(|e| {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            IngestError::StoreWriteConflict(format!(
                "{} is locked or read-only: {e}",
                path.display()
            ))
        } else {
            IngestError::Io(e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn row(number: &str, weight: &str) -> DocumentRow {
        DocumentRow {
            document_date: NaiveDate::from_ymd_opt(2024, 11, 27).unwrap(),
            sender: "Trasporti Rossi, S.r.l.".into(),
            recipient: "Magazzino Nord".into(),
            document_number: number.into(),
            total_weight: Decimal::from_str(weight).unwrap(),
            inserted_on: NaiveDate::from_ymd_opt(2024, 11, 28).unwrap(),
            provenance: None,
        }
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_rows(&dir.path().join("none.csv")).unwrap().is_empty());
    }

    #[test]
    fn rows_survive_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("documents.csv");
        let mut second = row("D2", "0.5");
        second.provenance = Some("sum-rows".into());
        write_rows(&path, &[row("D1", "1250.75"), second.clone()]).unwrap();

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows, vec![row("D1", "1250.75"), second]);
    }

    #[test]
    fn header_written_even_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("documents.csv");
        write_rows(&path, &[]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.trim(), HEADERS.join(","));
        assert!(read_rows(&path).unwrap().is_empty());
    }

    #[test]
    fn malformed_row_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("documents.csv");
        std::fs::write(
            &path,
            format!("{}\nnot-a-date,a,b,D1,1,2024-01-01,\n", HEADERS.join(",")),
        )
        .unwrap();
        assert!(matches!(read_rows(&path), Err(IngestError::Serialization(_))));
    }
}
