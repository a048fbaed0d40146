//! Booking table reader (CSV or TSV).
use std::path::Path;

use anyhow::{Context, Result};

use crate::data_handling::{Dataset, FeatureSchema};

fn delimiter_for(path: &Path) -> u8 {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
        _ => b',',
    }
}

/// Read a booking table and validate it against `schema`.
///
/// Every header must be declared in the schema and every schema column must be
/// present. Values are parsed according to the column's declared role.
pub fn read_bookings<P: AsRef<Path>>(path: P, schema: &FeatureSchema) -> Result<Dataset> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter_for(path))
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("Failed to open booking file: {}", path.display()))?;

    let headers: Vec<String> = reader
        .headers()
        .context("Failed to read booking header row")?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;
        rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }

    let dataset = Dataset::from_table(schema.clone(), &headers, rows)
        .with_context(|| format!("Invalid booking data in {}", path.display()))?;
    log::info!("Loaded {} bookings from {}", dataset.len(), path.display());
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_default_schema_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bookings.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            "num_passengers,sales_channel,trip_type,purchase_lead,length_of_stay,flight_hour,flight_day,route,booking_origin,wants_extra_baggage,wants_preferred_seat,wants_in_flight_meals,flight_duration,booking_complete,departure,arrival"
        )
        .unwrap();
        writeln!(f, "2,Internet,RoundTrip,262,19,7,Sat,AKLDEL,New Zealand,1,0,0,5.52,0,AKL,DEL").unwrap();
        writeln!(f, "1,Mobile,OneWay,112,20,3,Sat,AKLDEL,New Zealand,0,0,1,5.52,1,AKL,DEL").unwrap();
        drop(f);

        let ds = read_bookings(&path, &FeatureSchema::default()).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.records[0].continuous[0], 2.0);
        // flags are baggage, meals, seat regardless of column order
        assert_eq!(ds.records[1].flags.key(), "010");
        assert_eq!(ds.records[0].flags.key(), "100");
    }

    #[test]
    fn rejects_unexpected_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bookings.tsv");
        std::fs::write(&path, "a\tb\n1\t2\n").unwrap();
        let err = read_bookings(&path, &FeatureSchema::default()).unwrap_err();
        assert!(format!("{:#}", err).contains("unexpected column"));
    }
}
