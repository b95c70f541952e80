//! Delimited-text export of an L1 ceilometer day-file.
//!
//! Layout
//! -----------------
//! ```text
//! # optical_module_id = TUB120011
//! # site_location = Payerne, Switzerland
//! # wigos_station_id = 0-20000-0-06610
//! # instrument_id = A
//! # instrument_serial_number = TUB120011
//! # range_resolution = 14.985
//! # range = 14.985;29.97;44.955
//! time,temp_int,sci,cbh_1,cbh_2,cbh_3,rcs_0,rcs_1,rcs_2
//! 1676332800,301.2,0,-1,,,182000.5,175000.1,170100.9
//! ```
//!
//! `time` is in unix seconds, `temp_int` in Kelvin, `cbh_*` in metres (negative: no cloud).
//! Empty cells are missing values. Additional `cbh_*` columns are accepted, `rcs_*` columns
//! must be in bin order.
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};

use camino::Utf8Path;
use thiserror::Error;

use super::{InstrumentMeta, RawDay, RawProfile};
use crate::overlap_errors::OverlapError;
use crate::time::{epoch_from_unix_rounded, unix_seconds};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseDayError {
    #[error("Missing attribute '{0}'")]
    MissingAttribute(String),
    #[error("Invalid value '{value}' for attribute '{key}'")]
    InvalidAttribute { key: String, value: String },
    #[error("Missing column '{0}'")]
    MissingColumn(String),
    #[error("Invalid value '{value}' in column '{column}' of data row {row}")]
    InvalidValue {
        row: usize,
        column: String,
        value: String,
    },
    #[error("Malformed table: {0}")]
    Table(String),
}

const TEXT_ATTRIBUTES: [&str; 5] = [
    "optical_module_id",
    "site_location",
    "wigos_station_id",
    "instrument_id",
    "instrument_serial_number",
];

fn attribute<'a>(
    attributes: &'a HashMap<String, String>,
    key: &str,
) -> Result<&'a str, ParseDayError> {
    attributes
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| ParseDayError::MissingAttribute(key.to_string()))
}

fn parse_number(value: &str, row: usize, column: &str) -> Result<Option<f64>, ParseDayError> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    value
        .parse::<f64>()
        .map(Some)
        .map_err(|_| ParseDayError::InvalidValue {
            row,
            column: column.to_string(),
            value: value.to_string(),
        })
}

/// Decode a day-file from a reader.
pub fn parse_day<R: Read>(reader: R) -> Result<RawDay, ParseDayError> {
    let mut attributes = HashMap::new();
    let mut table = String::new();
    for line in BufReader::new(reader).lines() {
        let line = line.map_err(|e| ParseDayError::Table(e.to_string()))?;
        match line.strip_prefix('#') {
            Some(attr) => {
                if let Some((key, value)) = attr.split_once('=') {
                    attributes.insert(key.trim().to_string(), value.trim().to_string());
                }
            }
            None if line.trim().is_empty() => continue,
            None => {
                table.push_str(&line);
                table.push('\n');
            }
        }
    }

    let meta = InstrumentMeta {
        optical_module_id: attribute(&attributes, TEXT_ATTRIBUTES[0])?.to_string(),
        site_location: attribute(&attributes, TEXT_ATTRIBUTES[1])?.to_string(),
        wigos_station_id: attribute(&attributes, TEXT_ATTRIBUTES[2])?.to_string(),
        instrument_id: attribute(&attributes, TEXT_ATTRIBUTES[3])?.to_string(),
        instrument_serial_number: attribute(&attributes, TEXT_ATTRIBUTES[4])?.to_string(),
    };

    let resolution_text = attribute(&attributes, "range_resolution")?;
    let range_resolution =
        resolution_text
            .parse::<f64>()
            .map_err(|_| ParseDayError::InvalidAttribute {
                key: "range_resolution".into(),
                value: resolution_text.to_string(),
            })?;

    let range = attribute(&attributes, "range")?
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>().map_err(|_| ParseDayError::InvalidAttribute {
                key: "range".into(),
                value: s.to_string(),
            })
        })
        .collect::<Result<Vec<f64>, ParseDayError>>()?;

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(table.as_bytes());
    let headers = rdr
        .headers()
        .map_err(|e| ParseDayError::Table(e.to_string()))?
        .clone();

    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ParseDayError::MissingColumn(name.to_string()))
    };
    let time_col = column("time")?;
    let temp_col = column("temp_int")?;
    let sci_col = headers.iter().position(|h| h == "sci");
    let cbh_cols: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| h.starts_with("cbh_"))
        .map(|(i, _)| i)
        .collect();
    let rcs_cols: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| h.starts_with("rcs_"))
        .map(|(i, _)| i)
        .collect();
    if rcs_cols.is_empty() {
        return Err(ParseDayError::MissingColumn("rcs_0".into()));
    }

    let mut profiles = Vec::new();
    for (row, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| ParseDayError::Table(e.to_string()))?;
        let cell = |i: usize| record.get(i).unwrap_or_default();

        let time = parse_number(cell(time_col), row, "time")?.ok_or_else(|| {
            ParseDayError::InvalidValue {
                row,
                column: "time".into(),
                value: String::new(),
            }
        })?;
        let sky_condition = match sci_col {
            Some(i) => parse_number(cell(i), row, "sci")?.map(|v| v as i32),
            None => None,
        };
        let cloud_base = cbh_cols
            .iter()
            .map(|&i| parse_number(cell(i), row, &headers[i]))
            .collect::<Result<Vec<_>, _>>()?;
        let signal = rcs_cols
            .iter()
            .map(|&i| parse_number(cell(i), row, &headers[i]))
            .collect::<Result<Vec<_>, _>>()?;

        profiles.push(RawProfile {
            time: epoch_from_unix_rounded(time),
            signal,
            internal_temperature: parse_number(cell(temp_col), row, "temp_int")?,
            sky_condition,
            cloud_base,
        });
    }

    Ok(RawDay {
        meta,
        range,
        range_resolution,
        profiles,
    })
}

/// Decode a day-file from disk.
pub fn read_day_file(path: &Utf8Path) -> Result<RawDay, OverlapError> {
    let file = std::fs::File::open(path)?;
    parse_day(file).map_err(|source| OverlapError::ReadDayFile {
        path: path.to_string(),
        source,
    })
}

fn fmt_cell(v: Option<f64>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

/// Encode a day in the same layout.
pub fn write_day<W: Write>(day: &RawDay, mut writer: W) -> Result<(), OverlapError> {
    let m = &day.meta;
    let values = [
        &m.optical_module_id,
        &m.site_location,
        &m.wigos_station_id,
        &m.instrument_id,
        &m.instrument_serial_number,
    ];
    for (key, value) in TEXT_ATTRIBUTES.iter().zip(values) {
        writeln!(writer, "# {key} = {value}")?;
    }
    writeln!(writer, "# range_resolution = {}", day.range_resolution)?;
    let range: Vec<String> = day.range.iter().map(|r| r.to_string()).collect();
    writeln!(writer, "# range = {}", range.join(";"))?;

    let n_layers = day
        .profiles
        .iter()
        .map(|p| p.cloud_base.len())
        .max()
        .unwrap_or(0)
        .max(1);

    let mut wtr = csv::Writer::from_writer(writer);
    let mut header = vec!["time".to_string(), "temp_int".into(), "sci".into()];
    header.extend((1..=n_layers).map(|i| format!("cbh_{i}")));
    header.extend((0..day.range.len()).map(|i| format!("rcs_{i}")));
    wtr.write_record(&header)?;

    for p in &day.profiles {
        let mut row = vec![
            unix_seconds(p.time).to_string(),
            fmt_cell(p.internal_temperature),
            p.sky_condition.map(|s| s.to_string()).unwrap_or_default(),
        ];
        row.extend((0..n_layers).map(|i| fmt_cell(p.cloud_base.get(i).copied().flatten())));
        row.extend(p.signal.iter().map(|v| fmt_cell(*v)));
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod l1_csv_reader_test {
    use super::*;

    const FILE: &str = "\
# optical_module_id = TUB120011
# site_location = Payerne, Switzerland
# wigos_station_id = 0-20000-0-06610
# instrument_id = A
# instrument_serial_number = TUB120011
# range_resolution = 15
# range = 15;30;45
time,temp_int,sci,cbh_1,cbh_2,rcs_0,rcs_1,rcs_2
1676332800,301.5,0,-1,,100.5,90,
1676332830,,2,850,1500,101,nan,80.25
";

    #[test]
    fn test_parse_day() {
        let day = parse_day(FILE.as_bytes()).unwrap();
        assert_eq!(day.meta.optical_module_id, "TUB120011");
        assert_eq!(day.meta.site_location, "Payerne, Switzerland");
        assert_eq!(day.range, vec![15.0, 30.0, 45.0]);
        assert_eq!(day.range_resolution, 15.0);
        assert_eq!(day.profiles.len(), 2);

        let p0 = &day.profiles[0];
        assert_eq!(unix_seconds(p0.time), 1_676_332_800.0);
        assert_eq!(p0.signal, vec![Some(100.5), Some(90.0), None]);
        assert_eq!(p0.internal_temperature, Some(301.5));
        assert_eq!(p0.sky_condition, Some(0));
        assert_eq!(p0.cloud_base, vec![Some(-1.0), None]);

        let p1 = &day.profiles[1];
        assert_eq!(p1.internal_temperature, None);
        assert_eq!(p1.signal[1], None);
        assert_eq!(p1.cloud_base, vec![Some(850.0), Some(1500.0)]);
    }

    #[test]
    fn test_write_then_parse_preserves_day() {
        let day = parse_day(FILE.as_bytes()).unwrap();
        let mut buffer = Vec::new();
        write_day(&day, &mut buffer).unwrap();
        assert_eq!(parse_day(buffer.as_slice()).unwrap(), day);
    }

    #[test]
    fn test_parse_errors() {
        let missing = FILE.replace("# instrument_id = A\n", "");
        assert_eq!(
            parse_day(missing.as_bytes()),
            Err(ParseDayError::MissingAttribute("instrument_id".into()))
        );

        let bad_value = FILE.replace("101,nan", "101,abc");
        assert!(matches!(
            parse_day(bad_value.as_bytes()),
            Err(ParseDayError::InvalidValue { row: 1, .. })
        ));

        let no_time = FILE.replace("time,temp_int", "stamp,temp_int");
        assert_eq!(
            parse_day(no_time.as_bytes()),
            Err(ParseDayError::MissingColumn("time".into()))
        );
    }
}
