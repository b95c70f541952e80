//! # Daily results
//!
//! Persistent form of the overlap samples found in one day, one file per (site, optical
//! module, day).
//!
//! Layout
//! -----------------
//! ```text
//! opt_mod_number = TUB120011
//! site_location = Payerne, Switzerland
//! wigos_station_id = 0-20000-0-06610
//! instrument_id = A
//! instrument_serial_number = CHM120106
//! start,end,rng_lower,rng_upper,internal_temperature,range_resolution,score,15,30,45
//! 2023-02-14T00:00:00,2023-02-14T00:30:00,510,810,300.15,15,0.0012,0.0007,0.0028,0.0063
//! ```
//!
//! One row per sample; the columns after `score` hold the corrected overlap function, one per
//! range bin, headed by the range in metres. Timestamps are UTC.
//!
//! The file is named `ov_results_<location>_<optical module>_<YYYY-MM-DD>.csv` and stored in
//! `<output>/<location>/`. Its content only depends on the samples, so processing the same
//! day twice gives byte-identical files.
use std::io::{Read, Write};
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use hifitime::Epoch;
use regex::Regex;

use crate::constants::{Kelvin, Meter, DAILY_RESULT_PREFIX};
use crate::overlap_errors::OverlapError;
use crate::profiles::InstrumentMeta;
use crate::sample_sorter::OverlapSample;
use crate::time::{format_iso, parse_iso, CalendarDate};

const FIXED_COLUMNS: [&str; 7] = [
    "start",
    "end",
    "rng_lower",
    "rng_upper",
    "internal_temperature",
    "range_resolution",
    "score",
];

const META_KEYS: [&str; 5] = [
    "opt_mod_number",
    "site_location",
    "wigos_station_id",
    "instrument_id",
    "instrument_serial_number",
];

/// One row of a daily result.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySample {
    pub start: Epoch,
    pub end: Epoch,
    pub rng_lower: Meter,
    pub rng_upper: Meter,
    pub internal_temperature: Kelvin,
    pub score: f64,
    /// Corrected overlap function, one value per range bin
    pub overlap: Vec<f64>,
}

impl From<&OverlapSample> for DailySample {
    fn from(sample: &OverlapSample) -> Self {
        DailySample {
            start: sample.start,
            end: sample.end,
            rng_lower: sample.rng_lower,
            rng_upper: sample.rng_upper,
            internal_temperature: sample.temperature,
            score: sample.score,
            overlap: sample.corrected_overlap.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyResult {
    pub date: CalendarDate,
    pub meta: InstrumentMeta,
    pub range: Vec<Meter>,
    pub range_resolution: Meter,
    pub samples: Vec<DailySample>,
}

/// Fields encoded in a daily result file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyFileName {
    pub location: String,
    pub optical_module_id: String,
    pub date: CalendarDate,
}

static FILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ov_results_(?P<location>.+)_(?P<module>[^_]+)_(?P<date>\d{4}-\d{2}-\d{2})\.csv$")
        .expect("valid file name pattern")
});

impl DailyFileName {
    /// Parse a daily result file name; `None` for any other file.
    ///
    /// The optical module id is the last `_`-separated field before the date, so the
    /// location may itself contain underscores.
    pub fn parse(name: &str) -> Option<Self> {
        let caps = FILE_NAME.captures(name)?;
        Some(DailyFileName {
            location: caps["location"].to_string(),
            optical_module_id: caps["module"].to_string(),
            date: caps["date"].parse().ok()?,
        })
    }

    /// Name of the result of `meta`'s instrument on `date`.
    ///
    /// Underscores of the optical module id become `-` so the name parses back.
    pub fn for_day(meta: &InstrumentMeta, date: CalendarDate) -> Self {
        DailyFileName {
            location: meta.location(),
            optical_module_id: meta.optical_module_id.replace('_', "-"),
            date,
        }
    }

    /// `<output>/<location>/<file name>`
    pub fn path_in(&self, output: &Utf8Path) -> Utf8PathBuf {
        output.join(&self.location).join(self.file_name())
    }

    pub fn file_name(&self) -> String {
        format!(
            "{DAILY_RESULT_PREFIX}_{}_{}_{}.csv",
            self.location, self.optical_module_id, self.date
        )
    }
}

impl DailyResult {
    pub fn new(
        date: CalendarDate,
        meta: InstrumentMeta,
        range: Vec<Meter>,
        range_resolution: Meter,
        samples: &[OverlapSample],
    ) -> Self {
        DailyResult {
            date,
            meta,
            range,
            range_resolution,
            samples: samples.iter().map(DailySample::from).collect(),
        }
    }

    pub fn name(&self) -> DailyFileName {
        DailyFileName::for_day(&self.meta, self.date)
    }

    /// `<output>/<location>/ov_results_<location>_<optical module>_<date>.csv`
    pub fn path_in(&self, output: &Utf8Path) -> Utf8PathBuf {
        self.name().path_in(output)
    }

    /// Encode the result.
    pub fn write<W: Write>(&self, mut writer: W) -> Result<(), OverlapError> {
        let m = &self.meta;
        let values = [
            &m.optical_module_id,
            &m.site_location,
            &m.wigos_station_id,
            &m.instrument_id,
            &m.instrument_serial_number,
        ];
        for (key, value) in META_KEYS.iter().zip(values) {
            writeln!(writer, "{key} = {value}")?;
        }

        let mut wtr = csv::Writer::from_writer(writer);
        let header: Vec<String> = FIXED_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(self.range.iter().map(|r| r.to_string()))
            .collect();
        wtr.write_record(&header)?;

        for s in &self.samples {
            let row: Vec<String> = [
                format_iso(s.start),
                format_iso(s.end),
                s.rng_lower.to_string(),
                s.rng_upper.to_string(),
                s.internal_temperature.to_string(),
                self.range_resolution.to_string(),
                s.score.to_string(),
            ]
            .into_iter()
            .chain(s.overlap.iter().map(|v| v.to_string()))
            .collect();
            wtr.write_record(&row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Write the result under `output`, creating the location directory.
    ///
    /// Return
    /// ----------
    /// * The path of the written file.
    pub fn write_to_dir(&self, output: &Utf8Path) -> Result<Utf8PathBuf, OverlapError> {
        let path = self.path_in(output);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(&path)?;
        self.write(std::io::BufWriter::new(file))?;
        Ok(path)
    }

    /// Decode a result written by [`DailyResult::write`].
    ///
    /// Arguments
    /// -----------------
    /// * `reader`: the encoded result.
    /// * `date`: the day it belongs to (taken from the file name).
    ///
    /// Return
    /// ----------
    /// * `Err(OverlapError::FormatMismatch)` for missing metadata, a wrong header or a row
    ///   whose length or values do not match it.
    pub fn from_reader<R: Read>(mut reader: R, date: CalendarDate) -> Result<Self, OverlapError> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        let mismatch = |msg: String| OverlapError::FormatMismatch(msg);

        let mut lines = text.splitn(META_KEYS.len() + 1, '\n');
        let mut values = Vec::with_capacity(META_KEYS.len());
        for key in META_KEYS {
            let line = lines
                .next()
                .ok_or_else(|| mismatch(format!("missing metadata line '{key}'")))?;
            let (k, v) = line
                .split_once('=')
                .ok_or_else(|| mismatch(format!("malformed metadata line '{line}'")))?;
            if k.trim() != key {
                return Err(mismatch(format!("expected metadata '{key}', found '{}'", k.trim())));
            }
            values.push(v.trim().trim_end_matches('\r').to_string());
        }
        let [optical_module_id, site_location, wigos_station_id, instrument_id, instrument_serial_number]: [String; 5] =
            values
                .try_into()
                .map_err(|_| mismatch("incomplete metadata".into()))?;
        let meta = InstrumentMeta {
            optical_module_id,
            site_location,
            wigos_station_id,
            instrument_id,
            instrument_serial_number,
        };

        let table = lines.next().unwrap_or_default();
        let mut rdr = csv::Reader::from_reader(table.as_bytes());
        let headers = rdr.headers()?.clone();
        if headers.len() < FIXED_COLUMNS.len()
            || headers.iter().zip(FIXED_COLUMNS).any(|(h, c)| h != c)
        {
            return Err(mismatch(format!(
                "daily result header must start with {}",
                FIXED_COLUMNS.join(",")
            )));
        }

        let number = |value: &str, column: &str| -> Result<f64, OverlapError> {
            value
                .trim()
                .parse::<f64>()
                .map_err(|_| mismatch(format!("invalid value '{value}' in column '{column}'")))
        };

        let range = headers
            .iter()
            .skip(FIXED_COLUMNS.len())
            .map(|h| number(h, "header"))
            .collect::<Result<Vec<f64>, _>>()?;

        let mut range_resolution = None;
        let mut samples = Vec::new();
        for record in rdr.records() {
            let record = record?;
            if record.len() != headers.len() {
                return Err(mismatch(format!(
                    "row of {} fields for {} columns",
                    record.len(),
                    headers.len()
                )));
            }
            range_resolution.get_or_insert(number(&record[5], "range_resolution")?);
            samples.push(DailySample {
                start: parse_iso(&record[0])?,
                end: parse_iso(&record[1])?,
                rng_lower: number(&record[2], "rng_lower")?,
                rng_upper: number(&record[3], "rng_upper")?,
                internal_temperature: number(&record[4], "internal_temperature")?,
                score: number(&record[6], "score")?,
                overlap: record
                    .iter()
                    .skip(FIXED_COLUMNS.len())
                    .map(|v| number(v, "overlap"))
                    .collect::<Result<Vec<f64>, _>>()?,
            });
        }

        Ok(DailyResult {
            date,
            meta,
            range_resolution: range_resolution.unwrap_or(f64::NAN),
            range,
            samples,
        })
    }

    /// Read a daily result file; the date comes from its name.
    pub fn read_file(path: &Utf8Path) -> Result<Self, OverlapError> {
        let name = path
            .file_name()
            .and_then(DailyFileName::parse)
            .ok_or_else(|| {
                OverlapError::FormatMismatch(format!("{path} is not a daily result file name"))
            })?;
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, name.date)
    }
}

#[cfg(test)]
mod daily_result_test {
    use super::*;
    use crate::profiles::test_support::range_axis;

    fn result() -> DailyResult {
        let date = CalendarDate::new(2023, 2, 14).unwrap();
        let range: Vec<f64> = range_axis()[..4].to_vec();
        DailyResult {
            date,
            meta: InstrumentMeta {
                optical_module_id: "TUB120011".into(),
                site_location: "Payerne, Switzerland".into(),
                wigos_station_id: "0-20000-0-06610".into(),
                instrument_id: "A".into(),
                instrument_serial_number: "CHM120106".into(),
            },
            range,
            range_resolution: 15.0,
            samples: vec![DailySample {
                start: date.midnight(),
                end: date.midnight() + hifitime::Unit::Minute * 30,
                rng_lower: 510.0,
                rng_upper: 810.0,
                internal_temperature: 300.15,
                score: 0.0012,
                overlap: vec![0.0007, 0.0028, 0.0063, 0.0112],
            }],
        }
    }

    #[test]
    fn test_layout() {
        let mut buffer = Vec::new();
        result().write(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "opt_mod_number = TUB120011");
        assert_eq!(lines[1], "site_location = Payerne, Switzerland");
        assert_eq!(
            lines[5],
            "start,end,rng_lower,rng_upper,internal_temperature,range_resolution,score,15,30,45,60"
        );
        assert_eq!(
            lines[6],
            "2023-02-14T00:00:00,2023-02-14T00:30:00,510,810,300.15,15,0.0012,0.0007,0.0028,0.0063,0.0112"
        );
    }

    #[test]
    fn test_read_back() {
        let original = result();
        let mut buffer = Vec::new();
        original.write(&mut buffer).unwrap();
        let decoded = DailyResult::from_reader(buffer.as_slice(), original.date).unwrap();
        assert_eq!(decoded.meta, original.meta);
        assert_eq!(decoded.range, original.range);
        assert_eq!(decoded.range_resolution, 15.0);
        assert_eq!(decoded.samples[0].overlap, original.samples[0].overlap);
        assert_eq!(
            format_iso(decoded.samples[0].end),
            "2023-02-14T00:30:00".to_string()
        );
    }

    #[test]
    fn test_file_name() {
        let r = result();
        assert_eq!(
            r.path_in(Utf8Path::new("out")),
            Utf8PathBuf::from("out/Payerne/ov_results_Payerne_TUB120011_2023-02-14.csv")
        );
        let parsed = DailyFileName::parse("ov_results_De_Bilt_TUB140005_2021-07-01.csv").unwrap();
        assert_eq!(parsed.location, "De_Bilt");
        assert_eq!(parsed.optical_module_id, "TUB140005");
        assert_eq!(parsed.date, CalendarDate::new(2021, 7, 1).unwrap());
        assert_eq!(parsed.file_name(), "ov_results_De_Bilt_TUB140005_2021-07-01.csv");

        assert!(DailyFileName::parse("ov_results_Payerne_TUB120011_2023-02-14.txt").is_none());

        let meta = InstrumentMeta {
            optical_module_id: "TUB_120011".into(),
            site_location: "De Bilt".into(),
            ..Default::default()
        };
        let name = DailyFileName::for_day(&meta, r.date);
        let parsed = DailyFileName::parse(&name.file_name()).unwrap();
        assert_eq!(parsed, name);
        assert_eq!(parsed.optical_module_id, "TUB-120011");
        assert_eq!(parsed.location, "De_Bilt");
        assert!(DailyFileName::parse("L1_0-20000-0-06610_A20230214.csv").is_none());
        assert!(DailyFileName::parse("ov_results_Payerne_TUB120011_2023-02-30.csv").is_none());
    }

    #[test]
    fn test_wrong_header() {
        let text = "opt_mod_number = X\nsite_location = S\nwigos_station_id = W\ninstrument_id = A\ninstrument_serial_number = N\nstart,end,score\n";
        let date = CalendarDate::new(2023, 2, 14).unwrap();
        assert!(matches!(
            DailyResult::from_reader(text.as_bytes(), date),
            Err(OverlapError::FormatMismatch(_))
        ));
    }
}
