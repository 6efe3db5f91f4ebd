//! Persisting result tables and rendering comparison reports.
//!
//! This module provides:
//! - [`save`] / [`load`]: the CSV artifact, one header row and one row per point
//! - [`to_markdown`]: per-variant series against dividend count
//! - [`comparison_table`]: all variants side by side at one grid point

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::PersistenceError;
use crate::table::{AxisFilter, ResultRow, ResultTable};
use crate::types::{Quadrant, ThreadingMode, VariantId};

/// Column names of the persisted artifact, in order.
pub const COLUMNS: [&str; 9] = [
    "variant",
    "instruction_count",
    "avg_time_per_op_ms",
    "ops_per_second",
    "dividends",
    "smoothing",
    "acceleration",
    "threading",
    "sweep_tag",
];

/// Conventional artifact file name for a threading mode.
pub fn default_file_name(threading: ThreadingMode) -> String {
    format!("summary{}.csv", threading.file_label())
}

/// Write `table` to `path`, replacing any existing file.
pub fn save(table: &ResultTable, path: &Path) -> Result<(), PersistenceError> {
    let file = File::create(path).map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(BufWriter::new(file));

    let csv_err = |source| PersistenceError::Csv {
        path: path.to_path_buf(),
        source,
    };

    // Written explicitly so an empty table still gets its header.
    writer.write_record(COLUMNS).map_err(csv_err)?;
    for row in table {
        writer.serialize(row).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a table previously written by [`save`] or the checkpoint writer.
pub fn load(path: &Path) -> Result<ResultTable, PersistenceError> {
    let csv_err = |source| PersistenceError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::Reader::from_reader(file);

    let headers = reader.headers().map_err(csv_err)?;
    if headers.iter().ne(COLUMNS.iter().copied()) {
        return Err(PersistenceError::Header {
            path: path.to_path_buf(),
            found: headers.iter().map(str::to_string).collect(),
        });
    }

    reader
        .deserialize::<ResultRow>()
        .collect::<Result<ResultTable, _>>()
        .map_err(csv_err)
}

fn fmt_opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn fmt_float(value: Option<f64>, precision: usize) -> String {
    value
        .map(|v| format!("{:.*}", precision, v))
        .unwrap_or_else(|| "-".to_string())
}

/// Markdown report: for every variant, one table per quadrant with the
/// metrics against dividend count.
pub fn to_markdown(table: &ResultTable) -> String {
    let mut md = String::new();
    md.push_str("# Sweep Results\n\n");
    md.push_str(&format!("- **Rows**: {}\n", table.len()));
    md.push_str(&format!("- **Variants**: {}\n\n", table.variants().len()));

    for variant in table.variants() {
        md.push_str(&variant_section(table, &variant));
    }
    md
}

/// Series for one variant, one sub-table per quadrant present.
pub fn variant_section(table: &ResultTable, variant: &VariantId) -> String {
    let mut md = format!("## {}\n\n", variant);
    let rows = table.filter_axes(&AxisFilter {
        variant: Some(variant.clone()),
        ..AxisFilter::default()
    });

    for quadrant in Quadrant::ALL {
        let series = rows.filter_axes(&AxisFilter::quadrant(quadrant));
        if series.is_empty() {
            continue;
        }
        md.push_str(&format!("### {}\n\n", quadrant.title()));
        md.push_str("| Dividends | Threads | Instructions | Avg Time/Op (ms) | Ops/Sec |\n");
        md.push_str("|-----------|---------|--------------|------------------|---------|\n");
        for r in &series {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                r.dividends,
                r.threading,
                fmt_opt(r.instruction_count),
                fmt_float(r.avg_time_per_op_ms, 5),
                fmt_float(r.ops_per_second, 2),
            ));
        }
        md.push('\n');
    }
    md
}

/// All variants at one (dividends, smoothing, acceleration) point.
pub fn comparison_table(
    table: &ResultTable,
    dividends: u32,
    smoothing: bool,
    acceleration: bool,
) -> String {
    let points = table.filter_axes(&AxisFilter {
        dividends: Some(dividends),
        smoothing: Some(smoothing),
        acceleration: Some(acceleration),
        ..AxisFilter::default()
    });

    let mut md = format!(
        "## {} Dividends ({})\n\n",
        dividends,
        Quadrant::from_flags(smoothing, acceleration).title()
    );
    md.push_str("| Variant | Threads | Instructions | Ops/Sec |\n");
    md.push_str("|---------|---------|--------------|---------|\n");
    for r in &points {
        md.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            r.variant,
            r.threading,
            fmt_opt(r.instruction_count),
            fmt_float(r.ops_per_second, 2),
        ));
    }
    md
}

/// Write a markdown report next to the artifact.
pub fn write_report(table: &ResultTable, path: &Path) -> Result<(), PersistenceError> {
    let io_err = |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = BufWriter::new(File::create(path).map_err(io_err)?);
    file.write_all(to_markdown(table).as_bytes()).map_err(io_err)?;
    file.flush().map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::MetricRecord;
    use crate::types::ConfigurationPoint;
    use tempfile::TempDir;

    fn sample() -> ResultTable {
        let mut table = ResultTable::new();
        for (variant, divs, smoothing, acceleration, metrics) in [
            ("Release", 0, false, false, MetricRecord { instruction_count: Some(123_456_789), avg_time_per_op_ms: None, ops_per_second: None }),
            ("Release GCC-7.1", 0, false, false, MetricRecord { instruction_count: Some(98_765), avg_time_per_op_ms: Some(0.1 + 0.2), ops_per_second: Some(3333.333333333333) }),
            ("Polly, Clang-4.0", 8, true, true, MetricRecord { instruction_count: None, avg_time_per_op_ms: Some(1e-7), ops_per_second: None }),
        ] {
            let point = ConfigurationPoint {
                variant: VariantId::new(variant),
                dividends: divs,
                smoothing,
                acceleration,
                threading: ThreadingMode::Single,
            };
            table.push(ResultRow::new(&point, metrics));
        }
        table
    }

    #[test]
    fn save_then_load_reproduces_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("summarySingleThreaded.csv");
        let table = sample();

        save(&table, &path).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded, table);
    }

    #[test]
    fn saved_file_has_header_and_labels() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        save(&sample(), &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), COLUMNS.join(","));
        assert_eq!(
            lines.next().unwrap(),
            "Release,123456789,,,0,false,false,single,none"
        );
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn empty_table_round_trips_header_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.csv");
        save(&ResultTable::new(), &path).unwrap();
        assert!(load(&path).unwrap().is_empty());
    }

    #[test]
    fn load_rejects_foreign_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("foreign.csv");
        std::fs::write(&path, "Version,Instructions\nRelease,1\n").unwrap();
        assert!(matches!(load(&path), Err(PersistenceError::Header { .. })));
    }

    #[test]
    fn load_missing_file_is_persistence_error() {
        let dir = TempDir::new().unwrap();
        let err = load(&dir.path().join("nope.csv")).unwrap_err();
        assert!(matches!(err, PersistenceError::Io { .. }));
    }

    #[test]
    fn reports_mention_every_variant() {
        let table = sample();
        let md = to_markdown(&table);
        assert!(md.contains("## Release GCC-7.1"));
        assert!(md.contains("### No Improvements"));
        assert!(md.contains("### All"));

        let cmp = comparison_table(&table, 0, false, false);
        assert!(cmp.contains("| Release | single | 123456789 | - |"));
        assert!(!cmp.contains("Polly"));
    }

    #[test]
    fn default_file_name_follows_threading() {
        assert_eq!(default_file_name(ThreadingMode::Multi), "summaryMultiThreaded.csv");
    }
}
