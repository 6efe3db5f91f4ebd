//! Metric extraction from captured tool output.
//!
//! Both external tools report their numbers on fixed lines of a text stream.
//! The line offsets and the `:` delimiter are the whole contract, so they
//! are kept here and nowhere else.

use crate::error::ExtractionError;
use crate::invoker::RawRunOutput;

/// Line of callgrind's stderr carrying `==pid== Collected : <n>`.
pub const INSTRUCTION_COUNT_LINE: usize = 8;
/// Line of the program's profile output carrying the mean time per option.
pub const AVG_TIME_LINE: usize = 3;
/// Line of the program's profile output carrying the option throughput.
pub const OPS_PER_SECOND_LINE: usize = 5;
/// Metric value is whatever follows the last delimiter on its line.
pub const DELIMITER: char = ':';

/// Which output contract a capture follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Instrumentation-tool stderr; the instruction count is required.
    Measure,
    /// Program stdout; timing fields degrade to missing.
    Profile,
}

/// Typed metrics for one configuration point. `None` means missing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricRecord {
    pub instruction_count: Option<u64>,
    pub avg_time_per_op_ms: Option<f64>,
    pub ops_per_second: Option<f64>,
}

impl MetricRecord {
    /// Fill fields missing in `self` from `other`.
    pub fn merge(self, other: MetricRecord) -> MetricRecord {
        MetricRecord {
            instruction_count: self.instruction_count.or(other.instruction_count),
            avg_time_per_op_ms: self.avg_time_per_op_ms.or(other.avg_time_per_op_ms),
            ops_per_second: self.ops_per_second.or(other.ops_per_second),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.instruction_count.is_none()
            && self.avg_time_per_op_ms.is_none()
            && self.ops_per_second.is_none()
    }
}

/// Extract the metrics `kind` promises from a raw capture.
///
/// Measure reads stderr and fails when the instruction count is absent or
/// unparsable. Profile reads stdout and never fails.
pub fn extract(raw: &RawRunOutput, kind: MetricKind) -> Result<MetricRecord, ExtractionError> {
    match kind {
        MetricKind::Measure => {
            let count = field_at(&raw.stderr, INSTRUCTION_COUNT_LINE, "instruction_count")
                .and_then(|text| parse_count(text, &raw.stderr))?;
            Ok(MetricRecord {
                instruction_count: Some(count),
                ..MetricRecord::default()
            })
        }
        MetricKind::Profile => {
            let avg = field_at(&raw.stdout, AVG_TIME_LINE, "avg_time_per_op_ms")
                .and_then(|text| parse_float(text, "avg_time_per_op_ms", AVG_TIME_LINE, &raw.stdout));
            let ops = field_at(&raw.stdout, OPS_PER_SECOND_LINE, "ops_per_second")
                .and_then(|text| parse_float(text, "ops_per_second", OPS_PER_SECOND_LINE, &raw.stdout));

            if let Err(e) = &avg {
                tracing::debug!(metric = e.metric, reason = %e.reason, "profile metric missing");
            }
            if let Err(e) = &ops {
                tracing::debug!(metric = e.metric, reason = %e.reason, "profile metric missing");
            }

            Ok(MetricRecord {
                instruction_count: None,
                avg_time_per_op_ms: avg.ok(),
                ops_per_second: ops.ok(),
            })
        }
    }
}

/// Trimmed text after the last delimiter on line `index`.
fn field_at<'a>(
    output: &'a str,
    index: usize,
    metric: &'static str,
) -> Result<&'a str, ExtractionError> {
    let line = output.lines().nth(index).ok_or_else(|| ExtractionError {
        metric,
        line: index,
        reason: format!("output has only {} lines", output.lines().count()),
        output: output.to_string(),
    })?;

    // No delimiter means the whole line is the field, as a plain split would give.
    let field = line.rsplit(DELIMITER).next().unwrap_or(line);
    Ok(field.trim())
}

fn parse_count(text: &str, output: &str) -> Result<u64, ExtractionError> {
    let digits: String = text.chars().filter(|c| *c != ',').collect();
    digits.parse::<u64>().map_err(|e| ExtractionError {
        metric: "instruction_count",
        line: INSTRUCTION_COUNT_LINE,
        reason: format!("'{}' is not an integer ({})", text, e),
        output: output.to_string(),
    })
}

fn parse_float(
    text: &str,
    metric: &'static str,
    line: usize,
    output: &str,
) -> Result<f64, ExtractionError> {
    match text.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        Ok(v) => Err(ExtractionError {
            metric,
            line,
            reason: format!("non-finite value {}", v),
            output: output.to_string(),
        }),
        Err(e) => Err(ExtractionError {
            metric,
            line,
            reason: format!("'{}' is not a number ({})", text, e),
            output: output.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CALLGRIND_STDERR: &str = "==4242== Callgrind, a call-graph generating cache profiler
==4242== Copyright (C) 2002-2017, and GNU GPL'd, by Josef Weidendorfer et al.
==4242== Using Valgrind-3.13.0 and LibVEX; rerun with -h for copyright info
==4242== Command: ./FiniteDifferencePricing -profile -iter 100 -divs 2 -method single
==4242==
==4242== For interactive control, run 'callgrind_control -h'.
==4242==
==4242== Events    : Ir
==4242== Collected : 1234567890
==4242==
==4242== I   refs:      1,234,567,890
";

    const PROFILE_STDOUT: &str = "============== SINGLE THREADED ==============
--------- SMOOTH=1 - ACCEL=0 - 3 DIVIDENDS (out of 1000 iterations)  ---------

\t* Avg Time(ms) Per Option: 0.84200

\t* Opt/Sec: 1187.64846

----------------------------------------------------------
";

    fn raw(stdout: &str, stderr: &str) -> RawRunOutput {
        RawRunOutput {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            ..RawRunOutput::default()
        }
    }

    #[test]
    fn measure_reads_collected_line() {
        let record = extract(&raw("", CALLGRIND_STDERR), MetricKind::Measure).unwrap();
        assert_eq!(record.instruction_count, Some(1_234_567_890));
        assert_eq!(record.avg_time_per_op_ms, None);
        assert_eq!(record.ops_per_second, None);
    }

    #[test]
    fn measure_short_output_is_hard_failure() {
        let short = "a\nb\nc\nd\ne\n";
        let err = extract(&raw("", short), MetricKind::Measure).unwrap_err();
        assert_eq!(err.metric, "instruction_count");
        assert_eq!(err.line, INSTRUCTION_COUNT_LINE);
        assert!(err.reason.contains("5 lines"));
        assert!(err.to_string().contains("captured output"));
    }

    #[test]
    fn measure_garbage_is_hard_failure() {
        let mut lines: Vec<&str> = CALLGRIND_STDERR.lines().collect();
        lines[INSTRUCTION_COUNT_LINE] = "==4242== Collected : lots";
        let err = extract(&raw("", &lines.join("\n")), MetricKind::Measure).unwrap_err();
        assert!(err.reason.contains("lots"));
    }

    #[test]
    fn profile_reads_time_and_throughput() {
        let record = extract(&raw(PROFILE_STDOUT, ""), MetricKind::Profile).unwrap();
        assert_eq!(record.instruction_count, None);
        assert_eq!(record.avg_time_per_op_ms, Some(0.842));
        assert_eq!(record.ops_per_second, Some(1187.64846));
    }

    #[test]
    fn profile_short_output_degrades_to_missing() {
        let record = extract(&raw("banner\nheader\n\n\t* Avg Time(ms) Per Option: 2.5\n", ""), MetricKind::Profile)
            .unwrap();
        assert_eq!(record.avg_time_per_op_ms, Some(2.5));
        assert_eq!(record.ops_per_second, None);

        let empty = extract(&raw("", ""), MetricKind::Profile).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn merge_prefers_existing_fields() {
        let measure = MetricRecord {
            instruction_count: Some(10),
            ..MetricRecord::default()
        };
        let profile = MetricRecord {
            instruction_count: Some(99),
            avg_time_per_op_ms: Some(1.0),
            ops_per_second: Some(1000.0),
        };
        let merged = measure.merge(profile);
        assert_eq!(merged.instruction_count, Some(10));
        assert_eq!(merged.avg_time_per_op_ms, Some(1.0));
        assert_eq!(merged.ops_per_second, Some(1000.0));
    }
}
