use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::compress::Compressed;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Validate,
    Extract,
    Encode,
    Compress,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::Extract => "extract",
            Stage::Encode => "encode",
            Stage::Compress => "compress",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub duration_ms: f32,
}

/// Accumulates per-request stage timings and payload sizes. Recording the
/// same stage twice keeps both entries.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    stages: Vec<StageTiming>,
    format: Option<String>,
    window: Option<(f64, f64)>,
    count: usize,
    uncompressed_len: usize,
    compression: Option<(usize, f64, f64)>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stage: Stage, elapsed: Duration) {
        self.stages.push(StageTiming {
            stage,
            duration_ms: elapsed.as_secs_f32() * 1000.0,
        });
    }

    pub fn time<T>(&mut self, stage: Stage, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.record(stage, start.elapsed());
        out
    }

    /// Format tag and value window the metrics belong to.
    pub fn set_request(&mut self, format: &str, min_val: f64, max_val: f64) {
        self.format = Some(format.to_string());
        self.window = Some((min_val, max_val));
    }

    pub fn set_count(&mut self, count: usize) {
        self.count = count;
    }

    pub fn set_payload_len(&mut self, len: usize) {
        self.uncompressed_len = len;
    }

    /// Records the compress stage with the output size, ratio and savings.
    pub fn record_compression(&mut self, compressed: &Compressed) {
        self.record(Stage::Compress, compressed.elapsed);
        self.uncompressed_len = compressed.input_len;
        self.compression = Some((
            compressed.bytes.len(),
            compressed.ratio,
            compressed.savings_percent(),
        ));
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total_ms = self.stages.iter().map(|timing| timing.duration_ms).sum();
        MetricsSnapshot {
            stages: self.stages.clone(),
            total_ms,
            format: self.format.clone(),
            min_val: self.window.map(|(min, _)| min),
            max_val: self.window.map(|(_, max)| max),
            count: self.count,
            uncompressed_len: self.uncompressed_len,
            compressed_len: self.compression.map(|(len, _, _)| len),
            ratio: self.compression.map(|(_, ratio, _)| ratio),
            savings_percent: self.compression.map(|(_, _, savings)| savings),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub stages: Vec<StageTiming>,
    pub total_ms: f32,
    pub format: Option<String>,
    pub min_val: Option<f64>,
    pub max_val: Option<f64>,
    pub count: usize,
    pub uncompressed_len: usize,
    pub compressed_len: Option<usize>,
    pub ratio: Option<f64>,
    pub savings_percent: Option<f64>,
}

impl MetricsSnapshot {
    pub fn stage_ms(&self, stage: Stage) -> f32 {
        self.stages
            .iter()
            .filter(|timing| timing.stage == stage)
            .map(|timing| timing.duration_ms)
            .sum()
    }
}

impl fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(format) = &self.format {
            write!(f, "format={format} ")?;
        }
        if let (Some(min), Some(max)) = (self.min_val, self.max_val) {
            write!(f, "range=[{min}, {max}] ")?;
        }
        write!(f, "count={} bytes={}", self.count, self.uncompressed_len)?;
        if let (Some(compressed), Some(ratio)) = (self.compressed_len, self.ratio) {
            write!(f, " gz={compressed} ratio={ratio:.3}")?;
        }
        if let Some(savings) = self.savings_percent {
            write!(f, " saved={savings:.1}%")?;
        }
        for timing in &self.stages {
            write!(f, " {}={:.1}ms", timing.stage, timing.duration_ms)?;
        }
        write!(f, " total={:.1}ms", self.total_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compressed(input_len: usize, output_len: usize) -> Compressed {
        Compressed {
            bytes: vec![0; output_len],
            input_len,
            ratio: if input_len == 0 {
                1.0
            } else {
                output_len as f64 / input_len as f64
            },
            elapsed: Duration::from_millis(4),
        }
    }

    #[test]
    fn snapshot_keeps_stage_order_and_sums() {
        let mut metrics = MetricsRecorder::new();
        metrics.record(Stage::Validate, Duration::from_millis(2));
        metrics.record(Stage::Extract, Duration::from_millis(10));
        metrics.record(Stage::Encode, Duration::from_millis(5));
        metrics.set_count(42);
        metrics.record_compression(&compressed(1000, 250));

        let snapshot = metrics.snapshot();
        let order: Vec<Stage> = snapshot.stages.iter().map(|t| t.stage).collect();
        assert_eq!(
            order,
            vec![Stage::Validate, Stage::Extract, Stage::Encode, Stage::Compress]
        );
        assert!((snapshot.total_ms - 21.0).abs() < 1.0e-3);
        assert_eq!(snapshot.count, 42);
        assert_eq!(snapshot.uncompressed_len, 1000);
        assert_eq!(snapshot.compressed_len, Some(250));
        assert_eq!(snapshot.ratio, Some(0.25));
        assert_eq!(snapshot.savings_percent, Some(75.0));
        assert_eq!(snapshot.stage_ms(Stage::Compress), 4.0);
    }

    #[test]
    fn raw_payload_has_no_compression_fields() {
        let mut metrics = MetricsRecorder::new();
        metrics.set_payload_len(64);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.uncompressed_len, 64);
        assert_eq!(snapshot.compressed_len, None);
        assert_eq!(snapshot.savings_percent, None);
        assert_eq!(snapshot.stage_ms(Stage::Compress), 0.0);
    }

    #[test]
    fn time_records_and_returns_value() {
        let mut metrics = MetricsRecorder::new();
        let value = metrics.time(Stage::Compress, || 7);
        assert_eq!(value, 7);
        assert_eq!(metrics.snapshot().stages.len(), 1);
    }

    #[test]
    fn display_is_a_single_line() {
        let mut metrics = MetricsRecorder::new();
        metrics.set_request("vtp", 2.2, 2.6);
        metrics.record(Stage::Encode, Duration::from_millis(3));
        metrics.record_compression(&compressed(0, 20));
        let line = metrics.snapshot().to_string();
        assert!(!line.contains('\n'));
        assert!(line.starts_with("format=vtp range=[2.2, 2.6] count=0"));
        assert!(line.contains("encode=3.0ms"));
        assert!(line.contains("ratio=1.000"));
        assert!(line.contains("saved=0.0%"));
    }

    #[test]
    fn snapshot_serializes_with_request_context() {
        let mut metrics = MetricsRecorder::new();
        metrics.record(Stage::Extract, Duration::from_millis(1));
        let json = serde_json::to_value(metrics.snapshot()).expect("json");
        assert_eq!(json["stages"][0]["stage"], "extract");
        assert!(json["ratio"].is_null());
        assert!(json["min_val"].is_null());

        metrics.set_request("ply", -1.5, 3.0);
        let json = serde_json::to_value(metrics.snapshot()).expect("json");
        assert_eq!(json["format"], "ply");
        assert_eq!(json["min_val"], -1.5);
        assert_eq!(json["max_val"], 3.0);
    }
}
