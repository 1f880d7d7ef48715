use serde::Serialize;

/// One timed download: payload length and wall time spent reading it.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SampleResult {
    pub bytes: u64,
    pub elapsed_secs: f64,
}

/// Per-sample throughput in bits, kilobits and megabits per second (base 1024).
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Rates {
    pub bits_per_sec: f64,
    pub kb_per_sec: f64,
    pub mb_per_sec: f64,
}

impl Rates {
    /// Caller guarantees `elapsed_secs > 0`.
    pub fn from_sample(sample: &SampleResult) -> Self {
        let bits_per_sec = (sample.bytes as f64 * 8.0) / sample.elapsed_secs;
        let kb_per_sec = bits_per_sec / 1024.0;
        let mb_per_sec = kb_per_sec / 1024.0;
        Self { bits_per_sec, kb_per_sec, mb_per_sec }
    }
}

/// Running sums of per-sample rates for one run.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Accumulators {
    pub bits_per_sec: f64,
    pub kb_per_sec: f64,
    pub mb_per_sec: f64,
}

impl Accumulators {
    pub fn add(&mut self, rates: Rates) {
        self.bits_per_sec += rates.bits_per_sec;
        self.kb_per_sec += rates.kb_per_sec;
        self.mb_per_sec += rates.mb_per_sec;
    }

    pub fn average(&self, samples: u32) -> Summary {
        let n = f64::from(samples.max(1));
        Summary {
            avg_bits_per_sec: round2(self.bits_per_sec / n),
            avg_kb_per_sec: round2(self.kb_per_sec / n),
            avg_mb_per_sec: round2(self.mb_per_sec / n),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Summary {
    pub avg_bits_per_sec: f64,
    pub avg_kb_per_sec: f64,
    pub avg_mb_per_sec: f64,
}

impl Summary {
    pub fn bits_label(&self) -> String {
        format!("{:.2} bps", self.avg_bits_per_sec)
    }

    pub fn kb_label(&self) -> String {
        format!("{:.2} Kbps", self.avg_kb_per_sec)
    }

    pub fn mb_label(&self) -> String {
        format!("{:.2} Mbps", self.avg_mb_per_sec)
    }
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_follow_binary_scaling() {
        let r = Rates::from_sample(&SampleResult { bytes: 480_000, elapsed_secs: 1.5 });
        assert_eq!(r.bits_per_sec, 480_000.0 * 8.0 / 1.5);
        assert_eq!(r.kb_per_sec, r.bits_per_sec / 1024.0);
        assert_eq!(r.mb_per_sec, r.kb_per_sec / 1024.0);
    }

    #[test]
    fn uniform_samples_average_to_the_same_rate() {
        // 125_000 bytes in one second is exactly 1_000_000 bits/s
        let rates = Rates::from_sample(&SampleResult { bytes: 125_000, elapsed_secs: 1.0 });
        let mut acc = Accumulators::default();
        for _ in 0..3 {
            acc.add(rates);
        }
        let summary = acc.average(3);
        assert_eq!(summary.avg_bits_per_sec, 1_000_000.0);
        assert_eq!(summary.avg_kb_per_sec, 976.56);
        assert_eq!(summary.avg_mb_per_sec, 0.95);
        assert_eq!(summary.bits_label(), "1000000.00 bps");
        assert_eq!(summary.kb_label(), "976.56 Kbps");
        assert_eq!(summary.mb_label(), "0.95 Mbps");
    }

    #[test]
    fn zero_bytes_is_a_zero_rate() {
        let r = Rates::from_sample(&SampleResult { bytes: 0, elapsed_secs: 0.25 });
        assert_eq!(r, Rates::default());
    }

    #[test]
    fn summary_serializes_field_names() {
        let summary = Summary { avg_bits_per_sec: 8.0, avg_kb_per_sec: 0.01, avg_mb_per_sec: 0.0 };
        let json = serde_json::to_value(summary).unwrap();
        assert_eq!(json["avg_bits_per_sec"], 8.0);
        assert_eq!(json["avg_kb_per_sec"], 0.01);
    }
}
