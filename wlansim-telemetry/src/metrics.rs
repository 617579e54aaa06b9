//! Prometheus metrics for the traffic layer and population operations.

use prometheus::{Counter, Histogram, HistogramOpts, Registry};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    /// Frames sent by workers toward the wire.
    pub frames_up: Counter,
    /// Inbound frames delivered to device services.
    pub frames_down: Counter,
    /// Inbound frames discarded as noise (truncated, unknown kind).
    pub frames_dropped: Counter,
    pub devices_joined: Counter,
    pub devices_failed: Counter,
    /// Wall-clock duration of batch join operations.
    pub join_duration: Histogram,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder {
    pub fn new() -> Self {
        let registry = Registry::new();
        let frames_up =
            Counter::new("wlansim_frames_up_total", "Frames forwarded to the wire").unwrap();
        let frames_down = Counter::new(
            "wlansim_frames_down_total",
            "Frames delivered to device services",
        )
        .unwrap();
        let frames_dropped = Counter::new(
            "wlansim_frames_dropped_total",
            "Inbound frames discarded as noise",
        )
        .unwrap();
        let devices_joined = Counter::new(
            "wlansim_devices_joined_total",
            "Devices that reached their running state",
        )
        .unwrap();
        let devices_failed = Counter::new(
            "wlansim_devices_failed_total",
            "Devices whose services ended in failure",
        )
        .unwrap();
        let join_duration = Histogram::with_opts(
            HistogramOpts::new("wlansim_join_duration_secs", "Batch join wall time")
                .buckets(vec![0.1, 1.0, 10.0, 60.0, 300.0]),
        )
        .unwrap();

        registry.register(Box::new(frames_up.clone())).unwrap();
        registry.register(Box::new(frames_down.clone())).unwrap();
        registry.register(Box::new(frames_dropped.clone())).unwrap();
        registry.register(Box::new(devices_joined.clone())).unwrap();
        registry.register(Box::new(devices_failed.clone())).unwrap();
        registry.register(Box::new(join_duration.clone())).unwrap();

        Self {
            registry,
            frames_up,
            frames_down,
            frames_dropped,
            devices_joined,
            devices_failed,
            join_duration,
        }
    }

    pub fn inc_frames_up(&self) {
        self.frames_up.inc();
    }

    pub fn inc_frames_down(&self) {
        self.frames_down.inc();
    }

    pub fn inc_frames_dropped(&self) {
        self.frames_dropped.inc();
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_gathered_text() {
        let metrics = MetricsRecorder::new();
        metrics.frames_up.inc();
        metrics.frames_dropped.inc();
        let text = metrics.gather_metrics().expect("encode");
        assert!(text.contains("wlansim_frames_up_total 1"));
        assert!(text.contains("wlansim_frames_dropped_total 1"));
    }
}
