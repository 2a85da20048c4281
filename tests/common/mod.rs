// Shared test helpers

use fleethub::models::{MetricFrame, ProcessEntry};

pub fn frame(cpu: f64) -> MetricFrame {
    MetricFrame {
        time: "12:00:01".into(),
        cpu,
        ram: 55.0,
        net_rx: 10.5,
        net_tx: 3.25,
        processes: vec![],
        screenshot: None,
        timestamp: None,
    }
}

#[allow(dead_code)]
pub fn frame_with_process(cpu: f64, pid: u32) -> MetricFrame {
    let mut f = frame(cpu);
    f.processes = vec![ProcessEntry {
        pid,
        name: "x".into(),
        user: None,
        cpu: 60.0,
        ram: 10.0,
    }];
    f
}
