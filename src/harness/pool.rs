//! Parameterized connection-pool HTTP model.
//!
//! The classic transfer strategies differ only in three knobs: how many
//! concurrent connections, how many requests may be in flight per
//! connection, and whether a connection survives its response. One model
//! covers all four:
//!
//! | preset      | connections | pipeline | persistent |
//! |-------------|-------------|----------|------------|
//! | serial      | 1           | 1        | no         |
//! | parallel    | 8           | 1        | no         |
//! | persistent  | 2           | 1        | yes        |
//! | pipelined   | 2           | 4        | yes        |
//!
//! Connections are modeled as reliable FIFO byte pipes over the shared
//! link: a new connection costs one round trip of setup, requests
//! serialize on the uplink, responses on the downlink. Pages run
//! sequentially, the primary object strictly before the embedded ones.

use std::collections::VecDeque;

use crate::harness::http;
use crate::harness::stats::RequestRecord;
use crate::sim::{LinkConfig, SimTime};
use crate::workload::{WebObject, Workload};

/// Pool shape for one transfer strategy.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Strategy label for reports
    pub label: &'static str,
    /// Concurrent connections
    pub max_connections: usize,
    /// Requests in flight per connection
    pub max_pipeline: usize,
    /// Whether connections survive a response
    pub persistent: bool,
}

impl PoolConfig {
    /// HTTP/1.0 serial: one connection per object, sequentially.
    pub fn http10_serial() -> Self {
        Self {
            label: "HTTP/1.0 serial",
            max_connections: 1,
            max_pipeline: 1,
            persistent: false,
        }
    }

    /// HTTP/1.0 parallel: up to 8 concurrent connections.
    pub fn http10_parallel() -> Self {
        Self {
            label: "HTTP/1.0 parallel",
            max_connections: 8,
            max_pipeline: 1,
            persistent: false,
        }
    }

    /// HTTP/1.1 persistent: 2 reused connections.
    pub fn http11_persistent() -> Self {
        Self {
            label: "HTTP/1.1 persistent",
            max_connections: 2,
            max_pipeline: 1,
            persistent: true,
        }
    }

    /// HTTP/1.1 pipelined: 2 reused connections, 4 requests deep.
    pub fn http11_pipelined() -> Self {
        Self {
            label: "HTTP/1.1 pipelined",
            max_connections: 2,
            max_pipeline: 4,
            persistent: true,
        }
    }
}

/// One simulated pooled connection.
struct Conn {
    established: bool,
    /// When the connection can emit its next request
    send_free: u64,
    /// Completion times of outstanding responses, FIFO
    outstanding: VecDeque<u64>,
}

impl Conn {
    fn new() -> Self {
        Self {
            established: false,
            send_free: 0,
            outstanding: VecDeque::new(),
        }
    }

    /// Earliest time this connection could start another request at or
    /// after `now`, honoring the pipeline depth.
    fn ready_at(&self, now: u64, depth: usize) -> u64 {
        let mut at = now.max(self.send_free);
        if self.outstanding.len() >= depth {
            // A slot opens when the oldest outstanding response lands.
            if let Some(&oldest) = self.outstanding.front() {
                at = at.max(oldest);
            }
        }
        at
    }

    fn reap(&mut self, now: u64) {
        while matches!(self.outstanding.front(), Some(&done) if done <= now) {
            self.outstanding.pop_front();
        }
    }
}

/// Run `workload` through the pool model over `link`.
pub fn run(link: &LinkConfig, config: &PoolConfig, workload: &Workload) -> Vec<RequestRecord> {
    let mut model = PoolModel::new(link, config);
    let mut records = Vec::new();
    let mut clock = 0u64;

    for (page_idx, page) in workload.pages().iter().enumerate() {
        if page.objects.is_empty() {
            continue;
        }
        let primary_idx = page.primary_index().unwrap_or(0);

        // Primary alone, then everything else in parallel over the pool.
        let (started, done) = model.fetch(clock, &page.objects[primary_idx]);
        records.push(finished_record(
            page_idx,
            &page.objects[primary_idx],
            started,
            done,
        ));

        let mut page_end = done;
        for (obj_idx, object) in page.objects.iter().enumerate() {
            if obj_idx == primary_idx {
                continue;
            }
            let (started, obj_done) = model.fetch(done.as_micros(), object);
            page_end = page_end.max(obj_done);
            records.push(finished_record(page_idx, object, started, obj_done));
        }

        clock = page_end.as_micros();
    }

    tracing::info!(
        strategy = config.label,
        pages = workload.len(),
        finish = %SimTime::from_micros(clock),
        "pool model run complete"
    );
    records
}

struct PoolModel {
    delay_us: u64,
    bandwidth_bps: u64,
    max_pipeline: usize,
    persistent: bool,
    conns: Vec<Conn>,
    up_free: u64,
    down_free: u64,
}

impl PoolModel {
    fn new(link: &LinkConfig, config: &PoolConfig) -> Self {
        Self {
            delay_us: link.delay.as_micros() as u64,
            bandwidth_bps: link.bandwidth_bps.max(1),
            max_pipeline: config.max_pipeline.max(1),
            persistent: config.persistent,
            conns: (0..config.max_connections.max(1))
                .map(|_| Conn::new())
                .collect(),
            up_free: 0,
            down_free: 0,
        }
    }

    /// Fetch one object no earlier than `now`; returns (request sent,
    /// response complete).
    fn fetch(&mut self, now: u64, object: &WebObject) -> (SimTime, SimTime) {
        // Pick the connection that can start soonest.
        let depth = self.max_pipeline;
        let best = (0..self.conns.len())
            .min_by_key(|&idx| self.conns[idx].ready_at(now, depth))
            .unwrap_or(0);

        let mut t = self.conns[best].ready_at(now, depth);
        self.conns[best].reap(t);

        // Connection setup handshake: one round trip.
        if !self.conns[best].established {
            t += 2 * self.delay_us;
            self.conns[best].established = true;
        }

        let started = t;

        // Request up the shared link.
        let req_len = http::format_request(&object.url, object.size).len();
        let up_start = t.max(self.up_free);
        self.up_free = up_start + self.serialization_us(req_len);
        let at_server = self.up_free + self.delay_us;

        // Response down the shared link.
        let resp_len = http::response_wire_size(object.size);
        let down_start = at_server.max(self.down_free);
        self.down_free = down_start + self.serialization_us(resp_len);
        let done = self.down_free + self.delay_us;

        let conn = &mut self.conns[best];
        conn.send_free = self.up_free;
        conn.outstanding.push_back(done);
        if !self.persistent {
            // Closed by the server after the response; the next request on
            // this slot pays setup again.
            conn.established = false;
        }

        (SimTime::from_micros(started), SimTime::from_micros(done))
    }

    fn serialization_us(&self, len: usize) -> u64 {
        (len as u64 * 8).saturating_mul(1_000_000) / self.bandwidth_bps
    }
}

fn finished_record(
    page: usize,
    object: &WebObject,
    started: SimTime,
    completed: SimTime,
) -> RequestRecord {
    let mut record = RequestRecord::new(page, object.url.clone(), object.size, object.primary);
    record.started = Some(started);
    record.completed = Some(completed);
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::stats::Report;
    use crate::workload::WebPage;
    use std::time::Duration;

    fn link() -> LinkConfig {
        LinkConfig {
            bandwidth_bps: 1_500_000,
            delay: Duration::from_millis(25),
            loss_rate: 0.0,
        }
    }

    fn page(object_sizes: &[u32]) -> WebPage {
        let objects = object_sizes
            .iter()
            .enumerate()
            .map(|(idx, &size)| WebObject {
                url: format!("/obj{idx}"),
                size,
                primary: idx == 0,
            })
            .collect();
        WebPage { objects }
    }

    fn page_time(config: &PoolConfig) -> Duration {
        let workload = Workload::from_pages(vec![page(&[8192, 2048, 2048, 2048, 2048])]);
        let records = run(&link(), config, &workload);
        let report = Report::from_records(config.label, &records);
        report.pages[0].load_time.unwrap()
    }

    #[test]
    fn test_presets() {
        assert_eq!(PoolConfig::http10_serial().max_connections, 1);
        assert_eq!(PoolConfig::http10_parallel().max_connections, 8);
        assert!(PoolConfig::http11_persistent().persistent);
        assert_eq!(PoolConfig::http11_pipelined().max_pipeline, 4);
    }

    #[test]
    fn test_parallel_beats_serial() {
        assert!(page_time(&PoolConfig::http10_parallel()) < page_time(&PoolConfig::http10_serial()));
    }

    #[test]
    fn test_persistent_beats_serial() {
        // Reused connections skip per-object setup round trips.
        assert!(
            page_time(&PoolConfig::http11_persistent()) < page_time(&PoolConfig::http10_serial())
        );
    }

    #[test]
    fn test_pipelining_not_slower_than_plain_persistent() {
        assert!(
            page_time(&PoolConfig::http11_pipelined()) <= page_time(&PoolConfig::http11_persistent())
        );
    }

    #[test]
    fn test_primary_strictly_first() {
        let workload = Workload::from_pages(vec![page(&[1000, 1000])]);
        let records = run(&link(), &PoolConfig::http10_parallel(), &workload);

        let primary_done = records[0].completed.unwrap();
        let secondary_start = records[1].started.unwrap();
        assert!(records[0].primary);
        assert!(secondary_start >= primary_done);
    }

    #[test]
    fn test_pages_sequential() {
        let workload = Workload::from_pages(vec![page(&[1000]), page(&[1000])]);
        let records = run(&link(), &PoolConfig::http11_persistent(), &workload);

        let first_done = records[0].completed.unwrap();
        let second_start = records[1].started.unwrap();
        assert!(second_start >= first_done);
    }

    #[test]
    fn test_every_object_recorded() {
        let workload = Workload::from_pages(vec![page(&[100, 200, 300])]);
        let records = run(&link(), &PoolConfig::http10_serial(), &workload);
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.completed > r.started));
    }
}
