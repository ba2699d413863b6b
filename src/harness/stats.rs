//! Per-request records and the end-of-run report.

use std::time::Duration;

use crate::sim::SimTime;

/// Outcome record for one requested object.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    /// Index of the owning page
    pub page: usize,
    /// Request path
    pub url: String,
    /// Response body size in bytes
    pub size: u32,
    /// Whether this is the page's primary object
    pub primary: bool,
    /// When the request was admitted for transmission
    pub started: Option<SimTime>,
    /// When the response completed (or was force-stamped by a deadline)
    pub completed: Option<SimTime>,
    /// The transport abandoned the transaction
    pub failed: bool,
    /// The page deadline force-completed this request
    pub timed_out: bool,
}

impl RequestRecord {
    /// Build an untouched record.
    pub fn new(page: usize, url: String, size: u32, primary: bool) -> Self {
        Self {
            page,
            url,
            size,
            primary,
            started: None,
            completed: None,
            failed: false,
            timed_out: false,
        }
    }

    fn elapsed(&self) -> Option<Duration> {
        match (self.started, self.completed) {
            (Some(start), Some(end)) if end > start && !self.failed => Some(end - start),
            _ => None,
        }
    }
}

/// Aggregated timing for one page.
#[derive(Debug, Clone)]
pub struct PageStats {
    /// Page index
    pub index: usize,
    /// Objects on the page
    pub requests: usize,
    /// Objects whose responses completed
    pub completed: usize,
    /// Objects abandoned by the transport
    pub failed: usize,
    /// Earliest request start to latest completion
    pub load_time: Option<Duration>,
    /// Sum of all object sizes
    pub total_size: u64,
    /// Sum of completed object sizes
    pub completed_size: u64,
}

/// End-of-run report for one strategy.
#[derive(Debug, Clone)]
pub struct Report {
    /// Strategy label
    pub strategy: String,
    /// Per-page aggregates
    pub pages: Vec<PageStats>,
    /// Average time of completed requests
    pub avg_request_time: Option<Duration>,
    /// Completed request count
    pub completed_requests: usize,
    /// Total request count
    pub total_requests: usize,
    /// Datagrams handed to the link (SST runs only)
    pub datagrams_sent: u64,
    /// Datagrams the link dropped (SST runs only)
    pub datagrams_dropped: u64,
}

impl Report {
    /// Aggregate request records into a report.
    pub fn from_records(strategy: impl Into<String>, records: &[RequestRecord]) -> Self {
        let page_count = records.iter().map(|r| r.page + 1).max().unwrap_or(0);

        let mut pages = Vec::with_capacity(page_count);
        for index in 0..page_count {
            let page_records: Vec<&RequestRecord> =
                records.iter().filter(|r| r.page == index).collect();

            let mut start: Option<SimTime> = None;
            let mut end: Option<SimTime> = None;
            let mut completed = 0;
            let mut failed = 0;
            let mut completed_size = 0u64;

            for record in &page_records {
                if let Some(s) = record.started {
                    start = Some(start.map_or(s, |cur| cur.min(s)));
                }
                if record.failed {
                    failed += 1;
                    continue;
                }
                if let Some(c) = record.completed {
                    completed += 1;
                    completed_size += record.size as u64;
                    end = Some(end.map_or(c, |cur| cur.max(c)));
                }
            }

            let load_time = match (start, end) {
                (Some(s), Some(e)) if e > s && completed > 0 => Some(e - s),
                _ => None,
            };

            pages.push(PageStats {
                index,
                requests: page_records.len(),
                completed,
                failed,
                load_time,
                total_size: page_records.iter().map(|r| r.size as u64).sum(),
                completed_size,
            });
        }

        let request_times: Vec<Duration> = records.iter().filter_map(|r| r.elapsed()).collect();
        let avg_request_time = if request_times.is_empty() {
            None
        } else {
            Some(request_times.iter().sum::<Duration>() / request_times.len() as u32)
        };

        Self {
            strategy: strategy.into(),
            pages,
            avg_request_time,
            completed_requests: request_times.len(),
            total_requests: records.len(),
            datagrams_sent: 0,
            datagrams_dropped: 0,
        }
    }

    /// Attach link counters from an SST run.
    pub fn with_link_counters(mut self, sent: u64, dropped: u64) -> Self {
        self.datagrams_sent = sent;
        self.datagrams_dropped = dropped;
        self
    }

    /// Pages with a measurable load time.
    pub fn completed_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.load_time.is_some()).count()
    }

    /// Mean load time over completed pages.
    pub fn avg_page_time(&self) -> Option<Duration> {
        let times: Vec<Duration> = self.pages.iter().filter_map(|p| p.load_time).collect();
        if times.is_empty() {
            None
        } else {
            Some(times.iter().sum::<Duration>() / times.len() as u32)
        }
    }

    /// Format as a text report.
    pub fn format(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Results for {} mode:\n", self.strategy));
        out.push_str("------------------------------------\n");

        for page in &self.pages {
            if let Some(load) = page.load_time {
                out.push_str(&format!(
                    "Page {} ({} requests): {:.3} ms ({}/{} requests completed) - \
                     Total size: {} bytes - Completed size: {} bytes\n",
                    page.index + 1,
                    page.requests,
                    load.as_secs_f64() * 1000.0,
                    page.completed,
                    page.requests,
                    page.total_size,
                    page.completed_size,
                ));
            }
        }

        if let Some(avg) = self.avg_page_time() {
            out.push_str(&format!(
                "\nAverage page load time: {:.3} ms\n",
                avg.as_secs_f64() * 1000.0
            ));
            out.push_str(&format!(
                "Completed {} out of {} pages ({:.1}%)\n",
                self.completed_pages(),
                self.pages.len(),
                self.completed_pages() as f64 * 100.0 / self.pages.len().max(1) as f64,
            ));
        }

        if let Some(avg) = self.avg_request_time {
            out.push_str(&format!(
                "Average request time: {:.6} seconds\n",
                avg.as_secs_f64()
            ));
        }
        out.push_str(&format!(
            "Completed {} of {} requests\n",
            self.completed_requests, self.total_requests
        ));

        if self.datagrams_sent > 0 {
            out.push_str(&format!(
                "\nLink: {} datagrams sent, {} dropped\n",
                self.datagrams_sent, self.datagrams_dropped
            ));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(
        page: usize,
        started_us: u64,
        completed_us: Option<u64>,
        failed: bool,
    ) -> RequestRecord {
        let mut r = RequestRecord::new(page, "/x".into(), 100, false);
        r.started = Some(SimTime::from_micros(started_us));
        r.completed = completed_us.map(SimTime::from_micros);
        r.failed = failed;
        r
    }

    #[test]
    fn test_page_load_time_spans_first_start_to_last_completion() {
        let records = vec![
            record(0, 1_000, Some(5_000), false),
            record(0, 2_000, Some(9_000), false),
        ];
        let report = Report::from_records("test", &records);

        assert_eq!(report.pages.len(), 1);
        assert_eq!(
            report.pages[0].load_time,
            Some(Duration::from_micros(8_000))
        );
        assert_eq!(report.pages[0].completed, 2);
    }

    #[test]
    fn test_failed_requests_excluded_from_timing() {
        let records = vec![
            record(0, 1_000, Some(4_000), false),
            record(0, 1_500, Some(90_000), true),
        ];
        let report = Report::from_records("test", &records);

        assert_eq!(report.pages[0].completed, 1);
        assert_eq!(report.pages[0].failed, 1);
        assert_eq!(
            report.pages[0].load_time,
            Some(Duration::from_micros(3_000))
        );
        assert_eq!(report.completed_requests, 1);
    }

    #[test]
    fn test_incomplete_page_has_no_load_time() {
        let records = vec![record(0, 1_000, None, false)];
        let report = Report::from_records("test", &records);
        assert_eq!(report.pages[0].load_time, None);
        assert_eq!(report.completed_pages(), 0);
        assert!(report.avg_page_time().is_none());
    }

    #[test]
    fn test_averages() {
        let records = vec![
            record(0, 0, Some(2_000), false),
            record(1, 10_000, Some(14_000), false),
        ];
        let report = Report::from_records("test", &records);

        assert_eq!(report.avg_page_time(), Some(Duration::from_micros(3_000)));
        assert_eq!(report.avg_request_time, Some(Duration::from_micros(3_000)));
    }

    #[test]
    fn test_format_mentions_strategy_and_pages() {
        let records = vec![record(0, 0, Some(2_000), false)];
        let report = Report::from_records("sst", &records).with_link_counters(10, 1);
        let text = report.format();

        assert!(text.contains("Results for sst mode:"));
        assert!(text.contains("Page 1 (1 requests)"));
        assert!(text.contains("10 datagrams sent, 1 dropped"));
    }
}
