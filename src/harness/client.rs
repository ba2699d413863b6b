//! Page-driving SST client.
//!
//! Drives a workload through the originator role the way a browser would:
//! the page's primary object is fetched first; once it completes every
//! embedded object is queued at once (the transport multiplexes them over
//! the shared channel); a page-level deadline force-completes pages that
//! stall. One transaction per object, one stream per transaction.

use std::time::Duration;

use crate::harness::http;
use crate::harness::stats::RequestRecord;
use crate::peer::{Originator, Transaction, XferEvent};
use crate::sim::{EndpointId, Event, Sim};
use crate::transport::ChannelConfig;
use crate::workload::Workload;

/// Deadline for an entire page of requests.
pub const PAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Delay before picking up the next page, mirroring the deferred
/// scheduling of the event-driven original.
const NEXT_PAGE_DELAY: Duration = Duration::from_micros(10);

/// Workload driver for the SST strategy.
pub struct SstClient {
    originator: Originator,
    records: Vec<RequestRecord>,
    current_page: usize,
    page_count: usize,
    page_timeout: Duration,
    advancing: bool,
    finished: bool,
}

impl SstClient {
    /// Build a client at `local` fetching `workload` from `server`.
    pub fn new(
        local: EndpointId,
        server: EndpointId,
        config: ChannelConfig,
        workload: &Workload,
        page_timeout: Duration,
    ) -> Self {
        let mut records = Vec::new();
        for (page_idx, page) in workload.pages().iter().enumerate() {
            for object in &page.objects {
                records.push(RequestRecord::new(
                    page_idx,
                    object.url.clone(),
                    object.size,
                    object.primary,
                ));
            }
        }

        Self {
            originator: Originator::new(local, server, config),
            records,
            current_page: 0,
            page_count: workload.len(),
            page_timeout,
            advancing: false,
            finished: true,
        }
    }

    /// Begin fetching the first page.
    pub fn start(&mut self, sim: &mut Sim) {
        self.finished = false;
        self.begin_page(sim);
    }

    /// All pages processed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Datagram addressed to this client.
    pub fn on_datagram(&mut self, sim: &mut Sim, frame: bytes::Bytes) {
        let events = self.originator.on_datagram(sim, frame);
        self.handle_events(sim, events);
    }

    /// Retransmission timeout on this client's channel.
    pub fn on_rto(&mut self, sim: &mut Sim, seq: u32) {
        let events = self.originator.on_rto(sim, seq);
        self.handle_events(sim, events);
    }

    /// The deadline for `page` fired.
    pub fn on_page_deadline(&mut self, sim: &mut Sim, page: usize) {
        if self.finished || page != self.current_page || self.advancing {
            return;
        }

        let incomplete = self
            .page_tags(page)
            .filter(|&tag| self.records[tag].completed.is_none())
            .count();
        tracing::warn!(
            page,
            incomplete,
            "page deadline, force-completing and moving on"
        );

        // Force-stamp stragglers so the statistics see a bounded time,
        // then drop every stream for the page at once.
        let now = sim.now();
        for tag in self.page_tags(page).collect::<Vec<_>>() {
            let record = &mut self.records[tag];
            if record.completed.is_none() {
                record.completed = Some(now);
                record.timed_out = true;
            }
        }
        self.originator.discard();
        self.advance(sim);
    }

    /// Deferred advance fired.
    pub fn on_next_page(&mut self, sim: &mut Sim) {
        if self.finished {
            return;
        }
        self.advancing = false;
        self.current_page += 1;
        self.begin_page(sim);
    }

    /// Consume the run, yielding per-request records.
    pub fn into_records(self) -> Vec<RequestRecord> {
        self.records
    }

    fn begin_page(&mut self, sim: &mut Sim) {
        loop {
            if self.current_page >= self.page_count {
                tracing::info!("all pages processed");
                self.finished = true;
                return;
            }
            if self.page_tags(self.current_page).next().is_some() {
                break;
            }
            tracing::warn!(page = self.current_page, "empty page, skipping");
            self.current_page += 1;
        }

        let page = self.current_page;
        tracing::debug!(
            page,
            requests = self.page_tags(page).count(),
            "starting page"
        );
        sim.schedule(self.page_timeout, Event::PageDeadline { page });

        // Primary first; secondaries wait for its completion.
        let primary = self
            .page_tags(page)
            .find(|&tag| self.records[tag].primary)
            .or_else(|| self.page_tags(page).next());
        if let Some(tag) = primary {
            self.enqueue_object(tag);
            let events = self.originator.drain(sim);
            self.handle_events(sim, events);
        }
    }

    fn enqueue_object(&mut self, tag: usize) {
        let record = &self.records[tag];
        self.originator.enqueue(Transaction {
            tag: tag as u64,
            request: http::format_request(&record.url, record.size),
            is_done: Box::new(http::response_complete),
        });
    }

    fn handle_events(&mut self, sim: &mut Sim, events: Vec<XferEvent>) {
        let mut queue = events;
        while let Some(event) = queue.pop() {
            match event {
                XferEvent::Admitted { tag } => {
                    let record = &mut self.records[tag as usize];
                    if record.started.is_none() {
                        record.started = Some(sim.now());
                    }
                }
                XferEvent::Completed { tag } => {
                    let tag = tag as usize;
                    self.records[tag].completed = Some(sim.now());
                    tracing::debug!(
                        page = self.records[tag].page,
                        url = %self.records[tag].url,
                        primary = self.records[tag].primary,
                        "request completed"
                    );
                    if self.records[tag].primary {
                        queue.extend(self.start_secondaries(sim));
                    }
                }
                XferEvent::Failed { tag } => {
                    let tag = tag as usize;
                    self.records[tag].failed = true;
                    tracing::warn!(
                        page = self.records[tag].page,
                        url = %self.records[tag].url,
                        "request abandoned by transport"
                    );
                }
            }
        }

        self.maybe_finish_page(sim);
    }

    fn start_secondaries(&mut self, sim: &mut Sim) -> Vec<XferEvent> {
        let secondaries: Vec<usize> = self
            .page_tags(self.current_page)
            .filter(|&tag| !self.records[tag].primary)
            .collect();
        if secondaries.is_empty() {
            return Vec::new();
        }

        tracing::debug!(
            page = self.current_page,
            count = secondaries.len(),
            "primary complete, starting secondaries"
        );
        for tag in secondaries {
            self.enqueue_object(tag);
        }
        self.originator.drain(sim)
    }

    fn maybe_finish_page(&mut self, sim: &mut Sim) {
        if self.finished || self.advancing || self.current_page >= self.page_count {
            return;
        }
        let done = self
            .page_tags(self.current_page)
            .all(|tag| self.records[tag].completed.is_some() || self.records[tag].failed);
        if done {
            tracing::debug!(page = self.current_page, "page complete");
            self.advance(sim);
        }
    }

    fn advance(&mut self, sim: &mut Sim) {
        self.advancing = true;
        sim.schedule(NEXT_PAGE_DELAY, Event::NextPage);
    }

    fn page_tags(&self, page: usize) -> impl Iterator<Item = usize> + '_ {
        self.records
            .iter()
            .enumerate()
            .filter(move |(_, r)| r.page == page)
            .map(|(tag, _)| tag)
    }
}
