//! Simulation harness: scenarios, strategies, and the event loop.
//!
//! Wires a workload, a strategy, and a link model together and produces a
//! [`Report`]. The SST strategy runs the full transport over the
//! discrete-event engine; the classic HTTP strategies run through the
//! parameterized connection-pool model.

pub mod client;
pub mod http;
pub mod pool;
pub mod stats;

pub use client::SstClient;
pub use http::HttpHandler;
pub use pool::PoolConfig;
pub use stats::{PageStats, Report, RequestRecord};

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::peer::{Responder, ResponderConfig};
use crate::sim::{EndpointId, Event, LinkConfig, Sim};
use crate::transport::ChannelConfig;
use crate::workload::Workload;

/// Transfer strategy under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Structured stream transport: every object multiplexed on one channel
    Sst,
    /// HTTP/1.0, one connection per object
    Serial,
    /// HTTP/1.0, up to 8 concurrent connections
    Parallel,
    /// HTTP/1.1, 2 persistent connections
    Persistent,
    /// HTTP/1.1, 2 persistent connections with pipelining
    Pipelined,
}

impl Strategy {
    /// All strategies, for side-by-side runs.
    pub const ALL: [Strategy; 5] = [
        Strategy::Sst,
        Strategy::Serial,
        Strategy::Parallel,
        Strategy::Persistent,
        Strategy::Pipelined,
    ];

    /// Report label.
    pub fn label(&self) -> &'static str {
        match self {
            Strategy::Sst => "HTTP/1.0 SST",
            Strategy::Serial => PoolConfig::http10_serial().label,
            Strategy::Parallel => PoolConfig::http10_parallel().label,
            Strategy::Persistent => PoolConfig::http11_persistent().label,
            Strategy::Pipelined => PoolConfig::http11_pipelined().label,
        }
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sst" => Ok(Strategy::Sst),
            "serial" => Ok(Strategy::Serial),
            "parallel" => Ok(Strategy::Parallel),
            "persistent" => Ok(Strategy::Persistent),
            "pipelined" => Ok(Strategy::Pipelined),
            other => Err(Error::config(format!("unknown strategy: {other}"))),
        }
    }
}

/// Everything a run needs besides the workload.
#[derive(Debug, Clone)]
pub struct Scenario {
    /// Link rate in bits per second
    pub bandwidth_bps: u64,
    /// One-way propagation delay
    pub delay: Duration,
    /// Independent per-datagram loss probability
    pub loss_rate: f64,
    /// Seed for the loss model
    pub seed: u64,
    /// Simulated time cap
    pub duration: Duration,
    /// Per-page deadline
    pub page_timeout: Duration,
    /// Strategy to run
    pub strategy: Strategy,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            bandwidth_bps: 1_500_000,
            delay: Duration::from_millis(25),
            loss_rate: 0.0,
            seed: 1,
            duration: Duration::from_secs(500),
            page_timeout: client::PAGE_TIMEOUT,
            strategy: Strategy::Sst,
        }
    }
}

impl Scenario {
    /// Validate parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if self.bandwidth_bps == 0 {
            return Err(Error::config("bandwidth must be positive"));
        }
        if !(0.0..1.0).contains(&self.loss_rate) {
            return Err(Error::config("loss rate must be in [0, 1)"));
        }
        Ok(())
    }

    fn link(&self) -> LinkConfig {
        LinkConfig {
            bandwidth_bps: self.bandwidth_bps,
            delay: self.delay,
            loss_rate: self.loss_rate,
        }
    }
}

/// Scenario file format for serialization.
#[derive(Debug, Serialize, Deserialize)]
pub struct ScenarioFile {
    /// Link rate in bits per second
    pub bandwidth_bps: u64,
    /// One-way propagation delay (milliseconds)
    pub delay_ms: u64,
    /// Per-datagram loss probability
    pub loss_rate: f64,
    /// Seed for the loss model
    pub seed: u64,
    /// Simulated time cap (seconds)
    pub duration_secs: u64,
    /// Per-page deadline (seconds)
    pub page_timeout_secs: u64,
    /// Strategy name
    pub strategy: String,
}

impl ScenarioFile {
    /// Convert to a runtime scenario.
    pub fn to_scenario(&self) -> Result<Scenario> {
        Ok(Scenario {
            bandwidth_bps: self.bandwidth_bps,
            delay: Duration::from_millis(self.delay_ms),
            loss_rate: self.loss_rate,
            seed: self.seed,
            duration: Duration::from_secs(self.duration_secs),
            page_timeout: Duration::from_secs(self.page_timeout_secs),
            strategy: self.strategy.parse()?,
        })
    }

    /// Capture a runtime scenario.
    pub fn from_scenario(scenario: &Scenario) -> Self {
        Self {
            bandwidth_bps: scenario.bandwidth_bps,
            delay_ms: scenario.delay.as_millis() as u64,
            loss_rate: scenario.loss_rate,
            seed: scenario.seed,
            duration_secs: scenario.duration.as_secs(),
            page_timeout_secs: scenario.page_timeout.as_secs(),
            strategy: match scenario.strategy {
                Strategy::Sst => "sst",
                Strategy::Serial => "serial",
                Strategy::Parallel => "parallel",
                Strategy::Persistent => "persistent",
                Strategy::Pipelined => "pipelined",
            }
            .to_owned(),
        }
    }
}

/// Run one strategy over one workload.
pub fn run(scenario: &Scenario, workload: &Workload) -> Result<Report> {
    scenario.validate()?;
    if workload.is_empty() {
        return Err(Error::trace("empty workload"));
    }

    tracing::info!(
        strategy = scenario.strategy.label(),
        pages = workload.len(),
        bandwidth_bps = scenario.bandwidth_bps,
        delay_ms = scenario.delay.as_millis() as u64,
        loss = scenario.loss_rate,
        "starting run"
    );

    let report = match scenario.strategy {
        Strategy::Sst => run_sst(scenario, workload),
        Strategy::Serial => run_pool(scenario, workload, PoolConfig::http10_serial()),
        Strategy::Parallel => run_pool(scenario, workload, PoolConfig::http10_parallel()),
        Strategy::Persistent => run_pool(scenario, workload, PoolConfig::http11_persistent()),
        Strategy::Pipelined => run_pool(scenario, workload, PoolConfig::http11_pipelined()),
    };
    Ok(report)
}

fn run_pool(scenario: &Scenario, workload: &Workload, config: PoolConfig) -> Report {
    let records = pool::run(&scenario.link(), &config, workload);
    Report::from_records(config.label, &records)
}

/// The SST event loop: one client endpoint, one server endpoint, and the
/// transport in between.
fn run_sst(scenario: &Scenario, workload: &Workload) -> Report {
    const CLIENT: EndpointId = EndpointId(1);
    const SERVER: EndpointId = EndpointId(2);

    let mut sim = Sim::new(scenario.link(), scenario.seed);
    let mut client = SstClient::new(
        CLIENT,
        SERVER,
        ChannelConfig::default(),
        workload,
        scenario.page_timeout,
    );
    let mut server = Responder::new(
        SERVER,
        ResponderConfig::default(),
        HttpHandler,
        http::request_complete,
    );

    client.start(&mut sim);

    let deadline = crate::sim::SimTime::ZERO + scenario.duration;
    while let Some((now, event)) = sim.next() {
        if now > deadline {
            tracing::warn!(%now, "simulated duration cap reached");
            break;
        }
        match event {
            Event::Datagram { src, dst, payload } => {
                if dst == CLIENT {
                    client.on_datagram(&mut sim, payload);
                } else {
                    server.on_datagram(&mut sim, src, payload);
                }
            }
            Event::Rto { owner, peer, seq } => {
                if owner == CLIENT {
                    client.on_rto(&mut sim, seq);
                } else {
                    server.on_rto(&mut sim, peer, seq);
                }
            }
            Event::PageDeadline { page } => client.on_page_deadline(&mut sim, page),
            Event::NextPage => client.on_next_page(&mut sim),
        }
        if client.is_finished() {
            break;
        }
    }

    let (sent, dropped) = (sim.network().sent(), sim.network().dropped());
    Report::from_records(Strategy::Sst.label(), &client.into_records())
        .with_link_counters(sent, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::{WebObject, WebPage};

    fn small_workload() -> Workload {
        let page = |sizes: &[u32]| WebPage {
            objects: sizes
                .iter()
                .enumerate()
                .map(|(idx, &size)| WebObject {
                    url: format!("/obj{idx}"),
                    size,
                    primary: idx == 0,
                })
                .collect(),
        };
        Workload::from_pages(vec![page(&[2048, 512, 512]), page(&[1024])])
    }

    fn scenario(strategy: Strategy, loss: f64) -> Scenario {
        Scenario {
            loss_rate: loss,
            strategy,
            ..Scenario::default()
        }
    }

    #[test]
    fn test_sst_run_completes_all_requests_lossless() {
        let report = run(&scenario(Strategy::Sst, 0.0), &small_workload()).unwrap();

        assert_eq!(report.total_requests, 4);
        assert_eq!(report.completed_requests, 4);
        assert_eq!(report.completed_pages(), 2);
        assert!(report.avg_page_time().unwrap() > Duration::ZERO);
        assert!(report.datagrams_sent > 0);
        assert_eq!(report.datagrams_dropped, 0);
    }

    #[test]
    fn test_sst_run_recovers_under_loss() {
        // 10% loss: retransmission keeps every transfer alive.
        let report = run(&scenario(Strategy::Sst, 0.1), &small_workload()).unwrap();

        assert_eq!(report.completed_requests, 4);
        assert!(report.datagrams_dropped > 0);
    }

    #[test]
    fn test_sst_deterministic_per_seed() {
        let a = run(&scenario(Strategy::Sst, 0.2), &small_workload()).unwrap();
        let b = run(&scenario(Strategy::Sst, 0.2), &small_workload()).unwrap();
        assert_eq!(a.avg_page_time(), b.avg_page_time());
        assert_eq!(a.datagrams_sent, b.datagrams_sent);
    }

    #[test]
    fn test_every_strategy_produces_a_report() {
        for strategy in Strategy::ALL {
            let report = run(&scenario(strategy, 0.0), &small_workload()).unwrap();
            assert_eq!(report.total_requests, 4, "{}", strategy.label());
            assert_eq!(report.completed_pages(), 2, "{}", strategy.label());
        }
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("sst".parse::<Strategy>().unwrap(), Strategy::Sst);
        assert_eq!("Serial".parse::<Strategy>().unwrap(), Strategy::Serial);
        assert!("quic".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_scenario_file_round_trip() {
        let scenario = scenario(Strategy::Pipelined, 0.05);
        let file = ScenarioFile::from_scenario(&scenario);
        let text = toml::to_string_pretty(&file).unwrap();
        let parsed: ScenarioFile = toml::from_str(&text).unwrap();
        let restored = parsed.to_scenario().unwrap();

        assert_eq!(restored.strategy, Strategy::Pipelined);
        assert_eq!(restored.bandwidth_bps, scenario.bandwidth_bps);
        assert!((restored.loss_rate - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validation() {
        let mut bad = Scenario::default();
        bad.loss_rate = 1.5;
        assert!(bad.validate().is_err());
        bad.loss_rate = 0.0;
        bad.bandwidth_bps = 0;
        assert!(bad.validate().is_err());
    }
}
