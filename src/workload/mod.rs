//! Web workload: traced or synthetic page sets.
//!
//! A workload is a sequence of pages; each page is a primary object (the
//! HTML) plus zero or more embedded objects fetched only after the primary
//! completes.
//!
//! Two sources:
//!
//! - **Trace files**: CSV rows `url,size,isPrimary,requestTime,responseTime`
//!   with `# End of Page` comment lines separating pages.
//! - **Synthetic**: log-normally distributed object sizes with a small
//!   random embedded-object count per page, generated from a fixed seed
//!   for reproducibility.

use std::fs;
use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, LogNormal, Poisson};

use crate::error::{Error, Result};

/// Size fallback when a trace row carries an unparsable size.
const DEFAULT_OBJECT_SIZE: u32 = 1024;

/// Default seed for synthetic generation.
pub const SYNTHETIC_SEED: u64 = 12345;

/// Pages generated when no trace is supplied.
pub const SYNTHETIC_PAGE_COUNT: usize = 100;

/// One fetchable object.
#[derive(Debug, Clone)]
pub struct WebObject {
    /// Request path (or raw trace URL)
    pub url: String,
    /// Response body size in bytes
    pub size: u32,
    /// Whether this is the page's primary object
    pub primary: bool,
}

/// One page: a primary object plus embedded objects.
#[derive(Debug, Clone, Default)]
pub struct WebPage {
    /// Objects making up the page
    pub objects: Vec<WebObject>,
}

impl WebPage {
    /// Sum of all object sizes.
    pub fn total_size(&self) -> u64 {
        self.objects.iter().map(|o| o.size as u64).sum()
    }

    /// Number of objects, primary included.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Index of the primary object, if any.
    pub fn primary_index(&self) -> Option<usize> {
        self.objects.iter().position(|o| o.primary)
    }
}

/// A set of pages to fetch, in order.
#[derive(Debug, Clone, Default)]
pub struct Workload {
    pages: Vec<WebPage>,
}

impl Workload {
    /// Build a workload directly from pages.
    pub fn from_pages(pages: Vec<WebPage>) -> Self {
        Workload { pages }
    }

    /// Load and parse a trace file.
    pub fn from_trace_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let workload = Self::parse_trace(&text);
        if workload.is_empty() {
            return Err(Error::trace(format!(
                "no pages in trace file {}",
                path.as_ref().display()
            )));
        }
        tracing::info!(
            pages = workload.len(),
            path = %path.as_ref().display(),
            "trace loaded"
        );
        Ok(workload)
    }

    /// Parse trace text. Malformed rows are skipped; malformed sizes fall
    /// back to 1024 bytes.
    pub fn parse_trace(text: &str) -> Self {
        let mut pages = Vec::new();
        let mut current = WebPage::default();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                if line.contains("End of Page") && !current.objects.is_empty() {
                    pages.push(std::mem::take(&mut current));
                }
                continue;
            }

            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() < 5 {
                tracing::warn!(line, "skipping malformed trace row");
                continue;
            }

            let size = fields[1].trim().parse().unwrap_or_else(|_| {
                tracing::warn!(value = fields[1], "bad size in trace row");
                DEFAULT_OBJECT_SIZE
            });
            let primary = matches!(fields[2].trim(), "1" | "true");

            current.objects.push(WebObject {
                url: fields[0].trim().to_owned(),
                size,
                primary,
            });
        }

        if !current.objects.is_empty() {
            pages.push(current);
        }

        Workload { pages }
    }

    /// Generate a synthetic workload: log-normal object sizes matching the
    /// trace statistics (primary mean ~10 KB, embedded mean ~1 KB), a
    /// handful of embedded objects per page.
    pub fn synthetic(seed: u64, page_count: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);

        // Distribution parameters are valid constants; construction cannot
        // fail for them.
        let primary_size = LogNormal::new(9.0, 1.0).expect("valid lognormal");
        let embedded_size = LogNormal::new(6.5, 0.8).expect("valid lognormal");
        let embedded_count = Poisson::new(4.7).expect("valid poisson");

        let mut pages = Vec::with_capacity(page_count);
        for page_idx in 0..page_count {
            let mut page = WebPage::default();
            page.objects.push(WebObject {
                url: format!("/page{page_idx}.html"),
                size: (primary_size.sample(&mut rng) as u32).max(1),
                primary: true,
            });

            let count = embedded_count.sample(&mut rng) as usize;
            for obj_idx in 0..count {
                page.objects.push(WebObject {
                    url: format!("/page{page_idx}/obj{obj_idx}"),
                    size: (embedded_size.sample(&mut rng) as u32).max(1),
                    primary: false,
                });
            }
            pages.push(page);
        }

        tracing::info!(pages = pages.len(), seed, "synthetic workload generated");
        Workload { pages }
    }

    /// The pages, in fetch order.
    pub fn pages(&self) -> &[WebPage] {
        &self.pages
    }

    /// Number of pages.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Whether the workload holds no pages.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Keep only the first `max_pages` pages (0 keeps everything).
    pub fn truncate(&mut self, max_pages: usize) {
        if max_pages > 0 && self.pages.len() > max_pages {
            tracing::info!(max_pages, total = self.pages.len(), "limiting workload");
            self.pages.truncate(max_pages);
        }
    }
}
