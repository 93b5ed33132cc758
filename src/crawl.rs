//! Breadth-first expansion of a root report into the full report tree.
//!
//! Every navigable record (a link that is not an in-page anchor) is fetched
//! as a child page, attached to the record, and its own navigable records are
//! queued in turn. Failed pages are recorded and skipped; they never stop the
//! crawl.
//!
//! Records are addressed by their index path from the root (`[2, 0, 5]` is
//! record 5 of the child of record 0 of the child of root record 2), so the
//! queue holds no references into the tree while it is being mutated.
//!
//! A page linked from several branches is fetched once per linking record,
//! so every record gets its own child. A link is only refused when it leads
//! back to a page on its own path from the root.

use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::assemble::ColumnLayout;
use crate::error::{CovcrawlError, Result};
use crate::fetch::Fetch;
use crate::model::{Record, Report};
use crate::page;

/// Page name that marks a directory listing; its children resolve against
/// the containing directory.
pub const INDEX_PAGE: &str = "index.html";

/// Crawl configuration.
#[derive(Debug, Clone, Default)]
pub struct CrawlOptions {
    pub layout: ColumnLayout,
    /// Stop queueing fetches once this much time has passed.
    pub deadline: Option<Duration>,
    /// Stop after this many child page fetches (successful or not).
    pub max_pages: Option<usize>,
}

/// A child page that could not be fetched or parsed.
#[derive(Debug)]
pub struct CrawlFailure {
    pub url: String,
    pub error: CovcrawlError,
}

/// Outcome of a crawl. The tree itself is the mutated root report.
#[derive(Debug, Default)]
pub struct CrawlSummary {
    /// Child pages fetched and attached.
    pub pages: usize,
    pub failures: Vec<CrawlFailure>,
    /// Links not followed because they point back at a page on their own
    /// path from the root.
    pub skipped: usize,
    /// Queued links left unvisited when the deadline or page bound hit.
    pub abandoned: usize,
}

impl CrawlSummary {
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.abandoned == 0
    }
}

/// Normalized URLs from the root page down to one page, innermost last.
struct Chain {
    url: String,
    parent: Option<Rc<Chain>>,
}

impl Chain {
    fn contains(&self, url: &str) -> bool {
        let mut link = Some(self);
        while let Some(chain) = link {
            if chain.url == url {
                return true;
            }
            link = chain.parent.as_deref();
        }
        false
    }
}

struct Job {
    url: String,
    path: Vec<usize>,
    chain: Rc<Chain>,
}

/// Breadth-first report crawler.
pub struct Crawler<'a> {
    fetcher: &'a dyn Fetch,
    options: CrawlOptions,
}

impl<'a> Crawler<'a> {
    pub fn new(fetcher: &'a dyn Fetch) -> Self {
        Self::with_options(fetcher, CrawlOptions::default())
    }

    pub fn with_options(fetcher: &'a dyn Fetch, options: CrawlOptions) -> Self {
        Self { fetcher, options }
    }

    /// Expand `root`, whose records' links are relative to `base_url`.
    pub fn crawl(&self, root: &mut Report, base_url: &str) -> CrawlSummary {
        let root_url = join(base_url.trim_end_matches('/'), INDEX_PAGE);
        self.run(root, base_url, &root_url)
    }

    /// Expand `root`, which was fetched from `root_url`.
    pub fn crawl_from(&self, root: &mut Report, root_url: &str) -> CrawlSummary {
        self.run(root, &root_base(root_url), root_url)
    }

    fn run(&self, root: &mut Report, base_url: &str, root_url: &str) -> CrawlSummary {
        let started = Instant::now();
        let mut summary = CrawlSummary::default();
        let mut queue: VecDeque<Job> = VecDeque::new();
        let root_chain = Rc::new(Chain {
            url: normalize_url(root_url),
            parent: None,
        });

        let base = base_url.trim_end_matches('/');
        for (index, record) in root.records.iter().enumerate() {
            if let Some(href) = navigable_href(record) {
                let url = join(base, href);
                enqueue(&mut queue, &root_chain, &mut summary, url, vec![index]);
            }
        }

        let mut attempts = 0usize;
        while let Some(job) = queue.pop_front() {
            if let Some(reason) = self.budget_exhausted(started, attempts) {
                summary.abandoned = queue.len() + 1;
                tracing::warn!(abandoned = summary.abandoned, "stopping crawl: {}", reason);
                break;
            }
            attempts += 1;

            let child = match page::fetch_report(self.fetcher, &job.url, &self.options.layout) {
                Ok(child) => child,
                Err(error) => {
                    if error.is_page_structural() {
                        tracing::warn!(url = %job.url, error = %error, "skipping malformed page");
                    } else {
                        tracing::warn!(url = %job.url, error = %error, "failed to fetch page");
                    }
                    summary.failures.push(CrawlFailure {
                        url: job.url,
                        error,
                    });
                    continue;
                }
            };

            let next_base = next_base_url(&job.url);
            let links: Vec<(usize, String)> = child
                .records
                .iter()
                .enumerate()
                .filter_map(|(index, r)| navigable_href(r).map(|href| (index, href.to_string())))
                .collect();

            let Some(record) = record_at_mut(root, &job.path) else {
                continue;
            };
            record.child = Some(Box::new(child));
            summary.pages += 1;

            for (index, href) in links {
                let mut path = job.path.clone();
                path.push(index);
                let url = format!("{}{}", next_base, href);
                enqueue(&mut queue, &job.chain, &mut summary, url, path);
            }
        }

        tracing::info!(
            pages = summary.pages,
            failures = summary.failure_count(),
            skipped = summary.skipped,
            abandoned = summary.abandoned,
            "crawl finished"
        );
        summary
    }

    fn budget_exhausted(&self, started: Instant, attempts: usize) -> Option<&'static str> {
        if self
            .options
            .deadline
            .is_some_and(|deadline| started.elapsed() >= deadline)
        {
            return Some("deadline reached");
        }
        if self.options.max_pages.is_some_and(|max| attempts >= max) {
            return Some("page limit reached");
        }
        None
    }
}

fn enqueue(
    queue: &mut VecDeque<Job>,
    parent: &Rc<Chain>,
    summary: &mut CrawlSummary,
    url: String,
    path: Vec<usize>,
) {
    let url = normalize_url(&url);
    if parent.contains(&url) {
        tracing::debug!(url = %url, "link leads back to an ancestor page");
        summary.skipped += 1;
        return;
    }
    let chain = Rc::new(Chain {
        url: url.clone(),
        parent: Some(Rc::clone(parent)),
    });
    queue.push_back(Job { url, path, chain });
}

fn navigable_href(record: &Record) -> Option<&str> {
    if record.is_navigable() {
        record.href.as_deref()
    } else {
        None
    }
}

/// Fetch the root page at `location`, then crawl everything below it.
///
/// `location` may name the root page itself (`.../index.html`) or the
/// directory that holds it.
pub fn crawl_location(
    fetcher: &dyn Fetch,
    location: &str,
    options: CrawlOptions,
) -> Result<(Report, CrawlSummary)> {
    let root_url = root_page_url(location);
    let mut root = page::fetch_report(fetcher, &root_url, &options.layout)?;
    let summary = Crawler::with_options(fetcher, options).crawl_from(&mut root, &root_url);
    Ok((root, summary))
}

/// URL of the root page for a report location.
pub fn root_page_url(location: &str) -> String {
    if is_page(location) {
        location.to_string()
    } else {
        join(location.trim_end_matches('/'), INDEX_PAGE)
    }
}

/// Base URL for the root page's links: its containing directory.
pub fn root_base(root_url: &str) -> String {
    if is_page(root_url) {
        match root_url.rfind('/') {
            Some(pos) => root_url[..pos].to_string(),
            None => String::new(),
        }
    } else {
        root_url.trim_end_matches('/').to_string()
    }
}

/// Base for the links found on the page at `url`: the containing directory
/// (with trailing slash) for index pages, otherwise the URL itself.
pub fn next_base_url(url: &str) -> String {
    match url.strip_suffix(INDEX_PAGE) {
        Some(dir) if dir.is_empty() || dir.ends_with('/') => dir.to_string(),
        _ => url.to_string(),
    }
}

fn is_page(location: &str) -> bool {
    let lower = location.to_ascii_lowercase();
    lower.ends_with(".html") || lower.ends_with(".htm")
}

fn join(base: &str, href: &str) -> String {
    if base.is_empty() {
        href.to_string()
    } else {
        format!("{}/{}", base, href)
    }
}

/// Resolve `.` and `..` path segments so that a link leading back up the
/// tree is recognized as an ancestor page.
pub fn normalize_url(url: &str) -> String {
    let (prefix, path) = match url.find("://") {
        Some(scheme_end) => {
            let authority = scheme_end + 3;
            match url[authority..].find('/') {
                Some(slash) => url.split_at(authority + slash),
                None => return url.to_string(),
            }
        }
        None => ("", url),
    };
    if !path.split('/').any(|s| s == "." || s == "..") {
        return url.to_string();
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "." => {}
            ".." => match segments.last() {
                None | Some(&"..") => segments.push(".."),
                // Already at the root of an absolute path.
                Some(&"") if segments.len() == 1 => {}
                Some(_) => {
                    segments.pop();
                }
            },
            _ => segments.push(segment),
        }
    }
    format!("{}{}", prefix, segments.join("/"))
}

/// The record at `path`, descending through attached child reports.
pub fn record_at_mut<'r>(root: &'r mut Report, path: &[usize]) -> Option<&'r mut Record> {
    let (&first, rest) = path.split_first()?;
    let mut record = root.records.get_mut(first)?;
    for &index in rest {
        record = record.child.as_deref_mut()?.records.get_mut(index)?;
    }
    Some(record)
}
