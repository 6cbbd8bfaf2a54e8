use futures::stream::{self, Stream, StreamExt};
use log::{info, warn};
use regex::bytes::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::analysis::{self, aggregator::Aggregator, report::{self, ReportOptions}};
use crate::capture::acquire::{CaptureAcquirer, Target};
use crate::capture::reader::PcapFileSource;
use crate::utils::error::{AppError, AppResult};
use crate::utils::resolve::HostResolver;

/// One unit of work: capture a target, or reprocess a saved file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    Capture(Target),
    Reprocess(PathBuf),
}

impl Job {
    /// Name printed in the report header and error messages
    pub fn label(&self) -> String {
        match self {
            Job::Capture(target) => target.label().to_string(),
            Job::Reprocess(path) => path.display().to_string(),
        }
    }
}

/// Outcome of one job, in the order jobs were submitted
pub struct JobOutcome {
    pub label: String,
    /// Rendered report, or `None` when nothing was analyzed (dry run)
    pub result: AppResult<Option<String>>,
}

/// Runs capture-and-analyze pipelines, several hosts at a time
pub struct CaptureManager {
    /// Absent when only reprocessing files
    acquirer: Option<CaptureAcquirer>,
    filter: Option<Regex>,
    options: ReportOptions,
    resolver: Option<HostResolver>,
    concurrency: usize,
}

impl CaptureManager {
    pub fn new(
        acquirer: Option<CaptureAcquirer>,
        filter: Option<Regex>,
        options: ReportOptions,
        resolver: Option<HostResolver>,
        concurrency: usize,
    ) -> Self {
        Self {
            acquirer,
            filter,
            options,
            resolver,
            concurrency: concurrency.max(1),
        }
    }

    /// Run every job; outcomes are yielded in submission order
    pub fn run_all(self: Arc<Self>, jobs: Vec<Job>) -> impl Stream<Item = JobOutcome> {
        let concurrency = self.concurrency;
        info!("Processing {} job(s), {} at a time", jobs.len(), concurrency);

        stream::iter(jobs)
            .map(move |job| {
                let manager = self.clone();
                async move {
                    let label = job.label();
                    let result = manager.run_job(job).await;
                    JobOutcome { label, result }
                }
            })
            .buffered(concurrency)
    }

    /// Acquire (if needed), analyze and render one job
    pub async fn run_job(&self, job: Job) -> AppResult<Option<String>> {
        let label = job.label();
        let path = match job {
            Job::Reprocess(path) => path,
            Job::Capture(target) => {
                let acquirer = self
                    .acquirer
                    .as_ref()
                    .ok_or_else(|| AppError::ConfigError("capture requested without an acquirer".to_string()))?;
                match acquirer.acquire(&target).await? {
                    Some(path) => path,
                    None => return Ok(None),
                }
            }
        };

        let filter = self.filter.clone();
        let options = self.options.clone();
        let resolver = self.resolver.clone();

        let report = tokio::task::spawn_blocking(move || -> AppResult<String> {
            let mut source = PcapFileSource::open(&path)?;
            let stats = analysis::analyze(&mut source, Aggregator::new(filter, options.sizes))?;
            if source.decode_errors() > 0 {
                warn!("{}: {} frame(s) could not be decoded", label, source.decode_errors());
            }

            let names = match &resolver {
                Some(resolver) => resolver.resolve_all(stats.per_host.sorted().into_iter().map(|(addr, _)| addr)),
                None => HashMap::new(),
            };
            Ok(report::render(&label, &stats, &options, &names))
        })
        .await
        .map_err(|e| AppError::IoError(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        Ok(Some(report))
    }
}
