use std::sync::Arc;

use jsplay_runtime::{JobId, JobTicket, OutputRecord};
use log::{debug, error, warn};
use tokio::sync::{mpsc, oneshot};

use crate::control::JobControl;
use crate::job::{check_syntax, run_job};
use crate::{JobReport, Result, SandboxConfig, SandboxError};

/// A snippet to run
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub source: String,
    pub ticket: JobTicket,
    /// Variables to read back once the body has run
    pub scope_names: Vec<String>,
}

impl JobRequest {
    pub fn new(source: impl Into<String>, ticket: JobTicket) -> Self {
        Self {
            source: source.into(),
            ticket,
            scope_names: vec![],
        }
    }

    #[must_use]
    pub fn with_scope_names(mut self, names: Vec<String>) -> Self {
        self.scope_names = names;
        self
    }
}

/// A submitted job.
///
/// `records` yields output while the job runs; `report` resolves once it has
/// ended. Records still buffered when the report arrives belong to the job
/// and should be drained.
#[derive(Debug)]
pub struct JobHandle {
    pub id: JobId,
    pub control: Arc<JobControl>,
    pub records: mpsc::UnboundedReceiver<OutputRecord>,
    pub report: oneshot::Receiver<Result<JobReport>>,
}

impl JobHandle {
    /// Waits for the job and returns every record it produced
    ///
    /// # Errors
    ///
    /// Fails if the executor could not run the job at all
    pub async fn collect(mut self) -> Result<(Vec<OutputRecord>, JobReport)> {
        let mut records = vec![];
        let report = loop {
            tokio::select! {
                Some(record) = self.records.recv() => records.push(record),
                report = &mut self.report => break report.map_err(|_| SandboxError::Dropped)??,
            }
        };
        while let Ok(record) = self.records.try_recv() {
            records.push(record);
        }
        Ok((records, report))
    }
}

enum Job {
    Run {
        request: JobRequest,
        control: Arc<JobControl>,
        sink: mpsc::UnboundedSender<OutputRecord>,
        response: oneshot::Sender<Result<JobReport>>,
    },
    CheckSyntax {
        source: String,
        response: oneshot::Sender<Result<Option<String>>>,
    },
}

/// Runs jobs on a dedicated thread
///
/// Jobs are processed one at a time in submission order; each gets its own
/// isolate. Cloning the executor shares the thread.
#[derive(Clone)]
pub struct SandboxExecutor {
    sender: mpsc::UnboundedSender<Job>,
    config: Arc<SandboxConfig>,
}

impl std::fmt::Debug for SandboxExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SandboxExecutor {
    pub fn new(config: SandboxConfig) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let config = Arc::new(config);
        let thread_config = Arc::clone(&config);

        let spawned = std::thread::Builder::new()
            .name("jsplay-sandbox".into())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!("failed to create sandbox runtime: {e}");
                        return;
                    }
                };

                rt.block_on(async move {
                    while let Some(job) = rx.recv().await {
                        match job {
                            Job::Run {
                                request,
                                control,
                                sink,
                                response,
                            } => {
                                let report = run_job(&thread_config, request, &control, sink).await;
                                // the caller may have stopped waiting
                                let _ = response.send(report);
                            }
                            Job::CheckSyntax { source, response } => {
                                let _ = response.send(check_syntax(&source).await);
                            }
                        }
                    }
                    debug!("sandbox executor shutting down");
                });
            });

        if let Err(e) = spawned {
            error!("failed to spawn sandbox thread: {e}");
        }

        Self { sender: tx, config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Submits a job and returns immediately
    ///
    /// # Errors
    ///
    /// Fails if the executor thread is gone
    pub fn execute(&self, request: JobRequest) -> Result<JobHandle> {
        let (sink, records) = mpsc::unbounded_channel();
        let (response, report) = oneshot::channel();
        let control = Arc::new(JobControl::new(request.ticket.clone()));
        let id = request.ticket.id();

        debug!("submitting job {id} ({} bytes)", request.source.len());
        self.sender
            .send(Job::Run {
                request,
                control: Arc::clone(&control),
                sink,
                response,
            })
            .map_err(|_| {
                warn!("job {id} submitted to a stopped executor");
                SandboxError::Unavailable
            })?;

        Ok(JobHandle {
            id,
            control,
            records,
            report,
        })
    }

    /// Compiles `source` without running it.
    ///
    /// Returns the syntax error message, or `None` if the source compiles.
    ///
    /// # Errors
    ///
    /// Fails if the executor thread is gone
    pub async fn check_syntax(&self, source: &str) -> Result<Option<String>> {
        let (response, rx) = oneshot::channel();
        self.sender
            .send(Job::CheckSyntax {
                source: source.to_string(),
                response,
            })
            .map_err(|_| SandboxError::Unavailable)?;
        rx.await.map_err(|_| SandboxError::Dropped)?
    }
}
