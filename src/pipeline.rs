use std::collections::BTreeMap;
use std::future::Future;
use std::time::{Duration, Instant};

use tracing::Instrument;

use crate::config::{StageTimeout, StageTimeouts};
use crate::error::{CollaboratorError, PipelineError, Stage};
use crate::models::{Detection, summarize_groups};
use crate::service::contract::{
    DetectRequest, EncodedImage, GroupRequest, ProcessResponse, VisualizeRequest,
};
use crate::service::{DetectStage, GroupStage, VisualizeStage};

/// Where one pipeline run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Detecting,
    Grouping,
    Visualizing,
    Done,
    Failed,
}

/// What the stage that just ran reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Input accepted, start the run
    Start,
    /// Detection finished with this many products
    Detected { count: usize },
    Grouped,
    Visualized,
    /// The current stage failed (or the input was rejected)
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    /// Next state after `outcome`. Defined for every pair: terminal states
    /// absorb everything, and an outcome that does not belong to the current
    /// state fails the run.
    pub fn advance(self, outcome: StageOutcome) -> PipelineState {
        use PipelineState::*;
        match (self, outcome) {
            (Done, _) => Done,
            (Failed, _) => Failed,
            (Idle, StageOutcome::Start) => Detecting,
            (Detecting, StageOutcome::Detected { count }) if count > 0 => Grouping,
            (Grouping, StageOutcome::Grouped) => Visualizing,
            (Visualizing, StageOutcome::Visualized) => Done,
            _ => Failed,
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Reference to the rendered artifact, as returned by visualization
    pub result_image: String,
    pub products_count: usize,
    pub groups_count: usize,
    /// Wall-clock seconds for the whole run, rounded to two decimals
    pub processing_time: f64,
    /// Group id to member count
    pub groups: BTreeMap<usize, usize>,
    pub detections: Vec<Detection>,
}

/// A finished run: the outcome plus every state it passed through.
#[derive(Debug)]
pub struct PipelineReport {
    pub outcome: Result<RunSummary, PipelineError>,
    pub trace: Vec<PipelineState>,
}

impl PipelineReport {
    pub fn final_state(&self) -> PipelineState {
        self.trace.last().copied().unwrap_or(PipelineState::Idle)
    }
}

impl From<Result<RunSummary, PipelineError>> for ProcessResponse {
    fn from(outcome: Result<RunSummary, PipelineError>) -> Self {
        match outcome {
            Ok(summary) => ProcessResponse {
                success: true,
                result_image: Some(summary.result_image),
                products_count: Some(summary.products_count),
                groups_count: Some(summary.groups_count),
                processing_time: Some(summary.processing_time),
                groups: Some(summary.groups),
                detections: Some(summary.detections),
                error: None,
            },
            Err(e) => ProcessResponse {
                success: false,
                error: Some(e.to_string()),
                ..Default::default()
            },
        }
    }
}

struct StateTrace {
    trace: Vec<PipelineState>,
}

impl StateTrace {
    fn new() -> Self {
        Self {
            trace: vec![PipelineState::Idle],
        }
    }

    fn current(&self) -> PipelineState {
        self.trace.last().copied().unwrap_or(PipelineState::Idle)
    }

    fn record(&mut self, outcome: StageOutcome) -> PipelineState {
        let next = self.current().advance(outcome);
        tracing::debug!("{:?} -> {:?}", self.current(), next);
        self.trace.push(next);
        next
    }
}

/// Drives detection, grouping and visualization for one image at a time.
///
/// Stages run strictly in order and the first failure ends the run; later
/// stages are never called. Separate runs share nothing mutable, so one
/// orchestrator can serve concurrent requests.
pub struct Orchestrator<D, G, V> {
    detect: D,
    group: G,
    visualize: V,
    timeouts: StageTimeouts,
}

impl<D, G, V> Orchestrator<D, G, V>
where
    D: DetectStage,
    G: GroupStage,
    V: VisualizeStage,
{
    pub fn new(detect: D, group: G, visualize: V, timeouts: StageTimeouts) -> Self {
        Self {
            detect,
            group,
            visualize,
            timeouts,
        }
    }

    /// Run the pipeline and flatten the outcome into the top-level response.
    pub async fn process(&self, image_bytes: Vec<u8>) -> ProcessResponse {
        self.run(image_bytes).await.outcome.into()
    }

    /// Run the pipeline on one encoded image.
    pub async fn run(&self, image_bytes: Vec<u8>) -> PipelineReport {
        let run_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("pipeline", run = %run_id);
        async move {
            let mut states = StateTrace::new();
            let outcome = self.execute(image_bytes, &mut states).await;
            match &outcome {
                Ok(summary) => tracing::info!(
                    "finished: {} products in {} groups ({:.2}s)",
                    summary.products_count,
                    summary.groups_count,
                    summary.processing_time
                ),
                Err(e) => tracing::error!("failed: {e}"),
            }
            PipelineReport {
                outcome,
                trace: states.trace,
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        image_bytes: Vec<u8>,
        states: &mut StateTrace,
    ) -> Result<RunSummary, PipelineError> {
        let started = Instant::now();

        if let Err(e) = image::load_from_memory(&image_bytes) {
            states.record(StageOutcome::Failed);
            return Err(PipelineError::InvalidImage(e.to_string()));
        }
        let image = EncodedImage::new(image_bytes);
        states.record(StageOutcome::Start);

        tracing::info!("step 1: detecting products");
        let request = DetectRequest {
            image: image.clone(),
        };
        let detections = match bounded(
            Stage::Detection,
            self.timeouts.detect,
            self.detect.detect(request),
        )
        .await
        {
            Ok(detections) => detections,
            Err(e) => {
                states.record(StageOutcome::Failed);
                return Err(e);
            }
        };
        if states.record(StageOutcome::Detected {
            count: detections.len(),
        }) == PipelineState::Failed
        {
            return Err(PipelineError::NoDetections);
        }

        tracing::info!("step 2: grouping {} products", detections.len());
        let expected = detections.len();
        let request = GroupRequest {
            image: image.clone(),
            detections,
        };
        let grouped = bounded(Stage::Grouping, self.timeouts.group, self.group.group(request))
            .await
            .and_then(|grouped| check_grouped(grouped, expected));
        let grouped = match grouped {
            Ok(grouped) => grouped,
            Err(e) => {
                states.record(StageOutcome::Failed);
                return Err(e);
            }
        };
        states.record(StageOutcome::Grouped);

        tracing::info!("step 3: creating visualization");
        let request = VisualizeRequest {
            image,
            detections: grouped.clone(),
        };
        let result_image = match bounded(
            Stage::Visualization,
            self.timeouts.visualize,
            self.visualize.visualize(request),
        )
        .await
        {
            Ok(result_image) => result_image,
            Err(e) => {
                states.record(StageOutcome::Failed);
                return Err(e);
            }
        };
        states.record(StageOutcome::Visualized);

        let groups: BTreeMap<usize, usize> = summarize_groups(&grouped)
            .into_iter()
            .map(|g| (g.group_id, g.member_count))
            .collect();

        Ok(RunSummary {
            result_image,
            products_count: grouped.len(),
            groups_count: groups.len(),
            processing_time: round_secs(started.elapsed()),
            groups,
            detections: grouped,
        })
    }

    /// Probe all three collaborators concurrently.
    pub async fn health(&self) -> BTreeMap<String, bool> {
        let budget = self.timeouts.health.total();
        let (detect, group, visualize) = tokio::join!(
            probe(budget, self.detect.healthy()),
            probe(budget, self.group.healthy()),
            probe(budget, self.visualize.healthy()),
        );
        BTreeMap::from([
            ("detection".to_string(), detect),
            ("grouping".to_string(), group),
            ("visualization".to_string(), visualize),
        ])
    }
}

/// Await a stage call within the stage's total budget.
async fn bounded<T>(
    stage: Stage,
    timeout: StageTimeout,
    call: impl Future<Output = Result<T, CollaboratorError>>,
) -> Result<T, PipelineError> {
    let budget = timeout.total();
    match tokio::time::timeout(budget, call).await {
        Ok(result) => result.map_err(|e| PipelineError::from_collaborator(stage, e)),
        Err(_) => Err(PipelineError::CollaboratorUnavailable {
            stage,
            detail: format!("no reply within {}s", budget.as_secs_f64()),
        }),
    }
}

async fn probe(budget: Duration, check: impl Future<Output = bool>) -> bool {
    tokio::time::timeout(budget, check).await.unwrap_or(false)
}

/// Grouping must hand back every detection, each with a group assigned.
fn check_grouped(grouped: Vec<Detection>, expected: usize) -> Result<Vec<Detection>, PipelineError> {
    if grouped.len() != expected {
        return Err(PipelineError::CollaboratorRejected {
            stage: Stage::Grouping,
            message: format!("expected {expected} grouped detections, got {}", grouped.len()),
        });
    }
    if let Some(i) = grouped.iter().position(|d| !d.is_grouped()) {
        return Err(PipelineError::CollaboratorRejected {
            stage: Stage::Grouping,
            message: format!("detection {i} has no group assigned"),
        });
    }
    Ok(grouped)
}

fn round_secs(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100.0).round() / 100.0
}
