use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use maplabel_core::label::{FeatureGeometry, FeatureId, LabelRequest, PlacementState, RequestId};
use maplabel_core::symbol::PointSymbol;
use tracing::{debug, info, warn};

use crate::command::ValidationFinding;
use crate::context::{ExecutionContext, PlacementOptions, PlacementWorkspace};
use crate::errors::EngineError;
use crate::index::{SpatialIndex, feature_obstacles};
use crate::metrics::TextMetrics;
use crate::placement::place_with_leader;
use crate::runner::SequenceRunner;
use crate::sequence::ExecutionSequence;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelingOptions {
    /// 整次运行的时间上限，只在两个请求之间检查。
    pub time_limit: Option<Duration>,
    pub process_deferred_leaders: bool,
}

impl Default for LabelingOptions {
    fn default() -> Self {
        Self {
            time_limit: None,
            process_deferred_leaders: true,
        }
    }
}

/// 一次注记运行的结果统计。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LabelingSummary {
    pub total: usize,
    pub placed: usize,
    pub placed_with_leader: usize,
    pub forced: usize,
    pub suppressed: usize,
    pub deferred: usize,
    pub unplaced: usize,
    pub errors: usize,
    pub interrupted: bool,
    pub timed_out: bool,
}

impl LabelingSummary {
    fn tally(&mut self, state: PlacementState) {
        match state {
            PlacementState::Placed => self.placed += 1,
            PlacementState::PlacedWithLeader => self.placed_with_leader += 1,
            PlacementState::Forced | PlacementState::ForcedWithLeader => self.forced += 1,
            PlacementState::Suppressed => self.suppressed += 1,
            PlacementState::LeaderDeferred => self.deferred += 1,
            PlacementState::Unplaced => self.unplaced += 1,
        }
    }
}

/// 地图级驱动：持有注记类的指令序列与全部注记请求，按优先级逐个放置。
pub struct LabelMap {
    classes: BTreeMap<String, ExecutionSequence>,
    requests: Vec<LabelRequest>,
    obstacles: HashSet<FeatureId>,
    workspace: PlacementWorkspace,
    options: LabelingOptions,
    interrupt: Arc<AtomicBool>,
    next_request_id: u64,
}

impl LabelMap {
    pub fn new(placement: PlacementOptions, options: LabelingOptions) -> Self {
        Self::with_workspace(PlacementWorkspace::new(placement), options)
    }

    pub fn with_collaborators(
        index: Box<dyn SpatialIndex>,
        metrics: Box<dyn TextMetrics>,
        placement: PlacementOptions,
        options: LabelingOptions,
    ) -> Self {
        Self::with_workspace(
            PlacementWorkspace::with_collaborators(index, metrics, placement),
            options,
        )
    }

    fn with_workspace(workspace: PlacementWorkspace, options: LabelingOptions) -> Self {
        Self {
            classes: BTreeMap::new(),
            requests: Vec::new(),
            obstacles: HashSet::new(),
            workspace,
            options,
            interrupt: Arc::new(AtomicBool::new(false)),
            next_request_id: 1,
        }
    }

    /// 定义（或替换）一个注记类的指令序列。
    pub fn define_class(&mut self, name: impl Into<String>, sequence: ExecutionSequence) {
        let name = name.into();
        debug!(class = %name, commands = sequence.len(), "定义注记类");
        self.classes.insert(name, sequence);
    }

    pub fn class(&self, name: &str) -> Option<&ExecutionSequence> {
        self.classes.get(name)
    }

    pub fn class_mut(&mut self, name: &str) -> Option<&mut ExecutionSequence> {
        self.classes.get_mut(name)
    }

    /// 登记不带注记的障碍要素，同一要素只登记一次。
    pub fn add_obstacle(
        &mut self,
        feature: FeatureId,
        geometry: &FeatureGeometry,
        symbol: Option<&PointSymbol>,
    ) -> Result<(), EngineError> {
        if self.obstacles.contains(&feature) {
            return Ok(());
        }
        for entry in feature_obstacles(feature, geometry, symbol)? {
            self.workspace.index.insert(entry);
        }
        self.obstacles.insert(feature);
        Ok(())
    }

    /// 以新分配的编号构造注记请求，并把其要素登记为障碍。
    pub fn add_request<F>(&mut self, build: F) -> Result<RequestId, EngineError>
    where
        F: FnOnce(RequestId) -> LabelRequest,
    {
        let id = RequestId::new(self.next_request_id);
        let request = build(id);
        self.add_obstacle(request.feature(), &request.geometry, request.symbol.as_ref())?;
        self.next_request_id += 1;
        self.requests.push(request);
        Ok(id)
    }

    pub fn requests(&self) -> &[LabelRequest] {
        &self.requests
    }

    pub fn request(&self, id: RequestId) -> Option<&LabelRequest> {
        self.requests.iter().find(|request| request.id() == id)
    }

    pub fn request_mut(&mut self, id: RequestId) -> Option<&mut LabelRequest> {
        self.requests.iter_mut().find(|request| request.id() == id)
    }

    /// 可跨线程设置的中断标志；驱动在两个请求之间检查。
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    pub fn workspace(&self) -> &PlacementWorkspace {
        &self.workspace
    }

    /// 按各注记类实际服务的要素类型校验序列。
    pub fn validate(&self) -> Vec<(String, ValidationFinding)> {
        let mut served: BTreeMap<&str, BTreeSet<_>> = BTreeMap::new();
        for request in &self.requests {
            served
                .entry(request.label_class())
                .or_default()
                .insert(request.feature_type());
        }

        let mut findings = Vec::new();
        for (class, feature_types) in served {
            let Some(sequence) = self.classes.get(class) else {
                continue;
            };
            for feature_type in feature_types {
                findings.extend(
                    sequence
                        .validate(feature_type)
                        .into_iter()
                        .map(|finding| (class.to_string(), finding)),
                );
            }
        }
        findings
    }

    /// 清空上一次的结果后，按优先级从高到低放置全部请求。
    pub fn label(&mut self) -> LabelingSummary {
        let started = Instant::now();
        let mut summary = LabelingSummary {
            total: self.requests.len(),
            ..LabelingSummary::default()
        };

        for request in &mut self.requests {
            self.workspace.index.remove_label(request.id());
            request.reset();
        }
        self.workspace.take_deferred();

        let mut order: Vec<usize> = (0..self.requests.len()).collect();
        order.sort_by_key(|&index| Reverse(self.requests[index].priority));

        for index in order {
            if self.interrupt.load(Ordering::Relaxed) {
                warn!("注记运行被中断");
                summary.interrupted = true;
                break;
            }
            if let Some(limit) = self.options.time_limit {
                if started.elapsed() >= limit {
                    warn!(limit_ms = limit.as_millis() as u64, "注记运行超时");
                    summary.timed_out = true;
                    break;
                }
            }

            let request = &mut self.requests[index];
            let Some(sequence) = self.classes.get(request.label_class()) else {
                warn!(
                    request = request.id().get(),
                    class = request.label_class(),
                    "注记类未定义，抑制该注记"
                );
                request.set_state(PlacementState::Suppressed);
                continue;
            };

            let mut ctx = ExecutionContext::new(&mut self.workspace, request);
            if let Err(err) = SequenceRunner::new(sequence).run(&mut ctx) {
                warn!(
                    request = ctx.request().id().get(),
                    error = %err,
                    "执行注记序列失败"
                );
                summary.errors += 1;
            }
        }

        if self.options.process_deferred_leaders && !summary.interrupted && !summary.timed_out {
            self.place_deferred_leaders();
        }

        for request in &self.requests {
            summary.tally(request.state());
        }
        info!(
            total = summary.total,
            placed = summary.placed,
            placed_with_leader = summary.placed_with_leader,
            forced = summary.forced,
            suppressed = summary.suppressed,
            deferred = summary.deferred,
            unplaced = summary.unplaced,
            errors = summary.errors,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "注记完成"
        );
        summary
    }

    fn place_deferred_leaders(&mut self) {
        for deferred in self.workspace.take_deferred() {
            let Some(request) = self
                .requests
                .iter_mut()
                .find(|request| request.id() == deferred.request)
            else {
                continue;
            };
            let mut ctx = ExecutionContext::new(&mut self.workspace, request);
            if !place_with_leader(&mut ctx, deferred.max_length, PlacementState::PlacedWithLeader) {
                ctx.request_mut().set_state(PlacementState::Suppressed);
                debug!(request = deferred.request.get(), "延后引线仍无处可放");
            }
        }
    }
}
