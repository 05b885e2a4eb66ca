use maplabel_core::geometry::{Bounds2D, Vector2};
use maplabel_core::label::{
    BufferType, LabelRequest, LeaderLine, Placement, PlacementState, RequestId,
};
use tracing::debug;

use crate::index::{BoundsIndex, IndexEntry, IndexKey, ObstacleKind, SpatialIndex};
use crate::metrics::{FixedAdvanceMetrics, TextMetrics};
use crate::placement::Candidate;
use crate::sequence::CommandId;

/// 当前生效的约束放宽项，由放宽类循环指令临时打开。
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Relaxations {
    pub offset: bool,
    /// 允许超出线端的长度，占注记长度的百分比。
    pub overhang: Option<f64>,
    pub overline: bool,
    pub overregion: bool,
    pub bump: bool,
}

impl Relaxations {
    /// 点偏移的倍数序列；放宽后改试 2 倍与 3 倍偏移。
    pub fn offset_factors(&self) -> &'static [f64] {
        if self.offset { &[2.0, 3.0] } else { &[1.0] }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementOptions {
    /// 注记与锚点之间的间距（地图单位）。
    pub point_offset: f64,
    /// 沿线搜索步长，占注记宽度的比例。
    pub line_search_step: f64,
    pub leader_max_length: f64,
    pub leader_step: f64,
    pub symbol_gap: f64,
    /// 面内部搜索网格每边的格数。
    pub area_grid: usize,
    pub min_font_size: f64,
}

impl Default for PlacementOptions {
    fn default() -> Self {
        Self {
            point_offset: 1.0,
            line_search_step: 0.25,
            leader_max_length: 30.0,
            leader_step: 5.0,
            symbol_gap: 0.5,
            area_grid: 5,
            min_font_size: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeferredLeader {
    pub request: RequestId,
    pub max_length: Option<f64>,
}

/// 一次注记运行中所有请求共享的放置环境。
pub struct PlacementWorkspace {
    pub index: Box<dyn SpatialIndex>,
    pub metrics: Box<dyn TextMetrics>,
    pub options: PlacementOptions,
    deferred: Vec<DeferredLeader>,
}

impl PlacementWorkspace {
    pub fn new(options: PlacementOptions) -> Self {
        Self::with_collaborators(
            Box::new(BoundsIndex::new()),
            Box::new(FixedAdvanceMetrics::default()),
            options,
        )
    }

    pub fn with_collaborators(
        index: Box<dyn SpatialIndex>,
        metrics: Box<dyn TextMetrics>,
        options: PlacementOptions,
    ) -> Self {
        Self {
            index,
            metrics,
            options,
            deferred: Vec::new(),
        }
    }

    /// 登记延后引线请求，同一请求只保留最后一次登记。
    pub fn defer_leader(&mut self, request: RequestId, max_length: Option<f64>) {
        self.deferred.retain(|entry| entry.request != request);
        self.deferred.push(DeferredLeader {
            request,
            max_length,
        });
    }

    #[inline]
    pub fn deferred(&self) -> &[DeferredLeader] {
        &self.deferred
    }

    pub fn take_deferred(&mut self) -> Vec<DeferredLeader> {
        std::mem::take(&mut self.deferred)
    }
}

/// 单个注记请求执行指令序列时的上下文。
///
/// 循环指令的状态不在这里，而是由每次循环调用自行持有；
/// 这里只放跨指令可见的东西：放宽项、理想候选位置与执行轨迹。
pub struct ExecutionContext<'a> {
    workspace: &'a mut PlacementWorkspace,
    request: &'a mut LabelRequest,
    pub relaxations: Relaxations,
    ideal: Option<Candidate>,
    history: Vec<CommandId>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(workspace: &'a mut PlacementWorkspace, request: &'a mut LabelRequest) -> Self {
        Self {
            workspace,
            request,
            relaxations: Relaxations::default(),
            ideal: None,
            history: Vec::new(),
        }
    }

    #[inline]
    pub fn request(&self) -> &LabelRequest {
        self.request
    }

    #[inline]
    pub fn request_mut(&mut self) -> &mut LabelRequest {
        self.request
    }

    #[inline]
    pub fn workspace(&self) -> &PlacementWorkspace {
        self.workspace
    }

    #[inline]
    pub fn workspace_mut(&mut self) -> &mut PlacementWorkspace {
        self.workspace
    }

    #[inline]
    pub fn options(&self) -> &PlacementOptions {
        &self.workspace.options
    }

    /// 按执行顺序记录的指令编号（含重复执行）。
    #[inline]
    pub fn history(&self) -> &[CommandId] {
        &self.history
    }

    pub(crate) fn record(&mut self, id: CommandId) {
        self.history.push(id);
    }

    /// 按当前字号、堆叠与隐藏状态计算注记外框的 `(宽, 高)`。
    pub fn label_extent(&self) -> (f64, f64) {
        let font_size = self.request.font_size();
        let mut width: f64 = 0.0;
        let mut height: f64 = 0.0;
        for line in self.request.lines() {
            let (line_width, line_height) = self.workspace.metrics.measure(&line, font_size);
            width = width.max(line_width);
            height += line_height;
        }
        for symbol in self.request.visible_symbols() {
            if width > 0.0 {
                width += self.workspace.options.symbol_gap;
            }
            width += symbol.width;
            height = height.max(symbol.height);
        }
        (width, height)
    }

    /// 与 `bounds` 冲突的条目。自身要素与自身注记不计；
    /// 注记间使用注记缓冲区，注记与要素间使用要素缓冲区。
    pub fn conflicts(&self, bounds: &Bounds2D) -> Vec<IndexEntry> {
        let label_buffer = self.request.buffer(BufferType::Label).max(0.0);
        let feature_buffer = self.request.buffer(BufferType::Feature).max(0.0);
        let label_area = bounds.expanded(label_buffer);
        let feature_area = bounds.expanded(feature_buffer);
        let search = bounds.expanded(label_buffer.max(feature_buffer));

        self.workspace
            .index
            .query(&search)
            .into_iter()
            .filter(|entry| match entry.key {
                IndexKey::Label(id) => {
                    id != self.request.id() && label_area.intersects(&entry.bounds)
                }
                IndexKey::Feature { feature, kind } => {
                    if feature == self.request.feature() {
                        return false;
                    }
                    if self.relaxations.overline
                        && matches!(kind, ObstacleKind::LineSegment | ObstacleKind::AreaEdge)
                    {
                        return false;
                    }
                    feature_area.intersects(&entry.bounds)
                }
            })
            .collect()
    }

    /// 候选位置无冲突时原样返回；开启推挤且只与一个已放置注记冲突时，
    /// 沿最小平移向量移开后再检查一次。
    pub fn resolve(&self, candidate: Candidate) -> Option<Candidate> {
        let conflicts = self.conflicts(&candidate.bounds);
        if conflicts.is_empty() {
            return Some(candidate);
        }
        if !self.relaxations.bump || conflicts.len() != 1 {
            return None;
        }
        let entry = conflicts[0];
        if !matches!(entry.key, IndexKey::Label(_)) {
            return None;
        }
        let margin = self.request.buffer(BufferType::Label).max(0.0);
        let shift = minimum_translation(&candidate.bounds.expanded(margin), &entry.bounds)?;
        let moved = candidate.translated(shift);
        if self.conflicts(&moved.bounds).is_empty() {
            debug!(
                request = self.request.id().get(),
                dx = shift.x(),
                dy = shift.y(),
                "推挤后放置成功"
            );
            Some(moved)
        } else {
            None
        }
    }

    pub(crate) fn note_ideal(&mut self, candidate: &Candidate) {
        if self.ideal.is_none() {
            self.ideal = Some(*candidate);
        }
    }

    /// 本次执行中第一个被尝试的候选位置，强制放置时使用。
    #[inline]
    pub fn ideal(&self) -> Option<&Candidate> {
        self.ideal.as_ref()
    }

    /// 记录落位并登记到空间索引（替换该注记之前的条目）。
    pub fn place(
        &mut self,
        candidate: &Candidate,
        state: PlacementState,
        leader: Option<LeaderLine>,
    ) {
        let request_id = self.request.id();
        let placement = Placement {
            corners: candidate.corners,
            bounds: candidate.bounds,
            angle: candidate.angle,
            font_size: self.request.font_size(),
            lines: self.request.lines(),
            hidden: self.request.hidden_elements(),
            buffers: self.request.buffers(),
            leader,
        };
        self.workspace.index.remove_label(request_id);
        self.workspace.index.insert(IndexEntry {
            key: IndexKey::Label(request_id),
            bounds: candidate.bounds,
        });
        self.request.record_placement(placement, state);
        debug!(request = request_id.get(), state = ?state, "注记已落位");
    }
}

const SEPARATION: f64 = 1e-6;

// 沿重叠较小的轴把 `moving` 推离 `fixed`。
fn minimum_translation(moving: &Bounds2D, fixed: &Bounds2D) -> Option<Vector2> {
    let overlap_x = moving.max().x().min(fixed.max().x()) - moving.min().x().max(fixed.min().x());
    let overlap_y = moving.max().y().min(fixed.max().y()) - moving.min().y().max(fixed.min().y());
    if overlap_x <= 0.0 || overlap_y <= 0.0 {
        return None;
    }
    let away = |moving_center: f64, fixed_center: f64| {
        if moving_center >= fixed_center { 1.0 } else { -1.0 }
    };
    let (moving_center, fixed_center) = (moving.center(), fixed.center());
    if overlap_x <= overlap_y {
        let sign = away(moving_center.x(), fixed_center.x());
        Some(Vector2::new(sign * (overlap_x + SEPARATION), 0.0))
    } else {
        let sign = away(moving_center.y(), fixed_center.y());
        Some(Vector2::new(0.0, sign * (overlap_y + SEPARATION)))
    }
}
