use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::{Bounds2D, Point2, Polygon, point_along, polyline_length};
use crate::symbol::PointSymbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeatureId(u64);

impl FeatureId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(u64);

impl RequestId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FeatureType {
    Point,
    Line,
    Area,
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeatureType::Point => "point",
            FeatureType::Line => "line",
            FeatureType::Area => "area",
        };
        f.write_str(name)
    }
}

/// 被标注要素的几何形状（地图坐标）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureGeometry {
    Point(Point2),
    Line(Vec<Point2>),
    Area(Polygon),
}

impl FeatureGeometry {
    pub fn feature_type(&self) -> FeatureType {
        match self {
            FeatureGeometry::Point(_) => FeatureType::Point,
            FeatureGeometry::Line(_) => FeatureType::Line,
            FeatureGeometry::Area(_) => FeatureType::Area,
        }
    }

    pub fn bounds(&self) -> Bounds2D {
        match self {
            FeatureGeometry::Point(point) => Bounds2D::new(*point, *point),
            FeatureGeometry::Line(points) => Bounds2D::from_points(points),
            FeatureGeometry::Area(polygon) => polygon.bounds(),
        }
    }

    /// 要素的理想锚点：点本身、线的中点、面的质心。
    pub fn anchor(&self) -> Option<Point2> {
        match self {
            FeatureGeometry::Point(point) => Some(*point),
            FeatureGeometry::Line(points) => {
                point_along(points, polyline_length(points) * 0.5).map(|(point, _)| point)
            }
            FeatureGeometry::Area(polygon) => polygon.centroid(),
        }
    }
}

/// 缓冲区类型：与其它注记之间、与要素之间的最小间距。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferType {
    Label,
    Feature,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BufferSizes {
    pub label: f64,
    pub feature: f64,
}

impl BufferSizes {
    pub fn new(label: f64, feature: f64) -> Self {
        Self { label, feature }
    }

    #[inline]
    pub fn get(&self, buffer_type: BufferType) -> f64 {
        match buffer_type {
            BufferType::Label => self.label,
            BufferType::Feature => self.feature,
        }
    }

    #[inline]
    pub fn set(&mut self, buffer_type: BufferType, value: f64) {
        match buffer_type {
            BufferType::Label => self.label = value,
            BufferType::Feature => self.feature = value,
        }
    }
}

impl Default for BufferSizes {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextComponent {
    pub name: String,
    pub text: String,
    #[serde(default)]
    pub hidden: bool,
}

/// 一行文字，由若干具名文字组件拼接而成。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextObject {
    pub name: String,
    pub components: Vec<TextComponent>,
    #[serde(default)]
    pub hidden: bool,
}

impl TextObject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            components: Vec::new(),
            hidden: false,
        }
    }

    pub fn component(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.components.push(TextComponent {
            name: name.into(),
            text: text.into(),
            hidden: false,
        });
        self
    }

    /// 可见组件以空格拼接；对象隐藏或无可见文字时返回 `None`。
    pub fn visible_text(&self) -> Option<String> {
        if self.hidden {
            return None;
        }
        let parts: Vec<&str> = self
            .components
            .iter()
            .filter(|component| !component.hidden && !component.text.trim().is_empty())
            .map(|component| component.text.trim())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// 注记中的符号组件（如盾牌符号），仅记录尺寸。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolComponent {
    pub name: String,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub hidden: bool,
}

impl SymbolComponent {
    pub fn new(name: impl Into<String>, width: f64, height: f64) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            hidden: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelContent {
    pub text_objects: Vec<TextObject>,
    pub symbols: Vec<SymbolComponent>,
}

impl LabelContent {
    /// 单行单组件的简单注记。
    pub fn single(text: impl Into<String>) -> Self {
        Self {
            text_objects: vec![TextObject::new("main").component("name", text)],
            symbols: Vec::new(),
        }
    }

    pub fn with_text_object(mut self, object: TextObject) -> Self {
        self.text_objects.push(object);
        self
    }

    pub fn with_symbol(mut self, symbol: SymbolComponent) -> Self {
        self.symbols.push(symbol);
        self
    }
}

/// 可被隐藏的注记元素引用。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HideTarget {
    TextComponent(String),
    SymbolComponent(String),
    TextObject(String),
    StackLevel(u32),
}

impl fmt::Display for HideTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HideTarget::TextComponent(name) => write!(f, "TC({name})"),
            HideTarget::SymbolComponent(name) => write!(f, "SC({name})"),
            HideTarget::TextObject(name) => write!(f, "TO({name})"),
            HideTarget::StackLevel(level) => write!(f, "L({level})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HideResult {
    Hidden,
    AlreadyHidden,
    Missing,
}

impl HideResult {
    #[inline]
    pub fn found(self) -> bool {
        !matches!(self, HideResult::Missing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelStyle {
    pub font_size: f64,
    #[serde(default)]
    pub buffers: BufferSizes,
}

impl Default for LabelStyle {
    fn default() -> Self {
        Self {
            font_size: 10.0,
            buffers: BufferSizes::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlacementState {
    #[default]
    Unplaced,
    Placed,
    PlacedWithLeader,
    Forced,
    ForcedWithLeader,
    LeaderDeferred,
    Suppressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeaderLine {
    pub from: Point2,
    pub to: Point2,
}

/// 注记最终落位记录。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub corners: [Point2; 4],
    pub bounds: Bounds2D,
    pub angle: f64,
    pub font_size: f64,
    pub lines: Vec<String>,
    pub hidden: Vec<HideTarget>,
    pub buffers: BufferSizes,
    pub leader: Option<LeaderLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct WorkingState {
    font_size: f64,
    buffers: BufferSizes,
    stack_lines: usize,
    hidden_levels: BTreeSet<u32>,
}

impl WorkingState {
    fn from_style(style: &LabelStyle) -> Self {
        Self {
            font_size: style.font_size,
            buffers: style.buffers,
            stack_lines: 1,
            hidden_levels: BTreeSet::new(),
        }
    }
}

/// 单个要素的注记请求，携带声明样式与放置过程中的工作状态。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelRequest {
    id: RequestId,
    feature: FeatureId,
    label_class: String,
    pub geometry: FeatureGeometry,
    pub symbol: Option<PointSymbol>,
    pub content: LabelContent,
    pub style: LabelStyle,
    pub priority: i32,
    working: WorkingState,
    state: PlacementState,
    placement: Option<Placement>,
}

impl LabelRequest {
    pub fn new(
        id: RequestId,
        feature: FeatureId,
        label_class: impl Into<String>,
        geometry: FeatureGeometry,
        content: LabelContent,
        style: LabelStyle,
    ) -> Self {
        Self {
            id,
            feature,
            label_class: label_class.into(),
            geometry,
            symbol: None,
            content,
            working: WorkingState::from_style(&style),
            style,
            priority: 0,
            state: PlacementState::Unplaced,
            placement: None,
        }
    }

    pub fn with_symbol(mut self, symbol: PointSymbol) -> Self {
        self.symbol = Some(symbol);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[inline]
    pub fn id(&self) -> RequestId {
        self.id
    }

    #[inline]
    pub fn feature(&self) -> FeatureId {
        self.feature
    }

    #[inline]
    pub fn label_class(&self) -> &str {
        &self.label_class
    }

    #[inline]
    pub fn feature_type(&self) -> FeatureType {
        self.geometry.feature_type()
    }

    #[inline]
    pub fn state(&self) -> PlacementState {
        self.state
    }

    #[inline]
    pub fn set_state(&mut self, state: PlacementState) {
        self.state = state;
    }

    #[inline]
    pub fn placement(&self) -> Option<&Placement> {
        self.placement.as_ref()
    }

    pub fn record_placement(&mut self, placement: Placement, state: PlacementState) {
        self.placement = Some(placement);
        self.state = state;
    }

    /// 丢弃工作状态与落位结果，回到声明样式。
    pub fn reset(&mut self) {
        self.reset_working_state();
        self.restore_all();
        self.state = PlacementState::Unplaced;
        self.placement = None;
    }

    pub fn reset_working_state(&mut self) {
        self.working = WorkingState::from_style(&self.style);
    }

    #[inline]
    pub fn font_size(&self) -> f64 {
        self.working.font_size
    }

    #[inline]
    pub fn set_font_size(&mut self, size: f64) {
        self.working.font_size = size;
    }

    #[inline]
    pub fn buffer(&self, buffer_type: BufferType) -> f64 {
        self.working.buffers.get(buffer_type)
    }

    #[inline]
    pub fn buffers(&self) -> BufferSizes {
        self.working.buffers
    }

    #[inline]
    pub fn set_buffer(&mut self, buffer_type: BufferType, value: f64) {
        self.working.buffers.set(buffer_type, value);
    }

    #[inline]
    pub fn stack_lines(&self) -> usize {
        self.working.stack_lines
    }

    /// 可见文字拆分后的单词序列。
    pub fn words(&self) -> Vec<String> {
        self.content
            .text_objects
            .iter()
            .filter_map(TextObject::visible_text)
            .flat_map(|text| {
                text.split_whitespace()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// 把可见文字堆叠为 `lines` 行；单词数不足时返回 `false` 且不改变状态。
    pub fn stack(&mut self, lines: usize) -> bool {
        if lines == 0 || self.words().len() < lines {
            return false;
        }
        self.working.stack_lines = lines;
        self.working.hidden_levels.clear();
        true
    }

    pub fn unstack(&mut self) {
        self.working.stack_lines = 1;
        self.working.hidden_levels.clear();
    }

    fn base_lines(&self) -> Vec<String> {
        if self.working.stack_lines > 1 {
            balance_words(&self.words(), self.working.stack_lines)
        } else {
            self.content
                .text_objects
                .iter()
                .filter_map(TextObject::visible_text)
                .collect()
        }
    }

    /// 当前应显示的文字行（已排除隐藏的堆叠层）。
    pub fn lines(&self) -> Vec<String> {
        self.base_lines()
            .into_iter()
            .enumerate()
            .filter(|(index, _)| !self.working.hidden_levels.contains(&(*index as u32 + 1)))
            .map(|(_, line)| line)
            .collect()
    }

    pub fn visible_symbols(&self) -> impl Iterator<Item = &SymbolComponent> {
        self.content.symbols.iter().filter(|symbol| !symbol.hidden)
    }

    /// 至少还有一行文字或一个符号可见。
    pub fn has_visible_content(&self) -> bool {
        !self.lines().is_empty() || self.visible_symbols().next().is_some()
    }

    pub fn hide(&mut self, target: &HideTarget) -> HideResult {
        match target {
            HideTarget::TextComponent(name) => {
                let component = self
                    .content
                    .text_objects
                    .iter_mut()
                    .flat_map(|object| object.components.iter_mut())
                    .find(|component| &component.name == name);
                match component {
                    Some(component) => flip_hidden(&mut component.hidden),
                    None => HideResult::Missing,
                }
            }
            HideTarget::SymbolComponent(name) => {
                match self.content.symbols.iter_mut().find(|s| &s.name == name) {
                    Some(symbol) => flip_hidden(&mut symbol.hidden),
                    None => HideResult::Missing,
                }
            }
            HideTarget::TextObject(name) => {
                match self
                    .content
                    .text_objects
                    .iter_mut()
                    .find(|object| &object.name == name)
                {
                    Some(object) => flip_hidden(&mut object.hidden),
                    None => HideResult::Missing,
                }
            }
            HideTarget::StackLevel(level) => {
                if *level == 0 || *level as usize > self.base_lines().len() {
                    HideResult::Missing
                } else if self.working.hidden_levels.insert(*level) {
                    HideResult::Hidden
                } else {
                    HideResult::AlreadyHidden
                }
            }
        }
    }

    /// 恢复单个元素的显示，元素不存在时忽略。
    pub fn restore(&mut self, target: &HideTarget) {
        match target {
            HideTarget::TextComponent(name) => {
                for object in &mut self.content.text_objects {
                    for component in &mut object.components {
                        if &component.name == name {
                            component.hidden = false;
                        }
                    }
                }
            }
            HideTarget::SymbolComponent(name) => {
                for symbol in &mut self.content.symbols {
                    if &symbol.name == name {
                        symbol.hidden = false;
                    }
                }
            }
            HideTarget::TextObject(name) => {
                for object in &mut self.content.text_objects {
                    if &object.name == name {
                        object.hidden = false;
                    }
                }
            }
            HideTarget::StackLevel(level) => {
                self.working.hidden_levels.remove(level);
            }
        }
    }

    pub fn restore_all(&mut self) {
        for target in self.hidden_elements() {
            self.restore(&target);
        }
    }

    /// 当前被隐藏的全部元素。
    pub fn hidden_elements(&self) -> Vec<HideTarget> {
        let mut hidden = Vec::new();
        for object in &self.content.text_objects {
            if object.hidden {
                hidden.push(HideTarget::TextObject(object.name.clone()));
            }
            for component in &object.components {
                if component.hidden {
                    hidden.push(HideTarget::TextComponent(component.name.clone()));
                }
            }
        }
        for symbol in &self.content.symbols {
            if symbol.hidden {
                hidden.push(HideTarget::SymbolComponent(symbol.name.clone()));
            }
        }
        hidden.extend(
            self.working
                .hidden_levels
                .iter()
                .map(|level| HideTarget::StackLevel(*level)),
        );
        hidden
    }
}

fn flip_hidden(flag: &mut bool) -> HideResult {
    if *flag {
        HideResult::AlreadyHidden
    } else {
        *flag = true;
        HideResult::Hidden
    }
}

/// 将单词按字符数尽量均匀地分到恰好 `lines` 行（单词数需不少于行数）。
pub fn balance_words(words: &[String], lines: usize) -> Vec<String> {
    if lines <= 1 || words.len() < lines {
        return if words.is_empty() {
            Vec::new()
        } else {
            vec![words.join(" ")]
        };
    }
    let total: usize =
        words.iter().map(|word| word.chars().count()).sum::<usize>() + words.len() - 1;
    let target = (total as f64 / lines as f64).ceil() as usize;

    let mut result: Vec<String> = Vec::with_capacity(lines);
    let mut current = String::new();
    for (index, word) in words.iter().enumerate() {
        let open_lines = lines - result.len() - 1;
        let words_left = words.len() - index;
        let must_break = words_left <= open_lines;
        let too_long = current.chars().count() + 1 + word.chars().count() > target;
        if !current.is_empty() && open_lines > 0 && (must_break || too_long) {
            result.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    result.push(current);
    result
}
