use std::fmt;

use maplabel_core::label::{BufferType, FeatureType};
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;
use crate::sequence::CommandId;

pub use crate::hide::HideCommand;

/// 指令大类，与序数共同构成指令判别标签。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandType {
    LinePlacement,
    AreaPlacement,
    PointPlacement,
    Persistence,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandTag {
    pub command_type: CommandType,
    pub ordinal: u8,
}

impl CommandTag {
    #[inline]
    pub const fn new(command_type: CommandType, ordinal: u8) -> Self {
        Self {
            command_type,
            ordinal,
        }
    }
}

impl fmt::Display for CommandTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}#{}", self.command_type, self.ordinal)
    }
}

/// 循环目标候选：指定大类，序数为 `None` 时匹配该类的全部指令。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetPattern {
    pub command_type: CommandType,
    pub ordinal: Option<u8>,
}

impl TargetPattern {
    pub const fn any(command_type: CommandType) -> Self {
        Self {
            command_type,
            ordinal: None,
        }
    }

    pub const fn exact(command_type: CommandType, ordinal: u8) -> Self {
        Self {
            command_type,
            ordinal: Some(ordinal),
        }
    }

    #[inline]
    pub fn matches(&self, tag: CommandTag) -> bool {
        self.command_type == tag.command_type && self.ordinal.is_none_or(|ord| ord == tag.ordinal)
    }
}

/// 持久化类指令的序数表。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PersistenceInstruction {
    Offset = 0,
    Overhang = 1,
    Overline = 2,
    Overregion = 3,
    Bump = 4,
    Leader = 5,
    BufferSize = 6,
    FontSize = 7,
    Stack = 8,
    Hide = 9,
}

impl PersistenceInstruction {
    #[inline]
    pub const fn tag(self) -> CommandTag {
        CommandTag::new(CommandType::Persistence, self as u8)
    }

    #[inline]
    pub const fn pattern(self) -> TargetPattern {
        TargetPattern::exact(CommandType::Persistence, self as u8)
    }
}

const LINE_TARGET: TargetPattern = TargetPattern::any(CommandType::LinePlacement);
const AREA_TARGET: TargetPattern = TargetPattern::any(CommandType::AreaPlacement);
const POINT_TARGET: TargetPattern = TargetPattern::any(CommandType::PointPlacement);
const LEADER_TARGET: TargetPattern = PersistenceInstruction::Leader.pattern();

/// 所有放置类指令（含引线）。
pub const PLACEMENT_TARGETS: [TargetPattern; 4] =
    [LINE_TARGET, AREA_TARGET, POINT_TARGET, LEADER_TARGET];

fn placement_targets_and(own: PersistenceInstruction) -> Vec<TargetPattern> {
    let mut targets = PLACEMENT_TARGETS.to_vec();
    targets.push(own.pattern());
    targets
}

/// 循环指令的动作：逐级缩减、按当前状态再跑一遍、或恢复声明值。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoopAction {
    #[default]
    Reduce,
    LoopAgain,
    Reset,
}

/// 数据校验发现，不是引擎错误，由调用方决定是否继续。
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationFinding {
    pub command: Option<CommandId>,
    pub tag: CommandTag,
    pub message: String,
}

impl ValidationFinding {
    fn new(tag: CommandTag, message: impl Into<String>) -> Self {
        Self {
            command: None,
            tag,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.command {
            Some(id) => write!(f, "[{} @{}] {}", self.tag, id.get(), self.message),
            None => write!(f, "[{}] {}", self.tag, self.message),
        }
    }
}

/// 循环指令中与目标解析相关的部分（对象安全）。
pub trait LoopTarget {
    fn where_to_loop(&self) -> Option<CommandId>;

    fn set_where_to_loop(&mut self, target: Option<CommandId>);

    fn default_return_targets(&self) -> Vec<TargetPattern>;

    fn is_command_loop_target(&self, command: &SequenceCommand) -> bool {
        let tag = command.tag();
        self.default_return_targets()
            .iter()
            .any(|pattern| pattern.matches(tag))
    }

    /// 是否打算从自身的 `where_to_loop` 处重试。
    fn returns_to_previous_command(&self) -> bool {
        true
    }

    /// `Reset` 动作不重跑循环体，也就不需要目标。
    fn needs_loop_target(&self) -> bool {
        true
    }
}

fn check_positive(name: &'static str, value: i64) -> Result<u32, EngineError> {
    if value <= 0 {
        return Err(EngineError::MustBePositive {
            name,
            value: value as f64,
        });
    }
    u32::try_from(value).map_err(|_| EngineError::MustBePositive {
        name,
        value: value as f64,
    })
}

// ---------------------------------------------------------------------------
// 放置类指令
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineSide {
    Above = 0,
    Below = 1,
    Middle = 2,
    Left = 3,
    Right = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionUnit {
    Absolute,
    Percent,
}

/// 沿线位置，绝对距离或线长百分比。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinePosition {
    pub value: f64,
    pub unit: PositionUnit,
}

impl LinePosition {
    pub const fn absolute(value: f64) -> Self {
        Self {
            value,
            unit: PositionUnit::Absolute,
        }
    }

    pub const fn percent(value: f64) -> Self {
        Self {
            value,
            unit: PositionUnit::Percent,
        }
    }

    /// 换算为沿线距离并夹取到 `[0, length]`。
    pub fn resolve(&self, length: f64) -> f64 {
        let distance = match self.unit {
            PositionUnit::Absolute => self.value,
            PositionUnit::Percent => length * self.value / 100.0,
        };
        distance.clamp(0.0, length.max(0.0))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinePlacementCommand {
    place_where: LineSide,
    initial_position: LinePosition,
    min_position: LinePosition,
    max_position: LinePosition,
}

impl LinePlacementCommand {
    pub fn new(place_where: LineSide) -> Self {
        Self {
            place_where,
            initial_position: LinePosition::percent(50.0),
            min_position: LinePosition::percent(0.0),
            max_position: LinePosition::percent(100.0),
        }
    }

    pub fn with_positions(
        mut self,
        initial: LinePosition,
        min: LinePosition,
        max: LinePosition,
    ) -> Self {
        self.initial_position = initial;
        self.min_position = min;
        self.max_position = max;
        self
    }

    #[inline]
    pub fn place_where(&self) -> LineSide {
        self.place_where
    }

    #[inline]
    pub fn initial_position(&self) -> LinePosition {
        self.initial_position
    }

    #[inline]
    pub fn min_position(&self) -> LinePosition {
        self.min_position
    }

    #[inline]
    pub fn max_position(&self) -> LinePosition {
        self.max_position
    }

    #[inline]
    pub fn ordinal(&self) -> u8 {
        self.place_where as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Compass {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
    OnPoint,
}

impl Compass {
    pub const AROUND: [Compass; 8] = [
        Compass::NE,
        Compass::E,
        Compass::N,
        Compass::SE,
        Compass::NW,
        Compass::W,
        Compass::S,
        Compass::SW,
    ];

    /// 单位格方向 `(dx, dy)`，`OnPoint` 为 `(0, 0)`。
    pub fn direction(self) -> (i8, i8) {
        match self {
            Compass::N => (0, 1),
            Compass::NE => (1, 1),
            Compass::E => (1, 0),
            Compass::SE => (1, -1),
            Compass::S => (0, -1),
            Compass::SW => (-1, -1),
            Compass::W => (-1, 0),
            Compass::NW => (-1, 1),
            Compass::OnPoint => (0, 0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointInstruction {
    Around = 0,
    OnPoint = 1,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointPlacementCommand {
    positions: Vec<Compass>,
    angle: f64,
}

impl PointPlacementCommand {
    /// `angle` 以度为单位。
    pub fn new(positions: Vec<Compass>, angle: f64) -> Self {
        Self { positions, angle }
    }

    pub fn around() -> Self {
        Self::new(Compass::AROUND.to_vec(), 0.0)
    }

    #[inline]
    pub fn positions(&self) -> &[Compass] {
        &self.positions
    }

    #[inline]
    pub fn angle(&self) -> f64 {
        self.angle
    }

    pub fn instruction(&self) -> PointInstruction {
        if self.positions == [Compass::OnPoint] {
            PointInstruction::OnPoint
        } else {
            PointInstruction::Around
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AreaStrategy {
    InteriorHorizontal = 0,
    InteriorDominantAngle = 1,
    InteriorArbitraryAngle = 2,
    ExteriorHorizontal = 3,
    ExteriorDominantAngle = 4,
    ExteriorArbitraryAngle = 5,
    BoundaryStraddle = 6,
}

impl AreaStrategy {
    pub fn is_interior(self) -> bool {
        matches!(
            self,
            AreaStrategy::InteriorHorizontal
                | AreaStrategy::InteriorDominantAngle
                | AreaStrategy::InteriorArbitraryAngle
        )
    }

    pub fn is_exterior(self) -> bool {
        matches!(
            self,
            AreaStrategy::ExteriorHorizontal
                | AreaStrategy::ExteriorDominantAngle
                | AreaStrategy::ExteriorArbitraryAngle
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaPlacementCommand {
    place_how: AreaStrategy,
    angle: f64,
}

impl AreaPlacementCommand {
    pub fn new(place_how: AreaStrategy) -> Self {
        Self {
            place_how,
            angle: 0.0,
        }
    }

    /// 任意角度策略使用的角度（度）。
    pub fn with_angle(mut self, angle: f64) -> Self {
        self.angle = angle;
        self
    }

    #[inline]
    pub fn place_how(&self) -> AreaStrategy {
        self.place_how
    }

    #[inline]
    pub fn angle(&self) -> f64 {
        self.angle
    }
}

// ---------------------------------------------------------------------------
// 终止与引线
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureAction {
    Suppress = 0,
    Force = 1,
    ForceWithLeader = 2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureCommand {
    action: FailureAction,
}

impl FailureCommand {
    pub fn new(action: FailureAction) -> Self {
        Self { action }
    }

    #[inline]
    pub fn action(&self) -> FailureAction {
        self.action
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaderTiming {
    Immediate,
    Deferred,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderCommand {
    timing: LeaderTiming,
    max_length: Option<f64>,
}

impl LeaderCommand {
    pub fn new(timing: LeaderTiming) -> Self {
        Self {
            timing,
            max_length: None,
        }
    }

    pub fn with_max_length(mut self, max_length: f64) -> Result<Self, EngineError> {
        if max_length <= 0.0 || !max_length.is_finite() {
            return Err(EngineError::MustBePositive {
                name: "max_length",
                value: max_length,
            });
        }
        self.max_length = Some(max_length);
        Ok(self)
    }

    #[inline]
    pub fn timing(&self) -> LeaderTiming {
        self.timing
    }

    #[inline]
    pub fn max_length(&self) -> Option<f64> {
        self.max_length
    }
}

// ---------------------------------------------------------------------------
// 放宽约束的一次性循环
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OffsetCommand {
    where_to_loop: Option<CommandId>,
}

impl OffsetCommand {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoopTarget for OffsetCommand {
    fn where_to_loop(&self) -> Option<CommandId> {
        self.where_to_loop
    }

    fn set_where_to_loop(&mut self, target: Option<CommandId>) {
        self.where_to_loop = target;
    }

    fn default_return_targets(&self) -> Vec<TargetPattern> {
        vec![POINT_TARGET, LINE_TARGET]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverhangCommand {
    overhang_amount: f64,
    where_to_loop: Option<CommandId>,
}

impl OverhangCommand {
    /// `amount` 为注记长度的百分比，必须大于零。
    pub fn new(amount: f64) -> Result<Self, EngineError> {
        check_overhang(amount)?;
        Ok(Self {
            overhang_amount: amount,
            where_to_loop: None,
        })
    }

    #[inline]
    pub fn overhang_amount(&self) -> f64 {
        self.overhang_amount
    }

    pub fn set_overhang_amount(&mut self, amount: f64) -> Result<(), EngineError> {
        check_overhang(amount)?;
        self.overhang_amount = amount;
        Ok(())
    }
}

fn check_overhang(amount: f64) -> Result<(), EngineError> {
    if amount > 0.0 && amount.is_finite() {
        Ok(())
    } else {
        Err(EngineError::OverhangMustBeGreaterThanZero(amount))
    }
}

impl LoopTarget for OverhangCommand {
    fn where_to_loop(&self) -> Option<CommandId> {
        self.where_to_loop
    }

    fn set_where_to_loop(&mut self, target: Option<CommandId>) {
        self.where_to_loop = target;
    }

    fn default_return_targets(&self) -> Vec<TargetPattern> {
        vec![LINE_TARGET]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverlineCommand {
    where_to_loop: Option<CommandId>,
}

impl OverlineCommand {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoopTarget for OverlineCommand {
    fn where_to_loop(&self) -> Option<CommandId> {
        self.where_to_loop
    }

    fn set_where_to_loop(&mut self, target: Option<CommandId>) {
        self.where_to_loop = target;
    }

    fn default_return_targets(&self) -> Vec<TargetPattern> {
        PLACEMENT_TARGETS.to_vec()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverregionCommand {
    where_to_loop: Option<CommandId>,
}

impl OverregionCommand {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoopTarget for OverregionCommand {
    fn where_to_loop(&self) -> Option<CommandId> {
        self.where_to_loop
    }

    fn set_where_to_loop(&mut self, target: Option<CommandId>) {
        self.where_to_loop = target;
    }

    fn default_return_targets(&self) -> Vec<TargetPattern> {
        vec![AREA_TARGET]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BumpCommand {
    where_to_loop: Option<CommandId>,
}

impl BumpCommand {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoopTarget for BumpCommand {
    fn where_to_loop(&self) -> Option<CommandId> {
        self.where_to_loop
    }

    fn set_where_to_loop(&mut self, target: Option<CommandId>) {
        self.where_to_loop = target;
    }

    fn default_return_targets(&self) -> Vec<TargetPattern> {
        PLACEMENT_TARGETS.to_vec()
    }
}

// ---------------------------------------------------------------------------
// 逐级缩减的循环
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferSizeCommand {
    buffer_type: BufferType,
    num_buffer_steps: u32,
    action: LoopAction,
    where_to_loop: Option<CommandId>,
}

impl BufferSizeCommand {
    pub fn new(buffer_type: BufferType, steps: i64) -> Result<Self, EngineError> {
        Ok(Self {
            buffer_type,
            num_buffer_steps: check_positive("num_buffer_steps", steps)?,
            action: LoopAction::Reduce,
            where_to_loop: None,
        })
    }

    pub fn with_action(mut self, action: LoopAction) -> Self {
        self.action = action;
        self
    }

    #[inline]
    pub fn buffer_type(&self) -> BufferType {
        self.buffer_type
    }

    #[inline]
    pub fn action(&self) -> LoopAction {
        self.action
    }

    #[inline]
    pub fn num_buffer_reduction_steps(&self) -> u32 {
        self.num_buffer_steps
    }

    /// 非正值返回错误且保留原值。
    pub fn set_num_buffer_reduction_steps(&mut self, steps: i64) -> Result<(), EngineError> {
        self.num_buffer_steps = check_positive("num_buffer_steps", steps)?;
        Ok(())
    }
}

impl LoopTarget for BufferSizeCommand {
    fn where_to_loop(&self) -> Option<CommandId> {
        self.where_to_loop
    }

    fn set_where_to_loop(&mut self, target: Option<CommandId>) {
        self.where_to_loop = target;
    }

    fn default_return_targets(&self) -> Vec<TargetPattern> {
        placement_targets_and(PersistenceInstruction::BufferSize)
    }

    // 缓冲区循环之间只能串接同类型缓冲区
    fn is_command_loop_target(&self, command: &SequenceCommand) -> bool {
        let tag = command.tag();
        if !self
            .default_return_targets()
            .iter()
            .any(|pattern| pattern.matches(tag))
        {
            return false;
        }
        match command {
            SequenceCommand::BufferSize(other) => other.buffer_type == self.buffer_type,
            _ => true,
        }
    }

    fn returns_to_previous_command(&self) -> bool {
        self.action == LoopAction::Reduce
    }

    fn needs_loop_target(&self) -> bool {
        self.action != LoopAction::Reset
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontSizeCommand {
    num_font_steps: u32,
    reduction_percent: f64,
    action: LoopAction,
    where_to_loop: Option<CommandId>,
}

impl FontSizeCommand {
    /// 每级将字号缩小声明值的 `reduction_percent`%。
    pub fn new(steps: i64, reduction_percent: f64) -> Result<Self, EngineError> {
        let num_font_steps = check_positive("num_font_steps", steps)?;
        check_percent(reduction_percent)?;
        Ok(Self {
            num_font_steps,
            reduction_percent,
            action: LoopAction::Reduce,
            where_to_loop: None,
        })
    }

    pub fn with_action(mut self, action: LoopAction) -> Self {
        self.action = action;
        self
    }

    #[inline]
    pub fn action(&self) -> LoopAction {
        self.action
    }

    #[inline]
    pub fn num_font_steps(&self) -> u32 {
        self.num_font_steps
    }

    pub fn set_num_font_steps(&mut self, steps: i64) -> Result<(), EngineError> {
        self.num_font_steps = check_positive("num_font_steps", steps)?;
        Ok(())
    }

    #[inline]
    pub fn reduction_percent(&self) -> f64 {
        self.reduction_percent
    }

    pub fn set_reduction_percent(&mut self, percent: f64) -> Result<(), EngineError> {
        check_percent(percent)?;
        self.reduction_percent = percent;
        Ok(())
    }
}

fn check_percent(percent: f64) -> Result<(), EngineError> {
    if percent > 0.0 && percent < 100.0 {
        Ok(())
    } else {
        Err(EngineError::MustBePositive {
            name: "reduction_percent",
            value: percent,
        })
    }
}

impl LoopTarget for FontSizeCommand {
    fn where_to_loop(&self) -> Option<CommandId> {
        self.where_to_loop
    }

    fn set_where_to_loop(&mut self, target: Option<CommandId>) {
        self.where_to_loop = target;
    }

    fn default_return_targets(&self) -> Vec<TargetPattern> {
        placement_targets_and(PersistenceInstruction::FontSize)
    }

    fn returns_to_previous_command(&self) -> bool {
        self.action == LoopAction::Reduce
    }

    fn needs_loop_target(&self) -> bool {
        self.action != LoopAction::Reset
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackCommand {
    max_number_of_lines: u32,
    action: LoopAction,
    where_to_loop: Option<CommandId>,
}

impl StackCommand {
    pub fn new(max_number_of_lines: i64) -> Result<Self, EngineError> {
        Ok(Self {
            max_number_of_lines: check_positive("max_number_of_lines", max_number_of_lines)?,
            action: LoopAction::Reduce,
            where_to_loop: None,
        })
    }

    pub fn with_action(mut self, action: LoopAction) -> Self {
        self.action = action;
        self
    }

    #[inline]
    pub fn action(&self) -> LoopAction {
        self.action
    }

    #[inline]
    pub fn max_number_of_lines(&self) -> u32 {
        self.max_number_of_lines
    }

    pub fn set_max_number_of_lines(&mut self, lines: i64) -> Result<(), EngineError> {
        self.max_number_of_lines = check_positive("max_number_of_lines", lines)?;
        Ok(())
    }
}

impl LoopTarget for StackCommand {
    fn where_to_loop(&self) -> Option<CommandId> {
        self.where_to_loop
    }

    fn set_where_to_loop(&mut self, target: Option<CommandId>) {
        self.where_to_loop = target;
    }

    fn default_return_targets(&self) -> Vec<TargetPattern> {
        placement_targets_and(PersistenceInstruction::Stack)
    }

    fn returns_to_previous_command(&self) -> bool {
        self.action == LoopAction::Reduce
    }

    fn needs_loop_target(&self) -> bool {
        self.action != LoopAction::Reset
    }
}

impl LoopTarget for HideCommand {
    fn where_to_loop(&self) -> Option<CommandId> {
        self.where_to_loop
    }

    fn set_where_to_loop(&mut self, target: Option<CommandId>) {
        self.where_to_loop = target;
    }

    fn default_return_targets(&self) -> Vec<TargetPattern> {
        placement_targets_and(PersistenceInstruction::Hide)
    }
}

// ---------------------------------------------------------------------------
// 指令总和类型
// ---------------------------------------------------------------------------

/// 执行序列中的一条指令。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SequenceCommand {
    LinePlacement(LinePlacementCommand),
    PointPlacement(PointPlacementCommand),
    AreaPlacement(AreaPlacementCommand),
    Offset(OffsetCommand),
    Overhang(OverhangCommand),
    Overline(OverlineCommand),
    Overregion(OverregionCommand),
    Bump(BumpCommand),
    Leader(LeaderCommand),
    BufferSize(BufferSizeCommand),
    FontSize(FontSizeCommand),
    Stack(StackCommand),
    Hide(HideCommand),
    Failure(FailureCommand),
}

impl SequenceCommand {
    pub fn tag(&self) -> CommandTag {
        match self {
            SequenceCommand::LinePlacement(command) => {
                CommandTag::new(CommandType::LinePlacement, command.ordinal())
            }
            SequenceCommand::PointPlacement(command) => {
                CommandTag::new(CommandType::PointPlacement, command.instruction() as u8)
            }
            SequenceCommand::AreaPlacement(command) => {
                CommandTag::new(CommandType::AreaPlacement, command.place_how() as u8)
            }
            SequenceCommand::Offset(_) => PersistenceInstruction::Offset.tag(),
            SequenceCommand::Overhang(_) => PersistenceInstruction::Overhang.tag(),
            SequenceCommand::Overline(_) => PersistenceInstruction::Overline.tag(),
            SequenceCommand::Overregion(_) => PersistenceInstruction::Overregion.tag(),
            SequenceCommand::Bump(_) => PersistenceInstruction::Bump.tag(),
            SequenceCommand::Leader(_) => PersistenceInstruction::Leader.tag(),
            SequenceCommand::BufferSize(_) => PersistenceInstruction::BufferSize.tag(),
            SequenceCommand::FontSize(_) => PersistenceInstruction::FontSize.tag(),
            SequenceCommand::Stack(_) => PersistenceInstruction::Stack.tag(),
            SequenceCommand::Hide(_) => PersistenceInstruction::Hide.tag(),
            SequenceCommand::Failure(command) => {
                CommandTag::new(CommandType::Failure, command.action() as u8)
            }
        }
    }

    #[inline]
    pub fn command_type(&self) -> CommandType {
        self.tag().command_type
    }

    #[inline]
    pub fn ordinal(&self) -> u8 {
        self.tag().ordinal
    }

    /// 放置类指令与引线指令会尝试一次新的几何放置。
    pub fn is_placement_command(&self) -> bool {
        matches!(
            self,
            SequenceCommand::LinePlacement(_)
                | SequenceCommand::PointPlacement(_)
                | SequenceCommand::AreaPlacement(_)
                | SequenceCommand::Leader(_)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            SequenceCommand::LinePlacement(_) => "line_placement",
            SequenceCommand::PointPlacement(_) => "point_placement",
            SequenceCommand::AreaPlacement(_) => "area_placement",
            SequenceCommand::Offset(_) => "offset",
            SequenceCommand::Overhang(_) => "overhang",
            SequenceCommand::Overline(_) => "overline",
            SequenceCommand::Overregion(_) => "overregion",
            SequenceCommand::Bump(_) => "bump",
            SequenceCommand::Leader(_) => "leader",
            SequenceCommand::BufferSize(_) => "buffer_size",
            SequenceCommand::FontSize(_) => "font_size",
            SequenceCommand::Stack(_) => "stack",
            SequenceCommand::Hide(_) => "hide",
            SequenceCommand::Failure(_) => "failure",
        }
    }

    pub fn as_loop(&self) -> Option<&dyn LoopTarget> {
        match self {
            SequenceCommand::Offset(command) => Some(command),
            SequenceCommand::Overhang(command) => Some(command),
            SequenceCommand::Overline(command) => Some(command),
            SequenceCommand::Overregion(command) => Some(command),
            SequenceCommand::Bump(command) => Some(command),
            SequenceCommand::BufferSize(command) => Some(command),
            SequenceCommand::FontSize(command) => Some(command),
            SequenceCommand::Stack(command) => Some(command),
            SequenceCommand::Hide(command) => Some(command),
            SequenceCommand::LinePlacement(_)
            | SequenceCommand::PointPlacement(_)
            | SequenceCommand::AreaPlacement(_)
            | SequenceCommand::Leader(_)
            | SequenceCommand::Failure(_) => None,
        }
    }

    pub fn as_loop_mut(&mut self) -> Option<&mut dyn LoopTarget> {
        match self {
            SequenceCommand::Offset(command) => Some(command),
            SequenceCommand::Overhang(command) => Some(command),
            SequenceCommand::Overline(command) => Some(command),
            SequenceCommand::Overregion(command) => Some(command),
            SequenceCommand::Bump(command) => Some(command),
            SequenceCommand::BufferSize(command) => Some(command),
            SequenceCommand::FontSize(command) => Some(command),
            SequenceCommand::Stack(command) => Some(command),
            SequenceCommand::Hide(command) => Some(command),
            SequenceCommand::LinePlacement(_)
            | SequenceCommand::PointPlacement(_)
            | SequenceCommand::AreaPlacement(_)
            | SequenceCommand::Leader(_)
            | SequenceCommand::Failure(_) => None,
        }
    }

    /// 针对要素类型做前置检查；返回空列表表示有效。
    pub fn validate(&self, feature_type: FeatureType) -> Vec<ValidationFinding> {
        let tag = self.tag();
        let mut findings = Vec::new();
        let mut require = |expected: FeatureType, what: &str| {
            if feature_type != expected {
                findings.push(ValidationFinding::new(
                    tag,
                    format!("{what} requires a {expected} feature, got {feature_type}"),
                ));
            }
        };
        match self {
            SequenceCommand::LinePlacement(command) => {
                require(FeatureType::Line, "line placement");
                let (min, max) = (command.min_position(), command.max_position());
                if min.unit == max.unit && min.value > max.value {
                    findings.push(ValidationFinding::new(
                        tag,
                        "minimum line position lies after the maximum position",
                    ));
                }
            }
            SequenceCommand::PointPlacement(command) => {
                require(FeatureType::Point, "point placement");
                if command.positions().is_empty() {
                    findings.push(ValidationFinding::new(
                        tag,
                        "point placement has no candidate positions",
                    ));
                }
            }
            SequenceCommand::AreaPlacement(_) => require(FeatureType::Area, "area placement"),
            SequenceCommand::Overhang(_) => require(FeatureType::Line, "overhang"),
            SequenceCommand::Overregion(_) => require(FeatureType::Area, "overregion"),
            SequenceCommand::Offset(_) if feature_type == FeatureType::Area => {
                findings.push(ValidationFinding::new(
                    tag,
                    "offset is not supported for area labels",
                ));
            }
            SequenceCommand::Stack(_) if feature_type == FeatureType::Line => {
                findings.push(ValidationFinding::new(
                    tag,
                    "stacking is not supported for line labels",
                ));
            }
            SequenceCommand::Leader(_) if feature_type == FeatureType::Line => {
                findings.push(ValidationFinding::new(
                    tag,
                    "leaders are not supported for line labels",
                ));
            }
            _ => {}
        }
        findings
    }
}

impl From<LinePlacementCommand> for SequenceCommand {
    fn from(value: LinePlacementCommand) -> Self {
        SequenceCommand::LinePlacement(value)
    }
}

impl From<PointPlacementCommand> for SequenceCommand {
    fn from(value: PointPlacementCommand) -> Self {
        SequenceCommand::PointPlacement(value)
    }
}

impl From<AreaPlacementCommand> for SequenceCommand {
    fn from(value: AreaPlacementCommand) -> Self {
        SequenceCommand::AreaPlacement(value)
    }
}

impl From<OffsetCommand> for SequenceCommand {
    fn from(value: OffsetCommand) -> Self {
        SequenceCommand::Offset(value)
    }
}

impl From<OverhangCommand> for SequenceCommand {
    fn from(value: OverhangCommand) -> Self {
        SequenceCommand::Overhang(value)
    }
}

impl From<OverlineCommand> for SequenceCommand {
    fn from(value: OverlineCommand) -> Self {
        SequenceCommand::Overline(value)
    }
}

impl From<OverregionCommand> for SequenceCommand {
    fn from(value: OverregionCommand) -> Self {
        SequenceCommand::Overregion(value)
    }
}

impl From<BumpCommand> for SequenceCommand {
    fn from(value: BumpCommand) -> Self {
        SequenceCommand::Bump(value)
    }
}

impl From<LeaderCommand> for SequenceCommand {
    fn from(value: LeaderCommand) -> Self {
        SequenceCommand::Leader(value)
    }
}

impl From<BufferSizeCommand> for SequenceCommand {
    fn from(value: BufferSizeCommand) -> Self {
        SequenceCommand::BufferSize(value)
    }
}

impl From<FontSizeCommand> for SequenceCommand {
    fn from(value: FontSizeCommand) -> Self {
        SequenceCommand::FontSize(value)
    }
}

impl From<StackCommand> for SequenceCommand {
    fn from(value: StackCommand) -> Self {
        SequenceCommand::Stack(value)
    }
}

impl From<HideCommand> for SequenceCommand {
    fn from(value: HideCommand) -> Self {
        SequenceCommand::Hide(value)
    }
}

impl From<FailureCommand> for SequenceCommand {
    fn from(value: FailureCommand) -> Self {
        SequenceCommand::Failure(value)
    }
}
