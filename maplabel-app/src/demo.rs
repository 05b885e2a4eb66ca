use std::time::Duration;

use maplabel_config::AppConfig;
use maplabel_core::geometry::{Point2, Polygon};
use maplabel_core::label::{
    BufferType, FeatureGeometry, FeatureId, LabelContent, LabelRequest, LabelStyle, RequestId,
    SymbolComponent, TextObject,
};
use maplabel_core::symbol::PointSymbol;
use maplabel_engine::command::{
    AreaPlacementCommand, AreaStrategy, BufferSizeCommand, BumpCommand, FailureAction,
    FailureCommand, FontSizeCommand, LeaderCommand, LeaderTiming, LineSide, LinePlacementCommand,
    LinePosition, OffsetCommand, OverhangCommand, OverlineCommand, OverregionCommand,
    PointPlacementCommand, StackCommand,
};
use maplabel_engine::context::PlacementOptions;
use maplabel_engine::errors::EngineError;
use maplabel_engine::hide::HideCommand;
use maplabel_engine::map::{LabelMap, LabelingOptions};
use maplabel_engine::sequence::ExecutionSequence;
use tracing::debug;

pub const TOWNS: &str = "towns";
pub const RIVERS: &str = "rivers";
pub const LAKES: &str = "lakes";

pub fn placement_options(config: &AppConfig) -> PlacementOptions {
    let placement = &config.placement;
    PlacementOptions {
        point_offset: placement.point_offset,
        line_search_step: placement.line_search_step,
        leader_max_length: placement.leader_max_length,
        leader_step: placement.leader_step,
        min_font_size: placement.min_font_size,
        ..PlacementOptions::default()
    }
}

pub fn labeling_options(config: &AppConfig) -> LabelingOptions {
    LabelingOptions {
        time_limit: config.run.time_limit_ms.map(Duration::from_millis),
        process_deferred_leaders: config.run.deferred_leaders,
    }
}

/// 城镇：八方位 → 加大偏移 → 推挤 → 缩缓冲区 → 缩字号 → 堆叠 → 隐藏 → 延后引线。
pub fn towns_sequence(config: &AppConfig) -> Result<ExecutionSequence, EngineError> {
    let placement = &config.placement;
    let mut sequence = ExecutionSequence::new();
    sequence.add_element(PointPlacementCommand::around())?;
    sequence.add_element(OffsetCommand::new())?;
    sequence.add_element(BumpCommand::new())?;
    sequence.add_element(BufferSizeCommand::new(BufferType::Label, placement.buffer_steps)?)?;
    sequence.add_element(FontSizeCommand::new(
        placement.font_steps,
        placement.font_reduction_percent,
    )?)?;
    sequence.add_element(StackCommand::new(placement.max_stack_lines)?)?;
    sequence.add_element(HideCommand::parse("TC(population), SC(badge)")?)?;
    sequence.add_element(LeaderCommand::new(LeaderTiming::Deferred))?;
    Ok(sequence)
}

/// 河流：线上方 → 线下方 → 允许悬挑 → 忽略线障碍 → 缩字号 → 抑制。
pub fn rivers_sequence(config: &AppConfig) -> Result<ExecutionSequence, EngineError> {
    let placement = &config.placement;
    let mut sequence = ExecutionSequence::new();
    sequence.add_element(LinePlacementCommand::new(LineSide::Above).with_positions(
        LinePosition::percent(50.0),
        LinePosition::percent(10.0),
        LinePosition::percent(90.0),
    ))?;
    sequence.add_element(LinePlacementCommand::new(LineSide::Below))?;
    sequence.add_element(OverhangCommand::new(20.0)?)?;
    sequence.add_element(OverlineCommand::new())?;
    sequence.add_element(FontSizeCommand::new(
        placement.font_steps,
        placement.font_reduction_percent,
    )?)?;
    sequence.add_element(FailureCommand::new(FailureAction::Suppress))?;
    Ok(sequence)
}

/// 湖泊：内部水平 → 内部主方向 → 允许越界 → 外部 → 强制加引线。
pub fn lakes_sequence() -> Result<ExecutionSequence, EngineError> {
    let mut sequence = ExecutionSequence::new();
    sequence.add_element(AreaPlacementCommand::new(AreaStrategy::InteriorHorizontal))?;
    sequence.add_element(AreaPlacementCommand::new(AreaStrategy::InteriorDominantAngle))?;
    sequence.add_element(OverregionCommand::new())?;
    sequence.add_element(AreaPlacementCommand::new(AreaStrategy::ExteriorHorizontal))?;
    sequence.add_element(FailureCommand::new(FailureAction::ForceWithLeader))?;
    Ok(sequence)
}

fn town(
    id: RequestId,
    feature: u64,
    at: Point2,
    symbol: PointSymbol,
    name: &str,
    population: &str,
) -> LabelRequest {
    let content = LabelContent::default()
        .with_text_object(
            TextObject::new("title")
                .component("name", name)
                .component("population", population),
        )
        .with_symbol(SymbolComponent::new("badge", 3.0, 3.0));
    LabelRequest::new(
        id,
        FeatureId::new(feature),
        TOWNS,
        FeatureGeometry::Point(at),
        content,
        LabelStyle::default(),
    )
    .with_symbol(symbol)
}

/// 构建演示地图：四个城镇、一条河、一个湖以及一条无注记的道路。
pub fn build_demo_map(config: &AppConfig) -> Result<LabelMap, EngineError> {
    let mut map = LabelMap::new(placement_options(config), labeling_options(config));
    map.define_class(TOWNS, towns_sequence(config)?);
    map.define_class(RIVERS, rivers_sequence(config)?);
    map.define_class(LAKES, lakes_sequence()?);

    let road = FeatureGeometry::Line(vec![Point2::new(-40.0, 18.0), Point2::new(120.0, 18.0)]);
    map.add_obstacle(FeatureId::new(900), &road, None)?;

    let towns = [
        (1, Point2::new(0.0, 0.0), "Ashford", "12k", 10),
        (2, Point2::new(8.0, 4.0), "Brookmere", "3k", 5),
        (3, Point2::new(60.0, 20.0), "Caldwell Springs", "48k", 20),
        (4, Point2::new(64.0, 24.0), "Dunmore", "900", 1),
    ];
    for (feature, at, name, population, priority) in towns {
        let symbol = PointSymbol::rectangle(at, 2.0, 2.0)?;
        map.add_request(|id| {
            town(id, feature, at, symbol, name, population).with_priority(priority)
        })?;
    }

    map.add_request(|id| {
        LabelRequest::new(
            id,
            FeatureId::new(100),
            RIVERS,
            FeatureGeometry::Line(vec![
                Point2::new(-30.0, -20.0),
                Point2::new(10.0, -12.0),
                Point2::new(50.0, -18.0),
                Point2::new(100.0, -5.0),
            ]),
            LabelContent::single("Silver River"),
            LabelStyle::default(),
        )
        .with_priority(8)
    })?;

    map.add_request(|id| {
        LabelRequest::new(
            id,
            FeatureId::new(200),
            LAKES,
            FeatureGeometry::Area(Polygon::new(vec![
                Point2::new(20.0, 30.0),
                Point2::new(110.0, 30.0),
                Point2::new(120.0, 70.0),
                Point2::new(30.0, 80.0),
            ])),
            LabelContent::single("Lake Meridian"),
            LabelStyle::default(),
        )
        .with_priority(15)
    })?;

    debug!(requests = map.requests().len(), "演示地图构建完成");
    Ok(map)
}
