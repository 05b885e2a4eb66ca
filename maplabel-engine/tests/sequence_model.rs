use maplabel_core::label::{BufferType, FeatureType};
use maplabel_engine::command::{
    AreaPlacementCommand, AreaStrategy, BufferSizeCommand, Compass, FailureAction, FailureCommand,
    FontSizeCommand, LineSide, LinePlacementCommand, OverhangCommand, PointPlacementCommand,
    SequenceCommand,
};
use maplabel_engine::errors::EngineError;
use maplabel_engine::hide::HideCommand;
use maplabel_engine::sequence::ExecutionSequence;

#[test]
fn loop_without_any_placement_has_no_target() {
    let mut sequence = ExecutionSequence::new();
    let err = sequence
        .add_element(FontSizeCommand::new(3, 10.0).expect("字号指令参数无效"))
        .unwrap_err();
    assert_eq!(err, EngineError::NoPreviousCommand);
    assert!(sequence.is_empty());
}

#[test]
fn default_target_is_most_recent_compatible_command() {
    let mut sequence = ExecutionSequence::new();
    sequence
        .add_element(PointPlacementCommand::new(vec![Compass::E], 0.0))
        .expect("添加点放置指令失败");
    let area = sequence
        .add_element(AreaPlacementCommand::new(AreaStrategy::InteriorHorizontal))
        .expect("添加面放置指令失败");
    let shrink = sequence
        .add_element(FontSizeCommand::new(3, 10.0).expect("字号指令参数无效"))
        .expect("添加字号指令失败");

    let target = sequence
        .get(shrink)
        .and_then(SequenceCommand::as_loop)
        .and_then(|looping| looping.where_to_loop());
    assert_eq!(target, Some(area));
}

#[test]
fn explicit_target_must_be_compatible() {
    let mut sequence = ExecutionSequence::new();
    let line = sequence
        .add_element(LinePlacementCommand::new(LineSide::Above))
        .expect("添加线放置指令失败");
    let hide = sequence
        .add_element(HideCommand::parse("TC(name)").expect("隐藏规格无效"))
        .expect("添加隐藏指令失败");

    let err = sequence
        .add_loop_command(
            SequenceCommand::from(
                BufferSizeCommand::new(BufferType::Label, 2).expect("缓冲区指令参数无效"),
            ),
            Some(hide),
        )
        .unwrap_err();
    assert_eq!(err, EngineError::PreviousCommandNotPlacementType(hide.get()));

    let err = sequence
        .add_loop_command(SequenceCommand::from(FailureCommand::new(FailureAction::Force)), Some(line))
        .unwrap_err();
    assert!(matches!(err, EngineError::NotALoopCommand(_)));
    assert_eq!(sequence.len(), 2);
}

#[test]
fn buffer_loops_chain_only_through_same_buffer_type() {
    let mut sequence = ExecutionSequence::new();
    let line = sequence
        .add_element(LinePlacementCommand::new(LineSide::Middle))
        .expect("添加线放置指令失败");
    let label_buffer = sequence
        .add_element(BufferSizeCommand::new(BufferType::Label, 2).expect("缓冲区指令参数无效"))
        .expect("添加缓冲区指令失败");
    let feature_buffer = sequence
        .add_element(BufferSizeCommand::new(BufferType::Feature, 2).expect("缓冲区指令参数无效"))
        .expect("添加缓冲区指令失败");
    let second_label_buffer = sequence
        .add_element(BufferSizeCommand::new(BufferType::Label, 4).expect("缓冲区指令参数无效"))
        .expect("添加缓冲区指令失败");

    let target_of = |id| {
        sequence
            .get(id)
            .and_then(SequenceCommand::as_loop)
            .and_then(|looping| looping.where_to_loop())
    };
    assert_eq!(target_of(label_buffer), Some(line));
    assert_eq!(target_of(feature_buffer), Some(line));
    assert_eq!(target_of(second_label_buffer), Some(label_buffer));
}

#[test]
fn clone_is_independent_and_keeps_targets() {
    let mut original = ExecutionSequence::new();
    let line = original
        .add_element(LinePlacementCommand::new(LineSide::Above))
        .expect("添加线放置指令失败");
    let overhang = original
        .add_element(OverhangCommand::new(10.0).expect("悬挑参数无效"))
        .expect("添加悬挑指令失败");

    let mut copy = original.clone();
    match copy.get_mut(overhang) {
        Some(SequenceCommand::Overhang(command)) => {
            command.set_overhang_amount(40.0).expect("设置悬挑失败")
        }
        other => panic!("unexpected command {other:?}"),
    }
    let later = copy
        .add_element(FailureCommand::new(FailureAction::Suppress))
        .expect("添加失败处理指令失败");

    match original.get(overhang) {
        Some(SequenceCommand::Overhang(command)) => {
            assert!((command.overhang_amount() - 10.0).abs() < f64::EPSILON)
        }
        other => panic!("unexpected command {other:?}"),
    }
    assert_eq!(original.len(), 2);
    assert!(original.get(later).is_none());
    let target = copy
        .get(overhang)
        .and_then(SequenceCommand::as_loop)
        .and_then(|looping| looping.where_to_loop());
    assert_eq!(target, Some(line));
}

#[test]
fn failing_cloner_aborts_copy() {
    let mut sequence = ExecutionSequence::new();
    sequence
        .add_element(PointPlacementCommand::around())
        .expect("添加点放置指令失败");
    let result = sequence.try_clone_with(|_| Err(EngineError::NoPreviousCommand));
    assert_eq!(result.unwrap_err(), EngineError::NoPreviousCommand);

    let copy = sequence
        .try_clone_with(|command| Ok(command.clone()))
        .expect("复制序列失败");
    assert_eq!(copy, sequence);
}

#[test]
fn sequence_round_trips_through_json_with_variant_tags() {
    let mut sequence = ExecutionSequence::new();
    sequence
        .add_element(PointPlacementCommand::around())
        .expect("添加点放置指令失败");
    sequence
        .add_element(FontSizeCommand::new(2, 15.0).expect("字号指令参数无效"))
        .expect("添加字号指令失败");
    sequence
        .add_element(HideCommand::parse("SC(shield),L(2)").expect("隐藏规格无效"))
        .expect("添加隐藏指令失败");

    let json = serde_json::to_string(&sequence).expect("序列化失败");
    assert!(json.contains("\"FontSize\""));
    assert!(json.contains("\"Hide\""));
    let restored: ExecutionSequence = serde_json::from_str(&json).expect("反序列化失败");
    assert_eq!(restored, sequence);
}

#[test]
fn constructors_reject_invalid_parameters() {
    assert_eq!(
        BufferSizeCommand::new(BufferType::Label, 0).unwrap_err(),
        EngineError::MustBePositive {
            name: "num_buffer_steps",
            value: 0.0
        }
    );
    assert_eq!(
        OverhangCommand::new(0.0).unwrap_err(),
        EngineError::OverhangMustBeGreaterThanZero(0.0)
    );

    let mut overhang = OverhangCommand::new(5.0).expect("悬挑参数无效");
    assert!(overhang.set_overhang_amount(-1.0).is_err());
    assert!((overhang.overhang_amount() - 5.0).abs() < f64::EPSILON);

    let mut buffer = BufferSizeCommand::new(BufferType::Feature, 3).expect("缓冲区指令参数无效");
    assert!(buffer.set_num_buffer_reduction_steps(-2).is_err());
    assert_eq!(buffer.num_buffer_reduction_steps(), 3);
}

#[test]
fn validation_reports_misplaced_failure_command() {
    let mut sequence = ExecutionSequence::new();
    sequence
        .add_element(PointPlacementCommand::around())
        .expect("添加点放置指令失败");
    sequence
        .add_element(FailureCommand::new(FailureAction::Suppress))
        .expect("添加失败处理指令失败");
    sequence
        .add_element(PointPlacementCommand::new(vec![Compass::OnPoint], 0.0))
        .expect("添加点放置指令失败");

    assert!(!sequence.validate(FeatureType::Point).is_empty());
    assert!(!sequence.validate(FeatureType::Line).is_empty());
}
