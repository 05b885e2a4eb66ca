use maplabel_core::label::FeatureType;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::{CommandType, SequenceCommand, ValidationFinding};
use crate::errors::EngineError;

/// 序列内指令的稳定编号，删除指令后不会复用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommandId(u64);

impl CommandId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceEntry {
    pub id: CommandId,
    pub command: SequenceCommand,
}

/// 一个注记类共享的有序指令序列。
///
/// 循环指令通过 [`CommandId`] 引用序列中更早的指令；插入时即解析默认目标，
/// 解析失败的插入不会改变序列。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSequence {
    entries: Vec<SequenceEntry>,
    next_command_id: u64,
}

impl Default for ExecutionSequence {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_command_id: 1,
        }
    }
}

impl ExecutionSequence {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SequenceEntry> {
        self.entries.iter()
    }

    #[inline]
    pub fn entry_at(&self, index: usize) -> Option<&SequenceEntry> {
        self.entries.get(index)
    }

    pub fn position(&self, id: CommandId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id == id)
    }

    pub fn get(&self, id: CommandId) -> Option<&SequenceCommand> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| &entry.command)
    }

    pub fn get_mut(&mut self, id: CommandId) -> Option<&mut SequenceCommand> {
        self.entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .map(|entry| &mut entry.command)
    }

    /// 追加指令。未指定目标的循环指令会解析默认返回目标。
    pub fn add_element(
        &mut self,
        command: impl Into<SequenceCommand>,
    ) -> Result<CommandId, EngineError> {
        let command = command.into();
        match command.as_loop().map(|looping| looping.where_to_loop()) {
            Some(target) => self.add_loop_command(command, target),
            None => Ok(self.push(command)),
        }
    }

    /// 追加循环指令；`target` 为 `None` 时在已插入的指令中倒序查找默认目标。
    pub fn add_loop_command(
        &mut self,
        mut command: SequenceCommand,
        target: Option<CommandId>,
    ) -> Result<CommandId, EngineError> {
        let Some(looping) = command.as_loop() else {
            return Err(EngineError::NotALoopCommand(self.next_command_id));
        };

        let resolved = match target {
            Some(id) => {
                let candidate = self.get(id).ok_or(EngineError::NoPreviousCommand)?;
                if !looping.is_command_loop_target(candidate) {
                    return Err(EngineError::PreviousCommandNotPlacementType(id.get()));
                }
                Some(id)
            }
            None if !looping.needs_loop_target() => None,
            None => Some(
                self.entries
                    .iter()
                    .rev()
                    .find(|entry| looping.is_command_loop_target(&entry.command))
                    .map(|entry| entry.id)
                    .ok_or(EngineError::NoPreviousCommand)?,
            ),
        };

        if let Some(looping) = command.as_loop_mut() {
            looping.set_where_to_loop(resolved);
        }
        let id = self.push(command);
        debug!(
            command = id.get(),
            target = resolved.map(CommandId::get),
            "循环指令已解析返回目标"
        );
        Ok(id)
    }

    /// 重新指定循环目标；目标必须位于循环指令之前且类型兼容。
    pub fn set_loop_target(
        &mut self,
        loop_id: CommandId,
        target: CommandId,
    ) -> Result<(), EngineError> {
        let loop_index = self
            .position(loop_id)
            .ok_or(EngineError::CommandNotFound(loop_id.get()))?;
        let target_index = self
            .position(target)
            .filter(|index| *index < loop_index)
            .ok_or(EngineError::NoPreviousCommand)?;

        let (before, after) = self.entries.split_at_mut(loop_index);
        let candidate = &before[target_index].command;
        let looping = after[0]
            .command
            .as_loop_mut()
            .ok_or(EngineError::NotALoopCommand(loop_id.get()))?;
        if !looping.is_command_loop_target(candidate) {
            return Err(EngineError::PreviousCommandNotPlacementType(target.get()));
        }
        looping.set_where_to_loop(Some(target));
        Ok(())
    }

    /// 删除指令。引用它的循环指令不会被改写，之后由 [`validate`](Self::validate)
    /// 报告，执行时返回 `LoopTargetUnresolved`。
    pub fn remove(&mut self, id: CommandId) -> Option<SequenceCommand> {
        let index = self.position(id)?;
        Some(self.entries.remove(index).command)
    }

    /// 使用自定义复制策略深拷贝序列，保留全部指令编号。
    pub fn try_clone_with<F>(&self, mut cloner: F) -> Result<Self, EngineError>
    where
        F: FnMut(&SequenceCommand) -> Result<SequenceCommand, EngineError>,
    {
        let mut entries = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            entries.push(SequenceEntry {
                id: entry.id,
                command: cloner(&entry.command)?,
            });
        }
        Ok(Self {
            entries,
            next_command_id: self.next_command_id,
        })
    }

    /// 汇总每条指令针对 `feature_type` 的校验结果及序列结构问题。
    pub fn validate(&self, feature_type: FeatureType) -> Vec<ValidationFinding> {
        let mut findings = Vec::new();
        let last = self.entries.len().saturating_sub(1);
        for (index, entry) in self.entries.iter().enumerate() {
            let tag = entry.command.tag();
            for mut finding in entry.command.validate(feature_type) {
                finding.command = Some(entry.id);
                findings.push(finding);
            }

            if tag.command_type == CommandType::Failure && index != last {
                findings.push(ValidationFinding {
                    command: Some(entry.id),
                    tag,
                    message: "failure command is not the last command".to_string(),
                });
            }

            let Some(looping) = entry.command.as_loop() else {
                continue;
            };
            if !looping.needs_loop_target() {
                continue;
            }
            let message = match looping.where_to_loop() {
                None => Some("loop command has no loop target".to_string()),
                Some(target) => match self.position(target) {
                    None => Some(format!("loop target {} no longer exists", target.get())),
                    Some(position) if position >= index => Some(format!(
                        "loop target {} does not precede the loop command",
                        target.get()
                    )),
                    Some(_) => None,
                },
            };
            if let Some(message) = message {
                findings.push(ValidationFinding {
                    command: Some(entry.id),
                    tag,
                    message,
                });
            }
        }
        findings
    }

    fn push(&mut self, command: SequenceCommand) -> CommandId {
        let id = CommandId::new(self.next_command_id);
        self.next_command_id += 1;
        self.entries.push(SequenceEntry { id, command });
        id
    }
}

#[cfg(test)]
mod tests {
    use maplabel_core::label::BufferType;

    use super::*;
    use crate::command::{
        BufferSizeCommand, Compass, FailureAction, FailureCommand, FontSizeCommand, LineSide,
        LinePlacementCommand, LoopAction, OverhangCommand, PointPlacementCommand,
        StackCommand,
    };

    fn loop_target_of(sequence: &ExecutionSequence, id: CommandId) -> Option<CommandId> {
        sequence.get(id)?.as_loop()?.where_to_loop()
    }

    #[test]
    fn loop_without_previous_placement_fails() {
        let mut sequence = ExecutionSequence::new();
        let err = sequence
            .add_element(BufferSizeCommand::new(BufferType::Label, 3).unwrap())
            .unwrap_err();
        assert_eq!(err, EngineError::NoPreviousCommand);
        assert!(sequence.is_empty());
    }

    #[test]
    fn default_target_is_most_recent_compatible_command() {
        let mut sequence = ExecutionSequence::new();
        let first = sequence.add_element(PointPlacementCommand::around()).unwrap();
        let second = sequence
            .add_element(PointPlacementCommand::new(vec![Compass::OnPoint], 0.0))
            .unwrap();
        let looping = sequence
            .add_element(FontSizeCommand::new(2, 10.0).unwrap())
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(loop_target_of(&sequence, looping), Some(second));
    }

    #[test]
    fn default_target_skips_incompatible_commands() {
        let mut sequence = ExecutionSequence::new();
        let line = sequence
            .add_element(LinePlacementCommand::new(LineSide::Above))
            .unwrap();
        let font = sequence
            .add_element(FontSizeCommand::new(2, 10.0).unwrap())
            .unwrap();
        let overhang = sequence
            .add_element(OverhangCommand::new(20.0).unwrap())
            .unwrap();
        assert_eq!(loop_target_of(&sequence, font), Some(line));
        assert_eq!(loop_target_of(&sequence, overhang), Some(line));
    }

    #[test]
    fn buffer_loops_chain_only_on_matching_type() {
        let mut sequence = ExecutionSequence::new();
        let point = sequence.add_element(PointPlacementCommand::around()).unwrap();
        let label = sequence
            .add_element(BufferSizeCommand::new(BufferType::Label, 2).unwrap())
            .unwrap();
        let feature = sequence
            .add_element(BufferSizeCommand::new(BufferType::Feature, 2).unwrap())
            .unwrap();
        let label_again = sequence
            .add_element(BufferSizeCommand::new(BufferType::Label, 2).unwrap())
            .unwrap();
        assert_eq!(loop_target_of(&sequence, label), Some(point));
        assert_eq!(loop_target_of(&sequence, feature), Some(point));
        assert_eq!(loop_target_of(&sequence, label_again), Some(label));

        let err = sequence
            .add_loop_command(
                BufferSizeCommand::new(BufferType::Feature, 1).unwrap().into(),
                Some(label),
            )
            .unwrap_err();
        assert_eq!(err, EngineError::PreviousCommandNotPlacementType(label.get()));
    }

    #[test]
    fn explicit_target_must_exist() {
        let mut sequence = ExecutionSequence::new();
        sequence.add_element(PointPlacementCommand::around()).unwrap();
        let err = sequence
            .add_loop_command(
                StackCommand::new(3).unwrap().into(),
                Some(CommandId::new(99)),
            )
            .unwrap_err();
        assert_eq!(err, EngineError::NoPreviousCommand);

        let err = sequence
            .add_loop_command(FailureCommand::new(FailureAction::Suppress).into(), None)
            .unwrap_err();
        assert!(matches!(err, EngineError::NotALoopCommand(_)));
    }

    #[test]
    fn reset_action_needs_no_target() {
        let mut sequence = ExecutionSequence::new();
        let id = sequence
            .add_element(
                FontSizeCommand::new(2, 10.0)
                    .unwrap()
                    .with_action(LoopAction::Reset),
            )
            .unwrap();
        assert_eq!(loop_target_of(&sequence, id), None);
        assert!(sequence.validate(FeatureType::Point).is_empty());
    }

    #[test]
    fn ids_are_not_reused_after_removal() {
        let mut sequence = ExecutionSequence::new();
        let first = sequence.add_element(PointPlacementCommand::around()).unwrap();
        assert!(sequence.remove(first).is_some());
        let second = sequence.add_element(PointPlacementCommand::around()).unwrap();
        assert_ne!(first, second);
        assert_eq!(sequence.position(second), Some(0));
        assert!(sequence.remove(first).is_none());
    }

    #[test]
    fn set_loop_target_checks_order_and_type() {
        let mut sequence = ExecutionSequence::new();
        let a = sequence.add_element(PointPlacementCommand::around()).unwrap();
        let b = sequence
            .add_element(PointPlacementCommand::new(vec![Compass::OnPoint], 0.0))
            .unwrap();
        let stack = sequence.add_element(StackCommand::new(3).unwrap()).unwrap();
        let failure = sequence
            .add_element(FailureCommand::new(FailureAction::Suppress))
            .unwrap();

        sequence.set_loop_target(stack, a).unwrap();
        assert_eq!(loop_target_of(&sequence, stack), Some(a));
        assert_eq!(
            sequence.set_loop_target(stack, failure).unwrap_err(),
            EngineError::NoPreviousCommand
        );
        assert_eq!(
            sequence.set_loop_target(failure, b).unwrap_err(),
            EngineError::NotALoopCommand(failure.get())
        );
    }

    #[test]
    fn validate_reports_dangling_targets_and_misplaced_failure() {
        let mut sequence = ExecutionSequence::new();
        let point = sequence.add_element(PointPlacementCommand::around()).unwrap();
        sequence
            .add_element(FailureCommand::new(FailureAction::Force))
            .unwrap();
        let stack = sequence.add_element(StackCommand::new(2).unwrap()).unwrap();
        sequence.remove(point);

        let findings = sequence.validate(FeatureType::Point);
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().any(|f| f.message.contains("last command")));
        assert!(
            findings
                .iter()
                .any(|f| f.command == Some(stack) && f.message.contains("no longer exists"))
        );
    }

    #[test]
    fn clone_preserves_ids_and_targets() {
        let mut sequence = ExecutionSequence::new();
        let point = sequence.add_element(PointPlacementCommand::around()).unwrap();
        let buffer = sequence
            .add_element(BufferSizeCommand::new(BufferType::Label, 4).unwrap())
            .unwrap();

        let mut copy = sequence.try_clone_with(|command| Ok(command.clone())).unwrap();
        assert_eq!(copy, sequence);
        assert_eq!(loop_target_of(&copy, buffer), Some(point));

        if let Some(SequenceCommand::BufferSize(command)) = copy.get_mut(buffer) {
            command.set_num_buffer_reduction_steps(1).unwrap();
        }
        match sequence.get(buffer) {
            Some(SequenceCommand::BufferSize(command)) => {
                assert_eq!(command.num_buffer_reduction_steps(), 4)
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let err = sequence
            .try_clone_with(|_| Err(EngineError::CommandNotFound(0)))
            .unwrap_err();
        assert_eq!(err, EngineError::CommandNotFound(0));
    }
}
