use tracing::debug;

use crate::command::SequenceCommand;
use crate::context::ExecutionContext;
use crate::errors::EngineError;
use crate::loops::LoopCommand;
use crate::sequence::{CommandId, ExecutionSequence};

/// 循环体的实际起点：不早于外层循环传下来的返回下限。
#[inline]
pub fn effective_loop_start(declared: usize, return_limit: usize) -> usize {
    declared.max(return_limit)
}

/// 对单个注记请求执行一条指令序列。
#[derive(Debug, Clone, Copy)]
pub struct SequenceRunner<'s> {
    sequence: &'s ExecutionSequence,
}

impl<'s> SequenceRunner<'s> {
    pub fn new(sequence: &'s ExecutionSequence) -> Self {
        Self { sequence }
    }

    #[inline]
    pub fn sequence(&self) -> &'s ExecutionSequence {
        self.sequence
    }

    /// 从头执行整条序列，返回请求是否已在某一步得到解决。
    pub fn run(&self, ctx: &mut ExecutionContext<'_>) -> Result<bool, EngineError> {
        self.execute_range(ctx, 0, self.sequence.len(), 0)
    }

    /// 依次执行 `[start, end)` 内的指令，遇到第一个成功即返回。
    pub fn execute_range(
        &self,
        ctx: &mut ExecutionContext<'_>,
        start: usize,
        end: usize,
        return_limit: usize,
    ) -> Result<bool, EngineError> {
        for index in start..end.min(self.sequence.len()) {
            if self.execute_at(ctx, index, return_limit)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// 执行位于 `index` 的指令；`return_limit` 是外层循环允许回退到的最早位置。
    pub fn execute_at(
        &self,
        ctx: &mut ExecutionContext<'_>,
        index: usize,
        return_limit: usize,
    ) -> Result<bool, EngineError> {
        let Some(entry) = self.sequence.entry_at(index) else {
            return Ok(false);
        };
        ctx.record(entry.id);
        debug!(
            request = ctx.request().id().get(),
            command = entry.id.get(),
            kind = entry.command.name(),
            index,
            return_limit,
            "执行指令"
        );

        let id = entry.id;
        match &entry.command {
            SequenceCommand::LinePlacement(command) => command.execute(ctx),
            SequenceCommand::PointPlacement(command) => command.execute(ctx),
            SequenceCommand::AreaPlacement(command) => command.execute(ctx),
            SequenceCommand::Leader(command) => command.execute(ctx),
            SequenceCommand::Failure(command) => command.execute(ctx),
            SequenceCommand::Offset(command) => {
                run_loop(self, ctx, id, index, command, return_limit)
            }
            SequenceCommand::Overhang(command) => {
                run_loop(self, ctx, id, index, command, return_limit)
            }
            SequenceCommand::Overline(command) => {
                run_loop(self, ctx, id, index, command, return_limit)
            }
            SequenceCommand::Overregion(command) => {
                run_loop(self, ctx, id, index, command, return_limit)
            }
            SequenceCommand::Bump(command) => {
                run_loop(self, ctx, id, index, command, return_limit)
            }
            SequenceCommand::BufferSize(command) => {
                run_loop(self, ctx, id, index, command, return_limit)
            }
            SequenceCommand::FontSize(command) => {
                run_loop(self, ctx, id, index, command, return_limit)
            }
            SequenceCommand::Stack(command) => {
                run_loop(self, ctx, id, index, command, return_limit)
            }
            SequenceCommand::Hide(command) => {
                run_loop(self, ctx, id, index, command, return_limit)
            }
        }
    }
}

/// 循环状态机：`reset → (on_loop_reentry → 循环体 → should_loop_terminate)* → loop_done`。
///
/// 循环体为 `[start, index)`，其中 `start` 由 [`effective_loop_start`] 给出，
/// 体内指令以 `start` 作为自己的返回下限。`loop_done` 无论成功、耗尽还是出错
/// 都恰好执行一次。
pub fn run_loop<L: LoopCommand>(
    runner: &SequenceRunner<'_>,
    ctx: &mut ExecutionContext<'_>,
    loop_id: CommandId,
    index: usize,
    command: &L,
    return_limit: usize,
) -> Result<bool, EngineError> {
    if !command.needs_loop_target() {
        command.apply_reset(ctx);
        debug!(command = loop_id.get(), "恢复声明值");
        return Ok(false);
    }

    let declared = command
        .where_to_loop()
        .and_then(|target| runner.sequence().position(target))
        .filter(|position| *position < index)
        .ok_or(EngineError::LoopTargetUnresolved(loop_id.get()))?;
    let start = effective_loop_start(declared, return_limit);

    let mut state = command.reset(ctx);
    let mut iterations = 0usize;
    let outcome = loop {
        match command.on_loop_reentry(&mut state, ctx) {
            Ok(true) => {}
            Ok(false) => break Ok(false),
            Err(err) => break Err(err),
        }
        iterations += 1;
        let succeeded = match runner.execute_range(ctx, start, index, start) {
            Ok(succeeded) => succeeded,
            Err(err) => break Err(err),
        };
        if command.should_loop_terminate(&state, ctx, succeeded) {
            break Ok(succeeded);
        }
    };
    command.loop_done(state, ctx);

    debug!(
        command = loop_id.get(),
        start,
        iterations,
        succeeded = matches!(outcome, Ok(true)),
        "循环结束"
    );
    outcome
}
