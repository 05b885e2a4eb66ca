use maplabel_core::label::{HideResult, HideTarget};
use tracing::debug;

use crate::command::{
    BufferSizeCommand, BumpCommand, FontSizeCommand, LoopAction, LoopTarget, OffsetCommand,
    OverhangCommand, OverlineCommand, OverregionCommand, StackCommand,
};
use crate::context::{ExecutionContext, Relaxations};
use crate::errors::EngineError;
use crate::hide::HideCommand;

/// 循环指令的钩子集合。
///
/// 指令本身不保存任何请求相关的状态：每次循环调用由 [`reset`](Self::reset)
/// 生成新的 `State`，循环结束时交还给 [`loop_done`](Self::loop_done)。
/// 驱动这些钩子的状态机见 [`crate::runner::run_loop`]。
pub trait LoopCommand: LoopTarget {
    type State;

    fn reset(&self, ctx: &ExecutionContext<'_>) -> Self::State;

    /// 调整状态，返回是否值得再跑一轮循环体。
    fn on_loop_reentry(
        &self,
        state: &mut Self::State,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<bool, EngineError>;

    fn should_loop_terminate(
        &self,
        _state: &Self::State,
        _ctx: &ExecutionContext<'_>,
        body_succeeded: bool,
    ) -> bool {
        body_succeeded
    }

    /// 恢复循环临时改动的请求状态，每次循环调用恰好执行一次。
    fn loop_done(&self, state: Self::State, ctx: &mut ExecutionContext<'_>);

    /// `Reset` 动作：不跑循环体，直接恢复声明值。
    fn apply_reset(&self, _ctx: &mut ExecutionContext<'_>) {}
}

/// 逐级缩减类循环的状态：进入时的取值与已走的步数。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepState<T> {
    pub entry: T,
    pub step: u32,
}

// LoopAgain 只按当前状态再跑一轮。
fn loop_again(step: &mut u32) -> bool {
    if *step == 0 {
        *step = 1;
        true
    } else {
        false
    }
}

impl LoopCommand for BufferSizeCommand {
    type State = StepState<f64>;

    fn reset(&self, ctx: &ExecutionContext<'_>) -> Self::State {
        StepState {
            entry: ctx.request().buffer(self.buffer_type()),
            step: 0,
        }
    }

    fn on_loop_reentry(
        &self,
        state: &mut Self::State,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<bool, EngineError> {
        if self.action() == LoopAction::LoopAgain {
            return Ok(loop_again(&mut state.step));
        }
        let steps = self.num_buffer_reduction_steps();
        if state.step >= steps {
            return Ok(false);
        }
        state.step += 1;
        let value = state.entry * (1.0 - f64::from(state.step) / f64::from(steps));
        ctx.request_mut()
            .set_buffer(self.buffer_type(), value.max(0.0));
        debug!(
            request = ctx.request().id().get(),
            buffer = ?self.buffer_type(),
            step = state.step,
            value,
            "缩小缓冲区"
        );
        Ok(true)
    }

    fn loop_done(&self, state: Self::State, ctx: &mut ExecutionContext<'_>) {
        ctx.request_mut().set_buffer(self.buffer_type(), state.entry);
    }

    fn apply_reset(&self, ctx: &mut ExecutionContext<'_>) {
        let declared = ctx.request().style.buffers.get(self.buffer_type());
        ctx.request_mut().set_buffer(self.buffer_type(), declared);
    }
}

impl LoopCommand for FontSizeCommand {
    type State = StepState<f64>;

    fn reset(&self, ctx: &ExecutionContext<'_>) -> Self::State {
        StepState {
            entry: ctx.request().font_size(),
            step: 0,
        }
    }

    fn on_loop_reentry(
        &self,
        state: &mut Self::State,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<bool, EngineError> {
        if self.action() == LoopAction::LoopAgain {
            return Ok(loop_again(&mut state.step));
        }
        if state.step >= self.num_font_steps() {
            return Ok(false);
        }
        let next = state.step + 1;
        let size = state.entry * (1.0 - f64::from(next) * self.reduction_percent() / 100.0);
        if size <= 0.0 || size < ctx.options().min_font_size {
            return Ok(false);
        }
        state.step = next;
        ctx.request_mut().set_font_size(size);
        debug!(
            request = ctx.request().id().get(),
            step = next,
            size,
            "缩小字号"
        );
        Ok(true)
    }

    fn loop_done(&self, state: Self::State, ctx: &mut ExecutionContext<'_>) {
        ctx.request_mut().set_font_size(state.entry);
    }

    fn apply_reset(&self, ctx: &mut ExecutionContext<'_>) {
        let declared = ctx.request().style.font_size;
        ctx.request_mut().set_font_size(declared);
    }
}

impl LoopCommand for StackCommand {
    type State = StepState<usize>;

    fn reset(&self, ctx: &ExecutionContext<'_>) -> Self::State {
        StepState {
            entry: ctx.request().stack_lines(),
            step: 0,
        }
    }

    fn on_loop_reentry(
        &self,
        state: &mut Self::State,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<bool, EngineError> {
        if self.action() == LoopAction::LoopAgain {
            return Ok(loop_again(&mut state.step));
        }
        // 第 k 步堆叠为 k + 1 行
        let lines = state.step + 2;
        if lines > self.max_number_of_lines() {
            return Ok(false);
        }
        if !ctx.request_mut().stack(lines as usize) {
            return Ok(false);
        }
        state.step += 1;
        debug!(request = ctx.request().id().get(), lines, "堆叠注记");
        Ok(true)
    }

    fn loop_done(&self, state: Self::State, ctx: &mut ExecutionContext<'_>) {
        let request = ctx.request_mut();
        if state.entry <= 1 || !request.stack(state.entry) {
            request.unstack();
        }
    }

    fn apply_reset(&self, ctx: &mut ExecutionContext<'_>) {
        ctx.request_mut().unstack();
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HideLoopState {
    pub next_attempt: usize,
    /// 当前尝试中由本循环新隐藏的元素（不含原本已隐藏的）。
    pub hidden: Vec<HideTarget>,
}

impl LoopCommand for HideCommand {
    type State = HideLoopState;

    fn reset(&self, _ctx: &ExecutionContext<'_>) -> Self::State {
        HideLoopState::default()
    }

    fn on_loop_reentry(
        &self,
        state: &mut Self::State,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<bool, EngineError> {
        let request = ctx.request_mut();
        for target in state.hidden.drain(..) {
            request.restore(&target);
        }

        while let Some(attempt) = self.attempts().get(state.next_attempt) {
            let index = state.next_attempt;
            state.next_attempt += 1;

            let mut newly_hidden = Vec::new();
            let mut complete = true;
            for target in attempt.targets() {
                let result = request.hide(target);
                if !result.found() {
                    complete = false;
                    break;
                }
                if result == HideResult::Hidden {
                    newly_hidden.push(target.clone());
                }
            }
            // 全部隐藏后注记不可见，同样视为失败的尝试
            if complete && request.has_visible_content() {
                debug!(request = request.id().get(), attempt = index, "隐藏注记元素");
                state.hidden = newly_hidden;
                return Ok(true);
            }
            for target in &newly_hidden {
                request.restore(target);
            }
            debug!(
                request = request.id().get(),
                attempt = index,
                complete,
                "隐藏尝试不可用，跳过"
            );
        }
        Ok(false)
    }

    fn loop_done(&self, state: Self::State, ctx: &mut ExecutionContext<'_>) {
        let request = ctx.request_mut();
        for target in &state.hidden {
            request.restore(target);
        }
    }
}

/// 放宽类循环的状态：进入前的放宽项与是否已生效。
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RelaxationState {
    pub previous: Relaxations,
    pub applied: bool,
}

impl RelaxationState {
    fn capture(ctx: &ExecutionContext<'_>) -> Self {
        Self {
            previous: ctx.relaxations,
            applied: false,
        }
    }

    // 只生效一次，第二次进入即结束循环。
    fn apply(
        &mut self,
        ctx: &mut ExecutionContext<'_>,
        relax: impl FnOnce(&mut Relaxations),
    ) -> bool {
        if self.applied {
            return false;
        }
        self.applied = true;
        relax(&mut ctx.relaxations);
        true
    }
}

impl LoopCommand for OffsetCommand {
    type State = RelaxationState;

    fn reset(&self, ctx: &ExecutionContext<'_>) -> Self::State {
        RelaxationState::capture(ctx)
    }

    fn on_loop_reentry(
        &self,
        state: &mut Self::State,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<bool, EngineError> {
        Ok(state.apply(ctx, |relaxations| relaxations.offset = true))
    }

    fn loop_done(&self, state: Self::State, ctx: &mut ExecutionContext<'_>) {
        ctx.relaxations = state.previous;
    }
}

impl LoopCommand for OverhangCommand {
    type State = RelaxationState;

    fn reset(&self, ctx: &ExecutionContext<'_>) -> Self::State {
        RelaxationState::capture(ctx)
    }

    fn on_loop_reentry(
        &self,
        state: &mut Self::State,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<bool, EngineError> {
        let amount = self.overhang_amount();
        Ok(state.apply(ctx, |relaxations| relaxations.overhang = Some(amount)))
    }

    fn loop_done(&self, state: Self::State, ctx: &mut ExecutionContext<'_>) {
        ctx.relaxations = state.previous;
    }
}

impl LoopCommand for OverlineCommand {
    type State = RelaxationState;

    fn reset(&self, ctx: &ExecutionContext<'_>) -> Self::State {
        RelaxationState::capture(ctx)
    }

    fn on_loop_reentry(
        &self,
        state: &mut Self::State,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<bool, EngineError> {
        Ok(state.apply(ctx, |relaxations| relaxations.overline = true))
    }

    fn loop_done(&self, state: Self::State, ctx: &mut ExecutionContext<'_>) {
        ctx.relaxations = state.previous;
    }
}

impl LoopCommand for OverregionCommand {
    type State = RelaxationState;

    fn reset(&self, ctx: &ExecutionContext<'_>) -> Self::State {
        RelaxationState::capture(ctx)
    }

    fn on_loop_reentry(
        &self,
        state: &mut Self::State,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<bool, EngineError> {
        Ok(state.apply(ctx, |relaxations| relaxations.overregion = true))
    }

    fn loop_done(&self, state: Self::State, ctx: &mut ExecutionContext<'_>) {
        ctx.relaxations = state.previous;
    }
}

impl LoopCommand for BumpCommand {
    type State = RelaxationState;

    fn reset(&self, ctx: &ExecutionContext<'_>) -> Self::State {
        RelaxationState::capture(ctx)
    }

    fn on_loop_reentry(
        &self,
        state: &mut Self::State,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<bool, EngineError> {
        Ok(state.apply(ctx, |relaxations| relaxations.bump = true))
    }

    fn loop_done(&self, state: Self::State, ctx: &mut ExecutionContext<'_>) {
        ctx.relaxations = state.previous;
    }
}

#[cfg(test)]
mod tests {
    use maplabel_core::geometry::Point2;
    use maplabel_core::label::{
        BufferType, FeatureGeometry, FeatureId, LabelContent, LabelRequest, LabelStyle,
        RequestId, SymbolComponent, TextObject,
    };

    use super::*;
    use crate::context::{PlacementOptions, PlacementWorkspace};

    fn request() -> LabelRequest {
        let content = LabelContent::default()
            .with_text_object(
                TextObject::new("name")
                    .component("first", "Lake")
                    .component("second", "Superior"),
            )
            .with_symbol(SymbolComponent::new("badge", 2.0, 2.0));
        LabelRequest::new(
            RequestId::new(1),
            FeatureId::new(1),
            "lakes",
            FeatureGeometry::Point(Point2::new(0.0, 0.0)),
            content,
            LabelStyle::default(),
        )
    }

    #[test]
    fn buffer_reduces_to_zero_in_declared_steps() {
        let mut workspace = PlacementWorkspace::new(PlacementOptions::default());
        let mut label = request();
        label.set_buffer(BufferType::Label, 4.0);
        let mut ctx = ExecutionContext::new(&mut workspace, &mut label);
        let command = BufferSizeCommand::new(BufferType::Label, 4).unwrap();

        let mut state = command.reset(&ctx);
        let mut seen = Vec::new();
        while command.on_loop_reentry(&mut state, &mut ctx).unwrap() {
            seen.push(ctx.request().buffer(BufferType::Label));
        }
        assert_eq!(seen, vec![3.0, 2.0, 1.0, 0.0]);
        command.loop_done(state, &mut ctx);
        assert!((ctx.request().buffer(BufferType::Label) - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn font_reduction_stops_at_minimum_size() {
        let mut workspace = PlacementWorkspace::new(PlacementOptions {
            min_font_size: 6.0,
            ..PlacementOptions::default()
        });
        let mut label = request();
        let mut ctx = ExecutionContext::new(&mut workspace, &mut label);
        let command = FontSizeCommand::new(10, 20.0).unwrap();

        let mut state = command.reset(&ctx);
        let mut sizes = Vec::new();
        while command.on_loop_reentry(&mut state, &mut ctx).unwrap() {
            sizes.push(ctx.request().font_size());
        }
        assert_eq!(sizes.len(), 2);
        assert!((sizes[0] - 8.0).abs() < 1e-9);
        assert!((sizes[1] - 6.0).abs() < 1e-9);
        command.loop_done(state, &mut ctx);
        assert!((ctx.request().font_size() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn loop_again_runs_body_once() {
        let mut workspace = PlacementWorkspace::new(PlacementOptions::default());
        let mut label = request();
        let mut ctx = ExecutionContext::new(&mut workspace, &mut label);
        let command = FontSizeCommand::new(3, 10.0)
            .unwrap()
            .with_action(LoopAction::LoopAgain);
        let mut state = command.reset(&ctx);
        assert!(command.on_loop_reentry(&mut state, &mut ctx).unwrap());
        assert!((ctx.request().font_size() - 10.0).abs() < 1e-9);
        assert!(!command.on_loop_reentry(&mut state, &mut ctx).unwrap());
    }

    #[test]
    fn stack_stops_when_words_run_out() {
        let mut workspace = PlacementWorkspace::new(PlacementOptions::default());
        let mut label = request();
        let mut ctx = ExecutionContext::new(&mut workspace, &mut label);
        let command = StackCommand::new(5).unwrap();
        let mut state = command.reset(&ctx);
        assert!(command.on_loop_reentry(&mut state, &mut ctx).unwrap());
        assert_eq!(ctx.request().lines(), vec!["Lake", "Superior"]);
        // 只有两个单词，三行堆叠不成立
        assert!(!command.on_loop_reentry(&mut state, &mut ctx).unwrap());
        command.loop_done(state, &mut ctx);
        assert_eq!(ctx.request().stack_lines(), 1);
    }

    #[test]
    fn hide_skips_attempts_with_missing_elements() {
        let mut workspace = PlacementWorkspace::new(PlacementOptions::default());
        let mut label = request();
        let mut ctx = ExecutionContext::new(&mut workspace, &mut label);
        let command = HideCommand::parse("TC(first)&SC(missing), SC(badge), TC(second)").unwrap();
        let mut state = command.reset(&ctx);

        assert!(command.on_loop_reentry(&mut state, &mut ctx).unwrap());
        // 第一组缺少元素，已回滚
        assert_eq!(
            ctx.request().hidden_elements(),
            vec![HideTarget::SymbolComponent("badge".to_string())]
        );
        assert!(command.on_loop_reentry(&mut state, &mut ctx).unwrap());
        assert_eq!(
            ctx.request().hidden_elements(),
            vec![HideTarget::TextComponent("second".to_string())]
        );
        assert!(!command.on_loop_reentry(&mut state, &mut ctx).unwrap());
        command.loop_done(state, &mut ctx);
        assert!(ctx.request().hidden_elements().is_empty());
    }

    #[test]
    fn hide_skips_attempts_that_leave_nothing_visible() {
        let mut workspace = PlacementWorkspace::new(PlacementOptions::default());
        let mut label = request();
        let mut ctx = ExecutionContext::new(&mut workspace, &mut label);
        let command = HideCommand::parse("TO(name)&SC(badge), TC(first)").unwrap();
        let mut state = command.reset(&ctx);

        assert!(command.on_loop_reentry(&mut state, &mut ctx).unwrap());
        assert_eq!(
            ctx.request().hidden_elements(),
            vec![HideTarget::TextComponent("first".to_string())]
        );
        assert!(ctx.request().has_visible_content());
        assert!(!command.on_loop_reentry(&mut state, &mut ctx).unwrap());
        command.loop_done(state, &mut ctx);
        assert!(ctx.request().hidden_elements().is_empty());
    }

    #[test]
    fn hide_does_not_restore_elements_hidden_before_the_loop() {
        let mut workspace = PlacementWorkspace::new(PlacementOptions::default());
        let mut label = request();
        label.hide(&HideTarget::SymbolComponent("badge".to_string()));
        let mut ctx = ExecutionContext::new(&mut workspace, &mut label);
        let command = HideCommand::parse("SC(badge)&TC(first)").unwrap();
        let mut state = command.reset(&ctx);
        assert!(command.on_loop_reentry(&mut state, &mut ctx).unwrap());
        command.loop_done(state, &mut ctx);
        assert_eq!(
            ctx.request().hidden_elements(),
            vec![HideTarget::SymbolComponent("badge".to_string())]
        );
    }

    #[test]
    fn relaxations_fire_once_and_restore() {
        let mut workspace = PlacementWorkspace::new(PlacementOptions::default());
        let mut label = request();
        let mut ctx = ExecutionContext::new(&mut workspace, &mut label);
        let command = OverhangCommand::new(25.0).unwrap();
        let mut state = command.reset(&ctx);
        assert!(command.on_loop_reentry(&mut state, &mut ctx).unwrap());
        assert_eq!(ctx.relaxations.overhang, Some(25.0));
        assert!(!command.on_loop_reentry(&mut state, &mut ctx).unwrap());
        command.loop_done(state, &mut ctx);
        assert_eq!(ctx.relaxations, Relaxations::default());
    }

    #[test]
    fn reset_action_restores_declared_values() {
        let mut workspace = PlacementWorkspace::new(PlacementOptions::default());
        let mut label = request();
        label.set_font_size(4.0);
        label.set_buffer(BufferType::Feature, 0.0);
        let mut ctx = ExecutionContext::new(&mut workspace, &mut label);
        FontSizeCommand::new(2, 10.0).unwrap().apply_reset(&mut ctx);
        BufferSizeCommand::new(BufferType::Feature, 2)
            .unwrap()
            .apply_reset(&mut ctx);
        assert!((ctx.request().font_size() - 10.0).abs() < 1e-9);
        assert!((ctx.request().buffer(BufferType::Feature) - 1.0).abs() < 1e-9);
    }
}
