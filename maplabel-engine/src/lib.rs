pub mod command;
pub mod context;
pub mod hide;
pub mod index;
pub mod loops;
pub mod map;
pub mod metrics;
pub mod placement;
pub mod runner;
pub mod sequence;

pub mod errors {
    use maplabel_core::errors::GeometryError;
    use thiserror::Error;

    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum EngineError {
        #[error("no previous command can serve as loop target")]
        NoPreviousCommand,
        #[error("loop target {0} is not a compatible placement command")]
        PreviousCommandNotPlacementType(u64),
        #[error("command {0} is not a loop command")]
        NotALoopCommand(u64),
        #[error("command with id {0} not found")]
        CommandNotFound(u64),
        #[error("loop command {0} has no resolved loop target")]
        LoopTargetUnresolved(u64),
        #[error("{name} must be positive, got {value}")]
        MustBePositive { name: &'static str, value: f64 },
        #[error("overhang amount must be greater than zero, got {0}")]
        OverhangMustBeGreaterThanZero(f64),
        #[error("hide attempt parse error at offset {offset}: {message}")]
        ParseError { offset: usize, message: String },
        #[error("hide command initialized without hide attempts")]
        CommandInitializedWithNullHideAttempts,
        #[error(transparent)]
        Geometry(#[from] GeometryError),
    }
}
