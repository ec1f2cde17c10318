pub mod assembler;
pub mod emitter;
mod feed;
pub mod state;

pub use assembler::{StartOptions, StreamingAssembler};
pub use emitter::{
    AssemblerEvent, BufferGrowth, CardUpdate, EventKind, EventReceiver, StageTransition,
    UpdateEmitter,
};
pub use feed::SessionFeeder;
pub use state::{InvalidTransition, StageMachine, StreamStage, StreamingState};
