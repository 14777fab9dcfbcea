mod buffer;
pub mod interpreter;
mod model;
mod orchestrator;

pub use buffer::{consume_complete_lines, LineBuffer, OutputBuffer, OUTPUT_HIGH_WATER, OUTPUT_KEEP};
pub use interpreter::InterpreterHooks;
pub use model::{
    DevServer, PrintState, Session, SessionKind, SessionSnapshot, SessionStatus, Workspace,
};
pub use orchestrator::{
    CreateSessionRequest, Orchestrator, ProcessEvent, ProcessRole, ProcessSignal, SessionSource,
    DEFAULT_RUNTIME_ID,
};
