pub mod config;
pub mod errors;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod tools;
pub mod transport;
pub mod worker;

pub use config::{Cli, FilterVocabulary};
pub use errors::{ErrorCode, StartError, ToolError, TransportError};
pub use logging::{ChannelLogSink, LogLevel, LogSink, TracingLogSink};
pub use protocol::{RequestId, ToolCall, ToolReply};
pub use server::{GatewayServer, Phase, ServerOptions, ServerState};
pub use transport::{Transport, TransportEvent, TransportFactory, TransportKind};
