mod conf;
pub mod error;
pub mod exec;
pub mod instance;
pub mod logs;
pub mod node;
pub mod ports;
pub mod sentinel;
pub mod server;
pub mod state;

pub use error::{BuildError, InstanceError};
pub use exec::{Arch, ExecProvider, Os};
pub use instance::Instance;
pub use logs::{LogBuffer, LogReader};
pub use node::{Node, NodeOutput};
pub use ports::{
    EphemeralPortProvider, PortProvider, PredefinedPortProvider, SequencePortProvider,
    TCP_MAX_PORT,
};
pub use sentinel::SentinelBuilder;
pub use server::ServerBuilder;
pub use state::{InstanceState, StateCell};
