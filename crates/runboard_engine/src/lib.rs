//! Runboard engine: backend transport and job status polling.
mod error;
mod machine;
mod transport;
mod types;

pub use error::ClientError;
pub use machine::{JobMachine, MachineSettings, MachineState, Transition};
pub use transport::{ReqwestTransport, Transport, TransportSettings};
pub use types::{
    Job, JobStatus, Project, RecentRun, RunDetails, RunsPage, TaskCounts, TaskDetails,
};
