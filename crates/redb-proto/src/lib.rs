//! Generated protocol buffer bindings for the reDB supervisor RPC surface.
//!
//! Downstream crates should use the re-exports at the crate root rather than
//! reaching into the generated module path directly.

pub mod supervisor {
    pub mod v1 {
        tonic::include_proto!("supervisor.v1");
    }
}

pub use supervisor::v1::{
    GetStatusRequest, GetStatusResponse, Health, HeartbeatRequest, HeartbeatResponse, LogEntry,
    LogFilter, QueryLogsRequest, QueryLogsResponse, RegisterRequest, RegisterResponse,
    ReportLogRequest, ReportLogResponse, ServiceState, ServiceStatus, UnregisterRequest,
    UnregisterResponse,
    supervisor_rpc_client::SupervisorRpcClient,
    supervisor_rpc_server::{SupervisorRpc, SupervisorRpcServer},
};
