//! tonic service implementation of the supervisor RPC surface: the facade
//! managed services use to register, heartbeat, and report logs, and that
//! operators use to query aggregated node state.

use crate::health::HealthMonitor;
use crate::log_store::{LogEntry as StoreLogEntry, LogFilter as StoreLogFilter, LogStore};
use crate::readiness::ReadinessManager;
use crate::service::{ServiceManager, ServiceState};
use chrono::{TimeZone, Utc};
use redb_common::Health as CommonHealth;
use redb_proto::{
    GetStatusRequest, GetStatusResponse, Health as ProtoHealth, HeartbeatRequest, HeartbeatResponse,
    LogEntry as ProtoLogEntry, LogFilter as ProtoLogFilter, QueryLogsRequest, QueryLogsResponse,
    RegisterRequest, RegisterResponse, ReportLogRequest, ReportLogResponse, ServiceState as ProtoServiceState,
    ServiceStatus, SupervisorRpc, UnregisterRequest, UnregisterResponse,
};
use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{debug, info};

pub struct SupervisorRpcService {
    manager: Arc<ServiceManager>,
    health: Arc<HealthMonitor>,
    log_store: Arc<LogStore>,
    readiness: Arc<ReadinessManager>,
}

impl SupervisorRpcService {
    pub fn new(
        manager: Arc<ServiceManager>,
        health: Arc<HealthMonitor>,
        log_store: Arc<LogStore>,
        readiness: Arc<ReadinessManager>,
    ) -> Self {
        Self {
            manager,
            health,
            log_store,
            readiness,
        }
    }
}

fn to_proto_health(h: CommonHealth) -> i32 {
    match h {
        CommonHealth::Healthy => ProtoHealth::Healthy as i32,
        CommonHealth::Degraded => ProtoHealth::Degraded as i32,
        CommonHealth::Unhealthy => ProtoHealth::Unhealthy as i32,
        CommonHealth::Unknown => ProtoHealth::Unknown as i32,
    }
}

fn from_proto_health(h: i32) -> CommonHealth {
    match ProtoHealth::try_from(h).unwrap_or(ProtoHealth::Unknown) {
        ProtoHealth::Healthy => CommonHealth::Healthy,
        ProtoHealth::Degraded => CommonHealth::Degraded,
        ProtoHealth::Unhealthy => CommonHealth::Unhealthy,
        _ => CommonHealth::Unknown,
    }
}

fn to_proto_state(s: ServiceState) -> i32 {
    match s {
        ServiceState::Pending => ProtoServiceState::Pending as i32,
        ServiceState::Starting => ProtoServiceState::Starting as i32,
        ServiceState::Running => ProtoServiceState::Running as i32,
        ServiceState::Stopping => ProtoServiceState::Stopping as i32,
        ServiceState::Stopped => ProtoServiceState::Stopped as i32,
        ServiceState::Failed => ProtoServiceState::Failed as i32,
    }
}

fn to_timestamp(ts: Option<chrono::DateTime<Utc>>) -> Option<prost_types::Timestamp> {
    ts.map(|t| prost_types::Timestamp {
        seconds: t.timestamp(),
        nanos: t.timestamp_subsec_nanos() as i32,
    })
}

fn from_timestamp(ts: Option<prost_types::Timestamp>) -> Option<chrono::DateTime<Utc>> {
    ts.and_then(|t| Utc.timestamp_opt(t.seconds, t.nanos.max(0) as u32).single())
}

#[tonic::async_trait]
impl SupervisorRpc for SupervisorRpcService {
    async fn register(
        &self,
        request: Request<RegisterRequest>,
    ) -> Result<Response<RegisterResponse>, Status> {
        let req = request.into_inner();
        if self.manager.get(&req.service_name).is_none() {
            return Err(Status::not_found(format!(
                "service '{}' is not configured",
                req.service_name
            )));
        }
        info!(service = %req.service_name, pid = req.pid, "service registered");
        self.manager.register(&req.service_name, req.pid, &req.endpoint);
        Ok(Response::new(RegisterResponse {}))
    }

    async fn unregister(
        &self,
        request: Request<UnregisterRequest>,
    ) -> Result<Response<UnregisterResponse>, Status> {
        let req = request.into_inner();
        self.manager.unregister(&req.service_name);
        Ok(Response::new(UnregisterResponse {}))
    }

    async fn heartbeat(
        &self,
        request: Request<HeartbeatRequest>,
    ) -> Result<Response<HeartbeatResponse>, Status> {
        let req = request.into_inner();
        if self.manager.get(&req.service_name).is_none() {
            return Err(Status::not_found(format!(
                "service '{}' is not configured",
                req.service_name
            )));
        }
        self.manager.heartbeat(&req.service_name, from_proto_health(req.health));
        Ok(Response::new(HeartbeatResponse {}))
    }

    async fn report_log(
        &self,
        request: Request<ReportLogRequest>,
    ) -> Result<Response<ReportLogResponse>, Status> {
        let req = request.into_inner();
        let Some(entry) = req.entry else {
            return Err(Status::invalid_argument("entry is required"));
        };
        self.log_store.append(StoreLogEntry {
            timestamp: from_timestamp(entry.timestamp).unwrap_or_else(Utc::now),
            service_name: entry.service_name,
            level: entry.level,
            message: entry.message,
            fields: entry.fields,
        });
        Ok(Response::new(ReportLogResponse {}))
    }

    async fn get_status(
        &self,
        _request: Request<GetStatusRequest>,
    ) -> Result<Response<GetStatusResponse>, Status> {
        let effective = self.health.snapshot();
        let services = self
            .manager
            .snapshot()
            .into_iter()
            .map(|instance| {
                let health = effective
                    .get(&instance.spec.name)
                    .copied()
                    .unwrap_or(instance.health);
                ServiceStatus {
                    service_name: instance.spec.name.clone(),
                    state: to_proto_state(instance.state),
                    health: to_proto_health(health),
                    pid: instance.pid.unwrap_or(0),
                    registered_at: to_timestamp(instance.registered_at),
                    last_heartbeat_at: to_timestamp(instance.last_heartbeat_at),
                    restart_count: instance.restart_count,
                    last_error: instance.last_error.unwrap_or_default(),
                }
            })
            .collect();

        let readiness = self.readiness.snapshot();
        Ok(Response::new(GetStatusResponse {
            services,
            overall_ready: readiness.overall_ready,
            last_transition_at: to_timestamp(readiness.last_transition_at),
        }))
    }

    async fn query_logs(
        &self,
        request: Request<QueryLogsRequest>,
    ) -> Result<Response<QueryLogsResponse>, Status> {
        let filter = request.into_inner().filter.unwrap_or(ProtoLogFilter {
            service_name: None,
            min_level: None,
            since: None,
            until: None,
            limit: 0,
        });
        debug!(?filter, "querying log store");

        let entries = self.log_store.query(&StoreLogFilter {
            service_name: filter.service_name,
            min_level: filter.min_level,
            since: from_timestamp(filter.since),
            until: from_timestamp(filter.until),
            limit: if filter.limit == 0 {
                None
            } else {
                Some(filter.limit as usize)
            },
        });

        let entries = entries
            .into_iter()
            .map(|e| ProtoLogEntry {
                timestamp: to_timestamp(Some(e.timestamp)),
                service_name: e.service_name,
                level: e.level,
                message: e.message,
                fields: e.fields,
            })
            .collect();

        Ok(Response::new(QueryLogsResponse { entries }))
    }
}
