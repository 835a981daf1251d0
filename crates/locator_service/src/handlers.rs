use std::sync::Arc;
use std::time::{Duration, Instant};

use locator_core::{
    Deadline, FindOutcome, GeoPoint, Locator, LocatorError, ProfileRecord, UpsertOutcome,
};
use tracing::{info, warn};

use crate::contract::{
    DriverDetails, FindNearestDriverRequest, RegisterUserLoginRequest, ServiceReply, ServiceRequest,
    UpdateLocationRequest, ERROR_NO_DRIVER_NEARBY, STATUS_BAD_REQUEST, STATUS_NOT_FOUND,
    STATUS_TIMEOUT, STATUS_UNAVAILABLE,
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(2_000);

/// Status code for a locator failure.
pub fn status_for(error: &LocatorError) -> u16 {
    match error {
        LocatorError::InvalidInput(_) => STATUS_BAD_REQUEST,
        LocatorError::ProfileNotFound { .. } => STATUS_NOT_FOUND,
        LocatorError::StoreUnavailable(_) | LocatorError::DirectoryUnavailable(_) => {
            STATUS_UNAVAILABLE
        }
        LocatorError::DeadlineExceeded { .. } => STATUS_TIMEOUT,
    }
}

pub fn error_reply(error: &LocatorError) -> ServiceReply {
    ServiceReply::failure(status_for(error), error.code(), error.to_string())
}

/// Request handlers over a shared [`Locator`]. Every request runs under its own deadline.
#[derive(Debug, Clone)]
pub struct LocatorService {
    locator: Arc<Locator>,
    request_timeout: Duration,
}

impl LocatorService {
    pub fn new(locator: Arc<Locator>, request_timeout: Duration) -> Self {
        Self {
            locator,
            request_timeout,
        }
    }

    /// Parse one wire line and handle it. Unparseable lines get a 400 reply.
    pub fn handle_line(&self, line: &str) -> ServiceReply {
        match serde_json::from_str::<ServiceRequest>(line) {
            Ok(request) => self.handle(request),
            Err(error) => {
                warn!(component = "handler", error = %error, "malformed_request");
                ServiceReply::malformed(format!("Malformed request: {error}"))
            }
        }
    }

    pub fn handle(&self, request: ServiceRequest) -> ServiceReply {
        self.handle_with_deadline(request, Deadline::after(self.request_timeout))
    }

    pub fn handle_with_deadline(
        &self,
        request: ServiceRequest,
        deadline: Deadline,
    ) -> ServiceReply {
        let started_at = Instant::now();
        let method = request.method();
        let result = match request {
            ServiceRequest::UpdateLocation(request) => self.update_location(request, deadline),
            ServiceRequest::FindNearestDriver(request) => {
                self.find_nearest_driver(request, deadline)
            }
            ServiceRequest::RegisterUserLogin(request) => {
                self.register_user_login(request, deadline)
            }
        };

        let reply = match result {
            Ok(reply) => reply,
            Err(error) => error_reply(&error),
        };
        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        if reply.status_code >= 500 {
            warn!(
                component = "handler",
                method,
                status_code = reply.status_code,
                error = reply.error.as_deref().unwrap_or_default(),
                elapsed_ms,
                "request_failed"
            );
        } else {
            info!(
                component = "handler",
                method,
                status_code = reply.status_code,
                elapsed_ms,
                "request_handled"
            );
        }
        reply
    }

    /// Run a line on the blocking pool. Store locks are synchronous and may wait up to the
    /// request deadline.
    pub async fn handle_line_async(self: Arc<Self>, line: String) -> ServiceReply {
        match tokio::task::spawn_blocking(move || self.handle_line(&line)).await {
            Ok(reply) => reply,
            Err(error) => {
                warn!(component = "handler", error = %error, "handler_task_failed");
                ServiceReply::internal(format!("handler task failed: {error}"))
            }
        }
    }

    fn update_location(
        &self,
        request: UpdateLocationRequest,
        deadline: Deadline,
    ) -> Result<ServiceReply, LocatorError> {
        let outcome = self.locator.record_location(
            &request.entity_id,
            request.longitude,
            request.latitude,
            request.timestamp,
            deadline,
        )?;
        let message = match outcome {
            UpsertOutcome::Created => "location recorded",
            UpsertOutcome::Replaced => "location updated",
            UpsertOutcome::IgnoredStale => "stale location ignored",
        };
        Ok(ServiceReply::success(message))
    }

    fn find_nearest_driver(
        &self,
        request: FindNearestDriverRequest,
        deadline: Deadline,
    ) -> Result<ServiceReply, LocatorError> {
        let point = GeoPoint::new(request.source_longitude, request.source_latitude)?;
        let radius_m = request
            .max_radius_m
            .unwrap_or(self.locator.config().search_radius_m);

        match self.locator.find_nearest_with_profile(point, radius_m, deadline)? {
            FindOutcome::Found(result) => Ok(ServiceReply::driver_found(DriverDetails {
                entity_id: result.entity_id,
                display_name: result.display_name,
                contact_email: result.contact_email,
                driver_latitude: result.position.latitude(),
                driver_longitude: result.position.longitude(),
                distance_m: result.distance_m,
            })),
            FindOutcome::NoDriverNearby => Ok(ServiceReply::failure(
                STATUS_NOT_FOUND,
                ERROR_NO_DRIVER_NEARBY,
                format!("no driver within {radius_m} m of {point}"),
            )),
        }
    }

    fn register_user_login(
        &self,
        request: RegisterUserLoginRequest,
        deadline: Deadline,
    ) -> Result<ServiceReply, LocatorError> {
        let last_login_ms = request
            .last_login
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
        let profile = ProfileRecord::new(
            &request.entity_id,
            &request.display_name,
            &request.email,
            last_login_ms,
        )?;
        self.locator.register_user_login(profile, deadline)?;
        Ok(ServiceReply::success("user login registered"))
    }
}
