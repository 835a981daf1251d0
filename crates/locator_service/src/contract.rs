use serde::{Deserialize, Serialize};

pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_INTERNAL_ERROR: u16 = 500;
pub const STATUS_UNAVAILABLE: u16 = 503;
pub const STATUS_TIMEOUT: u16 = 504;

pub const ERROR_MALFORMED_REQUEST: &str = "malformed_request";
pub const ERROR_NO_DRIVER_NEARBY: &str = "no_driver_nearby";
pub const ERROR_INTERNAL: &str = "internal_error";

/// One request line on the wire, tagged by `"method"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum ServiceRequest {
    UpdateLocation(UpdateLocationRequest),
    FindNearestDriver(FindNearestDriverRequest),
    RegisterUserLogin(RegisterUserLoginRequest),
}

impl ServiceRequest {
    pub fn method(&self) -> &'static str {
        match self {
            Self::UpdateLocation(_) => "UpdateLocation",
            Self::FindNearestDriver(_) => "FindNearestDriver",
            Self::RegisterUserLogin(_) => "RegisterUserLogin",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateLocationRequest {
    pub entity_id: String,
    pub longitude: f64,
    pub latitude: f64,
    /// Epoch milliseconds reported by the device.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindNearestDriverRequest {
    pub source_longitude: f64,
    pub source_latitude: f64,
    /// Overrides the server's default search radius.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_radius_m: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterUserLoginRequest {
    pub entity_id: String,
    pub email: String,
    pub display_name: String,
    /// Epoch milliseconds; the server clock is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverDetails {
    pub entity_id: String,
    pub display_name: String,
    pub contact_email: String,
    pub driver_latitude: f64,
    pub driver_longitude: f64,
    pub distance_m: f64,
}

/// One reply line on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceReply {
    pub status_code: u16,
    pub ok: bool,
    pub message: String,
    /// Stable machine-readable code, present on failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<DriverDetails>,
}

impl ServiceReply {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status_code: STATUS_OK,
            ok: true,
            message: message.into(),
            error: None,
            driver: None,
        }
    }

    pub fn driver_found(driver: DriverDetails) -> Self {
        Self {
            driver: Some(driver),
            ..Self::success("driver found")
        }
    }

    pub fn failure(status_code: u16, error: &str, message: impl Into<String>) -> Self {
        Self {
            status_code,
            ok: false,
            message: message.into(),
            error: Some(error.to_string()),
            driver: None,
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::failure(STATUS_BAD_REQUEST, ERROR_MALFORMED_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::failure(STATUS_INTERNAL_ERROR, ERROR_INTERNAL, message)
    }
}
