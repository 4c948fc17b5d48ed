use async_trait::async_trait;
use serde::Serialize;

use crate::api::ApiError;

/// Body of a device token registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceRegistration {
    #[serde(rename = "deviceToken")]
    pub token: String,
    pub grade: String,
    #[serde(rename = "courseList")]
    pub course_list: Vec<String>,
    pub version: String,
    /// Lowercase hex SHA-1 of username and password
    pub credential: String,
}

/// Something that can hand a device registration to the backend.
#[async_trait]
pub trait DeviceRegistrar: Send + Sync {
    async fn register(&self, registration: &DeviceRegistration) -> Result<(), ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_field_names() {
        let registration = DeviceRegistration {
            token: "t".into(),
            grade: "5A".into(),
            course_list: vec![],
            version: "1".into(),
            credential: "c".into(),
        };
        let value = serde_json::to_value(&registration).unwrap();

        assert_eq!(value["deviceToken"], "t");
        assert_eq!(value["courseList"], serde_json::json!([]));
        assert!(value.get("token").is_none());
    }
}
