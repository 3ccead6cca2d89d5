use serde::{Deserialize, Serialize};

/// A long-running operation resource, polled until `done`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<OperationStatus>,
}

/// Error reported by the service inside a finished operation.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct OperationStatus {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

impl OperationStatus {
    pub fn to_message(&self) -> String {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => format!("{message} (code {code})"),
            (None, Some(message)) => message.clone(),
            (Some(code), None) => format!("code {code}"),
            (None, None) => "unspecified operation error".to_owned(),
        }
    }
}

/// Response to a create or update call. The service either completes the
/// mutation synchronously and returns the resource, or hands back a
/// long-running operation to await.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MutationResponse {
    #[serde(default)]
    pub name: Option<String>,
}

impl MutationResponse {
    /// The operation name to await, if the mutation is asynchronous.
    ///
    /// Synchronous responses carry the resource's own name (or none at
    /// all); only names with an `operations` path segment need polling.
    pub fn operation_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .filter(|name| name.split('/').any(|segment| segment == "operations"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_name_detection() {
        let asynchronous = MutationResponse {
            name: Some("projects/p/locations/eu/operations/op-123".into()),
        };
        assert_eq!(
            asynchronous.operation_name(),
            Some("projects/p/locations/eu/operations/op-123")
        );

        let synchronous = MutationResponse {
            name: Some("projects/p/locations/eu/dataProducts/sales".into()),
        };
        assert_eq!(synchronous.operation_name(), None);

        let empty = MutationResponse { name: None };
        assert_eq!(empty.operation_name(), None);
    }

    #[test]
    fn test_operation_deserializes_with_defaults() {
        let operation: Operation =
            serde_json::from_str(r#"{"name": "projects/p/operations/op"}"#).unwrap();
        assert!(!operation.done);
        assert!(operation.error.is_none());
    }
}
