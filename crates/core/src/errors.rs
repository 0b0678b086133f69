use thiserror::Error;

/// Failures that stop an event from being answered. Date and sequencing problems never land
/// here; the flow turns those into corrective replies.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("delivery failure: {0}")]
    Delivery(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("delivery failed: {message}")]
    DeliveryFailed { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::ServiceUnavailable { .. } => {
                "The leave service is temporarily unavailable. Please retry shortly."
            }
            Self::DeliveryFailed { .. } => {
                "Your request was recorded but the reply could not be delivered."
            }
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::ServiceUnavailable { correlation_id, .. }
            | Self::DeliveryFailed { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        match self {
            Self::Persistence(message) => {
                InterfaceError::ServiceUnavailable { message, correlation_id }
            }
            Self::Delivery(message) => InterfaceError::DeliveryFailed { message, correlation_id },
        }
    }
}
