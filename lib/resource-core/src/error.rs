use resource_api::{ApiId, Name, ParseError};
use resource_rpc::Status;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ResourceError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    #[error("API already registered: {0}")]
    DuplicateApi(ApiId),

    #[error("API {0} is registered with a different capability type")]
    ApiTypeMismatch(ApiId),

    #[error("Duplicate resource name: {0}")]
    DuplicateName(Name),

    #[error("Resource {name} does not belong to API {api}")]
    WrongApi { name: Name, api: ApiId },

    #[error(transparent)]
    InvalidName(#[from] ParseError),

    #[error("resource {0:?} not found")]
    NotFound(String),
}

impl ResourceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<ResourceError> for Status {
    fn from(e: ResourceError) -> Self {
        match e {
            ResourceError::NotFound(_) => Status::not_found(e.to_string()),
            ResourceError::InvalidName(_) => Status::invalid_argument(e.to_string()),
            _ => Status::internal(e.to_string()),
        }
    }
}

/// Status for a failed instance operation, keeping its full error chain
pub fn invocation_status(err: anyhow::Error) -> Status {
    match err.downcast_ref::<ResourceError>() {
        Some(e) => e.clone().into(),
        None => Status::from_error(&err),
    }
}
