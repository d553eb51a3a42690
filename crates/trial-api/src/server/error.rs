#[derive(Debug)]
pub enum ServerError {
    Io(std::io::Error),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "server io error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

#[derive(Debug)]
struct HttpApiError {
    status: StatusCode,
    error: ApiError,
}

impl HttpApiError {
    fn session_not_found(requested_session_id: &str, active_session_id: Option<&str>) -> Self {
        let details = active_session_id.map(|active| {
            format!("requested_session_id={requested_session_id} active_session_id={active}")
        });
        Self {
            status: StatusCode::NOT_FOUND,
            error: ApiError::new(
                ErrorCode::SessionNotFound,
                "session_id does not match an active session",
                details,
            ),
        }
    }

    fn invalid_query(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: ApiError::new(ErrorCode::InvalidQuery, message, details),
        }
    }

    fn invalid_command(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: ApiError::new(ErrorCode::InvalidCommand, message, details),
        }
    }

    fn internal(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: ApiError::new(ErrorCode::InternalError, message, details),
        }
    }

    fn from_facade(err: FacadeError) -> Self {
        match err {
            FacadeError::StoreNotAttached | FacadeError::ArchiveNotAttached => {
                Self::invalid_query(err.to_string(), None)
            }
            FacadeError::Store(StoreError::Corrupt { .. })
            | FacadeError::Store(StoreError::SessionMismatch { .. })
            | FacadeError::StreamTruncated { .. } => Self {
                status: StatusCode::CONFLICT,
                error: ApiError::new(
                    ErrorCode::StateConflict,
                    "persisted session state conflicts with the request",
                    Some(err.to_string()),
                ),
            },
            other => Self::internal("engine operation failed", Some(other.to_string())),
        }
    }
}

impl IntoResponse for HttpApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}
