use std::error::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ShelfErrorType {
    NotFound,
    AlreadyExists,
    InvalidInput,
    FileTooLarge,
    QuotaExceeded,
    IOError,
    InternalError,
}

impl From<ShelfErrorType> for warp::http::StatusCode {
    fn from(error_type: ShelfErrorType) -> Self {
        match error_type {
            ShelfErrorType::NotFound => warp::http::StatusCode::NOT_FOUND,
            ShelfErrorType::AlreadyExists => warp::http::StatusCode::CONFLICT,
            ShelfErrorType::InvalidInput => warp::http::StatusCode::BAD_REQUEST,
            ShelfErrorType::FileTooLarge => warp::http::StatusCode::PAYLOAD_TOO_LARGE,
            ShelfErrorType::QuotaExceeded => warp::http::StatusCode::INSUFFICIENT_STORAGE,
            _ => warp::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug)]
pub(crate) struct ShelfError {
    pub(crate) error_type: ShelfErrorType,
    pub(crate) message: String,
}

impl warp::Reply for ShelfError {
    fn into_response(self) -> warp::reply::Response {
        warp::reply::with_status(warp::reply::json(&self.message), self.error_type.into())
            .into_response()
    }
}

impl ShelfError {
    pub(crate) fn new(error_type: ShelfErrorType, message: String) -> Self {
        Self {
            error_type,
            message,
        }
    }

    pub(crate) fn not_found(message: String) -> Self {
        Self::new(ShelfErrorType::NotFound, message)
    }

    pub(crate) fn invalid(message: String) -> Self {
        Self::new(ShelfErrorType::InvalidInput, message)
    }
}

impl std::fmt::Display for ShelfError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.error_type, self.message)
    }
}

impl From<std::io::Error> for ShelfError {
    fn from(error: std::io::Error) -> Self {
        let error_type = match error.kind() {
            std::io::ErrorKind::NotFound => ShelfErrorType::NotFound,
            std::io::ErrorKind::AlreadyExists => ShelfErrorType::AlreadyExists,
            _ => ShelfErrorType::IOError,
        };
        Self {
            error_type,
            message: error.to_string(),
        }
    }
}

impl From<sled::Error> for ShelfError {
    fn from(error: sled::Error) -> Self {
        Self {
            error_type: ShelfErrorType::IOError,
            message: error.to_string(),
        }
    }
}

impl<T: std::fmt::Debug> From<ciborium::de::Error<T>> for ShelfError {
    fn from(error: ciborium::de::Error<T>) -> Self {
        Self {
            error_type: ShelfErrorType::InternalError,
            message: format!("Could not decode stored record: {:?}", error),
        }
    }
}

impl<T: std::fmt::Debug> From<ciborium::ser::Error<T>> for ShelfError {
    fn from(error: ciborium::ser::Error<T>) -> Self {
        Self {
            error_type: ShelfErrorType::InternalError,
            message: format!("Could not encode record: {:?}", error),
        }
    }
}

impl From<zip::result::ZipError> for ShelfError {
    fn from(error: zip::result::ZipError) -> Self {
        Self {
            error_type: ShelfErrorType::InternalError,
            message: format!("Could not build archive: {}", error),
        }
    }
}

impl Error for ShelfError {}

pub(crate) type Result<T> = std::result::Result<T, ShelfError>;

#[cfg(test)]
mod tests {
    use super::*;
    use warp::http::StatusCode;
    use warp::Reply;

    #[test]
    fn quota_errors_map_to_storage_statuses() {
        let too_large: StatusCode = ShelfErrorType::FileTooLarge.into();
        let over_quota: StatusCode = ShelfErrorType::QuotaExceeded.into();
        assert_eq!(too_large, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(over_quota, StatusCode::INSUFFICIENT_STORAGE);
    }

    #[test]
    fn missing_io_file_is_not_found() {
        let err: ShelfError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.error_type, ShelfErrorType::NotFound);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
