//! Uniform `{success, info}` envelope returned by every façade operation.

use serde::{Serialize, Serializer, ser::SerializeStruct};

use super::error::{Error, ErrorKind, ErrorObject};

/// Failure details: a human readable message plus the structured error.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Failure {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl Failure {
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|error| error.kind)
    }
}

impl From<Error> for Failure {
    fn from(err: Error) -> Self {
        Self {
            message: err.to_string(),
            error: Some(ErrorObject::from(&err)),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Response<T> {
    Success(T),
    Failure(Failure),
}

impl<T> Response<T> {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    #[must_use]
    pub fn info(&self) -> Option<&T> {
        match self {
            Self::Success(info) => Some(info),
            Self::Failure(_) => None,
        }
    }

    #[must_use]
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure),
        }
    }

    /// Kind of the carried error, if this is a failure caught from an [`Error`].
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.failure().and_then(Failure::kind)
    }

    /// # Errors
    /// Returns the carried [`Failure`] when the operation did not succeed.
    pub fn into_result(self) -> Result<T, Failure> {
        match self {
            Self::Success(info) => Ok(info),
            Self::Failure(failure) => Err(failure),
        }
    }
}

impl<T> From<Result<T, Error>> for Response<T> {
    fn from(result: Result<T, Error>) -> Self {
        match result {
            Ok(info) => Self::Success(info),
            Err(err) => Self::Failure(err.into()),
        }
    }
}

impl<T: Serialize> Serialize for Response<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Response", 2)?;
        match self {
            Self::Success(info) => {
                state.serialize_field("success", &true)?;
                state.serialize_field("info", info)?;
            }
            Self::Failure(failure) => {
                state.serialize_field("success", &false)?;
                state.serialize_field("info", failure)?;
            }
        }
        state.end()
    }
}
