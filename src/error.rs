use err_derive::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(display = "Invalid config `{}`: {}", field, reason)]
    InvalidConfig {
        field: &'static str,
        reason: String,
    },

    #[error(display = "Config parse error: {}", _0)]
    Json(#[error(source, no_from)] serde_json::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

impl Error {
    #[inline]
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

/// Checks that `value` lies in `[0, 1]`.
pub(crate) fn check_unit(field: &'static str, value: f32) -> Result<(), Error> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::invalid(field, format!("{} is outside [0, 1]", value)));
    }

    Ok(())
}

pub(crate) fn check_non_negative(field: &'static str, value: f32) -> Result<(), Error> {
    if !(value >= 0.0) {
        return Err(Error::invalid(field, format!("{} must be non-negative", value)));
    }

    Ok(())
}
