use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("tenant {0} is not registered")]
    TenantNotFound(String),
    #[error("tenant {0} is registered but has no database yet")]
    TenantNotProvisioned(String),
    #[error("tenant code {0} already taken")]
    CodeConflict(String),
    #[error("tenant {0} already has a database assigned")]
    DatabaseNameAssigned(String),
    #[error("provisioning failed during `{step}`: {source}")]
    Provisioning {
        step: &'static str,
        #[source]
        source: Box<Error>,
    },
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub(crate) fn provisioning(step: &'static str, source: Error) -> Self {
        Error::Provisioning {
            step,
            source: Box::new(source),
        }
    }

    /// True when the underlying cause is a unique-constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Error::Db(sqlx::Error::Database(db)) => db.is_unique_violation(),
            Error::Provisioning { source, .. } | Error::Context { source, .. } => {
                source.is_unique_violation()
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub trait WithContext<T> {
    fn context(self, msg: impl Into<String>) -> Result<T>;
}

impl<T> WithContext<T> for Result<T> {
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Context {
            context: msg.into(),
            source: Box::new(e),
        })
    }
}
