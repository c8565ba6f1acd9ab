//! Error types for Brivas services

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrivasError>;

#[derive(Error, Debug)]
pub enum BrivasError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl BrivasError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Config(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(BrivasError::Validation("bad id".into()).status_code(), 400);
        assert_eq!(BrivasError::Config("CUCM_HOST".into()).status_code(), 500);
    }
}
