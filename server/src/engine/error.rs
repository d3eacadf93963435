use thiserror::Error;

use super::company::{CompanyId, MemberId};

/// Failures surfaced by the company directory and its collaborators.
#[derive(Debug, Error)]
pub enum CompanyError {
    /// Guild, company, member or invite absent.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("a company named `{0}` already exists in this guild")]
    DuplicateName(String),

    #[error("member {member_id} already belongs to `{company}`")]
    AlreadyMember { member_id: MemberId, company: String },

    #[error("`{0}` is a private company; an invitation is required to join")]
    PrivateCompany(String),

    #[error("the leader of `{0}` must hand over leadership before leaving")]
    LeadershipRequired(String),

    #[error("member {0} is not on the company roster")]
    SuccessorNotMember(MemberId),

    #[error("member {0} is not the company leader")]
    NotLeader(MemberId),

    #[error("`{0}` is already at war")]
    AlreadyAtWar(String),

    /// Equal influence on both sides of a war. Not fatal.
    #[error("war between {first} and {second} ended in a tie")]
    Tie { first: CompanyId, second: CompanyId },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Transient store failure (timeout, pool exhaustion, I/O).
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl CompanyError {
    /// Failures worth retrying later without user involvement.
    pub fn is_transient(&self) -> bool {
        matches!(self, CompanyError::StoreUnavailable(_))
    }
}

impl From<sqlx::Error> for CompanyError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => CompanyError::NotFound("record not found".into()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                CompanyError::StoreUnavailable(e.to_string())
            }
            other => CompanyError::Database(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, CompanyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlx_error_mapping() {
        assert!(matches!(
            CompanyError::from(sqlx::Error::RowNotFound),
            CompanyError::NotFound(_)
        ));
        assert!(CompanyError::from(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!CompanyError::from(sqlx::Error::Protocol("bad".into())).is_transient());
    }

    #[test]
    fn test_messages_name_the_company() {
        let e = CompanyError::PrivateCompany("Iron [Private Company]".into());
        assert!(e.to_string().contains("Iron [Private Company]"));
        let e = CompanyError::Tie {
            first: 1,
            second: 2,
        };
        assert_eq!(e.to_string(), "war between 1 and 2 ended in a tie");
    }
}
