//! Author/committer identity and clock source, threaded explicitly into
//! operations that need them rather than read from a global.

use git_utils::date::{GitDate, Signature};

use crate::RepoError;

/// Everything a commit-producing operation needs beyond the repository
/// itself: who is acting, and what time it is.
///
/// Built from `GIT_AUTHOR_NAME`/`GIT_AUTHOR_EMAIL`/`GIT_COMMITTER_NAME`/
/// `GIT_COMMITTER_EMAIL` (matching C git's env-var precedence; there is no
/// `git-config` layer in this workspace to fall back to). Tests construct
/// a `Context` directly instead of touching process environment.
#[derive(Debug, Clone)]
pub struct Context {
    pub author_name: String,
    pub author_email: String,
    pub committer_name: String,
    pub committer_email: String,
}

impl Context {
    pub fn new(
        author_name: impl Into<String>,
        author_email: impl Into<String>,
        committer_name: impl Into<String>,
        committer_email: impl Into<String>,
    ) -> Self {
        Self {
            author_name: author_name.into(),
            author_email: author_email.into(),
            committer_name: committer_name.into(),
            committer_email: committer_email.into(),
        }
    }

    /// Read `GIT_AUTHOR_*`/`GIT_COMMITTER_*` from the process environment.
    pub fn from_env() -> Result<Self, RepoError> {
        let author_name =
            std::env::var("GIT_AUTHOR_NAME").map_err(|_| RepoError::MissingIdentity("GIT_AUTHOR"))?;
        let author_email = std::env::var("GIT_AUTHOR_EMAIL")
            .map_err(|_| RepoError::MissingIdentity("GIT_AUTHOR"))?;
        let committer_name = std::env::var("GIT_COMMITTER_NAME")
            .map_err(|_| RepoError::MissingIdentity("GIT_COMMITTER"))?;
        let committer_email = std::env::var("GIT_COMMITTER_EMAIL")
            .map_err(|_| RepoError::MissingIdentity("GIT_COMMITTER"))?;
        Ok(Self::new(author_name, author_email, committer_name, committer_email))
    }

    /// Build the author signature stamped with the current time.
    pub fn author_signature(&self) -> Signature {
        Signature {
            name: self.author_name.as_str().into(),
            email: self.author_email.as_str().into(),
            date: GitDate::now(),
        }
    }

    /// Build the committer signature stamped with the current time.
    pub fn committer_signature(&self) -> Signature {
        Signature {
            name: self.committer_name.as_str().into(),
            email: self.committer_email.as_str().into(),
            date: GitDate::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_distinct_author_and_committer_signatures() {
        let ctx = Context::new("Author", "author@example.com", "Committer", "committer@example.com");
        let author = ctx.author_signature();
        let committer = ctx.committer_signature();
        assert_eq!(author.name, "Author");
        assert_eq!(committer.name, "Committer");
    }
}
