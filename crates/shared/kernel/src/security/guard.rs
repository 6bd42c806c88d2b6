use super::directory::{Directory, Membership};
use super::error::SecurityError;
use std::fmt;

/// Authorizes an actor against a workspace. Entity ACLs are evaluated by
/// [`Membership::effective`].
#[derive(Debug, Clone, Default)]
pub struct AccessGuard {
    directory: Directory,
}

impl AccessGuard {
    #[must_use]
    pub const fn new(directory: Directory) -> Self {
        Self { directory }
    }

    /// # Errors
    /// [`SecurityError::AccessDenied`] unless `login` belongs to `workspace`.
    pub fn member(&self, workspace: &str, login: &str) -> Result<Membership, SecurityError> {
        self.directory.membership(workspace, login).ok_or_else(|| SecurityError::AccessDenied {
            message: format!("'{login}' is not a member of workspace '{workspace}'").into(),
            context: None,
        })
    }

    /// # Errors
    /// [`SecurityError::AccessDenied`] unless `login` administers `workspace`.
    pub fn admin(&self, workspace: &str, login: &str) -> Result<Membership, SecurityError> {
        let membership = self.member(workspace, login)?;
        if membership.admin {
            Ok(membership)
        } else {
            Err(denied(login, "administer", &Target(workspace)))
        }
    }
}

struct Target<'a>(&'a str);

impl fmt::Display for Target<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "workspace '{}'", self.0)
    }
}

fn denied(login: &str, verb: &str, target: &dyn fmt::Display) -> SecurityError {
    SecurityError::AccessDenied { message: format!("'{login}' may not {verb} {target}").into(), context: None }
}
