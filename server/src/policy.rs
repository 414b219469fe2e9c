use std::fmt::{self, Display};

use kernel::{Account, Role, Scope};

use crate::error::Error;

/// Identity making a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    Anonymous,
    User { username: String, role: Role },
}

impl Actor {
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        match self {
            Actor::Anonymous => None,
            Actor::User { username, .. } => Some(username),
        }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            Actor::User {
                role: Role::Admin,
                ..
            }
        )
    }

    /// Username of an authenticated actor, `NotAuthenticated` otherwise.
    pub fn require_user(&self) -> Result<&str, Error> {
        self.username().ok_or(Error::NotAuthenticated)
    }
}

impl From<Account> for Actor {
    fn from(account: Account) -> Self {
        Actor::User {
            username: account.username,
            role: account.role,
        }
    }
}

impl Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Anonymous => f.write_str("<anonymous>"),
            Actor::User { username, .. } => f.write_str(username),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Listing a scope or reading a file from it
    Read,
    Write,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NotAuthenticated,
    /// Private scope of somebody else
    NotOwner,
    /// Shared file uploaded by somebody else
    NotCreator,
    AdminOnly,
}

impl Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::NotAuthenticated => f.write_str("authentication required"),
            DenyReason::NotOwner => f.write_str("private area of another user"),
            DenyReason::NotCreator => f.write_str("only the uploader or an admin may delete"),
            DenyReason::AdminOnly => f.write_str("administrator role required"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn into_result(self) -> Result<(), Error> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(DenyReason::NotAuthenticated) => Err(Error::NotAuthenticated),
            Decision::Deny(reason) => Err(Error::PermissionDenied(reason)),
        }
    }
}

/// Decides whether `actor` may perform `operation` in `scope`.
///
/// `creator` is the owner-of-record of the shared file being deleted and is
/// ignored for every other combination.
#[must_use]
pub fn authorize(
    actor: &Actor,
    operation: Operation,
    scope: &Scope,
    creator: Option<&str>,
) -> Decision {
    let Actor::User { username, role } = actor else {
        return Decision::Deny(DenyReason::NotAuthenticated);
    };
    if *role == Role::Admin {
        return Decision::Allow;
    }
    match (scope, operation) {
        (Scope::Private(owner), _) if owner == username => Decision::Allow,
        (Scope::Private(_), _) => Decision::Deny(DenyReason::NotOwner),
        (Scope::Shared, Operation::Read | Operation::Write) => Decision::Allow,
        (Scope::Shared, Operation::Delete) if creator == Some(username.as_str()) => {
            Decision::Allow
        }
        (Scope::Shared, Operation::Delete) => Decision::Deny(DenyReason::NotCreator),
    }
}

/// Gate for account management, history purge and foreign history queries.
#[must_use]
pub fn authorize_admin(actor: &Actor) -> Decision {
    match actor {
        Actor::Anonymous => Decision::Deny(DenyReason::NotAuthenticated),
        a if a.is_admin() => Decision::Allow,
        Actor::User { .. } => Decision::Deny(DenyReason::AdminOnly),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn user(name: &str) -> Actor {
        Actor::User {
            username: name.to_owned(),
            role: Role::Standard,
        }
    }

    fn admin(name: &str) -> Actor {
        Actor::User {
            username: name.to_owned(),
            role: Role::Admin,
        }
    }

    fn private(owner: &str) -> Scope {
        Scope::Private(owner.to_owned())
    }

    #[rstest]
    #[case(user("alice"), Operation::Read, private("alice"), None, Decision::Allow)]
    #[case(user("alice"), Operation::Write, private("alice"), None, Decision::Allow)]
    #[case(user("alice"), Operation::Delete, private("alice"), None, Decision::Allow)]
    #[case(user("bob"), Operation::Read, private("alice"), None, Decision::Deny(DenyReason::NotOwner))]
    #[case(user("bob"), Operation::Write, private("alice"), None, Decision::Deny(DenyReason::NotOwner))]
    #[case(user("bob"), Operation::Delete, private("alice"), Some("bob"), Decision::Deny(DenyReason::NotOwner))]
    #[case(admin("root"), Operation::Read, private("alice"), None, Decision::Allow)]
    #[case(admin("root"), Operation::Delete, private("alice"), None, Decision::Allow)]
    #[case(user("bob"), Operation::Read, Scope::Shared, None, Decision::Allow)]
    #[case(user("bob"), Operation::Write, Scope::Shared, Some("alice"), Decision::Allow)]
    #[case(user("bob"), Operation::Delete, Scope::Shared, Some("alice"), Decision::Deny(DenyReason::NotCreator))]
    #[case(user("bob"), Operation::Delete, Scope::Shared, None, Decision::Deny(DenyReason::NotCreator))]
    #[case(user("alice"), Operation::Delete, Scope::Shared, Some("alice"), Decision::Allow)]
    #[case(admin("root"), Operation::Delete, Scope::Shared, Some("alice"), Decision::Allow)]
    #[case(admin("root"), Operation::Delete, Scope::Shared, None, Decision::Allow)]
    #[case(Actor::Anonymous, Operation::Read, Scope::Shared, None, Decision::Deny(DenyReason::NotAuthenticated))]
    #[case(Actor::Anonymous, Operation::Write, private("alice"), None, Decision::Deny(DenyReason::NotAuthenticated))]
    #[trace]
    fn decision_table(
        #[case] actor: Actor,
        #[case] operation: Operation,
        #[case] scope: Scope,
        #[case] creator: Option<&str>,
        #[case] expected: Decision,
    ) {
        // Arrange

        // Act
        let decision = authorize(&actor, operation, &scope, creator);

        // Assert
        assert_eq!(decision, expected);
    }

    #[test]
    fn standard_user_never_deletes_another_private_area() {
        // Arrange
        let names = ["alice", "bob", "carol", "admin"];

        // Act & Assert
        for a in names {
            for b in names.iter().filter(|b| **b != a) {
                for creator in [None, Some(a), Some(*b)] {
                    let decision = authorize(&user(a), Operation::Delete, &private(b), creator);
                    assert!(matches!(decision, Decision::Deny(_)), "{a} deleting in {b}");
                }
            }
        }
    }

    #[rstest]
    #[case(Actor::Anonymous, Decision::Deny(DenyReason::NotAuthenticated))]
    #[case(user("alice"), Decision::Deny(DenyReason::AdminOnly))]
    #[case(admin("root"), Decision::Allow)]
    fn admin_gate(#[case] actor: Actor, #[case] expected: Decision) {
        // Arrange

        // Act
        let decision = authorize_admin(&actor);

        // Assert
        assert_eq!(decision, expected);
    }

    #[rstest]
    #[case(Decision::Deny(DenyReason::NotAuthenticated), kernel::ErrorKind::NotAuthenticated)]
    #[case(Decision::Deny(DenyReason::NotCreator), kernel::ErrorKind::PermissionDenied)]
    fn deny_maps_to_error_kind(#[case] decision: Decision, #[case] expected: kernel::ErrorKind) {
        // Arrange

        // Act
        let err = decision.into_result().unwrap_err();

        // Assert
        assert_eq!(err.kind(), expected);
    }
}
