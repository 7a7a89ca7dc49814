use crate::Role;

/// Roles permitted to renew a loan on a borrower's behalf.
const RENEWAL_ROLES: [&str; 2] = ["librarian", "admin"];

/// Whether any of the principal's roles unlocks loan renewal.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn can_renew(roles: &[Role]) -> bool {
    roles
        .iter()
        .any(|role| RENEWAL_ROLES.contains(&role.as_str()))
}

/// Gate used at the request boundary before dispatching a renewal.
pub fn ensure_can_renew(roles: &[Role]) -> Result<(), stacks_core::DomainError> {
    if can_renew(roles) {
        Ok(())
    } else {
        Err(stacks_core::DomainError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn librarian_can_renew() {
        assert!(can_renew(&[Role::librarian()]));
    }

    #[test]
    fn admin_can_renew() {
        assert!(can_renew(&[Role::new("member"), Role::admin()]));
    }

    #[test]
    fn member_cannot_renew() {
        assert!(!can_renew(&[Role::new("member")]));
        assert!(!can_renew(&[]));
    }

    #[test]
    fn gate_maps_to_unauthorized() {
        assert_eq!(
            ensure_can_renew(&[Role::new("member")]),
            Err(stacks_core::DomainError::Unauthorized)
        );
        assert!(ensure_can_renew(&[Role::librarian()]).is_ok());
    }
}
