//! Classifier direction from participation and ACL direction.

use super::types::AclDirection;
use gbp_policy::{Direction, Participation};

/// Maps an endpoint's role and the ACL being built to the classifier
/// direction that applies.
///
/// Provider on ingress and consumer on egress see classifier traffic as
/// `Out`; the other two combinations see it as `In`.
pub fn resolve_classifier_direction(
    participation: Participation,
    acl_direction: AclDirection,
) -> Direction {
    match (participation, acl_direction) {
        (Participation::Provider, AclDirection::Ingress)
        | (Participation::Consumer, AclDirection::Egress) => Direction::Out,
        (Participation::Provider, AclDirection::Egress)
        | (Participation::Consumer, AclDirection::Ingress) => Direction::In,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_direction_table() {
        let cases = [
            (Participation::Provider, AclDirection::Ingress, Direction::Out),
            (Participation::Provider, AclDirection::Egress, Direction::In),
            (Participation::Consumer, AclDirection::Ingress, Direction::In),
            (Participation::Consumer, AclDirection::Egress, Direction::Out),
        ];
        for (participation, acl_direction, expected) in cases {
            assert_eq!(
                resolve_classifier_direction(participation, acl_direction),
                expected,
                "{} on {}",
                participation,
                acl_direction
            );
        }
    }

    #[test]
    fn test_never_bidirectional() {
        for participation in [Participation::Provider, Participation::Consumer] {
            for acl_direction in AclDirection::ALL {
                assert_ne!(
                    resolve_classifier_direction(participation, acl_direction),
                    Direction::Bidirectional
                );
            }
        }
    }
}
