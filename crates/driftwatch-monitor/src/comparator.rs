//! Structural comparator — decides whether the candidate still honours
//! the reference environment's contract for one endpoint.
//!
//! Only top-level shape is compared. Nested objects and array elements are
//! not inspected.

use driftwatch_core::{
    BodyShape, ComparisonResult, DriftKind, Environment, ProbeOutcome, ProbeResult,
};

/// Compare a reference probe with a candidate probe of the same endpoint.
pub fn compare(reference: &ProbeResult, candidate: &ProbeResult) -> ComparisonResult {
    let endpoint = &reference.endpoint;

    match (&reference.outcome, &candidate.outcome) {
        (
            ProbeOutcome::Success {
                status: ref_status,
                shape: ref_shape,
            },
            ProbeOutcome::Success {
                status: cand_status,
                shape: cand_shape,
            },
        ) => {
            if ref_status != cand_status {
                return ComparisonResult::incompatible(
                    endpoint,
                    DriftKind::StatusMismatch,
                    vec![format!(
                        "status mismatch: reference returned {ref_status}, candidate returned {cand_status}"
                    )],
                );
            }
            match shape_compatible(ref_shape, cand_shape) {
                Ok(()) => ComparisonResult::compatible(endpoint),
                Err(reason) => ComparisonResult::incompatible(
                    endpoint,
                    DriftKind::ShapeRegression,
                    vec![reason],
                ),
            }
        }
        _ => {
            let reasons = [
                (Environment::Reference, &reference.outcome),
                (Environment::Candidate, &candidate.outcome),
            ]
            .into_iter()
            .filter_map(|(env, outcome)| match outcome {
                ProbeOutcome::Failure { reason } => Some(format!("{env} unavailable: {reason}")),
                ProbeOutcome::Success { .. } => None,
            })
            .collect();
            ComparisonResult::incompatible(endpoint, DriftKind::Availability, reasons)
        }
    }
}

/// One-directional shape check: the candidate may add keys, never drop them.
///
/// An empty reference object accepts any candidate object. Arrays only need
/// to match in kind.
pub fn shape_compatible(reference: &BodyShape, candidate: &BodyShape) -> Result<(), String> {
    match (reference, candidate) {
        (BodyShape::Scalar, BodyShape::Scalar) | (BodyShape::Array, BodyShape::Array) => Ok(()),
        (BodyShape::Object(ref_keys), BodyShape::Object(cand_keys)) => {
            let missing: Vec<&str> = ref_keys
                .difference(cand_keys)
                .map(String::as_str)
                .collect();
            if missing.is_empty() {
                Ok(())
            } else {
                Err(format!("candidate is missing keys: {}", missing.join(", ")))
            }
        }
        (reference, candidate) => Err(format!(
            "shape changed: reference returned {}, candidate returned {}",
            reference.kind_name(),
            candidate.kind_name()
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use driftwatch_core::EndpointSpec;

    fn endpoint() -> EndpointSpec {
        EndpointSpec::new("/properties", [200, 401, 403])
    }

    fn object(keys: &[&str]) -> BodyShape {
        BodyShape::Object(keys.iter().map(|k| k.to_string()).collect())
    }

    fn ok(env: Environment, status: u16, shape: BodyShape) -> ProbeResult {
        ProbeResult::success(&endpoint(), env, status, shape, Duration::from_millis(5))
    }

    fn down(env: Environment, reason: &str) -> ProbeResult {
        ProbeResult::failure(&endpoint(), env, reason, Duration::from_millis(5))
    }

    #[test]
    fn identical_objects_are_compatible() {
        let result = compare(
            &ok(Environment::Reference, 200, object(&["id", "name"])),
            &ok(Environment::Candidate, 200, object(&["id", "name"])),
        );
        assert!(result.compatible);
        assert!(result.reasons.is_empty());
        assert_eq!(result.kind, None);
    }

    #[test]
    fn candidate_superset_is_compatible() {
        let result = compare(
            &ok(Environment::Reference, 200, object(&["id", "name"])),
            &ok(Environment::Candidate, 200, object(&["id", "name", "created_at"])),
        );
        assert!(result.compatible);
    }

    #[test]
    fn candidate_strict_subset_is_incompatible() {
        let result = compare(
            &ok(Environment::Reference, 200, object(&["id", "name"])),
            &ok(Environment::Candidate, 200, object(&["id"])),
        );
        assert!(!result.compatible);
        assert_eq!(result.kind, Some(DriftKind::ShapeRegression));
        assert_eq!(result.reasons, vec!["candidate is missing keys: name"]);
    }

    #[test]
    fn key_check_is_asymmetric() {
        let wide = object(&["id", "name"]);
        let narrow = object(&["id"]);
        assert!(shape_compatible(&narrow, &wide).is_ok());
        assert!(shape_compatible(&wide, &narrow).is_err());
    }

    #[test]
    fn status_check_is_symmetric() {
        let shape = object(&["id"]);
        let same = compare(
            &ok(Environment::Reference, 200, shape.clone()),
            &ok(Environment::Candidate, 200, shape.clone()),
        );
        assert!(same.compatible);

        let a = compare(
            &ok(Environment::Reference, 200, shape.clone()),
            &ok(Environment::Candidate, 401, shape.clone()),
        );
        let b = compare(
            &ok(Environment::Reference, 401, shape.clone()),
            &ok(Environment::Candidate, 200, shape),
        );
        assert!(!a.compatible && !b.compatible);
        assert_eq!(a.kind, Some(DriftKind::StatusMismatch));
        assert_eq!(b.kind, Some(DriftKind::StatusMismatch));
    }

    #[test]
    fn acceptable_but_different_status_is_a_mismatch() {
        // 401 is acceptable for the endpoint in isolation, but not equal to 200.
        let health = EndpointSpec::new("/health", [200, 401]);
        let reference = ProbeResult::success(
            &health,
            Environment::Reference,
            200,
            BodyShape::Scalar,
            Duration::ZERO,
        );
        let candidate = ProbeResult::success(
            &health,
            Environment::Candidate,
            401,
            BodyShape::Scalar,
            Duration::ZERO,
        );
        let result = compare(&reference, &candidate);
        assert!(!result.compatible);
        assert!(result.reasons[0].contains("status mismatch"));
    }

    #[test]
    fn kind_change_is_a_shape_regression() {
        let result = compare(
            &ok(Environment::Reference, 200, BodyShape::Array),
            &ok(Environment::Candidate, 200, object(&["items"])),
        );
        assert!(!result.compatible);
        assert_eq!(result.kind, Some(DriftKind::ShapeRegression));
        assert!(result.reasons[0].contains("array"));
    }

    #[test]
    fn empty_containers_match_their_kind() {
        assert!(shape_compatible(&object(&[]), &object(&["id"])).is_ok());
        assert!(shape_compatible(&object(&[]), &object(&[])).is_ok());
        assert!(shape_compatible(&BodyShape::Array, &BodyShape::Array).is_ok());
        assert!(shape_compatible(&object(&[]), &BodyShape::Array).is_err());
    }

    #[test]
    fn empty_candidate_object_drops_every_key() {
        assert_eq!(
            shape_compatible(&object(&["id", "name"]), &object(&[])),
            Err("candidate is missing keys: id, name".to_string())
        );

        let result = compare(
            &ok(Environment::Reference, 200, object(&["id"])),
            &ok(Environment::Candidate, 200, object(&[])),
        );
        assert!(!result.compatible);
        assert_eq!(result.kind, Some(DriftKind::ShapeRegression));
    }

    #[test]
    fn candidate_down_is_an_availability_failure() {
        let result = compare(
            &ok(Environment::Reference, 200, object(&["id"])),
            &down(Environment::Candidate, "connection failed: refused"),
        );
        assert!(!result.compatible);
        assert_eq!(result.kind, Some(DriftKind::Availability));
        assert_eq!(
            result.reasons,
            vec!["candidate unavailable: connection failed: refused"]
        );
    }

    #[test]
    fn reference_down_counts_against_compatibility() {
        let result = compare(
            &down(Environment::Reference, "timed out after 100ms"),
            &ok(Environment::Candidate, 200, object(&["id"])),
        );
        assert!(!result.compatible);
        assert_eq!(result.kind, Some(DriftKind::Availability));
        assert!(result.reasons[0].starts_with("reference unavailable"));
    }

    #[test]
    fn both_down_reports_both_sides() {
        let result = compare(
            &down(Environment::Reference, "a"),
            &down(Environment::Candidate, "b"),
        );
        assert_eq!(result.reasons.len(), 2);
    }
}
