use fenris_fields::error::{Error, ErrorKind};
use fenris_fields::mapping::UpdateFlags;

#[test]
fn errors_are_classified() {
    let cases = [
        (Error::InvalidConfiguration("bad".to_string()), ErrorKind::Configuration),
        (
            Error::UnsupportedCardinality { requested: 11, max: 10 },
            ErrorKind::Configuration,
        ),
        (Error::SingularJacobian { point: 3 }, ErrorKind::Configuration),
        (Error::SingularInterpolation, ErrorKind::Configuration),
        (Error::UnsupportedFlags(UpdateFlags::HESSIANS), ErrorKind::PreconditionViolation),
        (
            Error::DimensionMismatch {
                what: "buffer",
                expected: 2,
                actual: 3,
            },
            ErrorKind::PreconditionViolation,
        ),
        (
            Error::IndexOutOfBounds {
                what: "points",
                index: 4,
                len: 4,
            },
            ErrorKind::PreconditionViolation,
        ),
        (Error::CompositionNotFound("x".to_string()), ErrorKind::PreconditionViolation),
        (Error::VariableNotFound("x".to_string()), ErrorKind::PreconditionViolation),
        (Error::IncompleteBlockMapping { component: 1 }, ErrorKind::InternalInvariant),
    ];
    for (error, kind) in cases {
        assert_eq!(error.kind(), kind, "{}", error);
    }
}

#[test]
fn errors_describe_themselves() {
    let message = Error::UnsupportedCardinality { requested: 11, max: 10 }.to_string();
    assert!(message.contains("11"), "{}", message);
    assert!(message.contains("10"), "{}", message);

    let message = Error::UnsupportedFlags(UpdateFlags::VALUES | UpdateFlags::HESSIANS).to_string();
    assert!(message.contains("VALUES | HESSIANS"), "{}", message);

    let message = Error::CompositionNotFound("porosity".to_string()).to_string();
    assert!(message.contains("porosity"), "{}", message);
}

#[test]
fn errors_convert_into_reports() {
    let result: eyre::Result<()> = Err(Error::SingularInterpolation.into());
    let report = result.unwrap_err();
    assert_eq!(report.downcast_ref::<Error>(), Some(&Error::SingularInterpolation));
}
