use crate::error::PallasError;
use crate::params::{ParamDef, ParamSet, ParamType};

const DEFS: &[ParamDef] = &[
    ParamDef::new("epsilonInitial", ParamType::Float),
    ParamDef::new("resetCycle", ParamType::Int),
    ParamDef::new("linearDecay", ParamType::Bool),
];

#[test]
fn test_parse_typed_values() {
    let set = ParamSet::parse("policy", " epsilonInitial=0.2 ,resetCycle = 5, linearDecay = true", DEFS).unwrap();
    assert_eq!(set.float("epsilonInitial"), Some(0.2));
    assert_eq!(set.int("resetCycle"), Some(5));
    assert_eq!(set.bool("linearDecay"), Some(true));
    assert_eq!(set.component(), "policy");
}

#[test]
fn test_empty_string_means_defaults() {
    let set = ParamSet::parse("policy", "", DEFS).unwrap();
    assert!(set.is_empty());
    assert_eq!(set.float_or("epsilonInitial", 1.0), 1.0);
}

#[test]
fn test_last_duplicate_wins() {
    let set = ParamSet::parse("policy", "epsilonInitial = 0.1, epsilonInitial = 0.3", DEFS).unwrap();
    assert_eq!(set.float("epsilonInitial"), Some(0.3));
}

#[test]
fn test_unknown_key_is_fatal() {
    let err = ParamSet::parse("policy", "epsilonStart = 0.1", DEFS).unwrap_err();
    assert_eq!(
        err,
        PallasError::UnknownParameter {
            component: "policy".to_string(),
            key: "epsilonStart".to_string(),
        }
    );
}

#[test]
fn test_unparseable_value() {
    let err = ParamSet::parse("policy", "resetCycle = often", DEFS).unwrap_err();
    assert!(matches!(err, PallasError::ParseError { ref key, .. } if key == "resetCycle"));
}

#[test]
fn test_range_checked_getters() {
    let set = ParamSet::parse("algorithm", "epsilonInitial = 1.5, resetCycle = -2", DEFS).unwrap();
    assert!(set.float_in("epsilonInitial", 0.5, 0.0, 1.0).is_err());
    assert!(set.usize_or("resetCycle", 0).is_err());
}

#[test]
fn test_split_routes_shared_keys() {
    let algorithm: &[ParamDef] = &[ParamDef::new("gamma", ParamType::Float)];
    let estimator: &[ParamDef] = &[
        ParamDef::new("gamma", ParamType::Float),
        ParamDef::new("batchSize", ParamType::Int),
    ];
    let sets = ParamSet::split_for(
        "agent",
        "gamma = 0.9, batchSize = 16",
        &[("algorithm", algorithm), ("estimator", estimator)],
    )
    .unwrap();
    assert_eq!(sets[0].float("gamma"), Some(0.9));
    assert_eq!(sets[1].float("gamma"), Some(0.9));
    assert_eq!(sets[1].int("batchSize"), Some(16));
    assert!(!sets[0].contains("batchSize"));

    let err = ParamSet::split_for("agent", "tau = 1", &[("algorithm", algorithm)]).unwrap_err();
    assert!(matches!(err, PallasError::UnknownParameter { ref component, .. } if component == "agent"));
}
