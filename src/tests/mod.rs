pub mod test_algorithms;
pub mod test_estimator;
pub mod test_params;
pub mod test_policy;
