pub mod admission_request;
pub mod admission_response;
pub mod errors;
pub mod evaluator;
pub mod patch;
pub mod policy;
pub mod target;

pub use evaluator::PolicyEvaluator;
pub use policy::Policy;
