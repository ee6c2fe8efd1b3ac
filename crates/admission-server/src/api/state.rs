use admission_policy::PolicyEvaluator;

use crate::api::admission_review::ReviewDecoder;

pub(crate) struct ApiServerState {
    pub(crate) decoder: ReviewDecoder,
    pub(crate) evaluator: PolicyEvaluator,
}
