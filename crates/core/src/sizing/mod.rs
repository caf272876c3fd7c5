pub mod metrics;
pub mod recommender;
pub mod validation;

pub use metrics::{round_dp, MetricsCalculator};
pub use recommender::{RecommendationRequest, SizeEstimate, SizeRecommender};
pub use validation::InputValidator;
