// Core algorithm exports
pub mod aggregator;
pub mod composer;
pub mod distance;
pub mod error;
pub mod geo;
pub mod matcher;
pub mod modes;
pub mod predicate;
pub mod relaxation;
pub mod scoring;
pub mod variation;

pub use distance::{calculate_bounding_box, haversine_km, is_within_bounding_box, BoundingBox};
pub use error::MatchError;
pub use matcher::{EngineSettings, MatchEngine};
pub use modes::ModeProfile;
pub use predicate::{ConstraintBuilder, Predicate};
pub use relaxation::{apply_step, RelaxationStep};
pub use scoring::{score_compatibility, Compatibility};
pub use variation::VariationSeed;
