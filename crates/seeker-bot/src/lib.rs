pub mod controller;
pub mod policy;

pub use controller::{SearchController, SearchLimits, SearchReport, SearchState};
pub use policy::{
    DEFAULT_DISTANCE_THRESHOLD, DistanceAwarePolicy, MaxBeliefPolicy, PolicyContext,
    SearchPolicy, SearchRule, Step,
};
