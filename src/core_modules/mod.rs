pub mod annotator;
pub mod detection;
pub mod display;
pub mod lane_counts;
pub mod lane_mapper;
pub mod source;
pub mod stream_worker;
