pub mod debouncer;
pub mod depth_frame;
pub mod geometry;
pub mod location_handler;
pub mod loi;
pub mod motion_extractor;
pub mod raster;
pub mod region_analyzer;
pub mod region_segmenter;
pub mod utils;
pub mod visualizer;
pub mod voi;
