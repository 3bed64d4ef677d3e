// THEORY:
// The `pipeline` module is the top-level synchronous API of the engine. One call to
// `process_frame` runs a depth frame through every stage and returns everything the
// frame produced: the surviving regions, their locations of interest, the volume
// classifications, and a confirmed location change if one happened.
//
// The pipeline owns the only state carried between frames: the motion extractor's
// two frame buffers and the debouncer's state. A frame that fails validation is
// rejected before either is touched, so one bad frame cannot corrupt the next.
//
// Time is passed in rather than read inside the stages (`process_frame_at`), so
// the debouncing behaviour is fully deterministic under test.

use crate::core_modules::debouncer::LocationDebouncer;
use crate::core_modules::depth_frame::DepthFrame;
use crate::core_modules::location_handler::LocationHandler;
use crate::core_modules::motion_extractor::MotionExtractor;
use crate::core_modules::region_analyzer::{AnalyzerSettings, RegionAnalysis, RegionAnalyzer};
use crate::core_modules::region_segmenter::{RegionSegmenter, SegmenterSettings};
use crate::core_modules::visualizer::{self, PipelineVisualization};
use crate::core_modules::voi::{VoiRegistry, VoiShape};
use crate::error::{LocationError, Result};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant, SystemTime};

// Re-export key data structures for the public API.
pub use crate::core_modules::debouncer::LocationChange;
pub use crate::core_modules::loi::{Loi, LoiPoint};
pub use crate::core_modules::region_segmenter::Region;
pub use crate::core_modules::voi::Voi;

/// Every tunable of the engine. Missing fields deserialize to their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub frame_width: u32,
    pub frame_height: u32,
    /// Raw readings below this are treated as dropouts.
    pub noise_threshold: u8,
    /// Frame difference at which a pixel counts as moving.
    pub motion_threshold: u8,
    /// Full-resolution mean-blur kernel used to merge fragments of one object.
    pub blur_kernel: u32,
    pub erode_iterations: u32,
    pub min_region_size: u32,
    pub edge_margin: u32,
    /// Frame difference at which a pixel contributes to a region's depth.
    pub strong_motion_threshold: u8,
    /// Depths at or below this never become a region's depth. A frame's own
    /// `min_reliable_depth` raises it further.
    pub depth_floor: u8,
    pub confirmation_window_ms: u64,
    /// Per-pixel worker threads; one per logical CPU when unset.
    pub worker_threads: Option<usize>,
    pub visualize_downsampled: bool,
    pub visualize_contours: bool,
    pub visualize_loi_points: bool,
    /// Volumes of interest in registration order.
    pub volumes: Vec<Voi>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_width: 512,
            frame_height: 424,
            noise_threshold: 5,
            motion_threshold: 5,
            blur_kernel: 15,
            erode_iterations: 2,
            min_region_size: 20,
            edge_margin: 10,
            strong_motion_threshold: 20,
            depth_floor: 20,
            confirmation_window_ms: 500,
            worker_threads: None,
            visualize_downsampled: false,
            visualize_contours: false,
            visualize_loi_points: false,
            volumes: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(LocationError::InvalidConfig(format!(
                "frame dimensions must be non-zero, got {}x{}",
                self.frame_width, self.frame_height
            )));
        }
        if self.blur_kernel == 0 {
            return Err(LocationError::InvalidConfig(
                "blur kernel must be at least 1".to_string(),
            ));
        }
        if self.worker_threads == Some(0) {
            return Err(LocationError::InvalidConfig(
                "worker thread count must be at least 1".to_string(),
            ));
        }
        VoiRegistry::from_volumes(self.volumes.iter().cloned()).map(|_| ())
    }

    pub fn confirmation_window(&self) -> Duration {
        Duration::from_millis(self.confirmation_window_ms)
    }

    pub fn segmenter_settings(&self) -> SegmenterSettings {
        SegmenterSettings {
            blur_kernel: self.blur_kernel,
            erode_iterations: self.erode_iterations,
            min_region_size: self.min_region_size,
            edge_margin: self.edge_margin,
            ..SegmenterSettings::default()
        }
    }

    pub fn analyzer_settings(&self) -> AnalyzerSettings {
        AnalyzerSettings {
            strong_motion_threshold: self.strong_motion_threshold,
            depth_floor: self.depth_floor,
        }
    }

    fn visualizes(&self) -> bool {
        self.visualize_downsampled || self.visualize_contours || self.visualize_loi_points
    }
}

/// Everything a single frame produced.
#[derive(Debug, Clone, Default)]
pub struct FrameReport {
    /// Regions that survived segmentation filtering.
    pub regions: Vec<Region>,
    pub loi_points: Vec<LoiPoint>,
    pub lois: Vec<Loi>,
    /// Set only on the frame that confirmed a new location.
    pub location_change: Option<LocationChange>,
    pub visualization: PipelineVisualization,
}

impl FrameReport {
    /// True when the frame found nothing and changed nothing.
    pub fn is_quiet(&self) -> bool {
        self.regions.is_empty() && self.lois.is_empty() && self.location_change.is_none()
    }
}

/// The main, top-level struct for the location engine.
pub struct LocationPipeline {
    config: PipelineConfig,
    motion: MotionExtractor,
    segmenter: RegionSegmenter,
    analyzer: RegionAnalyzer,
    handler: LocationHandler,
    debouncer: LocationDebouncer,
}

impl LocationPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let motion = MotionExtractor::new(
            config.frame_width,
            config.frame_height,
            config.noise_threshold,
            config.motion_threshold,
            config.worker_threads,
        )?;
        let volumes = VoiRegistry::from_volumes(config.volumes.iter().cloned())?;
        log::info!(
            "location pipeline: {}x{} frames, {} volumes, {:?} confirmation window, depth floor {}",
            config.frame_width,
            config.frame_height,
            volumes.len(),
            config.confirmation_window(),
            config.depth_floor
        );

        Ok(Self {
            segmenter: RegionSegmenter::new(config.segmenter_settings()),
            analyzer: RegionAnalyzer::new(config.analyzer_settings()),
            handler: LocationHandler::new(volumes),
            debouncer: LocationDebouncer::new(config.confirmation_window()),
            motion,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn process_frame(&mut self, frame: &DepthFrame) -> Result<FrameReport> {
        self.process_frame_at(frame, Instant::now(), SystemTime::now())
    }

    /// Runs every stage on `frame`. `now` drives the debouncer, `timestamp` is
    /// stamped on the classified locations.
    pub fn process_frame_at(
        &mut self,
        frame: &DepthFrame,
        now: Instant,
        timestamp: SystemTime,
    ) -> Result<FrameReport> {
        // Stage 1: Temporal Analysis
        let motion = self.motion.extract(frame)?;

        // Stage 2: Spatial Grouping
        let segmentation = self.segmenter.segment(&motion);

        // Stage 3: Region Analysis
        let depth_floor = self.config.depth_floor.max(frame.min_reliable_depth());
        let analyses: Vec<RegionAnalysis> = segmentation
            .regions
            .iter()
            .filter_map(|region| {
                self.analyzer
                    .analyze_with_floor(region, self.motion.current(), &motion, depth_floor)
            })
            .collect();
        let loi_points: Vec<LoiPoint> = analyses.iter().map(|a| a.point).collect();

        // Stage 4: Classification
        let lois = self.handler.classify(&loi_points, timestamp);

        // Stage 5: Debouncing
        let location_change = self.debouncer.update(&lois, now);

        let visualization = if self.config.visualizes() {
            let (width, height) = frame.dimensions();
            PipelineVisualization {
                downsampled: self
                    .config
                    .visualize_downsampled
                    .then(|| segmentation.smoothed.clone()),
                contours: self.config.visualize_contours.then(|| {
                    visualizer::render_contours(
                        width,
                        height,
                        &segmentation.contours,
                        self.config.min_region_size,
                    )
                }),
                loi_points: self
                    .config
                    .visualize_loi_points
                    .then(|| visualizer::render_loi_points(width, height, &analyses)),
            }
        } else {
            PipelineVisualization::default()
        };

        Ok(FrameReport {
            regions: segmentation.regions,
            loi_points,
            lois,
            location_change,
            visualization,
        })
    }

    /// Confirms a pending location whose window has elapsed, without a frame.
    pub fn poll(&mut self, now: Instant) -> Option<LocationChange> {
        self.debouncer.poll(now)
    }

    pub fn current_location(&self) -> Option<&str> {
        self.debouncer.current()
    }

    /// The current noise-filtered depth frame.
    pub fn current_frame(&self) -> &[u8] {
        self.motion.current()
    }

    pub fn volumes(&self) -> &VoiRegistry {
        self.handler.volumes()
    }

    pub fn register_volume(&mut self, voi: Voi) -> Result<()> {
        self.handler.volumes_mut().register(voi)?;
        self.sync_config_volumes();
        Ok(())
    }

    pub fn update_volume(&mut self, id: &str, shape: VoiShape) -> Result<()> {
        self.handler.volumes_mut().update_shape(id, shape)?;
        self.sync_config_volumes();
        Ok(())
    }

    // `config()` must describe the volumes actually classified against.
    fn sync_config_volumes(&mut self) {
        self.config.volumes = self.handler.volumes().iter().map(|v| Voi::clone(v)).collect();
    }

    /// The current filtered frame coloured by volume.
    pub fn render_locations(&self) -> Result<RgbImage> {
        let frame = DepthFrame::new(
            self.motion.current().to_vec(),
            self.config.frame_width,
            self.config.frame_height,
        )?;
        Ok(visualizer::render_locations(&frame, self.handler.volumes()))
    }
}
