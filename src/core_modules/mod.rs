pub mod blob_detector;
pub mod detection;
pub mod frame;
pub mod moment;
pub mod morphology;
pub mod pixel;
pub mod roi;
pub mod segmenter;
pub mod smart_blob;
pub mod timer;
pub mod tracker;
pub mod utils;
