pub mod color;
pub mod frame;

pub use color::{
    delta_e2000, delta_e76, lab_to_srgb, srgb_to_lab, ColorParseError, DistanceMetric, Lab, Rgb8,
    DEFAULT_JND_THRESHOLD,
};
pub use frame::ImageFrame;
