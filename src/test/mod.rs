//! Shared fixtures for unit tests.


pub(crate) use image::{build_image, ImageMethod};
