//! Image-facing layer over `haar-core`.
//!
//! `haar-core` only sees summed-area tables. This crate turns decoded images
//! into normalized training windows ([`image`]), loads labelled directory
//! trees ([`dataset`]) and runs a configured training session end to end
//! ([`app`]).

pub mod app;
pub mod dataset;
pub mod image;

pub use haar_core::*;

pub use crate::dataset::{Dataset, DatasetOptions};
pub use crate::image::{integral_image, Window};
