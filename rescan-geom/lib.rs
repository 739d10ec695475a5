//! Geometry for baseline-relative alignment.
//!
//! [`ransac`] is a generic consensus loop over any [`Estimator`];
//! [`homography`] builds the normalized-DLT estimator on top of it together
//! with the pool-then-fit policy in [`estimate`]; [`warp()`] resamples an image
//! through the resulting transform.

pub mod homography;
pub mod ransac;
pub mod warp;

pub use homography::{
    dlt_homography, estimate, ransac_homography, reprojection_error, EstimatorConfig, Homography, Point,
};
pub use ransac::{ransac, Estimator, RansacOptions, RansacResult};
pub use warp::warp;
