//! Baseline-relative photo alignment.
//!
//! The first photograph submitted for a `(user, angle)` session becomes its
//! baseline. Every later photograph is registered onto the baseline
//! (oriented FAST + rotated BRIEF features, Hamming matching, RANSAC
//! homography) and warped into its frame, then stored as the next numbered
//! scan.
//!
//! ```no_run
//! use rescan_cli::{SessionConfig, SessionStore, SubmitOutcome};
//!
//! # fn main() -> Result<(), rescan_cli::SessionError> {
//! let store = SessionStore::open(SessionConfig::default())?;
//! let photo = image::open("photo.jpg").map_err(rescan_cli::SessionError::Decode)?.to_rgb8();
//! match store.submit("u1", "front", &photo)? {
//!     SubmitOutcome::ScanCreated { sequence, .. } => println!("scan {sequence}"),
//!     outcome => println!("{}", outcome.message()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod extractor;
pub mod pipeline;
pub mod session;
pub mod storage;

#[cfg(test)]
mod fixtures;

pub use extractor::{ExtractError, FeatureExtractor};
pub use pipeline::{AlignmentFailure, AlignmentPipeline};
pub use session::{
    ImageFormat, ScanRecord, SessionConfig, SessionError, SessionKey, SessionResult, SessionStore, SubmitOutcome,
};
pub use storage::{natural_cmp, FsStorage, MemoryStorage, Storage};

pub use rescan_core::{self, init_thread_pool, AlignConfig, FeatureSet, Keypoint};
pub use rescan_geom::{self, EstimatorConfig, Homography};
