//! Sync engine: the reconciler that pulls remote versions into the local
//! cache, and the upload pipeline that pushes new values out.

mod reconciler;
mod upload;

pub use reconciler::{CancelToken, Reconciled, Reconciler};
pub use upload::{SaveOutcome, UploadPipeline};
