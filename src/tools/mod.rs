// src/tools/mod.rs
//! Editing and measurement tools for emgfiles

pub mod editing;
pub mod firings;
pub mod idr;
pub mod refsig;
pub mod svr;

pub use editing::{delete_empty_mus, delete_mus, resize_emgfile, resize_refsig, sort_mus, IfSingleMu, ResizeAccuracy};
pub use firings::{create_binary_firings, mupulses_from_binary};
pub use idr::{compute_idr, IdrTable};
pub use refsig::{compute_covsteady, compute_rfd, filter_rawemg, filter_refsig, get_mvc, remove_offset, Rfd};
pub use svr::{compute_svr, EpsilonSvr, SvrFits};
