//! Program guide lookup for recrename.
//!
//! This crate defines the records a guide returns ([`CandidateProgram`],
//! [`TitleMetadata`]), the [`GuideService`] seam the renamer talks to, and
//! [`SyobocalClient`], an implementation backed by the Syobocal
//! (cal.syoboi.jp) anime broadcast database.
//!
//! # Example
//!
//! ```ignore
//! use recrename_guide::{GuideService, SyobocalClient};
//!
//! let guide = SyobocalClient::new("recrename")?;
//! let programs = guide.find_programs(start, end).await?;
//! let title = guide.get_full_title(programs[0].title_id).await?;
//! ```

pub mod error;
mod service;
mod syobocal;
pub mod types;

pub use error::{GuideError, Result};
pub use service::GuideService;
pub use syobocal::{SyobocalClient, SYOBOCAL_BASE_URL};
pub use types::{CandidateProgram, TitleMetadata};
