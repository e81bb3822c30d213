//! # sitepush
//!
//! Deployment pipeline for a static storefront. The site lives in its own
//! repository; sitepush fills in the generated parts (product data, product
//! photos), builds it, and mirrors the result to an FTP host.
//!
//! # Architecture: Five-Stage Pipeline
//!
//! ```text
//! 1. Refresh   repository url  →  web/                       (git clone)
//! 2. Export    MongoDB         →  web/static/data/           (fixtures)
//! 3. Convert   images/**       →  web/static/assets/product-images/*.webp
//! 4. Build     web/            →  web/public/                (npm, or whatever is configured)
//! 5. Publish   web/public/     →  ftp://host/remote_root/    (mirror)
//! ```
//!
//! Stages run in order and each can be run alone from the CLI. A stage that
//! cannot start (bad config, clone failure, no connection) stops the pipeline.
//! Failures confined to one item (a corrupt photo, a refused upload) are
//! reported and make the run exit non-zero, but the remaining items and
//! stages still run.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Decode, EXIF orientation, size-bounded WebP encoding |
//! | [`convert`] | Stage 3: parallel conversion of the photo tree |
//! | [`cache`] | Content-addressed cache of earlier encodes |
//! | [`publish`] | Stage 5: transfer sessions and the recursive mirror |
//! | [`fixtures`] | Stage 2: database collections to site JSON |
//! | [`workdir`] | Stages 1 and 4: clone and build |
//! | [`config`] | `sitepush.toml` loading, validation, merging; credentials |
//! | [`output`] | CLI report formatting for every stage |
//!
//! # Design Decisions
//!
//! ## Best-Effort Size Budget
//!
//! Product photos must stay under a byte budget (120 KiB by default) without
//! a human picking quality per photo. The encoder binary-searches the quality
//! window and keeps the highest quality that fits. When nothing fits, the
//! photo is still published at the minimum quality and flagged "over budget"
//! in the report: a slightly heavy page beats a missing product image.
//!
//! ## Orientation Baked Into Pixels
//!
//! Phone photos are stored sideways with an EXIF orientation tag. WebP output
//! carries no EXIF, so the transform is applied to the pixels before encoding.
//!
//! ## Mirror Restores Its Working Directory
//!
//! FTP sessions have one current directory shared by every command. The
//! mirror always returns to the directory it started in, even after a failed
//! subtree. If that return itself fails, the rest of the parent directory is
//! skipped, so a failure in one branch cannot misplace uploads in another.

pub mod cache;
pub mod config;
pub mod convert;
pub mod fixtures;
pub mod imaging;
pub mod output;
pub mod publish;
pub mod workdir;

#[cfg(test)]
pub(crate) mod test_helpers;
